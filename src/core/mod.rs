// Core modules implementing the stream codec, value model, and error modeling.
pub mod bcl;
pub mod catalog;
pub mod cell;
pub mod column;
pub mod error;
pub mod frame;
pub mod memory;
pub mod reader;
pub mod source;
pub mod value;
pub mod wire;
pub mod writer;
