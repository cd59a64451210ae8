//! Purpose: Streaming binary codec for forward-only, multi-result tabular cursors.
//! Exports: `api` (serialize/deserialize and the cursor types), `core` (codec internals).
//! Role: Library backing the `tabwire` CLI and tests.
//! Invariants: Neither side materializes a whole result; rows stream one at a time.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
