//! Purpose: `tabwire` CLI entry point: encode JSON tables, inspect and describe streams.
//! Role: Binary crate root; parses args, runs commands, emits JSON lines on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Streams are read forward only; one result is buffered at a time for output.
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value as Json, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod table_json;

use tabwire::api::{self, Error, ErrorKind, StreamReader, TabularSource, to_exit_code};

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(()) => 0,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<(), (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                return Ok(());
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage).with_message(clap_error_summary(&err)),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    let result = match cli.command {
        Command::Encode { input, output } => encode(&input, output.as_deref()),
        Command::Inspect { input } => inspect(&input),
        Command::Schema { input } => schema(&input),
    };
    result.map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "tabwire",
    version,
    about = "Streaming binary codec for multi-result tabular data",
    long_about = None,
    after_help = r#"EXAMPLES
  $ tabwire encode table.json -o table.tw
  $ tabwire inspect table.tw
  $ cat table.tw | tabwire schema -

INPUT DOCUMENT
  {"records_affected": 1,
   "results": [{"columns": [{"name": "id", "kind": "Int32"}],
                "rows": [[1], [null]]}]}"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Serialize a JSON table document into a stream")]
    Encode {
        #[arg(help = "JSON table document, or - for stdin", value_hint = ValueHint::FilePath)]
        input: PathBuf,
        #[arg(short, long, help = "Output file (default: stdout)", value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },
    #[command(about = "Print every result of a stream as JSON lines")]
    Inspect {
        #[arg(help = "Stream file, or - for stdin", value_hint = ValueHint::FilePath)]
        input: PathBuf,
    },
    #[command(about = "Print the schema table of every result as JSON lines")]
    Schema {
        #[arg(help = "Stream file, or - for stdin", value_hint = ValueHint::FilePath)]
        input: PathBuf,
    },
}

fn open_input(path: &Path) -> Result<Box<dyn Read>, Error> {
    if path == Path::new("-") {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("failed to open {}", path.display()))
            .with_source(err)
    })?;
    Ok(Box::new(file))
}

fn encode(input: &Path, output: Option<&Path>) -> Result<(), Error> {
    let mut text = String::new();
    open_input(input)?.read_to_string(&mut text).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("failed to read {}", input.display()))
            .with_source(err)
    })?;
    let mut source = table_json::parse_document(&text)?;

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to create {}", path.display()))
                .with_source(err)
        })?),
        None => Box::new(io::stdout().lock()),
    };
    let mut sink = api::serialize(BufWriter::new(sink), &mut source)?;
    sink.flush().map_err(|err| Error::new(ErrorKind::Io).with_source(err))
}

fn inspect(input: &Path) -> Result<(), Error> {
    let mut reader = api::deserialize(open_input(input)?)?;
    let mut out = io::stdout().lock();
    let mut results = 0usize;
    while reader.has_result() {
        write_result(&mut reader, &mut out, results)?;
        results += 1;
        reader.next_result()?;
    }
    let summary = json!({ "records_affected": reader.records_affected()?, "results": results });
    emit_line(&mut out, &summary)?;
    reader.close();
    Ok(())
}

/// Streams the current result as one JSON line, one row at a time. Keys are
/// written in the order `serde_json` sorts them.
fn write_result<R: Read>(
    reader: &mut StreamReader<R>,
    out: &mut impl Write,
    index: usize,
) -> Result<(), Error> {
    let columns = Json::Array(reader.columns().iter().map(table_json::column_json).collect());
    write_out(out, format_args!("{{\"columns\":{columns},\"result\":{index},\"rows\":["))?;
    let mut values = vec![api::Value::Null; reader.field_count()?];
    let mut separator = "";
    while reader.read()? {
        reader.get_values(Some(values.as_mut_slice()))?;
        let row = Json::Array(values.iter().map(table_json::value_json).collect());
        write_out(out, format_args!("{separator}{row}"))?;
        separator = ",";
    }
    write_out(out, format_args!("]}}\n"))
}

fn schema(input: &Path) -> Result<(), Error> {
    let mut reader = api::deserialize(open_input(input)?)?;
    let mut out = io::stdout().lock();
    let mut index = 0usize;
    while reader.has_result() {
        let table = reader.schema_table()?;
        let columns = serde_json::to_value(&table.columns).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("failed to encode schema")
                .with_source(err)
        })?;
        emit_line(&mut out, &json!({ "result": index, "columns": columns }))?;
        index += 1;
        reader.next_result()?;
    }
    reader.close();
    Ok(())
}

fn emit_line(out: &mut impl Write, value: &Json) -> Result<(), Error> {
    write_out(out, format_args!("{value}\n"))
}

fn write_out(out: &mut impl Write, args: fmt::Arguments<'_>) -> Result<(), Error> {
    out.write_fmt(args).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write output")
            .with_source(err)
    })
}

enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Io\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::ArgumentMissing => "required argument is missing".to_string(),
        ErrorKind::TypeNotSupported => "column type is not supported".to_string(),
        ErrorKind::MalformedStream => "malformed stream".to_string(),
        ErrorKind::ClosedReader => "reader is closed".to_string(),
        ErrorKind::DisposedReader => "reader is disposed".to_string(),
        ErrorKind::IndexOutOfRange => "index out of range".to_string(),
        ErrorKind::InvalidOperation => "invalid operation".to_string(),
        ErrorKind::InvalidCast => "invalid cast".to_string(),
        ErrorKind::Overflow => "value out of range".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Json {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(ordinal) = err.ordinal() {
        inner.insert("ordinal".to_string(), json!(ordinal));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Json::Object(inner));
    Json::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];
    if let Some(ordinal) = err.ordinal() {
        lines.push(format!(
            "{} {ordinal}",
            colorize_label("ordinal:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(offset) = err.offset() {
        lines.push(format!(
            "{} {offset}",
            colorize_label("offset:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
