//! recdsl - decode files against a record-layout schema
//!
//! Usage:
//!   cargo run --bin recdsl --features cli -- --schema formats.rdsl --name Packet --input dump.bin
//!   cargo run --bin recdsl --features cli -- --schema formats.rdsl --name Config --input app.conf --text

use anyhow::{Context, Result};
use clap::Parser;
use record_dsl::{compile_with, ConfigLoader, RecordView, Severity};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recdsl")]
#[command(about = "Decode binary files or text lines against a record-layout schema")]
struct Cli {
    /// Schema source file
    #[arg(short, long)]
    schema: PathBuf,

    /// Entry schema, e.g. Packet or LengthPrefixed<Item>
    #[arg(short, long)]
    name: String,

    /// Input file (whole file for binary, one unit per line for text)
    #[arg(short, long)]
    input: PathBuf,

    /// Decode the input as text lines
    #[arg(long)]
    text: bool,

    /// Decoder options YAML (falls back to RECORD_DSL_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep going after a unit fails to decode
    #[arg(long)]
    skip_errors: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::new(path),
        None => ConfigLoader::from_env(),
    };
    let options = loader.load()?;

    let source = std::fs::read_to_string(&cli.schema)
        .with_context(|| format!("Failed to read {}", cli.schema.display()))?;
    let compiled = compile_with(&source, options)
        .with_context(|| format!("Failed to compile {}", cli.schema.display()))?;

    for diag in compiled.diagnostics() {
        if diag.severity == Severity::Warning {
            eprintln!("warning: {}", diag.message);
        }
    }

    if cli.text {
        let content = std::fs::read_to_string(&cli.input)
            .with_context(|| format!("Failed to read {}", cli.input.display()))?;
        for (line_no, line) in content.lines().enumerate() {
            match compiled.decode_text(line, &cli.name) {
                Ok(record) => emit(&RecordView::new(&record), cli.pretty)?,
                Err(e) if cli.skip_errors => eprintln!("line {}: {}", line_no + 1, e),
                Err(e) => return Err(e).with_context(|| format!("line {}", line_no + 1)),
            }
        }
    } else {
        let bytes = std::fs::read(&cli.input)
            .with_context(|| format!("Failed to read {}", cli.input.display()))?;
        let record = compiled
            .decode_binary(&bytes, &cli.name)
            .with_context(|| format!("Failed to decode {}", cli.input.display()))?;
        emit(&RecordView::new(&record), cli.pretty)?;
    }

    Ok(())
}

fn emit(view: &RecordView<'_>, pretty: bool) -> Result<()> {
    let json = view.to_json()?;
    if pretty {
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("{}", json);
    }
    Ok(())
}
