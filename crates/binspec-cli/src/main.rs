//! binspec - Decode binary files with declarative schemas
//!
//! This tool interprets a JSON schema over one file or a directory of files
//! and prints (or writes) the decoded record tree as JSON.

use anyhow::{bail, Context, Result};
use binspec_core::{
    ByteOrder, CollectingSink, Decoder, DecoderConfig, Record, Schema, Value,
};
use clap::{Args, Parser, ValueEnum};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Decode binary files with declarative schemas
#[derive(Parser, Debug)]
#[command(name = "binspec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// JSON schema describing the input format
    #[arg(short, long)]
    schema: PathBuf,

    #[command(flatten)]
    input: InputMode,

    /// Output directory for decoded records (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Only decode files with this extension in directory mode
    #[arg(short, long)]
    extension: Option<String>,

    /// Maximum schema nesting depth (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_depth: usize,

    /// Fail on calls to unregistered functions
    #[arg(long)]
    strict_functions: bool,

    /// Override the schema's byte order
    #[arg(long, value_enum)]
    byte_order: Option<ByteOrderArg>,

    /// Dry run - don't write files, just show what would be written
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files without prompting
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single file to decode
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of files to decode
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Output format for decoded records
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Single-line JSON
    Compact,
    /// One line per top-level field
    Fields,
}

/// Byte order override
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ByteOrderArg {
    /// Little-endian
    Little,
    /// Big-endian
    Big,
}

impl From<ByteOrderArg> for ByteOrder {
    fn from(arg: ByteOrderArg) -> Self {
        match arg {
            ByteOrderArg::Little => ByteOrder::Little,
            ByteOrderArg::Big => ByteOrder::Big,
        }
    }
}

#[derive(Debug, Default)]
struct DecodeStats {
    decoded: usize,
    failed: usize,
    diagnostics: usize,
    written: usize,
}

impl DecodeStats {
    fn print_summary(&self) {
        info!(
            "Summary: {} decoded, {} failed, {} diagnostics, {} written",
            self.decoded, self.failed, self.diagnostics, self.written
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let schema = Schema::from_file(&cli.schema)
        .with_context(|| format!("Failed to load schema: {}", cli.schema.display()))?;
    debug!(
        "Loaded schema with {} top-level nodes and {} templates",
        schema.spec.len(),
        schema.templates.len()
    );
    let decoder = build_decoder(&cli);

    // Dispatch based on input mode
    if let Some(ref file) = cli.input.file {
        process_single_file(&cli, &decoder, &schema, file)
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, &decoder, &schema, directory)
    } else {
        bail!("Either --file or --directory must be specified")
    }
}

fn build_decoder(cli: &Cli) -> Decoder {
    let mut config = DecoderConfig::new()
        .max_depth(cli.max_depth)
        .strict_functions(cli.strict_functions);
    if let Some(byte_order) = cli.byte_order {
        config = config.byte_order(byte_order.into());
    }
    Decoder::with_config(config)
}

/// Decode a single file
fn process_single_file(cli: &Cli, decoder: &Decoder, schema: &Schema, file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let mut stats = DecodeStats::default();
    process_input(cli, decoder, schema, file, false, &mut stats)?;

    if cli.output.is_some() && !cli.dry_run {
        stats.print_summary();
    }

    Ok(())
}

/// Decode every matching file below a directory
fn process_directory(cli: &Cli, decoder: &Decoder, schema: &Schema, directory: &Path) -> Result<()> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut stats = DecodeStats::default();

    // Walk the directory
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        // Skip directories
        if !path.is_file() {
            continue;
        }

        // Skip hidden files
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
        {
            continue;
        }

        if let Some(ref extension) = cli.extension {
            if !matches_extension(path, extension) {
                trace!("Skipping {}: extension filter", path.display());
                continue;
            }
        }

        debug!("Decoding: {}", path.display());
        if let Err(e) = process_input(cli, decoder, schema, path, true, &mut stats) {
            // Log error but continue with other files
            warn!("Error decoding {}: {:#}", path.display(), e);
            stats.failed += 1;
        }
    }

    stats.print_summary();

    Ok(())
}

/// Returns true if the path's extension equals `extension` (case-insensitive, dot optional)
fn matches_extension(path: &Path, extension: &str) -> bool {
    let wanted = extension.trim_start_matches('.');
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}

/// Decode one input file and emit the record
fn process_input(
    cli: &Cli,
    decoder: &Decoder,
    schema: &Schema,
    input: &Path,
    with_header: bool,
    stats: &mut DecodeStats,
) -> Result<()> {
    trace!("Reading {}", input.display());
    let data = fs::read(input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;

    let mut sink = CollectingSink::default();
    let record = decoder
        .decode_with_sink(&data, schema, &mut sink)
        .with_context(|| format!("Failed to decode: {}", input.display()))?;
    stats.decoded += 1;
    stats.diagnostics += sink.len();
    debug!(
        "Decoded {} ({} bytes, {} fields, {} diagnostics)",
        input.display(),
        data.len(),
        record.len(),
        sink.len()
    );

    let content = render_record(&record, cli.format)?;

    let Some(ref output_dir) = cli.output else {
        if with_header {
            println!("==> {} <==", input.display());
        }
        println!("{}", content);
        return Ok(());
    };

    let output_path = output_path_for(output_dir, input);
    if cli.dry_run {
        println!("Would write: {}", output_path.display());
        if cli.verbose > 0 {
            println!("---");
            println!("{}", content);
            println!("---");
        }
        return Ok(());
    }

    match write_record_file(&output_path, &content, cli.force) {
        Ok(()) => {
            println!("Wrote {}", output_path.display());
            stats.written += 1;
        }
        Err(e) => {
            error!("Failed to write {}: {:#}", output_path.display(), e);
        }
    }
    Ok(())
}

/// Output file for an input: `<output_dir>/<input file name>.json`
fn output_path_for(output_dir: &Path, input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".to_string());
    output_dir.join(format!("{}.json", name))
}

/// Render a record in the requested format
fn render_record(record: &Record, format: OutputFormat) -> Result<String> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(record)?,
        OutputFormat::Compact => serde_json::to_string(record)?,
        OutputFormat::Fields => record
            .iter()
            .map(|(id, value)| format!("{}: {}", id, describe(value)))
            .collect::<Vec<_>>()
            .join("\n"),
    };
    Ok(rendered)
}

/// Short one-line description of a value
fn describe(value: &Value) -> String {
    match value {
        Value::Text(text) => format!("{:?}", text),
        Value::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        Value::List(items) => format!("[{} items]", items.len()),
        Value::Record(record) => format!("{{{} fields}}", record.len()),
        other => other.to_string(),
    }
}

/// Write a record file, refusing to overwrite unless forced
fn write_record_file(output_path: &Path, content: &str, force: bool) -> Result<()> {
    // Create parent directories
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    // Check if file exists
    if output_path.exists() && !force {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            output_path.display()
        );
    }

    // Write the file
    let mut file = fs::File::create(output_path)
        .with_context(|| format!("Failed to create file: {}", output_path.display()))?;

    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write file: {}", output_path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("Failed to write file: {}", output_path.display()))?;

    Ok(())
}
