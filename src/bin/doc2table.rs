//! CLI binary for doc2table.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `BatchConfig` + `BatchRequest`, writes the table and prints the report.

use anyhow::{bail, Context, Result};
use clap::Parser;
use doc2table::stream::sse_frames;
use doc2table::{
    process_batch_stream, BatchConfig, BatchPipeline, BatchProgressCallback, BatchReport,
    BatchRequest, DocumentError, DocumentFormat, DocumentInput, PlainTextExtractor,
    ProgressEvent, ProgressStatus, TextExtractor,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per document,
/// printed in completion order.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_batch_start
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} docs  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total_documents as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_documents} documents…"))
        ));
    }

    fn on_document_complete(&self, event: &ProgressEvent) {
        let line = match event.status {
            ProgressStatus::Fulfilled => format!(
                "  {} {:>4}/{:<4} {}",
                green("✓"),
                event.progress,
                event.total,
                event.file
            ),
            ProgressStatus::Rejected => format!(
                "  {} {:>4}/{:<4} {}",
                red("✗"),
                event.progress,
                event.total,
                red(event.error.as_deref().unwrap_or(&event.file))
            ),
        };
        self.bar.println(line);
        self.bar.set_message(format!(
            "ETA {}",
            dim(&format!("{:.1}s", event.estimated_ms_left as f64 / 1000.0))
        ));
        self.bar.set_position(event.progress as u64);
    }

    fn on_batch_complete(&self, report: &BatchReport) {
        self.bar.finish_and_clear();
        let summary = if report.total_failure == 0 {
            green(&format!("✔ {} documents extracted", report.total_success))
        } else {
            format!(
                "{} {}",
                green(&format!("✔ {} extracted", report.total_success)),
                red(&format!("✗ {} failed", report.total_failure))
            )
        };
        eprintln!("{summary}  {}", dim(&format!("({} total)", report.total_processed)));
    }
}

// ── Text backend selection ───────────────────────────────────────────────────

/// `.txt` inputs are read as-is; everything else goes to the default backend.
struct ByExtension {
    fallback: Arc<dyn TextExtractor>,
}

impl TextExtractor for ByExtension {
    fn extract_text(&self, file_name: &str, bytes: &[u8]) -> Result<String, DocumentError> {
        if has_extension(Path::new(file_name), "txt") {
            PlainTextExtractor.extract_text(file_name, bytes)
        } else {
            self.fallback.extract_text(file_name, bytes)
        }
    }

    fn backend_name(&self) -> &'static str {
        "by-extension"
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = "\
EXAMPLES:
  # Extract every technical review certificate in a folder
  doc2table --format CRT ./certificados -o revisiones.csv

  # Auto-detect the format of each document, 8 at a time
  doc2table -c 8 a.pdf b.pdf c.pdf

  # Keep a list of the files that failed next to the table
  doc2table ./docs -o docs.csv --stats docs-estadisticas.csv

  # Print the JSON report instead of the summary
  doc2table --json --patterns ./docs

  # Stream Server-Sent Events frames to stdout
  doc2table --events ./docs > events.txt

FORMATS:
  CERTIFICADO_DE_HOMOLOGACION, CRT, SOAP, PERMISO_CIRCULACION

ENVIRONMENT VARIABLES:
  DOC2TABLE_FORMAT               Target format (default: auto-detect)
  DOC2TABLE_CONCURRENCY          Documents processed at once (default: 15)
  DOC2TABLE_TASK_TIMEOUT         Per-document timeout in seconds (default: 30)
  DOC2TABLE_BATCH_TIMEOUT        Whole-batch timeout in seconds (default: 1800)
  DOC2TABLE_MAX_FILES            Maximum documents per batch (default: 15000)
  DOC2TABLE_MAX_FILE_SIZE_MB     Maximum size of one document (default: 10)
  RUST_LOG                       Log filter, overrides -v/-q
";

#[derive(Parser, Debug)]
#[command(
    name = "doc2table",
    version,
    about = "Batch-extract vehicle document fields into one table",
    long_about = "Reads CRT, SOAP, circulation permit and homologation documents, \
                  extracts their fields with per-format patterns and writes one CSV table. \
                  Documents that fail are listed with the reason; they never stop the batch.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input files or directories (directories are scanned for .pdf and .txt).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Target format; omit to auto-detect each document.
    #[arg(short, long, env = "DOC2TABLE_FORMAT")]
    format: Option<String>,

    /// Output table path (default: the table's own name, in the current directory).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the statistics table (totals and failed files) to this path.
    #[arg(long, value_name = "PATH")]
    stats: Option<PathBuf>,

    /// Documents processed at once (clamped to the configured maximum).
    #[arg(short, long, env = "DOC2TABLE_CONCURRENCY", default_value_t = 15)]
    concurrency: usize,

    /// Per-document timeout in seconds.
    #[arg(long, env = "DOC2TABLE_TASK_TIMEOUT", default_value_t = 30)]
    task_timeout: u64,

    /// Whole-batch timeout in seconds.
    #[arg(long, env = "DOC2TABLE_BATCH_TIMEOUT", default_value_t = 1800)]
    batch_timeout: u64,

    /// Maximum documents per batch.
    #[arg(long, env = "DOC2TABLE_MAX_FILES", default_value_t = 15_000)]
    max_files: usize,

    /// Maximum size of one document in MiB.
    #[arg(long, env = "DOC2TABLE_MAX_FILE_SIZE_MB", default_value_t = 10)]
    max_file_size_mb: usize,

    /// Attach each extractor's field patterns to its successes.
    #[arg(long)]
    patterns: bool,

    /// Print the JSON report to stdout.
    #[arg(long, conflicts_with = "events")]
    json: bool,

    /// Print Server-Sent Events frames to stdout instead of a summary.
    #[arg(long)]
    events: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOC2TABLE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2TABLE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2TABLE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.events;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inputs ───────────────────────────────────────────────────────────
    let files = collect_inputs(&cli.inputs)?;
    if files.is_empty() {
        bail!("No .pdf or .txt documents found in the given inputs");
    }
    let mut documents = Vec::with_capacity(files.len());
    for path in &files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        documents.push(DocumentInput::new(name, bytes));
    }

    let mut request = BatchRequest::new(documents)
        .concurrency(cli.concurrency)
        .include_patterns(cli.patterns);
    if let Some(tag) = cli.format.as_deref().filter(|t| !t.eq_ignore_ascii_case("auto")) {
        request = request.format(tag.parse::<DocumentFormat>()?);
    }

    // ── Pipeline ─────────────────────────────────────────────────────────
    let progress: Option<Arc<dyn BatchProgressCallback>> = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let config = build_config(&cli, progress)?;
    let pipeline = BatchPipeline::new(config).with_text_extractor(Arc::new(ByExtension {
        fallback: doc2table::source::default_text_extractor(),
    }));

    if cli.events {
        let mut frames = sse_frames(
            process_batch_stream(&pipeline, request).context("Batch rejected")?,
        );
        let mut stdout = io::stdout().lock();
        while let Some(frame) = frames.next().await {
            stdout.write_all(frame.as_bytes())?;
            stdout.flush()?;
        }
        return Ok(());
    }

    let output = pipeline
        .process_batch(request)
        .await
        .context("Batch failed")?;

    let out_path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&output.table.file_name));
    tokio::fs::write(&out_path, &output.table.bytes)
        .await
        .with_context(|| format!("Failed to write {}", out_path.display()))?;
    if let Some(stats_path) = &cli.stats {
        tokio::fs::write(stats_path, &output.statistics.bytes)
            .await
            .with_context(|| format!("Failed to write {}", stats_path.display()))?;
    }

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        let json = serde_json::to_string_pretty(&output.report)
            .context("Failed to serialise the report")?;
        println!("{json}");
    } else if !cli.quiet {
        for failure in &output.report.failures {
            eprintln!("  {} {}", red("✗"), failure.error);
        }
        eprintln!(
            "{} {}  {}",
            cyan("◆"),
            bold(&format!(
                "{}/{} documents extracted",
                output.report.total_success, output.report.total_processed
            )),
            dim(&format!("→ {}", out_path.display()))
        );
    }

    Ok(())
}

/// Expand directories (non-recursively) into their `.pdf`/`.txt` files, sorted.
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found = Vec::new();
            for entry in std::fs::read_dir(input)
                .with_context(|| format!("Failed to list {}", input.display()))?
            {
                let path = entry?.path();
                if path.is_file() && (has_extension(&path, "pdf") || has_extension(&path, "txt")) {
                    found.push(path);
                }
            }
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn build_config(cli: &Cli, progress: Option<Arc<dyn BatchProgressCallback>>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .max_files(cli.max_files)
        .max_file_size_bytes(cli.max_file_size_mb.saturating_mul(1024 * 1024))
        .task_timeout(Duration::from_secs(cli.task_timeout))
        .batch_timeout(Duration::from_secs(cli.batch_timeout));

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
