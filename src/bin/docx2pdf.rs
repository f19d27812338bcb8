//! CLI binary for docx2pdf.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, pushes every input through one `Converter`, and
//! writes the PDFs next to their sources (or where told).

use anyhow::{Context, Result};
use clap::Parser;
use docx2pdf::config::{DEFAULT_CONCURRENCY, DEFAULT_MAX_BYTES, DEFAULT_TIMEOUT_MS};
use docx2pdf::{
    convert_stream_paths, extract_images_from_file, write_output, BackendDescriptor, BackendKind,
    ConversionConfig, ConversionProgressCallback, ConvertOptions, Converter, Docx2PdfError,
    ErrorKind, JobId, ProgressCallback,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar over all input files. The bar advances from
/// `main` as outcomes arrive; the callback only tracks how many backends
/// are running and surfaces workspace cleanup problems.
struct CliProgressCallback {
    bar: ProgressBar,
    running: AtomicUsize,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            running: AtomicUsize::new(0),
        })
    }

    fn show_running(&self, n: usize) {
        self.bar.set_message(dim(&format!("{n} running")));
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_job_start(&self, _job: JobId) {
        let n = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.show_running(n);
    }

    fn on_job_complete(&self, _job: JobId, _pdf_len: usize) {
        let n = self.running.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        self.show_running(n);
    }

    fn on_job_error(&self, _job: JobId, _error: &Docx2PdfError) {
        let n = self.running.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        self.show_running(n);
    }

    fn on_cleanup_failed(&self, job: JobId, path: &Path, error: &io::Error) {
        self.bar.println(format!(
            "  {} {job}: could not remove {}: {error}",
            yellow("⚠"),
            path.display()
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one document next to itself (report.pdf)
  docx2pdf report.docx

  # Convert to an explicit path
  docx2pdf report.docx -o out/final.pdf

  # Batch convert into a directory, four backends at a time
  docx2pdf -c 4 --out-dir pdf/ *.docx

  # Longer deadline for heavy documents
  docx2pdf --timeout-ms 180000 thesis.docx

  # Also pull embedded images out of the document
  docx2pdf --extract-images media/ brochure.docx

  # Machine-readable report
  docx2pdf --json *.docx > report.json

  # Custom backend script: called as <program> <input> <output> <keep_active>
  docx2pdf --backend-program ./my-convert.sh report.docx

BACKENDS:
  word      Microsoft Word via PowerShell COM automation (Windows default)
  macos     Microsoft Word via AppleScript (macOS default)
  unoconv   LibreOffice via unoconv, headless (Linux default)

ENVIRONMENT VARIABLES:
  MAX_DOCX_BYTES          Largest accepted input in bytes (default 15 MiB)
  DOCX2PDF_CONCURRENCY    Backends allowed to run at once (default 2)
  DOCX2PDF_TIMEOUT_MS     Per-document backend deadline (default 60000)
  DOCX2PDF_KEEP_ACTIVE    Leave Word running after conversion (true/false)
  DOCX2PDF_TEMP_DIR       Where per-job workspaces are created
  DOCX2PDF_BACKEND        Backend override (word, macos, unoconv)
  DOCX2PDF_SCRIPT_DIR     Where bundled backend scripts are installed
  DOCX2PDF_UNOCONV_PATH   Path to the unoconv executable
"#;

/// Convert DOCX documents to PDF through Word or LibreOffice.
#[derive(Parser, Debug)]
#[command(
    name = "docx2pdf",
    version,
    about = "Convert DOCX documents to PDF through Word or LibreOffice",
    long_about = "Convert DOCX documents to PDF by driving an external backend: Microsoft Word \
on Windows and macOS, headless LibreOffice (unoconv) on Linux. Conversions are queued in order, \
run with bounded concurrency, and killed if they exceed their deadline.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// DOCX files to convert.
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Write the PDF to this path (single input only).
    #[arg(short, long, conflicts_with = "out_dir")]
    output: Option<PathBuf>,

    /// Write PDFs into this directory instead of next to each input.
    #[arg(long, env = "DOCX2PDF_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Largest accepted input, in bytes.
    #[arg(long, env = "MAX_DOCX_BYTES", default_value_t = DEFAULT_MAX_BYTES)]
    max_bytes: u64,

    /// Per-document backend deadline, in milliseconds.
    #[arg(long, env = "DOCX2PDF_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout_ms: u64,

    /// Number of backend processes allowed to run at once.
    #[arg(short, long, env = "DOCX2PDF_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Leave the host application (Word) running after each conversion.
    #[arg(long, env = "DOCX2PDF_KEEP_ACTIVE")]
    keep_active: bool,

    /// Backend to use: word, macos, unoconv. Detected from the OS if unset.
    #[arg(long, env = "DOCX2PDF_BACKEND", conflicts_with = "backend_program")]
    backend: Option<String>,

    /// Custom backend executable, called as `<program> <input> <output> <keep_active>`.
    #[arg(long)]
    backend_program: Option<PathBuf>,

    /// Directory under which per-job workspaces are created.
    #[arg(long, env = "DOCX2PDF_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Also extract embedded images (word/media/*) into this directory.
    #[arg(long, value_name = "DIR")]
    extract_images: Option<PathBuf>,

    /// Print a JSON report to stdout.
    #[arg(long, env = "DOCX2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCX2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCX2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCX2PDF_QUIET")]
    quiet: bool,
}

/// Per-file entry of the `--json` report.
#[derive(Debug, Default, Serialize)]
struct FileReport {
    input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pdf_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Report {
    version: &'static str,
    backend: String,
    concurrency: usize,
    duration_ms: u64,
    succeeded: usize,
    failed: usize,
    cleanup_failures: u64,
    files: Vec<FileReport>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    if cli.output.is_some() && cli.inputs.len() > 1 {
        anyhow::bail!("--output takes a single input; use --out-dir for batches");
    }

    // ── Build converter ──────────────────────────────────────────────────
    let progress = show_progress.then(|| CliProgressCallback::new(cli.inputs.len()));
    let config = build_config(&cli, progress.clone().map(|cb| cb as ProgressCallback))?;
    let converter = Converter::new(config).context("No usable conversion backend")?;

    let bar = progress.as_ref().map(|cb| cb.bar.clone());
    let say = |line: String| match &bar {
        Some(bar) => bar.println(line),
        None if !cli.quiet && !cli.json => eprintln!("{line}"),
        None => {}
    };

    let started = Instant::now();
    let mut files: Vec<FileReport> = cli
        .inputs
        .iter()
        .map(|input| FileReport {
            input: input.clone(),
            ..FileReport::default()
        })
        .collect();

    // ── Optional media extraction ────────────────────────────────────────
    if let Some(ref dir) = cli.extract_images {
        for (i, input) in cli.inputs.iter().enumerate() {
            let target = images_dir_for(dir, input, cli.inputs.len());
            match extract_images_from_file(input, &target, cli.max_bytes).await {
                Ok(written) => {
                    files[i].images = Some(written.len());
                    if !written.is_empty() {
                        say(format!(
                            "  {} {} image(s) from {} → {}",
                            dim("▸"),
                            written.len(),
                            input.display(),
                            target.display()
                        ));
                    }
                }
                // Invalid inputs are reported once, by the conversion below.
                Err(e) if e.kind() == ErrorKind::InvalidInput => {}
                Err(e) => say(format!(
                    "  {} image extraction failed for {}: {e}",
                    yellow("⚠"),
                    input.display()
                )),
            }
        }
    }

    // ── Run conversions ──────────────────────────────────────────────────
    let options = ConvertOptions::new();
    let mut outcomes = convert_stream_paths(&converter, &cli.inputs, &options).await;

    while let Some(outcome) = outcomes.next().await {
        let entry = &mut files[outcome.index];
        entry.job_id = outcome.job_id;

        let result = match outcome.result {
            Ok(pdf) => {
                let dest = output_path_for(&cli, &entry.input);
                match write_output(&dest, &pdf).await {
                    Ok(()) => Ok((dest, pdf.len())),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok((dest, len)) => {
                say(format!(
                    "  {} {}  →  {}  {}",
                    green("✓"),
                    entry.input.display(),
                    bold(&dest.display().to_string()),
                    dim(&format!("{len} bytes")),
                ));
                entry.output = Some(dest);
                entry.pdf_bytes = Some(len);
            }
            Err(e) => {
                say(format!(
                    "  {} {}  {}",
                    red("✗"),
                    entry.input.display(),
                    red(&first_line(&e.to_string())),
                ));
                entry.error_kind = Some(e.kind());
                entry.error = Some(e.to_string());
            }
        }

        if let Some(ref bar) = bar {
            bar.inc(1);
        }
    }

    if let Some(ref bar) = bar {
        bar.finish_and_clear();
    }

    // ── Report ───────────────────────────────────────────────────────────
    let failed = files.iter().filter(|f| f.error.is_some()).count();
    let report = Report {
        version: docx2pdf::VERSION,
        backend: converter.backend().name(),
        concurrency: converter.scheduler().concurrency_limit(),
        duration_ms: started.elapsed().as_millis() as u64,
        succeeded: files.len() - failed,
        failed,
        cleanup_failures: converter.cleanup_failures(),
        files,
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        let mark = if failed == 0 { green("✔") } else { red("✘") };
        eprintln!(
            "{} {}/{} converted in {}ms  {}",
            mark,
            bold(&report.succeeded.to_string()),
            report.files.len(),
            report.duration_ms,
            dim(&format!("backend {}", report.backend)),
        );
        if report.cleanup_failures > 0 {
            eprintln!(
                "{} {} workspace(s) could not be removed",
                yellow("⚠"),
                report.cleanup_failures
            );
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} conversion(s) failed", report.files.len());
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .max_bytes(cli.max_bytes)
        .timeout_ms(cli.timeout_ms)
        .concurrency(cli.concurrency)
        .keep_active(cli.keep_active);

    if let Some(ref dir) = cli.temp_dir {
        builder = builder.temp_dir(dir);
    }

    if let Some(ref program) = cli.backend_program {
        builder = builder.backend(BackendDescriptor::script(program));
    } else if let Some(ref name) = cli.backend {
        let kind: BackendKind = name.parse().context("Invalid --backend")?;
        let backend = BackendDescriptor::resolve(kind)
            .with_context(|| format!("Failed to prepare the {kind} backend"))?;
        builder = builder.backend(backend);
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Where the PDF for `input` goes.
fn output_path_for(cli: &Cli, input: &Path) -> PathBuf {
    if let Some(ref out) = cli.output {
        return out.clone();
    }
    let pdf_name = input.with_extension("pdf");
    match cli.out_dir {
        Some(ref dir) => dir.join(pdf_name.file_name().unwrap_or(pdf_name.as_os_str())),
        None => pdf_name,
    }
}

/// Images of a single input go straight into `dir`; batches get one
/// subdirectory per input, named after its stem.
fn images_dir_for(dir: &Path, input: &Path, total: usize) -> PathBuf {
    if total <= 1 {
        return dir.to_path_buf();
    }
    match input.file_stem() {
        Some(stem) => dir.join(stem),
        None => dir.to_path_buf(),
    }
}

fn first_line(s: &str) -> String {
    let line = s.lines().next().unwrap_or_default();
    if line.chars().count() > 100 {
        let cut: String = line.chars().take(99).collect();
        format!("{cut}\u{2026}")
    } else {
        line.to_string()
    }
}
