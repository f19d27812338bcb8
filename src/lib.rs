//! # docx2pdf
//!
//! Convert DOCX documents to PDF through an external backend (Microsoft Word
//! or headless LibreOffice), with bounded concurrency, hard timeouts, and
//! per-job scratch directories.
//!
//! ## Why this crate?
//!
//! The backends that render Word documents faithfully are desktop
//! applications. They are slow to start, often single-instance, and
//! occasionally hang forever on a malformed file. Calling them directly from
//! a request handler invites overload, zombie processes, and `/tmp` filling
//! with orphaned files. This crate puts a small, strict orchestration layer
//! in front of them:
//!
//! * a FIFO queue that never lets more than `concurrency` backends run,
//! * a wall-clock deadline that kills the backend's whole process tree,
//! * a private workspace per job that is removed on every exit path,
//! * validation that rejects garbage before it touches disk.
//!
//! ## Pipeline Overview
//!
//! ```text
//! DOCX bytes
//!  │
//!  ├─ 1. Validate   size limit + ZIP signature, synchronous
//!  ├─ 2. Queue      FIFO admission, at most `concurrency` running
//!  ├─ 3. Workspace  private temp dir with input.docx (0600)
//!  ├─ 4. Backend    Word / AppleScript / unoconv under a deadline
//!  ├─ 5. Output     read output.pdf, reject missing or empty
//!  └─ 6. Release    remove the workspace, always
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docx2pdf::{ConversionConfig, Converter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Backend auto-detected: Word on Windows/macOS, unoconv on Linux
//!     let config = ConversionConfig::builder().apply_env().build()?;
//!     let converter = Converter::new(config)?;
//!
//!     let pdf = converter.convert(std::fs::read("report.docx")?).await?;
//!     std::fs::write("report.pdf", pdf)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docx2pdf` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docx2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ConversionRequest, ConvertOptions};
pub use convert::{write_output, Converter};
pub use docx2pdf_backends::{BackendDescriptor, BackendKind, Invocation};
pub use error::{Docx2PdfError, ErrorKind};
pub use pipeline::media::{extract_images, extract_images_from_file};
pub use pipeline::validate::{load_docx, validate_docx};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use scheduler::{JobHandle, JobId, JobScheduler, SchedulerSnapshot};
pub use stream::{convert_stream, convert_stream_paths, JobOutcome, JobStream};

/// Version of this library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
