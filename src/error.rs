//! Error types for the docx2pdf library.
//!
//! Every failure a caller can observe is a [`Docx2PdfError`]. Each variant
//! belongs to exactly one [`ErrorKind`], which is what callers should branch
//! on when deciding what to do next:
//!
//! * [`ErrorKind::InvalidInput`]: the document itself was rejected. Retrying
//!   the same bytes will fail the same way.
//! * [`ErrorKind::Launch`]: the backend could not be started (missing
//!   executable, unsupported platform). An operator has to fix the host.
//! * [`ErrorKind::Conversion`]: the backend ran and exited non-zero.
//! * [`ErrorKind::Timeout`]: the backend exceeded its deadline and was killed.
//!   Often load-related; the only kind worth retrying with backoff.
//! * [`ErrorKind::Resource`]: workspace allocation, input write, or output
//!   read failed.
//!
//! The library never retries internally.

use std::path::PathBuf;

use docx2pdf_backends::BackendError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors returned by the docx2pdf library.
#[derive(Debug, Error)]
pub enum Docx2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No bytes were received.
    #[error("No file received: the document is empty")]
    EmptyInput,

    /// Payload exceeds the configured size limit.
    #[error("File too large ({len} bytes), max {max}")]
    TooLarge { len: u64, max: u64 },

    /// Payload cannot hold even the ZIP signature.
    #[error("File too small to be a docx ({len} bytes)")]
    TooSmall { len: usize },

    /// The payload does not start with the ZIP local-file-header signature.
    #[error("Invalid DOCX file (not a zip archive). First bytes: {magic:02X?}")]
    NotADocx { magic: [u8; 4] },

    /// Input file was not found at the given path.
    #[error("DOCX file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but reading it failed for another reason.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The ZIP container could not be read.
    #[error("DOCX archive is corrupt: {detail}")]
    CorruptDocx { detail: String },

    // ── Backend errors ────────────────────────────────────────────────────
    /// No conversion backend exists for this operating system.
    #[error("Unsupported platform for conversion: {os}")]
    UnsupportedPlatform { os: String },

    /// The backend could not be prepared (script install, unknown name).
    #[error("Backend setup failed: {0}")]
    BackendSetup(String),

    /// The backend executable could not be spawned.
    #[error("Failed to launch conversion backend '{program}': {source}\nIs it installed and on PATH?")]
    LaunchFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backend ran and exited unsuccessfully.
    #[error("{}", describe_exit(.code, .signal))]
    ConversionFailed {
        code: Option<i32>,
        signal: Option<i32>,
    },

    /// The backend exceeded its deadline and was killed.
    #[error("Conversion timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Resource errors ───────────────────────────────────────────────────
    /// A unique temporary workspace could not be created.
    #[error("Failed to create conversion workspace: {source}")]
    WorkspaceFailed {
        #[source]
        source: std::io::Error,
    },

    /// The input document could not be written into the workspace.
    #[error("Failed to write input file '{path}': {source}")]
    InputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backend exited 0 but left no readable output file.
    #[error("Backend reported success but produced no PDF at '{path}': {source}")]
    OutputMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backend exited 0 but the output file is empty.
    #[error("Backend reported success but '{path}' is empty")]
    EmptyOutput { path: PathBuf },

    /// Could not create or write a caller-requested output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a job task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`Docx2PdfError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The document was rejected before any work was done.
    InvalidInput,
    /// The backend could not be started.
    Launch,
    /// The backend ran and reported failure.
    Conversion,
    /// The backend was killed at its deadline.
    Timeout,
    /// Filesystem resources failed (workspace, input, output).
    Resource,
    /// The configuration is invalid.
    Config,
    /// Anything else.
    Internal,
}

impl Docx2PdfError {
    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput
            | Self::TooLarge { .. }
            | Self::TooSmall { .. }
            | Self::NotADocx { .. }
            | Self::FileNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::CorruptDocx { .. } => ErrorKind::InvalidInput,
            Self::UnsupportedPlatform { .. } | Self::BackendSetup(_) | Self::LaunchFailed { .. } => {
                ErrorKind::Launch
            }
            Self::ConversionFailed { .. } => ErrorKind::Conversion,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ReadFailed { .. }
            | Self::WorkspaceFailed { .. }
            | Self::InputWriteFailed { .. }
            | Self::OutputMissing { .. }
            | Self::EmptyOutput { .. }
            | Self::OutputWriteFailed { .. } => ErrorKind::Resource,
            Self::InvalidConfig(_) => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a caller-side retry (with backoff) is reasonable.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

impl From<BackendError> for Docx2PdfError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::UnsupportedPlatform { os } => Self::UnsupportedPlatform { os },
            other => Self::BackendSetup(other.to_string()),
        }
    }
}

fn describe_exit(code: &Option<i32>, signal: &Option<i32>) -> String {
    let code = code.map_or_else(|| "none".to_string(), |c| c.to_string());
    match signal {
        Some(sig) => format!("Conversion failed with code {code} signal {sig}"),
        None => format!("Conversion failed with code {code}"),
    }
}
