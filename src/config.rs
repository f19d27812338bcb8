//! Configuration types for DOCX-to-PDF conversion.
//!
//! Service-wide behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Per-call overrides (a stricter size
//! limit, a longer timeout for one known-heavy document) go through
//! [`ConvertOptions`]; the two are merged into an immutable
//! [`ConversionRequest`] owned by the job.
//!
//! # Environment
//!
//! [`ConversionConfigBuilder::apply_env`] reads:
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `MAX_DOCX_BYTES` | `max_bytes` | 15 MiB |
//! | `DOCX2PDF_CONCURRENCY` | `concurrency` | 2 |
//! | `DOCX2PDF_TIMEOUT_MS` | `timeout_ms` | 60 000 |
//! | `DOCX2PDF_KEEP_ACTIVE` | `keep_active` | false |
//! | `DOCX2PDF_TEMP_DIR` | `temp_dir` | system temp dir |

use crate::error::Docx2PdfError;
use crate::progress::ProgressCallback;
use docx2pdf_backends::BackendDescriptor;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Default maximum accepted payload: 15 MiB.
pub const DEFAULT_MAX_BYTES: u64 = 15 * 1024 * 1024;
/// Default backend wall-clock timeout: 60 s.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
/// Default number of backend processes allowed to run at once.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Configuration for a [`crate::Converter`].
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use docx2pdf::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .concurrency(4)
///     .timeout_ms(30_000)
///     .max_bytes(5 * 1024 * 1024)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Largest payload accepted, in bytes. Default: 15 MiB.
    ///
    /// Checked before anything touches the disk or spawns a process.
    pub max_bytes: u64,

    /// Backend processes allowed to run concurrently. Default: 2.
    ///
    /// Word and LibreOffice are heavyweight and often single-instance; more
    /// than a handful of parallel conversions tends to slow every job down.
    /// Fixed for the lifetime of the [`crate::Converter`].
    pub concurrency: usize,

    /// Wall-clock limit for one backend run, in milliseconds. Default: 60 000.
    pub timeout_ms: u64,

    /// Ask script backends to leave the host application running after the
    /// conversion. Default: false.
    pub keep_active: bool,

    /// Directory under which per-job workspaces are created.
    /// If None, uses the system temp directory.
    pub temp_dir: Option<PathBuf>,

    /// Backend to run. If None, detected from the platform at
    /// [`crate::Converter::new`].
    pub backend: Option<BackendDescriptor>,

    /// Receives job lifecycle events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            concurrency: DEFAULT_CONCURRENCY,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            keep_active: false,
            temp_dir: None,
            backend: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("max_bytes", &self.max_bytes)
            .field("concurrency", &self.concurrency)
            .field("timeout_ms", &self.timeout_ms)
            .field("keep_active", &self.keep_active)
            .field("temp_dir", &self.temp_dir)
            .field("backend", &self.backend)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn max_bytes(mut self, n: u64) -> Self {
        self.config.max_bytes = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    pub fn keep_active(mut self, v: bool) -> Self {
        self.config.keep_active = v;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn backend(mut self, backend: BackendDescriptor) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Apply the `MAX_DOCX_BYTES` / `DOCX2PDF_*` environment variables.
    ///
    /// Missing variables leave the current value alone; unparsable or zero
    /// values are logged and ignored.
    pub fn apply_env(self) -> Self {
        self.apply_lookup(|key| std::env::var(key).ok())
    }

    fn apply_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(n) = positive_number::<u64>(&lookup, "MAX_DOCX_BYTES") {
            self.config.max_bytes = n;
        }
        if let Some(n) = positive_number::<usize>(&lookup, "DOCX2PDF_CONCURRENCY") {
            self.config.concurrency = n;
        }
        if let Some(n) = positive_number::<u64>(&lookup, "DOCX2PDF_TIMEOUT_MS") {
            self.config.timeout_ms = n;
        }
        if let Some(v) = lookup("DOCX2PDF_KEEP_ACTIVE") {
            match v.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.config.keep_active = true,
                "0" | "false" | "no" | "off" | "" => self.config.keep_active = false,
                other => warn!("Ignoring DOCX2PDF_KEEP_ACTIVE={other:?}: expected true/false"),
            }
        }
        if let Some(dir) = lookup("DOCX2PDF_TEMP_DIR").filter(|d| !d.trim().is_empty()) {
            self.config.temp_dir = Some(PathBuf::from(dir));
        }
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Docx2PdfError> {
        let c = &self.config;
        if c.max_bytes < 4 {
            return Err(Docx2PdfError::InvalidConfig(format!(
                "max_bytes must be ≥ 4, got {}",
                c.max_bytes
            )));
        }
        if c.concurrency == 0 {
            return Err(Docx2PdfError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.timeout_ms == 0 {
            return Err(Docx2PdfError::InvalidConfig(
                "timeout_ms must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

fn positive_number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(n) if n != T::default() => Some(n),
        _ => {
            warn!("Ignoring {key}={raw:?}: expected a positive integer");
            None
        }
    }
}

// ── Per-call options ─────────────────────────────────────────────────────

/// Per-call overrides of the service defaults. Unset fields fall back to
/// the [`ConversionConfig`] the converter was built with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Size limit for this payload.
    pub max_bytes: Option<u64>,
    /// Backend timeout for this payload, in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Keep the host application running after this conversion.
    pub keep_active: Option<bool>,
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_bytes(mut self, n: u64) -> Self {
        self.max_bytes = Some(n);
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms.max(1));
        self
    }

    pub fn keep_active(mut self, v: bool) -> Self {
        self.keep_active = Some(v);
        self
    }
}

/// Immutable description of one conversion, owned by its job.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub payload: Vec<u8>,
    pub max_bytes: u64,
    pub timeout: Duration,
    pub keep_active: bool,
}

impl ConversionRequest {
    /// Merge `options` over `config` for `payload`.
    pub fn new(payload: Vec<u8>, config: &ConversionConfig, options: &ConvertOptions) -> Self {
        Self {
            payload,
            max_bytes: options.max_bytes.unwrap_or(config.max_bytes),
            timeout: Duration::from_millis(options.timeout_ms.unwrap_or(config.timeout_ms)),
            keep_active: options.keep_active.unwrap_or(config.keep_active),
        }
    }
}
