//! The conversion service: validate, queue, run, clean up.
//!
//! ## Why a long-lived `Converter`?
//!
//! The concurrency limit only means something if every conversion in the
//! process goes through the same queue. A [`Converter`] owns that queue plus
//! the resolved backend, and is cheap to clone: hand a clone to every
//! request handler and they all share one FIFO.
//!
//! ## Job lifecycle
//!
//! ```text
//! submit ─▶ validate ─▶ queue ─▶ acquire workspace ─▶ write input
//!                                        │
//!          release workspace ◀─ read output ◀─ run backend
//! ```
//!
//! Validation happens synchronously inside [`Converter::submit`], so a bad
//! payload never occupies a queue slot. Once admitted, the first failure
//! wins and the workspace is released on every path.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use docx2pdf_backends::BackendDescriptor;
use tracing::{debug, info, warn};

use crate::config::{ConversionConfig, ConversionRequest, ConvertOptions};
use crate::error::Docx2PdfError;
use crate::pipeline::workspace::{Remover, Workspace};
use crate::pipeline::{invoke, media, validate};
use crate::scheduler::{JobHandle, JobId, JobScheduler};

struct ConverterInner {
    config: ConversionConfig,
    backend: BackendDescriptor,
    scheduler: JobScheduler,
    temp_root: PathBuf,
    remove_workspace: Remover,
    cleanup_failures: AtomicU64,
}

/// Queue-backed DOCX-to-PDF converter. Clones share one queue.
///
/// # Example
/// ```rust,no_run
/// use docx2pdf::{ConversionConfig, Converter};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let converter = Converter::new(ConversionConfig::default())?;
/// let docx = std::fs::read("report.docx")?;
/// let pdf = converter.convert(docx).await?;
/// std::fs::write("report.pdf", pdf)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Converter {
    inner: Arc<ConverterInner>,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("backend", &self.inner.backend.name())
            .field("temp_root", &self.inner.temp_root)
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

impl Converter {
    /// Build a converter, detecting the backend for this platform unless the
    /// config names one.
    ///
    /// # Errors
    /// [`Docx2PdfError::UnsupportedPlatform`] when no backend exists for this
    /// OS, [`Docx2PdfError::BackendSetup`] when the bundled script cannot be
    /// installed.
    pub fn new(config: ConversionConfig) -> Result<Self, Docx2PdfError> {
        let backend = match config.backend.clone() {
            Some(backend) => backend,
            None => BackendDescriptor::detect()?,
        };
        Ok(Self::with_backend(config, backend))
    }

    /// Build a converter around an explicit backend.
    pub fn with_backend(config: ConversionConfig, backend: BackendDescriptor) -> Self {
        let temp_root = config.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
        info!(
            "Converter ready: backend={}, concurrency={}, timeout={}ms",
            backend.name(),
            config.concurrency,
            config.timeout_ms
        );
        Self {
            inner: Arc::new(ConverterInner {
                scheduler: JobScheduler::new(config.concurrency),
                config,
                backend,
                temp_root,
                remove_workspace: tempfile::TempDir::close,
                cleanup_failures: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.inner.config
    }

    pub fn backend(&self) -> &BackendDescriptor {
        &self.inner.backend
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.inner.scheduler
    }

    /// Number of workspaces that could not be removed since construction.
    pub fn cleanup_failures(&self) -> u64 {
        self.inner.cleanup_failures.load(Ordering::Relaxed)
    }

    /// Validate `payload` and queue it.
    ///
    /// Invalid payloads fail here, without queueing. The returned handle
    /// resolves with the PDF bytes once the job has run.
    pub fn submit(
        &self,
        payload: Vec<u8>,
        options: &ConvertOptions,
    ) -> Result<JobHandle<Vec<u8>>, Docx2PdfError> {
        let request = ConversionRequest::new(payload, &self.inner.config, options);
        validate::validate_docx(&request.payload, request.max_bytes)?;

        let scheduler = &self.inner.scheduler;
        let id = scheduler.next_job_id();
        if let Some(ref cb) = self.inner.config.progress_callback {
            cb.on_job_queued(id, request.payload.len());
        }

        let inner = Arc::clone(&self.inner);
        Ok(scheduler.submit_as(id, move |id| run_job(inner, id, request)))
    }

    /// Convert with the service defaults.
    pub async fn convert(&self, payload: Vec<u8>) -> Result<Vec<u8>, Docx2PdfError> {
        self.convert_with(payload, &ConvertOptions::default()).await
    }

    /// Convert with per-call overrides.
    pub async fn convert_with(
        &self,
        payload: Vec<u8>,
        options: &ConvertOptions,
    ) -> Result<Vec<u8>, Docx2PdfError> {
        self.submit(payload, options)?.await
    }

    /// Read a DOCX from disk and convert it.
    pub async fn convert_path(
        &self,
        path: impl AsRef<Path>,
        options: &ConvertOptions,
    ) -> Result<Vec<u8>, Docx2PdfError> {
        let max = options.max_bytes.unwrap_or(self.inner.config.max_bytes);
        let bytes = validate::load_docx(path.as_ref(), max).await?;
        self.convert_with(bytes, options).await
    }

    /// Convert and write the PDF to `output_path`.
    ///
    /// Returns the number of bytes written. The file appears atomically; a
    /// failed conversion never leaves a partial PDF behind.
    pub async fn convert_to_file(
        &self,
        payload: Vec<u8>,
        output_path: impl AsRef<Path>,
        options: &ConvertOptions,
    ) -> Result<usize, Docx2PdfError> {
        let pdf = self.convert_with(payload, options).await?;
        write_output(output_path.as_ref(), &pdf).await?;
        Ok(pdf.len())
    }

    /// Copy `word/media/*` out of `payload` into `out_dir`, using this
    /// converter's size limit.
    pub async fn extract_images(
        &self,
        payload: Vec<u8>,
        out_dir: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>, Docx2PdfError> {
        media::extract_images(payload, out_dir.as_ref(), self.inner.config.max_bytes).await
    }
}

/// Write `bytes` to `path` atomically (temp file + rename), creating parent
/// directories as needed.
pub async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), Docx2PdfError> {
    let map = |source| Docx2PdfError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(map)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(map)?;

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(map(e));
    }
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

// ── Job body ─────────────────────────────────────────────────────────────

async fn run_job(
    inner: Arc<ConverterInner>,
    id: JobId,
    request: ConversionRequest,
) -> Result<Vec<u8>, Docx2PdfError> {
    let callback = inner.config.progress_callback.clone();
    if let Some(ref cb) = callback {
        cb.on_job_start(id);
    }
    info!("{id} started ({} bytes)", request.payload.len());
    let started = Instant::now();

    let result = execute(&inner, id, &request).await;

    match &result {
        Ok(pdf) => {
            info!(
                "{id} completed in {}ms ({} bytes)",
                started.elapsed().as_millis(),
                pdf.len()
            );
            if let Some(ref cb) = callback {
                cb.on_job_complete(id, pdf.len());
            }
        }
        Err(e) => {
            warn!("{id} failed after {}ms: {e}", started.elapsed().as_millis());
            if let Some(ref cb) = callback {
                cb.on_job_error(id, e);
            }
        }
    }
    result
}

async fn execute(
    inner: &ConverterInner,
    id: JobId,
    request: &ConversionRequest,
) -> Result<Vec<u8>, Docx2PdfError> {
    let workspace = Workspace::acquire(&inner.temp_root).await?;
    debug!("{id} workspace {}", workspace.path().display());

    let result = run_in_workspace(&inner.backend, &workspace, request).await;

    if let Err((path, e)) = workspace.release_with(inner.remove_workspace).await {
        inner.cleanup_failures.fetch_add(1, Ordering::Relaxed);
        if let Some(ref cb) = inner.config.progress_callback {
            cb.on_cleanup_failed(id, &path, &e);
        }
    }
    result
}

async fn run_in_workspace(
    backend: &BackendDescriptor,
    workspace: &Workspace,
    request: &ConversionRequest,
) -> Result<Vec<u8>, Docx2PdfError> {
    workspace.write_input(&request.payload).await?;

    let invocation = backend.build_invocation(
        workspace.input_path(),
        workspace.output_path(),
        request.keep_active,
    );
    invoke::run_backend(&invocation, request.timeout).await?;

    workspace.read_output().await
}
