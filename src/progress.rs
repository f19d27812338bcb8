//! Progress-callback trait for job lifecycle events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to observe
//! every job the [`crate::Converter`] runs: admission to the queue, start of
//! the backend, completion, failure, and workspaces that could not be removed.
//!
//! # Why callbacks instead of channels?
//!
//! Same reasoning as a log sink: the host decides whether events go to a
//! progress bar, a metrics counter or a database row. The trait is
//! `Send + Sync` because events fire from whichever Tokio worker is running
//! the job.
//!
//! # Example
//!
//! ```rust
//! use docx2pdf::{ConversionProgressCallback, ConversionConfig, JobId};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_job_complete(&self, job: JobId, pdf_len: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{job} done ({pdf_len} bytes), {done} so far");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: AtomicUsize::new(0),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::error::Docx2PdfError;
use crate::scheduler::JobId;

/// Called by the converter as each job moves through its lifecycle.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// With a concurrency limit above one, `on_job_start`, `on_job_complete` and
/// `on_job_error` for different jobs may run at the same time on different
/// threads. Protect shared mutable state accordingly.
pub trait ConversionProgressCallback: Send + Sync {
    /// A validated payload was placed on the queue.
    fn on_job_queued(&self, job: JobId, payload_len: usize) {
        let _ = (job, payload_len);
    }

    /// The job was admitted and its backend is about to run.
    fn on_job_start(&self, job: JobId) {
        let _ = job;
    }

    /// The job produced a PDF of `pdf_len` bytes.
    fn on_job_complete(&self, job: JobId, pdf_len: usize) {
        let _ = (job, pdf_len);
    }

    /// The job failed after admission.
    fn on_job_error(&self, job: JobId, error: &Docx2PdfError) {
        let _ = (job, error);
    }

    /// The job's workspace at `path` could not be removed.
    fn on_cleanup_failed(&self, job: JobId, path: &Path, error: &std::io::Error) {
        let _ = (job, path, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// Leaving the config's callback unset skips event dispatch entirely; use
/// this where a [`ProgressCallback`] value is required anyway.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
