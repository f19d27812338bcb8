//! Batch conversion API: submit many documents, receive outcomes as they finish.
//!
//! ## Why stream?
//!
//! A batch of fifty documents through a backend limited to two at a time
//! takes a while. Yielding each outcome as soon as its job finishes lets
//! callers write PDFs to disk incrementally and drive a progress bar,
//! instead of waiting on the slowest document.
//!
//! Every payload is submitted up front, in iteration order, so queue
//! admission follows that order. Outcomes arrive in *completion* order and
//! carry the payload's `index` for correlation.

use std::path::Path;
use std::pin::Pin;

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::FuturesUnordered;
use tokio_stream::Stream;
use tracing::info;

use crate::config::ConvertOptions;
use crate::convert::Converter;
use crate::error::Docx2PdfError;
use crate::pipeline::validate::load_docx;
use crate::scheduler::JobId;

/// Result of one payload in a batch.
#[derive(Debug)]
pub struct JobOutcome {
    /// Position of the payload in the submitted batch.
    pub index: usize,
    /// Scheduler id, `None` if the payload was rejected before queueing.
    pub job_id: Option<JobId>,
    /// PDF bytes or the failure.
    pub result: Result<Vec<u8>, Docx2PdfError>,
}

/// A boxed stream of batch outcomes.
pub type JobStream = Pin<Box<dyn Stream<Item = JobOutcome> + Send>>;

/// Submit every payload to `converter` and stream the outcomes.
///
/// Must be called from within a Tokio runtime. Invalid payloads produce an
/// immediate failed outcome and never occupy a queue slot.
///
/// # Example
/// ```rust,no_run
/// use docx2pdf::{convert_stream, ConversionConfig, ConvertOptions, Converter};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let converter = Converter::new(ConversionConfig::default())?;
/// let docs = vec![std::fs::read("a.docx")?, std::fs::read("b.docx")?];
/// let mut outcomes = convert_stream(&converter, docs, &ConvertOptions::new());
/// while let Some(outcome) = outcomes.next().await {
///     match outcome.result {
///         Ok(pdf) => println!("#{}: {} bytes", outcome.index, pdf.len()),
///         Err(e) => eprintln!("#{}: {e}", outcome.index),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn convert_stream<I>(converter: &Converter, payloads: I, options: &ConvertOptions) -> JobStream
where
    I: IntoIterator<Item = Vec<u8>>,
{
    submit_all(converter, payloads.into_iter().map(Ok), options)
}

/// Read every path, then stream conversions as in [`convert_stream`].
///
/// Files are read sequentially before anything is queued so admission
/// follows `paths` order. Unreadable or invalid files yield failed outcomes.
pub async fn convert_stream_paths<P>(
    converter: &Converter,
    paths: &[P],
    options: &ConvertOptions,
) -> JobStream
where
    P: AsRef<Path>,
{
    let max = options.max_bytes.unwrap_or(converter.config().max_bytes);
    let mut loaded = Vec::with_capacity(paths.len());
    for path in paths {
        loaded.push(load_docx(path.as_ref(), max).await);
    }
    submit_all(converter, loaded, options)
}

fn submit_all<I>(converter: &Converter, payloads: I, options: &ConvertOptions) -> JobStream
where
    I: IntoIterator<Item = Result<Vec<u8>, Docx2PdfError>>,
{
    let pending: FuturesUnordered<BoxFuture<'static, JobOutcome>> = FuturesUnordered::new();

    for (index, payload) in payloads.into_iter().enumerate() {
        match payload.and_then(|bytes| converter.submit(bytes, options)) {
            Ok(handle) => {
                let job_id = handle.id();
                pending.push(
                    async move {
                        JobOutcome {
                            index,
                            job_id: Some(job_id),
                            result: handle.await,
                        }
                    }
                    .boxed(),
                );
            }
            Err(e) => pending.push(
                future::ready(JobOutcome {
                    index,
                    job_id: None,
                    result: Err(e),
                })
                .boxed(),
            ),
        }
    }

    info!("Streaming {} conversion(s)", pending.len());
    Box::pin(pending)
}
