//! Bounded-concurrency FIFO job queue.
//!
//! A [`JobScheduler`] admits at most `concurrency_limit` jobs at once and
//! starts the rest strictly in submission order as slots free up. The
//! converter uses one to serialise access to the conversion backend, which is
//! typically a single heavyweight desktop application.
//!
//! ## Why not a `Semaphore`?
//!
//! `tokio::sync::Semaphore` is fair, but fairness there is decided when a
//! task first *polls* `acquire()`, not when the caller submits. Two jobs
//! spawned back to back can be polled in either order. Here the queue
//! position is fixed inside [`JobScheduler::submit`] before it returns, so
//! "submitted first" always means "started first".
//!
//! ## Invariants
//!
//! * `running <= concurrency_limit` at every observation.
//! * `running` is decremented exactly once per admitted job, including jobs
//!   that panic: the decrement lives in a drop guard owned by the task.
//! * The scheduler never retries and never inspects job results.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::Docx2PdfError;

/// Process-unique identifier of one submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Point-in-time view of the queue, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerSnapshot {
    pub concurrency_limit: usize,
    pub running: usize,
    pub queued: usize,
}

type QueuedJob = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct SchedulerState {
    running: usize,
    waiting: VecDeque<QueuedJob>,
}

struct Inner {
    limit: usize,
    next_id: AtomicU64,
    state: Mutex<SchedulerState>,
}

impl Inner {
    // Jobs run outside the lock, so a poisoned mutex still holds consistent counters.
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared handle to one FIFO queue. Cloning is cheap and every clone feeds
/// the same queue.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobScheduler")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl JobScheduler {
    /// Create a scheduler admitting at most `concurrency_limit` jobs at once
    /// (clamped to at least 1).
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                limit: concurrency_limit.max(1),
                next_id: AtomicU64::new(1),
                state: Mutex::new(SchedulerState {
                    running: 0,
                    waiting: VecDeque::new(),
                }),
            }),
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.inner.limit
    }

    /// Reserve the next job id without submitting anything.
    pub fn next_job_id(&self) -> JobId {
        JobId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Queue `task` under a fresh [`JobId`].
    ///
    /// See [`JobScheduler::submit_as`].
    pub fn submit<T, F, Fut>(&self, task: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(JobId) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Docx2PdfError>> + Send + 'static,
    {
        let id = self.next_job_id();
        self.submit_as(id, task)
    }

    /// Queue `task` under `id`.
    ///
    /// The queue position is fixed before this returns. `task` is not called
    /// until the job is admitted; it then runs on the current Tokio runtime.
    /// Dropping the returned handle does not cancel the job.
    pub fn submit_as<T, F, Fut>(&self, id: JobId, task: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(JobId) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Docx2PdfError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: QueuedJob = Box::new(move || {
            async move {
                let result = task(id).await;
                // The caller may have dropped its handle; the job still ran.
                let _ = tx.send(result);
            }
            .boxed()
        });

        let queued = {
            let mut state = self.inner.lock();
            state.waiting.push_back(job);
            state.waiting.len()
        };
        debug!("{id} queued (position {queued})");

        dispatch(&self.inner);
        JobHandle { id, rx }
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let state = self.inner.lock();
        SchedulerSnapshot {
            concurrency_limit: self.inner.limit,
            running: state.running,
            queued: state.waiting.len(),
        }
    }
}

/// Admit queued jobs while slots are free.
fn dispatch(inner: &Arc<Inner>) {
    let Ok(runtime) = Handle::try_current() else {
        warn!("JobScheduler used outside a Tokio runtime; jobs stay queued");
        return;
    };

    loop {
        let job = {
            let mut state = inner.lock();
            if state.running >= inner.limit {
                return;
            }
            let Some(job) = state.waiting.pop_front() else {
                return;
            };
            state.running += 1;
            job
        };

        let slot = RunningSlot {
            inner: Arc::clone(inner),
        };
        runtime.spawn(async move {
            let _slot = slot;
            job().await;
        });
    }
}

/// Frees one running slot when the job's task ends, however it ends.
struct RunningSlot {
    inner: Arc<Inner>,
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        {
            let mut state = self.inner.lock();
            state.running = state.running.saturating_sub(1);
        }
        dispatch(&self.inner);
    }
}

// ── Completion handle ────────────────────────────────────────────────────

/// Resolves exactly once with the job's result.
///
/// If the job's task panics, resolves with [`Docx2PdfError::Internal`].
#[must_use = "dropping a JobHandle discards the job's result"]
pub struct JobHandle<T> {
    id: JobId,
    rx: oneshot::Receiver<Result<T, Docx2PdfError>>,
}

impl<T> JobHandle<T> {
    pub fn id(&self) -> JobId {
        self.id
    }
}

impl<T> fmt::Debug for JobHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle").field("id", &self.id).finish()
    }
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, Docx2PdfError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let id = this.id;
        Pin::new(&mut this.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(Docx2PdfError::Internal(format!(
                    "{id} aborted before producing a result"
                )))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_limit_and_reaches_it() {
        let scheduler = JobScheduler::new(2);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                scheduler.submit(move |_| async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.snapshot().running, 0);
        assert_eq!(scheduler.snapshot().queued, 0);
    }

    #[tokio::test]
    async fn limit_one_starts_in_submission_order() {
        let scheduler = JobScheduler::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let order = Arc::clone(&order);
                scheduler.submit(move |_| async move {
                    order.lock().unwrap().push(i);
                    tokio::task::yield_now().await;
                    Ok(i)
                })
            })
            .collect();

        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.await.unwrap(), i);
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failing_job_does_not_block_queue() {
        let scheduler = JobScheduler::new(1);
        let first = scheduler.submit(|_| async {
            Err::<(), _>(Docx2PdfError::ConversionFailed {
                code: Some(1),
                signal: None,
            })
        });
        let second = scheduler.submit(|_| async { Ok("ok") });

        assert!(matches!(
            first.await,
            Err(Docx2PdfError::ConversionFailed { code: Some(1), .. })
        ));
        assert_eq!(second.await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn panicking_job_reports_internal_and_frees_slot() {
        let scheduler = JobScheduler::new(1);
        let boom = scheduler.submit(|_| async {
            if true {
                panic!("backend wrapper exploded");
            }
            Ok(())
        });
        let after = scheduler.submit(|_| async { Ok(42) });

        assert!(matches!(boom.await, Err(Docx2PdfError::Internal(_))));
        assert_eq!(after.await.unwrap(), 42);
        assert_eq!(scheduler.snapshot().running, 0);
    }

    #[tokio::test]
    async fn snapshot_shows_queued_jobs_behind_a_busy_slot() {
        let scheduler = JobScheduler::new(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocker = scheduler.submit(move |_| async move {
            let _ = release_rx.await;
            Ok(())
        });
        let waiter = scheduler.submit(|_| async { Ok(()) });

        let snap = scheduler.snapshot();
        assert_eq!(snap.concurrency_limit, 1);
        assert_eq!(snap.running, 1);
        assert_eq!(snap.queued, 1);

        release_tx.send(()).unwrap();
        blocker.await.unwrap();
        waiter.await.unwrap();
        assert_eq!(scheduler.snapshot().queued, 0);
    }

    #[tokio::test]
    async fn job_ids_are_unique_and_passed_to_task() {
        let scheduler = JobScheduler::new(2);
        let a = scheduler.submit(|id| async move { Ok(id) });
        let b = scheduler.submit(|id| async move { Ok(id) });
        let (a_id, b_id) = (a.id(), b.id());
        assert_ne!(a_id, b_id);
        assert_eq!(a.await.unwrap(), a_id);
        assert_eq!(b.await.unwrap(), b_id);
    }

    #[test]
    fn zero_limit_is_clamped() {
        assert_eq!(JobScheduler::new(0).concurrency_limit(), 1);
        assert_eq!(JobId(3).to_string(), "job-3");
    }
}
