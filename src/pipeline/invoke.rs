//! Backend invocation: run one conversion process under a deadline.
//!
//! ## Why kill the process group?
//!
//! Backends are rarely a single process. `sh convert.sh` starts
//! `osascript`, `unoconv` talks to a `soffice` listener it may have spawned,
//! PowerShell hosts Word over COM. Killing only the direct child on timeout
//! leaves the grandchildren running and still holding the workspace open.
//! On Unix the child is started as the leader of a fresh process group so the
//! whole tree can be sent `SIGKILL` at once. The group is killed on every
//! return path, including a clean exit: anything the backend forked and left
//! running would otherwise outlive its workspace and escape the concurrency
//! limit.
//!
//! Stdio is detached. A grandchild that inherits a pipe would keep it open
//! after the child exits and stall any reader waiting for EOF.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use docx2pdf_backends::Invocation;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::Docx2PdfError;

/// Run `invocation` to completion or until `timeout` elapses.
///
/// Exactly one process is spawned. On every return path the child has been
/// reaped, its process group killed and the timer dropped.
pub async fn run_backend(invocation: &Invocation, timeout: Duration) -> Result<(), Docx2PdfError> {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|source| Docx2PdfError::LaunchFailed {
        program: invocation.program.clone(),
        source,
    })?;
    // `Child::id` is gone once the child is reaped; the group outlives it.
    let pgid = child.id();
    debug!(
        "Spawned backend {} (pid {:?}) with {} args",
        invocation.program.display(),
        pgid,
        invocation.args.len()
    );

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(
                "Backend exited with {} after {:?}",
                status,
                started.elapsed()
            );
            kill_group(pgid);
            exit_result(status)
        }
        Ok(Err(e)) => {
            kill_tree(&mut child, pgid).await;
            Err(Docx2PdfError::Internal(format!(
                "failed to wait for backend: {e}"
            )))
        }
        Err(_) => {
            warn!(
                "Backend {} exceeded {}ms, killing",
                invocation.program.display(),
                timeout.as_millis()
            );
            kill_tree(&mut child, pgid).await;
            Err(Docx2PdfError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

fn exit_result(status: ExitStatus) -> Result<(), Docx2PdfError> {
    if status.success() {
        return Ok(());
    }

    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    Err(Docx2PdfError::ConversionFailed {
        code: status.code(),
        signal,
    })
}

/// SIGKILL the backend's process group. An empty group is not an error.
#[cfg(unix)]
fn kill_group(pgid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pgid.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    // The child leads its own group, so its pid is the group id.
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) => debug!("Killed backend process group {pgid}"),
        Err(Errno::ESRCH) => {}
        Err(e) => debug!("killpg({pgid}) failed: {e}"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: Option<u32>) {}

/// Kill the process group, then kill and reap the child itself.
async fn kill_tree(child: &mut Child, pgid: Option<u32>) {
    kill_group(pgid);
    if let Err(e) = child.kill().await {
        debug!("Failed to kill backend child: {e}");
    }
}
