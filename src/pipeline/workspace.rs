//! Per-job temporary workspace.
//!
//! ## Why a directory per job?
//!
//! Backends write their output next to paths we choose, and some (Word in
//! particular) drop lock files and autosave artefacts beside the input. A
//! private directory per job means two concurrent jobs can never see each
//! other's files, and removing one directory removes everything a backend
//! left behind.
//!
//! The directory is a [`TempDir`], so a job that unwinds before
//! [`Workspace::release`] still gets its directory removed on drop. The
//! explicit `release` exists so removal happens off the async workers and
//! failures are observable instead of silently swallowed by `Drop`.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::Docx2PdfError;

/// Prefix of every workspace directory name.
pub const WORKSPACE_PREFIX: &str = "docx2pdf-";
/// File name the input document is written to.
pub const INPUT_FILE_NAME: &str = "input.docx";
/// File name the backend is told to write.
pub const OUTPUT_FILE_NAME: &str = "output.pdf";

/// Removes a workspace directory; [`TempDir::close`] outside of tests.
pub(crate) type Remover = fn(TempDir) -> std::io::Result<()>;

/// One job's private directory plus the two paths inside it.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl Workspace {
    /// Create a fresh `docx2pdf-XXXXXX` directory under `root`.
    ///
    /// The name is random and the directory is created exclusively (owner-only
    /// on Unix); on a name collision creation is retried with a new name.
    /// Creation runs on the blocking pool.
    pub async fn acquire(root: &Path) -> Result<Self, Docx2PdfError> {
        let root = root.to_path_buf();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(WORKSPACE_PREFIX)
                .tempdir_in(&root)
        })
        .await
        .unwrap_or_else(|join| Err(std::io::Error::other(join.to_string())))
        .map_err(|source| Docx2PdfError::WorkspaceFailed { source })?;

        let input = dir.path().join(INPUT_FILE_NAME);
        let output = dir.path().join(OUTPUT_FILE_NAME);
        debug!("Acquired workspace {}", dir.path().display());

        Ok(Self { dir, input, output })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Write the payload to `input.docx`, readable by the owner only.
    pub async fn write_input(&self, bytes: &[u8]) -> Result<(), Docx2PdfError> {
        let map = |source| Docx2PdfError::InputWriteFailed {
            path: self.input.clone(),
            source,
        };

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.input).await.map_err(map)?;
        file.write_all(bytes).await.map_err(map)?;
        file.flush().await.map_err(map)?;
        Ok(())
    }

    /// Read what the backend wrote to `output.pdf`.
    pub async fn read_output(&self) -> Result<Vec<u8>, Docx2PdfError> {
        let bytes = tokio::fs::read(&self.output)
            .await
            .map_err(|source| Docx2PdfError::OutputMissing {
                path: self.output.clone(),
                source,
            })?;

        if bytes.is_empty() {
            return Err(Docx2PdfError::EmptyOutput {
                path: self.output.clone(),
            });
        }
        Ok(bytes)
    }

    /// Remove the directory and everything in it.
    ///
    /// Runs on the blocking pool. A directory that is already gone counts as
    /// removed. Other failures are logged and returned for the caller to
    /// report; they never affect the job's result.
    pub async fn release(self) -> Result<(), (PathBuf, std::io::Error)> {
        self.release_with(TempDir::close).await
    }

    /// [`Workspace::release`] with a caller-chosen removal step.
    pub(crate) async fn release_with(
        self,
        remove: Remover,
    ) -> Result<(), (PathBuf, std::io::Error)> {
        let path = self.dir.path().to_path_buf();
        let dir = self.dir;

        let outcome = tokio::task::spawn_blocking(move || remove(dir))
            .await
            .unwrap_or_else(|join| Err(std::io::Error::other(join.to_string())));

        match outcome {
            Ok(()) => {
                debug!("Released workspace {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to remove workspace {}: {}", path.display(), e);
                Err((path, e))
            }
        }
    }
}
