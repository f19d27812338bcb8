//! Input validation: decide whether a buffer is worth converting.
//!
//! ## Why only the magic bytes?
//!
//! A DOCX is a ZIP container, and every ZIP produced by Word, LibreOffice or
//! any sane writer starts with a local-file-header signature. Parsing the
//! central directory would mean trusting sizes and offsets written by the
//! uploader; the backend does that parsing in its own process. The cheap
//! checks here exist so garbage never reaches the disk or a child process.
//!
//! The order of checks is fixed so callers get a stable error for a given
//! buffer: empty, then too large, then too small, then wrong signature.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Docx2PdfError;

/// ZIP local-file-header signature, `PK\x03\x04`.
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Accept or reject `buffer` as a DOCX no larger than `max_bytes`.
pub fn validate_docx(buffer: &[u8], max_bytes: u64) -> Result<(), Docx2PdfError> {
    if buffer.is_empty() {
        return Err(Docx2PdfError::EmptyInput);
    }

    let len = buffer.len() as u64;
    if len > max_bytes {
        return Err(Docx2PdfError::TooLarge {
            len,
            max: max_bytes,
        });
    }

    let Some(head) = buffer.get(..4) else {
        return Err(Docx2PdfError::TooSmall { len: buffer.len() });
    };

    if head != ZIP_MAGIC {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(head);
        return Err(Docx2PdfError::NotADocx { magic });
    }

    Ok(())
}

/// Read a DOCX from disk and validate it.
///
/// The file's size is checked against `max_bytes` from its metadata before
/// any of it is read, so an oversized file is never pulled into memory.
pub async fn load_docx(path: &Path, max_bytes: u64) -> Result<Vec<u8>, Docx2PdfError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| map_read_error(path, e))?;

    if !meta.is_file() {
        return Err(Docx2PdfError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    if meta.len() > max_bytes {
        return Err(Docx2PdfError::TooLarge {
            len: meta.len(),
            max: max_bytes,
        });
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| map_read_error(path, e))?;
    validate_docx(&bytes, max_bytes)?;

    debug!("Loaded DOCX: {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

fn map_read_error(path: &Path, e: std::io::Error) -> Docx2PdfError {
    let path: PathBuf = path.to_path_buf();
    match e.kind() {
        IoErrorKind::NotFound => Docx2PdfError::FileNotFound { path },
        IoErrorKind::PermissionDenied => Docx2PdfError::PermissionDenied { path },
        _ => Docx2PdfError::ReadFailed { path, source: e },
    }
}
