//! Media extraction: copy embedded images out of a DOCX container.
//!
//! Word stores every embedded picture under `word/media/` inside the ZIP.
//! Extraction needs no backend, so it runs entirely in-process on the
//! blocking pool (`zip` is synchronous).
//!
//! Entry names come from the uploader and are untrusted. Only the final file
//! name component is used, so an entry like `word/media/../../etc/passwd`
//! can never write outside `out_dir`.
//!
//! The decompressed total is capped at the same `max_bytes` that bounds the
//! container, so a small, highly compressed entry cannot fill the disk.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::Docx2PdfError;
use crate::pipeline::validate::{load_docx, validate_docx};

const MEDIA_PREFIX: &str = "word/media/";

/// Write every `word/media/*` file in `bytes` into `out_dir`.
///
/// `out_dir` is created if missing. Returns the written paths in archive
/// order. When two entries share a file name, the later one wins.
///
/// If the media would decompress to more than `max_bytes` in total, fails
/// with [`Docx2PdfError::CorruptDocx`] and removes everything it wrote.
pub async fn extract_images(
    bytes: Vec<u8>,
    out_dir: &Path,
    max_bytes: u64,
) -> Result<Vec<PathBuf>, Docx2PdfError> {
    validate_docx(&bytes, max_bytes)?;

    let out_dir = out_dir.to_path_buf();
    let written = tokio::task::spawn_blocking(move || extract_blocking(&bytes, &out_dir, max_bytes))
        .await
        .map_err(|e| Docx2PdfError::Internal(format!("media extraction task failed: {e}")))??;

    info!("Extracted {} media file(s)", written.len());
    Ok(written)
}

/// [`extract_images`] for a DOCX on disk.
pub async fn extract_images_from_file(
    path: &Path,
    out_dir: &Path,
    max_bytes: u64,
) -> Result<Vec<PathBuf>, Docx2PdfError> {
    let bytes = load_docx(path, max_bytes).await?;
    extract_images(bytes, out_dir, max_bytes).await
}

fn extract_blocking(
    bytes: &[u8],
    out_dir: &Path,
    max_bytes: u64,
) -> Result<Vec<PathBuf>, Docx2PdfError> {
    let mut written = Vec::new();
    let result = extract_into(bytes, out_dir, max_bytes, &mut written);
    if result.is_err() {
        for path in &written {
            if let Err(e) = std::fs::remove_file(path) {
                debug!("Failed to remove {}: {e}", path.display());
            }
        }
    }
    result.map(|()| written)
}

/// Extract into `out_dir`, pushing each created file onto `written` before
/// any bytes go into it.
fn extract_into(
    bytes: &[u8],
    out_dir: &Path,
    max_bytes: u64,
    written: &mut Vec<PathBuf>,
) -> Result<(), Docx2PdfError> {
    let corrupt = |e: zip::result::ZipError| Docx2PdfError::CorruptDocx {
        detail: e.to_string(),
    };
    let write_failed = |path: &Path, source| Docx2PdfError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let over_budget = |name: &str| Docx2PdfError::CorruptDocx {
        detail: format!("{name}: media expands beyond {max_bytes} bytes"),
    };

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(corrupt)?;
    std::fs::create_dir_all(out_dir).map_err(|e| write_failed(out_dir, e))?;

    let mut remaining = max_bytes;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(corrupt)?;
        if !entry.is_file() || !entry.name().starts_with(MEDIA_PREFIX) {
            continue;
        }
        let name = entry.name().to_owned();
        let Some(file_name) = entry
            .enclosed_name()
            .and_then(|p| p.file_name().map(|n| n.to_owned()))
        else {
            debug!("Skipping media entry with unsafe name: {name}");
            continue;
        };
        // Declared sizes are untrusted; the `take` below is the real bound.
        if entry.size() > remaining {
            return Err(over_budget(&name));
        }

        let dest = out_dir.join(file_name);
        let mut out = std::fs::File::create(&dest).map_err(|e| write_failed(&dest, e))?;
        if !written.contains(&dest) {
            written.push(dest.clone());
        }
        let copied = std::io::copy(&mut (&mut entry).take(remaining + 1), &mut out).map_err(
            |e| match e.kind() {
                std::io::ErrorKind::InvalidData => Docx2PdfError::CorruptDocx {
                    detail: format!("{name}: {e}"),
                },
                _ => write_failed(&dest, e),
            },
        )?;
        if copied > remaining {
            return Err(over_budget(&name));
        }
        remaining -= copied;
        debug!("Extracted {name} -> {}", dest.display());
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Build an in-memory ZIP from `(name, contents)` pairs.
    pub(crate) fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    const MAX: u64 = 15 * 1024 * 1024;

    #[tokio::test]
    async fn extracts_only_media_entries() {
        let docx = zip_with(&[
            ("[Content_Types].xml", b"<Types/>"),
            ("word/document.xml", b"<w:document/>"),
            ("word/media/image1.png", b"\x89PNG one"),
            ("word/media/image2.jpeg", b"\xFF\xD8 two"),
        ]);
        let out = tempfile::tempdir().unwrap();

        let written = extract_images(docx, out.path(), MAX).await.unwrap();
        assert_eq!(
            written,
            vec![out.path().join("image1.png"), out.path().join("image2.jpeg")]
        );
        assert_eq!(std::fs::read(&written[0]).unwrap(), b"\x89PNG one");
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn directory_components_are_stripped() {
        let docx = zip_with(&[("word/media/nested/deep/pic.gif", b"GIF89a")]);
        let out = tempfile::tempdir().unwrap();

        let written = extract_images(docx, out.path(), MAX).await.unwrap();
        assert_eq!(written, vec![out.path().join("pic.gif")]);
    }

    #[tokio::test]
    async fn creates_missing_output_directory() {
        let docx = zip_with(&[("word/media/a.png", b"a")]);
        let out = tempfile::tempdir().unwrap();
        let target = out.path().join("images");

        extract_images(docx, &target, MAX).await.unwrap();
        assert!(target.join("a.png").is_file());
    }

    #[tokio::test]
    async fn document_without_media_yields_nothing() {
        let docx = zip_with(&[("word/document.xml", b"<w:document/>")]);
        let out = tempfile::tempdir().unwrap();
        assert!(extract_images(docx, out.path(), MAX).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn truncated_archive_is_corrupt() {
        let mut docx = zip_with(&[("word/media/a.png", b"aaaa")]);
        docx.truncate(12);
        let out = tempfile::tempdir().unwrap();
        assert!(matches!(
            extract_images(docx, out.path(), MAX).await,
            Err(Docx2PdfError::CorruptDocx { .. })
        ));
    }

    #[tokio::test]
    async fn non_docx_is_rejected_before_parsing() {
        let out = tempfile::tempdir().unwrap();
        assert!(matches!(
            extract_images(b"not a zip".to_vec(), out.path(), MAX).await,
            Err(Docx2PdfError::NotADocx { .. })
        ));
    }

    #[tokio::test]
    async fn compressed_bomb_is_rejected_and_cleaned_up() {
        let zeros = vec![0u8; 4 * 1024 * 1024];
        let docx = zip_with(&[
            ("word/media/small.png", b"ok".as_slice()),
            ("word/media/huge.bmp", zeros.as_slice()),
        ]);
        let limit = 1024 * 1024;
        assert!((docx.len() as u64) < limit);
        let out = tempfile::tempdir().unwrap();

        let err = extract_images(docx, out.path(), limit).await.unwrap_err();
        assert!(matches!(err, Docx2PdfError::CorruptDocx { .. }), "{err:?}");
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn budget_spans_all_entries() {
        let chunk = vec![7u8; 600 * 1024];
        let docx = zip_with(&[
            ("word/media/a.bin", chunk.as_slice()),
            ("word/media/b.bin", chunk.as_slice()),
        ]);
        let out = tempfile::tempdir().unwrap();

        assert!(extract_images(docx.clone(), out.path(), 1024 * 1024).await.is_err());
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);

        let written = extract_images(docx, out.path(), 2 * 1024 * 1024).await.unwrap();
        assert_eq!(written.len(), 2);
    }

    #[tokio::test]
    async fn extracts_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.docx");
        std::fs::write(&path, zip_with(&[("word/media/x.png", b"x")])).unwrap();

        let out = dir.path().join("out");
        let written = extract_images_from_file(&path, &out, MAX).await.unwrap();
        assert_eq!(written, vec![out.join("x.png")]);
    }
}
