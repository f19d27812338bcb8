//! End-to-end integration tests for docx2pdf.
//!
//! The service is driven against fake backends written as `sh` one-liners,
//! so these run anywhere with a POSIX shell. Each test uses its own temp
//! directory as the workspace root and checks it is empty afterwards.
//!
//! A real-backend smoke test is gated behind `E2E_ENABLED`:
//!   E2E_ENABLED=1 cargo test --test e2e real_backend -- --nocapture

#![cfg(unix)]

use docx2pdf::{
    convert_stream, BackendDescriptor, ConversionConfig, ConvertOptions, Converter, Docx2PdfError,
    ErrorKind,
};
use futures::StreamExt;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// A structurally valid, minimal DOCX package.
fn minimal_docx() -> Vec<u8> {
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#,
    )
    .unwrap();

    zip.start_file("_rels/.rels", options).unwrap();
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#,
    )
    .unwrap();

    zip.start_file("word/document.xml", options).unwrap();
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body><w:p><w:r><w:t>Hello, PDF.</w:t></w:r></w:p></w:body>
</w:document>"#,
    )
    .unwrap();

    zip.finish().unwrap().into_inner()
}

/// Tagged payload that passes validation; the tag is the last word.
fn tagged_payload(tag: &str) -> Vec<u8> {
    let mut p = b"PK\x03\x04 ".to_vec();
    p.extend_from_slice(tag.as_bytes());
    p.push(b'\n');
    p
}

/// Backend running `script` under `sh -c`, with `$1` = input, `$2` = output.
fn sh_backend(script: &str) -> BackendDescriptor {
    BackendDescriptor::command("sh", ["-c", script, "backend", "{input}", "{output}"])
}

/// Route library logs to the test harness; `RUST_LOG=docx2pdf=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn converter(root: &Path, concurrency: usize, timeout_ms: u64, script: &str) -> Converter {
    init_tracing();
    let config = ConversionConfig::builder()
        .temp_dir(root)
        .concurrency(concurrency)
        .timeout_ms(timeout_ms)
        .build()
        .unwrap();
    Converter::with_backend(config, sh_backend(script))
}

fn assert_no_workspaces(root: &Path) {
    let left: Vec<_> = std::fs::read_dir(root)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name())
        .collect();
    assert!(left.is_empty(), "workspaces left behind: {left:?}");
}

const PDF_SCRIPT: &str = "printf '%%PDF-1.4\\n%%fake\\n' > \"$2\"";

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn minimal_docx_converts_to_pdf() {
    let root = tempfile::tempdir().unwrap();
    let c = converter(root.path(), 2, 5_000, PDF_SCRIPT);

    let pdf = assert_ok!(c.convert(minimal_docx()).await);
    assert!(pdf.starts_with(b"%PDF-"), "got {:?}", &pdf[..pdf.len().min(16)]);
    assert_no_workspaces(root.path());
    assert_eq!(c.cleanup_failures(), 0);
}

#[tokio::test]
async fn backend_sees_the_exact_input_bytes() {
    let root = tempfile::tempdir().unwrap();
    let c = converter(root.path(), 1, 5_000, "cp \"$1\" \"$2\"");

    let docx = minimal_docx();
    let echoed = assert_ok!(c.convert(docx.clone()).await);
    assert_eq!(echoed, docx);
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn twenty_mib_is_rejected_immediately() {
    let root = tempfile::tempdir().unwrap();
    let c = converter(root.path(), 2, 5_000, PDF_SCRIPT);

    let mut big = vec![0u8; 20 * 1024 * 1024];
    big[..4].copy_from_slice(b"PK\x03\x04");

    let started = Instant::now();
    let err = assert_err!(c.convert(big).await);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(
        err,
        Docx2PdfError::TooLarge {
            len: 20_971_520,
            max: 15_728_640
        }
    ));
    assert_no_workspaces(root.path());
}

#[tokio::test]
async fn invalid_input_spawns_nothing() {
    let root = tempfile::tempdir().unwrap();
    let marker_dir = tempfile::tempdir().unwrap();
    let marker = marker_dir.path().join("spawned");
    let c = converter(
        root.path(),
        2,
        5_000,
        &format!("touch '{}'; {PDF_SCRIPT}", marker.display()),
    );

    for bad in [Vec::new(), b"PK".to_vec(), b"%PDF-1.7 not a docx".to_vec()] {
        let err = assert_err!(c.convert(bad).await);
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
    assert!(!marker.exists());
    assert_no_workspaces(root.path());
}

// ── Backend failures ─────────────────────────────────────────────────────────

#[tokio::test]
async fn non_zero_exit_is_conversion_failure() {
    let root = tempfile::tempdir().unwrap();
    let c = converter(root.path(), 2, 5_000, "exit 1");

    let err = assert_err!(c.convert(minimal_docx()).await);
    assert!(matches!(
        err,
        Docx2PdfError::ConversionFailed { code: Some(1), .. }
    ));
    assert_eq!(err.to_string(), "Conversion failed with code 1");
    assert_no_workspaces(root.path());
}

#[tokio::test]
async fn success_without_output_is_output_missing() {
    let root = tempfile::tempdir().unwrap();
    let c = converter(root.path(), 2, 5_000, "exit 0");

    let err = assert_err!(c.convert(minimal_docx()).await);
    assert!(matches!(err, Docx2PdfError::OutputMissing { .. }));
    assert_eq!(err.kind(), ErrorKind::Resource);
    assert_no_workspaces(root.path());
}

#[tokio::test]
async fn missing_backend_is_launch_failure() {
    let root = tempfile::tempdir().unwrap();
    let config = ConversionConfig::builder()
        .temp_dir(root.path())
        .build()
        .unwrap();
    let c = Converter::with_backend(config, BackendDescriptor::script("/nonexistent/convert"));

    let err = assert_err!(c.convert(minimal_docx()).await);
    assert!(matches!(err, Docx2PdfError::LaunchFailed { .. }));
    assert_no_workspaces(root.path());
}

#[tokio::test]
async fn hung_backend_times_out_and_is_cleaned_up() {
    let root = tempfile::tempdir().unwrap();
    let c = converter(root.path(), 2, 300, "exec sleep 30");

    let started = Instant::now();
    let err = assert_err!(c.convert(minimal_docx()).await);
    let elapsed = started.elapsed();

    assert!(matches!(err, Docx2PdfError::Timeout { timeout_ms: 300 }));
    assert!(err.is_retryable());
    assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    assert_no_workspaces(root.path());
}

#[tokio::test]
async fn background_work_does_not_outlive_a_successful_conversion() {
    let root = tempfile::tempdir().unwrap();
    let marker_dir = tempfile::tempdir().unwrap();
    let marker = marker_dir.path().join("late");
    let script = format!(
        "(sleep 1; touch '{}') & {PDF_SCRIPT}; exit 0",
        marker.display()
    );
    let c = converter(root.path(), 1, 5_000, &script);

    let pdf = assert_ok!(c.convert(minimal_docx()).await);
    assert!(pdf.starts_with(b"%PDF-"));
    assert_no_workspaces(root.path());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "backend's background child survived");
}

#[tokio::test]
async fn per_call_timeout_overrides_default() {
    let root = tempfile::tempdir().unwrap();
    let c = converter(root.path(), 1, 60_000, "exec sleep 30");

    let opts = ConvertOptions::new().timeout_ms(200);
    let err = assert_err!(c.convert_with(minimal_docx(), &opts).await);
    assert!(matches!(err, Docx2PdfError::Timeout { timeout_ms: 200 }));
}

// ── Scheduling ───────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn five_jobs_limit_two_never_exceed_two_alive() {
    let root = tempfile::tempdir().unwrap();
    let alive = tempfile::tempdir().unwrap();
    let script = format!(
        "touch '{dir}/'$$; sleep 0.3; rm -f '{dir}/'$$; {PDF_SCRIPT}",
        dir = alive.path().display()
    );
    let c = converter(root.path(), 2, 10_000, &script);

    // Sample the number of live backends while the batch runs.
    let peak = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let sampler = {
        let (peak, done) = (Arc::clone(&peak), Arc::clone(&done));
        let dir = alive.path().to_path_buf();
        tokio::spawn(async move {
            while !done.load(Ordering::SeqCst) {
                let n = std::fs::read_dir(&dir).map(|d| d.count()).unwrap_or(0);
                peak.fetch_max(n, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
    };

    let payloads: Vec<Vec<u8>> = (0..5).map(|_| minimal_docx()).collect();
    let outcomes: Vec<_> = convert_stream(&c, payloads, &ConvertOptions::new())
        .collect()
        .await;
    done.store(true, Ordering::SeqCst);
    sampler.await.unwrap();

    assert_eq!(outcomes.len(), 5);
    for o in &outcomes {
        assert!(o.result.is_ok(), "job #{} failed: {:?}", o.index, o.result);
    }
    let peak = peak.load(Ordering::SeqCst);
    assert_eq!(peak, 2, "expected exactly two live backends at the peak");
    assert_eq!(c.scheduler().snapshot().running, 0);
    assert_no_workspaces(root.path());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn limit_one_runs_in_submission_order() {
    let root = tempfile::tempdir().unwrap();
    let log_dir = tempfile::tempdir().unwrap();
    let log = log_dir.path().join("order.log");
    let script = format!(
        "tail -n 1 \"$1\" >> '{}'; {PDF_SCRIPT}",
        log.display()
    );
    let c = converter(root.path(), 1, 10_000, &script);

    let handles: Vec<_> = (0..5)
        .map(|i| {
            c.submit(tagged_payload(&format!("job{i}")), &ConvertOptions::new())
                .unwrap()
        })
        .collect();
    for h in handles {
        assert_ok!(h.await);
    }

    let raw = std::fs::read(&log).unwrap();
    let order: Vec<String> = String::from_utf8_lossy(&raw)
        .lines()
        .filter_map(|l| l.split_whitespace().last().map(str::to_string))
        .collect();
    assert_eq!(order, ["job0", "job1", "job2", "job3", "job4"]);
}

#[tokio::test]
async fn failure_does_not_stall_the_queue() {
    let root = tempfile::tempdir().unwrap();
    // Fails for payloads tagged "bad", succeeds otherwise.
    let script = format!("grep -q bad \"$1\" && exit 7; {PDF_SCRIPT}");
    let c = converter(root.path(), 1, 5_000, &script);

    let bad = c.submit(tagged_payload("bad"), &ConvertOptions::new()).unwrap();
    let good = c.submit(tagged_payload("good"), &ConvertOptions::new()).unwrap();

    let err = assert_err!(bad.await);
    assert!(matches!(err, Docx2PdfError::ConversionFailed { code: Some(7), .. }));
    assert_ok!(good.await);
    assert_no_workspaces(root.path());
}

#[tokio::test]
async fn converter_clones_share_one_queue() {
    let root = tempfile::tempdir().unwrap();
    let c = converter(root.path(), 1, 5_000, "sleep 0.2; printf '%%PDF' > \"$2\"");
    let other = c.clone();

    let a = c.submit(minimal_docx(), &ConvertOptions::new()).unwrap();
    let b = other.submit(minimal_docx(), &ConvertOptions::new()).unwrap();

    let snap = c.scheduler().snapshot();
    assert_eq!(snap.running, 1);
    assert_eq!(snap.queued, 1);

    assert_ok!(a.await);
    assert_ok!(b.await);
}

// ── Real backend ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn real_backend_smoke() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP: set E2E_ENABLED=1 to run against the platform backend");
        return;
    }
    let config = ConversionConfig::builder()
        .timeout_ms(120_000)
        .build()
        .unwrap();
    let c = Converter::new(config).expect("no backend for this platform");
    let pdf = assert_ok!(c.convert(minimal_docx()).await);
    assert!(pdf.starts_with(b"%PDF-"));
}
