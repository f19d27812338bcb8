//! Pipeline stages for DOCX-to-PDF conversion.
//!
//! Each submodule implements exactly one step of a job. Keeping them apart
//! lets each be tested without a real backend and lets the converter compose
//! them with a single "first failure wins, cleanup always" rule.
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ workspace ──▶ invoke ──▶ workspace
//! (magic/size)  (acquire+write) (backend)  (read+release)
//! ```
//!
//! 1. [`validate`]: reject empty, oversized, or non-ZIP buffers before
//!    anything touches the disk
//! 2. [`workspace`]: one private temp directory per job holding
//!    `input.docx` and `output.pdf`; removed on every exit path
//! 3. [`invoke`]: spawn the backend, enforce the deadline, kill the
//!    whole process group when it elapses
//!
//! [`media`] is a side path: it reads `word/media/*` straight out of the
//! container and never involves a backend.

pub mod invoke;
pub mod media;
pub mod validate;
pub mod workspace;
