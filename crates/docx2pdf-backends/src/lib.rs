//! # docx2pdf-backends
//!
//! Describes the external programs that actually render a DOCX document into a
//! PDF, and how to invoke them. The orchestration crate (`docx2pdf`) owns the
//! timeout and process-lifecycle discipline; this crate only answers two
//! questions:
//!
//! 1. Which backend style fits this platform? ([`BackendKind::for_os`])
//! 2. What command line runs it against a given input/output pair?
//!    ([`BackendDescriptor::build_invocation`])
//!
//! ## Backend styles
//!
//! | OS      | Style                         | Program                         |
//! |---------|-------------------------------|---------------------------------|
//! | Windows | Word COM automation           | `powershell -File convert.ps1`  |
//! | macOS   | Word via AppleScript          | `sh convert.sh`                 |
//! | Linux   | Headless LibreOffice          | `unoconv -f pdf`                |
//!
//! The two script-driven styles ship their scripts inside this crate. On first
//! use they are written to `~/.cache/docx2pdf/scripts-{VERSION}/` (or the
//! platform equivalent) so the backend has a real path to execute.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docx2pdf_backends::BackendDescriptor;
//! use std::path::Path;
//!
//! let backend = BackendDescriptor::detect().expect("no backend for this platform");
//! let inv = backend.build_invocation(Path::new("in.docx"), Path::new("out.pdf"), false);
//! println!("{} {:?}", inv.program.display(), inv.args);
//! ```
//!
//! ## Environment variable overrides
//!
//! - `DOCX2PDF_SCRIPT_DIR`: directory the bundled scripts are installed into.
//! - `DOCX2PDF_UNOCONV_PATH`: path to the `unoconv` executable.

use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

// ── Public constants ─────────────────────────────────────────────────────────

/// Version tag of the bundled scripts; part of the install directory name so
/// upgrades never run a stale script.
pub const SCRIPTS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Placeholder replaced by the input file path in [`BackendDescriptor::Command`] args.
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder replaced by the output file path in [`BackendDescriptor::Command`] args.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";
/// Placeholder replaced by `true`/`false` in [`BackendDescriptor::Command`] args.
pub const KEEP_ACTIVE_PLACEHOLDER: &str = "{keep_active}";

const MAC_SCRIPT_NAME: &str = "convert.sh";
const WORD_SCRIPT_NAME: &str = "convert.ps1";

static MAC_SCRIPT: &str = include_str!("../scripts/convert.sh");
static WORD_SCRIPT: &str = include_str!("../scripts/convert.ps1");

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned while selecting or preparing a backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// No backend style exists for this operating system.
    #[error("Unsupported platform for conversion: {os}")]
    UnsupportedPlatform { os: String },

    /// A backend name given by configuration is not recognised.
    #[error("Unknown backend '{0}' (expected one of: word, macos, unoconv)")]
    UnknownBackend(String),

    /// Could not create the script install directory.
    #[error("Script directory error at '{path}': {source}")]
    ScriptDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write a bundled script to disk.
    #[error("Failed to install backend script '{path}': {source}")]
    ScriptInstall {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ── Backend kinds ────────────────────────────────────────────────────────────

/// The three supported backend styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Microsoft Word driven over COM from PowerShell (Windows).
    WordAutomation,
    /// Microsoft Word driven over AppleScript from `sh` (macOS).
    MacScript,
    /// LibreOffice through `unoconv` (Linux, headless).
    Headless,
}

impl BackendKind {
    /// Pick the backend style for an OS identifier as reported by
    /// [`std::env::consts::OS`].
    pub fn for_os(os: &str) -> Option<Self> {
        match os {
            "windows" => Some(Self::WordAutomation),
            "macos" => Some(Self::MacScript),
            "linux" => Some(Self::Headless),
            _ => None,
        }
    }

    /// Backend style for the running platform.
    pub fn detect() -> Result<Self, BackendError> {
        let os = std::env::consts::OS;
        Self::for_os(os).ok_or_else(|| BackendError::UnsupportedPlatform { os: os.to_string() })
    }

    /// Short stable name, also accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::WordAutomation => "word",
            Self::MacScript => "macos",
            Self::Headless => "unoconv",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "word" | "windows" | "powershell" => Ok(Self::WordAutomation),
            "macos" | "mac" | "applescript" => Ok(Self::MacScript),
            "unoconv" | "headless" | "linux" | "libreoffice" => Ok(Self::Headless),
            other => Err(BackendError::UnknownBackend(other.to_string())),
        }
    }
}

// ── Descriptor ───────────────────────────────────────────────────────────────

/// A fully resolved backend: everything needed to build a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendDescriptor {
    /// `powershell … -File <script> <input> <output> <keep_active>`
    WordAutomation { powershell: PathBuf, script: PathBuf },
    /// `sh <script> <input> <output> <keep_active>`
    MacScript { shell: PathBuf, script: PathBuf },
    /// `unoconv -f pdf -o <output> <input>`
    Headless { unoconv: PathBuf },
    /// Arbitrary program; `{input}`, `{output}` and `{keep_active}` inside
    /// `args` are substituted per invocation.
    Command { program: PathBuf, args: Vec<String> },
}

/// One concrete process launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable to spawn.
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<OsString>,
}

impl BackendDescriptor {
    /// Resolve the backend for the running platform, installing bundled
    /// scripts if the style needs one.
    pub fn detect() -> Result<Self, BackendError> {
        Self::resolve(BackendKind::detect()?)
    }

    /// Resolve a specific backend style.
    pub fn resolve(kind: BackendKind) -> Result<Self, BackendError> {
        match kind {
            BackendKind::WordAutomation => Ok(Self::WordAutomation {
                powershell: PathBuf::from("powershell"),
                script: ensure_script(kind)?,
            }),
            BackendKind::MacScript => Ok(Self::MacScript {
                shell: PathBuf::from("sh"),
                script: ensure_script(kind)?,
            }),
            BackendKind::Headless => Ok(Self::Headless {
                unoconv: std::env::var_os("DOCX2PDF_UNOCONV_PATH")
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("unoconv")),
            }),
        }
    }

    /// A custom command backend.
    pub fn command<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Command {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// A custom script following the `convert.sh` calling convention:
    /// `<program> <input> <output> <keep_active>`.
    pub fn script(program: impl Into<PathBuf>) -> Self {
        Self::command(
            program,
            [INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER, KEEP_ACTIVE_PLACEHOLDER],
        )
    }

    /// The style this descriptor belongs to; `None` for custom commands.
    pub fn kind(&self) -> Option<BackendKind> {
        match self {
            Self::WordAutomation { .. } => Some(BackendKind::WordAutomation),
            Self::MacScript { .. } => Some(BackendKind::MacScript),
            Self::Headless { .. } => Some(BackendKind::Headless),
            Self::Command { .. } => None,
        }
    }

    /// Human-readable name for logs.
    pub fn name(&self) -> String {
        match self {
            Self::Command { program, .. } => format!("command:{}", program.display()),
            other => other.kind().map(|k| k.name().to_string()).unwrap_or_default(),
        }
    }

    /// Build the command line converting `input` into `output`.
    pub fn build_invocation(&self, input: &Path, output: &Path, keep_active: bool) -> Invocation {
        let flag = if keep_active { "true" } else { "false" };
        match self {
            Self::WordAutomation { powershell, script } => Invocation {
                program: powershell.clone(),
                args: vec![
                    "-NoProfile".into(),
                    "-NonInteractive".into(),
                    "-ExecutionPolicy".into(),
                    "Bypass".into(),
                    "-File".into(),
                    script.clone().into_os_string(),
                    input.as_os_str().to_owned(),
                    output.as_os_str().to_owned(),
                    flag.into(),
                ],
            },
            Self::MacScript { shell, script } => Invocation {
                program: shell.clone(),
                args: vec![
                    script.clone().into_os_string(),
                    input.as_os_str().to_owned(),
                    output.as_os_str().to_owned(),
                    flag.into(),
                ],
            },
            Self::Headless { unoconv } => Invocation {
                program: unoconv.clone(),
                args: vec![
                    "-f".into(),
                    "pdf".into(),
                    "-o".into(),
                    output.as_os_str().to_owned(),
                    input.as_os_str().to_owned(),
                ],
            },
            Self::Command { program, args } => Invocation {
                program: program.clone(),
                args: args
                    .iter()
                    .map(|a| substitute(a, input, output, flag))
                    .collect(),
            },
        }
    }
}

/// Replace placeholders in one argument. A bare placeholder keeps the path's
/// exact OS encoding; embedded placeholders go through a lossy string.
fn substitute(arg: &str, input: &Path, output: &Path, flag: &str) -> OsString {
    match arg {
        INPUT_PLACEHOLDER => input.as_os_str().to_owned(),
        OUTPUT_PLACEHOLDER => output.as_os_str().to_owned(),
        KEEP_ACTIVE_PLACEHOLDER => flag.into(),
        _ => arg
            .replace(INPUT_PLACEHOLDER, &input.to_string_lossy())
            .replace(OUTPUT_PLACEHOLDER, &output.to_string_lossy())
            .replace(KEEP_ACTIVE_PLACEHOLDER, flag)
            .into(),
    }
}

// ── Script installation ──────────────────────────────────────────────────────

/// Returns the per-version directory bundled scripts are installed into.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/docx2pdf/scripts-{VERSION}/`
/// - **Linux**: `~/.cache/docx2pdf/scripts-{VERSION}/`
/// - **Windows**: `%LOCALAPPDATA%\docx2pdf\scripts-{VERSION}\`
///
/// Override by setting `DOCX2PDF_SCRIPT_DIR`.
pub fn script_dir() -> PathBuf {
    script_dir_with(std::env::var_os("DOCX2PDF_SCRIPT_DIR").filter(|v| !v.is_empty()))
}

fn script_dir_with(override_dir: Option<OsString>) -> PathBuf {
    if let Some(dir) = override_dir {
        return PathBuf::from(dir).join(format!("scripts-{SCRIPTS_VERSION}"));
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("docx2pdf").join(format!("scripts-{SCRIPTS_VERSION}"))
}

/// Make sure the script for `kind` exists in [`script_dir`] and return its path.
///
/// Headless backends have no script; their path is never needed, so this
/// returns the directory itself for them.
pub fn ensure_script(kind: BackendKind) -> Result<PathBuf, BackendError> {
    install_script_in(&script_dir(), kind)
}

fn install_script_in(dir: &Path, kind: BackendKind) -> Result<PathBuf, BackendError> {
    let (name, contents) = match kind {
        BackendKind::WordAutomation => (WORD_SCRIPT_NAME, WORD_SCRIPT),
        BackendKind::MacScript => (MAC_SCRIPT_NAME, MAC_SCRIPT),
        BackendKind::Headless => return Ok(dir.to_path_buf()),
    };

    std::fs::create_dir_all(dir).map_err(|source| BackendError::ScriptDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(name);
    if let Ok(existing) = std::fs::read_to_string(&path) {
        if existing == contents {
            return Ok(path);
        }
    }

    // Write-then-rename so concurrent installers never expose a half-written script.
    let install_failed = |source| BackendError::ScriptInstall {
        path: path.clone(),
        source,
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(name)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(install_failed)?;
    tmp.write_all(contents.as_bytes()).map_err(install_failed)?;
    tmp.persist(&path).map_err(|e| install_failed(e.error))?;

    debug!("Installed {} backend script at {}", kind, path.display());
    Ok(path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
