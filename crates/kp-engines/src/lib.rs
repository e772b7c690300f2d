//! # kp-engines
//!
//! Locate the two native engines kp-generator depends on at runtime:
//!
//! * the [PDFium](https://pdfium.googlesource.com/pdfium/) shared library,
//!   bound through `pdfium-render` for PDF text extraction and rasterisation;
//! * the [Tesseract](https://github.com/tesseract-ocr/tesseract) command-line
//!   binary, used for scanned PDFs.
//!
//! Neither engine is downloaded or installed here. Both are looked up in a
//! fixed order and the caller gets a descriptive error listing every place
//! that was searched.
//!
//! ## Search order
//!
//! | Engine    | 1. explicit path | 2. env var        | 3. next to the exe        | 4. fallback             |
//! |-----------|------------------|-------------------|---------------------------|-------------------------|
//! | PDFium    | caller argument  | `PDFIUM_LIB_PATH` | `<exe dir>`, `<exe dir>/lib`, data dir | system library |
//! | Tesseract | caller argument  | `TESSERACT_PATH`  | `<exe dir>`, `<exe dir>/tesseract`, `<exe dir>/Tesseract-OCR` | `PATH` |
//!
//! An explicit path is authoritative: when it is given and does not exist,
//! no other location is tried.
//!
//! ```rust,no_run
//! use kp_engines::{bind_pdfium, locate_tesseract};
//!
//! let pdfium = bind_pdfium(None).expect("PDFium unavailable");
//! let tesseract = locate_tesseract(None, None).expect("install Tesseract");
//! println!("OCR engine: {}", tesseract.display());
//! # drop(pdfium);
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdfium_render::prelude::Pdfium;
use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable pointing at an existing libpdfium (file or directory).
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// Environment variable pointing at the tesseract binary (file or directory).
pub const TESSERACT_ENV: &str = "TESSERACT_PATH";

/// Sub-directory of the platform data dir searched for libpdfium.
const DATA_DIR_NAME: &str = "kp-generator";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned while locating or binding an engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The current OS has no known PDFium library name.
    #[error("Unsupported platform: {os}")]
    UnsupportedPlatform { os: String },

    /// An explicitly configured PDFium path does not exist.
    #[error("PDFium library not found at '{path}'")]
    PdfiumNotFound { path: PathBuf },

    /// `pdfium-render` could not load the library at `path`.
    #[error("Failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },

    /// No candidate file existed and the system loader failed too.
    #[error("Failed to bind a system PDFium library: {reason}\nSearched: {searched}")]
    BindSystem { reason: String, searched: String },

    /// No tesseract binary in any searched location.
    #[error("Tesseract OCR binary not found.\nSearched: {searched}")]
    TesseractNotFound { searched: String },
}

// ── Platform names ───────────────────────────────────────────────────────────

/// File name of the PDFium shared library on this platform.
pub fn pdfium_library_name() -> Result<&'static str, EngineError> {
    match std::env::consts::OS {
        "macos" | "ios" => Ok("libpdfium.dylib"),
        "linux" | "android" | "freebsd" | "openbsd" | "netbsd" => Ok("libpdfium.so"),
        "windows" => Ok("pdfium.dll"),
        os => Err(EngineError::UnsupportedPlatform { os: os.to_string() }),
    }
}

/// File name of the tesseract executable on this platform.
pub fn tesseract_binary_name() -> &'static str {
    if cfg!(windows) {
        "tesseract.exe"
    } else {
        "tesseract"
    }
}

fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// A configured path may name the file itself or the directory holding it.
fn as_file(path: &Path, file_name: &str) -> PathBuf {
    if path.is_dir() {
        path.join(file_name)
    } else {
        path.to_path_buf()
    }
}

fn join_display(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(nothing)".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ── PDFium ───────────────────────────────────────────────────────────────────

static RESOLVED_PDFIUM: OnceLock<PathBuf> = OnceLock::new();

/// Every location searched for libpdfium when no explicit path is given,
/// in priority order.
pub fn pdfium_candidates() -> Result<Vec<PathBuf>, EngineError> {
    let lib_name = pdfium_library_name()?;
    let mut out = Vec::new();

    if let Some(env_path) = std::env::var_os(PDFIUM_LIB_ENV).filter(|v| !v.is_empty()) {
        out.push(as_file(Path::new(&env_path), lib_name));
    }
    if let Some(dir) = exe_dir() {
        out.push(dir.join(lib_name));
        out.push(dir.join("lib").join(lib_name));
    }
    if let Some(data) = dirs::data_local_dir() {
        out.push(data.join(DATA_DIR_NAME).join(lib_name));
    }
    if let Ok(cwd) = std::env::current_dir() {
        out.push(cwd.join(lib_name));
    }
    Ok(out)
}

/// Returns the first existing libpdfium file, or `None`.
///
/// With `explicit` set only that path is considered.
pub fn locate_pdfium_library(explicit: Option<&Path>) -> Result<Option<PathBuf>, EngineError> {
    let lib_name = pdfium_library_name()?;
    if let Some(path) = explicit {
        let file = as_file(path, lib_name);
        return Ok(file.is_file().then_some(file));
    }
    if let Some(path) = RESOLVED_PDFIUM.get() {
        return Ok(Some(path.clone()));
    }
    let found = pdfium_candidates()?.into_iter().find(|p| p.is_file());
    if let Some(ref path) = found {
        let _ = RESOLVED_PDFIUM.set(path.clone());
    }
    Ok(found)
}

/// Binds to a PDFium library at an explicit `path`.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, EngineError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| EngineError::Bind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Binds to PDFium using the search order documented at the crate root.
///
/// Falls back to the operating system loader (`LD_LIBRARY_PATH`,
/// `DYLD_LIBRARY_PATH`, `PATH`) when no candidate file exists.
pub fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium, EngineError> {
    match locate_pdfium_library(explicit)? {
        Some(path) => bind_pdfium_from_path(&path),
        None => {
            if let Some(path) = explicit {
                return Err(EngineError::PdfiumNotFound {
                    path: path.to_path_buf(),
                });
            }
            Pdfium::bind_to_system_library()
                .map(Pdfium::new)
                .map_err(|e| EngineError::BindSystem {
                    reason: e.to_string(),
                    searched: join_display(&pdfium_candidates().unwrap_or_default()),
                })
        }
    }
}

// ── Tesseract ────────────────────────────────────────────────────────────────

/// Every location searched for the tesseract binary, in priority order.
///
/// `search_path` overrides the process `PATH` (same `OsStr` syntax); pass
/// `None` to use the environment.
pub fn tesseract_candidates(explicit: Option<&Path>, search_path: Option<&OsStr>) -> Vec<PathBuf> {
    let bin = tesseract_binary_name();
    if let Some(path) = explicit {
        return vec![as_file(path, bin)];
    }

    let mut out = Vec::new();
    if let Some(env_path) = std::env::var_os(TESSERACT_ENV).filter(|v| !v.is_empty()) {
        out.push(as_file(Path::new(&env_path), bin));
    }
    if let Some(dir) = exe_dir() {
        out.push(dir.join(bin));
        out.push(dir.join("tesseract").join(bin));
        out.push(dir.join("Tesseract-OCR").join(bin));
    }
    if cfg!(windows) {
        out.push(PathBuf::from(r"C:\Program Files\Tesseract-OCR").join(bin));
        out.push(PathBuf::from(r"C:\Program Files (x86)\Tesseract-OCR").join(bin));
    }

    let env_path = std::env::var_os("PATH");
    if let Some(paths) = search_path.or(env_path.as_deref()) {
        out.extend(std::env::split_paths(paths).map(|dir| dir.join(bin)));
    }
    out
}

/// Returns the path of the first tesseract binary found.
///
/// # Errors
/// [`EngineError::TesseractNotFound`] listing every searched location.
pub fn locate_tesseract(
    explicit: Option<&Path>,
    search_path: Option<&OsStr>,
) -> Result<PathBuf, EngineError> {
    let candidates = tesseract_candidates(explicit, search_path);
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| EngineError::TesseractNotFound {
            searched: join_display(&candidates),
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
