//! Input resolution: classify a user-supplied path as spreadsheet or PDF.
//!
//! The extension decides first; a `%PDF` signature rescues PDFs with odd
//! names. A `.pdf` without the signature is rejected here so callers get a
//! meaningful error instead of a pdfium parse failure.

use crate::error::{KpError, TemplateIssue};
use crate::model::OutputFormat;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// What kind of price list a file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Spreadsheet,
    Pdf,
}

impl InputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::Spreadsheet => "spreadsheet",
            InputKind::Pdf => "pdf",
        }
    }
}

const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xls", "xlsb", "ods"];

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Open `path` for reading and return its first bytes.
///
/// Maps a missing file and a permission problem to their dedicated errors.
fn read_magic(path: &Path) -> Result<Vec<u8>, KpError> {
    if !path.exists() {
        return Err(KpError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let mut f = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(KpError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(KpError::format(path, e.to_string())),
    };
    let mut magic = Vec::with_capacity(8);
    f.by_ref()
        .take(8)
        .read_to_end(&mut magic)
        .map_err(|e| KpError::format(path, e.to_string()))?;
    Ok(magic)
}

/// Validate a price-list path and decide how to read it.
pub fn resolve_input(path: &Path) -> Result<InputKind, KpError> {
    let magic = read_magic(path)?;
    let is_pdf_magic = magic.starts_with(b"%PDF");
    let ext = extension_of(path);

    let kind = if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        InputKind::Spreadsheet
    } else if ext == "pdf" {
        if !is_pdf_magic {
            return Err(KpError::format(
                path,
                format!("not a valid PDF (first bytes: {:?})", String::from_utf8_lossy(&magic)),
            ));
        }
        InputKind::Pdf
    } else if is_pdf_magic {
        InputKind::Pdf
    } else {
        return Err(KpError::UnsupportedInput {
            path: path.to_path_buf(),
        });
    };

    debug!("Resolved {} input: {}", kind.as_str(), path.display());
    Ok(kind)
}

/// Validate a template path and decide the output format from it.
pub fn resolve_template(path: &Path) -> Result<OutputFormat, KpError> {
    let magic = read_magic(path)?;
    let format = match extension_of(path).as_str() {
        "docx" => OutputFormat::Docx,
        "xlsx" | "xlsm" => OutputFormat::Xlsx,
        other => {
            return Err(KpError::template(
                path,
                TemplateIssue::UnsupportedFormat(other.to_string()),
            ))
        }
    };
    if !magic.starts_with(b"PK") {
        return Err(KpError::template(
            path,
            TemplateIssue::Malformed("not a zip-based Office document".into()),
        ));
    }
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, bytes).unwrap();
        p
    }

    #[test]
    fn missing_file() {
        let err = resolve_input(Path::new("/definitely/not/here.xlsx")).unwrap_err();
        assert!(matches!(err, KpError::FileNotFound { .. }));
    }

    #[test]
    fn classifies_by_extension_and_magic() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_input(&write(dir.path(), "a.XLSX", b"PK\x03\x04")).unwrap(),
            InputKind::Spreadsheet
        );
        assert_eq!(
            resolve_input(&write(dir.path(), "a.pdf", b"%PDF-1.7\n")).unwrap(),
            InputKind::Pdf
        );
        assert_eq!(
            resolve_input(&write(dir.path(), "scan.bin", b"%PDF-1.4")).unwrap(),
            InputKind::Pdf
        );
    }

    #[test]
    fn pdf_extension_without_signature() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_input(&write(dir.path(), "fake.pdf", b"hello")).unwrap_err();
        assert!(matches!(err, KpError::FileFormat { .. }));
    }

    #[test]
    fn unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_input(&write(dir.path(), "notes.txt", b"plain")).unwrap_err();
        assert!(matches!(err, KpError::UnsupportedInput { .. }));
    }

    #[test]
    fn template_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_template(&write(dir.path(), "t.docx", b"PK\x03\x04")).unwrap(),
            OutputFormat::Docx
        );
        assert_eq!(
            resolve_template(&write(dir.path(), "t.xlsx", b"PK\x03\x04")).unwrap(),
            OutputFormat::Xlsx
        );
        let err = resolve_template(&write(dir.path(), "t.odt", b"PK")).unwrap_err();
        assert!(matches!(err, KpError::Template { .. }));
        let err = resolve_template(&write(dir.path(), "bad.docx", b"not zip")).unwrap_err();
        assert!(matches!(err, KpError::Template { .. }));
    }
}
