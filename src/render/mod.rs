//! Rendering stage: priced items + company → proposal document bytes.
//!
//! ```text
//! Template::load ──▶ render_document ──▶ bytes ──▶ persist (temp + rename)
//!   docx ─▶ docx::render_docx
//!   xlsx ─▶ xlsx::render_xlsx
//!   none ─▶ default_xlsx::render_default_xlsx
//! ```
//!
//! Rendering never touches the file system; [`stage`] and [`Staged::commit`]
//! are the only writers, so a failed render or a cancelled run leaves
//! nothing behind.

pub mod default_xlsx;
pub mod docx;
pub mod ooxml;
pub mod xlsx;

use crate::config::GeneratorConfig;
use crate::error::{KpError, TemplateIssue};
use crate::model::{CompanyProfile, Item, OutputFormat, Totals};
use crate::pipeline::input;
use crate::tokens::TokenValues;
use ooxml::Package;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A template read into memory once per run.
#[derive(Debug, Clone)]
pub struct Template {
    path: PathBuf,
    format: OutputFormat,
    package: Package,
}

impl Template {
    pub fn load(path: &Path) -> Result<Self, KpError> {
        let format = input::resolve_template(path)?;
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => KpError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => KpError::template(path, TemplateIssue::Malformed(e.to_string())),
        })?;
        let package = Package::from_bytes(&bytes)
            .map_err(|e| KpError::template(path, TemplateIssue::Malformed(e)))?;
        debug!("Loaded {:?} template {}", format, path.display());
        Ok(Self {
            path: path.to_path_buf(),
            format,
            package,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

/// Output format for a run with or without a template.
pub fn output_format(template: Option<&Template>) -> OutputFormat {
    template.map(Template::format).unwrap_or(OutputFormat::Xlsx)
}

/// Render one proposal into memory.
pub fn render_document(
    template: Option<&Template>,
    company: &CompanyProfile,
    items: &[Item],
    date: &str,
    config: &GeneratorConfig,
) -> Result<Vec<u8>, KpError> {
    let totals = Totals::compute(items, config.vat_rate);
    let format = &config.number_format;
    let values = TokenValues::for_document(company, &totals, items.len(), date, format);

    match template {
        Some(t) => match t.format {
            OutputFormat::Docx => docx::render_docx(&t.path, &t.package, items, &values, format),
            OutputFormat::Xlsx => xlsx::render_xlsx(
                &t.path,
                &t.package,
                config.template_sheet.as_deref(),
                items,
                &values,
                format,
            ),
        },
        None => default_xlsx::render_default_xlsx(&default_xlsx::DefaultLayout {
            company,
            items,
            totals: &totals,
            vat_rate: config.vat_rate,
            date,
        }),
    }
}

/// A document flushed to a temp file beside its target, not yet renamed.
#[derive(Debug)]
pub struct Staged {
    path: PathBuf,
    tmp: tempfile::NamedTempFile,
    len: usize,
}

impl Staged {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the temp file over the target.
    pub fn commit(self) -> Result<(), KpError> {
        let Staged { path, tmp, len } = self;
        tmp.persist(&path).map_err(|e| KpError::OutputWriteFailed {
            path: path.clone(),
            source: e.error,
        })?;
        info!("Wrote {} ({} bytes)", path.display(), len);
        Ok(())
    }
}

/// Write `bytes` to a temp file in the directory of `path` and flush it.
/// The target is untouched until [`Staged::commit`]; dropping the result
/// deletes the temp file.
pub fn stage(path: &Path, bytes: &[u8]) -> Result<Staged, KpError> {
    let write_err = |source: std::io::Error| KpError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".kp-")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    debug!("Staged {} in {}", path.display(), tmp.path().display());
    Ok(Staged {
        path: path.to_path_buf(),
        tmp,
        len: bytes.len(),
    })
}

/// Write `bytes` to `path` atomically: a temp file in the same directory is
/// written, flushed and renamed over the target.
pub fn persist(path: &Path, bytes: &[u8]) -> Result<(), KpError> {
    stage(path, bytes)?.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_creates_parent_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/out.xlsx");
        persist(&target, b"one").unwrap();
        persist(&target, b"two").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"two");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn persist_into_a_file_path_fails_as_io() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let err = persist(&blocker.join("out.docx"), b"data").unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Io);
    }

    #[test]
    fn dropped_stage_leaves_target_alone() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("kp.xlsx");
        std::fs::write(&target, b"old").unwrap();
        let staged = stage(&target, b"new").unwrap();
        assert_eq!(staged.path(), target);
        drop(staged);
        assert_eq!(std::fs::read(&target).unwrap(), b"old");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn no_template_means_xlsx() {
        assert_eq!(output_format(None), OutputFormat::Xlsx);
    }

    #[test]
    fn load_rejects_non_zip_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.docx");
        std::fs::write(&path, b"PK but not really a zip").unwrap();
        let err = Template::load(&path).unwrap_err();
        assert!(matches!(err, KpError::Template { issue: TemplateIssue::Malformed(_), .. }));
    }
}
