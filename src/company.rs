//! Company directory: the list of legal entities a proposal can be issued from.
//!
//! Loaded once from JSON and handed to [`crate::generate`] explicitly; the
//! directory is read-only for the duration of a run.
//!
//! Two file shapes are accepted:
//!
//! ```json
//! {"companies": [{"id": "alpha", "name": "ООО «Альфа»", "inn": "7701234567",
//!                 "address": "Москва", "phone": "+7 495 000-00-00",
//!                 "ceo": "Иванов И. И.", "logo_path": "logos/alpha.png"}]}
//! ```
//!
//! or the bare array. A relative `logo_path` is resolved against the
//! directory of the JSON file.

use crate::error::KpError;
use crate::model::CompanyProfile;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const REQUIRED_KEYS: [&str; 6] = ["id", "name", "inn", "address", "phone", "ceo"];

/// Ordered, id-indexed set of company profiles.
#[derive(Debug, Clone, Default)]
pub struct CompanyDirectory {
    companies: Vec<CompanyProfile>,
    by_id: HashMap<String, usize>,
}

impl CompanyDirectory {
    /// Load and validate a company list file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KpError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => KpError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => KpError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => KpError::CompanyStore {
                path: path.to_path_buf(),
                detail: e.to_string(),
            },
        })?;
        let base_dir = path.parent().map(Path::to_path_buf);
        let dir = Self::from_json_str(&text, base_dir.as_deref()).map_err(|detail| {
            KpError::CompanyStore {
                path: path.to_path_buf(),
                detail,
            }
        })?;
        info!("Loaded {} companies from {}", dir.len(), path.display());
        Ok(dir)
    }

    /// Parse a company list from JSON text.
    ///
    /// `base_dir` anchors relative logo paths. The error is a plain message;
    /// [`CompanyDirectory::load`] wraps it with the file path.
    pub fn from_json_str(text: &str, base_dir: Option<&Path>) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;

        let rows = match value {
            Value::Array(rows) => rows,
            Value::Object(mut obj) => match obj.remove("companies") {
                Some(Value::Array(rows)) => rows,
                Some(_) => return Err("field 'companies' must be an array".into()),
                None => return Err("missing top-level field 'companies'".into()),
            },
            _ => return Err("expected an object with 'companies' or an array".into()),
        };

        let mut dir = Self::default();
        for (idx, row) in rows.into_iter().enumerate() {
            let obj = match row {
                Value::Object(obj) => obj,
                _ => return Err(format!("companies[{idx}] must be an object")),
            };
            let profile = profile_from_object(&obj, idx, base_dir)?;
            dir.insert(profile)?;
        }
        debug!("Company ids: {}", dir.ids().join(", "));
        Ok(dir)
    }

    /// Build a directory from already-constructed profiles.
    pub fn from_profiles(profiles: impl IntoIterator<Item = CompanyProfile>) -> Result<Self, KpError> {
        let mut dir = Self::default();
        for p in profiles {
            dir.insert(p).map_err(KpError::InvalidConfig)?;
        }
        Ok(dir)
    }

    fn insert(&mut self, profile: CompanyProfile) -> Result<(), String> {
        if self.by_id.contains_key(&profile.id) {
            return Err(format!("duplicate company id '{}'", profile.id));
        }
        self.by_id.insert(profile.id.clone(), self.companies.len());
        self.companies.push(profile);
        Ok(())
    }

    /// Look up a company by id.
    pub fn get(&self, id: &str) -> Result<&CompanyProfile, KpError> {
        self.by_id
            .get(id)
            .map(|&i| &self.companies[i])
            .ok_or_else(|| KpError::UnknownCompany {
                id: id.to_string(),
                known: self.ids().join(", "),
            })
    }

    pub fn ids(&self) -> Vec<&str> {
        self.companies.iter().map(|c| c.id.as_str()).collect()
    }

    /// Profiles in file order.
    pub fn iter(&self) -> impl Iterator<Item = &CompanyProfile> {
        self.companies.iter()
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }
}

fn profile_from_object(
    obj: &Map<String, Value>,
    idx: usize,
    base_dir: Option<&Path>,
) -> Result<CompanyProfile, String> {
    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|k| obj.get(*k).map_or(true, Value::is_null))
        .collect();
    if !missing.is_empty() {
        let who = obj
            .get("name")
            .and_then(scalar_to_string)
            .map(|n| format!("'{n}'"))
            .unwrap_or_else(|| format!("#{}", idx + 1));
        return Err(format!("company {who} is missing keys: {}", missing.join(", ")));
    }

    let field = |key: &str| -> Result<String, String> {
        obj.get(key)
            .and_then(scalar_to_string)
            .ok_or_else(|| format!("companies[{idx}].{key} must be a string or number"))
    };

    let id = field("id")?;
    if id.trim().is_empty() {
        return Err(format!("companies[{idx}].id must not be empty"));
    }

    let logo_path = obj
        .get("logo_path")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(|s| resolve_relative(Path::new(s), base_dir));

    Ok(CompanyProfile {
        id,
        name: field("name")?,
        inn: field("inn")?,
        address: field("address")?,
        phone: field("phone")?,
        ceo: field("ceo")?,
        logo_path,
    })
}

/// INNs and phone numbers are sometimes stored as JSON numbers.
fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn resolve_relative(path: &Path, base_dir: Option<&Path>) -> PathBuf {
    match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}
