//! A directory of JSON documents, one per requirement.
//!
//! Documents are named after their requirement number
//! (`REQ-2026-0001.json`) so the directory stays browsable. Each file is a
//! versioned envelope wrapping the aggregate and its revision; the whole
//! file is replaced on every write.

use std::{
    ffi::OsStr,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::{
    domain::{Config, ReqNumber, Requirement},
    storage::{Revision, Store, StoreError},
};

/// A [`Store`] backed by a directory of JSON documents.
pub struct JsonDirectory {
    /// The root of the directory requirements are stored in.
    root: PathBuf,
    digits: usize,
}

impl JsonDirectory {
    /// Opens a store rooted at the given path.
    ///
    /// The sequence padding for file names comes from `config.toml` in the
    /// root; a missing or unreadable configuration falls back to the
    /// default.
    #[must_use]
    pub fn open(root: PathBuf) -> Self {
        let config = load_config(&root);
        Self {
            root,
            digits: config.digits(),
        }
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, number: ReqNumber) -> PathBuf {
        self.root
            .join(format!("{}.json", number.display(self.digits)))
    }

    fn read_document(path: &Path) -> Result<(Requirement, Revision), StoreError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let Document::V1 {
            revision,
            requirement,
        } = serde_json::from_reader(reader)?;
        Ok((requirement, revision))
    }

    fn write_document(
        &self,
        requirement: &Requirement,
        revision: Revision,
    ) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.path_for(requirement.number());
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let document = Document::V1 {
            revision,
            requirement: requirement.clone(),
        };
        serde_json::to_writer_pretty(&mut writer, &document)?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    fn collect_json_paths(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.path().extension() == Some(OsStr::new("json")))
            .map(walkdir::DirEntry::into_path)
            .collect()
    }
}

fn load_config(root: &Path) -> Config {
    let path = root.join("config.toml");
    Config::load(&path).unwrap_or_else(|e| {
        tracing::debug!("Failed to load config: {e}");
        Config::default()
    })
}

impl Store for JsonDirectory {
    fn get(&self, id: Uuid) -> Result<Option<(Requirement, Revision)>, StoreError> {
        for path in self.collect_json_paths() {
            match Self::read_document(&path) {
                Ok((requirement, revision)) if requirement.id() == id => {
                    return Ok(Some((requirement, revision)));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Skipping unreadable document {}: {e}", path.display());
                }
            }
        }
        Ok(None)
    }

    fn put(
        &self,
        requirement: &Requirement,
        expected: Option<Revision>,
    ) -> Result<Revision, StoreError> {
        let path = self.path_for(requirement.number());
        let current = if path.exists() {
            let (stored, revision) = Self::read_document(&path)?;
            if stored.id() != requirement.id() {
                // Another requirement already owns this number.
                return Err(StoreError::Conflict {
                    id: requirement.id(),
                    expected,
                    actual: Some(revision),
                });
            }
            Some(revision)
        } else {
            None
        };

        let next = match (expected, current) {
            (None, None) => 1,
            (Some(expected), Some(actual)) if expected == actual => actual + 1,
            (Some(_), None) => return Err(StoreError::NotFound(requirement.id())),
            (expected, actual) => {
                return Err(StoreError::Conflict {
                    id: requirement.id(),
                    expected,
                    actual,
                });
            }
        };

        self.write_document(requirement, next)?;
        Ok(next)
    }

    fn scan_all(&self) -> Result<Vec<Requirement>, StoreError> {
        let paths = self.collect_json_paths();

        let (documents, unreadable): (Vec<_>, Vec<_>) = paths
            .par_iter()
            .map(|path| Self::read_document(path).map_err(|e| (path.clone(), e)))
            .partition(Result::is_ok);

        for (path, e) in unreadable.into_iter().map(Result::unwrap_err) {
            tracing::warn!("Skipping unreadable document {}: {e}", path.display());
        }

        let mut all: Vec<Requirement> = documents
            .into_iter()
            .filter_map(Result::ok)
            .map(|(requirement, _)| requirement)
            .collect();
        all.sort_by_key(Requirement::number);
        Ok(all)
    }

    fn find_by_number(&self, number: ReqNumber) -> Result<Option<Requirement>, StoreError> {
        let path = self.path_for(number);
        if !path.exists() {
            return Ok(None);
        }
        let (requirement, _) = Self::read_document(&path)?;
        Ok(Some(requirement))
    }
}

/// The serialized versions of a requirement document.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Document {
    #[serde(rename = "1")]
    V1 {
        revision: Revision,
        requirement: Requirement,
    },
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;
    use crate::domain::{LineInput, RequirementDraft};

    fn requirement(seq: u32) -> Requirement {
        Requirement::new(
            ReqNumber::new(2026, NonZeroU32::new(seq).unwrap()),
            RequirementDraft {
                title: "Autumn restock".to_string(),
                ..RequirementDraft::default()
            },
            vec![LineInput {
                product_id: "P-001".to_string(),
                sku: "SKU-1".to_string(),
                brand: "Acme".to_string(),
                name: "Widget".to_string(),
                requested: 5,
                estimated_unit_price_usd: Some(9.99),
                target_sale_price_pen: None,
            }],
            Utc::now(),
        )
        .unwrap()
    }

    fn store() -> (TempDir, JsonDirectory) {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let path = tmp.path().to_path_buf();
        (tmp, JsonDirectory::open(path))
    }

    #[test]
    fn put_names_files_after_the_number() {
        let (tmp, store) = store();
        store.put(&requirement(1), None).unwrap();

        assert!(tmp.path().join("REQ-2026-0001.json").exists());
    }

    #[test]
    fn round_trip_preserves_the_aggregate() {
        let (_tmp, store) = store();
        let req = requirement(1);
        store.put(&req, None).unwrap();

        let (loaded, revision) = store.get(req.id()).unwrap().unwrap();
        assert_eq!(loaded, req);
        assert_eq!(revision, 1);
    }

    #[test]
    fn replace_requires_matching_revision() {
        let (_tmp, store) = store();
        let req = requirement(1);
        store.put(&req, None).unwrap();
        store.put(&req, Some(1)).unwrap();

        let result = store.put(&req, Some(1));
        assert!(matches!(
            result,
            Err(StoreError::Conflict {
                expected: Some(1),
                actual: Some(2),
                ..
            })
        ));
    }

    #[test]
    fn create_over_existing_number_conflicts() {
        let (_tmp, store) = store();
        store.put(&requirement(1), None).unwrap();

        // A different aggregate with the same number.
        let result = store.put(&requirement(1), None);
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[test]
    fn find_by_number_is_a_point_lookup() {
        let (_tmp, store) = store();
        let req = requirement(7);
        store.put(&req, None).unwrap();

        let found = store.find_by_number(req.number()).unwrap().unwrap();
        assert_eq!(found.id(), req.id());

        let missing = ReqNumber::new(2026, NonZeroU32::new(8).unwrap());
        assert!(store.find_by_number(missing).unwrap().is_none());
    }

    #[test]
    fn scan_all_skips_malformed_documents() {
        let (tmp, store) = store();
        store.put(&requirement(1), None).unwrap();
        store.put(&requirement(2), None).unwrap();
        std::fs::write(tmp.path().join("REQ-2026-0003.json"), "{ not json").unwrap();

        let all = store.scan_all().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn scan_all_ignores_non_json_files() {
        let (tmp, store) = store();
        store.put(&requirement(1), None).unwrap();
        std::fs::write(tmp.path().join("config.toml"), "_version = \"1\"\n").unwrap();

        assert_eq!(store.scan_all().unwrap().len(), 1);
    }

    #[test]
    fn digits_come_from_config() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "_version = \"1\"\ndigits = 6\n",
        )
        .unwrap();

        let store = JsonDirectory::open(tmp.path().to_path_buf());
        store.put(&requirement(1), None).unwrap();

        assert!(tmp.path().join("REQ-2026-000001.json").exists());
    }

    #[test]
    fn documents_carry_a_version_tag() {
        let (tmp, store) = store();
        store.put(&requirement(1), None).unwrap();

        let content = std::fs::read_to_string(tmp.path().join("REQ-2026-0001.json")).unwrap();
        assert!(content.contains("\"_version\": \"1\""));
        assert!(content.contains("\"revision\": 1"));
    }
}
