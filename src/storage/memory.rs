//! An in-memory store for tests and embedding.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use uuid::Uuid;

use crate::{
    domain::{ReqNumber, Requirement},
    storage::{Revision, Store, StoreError},
};

/// A [`Store`] keeping every aggregate in a process-local map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<Uuid, (Requirement, Revision)>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, id: Uuid) -> Result<Option<(Requirement, Revision)>, StoreError> {
        let documents = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(documents.get(&id).cloned())
    }

    fn put(
        &self,
        requirement: &Requirement,
        expected: Option<Revision>,
    ) -> Result<Revision, StoreError> {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let id = requirement.id();
        let actual = documents.get(&id).map(|(_, revision)| *revision);

        let next = match (expected, actual) {
            (None, None) => 1,
            (Some(expected), Some(actual)) if expected == actual => actual + 1,
            (Some(_), None) => return Err(StoreError::NotFound(id)),
            (expected, actual) => {
                return Err(StoreError::Conflict {
                    id,
                    expected,
                    actual,
                });
            }
        };

        documents.insert(id, (requirement.clone(), next));
        Ok(next)
    }

    fn scan_all(&self) -> Result<Vec<Requirement>, StoreError> {
        let documents = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<Requirement> = documents
            .values()
            .map(|(requirement, _)| requirement.clone())
            .collect();
        all.sort_by_key(Requirement::number);
        Ok(all)
    }

    fn find_by_number(&self, number: ReqNumber) -> Result<Option<Requirement>, StoreError> {
        let documents = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(documents
            .values()
            .find(|(requirement, _)| requirement.number() == number)
            .map(|(requirement, _)| requirement.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use chrono::Utc;

    use super::*;
    use crate::domain::{LineInput, RequirementDraft};

    fn requirement(year: i32, seq: u32) -> Requirement {
        Requirement::new(
            ReqNumber::new(year, NonZeroU32::new(seq).unwrap()),
            RequirementDraft::default(),
            vec![LineInput {
                product_id: "P-001".to_string(),
                sku: "SKU-1".to_string(),
                brand: "Acme".to_string(),
                name: "Widget".to_string(),
                requested: 5,
                estimated_unit_price_usd: None,
                target_sale_price_pen: None,
            }],
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = MemoryStore::new();
        let req = requirement(2026, 1);

        let revision = store.put(&req, None).unwrap();
        assert_eq!(revision, 1);

        let (loaded, loaded_revision) = store.get(req.id()).unwrap().unwrap();
        assert_eq!(loaded, req);
        assert_eq!(loaded_revision, 1);
    }

    #[test]
    fn get_unknown_id_is_none() {
        let store = MemoryStore::new();
        assert!(store.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn replace_bumps_revision() {
        let store = MemoryStore::new();
        let req = requirement(2026, 1);
        store.put(&req, None).unwrap();

        let revision = store.put(&req, Some(1)).unwrap();
        assert_eq!(revision, 2);
    }

    #[test]
    fn create_twice_conflicts() {
        let store = MemoryStore::new();
        let req = requirement(2026, 1);
        store.put(&req, None).unwrap();

        let result = store.put(&req, None);
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[test]
    fn stale_revision_conflicts() {
        let store = MemoryStore::new();
        let req = requirement(2026, 1);
        store.put(&req, None).unwrap();
        store.put(&req, Some(1)).unwrap();

        // A writer still holding revision 1 must be rejected.
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
    fn replace_of_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let req = requirement(2026, 1);

        let result = store.put(&req, Some(1));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn scan_all_is_ordered_by_number() {
        let store = MemoryStore::new();
        store.put(&requirement(2026, 2), None).unwrap();
        store.put(&requirement(2025, 9), None).unwrap();
        store.put(&requirement(2026, 1), None).unwrap();

        let numbers: Vec<String> = store
            .scan_all()
            .unwrap()
            .iter()
            .map(|r| r.number().to_string())
            .collect();
        assert_eq!(numbers, ["REQ-2025-0009", "REQ-2026-0001", "REQ-2026-0002"]);
    }

    #[test]
    fn find_by_number() {
        let store = MemoryStore::new();
        let req = requirement(2026, 3);
        store.put(&req, None).unwrap();

        let found = store
            .find_by_number(ReqNumber::new(2026, NonZeroU32::new(3).unwrap()))
            .unwrap()
            .unwrap();
        assert_eq!(found.id(), req.id());

        assert!(
            store
                .find_by_number(ReqNumber::new(2026, NonZeroU32::new(4).unwrap()))
                .unwrap()
                .is_none()
        );
    }
}
