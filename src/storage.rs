//! Persistence for requirement aggregates.
//!
//! The engine treats the store as an opaque document store: point lookup,
//! whole-document replace, and full-collection scan. Nothing here depends on
//! query capabilities beyond that, so backends are interchangeable: an
//! in-memory map for tests and embedding, or a directory of JSON documents.

mod json;
pub use json::JsonDirectory;

mod memory;
pub use memory::MemoryStore;

use uuid::Uuid;

use crate::domain::{ReqNumber, Requirement};

/// A store-managed document version, incremented on every write.
///
/// Writes carry the revision observed at read time; a mismatch means
/// another writer got there first and the write is rejected instead of
/// silently discarding its effects.
pub type Revision = u64;

/// The persistence contract the engine is written against.
pub trait Store {
    /// Point lookup by requirement id.
    ///
    /// Returns the aggregate together with its current revision, or `None`
    /// if the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to read.
    fn get(&self, id: Uuid) -> Result<Option<(Requirement, Revision)>, StoreError>;

    /// Replaces the whole document, or creates it.
    ///
    /// With `expected` absent the document must not exist yet; with
    /// `expected` present the stored revision must match. Returns the new
    /// revision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the revision check fails,
    /// [`StoreError::NotFound`] when replacing a document that is gone, or
    /// a backend error.
    fn put(
        &self,
        requirement: &Requirement,
        expected: Option<Revision>,
    ) -> Result<Revision, StoreError>;

    /// Scans the whole collection, ordered by requirement number.
    ///
    /// Unreadable documents are skipped with a warning rather than failing
    /// the scan. This is an unbounded full scan; keep it off hot paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot enumerate the collection at
    /// all.
    fn scan_all(&self) -> Result<Vec<Requirement>, StoreError>;

    /// Equality lookup by requirement number.
    ///
    /// # Errors
    ///
    /// Returns an error if the matching document exists but cannot be read.
    fn find_by_number(&self, number: ReqNumber) -> Result<Option<Requirement>, StoreError>;
}

impl<T: Store + ?Sized> Store for &T {
    fn get(&self, id: Uuid) -> Result<Option<(Requirement, Revision)>, StoreError> {
        (**self).get(id)
    }

    fn put(
        &self,
        requirement: &Requirement,
        expected: Option<Revision>,
    ) -> Result<Revision, StoreError> {
        (**self).put(requirement, expected)
    }

    fn scan_all(&self) -> Result<Vec<Requirement>, StoreError> {
        (**self).scan_all()
    }

    fn find_by_number(&self, number: ReqNumber) -> Result<Option<Requirement>, StoreError> {
        (**self).find_by_number(number)
    }
}

/// Errors reported by store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The document to replace does not exist.
    #[error("requirement {0} not found in store")]
    NotFound(Uuid),

    /// The revision check on write failed; another write happened since the
    /// caller's read. Re-fetch and retry.
    #[error("write conflict on requirement {id}: expected revision {expected:?}, found {actual:?}")]
    Conflict {
        /// The requirement whose write was rejected.
        id: Uuid,
        /// The revision the caller observed, if any.
        expected: Option<Revision>,
        /// The revision actually stored, if any.
        actual: Option<Revision>,
    },

    /// The backend failed to read or write.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A document exists but cannot be parsed.
    #[error("malformed requirement document: {0}")]
    Malformed(#[from] serde_json::Error),
}
