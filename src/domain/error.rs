use std::fmt;

use crate::storage::StoreError;

/// Errors reported by the registry and the domain model.
///
/// Every precondition failure is reported synchronously; a failing operation
/// leaves the persisted aggregate untouched. The registry never retries on
/// its own; callers decide whether to re-fetch and retry (e.g. after a
/// [`StoreError::Conflict`]).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed caller input, such as a non-positive requested quantity or
    /// a duplicate product line.
    #[error("{0}")]
    Validation(String),

    /// The requirement, assignment, or party does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// What kind of entity was looked up.
        kind: Entity,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// The operation is not legal in the aggregate's current state.
    #[error("{0}")]
    InvalidState(String),

    /// An allocation request exceeds a line's pending quantity.
    #[error(
        "insufficient pending quantity for product {product_id}: requested {requested}, pending {pending}"
    )]
    InsufficientQuantity {
        /// The product whose pending pool was exceeded.
        product_id: String,
        /// The quantity the caller asked to allocate.
        requested: u32,
        /// The quantity still unallocated.
        pending: u32,
    },

    /// The persistence store rejected or failed the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub(crate) fn not_found(kind: Entity, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// The kinds of entity a [`Error::NotFound`] can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// A requirement aggregate.
    Requirement,
    /// An assignment within a requirement.
    Assignment,
    /// A responsible party.
    Party,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            Self::Requirement => "requirement",
            Self::Assignment => "assignment",
            Self::Party => "party",
        };
        f.write_str(label)
    }
}
