//! Procurement requirement tracking.
//!
//! A requirement is a registered need for specific product quantities. It is
//! fulfilled over time by responsible parties (traveling buyers or
//! warehouses), each covering a subset of the quantities through its own
//! purchase, transit, and receipt lifecycle. The registry keeps the
//! per-product and per-requirement counters consistent by rebuilding them
//! from the full assignment set after every mutation.

pub mod domain;
pub use domain::{
    Assignment, AssignmentId, AssignmentPatch, AssignmentState, Config, Error, LineInput,
    LineItem, Party, PartyDirectory, Priority, ReceivedQuantity, ReqNumber, Requirement,
    RequirementDraft, RequirementState, Roster, Summary,
};

/// The lifecycle controller: the sole writer of requirement aggregates.
pub mod registry;
pub use registry::{AllocationRequest, AssignmentOptions, Registry};

/// Persistence backends for requirement aggregates.
pub mod storage;
pub use storage::{JsonDirectory, MemoryStore, Revision, Store, StoreError};

/// Read-only fleet-wide statistics.
pub mod stats;
pub use stats::Statistics;
