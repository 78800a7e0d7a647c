//! The requirement lifecycle controller.
//!
//! The [`Registry`] is the only writer of requirement aggregates. Every
//! operation reads the whole aggregate, mutates it in memory, runs
//! reconciliation, and writes the whole aggregate back: lines,
//! assignments, and summary together, or nothing at all. Precondition
//! failures are reported synchronously and never leave a partial write
//! behind; a revision conflict on write is surfaced to the caller, who
//! decides whether to re-fetch and retry.

use std::num::NonZeroU32;

use chrono::{DateTime, Datelike, Utc};
use nonempty::NonEmpty;
use uuid::Uuid;

use crate::{
    domain::{
        Assignment, AssignmentId, AssignmentLine, AssignmentPatch, AssignmentState, Config,
        Entity, Error, LineInput, PartyDirectory, PartyRef, ReceivedQuantity, ReqNumber,
        Requirement, RequirementDraft, RequirementState,
    },
    storage::{Revision, Store},
};

/// A quantity of one product requested from a responsible party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    /// The product to allocate.
    pub product_id: String,
    /// The quantity to allocate. Must be positive and within the line's
    /// pending pool.
    pub quantity: u32,
}

/// Optional extras supplied when assigning a responsible party.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentOptions {
    /// Estimated purchase date.
    pub estimated_purchase_at: Option<DateTime<Utc>>,
    /// Estimated arrival date; defaults to the party's next scheduled trip.
    pub estimated_arrival: Option<DateTime<Utc>>,
    /// Estimated total cost, in USD.
    pub estimated_cost_usd: Option<f64>,
    /// Free-text notes.
    pub notes: Option<String>,
}

/// The lifecycle controller for requirement aggregates.
///
/// Generic over the persistence [`Store`] and the [`PartyDirectory`] so
/// tests and embedders can swap backends.
pub struct Registry<S, P> {
    store: S,
    parties: P,
    config: Config,
}

impl<S, P> Registry<S, P> {
    /// Creates a registry over the given store and party directory.
    pub const fn new(store: S, parties: P, config: Config) -> Self {
        Self {
            store,
            parties,
            config,
        }
    }

    /// The registry's configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying store, e.g. for statistics scans.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }
}

impl<S: Store, P: PartyDirectory> Registry<S, P> {
    /// Registers a new requirement in state `pending`.
    ///
    /// Allocates the next number for the current year by scanning existing
    /// numbers and taking the maximum plus one. This is not
    /// transaction-safe across concurrent writers; the store's create check
    /// turns a lost race into a conflict instead of a silent overwrite.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for malformed lines (empty list,
    /// non-positive quantity, duplicate product id) or a store error.
    pub fn create(
        &self,
        draft: RequirementDraft,
        lines: Vec<LineInput>,
    ) -> Result<Requirement, Error> {
        let now = Utc::now();
        let number = self.next_number(now.year())?;
        let requirement = Requirement::new(number, draft, lines, now)?;

        self.store.put(&requirement, None)?;
        tracing::info!("Registered requirement {}", requirement.number());

        Ok(requirement)
    }

    /// Approves a pending requirement, recording who approved it and when.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the requirement does not exist and
    /// [`Error::InvalidState`] unless its state is `pending`.
    pub fn approve(&self, id: Uuid, approver: &str) -> Result<Requirement, Error> {
        let (mut requirement, revision) = self.fetch(id)?;

        if requirement.state() != RequirementState::Pending {
            return Err(Error::invalid_state(format!(
                "cannot approve requirement {}: state is {}",
                requirement.number(),
                requirement.state()
            )));
        }

        requirement.state = RequirementState::Approved;
        requirement.approved_by = Some(approver.to_string());
        requirement.approved_at = Some(Utc::now());

        self.store.put(&requirement, Some(revision))?;
        tracing::info!("Approved requirement {}", requirement.number());

        Ok(requirement)
    }

    /// Assigns a responsible party to cover some of the pending quantities.
    ///
    /// Builds a new assignment in state `pending`, defaulting its estimated
    /// arrival to the party's next scheduled trip when the caller supplied
    /// none, appends it, reconciles, and advances the requirement to
    /// `in_progress` if it was `pending` or `approved`. Returns the created
    /// assignment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the requirement or party is unknown,
    /// [`Error::InvalidState`] if the requirement is `completed` or
    /// `cancelled`, [`Error::Validation`] for malformed requests, and
    /// [`Error::InsufficientQuantity`] when a request exceeds a line's
    /// pending pool.
    pub fn assign_responsible(
        &self,
        id: Uuid,
        party_id: &str,
        requests: &[AllocationRequest],
        options: AssignmentOptions,
    ) -> Result<Assignment, Error> {
        let (mut requirement, revision) = self.fetch(id)?;
        let party = self
            .parties
            .get_by_id(party_id)
            .ok_or_else(|| Error::not_found(Entity::Party, party_id))?;

        if matches!(
            requirement.state(),
            RequirementState::Completed | RequirementState::Cancelled
        ) {
            return Err(Error::invalid_state(format!(
                "cannot assign a responsible party to a {} requirement",
                requirement.state()
            )));
        }

        if requests.is_empty() {
            return Err(Error::validation(
                "an assignment must cover at least one product",
            ));
        }

        let mut lines: Vec<AssignmentLine> = Vec::with_capacity(requests.len());
        for request in requests {
            if request.quantity == 0 {
                return Err(Error::validation(format!(
                    "assigned quantity for product {} must be positive",
                    request.product_id
                )));
            }
            if lines
                .iter()
                .any(|line| line.product_id() == request.product_id)
            {
                return Err(Error::validation(format!(
                    "duplicate product {} in allocation request",
                    request.product_id
                )));
            }

            let line = requirement.line(&request.product_id).ok_or_else(|| {
                Error::validation(format!(
                    "product {} is not part of requirement {}",
                    request.product_id,
                    requirement.number()
                ))
            })?;

            let pending = line.pending();
            if request.quantity > pending {
                return Err(Error::InsufficientQuantity {
                    product_id: request.product_id.clone(),
                    requested: request.quantity,
                    pending,
                });
            }

            lines.push(AssignmentLine::new(
                request.product_id.clone(),
                request.quantity,
            ));
        }

        let lines = NonEmpty::from_vec(lines)
            .ok_or_else(|| Error::validation("an assignment must cover at least one product"))?;

        let now = Utc::now();
        let mut assignment = Assignment::new(
            AssignmentId::generate(now),
            PartyRef::from(&party),
            lines,
            now,
        );
        assignment.estimated_purchase_at = options.estimated_purchase_at;
        assignment.estimated_arrival = options.estimated_arrival.or(party.next_trip);
        assignment.estimated_cost_usd = options.estimated_cost_usd;
        if let Some(notes) = options.notes {
            assignment.notes = notes;
        }

        requirement.assignments.push(assignment.clone());
        requirement.reconcile();

        if matches!(
            requirement.state(),
            RequirementState::Pending | RequirementState::Approved
        ) {
            requirement.state = RequirementState::InProgress;
        }

        self.store.put(&requirement, Some(revision))?;
        tracing::info!(
            "Assigned {} to requirement {}",
            assignment.party().display_name,
            requirement.number()
        );

        Ok(assignment)
    }

    /// Applies a partial update to an assignment.
    ///
    /// Only the fields present in `patch` are touched; received quantities
    /// replace the stored values. Reconciles afterwards, and if every line
    /// is now complete the requirement moves to `completed` with a
    /// completion timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the requirement or assignment is
    /// unknown, [`Error::InvalidState`] for transitions out of a terminal
    /// state, and [`Error::Validation`] when strict receipts are enabled
    /// and a received quantity exceeds the assigned quantity.
    pub fn update_assignment(
        &self,
        id: Uuid,
        assignment_id: &AssignmentId,
        patch: AssignmentPatch,
    ) -> Result<Assignment, Error> {
        let (mut requirement, revision) = self.fetch(id)?;
        let strict = self.config.strict_receipts;

        let assignment = requirement
            .assignment_mut(assignment_id)
            .ok_or_else(|| Error::not_found(Entity::Assignment, assignment_id))?;
        assignment.apply(patch, strict)?;
        let updated = assignment.clone();

        requirement.reconcile();
        complete_if_fully_received(&mut requirement);

        self.store.put(&requirement, Some(revision))?;
        tracing::info!(
            "Updated assignment {} on requirement {}",
            updated.id(),
            requirement.number()
        );

        Ok(updated)
    }

    /// Cancels an assignment, returning its unreceived quantities to the
    /// pending pool.
    ///
    /// The reason is appended to the assignment's notes. The requirement's
    /// state is never downgraded by a cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the requirement or assignment is
    /// unknown and [`Error::InvalidState`] if the assignment is already
    /// `received` or `cancelled`.
    pub fn cancel_assignment(
        &self,
        id: Uuid,
        assignment_id: &AssignmentId,
        reason: &str,
    ) -> Result<Assignment, Error> {
        let (mut requirement, revision) = self.fetch(id)?;

        let assignment = requirement
            .assignment_mut(assignment_id)
            .ok_or_else(|| Error::not_found(Entity::Assignment, assignment_id))?;
        assignment.cancel(reason)?;
        let cancelled = assignment.clone();

        requirement.reconcile();

        self.store.put(&requirement, Some(revision))?;
        tracing::info!(
            "Cancelled assignment {} on requirement {}",
            cancelled.id(),
            requirement.number()
        );

        Ok(cancelled)
    }

    /// Links a purchase order: moves the assignment to `purchased`, records
    /// the order reference and the purchase time.
    ///
    /// # Errors
    ///
    /// As for [`Self::update_assignment`].
    pub fn link_purchase_order(
        &self,
        id: Uuid,
        assignment_id: &AssignmentId,
        order_ref: &str,
    ) -> Result<Assignment, Error> {
        self.update_assignment(
            id,
            assignment_id,
            AssignmentPatch {
                state: Some(AssignmentState::Purchased),
                purchase_order_ref: Some(order_ref.to_string()),
                purchased_at: Some(Utc::now()),
                ..AssignmentPatch::default()
            },
        )
    }

    /// Links a transfer record: moves the assignment to `in_transit` and
    /// records the transfer reference.
    ///
    /// # Errors
    ///
    /// As for [`Self::update_assignment`].
    pub fn link_transfer(
        &self,
        id: Uuid,
        assignment_id: &AssignmentId,
        transfer_ref: &str,
    ) -> Result<Assignment, Error> {
        self.update_assignment(
            id,
            assignment_id,
            AssignmentPatch {
                state: Some(AssignmentState::InTransit),
                transfer_ref: Some(transfer_ref.to_string()),
                ..AssignmentPatch::default()
            },
        )
    }

    /// Records receipt: replaces the received quantities, moves the
    /// assignment to `received`, and stamps the receipt time.
    ///
    /// # Errors
    ///
    /// As for [`Self::update_assignment`].
    pub fn mark_received(
        &self,
        id: Uuid,
        assignment_id: &AssignmentId,
        quantities: Vec<ReceivedQuantity>,
    ) -> Result<Assignment, Error> {
        self.update_assignment(
            id,
            assignment_id,
            AssignmentPatch {
                state: Some(AssignmentState::Received),
                received: Some(quantities),
                received_at: Some(Utc::now()),
                ..AssignmentPatch::default()
            },
        )
    }

    /// Explicitly cancels a whole requirement. Terminal; the aggregate is
    /// kept, never deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the requirement does not exist and
    /// [`Error::InvalidState`] if it is already `completed` or `cancelled`.
    pub fn cancel(&self, id: Uuid, reason: &str) -> Result<Requirement, Error> {
        let (mut requirement, revision) = self.fetch(id)?;

        if matches!(
            requirement.state(),
            RequirementState::Completed | RequirementState::Cancelled
        ) {
            return Err(Error::invalid_state(format!(
                "cannot cancel a {} requirement",
                requirement.state()
            )));
        }

        requirement.state = RequirementState::Cancelled;
        requirement.cancelled_at = Some(Utc::now());
        if !reason.is_empty() {
            if !requirement.notes.is_empty() {
                requirement.notes.push('\n');
            }
            requirement.notes.push_str(reason);
        }

        self.store.put(&requirement, Some(revision))?;
        tracing::info!("Cancelled requirement {}", requirement.number());

        Ok(requirement)
    }

    /// Fetches a requirement by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if it does not exist.
    pub fn get(&self, id: Uuid) -> Result<Requirement, Error> {
        Ok(self.fetch(id)?.0)
    }

    /// Fetches a requirement by its human-readable number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no requirement carries the number.
    pub fn find_by_number(&self, number: ReqNumber) -> Result<Requirement, Error> {
        self.store
            .find_by_number(number)?
            .ok_or_else(|| Error::not_found(Entity::Requirement, number))
    }

    /// Lists every requirement, ordered by number.
    ///
    /// # Errors
    ///
    /// Returns a store error if the collection cannot be scanned.
    pub fn list(&self) -> Result<Vec<Requirement>, Error> {
        Ok(self.store.scan_all()?)
    }

    fn fetch(&self, id: Uuid) -> Result<(Requirement, Revision), Error> {
        self.store
            .get(id)?
            .ok_or_else(|| Error::not_found(Entity::Requirement, id))
    }

    fn next_number(&self, year: i32) -> Result<ReqNumber, Error> {
        let max = self
            .store
            .scan_all()?
            .iter()
            .filter(|requirement| requirement.number().year() == year)
            .map(|requirement| requirement.number().seq().get())
            .max()
            .unwrap_or(0);

        let seq = NonZeroU32::new(max.saturating_add(1)).unwrap_or(NonZeroU32::MIN);
        Ok(ReqNumber::new(year, seq))
    }
}

fn complete_if_fully_received(requirement: &mut Requirement) {
    if requirement.is_fully_received()
        && !matches!(
            requirement.state(),
            RequirementState::Completed | RequirementState::Cancelled
        )
    {
        requirement.state = RequirementState::Completed;
        requirement.completed_at = Some(Utc::now());
        tracing::info!("Requirement {} completed", requirement.number());
    }
}
