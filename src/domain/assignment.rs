//! Assignments: one responsible party's promise against a requirement.
//!
//! An assignment bundles per-product quantities promised by a single party
//! and advances through its own lifecycle independently of its siblings.
//! Assignments are append-only: they are never removed from the requirement,
//! only moved to the terminal `cancelled` state.

use std::fmt;

use chrono::{DateTime, Utc};
use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Error, Party, PartyCode};

/// An opaque, collision-resistant assignment identifier, unique within its
/// requirement.
///
/// The token combines the creation timestamp with a random suffix; nothing
/// beyond uniqueness should be read into its format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentId(String);

impl AssignmentId {
    pub(crate) fn generate(now: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("ASG-{}-{}", now.timestamp_millis(), &suffix[..8]))
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssignmentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The lifecycle state of an assignment.
///
/// The nominal progression is `pending → purchasing → purchased →
/// in_us_warehouse → in_transit → received`, but advancement is free-form:
/// the only enforced rule is that `received` and `cancelled` are terminal,
/// and that a received assignment cannot be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentState {
    /// Created, nothing bought yet.
    Pending,
    /// The party is actively buying.
    Purchasing,
    /// Purchased, linked to a purchase order.
    Purchased,
    /// Goods sitting in a US warehouse awaiting transport.
    InUsWarehouse,
    /// Goods in transit, linked to a transfer.
    InTransit,
    /// Goods delivered. Terminal.
    Received,
    /// Promise withdrawn; quantities returned to the pending pool. Terminal.
    Cancelled,
}

impl AssignmentState {
    /// Whether no further transitions are allowed out of this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Received | Self::Cancelled)
    }

    /// Whether this assignment no longer counts towards line aggregates.
    #[must_use]
    pub const fn is_cancelled(self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The wire label for this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Purchasing => "purchasing",
            Self::Purchased => "purchased",
            Self::InUsWarehouse => "in_us_warehouse",
            Self::InTransit => "in_transit",
            Self::Received => "received",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AssignmentState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The party snapshot stored on an assignment.
///
/// Captured from the directory when the assignment is created and never
/// refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyRef {
    /// The party's directory id.
    pub id: String,
    /// Display name at assignment time.
    pub display_name: String,
    /// Short code at assignment time.
    pub code: PartyCode,
    /// Whether the party was a traveling buyer at assignment time.
    pub is_traveler: bool,
}

impl From<&Party> for PartyRef {
    fn from(party: &Party) -> Self {
        Self {
            id: party.id.clone(),
            display_name: party.display_name.clone(),
            code: party.code.clone(),
            is_traveler: party.is_traveler,
        }
    }
}

/// One product's promised and received quantities within an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentLine {
    pub(crate) product_id: String,
    pub(crate) assigned: u32,
    #[serde(default)]
    pub(crate) received: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) real_unit_price_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) source_order_ref: Option<String>,
}

impl AssignmentLine {
    pub(crate) const fn new(product_id: String, assigned: u32) -> Self {
        Self {
            product_id,
            assigned,
            received: 0,
            real_unit_price_usd: None,
            source_order_ref: None,
        }
    }

    /// The product this line allocates.
    #[must_use]
    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// The quantity promised by the party.
    #[must_use]
    pub const fn assigned(&self) -> u32 {
        self.assigned
    }

    /// The quantity actually received so far.
    #[must_use]
    pub const fn received(&self) -> u32 {
        self.received
    }

    /// The real unit purchase price, in USD, if recorded.
    #[must_use]
    pub const fn real_unit_price_usd(&self) -> Option<f64> {
        self.real_unit_price_usd
    }

    /// Reference to the source order this line was bought on, if any.
    #[must_use]
    pub fn source_order_ref(&self) -> Option<&str> {
        self.source_order_ref.as_deref()
    }
}

/// A quantity received for one product, replacing the stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedQuantity {
    /// The product the quantity was received for.
    pub product_id: String,
    /// The new received quantity. Replaces, never increments.
    pub quantity: u32,
}

/// One responsible party's promise against a subset of the requirement's
/// lines, with its own lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub(crate) id: AssignmentId,
    pub(crate) party: PartyRef,
    pub(crate) lines: NonEmpty<AssignmentLine>,
    pub(crate) state: AssignmentState,
    pub(crate) assigned_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) estimated_purchase_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) purchased_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) estimated_arrival: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) received_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) purchase_order_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) transfer_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) estimated_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) real_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) freight_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) notes: String,
}

impl Assignment {
    pub(crate) fn new(
        id: AssignmentId,
        party: PartyRef,
        lines: NonEmpty<AssignmentLine>,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            party,
            lines,
            state: AssignmentState::Pending,
            assigned_at,
            estimated_purchase_at: None,
            purchased_at: None,
            estimated_arrival: None,
            received_at: None,
            purchase_order_ref: None,
            transfer_ref: None,
            estimated_cost_usd: None,
            real_cost_usd: None,
            freight_usd: None,
            notes: String::new(),
        }
    }

    /// The assignment's opaque identifier.
    #[must_use]
    pub const fn id(&self) -> &AssignmentId {
        &self.id
    }

    /// The party snapshot captured at creation.
    #[must_use]
    pub const fn party(&self) -> &PartyRef {
        &self.party
    }

    /// The current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> AssignmentState {
        self.state
    }

    /// The per-product promises, in creation order.
    pub fn lines(&self) -> impl Iterator<Item = &AssignmentLine> {
        self.lines.iter()
    }

    /// When the party was assigned.
    #[must_use]
    pub const fn assigned_at(&self) -> DateTime<Utc> {
        self.assigned_at
    }

    /// Estimated purchase date, if set.
    #[must_use]
    pub const fn estimated_purchase_at(&self) -> Option<DateTime<Utc>> {
        self.estimated_purchase_at
    }

    /// When the purchase was recorded, if it was.
    #[must_use]
    pub const fn purchased_at(&self) -> Option<DateTime<Utc>> {
        self.purchased_at
    }

    /// Estimated arrival date; defaults to the party's next scheduled trip
    /// when the caller supplied none.
    #[must_use]
    pub const fn estimated_arrival(&self) -> Option<DateTime<Utc>> {
        self.estimated_arrival
    }

    /// When receipt was recorded, if it was.
    #[must_use]
    pub const fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    /// Linked purchase order, if any.
    #[must_use]
    pub fn purchase_order_ref(&self) -> Option<&str> {
        self.purchase_order_ref.as_deref()
    }

    /// Linked transfer record, if any.
    #[must_use]
    pub fn transfer_ref(&self) -> Option<&str> {
        self.transfer_ref.as_deref()
    }

    /// Estimated total cost, in USD.
    #[must_use]
    pub const fn estimated_cost_usd(&self) -> Option<f64> {
        self.estimated_cost_usd
    }

    /// Real total cost, in USD.
    #[must_use]
    pub const fn real_cost_usd(&self) -> Option<f64> {
        self.real_cost_usd
    }

    /// Freight cost, in USD.
    #[must_use]
    pub const fn freight_usd(&self) -> Option<f64> {
        self.freight_usd
    }

    /// Free-text notes, including appended cancellation reasons.
    #[must_use]
    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Total quantity promised across all lines.
    #[must_use]
    pub fn total_assigned(&self) -> u32 {
        self.lines
            .iter()
            .fold(0u32, |sum, line| sum.saturating_add(line.assigned))
    }

    /// Moves the assignment to `target`.
    ///
    /// Setting the current state again is a no-op. Transitions out of
    /// `received` or `cancelled` fail; cancellation of a received assignment
    /// gets its own message because it is the mistake operators actually
    /// make.
    pub(crate) fn advance(&mut self, target: AssignmentState) -> Result<(), Error> {
        if self.state == target {
            return Ok(());
        }

        match self.state {
            AssignmentState::Received if target == AssignmentState::Cancelled => Err(
                Error::invalid_state("cannot cancel a received assignment"),
            ),
            AssignmentState::Received | AssignmentState::Cancelled => {
                Err(Error::invalid_state(format!(
                    "assignment {} is {} and cannot change state",
                    self.id, self.state
                )))
            }
            _ => {
                self.state = target;
                Ok(())
            }
        }
    }

    /// Cancels the assignment, appending `reason` to its notes.
    ///
    /// The unreceived assigned quantities return to the requirement's
    /// pending pool through the next reconciliation; nothing on the
    /// assignment's own lines is touched.
    pub(crate) fn cancel(&mut self, reason: &str) -> Result<(), Error> {
        if self.state == AssignmentState::Cancelled {
            return Err(Error::invalid_state(format!(
                "assignment {} is already cancelled",
                self.id
            )));
        }
        self.advance(AssignmentState::Cancelled)?;
        self.append_note(reason);
        Ok(())
    }

    pub(crate) fn append_note(&mut self, note: &str) {
        if note.is_empty() {
            return;
        }
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(note);
    }

    /// Replaces the stored received quantity for each listed product.
    ///
    /// With `strict` set, a quantity above the line's assigned quantity is
    /// rejected; otherwise over-receipt is recorded as supplied. All
    /// quantities are validated before any line is touched.
    pub(crate) fn record_received(
        &mut self,
        quantities: &[ReceivedQuantity],
        strict: bool,
    ) -> Result<(), Error> {
        for quantity in quantities {
            let line = self
                .lines
                .iter()
                .find(|line| line.product_id == quantity.product_id)
                .ok_or_else(|| {
                    Error::validation(format!(
                        "product {} is not covered by assignment {}",
                        quantity.product_id, self.id
                    ))
                })?;
            if strict && quantity.quantity > line.assigned {
                return Err(Error::validation(format!(
                    "received quantity {} for product {} exceeds assigned quantity {}",
                    quantity.quantity, quantity.product_id, line.assigned
                )));
            }
        }

        for quantity in quantities {
            if let Some(line) = self
                .lines
                .iter_mut()
                .find(|line| line.product_id == quantity.product_id)
            {
                line.received = quantity.quantity;
            }
        }
        Ok(())
    }

    /// Applies the fields present in `patch`, leaving the rest untouched.
    pub(crate) fn apply(
        &mut self,
        patch: AssignmentPatch,
        strict_receipts: bool,
    ) -> Result<(), Error> {
        let AssignmentPatch {
            state,
            estimated_purchase_at,
            purchased_at,
            estimated_arrival,
            received_at,
            purchase_order_ref,
            transfer_ref,
            estimated_cost_usd,
            real_cost_usd,
            freight_usd,
            notes,
            received,
        } = patch;

        if let Some(quantities) = received {
            self.record_received(&quantities, strict_receipts)?;
        }
        if let Some(target) = state {
            self.advance(target)?;
        }
        if let Some(value) = estimated_purchase_at {
            self.estimated_purchase_at = Some(value);
        }
        if let Some(value) = purchased_at {
            self.purchased_at = Some(value);
        }
        if let Some(value) = estimated_arrival {
            self.estimated_arrival = Some(value);
        }
        if let Some(value) = received_at {
            self.received_at = Some(value);
        }
        if let Some(value) = purchase_order_ref {
            self.purchase_order_ref = Some(value);
        }
        if let Some(value) = transfer_ref {
            self.transfer_ref = Some(value);
        }
        if let Some(value) = estimated_cost_usd {
            self.estimated_cost_usd = Some(value);
        }
        if let Some(value) = real_cost_usd {
            self.real_cost_usd = Some(value);
        }
        if let Some(value) = freight_usd {
            self.freight_usd = Some(value);
        }
        if let Some(value) = notes {
            self.notes = value;
        }
        Ok(())
    }
}

/// A partial update to an assignment.
///
/// Only fields carrying `Some` are applied; everything else is left as is.
/// Received quantities replace the stored values, they never add to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentPatch {
    /// Target lifecycle state.
    pub state: Option<AssignmentState>,
    /// Estimated purchase date.
    pub estimated_purchase_at: Option<DateTime<Utc>>,
    /// Actual purchase date.
    pub purchased_at: Option<DateTime<Utc>>,
    /// Estimated arrival date.
    pub estimated_arrival: Option<DateTime<Utc>>,
    /// Actual receipt date.
    pub received_at: Option<DateTime<Utc>>,
    /// Purchase order reference.
    pub purchase_order_ref: Option<String>,
    /// Transfer record reference.
    pub transfer_ref: Option<String>,
    /// Estimated total cost, in USD.
    pub estimated_cost_usd: Option<f64>,
    /// Real total cost, in USD.
    pub real_cost_usd: Option<f64>,
    /// Freight cost, in USD.
    pub freight_usd: Option<f64>,
    /// Replacement notes text.
    pub notes: Option<String>,
    /// Per-product received quantities, replacing stored values.
    pub received: Option<Vec<ReceivedQuantity>>,
}
