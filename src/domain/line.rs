//! Per-product quantity ledgers.
//!
//! A line item is constructed once per product when the requirement is
//! registered and is never recreated; only its aggregate counters are
//! rewritten, wholesale, by reconciliation.

use serde::{Deserialize, Serialize};

use crate::domain::Error;

/// The caller-supplied catalog snapshot for one product line.
///
/// The registry consumes this record wholesale at creation time and never
/// re-queries the catalog afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct LineInput {
    /// Opaque catalog identifier, unique within the requirement.
    pub product_id: String,
    /// Stock-keeping unit, denormalized for display.
    pub sku: String,
    /// Brand name, denormalized for display.
    pub brand: String,
    /// Product name, denormalized for display.
    pub name: String,
    /// The quantity needed. Must be positive.
    pub requested: u32,
    /// Estimated unit purchase price, in USD.
    pub estimated_unit_price_usd: Option<f64>,
    /// Target sale price, in PEN.
    pub target_sale_price_pen: Option<f64>,
}

/// The per-product quantity ledger inside a requirement.
///
/// `requested` is fixed at creation; `assigned`, `received`, `pending`, and
/// `completed` are derived from the requirement's non-cancelled assignments
/// and replaced as a whole on every reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub(crate) product_id: String,
    pub(crate) sku: String,
    pub(crate) brand: String,
    pub(crate) name: String,
    pub(crate) requested: u32,
    #[serde(default)]
    pub(crate) assigned: u32,
    #[serde(default)]
    pub(crate) received: u32,
    /// Absent on records written before the pending counter existed; the
    /// fallback is computed at the read boundary, not in business logic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) pending: Option<u32>,
    #[serde(default)]
    pub(crate) completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) estimated_unit_price_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) target_sale_price_pen: Option<f64>,
}

impl LineItem {
    /// Builds the initial ledger for a product: nothing assigned, nothing
    /// received, everything pending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the requested quantity is zero.
    pub(crate) fn new(input: LineInput) -> Result<Self, Error> {
        if input.requested == 0 {
            return Err(Error::validation(format!(
                "requested quantity for product {} must be positive",
                input.product_id
            )));
        }

        Ok(Self {
            product_id: input.product_id,
            sku: input.sku,
            brand: input.brand,
            name: input.name,
            requested: input.requested,
            assigned: 0,
            received: 0,
            pending: Some(input.requested),
            completed: false,
            estimated_unit_price_usd: input.estimated_unit_price_usd,
            target_sale_price_pen: input.target_sale_price_pen,
        })
    }

    /// The product this line tracks.
    #[must_use]
    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Stock-keeping unit.
    #[must_use]
    pub fn sku(&self) -> &str {
        &self.sku
    }

    /// Brand name.
    #[must_use]
    pub fn brand(&self) -> &str {
        &self.brand
    }

    /// Product name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The quantity originally requested. Fixed at creation.
    #[must_use]
    pub const fn requested(&self) -> u32 {
        self.requested
    }

    /// Total quantity promised by non-cancelled assignments.
    #[must_use]
    pub const fn assigned(&self) -> u32 {
        self.assigned
    }

    /// Total quantity received across non-cancelled assignments.
    #[must_use]
    pub const fn received(&self) -> u32 {
        self.received
    }

    /// The quantity still unallocated, never negative.
    ///
    /// Records written before the counter existed store no value; for those
    /// the fallback `requested - assigned` is computed here.
    #[must_use]
    pub const fn pending(&self) -> u32 {
        match self.pending {
            Some(pending) => pending,
            None => self.requested.saturating_sub(self.assigned),
        }
    }

    /// Whether the received quantity covers the requested quantity.
    #[must_use]
    pub const fn completed(&self) -> bool {
        self.completed
    }

    /// Estimated unit purchase price, in USD.
    #[must_use]
    pub const fn estimated_unit_price_usd(&self) -> Option<f64> {
        self.estimated_unit_price_usd
    }

    /// Target sale price, in PEN.
    #[must_use]
    pub const fn target_sale_price_pen(&self) -> Option<f64> {
        self.target_sale_price_pen
    }
}
