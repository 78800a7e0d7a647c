//! Fleet-wide statistics over all requirements.
//!
//! A read-only full-collection scan; it never mutates anything and must be
//! treated as expensive. Malformed documents are skipped at the store layer
//! rather than aborting the whole scan.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    domain::{Requirement, RequirementState},
    storage::{Store, StoreError},
};

/// How completely a requirement's quantities are covered by assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Allocation {
    /// No quantity assigned at all.
    Unassigned,
    /// Some, but not all, quantity assigned.
    PartiallyAssigned,
    /// Every line's pending pool is empty.
    FullyAssigned,
}

impl Allocation {
    fn of(requirement: &Requirement) -> Self {
        if requirement.summary().total_assigned_quantity == 0 {
            Self::Unassigned
        } else if requirement.lines().iter().all(|line| line.pending() == 0) {
            Self::FullyAssigned
        } else {
            Self::PartiallyAssigned
        }
    }
}

/// Per-party rollup across every non-cancelled assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartyTotals {
    /// Display name captured from the most recent assignment seen.
    pub display_name: String,
    /// Number of distinct requirements the party is assigned on.
    pub requirements: usize,
    /// Total quantity promised across all assignments.
    pub total_assigned_quantity: u64,
    /// Sum of estimated assignment costs, in USD.
    pub total_estimated_cost_usd: f64,
}

/// Fleet-wide counts and totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    /// Number of requirements scanned.
    pub total: usize,
    /// Requirement counts keyed by state.
    pub by_state: BTreeMap<RequirementState, usize>,
    /// Requirement counts keyed by allocation completeness.
    pub by_allocation: BTreeMap<Allocation, usize>,
    /// Sum of estimated costs across non-cancelled assignments, in USD.
    pub total_estimated_cost_usd: f64,
    /// Sum of real costs across non-cancelled assignments, in USD.
    pub total_real_cost_usd: f64,
    /// Per-party rollups keyed by party id.
    pub parties: BTreeMap<String, PartyTotals>,
}

impl Statistics {
    /// Scans every requirement in the store and folds the totals.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store cannot enumerate the collection;
    /// individual unreadable documents are skipped by the store.
    pub fn collect<S: Store>(store: &S) -> Result<Self, StoreError> {
        let mut stats = Self::default();

        for requirement in store.scan_all()? {
            stats.fold(&requirement);
        }

        Ok(stats)
    }

    fn fold(&mut self, requirement: &Requirement) {
        self.total += 1;
        *self.by_state.entry(requirement.state()).or_insert(0) += 1;
        *self
            .by_allocation
            .entry(Allocation::of(requirement))
            .or_insert(0) += 1;

        let mut counted: Vec<&str> = Vec::new();
        for assignment in requirement.assignments() {
            if assignment.state().is_cancelled() {
                continue;
            }

            self.total_estimated_cost_usd += assignment.estimated_cost_usd().unwrap_or(0.0);
            self.total_real_cost_usd += assignment.real_cost_usd().unwrap_or(0.0);

            let party = assignment.party();
            let totals = self.parties.entry(party.id.clone()).or_default();
            totals.display_name.clone_from(&party.display_name);
            totals.total_assigned_quantity += u64::from(assignment.total_assigned());
            totals.total_estimated_cost_usd += assignment.estimated_cost_usd().unwrap_or(0.0);
            if !counted.contains(&party.id.as_str()) {
                totals.requirements += 1;
                counted.push(&party.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        Registry,
        domain::{
            AssignmentPatch, Config, LineInput, Party, PartyCode, ReceivedQuantity,
            RequirementDraft, Roster,
        },
        registry::{AllocationRequest, AssignmentOptions},
        storage::MemoryStore,
    };

    fn roster() -> Roster {
        Roster::from_parties(vec![
            Party {
                id: "p-1".to_string(),
                display_name: "Ana Torres".to_string(),
                code: PartyCode::try_from("ANA").unwrap(),
                is_traveler: true,
                next_trip: None,
            },
            Party {
                id: "p-2".to_string(),
                display_name: "Miami Warehouse".to_string(),
                code: PartyCode::try_from("MIA").unwrap(),
                is_traveler: false,
                next_trip: None,
            },
        ])
        .unwrap()
    }

    fn line_input(product_id: &str, requested: u32) -> LineInput {
        LineInput {
            product_id: product_id.to_string(),
            sku: format!("SKU-{product_id}"),
            brand: "Acme".to_string(),
            name: format!("Product {product_id}"),
            requested,
            estimated_unit_price_usd: None,
            target_sale_price_pen: None,
        }
    }

    fn request(product_id: &str, quantity: u32) -> AllocationRequest {
        AllocationRequest {
            product_id: product_id.to_string(),
            quantity,
        }
    }

    #[test]
    fn empty_store_yields_empty_statistics() {
        let store = MemoryStore::new();
        let stats = Statistics::collect(&store).unwrap();
        assert_eq!(stats, Statistics::default());
    }

    #[test]
    fn counts_by_state_and_allocation() {
        let store = MemoryStore::new();
        let registry = Registry::new(&store, roster(), Config::default());

        // One untouched requirement, one partially assigned, one fully
        // assigned and received.
        registry
            .create(RequirementDraft::default(), vec![line_input("A", 5)])
            .unwrap();

        let partial = registry
            .create(RequirementDraft::default(), vec![line_input("A", 5)])
            .unwrap();
        registry
            .assign_responsible(
                partial.id(),
                "p-1",
                &[request("A", 2)],
                AssignmentOptions::default(),
            )
            .unwrap();

        let full = registry
            .create(RequirementDraft::default(), vec![line_input("A", 4)])
            .unwrap();
        let assignment = registry
            .assign_responsible(
                full.id(),
                "p-2",
                &[request("A", 4)],
                AssignmentOptions::default(),
            )
            .unwrap();
        registry
            .mark_received(
                full.id(),
                assignment.id(),
                vec![ReceivedQuantity {
                    product_id: "A".to_string(),
                    quantity: 4,
                }],
            )
            .unwrap();

        let stats = Statistics::collect(&store).unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_state.get(&RequirementState::Pending), Some(&1));
        assert_eq!(stats.by_state.get(&RequirementState::InProgress), Some(&1));
        assert_eq!(stats.by_state.get(&RequirementState::Completed), Some(&1));
        assert_eq!(stats.by_allocation.get(&Allocation::Unassigned), Some(&1));
        assert_eq!(
            stats.by_allocation.get(&Allocation::PartiallyAssigned),
            Some(&1)
        );
        assert_eq!(
            stats.by_allocation.get(&Allocation::FullyAssigned),
            Some(&1)
        );
    }

    #[test]
    fn party_rollup_counts_distinct_requirements_and_quantities() {
        let store = MemoryStore::new();
        let registry = Registry::new(&store, roster(), Config::default());

        let first = registry
            .create(
                RequirementDraft::default(),
                vec![line_input("A", 10), line_input("B", 10)],
            )
            .unwrap();
        registry
            .assign_responsible(
                first.id(),
                "p-1",
                &[request("A", 3)],
                AssignmentOptions {
                    estimated_cost_usd: Some(120.0),
                    ..AssignmentOptions::default()
                },
            )
            .unwrap();
        registry
            .assign_responsible(
                first.id(),
                "p-1",
                &[request("B", 2)],
                AssignmentOptions::default(),
            )
            .unwrap();

        let second = registry
            .create(RequirementDraft::default(), vec![line_input("A", 10)])
            .unwrap();
        registry
            .assign_responsible(
                second.id(),
                "p-1",
                &[request("A", 4)],
                AssignmentOptions {
                    estimated_cost_usd: Some(80.0),
                    ..AssignmentOptions::default()
                },
            )
            .unwrap();

        let stats = Statistics::collect(&store).unwrap();
        let ana = stats.parties.get("p-1").unwrap();

        assert_eq!(ana.display_name, "Ana Torres");
        assert_eq!(ana.requirements, 2);
        assert_eq!(ana.total_assigned_quantity, 9);
        assert!((ana.total_estimated_cost_usd - 200.0).abs() < f64::EPSILON);
        assert!((stats.total_estimated_cost_usd - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cancelled_assignments_are_left_out_of_rollups() {
        let store = MemoryStore::new();
        let registry = Registry::new(&store, roster(), Config::default());

        let requirement = registry
            .create(RequirementDraft::default(), vec![line_input("A", 10)])
            .unwrap();
        let assignment = registry
            .assign_responsible(
                requirement.id(),
                "p-1",
                &[request("A", 3)],
                AssignmentOptions {
                    estimated_cost_usd: Some(50.0),
                    ..AssignmentOptions::default()
                },
            )
            .unwrap();
        registry
            .cancel_assignment(requirement.id(), assignment.id(), "out of stock")
            .unwrap();

        let stats = Statistics::collect(&store).unwrap();
        assert!(stats.parties.is_empty());
        assert!(stats.total_estimated_cost_usd.abs() < f64::EPSILON);
    }

    #[test]
    fn updated_assignment_costs_flow_into_totals() {
        let store = MemoryStore::new();
        let registry = Registry::new(&store, roster(), Config::default());

        let requirement = registry
            .create(RequirementDraft::default(), vec![line_input("A", 10)])
            .unwrap();
        let assignment = registry
            .assign_responsible(
                requirement.id(),
                "p-2",
                &[request("A", 3)],
                AssignmentOptions::default(),
            )
            .unwrap();
        registry
            .update_assignment(
                requirement.id(),
                assignment.id(),
                AssignmentPatch {
                    real_cost_usd: Some(99.5),
                    ..AssignmentPatch::default()
                },
            )
            .unwrap();

        let stats = Statistics::collect(&store).unwrap();
        assert!((stats.total_real_cost_usd - 99.5).abs() < f64::EPSILON);
    }

    #[test]
    fn skips_malformed_documents_in_a_json_store() {
        use crate::storage::JsonDirectory;

        let tmp = tempfile::tempdir().unwrap();
        let json_store = JsonDirectory::open(tmp.path().to_path_buf());
        let registry = Registry::new(&json_store, roster(), Config::default());
        registry
            .create(RequirementDraft::default(), vec![line_input("A", 5)])
            .unwrap();
        std::fs::write(tmp.path().join("REQ-2020-0001.json"), "{ broken").unwrap();

        let stats = Statistics::collect(&json_store).unwrap();
        assert_eq!(stats.total, 1);
    }

    #[test]
    fn allocation_of_unassigned_requirement() {
        let requirement = crate::domain::Requirement::new(
            crate::domain::ReqNumber::new(2026, std::num::NonZeroU32::new(1).unwrap()),
            RequirementDraft::default(),
            vec![line_input("A", 5)],
            Utc::now(),
        )
        .unwrap();
        assert_eq!(Allocation::of(&requirement), Allocation::Unassigned);
    }
}
