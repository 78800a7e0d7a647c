//! Reconciliation: rebuilding aggregate counters from the assignment set.
//!
//! Both operations here are pure and idempotent. They are called after
//! every assignment create, update, or cancel, and their output fully
//! replaces the requirement's stored lines and summary. Counters are never
//! patched incrementally, so independent mutation paths cannot drift. The
//! full scan is O(assignments × lines); both collections are bounded by
//! business reality (a handful of parties, a few dozen lines).

use std::collections::HashSet;

use crate::domain::{Assignment, LineItem, Summary};

/// Recomputes every line's aggregate counters from the assignment set.
///
/// Non-cancelled assignments contribute their full assigned and received
/// quantities. A cancelled assignment contributes only its received
/// quantity, to both sums: goods already delivered stay on the books, while
/// the unreceived remainder of the promise returns to the pending pool.
///
/// `pending` is `requested - assigned`, floored at zero; `completed` is
/// `received >= requested`. Historical data may carry `received` without a
/// matching `assigned`; sums saturate rather than panic.
#[must_use]
pub fn compute_lines(lines: &[LineItem], assignments: &[Assignment]) -> Vec<LineItem> {
    lines
        .iter()
        .map(|line| {
            let mut assigned = 0u32;
            let mut received = 0u32;

            for assignment in assignments {
                for assignment_line in assignment.lines() {
                    if assignment_line.product_id() != line.product_id() {
                        continue;
                    }
                    if assignment.state().is_cancelled() {
                        assigned = assigned.saturating_add(assignment_line.received());
                    } else {
                        assigned = assigned.saturating_add(assignment_line.assigned());
                    }
                    received = received.saturating_add(assignment_line.received());
                }
            }

            let mut out = line.clone();
            out.assigned = assigned;
            out.received = received;
            out.pending = Some(line.requested.saturating_sub(assigned));
            out.completed = received >= line.requested;
            out
        })
        .collect()
}

/// Recomputes the requirement-level summary.
///
/// Expects `lines` to be the output of [`compute_lines`] for the same
/// assignment set; party counts come from the assignments, quantity totals
/// from the lines.
#[must_use]
pub fn compute_summary(lines: &[LineItem], assignments: &[Assignment]) -> Summary {
    let total_parties: HashSet<&str> = assignments
        .iter()
        .map(|assignment| assignment.party().id.as_str())
        .collect();
    let active_parties: HashSet<&str> = assignments
        .iter()
        .filter(|assignment| !assignment.state().is_cancelled())
        .map(|assignment| assignment.party().id.as_str())
        .collect();

    let total_requested = lines
        .iter()
        .fold(0u32, |sum, line| sum.saturating_add(line.requested()));
    let total_assigned = lines
        .iter()
        .fold(0u32, |sum, line| sum.saturating_add(line.assigned()));
    let total_received = lines
        .iter()
        .fold(0u32, |sum, line| sum.saturating_add(line.received()));

    Summary {
        total_responsible_parties: total_parties.len(),
        active_responsible_parties: active_parties.len(),
        total_assigned_quantity: total_assigned,
        total_received_quantity: total_received,
        percent_complete: percent(total_received, total_requested),
    }
}

/// `round(100 * received / requested)` with half-up rounding, `0` when
/// nothing was requested.
fn percent(received: u32, requested: u32) -> u32 {
    if requested == 0 {
        return 0;
    }
    let received = u64::from(received);
    let requested = u64::from(requested);
    u32::try_from((received * 200 + requested) / (requested * 2)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use test_case::test_case;

    use super::*;
    use crate::domain::{
        AssignmentId, AssignmentLine, AssignmentState, LineInput, PartyCode, PartyRef,
        ReceivedQuantity,
    };

    fn line(product_id: &str, requested: u32) -> LineItem {
        LineItem::new(LineInput {
            product_id: product_id.to_string(),
            sku: format!("SKU-{product_id}"),
            brand: "Acme".to_string(),
            name: format!("Product {product_id}"),
            requested,
            estimated_unit_price_usd: None,
            target_sale_price_pen: None,
        })
        .unwrap()
    }

    fn party(id: &str) -> PartyRef {
        PartyRef {
            id: id.to_string(),
            display_name: format!("Party {id}"),
            code: PartyCode::try_from("X").unwrap(),
            is_traveler: true,
        }
    }

    fn assignment(party_id: &str, lines: Vec<(&str, u32)>) -> Assignment {
        let lines: Vec<AssignmentLine> = lines
            .into_iter()
            .map(|(product, quantity)| AssignmentLine::new(product.to_string(), quantity))
            .collect();
        let lines = nonempty::NonEmpty::from_vec(lines).unwrap();
        Assignment::new(
            AssignmentId::generate(Utc::now()),
            party(party_id),
            lines,
            Utc::now(),
        )
    }

    fn receive(assignment: &mut Assignment, product: &str, quantity: u32) {
        assignment
            .record_received(
                &[ReceivedQuantity {
                    product_id: product.to_string(),
                    quantity,
                }],
                false,
            )
            .unwrap();
    }

    #[test]
    fn sums_assigned_per_product_across_assignments() {
        let lines = vec![line("A", 10), line("B", 4)];
        let assignments = vec![
            assignment("p-1", vec![("A", 3), ("B", 2)]),
            assignment("p-2", vec![("A", 4)]),
        ];

        let computed = compute_lines(&lines, &assignments);

        assert_eq!(computed[0].assigned(), 7);
        assert_eq!(computed[0].pending(), 3);
        assert_eq!(computed[1].assigned(), 2);
        assert_eq!(computed[1].pending(), 2);
    }

    #[test]
    fn cancelled_promise_without_receipts_is_fully_released() {
        let lines = vec![line("A", 10)];
        let mut cancelled = assignment("p-1", vec![("A", 6)]);
        cancelled.cancel("no longer travelling").unwrap();
        let assignments = vec![cancelled, assignment("p-2", vec![("A", 3)])];

        let computed = compute_lines(&lines, &assignments);

        assert_eq!(computed[0].assigned(), 3);
        assert_eq!(computed[0].pending(), 7);
    }

    #[test]
    fn cancellation_releases_only_the_unreceived_quantity() {
        // assigned=10, received=3 on a line with requested=10: cancelling
        // raises pending by 7 and leaves received at 3. The delivered goods
        // stay on the books.
        let lines = vec![line("A", 10)];
        let mut a = assignment("p-1", vec![("A", 10)]);
        receive(&mut a, "A", 3);

        let before = compute_lines(&lines, std::slice::from_ref(&a));
        assert_eq!(before[0].pending(), 0);
        assert_eq!(before[0].received(), 3);

        a.cancel("trip cancelled").unwrap();
        let after = compute_lines(&lines, &[a]);
        assert_eq!(after[0].pending(), 7);
        assert_eq!(after[0].received(), 3);
        assert_eq!(after[0].assigned(), 3);
    }

    #[test]
    fn pending_never_goes_negative() {
        let lines = vec![line("A", 5)];
        // Over-assignment can exist in historical data; pending floors at 0.
        let assignments = vec![
            assignment("p-1", vec![("A", 4)]),
            assignment("p-2", vec![("A", 4)]),
        ];

        let computed = compute_lines(&lines, &assignments);

        assert_eq!(computed[0].assigned(), 8);
        assert_eq!(computed[0].pending(), 0);
    }

    #[test]
    fn received_without_assigned_does_not_crash() {
        // Historical records sometimes carry receipts that were never
        // backed by an assigned bump.
        let lines = vec![line("A", 5)];
        let mut a = assignment("p-1", vec![("A", 0)]);
        receive(&mut a, "A", 2);

        let computed = compute_lines(&lines, &[a]);

        assert_eq!(computed[0].assigned(), 0);
        assert_eq!(computed[0].received(), 2);
        assert_eq!(computed[0].pending(), 5);
        assert!(!computed[0].completed());
    }

    #[test]
    fn completed_when_received_covers_requested() {
        let lines = vec![line("A", 4)];
        let mut a = assignment("p-1", vec![("A", 4)]);
        receive(&mut a, "A", 4);

        let computed = compute_lines(&lines, &[a]);
        assert!(computed[0].completed());
    }

    #[test]
    fn idempotent_given_the_same_assignment_set() {
        let lines = vec![line("A", 10), line("B", 4)];
        let mut cancelled = assignment("p-3", vec![("A", 2)]);
        receive(&mut cancelled, "A", 1);
        cancelled.cancel("supplier folded").unwrap();
        let assignments = vec![
            assignment("p-1", vec![("A", 3), ("B", 2)]),
            assignment("p-2", vec![("A", 4)]),
            cancelled,
        ];

        let once = compute_lines(&lines, &assignments);
        let twice = compute_lines(&once, &assignments);
        assert_eq!(once, twice);

        let summary_once = compute_summary(&once, &assignments);
        let summary_twice = compute_summary(&twice, &assignments);
        assert_eq!(summary_once, summary_twice);
    }

    #[test]
    fn summary_counts_distinct_parties() {
        let lines = vec![line("A", 10)];
        let mut cancelled = assignment("p-2", vec![("A", 2)]);
        cancelled.cancel("out of stock").unwrap();
        let assignments = vec![
            assignment("p-1", vec![("A", 3)]),
            assignment("p-1", vec![("A", 1)]),
            cancelled,
        ];

        let computed = compute_lines(&lines, &assignments);
        let summary = compute_summary(&computed, &assignments);

        assert_eq!(summary.total_responsible_parties, 2);
        assert_eq!(summary.active_responsible_parties, 1);
        assert_eq!(summary.total_assigned_quantity, 4);
    }

    #[test]
    fn summary_of_empty_requirement_is_zeroed() {
        let lines = vec![line("A", 10)];
        let summary = compute_summary(&compute_lines(&lines, &[]), &[]);
        assert_eq!(summary, Summary::default());
    }

    #[test_case(0, 10, 0; "nothing received")]
    #[test_case(5, 10, 50; "half")]
    #[test_case(1, 3, 33; "rounds down below half")]
    #[test_case(2, 3, 67; "rounds up above half")]
    #[test_case(1, 8, 13; "eighth rounds half up")]
    #[test_case(10, 10, 100; "complete")]
    #[test_case(12, 10, 120; "over-receipt exceeds one hundred")]
    #[test_case(3, 0, 0; "zero requested")]
    fn percent_complete(received: u32, requested: u32, expected: u32) {
        assert_eq!(percent(received, requested), expected);
    }

    #[test]
    fn received_assignments_still_count_toward_sums() {
        let lines = vec![line("A", 6)];
        let mut a = assignment("p-1", vec![("A", 6)]);
        receive(&mut a, "A", 6);
        a.advance(AssignmentState::Received).unwrap();

        let computed = compute_lines(&lines, &[a]);
        assert_eq!(computed[0].assigned(), 6);
        assert_eq!(computed[0].received(), 6);
        assert!(computed[0].completed());
    }

    #[test]
    fn products_not_in_an_assignment_are_untouched() {
        let lines = vec![line("A", 5), line("B", 5)];
        let assignments = vec![assignment("p-1", vec![("A", 5)])];

        let computed = compute_lines(&lines, &assignments);
        assert_eq!(computed[1].assigned(), 0);
        assert_eq!(computed[1].pending(), 5);
    }
}
