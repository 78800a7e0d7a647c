//! The requirement root aggregate.
//!
//! A requirement owns its line items and assignments exclusively; every
//! mutation goes through the registry, and after every assignment mutation
//! the cached aggregates are rebuilt from scratch by
//! [`reconcile`](crate::domain::reconcile).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Assignment, AssignmentId, Error, LineInput, LineItem, ReqNumber,
    reconcile::{compute_lines, compute_summary},
};

/// The overall state of a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementState {
    /// Registered, awaiting approval.
    Pending,
    /// Approved, no party assigned yet.
    Approved,
    /// At least one assignment exists.
    InProgress,
    /// Every line's received quantity covers its requested quantity.
    Completed,
    /// Explicitly cancelled. Terminal; requirements are never deleted.
    Cancelled,
}

impl RequirementState {
    /// The wire label for this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequirementState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequirementState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown requirement state '{other}'")),
        }
    }
}

/// Informational priority; it never constrains allocation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Can wait.
    Low,
    /// The default.
    #[default]
    Normal,
    /// Should be covered soon.
    High,
    /// Needed immediately.
    Urgent,
}

impl Priority {
    /// The wire label for this priority.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// Cached reconciliation output for a requirement.
///
/// Always derivable from the lines and assignments; never the source of
/// truth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Distinct parties across all assignments, cancelled included.
    pub total_responsible_parties: usize,
    /// Distinct parties across non-cancelled assignments.
    pub active_responsible_parties: usize,
    /// Sum of assigned quantities across all lines.
    pub total_assigned_quantity: u32,
    /// Sum of received quantities across all lines.
    pub total_received_quantity: u32,
    /// `round(100 * received / requested)`, `0` when nothing was requested.
    pub percent_complete: u32,
}

/// Creation metadata for a requirement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequirementDraft {
    /// Short human-readable description of the need.
    pub title: String,
    /// Informational priority.
    pub priority: Priority,
    /// Who registered the need, if known.
    pub requested_by: Option<String>,
    /// Free-text notes.
    pub notes: String,
}

/// A registered need for specified quantities of specific products.
///
/// The root aggregate: owns its [`LineItem`]s and [`Assignment`]s, carries a
/// cached [`Summary`], and is only ever mutated through the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub(crate) id: Uuid,
    pub(crate) number: ReqNumber,
    pub(crate) title: String,
    pub(crate) priority: Priority,
    pub(crate) state: RequirementState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) requested_by: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) notes: String,
    pub(crate) created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) cancelled_at: Option<DateTime<Utc>>,
    pub(crate) lines: Vec<LineItem>,
    #[serde(default)]
    pub(crate) assignments: Vec<Assignment>,
    #[serde(default)]
    pub(crate) summary: Summary,
}

impl Requirement {
    /// Builds a new requirement in state `pending` with every line fully
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if no lines are supplied, a requested
    /// quantity is zero, or a product id appears more than once.
    pub(crate) fn new(
        number: ReqNumber,
        draft: RequirementDraft,
        lines: Vec<LineInput>,
        now: DateTime<Utc>,
    ) -> Result<Self, Error> {
        if lines.is_empty() {
            return Err(Error::validation(
                "a requirement must have at least one line",
            ));
        }

        let mut built: Vec<LineItem> = Vec::with_capacity(lines.len());
        for input in lines {
            if built.iter().any(|line| line.product_id == input.product_id) {
                return Err(Error::validation(format!(
                    "duplicate product {} in requirement lines",
                    input.product_id
                )));
            }
            built.push(LineItem::new(input)?);
        }

        let summary = compute_summary(&built, &[]);

        Ok(Self {
            id: Uuid::new_v4(),
            number,
            title: draft.title,
            priority: draft.priority,
            state: RequirementState::Pending,
            requested_by: draft.requested_by,
            notes: draft.notes,
            created_at: now,
            approved_by: None,
            approved_at: None,
            completed_at: None,
            cancelled_at: None,
            lines: built,
            assignments: Vec::new(),
            summary,
        })
    }

    /// The opaque, stable identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The human-readable sequential number.
    #[must_use]
    pub const fn number(&self) -> ReqNumber {
        self.number
    }

    /// The requirement's title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Informational priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// The current overall state.
    #[must_use]
    pub const fn state(&self) -> RequirementState {
        self.state
    }

    /// Who registered the need, if known.
    #[must_use]
    pub fn requested_by(&self) -> Option<&str> {
        self.requested_by.as_deref()
    }

    /// Free-text notes, including appended cancellation reasons.
    #[must_use]
    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// When the requirement was registered.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Who approved the requirement, if anyone.
    #[must_use]
    pub fn approved_by(&self) -> Option<&str> {
        self.approved_by.as_deref()
    }

    /// When the requirement was approved, if it was.
    #[must_use]
    pub const fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    /// When the last line completed, if the requirement ever completed.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// When the requirement was cancelled, if it was.
    #[must_use]
    pub const fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    /// The per-product ledgers, in creation order.
    #[must_use]
    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    /// Looks up a line by product id.
    #[must_use]
    pub fn line(&self, product_id: &str) -> Option<&LineItem> {
        self.lines.iter().find(|line| line.product_id == product_id)
    }

    /// The assignments, in creation order. Cancelled assignments stay in
    /// the list.
    #[must_use]
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Looks up an assignment by id.
    #[must_use]
    pub fn assignment(&self, id: &AssignmentId) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.id() == id)
    }

    pub(crate) fn assignment_mut(&mut self, id: &AssignmentId) -> Option<&mut Assignment> {
        self.assignments.iter_mut().find(|a| &a.id == id)
    }

    /// The cached reconciliation output.
    #[must_use]
    pub const fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Whether every line's received quantity covers its requested quantity.
    #[must_use]
    pub fn is_fully_received(&self) -> bool {
        self.lines.iter().all(LineItem::completed)
    }

    /// Rebuilds the line aggregates and the summary from the current
    /// assignment set, replacing the stored values wholesale.
    pub(crate) fn reconcile(&mut self) {
        self.lines = compute_lines(&self.lines, &self.assignments);
        self.summary = compute_summary(&self.lines, &self.assignments);
    }
}
