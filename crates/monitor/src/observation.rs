//! Inbound inventory mutation records.

use serde::{Deserialize, Serialize};

use stockpilot_core::{DomainError, DomainResult, SubjectId, TenantId};

/// One observed inventory mutation for a subject.
///
/// `previous_quantity` is the reading before this mutation, when one exists;
/// it is what lets the trigger policy tell a worsening breach from a
/// recovering one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockObservation {
    pub tenant_id: TenantId,
    pub subject_id: SubjectId,
    pub subject_name: String,
    pub previous_quantity: Option<i64>,
    pub new_quantity: i64,
    /// Total outstanding demand for the subject across open orders.
    pub required_quantity: i64,
    /// True when this observation is the subject's creation event.
    pub is_new_subject: bool,
}

impl StockObservation {
    /// Demand exceeds availability, independent of any threshold config.
    pub fn is_high_demand(&self) -> bool {
        self.required_quantity > self.new_quantity
    }

    /// Reject readings that cannot come from a well-formed inventory feed.
    pub fn validate(&self) -> DomainResult<()> {
        if self.new_quantity < 0 {
            return Err(DomainError::validation("new_quantity must be non-negative"));
        }
        if self.required_quantity < 0 {
            return Err(DomainError::validation(
                "required_quantity must be non-negative",
            ));
        }
        if matches!(self.previous_quantity, Some(prev) if prev < 0) {
            return Err(DomainError::validation(
                "previous_quantity must be non-negative",
            ));
        }
        Ok(())
    }
}
