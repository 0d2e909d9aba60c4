//! # Domain Events
//!
//! Facts emitted after a state change commits. The engine writes each event
//! into the outbox in the same transaction as the change, so an event exists
//! if and only if its change does. Delivery (audit log, notifications,
//! receipt printing) happens outside the engine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{LoanStatus, MovementType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type")]
pub enum DomainEvent {
    LoanCreated {
        loan_id: String,
        loan_number: String,
        customer_id: String,
        item_id: String,
        branch_id: String,
        principal: Money,
        interest_amount: Money,
        total_amount: Money,
        #[ts(as = "String")]
        due_date: NaiveDate,
        cash_session_id: Option<String>,
        #[ts(as = "String")]
        at: DateTime<Utc>,
    },
    LoanRenewed {
        loan_id: String,
        loan_number: String,
        renewal_sequence: u32,
        principal_remaining: Money,
        interest_amount: Money,
        #[ts(as = "String")]
        new_due_date: NaiveDate,
        #[ts(as = "String")]
        at: DateTime<Utc>,
    },
    LoanMarkedOverdue {
        loan_id: String,
        loan_number: String,
        days_overdue: i64,
        late_fee_accrued: Money,
        #[ts(as = "String")]
        at: DateTime<Utc>,
    },
    LoanConfiscated {
        loan_id: String,
        loan_number: String,
        item_id: String,
        principal_remaining: Money,
        #[ts(as = "String")]
        at: DateTime<Utc>,
    },
    PaymentApplied {
        payment_id: String,
        payment_number: String,
        loan_id: String,
        amount: Money,
        principal_amount: Money,
        interest_amount: Money,
        late_fee_amount: Money,
        principal_remaining: Money,
        loan_status: LoanStatus,
        cash_session_id: Option<String>,
        #[ts(as = "String")]
        at: DateTime<Utc>,
    },
    CashSessionOpened {
        session_id: String,
        register_id: String,
        opened_by: String,
        opening_amount: Money,
        #[ts(as = "String")]
        at: DateTime<Utc>,
    },
    CashSessionClosed {
        session_id: String,
        register_id: String,
        expected_amount: Money,
        counted_amount: Money,
        difference: Money,
        #[ts(as = "String")]
        at: DateTime<Utc>,
    },
    CashMovementRecorded {
        movement_id: String,
        session_id: String,
        movement_type: MovementType,
        amount: Money,
        #[ts(as = "String")]
        at: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Outbox `event_type` column.
    pub const fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::LoanCreated { .. } => "LoanCreated",
            DomainEvent::LoanRenewed { .. } => "LoanRenewed",
            DomainEvent::LoanMarkedOverdue { .. } => "LoanMarkedOverdue",
            DomainEvent::LoanConfiscated { .. } => "LoanConfiscated",
            DomainEvent::PaymentApplied { .. } => "PaymentApplied",
            DomainEvent::CashSessionOpened { .. } => "CashSessionOpened",
            DomainEvent::CashSessionClosed { .. } => "CashSessionClosed",
            DomainEvent::CashMovementRecorded { .. } => "CashMovementRecorded",
        }
    }

    /// The loan, payment or session this event is about.
    pub fn aggregate_id(&self) -> &str {
        match self {
            DomainEvent::LoanCreated { loan_id, .. }
            | DomainEvent::LoanRenewed { loan_id, .. }
            | DomainEvent::LoanMarkedOverdue { loan_id, .. }
            | DomainEvent::LoanConfiscated { loan_id, .. } => loan_id,
            DomainEvent::PaymentApplied { payment_id, .. } => payment_id,
            DomainEvent::CashSessionOpened { session_id, .. }
            | DomainEvent::CashSessionClosed { session_id, .. } => session_id,
            DomainEvent::CashMovementRecorded { movement_id, .. } => movement_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = DomainEvent::CashSessionOpened {
            session_id: "s-1".to_string(),
            register_id: "r-1".to_string(),
            opened_by: "u-1".to_string(),
            opening_amount: Money::from_cents(50_000),
            at: Utc::now(),
        };

        assert_eq!(event.event_type(), "CashSessionOpened");
        assert_eq!(event.aggregate_id(), "s-1");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CashSessionOpened");
        assert_eq!(json["opening_amount"], 50_000);

        let back: DomainEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
