//! # Repository Module
//!
//! Database repositories for the pawn ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories & the Unit of Work                      │
//! │                                                                         │
//! │  Engine operation                                                      │
//! │       │                                                                 │
//! │       │  let mut tx = db.begin().await?;                               │
//! │       ▼                                                                 │
//! │  db.loans().lock(&mut *tx, id)          ← first statement: write lock  │
//! │  db.loans().get(&mut *tx, id)                                          │
//! │  db.payments().insert(&mut *tx, &payment)                              │
//! │  db.cash().insert_movement(&mut *tx, &movement)                        │
//! │  db.outbox().append(&mut *tx, &event, now)                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tx.commit().await?                     ← all or nothing               │
//! │                                                                         │
//! │  Repositories hold no connection of their own, so any number of them   │
//! │  can take part in one transaction.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`item::ItemRepository`] - Collateral items and status
//! - [`customer::CustomerRepository`] - Borrowers
//! - [`loan::LoanRepository`] - Loans, renewals, overdue scan
//! - [`payment::PaymentRepository`] - Append-only payments
//! - [`cash::CashRepository`] - Registers, sessions, movements
//! - [`sequence::SequenceRepository`] - Loan / payment numbers
//! - [`outbox::OutboxRepository`] - Domain event outbox

pub mod cash;
pub mod customer;
pub mod item;
pub mod loan;
pub mod outbox;
pub mod payment;
pub mod sequence;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use crate::{Database, DbConfig, DbError};
    use pawn_core::events::DomainEvent;
    use pawn_core::lifecycle::compute_terms;
    use pawn_core::{
        CashMovement, CashRegister, CashSession, CashSessionStatus, Customer, Item, ItemStatus,
        Lifecycle, Loan, LoanStatus, Money, MovementReference, MovementType, PaymentPlan, Rate,
    };

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn item(id: &str) -> Item {
        let now = Utc::now();
        Item {
            id: id.to_string(),
            branch_id: "b-1".to_string(),
            description: "Gold ring".to_string(),
            appraised_value: Money::from_cents(200_000),
            loan_value: Money::from_cents(150_000),
            status: ItemStatus::Available,
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn customer(id: &str) -> Customer {
        Customer {
            id: id.to_string(),
            full_name: "Ana Torres".to_string(),
            is_active: true,
            lifecycle: Lifecycle::Active,
            created_at: Utc::now(),
        }
    }

    fn loan(id: &str, number: &str, item_id: &str) -> Loan {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let terms = compute_terms(
            Money::from_cents(100_000),
            Rate::from_percent(10),
            30,
            &PaymentPlan::Installments { count: 2 },
            start,
            30,
        );
        let now = Utc::now();
        Loan {
            id: id.to_string(),
            loan_number: number.to_string(),
            customer_id: "c-1".to_string(),
            item_id: item_id.to_string(),
            branch_id: "b-1".to_string(),
            principal: Money::from_cents(100_000),
            interest_rate: Rate::from_percent(10),
            interest_amount: terms.interest_amount,
            total_amount: terms.total_amount,
            amount_paid: Money::zero(),
            principal_remaining: Money::from_cents(100_000),
            interest_paid: Money::zero(),
            late_fees_paid: Money::zero(),
            late_fees_accrued: Money::zero(),
            late_fee_accrued_through: None,
            start_date: terms.start_date,
            due_date: terms.due_date,
            term_days: 30,
            grace_period_days: 3,
            late_fee_rate: Rate::from_bps(50),
            payment_plan: PaymentPlan::Installments { count: 2 },
            next_payment_date: terms.next_payment_date,
            renewal_count: 0,
            status: LoanStatus::Active,
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_loan_round_trips_and_locks() {
        let db = setup().await;
        let mut tx = db.begin().await.unwrap();
        db.customers().insert(&mut *tx, &customer("c-1")).await.unwrap();
        db.items().insert(&mut *tx, &item("i-1")).await.unwrap();
        let original = loan("l-1", "LN-20260101-0001", "i-1");
        db.loans().insert(&mut *tx, &original).await.unwrap();

        assert!(db.loans().lock(&mut *tx, "l-1").await.unwrap());
        assert!(!db.loans().lock(&mut *tx, "missing").await.unwrap());

        let stored = db.loans().get(&mut *tx, "l-1").await.unwrap().unwrap();
        assert_eq!(stored.payment_plan, PaymentPlan::Installments { count: 2 });
        assert_eq!(stored.due_date, original.due_date);
        assert_eq!(stored.total_amount.cents(), 110_000);

        let open = db.loans().find_open_by_item(&mut *tx, "i-1").await.unwrap();
        assert_eq!(open.map(|l| l.id), Some("l-1".to_string()));

        let mut changed = stored;
        changed.late_fees_accrued = Money::from_cents(1_500);
        changed.late_fee_accrued_through = NaiveDate::from_ymd_opt(2026, 2, 8);
        db.loans().update(&mut *tx, &changed).await.unwrap();
        let reread = db.loans().get(&mut *tx, "l-1").await.unwrap().unwrap();
        assert_eq!(reread.late_fees_accrued.cents(), 1_500);
        assert_eq!(reread.late_fee_accrued_through, changed.late_fee_accrued_through);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_open_loan_on_item_is_rejected() {
        let db = setup().await;
        let mut tx = db.begin().await.unwrap();
        db.customers().insert(&mut *tx, &customer("c-1")).await.unwrap();
        db.items().insert(&mut *tx, &item("i-1")).await.unwrap();
        db.loans()
            .insert(&mut *tx, &loan("l-1", "LN-1", "i-1"))
            .await
            .unwrap();

        let err = db
            .loans()
            .insert(&mut *tx, &loan("l-2", "LN-2", "i-1"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation(), "{err}");

        // A paid loan no longer holds the item.
        let mut paid = db.loans().get(&mut *tx, "l-1").await.unwrap().unwrap();
        paid.status = LoanStatus::Paid;
        db.loans().update(&mut *tx, &paid).await.unwrap();
        db.loans()
            .insert(&mut *tx, &loan("l-2", "LN-2", "i-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_overdue_candidates_respect_grace() {
        let db = setup().await;
        let mut tx = db.begin().await.unwrap();
        db.customers().insert(&mut *tx, &customer("c-1")).await.unwrap();
        db.items().insert(&mut *tx, &item("i-1")).await.unwrap();
        db.loans()
            .insert(&mut *tx, &loan("l-1", "LN-1", "i-1"))
            .await
            .unwrap();

        // Due 2026-01-31, grace 3 days: candidate from 2026-02-04.
        let on_last_grace_day = NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();
        let after_grace = NaiveDate::from_ymd_opt(2026, 2, 4).unwrap();
        assert!(db
            .loans()
            .list_overdue_candidates(&mut *tx, on_last_grace_day)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            db.loans()
                .list_overdue_candidates(&mut *tx, after_grace)
                .await
                .unwrap(),
            vec!["l-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_item_status_update_is_conditional() {
        let db = setup().await;
        let mut tx = db.begin().await.unwrap();
        db.items().insert(&mut *tx, &item("i-1")).await.unwrap();
        let now = Utc::now();

        assert!(db
            .items()
            .update_status(&mut *tx, "i-1", ItemStatus::Available, ItemStatus::Pledged, now)
            .await
            .unwrap());
        assert!(!db
            .items()
            .update_status(&mut *tx, "i-1", ItemStatus::Available, ItemStatus::Pledged, now)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_sequence_numbers_increment_per_day() {
        let db = setup().await;
        let mut tx = db.begin().await.unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        let next_day = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();

        let seq = db.sequences();
        assert_eq!(seq.next_number(&mut *tx, "LN", day).await.unwrap(), "LN-20260131-0001");
        assert_eq!(seq.next_number(&mut *tx, "LN", day).await.unwrap(), "LN-20260131-0002");
        assert_eq!(seq.next_number(&mut *tx, "PY", day).await.unwrap(), "PY-20260131-0001");
        assert_eq!(seq.next_number(&mut *tx, "LN", next_day).await.unwrap(), "LN-20260201-0001");
    }

    #[tokio::test]
    async fn test_one_open_session_per_register() {
        let db = setup().await;
        let mut tx = db.begin().await.unwrap();
        let now = Utc::now();
        let register = CashRegister {
            id: "r-1".to_string(),
            branch_id: "b-1".to_string(),
            name: "Caja 1".to_string(),
            is_active: true,
            created_at: now,
        };
        db.cash().insert_register(&mut *tx, &register).await.unwrap();

        let session = |id: &str| CashSession {
            id: id.to_string(),
            register_id: "r-1".to_string(),
            opened_by: "u-1".to_string(),
            opening_amount: Money::from_cents(50_000),
            status: CashSessionStatus::Open,
            opened_at: now,
            closing: None,
            notes: None,
        };
        db.cash().insert_session(&mut *tx, &session("s-1")).await.unwrap();
        let err = db.cash().insert_session(&mut *tx, &session("s-2")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        for (movement_type, cents) in [
            (MovementType::IncomePayment, 20_000),
            (MovementType::ExpenseSupplier, -5_000),
            (MovementType::IncomePayment, 1_000),
        ] {
            let movement = CashMovement {
                id: Uuid::new_v4().to_string(),
                session_id: "s-1".to_string(),
                movement_type,
                amount: Money::from_cents(cents),
                reference: MovementReference::None,
                description: None,
                created_by: "u-1".to_string(),
                created_at: now,
            };
            db.cash().insert_movement(&mut *tx, &movement).await.unwrap();
        }

        let totals = db.cash().totals_by_type(&mut *tx, "s-1").await.unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].movement_type, MovementType::IncomePayment);
        assert_eq!(totals[0].total.cents(), 21_000);
        assert_eq!(totals[0].count, 2);

        let listed = db.cash().list_movements(&mut *tx, "s-1").await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[1].movement_type, MovementType::ExpenseSupplier);
    }

    #[tokio::test]
    async fn test_outbox_delivery_cycle() {
        let db = setup().await;
        let mut tx = db.begin().await.unwrap();
        let now = Utc::now();
        let event = DomainEvent::CashSessionOpened {
            session_id: "s-1".to_string(),
            register_id: "r-1".to_string(),
            opened_by: "u-1".to_string(),
            opening_amount: Money::from_cents(50_000),
            at: now,
        };

        let entry = db.outbox().append(&mut *tx, &event, now).await.unwrap();
        assert_eq!(entry.event_type, "CashSessionOpened");

        let pending = db.outbox().pending(&mut *tx, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        let decoded: DomainEvent = serde_json::from_str(&pending[0].payload).unwrap();
        assert_eq!(decoded, event);

        db.outbox()
            .mark_failed(&mut *tx, &entry.id, "printer offline", now)
            .await
            .unwrap();
        let pending = db.outbox().pending(&mut *tx, 10).await.unwrap();
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("printer offline"));

        db.outbox().mark_delivered(&mut *tx, &entry.id, now).await.unwrap();
        assert_eq!(db.outbox().count_pending(&mut *tx).await.unwrap(), 0);
    }
}
