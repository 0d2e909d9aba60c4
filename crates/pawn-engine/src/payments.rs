//! # Payment Service
//!
//! Applies a payment to a loan through the waterfall, in one transaction.
//!
//! ```text
//! BEGIN
//!   lock loan, re-read
//!   idempotency key seen on this loan? ──yes──► same amount and method?
//!                                                 yes: return stored payment
//!                                                 no:  conflict (no writes kept)
//!   session given? ─► lock it, must be open
//!   allocate: late fees ─► interest ─► principal   (pawn_core::waterfall)
//!   UPDATE loan; paid off? ─► release item
//!   draw payment number, INSERT payment
//!   session given? ─► income_payment +amount
//!   outbox: PaymentApplied
//! COMMIT
//! ```
//!
//! Two payments on the same loan serialize on the loan lock, so the second
//! one is allocated against what the first left (or rejected as overpayment).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cash::{append_movement, lock_open_session};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::items::ItemCoordinator;
use crate::loans::lock_loan;
use pawn_core::validation::{validate_id, validate_idempotency_key, validate_payment_amount};
use pawn_core::waterfall::{allocate, apply_allocation};
use pawn_core::{
    Clock, CoreError, DomainEvent, Money, MovementReference, MovementType, Payment,
    PaymentMethod,
};
use pawn_db::Database;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyPaymentRequest {
    pub loan_id: String,
    pub amount: Money,
    pub method: PaymentMethod,
    /// Session whose drawer receives the payment.
    pub session_id: Option<String>,
    /// Client-chosen key; retrying with the same key, amount and method on
    /// the same loan returns the original payment.
    pub idempotency_key: Option<String>,
}

impl ApplyPaymentRequest {
    fn validate(&self) -> EngineResult<()> {
        validate_id("loan_id", &self.loan_id)?;
        validate_payment_amount(self.amount)?;
        if let Some(session_id) = &self.session_id {
            validate_id("session_id", session_id)?;
        }
        if let Some(key) = &self.idempotency_key {
            validate_idempotency_key(key)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PaymentService {
    db: Database,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    items: ItemCoordinator,
}

impl PaymentService {
    pub fn new(db: Database, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        PaymentService {
            db,
            clock,
            config,
            items: ItemCoordinator::new(),
        }
    }

    pub async fn apply_payment(&self, request: ApplyPaymentRequest) -> EngineResult<Payment> {
        request.validate()?;

        let now = self.clock.now();
        let today = self.clock.today();
        let mut tx = self.db.begin().await?;

        let mut loan = lock_loan(&mut *tx, &request.loan_id).await?;

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self
                .db
                .payments()
                .find_by_idempotency_key(&mut *tx, &loan.id, key)
                .await?
            {
                if existing.amount != request.amount || existing.method != request.method {
                    warn!(
                        payment_id = %existing.id,
                        loan_id = %loan.id,
                        idempotency_key = %key,
                        "Idempotency key reused for a different payment"
                    );
                    return Err(CoreError::IdempotencyKeyReused {
                        key: key.clone(),
                        payment_id: existing.id,
                    }
                    .into());
                }
                info!(
                    payment_id = %existing.id,
                    loan_id = %loan.id,
                    idempotency_key = %key,
                    "Payment replayed"
                );
                return Ok(existing);
            }
        }

        let session = match &request.session_id {
            Some(session_id) => Some(lock_open_session(&mut *tx, session_id).await?),
            None => None,
        };

        let allocation = allocate(&loan, request.amount, today).map_err(|err| {
            if let CoreError::Overpayment { payoff, .. } = &err {
                warn!(
                    loan_id = %loan.id,
                    requested = %request.amount,
                    payoff = %payoff,
                    "Overpayment rejected"
                );
            }
            err
        })?;

        let applied = apply_allocation(
            &mut loan,
            allocation,
            today,
            self.config.payment_interval_days,
        );
        loan.updated_at = now;
        self.db.loans().update(&mut *tx, &loan).await?;

        if applied.paid_off {
            self.items.release(&mut *tx, &loan.item_id, now).await?;
        }

        let payment_number = self
            .db
            .sequences()
            .next_number(&mut *tx, &self.config.payment_prefix, today)
            .await?;

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            payment_number,
            loan_id: loan.id.clone(),
            amount: request.amount,
            principal_amount: allocation.principal,
            interest_amount: allocation.interest,
            late_fee_amount: allocation.late_fee,
            method: request.method,
            payment_date: now,
            cash_session_id: session.as_ref().map(|s| s.id.clone()),
            idempotency_key: request.idempotency_key,
        };
        self.db.payments().insert(&mut *tx, &payment).await?;

        if let Some(session) = &session {
            append_movement(
                &mut *tx,
                session,
                MovementType::IncomePayment,
                payment.amount,
                MovementReference::Payment(payment.id.clone()),
                Some(format!("Payment {} on {}", payment.payment_number, loan.loan_number)),
                now,
            )
            .await?;
        }

        let event = DomainEvent::PaymentApplied {
            payment_id: payment.id.clone(),
            payment_number: payment.payment_number.clone(),
            loan_id: loan.id.clone(),
            amount: payment.amount,
            principal_amount: payment.principal_amount,
            interest_amount: payment.interest_amount,
            late_fee_amount: payment.late_fee_amount,
            principal_remaining: loan.principal_remaining,
            loan_status: loan.status,
            cash_session_id: payment.cash_session_id.clone(),
            at: now,
        };
        self.db.outbox().append(&mut *tx, &event, now).await?;

        tx.commit().await?;

        info!(
            payment_id = %payment.id,
            loan_id = %loan.id,
            amount = %payment.amount,
            late_fee = %payment.late_fee_amount,
            interest = %payment.interest_amount,
            principal = %payment.principal_amount,
            status = %loan.status,
            schedule_advanced = applied.schedule_advanced,
            "Payment applied"
        );

        Ok(payment)
    }

    /// Payments of a loan, oldest first.
    pub async fn list_payments(&self, loan_id: &str) -> EngineResult<Vec<Payment>> {
        let mut conn = self.db.acquire().await?;
        let payments = self.db.payments().list_by_loan(&mut *conn, loan_id).await?;
        Ok(payments)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        date, loan_request, seed_customer, seed_item, seed_register, setup,
    };
    use crate::Engine;
    use pawn_core::{ErrorKind, ItemStatus, LoanStatus, PaymentPlan};

    fn payment(loan_id: &str, cents: i64) -> ApplyPaymentRequest {
        ApplyPaymentRequest {
            loan_id: loan_id.to_string(),
            amount: Money::from_cents(cents),
            method: PaymentMethod::Cash,
            session_id: None,
            idempotency_key: None,
        }
    }

    async fn fresh_loan(engine: &Engine, principal_cents: i64) -> pawn_core::Loan {
        let customer = seed_customer(engine.database(), true).await;
        let item = seed_item(engine.database(), "branch-1", Money::from_cents(500_000)).await;
        engine
            .loans()
            .create_loan(loan_request(&customer.id, &item.id, principal_cents))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_full_payment_pays_off_and_releases_item() {
        let (engine, _clock) = setup(date(2026, 1, 1)).await;
        let loan = fresh_loan(&engine, 100_000).await;

        let paid = engine
            .payments()
            .apply_payment(payment(&loan.id, 110_000))
            .await
            .unwrap();
        assert_eq!(paid.late_fee_amount, Money::zero());
        assert_eq!(paid.interest_amount, Money::from_cents(10_000));
        assert_eq!(paid.principal_amount, Money::from_cents(100_000));
        assert_eq!(paid.payment_number, "PAY-20260101-0001");

        let loan = engine.loans().get_loan(&loan.id).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Paid);
        assert_eq!(loan.principal_remaining, Money::zero());
        assert_eq!(loan.amount_paid, Money::from_cents(110_000));

        let mut conn = engine.database().acquire().await.unwrap();
        let item = engine
            .database()
            .items()
            .get(&mut *conn, &loan.item_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.status, ItemStatus::Available);
        drop(conn);

        let err = engine
            .payments()
            .apply_payment(payment(&loan.id, 100))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_overpayment_changes_nothing() {
        let (engine, _clock) = setup(date(2026, 1, 1)).await;
        let loan = fresh_loan(&engine, 100_000).await;

        let err = engine
            .payments()
            .apply_payment(payment(&loan.id, 120_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overpayment);
        assert!(err.to_string().contains("1100.00"));

        let after = engine.loans().get_loan(&loan.id).await.unwrap();
        assert_eq!(after.amount_paid, Money::zero());
        assert_eq!(after.principal_remaining, Money::from_cents(100_000));
        assert!(engine.payments().list_payments(&loan.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_payment_into_session() {
        let (engine, _clock) = setup(date(2026, 1, 1)).await;
        let loan = fresh_loan(&engine, 100_000).await;
        let register = seed_register(engine.database(), "branch-1", true).await;
        let session = engine
            .cash()
            .open_session(&register.id, "cashier-1", Money::from_cents(50_000))
            .await
            .unwrap();

        let mut request = payment(&loan.id, 20_000);
        request.session_id = Some(session.id.clone());
        let paid = engine.payments().apply_payment(request).await.unwrap();
        assert_eq!(paid.cash_session_id.as_deref(), Some(session.id.as_str()));

        let movements = engine.cash().list_movements(&session.id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].movement_type, MovementType::IncomePayment);
        assert_eq!(movements[0].amount, Money::from_cents(20_000));
        assert_eq!(movements[0].reference, MovementReference::Payment(paid.id));

        engine
            .cash()
            .close_session(&session.id, Money::from_cents(70_000), None)
            .await
            .unwrap();

        let mut request = payment(&loan.id, 20_000);
        request.session_id = Some(session.id.clone());
        let err = engine.payments().apply_payment(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(engine.payments().list_payments(&loan.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_idempotency_key_replays_stored_payment() {
        let (engine, _clock) = setup(date(2026, 1, 1)).await;
        let loan = fresh_loan(&engine, 100_000).await;

        let mut request = payment(&loan.id, 30_000);
        request.idempotency_key = Some("counter-7-0001".to_string());

        let first = engine.payments().apply_payment(request.clone()).await.unwrap();
        let replay = engine.payments().apply_payment(request).await.unwrap();
        assert_eq!(first, replay);

        let loan = engine.loans().get_loan(&loan.id).await.unwrap();
        assert_eq!(loan.amount_paid, Money::from_cents(30_000));
        assert_eq!(engine.payments().list_payments(&loan.id).await.unwrap().len(), 1);

        // Same amount without a key is a new payment.
        engine
            .payments()
            .apply_payment(payment(&loan.id, 30_000))
            .await
            .unwrap();
        assert_eq!(engine.payments().list_payments(&loan.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_idempotency_key_with_different_terms_conflicts() {
        let (engine, _clock) = setup(date(2026, 1, 1)).await;
        let loan = fresh_loan(&engine, 100_000).await;

        let mut request = payment(&loan.id, 30_000);
        request.idempotency_key = Some("counter-7-0002".to_string());
        engine.payments().apply_payment(request.clone()).await.unwrap();

        let mut other_amount = request.clone();
        other_amount.amount = Money::from_cents(40_000);
        let err = engine.payments().apply_payment(other_amount).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("counter-7-0002"));

        let mut other_method = request;
        other_method.method = PaymentMethod::Card;
        let err = engine.payments().apply_payment(other_method).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let loan = engine.loans().get_loan(&loan.id).await.unwrap();
        assert_eq!(loan.amount_paid, Money::from_cents(30_000));
        assert_eq!(engine.payments().list_payments(&loan.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_late_fees_survive_principal_payment() {
        let (engine, clock) = setup(date(2026, 1, 1)).await;
        let loan = fresh_loan(&engine, 100_000).await;

        // 3 days beyond grace on 1000.00: 15.00 late fee, then interest, then 800.00
        clock.set_date(date(2026, 2, 8));
        let paid = engine
            .payments()
            .apply_payment(payment(&loan.id, 91_500))
            .await
            .unwrap();
        assert_eq!(paid.late_fee_amount, Money::from_cents(1_500));
        assert_eq!(paid.principal_amount, Money::from_cents(80_000));

        // 10 more days on 200.00
        clock.set_date(date(2026, 2, 18));
        let balance = engine.loans().balance(&loan.id).await.unwrap();
        assert_eq!(balance.late_fee_outstanding, Money::from_cents(1_000));
        assert_eq!(balance.payoff_amount, Money::from_cents(21_000));

        let last = engine
            .payments()
            .apply_payment(payment(&loan.id, 21_000))
            .await
            .unwrap();
        assert_eq!(last.late_fee_amount, Money::from_cents(1_000));

        let loan = engine.loans().get_loan(&loan.id).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Paid);
        assert_eq!(loan.late_fees_paid, Money::from_cents(2_500));
        assert_eq!(loan.amount_paid, Money::from_cents(112_500));
    }

    #[tokio::test]
    async fn test_installment_payment_advances_schedule() {
        let (engine, _clock) = setup(date(2026, 1, 1)).await;
        let customer = seed_customer(engine.database(), true).await;
        let item = seed_item(engine.database(), "branch-1", Money::from_cents(500_000)).await;

        let mut request = loan_request(&customer.id, &item.id, 100_000);
        request.term_days = 90;
        request.payment_plan = PaymentPlan::Installments { count: 3 };
        let loan = engine.loans().create_loan(request).await.unwrap();
        assert_eq!(loan.next_payment_date, Some(date(2026, 1, 31)));

        // Below one installment (366.67): schedule stays.
        engine
            .payments()
            .apply_payment(payment(&loan.id, 10_000))
            .await
            .unwrap();
        let after = engine.loans().get_loan(&loan.id).await.unwrap();
        assert_eq!(after.next_payment_date, Some(date(2026, 1, 31)));

        engine
            .payments()
            .apply_payment(payment(&loan.id, 36_667))
            .await
            .unwrap();
        let after = engine.loans().get_loan(&loan.id).await.unwrap();
        assert_eq!(after.next_payment_date, Some(date(2026, 3, 2)));
    }

    #[tokio::test]
    async fn test_concurrent_payments_never_overapply() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _clock) =
            crate::test_support::setup_file(&dir.path().join("ledger.db"), date(2026, 1, 1)).await;
        let loan = fresh_loan(&engine, 100_000).await;

        // Interest plus half the principal: 500.00 left.
        engine
            .payments()
            .apply_payment(payment(&loan.id, 60_000))
            .await
            .unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let engine = engine.clone();
                let request = payment(&loan.id, 30_000);
                tokio::spawn(async move { engine.payments().apply_payment(request).await })
            })
            .collect();

        let mut applied = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => applied += 1,
                Err(err) => {
                    assert_eq!(err.kind(), ErrorKind::Overpayment);
                    rejected += 1;
                }
            }
        }
        assert_eq!((applied, rejected), (1, 1));

        let loan = engine.loans().get_loan(&loan.id).await.unwrap();
        assert_eq!(loan.principal_remaining, Money::from_cents(20_000));

        let mut conn = engine.database().acquire().await.unwrap();
        let principal_applied = engine
            .database()
            .payments()
            .total_principal_applied(&mut *conn, &loan.id)
            .await
            .unwrap();
        assert_eq!(principal_applied, Money::from_cents(80_000));
    }
}
