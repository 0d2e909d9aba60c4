//! # Loan Lifecycle Service
//!
//! Origination, renewal, overdue marking, confiscation and archival. Each
//! operation is one transaction.
//!
//! ## Origination
//! ```text
//! BEGIN
//!   lock item ─► available? ─► pledged          (ItemCoordinator)
//!   branch / lending limit / customer checks
//!   draw loan number                            (number_sequences)
//!   INSERT loan                                 (idx_loans_open_item backs the pledge)
//!   open session on register? ─► expense_loan_disbursement  -principal
//!   outbox: LoanCreated
//! COMMIT
//! ```
//!
//! ## Status transitions
//! ```text
//! active  ──► paid | overdue | renewed
//! overdue ──► paid | confiscated | renewed
//! renewed ──► active
//! ```
//! `paid` is reached only through payments (see [`crate::payments`]).

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cash::append_movement;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::items::ItemCoordinator;
use pawn_core::lifecycle::{
    accrued_late_fee, balance_as_of, check_confiscation, check_mark_overdue, compute_terms,
    ensure_transition, lending_limit, renewal_terms,
};
use pawn_core::validation::{
    validate_grace_period_days, validate_id, validate_interest_rate, validate_late_fee_rate,
    validate_payment_plan, validate_principal, validate_term_days,
};
use pawn_core::{
    Clock, CoreError, DomainEvent, ErrorKind, Lifecycle, Loan, LoanBalance, LoanRenewal,
    LoanStatus, Money, MovementReference, MovementType, PaymentPlan, Rate,
};
use pawn_db::{Database, LoanRepository};

// =============================================================================
// Requests
// =============================================================================

/// Everything needed to originate a loan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLoanRequest {
    pub customer_id: String,
    pub item_id: String,
    /// Branch where the loan is made.
    pub branch_id: String,
    pub principal: Money,
    /// Flat interest per term.
    pub interest_rate: Rate,
    pub term_days: u32,
    pub grace_period_days: u32,
    /// Late fee per day beyond the grace period.
    pub late_fee_rate: Rate,
    pub payment_plan: PaymentPlan,
    /// Register handing out the cash. When it has an open session the
    /// disbursement is recorded there.
    pub register_id: Option<String>,
}

impl CreateLoanRequest {
    fn validate(&self) -> EngineResult<()> {
        validate_id("customer_id", &self.customer_id)?;
        validate_id("item_id", &self.item_id)?;
        validate_id("branch_id", &self.branch_id)?;
        if let Some(register_id) = &self.register_id {
            validate_id("register_id", register_id)?;
        }
        validate_principal(self.principal)?;
        validate_interest_rate(self.interest_rate)?;
        validate_late_fee_rate(self.late_fee_rate)?;
        validate_term_days(self.term_days)?;
        validate_grace_period_days(self.grace_period_days)?;
        validate_payment_plan(&self.payment_plan)?;
        Ok(())
    }
}

// =============================================================================
// Service
// =============================================================================

#[derive(Debug, Clone)]
pub struct LoanService {
    db: Database,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    items: ItemCoordinator,
}

impl LoanService {
    pub fn new(db: Database, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        LoanService {
            db,
            clock,
            config,
            items: ItemCoordinator::new(),
        }
    }

    /// Originates a loan against an available item.
    pub async fn create_loan(&self, request: CreateLoanRequest) -> EngineResult<Loan> {
        request.validate()?;

        let now = self.clock.now();
        let today = self.clock.today();
        let mut tx = self.db.begin().await?;

        let item = self.items.try_pledge(&mut *tx, &request.item_id, now).await?;

        if item.branch_id != request.branch_id && !self.config.allow_cross_branch {
            return Err(CoreError::ItemInOtherBranch {
                item_id: item.id,
                item_branch: item.branch_id,
                branch_id: request.branch_id,
            }
            .into());
        }

        let limit = lending_limit(item.appraised_value, self.config.max_loan_to_value);
        if request.principal > limit {
            return Err(CoreError::PrincipalExceedsAppraisal {
                item_id: item.id,
                principal: request.principal,
                limit,
            }
            .into());
        }

        let customer = self
            .db
            .customers()
            .get(&mut *tx, &request.customer_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Customer", &request.customer_id))?;
        if !customer.can_borrow() {
            return Err(CoreError::CustomerInactive(customer.id).into());
        }

        let loan_number = self
            .db
            .sequences()
            .next_number(&mut *tx, &self.config.loan_prefix, today)
            .await?;

        let terms = compute_terms(
            request.principal,
            request.interest_rate,
            request.term_days,
            &request.payment_plan,
            today,
            self.config.payment_interval_days,
        );

        let loan = Loan {
            id: Uuid::new_v4().to_string(),
            loan_number,
            customer_id: request.customer_id,
            item_id: request.item_id,
            branch_id: request.branch_id,
            principal: request.principal,
            interest_rate: request.interest_rate,
            interest_amount: terms.interest_amount,
            total_amount: terms.total_amount,
            amount_paid: Money::zero(),
            principal_remaining: request.principal,
            interest_paid: Money::zero(),
            late_fees_paid: Money::zero(),
            late_fees_accrued: Money::zero(),
            late_fee_accrued_through: None,
            start_date: terms.start_date,
            due_date: terms.due_date,
            term_days: request.term_days,
            grace_period_days: request.grace_period_days,
            late_fee_rate: request.late_fee_rate,
            payment_plan: request.payment_plan,
            next_payment_date: terms.next_payment_date,
            renewal_count: 0,
            status: LoanStatus::Active,
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        };

        self.db.loans().insert(&mut *tx, &loan).await?;

        let cash_session_id = match &request.register_id {
            Some(register_id) => {
                self.record_disbursement(&mut *tx, register_id, &loan).await?
            }
            None => None,
        };

        let event = DomainEvent::LoanCreated {
            loan_id: loan.id.clone(),
            loan_number: loan.loan_number.clone(),
            customer_id: loan.customer_id.clone(),
            item_id: loan.item_id.clone(),
            branch_id: loan.branch_id.clone(),
            principal: loan.principal,
            interest_amount: loan.interest_amount,
            total_amount: loan.total_amount,
            due_date: loan.due_date,
            cash_session_id: cash_session_id.clone(),
            at: now,
        };
        self.db.outbox().append(&mut *tx, &event, now).await?;

        tx.commit().await?;

        info!(
            loan_id = %loan.id,
            loan_number = %loan.loan_number,
            item_id = %loan.item_id,
            principal = %loan.principal,
            total = %loan.total_amount,
            due_date = %loan.due_date,
            cash_session_id = ?cash_session_id,
            "Loan created"
        );

        Ok(loan)
    }

    /// Records the cash handed out if the register has an open session.
    ///
    /// Returns the session used, if any.
    async fn record_disbursement(
        &self,
        conn: &mut SqliteConnection,
        register_id: &str,
        loan: &Loan,
    ) -> EngineResult<Option<String>> {
        if self
            .db
            .cash()
            .get_register(&mut *conn, register_id)
            .await?
            .is_none()
        {
            return Err(CoreError::not_found("CashRegister", register_id).into());
        }

        let Some(session) = self.db.cash().find_open_session(&mut *conn, register_id).await? else {
            debug!(register_id = %register_id, loan_id = %loan.id, "No open session, disbursement not recorded");
            return Ok(None);
        };

        append_movement(
            &mut *conn,
            &session,
            MovementType::ExpenseLoanDisbursement,
            -loan.principal,
            MovementReference::Loan(loan.id.clone()),
            Some(format!("Disbursement {}", loan.loan_number)),
            loan.created_at,
        )
        .await?;

        Ok(Some(session.id))
    }

    /// Starts a new term on a loan whose interest and late fees are paid.
    ///
    /// The loan passes through `renewed` and is stored `active`; the
    /// [`LoanRenewal`] row is the audit trail of the transition.
    pub async fn renew(&self, loan_id: &str) -> EngineResult<Loan> {
        validate_id("loan_id", loan_id)?;

        let now = self.clock.now();
        let today = self.clock.today();
        let mut tx = self.db.begin().await?;

        let mut loan = lock_loan(&mut *tx, loan_id).await?;

        let terms = renewal_terms(
            &loan,
            today,
            self.config.renewal_interest_policy,
            self.config.payment_interval_days,
        )?;

        loan.status = LoanStatus::Renewed;
        ensure_transition(&loan, LoanStatus::Active, "renew")?;

        let renewal = LoanRenewal {
            id: Uuid::new_v4().to_string(),
            loan_id: loan.id.clone(),
            sequence: loan.renewal_count + 1,
            previous_start_date: loan.start_date,
            previous_due_date: loan.due_date,
            new_start_date: terms.start_date,
            new_due_date: terms.due_date,
            principal_at_renewal: loan.principal_remaining,
            previous_interest_amount: loan.interest_amount,
            new_interest_amount: terms.interest_amount,
            renewed_at: now,
        };

        loan.status = LoanStatus::Active;
        loan.start_date = terms.start_date;
        loan.due_date = terms.due_date;
        loan.next_payment_date = terms.next_payment_date;
        loan.interest_amount = terms.interest_amount;
        loan.total_amount += terms.interest_amount;
        loan.interest_paid = Money::zero();
        loan.late_fees_paid = Money::zero();
        loan.late_fees_accrued = Money::zero();
        loan.late_fee_accrued_through = None;
        loan.renewal_count = renewal.sequence;
        loan.updated_at = now;

        self.db.loans().update(&mut *tx, &loan).await?;
        self.db.loans().insert_renewal(&mut *tx, &renewal).await?;

        let event = DomainEvent::LoanRenewed {
            loan_id: loan.id.clone(),
            loan_number: loan.loan_number.clone(),
            renewal_sequence: renewal.sequence,
            principal_remaining: loan.principal_remaining,
            interest_amount: loan.interest_amount,
            new_due_date: loan.due_date,
            at: now,
        };
        self.db.outbox().append(&mut *tx, &event, now).await?;

        tx.commit().await?;

        info!(
            loan_id = %loan.id,
            renewal = renewal.sequence,
            interest = %loan.interest_amount,
            due_date = %loan.due_date,
            "Loan renewed"
        );

        Ok(loan)
    }

    /// Takes the item of an overdue loan whose grace period has run out.
    /// Irreversible.
    pub async fn confiscate(&self, loan_id: &str) -> EngineResult<Loan> {
        validate_id("loan_id", loan_id)?;

        let now = self.clock.now();
        let today = self.clock.today();
        let mut tx = self.db.begin().await?;

        let mut loan = lock_loan(&mut *tx, loan_id).await?;
        check_confiscation(&loan, today)?;

        loan.status = LoanStatus::Confiscated;
        loan.next_payment_date = None;
        loan.updated_at = now;
        self.db.loans().update(&mut *tx, &loan).await?;

        self.items.confiscate(&mut *tx, &loan.item_id, now).await?;

        let event = DomainEvent::LoanConfiscated {
            loan_id: loan.id.clone(),
            loan_number: loan.loan_number.clone(),
            item_id: loan.item_id.clone(),
            principal_remaining: loan.principal_remaining,
            at: now,
        };
        self.db.outbox().append(&mut *tx, &event, now).await?;

        tx.commit().await?;

        warn!(
            loan_id = %loan.id,
            item_id = %loan.item_id,
            principal_remaining = %loan.principal_remaining,
            "Loan confiscated"
        );

        Ok(loan)
    }

    /// Moves an active loan past its grace period to `overdue`.
    pub async fn mark_overdue(&self, loan_id: &str) -> EngineResult<Loan> {
        validate_id("loan_id", loan_id)?;

        let now = self.clock.now();
        let today = self.clock.today();
        let mut tx = self.db.begin().await?;

        let mut loan = lock_loan(&mut *tx, loan_id).await?;
        let overdue = check_mark_overdue(&loan, today)?;
        let late_fee_accrued = accrued_late_fee(&loan, today);

        loan.status = LoanStatus::Overdue;
        loan.updated_at = now;
        self.db.loans().update(&mut *tx, &loan).await?;

        let event = DomainEvent::LoanMarkedOverdue {
            loan_id: loan.id.clone(),
            loan_number: loan.loan_number.clone(),
            days_overdue: overdue.days_overdue,
            late_fee_accrued,
            at: now,
        };
        self.db.outbox().append(&mut *tx, &event, now).await?;

        tx.commit().await?;

        info!(
            loan_id = %loan.id,
            days_overdue = overdue.days_overdue,
            late_fee = %late_fee_accrued,
            "Loan marked overdue"
        );

        Ok(loan)
    }

    /// Marks every active loan past due date plus grace as overdue, one
    /// transaction per loan. Returns the ids that moved.
    ///
    /// A loan paid or renewed between listing and marking is skipped.
    pub async fn sweep_overdue(&self) -> EngineResult<Vec<String>> {
        let today = self.clock.today();

        let candidates = {
            let mut conn = self.db.acquire().await?;
            self.db.loans().list_overdue_candidates(&mut *conn, today).await?
        };

        let mut marked = Vec::with_capacity(candidates.len());
        for loan_id in candidates {
            match self.mark_overdue(&loan_id).await {
                Ok(_) => marked.push(loan_id),
                Err(err) if is_skippable(&err) => {
                    debug!(loan_id = %loan_id, error = %err, "Skipping overdue candidate");
                }
                Err(err) => return Err(err),
            }
        }

        info!(as_of = %today, marked = marked.len(), "Overdue sweep complete");
        Ok(marked)
    }

    /// Bucketed balance of a loan as of today.
    pub async fn balance(&self, loan_id: &str) -> EngineResult<LoanBalance> {
        let loan = self.get_loan(loan_id).await?;
        Ok(balance_as_of(&loan, self.clock.today()))
    }

    pub async fn get_loan(&self, loan_id: &str) -> EngineResult<Loan> {
        let mut conn = self.db.acquire().await?;
        let loan = self
            .db
            .loans()
            .get(&mut *conn, loan_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Loan", loan_id))?;
        Ok(loan)
    }

    /// Renewal history, oldest first.
    pub async fn list_renewals(&self, loan_id: &str) -> EngineResult<Vec<LoanRenewal>> {
        let mut conn = self.db.acquire().await?;
        let renewals = self.db.loans().list_renewals(&mut *conn, loan_id).await?;
        Ok(renewals)
    }

    /// Soft-deletes a loan that has reached a terminal status.
    pub async fn archive_loan(&self, loan_id: &str) -> EngineResult<()> {
        validate_id("loan_id", loan_id)?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let loan = lock_loan(&mut *tx, loan_id).await?;
        if !loan.status.is_terminal() {
            return Err(CoreError::InvalidLoanState {
                loan_id: loan.id,
                status: loan.status,
                operation: "archive",
            }
            .into());
        }

        self.db.loans().soft_delete(&mut *tx, loan_id, now).await?;
        tx.commit().await?;

        info!(loan_id = %loan_id, status = %loan.status, "Loan archived");
        Ok(())
    }
}

/// Takes the loan row lock and re-reads the loan.
pub(crate) async fn lock_loan(conn: &mut SqliteConnection, loan_id: &str) -> EngineResult<Loan> {
    let loans = LoanRepository;

    if !loans.lock(&mut *conn, loan_id).await? {
        return Err(CoreError::not_found("Loan", loan_id).into());
    }

    let loan = loans
        .get(&mut *conn, loan_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Loan", loan_id))?;
    Ok(loan)
}

fn is_skippable(err: &EngineError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::InvalidState | ErrorKind::NotFound | ErrorKind::Conflict
    )
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        date, loan_request, seed_customer, seed_item, seed_register, setup, setup_with,
    };
    use crate::payments::ApplyPaymentRequest;
    use pawn_core::{ItemStatus, PaymentMethod, RenewalInterestPolicy};

    async fn item_status(engine: &crate::Engine, item_id: &str) -> ItemStatus {
        let mut conn = engine.database().acquire().await.unwrap();
        engine
            .database()
            .items()
            .get(&mut *conn, item_id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    fn payment(loan_id: &str, cents: i64) -> ApplyPaymentRequest {
        ApplyPaymentRequest {
            loan_id: loan_id.to_string(),
            amount: Money::from_cents(cents),
            method: PaymentMethod::Cash,
            session_id: None,
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn test_create_loan_computes_terms_and_pledges_item() {
        let (engine, _clock) = setup(date(2026, 1, 1)).await;
        let customer = seed_customer(engine.database(), true).await;
        let item = seed_item(engine.database(), "branch-1", Money::from_cents(200_000)).await;

        let loan = engine
            .loans()
            .create_loan(loan_request(&customer.id, &item.id, 100_000))
            .await
            .unwrap();

        assert_eq!(loan.interest_amount, Money::from_cents(10_000));
        assert_eq!(loan.total_amount, Money::from_cents(110_000));
        assert_eq!(loan.principal_remaining, Money::from_cents(100_000));
        assert_eq!(loan.due_date, date(2026, 1, 31));
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.loan_number, "LN-20260101-0001");
        assert_eq!(item_status(&engine, &item.id).await, ItemStatus::Pledged);

        let stored = engine.loans().get_loan(&loan.id).await.unwrap();
        assert_eq!(stored, loan);

        let events = engine.pending_events(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "LoanCreated");
        assert_eq!(events[0].aggregate_id, loan.id);
    }

    #[tokio::test]
    async fn test_item_cannot_back_two_loans() {
        let (engine, _clock) = setup(date(2026, 1, 1)).await;
        let customer = seed_customer(engine.database(), true).await;
        let item = seed_item(engine.database(), "branch-1", Money::from_cents(200_000)).await;

        engine
            .loans()
            .create_loan(loan_request(&customer.id, &item.id, 50_000))
            .await
            .unwrap();
        let err = engine
            .loans()
            .create_loan(loan_request(&customer.id, &item.id, 50_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_failed_origination_leaves_item_available() {
        let (engine, _clock) = setup(date(2026, 1, 1)).await;
        let blocked = seed_customer(engine.database(), false).await;
        let item = seed_item(engine.database(), "branch-1", Money::from_cents(200_000)).await;

        let err = engine
            .loans()
            .create_loan(loan_request(&blocked.id, &item.id, 50_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = engine
            .loans()
            .create_loan(loan_request("missing", &item.id, 50_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert_eq!(item_status(&engine, &item.id).await, ItemStatus::Available);
        assert!(engine.pending_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lending_limit_and_branch() {
        let config = EngineConfig {
            max_loan_to_value: Rate::from_percent(80),
            ..EngineConfig::default()
        };
        let (engine, _clock) = setup_with(date(2026, 1, 1), config).await;
        let customer = seed_customer(engine.database(), true).await;
        let item = seed_item(engine.database(), "branch-1", Money::from_cents(100_000)).await;

        let err = engine
            .loans()
            .create_loan(loan_request(&customer.id, &item.id, 80_001))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let mut request = loan_request(&customer.id, &item.id, 80_000);
        request.branch_id = "branch-2".to_string();
        let err = engine.loans().create_loan(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        engine
            .loans()
            .create_loan(loan_request(&customer.id, &item.id, 80_000))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_terms_rejected_before_any_read() {
        let (engine, _clock) = setup(date(2026, 1, 1)).await;

        let mut request = loan_request("c", "i", 100_000);
        request.term_days = 0;
        let err = engine.loans().create_loan(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut request = loan_request("c", "i", 100_000);
        request.interest_rate = Rate::from_percent(101);
        let err = engine.loans().create_loan(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = engine
            .loans()
            .create_loan(loan_request("c", "i", 0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_disbursement_goes_to_open_session() {
        let (engine, _clock) = setup(date(2026, 1, 1)).await;
        let customer = seed_customer(engine.database(), true).await;
        let item = seed_item(engine.database(), "branch-1", Money::from_cents(200_000)).await;
        let register = seed_register(engine.database(), "branch-1", true).await;
        let session = engine
            .cash()
            .open_session(&register.id, "cashier-1", Money::from_cents(300_000))
            .await
            .unwrap();

        let mut request = loan_request(&customer.id, &item.id, 100_000);
        request.register_id = Some(register.id.clone());
        let loan = engine.loans().create_loan(request).await.unwrap();

        let movements = engine.cash().list_movements(&session.id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].movement_type, MovementType::ExpenseLoanDisbursement);
        assert_eq!(movements[0].amount, Money::from_cents(-100_000));
        assert_eq!(movements[0].reference, MovementReference::Loan(loan.id));

        let x = engine.cash().partial_summary(&session.id).await.unwrap();
        assert_eq!(x.expected_amount, Money::from_cents(200_000));
    }

    #[tokio::test]
    async fn test_overdue_then_confiscate() {
        let (engine, clock) = setup(date(2026, 1, 1)).await;
        let customer = seed_customer(engine.database(), true).await;
        let item = seed_item(engine.database(), "branch-1", Money::from_cents(200_000)).await;
        let loan = engine
            .loans()
            .create_loan(loan_request(&customer.id, &item.id, 100_000))
            .await
            .unwrap();

        // Due 2026-01-31, grace 5 days.
        clock.set_date(date(2026, 2, 5));
        let err = engine.loans().mark_overdue(&loan.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(engine.loans().sweep_overdue().await.unwrap().is_empty());

        let err = engine.loans().confiscate(&loan.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        clock.set_date(date(2026, 2, 8));
        assert_eq!(engine.loans().sweep_overdue().await.unwrap(), vec![loan.id.clone()]);

        let balance = engine.loans().balance(&loan.id).await.unwrap();
        assert_eq!(balance.days_overdue, 8);
        // 1000.00 × 0.5% × 3 days
        assert_eq!(balance.late_fee_outstanding, Money::from_cents(1_500));
        assert_eq!(balance.payoff_amount, Money::from_cents(111_500));

        let confiscated = engine.loans().confiscate(&loan.id).await.unwrap();
        assert_eq!(confiscated.status, LoanStatus::Confiscated);
        assert_eq!(item_status(&engine, &item.id).await, ItemStatus::Confiscated);

        // Terminal: no payments, no renewal, no way back.
        let err = engine.payments().apply_payment(payment(&loan.id, 100)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = engine.loans().renew(&loan.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let sold = engine.list_item_for_sale(&item.id).await.unwrap();
        assert_eq!(sold.status, ItemStatus::ForSale);
        let sold = engine.mark_item_sold(&item.id).await.unwrap();
        assert_eq!(sold.status, ItemStatus::Sold);
    }

    #[tokio::test]
    async fn test_renewal_requires_interest_paid() {
        let (engine, clock) = setup(date(2026, 1, 1)).await;
        let customer = seed_customer(engine.database(), true).await;
        let item = seed_item(engine.database(), "branch-1", Money::from_cents(200_000)).await;
        let loan = engine
            .loans()
            .create_loan(loan_request(&customer.id, &item.id, 100_000))
            .await
            .unwrap();

        clock.set_date(date(2026, 1, 25));
        let err = engine.loans().renew(&loan.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        // 100.00 interest plus 200.00 principal.
        engine
            .payments()
            .apply_payment(payment(&loan.id, 30_000))
            .await
            .unwrap();

        let renewed = engine.loans().renew(&loan.id).await.unwrap();
        assert_eq!(renewed.status, LoanStatus::Active);
        assert_eq!(renewed.renewal_count, 1);
        assert_eq!(renewed.start_date, date(2026, 1, 25));
        assert_eq!(renewed.due_date, date(2026, 2, 24));
        // Remaining principal policy: 10% of 800.00.
        assert_eq!(renewed.interest_amount, Money::from_cents(8_000));
        assert_eq!(renewed.total_amount, Money::from_cents(118_000));
        assert_eq!(renewed.interest_paid, Money::zero());
        assert_eq!(renewed.principal_remaining, Money::from_cents(80_000));

        let renewals = engine.loans().list_renewals(&loan.id).await.unwrap();
        assert_eq!(renewals.len(), 1);
        assert_eq!(renewals[0].sequence, 1);
        assert_eq!(renewals[0].previous_due_date, date(2026, 1, 31));
        assert_eq!(renewals[0].new_interest_amount, Money::from_cents(8_000));

        let balance = engine.loans().balance(&loan.id).await.unwrap();
        assert_eq!(balance.payoff_amount, Money::from_cents(88_000));
    }

    #[tokio::test]
    async fn test_renewal_on_original_principal() {
        let config = EngineConfig {
            renewal_interest_policy: RenewalInterestPolicy::OriginalPrincipal,
            ..EngineConfig::default()
        };
        let (engine, _clock) = setup_with(date(2026, 1, 1), config).await;
        let customer = seed_customer(engine.database(), true).await;
        let item = seed_item(engine.database(), "branch-1", Money::from_cents(200_000)).await;
        let loan = engine
            .loans()
            .create_loan(loan_request(&customer.id, &item.id, 100_000))
            .await
            .unwrap();

        engine
            .payments()
            .apply_payment(payment(&loan.id, 30_000))
            .await
            .unwrap();

        let renewed = engine.loans().renew(&loan.id).await.unwrap();
        assert_eq!(renewed.interest_amount, Money::from_cents(10_000));
        assert_eq!(renewed.principal_remaining, Money::from_cents(80_000));
    }

    #[tokio::test]
    async fn test_overdue_loan_renews_after_late_fees_paid() {
        let (engine, clock) = setup(date(2026, 1, 1)).await;
        let customer = seed_customer(engine.database(), true).await;
        let item = seed_item(engine.database(), "branch-1", Money::from_cents(200_000)).await;
        let loan = engine
            .loans()
            .create_loan(loan_request(&customer.id, &item.id, 100_000))
            .await
            .unwrap();

        clock.set_date(date(2026, 2, 8));
        engine.loans().mark_overdue(&loan.id).await.unwrap();

        // Late fees 15.00 then interest 100.00.
        engine
            .payments()
            .apply_payment(payment(&loan.id, 11_500))
            .await
            .unwrap();

        let renewed = engine.loans().renew(&loan.id).await.unwrap();
        assert_eq!(renewed.status, LoanStatus::Active);
        assert_eq!(renewed.late_fees_paid, Money::zero());
        assert_eq!(renewed.late_fees_accrued, Money::zero());
        assert_eq!(renewed.late_fee_accrued_through, None);
        assert_eq!(renewed.due_date, date(2026, 3, 10));
        assert_eq!(engine.loans().balance(&loan.id).await.unwrap().late_fee_outstanding, Money::zero());
    }

    #[tokio::test]
    async fn test_archive_only_terminal_loans() {
        let (engine, _clock) = setup(date(2026, 1, 1)).await;
        let customer = seed_customer(engine.database(), true).await;
        let item = seed_item(engine.database(), "branch-1", Money::from_cents(200_000)).await;
        let loan = engine
            .loans()
            .create_loan(loan_request(&customer.id, &item.id, 100_000))
            .await
            .unwrap();

        let err = engine.loans().archive_loan(&loan.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        engine
            .payments()
            .apply_payment(payment(&loan.id, 110_000))
            .await
            .unwrap();
        engine.loans().archive_loan(&loan.id).await.unwrap();

        let err = engine.loans().get_loan(&loan.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
