//! # Loan Repository
//!
//! Loans, their renewal audit trail and the overdue scan.
//!
//! ## Row Shape
//! ```text
//! ┌───────────────────────────────┐      ┌─────────────────────────────┐
//! │ loans                          │      │ domain Loan                 │
//! │  plan_type       'installments'│ ───► │  payment_plan:              │
//! │  minimum_payment NULL          │      │    Installments { count: 3 }│
//! │  installments    3             │      │                             │
//! │  deleted_at      NULL          │ ───► │  lifecycle: Active          │
//! └───────────────────────────────┘      └─────────────────────────────┘
//! ```
//!
//! `item_id` is unique among open loans (`idx_loans_open_item`). A second
//! pledge of the same item fails with [`DbError::UniqueViolation`] even if the
//! engine's own checks were bypassed.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use pawn_core::{
    Lifecycle, Loan, LoanRenewal, LoanStatus, Money, PaymentPlan, PaymentPlanType, Rate,
};

macro_rules! loan_select {
    () => {
        r#"
        SELECT id, loan_number, customer_id, item_id, branch_id,
               principal, interest_rate, interest_amount, total_amount, amount_paid,
               principal_remaining, interest_paid, late_fees_paid,
               late_fees_accrued, late_fee_accrued_through,
               start_date, due_date, term_days, grace_period_days, late_fee_rate,
               plan_type, minimum_payment, installments, next_payment_date, renewal_count,
               status, created_at, updated_at, deleted_at
        FROM loans
        "#
    };
}

#[derive(Debug, sqlx::FromRow)]
struct LoanRow {
    id: String,
    loan_number: String,
    customer_id: String,
    item_id: String,
    branch_id: String,
    principal: Money,
    interest_rate: Rate,
    interest_amount: Money,
    total_amount: Money,
    amount_paid: Money,
    principal_remaining: Money,
    interest_paid: Money,
    late_fees_paid: Money,
    late_fees_accrued: Money,
    late_fee_accrued_through: Option<NaiveDate>,
    start_date: NaiveDate,
    due_date: NaiveDate,
    term_days: u32,
    grace_period_days: u32,
    late_fee_rate: Rate,
    plan_type: PaymentPlanType,
    minimum_payment: Option<Money>,
    installments: Option<u32>,
    next_payment_date: Option<NaiveDate>,
    renewal_count: u32,
    status: LoanStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<LoanRow> for Loan {
    type Error = DbError;

    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        let payment_plan = match (row.plan_type, row.minimum_payment, row.installments) {
            (PaymentPlanType::Single, _, _) => PaymentPlan::Single,
            (PaymentPlanType::MinimumPayment, Some(minimum_monthly), _) => {
                PaymentPlan::MinimumPayment { minimum_monthly }
            }
            (PaymentPlanType::Installments, _, Some(count)) => PaymentPlan::Installments { count },
            (plan_type, _, _) => {
                return Err(DbError::invalid_data(
                    "loans",
                    format!("loan {} has plan {:?} without its parameter", row.id, plan_type),
                ))
            }
        };

        Ok(Loan {
            id: row.id,
            loan_number: row.loan_number,
            customer_id: row.customer_id,
            item_id: row.item_id,
            branch_id: row.branch_id,
            principal: row.principal,
            interest_rate: row.interest_rate,
            interest_amount: row.interest_amount,
            total_amount: row.total_amount,
            amount_paid: row.amount_paid,
            principal_remaining: row.principal_remaining,
            interest_paid: row.interest_paid,
            late_fees_paid: row.late_fees_paid,
            late_fees_accrued: row.late_fees_accrued,
            late_fee_accrued_through: row.late_fee_accrued_through,
            start_date: row.start_date,
            due_date: row.due_date,
            term_days: row.term_days,
            grace_period_days: row.grace_period_days,
            late_fee_rate: row.late_fee_rate,
            payment_plan,
            next_payment_date: row.next_payment_date,
            renewal_count: row.renewal_count,
            status: row.status,
            lifecycle: Lifecycle::from_deleted_at(row.deleted_at),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Splits a plan into its `(plan_type, minimum_payment, installments)` columns.
fn plan_columns(plan: &PaymentPlan) -> (PaymentPlanType, Option<Money>, Option<u32>) {
    match plan {
        PaymentPlan::Single => (PaymentPlanType::Single, None, None),
        PaymentPlan::MinimumPayment { minimum_monthly } => {
            (PaymentPlanType::MinimumPayment, Some(*minimum_monthly), None)
        }
        PaymentPlan::Installments { count } => (PaymentPlanType::Installments, None, Some(*count)),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RenewalRow {
    id: String,
    loan_id: String,
    sequence: u32,
    previous_start_date: NaiveDate,
    previous_due_date: NaiveDate,
    new_start_date: NaiveDate,
    new_due_date: NaiveDate,
    principal_at_renewal: Money,
    previous_interest_amount: Money,
    new_interest_amount: Money,
    renewed_at: DateTime<Utc>,
}

impl From<RenewalRow> for LoanRenewal {
    fn from(row: RenewalRow) -> Self {
        LoanRenewal {
            id: row.id,
            loan_id: row.loan_id,
            sequence: row.sequence,
            previous_start_date: row.previous_start_date,
            previous_due_date: row.previous_due_date,
            new_start_date: row.new_start_date,
            new_due_date: row.new_due_date,
            principal_at_renewal: row.principal_at_renewal,
            previous_interest_amount: row.previous_interest_amount,
            new_interest_amount: row.new_interest_amount,
            renewed_at: row.renewed_at,
        }
    }
}

/// Repository for loans and loan renewals.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoanRepository;

impl LoanRepository {
    /// Takes the write lock on a loan row. Must be the first statement of the
    /// transaction that mutates the loan.
    ///
    /// Returns `false` if the loan does not exist.
    pub async fn lock(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE loans SET version = version + 1 WHERE id = ?1")
            .bind(id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Gets a live loan by ID.
    pub async fn get(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Loan>> {
        let row: Option<LoanRow> =
            sqlx::query_as(concat!(loan_select!(), "WHERE id = ?1 AND deleted_at IS NULL"))
                .bind(id)
                .fetch_optional(conn)
                .await?;

        row.map(Loan::try_from).transpose()
    }

    pub async fn get_by_number(
        &self,
        conn: &mut SqliteConnection,
        loan_number: &str,
    ) -> DbResult<Option<Loan>> {
        let row: Option<LoanRow> = sqlx::query_as(concat!(
            loan_select!(),
            "WHERE loan_number = ?1 AND deleted_at IS NULL"
        ))
        .bind(loan_number)
        .fetch_optional(conn)
        .await?;

        row.map(Loan::try_from).transpose()
    }

    /// The open (active or overdue) loan holding an item, if any.
    pub async fn find_open_by_item(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
    ) -> DbResult<Option<Loan>> {
        let row: Option<LoanRow> = sqlx::query_as(concat!(
            loan_select!(),
            "WHERE item_id = ?1 AND status IN ('active', 'overdue')"
        ))
        .bind(item_id)
        .fetch_optional(conn)
        .await?;

        row.map(Loan::try_from).transpose()
    }

    /// Active loans whose grace period ended before `today`, oldest due first.
    ///
    /// Cheap pre-filter for the overdue sweep: `due_date < today - grace`.
    /// Each candidate is re-checked under its own lock.
    pub async fn list_overdue_candidates(
        &self,
        conn: &mut SqliteConnection,
        today: NaiveDate,
    ) -> DbResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM loans
            WHERE status = 'active'
              AND deleted_at IS NULL
              AND date(due_date, '+' || grace_period_days || ' days') < ?1
            ORDER BY due_date ASC
            "#,
        )
        .bind(today)
        .fetch_all(conn)
        .await?;

        Ok(ids)
    }

    pub async fn insert(&self, conn: &mut SqliteConnection, loan: &Loan) -> DbResult<()> {
        debug!(id = %loan.id, loan_number = %loan.loan_number, item_id = %loan.item_id, "Inserting loan");

        let (plan_type, minimum_payment, installments) = plan_columns(&loan.payment_plan);

        sqlx::query(
            r#"
            INSERT INTO loans (
                id, loan_number, customer_id, item_id, branch_id,
                principal, interest_rate, interest_amount, total_amount, amount_paid,
                principal_remaining, interest_paid, late_fees_paid,
                late_fees_accrued, late_fee_accrued_through,
                start_date, due_date, term_days, grace_period_days, late_fee_rate,
                plan_type, minimum_payment, installments, next_payment_date, renewal_count,
                status, created_at, updated_at, deleted_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13,
                ?14, ?15,
                ?16, ?17, ?18, ?19, ?20,
                ?21, ?22, ?23, ?24, ?25,
                ?26, ?27, ?28, ?29
            )
            "#,
        )
        .bind(&loan.id)
        .bind(&loan.loan_number)
        .bind(&loan.customer_id)
        .bind(&loan.item_id)
        .bind(&loan.branch_id)
        .bind(loan.principal)
        .bind(loan.interest_rate)
        .bind(loan.interest_amount)
        .bind(loan.total_amount)
        .bind(loan.amount_paid)
        .bind(loan.principal_remaining)
        .bind(loan.interest_paid)
        .bind(loan.late_fees_paid)
        .bind(loan.late_fees_accrued)
        .bind(loan.late_fee_accrued_through)
        .bind(loan.start_date)
        .bind(loan.due_date)
        .bind(loan.term_days)
        .bind(loan.grace_period_days)
        .bind(loan.late_fee_rate)
        .bind(plan_type)
        .bind(minimum_payment)
        .bind(installments)
        .bind(loan.next_payment_date)
        .bind(loan.renewal_count)
        .bind(loan.status)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .bind(loan.lifecycle.deleted_at())
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Writes back the mutable part of a loan (balances, dates, status).
    ///
    /// Identity, parties and rates never change after origination.
    pub async fn update(&self, conn: &mut SqliteConnection, loan: &Loan) -> DbResult<()> {
        debug!(id = %loan.id, status = %loan.status, "Updating loan");

        let result = sqlx::query(
            r#"
            UPDATE loans SET
                interest_amount = ?2,
                total_amount = ?3,
                amount_paid = ?4,
                principal_remaining = ?5,
                interest_paid = ?6,
                late_fees_paid = ?7,
                late_fees_accrued = ?8,
                late_fee_accrued_through = ?9,
                start_date = ?10,
                due_date = ?11,
                next_payment_date = ?12,
                renewal_count = ?13,
                status = ?14,
                updated_at = ?15
            WHERE id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(&loan.id)
        .bind(loan.interest_amount)
        .bind(loan.total_amount)
        .bind(loan.amount_paid)
        .bind(loan.principal_remaining)
        .bind(loan.interest_paid)
        .bind(loan.late_fees_paid)
        .bind(loan.late_fees_accrued)
        .bind(loan.late_fee_accrued_through)
        .bind(loan.start_date)
        .bind(loan.due_date)
        .bind(loan.next_payment_date)
        .bind(loan.renewal_count)
        .bind(loan.status)
        .bind(loan.updated_at)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Loan", &loan.id));
        }

        Ok(())
    }

    /// Soft-deletes a loan. Payments keep referencing it.
    pub async fn soft_delete(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        debug!(id = %id, "Archiving loan");

        let result = sqlx::query(
            "UPDATE loans SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn insert_renewal(
        &self,
        conn: &mut SqliteConnection,
        renewal: &LoanRenewal,
    ) -> DbResult<()> {
        debug!(loan_id = %renewal.loan_id, sequence = renewal.sequence, "Recording renewal");

        sqlx::query(
            r#"
            INSERT INTO loan_renewals (
                id, loan_id, sequence,
                previous_start_date, previous_due_date, new_start_date, new_due_date,
                principal_at_renewal, previous_interest_amount, new_interest_amount,
                renewed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&renewal.id)
        .bind(&renewal.loan_id)
        .bind(renewal.sequence)
        .bind(renewal.previous_start_date)
        .bind(renewal.previous_due_date)
        .bind(renewal.new_start_date)
        .bind(renewal.new_due_date)
        .bind(renewal.principal_at_renewal)
        .bind(renewal.previous_interest_amount)
        .bind(renewal.new_interest_amount)
        .bind(renewal.renewed_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Renewal history of a loan, first renewal first.
    pub async fn list_renewals(
        &self,
        conn: &mut SqliteConnection,
        loan_id: &str,
    ) -> DbResult<Vec<LoanRenewal>> {
        let rows: Vec<RenewalRow> = sqlx::query_as(
            r#"
            SELECT id, loan_id, sequence,
                   previous_start_date, previous_due_date, new_start_date, new_due_date,
                   principal_at_renewal, previous_interest_amount, new_interest_amount,
                   renewed_at
            FROM loan_renewals
            WHERE loan_id = ?1
            ORDER BY sequence ASC
            "#,
        )
        .bind(loan_id)
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().map(LoanRenewal::from).collect())
    }
}
