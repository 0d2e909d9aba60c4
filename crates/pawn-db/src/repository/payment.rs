//! # Payment Repository
//!
//! Payments are append-only. There is no update or delete here.
//!
//! A payment stored with an idempotency key can be found again by
//! `(loan_id, idempotency_key)`; a retried request returns that row instead
//! of applying twice.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use pawn_core::{Money, Payment, PaymentMethod};

macro_rules! payment_select {
    () => {
        r#"
        SELECT id, payment_number, loan_id, amount,
               principal_amount, interest_amount, late_fee_amount,
               method, payment_date, cash_session_id, idempotency_key
        FROM payments
        "#
    };
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: String,
    payment_number: String,
    loan_id: String,
    amount: Money,
    principal_amount: Money,
    interest_amount: Money,
    late_fee_amount: Money,
    method: PaymentMethod,
    payment_date: DateTime<Utc>,
    cash_session_id: Option<String>,
    idempotency_key: Option<String>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Payment {
            id: row.id,
            payment_number: row.payment_number,
            loan_id: row.loan_id,
            amount: row.amount,
            principal_amount: row.principal_amount,
            interest_amount: row.interest_amount,
            late_fee_amount: row.late_fee_amount,
            method: row.method,
            payment_date: row.payment_date,
            cash_session_id: row.cash_session_id,
            idempotency_key: row.idempotency_key,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentRepository;

impl PaymentRepository {
    pub async fn insert(&self, conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
        debug!(
            id = %payment.id,
            loan_id = %payment.loan_id,
            amount = %payment.amount,
            "Inserting payment"
        );

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, payment_number, loan_id, amount,
                principal_amount, interest_amount, late_fee_amount,
                method, payment_date, cash_session_id, idempotency_key
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.payment_number)
        .bind(&payment.loan_id)
        .bind(payment.amount)
        .bind(payment.principal_amount)
        .bind(payment.interest_amount)
        .bind(payment.late_fee_amount)
        .bind(payment.method)
        .bind(payment.payment_date)
        .bind(&payment.cash_session_id)
        .bind(&payment.idempotency_key)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn get(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as(concat!(payment_select!(), "WHERE id = ?1"))
            .bind(id)
            .fetch_optional(conn)
            .await?;

        Ok(row.map(Payment::from))
    }

    /// The payment previously stored for this loan under `key`, if any.
    pub async fn find_by_idempotency_key(
        &self,
        conn: &mut SqliteConnection,
        loan_id: &str,
        key: &str,
    ) -> DbResult<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as(concat!(
            payment_select!(),
            "WHERE loan_id = ?1 AND idempotency_key = ?2"
        ))
        .bind(loan_id)
        .bind(key)
        .fetch_optional(conn)
        .await?;

        Ok(row.map(Payment::from))
    }

    /// All payments of a loan in the order they were made.
    pub async fn list_by_loan(
        &self,
        conn: &mut SqliteConnection,
        loan_id: &str,
    ) -> DbResult<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(concat!(
            payment_select!(),
            "WHERE loan_id = ?1 ORDER BY payment_date ASC, payment_number ASC"
        ))
        .bind(loan_id)
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().map(Payment::from).collect())
    }

    /// Sum of principal applied to a loan across all payments.
    pub async fn total_principal_applied(
        &self,
        conn: &mut SqliteConnection,
        loan_id: &str,
    ) -> DbResult<Money> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(principal_amount), 0) FROM payments WHERE loan_id = ?1",
        )
        .bind(loan_id)
        .fetch_one(conn)
        .await?;

        Ok(Money::from_cents(total))
    }
}
