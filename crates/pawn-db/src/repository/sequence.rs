//! # Number Sequences
//!
//! Human-readable ticket numbers: `PREFIX-YYYYMMDD-NNNN`, restarting at 1
//! each day per prefix.
//!
//! The counter row is bumped with an upsert inside the caller's transaction,
//! so a number is assigned exactly when the loan or payment commits; a rolled
//! back operation gives its number back.

use chrono::NaiveDate;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;

/// Formats a sequence value as a ticket number.
///
/// ```rust
/// use chrono::NaiveDate;
/// use pawn_db::repository::sequence::format_number;
///
/// let day = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
/// assert_eq!(format_number("LN", day, 7), "LN-20260131-0007");
/// ```
pub fn format_number(prefix: &str, day: NaiveDate, value: i64) -> String {
    format!("{}-{}-{:04}", prefix, day.format("%Y%m%d"), value)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceRepository;

impl SequenceRepository {
    /// Draws the next number for `prefix` on `day`.
    pub async fn next_number(
        &self,
        conn: &mut SqliteConnection,
        prefix: &str,
        day: NaiveDate,
    ) -> DbResult<String> {
        let day_key = day.format("%Y%m%d").to_string();

        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO number_sequences (prefix, day, last_value)
            VALUES (?1, ?2, 1)
            ON CONFLICT (prefix, day) DO UPDATE SET last_value = last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(prefix)
        .bind(&day_key)
        .fetch_one(conn)
        .await?;

        let number = format_number(prefix, day, value);
        debug!(number = %number, "Assigned number");
        Ok(number)
    }
}
