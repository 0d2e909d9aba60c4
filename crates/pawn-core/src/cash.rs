//! # Cash Session Arithmetic
//!
//! X cut (partial summary of an open session) and Z cut (close) math.
//!
//! ```text
//!   expected = opening_amount + Σ movement.amount
//!            = opening + income - expense + net_adjustments
//!
//!   difference = counted - expected      (negative: drawer is short)
//! ```
//!
//! Movement amounts are signed, so the expected total is a plain sum. The
//! income/expense split only exists for the report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{CashMovement, CashSession, MovementType, SessionClosing};

/// Total and count of one movement type within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementTypeTotal {
    pub movement_type: MovementType,
    pub total: Money,
    pub count: i64,
}

/// X cut: the state of a session's drawer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionSummary {
    pub session_id: String,
    pub opening_amount: Money,
    /// Sum of positive non-adjustment movements.
    pub total_income: Money,
    /// Magnitude of negative non-adjustment movements.
    pub total_expense: Money,
    /// Signed sum of adjustments.
    pub net_adjustments: Money,
    pub movement_count: i64,
    pub expected_amount: Money,
    pub by_type: Vec<MovementTypeTotal>,
}

impl SessionSummary {
    /// Builds the summary from per-type totals (as aggregated by the store).
    pub fn from_type_totals(session: &CashSession, totals: Vec<MovementTypeTotal>) -> Self {
        let mut total_income = Money::zero();
        let mut total_expense = Money::zero();
        let mut net_adjustments = Money::zero();
        let mut movement_count = 0;

        for line in &totals {
            movement_count += line.count;
            if line.movement_type.is_adjustment() {
                net_adjustments += line.total;
            } else if line.total.is_negative() {
                total_expense += line.total.abs();
            } else {
                total_income += line.total;
            }
        }

        SessionSummary {
            session_id: session.id.clone(),
            opening_amount: session.opening_amount,
            total_income,
            total_expense,
            net_adjustments,
            movement_count,
            expected_amount: session.opening_amount + total_income - total_expense
                + net_adjustments,
            by_type: totals,
        }
    }

    /// Builds the summary from the movements themselves.
    pub fn from_movements(session: &CashSession, movements: &[CashMovement]) -> Self {
        let mut totals: Vec<MovementTypeTotal> = Vec::new();

        for movement in movements {
            match totals
                .iter_mut()
                .find(|t| t.movement_type == movement.movement_type)
            {
                Some(line) => {
                    line.total += movement.amount;
                    line.count += 1;
                }
                None => totals.push(MovementTypeTotal {
                    movement_type: movement.movement_type,
                    total: movement.amount,
                    count: 1,
                }),
            }
        }

        SessionSummary::from_type_totals(session, totals)
    }

    /// Z cut: freezes the expected amount against what was counted.
    pub fn close(&self, counted_amount: Money, closed_at: DateTime<Utc>) -> SessionClosing {
        SessionClosing {
            closed_at,
            counted_amount,
            expected_amount: self.expected_amount,
            difference: counted_amount - self.expected_amount,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
