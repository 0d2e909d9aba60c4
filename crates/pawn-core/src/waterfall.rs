//! # Payment Waterfall
//!
//! Splits a payment across the loan's buckets in a fixed order and applies the
//! split to the loan row.
//!
//! ```text
//!   payment ──► late fees outstanding ──► interest outstanding ──► principal
//!               (first)                   (second)                 (last)
//! ```
//!
//! A payment larger than the payoff is rejected outright; nothing is
//! allocated and nothing is stored.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::lifecycle::{balance_as_of, fold_late_fees};
use crate::money::{add_days, Money};
use crate::types::{Loan, LoanStatus};
use crate::validation::validate_payment_amount;

/// How one payment was split across the buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Allocation {
    pub late_fee: Money,
    pub interest: Money,
    pub principal: Money,
}

impl Allocation {
    /// Always equals the payment amount.
    #[inline]
    pub fn total(&self) -> Money {
        self.late_fee + self.interest + self.principal
    }
}

/// Allocates `amount` against the loan as of `as_of`.
///
/// ## Errors
/// - `Validation` if the amount is not positive
/// - `LoanNotPayable` unless the loan is `active` or `overdue`
/// - `Overpayment` if the amount exceeds the payoff
///
/// ## Example
/// ```rust
/// # use pawn_core::waterfall::Allocation;
/// # use pawn_core::money::Money;
/// // 1000.00 principal, 100.00 interest, 15.00 late fees owed; pay 200.00
/// let expected = Allocation {
///     late_fee: Money::from_cents(1_500),
///     interest: Money::from_cents(10_000),
///     principal: Money::from_cents(8_500),
/// };
/// assert_eq!(expected.total(), Money::from_cents(20_000));
/// ```
pub fn allocate(loan: &Loan, amount: Money, as_of: NaiveDate) -> CoreResult<Allocation> {
    validate_payment_amount(amount)?;

    if !loan.status.is_open() {
        return Err(CoreError::LoanNotPayable {
            loan_id: loan.id.clone(),
            status: loan.status,
        });
    }

    let balance = balance_as_of(loan, as_of);
    if amount > balance.payoff_amount {
        return Err(CoreError::Overpayment {
            loan_id: loan.id.clone(),
            requested: amount,
            payoff: balance.payoff_amount,
        });
    }

    let mut remaining = amount;

    let late_fee = remaining.min(balance.late_fee_outstanding);
    remaining -= late_fee;

    let interest = remaining.min(balance.interest_outstanding);
    remaining -= interest;

    let principal = remaining.min(balance.principal_outstanding);

    Ok(Allocation {
        late_fee,
        interest,
        principal,
    })
}

/// What applying a payment did to the loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedPayment {
    pub allocation: Allocation,
    /// The loan moved to `paid` with this payment.
    pub paid_off: bool,
    /// The periodic schedule moved to the next date.
    pub schedule_advanced: bool,
}

/// Applies an allocation to the loan's buckets.
///
/// Late fees accrued so far are folded into the row first, so lowering the
/// principal only affects days still to come. Sets the loan to `paid` when
/// nothing is owed afterwards and advances `next_payment_date` when a
/// periodic plan's installment was met.
pub fn apply_allocation(
    loan: &mut Loan,
    allocation: Allocation,
    as_of: NaiveDate,
    payment_interval_days: u32,
) -> AppliedPayment {
    fold_late_fees(loan, as_of);

    loan.amount_paid += allocation.total();
    loan.late_fees_paid += allocation.late_fee;
    loan.interest_paid += allocation.interest;
    loan.principal_remaining -= allocation.principal;

    let paid_off = balance_as_of(loan, as_of).is_settled();
    let mut schedule_advanced = false;

    if paid_off {
        loan.status = LoanStatus::Paid;
        loan.next_payment_date = None;
    } else if let (Some(next), Some(periodic)) = (
        loan.next_payment_date,
        loan.payment_plan.periodic_amount(loan.total_amount),
    ) {
        if allocation.total() >= periodic {
            loan.next_payment_date =
                Some(add_days(next, payment_interval_days as i64).min(loan.due_date));
            schedule_advanced = true;
        }
    }

    AppliedPayment {
        allocation,
        paid_off,
        schedule_advanced,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
