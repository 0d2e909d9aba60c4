//! # Loan Lifecycle
//!
//! Pure functions behind loan origination, overdue detection, late fees,
//! renewal and confiscation. The engine calls these under a row lock with the
//! loan it just re-read; nothing here touches storage or the clock.
//!
//! ## Timeline of one term
//! ```text
//!  start_date            due_date        due_date + grace
//!      │────── term_days ────│──── grace ────│──── late fees accrue ────►
//!      │                     │               │
//!      │  interest is flat   │  not overdue  │  overdue: may be marked,
//!      │  for the term       │  yet          │  confiscated after grace
//! ```
//!
//! ## Late fees
//! Each day beyond grace is charged `principal_remaining × late_fee_rate` on
//! the principal owed that day. The row keeps what accrued up to the last
//! principal change (`late_fees_accrued`, `late_fee_accrued_through`); the
//! open segment since then is computed on read:
//!
//! ```text
//! accrued = late_fees_accrued
//!         + principal_remaining × rate × days(max(grace_end, accrued_through) .. as_of)
//! ```
//!
//! No job has to run for fees to accrue, so a missed scheduler run cannot
//! make balances drift.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{add_days, days_between, Money, Rate};
use crate::types::{Loan, LoanStatus, PaymentPlan};

// =============================================================================
// Origination
// =============================================================================

/// Terms computed at origination (or renewal) of a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanTerms {
    pub interest_amount: Money,
    pub total_amount: Money,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    pub next_payment_date: Option<NaiveDate>,
}

/// Computes flat interest, total and dates for a new loan.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use pawn_core::lifecycle::compute_terms;
/// use pawn_core::money::{Money, Rate};
/// use pawn_core::types::PaymentPlan;
///
/// let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
/// let terms = compute_terms(
///     Money::from_major_minor(1000, 0),
///     Rate::from_percent(10),
///     30,
///     &PaymentPlan::Single,
///     start,
///     30,
/// );
/// assert_eq!(terms.interest_amount, Money::from_major_minor(100, 0));
/// assert_eq!(terms.total_amount, Money::from_major_minor(1100, 0));
/// assert_eq!(terms.due_date, NaiveDate::from_ymd_opt(2026, 1, 31).unwrap());
/// ```
pub fn compute_terms(
    principal: Money,
    interest_rate: Rate,
    term_days: u32,
    plan: &PaymentPlan,
    start_date: NaiveDate,
    payment_interval_days: u32,
) -> LoanTerms {
    let interest_amount = principal.apply_rate(interest_rate);
    let due_date = add_days(start_date, term_days as i64);

    LoanTerms {
        interest_amount,
        total_amount: principal + interest_amount,
        start_date,
        due_date,
        next_payment_date: first_payment_date(plan, start_date, due_date, payment_interval_days),
    }
}

/// First periodic payment date, never later than the due date.
fn first_payment_date(
    plan: &PaymentPlan,
    start_date: NaiveDate,
    due_date: NaiveDate,
    payment_interval_days: u32,
) -> Option<NaiveDate> {
    if !plan.is_periodic() {
        return None;
    }
    Some(add_days(start_date, payment_interval_days as i64).min(due_date))
}

/// The most that can be lent against an item.
///
/// ```rust
/// use pawn_core::lifecycle::lending_limit;
/// use pawn_core::money::{Money, Rate};
///
/// let limit = lending_limit(Money::from_cents(200_000), Rate::from_percent(80));
/// assert_eq!(limit, Money::from_cents(160_000));
/// ```
#[inline]
pub fn lending_limit(appraised_value: Money, max_loan_to_value: Rate) -> Money {
    appraised_value.apply_rate(max_loan_to_value)
}

// =============================================================================
// Overdue Detection & Late Fees
// =============================================================================

/// Where a loan stands relative to its due date on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OverdueStatus {
    /// Days past the due date (0 when not yet due).
    pub days_overdue: i64,
    /// Days past the end of the grace period (0 inside it).
    pub days_beyond_grace: i64,
    /// Whether the loan should be moved to `overdue`.
    pub is_overdue: bool,
}

/// Evaluates overdue status as of a date.
///
/// `is_overdue = as_of > due_date + grace_period_days AND status = active`.
/// Day counts are reported for any open loan so that already-overdue loans
/// keep accruing late fees.
pub fn compute_overdue(loan: &Loan, as_of: NaiveDate) -> OverdueStatus {
    if !loan.status.is_open() {
        return OverdueStatus {
            days_overdue: 0,
            days_beyond_grace: 0,
            is_overdue: false,
        };
    }

    let days_overdue = days_between(loan.due_date, as_of).max(0);
    let days_beyond_grace = (days_overdue - loan.grace_period_days as i64).max(0);

    OverdueStatus {
        days_overdue,
        days_beyond_grace,
        is_overdue: loan.status == LoanStatus::Active && days_beyond_grace > 0,
    }
}

/// Late fees accrued in the current term as of a date.
pub fn accrued_late_fee(loan: &Loan, as_of: NaiveDate) -> Money {
    loan.late_fees_accrued + open_late_fee_segment(loan, as_of)
}

/// Fees on the current principal since the last fold.
fn open_late_fee_segment(loan: &Loan, as_of: NaiveDate) -> Money {
    if !loan.status.is_open() {
        return Money::zero();
    }

    let grace_end = add_days(loan.due_date, loan.grace_period_days as i64);
    let from = match loan.late_fee_accrued_through {
        Some(through) => through.max(grace_end),
        None => grace_end,
    };
    let days = days_between(from, as_of).max(0);
    loan.principal_remaining.apply_daily_rate(loan.late_fee_rate, days)
}

/// Moves the open segment into the stored accrual.
///
/// Must run before `principal_remaining` changes, otherwise the days already
/// past would be charged on the new principal.
pub fn fold_late_fees(loan: &mut Loan, as_of: NaiveDate) {
    if !loan.status.is_open() {
        return;
    }
    loan.late_fees_accrued = accrued_late_fee(loan, as_of);
    loan.late_fee_accrued_through = Some(match loan.late_fee_accrued_through {
        Some(through) => through.max(as_of),
        None => as_of,
    });
}

/// Late fees still owed: accrued minus what was paid this term.
pub fn late_fee_outstanding(loan: &Loan, as_of: NaiveDate) -> Money {
    accrued_late_fee(loan, as_of).saturating_sub(loan.late_fees_paid)
}

// =============================================================================
// Balance
// =============================================================================

/// What a loan owes on a given day, bucket by bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoanBalance {
    #[ts(as = "String")]
    pub as_of: NaiveDate,
    pub late_fee_accrued: Money,
    pub late_fee_outstanding: Money,
    pub interest_outstanding: Money,
    pub principal_outstanding: Money,
    /// Exact amount that pays the loan off today.
    pub payoff_amount: Money,
    pub days_overdue: i64,
}

impl LoanBalance {
    /// True once nothing is owed in any bucket.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.payoff_amount.is_zero()
    }
}

/// Computes the bucketed balance of a loan as of a date.
pub fn balance_as_of(loan: &Loan, as_of: NaiveDate) -> LoanBalance {
    let overdue = compute_overdue(loan, as_of);
    let late_fee_accrued = accrued_late_fee(loan, as_of);
    let late_fee_outstanding = late_fee_accrued.saturating_sub(loan.late_fees_paid);
    let interest_outstanding = loan.interest_outstanding();
    let principal_outstanding = loan.principal_remaining.max(Money::zero());

    LoanBalance {
        as_of,
        late_fee_accrued,
        late_fee_outstanding,
        interest_outstanding,
        principal_outstanding,
        payoff_amount: late_fee_outstanding + interest_outstanding + principal_outstanding,
        days_overdue: overdue.days_overdue,
    }
}

// =============================================================================
// State Transitions
// =============================================================================

/// Checks a status change against the loan state machine.
pub fn ensure_transition(loan: &Loan, next: LoanStatus, operation: &'static str) -> CoreResult<()> {
    if loan.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(CoreError::InvalidLoanState {
            loan_id: loan.id.clone(),
            status: loan.status,
            operation,
        })
    }
}

/// Checks that an active loan may be marked overdue today.
pub fn check_mark_overdue(loan: &Loan, as_of: NaiveDate) -> CoreResult<OverdueStatus> {
    ensure_transition(loan, LoanStatus::Overdue, "mark overdue")?;

    let overdue = compute_overdue(loan, as_of);
    if !overdue.is_overdue {
        return Err(CoreError::GracePeriodNotElapsed {
            loan_id: loan.id.clone(),
            days_overdue: overdue.days_overdue,
            grace_period_days: loan.grace_period_days,
        });
    }

    Ok(overdue)
}

/// Checks that an overdue loan may be confiscated today.
///
/// Requires `status = overdue` and `days_overdue > grace_period_days`.
pub fn check_confiscation(loan: &Loan, as_of: NaiveDate) -> CoreResult<OverdueStatus> {
    ensure_transition(loan, LoanStatus::Confiscated, "confiscate")?;

    let overdue = compute_overdue(loan, as_of);
    if overdue.days_overdue <= loan.grace_period_days as i64 {
        return Err(CoreError::GracePeriodNotElapsed {
            loan_id: loan.id.clone(),
            days_overdue: overdue.days_overdue,
            grace_period_days: loan.grace_period_days,
        });
    }

    Ok(overdue)
}

// =============================================================================
// Renewal
// =============================================================================

/// How interest is recomputed when a loan is renewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RenewalInterestPolicy {
    /// New term interest on what is still owed in principal.
    RemainingPrincipal,
    /// New term interest on the originally disbursed principal.
    OriginalPrincipal,
}

impl Default for RenewalInterestPolicy {
    fn default() -> Self {
        RenewalInterestPolicy::RemainingPrincipal
    }
}

impl FromStr for RenewalInterestPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remaining_principal" | "remaining" => Ok(RenewalInterestPolicy::RemainingPrincipal),
            "original_principal" | "original" => Ok(RenewalInterestPolicy::OriginalPrincipal),
            other => Err(format!("unknown renewal interest policy '{other}'")),
        }
    }
}

/// Terms of the next cycle of a renewed loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalTerms {
    pub interest_amount: Money,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    pub next_payment_date: Option<NaiveDate>,
}

/// Checks renewal preconditions and computes the next term.
///
/// ## Rules
/// - Loan must be `active` or `overdue`
/// - Current-term interest must be fully paid
/// - Accrued late fees must be fully paid (renewal resets the due date,
///   which would otherwise erase them)
pub fn renewal_terms(
    loan: &Loan,
    today: NaiveDate,
    policy: RenewalInterestPolicy,
    payment_interval_days: u32,
) -> CoreResult<RenewalTerms> {
    ensure_transition(loan, LoanStatus::Renewed, "renew")?;

    let balance = balance_as_of(loan, today);
    let outstanding = balance.interest_outstanding + balance.late_fee_outstanding;
    if outstanding.is_positive() {
        return Err(CoreError::RenewalRequiresPayment {
            loan_id: loan.id.clone(),
            outstanding,
        });
    }

    let base = match policy {
        RenewalInterestPolicy::RemainingPrincipal => loan.principal_remaining,
        RenewalInterestPolicy::OriginalPrincipal => loan.principal,
    };
    let due_date = add_days(today, loan.term_days as i64);

    Ok(RenewalTerms {
        interest_amount: base.apply_rate(loan.interest_rate),
        start_date: today,
        due_date,
        next_payment_date: first_payment_date(
            &loan.payment_plan,
            today,
            due_date,
            payment_interval_days,
        ),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::Lifecycle;
    use chrono::Utc;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// 1000.00 at 10% for 30 days from 2026-01-01, 5 days grace, 0.5%/day.
    pub(crate) fn sample_loan() -> Loan {
        let start = date(2026, 1, 1);
        let terms = compute_terms(
            Money::from_cents(100_000),
            Rate::from_percent(10),
            30,
            &PaymentPlan::Single,
            start,
            30,
        );
        Loan {
            id: "loan-1".to_string(),
            loan_number: "LN-20260101-0001".to_string(),
            customer_id: "cust-1".to_string(),
            item_id: "item-1".to_string(),
            branch_id: "branch-1".to_string(),
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
            grace_period_days: 5,
            late_fee_rate: Rate::from_bps(50),
            payment_plan: PaymentPlan::Single,
            next_payment_date: None,
            renewal_count: 0,
            status: LoanStatus::Active,
            lifecycle: Lifecycle::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_terms_for_standard_loan() {
        let loan = sample_loan();
        assert_eq!(loan.interest_amount.cents(), 10_000);
        assert_eq!(loan.total_amount.cents(), 110_000);
        assert_eq!(loan.due_date, date(2026, 1, 31));
    }

    #[test]
    fn test_periodic_plan_gets_first_payment_date() {
        let start = date(2026, 1, 1);
        let terms = compute_terms(
            Money::from_cents(50_000),
            Rate::from_percent(5),
            90,
            &PaymentPlan::MinimumPayment {
                minimum_monthly: Money::from_cents(10_000),
            },
            start,
            30,
        );
        assert_eq!(terms.next_payment_date, Some(date(2026, 1, 31)));

        // Interval longer than the term: first payment is the due date.
        let short = compute_terms(
            Money::from_cents(50_000),
            Rate::from_percent(5),
            15,
            &PaymentPlan::Installments { count: 2 },
            start,
            30,
        );
        assert_eq!(short.next_payment_date, Some(short.due_date));
    }

    #[test]
    fn test_not_overdue_inside_grace() {
        let loan = sample_loan();
        // Due 01-31, grace 5 days: 02-05 is the last day of grace.
        let status = compute_overdue(&loan, date(2026, 2, 5));
        assert_eq!(status.days_overdue, 5);
        assert_eq!(status.days_beyond_grace, 0);
        assert!(!status.is_overdue);
        assert_eq!(accrued_late_fee(&loan, date(2026, 2, 5)), Money::zero());
    }

    #[test]
    fn test_overdue_after_grace_with_late_fee() {
        let loan = sample_loan();
        let status = compute_overdue(&loan, date(2026, 2, 8));
        assert_eq!(status.days_overdue, 8);
        assert_eq!(status.days_beyond_grace, 3);
        assert!(status.is_overdue);

        // 1000.00 × 0.5% × 3 days = 15.00
        assert_eq!(accrued_late_fee(&loan, date(2026, 2, 8)).cents(), 1_500);
    }

    #[test]
    fn test_overdue_status_loan_keeps_accruing_but_is_not_reflagged() {
        let mut loan = sample_loan();
        loan.status = LoanStatus::Overdue;
        let status = compute_overdue(&loan, date(2026, 2, 10));
        assert!(!status.is_overdue);
        assert_eq!(status.days_beyond_grace, 5);
        assert_eq!(accrued_late_fee(&loan, date(2026, 2, 10)).cents(), 2_500);
    }

    #[test]
    fn test_terminal_loan_accrues_nothing() {
        let mut loan = sample_loan();
        loan.status = LoanStatus::Paid;
        assert_eq!(accrued_late_fee(&loan, date(2026, 6, 1)), Money::zero());
    }

    #[test]
    fn test_folded_fees_keep_their_principal() {
        let mut loan = sample_loan();
        loan.status = LoanStatus::Overdue;

        // 3 days on 1000.00, folded on 02-08
        fold_late_fees(&mut loan, date(2026, 2, 8));
        assert_eq!(loan.late_fees_accrued.cents(), 1_500);
        assert_eq!(loan.late_fee_accrued_through, Some(date(2026, 2, 8)));

        // then 2 days on 400.00
        loan.principal_remaining = Money::from_cents(40_000);
        assert_eq!(accrued_late_fee(&loan, date(2026, 2, 10)).cents(), 1_500 + 400);

        // Folding twice on the same day adds nothing.
        fold_late_fees(&mut loan, date(2026, 2, 10));
        fold_late_fees(&mut loan, date(2026, 2, 10));
        assert_eq!(loan.late_fees_accrued.cents(), 1_900);
    }

    #[test]
    fn test_fold_inside_grace_stores_nothing() {
        let mut loan = sample_loan();
        fold_late_fees(&mut loan, date(2026, 1, 20));
        assert_eq!(loan.late_fees_accrued, Money::zero());

        // Accrual still starts at the end of grace, not at the fold date.
        assert_eq!(accrued_late_fee(&loan, date(2026, 2, 8)).cents(), 1_500);
    }

    #[test]
    fn test_balance_and_payoff() {
        let mut loan = sample_loan();
        loan.late_fees_paid = Money::from_cents(500);
        let balance = balance_as_of(&loan, date(2026, 2, 8));
        assert_eq!(balance.late_fee_accrued.cents(), 1_500);
        assert_eq!(balance.late_fee_outstanding.cents(), 1_000);
        assert_eq!(balance.interest_outstanding.cents(), 10_000);
        assert_eq!(balance.payoff_amount.cents(), 1_000 + 10_000 + 100_000);
        assert!(!balance.is_settled());
    }

    #[test]
    fn test_mark_overdue_checks() {
        let loan = sample_loan();
        assert!(check_mark_overdue(&loan, date(2026, 2, 5)).is_err());
        assert!(check_mark_overdue(&loan, date(2026, 2, 6)).is_ok());

        let mut paid = sample_loan();
        paid.status = LoanStatus::Paid;
        let err = check_mark_overdue(&paid, date(2026, 3, 1)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidLoanState { .. }));
    }

    #[test]
    fn test_confiscation_requires_overdue_status() {
        let loan = sample_loan();
        let err = check_confiscation(&loan, date(2026, 3, 1)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidLoanState { .. }));

        let mut overdue = sample_loan();
        overdue.status = LoanStatus::Overdue;
        assert!(check_confiscation(&overdue, date(2026, 2, 5)).is_err());
        assert!(check_confiscation(&overdue, date(2026, 2, 6)).is_ok());
    }

    #[test]
    fn test_renewal_requires_interest_paid() {
        let loan = sample_loan();
        let err = renewal_terms(
            &loan,
            date(2026, 1, 30),
            RenewalInterestPolicy::RemainingPrincipal,
            30,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::RenewalRequiresPayment { .. }));
    }

    #[test]
    fn test_renewal_requires_late_fees_paid() {
        let mut loan = sample_loan();
        loan.status = LoanStatus::Overdue;
        loan.interest_paid = loan.interest_amount;
        let err = renewal_terms(
            &loan,
            date(2026, 2, 8),
            RenewalInterestPolicy::RemainingPrincipal,
            30,
        )
        .unwrap_err();
        match err {
            CoreError::RenewalRequiresPayment { outstanding, .. } => {
                assert_eq!(outstanding.cents(), 1_500)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_renewal_interest_policies() {
        let mut loan = sample_loan();
        loan.interest_paid = loan.interest_amount;
        loan.principal_remaining = Money::from_cents(60_000);
        let today = date(2026, 1, 31);

        let remaining =
            renewal_terms(&loan, today, RenewalInterestPolicy::RemainingPrincipal, 30).unwrap();
        assert_eq!(remaining.interest_amount.cents(), 6_000);
        assert_eq!(remaining.start_date, today);
        assert_eq!(remaining.due_date, date(2026, 3, 2));

        let original =
            renewal_terms(&loan, today, RenewalInterestPolicy::OriginalPrincipal, 30).unwrap();
        assert_eq!(original.interest_amount.cents(), 10_000);
    }

    #[test]
    fn test_renewal_policy_parsing() {
        assert_eq!(
            "original_principal".parse::<RenewalInterestPolicy>().unwrap(),
            RenewalInterestPolicy::OriginalPrincipal
        );
        assert_eq!(
            " Remaining ".parse::<RenewalInterestPolicy>().unwrap(),
            RenewalInterestPolicy::RemainingPrincipal
        );
        assert!("compound".parse::<RenewalInterestPolicy>().is_err());
    }
}
