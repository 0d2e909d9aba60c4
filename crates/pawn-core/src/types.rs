//! # Domain Types
//!
//! Entities and closed status enums for the loan and cash ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Item       │   │      Loan       │   │    Payment      │       │
//! │  │  ─────────────  │◄──│  ─────────────  │◄──│  ─────────────  │       │
//! │  │  appraised      │   │  loan_number    │   │  payment_number │       │
//! │  │  status         │   │  principal      │   │  late/int/princ │       │
//! │  └─────────────────┘   │  status         │   └────────┬────────┘       │
//! │                        └─────────────────┘            │ optional       │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌────────▼────────┐       │
//! │  │  CashRegister   │◄──│  CashSession    │◄──│  CashMovement   │       │
//! │  │  branch, name   │   │  open / closed  │   │  signed amount  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Loans and payments have a UUID `id` used for relations and a sequential
//! human-readable number (`loan_number`, `payment_number`) printed on tickets.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::{Money, Rate};

// =============================================================================
// Lifecycle (soft delete)
// =============================================================================

/// Whether a record is live or has been logically deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Deleted {
        #[ts(as = "String")]
        at: DateTime<Utc>,
    },
}

impl Lifecycle {
    /// Builds the lifecycle from a nullable `deleted_at` column.
    pub fn from_deleted_at(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            Some(at) => Lifecycle::Deleted { at },
            None => Lifecycle::Active,
        }
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Lifecycle::Active => None,
            Lifecycle::Deleted { at } => Some(*at),
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::Active
    }
}

// =============================================================================
// Item
// =============================================================================

/// Status of a collateral item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// In the shop's custody but free to be pledged.
    Available,
    /// Bound to exactly one active or overdue loan.
    Pledged,
    /// Confiscated and listed for sale.
    ForSale,
    /// Taken by the shop after an unpaid loan.
    Confiscated,
    Sold,
}

impl ItemStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Available => "available",
            ItemStatus::Pledged => "pledged",
            ItemStatus::ForSale => "for_sale",
            ItemStatus::Confiscated => "confiscated",
            ItemStatus::Sold => "sold",
        }
    }

    /// Closed transition table for item status changes.
    ///
    /// ```text
    /// available ──pledge──► pledged ──release──► available
    ///                          │
    ///                          └──confiscate──► confiscated ──list──► for_sale ──sell──► sold
    /// available ──list──► for_sale
    /// ```
    pub const fn can_transition_to(&self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (ItemStatus::Available, ItemStatus::Pledged)
                | (ItemStatus::Available, ItemStatus::ForSale)
                | (ItemStatus::Pledged, ItemStatus::Available)
                | (ItemStatus::Pledged, ItemStatus::Confiscated)
                | (ItemStatus::Confiscated, ItemStatus::ForSale)
                | (ItemStatus::ForSale, ItemStatus::Sold)
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A collateral item (subset of the catalogue record relevant to lending).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Item {
    pub id: String,
    pub branch_id: String,
    pub description: String,
    /// Appraiser's market value; caps the principal that can be lent.
    pub appraised_value: Money,
    /// Suggested loan amount shown at the counter.
    pub loan_value: Money,
    pub status: ItemStatus,
    pub lifecycle: Lifecycle,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Customer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub full_name: String,
    /// Blocked customers keep their history but cannot take new loans.
    pub is_active: bool,
    pub lifecycle: Lifecycle,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Customer {
    #[inline]
    pub fn can_borrow(&self) -> bool {
        self.is_active && self.lifecycle.is_active()
    }
}

// =============================================================================
// Loan Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Paid,
    Overdue,
    /// Transient audit state between two terms.
    Renewed,
    Defaulted,
    Confiscated,
}

impl LoanStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Paid => "paid",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Renewed => "renewed",
            LoanStatus::Defaulted => "defaulted",
            LoanStatus::Confiscated => "confiscated",
        }
    }

    /// Statuses under which the loan still holds its item.
    #[inline]
    pub const fn is_open(&self) -> bool {
        matches!(self, LoanStatus::Active | LoanStatus::Overdue)
    }

    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanStatus::Paid | LoanStatus::Confiscated | LoanStatus::Defaulted
        )
    }

    /// Loan state machine.
    ///
    /// ```text
    /// active  ──► paid | overdue | renewed
    /// overdue ──► paid | confiscated | renewed
    /// renewed ──► active
    /// paid, confiscated, defaulted: terminal
    /// ```
    pub const fn can_transition_to(&self, next: LoanStatus) -> bool {
        matches!(
            (self, next),
            (LoanStatus::Active, LoanStatus::Paid)
                | (LoanStatus::Active, LoanStatus::Overdue)
                | (LoanStatus::Active, LoanStatus::Renewed)
                | (LoanStatus::Overdue, LoanStatus::Paid)
                | (LoanStatus::Overdue, LoanStatus::Confiscated)
                | (LoanStatus::Overdue, LoanStatus::Renewed)
                | (LoanStatus::Renewed, LoanStatus::Active)
        )
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Plan
// =============================================================================

/// Storage discriminant for [`PaymentPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPlanType {
    Single,
    MinimumPayment,
    Installments,
}

/// How the customer intends to repay.
///
/// Every plan uses the same waterfall; the plan only decides whether the loan
/// carries a periodic `next_payment_date` and what counts as a periodic payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentPlan {
    /// Everything is due on the due date.
    Single,
    /// At least `minimum_monthly` every payment interval.
    MinimumPayment { minimum_monthly: Money },
    /// The total split into `count` equal installments.
    Installments { count: u32 },
}

impl PaymentPlan {
    pub const fn plan_type(&self) -> PaymentPlanType {
        match self {
            PaymentPlan::Single => PaymentPlanType::Single,
            PaymentPlan::MinimumPayment { .. } => PaymentPlanType::MinimumPayment,
            PaymentPlan::Installments { .. } => PaymentPlanType::Installments,
        }
    }

    #[inline]
    pub const fn is_periodic(&self) -> bool {
        !matches!(self, PaymentPlan::Single)
    }

    /// The amount a single periodic payment must reach to advance the
    /// schedule, or `None` for single-payment loans.
    pub fn periodic_amount(&self, total_amount: Money) -> Option<Money> {
        match self {
            PaymentPlan::Single => None,
            PaymentPlan::MinimumPayment { minimum_monthly } => Some(*minimum_monthly),
            PaymentPlan::Installments { count } => Some(total_amount.ceil_div(*count)),
        }
    }
}

// =============================================================================
// Loan
// =============================================================================

/// A pawn loan secured by a single item.
///
/// Balances are tracked per bucket so the waterfall can be recomputed from the
/// row alone: `interest_paid`, `late_fees_paid` and `late_fees_accrued` cover
/// the current term and are reset by renewal; `amount_paid` is lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Loan {
    pub id: String,
    /// Human-readable ticket number, e.g. `LN-20260131-0001`.
    pub loan_number: String,
    pub customer_id: String,
    pub item_id: String,
    pub branch_id: String,
    /// Amount disbursed at origination.
    pub principal: Money,
    /// Interest per term.
    pub interest_rate: Rate,
    /// Interest charged for the current term.
    pub interest_amount: Money,
    /// Principal plus the interest of every term so far.
    pub total_amount: Money,
    pub amount_paid: Money,
    pub principal_remaining: Money,
    pub interest_paid: Money,
    pub late_fees_paid: Money,
    /// Late fees accrued up to `late_fee_accrued_through`, each day charged on
    /// the principal owed that day.
    pub late_fees_accrued: Money,
    #[ts(as = "Option<String>")]
    pub late_fee_accrued_through: Option<NaiveDate>,
    #[ts(as = "String")]
    pub start_date: NaiveDate,
    #[ts(as = "String")]
    pub due_date: NaiveDate,
    pub term_days: u32,
    pub grace_period_days: u32,
    /// Late fee per day overdue beyond the grace period.
    pub late_fee_rate: Rate,
    pub payment_plan: PaymentPlan,
    #[ts(as = "Option<String>")]
    pub next_payment_date: Option<NaiveDate>,
    pub renewal_count: u32,
    pub status: LoanStatus,
    pub lifecycle: Lifecycle,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// Interest still owed for the current term.
    #[inline]
    pub fn interest_outstanding(&self) -> Money {
        self.interest_amount.saturating_sub(self.interest_paid)
    }
}

// =============================================================================
// Payment
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
}

/// A payment towards a loan. Immutable once stored.
///
/// `principal_amount + interest_amount + late_fee_amount == amount` always.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub payment_number: String,
    pub loan_id: String,
    pub amount: Money,
    pub principal_amount: Money,
    pub interest_amount: Money,
    pub late_fee_amount: Money,
    pub method: PaymentMethod,
    #[ts(as = "String")]
    pub payment_date: DateTime<Utc>,
    pub cash_session_id: Option<String>,
    pub idempotency_key: Option<String>,
}

// =============================================================================
// Loan Renewal (audit)
// =============================================================================

/// One renewal of a loan: the term that ended and the term that started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoanRenewal {
    pub id: String,
    pub loan_id: String,
    /// 1 for the first renewal, 2 for the second, ...
    pub sequence: u32,
    #[ts(as = "String")]
    pub previous_start_date: NaiveDate,
    #[ts(as = "String")]
    pub previous_due_date: NaiveDate,
    #[ts(as = "String")]
    pub new_start_date: NaiveDate,
    #[ts(as = "String")]
    pub new_due_date: NaiveDate,
    pub principal_at_renewal: Money,
    pub previous_interest_amount: Money,
    pub new_interest_amount: Money,
    #[ts(as = "String")]
    pub renewed_at: DateTime<Utc>,
}

// =============================================================================
// Cash Register & Session
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashRegister {
    pub id: String,
    pub branch_id: String,
    pub name: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CashSessionStatus {
    Open,
    Closed,
}

impl CashSessionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CashSessionStatus::Open => "open",
            CashSessionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for CashSessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a Z cut, present only on closed sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionClosing {
    #[ts(as = "String")]
    pub closed_at: DateTime<Utc>,
    pub counted_amount: Money,
    pub expected_amount: Money,
    /// `counted - expected`; negative means the drawer is short.
    pub difference: Money,
}

/// A working shift on one register, from opening float to Z cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashSession {
    pub id: String,
    pub register_id: String,
    /// Operator (user) who opened the session.
    pub opened_by: String,
    pub opening_amount: Money,
    pub status: CashSessionStatus,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    pub closing: Option<SessionClosing>,
    pub notes: Option<String>,
}

impl CashSession {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == CashSessionStatus::Open
    }
}

// =============================================================================
// Cash Movement
// =============================================================================

/// Which way a movement type moves money.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementDirection {
    /// Amount must be positive.
    In,
    /// Amount must be negative.
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Loan payment received.
    IncomePayment,
    /// Sale of a for-sale item.
    IncomeSale,
    /// Cash returned from a cancelled disbursement.
    IncomeDisbursementReversal,
    IncomeOther,
    /// Principal handed to the customer at origination.
    ExpenseLoanDisbursement,
    ExpenseSupplier,
    ExpenseOperational,
    /// Cash taken out of the drawer (bank deposit, safe drop).
    ExpenseWithdrawal,
    AdjustmentPlus,
    AdjustmentMinus,
}

impl MovementType {
    pub const fn direction(&self) -> MovementDirection {
        match self {
            MovementType::IncomePayment
            | MovementType::IncomeSale
            | MovementType::IncomeDisbursementReversal
            | MovementType::IncomeOther
            | MovementType::AdjustmentPlus => MovementDirection::In,
            MovementType::ExpenseLoanDisbursement
            | MovementType::ExpenseSupplier
            | MovementType::ExpenseOperational
            | MovementType::ExpenseWithdrawal
            | MovementType::AdjustmentMinus => MovementDirection::Out,
        }
    }

    #[inline]
    pub const fn is_adjustment(&self) -> bool {
        matches!(self, MovementType::AdjustmentPlus | MovementType::AdjustmentMinus)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementType::IncomePayment => "income_payment",
            MovementType::IncomeSale => "income_sale",
            MovementType::IncomeDisbursementReversal => "income_disbursement_reversal",
            MovementType::IncomeOther => "income_other",
            MovementType::ExpenseLoanDisbursement => "expense_loan_disbursement",
            MovementType::ExpenseSupplier => "expense_supplier",
            MovementType::ExpenseOperational => "expense_operational",
            MovementType::ExpenseWithdrawal => "expense_withdrawal",
            MovementType::AdjustmentPlus => "adjustment_plus",
            MovementType::AdjustmentMinus => "adjustment_minus",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage discriminant for [`MovementReference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Payment,
    Sale,
    Loan,
}

/// What a movement points back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum MovementReference {
    None,
    Payment(String),
    Sale(String),
    Loan(String),
}

impl MovementReference {
    /// Splits into the `(reference_type, reference_id)` column pair.
    pub fn to_parts(&self) -> (Option<ReferenceType>, Option<String>) {
        match self {
            MovementReference::None => (None, None),
            MovementReference::Payment(id) => (Some(ReferenceType::Payment), Some(id.clone())),
            MovementReference::Sale(id) => (Some(ReferenceType::Sale), Some(id.clone())),
            MovementReference::Loan(id) => (Some(ReferenceType::Loan), Some(id.clone())),
        }
    }

    /// Rebuilds from the column pair. A type without an id reads as `None`.
    pub fn from_parts(kind: Option<ReferenceType>, id: Option<String>) -> Self {
        match (kind, id) {
            (Some(ReferenceType::Payment), Some(id)) => MovementReference::Payment(id),
            (Some(ReferenceType::Sale), Some(id)) => MovementReference::Sale(id),
            (Some(ReferenceType::Loan), Some(id)) => MovementReference::Loan(id),
            _ => MovementReference::None,
        }
    }
}

impl Default for MovementReference {
    fn default() -> Self {
        MovementReference::None
    }
}

/// One line of a session's cash ledger. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashMovement {
    pub id: String,
    pub session_id: String,
    pub movement_type: MovementType,
    /// Signed: incomes positive, expenses negative.
    pub amount: Money,
    pub reference: MovementReference,
    pub description: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Event Outbox
// =============================================================================

/// A domain event waiting to be delivered to collaborators (audit log,
/// notifications, receipt printing).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OutboxEntry {
    pub id: String,
    /// Event name, e.g. `PaymentApplied`.
    pub event_type: String,
    /// Loan, payment or session the event is about.
    pub aggregate_id: String,
    /// The full event as JSON.
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub delivered_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================
