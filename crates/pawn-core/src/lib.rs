//! # pawn-core: Pure Loan & Cash Logic
//!
//! Everything the pawn engine decides, as pure functions over plain values.
//! No database, no network, no wall clock.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Pawn Loan Ledger Architecture                      │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              HTTP handlers (outside this workspace)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    pawn-engine                                  │   │
//! │  │    Engine: loans, payments, cash sessions (one tx per op)      │   │
//! │  └──────────────┬──────────────────────────────┬───────────────────┘   │
//! │                 │                              │                        │
//! │  ┌──────────────▼──────────────────┐  ┌───────▼───────────────────┐   │
//! │  │   ★ pawn-core (THIS CRATE) ★    │  │        pawn-db            │   │
//! │  │                                 │  │  SQLite repositories,     │   │
//! │  │  money  lifecycle  waterfall    │  │  migrations, outbox       │   │
//! │  │  types  validation  cash        │  │                           │   │
//! │  │  events  clock                  │  │                           │   │
//! │  └─────────────────────────────────┘  └───────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Items, loans, payments, cash sessions and movements
//! - [`money`] - Integer cents and basis-point rates
//! - [`lifecycle`] - Loan terms, overdue detection, late fees, renewal
//! - [`waterfall`] - Payment allocation (late fees → interest → principal)
//! - [`cash`] - X cut / Z cut arithmetic
//! - [`events`] - Domain events written to the outbox
//! - [`clock`] - Injectable time source
//! - [`error`] - Domain errors and the error kinds callers branch on
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use pawn_core::lifecycle::compute_terms;
//! use pawn_core::money::{Money, Rate};
//! use pawn_core::types::PaymentPlan;
//!
//! let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
//! let terms = compute_terms(
//!     Money::from_cents(100_000),
//!     Rate::from_percent(10),
//!     30,
//!     &PaymentPlan::Single,
//!     start,
//!     30,
//! );
//!
//! // 1000.00 at 10% for one term
//! assert_eq!(terms.total_amount.cents(), 110_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cash;
pub mod clock;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod money;
pub mod types;
pub mod validation;
pub mod waterfall;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use events::DomainEvent;
pub use lifecycle::{LoanBalance, RenewalInterestPolicy};
pub use money::{Money, Rate};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Longest loan term accepted at origination.
pub const MAX_TERM_DAYS: u32 = 365;

/// Longest grace period after the due date.
pub const MAX_GRACE_PERIOD_DAYS: u32 = 365;

/// Most installments an installment plan can be split into.
pub const MAX_INSTALLMENTS: u32 = 52;

/// Days between periodic payments for minimum-payment and installment plans.
pub const DEFAULT_PAYMENT_INTERVAL_DAYS: u32 = 30;
