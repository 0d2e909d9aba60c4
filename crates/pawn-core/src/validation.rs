//! # Validation Module
//!
//! Input validation for engine requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP handler (outside this workspace)                        │
//! │  └── Deserialization, required fields                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Ranges and signs, before a transaction is opened                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Engine, under row lock                                       │
//! │  └── Preconditions that depend on stored state                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: SQLite                                                        │
//! │  └── CHECK, UNIQUE and partial unique indexes                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use pawn_core::money::{Money, Rate};
//! use pawn_core::validation::{validate_interest_rate, validate_principal};
//!
//! validate_principal(Money::from_cents(100_000)).unwrap();
//! assert!(validate_interest_rate(Rate::from_bps(10_001)).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::{Money, Rate};
use crate::types::{MovementDirection, MovementType, PaymentPlan};
use crate::{MAX_GRACE_PERIOD_DAYS, MAX_INSTALLMENTS, MAX_TERM_DAYS};

pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates an entity reference.
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > 64 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 64,
        });
    }

    Ok(())
}

/// Validates a client-generated idempotency key.
///
/// ## Rules
/// - Between 1 and 128 characters
/// - Printable ASCII, no whitespace
pub fn validate_idempotency_key(key: &str) -> ValidationResult<()> {
    if key.is_empty() {
        return Err(ValidationError::Required {
            field: "idempotency_key".to_string(),
        });
    }

    if key.len() > 128 {
        return Err(ValidationError::TooLong {
            field: "idempotency_key".to_string(),
            max: 128,
        });
    }

    if !key.chars().all(|c| c.is_ascii_graphic()) {
        return Err(ValidationError::InvalidFormat {
            field: "idempotency_key".to_string(),
            reason: "must be printable ASCII without spaces".to_string(),
        });
    }

    Ok(())
}

/// Validates a free-text description (movement notes, session notes).
pub fn validate_description(text: &str) -> ValidationResult<()> {
    if text.len() > 500 {
        return Err(ValidationError::TooLong {
            field: "description".to_string(),
            max: 500,
        });
    }

    Ok(())
}

// =============================================================================
// Loan Term Validators
// =============================================================================

/// Principal must be positive.
pub fn validate_principal(principal: Money) -> ValidationResult<()> {
    if !principal.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "principal".to_string(),
        });
    }

    Ok(())
}

/// Interest per term must be between 0% and 100%.
pub fn validate_interest_rate(rate: Rate) -> ValidationResult<()> {
    if rate.bps() > Rate::MAX_PERCENT_BPS {
        return Err(ValidationError::OutOfRange {
            field: "interest_rate".to_string(),
            min: 0,
            max: Rate::MAX_PERCENT_BPS as i64,
        });
    }

    Ok(())
}

/// Daily late fee rate must be between 0% and 100%.
pub fn validate_late_fee_rate(rate: Rate) -> ValidationResult<()> {
    if rate.bps() > Rate::MAX_PERCENT_BPS {
        return Err(ValidationError::OutOfRange {
            field: "late_fee_rate".to_string(),
            min: 0,
            max: Rate::MAX_PERCENT_BPS as i64,
        });
    }

    Ok(())
}

pub fn validate_term_days(days: u32) -> ValidationResult<()> {
    if days == 0 || days > MAX_TERM_DAYS {
        return Err(ValidationError::OutOfRange {
            field: "term_days".to_string(),
            min: 1,
            max: MAX_TERM_DAYS as i64,
        });
    }

    Ok(())
}

pub fn validate_grace_period_days(days: u32) -> ValidationResult<()> {
    if days > MAX_GRACE_PERIOD_DAYS {
        return Err(ValidationError::OutOfRange {
            field: "grace_period_days".to_string(),
            min: 0,
            max: MAX_GRACE_PERIOD_DAYS as i64,
        });
    }

    Ok(())
}

/// Validates the plan parameters.
///
/// ## Rules
/// - Minimum payment plans need a positive minimum
/// - Installment plans need between 1 and `MAX_INSTALLMENTS` installments
pub fn validate_payment_plan(plan: &PaymentPlan) -> ValidationResult<()> {
    match plan {
        PaymentPlan::Single => Ok(()),
        PaymentPlan::MinimumPayment { minimum_monthly } => {
            if !minimum_monthly.is_positive() {
                return Err(ValidationError::MustBePositive {
                    field: "minimum_monthly_payment".to_string(),
                });
            }
            Ok(())
        }
        PaymentPlan::Installments { count } => {
            if *count == 0 || *count > MAX_INSTALLMENTS {
                return Err(ValidationError::OutOfRange {
                    field: "installments".to_string(),
                    min: 1,
                    max: MAX_INSTALLMENTS as i64,
                });
            }
            Ok(())
        }
    }
}

// =============================================================================
// Cash Validators
// =============================================================================

/// Payment amounts must be positive.
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

/// Opening floats and counted amounts cannot be negative.
pub fn validate_cash_count(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates that a movement's sign agrees with its type.
///
/// ## Rules
/// - Zero is never a movement
/// - Incomes and `adjustment_plus` are positive
/// - Expenses and `adjustment_minus` are negative
pub fn validate_movement_amount(movement_type: MovementType, amount: Money) -> ValidationResult<()> {
    if amount.is_zero() {
        return Err(ValidationError::Required {
            field: "movement amount".to_string(),
        });
    }

    let sign_ok = match movement_type.direction() {
        MovementDirection::In => amount.is_positive(),
        MovementDirection::Out => amount.is_negative(),
    };

    if !sign_ok {
        let reason = match movement_type.direction() {
            MovementDirection::In => format!("{} must be positive", movement_type),
            MovementDirection::Out => format!("{} must be negative", movement_type),
        };
        return Err(ValidationError::InvalidFormat {
            field: "movement amount".to_string(),
            reason,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
