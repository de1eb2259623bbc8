//! # Validation Module
//!
//! Input validation for natural keys and ledger entries.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Entity Mapper                                                │
//! │  └── natural key present and well-formed (THIS MODULE)                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Ledger append                                                │
//! │  └── movement quantity / cost sanity (THIS MODULE)                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE natural key per entity table                               │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::MAX_NATURAL_KEY_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Natural Keys
// =============================================================================

/// Validates a natural key (item code, supplier code, document number).
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most `MAX_NATURAL_KEY_LEN` characters
/// - No control characters (they break the ERP's URL routing)
///
/// ## Example
/// ```rust
/// use autocount_core::validation::validate_natural_key;
///
/// assert!(validate_natural_key("item_code", "ITM-001").is_ok());
/// assert!(validate_natural_key("doc_no", "PO-2024/0007").is_ok());
/// assert!(validate_natural_key("item_code", "  ").is_err());
/// ```
pub fn validate_natural_key(field: &str, key: &str) -> ValidationResult<()> {
    let key = key.trim();

    if key.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if key.chars().count() > MAX_NATURAL_KEY_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NATURAL_KEY_LEN,
        });
    }

    if key.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Ledger Validators
// =============================================================================

/// Validates a stock movement before it is appended to the ledger.
///
/// ## Rules
/// - Quantity must be non-zero (a zero movement carries no information)
/// - Unit cost, when present, must not be negative
pub fn validate_movement(quantity: i64, unit_cost: Option<Money>) -> ValidationResult<()> {
    if quantity == 0 {
        return Err(ValidationError::MustBeNonZero {
            field: "quantity".to_string(),
        });
    }

    if let Some(cost) = unit_cost {
        if cost.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "unit_cost".to_string(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_key_rules() {
        assert!(validate_natural_key("item_code", "A").is_ok());
        assert!(validate_natural_key("item_code", "").is_err());
        assert!(validate_natural_key("item_code", &"X".repeat(MAX_NATURAL_KEY_LEN)).is_ok());
        assert!(validate_natural_key("item_code", &"X".repeat(MAX_NATURAL_KEY_LEN + 1)).is_err());
        assert!(validate_natural_key("item_code", "BAD\nKEY").is_err());
    }

    #[test]
    fn test_movement_rules() {
        assert!(validate_movement(10, Some(Money::from_cents(200))).is_ok());
        assert!(validate_movement(-3, None).is_ok());
        assert!(validate_movement(0, None).is_err());
        assert!(validate_movement(5, Some(Money::from_cents(-1))).is_err());
    }
}
