//! # Error Types
//!
//! Domain-specific error types for swapsync-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  swapsync-core errors (this file)                                      │
//! │  ├── CoreError        - Business rule failures                         │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── ErrorKind        - Taxonomy used for status mapping               │
//! │                                                                         │
//! │  swapsync-db errors                                                    │
//! │  └── DbError          - Database failures (wraps CoreError)            │
//! │                                                                         │
//! │  swapsync-notify errors                                                │
//! │  └── NotifyError      - SMS / crypto failures                          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → HTTP status             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Status Mapping
//! | Kind                 | Status |
//! |----------------------|--------|
//! | Validation           | 400    |
//! | Precondition         | 400    |
//! | Unauthenticated      | 401    |
//! | Authorization        | 403    |
//! | NotFound             | 404    |
//! | Conflict             | 409    |

use thiserror::Error;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification of a failure, used by transports to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller sent bad input.
    Validation,
    /// Input was well-formed but the current state forbids the operation.
    Precondition,
    /// Dependents or duplicates block the operation.
    Conflict,
    /// A presented secret (deletion code) did not match.
    Unauthenticated,
    /// Role check failed or the row belongs to another tenant.
    Authorization,
    /// The row does not exist.
    NotFound,
    /// Something outside the caller's control failed.
    Infrastructure,
}

impl ErrorKind {
    /// HTTP status code for this kind of failure.
    pub const fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation | ErrorKind::Precondition => 400,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Authorization => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Infrastructure => 500,
        }
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations. Engines return them
/// unchanged so the transport can map them with [`CoreError::kind`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// Not enough units of a product to cover the request.
    ///
    /// ## When This Occurs
    /// - POS line quantity exceeds `product.quantity`
    /// - Repair part usage exceeds stock
    /// - A concurrent sale took the last units between check and decrement
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// Phone is not in the `available` state.
    #[error("Phone {phone} is not available (status: {status})")]
    PhoneNotAvailable { phone: String, status: String },

    /// Product is deactivated and cannot be sold.
    #[error("Product {0} is not active")]
    ProductInactive(String),

    /// Trade-in plus cash does not reach the configured fraction of the
    /// new phone's value.
    ///
    /// ## Example
    /// ```text
    /// new phone 1000, floor 50% → 500 required
    /// trade-in 100 + balance 200 = 300 → SwapBelowFloor
    /// ```
    #[error("Swap value {offered} is below the required minimum {required}")]
    SwapBelowFloor { offered: String, required: String },

    /// A pending resale was already settled.
    #[error("Resale {0} has already been settled")]
    ResaleAlreadySettled(String),

    /// Repair status change not allowed by the state machine.
    #[error("Cannot move repair {repair} from {from} to {to}")]
    InvalidRepairTransition {
        repair: String,
        from: String,
        to: String,
    },

    /// Audit code wrong, expired, or already used.
    #[error("Audit code is invalid or has expired")]
    InvalidAuditCode,

    /// Customer deletion code did not match.
    #[error("Invalid deletion code")]
    InvalidDeletionCode,

    /// Role check failed or a cross-tenant access was attempted.
    #[error("Not permitted: {0}")]
    Forbidden(String),

    /// Referenced row does not exist (or is outside the caller's company).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Deletion blocked by dependent rows.
    ///
    /// The dependents are enumerated so the caller can resolve them.
    #[error("Cannot delete {entity} {id}: referenced by {}", dependents.join(", "))]
    HasDependents {
        entity: String,
        id: String,
        dependents: Vec<String>,
    },

    /// Operation is not possible in the current state.
    #[error("{0}")]
    Precondition(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a Forbidden error.
    pub fn forbidden(reason: impl Into<String>) -> Self {
        CoreError::Forbidden(reason.into())
    }

    /// Classifies the error for status mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::InsufficientStock { .. }
            | CoreError::PhoneNotAvailable { .. }
            | CoreError::ProductInactive(_)
            | CoreError::SwapBelowFloor { .. }
            | CoreError::ResaleAlreadySettled(_)
            | CoreError::InvalidRepairTransition { .. }
            | CoreError::InvalidAuditCode
            | CoreError::Precondition(_) => ErrorKind::Precondition,
            CoreError::HasDependents { .. } => ErrorKind::Conflict,
            CoreError::InvalidDeletionCode => ErrorKind::Unauthenticated,
            CoreError::Forbidden(_) => ErrorKind::Authorization,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before any row is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid format (e.g., bad IMEI, bad email).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::Required`].
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// Shorthand for [`ValidationError::Negative`].
    pub fn negative(field: impl Into<String>) -> Self {
        ValidationError::Negative {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product: "Screen Guard".to_string(),
            available: 1,
            requested: 2,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Screen Guard: available 1, requested 2"
        );

        let err = CoreError::HasDependents {
            entity: "Phone".to_string(),
            id: "7".to_string(),
            dependents: vec!["1 sale(s)".to_string(), "2 repair(s)".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Cannot delete Phone 7: referenced by 1 sale(s), 2 repair(s)"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(CoreError::InvalidDeletionCode.status_code(), 401);
        assert_eq!(CoreError::forbidden("role").status_code(), 403);
        assert_eq!(CoreError::not_found("Customer", 3).status_code(), 404);
        assert_eq!(CoreError::InvalidAuditCode.status_code(), 400);
        assert_eq!(
            CoreError::Validation(ValidationError::negative("total")).status_code(),
            400
        );
        assert_eq!(
            CoreError::HasDependents {
                entity: "Product".into(),
                id: "1".into(),
                dependents: vec![],
            }
            .kind(),
            ErrorKind::Conflict
        );
    }
}
