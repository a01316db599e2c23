// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for vendora-core.
//!
//! Provides a unified error type with stable machine-readable codes that an
//! outer transport can map onto its own responses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Serializable error payload handed to callers of the handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code (e.g. `VENDOR_NOT_FOUND`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Core errors that can occur during request processing.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// Vendor was not found in the database.
    VendorNotFound {
        /// The vendor ID that was not found.
        vendor_id: String,
    },

    /// Another vendor already uses this vendor code.
    VendorCodeTaken {
        /// The conflicting vendor code.
        vendor_code: String,
    },

    /// Purchase order was not found in the database.
    PurchaseOrderNotFound {
        /// The purchase order ID that was not found.
        po_id: String,
    },

    /// Another purchase order already uses this order number.
    DuplicateOrderNumber {
        /// The conflicting order number.
        po_number: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Shorthand for a [`CoreError::ValidationError`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Convert this error to a serializable response payload.
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::VendorNotFound { .. } => "VENDOR_NOT_FOUND",
            Self::VendorCodeTaken { .. } => "VENDOR_CODE_TAKEN",
            Self::PurchaseOrderNotFound { .. } => "PURCHASE_ORDER_NOT_FOUND",
            Self::DuplicateOrderNumber { .. } => "DUPLICATE_ORDER_NUMBER",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }

    /// Whether this error was caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::DatabaseError { .. })
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VendorNotFound { vendor_id } => {
                write!(f, "Vendor '{}' not found", vendor_id)
            }
            Self::VendorCodeTaken { vendor_code } => {
                write!(f, "Vendor code '{}' is already in use", vendor_code)
            }
            Self::PurchaseOrderNotFound { po_id } => {
                write!(f, "Purchase order '{}' not found", po_id)
            }
            Self::DuplicateOrderNumber { po_number } => {
                write!(f, "Purchase order number '{}' already exists", po_number)
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for CoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CoreError::DatabaseError {
            operation: "migrate".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
