//! Checkout error handling
//!
//! One error type for every orchestrator operation, with a stable code for
//! clients, a retry hint, and a message that is safe to show to a buyer.

use crate::payments::types::GatewayId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stable error codes for programmatic handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Caller errors
    InvalidRequest,
    NotAuthenticated,
    Unauthorized,
    AlreadyPurchased,
    UnknownGateway,
    MissingDetails,
    InvalidDetails,
    SessionNotFound,
    InvalidStateTransition,

    // Payment outcomes
    InitiationFailed,
    VerificationFailed,
    VerificationTimeout,
    UserCancelled,

    // Money moved, access did not
    FulfillmentError,

    // Infrastructure
    StorageError,
}

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("Invalid purchase request: {message}")]
    InvalidRequest { message: String },

    #[error("No signed-in user")]
    NotAuthenticated,

    #[error("Caller {caller_id} cannot act for buyer {buyer_id}")]
    Unauthorized { caller_id: String, buyer_id: String },

    #[error("Buyer {buyer_id} already purchased {item_id}")]
    AlreadyPurchased { buyer_id: String, item_id: String },

    #[error("Unknown or disabled gateway {gateway}: {message}")]
    UnknownGateway { gateway: String, message: String },

    #[error("Missing payment detail: {field}")]
    MissingDetails { field: String },

    #[error("Invalid payment detail: {message}")]
    InvalidDetails {
        field: Option<String>,
        message: String,
    },

    #[error("Payment session {session_id} not found")]
    SessionNotFound { session_id: Uuid },

    #[error("Session {session_id} cannot {action} while {state}")]
    InvalidStateTransition {
        session_id: Uuid,
        state: String,
        action: String,
    },

    #[error("Gateway {gateway} could not initiate payment: {message}")]
    InitiationFailed {
        gateway: GatewayId,
        message: String,
        retryable: bool,
    },

    #[error("Payment verification failed for session {session_id}: {reason}")]
    VerificationFailed { session_id: Uuid, reason: String },

    #[error("Payment for session {session_id} still unconfirmed after {attempts} checks")]
    VerificationTimeout { session_id: Uuid, attempts: u32 },

    #[error("Payment session {session_id} was cancelled")]
    UserCancelled { session_id: Uuid },

    #[error("Payment recorded as {transaction_id} but access grant failed: {message}")]
    FulfillmentError {
        transaction_id: Uuid,
        buyer_id: String,
        item_id: String,
        message: String,
    },

    #[error("Storage error: {message}")]
    Storage { message: String, retryable: bool },
}

pub type CheckoutResult<T> = Result<T, CheckoutError>;

impl CheckoutError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CheckoutError::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            CheckoutError::NotAuthenticated => ErrorCode::NotAuthenticated,
            CheckoutError::Unauthorized { .. } => ErrorCode::Unauthorized,
            CheckoutError::AlreadyPurchased { .. } => ErrorCode::AlreadyPurchased,
            CheckoutError::UnknownGateway { .. } => ErrorCode::UnknownGateway,
            CheckoutError::MissingDetails { .. } => ErrorCode::MissingDetails,
            CheckoutError::InvalidDetails { .. } => ErrorCode::InvalidDetails,
            CheckoutError::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            CheckoutError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            CheckoutError::InitiationFailed { .. } => ErrorCode::InitiationFailed,
            CheckoutError::VerificationFailed { .. } => ErrorCode::VerificationFailed,
            CheckoutError::VerificationTimeout { .. } => ErrorCode::VerificationTimeout,
            CheckoutError::UserCancelled { .. } => ErrorCode::UserCancelled,
            CheckoutError::FulfillmentError { .. } => ErrorCode::FulfillmentError,
            CheckoutError::Storage { .. } => ErrorCode::StorageError,
        }
    }

    /// Whether the buyer should be offered "try again".
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::VerificationTimeout { .. } => true,
            CheckoutError::InitiationFailed { retryable, .. } => *retryable,
            CheckoutError::Storage { retryable, .. } => *retryable,
            CheckoutError::FulfillmentError { .. } => true,
            _ => false,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::InvalidRequest { message } => {
                format!("This purchase cannot be processed: {}", message)
            }
            CheckoutError::NotAuthenticated => "Please sign in to continue".to_string(),
            CheckoutError::Unauthorized { .. } => {
                "You can only purchase lessons for your own account".to_string()
            }
            CheckoutError::AlreadyPurchased { .. } => {
                "You already have access to this lesson".to_string()
            }
            CheckoutError::UnknownGateway { .. } => {
                "That payment method is not available".to_string()
            }
            CheckoutError::MissingDetails { field } => {
                format!("Please provide your {}", field.replace('_', " "))
            }
            CheckoutError::InvalidDetails { message, .. } => message.clone(),
            CheckoutError::SessionNotFound { .. } => {
                "This checkout has expired. Please start again".to_string()
            }
            CheckoutError::InvalidStateTransition { .. } => {
                "This checkout can no longer be changed".to_string()
            }
            CheckoutError::InitiationFailed { retryable, .. } => {
                if *retryable {
                    "Payment provider is temporarily unavailable. Please try again".to_string()
                } else {
                    "Payment could not be started. Please choose another method".to_string()
                }
            }
            CheckoutError::VerificationFailed { .. } => {
                "Payment verification failed. Please contact support".to_string()
            }
            CheckoutError::VerificationTimeout { .. } => {
                "We could not confirm your payment yet. Please try again".to_string()
            }
            CheckoutError::UserCancelled { .. } => "Payment cancelled".to_string(),
            CheckoutError::FulfillmentError { .. } => {
                "Payment received. Access to your lesson is being restored".to_string()
            }
            CheckoutError::Storage { .. } => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::VerificationTimeout).unwrap();
        assert_eq!(json, "\"VERIFICATION_TIMEOUT\"");
        let json = serde_json::to_string(&ErrorCode::StorageError).unwrap();
        assert_eq!(json, "\"STORAGE_ERROR\"");
    }

    #[test]
    fn test_timeout_and_failure_are_distinguished() {
        let session_id = Uuid::new_v4();
        let timeout = CheckoutError::VerificationTimeout {
            session_id,
            attempts: 3,
        };
        let failed = CheckoutError::VerificationFailed {
            session_id,
            reason: "declined".to_string(),
        };

        assert!(timeout.is_retryable());
        assert!(!failed.is_retryable());
        assert!(timeout.user_message().contains("try again"));
        assert!(failed.user_message().contains("contact support"));
        assert_ne!(timeout.error_code(), failed.error_code());
    }

    #[test]
    fn test_fulfillment_error_message_mentions_payment() {
        let error = CheckoutError::FulfillmentError {
            transaction_id: Uuid::new_v4(),
            buyer_id: "u1".to_string(),
            item_id: "lessonA".to_string(),
            message: "grant service down".to_string(),
        };
        assert_eq!(error.error_code(), ErrorCode::FulfillmentError);
        assert!(error.user_message().starts_with("Payment received"));
    }

    #[test]
    fn test_missing_details_message_is_readable() {
        let error = CheckoutError::MissingDetails {
            field: "phone_number".to_string(),
        };
        assert_eq!(error.user_message(), "Please provide your phone number");
    }
}
