//! The five concrete rails.

pub mod bank_transfer;
pub mod flutterwave;
pub mod mobile_money;
pub mod paystack;
pub mod ussd;

pub use bank_transfer::BankTransferStrategy;
pub use flutterwave::FlutterwaveStrategy;
pub use mobile_money::MobileMoneyStrategy;
pub use paystack::PaystackStrategy;
pub use ussd::UssdStrategy;

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::{AggregatorStatusReport, ProviderStatus};
use crate::payments::types::{ChargeContext, VerificationResult};

pub(crate) fn verification_from_report(report: AggregatorStatusReport) -> VerificationResult {
    match report.status {
        ProviderStatus::Success => {
            VerificationResult::verified(report.provider_tx_id.or(Some(report.reference)))
        }
        ProviderStatus::Pending | ProviderStatus::Unknown => VerificationResult::pending(),
        ProviderStatus::Failed | ProviderStatus::Abandoned | ProviderStatus::Reversed => {
            VerificationResult::failed(
                report
                    .message
                    .unwrap_or_else(|| format!("provider reported {:?}", report.status)),
            )
        }
    }
}

pub(crate) fn require_email(charge: &ChargeContext, provider: &str) -> PaymentResult<String> {
    charge
        .customer
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .ok_or(PaymentError::ValidationError {
            message: format!("customer.email is required for {} initialization", provider),
            field: Some("customer.email".to_string()),
        })
}

/// Case-insensitive lookup returning the catalog's own spelling.
pub(crate) fn match_option(options: &[String], value: &str) -> Option<String> {
    options
        .iter()
        .find(|o| o.eq_ignore_ascii_case(value.trim()))
        .cloned()
}
