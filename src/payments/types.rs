use crate::payments::error::PaymentError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum GatewayId {
    Paystack,
    Flutterwave,
    BankTransfer,
    Ussd,
    MobileMoney,
}

impl GatewayId {
    /// Canonical display order of the rails.
    pub const ALL: [GatewayId; 5] = [
        GatewayId::Paystack,
        GatewayId::Flutterwave,
        GatewayId::BankTransfer,
        GatewayId::Ussd,
        GatewayId::MobileMoney,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayId::Paystack => "paystack",
            GatewayId::Flutterwave => "flutterwave",
            GatewayId::BankTransfer => "bank_transfer",
            GatewayId::Ussd => "ussd",
            GatewayId::MobileMoney => "mobile_money",
        }
    }
}

impl std::fmt::Display for GatewayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GatewayId {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "paystack" => Ok(GatewayId::Paystack),
            "flutterwave" => Ok(GatewayId::Flutterwave),
            "bank_transfer" | "bank-transfer" => Ok(GatewayId::BankTransfer),
            "ussd" => Ok(GatewayId::Ussd),
            "mobile_money" | "mobile-money" => Ok(GatewayId::MobileMoney),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported gateway: {}", value),
                field: Some("gateway".to_string()),
            }),
        }
    }
}

/// How a rail signals that the buyer has paid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// The orchestrator polls `verify` after the provider hands back a token.
    Polled,
    /// The outcome is known when `initiate` returns.
    Immediate,
    /// Only the buyer's own statement that they paid is available.
    Attestation,
}

/// Rail-specific fields collected at selection time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentDetails {
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub phone_number: Option<String>,
}

impl PaymentDetails {
    pub fn with_bank(bank_name: impl Into<String>) -> Self {
        Self {
            bank_name: Some(bank_name.into()),
            ..Self::default()
        }
    }

    pub fn with_mobile_money(provider: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            bank_name: Some(provider.into()),
            phone_number: Some(phone_number.into()),
            ..Self::default()
        }
    }

    pub fn bank_name(&self) -> Option<&str> {
        non_blank(self.bank_name.as_deref())
    }

    pub fn phone_number(&self) -> Option<&str> {
        non_blank(self.phone_number.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerContact {
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// Everything a strategy needs to initiate a charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeContext {
    pub reference: String,
    pub buyer_id: String,
    pub item_id: String,
    pub course_key: String,
    pub item_title: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub customer: CustomerContact,
    pub details: PaymentDetails,
}

impl ChargeContext {
    pub fn metadata(&self) -> JsonValue {
        serde_json::json!({
            "lesson_id": self.item_id,
            "lesson_title": self.item_title.as_deref().unwrap_or("Lesson"),
            "course_key": self.course_key,
            "student_id": self.buyer_id,
            "student_name": self.customer.name,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    Success,
    Pending,
    Failure,
}

/// Strength of the evidence behind a successful payment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Assurance {
    ProviderVerified,
    /// The buyer said they paid; nothing independent confirmed it.
    SelfAttested,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationResult {
    pub outcome: VerificationOutcome,
    pub provider_tx_id: Option<String>,
    pub assurance: Assurance,
    pub failure_reason: Option<String>,
}

impl VerificationResult {
    pub fn verified(provider_tx_id: Option<String>) -> Self {
        Self {
            outcome: VerificationOutcome::Success,
            provider_tx_id,
            assurance: Assurance::ProviderVerified,
            failure_reason: None,
        }
    }

    pub fn attested(reference: &str) -> Self {
        Self {
            outcome: VerificationOutcome::Success,
            provider_tx_id: Some(reference.to_string()),
            assurance: Assurance::SelfAttested,
            failure_reason: None,
        }
    }

    pub fn pending() -> Self {
        Self {
            outcome: VerificationOutcome::Pending,
            provider_tx_id: None,
            assurance: Assurance::ProviderVerified,
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            outcome: VerificationOutcome::Failure,
            provider_tx_id: None,
            assurance: Assurance::ProviderVerified,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == VerificationOutcome::Success
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum InitiationMode {
    /// Buyer is sent to the provider; a token comes back to `confirm`.
    Redirect,
    Immediate { result: VerificationResult },
    AwaitAttestation,
}

/// What the buyer has to do next, as shown by the caller's UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PaymentInstructions {
    Redirect {
        authorization_url: String,
        access_code: Option<String>,
    },
    BankTransfer {
        bank_name: String,
        account_number: String,
        account_name: String,
        amount_minor: i64,
        payment_code: String,
    },
    Ussd {
        ussd_code: String,
        bank_name: String,
        instructions: String,
    },
    MobileMoneyPush {
        provider: String,
        phone_number: String,
        transaction_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitiationResult {
    pub pending_reference: String,
    pub mode: InitiationMode,
    pub instructions: Option<PaymentInstructions>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayDescriptor {
    pub id: GatewayId,
    pub name: String,
    pub description: String,
    pub supports: Vec<String>,
    pub completion: CompletionMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_id_parsing_accepts_both_separators() {
        assert_eq!(
            GatewayId::from_str("mobile-money").unwrap(),
            GatewayId::MobileMoney
        );
        assert_eq!(
            GatewayId::from_str(" Bank_Transfer ").unwrap(),
            GatewayId::BankTransfer
        );
        assert!(GatewayId::from_str("crypto").is_err());
    }

    #[test]
    fn gateway_id_serializes_snake_case() {
        let json = serde_json::to_value(GatewayId::BankTransfer).unwrap();
        assert_eq!(json, "bank_transfer");
        for id in GatewayId::ALL {
            assert_eq!(GatewayId::from_str(id.as_str()).unwrap(), id);
        }
    }

    #[test]
    fn blank_details_are_treated_as_absent() {
        let details = PaymentDetails {
            bank_name: Some("  ".to_string()),
            account_number: None,
            phone_number: Some(" 08012345678 ".to_string()),
        };
        assert_eq!(details.bank_name(), None);
        assert_eq!(details.phone_number(), Some("08012345678"));
    }

    #[test]
    fn instructions_are_tagged_by_kind() {
        let instructions = PaymentInstructions::Ussd {
            ussd_code: "*737*000*5000#".to_string(),
            bank_name: "GTB".to_string(),
            instructions: "Dial the code".to_string(),
        };
        let json = serde_json::to_value(&instructions).unwrap();
        assert_eq!(json["kind"], "ussd");
        assert_eq!(json["ussd_code"], "*737*000*5000#");
    }
}
