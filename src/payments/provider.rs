//! Client seams for the external rails.
//!
//! Strategies never talk HTTP themselves; they go through these traits so a
//! real integration can be plugged in without touching the orchestration.

use crate::payments::error::PaymentResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorCharge {
    pub reference: String,
    pub email: String,
    pub amount_minor: i64,
    pub currency: String,
    pub metadata: JsonValue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Success,
    Pending,
    Failed,
    Abandoned,
    Reversed,
    Unknown,
}

impl ProviderStatus {
    pub fn from_provider_str(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "success" | "successful" | "completed" => ProviderStatus::Success,
            "pending" | "ongoing" | "processing" => ProviderStatus::Pending,
            "failed" | "declined" => ProviderStatus::Failed,
            "abandoned" | "cancelled" => ProviderStatus::Abandoned,
            "reversed" => ProviderStatus::Reversed,
            _ => ProviderStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorInit {
    pub status: ProviderStatus,
    pub reference: String,
    pub authorization_url: Option<String>,
    pub access_code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorStatusReport {
    pub status: ProviderStatus,
    pub reference: String,
    pub provider_tx_id: Option<String>,
    pub message: Option<String>,
}

/// Card/bank aggregator API (Paystack, Flutterwave).
#[async_trait]
pub trait AggregatorClient: Send + Sync {
    fn provider(&self) -> &'static str;

    async fn initialize(&self, charge: AggregatorCharge) -> PaymentResult<AggregatorInit>;

    async fn verify(&self, reference: &str) -> PaymentResult<AggregatorStatusReport>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub reference: String,
    pub phone_number: String,
    pub provider: String,
    pub amount_minor: i64,
    pub currency: String,
}

/// Mobile-money push API. Returns the provider's transaction id.
#[async_trait]
pub trait PushClient: Send + Sync {
    async fn send_push(&self, request: PushRequest) -> PaymentResult<String>;
}
