//! Local stand-ins for the aggregator and push APIs. They log each call and
//! report success.

use crate::payments::error::PaymentResult;
use crate::payments::provider::{
    AggregatorCharge, AggregatorClient, AggregatorInit, AggregatorStatusReport, ProviderStatus,
    PushClient, PushRequest,
};
use crate::payments::utils::generate_reference;
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SandboxAggregator {
    provider: &'static str,
    init_status: ProviderStatus,
    verify_status: ProviderStatus,
}

impl SandboxAggregator {
    /// Redirect-style sandbox: initialization stays pending until verified.
    pub fn new(provider: &'static str) -> Self {
        Self {
            provider,
            init_status: ProviderStatus::Pending,
            verify_status: ProviderStatus::Success,
        }
    }

    /// Sandbox that settles the charge during initialization.
    pub fn settling(provider: &'static str) -> Self {
        Self {
            provider,
            init_status: ProviderStatus::Success,
            verify_status: ProviderStatus::Success,
        }
    }
}

#[async_trait]
impl AggregatorClient for SandboxAggregator {
    fn provider(&self) -> &'static str {
        self.provider
    }

    async fn initialize(&self, charge: AggregatorCharge) -> PaymentResult<AggregatorInit> {
        info!(
            provider = %self.provider,
            reference = %charge.reference,
            amount_minor = charge.amount_minor,
            currency = %charge.currency,
            "sandbox charge initialized"
        );
        let access_code = charge.reference.to_lowercase();
        Ok(AggregatorInit {
            status: self.init_status,
            authorization_url: Some(format!(
                "https://sandbox.{}.local/checkout/{}",
                self.provider, access_code
            )),
            access_code: Some(access_code),
            reference: charge.reference,
            message: None,
        })
    }

    async fn verify(&self, reference: &str) -> PaymentResult<AggregatorStatusReport> {
        info!(provider = %self.provider, reference = %reference, "sandbox charge verified");
        Ok(AggregatorStatusReport {
            status: self.verify_status,
            reference: reference.to_string(),
            provider_tx_id: Some(format!("{}_{}", self.provider.to_uppercase(), reference)),
            message: None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxPushClient;

#[async_trait]
impl PushClient for SandboxPushClient {
    async fn send_push(&self, request: PushRequest) -> PaymentResult<String> {
        let transaction_id = generate_reference("mm");
        info!(
            reference = %request.reference,
            provider = %request.provider,
            transaction_id = %transaction_id,
            "sandbox mobile money push sent"
        );
        Ok(transaction_id)
    }
}
