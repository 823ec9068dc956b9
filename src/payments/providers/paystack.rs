use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::{AggregatorCharge, AggregatorClient, ProviderStatus};
use crate::payments::providers::{require_email, verification_from_report};
use crate::payments::strategy::GatewayStrategy;
use crate::payments::types::{
    ChargeContext, CompletionMode, GatewayDescriptor, GatewayId, InitiationMode,
    InitiationResult, PaymentDetails, PaymentInstructions, VerificationResult,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Direct-redirect rail: the buyer pays on the aggregator's page and the
/// orchestrator polls `verify` once the callback token arrives.
pub struct PaystackStrategy {
    client: Arc<dyn AggregatorClient>,
}

impl PaystackStrategy {
    pub fn new(client: Arc<dyn AggregatorClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GatewayStrategy for PaystackStrategy {
    fn gateway(&self) -> GatewayId {
        GatewayId::Paystack
    }

    fn completion(&self) -> CompletionMode {
        CompletionMode::Polled
    }

    fn descriptor(&self) -> GatewayDescriptor {
        GatewayDescriptor {
            id: GatewayId::Paystack,
            name: "Paystack".to_string(),
            description: "Pay with card, bank, or USSD".to_string(),
            supports: vec![
                "Card".to_string(),
                "Bank Transfer".to_string(),
                "USSD".to_string(),
            ],
            completion: self.completion(),
        }
    }

    async fn validate_details(&self, _details: &PaymentDetails) -> PaymentResult<()> {
        Ok(())
    }

    async fn initiate(&self, charge: ChargeContext) -> PaymentResult<InitiationResult> {
        let email = require_email(&charge, self.client.provider())?;
        let init = self
            .client
            .initialize(AggregatorCharge {
                reference: charge.reference.clone(),
                email,
                amount_minor: charge.amount_minor,
                currency: charge.currency.clone(),
                metadata: charge.metadata(),
            })
            .await?;

        if matches!(
            init.status,
            ProviderStatus::Failed | ProviderStatus::Abandoned | ProviderStatus::Reversed
        ) {
            return Err(PaymentError::PaymentDeclinedError {
                message: init
                    .message
                    .unwrap_or_else(|| "initialization rejected".to_string()),
                provider_code: None,
            });
        }

        let authorization_url = init.authorization_url.ok_or(PaymentError::ProviderError {
            provider: self.client.provider().to_string(),
            message: "initialization returned no authorization_url".to_string(),
            provider_code: None,
            retryable: false,
        })?;
        info!(reference = %init.reference, "paystack payment initiated");

        Ok(InitiationResult {
            pending_reference: init.reference,
            mode: InitiationMode::Redirect,
            instructions: Some(PaymentInstructions::Redirect {
                authorization_url,
                access_code: init.access_code,
            }),
        })
    }

    async fn verify(&self, reference: &str) -> PaymentResult<VerificationResult> {
        let report = self.client.verify(reference).await?;
        Ok(verification_from_report(report))
    }
}
