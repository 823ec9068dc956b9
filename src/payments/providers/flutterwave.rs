use crate::payments::error::PaymentResult;
use crate::payments::provider::{AggregatorCharge, AggregatorClient, ProviderStatus};
use crate::payments::providers::{require_email, verification_from_report};
use crate::payments::strategy::GatewayStrategy;
use crate::payments::types::{
    ChargeContext, CompletionMode, GatewayDescriptor, GatewayId, InitiationMode,
    InitiationResult, PaymentDetails, VerificationResult,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Async-initiate rail: the aggregator settles the charge while `initiate`
/// is in flight, so there is nothing left to poll.
pub struct FlutterwaveStrategy {
    client: Arc<dyn AggregatorClient>,
}

impl FlutterwaveStrategy {
    pub fn new(client: Arc<dyn AggregatorClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GatewayStrategy for FlutterwaveStrategy {
    fn gateway(&self) -> GatewayId {
        GatewayId::Flutterwave
    }

    fn completion(&self) -> CompletionMode {
        CompletionMode::Immediate
    }

    fn descriptor(&self) -> GatewayDescriptor {
        GatewayDescriptor {
            id: GatewayId::Flutterwave,
            name: "Flutterwave".to_string(),
            description: "Multiple payment options".to_string(),
            supports: vec![
                "Card".to_string(),
                "Bank".to_string(),
                "Mobile Money".to_string(),
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

        let result = match init.status {
            ProviderStatus::Success => {
                info!(reference = %init.reference, "flutterwave charge settled at initiation");
                VerificationResult::verified(Some(init.reference.clone()))
            }
            ProviderStatus::Failed | ProviderStatus::Abandoned | ProviderStatus::Reversed => {
                VerificationResult::failed(
                    init.message
                        .clone()
                        .unwrap_or_else(|| "charge declined".to_string()),
                )
            }
            ProviderStatus::Pending | ProviderStatus::Unknown => {
                warn!(
                    reference = %init.reference,
                    status = ?init.status,
                    "flutterwave returned an unsettled charge"
                );
                VerificationResult::pending()
            }
        };

        Ok(InitiationResult {
            pending_reference: init.reference,
            mode: InitiationMode::Immediate { result },
            instructions: None,
        })
    }

    async fn verify(&self, reference: &str) -> PaymentResult<VerificationResult> {
        let report = self.client.verify(reference).await?;
        Ok(verification_from_report(report))
    }
}
