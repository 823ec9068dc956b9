use crate::logging::mask_phone_number;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::{PushClient, PushRequest};
use crate::payments::providers::match_option;
use crate::payments::strategy::GatewayStrategy;
use crate::payments::types::{
    ChargeContext, CompletionMode, GatewayDescriptor, GatewayId, InitiationMode,
    InitiationResult, PaymentDetails, PaymentInstructions, VerificationResult,
};
use crate::payments::utils::{is_valid_nigerian_phone, normalize_nigerian_phone};
use crate::services::collaborators::PaymentCatalog;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Push-to-phone rail. The provider field of [`PaymentDetails`] travels in
/// `bank_name`.
pub struct MobileMoneyStrategy {
    catalog: Arc<dyn PaymentCatalog>,
    client: Arc<dyn PushClient>,
    pushed: RwLock<HashSet<String>>,
}

impl MobileMoneyStrategy {
    pub fn new(catalog: Arc<dyn PaymentCatalog>, client: Arc<dyn PushClient>) -> Self {
        Self {
            catalog,
            client,
            pushed: RwLock::new(HashSet::new()),
        }
    }

    async fn resolve(&self, details: &PaymentDetails) -> PaymentResult<(String, String)> {
        let phone = details
            .phone_number()
            .ok_or_else(|| PaymentError::missing("phone_number"))?;
        let provider = details
            .bank_name()
            .ok_or_else(|| PaymentError::missing("bank_name"))?;

        if !is_valid_nigerian_phone(phone) {
            return Err(PaymentError::invalid(
                "phone_number",
                "Enter a valid Nigerian phone number",
            ));
        }

        let providers = self.catalog.list_supported_mobile_money_providers().await?;
        let provider = match_option(&providers, provider).ok_or_else(|| {
            PaymentError::invalid(
                "bank_name",
                format!("{} is not a supported mobile money provider", provider),
            )
        })?;

        Ok((normalize_nigerian_phone(phone), provider))
    }
}

#[async_trait]
impl GatewayStrategy for MobileMoneyStrategy {
    fn gateway(&self) -> GatewayId {
        GatewayId::MobileMoney
    }

    fn completion(&self) -> CompletionMode {
        CompletionMode::Attestation
    }

    fn descriptor(&self) -> GatewayDescriptor {
        GatewayDescriptor {
            id: GatewayId::MobileMoney,
            name: "Mobile Money".to_string(),
            description: "Pay with mobile wallet".to_string(),
            supports: vec!["OPay".to_string(), "PalmPay".to_string()],
            completion: self.completion(),
        }
    }

    async fn validate_details(&self, details: &PaymentDetails) -> PaymentResult<()> {
        self.resolve(details).await.map(|_| ())
    }

    async fn initiate(&self, charge: ChargeContext) -> PaymentResult<InitiationResult> {
        let (phone_number, provider) = self.resolve(&charge.details).await?;

        let transaction_id = self
            .client
            .send_push(PushRequest {
                reference: charge.reference.clone(),
                phone_number: phone_number.clone(),
                provider: provider.clone(),
                amount_minor: charge.amount_minor,
                currency: charge.currency.clone(),
            })
            .await?;

        self.pushed.write().await.insert(transaction_id.clone());
        info!(
            reference = %charge.reference,
            transaction_id = %transaction_id,
            provider = %provider,
            phone = %mask_phone_number(&phone_number),
            "mobile money push sent"
        );

        Ok(InitiationResult {
            pending_reference: transaction_id.clone(),
            mode: InitiationMode::AwaitAttestation,
            instructions: Some(PaymentInstructions::MobileMoneyPush {
                provider,
                phone_number,
                transaction_id,
            }),
        })
    }

    async fn verify(&self, _reference: &str) -> PaymentResult<VerificationResult> {
        Ok(VerificationResult::pending())
    }

    async fn attest(&self, reference: &str) -> PaymentResult<VerificationResult> {
        if self.pushed.write().await.remove(reference) {
            Ok(VerificationResult::attested(reference))
        } else {
            Err(PaymentError::ProviderError {
                provider: GatewayId::MobileMoney.to_string(),
                message: format!("no push sent for {}", reference),
                provider_code: None,
                retryable: false,
            })
        }
    }

    async fn release(&self, reference: &str) -> PaymentResult<()> {
        self.pushed.write().await.remove(reference);
        Ok(())
    }
}
