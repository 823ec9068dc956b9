use crate::config::CollectionAccountConfig;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::providers::match_option;
use crate::payments::strategy::GatewayStrategy;
use crate::payments::types::{
    ChargeContext, CompletionMode, GatewayDescriptor, GatewayId, InitiationMode,
    InitiationResult, PaymentDetails, PaymentInstructions, VerificationResult,
};
use crate::payments::utils::{derive_account_number, payment_code};
use crate::services::collaborators::PaymentCatalog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone)]
struct VirtualAccount {
    account_number: String,
    payer_bank: String,
    reserved_at: DateTime<Utc>,
}

/// Manual transfer into a per-reference virtual account. Nothing confirms
/// the transfer except the buyer.
pub struct BankTransferStrategy {
    catalog: Arc<dyn PaymentCatalog>,
    collection: CollectionAccountConfig,
    reserved: RwLock<HashMap<String, VirtualAccount>>,
}

impl BankTransferStrategy {
    pub fn new(catalog: Arc<dyn PaymentCatalog>, collection: CollectionAccountConfig) -> Self {
        Self {
            catalog,
            collection,
            reserved: RwLock::new(HashMap::new()),
        }
    }

    pub async fn is_reserved(&self, reference: &str) -> bool {
        self.reserved.read().await.contains_key(reference)
    }

    async fn resolve_bank(&self, details: &PaymentDetails) -> PaymentResult<String> {
        let bank = details
            .bank_name()
            .ok_or_else(|| PaymentError::missing("bank_name"))?;
        let banks = self.catalog.list_supported_banks().await?;
        match_option(&banks, bank)
            .ok_or_else(|| PaymentError::invalid("bank_name", format!("{} is not a supported bank", bank)))
    }
}

#[async_trait]
impl GatewayStrategy for BankTransferStrategy {
    fn gateway(&self) -> GatewayId {
        GatewayId::BankTransfer
    }

    fn completion(&self) -> CompletionMode {
        CompletionMode::Attestation
    }

    fn descriptor(&self) -> GatewayDescriptor {
        GatewayDescriptor {
            id: GatewayId::BankTransfer,
            name: "Bank Transfer".to_string(),
            description: "Direct bank transfer".to_string(),
            supports: vec!["All Nigerian Banks".to_string()],
            completion: self.completion(),
        }
    }

    async fn validate_details(&self, details: &PaymentDetails) -> PaymentResult<()> {
        self.resolve_bank(details).await.map(|_| ())
    }

    async fn initiate(&self, charge: ChargeContext) -> PaymentResult<InitiationResult> {
        let payer_bank = self.resolve_bank(&charge.details).await?;
        let account = VirtualAccount {
            account_number: derive_account_number(&charge.reference),
            payer_bank,
            reserved_at: Utc::now(),
        };

        self.reserved
            .write()
            .await
            .insert(charge.reference.clone(), account.clone());

        info!(
            reference = %charge.reference,
            payer_bank = %account.payer_bank,
            reserved_at = %account.reserved_at,
            "virtual account reserved"
        );

        Ok(InitiationResult {
            pending_reference: charge.reference.clone(),
            mode: InitiationMode::AwaitAttestation,
            instructions: Some(PaymentInstructions::BankTransfer {
                bank_name: self.collection.bank_name.clone(),
                account_number: account.account_number,
                account_name: self.collection.account_name.clone(),
                amount_minor: charge.amount_minor,
                payment_code: payment_code(&charge.reference),
            }),
        })
    }

    async fn verify(&self, _reference: &str) -> PaymentResult<VerificationResult> {
        Ok(VerificationResult::pending())
    }

    async fn attest(&self, reference: &str) -> PaymentResult<VerificationResult> {
        match self.reserved.write().await.remove(reference) {
            Some(_) => Ok(VerificationResult::attested(reference)),
            None => {
                warn!(reference = %reference, "attestation for unknown virtual account");
                Err(PaymentError::ProviderError {
                    provider: GatewayId::BankTransfer.to_string(),
                    message: format!("no virtual account reserved for {}", reference),
                    provider_code: None,
                    retryable: false,
                })
            }
        }
    }

    async fn release(&self, reference: &str) -> PaymentResult<()> {
        if self.reserved.write().await.remove(reference).is_some() {
            info!(reference = %reference, "virtual account released");
        }
        Ok(())
    }
}
