use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::strategy::GatewayStrategy;
use crate::payments::types::{
    ChargeContext, CompletionMode, GatewayDescriptor, GatewayId, InitiationMode,
    InitiationResult, PaymentDetails, PaymentInstructions, VerificationResult,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::info;

fn default_short_codes() -> HashMap<String, String> {
    [
        ("Access Bank", "901"),
        ("First Bank", "894"),
        ("GTB", "737"),
        ("Kuda", "5573"),
        ("UBA", "919"),
        ("Zenith", "966"),
    ]
    .iter()
    .map(|(bank, code)| (bank.to_string(), code.to_string()))
    .collect()
}

pub struct UssdStrategy {
    short_codes: HashMap<String, String>,
    issued: RwLock<HashSet<String>>,
}

impl Default for UssdStrategy {
    fn default() -> Self {
        Self::new(default_short_codes())
    }
}

impl UssdStrategy {
    pub fn new(short_codes: HashMap<String, String>) -> Self {
        Self {
            short_codes,
            issued: RwLock::new(HashSet::new()),
        }
    }

    /// Returns the bank's own spelling together with its short code.
    fn resolve(&self, details: &PaymentDetails) -> PaymentResult<(String, String)> {
        let bank = details
            .bank_name()
            .ok_or_else(|| PaymentError::missing("bank_name"))?;
        self.short_codes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(bank))
            .map(|(name, code)| (name.clone(), code.clone()))
            .ok_or_else(|| {
                PaymentError::invalid("bank_name", format!("{} has no USSD short code", bank))
            })
    }
}

/// Bank USSD menus only take whole naira, so a price with kobo is refused
/// rather than truncated.
pub fn dial_string(short_code: &str, amount_minor: i64) -> PaymentResult<String> {
    if amount_minor % 100 != 0 {
        return Err(PaymentError::invalid(
            "amount_minor",
            format!(
                "USSD payments need a whole naira amount, got {} kobo",
                amount_minor
            ),
        ));
    }
    Ok(format!("*{}*000*{}#", short_code, amount_minor / 100))
}

#[async_trait]
impl GatewayStrategy for UssdStrategy {
    fn gateway(&self) -> GatewayId {
        GatewayId::Ussd
    }

    fn completion(&self) -> CompletionMode {
        CompletionMode::Attestation
    }

    fn descriptor(&self) -> GatewayDescriptor {
        GatewayDescriptor {
            id: GatewayId::Ussd,
            name: "USSD".to_string(),
            description: "Pay with USSD code".to_string(),
            supports: vec!["All Banks".to_string()],
            completion: self.completion(),
        }
    }

    async fn validate_details(&self, details: &PaymentDetails) -> PaymentResult<()> {
        self.resolve(details).map(|_| ())
    }

    async fn initiate(&self, charge: ChargeContext) -> PaymentResult<InitiationResult> {
        let (bank_name, short_code) = self.resolve(&charge.details)?;
        let ussd_code = dial_string(&short_code, charge.amount_minor)?;

        self.issued.write().await.insert(charge.reference.clone());
        info!(reference = %charge.reference, bank = %bank_name, "ussd code issued");

        Ok(InitiationResult {
            pending_reference: charge.reference.clone(),
            mode: InitiationMode::AwaitAttestation,
            instructions: Some(PaymentInstructions::Ussd {
                instructions: format!(
                    "Dial {} from the phone number registered with your {} account",
                    ussd_code, bank_name
                ),
                ussd_code,
                bank_name,
            }),
        })
    }

    async fn verify(&self, _reference: &str) -> PaymentResult<VerificationResult> {
        Ok(VerificationResult::pending())
    }

    async fn attest(&self, reference: &str) -> PaymentResult<VerificationResult> {
        if self.issued.write().await.remove(reference) {
            Ok(VerificationResult::attested(reference))
        } else {
            Err(PaymentError::ProviderError {
                provider: GatewayId::Ussd.to_string(),
                message: format!("no ussd code issued for {}", reference),
                provider_code: None,
                retryable: false,
            })
        }
    }

    async fn release(&self, reference: &str) -> PaymentResult<()> {
        self.issued.write().await.remove(reference);
        Ok(())
    }
}
