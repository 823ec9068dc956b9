use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{
    ChargeContext, CompletionMode, GatewayDescriptor, GatewayId, InitiationResult,
    PaymentDetails, VerificationResult,
};
use async_trait::async_trait;

/// One payment rail: how it is initiated and how completion is detected.
///
/// The orchestrator drives every rail through this trait and dispatches on
/// [`CompletionMode`], never on the concrete gateway.
#[async_trait]
pub trait GatewayStrategy: Send + Sync {
    fn gateway(&self) -> GatewayId;

    fn completion(&self) -> CompletionMode;

    fn descriptor(&self) -> GatewayDescriptor;

    /// Checks the rail's own contract for `details`.
    ///
    /// Absent fields yield [`PaymentError::MissingDetails`], malformed ones
    /// [`PaymentError::ValidationError`].
    async fn validate_details(&self, details: &PaymentDetails) -> PaymentResult<()>;

    async fn initiate(&self, charge: ChargeContext) -> PaymentResult<InitiationResult>;

    async fn verify(&self, reference: &str) -> PaymentResult<VerificationResult>;

    /// Accepts the buyer's statement that they paid.
    async fn attest(&self, _reference: &str) -> PaymentResult<VerificationResult> {
        Err(PaymentError::ValidationError {
            message: format!("{} does not accept payment attestation", self.gateway()),
            field: Some("evidence".to_string()),
        })
    }

    /// Frees anything reserved at initiation time.
    async fn release(&self, _reference: &str) -> PaymentResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{CustomerContact, InitiationMode};

    struct InstantStrategy;

    #[async_trait]
    impl GatewayStrategy for InstantStrategy {
        fn gateway(&self) -> GatewayId {
            GatewayId::Flutterwave
        }

        fn completion(&self) -> CompletionMode {
            CompletionMode::Immediate
        }

        fn descriptor(&self) -> GatewayDescriptor {
            GatewayDescriptor {
                id: GatewayId::Flutterwave,
                name: "Instant".to_string(),
                description: "test".to_string(),
                supports: vec![],
                completion: CompletionMode::Immediate,
            }
        }

        async fn validate_details(&self, _details: &PaymentDetails) -> PaymentResult<()> {
            Ok(())
        }

        async fn initiate(&self, charge: ChargeContext) -> PaymentResult<InitiationResult> {
            Ok(InitiationResult {
                pending_reference: charge.reference,
                mode: InitiationMode::Immediate {
                    result: VerificationResult::verified(None),
                },
                instructions: None,
            })
        }

        async fn verify(&self, _reference: &str) -> PaymentResult<VerificationResult> {
            Ok(VerificationResult::verified(None))
        }
    }

    #[tokio::test]
    async fn default_attest_rejects_and_release_is_noop() {
        let strategy: Box<dyn GatewayStrategy> = Box::new(InstantStrategy);
        let err = strategy.attest("ref").await.unwrap_err();
        assert!(matches!(err, PaymentError::ValidationError { .. }));
        assert!(strategy.release("ref").await.is_ok());

        let result = strategy
            .initiate(ChargeContext {
                reference: "LSN_1".to_string(),
                buyer_id: "u1".to_string(),
                item_id: "lessonA".to_string(),
                course_key: "math".to_string(),
                item_title: None,
                amount_minor: 100,
                currency: "NGN".to_string(),
                customer: CustomerContact::default(),
                details: PaymentDetails::default(),
            })
            .await
            .unwrap();
        assert_eq!(result.pending_reference, "LSN_1");
    }
}
