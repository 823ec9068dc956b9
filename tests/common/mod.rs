#![allow(dead_code)]

use async_trait::async_trait;
use lesson_checkout::config::{CollectionAccountConfig, PollPolicy};
use lesson_checkout::database::{
    InMemorySessionRepository, InMemoryTransactionLedger, PurchaseRequest,
};
use lesson_checkout::payments::error::{PaymentError, PaymentResult};
use lesson_checkout::payments::provider::{
    AggregatorCharge, AggregatorClient, AggregatorInit, AggregatorStatusReport, ProviderStatus,
};
use lesson_checkout::payments::sandbox::{SandboxAggregator, SandboxPushClient};
use lesson_checkout::payments::{GatewayClients, GatewayId, RegistryConfig, StrategyRegistry};
use lesson_checkout::services::collaborators::{
    AccessGrantor, CollaboratorError, CurrentUser, StaticPaymentCatalog,
};
use lesson_checkout::{OrchestratorConfig, PaymentOrchestrator};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Aggregator whose `verify` answers come from a queue. An empty queue
/// answers `Pending`.
pub struct ScriptedAggregator {
    init_status: ProviderStatus,
    verify_script: Mutex<VecDeque<PaymentResult<ProviderStatus>>>,
    verify_calls: AtomicU32,
}

impl ScriptedAggregator {
    pub fn new(script: Vec<PaymentResult<ProviderStatus>>) -> Self {
        Self {
            init_status: ProviderStatus::Pending,
            verify_script: Mutex::new(script.into()),
            verify_calls: AtomicU32::new(0),
        }
    }

    pub fn statuses(statuses: &[ProviderStatus]) -> Self {
        Self::new(statuses.iter().copied().map(Ok).collect())
    }

    pub fn verify_calls(&self) -> u32 {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AggregatorClient for ScriptedAggregator {
    fn provider(&self) -> &'static str {
        "paystack"
    }

    async fn initialize(&self, charge: AggregatorCharge) -> PaymentResult<AggregatorInit> {
        Ok(AggregatorInit {
            status: self.init_status,
            authorization_url: Some(format!("https://pay.test/{}", charge.reference)),
            access_code: None,
            reference: charge.reference,
            message: None,
        })
    }

    async fn verify(&self, reference: &str) -> PaymentResult<AggregatorStatusReport> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .verify_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ProviderStatus::Pending))?;
        Ok(AggregatorStatusReport {
            status: next,
            reference: reference.to_string(),
            provider_tx_id: Some(format!("PSK_{}", reference)),
            message: match next {
                ProviderStatus::Failed => Some("card declined".to_string()),
                _ => None,
            },
        })
    }
}

pub fn network_blip() -> PaymentResult<ProviderStatus> {
    Err(PaymentError::NetworkError {
        message: "connection reset".to_string(),
    })
}

/// Grantor that counts calls and fails the first `failures` of them.
#[derive(Default)]
pub struct CountingGrantor {
    failures_left: AtomicU32,
    calls: AtomicU32,
    granted: Mutex<HashSet<(String, String)>>,
}

impl CountingGrantor {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn has_access(&self, buyer_id: &str, item_id: &str) -> bool {
        self.granted
            .lock()
            .unwrap()
            .contains(&(buyer_id.to_string(), item_id.to_string()))
    }
}

#[async_trait]
impl AccessGrantor for CountingGrantor {
    async fn grant_access(&self, buyer_id: &str, item_id: &str) -> Result<(), CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CollaboratorError::new("access", "grant service unavailable"));
        }
        self.granted
            .lock()
            .unwrap()
            .insert((buyer_id.to_string(), item_id.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub paystack: Arc<ScriptedAggregator>,
    pub grantor: Arc<CountingGrantor>,
    pub ledger: InMemoryTransactionLedger,
}

pub struct HarnessBuilder {
    paystack: ScriptedAggregator,
    grantor: CountingGrantor,
    polling: PollPolicy,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            paystack: ScriptedAggregator::statuses(&[ProviderStatus::Success]),
            grantor: CountingGrantor::default(),
            polling: PollPolicy::immediate(3),
        }
    }

    pub fn paystack(mut self, paystack: ScriptedAggregator) -> Self {
        self.paystack = paystack;
        self
    }

    pub fn grantor(mut self, grantor: CountingGrantor) -> Self {
        self.grantor = grantor;
        self
    }

    pub fn polling(mut self, polling: PollPolicy) -> Self {
        self.polling = polling;
        self
    }

    pub fn build(self) -> Harness {
        let paystack = Arc::new(self.paystack);
        let grantor = Arc::new(self.grantor);
        let ledger = InMemoryTransactionLedger::new();
        let catalog = Arc::new(StaticPaymentCatalog::default());

        let registry = StrategyRegistry::standard(
            RegistryConfig::default(),
            CollectionAccountConfig::default(),
            catalog.clone(),
            GatewayClients {
                paystack: paystack.clone(),
                flutterwave: Arc::new(SandboxAggregator::settling("flutterwave")),
                mobile_money: Arc::new(SandboxPushClient),
            },
        );

        let orchestrator = PaymentOrchestrator::new(
            OrchestratorConfig {
                currency: "NGN".to_string(),
                polling: self.polling,
            },
            Arc::new(registry),
            Arc::new(InMemorySessionRepository::new()),
            Arc::new(ledger.clone()),
            grantor.clone(),
            catalog,
        );

        Harness {
            orchestrator: Arc::new(orchestrator),
            paystack,
            grantor,
            ledger,
        }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::new().build()
}

pub fn slow_polling(max_attempts: u32, delay_ms: u64) -> PollPolicy {
    PollPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(delay_ms),
        max_delay: Duration::from_millis(delay_ms),
        multiplier: 1.0,
    }
}

pub fn buyer() -> CurrentUser {
    user("u1")
}

pub fn user(id: &str) -> CurrentUser {
    CurrentUser {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        name: format!("Buyer {}", id),
    }
}

pub fn purchase(gateway: GatewayId) -> PurchaseRequest {
    PurchaseRequest {
        buyer_id: "u1".to_string(),
        item_id: "lessonA".to_string(),
        course_key: "algebra".to_string(),
        seller_id: "tutor9".to_string(),
        price_minor: 500000,
        gateway_id: gateway,
        item_title: Some("Linear equations".to_string()),
    }
}
