use crate::config::CollectionAccountConfig;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::{AggregatorClient, PushClient};
use crate::payments::providers::{
    BankTransferStrategy, FlutterwaveStrategy, MobileMoneyStrategy, PaystackStrategy,
    UssdStrategy,
};
use crate::payments::strategy::GatewayStrategy;
use crate::payments::types::{GatewayDescriptor, GatewayId};
use crate::services::collaborators::PaymentCatalog;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub default_gateway: GatewayId,
    pub enabled_gateways: Vec<GatewayId>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_gateway: GatewayId::Paystack,
            enabled_gateways: GatewayId::ALL.to_vec(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> PaymentResult<()> {
        if self.enabled_gateways.is_empty() {
            return Err(PaymentError::invalid(
                "ENABLED_PAYMENT_GATEWAYS",
                "at least one gateway must be enabled",
            ));
        }
        if !self.enabled_gateways.contains(&self.default_gateway) {
            return Err(PaymentError::invalid(
                "DEFAULT_PAYMENT_GATEWAY",
                "default gateway must be enabled",
            ));
        }
        Ok(())
    }
}

/// Upstream clients the standard rails talk to.
#[derive(Clone)]
pub struct GatewayClients {
    pub paystack: Arc<dyn AggregatorClient>,
    pub flutterwave: Arc<dyn AggregatorClient>,
    pub mobile_money: Arc<dyn PushClient>,
}

/// Strategies keyed by gateway id. A new rail is a new registration.
pub struct StrategyRegistry {
    config: RegistryConfig,
    strategies: HashMap<GatewayId, Arc<dyn GatewayStrategy>>,
}

impl StrategyRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            strategies: HashMap::new(),
        }
    }

    /// All five rails wired to the given clients and catalog.
    pub fn standard(
        config: RegistryConfig,
        collection: CollectionAccountConfig,
        catalog: Arc<dyn PaymentCatalog>,
        clients: GatewayClients,
    ) -> Self {
        Self::new(config)
            .with_strategy(Arc::new(PaystackStrategy::new(clients.paystack)))
            .with_strategy(Arc::new(FlutterwaveStrategy::new(clients.flutterwave)))
            .with_strategy(Arc::new(BankTransferStrategy::new(
                catalog.clone(),
                collection,
            )))
            .with_strategy(Arc::new(UssdStrategy::default()))
            .with_strategy(Arc::new(MobileMoneyStrategy::new(
                catalog,
                clients.mobile_money,
            )))
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn GatewayStrategy>) -> Self {
        self.register(strategy);
        self
    }

    /// Replaces any strategy already registered for the same gateway.
    pub fn register(&mut self, strategy: Arc<dyn GatewayStrategy>) {
        let gateway = strategy.gateway();
        debug!(gateway = %gateway, "gateway strategy registered");
        self.strategies.insert(gateway, strategy);
    }

    pub fn is_enabled(&self, gateway: GatewayId) -> bool {
        self.config.enabled_gateways.contains(&gateway) && self.strategies.contains_key(&gateway)
    }

    pub fn get(&self, gateway: GatewayId) -> PaymentResult<Arc<dyn GatewayStrategy>> {
        if !self.config.enabled_gateways.contains(&gateway) {
            return Err(PaymentError::invalid(
                "gateway",
                format!("gateway {} is disabled", gateway),
            ));
        }
        self.strategies.get(&gateway).cloned().ok_or_else(|| {
            PaymentError::invalid("gateway", format!("gateway {} is not registered", gateway))
        })
    }

    pub fn default_gateway(&self) -> GatewayId {
        self.config.default_gateway
    }

    /// Enabled rails in canonical order.
    pub fn list_available(&self) -> Vec<GatewayDescriptor> {
        GatewayId::ALL
            .iter()
            .filter(|g| self.is_enabled(**g))
            .filter_map(|g| self.strategies.get(g))
            .map(|s| s.descriptor())
            .collect()
    }
}
