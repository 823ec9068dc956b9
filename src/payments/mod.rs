//! Payment rails: the gateway strategies, their client seams, and the registry
//! that selects a strategy per gateway id.

pub mod error;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod sandbox;
pub mod strategy;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use registry::{GatewayClients, RegistryConfig, StrategyRegistry};
pub use strategy::GatewayStrategy;
pub use types::{GatewayId, PaymentDetails};
