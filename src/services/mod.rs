//! Services module for business logic and integrations

pub mod collaborators;
pub mod fulfillment;
pub mod keyed_lock;
pub mod notification;
pub mod payment_orchestrator;
pub mod scheduler;

pub use crate::services::fulfillment::{FulfillmentError, FulfillmentGuard, FulfillmentReceipt};
pub use crate::services::payment_orchestrator::{
    CheckoutOutcome, Evidence, OrchestratorConfig, PaymentOrchestrator, SessionHandle,
};
