//! Lesson checkout core.
//!
//! Drives a one-time lesson purchase across several payment rails and commits
//! the resulting access grant exactly once per (buyer, lesson) pair.

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod payments;
pub mod services;

pub use crate::error::{CheckoutError, CheckoutResult, ErrorCode};
pub use crate::services::payment_orchestrator::{
    CheckoutOutcome, Evidence, OrchestratorConfig, PaymentOrchestrator, SessionHandle,
};
