//! Contracts the checkout core consumes from the rest of the platform, plus
//! in-memory implementations for development and tests.

use crate::error::{CheckoutError, CheckoutResult};
use crate::payments::error::PaymentError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Error)]
#[error("{service} failed: {message}")]
pub struct CollaboratorError {
    pub service: String,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            message: message.into(),
        }
    }
}

impl From<CollaboratorError> for CheckoutError {
    fn from(err: CollaboratorError) -> Self {
        CheckoutError::Storage {
            message: err.to_string(),
            retryable: true,
        }
    }
}

impl From<CollaboratorError> for PaymentError {
    fn from(err: CollaboratorError) -> Self {
        PaymentError::NetworkError {
            message: err.to_string(),
        }
    }
}

/// Identity of the caller, passed explicitly into every checkout call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Option<CurrentUser>;
}

pub async fn require_current_user(provider: &dyn IdentityProvider) -> CheckoutResult<CurrentUser> {
    provider
        .current_user()
        .await
        .ok_or(CheckoutError::NotAuthenticated)
}

/// Grants a buyer access to an item. Must tolerate repeated calls.
#[async_trait]
pub trait AccessGrantor: Send + Sync {
    async fn grant_access(&self, buyer_id: &str, item_id: &str) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait PaymentCatalog: Send + Sync {
    async fn list_supported_banks(&self) -> Result<Vec<String>, CollaboratorError>;

    async fn list_supported_mobile_money_providers(&self)
        -> Result<Vec<String>, CollaboratorError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessGrant {
    pub buyer_id: String,
    pub item_id: String,
    pub granted_at: DateTime<Utc>,
}

#[derive(Default, Clone)]
pub struct InMemoryAccessRegistry {
    grants: Arc<RwLock<HashMap<(String, String), AccessGrant>>>,
}

impl InMemoryAccessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has_access(&self, buyer_id: &str, item_id: &str) -> bool {
        let grants = self.grants.read().await;
        grants.contains_key(&(buyer_id.to_string(), item_id.to_string()))
    }

    pub async fn grants_for(&self, buyer_id: &str) -> Vec<AccessGrant> {
        let grants = self.grants.read().await;
        let mut found: Vec<AccessGrant> = grants
            .values()
            .filter(|g| g.buyer_id == buyer_id)
            .cloned()
            .collect();
        found.sort_by_key(|g| g.granted_at);
        found
    }
}

#[async_trait]
impl AccessGrantor for InMemoryAccessRegistry {
    async fn grant_access(&self, buyer_id: &str, item_id: &str) -> Result<(), CollaboratorError> {
        let mut grants = self.grants.write().await;
        grants
            .entry((buyer_id.to_string(), item_id.to_string()))
            .or_insert_with(|| {
                debug!(buyer_id = %buyer_id, item_id = %item_id, "access granted");
                AccessGrant {
                    buyer_id: buyer_id.to_string(),
                    item_id: item_id.to_string(),
                    granted_at: Utc::now(),
                }
            });
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StaticPaymentCatalog {
    banks: Vec<String>,
    mobile_money_providers: Vec<String>,
}

impl StaticPaymentCatalog {
    pub fn new(banks: Vec<String>, mobile_money_providers: Vec<String>) -> Self {
        Self {
            banks,
            mobile_money_providers,
        }
    }
}

impl Default for StaticPaymentCatalog {
    fn default() -> Self {
        let banks = [
            "Access Bank",
            "First Bank",
            "GTB",
            "Kuda",
            "OPay",
            "PalmPay",
            "UBA",
            "Zenith",
        ];
        let mobile_money = ["OPay", "PalmPay"];
        Self::new(
            banks.iter().map(|b| b.to_string()).collect(),
            mobile_money.iter().map(|p| p.to_string()).collect(),
        )
    }
}

#[async_trait]
impl PaymentCatalog for StaticPaymentCatalog {
    async fn list_supported_banks(&self) -> Result<Vec<String>, CollaboratorError> {
        Ok(self.banks.clone())
    }

    async fn list_supported_mobile_money_providers(
        &self,
    ) -> Result<Vec<String>, CollaboratorError> {
        Ok(self.mobile_money_providers.clone())
    }
}

/// Resolves to a fixed user, or to nobody.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    user: Option<CurrentUser>,
}

impl StaticIdentityProvider {
    pub fn signed_in(user: CurrentUser) -> Self {
        Self { user: Some(user) }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn current_user(&self) -> Option<CurrentUser> {
        self.user.clone()
    }
}
