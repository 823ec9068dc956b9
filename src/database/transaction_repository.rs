use crate::database::error::DatabaseError;
use crate::payments::types::{Assurance, GatewayId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// The (buyer, item) pair a purchase is unique on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PurchaseKey {
    pub buyer_id: String,
    pub item_id: String,
}

impl PurchaseKey {
    pub fn new(buyer_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            buyer_id: buyer_id.into(),
            item_id: item_id.into(),
        }
    }
}

impl std::fmt::Display for PurchaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.buyer_id, self.item_id)
    }
}

/// Completed purchase. Append-only, at most one per [`PurchaseKey`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionRecord {
    pub transaction_id: Uuid,
    pub buyer_id: String,
    pub seller_id: String,
    pub item_id: String,
    pub course_key: String,
    pub price_minor: i64,
    pub currency: String,
    pub gateway_id: GatewayId,
    pub provider_reference: String,
    pub assurance: Assurance,
    pub completed_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn key(&self) -> PurchaseKey {
        PurchaseKey::new(self.buyer_id.clone(), self.item_id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded(TransactionRecord),
    AlreadyRecorded(TransactionRecord),
}

impl RecordOutcome {
    pub fn record(&self) -> &TransactionRecord {
        match self {
            RecordOutcome::Recorded(record) | RecordOutcome::AlreadyRecorded(record) => record,
        }
    }

    pub fn into_record(self) -> TransactionRecord {
        match self {
            RecordOutcome::Recorded(record) | RecordOutcome::AlreadyRecorded(record) => record,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, RecordOutcome::Recorded(_))
    }
}

#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Inserts unless a record for the same pair exists, in which case the
    /// existing record comes back instead of an error.
    async fn record_transaction(
        &self,
        record: TransactionRecord,
    ) -> Result<RecordOutcome, DatabaseError>;

    async fn find_by_purchase(
        &self,
        key: &PurchaseKey,
    ) -> Result<Option<TransactionRecord>, DatabaseError>;

    async fn list_for_buyer(&self, buyer_id: &str) -> Result<Vec<TransactionRecord>, DatabaseError>;
}

#[derive(Default, Clone)]
pub struct InMemoryTransactionLedger {
    records: Arc<RwLock<HashMap<PurchaseKey, TransactionRecord>>>,
}

impl InMemoryTransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TransactionLedger for InMemoryTransactionLedger {
    async fn record_transaction(
        &self,
        record: TransactionRecord,
    ) -> Result<RecordOutcome, DatabaseError> {
        let mut records = self.records.write().await;
        let key = record.key();
        if let Some(existing) = records.get(&key) {
            return Ok(RecordOutcome::AlreadyRecorded(existing.clone()));
        }
        records.insert(key, record.clone());
        Ok(RecordOutcome::Recorded(record))
    }

    async fn find_by_purchase(
        &self,
        key: &PurchaseKey,
    ) -> Result<Option<TransactionRecord>, DatabaseError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn list_for_buyer(&self, buyer_id: &str) -> Result<Vec<TransactionRecord>, DatabaseError> {
        let records = self.records.read().await;
        let mut found: Vec<TransactionRecord> = records
            .values()
            .filter(|r| r.buyer_id == buyer_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.completed_at);
        Ok(found)
    }
}
