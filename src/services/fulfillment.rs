use crate::database::error::DatabaseError;
use crate::database::session_repository::{PaymentSession, SessionState};
use crate::database::transaction_repository::{
    PurchaseKey, RecordOutcome, TransactionLedger, TransactionRecord,
};
use crate::error::CheckoutError;
use crate::services::collaborators::{AccessGrantor, CollaboratorError};
use crate::services::keyed_lock::KeyedMutex;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FulfillmentReceipt {
    pub record: TransactionRecord,
    /// False when the record already existed and no grant was issued.
    pub newly_recorded: bool,
}

#[derive(Debug, Clone, Error)]
pub enum FulfillmentError {
    #[error("session {session_id} is {state}, not succeeded")]
    NotSucceeded { session_id: Uuid, state: String },

    #[error("no transaction recorded for {key}")]
    NoRecord { key: PurchaseKey },

    #[error("access grant failed for transaction {}: {source}", record.transaction_id)]
    GrantFailed {
        record: Box<TransactionRecord>,
        source: CollaboratorError,
    },

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl From<FulfillmentError> for CheckoutError {
    fn from(err: FulfillmentError) -> Self {
        match err {
            FulfillmentError::NotSucceeded { session_id, state } => {
                CheckoutError::InvalidStateTransition {
                    session_id,
                    state,
                    action: "fulfill".to_string(),
                }
            }
            FulfillmentError::NoRecord { key } => CheckoutError::Storage {
                message: format!("no transaction recorded for {}", key),
                retryable: false,
            },
            FulfillmentError::GrantFailed { record, source } => CheckoutError::FulfillmentError {
                transaction_id: record.transaction_id,
                buyer_id: record.buyer_id,
                item_id: record.item_id,
                message: source.to_string(),
            },
            FulfillmentError::Storage(e) => e.into(),
        }
    }
}

/// Records a purchase and grants access at most once per (buyer, item).
pub struct FulfillmentGuard {
    ledger: Arc<dyn TransactionLedger>,
    grantor: Arc<dyn AccessGrantor>,
    currency: String,
    locks: KeyedMutex<PurchaseKey>,
}

impl FulfillmentGuard {
    pub fn new(
        ledger: Arc<dyn TransactionLedger>,
        grantor: Arc<dyn AccessGrantor>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            grantor,
            currency: currency.into(),
            locks: KeyedMutex::new(),
        }
    }

    pub async fn commit(
        &self,
        session: &PaymentSession,
    ) -> Result<FulfillmentReceipt, FulfillmentError> {
        let assurance = match (session.state, session.assurance) {
            (SessionState::Succeeded, Some(assurance)) => assurance,
            _ => {
                return Err(FulfillmentError::NotSucceeded {
                    session_id: session.session_id,
                    state: session.state.to_string(),
                })
            }
        };

        let key = PurchaseKey::new(
            session.request.buyer_id.clone(),
            session.request.item_id.clone(),
        );
        let _guard = self.locks.lock(&key).await;

        if let Some(existing) = self.ledger.find_by_purchase(&key).await? {
            info!(
                session_id = %session.session_id,
                transaction_id = %existing.transaction_id,
                "purchase already recorded, skipping grant"
            );
            return Ok(FulfillmentReceipt {
                record: existing,
                newly_recorded: false,
            });
        }

        let candidate = TransactionRecord {
            transaction_id: Uuid::new_v4(),
            buyer_id: session.request.buyer_id.clone(),
            seller_id: session.request.seller_id.clone(),
            item_id: session.request.item_id.clone(),
            course_key: session.request.course_key.clone(),
            price_minor: session.request.price_minor,
            currency: self.currency.clone(),
            gateway_id: session
                .gateway_id
                .unwrap_or(session.request.gateway_id),
            provider_reference: session.provider_reference.clone().unwrap_or_default(),
            assurance,
            completed_at: Utc::now(),
        };

        let record = match self.ledger.record_transaction(candidate).await? {
            RecordOutcome::Recorded(record) => record,
            RecordOutcome::AlreadyRecorded(existing) => {
                return Ok(FulfillmentReceipt {
                    record: existing,
                    newly_recorded: false,
                })
            }
        };

        info!(
            session_id = %session.session_id,
            transaction_id = %record.transaction_id,
            buyer_id = %record.buyer_id,
            item_id = %record.item_id,
            assurance = ?record.assurance,
            "purchase recorded"
        );

        self.grant(record).await.map(|record| FulfillmentReceipt {
            record,
            newly_recorded: true,
        })
    }

    /// Re-issues the grant for an already recorded purchase.
    pub async fn reconcile(
        &self,
        buyer_id: &str,
        item_id: &str,
    ) -> Result<FulfillmentReceipt, FulfillmentError> {
        let key = PurchaseKey::new(buyer_id, item_id);
        let _guard = self.locks.lock(&key).await;

        let record = self
            .ledger
            .find_by_purchase(&key)
            .await?
            .ok_or(FulfillmentError::NoRecord { key })?;

        self.grant(record).await.map(|record| FulfillmentReceipt {
            record,
            newly_recorded: false,
        })
    }

    async fn grant(&self, record: TransactionRecord) -> Result<TransactionRecord, FulfillmentError> {
        match self
            .grantor
            .grant_access(&record.buyer_id, &record.item_id)
            .await
        {
            Ok(()) => Ok(record),
            Err(source) => {
                error!(
                    transaction_id = %record.transaction_id,
                    buyer_id = %record.buyer_id,
                    item_id = %record.item_id,
                    error = %source,
                    "access grant failed; transaction kept for reconciliation"
                );
                Err(FulfillmentError::GrantFailed {
                    record: Box::new(record),
                    source,
                })
            }
        }
    }
}
