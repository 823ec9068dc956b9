use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::payments::types::{Assurance, GatewayId, PaymentDetails, PaymentInstructions};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// What the buyer wants to buy. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub buyer_id: String,
    pub item_id: String,
    pub course_key: String,
    pub seller_id: String,
    pub price_minor: i64,
    /// Preferred rail, used when `select` is called without one.
    pub gateway_id: GatewayId,
    pub item_title: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PendingStage {
    AwaitingProviderCallback,
    AwaitingPollConfirmation,
    AwaitingUserAttestation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    VerificationFailed,
    VerificationTimeout,
    UserCancelled,
    InitiationFailed,
}

/// Payment session state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SessionState {
    /// Waiting for the buyer to pick a rail
    Selecting,
    /// Strategy `initiate` in flight
    Initiating,
    Pending { stage: PendingStage },
    Succeeded,
    Failed { reason: FailureReason },
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Selecting => write!(f, "selecting"),
            SessionState::Initiating => write!(f, "initiating"),
            SessionState::Pending { stage } => match stage {
                PendingStage::AwaitingProviderCallback => write!(f, "awaiting_provider_callback"),
                PendingStage::AwaitingPollConfirmation => write!(f, "awaiting_poll_confirmation"),
                PendingStage::AwaitingUserAttestation => write!(f, "awaiting_user_attestation"),
            },
            SessionState::Succeeded => write!(f, "succeeded"),
            SessionState::Failed { reason } => match reason {
                FailureReason::VerificationFailed => write!(f, "failed(verification_failed)"),
                FailureReason::VerificationTimeout => write!(f, "failed(verification_timeout)"),
                FailureReason::UserCancelled => write!(f, "failed(user_cancelled)"),
                FailureReason::InitiationFailed => write!(f, "failed(initiation_failed)"),
            },
        }
    }
}

impl SessionState {
    pub const fn pending(stage: PendingStage) -> Self {
        SessionState::Pending { stage }
    }

    pub const fn failed(reason: FailureReason) -> Self {
        SessionState::Failed { reason }
    }

    /// Forward-only transition table.
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use PendingStage::*;
        use SessionState::*;

        match (self, next) {
            (Selecting, Initiating) => true,
            (
                Selecting,
                Failed {
                    reason: FailureReason::UserCancelled,
                },
            ) => true,
            (Initiating, Pending { .. } | Succeeded | Failed { .. }) => true,
            (
                Pending {
                    stage: AwaitingProviderCallback,
                },
                Pending {
                    stage: AwaitingPollConfirmation,
                },
            ) => true,
            (
                Pending {
                    stage: AwaitingProviderCallback,
                },
                Failed { .. },
            ) => true,
            (
                Pending {
                    stage: AwaitingPollConfirmation | AwaitingUserAttestation,
                },
                Succeeded | Failed { .. },
            ) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Failed { .. })
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            SessionState::Failed { reason } => Some(*reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Granted,
    AccessPending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

/// One purchase attempt. A retry is a new session pointing at this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentSession {
    pub session_id: Uuid,
    pub request: PurchaseRequest,
    pub gateway_id: Option<GatewayId>,
    pub details: Option<PaymentDetails>,
    pub state: SessionState,
    pub provider_reference: Option<String>,
    pub instructions: Option<PaymentInstructions>,
    pub attempts: u32,
    /// How the success was established; set when the session succeeds.
    pub assurance: Option<Assurance>,
    pub retry_of: Option<Uuid>,
    pub history: Vec<StateTransition>,
    pub fulfillment: Option<FulfillmentStatus>,
    pub transaction_id: Option<Uuid>,
    pub failure_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_transition_at: DateTime<Utc>,
}

impl PaymentSession {
    pub fn new(request: PurchaseRequest, retry_of: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            request,
            gateway_id: None,
            details: None,
            state: SessionState::Selecting,
            provider_reference: None,
            instructions: None,
            attempts: 0,
            assurance: None,
            retry_of,
            history: Vec::new(),
            fulfillment: None,
            transaction_id: None,
            failure_detail: None,
            created_at: now,
            last_transition_at: now,
        }
    }

    /// Moves to `next` and appends to the history. Returns `false` and leaves
    /// the session untouched when the table forbids the move.
    pub fn advance(&mut self, next: SessionState, note: Option<String>) -> bool {
        if !self.state.can_transition_to(&next) {
            return false;
        }
        let now = Utc::now();
        self.history.push(StateTransition {
            from: self.state,
            to: next,
            at: now,
            note,
        });
        self.state = next;
        self.last_transition_at = now;
        true
    }
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &PaymentSession) -> Result<(), DatabaseError>;

    async fn update(&self, session: &PaymentSession) -> Result<(), DatabaseError>;

    async fn find_by_id(&self, session_id: Uuid) -> Result<Option<PaymentSession>, DatabaseError>;

    /// Every session for the pair, oldest first.
    async fn list_for_purchase(
        &self,
        buyer_id: &str,
        item_id: &str,
    ) -> Result<Vec<PaymentSession>, DatabaseError>;
}

#[derive(Default, Clone)]
pub struct InMemorySessionRepository {
    sessions: Arc<RwLock<HashMap<Uuid, PaymentSession>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert(&self, session: &PaymentSession) -> Result<(), DatabaseError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.session_id) {
            return Err(DatabaseError::new(DatabaseErrorKind::Conflict {
                entity: "PaymentSession".to_string(),
                message: format!("{} already exists", session.session_id),
            }));
        }
        sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn update(&self, session: &PaymentSession) -> Result<(), DatabaseError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.session_id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(DatabaseError::not_found("PaymentSession", session.session_id)),
        }
    }

    async fn find_by_id(&self, session_id: Uuid) -> Result<Option<PaymentSession>, DatabaseError> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn list_for_purchase(
        &self,
        buyer_id: &str,
        item_id: &str,
    ) -> Result<Vec<PaymentSession>, DatabaseError> {
        let sessions = self.sessions.read().await;
        let mut found: Vec<PaymentSession> = sessions
            .values()
            .filter(|s| s.request.buyer_id == buyer_id && s.request.item_id == item_id)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.created_at);
        Ok(found)
    }
}
