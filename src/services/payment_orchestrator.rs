//! Payment Orchestrator
//!
//! Drives one lesson purchase from rail selection to a terminal state:
//! - Session state machine (selecting → initiating → pending → succeeded | failed)
//! - Strategy dispatch by completion mode
//! - Bounded, cancellable verification polling
//! - Exactly-once fulfillment through [`FulfillmentGuard`]

use crate::config::{CheckoutConfig, PollPolicy};
use crate::database::session_repository::{
    FailureReason, FulfillmentStatus, PaymentSession, PendingStage, PurchaseRequest,
    SessionRepository, SessionState,
};
use crate::database::transaction_repository::{PurchaseKey, TransactionLedger, TransactionRecord};
use crate::error::{CheckoutError, CheckoutResult};
use crate::logging::mask_email;
use crate::payments::error::PaymentError;
use crate::payments::registry::StrategyRegistry;
use crate::payments::strategy::GatewayStrategy;
use crate::payments::types::{
    Assurance, ChargeContext, CustomerContact, GatewayDescriptor, GatewayId, InitiationMode,
    PaymentDetails, VerificationOutcome, VerificationResult,
};
use crate::payments::utils::{generate_reference, secure_eq};
use crate::services::collaborators::{AccessGrantor, CurrentUser, PaymentCatalog};
use crate::services::fulfillment::{FulfillmentError, FulfillmentGuard, FulfillmentReceipt};
use crate::services::keyed_lock::KeyedMutex;
use crate::services::notification::{NotificationService, NotificationType};
use crate::services::scheduler::{
    cancellation_pair, Backoff, CancellationHandle, CancellationToken, DelayOutcome, Scheduler,
    TokioScheduler,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

const REFERENCE_PREFIX: &str = "LSN";

// ============================================================================
// Configuration Types
// ============================================================================

/// Configuration for the payment orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// ISO currency every charge is made in
    pub currency: String,
    /// Verification polling after a provider token arrives
    pub polling: PollPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            currency: "NGN".to_string(),
            polling: PollPolicy::default(),
        }
    }
}

impl From<&CheckoutConfig> for OrchestratorConfig {
    fn from(config: &CheckoutConfig) -> Self {
        Self {
            currency: config.currency.clone(),
            polling: config.polling.clone(),
        }
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

/// Proof offered to `confirm` that the buyer paid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reference")]
pub enum Evidence {
    /// Reference handed back by the provider's redirect callback
    ProviderToken(String),
    /// "I have completed payment"
    UserAttestation,
}

impl Evidence {
    fn describe(&self) -> &'static str {
        match self {
            Evidence::ProviderToken(_) => "provider_token",
            Evidence::UserAttestation => "user_attestation",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub state: SessionState,
    pub retry_of: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<&PaymentSession> for SessionHandle {
    fn from(session: &PaymentSession) -> Self {
        Self {
            session_id: session.session_id,
            state: session.state,
            retry_of: session.retry_of,
            created_at: session.created_at,
        }
    }
}

/// Session snapshot after an operation, with the purchase record once one exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutOutcome {
    pub session: PaymentSession,
    pub record: Option<TransactionRecord>,
}

impl CheckoutOutcome {
    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn is_succeeded(&self) -> bool {
        self.session.state == SessionState::Succeeded
    }
}

// ============================================================================
// Payment Orchestrator
// ============================================================================

pub struct PaymentOrchestrator {
    config: OrchestratorConfig,
    registry: Arc<StrategyRegistry>,
    sessions: Arc<dyn SessionRepository>,
    ledger: Arc<dyn TransactionLedger>,
    catalog: Arc<dyn PaymentCatalog>,
    guard: FulfillmentGuard,
    scheduler: Arc<dyn Scheduler>,
    notifications: NotificationService,
    session_locks: KeyedMutex<Uuid>,
    cancellations: RwLock<HashMap<Uuid, (CancellationHandle, CancellationToken)>>,
}

impl PaymentOrchestrator {
    /// Create a new orchestrator
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<StrategyRegistry>,
        sessions: Arc<dyn SessionRepository>,
        ledger: Arc<dyn TransactionLedger>,
        grantor: Arc<dyn AccessGrantor>,
        catalog: Arc<dyn PaymentCatalog>,
    ) -> Self {
        let guard = FulfillmentGuard::new(ledger.clone(), grantor, config.currency.clone());
        Self {
            config,
            registry,
            sessions,
            ledger,
            catalog,
            guard,
            scheduler: Arc::new(TokioScheduler),
            notifications: NotificationService::new(),
            session_locks: KeyedMutex::new(),
            cancellations: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    pub async fn start(
        &self,
        caller: &CurrentUser,
        request: PurchaseRequest,
    ) -> CheckoutResult<SessionHandle> {
        validate_request(&request)?;
        authorize(caller, &request.buyer_id)?;
        self.ensure_not_purchased(&request.buyer_id, &request.item_id)
            .await?;

        let session = PaymentSession::new(request, None);
        self.sessions.insert(&session).await?;
        self.register_cancellation(session.session_id).await;

        info!(
            session_id = %session.session_id,
            buyer_id = %session.request.buyer_id,
            buyer_email = %mask_email(&caller.email),
            item_id = %session.request.item_id,
            price_minor = session.request.price_minor,
            "checkout session started"
        );

        Ok(SessionHandle::from(&session))
    }

    /// Picks a rail and initiates the charge. `None` uses the request's
    /// preferred gateway.
    pub async fn select(
        &self,
        caller: &CurrentUser,
        session_id: Uuid,
        gateway: Option<GatewayId>,
        details: PaymentDetails,
    ) -> CheckoutResult<CheckoutOutcome> {
        let _lock = self.session_locks.lock(&session_id).await;
        let mut session = self.load_for(caller, session_id).await?;

        if session.state != SessionState::Selecting {
            return Err(invalid_transition(&session, "select a gateway"));
        }

        let gateway = gateway.unwrap_or(session.request.gateway_id);
        let strategy = self
            .registry
            .get(gateway)
            .map_err(|e| CheckoutError::UnknownGateway {
                gateway: gateway.to_string(),
                message: e.to_string(),
            })?;

        // Caller-correctable problems leave the session in `selecting`.
        strategy
            .validate_details(&details)
            .await
            .map_err(|e| details_error(gateway, e))?;
        self.ensure_not_purchased(&session.request.buyer_id, &session.request.item_id)
            .await?;

        let reference = generate_reference(REFERENCE_PREFIX);
        session.gateway_id = Some(gateway);
        session.details = Some(details.clone());
        self.transition(&mut session, SessionState::Initiating, None)?;
        self.sessions.update(&session).await?;

        info!(
            session_id = %session_id,
            gateway = %gateway,
            reference = %reference,
            "initiating payment"
        );

        let charge = ChargeContext {
            reference,
            buyer_id: session.request.buyer_id.clone(),
            item_id: session.request.item_id.clone(),
            course_key: session.request.course_key.clone(),
            item_title: session.request.item_title.clone(),
            amount_minor: session.request.price_minor,
            currency: self.config.currency.clone(),
            customer: CustomerContact {
                email: Some(caller.email.clone()),
                name: Some(caller.name.clone()),
                phone: details.phone_number().map(str::to_string),
            },
            details,
        };

        let initiation = match strategy.initiate(charge).await {
            Ok(initiation) => initiation,
            Err(e) => {
                warn!(session_id = %session_id, gateway = %gateway, error = %e, "initiation failed");
                let error = CheckoutError::InitiationFailed {
                    gateway,
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                };
                self.fail(
                    &mut session,
                    strategy.as_ref(),
                    FailureReason::InitiationFailed,
                    e.to_string(),
                )
                .await?;
                return Err(error);
            }
        };

        session.provider_reference = Some(initiation.pending_reference.clone());
        session.instructions = initiation.instructions.clone();

        match initiation.mode {
            InitiationMode::Redirect => {
                self.transition(
                    &mut session,
                    SessionState::pending(PendingStage::AwaitingProviderCallback),
                    None,
                )?;
                self.sessions.update(&session).await?;
                Ok(self.outcome(session, None))
            }
            InitiationMode::AwaitAttestation => {
                self.transition(
                    &mut session,
                    SessionState::pending(PendingStage::AwaitingUserAttestation),
                    None,
                )?;
                self.sessions.update(&session).await?;
                self.notifications
                    .send_notification(
                        &session,
                        NotificationType::AwaitingAttestation,
                        "Complete the payment, then confirm",
                    )
                    .await;
                Ok(self.outcome(session, None))
            }
            InitiationMode::Immediate { result } => {
                self.settle(&mut session, strategy.as_ref(), result).await
            }
        }
    }

    pub async fn confirm(
        &self,
        caller: &CurrentUser,
        session_id: Uuid,
        evidence: Evidence,
    ) -> CheckoutResult<CheckoutOutcome> {
        let _lock = self.session_locks.lock(&session_id).await;
        let mut session = self.load_for(caller, session_id).await?;

        match session.state {
            SessionState::Succeeded => {
                debug!(session_id = %session_id, "confirm on settled session, returning existing outcome");
                let record = self.existing_record(&session).await?;
                if session.fulfillment == Some(FulfillmentStatus::AccessPending) {
                    return Err(access_pending(&session, record.as_ref()));
                }
                return Ok(self.outcome(session, record));
            }
            SessionState::Failed { .. } | SessionState::Selecting | SessionState::Initiating => {
                return Err(invalid_transition(&session, "confirm payment"));
            }
            SessionState::Pending { .. } => {}
        }

        let strategy = self.strategy_for(&session)?;
        let reference = session.provider_reference.clone().unwrap_or_default();

        match (session.state, &evidence) {
            (
                SessionState::Pending {
                    stage: PendingStage::AwaitingProviderCallback,
                },
                Evidence::ProviderToken(token),
            ) => {
                if !secure_eq(token.as_bytes(), reference.as_bytes()) {
                    warn!(session_id = %session_id, "provider token does not match session reference");
                    return self
                        .fail_with_error(
                            &mut session,
                            strategy.as_ref(),
                            FailureReason::VerificationFailed,
                            "provider token does not match the payment reference".to_string(),
                        )
                        .await;
                }
                self.transition(
                    &mut session,
                    SessionState::pending(PendingStage::AwaitingPollConfirmation),
                    None,
                )?;
                self.sessions.update(&session).await?;
                self.poll(&mut session, strategy.as_ref()).await
            }
            (
                SessionState::Pending {
                    stage: PendingStage::AwaitingPollConfirmation,
                },
                Evidence::ProviderToken(token),
            ) if secure_eq(token.as_bytes(), reference.as_bytes()) => {
                self.poll(&mut session, strategy.as_ref()).await
            }
            (
                SessionState::Pending {
                    stage: PendingStage::AwaitingUserAttestation,
                },
                Evidence::UserAttestation,
            ) => match strategy.attest(&reference).await {
                Ok(result) => self.settle(&mut session, strategy.as_ref(), result).await,
                Err(e) => {
                    self.fail_with_error(
                        &mut session,
                        strategy.as_ref(),
                        FailureReason::VerificationFailed,
                        e.to_string(),
                    )
                    .await
                }
            },
            (state, evidence) => {
                warn!(
                    session_id = %session_id,
                    state = %state,
                    evidence = evidence.describe(),
                    "evidence does not fit the session's completion protocol"
                );
                self.fail_with_error(
                    &mut session,
                    strategy.as_ref(),
                    FailureReason::VerificationFailed,
                    format!("{} is not accepted while {}", evidence.describe(), state),
                )
                .await
            }
        }
    }

    /// Checks ownership, fires the session's cancellation signal, then fails
    /// it as user-cancelled. An in-flight poll observes the signal and finishes
    /// the cancellation itself.
    pub async fn cancel(
        &self,
        caller: &CurrentUser,
        session_id: Uuid,
    ) -> CheckoutResult<CheckoutOutcome> {
        // Ownership is checked before signalling; a fired token cannot be reset.
        let owned = self.session(session_id).await?;
        authorize(caller, &owned.request.buyer_id)?;
        if let Some((handle, _)) = self.cancellations.read().await.get(&session_id) {
            handle.cancel();
        }

        let _lock = self.session_locks.lock(&session_id).await;
        let mut session = self.load_for(caller, session_id).await?;

        match session.state {
            SessionState::Failed {
                reason: FailureReason::UserCancelled,
            } => Ok(self.outcome(session, None)),
            state if state.is_terminal() => Err(invalid_transition(&session, "cancel")),
            _ => {
                self.cancel_locked(&mut session).await?;
                Ok(self.outcome(session, None))
            }
        }
    }

    /// From `failed`, opens a fresh session for the same purchase. From
    /// `selecting`, returns the session unchanged.
    pub async fn retry(
        &self,
        caller: &CurrentUser,
        session_id: Uuid,
    ) -> CheckoutResult<SessionHandle> {
        let _lock = self.session_locks.lock(&session_id).await;
        let session = self.load_for(caller, session_id).await?;

        match session.state {
            SessionState::Selecting => Ok(SessionHandle::from(&session)),
            SessionState::Failed { .. } => {
                self.ensure_not_purchased(&session.request.buyer_id, &session.request.item_id)
                    .await?;
                let retried = PaymentSession::new(session.request.clone(), Some(session_id));
                self.sessions.insert(&retried).await?;
                self.register_cancellation(retried.session_id).await;

                info!(
                    session_id = %retried.session_id,
                    retry_of = %session_id,
                    "checkout session retried"
                );
                Ok(SessionHandle::from(&retried))
            }
            _ => Err(invalid_transition(&session, "retry")),
        }
    }

    /// Re-issues the access grant for a succeeded session whose grant failed.
    pub async fn retry_fulfillment(
        &self,
        caller: &CurrentUser,
        session_id: Uuid,
    ) -> CheckoutResult<FulfillmentReceipt> {
        let _lock = self.session_locks.lock(&session_id).await;
        let mut session = self.load_for(caller, session_id).await?;

        if session.state != SessionState::Succeeded {
            return Err(invalid_transition(&session, "retry fulfillment"));
        }

        let result = match self
            .guard
            .reconcile(&session.request.buyer_id, &session.request.item_id)
            .await
        {
            Err(FulfillmentError::NoRecord { .. }) => self.guard.commit(&session).await,
            other => other,
        };

        match result {
            Ok(receipt) => {
                session.fulfillment = Some(FulfillmentStatus::Granted);
                session.transaction_id = Some(receipt.record.transaction_id);
                self.sessions.update(&session).await?;
                info!(
                    session_id = %session_id,
                    transaction_id = %receipt.record.transaction_id,
                    "access grant reconciled"
                );
                Ok(receipt)
            }
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn session(&self, session_id: Uuid) -> CheckoutResult<PaymentSession> {
        self.sessions
            .find_by_id(session_id)
            .await?
            .ok_or(CheckoutError::SessionNotFound { session_id })
    }

    /// Every attempt at buying `item_id`, oldest first.
    pub async fn purchase_history(
        &self,
        buyer_id: &str,
        item_id: &str,
    ) -> CheckoutResult<Vec<PaymentSession>> {
        Ok(self.sessions.list_for_purchase(buyer_id, item_id).await?)
    }

    pub async fn has_access(&self, buyer_id: &str, item_id: &str) -> CheckoutResult<bool> {
        let key = PurchaseKey::new(buyer_id, item_id);
        Ok(self.ledger.find_by_purchase(&key).await?.is_some())
    }

    pub fn available_gateways(&self) -> Vec<GatewayDescriptor> {
        self.registry.list_available()
    }

    pub fn default_gateway(&self) -> GatewayId {
        self.registry.default_gateway()
    }

    pub async fn supported_banks(&self) -> CheckoutResult<Vec<String>> {
        Ok(self.catalog.list_supported_banks().await?)
    }

    pub async fn supported_mobile_money_providers(&self) -> CheckoutResult<Vec<String>> {
        Ok(self.catalog.list_supported_mobile_money_providers().await?)
    }

    // =========================================================================
    // Verification
    // =========================================================================

    async fn poll(
        &self,
        session: &mut PaymentSession,
        strategy: &dyn GatewayStrategy,
    ) -> CheckoutResult<CheckoutOutcome> {
        let reference = session.provider_reference.clone().unwrap_or_default();
        let mut token = self.cancellation_token(session.session_id).await;
        let mut backoff = Backoff::new(&self.config.polling);

        while let Some(delay) = backoff.next() {
            let attempt = backoff.attempts_made();
            if self.scheduler.delay(delay, &mut token).await == DelayOutcome::Cancelled {
                info!(session_id = %session.session_id, attempt, "verification polling cancelled");
                self.cancel_locked(session).await?;
                return Err(CheckoutError::UserCancelled {
                    session_id: session.session_id,
                });
            }

            let checked = strategy.verify(&reference).await;
            session.attempts = attempt;
            self.sessions.update(session).await?;

            match checked {
                Ok(result) => match result.outcome {
                    VerificationOutcome::Success => {
                        return self.settle(session, strategy, result).await;
                    }
                    VerificationOutcome::Failure => {
                        let reason = result
                            .failure_reason
                            .unwrap_or_else(|| "provider rejected the payment".to_string());
                        return self
                            .fail_with_error(
                                session,
                                strategy,
                                FailureReason::VerificationFailed,
                                reason,
                            )
                            .await;
                    }
                    VerificationOutcome::Pending => {
                        debug!(session_id = %session.session_id, attempt, "payment still pending");
                    }
                },
                Err(e) if e.is_retryable() => {
                    warn!(
                        session_id = %session.session_id,
                        attempt,
                        error = %e,
                        "verification check inconclusive"
                    );
                }
                Err(e) => {
                    return self
                        .fail_with_error(
                            session,
                            strategy,
                            FailureReason::VerificationFailed,
                            e.to_string(),
                        )
                        .await;
                }
            }
        }

        let attempts = session.attempts;
        self.fail(
            session,
            strategy,
            FailureReason::VerificationTimeout,
            format!("still pending after {} checks", attempts),
        )
        .await?;
        Err(CheckoutError::VerificationTimeout {
            session_id: session.session_id,
            attempts,
        })
    }

    /// Applies a verification result reached without polling, or the final
    /// successful poll.
    async fn settle(
        &self,
        session: &mut PaymentSession,
        strategy: &dyn GatewayStrategy,
        result: VerificationResult,
    ) -> CheckoutResult<CheckoutOutcome> {
        if !result.is_success() {
            let reason = result.failure_reason.unwrap_or_else(|| match result.outcome {
                VerificationOutcome::Pending => "payment not settled at initiation".to_string(),
                _ => "provider rejected the payment".to_string(),
            });
            return self
                .fail_with_error(session, strategy, FailureReason::VerificationFailed, reason)
                .await;
        }

        session.assurance = Some(result.assurance);
        let note = result
            .provider_tx_id
            .as_ref()
            .map(|id| format!("provider_tx_id={}", id));
        self.transition(session, SessionState::Succeeded, note)?;
        self.sessions.update(session).await?;
        self.drop_cancellation(session.session_id).await;

        if result.assurance == Assurance::SelfAttested {
            info!(
                session_id = %session.session_id,
                gateway = ?session.gateway_id,
                "payment accepted on buyer attestation without provider confirmation"
            );
        }

        self.fulfill(session).await
    }

    async fn fulfill(&self, session: &mut PaymentSession) -> CheckoutResult<CheckoutOutcome> {
        match self.guard.commit(session).await {
            Ok(receipt) => {
                session.fulfillment = Some(FulfillmentStatus::Granted);
                session.transaction_id = Some(receipt.record.transaction_id);
                self.sessions.update(session).await?;
                self.notifications
                    .send_notification(
                        session,
                        NotificationType::PurchaseCompleted,
                        "Payment successful, lesson unlocked",
                    )
                    .await;
                Ok(self.outcome(session.clone(), Some(receipt.record)))
            }
            Err(FulfillmentError::GrantFailed { record, source }) => {
                session.fulfillment = Some(FulfillmentStatus::AccessPending);
                session.transaction_id = Some(record.transaction_id);
                self.sessions.update(session).await?;
                self.notifications
                    .send_notification(
                        session,
                        NotificationType::FulfillmentFailed,
                        "Payment received but access grant failed",
                    )
                    .await;
                Err(FulfillmentError::GrantFailed { record, source }.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Failure handling
    // =========================================================================

    async fn fail(
        &self,
        session: &mut PaymentSession,
        strategy: &dyn GatewayStrategy,
        reason: FailureReason,
        detail: String,
    ) -> CheckoutResult<()> {
        self.transition(session, SessionState::failed(reason), Some(detail.clone()))?;
        session.failure_detail = Some(detail.clone());
        self.sessions.update(session).await?;
        self.drop_cancellation(session.session_id).await;

        if let Some(reference) = session.provider_reference.as_deref() {
            if let Err(e) = strategy.release(reference).await {
                warn!(session_id = %session.session_id, error = %e, "failed to release gateway resources");
            }
        }

        info!(
            session_id = %session.session_id,
            gateway = ?session.gateway_id,
            state = %session.state,
            detail = %detail,
            "checkout session failed"
        );
        self.notifications
            .send_notification(session, NotificationType::PurchaseFailed, &detail)
            .await;
        Ok(())
    }

    async fn fail_with_error(
        &self,
        session: &mut PaymentSession,
        strategy: &dyn GatewayStrategy,
        reason: FailureReason,
        detail: String,
    ) -> CheckoutResult<CheckoutOutcome> {
        self.fail(session, strategy, reason, detail.clone()).await?;
        Err(match reason {
            FailureReason::VerificationTimeout => CheckoutError::VerificationTimeout {
                session_id: session.session_id,
                attempts: session.attempts,
            },
            FailureReason::UserCancelled => CheckoutError::UserCancelled {
                session_id: session.session_id,
            },
            FailureReason::VerificationFailed | FailureReason::InitiationFailed => {
                CheckoutError::VerificationFailed {
                    session_id: session.session_id,
                    reason: detail,
                }
            }
        })
    }

    async fn cancel_locked(&self, session: &mut PaymentSession) -> CheckoutResult<()> {
        match self.strategy_for(session) {
            Ok(strategy) => {
                self.fail(
                    session,
                    strategy.as_ref(),
                    FailureReason::UserCancelled,
                    "cancelled by buyer".to_string(),
                )
                .await
            }
            // Nothing was initiated, or the rail has since been disabled.
            Err(_) => {
                let detail = "cancelled by buyer".to_string();
                self.transition(
                    session,
                    SessionState::failed(FailureReason::UserCancelled),
                    Some(detail.clone()),
                )?;
                session.failure_detail = Some(detail);
                self.sessions.update(session).await?;
                self.drop_cancellation(session.session_id).await;
                info!(session_id = %session.session_id, "checkout session cancelled");
                Ok(())
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn transition(
        &self,
        session: &mut PaymentSession,
        next: SessionState,
        note: Option<String>,
    ) -> CheckoutResult<()> {
        let from = session.state;
        if !session.advance(next, note) {
            return Err(CheckoutError::InvalidStateTransition {
                session_id: session.session_id,
                state: from.to_string(),
                action: format!("move to {}", next),
            });
        }
        debug!(
            session_id = %session.session_id,
            from_state = %from,
            to_state = %next,
            "session state transitioned"
        );
        Ok(())
    }

    async fn load_for(&self, caller: &CurrentUser, session_id: Uuid) -> CheckoutResult<PaymentSession> {
        let session = self.session(session_id).await?;
        authorize(caller, &session.request.buyer_id)?;
        Ok(session)
    }

    fn strategy_for(&self, session: &PaymentSession) -> CheckoutResult<Arc<dyn GatewayStrategy>> {
        let gateway = session
            .gateway_id
            .ok_or_else(|| invalid_transition(session, "use a gateway before one is selected"))?;
        self.registry
            .get(gateway)
            .map_err(|e| CheckoutError::UnknownGateway {
                gateway: gateway.to_string(),
                message: e.to_string(),
            })
    }

    async fn ensure_not_purchased(&self, buyer_id: &str, item_id: &str) -> CheckoutResult<()> {
        let key = PurchaseKey::new(buyer_id, item_id);
        if self.ledger.find_by_purchase(&key).await?.is_some() {
            return Err(CheckoutError::AlreadyPurchased {
                buyer_id: buyer_id.to_string(),
                item_id: item_id.to_string(),
            });
        }
        Ok(())
    }

    async fn existing_record(
        &self,
        session: &PaymentSession,
    ) -> CheckoutResult<Option<TransactionRecord>> {
        let key = PurchaseKey::new(
            session.request.buyer_id.clone(),
            session.request.item_id.clone(),
        );
        Ok(self.ledger.find_by_purchase(&key).await?)
    }

    async fn register_cancellation(&self, session_id: Uuid) {
        self.cancellations
            .write()
            .await
            .insert(session_id, cancellation_pair());
    }

    async fn cancellation_token(&self, session_id: Uuid) -> CancellationToken {
        let mut cancellations = self.cancellations.write().await;
        cancellations
            .entry(session_id)
            .or_insert_with(cancellation_pair)
            .1
            .clone()
    }

    async fn drop_cancellation(&self, session_id: Uuid) {
        self.cancellations.write().await.remove(&session_id);
    }

    fn outcome(&self, session: PaymentSession, record: Option<TransactionRecord>) -> CheckoutOutcome {
        CheckoutOutcome { session, record }
    }
}

fn validate_request(request: &PurchaseRequest) -> CheckoutResult<()> {
    if request.price_minor < 0 {
        return Err(CheckoutError::InvalidRequest {
            message: "price_minor must not be negative".to_string(),
        });
    }
    if request.buyer_id.trim().is_empty() {
        return Err(CheckoutError::InvalidRequest {
            message: "buyer_id is required".to_string(),
        });
    }
    if request.item_id.trim().is_empty() {
        return Err(CheckoutError::InvalidRequest {
            message: "item_id is required".to_string(),
        });
    }
    Ok(())
}

fn authorize(caller: &CurrentUser, buyer_id: &str) -> CheckoutResult<()> {
    if caller.id != buyer_id {
        return Err(CheckoutError::Unauthorized {
            caller_id: caller.id.clone(),
            buyer_id: buyer_id.to_string(),
        });
    }
    Ok(())
}

fn invalid_transition(session: &PaymentSession, action: &str) -> CheckoutError {
    CheckoutError::InvalidStateTransition {
        session_id: session.session_id,
        state: session.state.to_string(),
        action: action.to_string(),
    }
}

fn access_pending(session: &PaymentSession, record: Option<&TransactionRecord>) -> CheckoutError {
    CheckoutError::FulfillmentError {
        transaction_id: record
            .map(|r| r.transaction_id)
            .or(session.transaction_id)
            .unwrap_or_default(),
        buyer_id: session.request.buyer_id.clone(),
        item_id: session.request.item_id.clone(),
        message: "access grant still pending".to_string(),
    }
}

fn details_error(gateway: GatewayId, error: PaymentError) -> CheckoutError {
    match error {
        PaymentError::MissingDetails { field } => CheckoutError::MissingDetails { field },
        PaymentError::ValidationError { message, field } => {
            CheckoutError::InvalidDetails { field, message }
        }
        other => CheckoutError::InitiationFailed {
            gateway,
            retryable: other.is_retryable(),
            message: other.to_string(),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
