mod common;

use common::{buyer, harness, network_blip, purchase, user, HarnessBuilder, ScriptedAggregator};
use lesson_checkout::database::{FailureReason, FulfillmentStatus, PendingStage, SessionState};
use lesson_checkout::payments::provider::ProviderStatus;
use lesson_checkout::payments::types::{Assurance, PaymentInstructions};
use lesson_checkout::payments::{GatewayId, PaymentDetails};
use lesson_checkout::services::collaborators::{require_current_user, StaticIdentityProvider};
use lesson_checkout::{CheckoutError, ErrorCode, Evidence};

#[tokio::test]
async fn test_bank_transfer_purchase_completes_on_attestation() {
    let h = harness();
    let handle = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::BankTransfer))
        .await
        .unwrap();
    assert_eq!(handle.state, SessionState::Selecting);

    let selected = h
        .orchestrator
        .select(
            &buyer(),
            handle.session_id,
            Some(GatewayId::BankTransfer),
            PaymentDetails::with_bank("GTB"),
        )
        .await
        .unwrap();
    assert_eq!(
        selected.state(),
        SessionState::pending(PendingStage::AwaitingUserAttestation)
    );
    match selected.session.instructions.as_ref().unwrap() {
        PaymentInstructions::BankTransfer {
            amount_minor,
            account_number,
            ..
        } => {
            assert_eq!(*amount_minor, 500000);
            assert_eq!(account_number.len(), 10);
        }
        other => panic!("unexpected instructions {:?}", other),
    }

    let confirmed = h
        .orchestrator
        .confirm(&buyer(), handle.session_id, Evidence::UserAttestation)
        .await
        .unwrap();

    assert!(confirmed.is_succeeded());
    let record = confirmed.record.unwrap();
    assert_eq!(record.buyer_id, "u1");
    assert_eq!(record.item_id, "lessonA");
    assert_eq!(record.price_minor, 500000);
    assert_eq!(record.gateway_id, GatewayId::BankTransfer);
    assert_eq!(record.assurance, Assurance::SelfAttested);
    assert_eq!(confirmed.session.fulfillment, Some(FulfillmentStatus::Granted));
    assert_eq!(confirmed.session.transaction_id, Some(record.transaction_id));

    assert_eq!(h.ledger.len().await, 1);
    assert_eq!(h.grantor.calls(), 1);
    assert!(h.grantor.has_access("u1", "lessonA"));
}

#[tokio::test]
async fn test_mobile_money_without_phone_stays_selecting() {
    let h = harness();
    let handle = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::MobileMoney))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .select(
            &buyer(),
            handle.session_id,
            None,
            PaymentDetails::with_bank("OPay"),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::MissingDetails { ref field } if field == "phone_number"
    ));

    let session = h.orchestrator.session(handle.session_id).await.unwrap();
    assert_eq!(session.state, SessionState::Selecting);
    assert!(session.history.is_empty());

    // The buyer can correct the details on the same session.
    let selected = h
        .orchestrator
        .select(
            &buyer(),
            handle.session_id,
            None,
            PaymentDetails::with_mobile_money("OPay", "08012345678"),
        )
        .await
        .unwrap();
    assert_eq!(
        selected.state(),
        SessionState::pending(PendingStage::AwaitingUserAttestation)
    );
    let confirmed = h
        .orchestrator
        .confirm(&buyer(), handle.session_id, Evidence::UserAttestation)
        .await
        .unwrap();
    assert!(confirmed.is_succeeded());
}

#[tokio::test]
async fn test_unlisted_bank_is_rejected_without_leaving_selecting() {
    let h = harness();
    let handle = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::Ussd))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .select(
            &buyer(),
            handle.session_id,
            None,
            PaymentDetails::with_bank("Nowhere Bank"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidDetails);

    let session = h.orchestrator.session(handle.session_id).await.unwrap();
    assert_eq!(session.state, SessionState::Selecting);
}

#[tokio::test]
async fn test_redirect_succeeds_on_second_poll() {
    let h = HarnessBuilder::new()
        .paystack(ScriptedAggregator::statuses(&[
            ProviderStatus::Pending,
            ProviderStatus::Success,
        ]))
        .build();
    let handle = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::Paystack))
        .await
        .unwrap();
    let selected = h
        .orchestrator
        .select(&buyer(), handle.session_id, None, PaymentDetails::default())
        .await
        .unwrap();
    let token = selected.session.provider_reference.clone().unwrap();

    let confirmed = h
        .orchestrator
        .confirm(&buyer(), handle.session_id, Evidence::ProviderToken(token))
        .await
        .unwrap();

    assert!(confirmed.is_succeeded());
    assert_eq!(confirmed.session.attempts, 2);
    assert_eq!(h.paystack.verify_calls(), 2);
    assert_eq!(
        confirmed.record.unwrap().assurance,
        Assurance::ProviderVerified
    );
}

#[tokio::test]
async fn test_redirect_explicit_failure_stops_polling() {
    let h = HarnessBuilder::new()
        .paystack(ScriptedAggregator::statuses(&[
            ProviderStatus::Failed,
            ProviderStatus::Success,
        ]))
        .build();
    let handle = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::Paystack))
        .await
        .unwrap();
    let selected = h
        .orchestrator
        .select(&buyer(), handle.session_id, None, PaymentDetails::default())
        .await
        .unwrap();
    let token = selected.session.provider_reference.clone().unwrap();

    let err = h
        .orchestrator
        .confirm(&buyer(), handle.session_id, Evidence::ProviderToken(token))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::VerificationFailed { .. }));

    let session = h.orchestrator.session(handle.session_id).await.unwrap();
    assert_eq!(session.attempts, 1);
    assert_eq!(
        session.state,
        SessionState::failed(FailureReason::VerificationFailed)
    );
    assert_eq!(h.paystack.verify_calls(), 1);
    assert!(h.ledger.is_empty().await);
    assert_eq!(h.grantor.calls(), 0);
}

#[tokio::test]
async fn test_redirect_times_out_after_max_attempts() {
    let h = HarnessBuilder::new()
        .paystack(ScriptedAggregator::statuses(&[]))
        .build();
    let handle = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::Paystack))
        .await
        .unwrap();
    let selected = h
        .orchestrator
        .select(&buyer(), handle.session_id, None, PaymentDetails::default())
        .await
        .unwrap();
    let token = selected.session.provider_reference.clone().unwrap();

    let err = h
        .orchestrator
        .confirm(&buyer(), handle.session_id, Evidence::ProviderToken(token))
        .await
        .unwrap_err();

    match err {
        CheckoutError::VerificationTimeout { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected timeout, got {:?}", other),
    }
    let session = h.orchestrator.session(handle.session_id).await.unwrap();
    assert_eq!(
        session.state,
        SessionState::failed(FailureReason::VerificationTimeout)
    );
    assert_eq!(h.paystack.verify_calls(), 3);
    assert!(h.ledger.is_empty().await);
}

#[tokio::test]
async fn test_transient_verify_errors_keep_polling() {
    let h = HarnessBuilder::new()
        .paystack(ScriptedAggregator::new(vec![
            network_blip(),
            Ok(ProviderStatus::Success),
        ]))
        .build();
    let handle = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::Paystack))
        .await
        .unwrap();
    let selected = h
        .orchestrator
        .select(&buyer(), handle.session_id, None, PaymentDetails::default())
        .await
        .unwrap();
    let token = selected.session.provider_reference.clone().unwrap();

    let confirmed = h
        .orchestrator
        .confirm(&buyer(), handle.session_id, Evidence::ProviderToken(token))
        .await
        .unwrap();
    assert!(confirmed.is_succeeded());
    assert_eq!(confirmed.session.attempts, 2);
}

#[tokio::test]
async fn test_mismatched_token_fails_verification() {
    let h = harness();
    let handle = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::Paystack))
        .await
        .unwrap();
    h.orchestrator
        .select(&buyer(), handle.session_id, None, PaymentDetails::default())
        .await
        .unwrap();

    let err = h
        .orchestrator
        .confirm(
            &buyer(),
            handle.session_id,
            Evidence::ProviderToken("LSN_forged".to_string()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::VerificationFailed { .. }));
    assert_eq!(h.paystack.verify_calls(), 0);
    assert!(!h.orchestrator.has_access("u1", "lessonA").await.unwrap());
}

#[tokio::test]
async fn test_wrong_evidence_kind_fails_verification() {
    let h = harness();
    let handle = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::BankTransfer))
        .await
        .unwrap();
    h.orchestrator
        .select(
            &buyer(),
            handle.session_id,
            None,
            PaymentDetails::with_bank("Zenith"),
        )
        .await
        .unwrap();

    let err = h
        .orchestrator
        .confirm(
            &buyer(),
            handle.session_id,
            Evidence::ProviderToken("anything".to_string()),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::VerificationFailed);
}

#[tokio::test]
async fn test_flutterwave_settles_at_selection() {
    let h = harness();
    let handle = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::Flutterwave))
        .await
        .unwrap();

    let outcome = h
        .orchestrator
        .select(&buyer(), handle.session_id, None, PaymentDetails::default())
        .await
        .unwrap();

    assert!(outcome.is_succeeded());
    assert_eq!(
        outcome.session.history.iter().map(|t| t.to).collect::<Vec<_>>(),
        vec![SessionState::Initiating, SessionState::Succeeded]
    );
    assert_eq!(outcome.record.unwrap().assurance, Assurance::ProviderVerified);
    assert!(h.grantor.has_access("u1", "lessonA"));
}

#[tokio::test]
async fn test_confirm_twice_returns_same_record() {
    let h = harness();
    let handle = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::Ussd))
        .await
        .unwrap();
    h.orchestrator
        .select(
            &buyer(),
            handle.session_id,
            None,
            PaymentDetails::with_bank("GTB"),
        )
        .await
        .unwrap();

    let first = h
        .orchestrator
        .confirm(&buyer(), handle.session_id, Evidence::UserAttestation)
        .await
        .unwrap();
    let second = h
        .orchestrator
        .confirm(&buyer(), handle.session_id, Evidence::UserAttestation)
        .await
        .unwrap();

    assert_eq!(first.record, second.record);
    assert_eq!(first.session.history, second.session.history);
    assert_eq!(h.grantor.calls(), 1);
    assert_eq!(h.ledger.len().await, 1);
}

#[tokio::test]
async fn test_confirm_before_selection_is_rejected() {
    let h = harness();
    let handle = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::Paystack))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .confirm(&buyer(), handle.session_id, Evidence::UserAttestation)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidStateTransition { .. }));
    assert_eq!(
        h.orchestrator.session(handle.session_id).await.unwrap().state,
        SessionState::Selecting
    );
}

#[tokio::test]
async fn test_start_rejects_purchased_items() {
    let h = harness();
    let handle = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::Flutterwave))
        .await
        .unwrap();
    h.orchestrator
        .select(&buyer(), handle.session_id, None, PaymentDetails::default())
        .await
        .unwrap();

    let err = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::Paystack))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::AlreadyPurchased);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_callers_are_checked() {
    let h = harness();
    let err = h
        .orchestrator
        .start(&user("u2"), purchase(GatewayId::Paystack))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::Unauthorized);

    let anonymous = StaticIdentityProvider::anonymous();
    let err = require_current_user(&anonymous).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::NotAuthenticated);

    let signed_in = StaticIdentityProvider::signed_in(buyer());
    let caller = require_current_user(&signed_in).await.unwrap();
    assert!(h
        .orchestrator
        .start(&caller, purchase(GatewayId::Paystack))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_history_lists_every_attempt() {
    let h = harness();
    let first = h
        .orchestrator
        .start(&buyer(), purchase(GatewayId::BankTransfer))
        .await
        .unwrap();
    h.orchestrator.cancel(&buyer(), first.session_id).await.unwrap();
    let second = h
        .orchestrator
        .retry(&buyer(), first.session_id)
        .await
        .unwrap();

    let history = h
        .orchestrator
        .purchase_history("u1", "lessonA")
        .await
        .unwrap();
    let ids: Vec<_> = history.iter().map(|s| s.session_id).collect();
    assert_eq!(ids, vec![first.session_id, second.session_id]);
    assert_eq!(history[1].retry_of, Some(first.session_id));
}

#[tokio::test]
async fn test_invalid_requests_create_no_session() {
    let h = harness();

    let mut anonymous = purchase(GatewayId::Paystack);
    anonymous.buyer_id = String::new();
    let err = h
        .orchestrator
        .start(&user(""), anonymous)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidRequest { .. }));
    assert!(h
        .orchestrator
        .purchase_history("", "lessonA")
        .await
        .unwrap()
        .is_empty());

    let mut negative = purchase(GatewayId::Paystack);
    negative.price_minor = -1;
    let err = h
        .orchestrator
        .start(&buyer(), negative)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidRequest { .. }));
    assert!(h
        .orchestrator
        .purchase_history("u1", "lessonA")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_ussd_refuses_fractional_naira_price() {
    let h = harness();
    let mut request = purchase(GatewayId::Ussd);
    request.price_minor = 150050;
    let handle = h.orchestrator.start(&buyer(), request).await.unwrap();

    let err = h
        .orchestrator
        .select(
            &buyer(),
            handle.session_id,
            None,
            PaymentDetails::with_bank("GTB"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InitiationFailed);
    assert!(!err.is_retryable());
    assert_eq!(
        h.orchestrator.session(handle.session_id).await.unwrap().state,
        SessionState::failed(FailureReason::InitiationFailed)
    );
}
