use crate::database::session_repository::PaymentSession;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationType {
    PurchaseCompleted,
    PurchaseFailed,
    AwaitingAttestation,
    FulfillmentFailed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationService;

impl NotificationService {
    pub fn new() -> Self {
        Self
    }

    pub async fn send_notification(
        &self,
        session: &PaymentSession,
        notification_type: NotificationType,
        message: &str,
    ) {
        // Delivery (email, push) belongs to the host application; the
        // structured event is the contract.
        let gateway = session
            .gateway_id
            .map(|g| g.to_string())
            .unwrap_or_else(|| "none".to_string());

        match notification_type {
            NotificationType::PurchaseCompleted => {
                info!(
                    session_id = %session.session_id,
                    buyer_id = %session.request.buyer_id,
                    item_id = %session.request.item_id,
                    gateway = %gateway,
                    amount_minor = session.request.price_minor,
                    assurance = ?session.assurance,
                    "🔔 NOTIFICATION: Lesson Purchased - {}", message
                );
            }
            NotificationType::PurchaseFailed => {
                warn!(
                    session_id = %session.session_id,
                    buyer_id = %session.request.buyer_id,
                    gateway = %gateway,
                    state = %session.state,
                    "🔔 NOTIFICATION: Payment Failed - {}", message
                );
            }
            NotificationType::AwaitingAttestation => {
                info!(
                    session_id = %session.session_id,
                    buyer_id = %session.request.buyer_id,
                    gateway = %gateway,
                    "🔔 NOTIFICATION: Awaiting Payment - {}", message
                );
            }
            NotificationType::FulfillmentFailed => {
                error!(
                    session_id = %session.session_id,
                    buyer_id = %session.request.buyer_id,
                    item_id = %session.request.item_id,
                    transaction_id = ?session.transaction_id,
                    "🔔 NOTIFICATION: Access Grant Failed - {}", message
                );
            }
        }
    }
}
