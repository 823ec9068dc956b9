//! Persistence seams for the checkout core: the session ledger and the
//! purchase ledger, each with an in-memory implementation.

pub mod error;
pub mod session_repository;
pub mod transaction_repository;

pub use error::{DatabaseError, DatabaseErrorKind};
pub use session_repository::{
    FailureReason, FulfillmentStatus, InMemorySessionRepository, PaymentSession, PendingStage,
    PurchaseRequest, SessionRepository, SessionState, StateTransition,
};
pub use transaction_repository::{
    InMemoryTransactionLedger, PurchaseKey, RecordOutcome, TransactionLedger, TransactionRecord,
};
