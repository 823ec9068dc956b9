use crate::error::CheckoutError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    NotFound { entity: String, id: String },
    Conflict { entity: String, message: String },
    Unavailable { message: String },
    Unknown { message: String },
}

#[derive(Debug, Clone, Error)]
#[error("{}", describe(&self.kind))]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

fn describe(kind: &DatabaseErrorKind) -> String {
    match kind {
        DatabaseErrorKind::NotFound { entity, id } => format!("{} {} not found", entity, id),
        DatabaseErrorKind::Conflict { entity, message } => {
            format!("{} conflict: {}", entity, message)
        }
        DatabaseErrorKind::Unavailable { message } => format!("store unavailable: {}", message),
        DatabaseErrorKind::Unknown { message } => message.clone(),
    }
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::new(DatabaseErrorKind::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Unavailable { .. })
    }
}

impl From<DatabaseError> for CheckoutError {
    fn from(err: DatabaseError) -> Self {
        CheckoutError::Storage {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}
