use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Failures of a single ledger operation. None of them are fatal to the process.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The same expense was already recorded today.
    #[error("duplicate expense: {0}")]
    DuplicateExpense(String),

    #[error("invalid expense: {0}")]
    InvalidExpense(String),

    #[error("invalid group: {0}")]
    InvalidGroup(String),

    #[error("invalid member: {0}")]
    InvalidMember(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_expense(reason: impl Into<String>) -> Self {
        Self::InvalidExpense(reason.into())
    }
}

impl From<mongodb::error::Error> for LedgerError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<bson::ser::Error> for LedgerError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
