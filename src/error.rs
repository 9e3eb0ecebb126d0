use rust_decimal::Decimal;
use thiserror::Error;
use time::Date;

use settlebook_core::StorageError;

/// Domain-level error taxonomy surfaced by every engine component.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("journal entry is unbalanced: debits {debits} != credits {credits}")]
    Unbalanced { debits: Decimal, credits: Decimal },
    #[error("no exchange rate from {base} to {target} on or before {date}")]
    RateNotFound {
        base: String,
        target: String,
        date: Date,
    },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl LedgerError {
    /// Stable machine-readable code for boundary layers to translate.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::InvalidState(_) => "INVALID_STATE",
            LedgerError::Unbalanced { .. } => "UNBALANCED",
            LedgerError::RateNotFound { .. } => "RATE_NOT_FOUND",
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<StorageError> for LedgerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AccountNotFound(id) => LedgerError::NotFound {
                entity: "account",
                id: id.to_string(),
            },
            StorageError::EntryNotFound(id) => LedgerError::NotFound {
                entity: "journal entry",
                id: id.to_string(),
            },
            StorageError::InvoiceNotFound(id) => LedgerError::NotFound {
                entity: "invoice",
                id: id.to_string(),
            },
            StorageError::EntryNotDraft(id) => {
                LedgerError::InvalidState(format!("journal entry {} is not a draft", id))
            }
            StorageError::AccountInUse(id) => {
                LedgerError::InvalidState(format!("account {} is referenced by journal lines", id))
            }
            StorageError::AccountHasChildren(id) => {
                LedgerError::InvalidState(format!("account {} has child accounts", id))
            }
            StorageError::AccountCycle(id) => LedgerError::Validation(format!(
                "parent chain of account {} contains a cycle",
                id
            )),
            StorageError::DuplicateAccountCode(code) => {
                LedgerError::Validation(format!("account code already in use: {}", code))
            }
            StorageError::DuplicateInvoiceNumber(number) => {
                LedgerError::Validation(format!("invoice number already in use: {}", number))
            }
            other => LedgerError::Storage(other),
        }
    }
}
