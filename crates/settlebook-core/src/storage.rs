use std::ops::Bound;

use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::models::{
    read::AccountActivity, Account, ExchangeRate, Invoice, InvoiceKind, InvoiceStatus,
    JournalEntry, JournalLine, Payment, Transaction,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
    #[error("no rate found for the given date")]
    NoRateFound,
    #[error("account not found: {0}")]
    AccountNotFound(Uuid),
    #[error("account code already in use: {0}")]
    DuplicateAccountCode(String),
    #[error("account is referenced by journal lines: {0}")]
    AccountInUse(Uuid),
    #[error("account has child accounts: {0}")]
    AccountHasChildren(Uuid),
    #[error("account parent chain contains a cycle: {0}")]
    AccountCycle(Uuid),
    #[error("journal entry not found: {0}")]
    EntryNotFound(Uuid),
    #[error("journal entry is not a draft: {0}")]
    EntryNotDraft(Uuid),
    #[error("invoice not found: {0}")]
    InvoiceNotFound(Uuid),
    #[error("invoice number already in use: {0}")]
    DuplicateInvoiceNumber(String),
    #[error("no active transaction")]
    NoActiveTransaction,
}

pub type TransactionId = u64;

/// Persistence contract for a single ledger. Every mutating operation is
/// atomic inside the backend: it either fully applies or leaves the store
/// unchanged. Multi-row operations (`create_entry`, `approve_entry`,
/// `record_payment`) must never expose a partial write, and
/// `approve_entry`/`record_payment` must serialize against concurrent
/// calls touching the same row.
pub trait LedgerStore: Send + Sync {
    fn create_account(&self, account: &Account) -> Result<(), StorageError>;
    /// Fails with `AccountCycle` when following the new parent chain loops,
    /// either back to this account or through an already-broken hierarchy.
    /// The check and the write are one atomic step.
    fn update_account(&self, account: &Account) -> Result<(), StorageError>;
    /// Fails with `AccountInUse` when journal lines reference the account,
    /// or `AccountHasChildren` when other accounts name it as parent.
    fn delete_account(&self, account_id: Uuid) -> Result<(), StorageError>;
    fn get_account(&self, account_id: Uuid) -> Result<Account, StorageError>;
    fn list_accounts(&self) -> Result<Vec<Account>, StorageError>;
    fn account_has_lines(&self, account_id: Uuid) -> Result<bool, StorageError>;

    /// Upserts on the `(base, target, rate_date)` natural key.
    fn record_rate(&self, rate: &ExchangeRate) -> Result<(), StorageError>;
    /// Most recent rate with `rate_date <= date`, else `NoRateFound`.
    fn get_rate(&self, base: &str, target: &str, date: Date) -> Result<Decimal, StorageError>;
    fn list_rates(&self) -> Result<Vec<ExchangeRate>, StorageError>;

    /// Persists the entry and all of its lines as one unit. Every line's
    /// account must exist.
    fn create_entry(&self, entry: &JournalEntry, lines: &[JournalLine])
        -> Result<(), StorageError>;
    fn get_entry(&self, entry_id: Uuid) -> Result<JournalEntry, StorageError>;
    fn list_entries(&self) -> Result<Vec<JournalEntry>, StorageError>;
    fn get_lines(&self, entry_id: Uuid) -> Result<Vec<JournalLine>, StorageError>;
    /// Conditional `Draft -> Approved` flip plus settlement of every line
    /// into a transaction, as one unit. Fails with `EntryNotDraft` when
    /// the entry has already been approved.
    fn approve_entry(
        &self,
        entry_id: Uuid,
        approved_by: &str,
        approved_at: OffsetDateTime,
    ) -> Result<(JournalEntry, Vec<Transaction>), StorageError>;
    fn get_transactions(
        &self,
        from: Bound<Date>,
        to: Bound<Date>,
    ) -> Result<Vec<Transaction>, StorageError>;

    fn create_invoice(&self, invoice: &Invoice) -> Result<(), StorageError>;
    fn get_invoice(&self, invoice_id: Uuid) -> Result<Invoice, StorageError>;
    fn list_invoices(&self, kind: Option<InvoiceKind>) -> Result<Vec<Invoice>, StorageError>;
    fn set_invoice_status(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Invoice, StorageError>;
    /// Inserts the payment and applies its `amount_base` to the invoice's
    /// cumulative paid amount, recomputing the status against the stored
    /// row. Returns the updated invoice.
    fn record_payment(&self, payment: &Payment) -> Result<Invoice, StorageError>;
    fn get_payments(&self, invoice_id: Uuid) -> Result<Vec<Payment>, StorageError>;

    /// Per-account debit/credit totals over lines of approved entries
    /// whose date falls within the bounds.
    fn get_account_activity(
        &self,
        from: Bound<Date>,
        to: Bound<Date>,
    ) -> Result<Vec<AccountActivity>, StorageError>;

    fn begin_transaction(&self) -> Result<TransactionId, StorageError>;
    fn commit_transaction(&self, tx_id: TransactionId) -> Result<(), StorageError>;
    fn rollback_transaction(&self, tx_id: TransactionId) -> Result<(), StorageError>;
}
