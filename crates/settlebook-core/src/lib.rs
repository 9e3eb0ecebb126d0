//! Core types and traits for settlebook storage backends.
//!
//! This crate defines the ledger entities, the commands that mutate them,
//! the read-side report models, and the `LedgerStore` trait that pluggable
//! storage implementations provide in separate crates.

pub mod models;
pub mod storage;

// Re-export key types at crate root for convenience
pub use models::read::{
    AccountActivity, BalanceSheet, CashFlowRow, DashboardSummary, ProfitAndLoss, StatementRow,
};
pub use models::write::{
    CreateAccountCommand, CreateEntryCommand, CreateInvoiceCommand, LineCommand,
    RecordPaymentCommand, RecordRateCommand, UpdateAccountCommand,
};
pub use models::{
    Account, AccountType, Direction, EntryStatus, ExchangeRate, Invoice, InvoiceKind,
    InvoiceStatus, JournalEntry, JournalLine, Payment, Transaction,
};
pub use storage::{LedgerStore, StorageError, TransactionId};
