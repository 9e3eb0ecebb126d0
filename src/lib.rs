//! An embeddable double-entry ledger with multi-currency invoice
//! settlement.
//!
//! The engine components in this crate (account registry, rate resolver,
//! journal engine, invoice ledger, payment processor, statement
//! aggregator) share a pluggable [`LedgerStore`] backend and an
//! [`AuditSink`](audit::AuditSink). Wire them up over one store:
//!
//! ```
//! use std::sync::Arc;
//! use settlebook::{
//!     audit::TracingAuditSink, AccountRegistry, JournalEngine, RateFallback, RateResolver,
//! };
//!
//! let store: Arc<dyn settlebook::LedgerStore> = Arc::new(settlebook::MemoryLedgerStore::new());
//! let audit: Arc<dyn settlebook::audit::AuditSink> = Arc::new(TracingAuditSink);
//! let accounts = AccountRegistry::new(store.clone(), audit.clone(), "USD");
//! let journal = JournalEngine::new(store.clone(), audit.clone());
//! let rates = RateResolver::new(store, audit, RateFallback::Permissive);
//! ```
//!
//! Amounts are `rust_decimal::Decimal` throughout; `*_base` fields are
//! denominated in the configured base currency.

pub mod accounts;
pub mod audit;
pub mod config;
pub mod error;
pub mod invoices;
pub mod journal;
pub mod payments;
pub mod rates;
pub mod reports;

pub use accounts::AccountRegistry;
pub use audit::{AuditError, AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use config::{Config, ConfigError, LedgerConfig, StorageBackendKind, StorageConfig};
pub use error::LedgerError;
pub use invoices::InvoiceLedger;
pub use journal::JournalEngine;
pub use payments::PaymentProcessor;
pub use rates::{convert, RateFallback, RateResolver};
pub use reports::StatementAggregator;

pub use settlebook_core::{
    Account, AccountActivity, AccountType, BalanceSheet, CashFlowRow, CreateAccountCommand,
    CreateEntryCommand, CreateInvoiceCommand, DashboardSummary, Direction, EntryStatus,
    ExchangeRate, Invoice, InvoiceKind, InvoiceStatus, JournalEntry, JournalLine, LedgerStore,
    LineCommand, Payment, ProfitAndLoss, RecordPaymentCommand, RecordRateCommand, StatementRow,
    StorageError, Transaction, TransactionId, UpdateAccountCommand,
};
pub use settlebook_memory::MemoryLedgerStore;
pub use settlebook_sqlite::SqliteLedgerStore;

use std::sync::Arc;

/// Constructs the storage backend named by the configuration.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn LedgerStore>, LedgerError> {
    match config.backend {
        StorageBackendKind::Memory => Ok(Arc::new(MemoryLedgerStore::new())),
        StorageBackendKind::Sqlite => {
            let store = SqliteLedgerStore::new(&config.sqlite_path)?;
            Ok(Arc::new(store))
        }
    }
}
