//! In-memory `LedgerStore` backend.
//!
//! All state lives behind one `RwLock`; every mutating operation holds the
//! write guard for its full duration, so each call is atomic and calls
//! touching the same row are serialized. The unit of work is implemented
//! with full-state snapshots: `begin_transaction` clones the state,
//! `rollback_transaction` restores the clone.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    ops::{Bound, RangeBounds},
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock,
    },
};

use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use settlebook_core::{
    Account, AccountActivity, EntryStatus, ExchangeRate, Invoice, InvoiceKind, InvoiceStatus,
    JournalEntry, JournalLine, LedgerStore, Payment, StorageError, Transaction, TransactionId,
};

#[derive(Clone, Default)]
struct LedgerState {
    accounts: BTreeMap<Uuid, Account>,
    rates: BTreeMap<(String, String), RateBook>,
    entries: BTreeMap<Uuid, JournalEntry>,
    lines: BTreeMap<Uuid, Vec<JournalLine>>,
    transactions: Vec<Transaction>,
    invoices: BTreeMap<Uuid, Invoice>,
    payments: BTreeMap<Uuid, Vec<Payment>>,
}

pub struct MemoryLedgerStore {
    state: RwLock<LedgerState>,
    tx_counter: AtomicU64,
    snapshots: RwLock<HashMap<TransactionId, LedgerState>>,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            tx_counter: AtomicU64::new(1),
            snapshots: RwLock::new(HashMap::new()),
        }
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn create_account(&self, account: &Account) -> Result<(), StorageError> {
        let mut state = self.state.write().unwrap();
        if state.accounts.values().any(|a| a.code == account.code) {
            return Err(StorageError::DuplicateAccountCode(account.code.clone()));
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    fn update_account(&self, account: &Account) -> Result<(), StorageError> {
        let mut state = self.state.write().unwrap();
        if !state.accounts.contains_key(&account.id) {
            return Err(StorageError::AccountNotFound(account.id));
        }
        // The parent walk runs under the same write guard as the insert, so
        // two racing updates cannot both validate and then close a loop.
        // The visited set keeps the walk finite even over a broken chain.
        let mut seen = HashSet::new();
        let mut cursor = account.parent_account_id;
        while let Some(parent_id) = cursor {
            if parent_id == account.id || !seen.insert(parent_id) {
                return Err(StorageError::AccountCycle(account.id));
            }
            cursor = state
                .accounts
                .get(&parent_id)
                .and_then(|a| a.parent_account_id);
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    fn delete_account(&self, account_id: Uuid) -> Result<(), StorageError> {
        let mut state = self.state.write().unwrap();
        if !state.accounts.contains_key(&account_id) {
            return Err(StorageError::AccountNotFound(account_id));
        }
        let referenced = state
            .lines
            .values()
            .flatten()
            .any(|l| l.account_id == account_id);
        if referenced {
            return Err(StorageError::AccountInUse(account_id));
        }
        let has_children = state
            .accounts
            .values()
            .any(|a| a.parent_account_id == Some(account_id));
        if has_children {
            return Err(StorageError::AccountHasChildren(account_id));
        }
        state.accounts.remove(&account_id);
        Ok(())
    }

    fn get_account(&self, account_id: Uuid) -> Result<Account, StorageError> {
        self.state
            .read()
            .unwrap()
            .accounts
            .get(&account_id)
            .cloned()
            .ok_or(StorageError::AccountNotFound(account_id))
    }

    fn list_accounts(&self) -> Result<Vec<Account>, StorageError> {
        let state = self.state.read().unwrap();
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts)
    }

    fn account_has_lines(&self, account_id: Uuid) -> Result<bool, StorageError> {
        let state = self.state.read().unwrap();
        if !state.accounts.contains_key(&account_id) {
            return Err(StorageError::AccountNotFound(account_id));
        }
        Ok(state
            .lines
            .values()
            .flatten()
            .any(|l| l.account_id == account_id))
    }

    fn record_rate(&self, rate: &ExchangeRate) -> Result<(), StorageError> {
        let mut state = self.state.write().unwrap();
        let key = (rate.base_currency.clone(), rate.target_currency.clone());
        state
            .rates
            .entry(key)
            .or_insert_with(RateBook::new)
            .set(rate.rate_date, rate.rate);
        Ok(())
    }

    fn get_rate(&self, base: &str, target: &str, date: Date) -> Result<Decimal, StorageError> {
        let state = self.state.read().unwrap();
        let book = state
            .rates
            .get(&(base.to_string(), target.to_string()))
            .ok_or(StorageError::NoRateFound)?;
        book.latest_on_or_before(date)
    }

    fn list_rates(&self) -> Result<Vec<ExchangeRate>, StorageError> {
        let state = self.state.read().unwrap();
        let mut rates = Vec::new();
        for ((base, target), book) in &state.rates {
            for (date, rate) in &book.values {
                rates.push(ExchangeRate {
                    base_currency: base.clone(),
                    target_currency: target.clone(),
                    rate: *rate,
                    rate_date: *date,
                });
            }
        }
        Ok(rates)
    }

    fn create_entry(
        &self,
        entry: &JournalEntry,
        lines: &[JournalLine],
    ) -> Result<(), StorageError> {
        let mut state = self.state.write().unwrap();
        // All accounts are checked before anything is inserted, so a miss
        // leaves no partial entry behind.
        for line in lines {
            if !state.accounts.contains_key(&line.account_id) {
                return Err(StorageError::AccountNotFound(line.account_id));
            }
        }
        state.entries.insert(entry.id, entry.clone());
        state.lines.insert(entry.id, lines.to_vec());
        Ok(())
    }

    fn get_entry(&self, entry_id: Uuid) -> Result<JournalEntry, StorageError> {
        self.state
            .read()
            .unwrap()
            .entries
            .get(&entry_id)
            .cloned()
            .ok_or(StorageError::EntryNotFound(entry_id))
    }

    fn list_entries(&self) -> Result<Vec<JournalEntry>, StorageError> {
        let state = self.state.read().unwrap();
        let mut entries: Vec<JournalEntry> = state.entries.values().cloned().collect();
        entries.sort_by(|a, b| (a.date, a.created_at).cmp(&(b.date, b.created_at)));
        Ok(entries)
    }

    fn get_lines(&self, entry_id: Uuid) -> Result<Vec<JournalLine>, StorageError> {
        let state = self.state.read().unwrap();
        if !state.entries.contains_key(&entry_id) {
            return Err(StorageError::EntryNotFound(entry_id));
        }
        Ok(state.lines.get(&entry_id).cloned().unwrap_or_default())
    }

    fn approve_entry(
        &self,
        entry_id: Uuid,
        approved_by: &str,
        approved_at: OffsetDateTime,
    ) -> Result<(JournalEntry, Vec<Transaction>), StorageError> {
        let mut state = self.state.write().unwrap();
        let entry = state
            .entries
            .get_mut(&entry_id)
            .ok_or(StorageError::EntryNotFound(entry_id))?;
        if entry.status != EntryStatus::Draft {
            return Err(StorageError::EntryNotDraft(entry_id));
        }
        entry.status = EntryStatus::Approved;
        entry.approved_by = Some(approved_by.to_string());
        entry.approved_at = Some(approved_at);
        let approved = entry.clone();

        let lines = state.lines.get(&entry_id).cloned().unwrap_or_default();
        let mut settled = Vec::with_capacity(lines.len());
        for line in &lines {
            let txn = Transaction::settle(line, approved.date);
            state.transactions.push(txn.clone());
            settled.push(txn);
        }
        tracing::debug!(entry_id = %entry_id, transactions = settled.len(), "Journal entry approved");
        Ok((approved, settled))
    }

    fn get_transactions(
        &self,
        from: Bound<Date>,
        to: Bound<Date>,
    ) -> Result<Vec<Transaction>, StorageError> {
        let state = self.state.read().unwrap();
        let mut transactions: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| (from, to).contains(&t.txn_date))
            .cloned()
            .collect();
        transactions.sort_by_key(|t| t.txn_date);
        Ok(transactions)
    }

    fn create_invoice(&self, invoice: &Invoice) -> Result<(), StorageError> {
        let mut state = self.state.write().unwrap();
        if state
            .invoices
            .values()
            .any(|i| i.invoice_number == invoice.invoice_number)
        {
            return Err(StorageError::DuplicateInvoiceNumber(
                invoice.invoice_number.clone(),
            ));
        }
        state.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    fn get_invoice(&self, invoice_id: Uuid) -> Result<Invoice, StorageError> {
        self.state
            .read()
            .unwrap()
            .invoices
            .get(&invoice_id)
            .cloned()
            .ok_or(StorageError::InvoiceNotFound(invoice_id))
    }

    fn list_invoices(&self, kind: Option<InvoiceKind>) -> Result<Vec<Invoice>, StorageError> {
        let state = self.state.read().unwrap();
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| kind.map_or(true, |k| i.kind == k))
            .cloned()
            .collect();
        invoices.sort_by(|a, b| {
            (a.issue_date, &a.invoice_number).cmp(&(b.issue_date, &b.invoice_number))
        });
        Ok(invoices)
    }

    fn set_invoice_status(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Invoice, StorageError> {
        let mut state = self.state.write().unwrap();
        let invoice = state
            .invoices
            .get_mut(&invoice_id)
            .ok_or(StorageError::InvoiceNotFound(invoice_id))?;
        invoice.status = status;
        Ok(invoice.clone())
    }

    fn record_payment(&self, payment: &Payment) -> Result<Invoice, StorageError> {
        let mut state = self.state.write().unwrap();
        let invoice = state
            .invoices
            .get_mut(&payment.invoice_id)
            .ok_or(StorageError::InvoiceNotFound(payment.invoice_id))?;
        // The increment reads the stored row under the write guard, so
        // concurrent payments against one invoice cannot lose updates.
        let new_paid = invoice.paid_amount_base + payment.amount_base;
        invoice.status = invoice.status_after_payment(new_paid);
        invoice.paid_amount_base = new_paid;
        let updated = invoice.clone();
        state
            .payments
            .entry(payment.invoice_id)
            .or_default()
            .push(payment.clone());
        tracing::debug!(
            invoice_id = %payment.invoice_id,
            paid_amount_base = %updated.paid_amount_base,
            "Payment applied"
        );
        Ok(updated)
    }

    fn get_payments(&self, invoice_id: Uuid) -> Result<Vec<Payment>, StorageError> {
        let state = self.state.read().unwrap();
        if !state.invoices.contains_key(&invoice_id) {
            return Err(StorageError::InvoiceNotFound(invoice_id));
        }
        Ok(state.payments.get(&invoice_id).cloned().unwrap_or_default())
    }

    fn get_account_activity(
        &self,
        from: Bound<Date>,
        to: Bound<Date>,
    ) -> Result<Vec<AccountActivity>, StorageError> {
        let state = self.state.read().unwrap();
        let mut totals: BTreeMap<Uuid, (Decimal, Decimal)> = BTreeMap::new();
        for entry in state.entries.values() {
            if entry.status != EntryStatus::Approved || !(from, to).contains(&entry.date) {
                continue;
            }
            if let Some(lines) = state.lines.get(&entry.id) {
                for line in lines {
                    let sums = totals
                        .entry(line.account_id)
                        .or_insert((Decimal::ZERO, Decimal::ZERO));
                    sums.0 += line.debit;
                    sums.1 += line.credit;
                }
            }
        }
        let mut rows = Vec::with_capacity(totals.len());
        for (account_id, (debit_total, credit_total)) in totals {
            let account = state
                .accounts
                .get(&account_id)
                .ok_or(StorageError::AccountNotFound(account_id))?;
            rows.push(AccountActivity {
                account_id,
                code: account.code.clone(),
                name: account.name.clone(),
                account_type: account.account_type,
                debit_total,
                credit_total,
            });
        }
        rows.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(rows)
    }

    fn begin_transaction(&self) -> Result<TransactionId, StorageError> {
        let tx_id = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.state.read().unwrap().clone();
        self.snapshots.write().unwrap().insert(tx_id, snapshot);
        tracing::debug!(tx_id, "Transaction started");
        Ok(tx_id)
    }

    fn commit_transaction(&self, tx_id: TransactionId) -> Result<(), StorageError> {
        self.snapshots
            .write()
            .unwrap()
            .remove(&tx_id)
            .ok_or(StorageError::NoActiveTransaction)?;
        tracing::debug!(tx_id, "Transaction committed");
        Ok(())
    }

    fn rollback_transaction(&self, tx_id: TransactionId) -> Result<(), StorageError> {
        let snapshot = self
            .snapshots
            .write()
            .unwrap()
            .remove(&tx_id)
            .ok_or(StorageError::NoActiveTransaction)?;
        *self.state.write().unwrap() = snapshot;
        tracing::debug!(tx_id, "Transaction rolled back");
        Ok(())
    }
}

#[derive(Clone)]
struct RateBook {
    values: BTreeMap<Date, Decimal>,
}

impl RateBook {
    fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    fn set(&mut self, date: Date, rate: Decimal) {
        self.values.insert(date, rate);
    }

    fn latest_on_or_before(&self, date: Date) -> Result<Decimal, StorageError> {
        let mut rates = self.values.range((Bound::Unbounded, Bound::Included(date)));
        match rates.next_back() {
            Some((_, rate)) => Ok(*rate),
            None => Err(StorageError::NoRateFound),
        }
    }
}
