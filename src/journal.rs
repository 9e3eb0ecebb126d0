//! Journal entry lifecycle.
//!
//! Entries are created as balanced drafts and settle into immutable
//! transactions exactly once, when approved.

use std::{ops::Bound, sync::Arc};

use rust_decimal::Decimal;
use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use settlebook_core::{
    CreateEntryCommand, EntryStatus, JournalEntry, JournalLine, LedgerStore, Transaction,
};

use crate::{
    audit::{self, AuditSink},
    error::LedgerError,
};

pub struct JournalEngine {
    store: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditSink>,
}

impl JournalEngine {
    pub fn new(store: Arc<dyn LedgerStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub fn list_entries(&self) -> Result<Vec<JournalEntry>, LedgerError> {
        Ok(self.store.list_entries()?)
    }

    pub fn get_entry(
        &self,
        entry_id: Uuid,
    ) -> Result<(JournalEntry, Vec<JournalLine>), LedgerError> {
        let entry = self.store.get_entry(entry_id)?;
        let lines = self.store.get_lines(entry_id)?;
        Ok((entry, lines))
    }

    /// Validates and persists a draft entry with its lines, all or nothing.
    /// Debits and credits must balance exactly.
    pub fn create_entry(
        &self,
        cmd: CreateEntryCommand,
        actor: &str,
    ) -> Result<JournalEntry, LedgerError> {
        if cmd.lines.is_empty() {
            return Err(LedgerError::Validation(
                "journal entry must have at least one line".to_string(),
            ));
        }
        let mut debits = Decimal::ZERO;
        let mut credits = Decimal::ZERO;
        for line in &cmd.lines {
            if line.debit < Decimal::ZERO || line.credit < Decimal::ZERO {
                return Err(LedgerError::Validation(
                    "debit and credit amounts must not be negative".to_string(),
                ));
            }
            debits += line.debit;
            credits += line.credit;
        }
        if debits != credits {
            return Err(LedgerError::Unbalanced { debits, credits });
        }

        let entry = JournalEntry {
            id: Uuid::new_v4(),
            date: cmd.date,
            description: cmd.description,
            status: EntryStatus::Draft,
            created_by: actor.to_string(),
            created_at: OffsetDateTime::now_utc(),
            approved_by: None,
            approved_at: None,
        };
        let lines: Vec<JournalLine> = cmd
            .lines
            .iter()
            .map(|l| JournalLine {
                id: Uuid::new_v4(),
                entry_id: entry.id,
                account_id: l.account_id,
                debit: l.debit,
                credit: l.credit,
            })
            .collect();
        self.store.create_entry(&entry, &lines)?;
        tracing::info!(
            entry_id = %entry.id,
            lines = lines.len(),
            total = %debits,
            "Journal entry created"
        );
        audit::emit(
            self.audit.as_ref(),
            actor,
            "journal.created",
            "journal_entry",
            entry.id.to_string(),
            json!({
                "date": entry.date.to_string(),
                "lines": lines.len(),
                "total": debits.to_string(),
            }),
        );
        Ok(entry)
    }

    /// Flips a draft to approved and materializes one transaction per line.
    /// Approving anything but a draft is `InvalidState`, so a second call
    /// can never settle the same entry twice.
    pub fn approve_entry(
        &self,
        entry_id: Uuid,
        actor: &str,
    ) -> Result<(JournalEntry, Vec<Transaction>), LedgerError> {
        let (entry, transactions) =
            self.store
                .approve_entry(entry_id, actor, OffsetDateTime::now_utc())?;
        tracing::info!(
            entry_id = %entry.id,
            transactions = transactions.len(),
            "Journal entry approved"
        );
        audit::emit(
            self.audit.as_ref(),
            actor,
            "journal.approved",
            "journal_entry",
            entry.id.to_string(),
            json!({ "transactions": transactions.len() }),
        );
        Ok((entry, transactions))
    }

    pub fn list_transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self
            .store
            .get_transactions(Bound::Unbounded, Bound::Unbounded)?)
    }
}
