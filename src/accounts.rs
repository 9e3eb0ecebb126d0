//! Chart-of-accounts management.

use std::{collections::HashSet, sync::Arc};

use serde_json::json;
use uuid::Uuid;

use settlebook_core::{Account, CreateAccountCommand, LedgerStore, UpdateAccountCommand};

use crate::{
    audit::{self, AuditSink},
    error::LedgerError,
};

pub struct AccountRegistry {
    store: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditSink>,
    base_currency: String,
}

impl AccountRegistry {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        audit: Arc<dyn AuditSink>,
        base_currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            audit,
            base_currency: base_currency.into(),
        }
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self.store.list_accounts()?)
    }

    pub fn get_account(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        Ok(self.store.get_account(account_id)?)
    }

    pub fn create_account(
        &self,
        cmd: CreateAccountCommand,
        actor: &str,
    ) -> Result<Account, LedgerError> {
        if cmd.code.trim().is_empty() {
            return Err(LedgerError::Validation(
                "account code must not be empty".to_string(),
            ));
        }
        if let Some(parent_id) = cmd.parent_account_id {
            self.store.get_account(parent_id)?;
        }
        let account = Account {
            id: Uuid::new_v4(),
            code: cmd.code,
            name: cmd.name,
            account_type: cmd.account_type,
            parent_account_id: cmd.parent_account_id,
            currency: cmd
                .currency
                .unwrap_or_else(|| self.base_currency.clone()),
        };
        self.store.create_account(&account)?;
        tracing::info!(account_id = %account.id, code = %account.code, "Account created");
        audit::emit(
            self.audit.as_ref(),
            actor,
            "account.created",
            "account",
            account.id.to_string(),
            json!({
                "code": account.code,
                "account_type": account.account_type.as_str(),
            }),
        );
        Ok(account)
    }

    pub fn update_account(
        &self,
        account_id: Uuid,
        cmd: UpdateAccountCommand,
        actor: &str,
    ) -> Result<Account, LedgerError> {
        let current = self.store.get_account(account_id)?;
        if cmd.account_type != current.account_type && self.store.account_has_lines(account_id)? {
            return Err(LedgerError::InvalidState(format!(
                "cannot change the type of account {} while journal lines reference it",
                account_id
            )));
        }
        if let Some(parent_id) = cmd.parent_account_id {
            self.ensure_no_cycle(account_id, parent_id)?;
        }
        let account = Account {
            id: account_id,
            code: current.code,
            name: cmd.name,
            account_type: cmd.account_type,
            parent_account_id: cmd.parent_account_id,
            currency: cmd.currency,
        };
        self.store.update_account(&account)?;
        tracing::info!(account_id = %account.id, "Account updated");
        audit::emit(
            self.audit.as_ref(),
            actor,
            "account.updated",
            "account",
            account.id.to_string(),
            json!({
                "name": account.name,
                "account_type": account.account_type.as_str(),
            }),
        );
        Ok(account)
    }

    pub fn delete_account(&self, account_id: Uuid, actor: &str) -> Result<(), LedgerError> {
        self.store.delete_account(account_id)?;
        tracing::info!(account_id = %account_id, "Account deleted");
        audit::emit(
            self.audit.as_ref(),
            actor,
            "account.deleted",
            "account",
            account_id.to_string(),
            json!({}),
        );
        Ok(())
    }

    // Walks up the ancestor chain from the proposed parent; reaching the
    // account being updated means the link would close a cycle, and a
    // repeated id means the stored chain already loops, so stop rather
    // than follow it forever. Racing updates are serialized by the store's
    // own check inside `update_account`.
    fn ensure_no_cycle(&self, account_id: Uuid, parent_id: Uuid) -> Result<(), LedgerError> {
        if parent_id == account_id {
            return Err(LedgerError::Validation(
                "account cannot be its own parent".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        let mut cursor = self.store.get_account(parent_id)?;
        loop {
            if cursor.id == account_id {
                return Err(LedgerError::Validation(format!(
                    "parent {} is a descendant of account {}",
                    parent_id, account_id
                )));
            }
            if !seen.insert(cursor.id) {
                return Err(LedgerError::Validation(format!(
                    "parent chain above {} contains a cycle",
                    parent_id
                )));
            }
            match cursor.parent_account_id {
                Some(next) => cursor = self.store.get_account(next)?,
                None => return Ok(()),
            }
        }
    }
}
