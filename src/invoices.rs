//! Receivable and payable invoices, carried in the ledger base currency.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use settlebook_core::{CreateInvoiceCommand, Invoice, InvoiceKind, InvoiceStatus, LedgerStore};

use crate::{
    audit::{self, AuditSink},
    error::LedgerError,
    rates::{convert, RateResolver},
};

pub struct InvoiceLedger {
    store: Arc<dyn LedgerStore>,
    rates: RateResolver,
    audit: Arc<dyn AuditSink>,
    base_currency: String,
}

impl InvoiceLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        rates: RateResolver,
        audit: Arc<dyn AuditSink>,
        base_currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            rates,
            audit,
            base_currency: base_currency.into(),
        }
    }

    pub fn list_invoices(&self, kind: Option<InvoiceKind>) -> Result<Vec<Invoice>, LedgerError> {
        Ok(self.store.list_invoices(kind)?)
    }

    pub fn get_invoice(&self, invoice_id: Uuid) -> Result<Invoice, LedgerError> {
        Ok(self.store.get_invoice(invoice_id)?)
    }

    /// Persists a draft invoice. The face amount is converted to the base
    /// currency at the issue-date rate and frozen as `amount_base`.
    pub fn create_invoice(
        &self,
        cmd: CreateInvoiceCommand,
        actor: &str,
    ) -> Result<Invoice, LedgerError> {
        if cmd.invoice_number.trim().is_empty() {
            return Err(LedgerError::Validation(
                "invoice number must not be empty".to_string(),
            ));
        }
        if cmd.amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "invoice amount must be positive, got {}",
                cmd.amount
            )));
        }
        if cmd.due_date < cmd.issue_date {
            return Err(LedgerError::Validation(
                "due date must not precede issue date".to_string(),
            ));
        }
        let rate = self
            .rates
            .resolve_rate(&cmd.currency, &self.base_currency, cmd.issue_date)?;
        let invoice = Invoice {
            id: Uuid::new_v4(),
            invoice_number: cmd.invoice_number,
            kind: cmd.kind,
            customer_id: cmd.customer_id,
            vendor_id: cmd.vendor_id,
            project_id: cmd.project_id,
            issue_date: cmd.issue_date,
            due_date: cmd.due_date,
            currency: cmd.currency,
            amount: cmd.amount,
            amount_base: convert(cmd.amount, rate),
            paid_amount_base: Decimal::ZERO,
            status: InvoiceStatus::Draft,
        };
        self.store.create_invoice(&invoice)?;
        tracing::info!(
            invoice_id = %invoice.id,
            number = %invoice.invoice_number,
            amount_base = %invoice.amount_base,
            "Invoice created"
        );
        audit::emit(
            self.audit.as_ref(),
            actor,
            "invoice.created",
            "invoice",
            invoice.id.to_string(),
            json!({
                "invoice_number": invoice.invoice_number,
                "kind": invoice.kind.as_str(),
                "amount": invoice.amount.to_string(),
                "amount_base": invoice.amount_base.to_string(),
            }),
        );
        Ok(invoice)
    }

    /// Manual status override. Never applies payments; the payment
    /// processor owns `paid_amount_base`.
    pub fn update_invoice_status(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
        actor: &str,
    ) -> Result<Invoice, LedgerError> {
        let invoice = self.store.set_invoice_status(invoice_id, status)?;
        tracing::info!(
            invoice_id = %invoice.id,
            status = status.as_str(),
            "Invoice status changed"
        );
        audit::emit(
            self.audit.as_ref(),
            actor,
            "invoice.status_changed",
            "invoice",
            invoice.id.to_string(),
            json!({ "status": status.as_str() }),
        );
        Ok(invoice)
    }
}
