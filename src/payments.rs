//! Payment application against invoices.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use settlebook_core::{Invoice, LedgerStore, Payment, RecordPaymentCommand};

use crate::{
    audit::{self, AuditSink},
    error::LedgerError,
    rates::{convert, RateResolver},
};

pub struct PaymentProcessor {
    store: Arc<dyn LedgerStore>,
    rates: RateResolver,
    audit: Arc<dyn AuditSink>,
    base_currency: String,
}

impl PaymentProcessor {
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

    /// Converts the payment to base currency at the payment-date rate and
    /// applies it to the invoice. The stored paid-to-date and status are
    /// recomputed inside the backend in one atomic step, so concurrent
    /// payments all land. Over-payment is recorded as-is, never clamped.
    pub fn record_payment(
        &self,
        cmd: RecordPaymentCommand,
        actor: &str,
    ) -> Result<(Payment, Invoice), LedgerError> {
        self.store.get_invoice(cmd.invoice_id)?;
        if cmd.amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "payment amount must be positive, got {}",
                cmd.amount
            )));
        }
        let rate = self
            .rates
            .resolve_rate(&cmd.currency, &self.base_currency, cmd.payment_date)?;
        let payment = Payment {
            id: Uuid::new_v4(),
            invoice_id: cmd.invoice_id,
            payment_date: cmd.payment_date,
            amount: cmd.amount,
            amount_base: convert(cmd.amount, rate),
            currency: cmd.currency,
            method: cmd.method,
            reference_number: cmd.reference_number,
        };
        let invoice = self.store.record_payment(&payment)?;
        tracing::info!(
            payment_id = %payment.id,
            invoice_id = %invoice.id,
            amount_base = %payment.amount_base,
            status = invoice.status.as_str(),
            "Payment recorded"
        );
        audit::emit(
            self.audit.as_ref(),
            actor,
            "payment.recorded",
            "payment",
            payment.id.to_string(),
            json!({
                "invoice_id": invoice.id.to_string(),
                "amount_base": payment.amount_base.to_string(),
                "invoice_status": invoice.status.as_str(),
            }),
        );
        Ok((payment, invoice))
    }

    pub fn list_payments(&self, invoice_id: Uuid) -> Result<Vec<Payment>, LedgerError> {
        Ok(self.store.get_payments(invoice_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audit::MemoryAuditSink, invoices::InvoiceLedger, rates::RateFallback};
    use rust_decimal_macros::dec;
    use settlebook_core::{CreateInvoiceCommand, InvoiceKind, InvoiceStatus, RecordRateCommand};
    use settlebook_memory::MemoryLedgerStore;
    use time::{Date, Month};

    fn date(year: i32, month: Month, day: u8) -> Date {
        Date::from_calendar_date(year, month, day).unwrap()
    }

    fn setup() -> (PaymentProcessor, InvoiceLedger, RateResolver) {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
        let audit: Arc<dyn AuditSink> = Arc::new(MemoryAuditSink::new());
        let rates = RateResolver::new(store.clone(), audit.clone(), RateFallback::Permissive);
        let invoices = InvoiceLedger::new(store.clone(), rates.clone(), audit.clone(), "INR");
        let payments = PaymentProcessor::new(store, rates.clone(), audit, "INR");
        (payments, invoices, rates)
    }

    fn payment_cmd(invoice_id: Uuid, amount: Decimal, day: u8) -> RecordPaymentCommand {
        RecordPaymentCommand {
            invoice_id,
            payment_date: date(2024, Month::April, day),
            amount,
            currency: "USD".to_string(),
            method: "wire".to_string(),
            reference_number: None,
        }
    }

    #[test]
    fn test_missing_invoice_is_not_found() {
        let (payments, _, _) = setup();
        let err = payments
            .record_payment(payment_cmd(Uuid::new_v4(), dec!(100), 1), "alice")
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "invoice", .. }));
    }

    #[test]
    fn test_non_positive_amount_is_rejected() {
        let (payments, invoices, _) = setup();
        let invoice = invoices
            .create_invoice(
                CreateInvoiceCommand {
                    invoice_number: "INV-001".to_string(),
                    kind: InvoiceKind::Ar,
                    customer_id: None,
                    vendor_id: None,
                    project_id: None,
                    issue_date: date(2024, Month::April, 1),
                    due_date: date(2024, Month::May, 1),
                    currency: "INR".to_string(),
                    amount: dec!(1000),
                },
                "alice",
            )
            .unwrap();
        let err = payments
            .record_payment(payment_cmd(invoice.id, Decimal::ZERO, 1), "alice")
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn test_payment_converts_at_payment_date_rate() {
        let (payments, invoices, rates) = setup();
        for (day, rate) in [(1, dec!(80)), (9, dec!(82))] {
            rates
                .record_rate(
                    RecordRateCommand {
                        base_currency: "USD".to_string(),
                        target_currency: "INR".to_string(),
                        rate,
                        rate_date: date(2024, Month::April, day),
                    },
                    "alice",
                )
                .unwrap();
        }
        let invoice = invoices
            .create_invoice(
                CreateInvoiceCommand {
                    invoice_number: "INV-002".to_string(),
                    kind: InvoiceKind::Ar,
                    customer_id: None,
                    vendor_id: None,
                    project_id: None,
                    issue_date: date(2024, Month::April, 1),
                    due_date: date(2024, Month::May, 1),
                    currency: "USD".to_string(),
                    amount: dec!(10000),
                },
                "alice",
            )
            .unwrap();
        assert_eq!(invoice.amount_base, dec!(800000));

        let (payment, updated) = payments
            .record_payment(payment_cmd(invoice.id, dec!(5000), 10), "alice")
            .unwrap();
        assert_eq!(payment.amount_base, dec!(410000));
        assert_eq!(updated.paid_amount_base, dec!(410000));
        assert_eq!(updated.status, InvoiceStatus::PartiallyPaid);

        let payments_on_file = payments.list_payments(invoice.id).unwrap();
        assert_eq!(payments_on_file, vec![payment]);
    }
}
