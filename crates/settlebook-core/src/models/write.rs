use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use super::{AccountType, InvoiceKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAccountCommand {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub parent_account_id: Option<Uuid>,
    /// Defaults to the ledger's base currency when omitted.
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateAccountCommand {
    pub name: String,
    pub account_type: AccountType,
    pub parent_account_id: Option<Uuid>,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRateCommand {
    pub base_currency: String,
    pub target_currency: String,
    pub rate: Decimal,
    pub rate_date: Date,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEntryCommand {
    pub date: Date,
    pub description: String,
    pub lines: Vec<LineCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineCommand {
    pub account_id: Uuid,
    pub debit: Decimal,
    pub credit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInvoiceCommand {
    pub invoice_number: String,
    pub kind: InvoiceKind,
    pub customer_id: Option<String>,
    pub vendor_id: Option<String>,
    pub project_id: Option<String>,
    pub issue_date: Date,
    pub due_date: Date,
    pub currency: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPaymentCommand {
    pub invoice_id: Uuid,
    pub payment_date: Date,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub reference_number: Option<String>,
}
