use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

pub mod read;
pub mod write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "ASSET",
            AccountType::Liability => "LIABILITY",
            AccountType::Equity => "EQUITY",
            AccountType::Revenue => "REVENUE",
            AccountType::Expense => "EXPENSE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ASSET" => Some(AccountType::Asset),
            "LIABILITY" => Some(AccountType::Liability),
            "EQUITY" => Some(AccountType::Equity),
            "REVENUE" => Some(AccountType::Revenue),
            "EXPENSE" => Some(AccountType::Expense),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Draft,
    Approved,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Draft => "DRAFT",
            EntryStatus::Approved => "APPROVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(EntryStatus::Draft),
            "APPROVED" => Some(EntryStatus::Approved),
            _ => None,
        }
    }
}

/// Settlement direction of a materialized transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN" => Some(Direction::In),
            "OUT" => Some(Direction::Out),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceKind {
    /// Accounts receivable
    Ar,
    /// Accounts payable
    Ap,
}

impl InvoiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceKind::Ar => "AR",
            InvoiceKind::Ap => "AP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AR" => Some(InvoiceKind::Ar),
            "AP" => Some(InvoiceKind::Ap),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    PartiallyPaid,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::PartiallyPaid => "PARTIALLY_PAID",
            InvoiceStatus::Paid => "PAID",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(InvoiceStatus::Draft),
            "PARTIALLY_PAID" => Some(InvoiceStatus::PartiallyPaid),
            "PAID" => Some(InvoiceStatus::Paid),
            _ => None,
        }
    }
}

/// A node in the chart of accounts. `code` is the unique display key;
/// `parent_account_id` links accounts into a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub parent_account_id: Option<Uuid>,
    pub currency: String,
}

/// One conversion rate effective from `rate_date`. Rows are keyed by
/// `(base_currency, target_currency, rate_date)`; there is no surrogate id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub base_currency: String,
    pub target_currency: String,
    pub rate: Decimal,
    pub rate_date: Date,
}

/// A journal entry. Created in `Draft`; transitions once, irreversibly,
/// to `Approved`, at which point its lines settle into transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub date: Date,
    pub description: String,
    pub status: EntryStatus,
    pub created_by: String,
    pub created_at: OffsetDateTime,
    pub approved_by: Option<String>,
    pub approved_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub account_id: Uuid,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl JournalLine {
    /// Net effect of the line: positive for a debit surplus, negative for
    /// a credit surplus.
    pub fn signed_amount(&self) -> Decimal {
        self.debit - self.credit
    }
}

/// An immutable settled movement, produced exactly once per journal line
/// when its parent entry is approved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub line_id: Uuid,
    pub txn_date: Date,
    pub direction: Direction,
    pub amount_base: Decimal,
}

impl Transaction {
    /// Settles a journal line: a positive debit surplus flows `In` for
    /// that surplus, anything else flows `Out` for the credit surplus.
    pub fn settle(line: &JournalLine, txn_date: Date) -> Self {
        let delta = line.signed_amount();
        let (direction, amount_base) = if delta > Decimal::ZERO {
            (Direction::In, delta)
        } else {
            (Direction::Out, -delta)
        };
        Self {
            id: Uuid::new_v4(),
            line_id: line.id,
            txn_date,
            direction,
            amount_base,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub kind: InvoiceKind,
    pub customer_id: Option<String>,
    pub vendor_id: Option<String>,
    pub project_id: Option<String>,
    pub issue_date: Date,
    pub due_date: Date,
    pub currency: String,
    /// Face value in `currency`.
    pub amount: Decimal,
    /// Face value converted to the base currency at the issue-date rate.
    pub amount_base: Decimal,
    pub paid_amount_base: Decimal,
    pub status: InvoiceStatus,
}

impl Invoice {
    /// Status after the cumulative paid amount reaches `new_paid`. Paid at
    /// or beyond the face amount, partially paid above zero, otherwise
    /// unchanged. Over-payment is not clamped.
    pub fn status_after_payment(&self, new_paid: Decimal) -> InvoiceStatus {
        if new_paid >= self.amount_base {
            InvoiceStatus::Paid
        } else if new_paid > Decimal::ZERO {
            InvoiceStatus::PartiallyPaid
        } else {
            self.status
        }
    }

    /// Unpaid remainder in base currency.
    pub fn outstanding_base(&self) -> Decimal {
        self.amount_base - self.paid_amount_base
    }
}

/// An append-only payment event against an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub payment_date: Date,
    pub amount: Decimal,
    /// Payment amount converted to the base currency at the payment-date rate.
    pub amount_base: Decimal,
    pub currency: String,
    pub method: String,
    pub reference_number: Option<String>,
}
