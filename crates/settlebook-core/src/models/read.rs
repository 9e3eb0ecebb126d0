use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use super::AccountType;

/// Per-account debit/credit totals over approved journal lines, as
/// reported by a storage backend for a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountActivity {
    pub account_id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit_total: Decimal,
    pub credit_total: Decimal,
}

impl AccountActivity {
    pub fn net(&self) -> Decimal {
        self.debit_total - self.credit_total
    }
}

/// One line of a balance sheet or profit-and-loss statement: the signed
/// (debit minus credit) activity of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRow {
    pub account_type: AccountType,
    pub code: String,
    pub name: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub as_of: Date,
    pub rows: Vec<StatementRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitAndLoss {
    pub from: Date,
    pub to: Date,
    pub rows: Vec<StatementRow>,
    /// Revenue over the period, credit-natural (positive for earnings).
    pub revenue_total: Decimal,
    /// Expenses over the period, debit-natural (positive for spend).
    pub expense_total: Decimal,
    pub net_income: Decimal,
}

/// Settled in/out totals for one period key: a day (`YYYY-MM-DD`) for
/// cash flow, a month (`YYYY-MM`) for the trend view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowRow {
    pub period: String,
    pub inflow: Decimal,
    pub outflow: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub receivable_outstanding: Decimal,
    pub payable_outstanding: Decimal,
}
