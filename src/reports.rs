//! Read-side statements over approved journal activity and settled
//! transactions. Everything here is a pure aggregation; draft entries are
//! invisible to every view.

use std::{collections::BTreeMap, ops::Bound, sync::Arc};

use rust_decimal::Decimal;
use time::Date;

use settlebook_core::{
    AccountType, BalanceSheet, CashFlowRow, DashboardSummary, Direction, InvoiceKind,
    InvoiceStatus, LedgerStore, ProfitAndLoss, StatementRow, Transaction,
};

use crate::error::LedgerError;

pub struct StatementAggregator {
    store: Arc<dyn LedgerStore>,
}

impl StatementAggregator {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Signed (debit minus credit) position of every account with activity
    /// on or before `as_of`, ordered by account type then code.
    pub fn balance_sheet(&self, as_of: Date) -> Result<BalanceSheet, LedgerError> {
        let activity = self
            .store
            .get_account_activity(Bound::Unbounded, Bound::Included(as_of))?;
        let mut rows: Vec<StatementRow> = activity
            .into_iter()
            .map(|a| StatementRow {
                account_type: a.account_type,
                code: a.code,
                name: a.name,
                amount: a.debit_total - a.credit_total,
            })
            .collect();
        rows.sort_by(|a, b| (a.account_type, &a.code).cmp(&(b.account_type, &b.code)));
        Ok(BalanceSheet { as_of, rows })
    }

    /// Revenue and expense activity within the period. Row amounts stay
    /// signed like the balance sheet; the totals are reported in their
    /// natural sign (revenue credit-positive, expense debit-positive).
    pub fn profit_and_loss(&self, from: Date, to: Date) -> Result<ProfitAndLoss, LedgerError> {
        let activity = self
            .store
            .get_account_activity(Bound::Included(from), Bound::Included(to))?;
        let mut rows = Vec::new();
        let mut revenue_total = Decimal::ZERO;
        let mut expense_total = Decimal::ZERO;
        for a in activity {
            match a.account_type {
                AccountType::Revenue => revenue_total += a.credit_total - a.debit_total,
                AccountType::Expense => expense_total += a.debit_total - a.credit_total,
                _ => continue,
            }
            rows.push(StatementRow {
                account_type: a.account_type,
                amount: a.debit_total - a.credit_total,
                code: a.code,
                name: a.name,
            });
        }
        rows.sort_by(|a, b| (a.account_type, &a.code).cmp(&(b.account_type, &b.code)));
        Ok(ProfitAndLoss {
            from,
            to,
            rows,
            revenue_total,
            expense_total,
            net_income: revenue_total - expense_total,
        })
    }

    /// Daily inflow/outflow totals over settled transactions in the range.
    pub fn cash_flow(&self, from: Date, to: Date) -> Result<Vec<CashFlowRow>, LedgerError> {
        let transactions = self
            .store
            .get_transactions(Bound::Included(from), Bound::Included(to))?;
        Ok(group_cash_flow(&transactions, day_key))
    }

    /// Monthly inflow/outflow totals over all settled transactions.
    pub fn cash_flow_trend(&self) -> Result<Vec<CashFlowRow>, LedgerError> {
        let transactions = self
            .store
            .get_transactions(Bound::Unbounded, Bound::Unbounded)?;
        Ok(group_cash_flow(&transactions, month_key))
    }

    /// Outstanding base-currency balances of open invoices, split by kind.
    pub fn dashboard_summary(&self) -> Result<DashboardSummary, LedgerError> {
        let invoices = self.store.list_invoices(None)?;
        let mut receivable = Decimal::ZERO;
        let mut payable = Decimal::ZERO;
        for invoice in &invoices {
            if invoice.status == InvoiceStatus::Paid {
                continue;
            }
            match invoice.kind {
                InvoiceKind::Ar => receivable += invoice.outstanding_base(),
                InvoiceKind::Ap => payable += invoice.outstanding_base(),
            }
        }
        Ok(DashboardSummary {
            receivable_outstanding: receivable,
            payable_outstanding: payable,
        })
    }
}

fn group_cash_flow(transactions: &[Transaction], key: fn(Date) -> String) -> Vec<CashFlowRow> {
    let mut buckets: BTreeMap<String, (Decimal, Decimal)> = BTreeMap::new();
    for txn in transactions {
        let bucket = buckets
            .entry(key(txn.txn_date))
            .or_insert((Decimal::ZERO, Decimal::ZERO));
        match txn.direction {
            Direction::In => bucket.0 += txn.amount_base,
            Direction::Out => bucket.1 += txn.amount_base,
        }
    }
    buckets
        .into_iter()
        .map(|(period, (inflow, outflow))| CashFlowRow {
            period,
            inflow,
            outflow,
            net: inflow - outflow,
        })
        .collect()
}

fn day_key(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), d.month() as u8, d.day())
}

fn month_key(d: Date) -> String {
    format!("{:04}-{:02}", d.year(), d.month() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::Month;
    use uuid::Uuid;

    fn txn(direction: Direction, amount: Decimal, date: Date) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            line_id: Uuid::new_v4(),
            txn_date: date,
            direction,
            amount_base: amount,
        }
    }

    fn date(year: i32, month: Month, day: u8) -> Date {
        Date::from_calendar_date(year, month, day).unwrap()
    }

    #[test]
    fn test_cash_flow_groups_by_day() {
        let jan1 = date(2024, Month::January, 1);
        let jan2 = date(2024, Month::January, 2);
        let rows = group_cash_flow(
            &[
                txn(Direction::In, dec!(1000), jan1),
                txn(Direction::Out, dec!(400), jan1),
                txn(Direction::In, dec!(50), jan2),
            ],
            day_key,
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].period, "2024-01-01");
        assert_eq!(rows[0].inflow, dec!(1000));
        assert_eq!(rows[0].outflow, dec!(400));
        assert_eq!(rows[0].net, dec!(600));
        assert_eq!(rows[1].period, "2024-01-02");
        assert_eq!(rows[1].net, dec!(50));
    }

    #[test]
    fn test_trend_groups_by_month_in_order() {
        let rows = group_cash_flow(
            &[
                txn(Direction::In, dec!(10), date(2024, Month::February, 15)),
                txn(Direction::In, dec!(5), date(2024, Month::January, 31)),
                txn(Direction::Out, dec!(3), date(2024, Month::February, 1)),
            ],
            month_key,
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].period, "2024-01");
        assert_eq!(rows[0].net, dec!(5));
        assert_eq!(rows[1].period, "2024-02");
        assert_eq!(rows[1].inflow, dec!(10));
        assert_eq!(rows[1].outflow, dec!(3));
        assert_eq!(rows[1].net, dec!(7));
    }
}
