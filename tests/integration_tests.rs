use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::{Date, Month};
use uuid::Uuid;

use settlebook::audit::{AuditError, AuditEvent, AuditSink, MemoryAuditSink};
use settlebook::{
    Account, AccountRegistry, AccountType, CreateAccountCommand, CreateEntryCommand,
    CreateInvoiceCommand, Direction, EntryStatus, InvoiceKind, InvoiceLedger, InvoiceStatus,
    JournalEngine, JournalEntry, LedgerError, LedgerStore, LineCommand, MemoryLedgerStore,
    PaymentProcessor, RateFallback, RateResolver, RecordPaymentCommand, RecordRateCommand,
    SqliteLedgerStore, StatementAggregator,
};

struct TestLedger {
    store: Arc<dyn LedgerStore>,
    audit: Arc<MemoryAuditSink>,
    accounts: AccountRegistry,
    rates: RateResolver,
    journal: JournalEngine,
    invoices: InvoiceLedger,
    payments: PaymentProcessor,
    reports: StatementAggregator,
}

fn compose(store: Arc<dyn LedgerStore>, fallback: RateFallback) -> TestLedger {
    let audit = Arc::new(MemoryAuditSink::new());
    let sink: Arc<dyn AuditSink> = audit.clone();
    let rates = RateResolver::new(store.clone(), sink.clone(), fallback);
    TestLedger {
        accounts: AccountRegistry::new(store.clone(), sink.clone(), "INR"),
        journal: JournalEngine::new(store.clone(), sink.clone()),
        invoices: InvoiceLedger::new(store.clone(), rates.clone(), sink.clone(), "INR"),
        payments: PaymentProcessor::new(store.clone(), rates.clone(), sink, "INR"),
        reports: StatementAggregator::new(store.clone()),
        rates,
        store,
        audit,
    }
}

fn setup() -> TestLedger {
    compose(Arc::new(MemoryLedgerStore::new()), RateFallback::Permissive)
}

fn setup_sqlite() -> TestLedger {
    compose(
        Arc::new(SqliteLedgerStore::new(":memory:").unwrap()),
        RateFallback::Permissive,
    )
}

fn date(year: i32, month: Month, day: u8) -> Date {
    Date::from_calendar_date(year, month, day).unwrap()
}

fn create_account(ledger: &TestLedger, code: &str, account_type: AccountType) -> Account {
    ledger
        .accounts
        .create_account(
            CreateAccountCommand {
                code: code.to_string(),
                name: code.to_string(),
                account_type,
                parent_account_id: None,
                currency: None,
            },
            "tester",
        )
        .unwrap()
}

fn balanced_entry(
    ledger: &TestLedger,
    entry_date: Date,
    debit_account: Uuid,
    credit_account: Uuid,
    amount: Decimal,
) -> JournalEntry {
    ledger
        .journal
        .create_entry(
            CreateEntryCommand {
                date: entry_date,
                description: "entry".to_string(),
                lines: vec![
                    LineCommand {
                        account_id: debit_account,
                        debit: amount,
                        credit: Decimal::ZERO,
                    },
                    LineCommand {
                        account_id: credit_account,
                        debit: Decimal::ZERO,
                        credit: amount,
                    },
                ],
            },
            "tester",
        )
        .unwrap()
}

fn invoice_cmd(
    number: &str,
    kind: InvoiceKind,
    currency: &str,
    amount: Decimal,
    issue_day: u8,
) -> CreateInvoiceCommand {
    CreateInvoiceCommand {
        invoice_number: number.to_string(),
        kind,
        customer_id: Some("CUST-1".to_string()),
        vendor_id: None,
        project_id: None,
        issue_date: date(2024, Month::April, issue_day),
        due_date: date(2024, Month::May, 31),
        currency: currency.to_string(),
        amount,
    }
}

fn record_usd_inr_rate(ledger: &TestLedger, day: u8, rate: Decimal) {
    ledger
        .rates
        .record_rate(
            RecordRateCommand {
                base_currency: "USD".to_string(),
                target_currency: "INR".to_string(),
                rate,
                rate_date: date(2024, Month::April, day),
            },
            "tester",
        )
        .unwrap();
}

fn approval_scenario(ledger: &TestLedger) {
    let cash = create_account(ledger, "1000", AccountType::Asset);
    let revenue = create_account(ledger, "4000", AccountType::Revenue);

    let entry_date = date(2024, Month::January, 15);
    let entry = balanced_entry(ledger, entry_date, cash.id, revenue.id, dec!(1000));
    assert_eq!(entry.status, EntryStatus::Draft);
    assert!(ledger.journal.list_transactions().unwrap().is_empty());

    let (approved, transactions) = ledger.journal.approve_entry(entry.id, "approver").unwrap();
    assert_eq!(approved.status, EntryStatus::Approved);
    assert_eq!(approved.approved_by.as_deref(), Some("approver"));
    assert_eq!(transactions.len(), 2);

    let (_, lines) = ledger.journal.get_entry(entry.id).unwrap();
    let inflow = transactions
        .iter()
        .find(|t| t.direction == Direction::In)
        .unwrap();
    let outflow = transactions
        .iter()
        .find(|t| t.direction == Direction::Out)
        .unwrap();
    assert_eq!(inflow.amount_base, dec!(1000));
    assert_eq!(inflow.line_id, lines[0].id, "debit line settles inward");
    assert_eq!(outflow.amount_base, dec!(1000));
    assert_eq!(outflow.line_id, lines[1].id, "credit line settles outward");
    assert!(transactions.iter().all(|t| t.txn_date == entry_date));
}

fn settlement_scenario(ledger: &TestLedger) {
    record_usd_inr_rate(ledger, 1, dec!(80));
    record_usd_inr_rate(ledger, 9, dec!(82));

    let invoice = ledger
        .invoices
        .create_invoice(invoice_cmd("INV-1001", InvoiceKind::Ar, "USD", dec!(10000), 1), "tester")
        .unwrap();
    assert_eq!(invoice.amount_base, dec!(800000));
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.paid_amount_base, Decimal::ZERO);

    // First payment converts at the April 9 rate, which is still effective
    // on April 10.
    let (payment, updated) = ledger
        .payments
        .record_payment(
            RecordPaymentCommand {
                invoice_id: invoice.id,
                payment_date: date(2024, Month::April, 10),
                amount: dec!(5000),
                currency: "USD".to_string(),
                method: "wire".to_string(),
                reference_number: Some("REF-1".to_string()),
            },
            "tester",
        )
        .unwrap();
    assert_eq!(payment.amount_base, dec!(410000));
    assert_eq!(updated.paid_amount_base, dec!(410000));
    assert_eq!(updated.status, InvoiceStatus::PartiallyPaid);

    let (_, updated) = ledger
        .payments
        .record_payment(
            RecordPaymentCommand {
                invoice_id: invoice.id,
                payment_date: date(2024, Month::April, 15),
                amount: dec!(5000),
                currency: "USD".to_string(),
                method: "wire".to_string(),
                reference_number: Some("REF-2".to_string()),
            },
            "tester",
        )
        .unwrap();
    assert_eq!(updated.paid_amount_base, dec!(820000));
    assert_eq!(updated.status, InvoiceStatus::Paid);

    let stored = ledger.invoices.get_invoice(invoice.id).unwrap();
    assert_eq!(stored, updated);
    assert_eq!(ledger.payments.list_payments(invoice.id).unwrap().len(), 2);
}

#[test]
fn test_balanced_entry_approval_settles_transactions() {
    let ledger = setup();
    approval_scenario(&ledger);
}

#[test]
fn test_unbalanced_entry_is_rejected_without_side_effects() {
    let ledger = setup();
    let cash = create_account(&ledger, "1000", AccountType::Asset);
    let revenue = create_account(&ledger, "4000", AccountType::Revenue);

    let err = ledger
        .journal
        .create_entry(
            CreateEntryCommand {
                date: date(2024, Month::January, 15),
                description: "does not balance".to_string(),
                lines: vec![
                    LineCommand {
                        account_id: cash.id,
                        debit: dec!(1000),
                        credit: Decimal::ZERO,
                    },
                    LineCommand {
                        account_id: revenue.id,
                        debit: Decimal::ZERO,
                        credit: dec!(999),
                    },
                ],
            },
            "tester",
        )
        .unwrap_err();
    match err {
        LedgerError::Unbalanced { debits, credits } => {
            assert_eq!(debits, dec!(1000));
            assert_eq!(credits, dec!(999));
        }
        other => panic!("expected Unbalanced, got {other:?}"),
    }
    assert!(ledger.journal.list_entries().unwrap().is_empty());
}

#[test]
fn test_second_approval_never_settles_twice() {
    let ledger = setup();
    let cash = create_account(&ledger, "1000", AccountType::Asset);
    let revenue = create_account(&ledger, "4000", AccountType::Revenue);
    let entry = balanced_entry(
        &ledger,
        date(2024, Month::January, 15),
        cash.id,
        revenue.id,
        dec!(1000),
    );

    ledger.journal.approve_entry(entry.id, "approver").unwrap();
    let err = ledger.journal.approve_entry(entry.id, "approver").unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));
    assert_eq!(ledger.journal.list_transactions().unwrap().len(), 2);
}

#[test]
fn test_invoice_settlement_flow() {
    let ledger = setup();
    settlement_scenario(&ledger);
}

#[test]
fn test_overpayment_is_recorded_without_clamping() {
    let ledger = setup();
    let invoice = ledger
        .invoices
        .create_invoice(invoice_cmd("INV-2001", InvoiceKind::Ar, "INR", dec!(500), 1), "tester")
        .unwrap();

    let (_, updated) = ledger
        .payments
        .record_payment(
            RecordPaymentCommand {
                invoice_id: invoice.id,
                payment_date: date(2024, Month::April, 2),
                amount: dec!(600),
                currency: "INR".to_string(),
                method: "cash".to_string(),
                reference_number: None,
            },
            "tester",
        )
        .unwrap();
    assert_eq!(updated.paid_amount_base, dec!(600));
    assert_eq!(updated.status, InvoiceStatus::Paid);
}

#[test]
fn test_delete_account_requires_no_references() {
    let ledger = setup();
    let cash = create_account(&ledger, "1000", AccountType::Asset);
    let revenue = create_account(&ledger, "4000", AccountType::Revenue);
    balanced_entry(
        &ledger,
        date(2024, Month::January, 15),
        cash.id,
        revenue.id,
        dec!(10),
    );

    // Draft lines are enough to pin the account.
    let err = ledger.accounts.delete_account(cash.id, "tester").unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));

    let unused = create_account(&ledger, "9999", AccountType::Expense);
    ledger.accounts.delete_account(unused.id, "tester").unwrap();
    let err = ledger.accounts.get_account(unused.id).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[test]
fn test_strict_mode_makes_missing_rates_hard_failures() {
    let strict = compose(Arc::new(MemoryLedgerStore::new()), RateFallback::Strict);
    let err = strict
        .invoices
        .create_invoice(invoice_cmd("INV-3001", InvoiceKind::Ar, "GBP", dec!(100), 1), "tester")
        .unwrap_err();
    assert!(matches!(err, LedgerError::RateNotFound { .. }));

    // The permissive default converts at 1 instead.
    let permissive = setup();
    let invoice = permissive
        .invoices
        .create_invoice(invoice_cmd("INV-3002", InvoiceKind::Ar, "GBP", dec!(100), 1), "tester")
        .unwrap();
    assert_eq!(invoice.amount_base, dec!(100));
}

#[test]
fn test_balance_sheet_and_profit_and_loss() {
    let ledger = setup();
    let cash = create_account(&ledger, "1000", AccountType::Asset);
    let revenue = create_account(&ledger, "4000", AccountType::Revenue);
    let rent = create_account(&ledger, "5000", AccountType::Expense);

    let sale = balanced_entry(
        &ledger,
        date(2024, Month::January, 15),
        cash.id,
        revenue.id,
        dec!(1000),
    );
    ledger.journal.approve_entry(sale.id, "approver").unwrap();

    let expense = balanced_entry(
        &ledger,
        date(2024, Month::February, 1),
        rent.id,
        cash.id,
        dec!(300),
    );
    ledger.journal.approve_entry(expense.id, "approver").unwrap();

    // Draft entries never show up in statements.
    balanced_entry(
        &ledger,
        date(2024, Month::February, 2),
        cash.id,
        revenue.id,
        dec!(999),
    );

    let sheet = ledger
        .reports
        .balance_sheet(date(2024, Month::February, 28))
        .unwrap();
    assert_eq!(sheet.rows.len(), 3);
    assert_eq!(sheet.rows[0].code, "1000");
    assert_eq!(sheet.rows[0].account_type, AccountType::Asset);
    assert_eq!(sheet.rows[0].amount, dec!(700));
    assert_eq!(sheet.rows[1].code, "4000");
    assert_eq!(sheet.rows[1].amount, dec!(-1000));
    assert_eq!(sheet.rows[2].code, "5000");
    assert_eq!(sheet.rows[2].amount, dec!(300));

    let earlier = ledger
        .reports
        .balance_sheet(date(2024, Month::January, 31))
        .unwrap();
    assert_eq!(earlier.rows.len(), 2);
    assert_eq!(earlier.rows[0].amount, dec!(1000));

    let pnl = ledger
        .reports
        .profit_and_loss(date(2024, Month::January, 1), date(2024, Month::February, 28))
        .unwrap();
    assert_eq!(pnl.revenue_total, dec!(1000));
    assert_eq!(pnl.expense_total, dec!(300));
    assert_eq!(pnl.net_income, dec!(700));
    assert_eq!(pnl.rows.len(), 2);
    assert_eq!(pnl.rows[0].account_type, AccountType::Revenue);
    assert_eq!(pnl.rows[0].amount, dec!(-1000));

    let feb_only = ledger
        .reports
        .profit_and_loss(date(2024, Month::February, 1), date(2024, Month::February, 28))
        .unwrap();
    assert_eq!(feb_only.revenue_total, Decimal::ZERO);
    assert_eq!(feb_only.expense_total, dec!(300));
    assert_eq!(feb_only.net_income, dec!(-300));
}

#[test]
fn test_cash_flow_and_trend_views() {
    let ledger = setup();
    let cash = create_account(&ledger, "1000", AccountType::Asset);
    let revenue = create_account(&ledger, "4000", AccountType::Revenue);
    let rent = create_account(&ledger, "5000", AccountType::Expense);

    let sale = balanced_entry(
        &ledger,
        date(2024, Month::January, 15),
        cash.id,
        revenue.id,
        dec!(1000),
    );
    ledger.journal.approve_entry(sale.id, "approver").unwrap();
    let expense = balanced_entry(
        &ledger,
        date(2024, Month::February, 1),
        rent.id,
        cash.id,
        dec!(300),
    );
    ledger.journal.approve_entry(expense.id, "approver").unwrap();

    let flows = ledger
        .reports
        .cash_flow(date(2024, Month::January, 1), date(2024, Month::February, 28))
        .unwrap();
    assert_eq!(flows.len(), 2);
    assert_eq!(flows[0].period, "2024-01-15");
    assert_eq!(flows[0].inflow, dec!(1000));
    assert_eq!(flows[0].outflow, dec!(1000));
    assert_eq!(flows[0].net, Decimal::ZERO);
    assert_eq!(flows[1].period, "2024-02-01");
    assert_eq!(flows[1].inflow, dec!(300));

    let january_only = ledger
        .reports
        .cash_flow(date(2024, Month::January, 1), date(2024, Month::January, 31))
        .unwrap();
    assert_eq!(january_only.len(), 1);

    let trend = ledger.reports.cash_flow_trend().unwrap();
    assert_eq!(trend.len(), 2);
    assert_eq!(trend[0].period, "2024-01");
    assert_eq!(trend[1].period, "2024-02");
    assert_eq!(trend[1].inflow, dec!(300));
    assert_eq!(trend[1].outflow, dec!(300));
}

#[test]
fn test_dashboard_summary_tracks_open_invoices() {
    let ledger = setup();
    let receivable = ledger
        .invoices
        .create_invoice(invoice_cmd("INV-4001", InvoiceKind::Ar, "INR", dec!(1000), 1), "tester")
        .unwrap();
    ledger
        .invoices
        .create_invoice(invoice_cmd("BILL-4002", InvoiceKind::Ap, "INR", dec!(500), 1), "tester")
        .unwrap();
    let settled = ledger
        .invoices
        .create_invoice(invoice_cmd("INV-4003", InvoiceKind::Ar, "INR", dec!(200), 1), "tester")
        .unwrap();

    for (invoice_id, amount) in [(receivable.id, dec!(400)), (settled.id, dec!(200))] {
        ledger
            .payments
            .record_payment(
                RecordPaymentCommand {
                    invoice_id,
                    payment_date: date(2024, Month::April, 5),
                    amount,
                    currency: "INR".to_string(),
                    method: "wire".to_string(),
                    reference_number: None,
                },
                "tester",
            )
            .unwrap();
    }

    let summary = ledger.reports.dashboard_summary().unwrap();
    assert_eq!(summary.receivable_outstanding, dec!(600));
    assert_eq!(summary.payable_outstanding, dec!(500));
}

#[test]
fn test_audit_trail_captures_the_whole_flow() {
    let ledger = setup();
    let cash = create_account(&ledger, "1000", AccountType::Asset);
    let revenue = create_account(&ledger, "4000", AccountType::Revenue);
    let entry = balanced_entry(
        &ledger,
        date(2024, Month::January, 15),
        cash.id,
        revenue.id,
        dec!(1000),
    );
    ledger.journal.approve_entry(entry.id, "approver").unwrap();

    let events = ledger.audit.events();
    let actions: Vec<&str> = events.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(
        actions,
        vec![
            "account.created",
            "account.created",
            "journal.created",
            "journal.approved",
        ]
    );
    let approved = &events[3];
    assert_eq!(approved.actor, "approver");
    assert_eq!(approved.entity_type, "journal_entry");
    assert_eq!(approved.entity_id, entry.id.to_string());
}

#[test]
fn test_failing_audit_sink_never_fails_operations() {
    struct FailingSink;

    impl AuditSink for FailingSink {
        fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
            Err(AuditError::Sink("unavailable".to_string()))
        }
    }

    let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
    let accounts = AccountRegistry::new(store.clone(), Arc::new(FailingSink), "INR");
    let account = accounts
        .create_account(
            CreateAccountCommand {
                code: "1000".to_string(),
                name: "Cash".to_string(),
                account_type: AccountType::Asset,
                parent_account_id: None,
                currency: None,
            },
            "tester",
        )
        .unwrap();
    assert_eq!(store.list_accounts().unwrap(), vec![account]);
}

#[test]
fn test_unit_of_work_rollback() {
    let ledger = setup();
    let tx_id = ledger.store.begin_transaction().unwrap();
    create_account(&ledger, "1000", AccountType::Asset);
    ledger.store.rollback_transaction(tx_id).unwrap();
    assert!(ledger.accounts.list_accounts().unwrap().is_empty());
}

#[test]
fn test_sqlite_balanced_entry_approval() {
    let ledger = setup_sqlite();
    approval_scenario(&ledger);
}

#[test]
fn test_sqlite_invoice_settlement_flow() {
    let ledger = setup_sqlite();
    settlement_scenario(&ledger);
}

#[test]
fn test_sqlite_unit_of_work_rollback() {
    let ledger = setup_sqlite();
    let tx_id = ledger.store.begin_transaction().unwrap();
    create_account(&ledger, "1000", AccountType::Asset);
    ledger.store.rollback_transaction(tx_id).unwrap();
    assert!(ledger.accounts.list_accounts().unwrap().is_empty());
}

mod payment_props {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_paid_amount_accumulates_exactly(cents in prop::collection::vec(1i64..500_000, 1..20)) {
            let ledger = setup();
            let invoice = ledger
                .invoices
                .create_invoice(invoice_cmd("INV-P", InvoiceKind::Ar, "INR", dec!(1000), 1), "tester")
                .unwrap();

            let mut total = Decimal::ZERO;
            for (i, cents) in cents.iter().enumerate() {
                let amount = Decimal::new(*cents, 2);
                let (_, updated) = ledger
                    .payments
                    .record_payment(
                        RecordPaymentCommand {
                            invoice_id: invoice.id,
                            payment_date: date(2024, Month::April, 10),
                            amount,
                            currency: "INR".to_string(),
                            method: "wire".to_string(),
                            reference_number: Some(format!("P-{i}")),
                        },
                        "tester",
                    )
                    .unwrap();
                total += amount;
                prop_assert_eq!(updated.paid_amount_base, total);
                let expected = if total >= invoice.amount_base {
                    InvoiceStatus::Paid
                } else {
                    InvoiceStatus::PartiallyPaid
                };
                prop_assert_eq!(updated.status, expected);
            }
        }
    }
}
