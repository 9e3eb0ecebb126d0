//! SQLite `LedgerStore` backend.
//!
//! The connection sits behind a `Mutex`, so calls are serialized; multi-row
//! operations run inside a savepoint and roll back on early return. Decimals
//! are stored as TEXT to keep them exact, dates as ISO-8601 TEXT, timestamps
//! as unix seconds.

use std::{
    collections::{BTreeMap, HashSet},
    ops::Bound,
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use time::{Date, Month, OffsetDateTime};
use uuid::Uuid;

use settlebook_core::{
    Account, AccountActivity, AccountType, Direction, EntryStatus, ExchangeRate, Invoice,
    InvoiceKind, InvoiceStatus, JournalEntry, JournalLine, LedgerStore, Payment, StorageError,
    Transaction, TransactionId,
};

pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
    tx_counter: AtomicU64,
    active_tx: Mutex<Option<TransactionId>>,
}

impl SqliteLedgerStore {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| StorageError::Other(e.to_string()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let store = Self {
            conn: Mutex::new(conn),
            tx_counter: AtomicU64::new(1),
            active_tx: Mutex::new(None),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                account_type TEXT NOT NULL,
                parent_account_id TEXT,
                currency TEXT NOT NULL,
                FOREIGN KEY (parent_account_id) REFERENCES accounts(id)
            );

            CREATE TABLE IF NOT EXISTS exchange_rates (
                base_currency TEXT NOT NULL,
                target_currency TEXT NOT NULL,
                rate TEXT NOT NULL,
                rate_date TEXT NOT NULL,
                PRIMARY KEY (base_currency, target_currency, rate_date)
            );

            CREATE TABLE IF NOT EXISTS journal_entries (
                id TEXT PRIMARY KEY,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                approved_by TEXT,
                approved_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS journal_lines (
                id TEXT PRIMARY KEY,
                entry_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                debit TEXT NOT NULL,
                credit TEXT NOT NULL,
                FOREIGN KEY (entry_id) REFERENCES journal_entries(id),
                FOREIGN KEY (account_id) REFERENCES accounts(id)
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                line_id TEXT NOT NULL,
                txn_date TEXT NOT NULL,
                direction TEXT NOT NULL,
                amount_base TEXT NOT NULL,
                FOREIGN KEY (line_id) REFERENCES journal_lines(id)
            );

            CREATE TABLE IF NOT EXISTS invoices (
                id TEXT PRIMARY KEY,
                invoice_number TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                customer_id TEXT,
                vendor_id TEXT,
                project_id TEXT,
                issue_date TEXT NOT NULL,
                due_date TEXT NOT NULL,
                currency TEXT NOT NULL,
                amount TEXT NOT NULL,
                amount_base TEXT NOT NULL,
                paid_amount_base TEXT NOT NULL,
                status TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS payments (
                id TEXT PRIMARY KEY,
                invoice_id TEXT NOT NULL,
                payment_date TEXT NOT NULL,
                amount TEXT NOT NULL,
                amount_base TEXT NOT NULL,
                currency TEXT NOT NULL,
                method TEXT NOT NULL,
                reference_number TEXT,
                FOREIGN KEY (invoice_id) REFERENCES invoices(id)
            );

            CREATE INDEX IF NOT EXISTS idx_rates_lookup
                ON exchange_rates(base_currency, target_currency, rate_date);

            CREATE INDEX IF NOT EXISTS idx_lines_entry
                ON journal_lines(entry_id);

            CREATE INDEX IF NOT EXISTS idx_lines_account
                ON journal_lines(account_id);

            CREATE INDEX IF NOT EXISTS idx_transactions_date
                ON transactions(txn_date);

            CREATE INDEX IF NOT EXISTS idx_entries_status_date
                ON journal_entries(status, date);

            CREATE INDEX IF NOT EXISTS idx_payments_invoice
                ON payments(invoice_id);
            ",
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }
}

fn date_to_str(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), d.month() as u8, d.day())
}

fn str_to_date(s: &str) -> Result<Date, StorageError> {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 3 {
        return Err(StorageError::Other(format!("Invalid date: {}", s)));
    }
    let year = parts[0]
        .parse::<i32>()
        .map_err(|e| StorageError::Other(e.to_string()))?;
    let month = parts[1]
        .parse::<u8>()
        .map_err(|e| StorageError::Other(e.to_string()))?;
    let day = parts[2]
        .parse::<u8>()
        .map_err(|e| StorageError::Other(e.to_string()))?;
    let month = Month::try_from(month).map_err(|e| StorageError::Other(e.to_string()))?;
    Date::from_calendar_date(year, month, day).map_err(|e| StorageError::Other(e.to_string()))
}

fn ts_to_datetime(ts: i64) -> Result<OffsetDateTime, StorageError> {
    OffsetDateTime::from_unix_timestamp(ts).map_err(|e| StorageError::Other(e.to_string()))
}

fn parse_uuid(s: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(s).map_err(|e| StorageError::Other(format!("Invalid uuid: {}", e)))
}

fn parse_decimal(s: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(s).map_err(|e| StorageError::Other(format!("Invalid decimal: {}", e)))
}

fn parse_account_type(s: &str) -> Result<AccountType, StorageError> {
    AccountType::parse(s).ok_or_else(|| StorageError::Other(format!("Invalid account type: {}", s)))
}

fn parse_entry_status(s: &str) -> Result<EntryStatus, StorageError> {
    EntryStatus::parse(s).ok_or_else(|| StorageError::Other(format!("Invalid entry status: {}", s)))
}

fn parse_direction(s: &str) -> Result<Direction, StorageError> {
    Direction::parse(s).ok_or_else(|| StorageError::Other(format!("Invalid direction: {}", s)))
}

fn parse_invoice_kind(s: &str) -> Result<InvoiceKind, StorageError> {
    InvoiceKind::parse(s).ok_or_else(|| StorageError::Other(format!("Invalid invoice kind: {}", s)))
}

fn parse_invoice_status(s: &str) -> Result<InvoiceStatus, StorageError> {
    InvoiceStatus::parse(s)
        .ok_or_else(|| StorageError::Other(format!("Invalid invoice status: {}", s)))
}

// Lexicographic comparison is date order for zero-padded ISO dates, so
// open bounds become sentinel strings.
fn date_bounds(from: Bound<Date>, to: Bound<Date>) -> (&'static str, String, &'static str, String) {
    let (from_op, from_str) = match from {
        Bound::Included(d) => (">=", date_to_str(d)),
        Bound::Excluded(d) => (">", date_to_str(d)),
        Bound::Unbounded => (">=", "0000-01-01".to_string()),
    };
    let (to_op, to_str) = match to {
        Bound::Included(d) => ("<=", date_to_str(d)),
        Bound::Excluded(d) => ("<", date_to_str(d)),
        Bound::Unbounded => ("<=", "9999-12-31".to_string()),
    };
    (from_op, from_str, to_op, to_str)
}

type AccountParts = (String, String, String, String, Option<String>, String);
type EntryParts = (
    String,
    String,
    String,
    String,
    String,
    i64,
    Option<String>,
    Option<i64>,
);
type LineParts = (String, String, String, String, String);
type TxnParts = (String, String, String, String, String);
type InvoiceParts = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
);
type PaymentParts = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
);

fn account_from_parts(parts: AccountParts) -> Result<Account, StorageError> {
    let (id, code, name, account_type, parent_account_id, currency) = parts;
    Ok(Account {
        id: parse_uuid(&id)?,
        code,
        name,
        account_type: parse_account_type(&account_type)?,
        parent_account_id: parent_account_id.as_deref().map(parse_uuid).transpose()?,
        currency,
    })
}

fn entry_from_parts(parts: EntryParts) -> Result<JournalEntry, StorageError> {
    let (id, date, description, status, created_by, created_at, approved_by, approved_at) = parts;
    Ok(JournalEntry {
        id: parse_uuid(&id)?,
        date: str_to_date(&date)?,
        description,
        status: parse_entry_status(&status)?,
        created_by,
        created_at: ts_to_datetime(created_at)?,
        approved_by,
        approved_at: approved_at.map(ts_to_datetime).transpose()?,
    })
}

fn line_from_parts(parts: LineParts) -> Result<JournalLine, StorageError> {
    let (id, entry_id, account_id, debit, credit) = parts;
    Ok(JournalLine {
        id: parse_uuid(&id)?,
        entry_id: parse_uuid(&entry_id)?,
        account_id: parse_uuid(&account_id)?,
        debit: parse_decimal(&debit)?,
        credit: parse_decimal(&credit)?,
    })
}

fn txn_from_parts(parts: TxnParts) -> Result<Transaction, StorageError> {
    let (id, line_id, txn_date, direction, amount_base) = parts;
    Ok(Transaction {
        id: parse_uuid(&id)?,
        line_id: parse_uuid(&line_id)?,
        txn_date: str_to_date(&txn_date)?,
        direction: parse_direction(&direction)?,
        amount_base: parse_decimal(&amount_base)?,
    })
}

fn invoice_from_parts(parts: InvoiceParts) -> Result<Invoice, StorageError> {
    let (
        id,
        invoice_number,
        kind,
        customer_id,
        vendor_id,
        project_id,
        issue_date,
        due_date,
        currency,
        amount,
        amount_base,
        paid_amount_base,
        status,
    ) = parts;
    Ok(Invoice {
        id: parse_uuid(&id)?,
        invoice_number,
        kind: parse_invoice_kind(&kind)?,
        customer_id,
        vendor_id,
        project_id,
        issue_date: str_to_date(&issue_date)?,
        due_date: str_to_date(&due_date)?,
        currency,
        amount: parse_decimal(&amount)?,
        amount_base: parse_decimal(&amount_base)?,
        paid_amount_base: parse_decimal(&paid_amount_base)?,
        status: parse_invoice_status(&status)?,
    })
}

fn payment_from_parts(parts: PaymentParts) -> Result<Payment, StorageError> {
    let (id, invoice_id, payment_date, amount, amount_base, currency, method, reference_number) =
        parts;
    Ok(Payment {
        id: parse_uuid(&id)?,
        invoice_id: parse_uuid(&invoice_id)?,
        payment_date: str_to_date(&payment_date)?,
        amount: parse_decimal(&amount)?,
        amount_base: parse_decimal(&amount_base)?,
        currency,
        method,
        reference_number,
    })
}

const SELECT_INVOICE: &str = "SELECT id, invoice_number, kind, customer_id, vendor_id, \
     project_id, issue_date, due_date, currency, amount, amount_base, paid_amount_base, status \
     FROM invoices";

fn read_invoice(row: &rusqlite::Row) -> rusqlite::Result<InvoiceParts> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
    ))
}

fn read_entry(row: &rusqlite::Row) -> rusqlite::Result<EntryParts> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

impl LedgerStore for SqliteLedgerStore {
    fn create_account(&self, account: &Account) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let taken: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM accounts WHERE code = ?1",
                params![account.code],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        if taken {
            return Err(StorageError::DuplicateAccountCode(account.code.clone()));
        }
        conn.execute(
            "INSERT INTO accounts (id, code, name, account_type, parent_account_id, currency)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                account.id.to_string(),
                account.code,
                account.name,
                account.account_type.as_str(),
                account.parent_account_id.map(|id| id.to_string()),
                account.currency,
            ],
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    fn update_account(&self, account: &Account) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let id_str = account.id.to_string();
        // The parent walk and the write share the connection lock, so two
        // racing updates cannot both validate and then close a loop. The
        // visited set keeps the walk finite even over a broken chain.
        let mut seen = HashSet::new();
        let mut cursor = account.parent_account_id.map(|id| id.to_string());
        while let Some(parent_id) = cursor {
            if parent_id == id_str || !seen.insert(parent_id.clone()) {
                return Err(StorageError::AccountCycle(account.id));
            }
            let next: Option<String> = match conn.query_row(
                "SELECT parent_account_id FROM accounts WHERE id = ?1",
                params![parent_id],
                |row| row.get(0),
            ) {
                Ok(next) => next,
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(StorageError::Other(e.to_string())),
            };
            cursor = next;
        }
        let updated = conn
            .execute(
                "UPDATE accounts
                 SET code = ?2, name = ?3, account_type = ?4, parent_account_id = ?5, currency = ?6
                 WHERE id = ?1",
                params![
                    id_str,
                    account.code,
                    account.name,
                    account.account_type.as_str(),
                    account.parent_account_id.map(|id| id.to_string()),
                    account.currency,
                ],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        if updated == 0 {
            return Err(StorageError::AccountNotFound(account.id));
        }
        Ok(())
    }

    fn delete_account(&self, account_id: Uuid) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let id_str = account_id.to_string();
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM accounts WHERE id = ?1",
                params![id_str],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        if !exists {
            return Err(StorageError::AccountNotFound(account_id));
        }
        let referenced: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM journal_lines WHERE account_id = ?1",
                params![id_str],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        if referenced {
            return Err(StorageError::AccountInUse(account_id));
        }
        let has_children: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM accounts WHERE parent_account_id = ?1",
                params![id_str],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        if has_children {
            return Err(StorageError::AccountHasChildren(account_id));
        }
        conn.execute("DELETE FROM accounts WHERE id = ?1", params![id_str])
            .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    fn get_account(&self, account_id: Uuid) -> Result<Account, StorageError> {
        let conn = self.conn.lock().unwrap();
        let result: Result<AccountParts, _> = conn.query_row(
            "SELECT id, code, name, account_type, parent_account_id, currency
             FROM accounts WHERE id = ?1",
            params![account_id.to_string()],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        );
        match result {
            Ok(parts) => account_from_parts(parts),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(StorageError::AccountNotFound(account_id))
            }
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    fn list_accounts(&self) -> Result<Vec<Account>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, code, name, account_type, parent_account_id, currency
                 FROM accounts ORDER BY code",
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| -> rusqlite::Result<AccountParts> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let mut accounts = Vec::new();
        for row in rows {
            let parts = row.map_err(|e| StorageError::Other(e.to_string()))?;
            accounts.push(account_from_parts(parts)?);
        }
        Ok(accounts)
    }

    fn account_has_lines(&self, account_id: Uuid) -> Result<bool, StorageError> {
        let conn = self.conn.lock().unwrap();
        let id_str = account_id.to_string();
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM accounts WHERE id = ?1",
                params![id_str],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        if !exists {
            return Err(StorageError::AccountNotFound(account_id));
        }
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM journal_lines WHERE account_id = ?1",
            params![id_str],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::Other(e.to_string()))
    }

    fn record_rate(&self, rate: &ExchangeRate) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO exchange_rates (base_currency, target_currency, rate, rate_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                rate.base_currency,
                rate.target_currency,
                rate.rate.to_string(),
                date_to_str(rate.rate_date),
            ],
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    fn get_rate(&self, base: &str, target: &str, date: Date) -> Result<Decimal, StorageError> {
        let conn = self.conn.lock().unwrap();
        let result: Result<String, _> = conn.query_row(
            "SELECT rate FROM exchange_rates
             WHERE base_currency = ?1 AND target_currency = ?2 AND rate_date <= ?3
             ORDER BY rate_date DESC LIMIT 1",
            params![base, target, date_to_str(date)],
            |row| row.get(0),
        );
        match result {
            Ok(val) => parse_decimal(&val),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(StorageError::NoRateFound),
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    fn list_rates(&self) -> Result<Vec<ExchangeRate>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT base_currency, target_currency, rate, rate_date
                 FROM exchange_rates ORDER BY base_currency, target_currency, rate_date",
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let rows = stmt
            .query_map(
                [],
                |row| -> rusqlite::Result<(String, String, String, String)> {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                },
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let mut rates = Vec::new();
        for row in rows {
            let (base_currency, target_currency, rate, rate_date) =
                row.map_err(|e| StorageError::Other(e.to_string()))?;
            rates.push(ExchangeRate {
                base_currency,
                target_currency,
                rate: parse_decimal(&rate)?,
                rate_date: str_to_date(&rate_date)?,
            });
        }
        Ok(rates)
    }

    fn create_entry(
        &self,
        entry: &JournalEntry,
        lines: &[JournalLine],
    ) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().unwrap();
        let sp = conn
            .savepoint()
            .map_err(|e| StorageError::Other(e.to_string()))?;
        for line in lines {
            let exists: bool = sp
                .query_row(
                    "SELECT COUNT(*) > 0 FROM accounts WHERE id = ?1",
                    params![line.account_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(|e| StorageError::Other(e.to_string()))?;
            if !exists {
                return Err(StorageError::AccountNotFound(line.account_id));
            }
        }
        sp.execute(
            "INSERT INTO journal_entries
                 (id, date, description, status, created_by, created_at, approved_by, approved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id.to_string(),
                date_to_str(entry.date),
                entry.description,
                entry.status.as_str(),
                entry.created_by,
                entry.created_at.unix_timestamp(),
                entry.approved_by,
                entry.approved_at.map(|t| t.unix_timestamp()),
            ],
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;
        for line in lines {
            sp.execute(
                "INSERT INTO journal_lines (id, entry_id, account_id, debit, credit)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    line.id.to_string(),
                    line.entry_id.to_string(),
                    line.account_id.to_string(),
                    line.debit.to_string(),
                    line.credit.to_string(),
                ],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        }
        sp.commit().map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    fn get_entry(&self, entry_id: Uuid) -> Result<JournalEntry, StorageError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT id, date, description, status, created_by, created_at, approved_by, approved_at
             FROM journal_entries WHERE id = ?1",
            params![entry_id.to_string()],
            read_entry,
        );
        match result {
            Ok(parts) => entry_from_parts(parts),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(StorageError::EntryNotFound(entry_id)),
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    fn list_entries(&self) -> Result<Vec<JournalEntry>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, date, description, status, created_by, created_at, approved_by, approved_at
                 FROM journal_entries ORDER BY date, created_at",
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let rows = stmt
            .query_map([], read_entry)
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let mut entries = Vec::new();
        for row in rows {
            let parts = row.map_err(|e| StorageError::Other(e.to_string()))?;
            entries.push(entry_from_parts(parts)?);
        }
        Ok(entries)
    }

    fn get_lines(&self, entry_id: Uuid) -> Result<Vec<JournalLine>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let id_str = entry_id.to_string();
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM journal_entries WHERE id = ?1",
                params![id_str],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        if !exists {
            return Err(StorageError::EntryNotFound(entry_id));
        }
        fetch_lines(&conn, &id_str)
    }

    fn approve_entry(
        &self,
        entry_id: Uuid,
        approved_by: &str,
        approved_at: OffsetDateTime,
    ) -> Result<(JournalEntry, Vec<Transaction>), StorageError> {
        let mut conn = self.conn.lock().unwrap();
        let sp = conn
            .savepoint()
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let id_str = entry_id.to_string();
        let status: String = match sp.query_row(
            "SELECT status FROM journal_entries WHERE id = ?1",
            params![id_str],
            |row| row.get(0),
        ) {
            Ok(s) => s,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(StorageError::EntryNotFound(entry_id))
            }
            Err(e) => return Err(StorageError::Other(e.to_string())),
        };
        if parse_entry_status(&status)? != EntryStatus::Draft {
            return Err(StorageError::EntryNotDraft(entry_id));
        }
        sp.execute(
            "UPDATE journal_entries SET status = ?2, approved_by = ?3, approved_at = ?4
             WHERE id = ?1",
            params![
                id_str,
                EntryStatus::Approved.as_str(),
                approved_by,
                approved_at.unix_timestamp(),
            ],
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;

        let entry = sp
            .query_row(
                "SELECT id, date, description, status, created_by, created_at, approved_by, approved_at
                 FROM journal_entries WHERE id = ?1",
                params![id_str],
                read_entry,
            )
            .map_err(|e| StorageError::Other(e.to_string()))
            .and_then(entry_from_parts)?;

        let lines = fetch_lines(&sp, &id_str)?;
        let mut settled = Vec::with_capacity(lines.len());
        for line in &lines {
            let txn = Transaction::settle(line, entry.date);
            sp.execute(
                "INSERT INTO transactions (id, line_id, txn_date, direction, amount_base)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    txn.id.to_string(),
                    txn.line_id.to_string(),
                    date_to_str(txn.txn_date),
                    txn.direction.as_str(),
                    txn.amount_base.to_string(),
                ],
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
            settled.push(txn);
        }
        sp.commit().map_err(|e| StorageError::Other(e.to_string()))?;
        tracing::debug!(entry_id = %entry_id, transactions = settled.len(), "Journal entry approved");
        Ok((entry, settled))
    }

    fn get_transactions(
        &self,
        from: Bound<Date>,
        to: Bound<Date>,
    ) -> Result<Vec<Transaction>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let (from_op, from_str, to_op, to_str) = date_bounds(from, to);
        let query = format!(
            "SELECT id, line_id, txn_date, direction, amount_base
             FROM transactions
             WHERE txn_date {} ?1 AND txn_date {} ?2
             ORDER BY txn_date, rowid",
            from_op, to_op
        );
        let mut stmt = conn
            .prepare(&query)
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let rows = stmt
            .query_map(
                params![from_str, to_str],
                |row| -> rusqlite::Result<TxnParts> {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let mut transactions = Vec::new();
        for row in rows {
            let parts = row.map_err(|e| StorageError::Other(e.to_string()))?;
            transactions.push(txn_from_parts(parts)?);
        }
        Ok(transactions)
    }

    fn create_invoice(&self, invoice: &Invoice) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let taken: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM invoices WHERE invoice_number = ?1",
                params![invoice.invoice_number],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        if taken {
            return Err(StorageError::DuplicateInvoiceNumber(
                invoice.invoice_number.clone(),
            ));
        }
        conn.execute(
            "INSERT INTO invoices
                 (id, invoice_number, kind, customer_id, vendor_id, project_id, issue_date,
                  due_date, currency, amount, amount_base, paid_amount_base, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                invoice.id.to_string(),
                invoice.invoice_number,
                invoice.kind.as_str(),
                invoice.customer_id,
                invoice.vendor_id,
                invoice.project_id,
                date_to_str(invoice.issue_date),
                date_to_str(invoice.due_date),
                invoice.currency,
                invoice.amount.to_string(),
                invoice.amount_base.to_string(),
                invoice.paid_amount_base.to_string(),
                invoice.status.as_str(),
            ],
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    fn get_invoice(&self, invoice_id: Uuid) -> Result<Invoice, StorageError> {
        let conn = self.conn.lock().unwrap();
        fetch_invoice(&conn, invoice_id)
    }

    fn list_invoices(&self, kind: Option<InvoiceKind>) -> Result<Vec<Invoice>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let query = match kind {
            Some(_) => format!(
                "{} WHERE kind = ?1 ORDER BY issue_date, invoice_number",
                SELECT_INVOICE
            ),
            None => format!("{} ORDER BY issue_date, invoice_number", SELECT_INVOICE),
        };
        let mut stmt = conn
            .prepare(&query)
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let rows = match kind {
            Some(k) => stmt.query_map(params![k.as_str()], read_invoice),
            None => stmt.query_map([], read_invoice),
        }
        .map_err(|e| StorageError::Other(e.to_string()))?;
        let mut invoices = Vec::new();
        for row in rows {
            let parts = row.map_err(|e| StorageError::Other(e.to_string()))?;
            invoices.push(invoice_from_parts(parts)?);
        }
        Ok(invoices)
    }

    fn set_invoice_status(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Invoice, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut invoice = fetch_invoice(&conn, invoice_id)?;
        conn.execute(
            "UPDATE invoices SET status = ?2 WHERE id = ?1",
            params![invoice_id.to_string(), status.as_str()],
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;
        invoice.status = status;
        Ok(invoice)
    }

    fn record_payment(&self, payment: &Payment) -> Result<Invoice, StorageError> {
        let mut conn = self.conn.lock().unwrap();
        let sp = conn
            .savepoint()
            .map_err(|e| StorageError::Other(e.to_string()))?;
        // Paid-to-date is re-read from the stored row inside the savepoint,
        // so concurrent payments against one invoice cannot lose updates.
        let mut invoice = fetch_invoice(&sp, payment.invoice_id)?;
        let new_paid = invoice.paid_amount_base + payment.amount_base;
        invoice.status = invoice.status_after_payment(new_paid);
        invoice.paid_amount_base = new_paid;
        sp.execute(
            "UPDATE invoices SET paid_amount_base = ?2, status = ?3 WHERE id = ?1",
            params![
                invoice.id.to_string(),
                invoice.paid_amount_base.to_string(),
                invoice.status.as_str(),
            ],
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;
        sp.execute(
            "INSERT INTO payments
                 (id, invoice_id, payment_date, amount, amount_base, currency, method, reference_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                payment.id.to_string(),
                payment.invoice_id.to_string(),
                date_to_str(payment.payment_date),
                payment.amount.to_string(),
                payment.amount_base.to_string(),
                payment.currency,
                payment.method,
                payment.reference_number,
            ],
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;
        sp.commit().map_err(|e| StorageError::Other(e.to_string()))?;
        tracing::debug!(
            invoice_id = %payment.invoice_id,
            paid_amount_base = %invoice.paid_amount_base,
            "Payment applied"
        );
        Ok(invoice)
    }

    fn get_payments(&self, invoice_id: Uuid) -> Result<Vec<Payment>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let id_str = invoice_id.to_string();
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM invoices WHERE id = ?1",
                params![id_str],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        if !exists {
            return Err(StorageError::InvoiceNotFound(invoice_id));
        }
        let mut stmt = conn
            .prepare(
                "SELECT id, invoice_id, payment_date, amount, amount_base, currency, method,
                        reference_number
                 FROM payments WHERE invoice_id = ?1 ORDER BY payment_date, rowid",
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let rows = stmt
            .query_map(params![id_str], |row| -> rusqlite::Result<PaymentParts> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let mut payments = Vec::new();
        for row in rows {
            let parts = row.map_err(|e| StorageError::Other(e.to_string()))?;
            payments.push(payment_from_parts(parts)?);
        }
        Ok(payments)
    }

    fn get_account_activity(
        &self,
        from: Bound<Date>,
        to: Bound<Date>,
    ) -> Result<Vec<AccountActivity>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let (from_op, from_str, to_op, to_str) = date_bounds(from, to);
        // Debit and credit columns are summed in Rust rather than with SQL
        // SUM, which would coerce the TEXT decimals to floats.
        let query = format!(
            "SELECT l.account_id, a.code, a.name, a.account_type, l.debit, l.credit
             FROM journal_lines l
             JOIN journal_entries e ON e.id = l.entry_id
             JOIN accounts a ON a.id = l.account_id
             WHERE e.status = 'APPROVED' AND e.date {} ?1 AND e.date {} ?2",
            from_op, to_op
        );
        let mut stmt = conn
            .prepare(&query)
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let rows = stmt
            .query_map(
                params![from_str, to_str],
                |row| -> rusqlite::Result<(String, String, String, String, String, String)> {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let mut totals: BTreeMap<String, AccountActivity> = BTreeMap::new();
        for row in rows {
            let (account_id, code, name, account_type, debit, credit) =
                row.map_err(|e| StorageError::Other(e.to_string()))?;
            let account_id = parse_uuid(&account_id)?;
            let account_type = parse_account_type(&account_type)?;
            let debit = parse_decimal(&debit)?;
            let credit = parse_decimal(&credit)?;
            let activity = totals.entry(code.clone()).or_insert_with(|| AccountActivity {
                account_id,
                code,
                name,
                account_type,
                debit_total: Decimal::ZERO,
                credit_total: Decimal::ZERO,
            });
            activity.debit_total += debit;
            activity.credit_total += credit;
        }
        Ok(totals.into_values().collect())
    }

    fn begin_transaction(&self) -> Result<TransactionId, StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("SAVEPOINT settlebook_tx")
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let tx_id = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        *self.active_tx.lock().unwrap() = Some(tx_id);
        tracing::debug!(tx_id, "SQLite transaction started");
        Ok(tx_id)
    }

    fn commit_transaction(&self, tx_id: TransactionId) -> Result<(), StorageError> {
        let mut active = self.active_tx.lock().unwrap();
        if *active != Some(tx_id) {
            return Err(StorageError::NoActiveTransaction);
        }
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("RELEASE SAVEPOINT settlebook_tx")
            .map_err(|e| StorageError::Other(e.to_string()))?;
        *active = None;
        tracing::debug!(tx_id, "SQLite transaction committed");
        Ok(())
    }

    fn rollback_transaction(&self, tx_id: TransactionId) -> Result<(), StorageError> {
        let mut active = self.active_tx.lock().unwrap();
        if *active != Some(tx_id) {
            return Err(StorageError::NoActiveTransaction);
        }
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("ROLLBACK TO SAVEPOINT settlebook_tx; RELEASE SAVEPOINT settlebook_tx")
            .map_err(|e| StorageError::Other(e.to_string()))?;
        *active = None;
        tracing::debug!(tx_id, "SQLite transaction rolled back");
        Ok(())
    }
}

fn fetch_lines(conn: &Connection, entry_id: &str) -> Result<Vec<JournalLine>, StorageError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, entry_id, account_id, debit, credit
             FROM journal_lines WHERE entry_id = ?1 ORDER BY rowid",
        )
        .map_err(|e| StorageError::Other(e.to_string()))?;
    let rows = stmt
        .query_map(params![entry_id], |row| -> rusqlite::Result<LineParts> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })
        .map_err(|e| StorageError::Other(e.to_string()))?;
    let mut lines = Vec::new();
    for row in rows {
        let parts = row.map_err(|e| StorageError::Other(e.to_string()))?;
        lines.push(line_from_parts(parts)?);
    }
    Ok(lines)
}

fn fetch_invoice(conn: &Connection, invoice_id: Uuid) -> Result<Invoice, StorageError> {
    let query = format!("{} WHERE id = ?1", SELECT_INVOICE);
    let result = conn.query_row(&query, params![invoice_id.to_string()], read_invoice);
    match result {
        Ok(parts) => invoice_from_parts(parts),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(StorageError::InvoiceNotFound(invoice_id)),
        Err(e) => Err(StorageError::Other(e.to_string())),
    }
}
