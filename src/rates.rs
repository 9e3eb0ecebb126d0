//! Date-effective exchange rate resolution.
//!
//! A rate recorded for a date stays effective until a later one replaces
//! it, so lookups take the most recent rate on or before the query date.

use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use serde_json::json;
use time::Date;

use settlebook_core::{ExchangeRate, LedgerStore, RecordRateCommand, StorageError};

use crate::{
    audit::{self, AuditSink},
    error::LedgerError,
};

/// Behavior when no rate exists on or before the requested date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateFallback {
    /// Resolve to 1, so unconfigured currency pairs convert at face value.
    #[default]
    Permissive,
    /// Fail with `RateNotFound`.
    Strict,
}

/// Multiplies an amount by a rate and rounds to 4 decimal places with
/// banker's rounding. All base-currency conversions go through here.
pub fn convert(amount: Decimal, rate: Decimal) -> Decimal {
    (amount * rate).round_dp_with_strategy(4, RoundingStrategy::MidpointNearestEven)
}

#[derive(Clone)]
pub struct RateResolver {
    store: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditSink>,
    fallback: RateFallback,
}

impl RateResolver {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        audit: Arc<dyn AuditSink>,
        fallback: RateFallback,
    ) -> Self {
        Self {
            store,
            audit,
            fallback,
        }
    }

    pub fn list_rates(&self) -> Result<Vec<ExchangeRate>, LedgerError> {
        Ok(self.store.list_rates()?)
    }

    pub fn record_rate(
        &self,
        cmd: RecordRateCommand,
        actor: &str,
    ) -> Result<ExchangeRate, LedgerError> {
        if cmd.base_currency.trim().is_empty() || cmd.target_currency.trim().is_empty() {
            return Err(LedgerError::Validation(
                "currency codes must not be empty".to_string(),
            ));
        }
        if cmd.rate <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "rate must be positive, got {}",
                cmd.rate
            )));
        }
        let rate = ExchangeRate {
            base_currency: cmd.base_currency,
            target_currency: cmd.target_currency,
            rate: cmd.rate,
            rate_date: cmd.rate_date,
        };
        self.store.record_rate(&rate)?;
        tracing::info!(
            base = %rate.base_currency,
            target = %rate.target_currency,
            rate = %rate.rate,
            date = %rate.rate_date,
            "Exchange rate recorded"
        );
        audit::emit(
            self.audit.as_ref(),
            actor,
            "rate.recorded",
            "exchange_rate",
            format!("{}/{}", rate.base_currency, rate.target_currency),
            json!({
                "rate": rate.rate.to_string(),
                "rate_date": rate.rate_date.to_string(),
            }),
        );
        Ok(rate)
    }

    /// Resolves the rate from `base` to `target` effective on `date`.
    ///
    /// Identical currencies resolve to 1 without touching the store. A
    /// missing rate either falls back to 1 (`Permissive`, logged) or fails
    /// (`Strict`).
    pub fn resolve_rate(
        &self,
        base: &str,
        target: &str,
        date: Date,
    ) -> Result<Decimal, LedgerError> {
        if base == target {
            return Ok(Decimal::ONE);
        }
        match self.store.get_rate(base, target, date) {
            Ok(rate) => Ok(rate),
            Err(StorageError::NoRateFound) => match self.fallback {
                RateFallback::Permissive => {
                    tracing::warn!(
                        base,
                        target,
                        date = %date,
                        "No exchange rate found, falling back to 1"
                    );
                    Ok(Decimal::ONE)
                }
                RateFallback::Strict => Err(LedgerError::RateNotFound {
                    base: base.to_string(),
                    target: target.to_string(),
                    date,
                }),
            },
            Err(e) => Err(e.into()),
        }
    }
}
