//! Exchange rate sources.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use fxwallet_common::{Currency, CurrencyPair};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FxError, FxResult};
use crate::retry::RetryPolicy;

/// Base rate and markup for an ordered currency pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Ordered pair (from, to).
    pub pair: CurrencyPair,
    /// Reference rate.
    pub base_rate: Decimal,
    /// Additive markup on top of the base rate.
    pub markup_rate: Decimal,
}

impl ExchangeRate {
    /// Create a rate. Both components must be non-negative.
    pub fn new(pair: CurrencyPair, base_rate: Decimal, markup_rate: Decimal) -> FxResult<Self> {
        for value in [base_rate, markup_rate] {
            if value < Decimal::ZERO {
                return Err(FxError::NegativeRate { pair, value });
            }
        }
        Ok(Self {
            pair,
            base_rate,
            markup_rate,
        })
    }

    /// Rate offered to the user: `base_rate + markup_rate`.
    pub fn quoted_rate(&self) -> Decimal {
        self.base_rate + self.markup_rate
    }
}

/// Supplies exchange rates.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Source name for logs.
    fn name(&self) -> &str;

    /// Rate for an ordered pair. Fails with `RateNotFound` if none is configured.
    async fn get_rate(&self, pair: &CurrencyPair) -> FxResult<ExchangeRate>;
}

/// Rate source shared between components.
pub type SharedRateSource = Arc<dyn RateSource>;

/// `(from, to, base mantissa, base scale, markup mantissa, markup scale)`
const DEFAULT_RATES: &[(&str, &str, i64, u32, i64, u32)] = &[
    ("TRY", "USD", 54, 3, 9, 3),
    ("USD", "TRY", 1863, 2, 3, 1),
    ("USD", "EUR", 96, 2, 3, 1),
    ("EUR", "USD", 104, 2, 2, 1),
    ("TRY", "EUR", 52, 3, 7, 3),
    ("EUR", "TRY", 1936, 2, 2, 1),
];

/// In-memory rate table.
pub struct StaticRateSource {
    rates: DashMap<CurrencyPair, ExchangeRate>,
}

impl StaticRateSource {
    /// Empty table.
    pub fn new() -> Self {
        Self {
            rates: DashMap::new(),
        }
    }

    /// Table seeded with the default TRY/USD/EUR rates.
    pub fn with_defaults() -> Self {
        let source = Self::new();
        for &(from, to, base, base_scale, markup, markup_scale) in DEFAULT_RATES {
            let pair = CurrencyPair::new(Currency::new(from), Currency::new(to));
            source.rates.insert(
                pair.clone(),
                ExchangeRate {
                    pair,
                    base_rate: Decimal::new(base, base_scale),
                    markup_rate: Decimal::new(markup, markup_scale),
                },
            );
        }
        source
    }

    /// Insert or replace the rate for a pair.
    pub fn set_rate(
        &self,
        pair: CurrencyPair,
        base_rate: Decimal,
        markup_rate: Decimal,
    ) -> FxResult<()> {
        let rate = ExchangeRate::new(pair.clone(), base_rate, markup_rate)?;
        debug!(pair = %pair, base = %base_rate, markup = %markup_rate, "Rate set");
        self.rates.insert(pair, rate);
        Ok(())
    }

    pub fn remove_rate(&self, pair: &CurrencyPair) -> Option<ExchangeRate> {
        self.rates.remove(pair).map(|(_, rate)| rate)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl Default for StaticRateSource {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn get_rate(&self, pair: &CurrencyPair) -> FxResult<ExchangeRate> {
        self.rates
            .get(pair)
            .map(|rate| rate.clone())
            .ok_or_else(|| FxError::RateNotFound(pair.clone()))
    }
}

/// Retries transient failures of an inner source.
pub struct RetryingRateSource {
    inner: SharedRateSource,
    policy: RetryPolicy,
}

impl RetryingRateSource {
    pub fn new(inner: SharedRateSource, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl RateSource for RetryingRateSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get_rate(&self, pair: &CurrencyPair) -> FxResult<ExchangeRate> {
        self.policy
            .run("get_rate", || self.inner.get_rate(pair))
            .await
    }
}

/// Rate source that fails a fixed number of times before delegating.
#[cfg(any(test, feature = "test-utils"))]
pub struct FlakyRateSource {
    inner: SharedRateSource,
    failures_remaining: std::sync::atomic::AtomicU32,
    calls: std::sync::atomic::AtomicU32,
}

#[cfg(any(test, feature = "test-utils"))]
impl FlakyRateSource {
    pub fn new(inner: SharedRateSource, failures: u32) -> Self {
        Self {
            inner,
            failures_remaining: std::sync::atomic::AtomicU32::new(failures),
            calls: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Number of `get_rate` calls seen.
    pub fn calls(&self) -> u32 {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for FlakyRateSource {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn get_rate(&self, pair: &CurrencyPair) -> FxResult<ExchangeRate> {
        use std::sync::atomic::Ordering;

        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FxError::ProviderUnavailable("connection reset".to_string()));
        }
        self.inner.get_rate(pair).await
    }
}
