//! Currency catalog.
//!
//! Holds the set of currency codes accepted for conversion. The set is loaded
//! from a [`CurrencyCatalogSource`] and replaced wholesale on every refresh.
//! Readers clone an `Arc` to the current snapshot, so a refresh never exposes
//! a half-built set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fxwallet_common::CurrencyInfo;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{FxError, FxResult};
use crate::retry::RetryPolicy;

/// Public currency list used when no URL is configured.
pub const DEFAULT_CATALOG_URL: &str =
    "https://cdn.jsdelivr.net/gh/fawazahmed0/currency-api@1/latest/currencies.json";

/// Where the catalog gets its codes from.
#[async_trait]
pub trait CurrencyCatalogSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_codes(&self) -> FxResult<Vec<CurrencyInfo>>;
}

/// Fetches `{ "usd": "US Dollar", ... }` over HTTP.
pub struct HttpCatalogSource {
    client: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpCatalogSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> FxResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FxError::CatalogUnavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_once(&self) -> FxResult<Vec<CurrencyInfo>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FxError::CatalogUnavailable(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FxError::CatalogUnavailable(format!(
                "{} returned {}",
                self.url, status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FxError::CatalogUnavailable(format!("Failed to read body: {}", e)))?;

        parse_catalog(&body)
    }
}

/// Parse a `code -> display name` JSON object.
pub fn parse_catalog(body: &str) -> FxResult<Vec<CurrencyInfo>> {
    let entries: HashMap<String, String> = serde_json::from_str(body)
        .map_err(|e| FxError::CatalogUnavailable(format!("Failed to parse catalog: {}", e)))?;

    Ok(entries
        .into_iter()
        .map(|(code, name)| CurrencyInfo::new(code, name))
        .filter(|info| info.code.is_valid())
        .collect())
}

#[async_trait]
impl CurrencyCatalogSource for HttpCatalogSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_codes(&self) -> FxResult<Vec<CurrencyInfo>> {
        self.retry.run("fetch_catalog", || self.fetch_once()).await
    }
}

/// Fixed list of currencies.
pub struct StaticCatalogSource {
    currencies: Vec<CurrencyInfo>,
}

impl StaticCatalogSource {
    pub fn new(currencies: Vec<CurrencyInfo>) -> Self {
        Self { currencies }
    }

    /// The currencies covered by the default rate table.
    pub fn with_defaults() -> Self {
        Self::new(vec![
            CurrencyInfo::new("USD", "US Dollar"),
            CurrencyInfo::new("EUR", "Euro"),
            CurrencyInfo::new("TRY", "Turkish Lira"),
        ])
    }
}

#[async_trait]
impl CurrencyCatalogSource for StaticCatalogSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_codes(&self) -> FxResult<Vec<CurrencyInfo>> {
        Ok(self.currencies.clone())
    }
}

/// Source that always fails.
#[cfg(any(test, feature = "test-utils"))]
pub struct FailingCatalogSource;

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl CurrencyCatalogSource for FailingCatalogSource {
    fn name(&self) -> &str {
        "failing"
    }

    async fn fetch_codes(&self) -> FxResult<Vec<CurrencyInfo>> {
        Err(FxError::CatalogUnavailable("source offline".to_string()))
    }
}

#[derive(Debug, Default)]
struct CatalogSnapshot {
    /// Upper-cased code -> display name.
    names: HashMap<String, String>,
    loaded_at: Option<DateTime<Utc>>,
}

/// Set of convertible currency codes.
pub struct CurrencyCatalog {
    source: Arc<dyn CurrencyCatalogSource>,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
}

impl CurrencyCatalog {
    /// Create an empty catalog. Call [`refresh`](Self::refresh) to load it.
    pub fn new(source: Arc<dyn CurrencyCatalogSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(Arc::new(CatalogSnapshot::default())),
        }
    }

    /// Reload the catalog from its source.
    ///
    /// On failure the previous snapshot stays in place. An empty result is
    /// treated as a failure.
    pub async fn refresh(&self) -> FxResult<usize> {
        let currencies = self.source.fetch_codes().await?;
        if currencies.is_empty() {
            return Err(FxError::CatalogUnavailable(format!(
                "{} source returned no currencies",
                self.source.name()
            )));
        }

        let names: HashMap<String, String> = currencies
            .into_iter()
            .map(|info| (info.code.code().to_string(), info.name))
            .collect();
        let count = names.len();

        let snapshot = Arc::new(CatalogSnapshot {
            names,
            loaded_at: Some(Utc::now()),
        });
        *self.snapshot.write() = snapshot;

        info!(source = self.source.name(), currencies = count, "Currency catalog refreshed");
        Ok(count)
    }

    fn current(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Case-insensitive membership check.
    pub fn exists(&self, code: &str) -> bool {
        self.current()
            .names
            .contains_key(&code.trim().to_uppercase())
    }

    /// Display name of a currency.
    pub fn name_of(&self, code: &str) -> Option<String> {
        self.current()
            .names
            .get(&code.trim().to_uppercase())
            .cloned()
    }

    /// All codes, sorted.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.current().names.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub fn len(&self) -> usize {
        self.current().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When the last successful refresh finished.
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.current().loaded_at
    }

    /// Refresh on a fixed interval forever. Failures keep the old snapshot.
    pub async fn run_refresh_loop(&self, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            match self.refresh().await {
                Ok(count) => debug!(currencies = count, "Scheduled catalog refresh done"),
                Err(e) => warn!(error = %e, "Scheduled catalog refresh failed, keeping previous snapshot"),
            }
        }
    }
}
