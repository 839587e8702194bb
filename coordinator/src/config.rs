//! Coordinator configuration.

use std::time::Duration;

use fxwallet_common::{constants, DurationExt};
use fxwallet_fx::{OfferEngineConfig, RetryPolicy, DEFAULT_CATALOG_URL};
use rust_decimal::Decimal;

/// Offer lifecycle configuration.
#[derive(Debug, Clone)]
pub struct OfferConfig {
    /// How long an offer can be accepted after issuance.
    pub ttl: Duration,
    /// How long expired offers are kept before the sweep removes them.
    pub retention: Duration,
    /// Interval of the offer sweep task.
    pub sweep_interval: Duration,
    /// Maximum outstanding offers per user.
    pub max_offers_per_user: usize,
}

impl Default for OfferConfig {
    fn default() -> Self {
        Self {
            ttl: constants::offer_ttl().as_std(),
            retention: constants::offer_retention().as_std(),
            sweep_interval: constants::offer_sweep_interval().as_std(),
            max_offers_per_user: 100,
        }
    }
}

impl OfferConfig {
    /// Settings for the offer engine.
    pub fn engine_config(&self) -> OfferEngineConfig {
        OfferEngineConfig {
            ttl: chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| constants::offer_ttl()),
            retention: chrono::Duration::from_std(self.retention)
                .unwrap_or_else(|_| constants::offer_retention()),
            max_offers_per_user: self.max_offers_per_user,
        }
    }
}

/// Currency catalog configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Catalog URL. `None` serves the built-in USD/EUR/TRY list.
    pub url: Option<String>,
    /// Interval between scheduled refreshes.
    pub refresh_interval: Duration,
    /// Timeout of a single HTTP request.
    pub request_timeout: Duration,
    /// Retry schedule for a refresh.
    pub retry: RetryPolicy,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: Some(DEFAULT_CATALOG_URL.to_string()),
            refresh_interval: constants::catalog_refresh_interval().as_std(),
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy {
                max_attempts: 4,
                ..RetryPolicy::default()
            },
        }
    }
}

/// Rate source configuration.
#[derive(Debug, Clone)]
pub struct RateConfig {
    /// How long a fetched rate is reused.
    pub cache_ttl: Duration,
    /// Retry schedule for transient provider failures.
    pub retry: RetryPolicy,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Wallet ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// PostgreSQL URL. `None` keeps wallets in memory.
    pub database_url: Option<String>,
    /// Connection pool size.
    pub max_connections: u32,
    /// Opening balance of the registration wallet.
    pub seed_balance: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            seed_balance: Decimal::from(10_000),
        }
    }
}

/// Main coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub offer: OfferConfig,
    pub catalog: CatalogConfig,
    pub rate: RateConfig,
    pub ledger: LedgerConfig,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            offer: OfferConfig::default(),
            catalog: CatalogConfig::default(),
            rate: RateConfig::default(),
            ledger: LedgerConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

impl CoordinatorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_parse::<u64>("FXWALLET_OFFER_TTL_SECS") {
            config.offer.ttl = Duration::from_secs(secs);
        }

        if let Some(seed) = env_parse::<Decimal>("FXWALLET_SEED_BALANCE") {
            config.ledger.seed_balance = seed;
        }

        if let Ok(url) = std::env::var("FXWALLET_CATALOG_URL") {
            config.catalog.url = match url.trim() {
                "" | "static" => None,
                url => Some(url.to_string()),
            };
        }

        if let Some(secs) = env_parse::<u64>("FXWALLET_CATALOG_REFRESH_SECS") {
            config.catalog.refresh_interval = Duration::from_secs(secs);
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                config.ledger.database_url = Some(url);
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.offer.ttl.is_zero() {
            return Err("Offer TTL cannot be 0".to_string());
        }

        if self.offer.ttl > Duration::from_secs(24 * 60 * 60) {
            return Err("Offer TTL cannot exceed one day".to_string());
        }

        if self.offer.sweep_interval.is_zero() {
            return Err("Offer sweep interval cannot be 0".to_string());
        }

        if self.offer.max_offers_per_user == 0 {
            return Err("Offer limit per user cannot be 0".to_string());
        }

        if self.ledger.seed_balance < Decimal::ZERO {
            return Err("Seed balance cannot be negative".to_string());
        }

        if self.ledger.max_connections == 0 {
            return Err("Ledger pool size cannot be 0".to_string());
        }

        if self.catalog.refresh_interval.is_zero() {
            return Err("Catalog refresh interval cannot be 0".to_string());
        }

        if self.catalog.url.as_deref().map(str::is_empty).unwrap_or(false) {
            return Err("Catalog URL cannot be empty".to_string());
        }

        if self.catalog.retry.max_attempts == 0 || self.rate.retry.max_attempts == 0 {
            return Err("Retry attempts cannot be 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.offer.ttl, Duration::from_secs(180));
        assert_eq!(config.ledger.seed_balance, Decimal::from(10_000));
        assert_eq!(config.catalog.url.as_deref(), Some(DEFAULT_CATALOG_URL));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = CoordinatorConfig::default();
        config.offer.ttl = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.ledger.seed_balance = Decimal::from(-1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_config_conversion() {
        let config = OfferConfig {
            ttl: Duration::from_secs(90),
            ..OfferConfig::default()
        };
        let engine = config.engine_config();
        assert_eq!(engine.ttl, chrono::Duration::seconds(90));
        assert_eq!(engine.retention, chrono::Duration::minutes(10));
        assert_eq!(engine.max_offers_per_user, 100);
    }
}
