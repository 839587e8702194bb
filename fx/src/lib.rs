//! FxWallet FX
//!
//! Everything needed to price a conversion before any balance moves:
//!
//! - [`CurrencyCatalog`]: the set of convertible currency codes, refreshed
//!   wholesale from a [`CurrencyCatalogSource`]
//! - [`RateSource`] implementations: a static table, a TTL cache and a
//!   retrying wrapper
//! - [`OfferEngine`]: time-limited, single-use offers
//!
//! # Example
//!
//! ```rust,ignore
//! use fxwallet_fx::{OfferBook, OfferEngine, RateSource, StaticRateSource};
//! use fxwallet_common::{Currency, CurrencyPair, UserId};
//!
//! let rates = StaticRateSource::with_defaults();
//! let pair = CurrencyPair::new(Currency::lira(), Currency::usd());
//! let rate = rates.get_rate(&pair).await?;
//!
//! let offers = OfferEngine::default();
//! let offer = offers.create_offer(UserId::new(1), pair, rate.quoted_rate()).await?;
//! ```

pub mod catalog;
pub mod provider;
pub mod cache;
pub mod retry;
pub mod offer;
pub mod error;

pub use catalog::{
    CurrencyCatalog, CurrencyCatalogSource, HttpCatalogSource, StaticCatalogSource,
    DEFAULT_CATALOG_URL,
};
pub use provider::{ExchangeRate, RateSource, RetryingRateSource, SharedRateSource, StaticRateSource};
pub use cache::{CacheStats, CachedRateSource};
pub use retry::RetryPolicy;
pub use offer::{Offer, OfferBook, OfferEngine, OfferEngineConfig, OfferStats, OfferStatus, SharedOfferBook};
pub use error::{FxError, FxResult};

#[cfg(any(test, feature = "test-utils"))]
pub use catalog::FailingCatalogSource;
#[cfg(any(test, feature = "test-utils"))]
pub use provider::FlakyRateSource;
