//! FxWallet Coordinator
//!
//! Ties the currency catalog, rate sources, offer book and wallet ledger
//! together behind the quote and accept operations, and owns the background
//! tasks that keep the catalog fresh and sweep expired offers.

pub mod coordinator;
pub mod config;
pub mod state;
pub mod metrics;

pub use coordinator::{ConversionCoordinator, OfferQuote};
pub use config::{CatalogConfig, CoordinatorConfig, LedgerConfig, OfferConfig, RateConfig};
pub use state::CoordinatorState;
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
