//! Conversion coordinator.
//!
//! Quote: validate both codes against the catalog, require the source wallet,
//! open the destination wallet, price the pair and issue an offer.
//!
//! Accept: validate the offer, pre-check the balance, claim the offer, then
//! apply debit and credit through one ledger commit. A failed commit releases
//! the claim so the offer stays usable until it expires.

use std::sync::Arc;

use chrono::Duration;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use fxwallet_common::{
    Clock, Currency, CurrencyPair, ExchangeError, ExchangeResult, IdentityContext, OfferId,
    SystemClock, Timestamp, UserId, WalletBalance,
};
use fxwallet_fx::{
    CachedRateSource, CurrencyCatalog, CurrencyCatalogSource, HttpCatalogSource, OfferBook,
    OfferEngine, RateSource, RetryingRateSource, SharedOfferBook, SharedRateSource,
    StaticCatalogSource, StaticRateSource,
};
use fxwallet_ledger::{AccountLedger, JournalBatch, LedgerEngine, PgLedger, SharedLedger, Wallet};

use crate::config::CoordinatorConfig;
use crate::metrics::{Metrics, MetricsSnapshot, SharedMetrics};
use crate::state::CoordinatorState;

/// Offer returned to the user by [`ConversionCoordinator::quote`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferQuote {
    pub offer_id: OfferId,
    pub from: Currency,
    pub to: Currency,
    /// Base rate plus markup, fixed for the life of the offer.
    pub quoted_rate: Decimal,
    pub expires_at: Timestamp,
}

/// Orchestrates quotes and acceptances across catalog, rates, offers and ledger.
pub struct ConversionCoordinator {
    config: CoordinatorConfig,
    catalog: Arc<CurrencyCatalog>,
    ledger: SharedLedger,
    rates: SharedRateSource,
    offers: SharedOfferBook,
    clock: Arc<dyn Clock>,
    state: RwLock<CoordinatorState>,
    metrics: SharedMetrics,
    /// Background tasks spawned by `start`.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConversionCoordinator {
    /// Create a coordinator from its collaborators.
    pub fn new(
        config: CoordinatorConfig,
        catalog: Arc<CurrencyCatalog>,
        ledger: SharedLedger,
        rates: SharedRateSource,
        offers: SharedOfferBook,
    ) -> Self {
        Self {
            config,
            catalog,
            ledger,
            rates,
            offers,
            clock: Arc::new(SystemClock),
            state: RwLock::new(CoordinatorState::Starting),
            metrics: Arc::new(Metrics::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Use a different clock for offer validation and sweeping.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build every collaborator from configuration.
    ///
    /// Wallets live in PostgreSQL when a database URL is configured and in
    /// memory otherwise.
    pub async fn from_config(config: CoordinatorConfig) -> ExchangeResult<Self> {
        config
            .validate()
            .map_err(ExchangeError::ConfigurationError)?;

        let catalog_source: Arc<dyn CurrencyCatalogSource> = match &config.catalog.url {
            Some(url) => Arc::new(
                HttpCatalogSource::new(url.clone(), config.catalog.request_timeout)?
                    .with_retry(config.catalog.retry.clone()),
            ),
            None => Arc::new(StaticCatalogSource::with_defaults()),
        };
        let catalog = Arc::new(CurrencyCatalog::new(catalog_source));

        let ledger: SharedLedger = match &config.ledger.database_url {
            Some(url) => Arc::new(PgLedger::connect(url, config.ledger.max_connections).await?),
            None => Arc::new(LedgerEngine::new()),
        };

        let cache_ttl = Duration::from_std(config.rate.cache_ttl)
            .map_err(|e| ExchangeError::ConfigurationError(e.to_string()))?;
        let rates: SharedRateSource = Arc::new(CachedRateSource::new(
            Arc::new(RetryingRateSource::new(
                Arc::new(StaticRateSource::with_defaults()),
                config.rate.retry.clone(),
            )),
            cache_ttl,
        ));

        let offers: SharedOfferBook = Arc::new(OfferEngine::new(config.offer.engine_config()));

        Ok(Self::new(config, catalog, ledger, rates, offers))
    }

    /// Load the catalog and spawn the refresh and sweep tasks.
    #[instrument(skip(self))]
    pub async fn start(&self) -> ExchangeResult<()> {
        if self.state().accepts_requests() {
            return Ok(());
        }
        if self.state().is_terminal() {
            return Err(ExchangeError::CoordinatorUnavailable(
                "coordinator has been stopped".to_string(),
            ));
        }

        info!("Starting conversion coordinator");

        // The refresh task retries on its own schedule.
        if let Err(e) = self.catalog.refresh().await {
            warn!(error = %e, "Initial catalog load failed");
        }

        self.start_background_tasks();
        *self.state.write() = CoordinatorState::Running;

        info!(currencies = self.catalog.len(), "Conversion coordinator started");
        Ok(())
    }

    /// Cancel background tasks and stop accepting requests.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> ExchangeResult<()> {
        info!("Stopping conversion coordinator");
        *self.state.write() = CoordinatorState::ShuttingDown;

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }

        *self.state.write() = CoordinatorState::Stopped;
        info!("Conversion coordinator stopped");
        Ok(())
    }

    /// Get the current coordinator state.
    pub fn state(&self) -> CoordinatorState {
        *self.state.read()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn metrics(&self) -> SharedMetrics {
        Arc::clone(&self.metrics)
    }

    pub fn catalog(&self) -> &CurrencyCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Issue an offer to convert `from` into `to`.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn quote(&self, user_id: UserId, from: &str, to: &str) -> ExchangeResult<OfferQuote> {
        self.ensure_running()?;
        self.metrics.quote_requested();

        match self.issue_quote(user_id, from, to).await {
            Ok(quote) => {
                self.metrics.quote_issued();
                Ok(quote)
            }
            Err(e) => {
                self.metrics.quote_rejected();
                warn!(code = e.error_code(), error = %e, "Quote rejected");
                Err(e)
            }
        }
    }

    /// Accept an offer for `amount` units of its source currency.
    ///
    /// Returns the user's wallets after the conversion.
    #[instrument(skip(self), fields(user_id = %user_id, offer_id = %offer_id, amount = %amount))]
    pub async fn accept(
        &self,
        user_id: UserId,
        offer_id: OfferId,
        amount: Decimal,
    ) -> ExchangeResult<Vec<WalletBalance>> {
        self.ensure_running()?;
        self.metrics.accept_started();

        match self.apply_offer(user_id, offer_id, amount).await {
            Ok(()) => self.metrics.accept_succeeded(),
            Err(e) => {
                self.metrics.accept_failed();
                warn!(code = e.error_code(), error = %e, "Acceptance rejected");
                return Err(e);
            }
        }

        self.ledger.list_wallets(user_id).await
    }

    /// All wallets of a user, ordered by currency code.
    pub async fn list_wallets(&self, user_id: UserId) -> ExchangeResult<Vec<WalletBalance>> {
        self.ensure_running()?;
        self.ledger.list_wallets(user_id).await
    }

    /// Open the registration wallet in the user's chosen currency with the
    /// configured seed balance. Calling it again returns the existing wallet
    /// untouched.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn ensure_default_account(
        &self,
        user_id: UserId,
        currency: &str,
    ) -> ExchangeResult<Wallet> {
        self.ensure_running()?;

        let currency = Currency::new(currency);
        self.require_listed(&currency)?;

        let existed = self.ledger.has_account(user_id, &currency).await?;
        let wallet = self
            .ledger
            .ensure_account(user_id, &currency, self.config.ledger.seed_balance)
            .await?;

        if !existed {
            self.metrics.account_provisioned();
            info!(currency = %currency, balance = %wallet.balance, "Registration wallet opened");
        }
        Ok(wallet)
    }

    pub async fn quote_for(
        &self,
        identity: &dyn IdentityContext,
        from: &str,
        to: &str,
    ) -> ExchangeResult<OfferQuote> {
        self.quote(identity.require_user()?, from, to).await
    }

    pub async fn accept_for(
        &self,
        identity: &dyn IdentityContext,
        offer_id: OfferId,
        amount: Decimal,
    ) -> ExchangeResult<Vec<WalletBalance>> {
        self.accept(identity.require_user()?, offer_id, amount).await
    }

    pub async fn list_wallets_for(
        &self,
        identity: &dyn IdentityContext,
    ) -> ExchangeResult<Vec<WalletBalance>> {
        self.list_wallets(identity.require_user()?).await
    }

    pub async fn ensure_default_account_for(
        &self,
        identity: &dyn IdentityContext,
        currency: &str,
    ) -> ExchangeResult<Wallet> {
        self.ensure_default_account(identity.require_user()?, currency)
            .await
    }

    // --- Private methods ---

    fn ensure_running(&self) -> ExchangeResult<()> {
        let state = self.state();
        if state.accepts_requests() {
            Ok(())
        } else {
            Err(ExchangeError::CoordinatorUnavailable(format!("{:?}", state)))
        }
    }

    fn require_listed(&self, currency: &Currency) -> ExchangeResult<()> {
        if self.catalog.exists(currency.code()) {
            Ok(())
        } else {
            Err(ExchangeError::CurrencyNotFound(currency.code().to_string()))
        }
    }

    async fn issue_quote(&self, user_id: UserId, from: &str, to: &str) -> ExchangeResult<OfferQuote> {
        let from = Currency::new(from);
        let to = Currency::new(to);
        self.require_listed(&from)?;
        self.require_listed(&to)?;
        if from == to {
            return Err(ExchangeError::SameCurrency(from));
        }

        if !self.ledger.has_account(user_id, &from).await? {
            return Err(ExchangeError::account_not_found(user_id, &from));
        }
        self.ledger.ensure_account(user_id, &to, Decimal::ZERO).await?;

        let pair = CurrencyPair::new(from, to);
        let rate = self.rates.get_rate(&pair).await?;
        let offer = self
            .offers
            .create_offer(user_id, pair, rate.quoted_rate())
            .await?;

        Ok(OfferQuote {
            offer_id: offer.id,
            from: offer.pair.from,
            to: offer.pair.to,
            quoted_rate: offer.quoted_rate,
            expires_at: offer.expires_at,
        })
    }

    async fn apply_offer(&self, user_id: UserId, offer_id: OfferId, amount: Decimal) -> ExchangeResult<()> {
        if amount <= Decimal::ZERO {
            return Err(ExchangeError::InvalidAmount(amount));
        }

        let offer = self.offers.get_offer(offer_id).await?;
        let now = self.clock.now();
        self.offers.validate(&offer, user_id, now)?;

        let from = &offer.pair.from;
        let to = &offer.pair.to;
        let available = self.ledger.get_balance(user_id, from).await?;
        if amount > available {
            return Err(ExchangeError::InsufficientBalance {
                required: amount,
                available,
            });
        }

        let credit = amount.checked_mul(offer.quoted_rate).ok_or_else(|| {
            ExchangeError::PersistenceError(format!(
                "credit overflow: {} * {}",
                amount, offer.quoted_rate
            ))
        })?;

        // The balance read may have taken a while.
        self.offers.claim(offer_id, user_id, self.clock.now()).await?;

        let mut batch = JournalBatch::new(offer_id.to_string());
        batch
            .debit(user_id, from.clone(), amount)
            .credit(user_id, to.clone(), credit);

        if let Err(e) = self.ledger.commit(&batch).await {
            if let Err(release_err) = self.offers.release(offer_id).await {
                error!(error = %release_err, "Failed to release offer claim");
            }
            return Err(e);
        }

        self.offers.complete(offer_id).await?;
        info!(
            from = %from,
            to = %to,
            debited = %amount,
            credited = %credit,
            "Conversion applied"
        );
        Ok(())
    }

    fn start_background_tasks(&self) {
        let mut tasks = self.tasks.lock();

        let catalog = Arc::clone(&self.catalog);
        let refresh_interval = self.config.catalog.refresh_interval;
        tasks.push(tokio::spawn(async move {
            catalog.run_refresh_loop(refresh_interval).await;
        }));

        let offers = Arc::clone(&self.offers);
        let clock = Arc::clone(&self.clock);
        let metrics = Arc::clone(&self.metrics);
        let sweep_interval = self.config.offer.sweep_interval;
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::time::sleep(sweep_interval).await;
                let removed = offers.cleanup_expired(clock.now()).await;
                if removed > 0 {
                    metrics.offers_swept(removed as u64);
                    debug!(removed, "Expired offers swept");
                }
            }
        }));
    }
}
