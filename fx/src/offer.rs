//! Time-limited conversion offers.
//!
//! An offer fixes a quoted rate for one user and one ordered currency pair
//! until its expiry. Offers are single use: the coordinator claims an offer
//! (`Issued -> Accepting`) before moving balances, then completes or releases
//! the claim depending on the ledger result.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;
use fxwallet_common::{constants, Clock, CurrencyPair, OfferId, SystemClock, Timestamp, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FxError, FxResult};

/// Lifecycle status of an offer. Expiry is derived from the clock, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferStatus {
    /// Open for acceptance until expiry.
    Issued,
    /// Claimed by an acceptance whose ledger commit is running.
    Accepting,
    /// Consumed.
    Accepted,
}

/// A quoted rate reserved for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Unique offer ID.
    pub id: OfferId,
    /// User the offer was issued to.
    pub user_id: UserId,
    /// Source and destination currencies.
    pub pair: CurrencyPair,
    /// Base rate plus markup at issuance.
    pub quoted_rate: Decimal,
    /// When the offer was issued.
    pub created_at: Timestamp,
    /// Last instant at which the offer can be accepted.
    pub expires_at: Timestamp,
    /// Current status.
    pub status: OfferStatus,
}

impl Offer {
    fn issue(user_id: UserId, pair: CurrencyPair, quoted_rate: Decimal, now: Timestamp, ttl: Duration) -> Self {
        Self {
            id: OfferId::new(),
            user_id,
            pair,
            quoted_rate,
            created_at: now,
            expires_at: now + ttl,
            status: OfferStatus::Issued,
        }
    }

    /// Strictly after `expires_at`. An offer is still good at its expiry instant.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    /// Counts against the per-user limit.
    pub fn is_outstanding_at(&self, now: Timestamp) -> bool {
        self.status == OfferStatus::Accepting
            || (self.status == OfferStatus::Issued && !self.is_expired_at(now))
    }

    /// Check the offer can be accepted by `requester` at `now`.
    ///
    /// Order: ownership, then expiry, then single use.
    pub fn validate_for(&self, requester: UserId, now: Timestamp) -> FxResult<()> {
        if self.user_id != requester {
            return Err(FxError::OfferOwnershipMismatch {
                offer_id: self.id,
                user_id: requester,
            });
        }
        if self.is_expired_at(now) {
            return Err(FxError::OfferExpired(self.id));
        }
        if self.status != OfferStatus::Issued {
            return Err(FxError::OfferAlreadyConsumed(self.id));
        }
        Ok(())
    }
}

/// Offer store.
#[async_trait]
pub trait OfferBook: Send + Sync {
    /// Issue an offer expiring one TTL from now.
    async fn create_offer(
        &self,
        user_id: UserId,
        pair: CurrencyPair,
        quoted_rate: Decimal,
    ) -> FxResult<Offer>;

    /// Fails with `OfferNotFound`.
    async fn get_offer(&self, id: OfferId) -> FxResult<Offer>;

    /// Re-validate and move `Issued -> Accepting` in one step.
    async fn claim(&self, id: OfferId, requester: UserId, now: Timestamp) -> FxResult<Offer>;

    /// `Accepting -> Accepted`.
    async fn complete(&self, id: OfferId) -> FxResult<Offer>;

    /// `Accepting -> Issued`, after a failed ledger commit.
    async fn release(&self, id: OfferId) -> FxResult<()>;

    /// Drop offers that can never be accepted again. Returns how many.
    async fn cleanup_expired(&self, now: Timestamp) -> usize;

    fn validate(&self, offer: &Offer, requester: UserId, now: Timestamp) -> FxResult<()> {
        offer.validate_for(requester, now)
    }
}

/// Offer book shared between components.
pub type SharedOfferBook = Arc<dyn OfferBook>;

/// Configuration for the in-memory offer engine.
#[derive(Debug, Clone)]
pub struct OfferEngineConfig {
    /// Offer lifetime.
    pub ttl: Duration,
    /// How long an expired, unconsumed offer is kept so late acceptances
    /// still report `OfferExpired`.
    pub retention: Duration,
    /// Maximum outstanding offers per user.
    pub max_offers_per_user: usize,
}

impl Default for OfferEngineConfig {
    fn default() -> Self {
        Self {
            ttl: constants::offer_ttl(),
            retention: constants::offer_retention(),
            max_offers_per_user: 100,
        }
    }
}

/// In-memory offer book.
pub struct OfferEngine {
    offers: DashMap<OfferId, Offer>,
    /// Index: user -> offer ids.
    offers_by_user: DashMap<UserId, Vec<OfferId>>,
    config: OfferEngineConfig,
    clock: Arc<dyn Clock>,
}

impl OfferEngine {
    pub fn new(config: OfferEngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: OfferEngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            offers: DashMap::new(),
            offers_by_user: DashMap::new(),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &OfferEngineConfig {
        &self.config
    }

    fn count_outstanding(&self, ids: &[OfferId], now: Timestamp) -> usize {
        ids.iter()
            .filter(|id| {
                self.offers
                    .get(id)
                    .map(|offer| offer.is_outstanding_at(now))
                    .unwrap_or(false)
            })
            .count()
    }

    /// Outstanding offers of a user.
    pub fn offers_for(&self, user_id: UserId) -> Vec<Offer> {
        let now = self.clock.now();
        let ids: Vec<OfferId> = self
            .offers_by_user
            .get(&user_id)
            .map(|ids| ids.clone())
            .unwrap_or_default();

        ids.iter()
            .filter_map(|id| self.offers.get(id).map(|offer| offer.clone()))
            .filter(|offer| offer.is_outstanding_at(now))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    pub fn stats(&self) -> OfferStats {
        let now = self.clock.now();
        let mut stats = OfferStats::default();
        for entry in self.offers.iter() {
            stats.total += 1;
            match entry.status {
                OfferStatus::Accepted => stats.accepted += 1,
                OfferStatus::Accepting => stats.accepting += 1,
                OfferStatus::Issued if entry.is_expired_at(now) => stats.expired += 1,
                OfferStatus::Issued => stats.issued += 1,
            }
        }
        stats
    }
}

impl Default for OfferEngine {
    fn default() -> Self {
        Self::new(OfferEngineConfig::default())
    }
}

#[async_trait]
impl OfferBook for OfferEngine {
    async fn create_offer(
        &self,
        user_id: UserId,
        pair: CurrencyPair,
        quoted_rate: Decimal,
    ) -> FxResult<Offer> {
        let now = self.clock.now();
        // The user's index entry stays locked until the offer is recorded.
        let mut ids = self.offers_by_user.entry(user_id).or_default();
        if self.count_outstanding(&ids, now) >= self.config.max_offers_per_user {
            return Err(FxError::OfferLimitReached(user_id));
        }

        let offer = Offer::issue(user_id, pair, quoted_rate, now, self.config.ttl);
        info!(
            offer_id = %offer.id,
            user_id = %user_id,
            pair = %offer.pair,
            quoted_rate = %offer.quoted_rate,
            expires_at = %offer.expires_at,
            "Offer issued"
        );

        self.offers.insert(offer.id, offer.clone());
        ids.push(offer.id);
        Ok(offer)
    }

    async fn get_offer(&self, id: OfferId) -> FxResult<Offer> {
        self.offers
            .get(&id)
            .map(|offer| offer.clone())
            .ok_or(FxError::OfferNotFound(id))
    }

    async fn claim(&self, id: OfferId, requester: UserId, now: Timestamp) -> FxResult<Offer> {
        let mut offer = self.offers.get_mut(&id).ok_or(FxError::OfferNotFound(id))?;
        offer.validate_for(requester, now)?;
        offer.status = OfferStatus::Accepting;
        debug!(offer_id = %id, "Offer claimed");
        Ok(offer.clone())
    }

    async fn complete(&self, id: OfferId) -> FxResult<Offer> {
        let mut offer = self.offers.get_mut(&id).ok_or(FxError::OfferNotFound(id))?;
        if offer.status != OfferStatus::Accepting {
            return Err(FxError::InvalidTransition {
                offer_id: id,
                status: offer.status,
            });
        }
        offer.status = OfferStatus::Accepted;
        info!(offer_id = %id, "Offer accepted");
        Ok(offer.clone())
    }

    async fn release(&self, id: OfferId) -> FxResult<()> {
        let mut offer = self.offers.get_mut(&id).ok_or(FxError::OfferNotFound(id))?;
        if offer.status != OfferStatus::Accepting {
            return Err(FxError::InvalidTransition {
                offer_id: id,
                status: offer.status,
            });
        }
        offer.status = OfferStatus::Issued;
        debug!(offer_id = %id, "Offer claim released");
        Ok(())
    }

    async fn cleanup_expired(&self, now: Timestamp) -> usize {
        let retention = self.config.retention;
        let stale: Vec<(OfferId, UserId)> = self
            .offers
            .iter()
            .filter(|entry| match entry.status {
                OfferStatus::Accepted => entry.is_expired_at(now),
                OfferStatus::Issued => now > entry.expires_at + retention,
                OfferStatus::Accepting => false,
            })
            .map(|entry| (*entry.key(), entry.user_id))
            .collect();

        let mut removed = 0;
        for (id, user_id) in stale {
            if self.offers.remove(&id).is_some() {
                removed += 1;
                if let Some(mut ids) = self.offers_by_user.get_mut(&user_id) {
                    ids.retain(|other| *other != id);
                }
            }
        }
        self.offers_by_user.retain(|_, ids| !ids.is_empty());
        removed
    }
}

/// Offer counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferStats {
    pub total: usize,
    pub issued: usize,
    pub accepting: usize,
    pub accepted: usize,
    pub expired: usize,
}
