//! End-to-end quote and accept flows against the in-memory ledger.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use fxwallet_common::{
    Clock, Currency, ExchangeResult, ExchangeError, ManualClock, OfferId, ResolvedIdentity,
    UserId, WalletBalance,
};
use fxwallet_coordinator::{ConversionCoordinator, CoordinatorConfig, CoordinatorState};
use fxwallet_fx::{
    CurrencyCatalog, FailingCatalogSource, OfferBook, OfferEngine, OfferStatus,
    StaticCatalogSource, StaticRateSource,
};
use fxwallet_ledger::{AccountLedger, JournalBatch, JournalEntry, LedgerEngine, Wallet};

struct Harness {
    clock: Arc<ManualClock>,
    ledger: Arc<LedgerEngine>,
    offers: Arc<OfferEngine>,
    coordinator: Arc<ConversionCoordinator>,
}

async fn harness_with(config: CoordinatorConfig) -> Harness {
    let clock = Arc::new(ManualClock::new());
    let ledger = Arc::new(LedgerEngine::new());
    let offers = Arc::new(OfferEngine::with_clock(
        config.offer.engine_config(),
        clock.clone(),
    ));
    let coordinator = ConversionCoordinator::new(
        config,
        Arc::new(CurrencyCatalog::new(Arc::new(StaticCatalogSource::with_defaults()))),
        ledger.clone(),
        Arc::new(StaticRateSource::with_defaults()),
        offers.clone(),
    )
    .with_clock(clock.clone());
    coordinator.start().await.unwrap();

    Harness {
        clock,
        ledger,
        offers,
        coordinator: Arc::new(coordinator),
    }
}

async fn harness() -> Harness {
    harness_with(CoordinatorConfig::default()).await
}

async fn fund(h: &Harness, user: UserId, currency: Currency, amount: Decimal) {
    h.ledger.ensure_account(user, &currency, amount).await.unwrap();
}

async fn balance(h: &Harness, user: UserId, currency: &Currency) -> Decimal {
    h.ledger.get_balance(user, currency).await.unwrap()
}

#[tokio::test]
async fn test_quote_opens_destination_wallet() {
    let h = harness().await;
    let user = UserId::new(1);
    fund(&h, user, Currency::lira(), dec!(150)).await;

    let quote = h.coordinator.quote(user, "try", "usd").await.unwrap();
    assert_eq!(quote.quoted_rate, dec!(0.063));
    assert_eq!(quote.expires_at, h.clock.now() + Duration::minutes(3));

    assert!(h.ledger.has_account(user, &Currency::usd()).await.unwrap());
    assert_eq!(balance(&h, user, &Currency::usd()).await, Decimal::ZERO);

    let offer = h.offers.get_offer(quote.offer_id).await.unwrap();
    assert_eq!(offer.status, OfferStatus::Issued);
    assert_eq!(offer.user_id, user);
}

#[tokio::test]
async fn test_accept_moves_funds_at_quoted_rate() {
    let h = harness().await;
    let user = UserId::new(1);
    fund(&h, user, Currency::lira(), dec!(150)).await;

    let quote = h.coordinator.quote(user, "TRY", "USD").await.unwrap();
    let wallets = h.coordinator.accept(user, quote.offer_id, dec!(100)).await.unwrap();

    assert_eq!(
        wallets,
        vec![
            WalletBalance::new(Currency::lira(), dec!(50)),
            WalletBalance::new(Currency::usd(), dec!(6.3)),
        ]
    );

    let journal = h.ledger.journal_for(user);
    assert_eq!(journal.len(), 2);
    assert!(journal.iter().all(|e| e.reference == quote.offer_id.to_string()));
}

#[tokio::test]
async fn test_offer_is_single_use() {
    let h = harness().await;
    let user = UserId::new(1);
    fund(&h, user, Currency::lira(), dec!(500)).await;

    let quote = h.coordinator.quote(user, "TRY", "EUR").await.unwrap();
    h.coordinator.accept(user, quote.offer_id, dec!(100)).await.unwrap();

    let err = h.coordinator.accept(user, quote.offer_id, dec!(100)).await.unwrap_err();
    assert_eq!(err, ExchangeError::OfferAlreadyConsumed(quote.offer_id));
    assert_eq!(balance(&h, user, &Currency::lira()).await, dec!(400));
    assert_eq!(balance(&h, user, &Currency::eur()).await, dec!(5.9));
}

#[tokio::test]
async fn test_expired_offer_never_applies() {
    let h = harness().await;
    let user = UserId::new(1);
    fund(&h, user, Currency::lira(), dec!(150)).await;

    let quote = h.coordinator.quote(user, "TRY", "USD").await.unwrap();

    // Still valid at the expiry instant.
    h.clock.advance(Duration::minutes(3));
    assert!(h.offers.get_offer(quote.offer_id).await.unwrap().is_outstanding_at(h.clock.now()));

    h.clock.advance(Duration::seconds(1));
    for _ in 0..2 {
        let err = h.coordinator.accept(user, quote.offer_id, dec!(100)).await.unwrap_err();
        assert_eq!(err, ExchangeError::OfferExpired(quote.offer_id));
    }

    assert_eq!(balance(&h, user, &Currency::lira()).await, dec!(150));
    assert_eq!(balance(&h, user, &Currency::usd()).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_unknown_currency_creates_nothing() {
    let h = harness().await;
    let user = UserId::new(1);
    fund(&h, user, Currency::lira(), dec!(150)).await;

    let err = h.coordinator.quote(user, "TRY", "xyz").await.unwrap_err();
    assert_eq!(err, ExchangeError::CurrencyNotFound("XYZ".to_string()));

    assert_eq!(h.ledger.wallet_count(), 1);
    assert!(h.offers.is_empty());
    assert_eq!(h.coordinator.metrics_snapshot().quotes_rejected, 1);
}

#[tokio::test]
async fn test_quote_rejections() {
    let h = harness().await;
    let user = UserId::new(1);
    fund(&h, user, Currency::lira(), dec!(150)).await;

    assert_eq!(
        h.coordinator.quote(user, "usd", "USD").await.unwrap_err(),
        ExchangeError::SameCurrency(Currency::usd())
    );
    assert_eq!(
        h.coordinator.quote(user, "USD", "TRY").await.unwrap_err(),
        ExchangeError::account_not_found(user, &Currency::usd())
    );
    assert!(h.offers.is_empty());
}

#[tokio::test]
async fn test_quote_against_unloaded_catalog() {
    let ledger = Arc::new(LedgerEngine::new());
    let coordinator = ConversionCoordinator::new(
        CoordinatorConfig::default(),
        Arc::new(CurrencyCatalog::new(Arc::new(FailingCatalogSource))),
        ledger.clone(),
        Arc::new(StaticRateSource::with_defaults()),
        Arc::new(OfferEngine::default()),
    );
    coordinator.start().await.unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::Running);

    let user = UserId::new(1);
    ledger.ensure_account(user, &Currency::lira(), dec!(150)).await.unwrap();
    assert_eq!(
        coordinator.quote(user, "TRY", "USD").await.unwrap_err(),
        ExchangeError::CurrencyNotFound("TRY".to_string())
    );
    assert_eq!(ledger.wallet_count(), 1);
    coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_accept_rejections_leave_balances_untouched() {
    let h = harness().await;
    let owner = UserId::new(1);
    let other = UserId::new(2);
    fund(&h, owner, Currency::lira(), dec!(150)).await;
    fund(&h, other, Currency::lira(), dec!(150)).await;

    let quote = h.coordinator.quote(owner, "TRY", "USD").await.unwrap();

    assert_eq!(
        h.coordinator.accept(other, quote.offer_id, dec!(10)).await.unwrap_err(),
        ExchangeError::OfferOwnershipMismatch {
            offer_id: quote.offer_id,
            user_id: other,
        }
    );
    assert_eq!(
        h.coordinator.accept(owner, quote.offer_id, dec!(0)).await.unwrap_err(),
        ExchangeError::InvalidAmount(dec!(0))
    );
    assert_eq!(
        h.coordinator.accept(owner, quote.offer_id, dec!(200)).await.unwrap_err(),
        ExchangeError::InsufficientBalance {
            required: dec!(200),
            available: dec!(150),
        }
    );
    let missing = OfferId::new();
    assert_eq!(
        h.coordinator.accept(owner, missing, dec!(10)).await.unwrap_err(),
        ExchangeError::OfferNotFound(missing)
    );

    assert_eq!(balance(&h, owner, &Currency::lira()).await, dec!(150));
    assert_eq!(balance(&h, owner, &Currency::usd()).await, Decimal::ZERO);
    let offer = h.offers.get_offer(quote.offer_id).await.unwrap();
    assert_eq!(offer.status, OfferStatus::Issued);
}

#[tokio::test]
async fn test_failed_commit_releases_offer() {
    let h = harness().await;
    let user = UserId::new(1);
    fund(&h, user, Currency::lira(), dec!(150)).await;
    fund(&h, user, Currency::usd(), Decimal::MAX).await;

    let quote = h.coordinator.quote(user, "TRY", "USD").await.unwrap();
    let err = h.coordinator.accept(user, quote.offer_id, dec!(100)).await.unwrap_err();
    assert!(matches!(err, ExchangeError::PersistenceError(_)));

    assert_eq!(balance(&h, user, &Currency::lira()).await, dec!(150));
    assert_eq!(balance(&h, user, &Currency::usd()).await, Decimal::MAX);
    assert!(h.ledger.journal_for(user).is_empty());

    let offer = h.offers.get_offer(quote.offer_id).await.unwrap();
    assert_eq!(offer.status, OfferStatus::Issued);

    let snapshot = h.coordinator.metrics_snapshot();
    assert_eq!(snapshot.accepts_failed, 1);
    assert_eq!(snapshot.accepts_active, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_of_one_offer() {
    let h = harness().await;
    let user = UserId::new(1);
    fund(&h, user, Currency::lira(), dec!(1000)).await;
    let offer_id = h.coordinator.quote(user, "TRY", "USD").await.unwrap().offer_id;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let coordinator = h.coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.accept(user, offer_id, dec!(100)).await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => applied += 1,
            Err(e) => assert_eq!(e, ExchangeError::OfferAlreadyConsumed(offer_id)),
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(balance(&h, user, &Currency::lira()).await, dec!(900));
    assert_eq!(balance(&h, user, &Currency::usd()).await, dec!(6.3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_never_overdraw() {
    let h = harness().await;
    let user = UserId::new(1);
    fund(&h, user, Currency::lira(), dec!(1000)).await;

    let mut offers = Vec::new();
    for _ in 0..20 {
        offers.push(h.coordinator.quote(user, "TRY", "EUR").await.unwrap().offer_id);
    }

    let mut handles = Vec::new();
    for offer_id in offers {
        let coordinator = h.coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.accept(user, offer_id, dec!(300)).await
        }));
    }

    let mut applied = Decimal::ZERO;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => applied += Decimal::ONE,
            Err(e) => assert!(matches!(e, ExchangeError::InsufficientBalance { .. })),
        }
    }

    assert_eq!(applied, dec!(3));
    let lira = balance(&h, user, &Currency::lira()).await;
    let euro = balance(&h, user, &Currency::eur()).await;
    assert_eq!(lira, dec!(100));
    assert_eq!(euro, applied * dec!(300) * dec!(0.059));
}

#[tokio::test]
async fn test_default_account_and_identity() {
    let h = harness().await;
    let anonymous = ResolvedIdentity::anonymous();
    assert_eq!(
        h.coordinator.ensure_default_account_for(&anonymous, "TRY").await.unwrap_err(),
        ExchangeError::Unauthenticated
    );
    assert_eq!(h.ledger.wallet_count(), 0);

    let identity = ResolvedIdentity::user(UserId::new(42));
    let wallet = h.coordinator.ensure_default_account_for(&identity, "TRY").await.unwrap();
    assert_eq!(wallet.balance, dec!(10000));

    let quote = h.coordinator.quote_for(&identity, "TRY", "USD").await.unwrap();
    h.coordinator
        .accept_for(&identity, quote.offer_id, dec!(10000))
        .await
        .unwrap();

    // A second registration does not reseed the drained wallet.
    let wallet = h.coordinator.ensure_default_account_for(&identity, "TRY").await.unwrap();
    assert_eq!(wallet.balance, Decimal::ZERO);
    assert_eq!(
        h.coordinator.list_wallets_for(&identity).await.unwrap(),
        vec![
            WalletBalance::new(Currency::lira(), Decimal::ZERO),
            WalletBalance::new(Currency::usd(), dec!(630)),
        ]
    );
}

#[tokio::test]
async fn test_sweep_removes_stale_offers() {
    let mut config = CoordinatorConfig::default();
    config.offer.sweep_interval = StdDuration::from_millis(20);
    let h = harness_with(config).await;
    let user = UserId::new(1);
    fund(&h, user, Currency::lira(), dec!(150)).await;

    let stale = h.coordinator.quote(user, "TRY", "USD").await.unwrap();
    h.clock.advance(Duration::minutes(14));
    let fresh = h.coordinator.quote(user, "TRY", "EUR").await.unwrap();

    tokio::time::sleep(StdDuration::from_millis(200)).await;

    assert!(h.offers.get_offer(stale.offer_id).await.is_err());
    assert!(h.offers.get_offer(fresh.offer_id).await.is_ok());
    assert_eq!(h.coordinator.metrics_snapshot().offers_swept, 1);

    h.coordinator.stop().await.unwrap();
    assert_eq!(h.coordinator.state(), CoordinatorState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_accept_racing_ensure_account() {
    let h = harness().await;
    let user = UserId::new(1);
    fund(&h, user, Currency::lira(), dec!(1000)).await;

    let mut offers = Vec::new();
    for _ in 0..10 {
        offers.push(h.coordinator.quote(user, "TRY", "USD").await.unwrap().offer_id);
    }

    let mut accepts = Vec::new();
    for offer_id in offers {
        let coordinator = h.coordinator.clone();
        accepts.push(tokio::spawn(async move {
            coordinator.accept(user, offer_id, dec!(100)).await
        }));
    }

    let mut ensures = Vec::new();
    for _ in 0..20 {
        let ledger = h.ledger.clone();
        ensures.push(tokio::spawn(async move {
            ledger.ensure_account(user, &Currency::usd(), Decimal::ZERO).await
        }));
    }

    for handle in accepts {
        handle.await.unwrap().unwrap();
    }
    for handle in ensures {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(balance(&h, user, &Currency::lira()).await, Decimal::ZERO);
    assert_eq!(balance(&h, user, &Currency::usd()).await, dec!(63));
    assert_eq!(h.ledger.wallet_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_time_ensure_account() {
    let h = harness().await;
    let user = UserId::new(5);

    let mut handles = Vec::new();
    for i in 0..32 {
        let ledger = h.ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .ensure_account(user, &Currency::eur(), Decimal::from(i))
                .await
                .unwrap()
        }));
    }

    let mut seen = Vec::new();
    for handle in handles {
        seen.push(handle.await.unwrap().balance);
    }

    // Every caller sees the one wallet the winner created.
    let winner = seen[0];
    assert!(seen.iter().all(|b| *b == winner));
    assert_eq!(h.ledger.wallet_count(), 1);
    assert_eq!(
        h.ledger.list_wallets(user).await.unwrap(),
        vec![WalletBalance::new(Currency::eur(), winner)]
    );
}

/// Ledger whose balance reads take long enough for the clock to move on.
struct SlowReadLedger {
    inner: LedgerEngine,
    clock: Arc<ManualClock>,
    delay: Duration,
}

#[async_trait]
impl AccountLedger for SlowReadLedger {
    async fn ensure_account(
        &self,
        user_id: UserId,
        currency: &Currency,
        initial_balance: Decimal,
    ) -> ExchangeResult<Wallet> {
        self.inner.ensure_account(user_id, currency, initial_balance).await
    }

    async fn has_account(&self, user_id: UserId, currency: &Currency) -> ExchangeResult<bool> {
        self.inner.has_account(user_id, currency).await
    }

    async fn get_balance(&self, user_id: UserId, currency: &Currency) -> ExchangeResult<Decimal> {
        let balance = self.inner.get_balance(user_id, currency).await;
        self.clock.advance(self.delay);
        balance
    }

    async fn commit(&self, batch: &JournalBatch) -> ExchangeResult<Vec<JournalEntry>> {
        self.inner.commit(batch).await
    }

    async fn list_wallets(&self, user_id: UserId) -> ExchangeResult<Vec<WalletBalance>> {
        self.inner.list_wallets(user_id).await
    }
}

#[tokio::test]
async fn test_offer_expiring_during_balance_read_is_not_claimed() {
    let clock = Arc::new(ManualClock::new());
    let ledger = Arc::new(SlowReadLedger {
        inner: LedgerEngine::new(),
        clock: clock.clone(),
        delay: Duration::seconds(2),
    });
    let config = CoordinatorConfig::default();
    let offers = Arc::new(OfferEngine::with_clock(
        config.offer.engine_config(),
        clock.clone(),
    ));
    let coordinator = ConversionCoordinator::new(
        config,
        Arc::new(CurrencyCatalog::new(Arc::new(StaticCatalogSource::with_defaults()))),
        ledger.clone(),
        Arc::new(StaticRateSource::with_defaults()),
        offers.clone(),
    )
    .with_clock(clock.clone());
    coordinator.start().await.unwrap();

    let user = UserId::new(1);
    ledger.ensure_account(user, &Currency::lira(), dec!(150)).await.unwrap();
    let quote = coordinator.quote(user, "TRY", "USD").await.unwrap();

    // One second left when the acceptance starts.
    clock.advance(Duration::minutes(3) - Duration::seconds(1));

    let err = coordinator.accept(user, quote.offer_id, dec!(100)).await.unwrap_err();
    assert_eq!(err, ExchangeError::OfferExpired(quote.offer_id));
    assert_eq!(
        offers.get_offer(quote.offer_id).await.unwrap().status,
        OfferStatus::Issued
    );
    assert_eq!(ledger.inner.get_balance(user, &Currency::lira()).await.unwrap(), dec!(150));
    assert_eq!(ledger.inner.get_balance(user, &Currency::usd()).await.unwrap(), Decimal::ZERO);
    coordinator.stop().await.unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_accept_conserves_at_quoted_rate(cents in 1i64..=15_000) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let h = harness().await;
            let user = UserId::new(1);
            fund(&h, user, Currency::lira(), dec!(150)).await;

            let amount = Decimal::new(cents, 2);
            let quote = h.coordinator.quote(user, "TRY", "USD").await.unwrap();
            h.coordinator.accept(user, quote.offer_id, amount).await.unwrap();

            assert_eq!(balance(&h, user, &Currency::lira()).await, dec!(150) - amount);
            assert_eq!(balance(&h, user, &Currency::usd()).await, amount * quote.quoted_rate);
        });
    }
}
