//! In-memory ledger engine.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument};

use fxwallet_common::{Currency, ExchangeError, ExchangeResult, UserId, WalletBalance};

use crate::account::{Wallet, WalletKey};
use crate::journal::{JournalBatch, JournalEntry};
use crate::store::AccountLedger;

/// Wallet store backed by process memory.
///
/// Each wallet sits behind its own mutex. A commit locks every wallet it
/// touches in key order, computes all new balances, and only then writes.
pub struct LedgerEngine {
    /// Wallets by key.
    wallets: DashMap<WalletKey, Arc<Mutex<Wallet>>>,
    /// Index: user -> currencies held.
    wallets_by_user: DashMap<UserId, BTreeSet<Currency>>,
    /// Applied entries, oldest first.
    journal: Mutex<Vec<JournalEntry>>,
}

impl LedgerEngine {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            wallets: DashMap::new(),
            wallets_by_user: DashMap::new(),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Number of wallets across all users.
    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    /// Journal entries recorded for a user.
    pub fn journal_for(&self, user_id: UserId) -> Vec<JournalEntry> {
        self.journal
            .lock()
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect()
    }

    fn handle(&self, key: &WalletKey) -> ExchangeResult<Arc<Mutex<Wallet>>> {
        self.wallets
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ExchangeError::account_not_found(key.user_id, &key.currency))
    }

    /// Validate and apply a batch while holding every wallet lock.
    fn commit_locked(&self, batch: &JournalBatch) -> ExchangeResult<Vec<JournalEntry>> {
        batch.validate()?;

        let ordered = batch.in_lock_order();
        let handles = ordered
            .iter()
            .map(|posting| self.handle(&posting.key))
            .collect::<ExchangeResult<Vec<_>>>()?;

        let mut guards: Vec<MutexGuard<'_, Wallet>> =
            handles.iter().map(|handle| handle.lock()).collect();

        let balances_after = ordered
            .iter()
            .zip(guards.iter())
            .map(|(posting, wallet)| posting.apply_to(wallet.balance))
            .collect::<ExchangeResult<Vec<_>>>()?;

        let now = Utc::now();
        let mut entries = Vec::with_capacity(ordered.len());
        for ((posting, wallet), after) in ordered
            .iter()
            .zip(guards.iter_mut())
            .zip(balances_after)
        {
            wallet.balance = after;
            wallet.updated_at = now;
            entries.push(JournalEntry::applied(&batch.reference, posting, after));
        }
        drop(guards);

        self.journal.lock().extend(entries.iter().cloned());
        Ok(entries)
    }
}

impl Default for LedgerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountLedger for LedgerEngine {
    #[instrument(skip(self), fields(user_id = %user_id, currency = %currency))]
    async fn ensure_account(
        &self,
        user_id: UserId,
        currency: &Currency,
        initial_balance: Decimal,
    ) -> ExchangeResult<Wallet> {
        if initial_balance < Decimal::ZERO {
            return Err(ExchangeError::InvalidAmount(initial_balance));
        }

        // Index before wallet, so a visible wallet is always listed.
        self.wallets_by_user
            .entry(user_id)
            .or_default()
            .insert(currency.clone());

        let key = WalletKey::new(user_id, currency.clone());
        let handle = Arc::clone(
            self.wallets
                .entry(key.clone())
                .or_insert_with(|| {
                    info!(wallet = %key, balance = %initial_balance, "Wallet created");
                    Arc::new(Mutex::new(Wallet::new(key.clone(), initial_balance)))
                })
                .value(),
        );

        let wallet = handle.lock().clone();
        Ok(wallet)
    }

    async fn has_account(&self, user_id: UserId, currency: &Currency) -> ExchangeResult<bool> {
        Ok(self
            .wallets
            .contains_key(&WalletKey::new(user_id, currency.clone())))
    }

    async fn get_balance(&self, user_id: UserId, currency: &Currency) -> ExchangeResult<Decimal> {
        let handle = self.handle(&WalletKey::new(user_id, currency.clone()))?;
        let balance = handle.lock().balance;
        Ok(balance)
    }

    #[instrument(skip(self, batch), fields(reference = %batch.reference, postings = batch.postings.len()))]
    async fn commit(&self, batch: &JournalBatch) -> ExchangeResult<Vec<JournalEntry>> {
        let entries = self.commit_locked(batch)?;
        debug!(entries = entries.len(), "Batch committed");
        Ok(entries)
    }

    async fn list_wallets(&self, user_id: UserId) -> ExchangeResult<Vec<WalletBalance>> {
        let currencies: Vec<Currency> = self
            .wallets_by_user
            .get(&user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut wallets = Vec::with_capacity(currencies.len());
        for currency in currencies {
            if let Ok(handle) = self.handle(&WalletKey::new(user_id, currency)) {
                wallets.push(handle.lock().to_balance());
            }
        }
        Ok(wallets)
    }
}
