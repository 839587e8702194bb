//! Wallet store abstraction.

use std::sync::Arc;

use async_trait::async_trait;
use fxwallet_common::{Currency, ExchangeResult, UserId, WalletBalance};
use rust_decimal::Decimal;

use crate::account::Wallet;
use crate::journal::{JournalBatch, JournalEntry};

/// Owns per-user, per-currency wallet balances.
///
/// Implementations must make [`commit`](AccountLedger::commit) all-or-nothing
/// and must take wallet locks in [`WalletKey`](crate::WalletKey) order.
#[async_trait]
pub trait AccountLedger: Send + Sync {
    /// Return the existing wallet or create it with `initial_balance`.
    /// Never resets an existing wallet.
    async fn ensure_account(
        &self,
        user_id: UserId,
        currency: &Currency,
        initial_balance: Decimal,
    ) -> ExchangeResult<Wallet>;

    async fn has_account(&self, user_id: UserId, currency: &Currency) -> ExchangeResult<bool>;

    /// Current balance. Fails with `AccountNotFound`.
    async fn get_balance(&self, user_id: UserId, currency: &Currency) -> ExchangeResult<Decimal>;

    /// Apply a single signed delta and return the new balance.
    async fn adjust_balance(
        &self,
        user_id: UserId,
        currency: &Currency,
        delta: Decimal,
    ) -> ExchangeResult<Decimal> {
        let mut batch = JournalBatch::new(format!("adjust:{}:{}", user_id, currency));
        batch.post(user_id, currency.clone(), delta);
        let entries = self.commit(&batch).await?;
        Ok(entries
            .first()
            .map(|entry| entry.balance_after)
            .unwrap_or_default())
    }

    /// Apply every posting in `batch` or none of them.
    async fn commit(&self, batch: &JournalBatch) -> ExchangeResult<Vec<JournalEntry>>;

    /// All wallets of a user, ordered by currency code.
    async fn list_wallets(&self, user_id: UserId) -> ExchangeResult<Vec<WalletBalance>>;
}

/// Ledger handle shared between components.
pub type SharedLedger = Arc<dyn AccountLedger>;
