//! Wallet definitions for the ledger.

use fxwallet_common::{Currency, UserId, WalletBalance};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one wallet.
///
/// The derived ordering (user, then currency code) is the global order in
/// which wallet locks are taken.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WalletKey {
    pub user_id: UserId,
    pub currency: Currency,
}

impl WalletKey {
    pub fn new(user_id: UserId, currency: Currency) -> Self {
        Self { user_id, currency }
    }
}

impl fmt::Display for WalletKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.currency)
    }
}

/// A user's balance in one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    /// Owning user.
    pub user_id: UserId,
    /// Wallet currency.
    pub currency: Currency,
    /// Current balance.
    pub balance: Decimal,
    /// When the wallet was created.
    pub created_at: DateTime<Utc>,
    /// When the balance last changed.
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a new wallet with an opening balance.
    pub fn new(key: WalletKey, opening_balance: Decimal) -> Self {
        let now = Utc::now();
        Self {
            user_id: key.user_id,
            currency: key.currency,
            balance: opening_balance,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> WalletKey {
        WalletKey::new(self.user_id, self.currency.clone())
    }

    /// Presentation view of this wallet.
    pub fn to_balance(&self) -> WalletBalance {
        WalletBalance::new(self.currency.clone(), self.balance)
    }
}
