//! Balance postings.

use fxwallet_common::{ExchangeError, ExchangeResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::WalletKey;

/// A signed change to one wallet. Negative deltas debit, positive credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    /// Wallet affected.
    pub key: WalletKey,
    /// Signed amount.
    pub delta: Decimal,
}

impl Posting {
    pub fn new(key: WalletKey, delta: Decimal) -> Self {
        Self { key, delta }
    }

    pub fn is_debit(&self) -> bool {
        self.delta.is_sign_negative()
    }

    /// Compute the balance after this posting.
    ///
    /// Fails with `InsufficientBalance` if the result would be negative and
    /// with `PersistenceError` on decimal overflow. Never mutates anything.
    pub fn apply_to(&self, balance: Decimal) -> ExchangeResult<Decimal> {
        let after = balance.checked_add(self.delta).ok_or_else(|| {
            ExchangeError::PersistenceError(format!(
                "balance overflow on {} applying {}",
                self.key, self.delta
            ))
        })?;

        if after < Decimal::ZERO {
            return Err(ExchangeError::InsufficientBalance {
                required: self.delta.abs(),
                available: balance,
            });
        }

        Ok(after)
    }
}
