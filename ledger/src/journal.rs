//! Journal entries and the batches that produce them.

use std::collections::HashSet;

use fxwallet_common::{Currency, ExchangeError, ExchangeResult, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::WalletKey;
use crate::balance::Posting;

/// Type of journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Balance decreased.
    Debit,
    /// Balance increased.
    Credit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Debit => "DEBIT",
            EntryType::Credit => "CREDIT",
        }
    }
}

/// A single applied leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique entry ID.
    pub id: Uuid,
    /// What caused the change (offer id, registration, ...).
    pub reference: String,
    /// Wallet owner.
    pub user_id: UserId,
    /// Wallet currency.
    pub currency: Currency,
    /// Entry type (debit or credit).
    pub entry_type: EntryType,
    /// Unsigned amount.
    pub amount: Decimal,
    /// Balance after this entry.
    pub balance_after: Decimal,
    /// When this entry was created.
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Record an applied posting.
    pub fn applied(reference: &str, posting: &Posting, balance_after: Decimal) -> Self {
        Self {
            id: Uuid::now_v7(),
            reference: reference.to_string(),
            user_id: posting.key.user_id,
            currency: posting.key.currency.clone(),
            entry_type: if posting.is_debit() {
                EntryType::Debit
            } else {
                EntryType::Credit
            },
            amount: posting.delta.abs(),
            balance_after,
            created_at: Utc::now(),
        }
    }

    /// Signed amount (negative for debits).
    pub fn signed_amount(&self) -> Decimal {
        match self.entry_type {
            EntryType::Debit => -self.amount,
            EntryType::Credit => self.amount,
        }
    }
}

/// Postings that must be committed together.
#[derive(Debug, Clone)]
pub struct JournalBatch {
    /// Reference copied onto every resulting entry.
    pub reference: String,
    /// Postings in the batch.
    pub postings: Vec<Posting>,
}

impl JournalBatch {
    /// Create a new batch.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            postings: Vec::new(),
        }
    }

    /// Add a signed posting.
    pub fn post(&mut self, user_id: UserId, currency: Currency, delta: Decimal) -> &mut Self {
        self.postings
            .push(Posting::new(WalletKey::new(user_id, currency), delta));
        self
    }

    /// Add a debit of `amount`.
    pub fn debit(&mut self, user_id: UserId, currency: Currency, amount: Decimal) -> &mut Self {
        self.post(user_id, currency, -amount)
    }

    /// Add a credit of `amount`.
    pub fn credit(&mut self, user_id: UserId, currency: Currency, amount: Decimal) -> &mut Self {
        self.post(user_id, currency, amount)
    }

    /// Check the batch is well formed: non-empty, non-zero deltas, and each
    /// wallet touched at most once.
    pub fn validate(&self) -> ExchangeResult<()> {
        if self.postings.is_empty() {
            return Err(ExchangeError::InvalidAmount(Decimal::ZERO));
        }

        let mut seen = HashSet::new();
        for posting in &self.postings {
            if posting.delta.is_zero() {
                return Err(ExchangeError::InvalidAmount(posting.delta));
            }
            if !seen.insert(&posting.key) {
                return Err(ExchangeError::SameCurrency(posting.key.currency.clone()));
            }
        }

        Ok(())
    }

    /// Postings in lock order.
    pub fn in_lock_order(&self) -> Vec<&Posting> {
        let mut postings: Vec<&Posting> = self.postings.iter().collect();
        postings.sort_by(|a, b| a.key.cmp(&b.key));
        postings
    }

    /// Total debited, summed per currency.
    pub fn total_debits(&self, currency: &Currency) -> Decimal {
        self.postings
            .iter()
            .filter(|p| p.is_debit() && &p.key.currency == currency)
            .map(|p| p.delta.abs())
            .sum()
    }

    /// Total credited, summed per currency.
    pub fn total_credits(&self, currency: &Currency) -> Decimal {
        self.postings
            .iter()
            .filter(|p| !p.is_debit() && &p.key.currency == currency)
            .map(|p| p.delta)
            .sum()
    }
}
