//! FxWallet Ledger
//!
//! Per-user, per-currency wallet balances. Every balance change goes through
//! [`AccountLedger::commit`], which applies a batch of postings as one unit.

pub mod account;
pub mod balance;
pub mod journal;
pub mod store;
pub mod engine;
pub mod postgres;

pub use account::{Wallet, WalletKey};
pub use balance::Posting;
pub use journal::{EntryType, JournalBatch, JournalEntry};
pub use store::{AccountLedger, SharedLedger};
pub use engine::LedgerEngine;
pub use postgres::PgLedger;
