//! PostgreSQL ledger backend.
//!
//! Wallet rows are locked with `SELECT ... FOR UPDATE` in [`WalletKey`] order
//! inside a single transaction, so the locking discipline matches
//! [`LedgerEngine`](crate::LedgerEngine).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, info, instrument, warn};

use fxwallet_common::{Currency, ExchangeError, ExchangeResult, UserId, WalletBalance};

use crate::account::{Wallet, WalletKey};
use crate::journal::{JournalBatch, JournalEntry};
use crate::store::AccountLedger;

const CREATE_WALLETS: &str = r#"
    CREATE TABLE IF NOT EXISTS wallets (
        user_id BIGINT NOT NULL,
        currency_code TEXT NOT NULL,
        balance NUMERIC NOT NULL CHECK (balance >= 0),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (user_id, currency_code)
    )
"#;

const CREATE_JOURNAL: &str = r#"
    CREATE TABLE IF NOT EXISTS wallet_journal (
        id UUID PRIMARY KEY,
        reference TEXT NOT NULL,
        user_id BIGINT NOT NULL,
        currency_code TEXT NOT NULL,
        entry_type TEXT NOT NULL,
        amount NUMERIC NOT NULL,
        balance_after NUMERIC NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
"#;

fn db_err(e: sqlx::Error) -> ExchangeError {
    ExchangeError::PersistenceError(e.to_string())
}

fn wallet_from_row(row: &PgRow) -> ExchangeResult<Wallet> {
    let user_id: i64 = row.try_get("user_id").map_err(db_err)?;
    let currency: String = row.try_get("currency_code").map_err(db_err)?;
    let balance: Decimal = row.try_get("balance").map_err(db_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_err)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(db_err)?;

    Ok(Wallet {
        user_id: UserId::new(user_id as u64),
        currency: Currency::new(currency),
        balance,
        created_at,
        updated_at,
    })
}

/// Wallet store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> ExchangeResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db_err)?;

        let ledger = Self::new(pool);
        ledger.init_schema().await?;
        info!(max_connections, "PostgreSQL ledger connected");
        Ok(ledger)
    }

    /// Create the wallet and journal tables if missing.
    pub async fn init_schema(&self) -> ExchangeResult<()> {
        for statement in [CREATE_WALLETS, CREATE_JOURNAL] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn apply_batch(
        tx: &mut Transaction<'_, Postgres>,
        batch: &JournalBatch,
    ) -> ExchangeResult<Vec<JournalEntry>> {
        let ordered = batch.in_lock_order();

        // Lock every row first, then validate, then write.
        let mut balances_after = Vec::with_capacity(ordered.len());
        for posting in &ordered {
            let current: Option<Decimal> = sqlx::query_scalar(
                r#"
                SELECT balance FROM wallets
                WHERE user_id = $1 AND currency_code = $2
                FOR UPDATE
                "#,
            )
            .bind(posting.key.user_id.as_u64() as i64)
            .bind(posting.key.currency.code())
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;

            let current = current.ok_or_else(|| {
                ExchangeError::account_not_found(posting.key.user_id, &posting.key.currency)
            })?;
            balances_after.push(posting.apply_to(current)?);
        }

        let mut entries = Vec::with_capacity(ordered.len());
        for (posting, after) in ordered.iter().zip(balances_after) {
            sqlx::query(
                r#"
                UPDATE wallets SET balance = $3, updated_at = NOW()
                WHERE user_id = $1 AND currency_code = $2
                "#,
            )
            .bind(posting.key.user_id.as_u64() as i64)
            .bind(posting.key.currency.code())
            .bind(after)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;

            let entry = JournalEntry::applied(&batch.reference, posting, after);
            sqlx::query(
                r#"
                INSERT INTO wallet_journal
                    (id, reference, user_id, currency_code, entry_type, amount, balance_after, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(entry.id)
            .bind(&entry.reference)
            .bind(entry.user_id.as_u64() as i64)
            .bind(entry.currency.code())
            .bind(entry.entry_type.as_str())
            .bind(entry.amount)
            .bind(entry.balance_after)
            .bind(entry.created_at)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;

            entries.push(entry);
        }

        Ok(entries)
    }
}

#[async_trait]
impl AccountLedger for PgLedger {
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

        let inserted = sqlx::query(
            r#"
            INSERT INTO wallets (user_id, currency_code, balance)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, currency_code) DO NOTHING
            "#,
        )
        .bind(user_id.as_u64() as i64)
        .bind(currency.code())
        .bind(initial_balance)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        if inserted > 0 {
            info!(wallet = %WalletKey::new(user_id, currency.clone()), balance = %initial_balance, "Wallet created");
        }

        let row = sqlx::query(
            r#"
            SELECT user_id, currency_code, balance, created_at, updated_at
            FROM wallets WHERE user_id = $1 AND currency_code = $2
            "#,
        )
        .bind(user_id.as_u64() as i64)
        .bind(currency.code())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        wallet_from_row(&row)
    }

    async fn has_account(&self, user_id: UserId, currency: &Currency) -> ExchangeResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM wallets WHERE user_id = $1 AND currency_code = $2)",
        )
        .bind(user_id.as_u64() as i64)
        .bind(currency.code())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(exists)
    }

    async fn get_balance(&self, user_id: UserId, currency: &Currency) -> ExchangeResult<Decimal> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            "SELECT balance FROM wallets WHERE user_id = $1 AND currency_code = $2",
        )
        .bind(user_id.as_u64() as i64)
        .bind(currency.code())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        balance.ok_or_else(|| ExchangeError::account_not_found(user_id, currency))
    }

    #[instrument(skip(self, batch), fields(reference = %batch.reference, postings = batch.postings.len()))]
    async fn commit(&self, batch: &JournalBatch) -> ExchangeResult<Vec<JournalEntry>> {
        batch.validate()?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        match Self::apply_batch(&mut tx, batch).await {
            Ok(entries) => {
                tx.commit().await.map_err(db_err)?;
                debug!(entries = entries.len(), "Batch committed");
                Ok(entries)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn list_wallets(&self, user_id: UserId) -> ExchangeResult<Vec<WalletBalance>> {
        let rows = sqlx::query(
            r#"
            SELECT currency_code, balance FROM wallets
            WHERE user_id = $1
            ORDER BY currency_code
            "#,
        )
        .bind(user_id.as_u64() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let code: String = row.try_get("currency_code").map_err(db_err)?;
                let balance: Decimal = row.try_get("balance").map_err(db_err)?;
                Ok(WalletBalance::new(Currency::new(code), balance))
            })
            .collect()
    }
}
