//! Error types for FxWallet operations.

use crate::{Currency, CurrencyPair, OfferId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for conversion and wallet operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    /// Currency code is not in the catalog.
    #[error("Currency not found: {0}")]
    CurrencyNotFound(String),

    /// Wallet missing where one is required.
    #[error("Account not found: user {user_id} has no {currency} wallet")]
    AccountNotFound { user_id: UserId, currency: Currency },

    /// No configured rate for the ordered pair.
    #[error("Rate not found for {0}")]
    RateNotFound(CurrencyPair),

    /// Unknown offer id.
    #[error("Offer not found: {0}")]
    OfferNotFound(OfferId),

    /// Offer was presented after its expiry.
    #[error("Offer expired: {0}")]
    OfferExpired(OfferId),

    /// Offer belongs to another user.
    #[error("Offer {offer_id} is not valid for user {user_id}")]
    OfferOwnershipMismatch { offer_id: OfferId, user_id: UserId },

    /// Offer was already accepted.
    #[error("Offer already consumed: {0}")]
    OfferAlreadyConsumed(OfferId),

    /// User has too many live offers.
    #[error("Offer limit reached for user {0}")]
    OfferLimitReached(UserId),

    /// Requested amount exceeds the source balance.
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    /// Amount must be strictly positive.
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Conversion into the same currency.
    #[error("Cannot convert {0} into itself")]
    SameCurrency(Currency),

    /// Currency catalog could not be loaded.
    #[error("Currency catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// Rate source could not be reached.
    #[error("Rate source unavailable: {0}")]
    RateSourceUnavailable(String),

    /// No resolved user on the request.
    #[error("Unauthenticated request")]
    Unauthenticated,

    /// Coordinator is not running.
    #[error("Coordinator unavailable: {0}")]
    CoordinatorUnavailable(String),

    /// Underlying store failure.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl ExchangeError {
    /// Check if this error is transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::CatalogUnavailable(_)
                | ExchangeError::RateSourceUnavailable(_)
                | ExchangeError::CoordinatorUnavailable(_)
                | ExchangeError::PersistenceError(_)
        )
    }

    /// Stable error code for outer layers.
    pub fn error_code(&self) -> &'static str {
        match self {
            ExchangeError::CurrencyNotFound(_) => "CURRENCY_NOT_FOUND",
            ExchangeError::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
            ExchangeError::RateNotFound(_) => "RATE_NOT_FOUND",
            ExchangeError::OfferNotFound(_) => "OFFER_NOT_FOUND",
            ExchangeError::OfferExpired(_) => "OFFER_EXPIRED",
            ExchangeError::OfferOwnershipMismatch { .. } => "OFFER_OWNERSHIP_MISMATCH",
            ExchangeError::OfferAlreadyConsumed(_) => "OFFER_ALREADY_CONSUMED",
            ExchangeError::OfferLimitReached(_) => "OFFER_LIMIT_REACHED",
            ExchangeError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            ExchangeError::InvalidAmount(_) => "INVALID_AMOUNT",
            ExchangeError::SameCurrency(_) => "SAME_CURRENCY",
            ExchangeError::CatalogUnavailable(_) => "CATALOG_UNAVAILABLE",
            ExchangeError::RateSourceUnavailable(_) => "RATE_SOURCE_UNAVAILABLE",
            ExchangeError::Unauthenticated => "UNAUTHENTICATED",
            ExchangeError::CoordinatorUnavailable(_) => "COORDINATOR_UNAVAILABLE",
            ExchangeError::PersistenceError(_) => "PERSISTENCE_ERROR",
            ExchangeError::ConfigurationError(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Shorthand for a missing wallet.
    pub fn account_not_found(user_id: UserId, currency: &Currency) -> Self {
        ExchangeError::AccountNotFound {
            user_id,
            currency: currency.clone(),
        }
    }
}

/// Result type alias for FxWallet operations.
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_codes() {
        let err = ExchangeError::InsufficientBalance {
            required: dec!(100),
            available: dec!(50),
        };
        assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
        assert!(!err.is_retryable());

        let err = ExchangeError::PersistenceError("connection reset".into());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_account_not_found_message() {
        let err = ExchangeError::account_not_found(UserId::new(1), &Currency::lira());
        assert_eq!(err.to_string(), "Account not found: user 1 has no TRY wallet");
    }
}
