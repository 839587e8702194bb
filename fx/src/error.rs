//! FX error types.

use fxwallet_common::{CurrencyPair, ExchangeError, OfferId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::offer::OfferStatus;

/// Errors raised by the catalog, rate sources and the offer book.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FxError {
    /// Currency code not present in the catalog.
    #[error("Currency not found: {0}")]
    CurrencyNotFound(String),

    /// No rate configured for the ordered pair.
    #[error("Rate not found for {0}")]
    RateNotFound(CurrencyPair),

    /// Rates and markups must be non-negative.
    #[error("Negative rate {value} for {pair}")]
    NegativeRate { pair: CurrencyPair, value: Decimal },

    /// Rate provider could not be reached. Transient.
    #[error("Rate provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Currency catalog source could not be loaded. Transient.
    #[error("Currency catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Offer not found: {0}")]
    OfferNotFound(OfferId),

    #[error("Offer expired: {0}")]
    OfferExpired(OfferId),

    #[error("Offer {offer_id} does not belong to user {user_id}")]
    OfferOwnershipMismatch { offer_id: OfferId, user_id: UserId },

    #[error("Offer already consumed: {0}")]
    OfferAlreadyConsumed(OfferId),

    /// User holds too many live offers.
    #[error("User {0} has reached the outstanding offer limit")]
    OfferLimitReached(UserId),

    /// Status transition not allowed from the current status.
    #[error("Offer {offer_id} cannot move from {status:?}")]
    InvalidTransition { offer_id: OfferId, status: OfferStatus },
}

impl FxError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FxError::ProviderUnavailable(_) | FxError::CatalogUnavailable(_)
        )
    }
}

impl From<FxError> for ExchangeError {
    fn from(err: FxError) -> Self {
        match err {
            FxError::CurrencyNotFound(code) => ExchangeError::CurrencyNotFound(code),
            FxError::RateNotFound(pair) => ExchangeError::RateNotFound(pair),
            FxError::NegativeRate { .. } => ExchangeError::ConfigurationError(err.to_string()),
            FxError::ProviderUnavailable(msg) => ExchangeError::RateSourceUnavailable(msg),
            FxError::CatalogUnavailable(msg) => ExchangeError::CatalogUnavailable(msg),
            FxError::OfferNotFound(id) => ExchangeError::OfferNotFound(id),
            FxError::OfferExpired(id) => ExchangeError::OfferExpired(id),
            FxError::OfferOwnershipMismatch { offer_id, user_id } => {
                ExchangeError::OfferOwnershipMismatch { offer_id, user_id }
            }
            FxError::OfferAlreadyConsumed(id) => ExchangeError::OfferAlreadyConsumed(id),
            FxError::OfferLimitReached(user_id) => ExchangeError::OfferLimitReached(user_id),
            FxError::InvalidTransition { .. } => ExchangeError::PersistenceError(err.to_string()),
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
