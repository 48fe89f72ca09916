use std::convert::Infallible;
use std::fmt;

use sled::transaction::TransactionError;

pub type MarketResult<T> = Result<T, MarketError>;

/// Records the core can fail to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Listing,
    Verification,
    Sale,
    Review,
    Shipment,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::User => "user",
            Entity::Listing => "listing",
            Entity::Verification => "verification",
            Entity::Sale => "sale",
            Entity::Review => "review",
            Entity::Shipment => "shipment",
        };
        f.write_str(name)
    }
}

/// Every core operation fails with exactly one of these kinds.
#[derive(thiserror::Error, Debug)]
pub enum MarketError {
    #[error("caller is not authenticated")]
    Unauthenticated,
    #[error("{0} not found: {1}")]
    NotFound(Entity, String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl MarketError {
    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        MarketError::NotFound(entity, id.into())
    }

    /// Stable code for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            MarketError::Unauthenticated => "UNAUTHENTICATED",
            MarketError::NotFound(..) => "NOT_FOUND",
            MarketError::Forbidden(_) => "FORBIDDEN",
            MarketError::InvalidState(_) => "INVALID_STATE",
            MarketError::InvalidArgument(_) => "INVALID_ARGUMENT",
            MarketError::Conflict(_) => "CONFLICT",
            MarketError::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP status a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            MarketError::Unauthenticated => 401,
            MarketError::Forbidden(_) => 403,
            MarketError::NotFound(..) => 404,
            MarketError::InvalidState(_)
            | MarketError::InvalidArgument(_)
            | MarketError::Conflict(_) => 400,
            MarketError::Internal(_) => 500,
        }
    }
}

impl From<sled::Error> for MarketError {
    fn from(err: sled::Error) -> Self {
        MarketError::Internal(format!("storage: {err}"))
    }
}

impl From<TransactionError<MarketError>> for MarketError {
    fn from(err: TransactionError<MarketError>) -> Self {
        match err {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => err.into(),
        }
    }
}

impl From<minicbor::encode::Error<Infallible>> for MarketError {
    fn from(err: minicbor::encode::Error<Infallible>) -> Self {
        MarketError::Internal(format!("encoding: {err}"))
    }
}

impl From<minicbor::decode::Error> for MarketError {
    fn from(err: minicbor::decode::Error) -> Self {
        MarketError::Internal(format!("decoding: {err}"))
    }
}

impl From<anyhow::Error> for MarketError {
    fn from(err: anyhow::Error) -> Self {
        MarketError::Internal(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_transport_codes() {
        assert_eq!(MarketError::Unauthenticated.status_code(), 401);
        assert_eq!(MarketError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(MarketError::not_found(Entity::Sale, "s").status_code(), 404);
        assert_eq!(MarketError::InvalidState("x".into()).status_code(), 400);
        assert_eq!(MarketError::Conflict("x".into()).status_code(), 400);
        assert_eq!(MarketError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn aborted_transaction_keeps_its_kind() {
        let err: MarketError =
            TransactionError::Abort(MarketError::Conflict("duplicate".into())).into();
        assert_eq!(err.kind(), "CONFLICT");
    }

    #[test]
    fn not_found_names_the_entity() {
        let err = MarketError::not_found(Entity::Listing, "listing_1abc");
        assert_eq!(err.to_string(), "listing not found: listing_1abc");
    }
}
