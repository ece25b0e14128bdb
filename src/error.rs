use thiserror::Error;
use tracing::error;

use crate::{
    account::WalletKind, exchange::ExchangeError, filter::FilterKind, noun::*, order::OrderType,
};

/// Failure of a trading operation, tagged with the operation that produced it
/// and the inputs it was called with.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{operation} [{inputs}]: {kind}")]
pub struct TradeError {
    pub operation: &'static str,
    pub inputs: String,
    pub kind: ErrorKind,
}

impl TradeError {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("{value:?} is not a finite decimal")]
    Conversion { value: String },

    #[error("symbol {symbol} not found")]
    SymbolNotFound { symbol: Symbol },

    #[error("filter {filter} not found for {symbol}")]
    FilterNotFound { symbol: Symbol, filter: FilterKind },

    #[error("filter {filter} has no {field}")]
    FieldNotFound {
        filter: FilterKind,
        field: &'static str,
    },

    #[error("{feature} does not exist for {wallet} wallet")]
    UnsupportedForWallet { wallet: WalletKind, feature: String },

    #[error("{order_type} order requires a {field} price")]
    MissingPrice {
        order_type: OrderType,
        field: PriceField,
    },

    #[error("{} {value} is not above {} {threshold}", .floor.measure(), .floor.threshold())]
    BelowMinimum {
        floor: Floor,
        value: Decimal,
        threshold: Decimal,
    },

    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("{message}")]
    Upstream { code: Option<i64>, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Limit,
    Stop,
    Oco,
}

impl std::fmt::Display for PriceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limit => write!(f, "limit"),
            Self::Stop => write!(f, "stop"),
            Self::Oco => write!(f, "oco"),
        }
    }
}

/// Exchange floor a derived quantity has to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Floor {
    /// LOT_SIZE minQty, compared with the quantity
    MinQuantity,
    /// MIN_NOTIONAL minNotional, compared with quantity * price
    MinNotional,
}

impl Floor {
    pub fn measure(&self) -> &'static str {
        match self {
            Self::MinQuantity => "quantity",
            Self::MinNotional => "notional",
        }
    }

    pub fn threshold(&self) -> &'static str {
        match self {
            Self::MinQuantity => "LOT_SIZE minQty",
            Self::MinNotional => "MIN_NOTIONAL minNotional",
        }
    }
}

/// Builds a [`TradeError`] and logs it. Every failure path goes through here.
pub fn failure(operation: &'static str, inputs: impl Into<String>, kind: ErrorKind) -> TradeError {
    let inputs = inputs.into();
    error!(operation, inputs = %inputs, "{}", kind);

    TradeError {
        operation,
        inputs,
        kind,
    }
}

pub fn upstream(operation: &'static str, inputs: impl Into<String>, e: ExchangeError) -> TradeError {
    failure(
        operation,
        inputs,
        ErrorKind::Upstream {
            code: e.code(),
            message: e.primary_message(),
        },
    )
}
