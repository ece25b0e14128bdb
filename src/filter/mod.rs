use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::{
    account::WalletKind,
    common::decimal::parse_decimal,
    error::{failure, upstream, ErrorKind, TradeError},
    exchange::{Exchange, RawFilter},
    noun::*,
    Trader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterKind {
    PriceFilter,
    PercentPrice,
    LotSize,
    MinNotional,
    IcebergParts,
    MarketLotSize,
    MaxNumAlgoOrders,
    MaxNumOrders,
}

impl FilterKind {
    pub const ALL: [FilterKind; 8] = [
        Self::PriceFilter,
        Self::PercentPrice,
        Self::LotSize,
        Self::MinNotional,
        Self::IcebergParts,
        Self::MarketLotSize,
        Self::MaxNumAlgoOrders,
        Self::MaxNumOrders,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceFilter => "PRICE_FILTER",
            Self::PercentPrice => "PERCENT_PRICE",
            Self::LotSize => "LOT_SIZE",
            Self::MinNotional => "MIN_NOTIONAL",
            Self::IcebergParts => "ICEBERG_PARTS",
            Self::MarketLotSize => "MARKET_LOT_SIZE",
            Self::MaxNumAlgoOrders => "MAX_NUM_ALGO_ORDERS",
            Self::MaxNumOrders => "MAX_NUM_ORDERS",
        }
    }

    /// Handler table, one entry per kind
    pub fn handler(self) -> &'static dyn FilterHandler {
        match self {
            Self::PriceFilter => &PriceFilterHandler,
            Self::PercentPrice => &PercentPriceHandler,
            Self::LotSize => &LotSizeHandler,
            Self::MinNotional => &MinNotionalHandler,
            Self::IcebergParts => &IcebergPartsHandler,
            Self::MarketLotSize => &MarketLotSizeHandler,
            Self::MaxNumAlgoOrders => &MaxNumAlgoOrdersHandler,
            Self::MaxNumOrders => &MaxNumOrdersHandler,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_uppercase();

        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| {
                failure(
                    "filter_kind",
                    s,
                    ErrorKind::InvalidInput {
                        field: "filter",
                        reason: String::from("unknown filter kind"),
                    },
                )
            })
    }
}

// ===== Constraint Fields =====
// Every field is optional: a field the exchange did not send stays `None`,
// a zero the exchange did send stays zero.

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PriceFilter {
    pub min_price: Option<Price>,
    pub max_price: Option<Price>,
    pub tick_size: Option<Price>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PercentPrice {
    pub multiplier_up: Option<Decimal>,
    pub multiplier_down: Option<Decimal>,
    /// Spot and margin only
    pub avg_price_mins: Option<u32>,
    /// Futures only
    pub multiplier_decimal: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LotSize {
    pub min_qty: Option<Quantity>,
    pub max_qty: Option<Quantity>,
    pub step_size: Option<Quantity>,
}

impl LotSize {
    fn parse(raw: &RawFilter) -> Result<Self, ErrorKind> {
        Ok(Self {
            min_qty: decimal_field(raw, "minQty")?,
            max_qty: decimal_field(raw, "maxQty")?,
            step_size: decimal_field(raw, "stepSize")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MinNotional {
    pub min_notional: Option<Amount>,
    pub apply_to_market: Option<bool>,
    pub avg_price_mins: Option<u32>,
}

impl MinNotional {
    fn parse(raw: &RawFilter) -> Result<Self, ErrorKind> {
        Ok(Self {
            min_notional: decimal_field(raw, "minNotional")?,
            apply_to_market: bool_field(raw, "applyToMarket")?,
            avg_price_mins: integer_field(raw, "avgPriceMins")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderLimit {
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ConstraintFields {
    PriceFilter(PriceFilter),
    PercentPrice(PercentPrice),
    LotSize(LotSize),
    MinNotional(MinNotional),
    IcebergParts(OrderLimit),
    MarketLotSize(LotSize),
    MaxNumAlgoOrders(OrderLimit),
    MaxNumOrders(OrderLimit),
}

impl ConstraintFields {
    pub fn kind(&self) -> FilterKind {
        match self {
            Self::PriceFilter(_) => FilterKind::PriceFilter,
            Self::PercentPrice(_) => FilterKind::PercentPrice,
            Self::LotSize(_) => FilterKind::LotSize,
            Self::MinNotional(_) => FilterKind::MinNotional,
            Self::IcebergParts(_) => FilterKind::IcebergParts,
            Self::MarketLotSize(_) => FilterKind::MarketLotSize,
            Self::MaxNumAlgoOrders(_) => FilterKind::MaxNumAlgoOrders,
            Self::MaxNumOrders(_) => FilterKind::MaxNumOrders,
        }
    }
}

// ===== Filter Handlers =====
pub trait FilterHandler: Sync {
    /// Whether the filter exists at all for a wallet
    fn supports(&self, _wallet: WalletKind) -> bool {
        true
    }

    fn parse(&self, wallet: WalletKind, raw: &RawFilter) -> Result<ConstraintFields, ErrorKind>;
}

struct PriceFilterHandler;
struct PercentPriceHandler;
struct LotSizeHandler;
struct MinNotionalHandler;
struct IcebergPartsHandler;
struct MarketLotSizeHandler;
struct MaxNumAlgoOrdersHandler;
struct MaxNumOrdersHandler;

impl FilterHandler for PriceFilterHandler {
    fn parse(&self, _wallet: WalletKind, raw: &RawFilter) -> Result<ConstraintFields, ErrorKind> {
        Ok(ConstraintFields::PriceFilter(PriceFilter {
            min_price: decimal_field(raw, "minPrice")?,
            max_price: decimal_field(raw, "maxPrice")?,
            tick_size: decimal_field(raw, "tickSize")?,
        }))
    }
}

impl FilterHandler for PercentPriceHandler {
    fn parse(&self, wallet: WalletKind, raw: &RawFilter) -> Result<ConstraintFields, ErrorKind> {
        let (avg_price_mins, multiplier_decimal) = match wallet {
            WalletKind::Futures => (None, integer_field(raw, "multiplierDecimal")?),
            _ => (integer_field(raw, "avgPriceMins")?, None),
        };

        Ok(ConstraintFields::PercentPrice(PercentPrice {
            multiplier_up: decimal_field(raw, "multiplierUp")?,
            multiplier_down: decimal_field(raw, "multiplierDown")?,
            avg_price_mins,
            multiplier_decimal,
        }))
    }
}

impl FilterHandler for LotSizeHandler {
    fn parse(&self, _wallet: WalletKind, raw: &RawFilter) -> Result<ConstraintFields, ErrorKind> {
        Ok(ConstraintFields::LotSize(LotSize::parse(raw)?))
    }
}

impl FilterHandler for MinNotionalHandler {
    fn supports(&self, wallet: WalletKind) -> bool {
        wallet != WalletKind::Futures
    }

    fn parse(&self, _wallet: WalletKind, raw: &RawFilter) -> Result<ConstraintFields, ErrorKind> {
        Ok(ConstraintFields::MinNotional(MinNotional::parse(raw)?))
    }
}

impl FilterHandler for IcebergPartsHandler {
    fn supports(&self, wallet: WalletKind) -> bool {
        wallet != WalletKind::Futures
    }

    fn parse(&self, _wallet: WalletKind, raw: &RawFilter) -> Result<ConstraintFields, ErrorKind> {
        Ok(ConstraintFields::IcebergParts(OrderLimit {
            limit: integer_field(raw, "limit")?,
        }))
    }
}

impl FilterHandler for MarketLotSizeHandler {
    fn parse(&self, _wallet: WalletKind, raw: &RawFilter) -> Result<ConstraintFields, ErrorKind> {
        Ok(ConstraintFields::MarketLotSize(LotSize::parse(raw)?))
    }
}

impl FilterHandler for MaxNumAlgoOrdersHandler {
    fn parse(&self, wallet: WalletKind, raw: &RawFilter) -> Result<ConstraintFields, ErrorKind> {
        let field = match wallet {
            WalletKind::Futures => "limit",
            _ => "maxNumAlgoOrders",
        };

        Ok(ConstraintFields::MaxNumAlgoOrders(OrderLimit {
            limit: integer_field(raw, field)?,
        }))
    }
}

impl FilterHandler for MaxNumOrdersHandler {
    fn parse(&self, wallet: WalletKind, raw: &RawFilter) -> Result<ConstraintFields, ErrorKind> {
        let field = match wallet {
            WalletKind::Futures => "limit",
            _ => "maxNumOrders",
        };

        Ok(ConstraintFields::MaxNumOrders(OrderLimit {
            limit: integer_field(raw, field)?,
        }))
    }
}

fn decimal_field(raw: &RawFilter, name: &str) -> Result<Option<Decimal>, ErrorKind> {
    let text = match raw.field(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    match parse_decimal(&text) {
        Some(value) => Ok(Some(value)),
        None => Err(ErrorKind::Conversion { value: text }),
    }
}

fn integer_field(raw: &RawFilter, name: &str) -> Result<Option<u32>, ErrorKind> {
    let text = match raw.field(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    };

    match text.parse::<u32>() {
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(ErrorKind::Conversion { value: text }),
    }
}

fn bool_field(raw: &RawFilter, name: &str) -> Result<Option<bool>, ErrorKind> {
    match raw.field(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) => match s.trim() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            "" => Ok(None),
            _ => Err(ErrorKind::Conversion { value: s.clone() }),
        },
        Some(other) => Err(ErrorKind::Conversion {
            value: other.to_string(),
        }),
    }
}

/// LOT_SIZE fields the quantity engine cannot work without
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LotSizeLimits {
    pub min_qty: Quantity,
    pub step_size: Quantity,
}

impl<E: Exchange> Trader<E> {
    /// Resolves one filter of `symbol` (the session pair when `None`) for the
    /// session wallet.
    #[instrument(skip_all)]
    pub async fn resolve_filter(
        &self,
        kind: FilterKind,
        symbol: Option<&str>,
    ) -> Result<ConstraintFields, TradeError> {
        const OPERATION: &str = "resolve_filter";

        let wallet = self.account().wallet;
        let symbol = symbol
            .map(|s| s.trim().to_uppercase())
            .unwrap_or_else(|| self.symbol());
        let inputs = format!("{}|{}|{}", kind, symbol, wallet);

        let handler = kind.handler();
        if !handler.supports(wallet) {
            return Err(failure(
                OPERATION,
                inputs,
                ErrorKind::UnsupportedForWallet {
                    wallet,
                    feature: kind.to_string(),
                },
            ));
        }

        let raw = self.raw_filter(OPERATION, &inputs, kind, &symbol).await?;
        handler
            .parse(wallet, &raw)
            .map_err(|e| failure(OPERATION, inputs, e))
    }

    /// LOT_SIZE of the session pair with minQty and stepSize present
    pub async fn lot_size(&self) -> Result<LotSizeLimits, TradeError> {
        const OPERATION: &str = "lot_size";

        let symbol = self.symbol();
        let inputs = format!("{}|{}|{}", FilterKind::LotSize, symbol, self.account().wallet);

        let raw = self
            .raw_filter(OPERATION, &inputs, FilterKind::LotSize, &symbol)
            .await?;
        let lot_size = LotSize::parse(&raw).map_err(|e| failure(OPERATION, inputs.clone(), e))?;

        let missing = |field: &'static str| {
            failure(
                OPERATION,
                inputs.clone(),
                ErrorKind::FieldNotFound {
                    filter: FilterKind::LotSize,
                    field,
                },
            )
        };

        Ok(LotSizeLimits {
            min_qty: lot_size.min_qty.ok_or_else(|| missing("minQty"))?,
            step_size: lot_size.step_size.ok_or_else(|| missing("stepSize"))?,
        })
    }

    /// MIN_NOTIONAL minNotional of the session pair. Fails on futures wallets.
    pub async fn min_notional(&self) -> Result<Amount, TradeError> {
        const OPERATION: &str = "min_notional";

        let wallet = self.account().wallet;
        let symbol = self.symbol();
        let inputs = format!("{}|{}|{}", FilterKind::MinNotional, symbol, wallet);

        if !FilterKind::MinNotional.handler().supports(wallet) {
            return Err(failure(
                OPERATION,
                inputs,
                ErrorKind::UnsupportedForWallet {
                    wallet,
                    feature: FilterKind::MinNotional.to_string(),
                },
            ));
        }

        let raw = self
            .raw_filter(OPERATION, &inputs, FilterKind::MinNotional, &symbol)
            .await?;
        let min_notional =
            MinNotional::parse(&raw).map_err(|e| failure(OPERATION, inputs.clone(), e))?;

        min_notional.min_notional.ok_or_else(|| {
            failure(
                OPERATION,
                inputs,
                ErrorKind::FieldNotFound {
                    filter: FilterKind::MinNotional,
                    field: "minNotional",
                },
            )
        })
    }

    // Spot and margin read one symbol, futures scan the whole futures list
    async fn raw_filter(
        &self,
        operation: &'static str,
        inputs: &str,
        kind: FilterKind,
        symbol: &str,
    ) -> Result<RawFilter, TradeError> {
        let metadata = match self.account().wallet {
            WalletKind::Spot | WalletKind::Margin => self.exchange().symbol_metadata(symbol).await,
            WalletKind::Futures => self
                .exchange()
                .futures_symbols()
                .await
                .map(|symbols| symbols.into_iter().find(|s| s.symbol == symbol)),
        };

        let metadata = match metadata {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                return Err(failure(
                    operation,
                    inputs,
                    ErrorKind::SymbolNotFound {
                        symbol: symbol.to_string(),
                    },
                ))
            }
            Err(e) => return Err(upstream(operation, inputs, e)),
        };

        match metadata.filter(kind.as_str()) {
            Some(raw) => Ok(raw.clone()),
            None => Err(failure(
                operation,
                inputs,
                ErrorKind::FilterNotFound {
                    symbol: symbol.to_string(),
                    filter: kind,
                },
            )),
        }
    }
}
