mod auth;
mod binance;
mod error;

pub use binance::BinanceExchange;
pub use error::{ApiError, ExchangeError, ExchangeResult};

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
    account::WalletKind,
    noun::*,
    order::{OrderType, Side},
};

/// Connectivity client the trading core talks to. Every call is a single
/// round-trip; nothing is cached between calls.
pub trait Exchange: Send + Sync {
    /// Balance of one asset in a wallet. An asset the wallet never held reads as zero.
    fn balance(
        &self,
        wallet: WalletKind,
        asset: &str,
    ) -> impl Future<Output = ExchangeResult<Balance>> + Send;

    /// Every asset of a wallet with a non-zero free or locked amount
    fn balances(&self, wallet: WalletKind) -> impl Future<Output = ExchangeResult<Vec<Balance>>> + Send;

    /// Spot and margin share the spot exchange metadata
    fn symbol_metadata(
        &self,
        symbol: &str,
    ) -> impl Future<Output = ExchangeResult<Option<SymbolMetadata>>> + Send;

    fn futures_symbols(&self) -> impl Future<Output = ExchangeResult<Vec<SymbolMetadata>>> + Send;

    /// Whether `symbol` is listed on the market behind `wallet`
    fn symbol_exists(
        &self,
        wallet: WalletKind,
        symbol: &str,
    ) -> impl Future<Output = ExchangeResult<bool>> + Send;

    /// Trailing average price, `None` when the market does not exist
    fn average_price(
        &self,
        symbol: &str,
    ) -> impl Future<Output = ExchangeResult<Option<Price>>> + Send;

    /// Futures mark price, `None` when the contract does not exist
    fn mark_price(
        &self,
        symbol: &str,
    ) -> impl Future<Output = ExchangeResult<Option<Price>>> + Send;

    fn trade_fee(&self, symbol: &str) -> impl Future<Output = ExchangeResult<TradeFee>> + Send;

    /// Spot request and order rate limits
    fn rate_limits(&self) -> impl Future<Output = ExchangeResult<Vec<RateLimit>>> + Send;

    fn system_status(&self) -> impl Future<Output = ExchangeResult<SystemStatus>> + Send;

    fn submit_order(
        &self,
        wallet: WalletKind,
        request: &OrderRequest,
    ) -> impl Future<Output = ExchangeResult<OrderRecord>> + Send;

    fn cancel_order(
        &self,
        wallet: WalletKind,
        symbol: &str,
        order_id: OrderId,
    ) -> impl Future<Output = ExchangeResult<OrderRecord>> + Send;

    fn open_orders(
        &self,
        wallet: WalletKind,
        symbol: Option<&str>,
    ) -> impl Future<Output = ExchangeResult<Vec<OrderRecord>>> + Send;

    fn positions(
        &self,
        symbol: Option<&str>,
    ) -> impl Future<Output = ExchangeResult<Vec<PositionRecord>>> + Send;

    fn set_leverage(
        &self,
        symbol: &str,
        leverage: u32,
    ) -> impl Future<Output = ExchangeResult<LeverageRecord>> + Send;

    fn transfer_dust(&self, asset: &str) -> impl Future<Output = ExchangeResult<DustResult>> + Send;
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Balance {
    pub asset: Asset,
    pub free: Amount,
    pub locked: Amount,
}

impl Balance {
    pub fn zero(asset: &str) -> Self {
        Self {
            asset: asset.to_string(),
            free: Decimal::ZERO,
            locked: Decimal::ZERO,
        }
    }

    pub fn total(&self) -> Amount {
        self.free + self.locked
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMetadata {
    pub symbol: Symbol,
    #[serde(default)]
    pub base_asset: Asset,
    #[serde(default)]
    pub quote_asset: Asset,
    #[serde(default)]
    pub filters: Vec<RawFilter>,
}

impl SymbolMetadata {
    pub fn filter(&self, filter_type: &str) -> Option<&RawFilter> {
        self.filters.iter().find(|f| f.filter_type == filter_type)
    }
}

/// Exchange filter as delivered, every field besides the type kept untouched
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawFilter {
    #[serde(rename = "filterType")]
    pub filter_type: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RawFilter {
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}

/// Commission rates in percent (0.1 means 0.1 %)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TradeFee {
    pub maker: Percent,
    pub taker: Percent,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    /// REQUEST_WEIGHT, ORDERS or RAW_REQUESTS
    pub rate_limit_type: String,
    /// SECOND, MINUTE or DAY
    pub interval: String,
    pub interval_num: u32,
    pub limit: u64,
}

/// 0 is normal operation, 1 is system maintenance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SystemStatus {
    pub status: i64,
    #[serde(default)]
    pub msg: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    Gtc, // Good Till Cancel
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Quantity,
    /// Limit price; the limit leg price for OCO
    pub price: Option<Price>,
    pub stop_price: Option<Price>,
    /// Limit price of the OCO stop leg
    pub stop_limit_price: Option<Price>,
    pub time_in_force: Option<TimeInForce>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderRecord {
    pub symbol: Option<Symbol>,
    pub order_id: Option<OrderId>,
    pub order_list_id: Option<i64>,
    pub client_order_id: Option<String>,
    pub transact_time: Option<i64>,
    pub transaction_time: Option<i64>,
    pub update_time: Option<i64>,
    pub time: Option<i64>,
    pub price: Option<String>,
    pub stop_price: Option<String>,
    pub orig_qty: Option<String>,
    pub executed_qty: Option<String>,
    pub cummulative_quote_qty: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub order_type: Option<String>,
    pub side: Option<String>,
    pub fills: Vec<Fill>,
    pub order_reports: Vec<OrderRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Fill {
    pub price: String,
    pub qty: String,
    pub commission: String,
    pub commission_asset: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub symbol: Symbol,
    pub position_amt: Quantity,
    pub entry_price: Price,
    pub mark_price: Price,
    pub un_realized_profit: Amount,
    pub liquidation_price: Price,
    pub leverage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeverageRecord {
    pub symbol: Symbol,
    pub leverage: u32,
    #[serde(default)]
    pub max_notional_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DustResult {
    pub total_service_charge: Amount,
    pub total_transfered: Amount,
    #[serde(default)]
    pub transfer_result: Vec<DustResultItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DustResultItem {
    pub from_asset: Asset,
    pub amount: Quantity,
    pub service_charge_amount: Amount,
    pub transfered_amount: Amount,
}
