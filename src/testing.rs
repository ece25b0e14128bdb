use std::{collections::HashSet, sync::Mutex};

use serde_json::{json, Value};

use crate::{
    account::{AccountContext, TradingPair, WalletKind},
    exchange::{
        Balance, DustResult, DustResultItem, Exchange, ExchangeError, ExchangeResult,
        LeverageRecord, OrderRecord, OrderRequest, PositionRecord, RateLimit, RawFilter,
        SymbolMetadata, SystemStatus, TradeFee,
    },
    noun::*,
    order::OrderType,
    Trader,
};

pub fn decimal(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn raw_filter(value: Value) -> RawFilter {
    serde_json::from_value(value).unwrap()
}

pub fn spot_trader(exchange: MockExchange) -> Trader<MockExchange> {
    trader(exchange, WalletKind::Spot)
}

pub fn margin_trader(exchange: MockExchange) -> Trader<MockExchange> {
    trader(exchange, WalletKind::Margin)
}

pub fn futures_trader(exchange: MockExchange) -> Trader<MockExchange> {
    trader(exchange, WalletKind::Futures)
}

fn trader(exchange: MockExchange, wallet: WalletKind) -> Trader<MockExchange> {
    Trader::new(
        exchange,
        AccountContext::new(wallet, TradingPair::new("BTC", "USDT")),
    )
}

/// In-memory exchange recording every call it receives
pub struct MockExchange {
    balances: Vec<Balance>,
    average_prices: Vec<(Symbol, Price)>,
    fee: TradeFee,
    spot_symbols: Vec<SymbolMetadata>,
    futures_symbols: Vec<SymbolMetadata>,
    maintenance: bool,
    dust: Vec<Amount>,
    failing: HashSet<&'static str>,
    rejection: Option<(i64, String)>,
    calls: Mutex<Vec<String>>,
    submitted: Mutex<Vec<(WalletKind, OrderRequest)>>,
}

impl MockExchange {
    /// Account holding 1000 USDT and 0.5 BTC, BTCUSDT averaging 20000
    pub fn btc_usdt() -> Self {
        Self {
            balances: vec![
                balance("USDT", "1000", "0"),
                balance("BTC", "0.5", "0"),
            ],
            average_prices: vec![(String::from("BTCUSDT"), decimal("20000"))],
            fee: TradeFee {
                maker: decimal("0.1"),
                taker: decimal("0.1"),
            },
            spot_symbols: vec![metadata(vec![
                json!({
                    "filterType": "PRICE_FILTER",
                    "minPrice": "0.01000000",
                    "maxPrice": "1000000.00000000",
                    "tickSize": "0.01000000"
                }),
                json!({
                    "filterType": "PERCENT_PRICE",
                    "multiplierUp": "5",
                    "multiplierDown": "0.2",
                    "avgPriceMins": 5
                }),
                json!({
                    "filterType": "LOT_SIZE",
                    "minQty": "0.00010000",
                    "maxQty": "9000.00000000",
                    "stepSize": "0.00001000"
                }),
                json!({
                    "filterType": "MIN_NOTIONAL",
                    "minNotional": "10.00000000",
                    "applyToMarket": true,
                    "avgPriceMins": 5
                }),
                json!({"filterType": "ICEBERG_PARTS", "limit": 10}),
                json!({
                    "filterType": "MARKET_LOT_SIZE",
                    "minQty": "0.00000000",
                    "maxQty": "100.00000000",
                    "stepSize": "0.00000000"
                }),
                json!({"filterType": "MAX_NUM_ORDERS", "maxNumOrders": 200}),
                json!({"filterType": "MAX_NUM_ALGO_ORDERS", "maxNumAlgoOrders": 5}),
            ])],
            futures_symbols: vec![metadata(vec![
                json!({
                    "filterType": "PRICE_FILTER",
                    "minPrice": "556.72",
                    "maxPrice": "4529764",
                    "tickSize": "0.10"
                }),
                json!({
                    "filterType": "LOT_SIZE",
                    "minQty": "0.001",
                    "maxQty": "1000",
                    "stepSize": "0.001"
                }),
                json!({
                    "filterType": "MARKET_LOT_SIZE",
                    "minQty": "0.001",
                    "maxQty": "120",
                    "stepSize": "0.001"
                }),
                json!({"filterType": "MAX_NUM_ORDERS", "limit": 200}),
                json!({"filterType": "MAX_NUM_ALGO_ORDERS", "limit": 10}),
                json!({
                    "filterType": "PERCENT_PRICE",
                    "multiplierUp": "1.0500",
                    "multiplierDown": "0.9500",
                    "multiplierDecimal": 4
                }),
                json!({"filterType": "MIN_NOTIONAL", "notional": "5"}),
            ])],
            maintenance: false,
            dust: vec![decimal("0.03")],
            failing: HashSet::new(),
            rejection: None,
            calls: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_balance(mut self, asset: &str, free: &str, locked: &str) -> Self {
        let entry = balance(asset, free, locked);
        match self.balances.iter_mut().find(|b| b.asset == asset) {
            Some(existing) => *existing = entry,
            None => self.balances.push(entry),
        }
        self
    }

    pub fn with_average_price(mut self, symbol: &str, price: &str) -> Self {
        self.average_prices.retain(|(s, _)| s != symbol);
        self.average_prices.push((symbol.to_string(), decimal(price)));
        self
    }

    pub fn with_fee(mut self, maker: &str, taker: &str) -> Self {
        self.fee = TradeFee {
            maker: decimal(maker),
            taker: decimal(taker),
        };
        self
    }

    /// Replaces the spot filter of the same type, or adds it
    pub fn with_filter(mut self, value: Value) -> Self {
        let filter = raw_filter(value);
        let filters = &mut self.spot_symbols[0].filters;
        match filters.iter_mut().find(|f| f.filter_type == filter.filter_type) {
            Some(existing) => *existing = filter,
            None => filters.push(filter),
        }
        self
    }

    pub fn without_filter(mut self, filter_type: &str) -> Self {
        for metadata in self.spot_symbols.iter_mut() {
            metadata.filters.retain(|f| f.filter_type != filter_type);
        }
        self
    }

    /// Amounts converted per dust transfer item
    pub fn with_dust(mut self, amounts: &[&str]) -> Self {
        self.dust = amounts.iter().map(|a| decimal(a)).collect();
        self
    }

    pub fn in_maintenance(mut self) -> Self {
        self.maintenance = true;
        self
    }

    /// Makes `method` answer with an unknown-error response
    pub fn failing(mut self, method: &'static str) -> Self {
        self.failing.insert(method);
        self
    }

    pub fn rejecting_orders(mut self, code: i64, msg: &str) -> Self {
        self.rejection = Some((code, msg.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<(WalletKind, OrderRequest)> {
        self.submitted.lock().unwrap().clone()
    }

    fn record(&self, method: &'static str, call: String) -> ExchangeResult<()> {
        self.calls.lock().unwrap().push(call);

        if self.failing.contains(method) {
            return Err(ExchangeError::Api {
                code: -1000,
                msg: String::from("An unknown error occurred while processing the request"),
            });
        }

        Ok(())
    }
}

fn balance(asset: &str, free: &str, locked: &str) -> Balance {
    Balance {
        asset: asset.to_string(),
        free: decimal(free),
        locked: decimal(locked),
    }
}

fn metadata(filters: Vec<Value>) -> SymbolMetadata {
    SymbolMetadata {
        symbol: String::from("BTCUSDT"),
        base_asset: String::from("BTC"),
        quote_asset: String::from("USDT"),
        filters: filters.into_iter().map(raw_filter).collect(),
    }
}

fn exchange_type(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "MARKET",
        OrderType::Limit => "LIMIT",
        OrderType::StopLimit => "STOP_LOSS_LIMIT",
        OrderType::Oco => "OCO",
    }
}

impl Exchange for MockExchange {
    async fn balance(&self, wallet: WalletKind, asset: &str) -> ExchangeResult<Balance> {
        self.record("balance", format!("balance:{}:{}", wallet, asset))?;

        Ok(self
            .balances
            .iter()
            .find(|b| b.asset == asset)
            .cloned()
            .unwrap_or_else(|| Balance::zero(asset)))
    }

    async fn balances(&self, wallet: WalletKind) -> ExchangeResult<Vec<Balance>> {
        self.record("balances", format!("balances:{}", wallet))?;

        Ok(self
            .balances
            .iter()
            .filter(|b| !b.total().is_zero())
            .cloned()
            .collect())
    }

    async fn symbol_metadata(&self, symbol: &str) -> ExchangeResult<Option<SymbolMetadata>> {
        self.record("symbol_metadata", format!("symbol_metadata:{}", symbol))?;

        Ok(self
            .spot_symbols
            .iter()
            .find(|m| m.symbol == symbol)
            .cloned())
    }

    async fn futures_symbols(&self) -> ExchangeResult<Vec<SymbolMetadata>> {
        self.record("futures_symbols", String::from("futures_symbols"))?;

        Ok(self.futures_symbols.clone())
    }

    async fn symbol_exists(&self, wallet: WalletKind, symbol: &str) -> ExchangeResult<bool> {
        self.record("symbol_exists", format!("symbol_exists:{}:{}", wallet, symbol))?;

        let listed = match wallet {
            WalletKind::Spot | WalletKind::Margin => &self.spot_symbols,
            WalletKind::Futures => &self.futures_symbols,
        };
        Ok(listed.iter().any(|m| m.symbol == symbol))
    }

    async fn mark_price(&self, symbol: &str) -> ExchangeResult<Option<Price>> {
        self.record("mark_price", format!("mark_price:{}", symbol))?;

        Ok(self
            .futures_symbols
            .iter()
            .any(|m| m.symbol == symbol)
            .then(|| decimal("20500.1")))
    }

    async fn rate_limits(&self) -> ExchangeResult<Vec<RateLimit>> {
        self.record("rate_limits", String::from("rate_limits"))?;

        let limit = |rate_limit_type: &str, interval: &str, interval_num: u32, limit: u64| RateLimit {
            rate_limit_type: rate_limit_type.to_string(),
            interval: interval.to_string(),
            interval_num,
            limit,
        };
        Ok(vec![
            limit("REQUEST_WEIGHT", "MINUTE", 1, 6000),
            limit("ORDERS", "SECOND", 10, 100),
            limit("ORDERS", "DAY", 1, 200000),
            limit("RAW_REQUESTS", "MINUTE", 5, 61000),
        ])
    }

    async fn system_status(&self) -> ExchangeResult<SystemStatus> {
        self.record("system_status", String::from("system_status"))?;

        Ok(match self.maintenance {
            true => SystemStatus {
                status: 1,
                msg: String::from("system maintenance"),
            },
            false => SystemStatus {
                status: 0,
                msg: String::from("normal"),
            },
        })
    }

    async fn average_price(&self, symbol: &str) -> ExchangeResult<Option<Price>> {
        self.record("average_price", format!("average_price:{}", symbol))?;

        Ok(self
            .average_prices
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, price)| *price))
    }

    async fn trade_fee(&self, symbol: &str) -> ExchangeResult<TradeFee> {
        self.record("trade_fee", format!("trade_fee:{}", symbol))?;

        Ok(self.fee)
    }

    async fn submit_order(
        &self,
        wallet: WalletKind,
        request: &OrderRequest,
    ) -> ExchangeResult<OrderRecord> {
        self.record("submit_order", format!("submit_order:{}", wallet))?;

        if let Some((code, msg)) = &self.rejection {
            return Err(ExchangeError::Api {
                code: *code,
                msg: msg.clone(),
            });
        }

        let mut submitted = self.submitted.lock().unwrap();
        submitted.push((wallet, request.clone()));

        Ok(OrderRecord {
            symbol: Some(request.symbol.clone()),
            order_id: Some(submitted.len() as OrderId),
            transact_time: Some(1_664_444_853_000),
            price: request.price.map(|p| p.to_string()),
            orig_qty: Some(request.quantity.to_string()),
            executed_qty: Some(String::from("0")),
            status: Some(String::from("NEW")),
            order_type: Some(exchange_type(request.order_type).to_string()),
            side: Some(request.side.as_str().to_string()),
            ..Default::default()
        })
    }

    async fn cancel_order(
        &self,
        wallet: WalletKind,
        symbol: &str,
        order_id: OrderId,
    ) -> ExchangeResult<OrderRecord> {
        self.record(
            "cancel_order",
            format!("cancel_order:{}:{}:{}", wallet, symbol, order_id),
        )?;

        Ok(OrderRecord {
            symbol: Some(symbol.to_string()),
            order_id: Some(order_id),
            price: Some(String::from("19000.00000000")),
            orig_qty: Some(String::from("0.01000000")),
            executed_qty: Some(String::from("0.00000000")),
            status: Some(String::from("CANCELED")),
            order_type: Some(String::from("LIMIT")),
            side: Some(String::from("BUY")),
            ..Default::default()
        })
    }

    async fn open_orders(
        &self,
        wallet: WalletKind,
        symbol: Option<&str>,
    ) -> ExchangeResult<Vec<OrderRecord>> {
        self.record(
            "open_orders",
            format!("open_orders:{}:{}", wallet, symbol.unwrap_or("*")),
        )?;

        Ok(vec![OrderRecord {
            symbol: Some(String::from("BTCUSDT")),
            order_id: Some(7),
            time: Some(1_664_444_853_000),
            price: Some(String::from("19000.00000000")),
            orig_qty: Some(String::from("0.01000000")),
            executed_qty: Some(String::from("0.00000000")),
            status: Some(String::from("NEW")),
            order_type: Some(String::from("LIMIT")),
            side: Some(String::from("BUY")),
            ..Default::default()
        }])
    }

    async fn positions(&self, symbol: Option<&str>) -> ExchangeResult<Vec<PositionRecord>> {
        self.record(
            "positions",
            format!("positions:{}", symbol.unwrap_or("*")),
        )?;

        let position = PositionRecord {
            symbol: String::from("BTCUSDT"),
            position_amt: decimal("0.010"),
            entry_price: decimal("20000"),
            mark_price: decimal("20500"),
            un_realized_profit: decimal("5"),
            liquidation_price: decimal("18200.5"),
            leverage: decimal("10"),
        };

        Ok(match symbol {
            Some(symbol) if symbol != position.symbol => Vec::new(),
            _ => vec![position],
        })
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<LeverageRecord> {
        self.record(
            "set_leverage",
            format!("set_leverage:{}:{}", symbol, leverage),
        )?;

        Ok(LeverageRecord {
            symbol: symbol.to_string(),
            leverage,
            max_notional_value: Some(String::from("1000000")),
        })
    }

    async fn transfer_dust(&self, asset: &str) -> ExchangeResult<DustResult> {
        self.record("transfer_dust", format!("transfer_dust:{}", asset))?;

        Ok(DustResult {
            total_service_charge: decimal("0.005"),
            total_transfered: decimal("0.25"),
            transfer_result: self
                .dust
                .iter()
                .map(|amount| DustResultItem {
                    from_asset: asset.to_string(),
                    amount: *amount,
                    service_charge_amount: decimal("0.005"),
                    transfered_amount: decimal("0.25"),
                })
                .collect(),
        })
    }
}
