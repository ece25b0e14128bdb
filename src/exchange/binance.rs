use reqwest::{Client, Method, Response};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, info};

use super::{
    auth::{build_query, build_signed_query},
    ApiError, Balance, DustResult, Exchange, ExchangeError, ExchangeResult, LeverageRecord,
    OrderRecord, OrderRequest, PositionRecord, RateLimit, SymbolMetadata, SystemStatus,
    TimeInForce, TradeFee,
};
use crate::{
    account::WalletKind, common::time::timestamp_millis, config::ClientConfig, noun::*,
    order::OrderType,
};

// Binance: "Invalid symbol."
const INVALID_SYMBOL: i64 = -1121;

type Params = Vec<(&'static str, String)>;

// ===== Binance Exchange =====
pub struct BinanceExchange {
    client: Client,
    config: ClientConfig,
}

impl BinanceExchange {
    pub fn new(config: ClientConfig) -> ExchangeResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_production(&self) -> bool {
        self.config.is_production()
    }

    fn spot_url(&self) -> &str {
        &self.config.spot_base_url
    }

    fn futures_url(&self) -> &str {
        &self.config.futures_base_url
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> ExchangeResult<T> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| {
                ExchangeError::Parse(format!("Failed to parse response: {}. Body: {}", e, text))
            })
        } else if let Ok(api_error) = serde_json::from_str::<ApiError>(&text) {
            Err(ExchangeError::Api {
                code: api_error.code,
                msg: api_error.msg,
            })
        } else {
            Err(ExchangeError::Api {
                code: status.as_u16() as i64,
                msg: text,
            })
        }
    }

    async fn get_public<T: DeserializeOwned>(
        &self,
        base_url: &str,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let query = build_query(params);
        let url = if query.is_empty() {
            format!("{}{}", base_url, endpoint)
        } else {
            format!("{}{}?{}", base_url, endpoint, query)
        };

        debug!(%url, "GET");
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        base_url: &str,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| ExchangeError::Auth("API key not set".to_string()))?;
        let secret_key = self
            .config
            .secret_key
            .as_ref()
            .ok_or_else(|| ExchangeError::Auth("Secret key not set".to_string()))?;

        let query = build_signed_query(
            params,
            secret_key,
            timestamp_millis(),
            self.config.recv_window,
        )?;
        let url = format!("{}{}?{}", base_url, endpoint, query);

        debug!(%method, endpoint, "signed request");
        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn wallet_balances(&self, wallet: WalletKind) -> ExchangeResult<Vec<Balance>> {
        match wallet {
            WalletKind::Spot => {
                let account: SpotAccount = self
                    .send_signed(Method::GET, self.spot_url(), "/api/v3/account", &[])
                    .await?;
                Ok(account.balances)
            }
            WalletKind::Margin => {
                let account: MarginAccount = self
                    .send_signed(Method::GET, self.spot_url(), "/sapi/v1/margin/account", &[])
                    .await?;
                Ok(account.user_assets)
            }
            WalletKind::Futures => {
                let balances: Vec<FuturesBalance> = self
                    .send_signed(Method::GET, self.futures_url(), "/fapi/v2/balance", &[])
                    .await?;
                Ok(balances.into_iter().map(Balance::from).collect())
            }
        }
    }

    async fn submit_oco(&self, wallet: WalletKind, request: &OrderRequest) -> ExchangeResult<OrderRecord> {
        if wallet != WalletKind::Spot {
            return Err(ExchangeError::InvalidParameter(format!(
                "OCO orders are not available on the {} wallet",
                wallet
            )));
        }

        let params = oco_params(request)?;
        if !self.is_production() {
            info!(symbol = %request.symbol, "not in production, OCO order not submitted");
            return Ok(echo_record(request));
        }

        self.send_signed(Method::POST, self.spot_url(), "/api/v3/order/oco", &params)
            .await
    }
}

impl Exchange for BinanceExchange {
    async fn balance(&self, wallet: WalletKind, asset: &str) -> ExchangeResult<Balance> {
        let balances = self.wallet_balances(wallet).await?;

        Ok(balances
            .into_iter()
            .find(|b| b.asset == asset)
            .unwrap_or_else(|| Balance::zero(asset)))
    }

    async fn balances(&self, wallet: WalletKind) -> ExchangeResult<Vec<Balance>> {
        let balances = self.wallet_balances(wallet).await?;

        Ok(balances.into_iter().filter(|b| !b.total().is_zero()).collect())
    }

    async fn symbol_metadata(&self, symbol: &str) -> ExchangeResult<Option<SymbolMetadata>> {
        let params = [("symbol", symbol.to_string())];
        let info: ExchangeInfo = match self
            .get_public(self.spot_url(), "/api/v3/exchangeInfo", &params)
            .await
        {
            Ok(info) => info,
            Err(ExchangeError::Api {
                code: INVALID_SYMBOL,
                ..
            }) => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(info.symbols.into_iter().find(|s| s.symbol == symbol))
    }

    async fn futures_symbols(&self) -> ExchangeResult<Vec<SymbolMetadata>> {
        let info: ExchangeInfo = self
            .get_public(self.futures_url(), "/fapi/v1/exchangeInfo", &[])
            .await?;

        Ok(info.symbols)
    }

    async fn symbol_exists(&self, wallet: WalletKind, symbol: &str) -> ExchangeResult<bool> {
        match wallet {
            WalletKind::Spot | WalletKind::Margin => {
                Ok(self.symbol_metadata(symbol).await?.is_some())
            }
            WalletKind::Futures => Ok(self
                .futures_symbols()
                .await?
                .iter()
                .any(|s| s.symbol == symbol)),
        }
    }

    async fn average_price(&self, symbol: &str) -> ExchangeResult<Option<Price>> {
        let params = [("symbol", symbol.to_string())];
        match self
            .get_public::<AveragePrice>(self.spot_url(), "/api/v3/avgPrice", &params)
            .await
        {
            Ok(average) => Ok(Some(average.price)),
            Err(ExchangeError::Api {
                code: INVALID_SYMBOL,
                ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn mark_price(&self, symbol: &str) -> ExchangeResult<Option<Price>> {
        let params = [("symbol", symbol.to_string())];
        match self
            .get_public::<PremiumIndex>(self.futures_url(), "/fapi/v1/premiumIndex", &params)
            .await
        {
            Ok(index) => Ok(Some(index.mark_price)),
            Err(ExchangeError::Api {
                code: INVALID_SYMBOL,
                ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn rate_limits(&self) -> ExchangeResult<Vec<RateLimit>> {
        let info: ExchangeInfo = self
            .get_public(self.spot_url(), "/api/v3/exchangeInfo", &[])
            .await?;

        Ok(info.rate_limits)
    }

    async fn system_status(&self) -> ExchangeResult<SystemStatus> {
        self.get_public(self.spot_url(), "/sapi/v1/system/status", &[])
            .await
    }

    async fn trade_fee(&self, symbol: &str) -> ExchangeResult<TradeFee> {
        let params = [("symbol", symbol.to_string())];
        let fees: Vec<WireTradeFee> = self
            .send_signed(Method::GET, self.spot_url(), "/sapi/v1/asset/tradeFee", &params)
            .await?;

        fees.into_iter()
            .find(|fee| fee.symbol == symbol)
            .map(TradeFee::from)
            .ok_or_else(|| ExchangeError::Parse(format!("no trade fee for {}", symbol)))
    }

    async fn submit_order(&self, wallet: WalletKind, request: &OrderRequest) -> ExchangeResult<OrderRecord> {
        if request.order_type == OrderType::Oco {
            return self.submit_oco(wallet, request).await;
        }

        let params = order_params(wallet, request)?;
        match wallet {
            WalletKind::Spot => {
                if !self.is_production() {
                    info!(symbol = %request.symbol, "not in production, order sent to the test endpoint");
                    let _: serde_json::Value = self
                        .send_signed(Method::POST, self.spot_url(), "/api/v3/order/test", &params)
                        .await?;
                    return Ok(echo_record(request));
                }

                self.send_signed(Method::POST, self.spot_url(), "/api/v3/order", &params)
                    .await
            }
            WalletKind::Margin => {
                if !self.is_production() {
                    info!(symbol = %request.symbol, "not in production, margin order not submitted");
                    return Ok(echo_record(request));
                }

                self.send_signed(Method::POST, self.spot_url(), "/sapi/v1/margin/order", &params)
                    .await
            }
            WalletKind::Futures => {
                if !self.is_production() {
                    info!(symbol = %request.symbol, "not in production, futures order not submitted");
                    return Ok(echo_record(request));
                }

                self.send_signed(Method::POST, self.futures_url(), "/fapi/v1/order", &params)
                    .await
            }
        }
    }

    async fn cancel_order(
        &self,
        wallet: WalletKind,
        symbol: &str,
        order_id: OrderId,
    ) -> ExchangeResult<OrderRecord> {
        let params = [
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ];

        match wallet {
            WalletKind::Spot => {
                self.send_signed(Method::DELETE, self.spot_url(), "/api/v3/order", &params)
                    .await
            }
            WalletKind::Margin => {
                self.send_signed(Method::DELETE, self.spot_url(), "/sapi/v1/margin/order", &params)
                    .await
            }
            WalletKind::Futures => {
                self.send_signed(Method::DELETE, self.futures_url(), "/fapi/v1/order", &params)
                    .await
            }
        }
    }

    async fn open_orders(&self, wallet: WalletKind, symbol: Option<&str>) -> ExchangeResult<Vec<OrderRecord>> {
        let params: Params = symbol.map(|s| ("symbol", s.to_string())).into_iter().collect();

        match wallet {
            WalletKind::Spot => {
                self.send_signed(Method::GET, self.spot_url(), "/api/v3/openOrders", &params)
                    .await
            }
            WalletKind::Margin => {
                self.send_signed(Method::GET, self.spot_url(), "/sapi/v1/margin/openOrders", &params)
                    .await
            }
            WalletKind::Futures => {
                self.send_signed(Method::GET, self.futures_url(), "/fapi/v1/openOrders", &params)
                    .await
            }
        }
    }

    async fn positions(&self, symbol: Option<&str>) -> ExchangeResult<Vec<PositionRecord>> {
        let params: Params = symbol.map(|s| ("symbol", s.to_string())).into_iter().collect();

        self.send_signed(Method::GET, self.futures_url(), "/fapi/v2/positionRisk", &params)
            .await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<LeverageRecord> {
        let params = [
            ("symbol", symbol.to_string()),
            ("leverage", leverage.to_string()),
        ];

        self.send_signed(Method::POST, self.futures_url(), "/fapi/v1/leverage", &params)
            .await
    }

    async fn transfer_dust(&self, asset: &str) -> ExchangeResult<DustResult> {
        if !self.is_production() {
            return Err(ExchangeError::InvalidParameter(String::from(
                "dust transfer is only submitted in production",
            )));
        }

        let params = [("asset", asset.to_string())];
        self.send_signed(Method::POST, self.spot_url(), "/sapi/v1/asset/dust", &params)
            .await
    }
}

fn order_params(wallet: WalletKind, request: &OrderRequest) -> ExchangeResult<Params> {
    let order_type = match (wallet, request.order_type) {
        (_, OrderType::Market) => "MARKET",
        (_, OrderType::Limit) => "LIMIT",
        (WalletKind::Futures, OrderType::StopLimit) => "STOP",
        (_, OrderType::StopLimit) => "STOP_LOSS_LIMIT",
        (_, OrderType::Oco) => {
            return Err(ExchangeError::InvalidParameter(String::from(
                "OCO is an order list, not a single order",
            )))
        }
    };

    let mut params: Params = vec![
        ("symbol", request.symbol.clone()),
        ("side", request.side.as_str().to_string()),
        ("type", order_type.to_string()),
        ("quantity", request.quantity.to_string()),
    ];

    if let Some(price) = request.price {
        params.push(("price", price.to_string()));
    }
    if let Some(stop_price) = request.stop_price {
        params.push(("stopPrice", stop_price.to_string()));
    }
    if let Some(time_in_force) = request.time_in_force {
        params.push(("timeInForce", time_in_force.as_str().to_string()));
    }

    Ok(params)
}

fn oco_params(request: &OrderRequest) -> ExchangeResult<Params> {
    let missing = |field: &str| ExchangeError::InvalidParameter(format!("OCO order without {}", field));
    let price = request.price.ok_or_else(|| missing("price"))?;
    let stop_price = request.stop_price.ok_or_else(|| missing("stopPrice"))?;
    let stop_limit_price = request
        .stop_limit_price
        .ok_or_else(|| missing("stopLimitPrice"))?;

    Ok(vec![
        ("symbol", request.symbol.clone()),
        ("side", request.side.as_str().to_string()),
        ("quantity", request.quantity.to_string()),
        ("price", price.to_string()),
        ("stopPrice", stop_price.to_string()),
        ("stopLimitPrice", stop_limit_price.to_string()),
        ("stopLimitTimeInForce", TimeInForce::Gtc.as_str().to_string()),
    ])
}

// Stands in for the exchange response of an order that was not submitted
fn echo_record(request: &OrderRequest) -> OrderRecord {
    let now = timestamp_millis();
    let leg = |order_type: &str, price: Option<Price>, stop_price: Option<Price>| OrderRecord {
        symbol: Some(request.symbol.clone()),
        order_type: Some(order_type.to_string()),
        side: Some(request.side.as_str().to_string()),
        price: price.map(|p| p.to_string()),
        stop_price: stop_price.map(|p| p.to_string()),
        orig_qty: Some(request.quantity.to_string()),
        status: Some(String::from("TEST")),
        transact_time: Some(now),
        ..OrderRecord::default()
    };

    match request.order_type {
        OrderType::Oco => OrderRecord {
            symbol: Some(request.symbol.clone()),
            order_list_id: Some(-1),
            transaction_time: Some(now),
            order_reports: vec![
                leg(
                    "STOP_LOSS_LIMIT",
                    request.stop_limit_price,
                    request.stop_price,
                ),
                leg("LIMIT_MAKER", request.price, None),
            ],
            ..OrderRecord::default()
        },
        OrderType::StopLimit => leg("STOP_LOSS_LIMIT", request.price, request.stop_price),
        OrderType::Limit => leg("LIMIT", request.price, None),
        OrderType::Market => leg("MARKET", None, None),
    }
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gtc => "GTC",
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeInfo {
    #[serde(default)]
    rate_limits: Vec<RateLimit>,
    symbols: Vec<SymbolMetadata>,
}

#[derive(Deserialize)]
struct SpotAccount {
    balances: Vec<Balance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarginAccount {
    user_assets: Vec<Balance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuturesBalance {
    asset: Asset,
    balance: Amount,
    available_balance: Amount,
}

impl From<FuturesBalance> for Balance {
    fn from(value: FuturesBalance) -> Self {
        Self {
            asset: value.asset,
            free: value.available_balance,
            locked: value.balance - value.available_balance,
        }
    }
}

#[derive(Deserialize)]
struct AveragePrice {
    price: Price,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndex {
    mark_price: Price,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTradeFee {
    symbol: Symbol,
    maker_commission: Decimal,
    taker_commission: Decimal,
}

// Binance reports commissions as fractions, the trading core works in percent
impl From<WireTradeFee> for TradeFee {
    fn from(value: WireTradeFee) -> Self {
        Self {
            maker: value.maker_commission * Decimal::ONE_HUNDRED,
            taker: value.taker_commission * Decimal::ONE_HUNDRED,
        }
    }
}
