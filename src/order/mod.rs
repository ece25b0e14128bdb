use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    account::WalletKind,
    error::{failure, upstream, ErrorKind, PriceField, TradeError},
    exchange::{Exchange, OrderRecord, OrderRequest, TimeInForce},
    noun::*,
    price::parse_price,
    quantity::{DerivedQuantity, FeeKind, SizeSource},
    Trader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for Side {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            _ => Err(failure(
                "side",
                s,
                ErrorKind::InvalidInput {
                    field: "side",
                    reason: String::from("expected buy or sell"),
                },
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    StopLimit,
    /// One-cancels-the-other: a limit order paired with a stop-limit order
    Oco,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Limit => write!(f, "limit"),
            Self::StopLimit => write!(f, "stop_limit"),
            Self::Oco => write!(f, "oco"),
        }
    }
}

impl FromStr for OrderType {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "market" => Ok(Self::Market),
            "limit" => Ok(Self::Limit),
            "stop_limit" => Ok(Self::StopLimit),
            "oco" => Ok(Self::Oco),
            _ => Err(failure(
                "order_type",
                s,
                ErrorKind::InvalidInput {
                    field: "order type",
                    reason: String::from("expected market, limit, stop_limit or oco"),
                },
            )),
        }
    }
}

/// What the user asks for. Prices stay raw until the order is created.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderIntent {
    pub side: Side,
    pub order_type: OrderType,
    /// Percent of the balance (0 to 100) on spot and margin, contract quantity on futures
    pub size: Decimal,
    pub limit_price: Option<String>,
    pub stop_price: Option<String>,
    pub oco_price: Option<String>,
}

impl OrderIntent {
    pub fn market(side: Side, size: Decimal) -> Self {
        Self {
            side,
            order_type: OrderType::Market,
            size,
            limit_price: None,
            stop_price: None,
            oco_price: None,
        }
    }

    pub fn limit(side: Side, size: Decimal, limit_price: &str) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price.to_string()),
            ..Self::market(side, size)
        }
    }

    pub fn stop_limit(side: Side, size: Decimal, limit_price: &str, stop_price: &str) -> Self {
        Self {
            order_type: OrderType::StopLimit,
            stop_price: Some(stop_price.to_string()),
            ..Self::limit(side, size, limit_price)
        }
    }

    pub fn oco(side: Side, size: Decimal, limit_price: &str, stop_price: &str, oco_price: &str) -> Self {
        Self {
            order_type: OrderType::Oco,
            oco_price: Some(oco_price.to_string()),
            ..Self::stop_limit(side, size, limit_price, stop_price)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub request: OrderRequest,
    pub record: OrderRecord,
    /// Absent on futures, which trade the requested size as is
    pub derived: Option<DerivedQuantity>,
}

impl<E: Exchange> Trader<E> {
    /// Derives the quantity of `intent` and submits it on the session wallet.
    #[instrument(skip_all)]
    pub async fn create_order(&self, intent: &OrderIntent) -> Result<PlacedOrder, TradeError> {
        const OPERATION: &str = "create_order";

        let wallet = self.account().wallet;
        let symbol = self.symbol();
        let order_type = intent.order_type;
        let inputs = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            wallet,
            order_type,
            intent.side,
            intent.size,
            intent.limit_price.as_deref().unwrap_or_default(),
            intent.stop_price.as_deref().unwrap_or_default(),
            intent.oco_price.as_deref().unwrap_or_default(),
            symbol
        );

        if order_type == OrderType::Oco && wallet != WalletKind::Spot {
            return Err(failure(
                OPERATION,
                inputs,
                ErrorKind::UnsupportedForWallet {
                    wallet,
                    feature: String::from("OCO order"),
                },
            ));
        }

        // Every price the type needs is checked before anything is fetched
        let required = |field: PriceField, supplied: &Option<String>| {
            parse_price(OPERATION, &inputs, order_type, field, supplied.as_deref())
        };
        let limit_price = match order_type {
            OrderType::Market => None,
            _ => Some(required(PriceField::Limit, &intent.limit_price)?),
        };
        let stop_price = match order_type {
            OrderType::StopLimit | OrderType::Oco => Some(required(PriceField::Stop, &intent.stop_price)?),
            _ => None,
        };
        let oco_price = match order_type {
            OrderType::Oco => Some(required(PriceField::Oco, &intent.oco_price)?),
            _ => None,
        };

        if wallet == WalletKind::Futures && intent.size <= Decimal::ZERO {
            return Err(failure(
                OPERATION,
                inputs,
                ErrorKind::InvalidInput {
                    field: "size",
                    reason: String::from("futures size is a positive contract quantity"),
                },
            ));
        }

        self.require_symbol(OPERATION, &inputs, &symbol).await?;

        let derived = match wallet {
            WalletKind::Futures => None,
            WalletKind::Spot | WalletKind::Margin => {
                let reference = intent.limit_price.as_deref();
                let derived = match intent.side {
                    Side::Buy => {
                        self.derive_to_buy(
                            FeeKind::for_order_type(order_type),
                            order_type,
                            intent.size,
                            SizeSource::OnlyAvailable,
                            reference,
                        )
                        .await?
                    }
                    Side::Sell => self.derive_to_sell(order_type, intent.size, reference).await?,
                };

                Some(derived)
            }
        };

        let quantity = match &derived {
            Some(derived) => derived.final_quantity,
            None => intent.size,
        };

        let request = OrderRequest {
            symbol: symbol.clone(),
            side: intent.side,
            order_type,
            quantity,
            price: match order_type {
                OrderType::Oco => oco_price,
                _ => limit_price,
            },
            stop_price,
            stop_limit_price: match order_type {
                OrderType::Oco => limit_price,
                _ => None,
            },
            time_in_force: match order_type {
                OrderType::Limit | OrderType::StopLimit => Some(TimeInForce::Gtc),
                _ => None,
            },
        };

        let record = self
            .exchange()
            .submit_order(wallet, &request)
            .await
            .map_err(|e| upstream(OPERATION, inputs, e))?;

        info!(%symbol, %wallet, side = %intent.side, %order_type, %quantity, "order submitted");
        Ok(PlacedOrder {
            request,
            record,
            derived,
        })
    }

    /// Cancels `order_id` on `symbol`, the session pair when `None`
    #[instrument(skip_all)]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        symbol: Option<&str>,
    ) -> Result<OrderRecord, TradeError> {
        let wallet = self.account().wallet;
        let symbol = symbol
            .map(|s| s.trim().to_uppercase())
            .unwrap_or_else(|| self.symbol());

        self.exchange()
            .cancel_order(wallet, &symbol, order_id)
            .await
            .map_err(|e| {
                upstream(
                    "cancel_order",
                    format!("{}|{}|{}", wallet, symbol, order_id),
                    e,
                )
            })
    }

    /// Open orders of the session wallet, of every symbol when `symbol` is `None`
    #[instrument(skip_all)]
    pub async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderRecord>, TradeError> {
        let wallet = self.account().wallet;
        let symbol = symbol.map(|s| s.trim().to_uppercase());

        self.exchange()
            .open_orders(wallet, symbol.as_deref())
            .await
            .map_err(|e| {
                upstream(
                    "open_orders",
                    format!("{}|{}", wallet, symbol.as_deref().unwrap_or_default()),
                    e,
                )
            })
    }
}
