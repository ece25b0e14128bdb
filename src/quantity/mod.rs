use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    common::decimal::{quantize, truncate_by_step_size, Rounding},
    error::{failure, upstream, ErrorKind, Floor, TradeError},
    exchange::Exchange,
    noun::*,
    order::OrderType,
    Trader,
};

/// Fractional digits of the sized amount, before lot-size truncation
pub const SIZE_DIGITS: Precision = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeKind {
    Maker,
    Taker,
}

impl FeeKind {
    /// Market orders take liquidity, every other type rests on the book
    pub fn for_order_type(order_type: OrderType) -> Self {
        match order_type {
            OrderType::Market => Self::Taker,
            _ => Self::Maker,
        }
    }
}

impl fmt::Display for FeeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maker => write!(f, "maker"),
            Self::Taker => write!(f, "taker"),
        }
    }
}

/// Amount a buy percentage applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeSource {
    /// Free quote balance
    OnlyAvailable,
    /// Every holding of the wallet valued in the quote asset
    Total,
}

impl fmt::Display for SizeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnlyAvailable => write!(f, "only_available"),
            Self::Total => write!(f, "total"),
        }
    }
}

/// Quantity ready for submission with the checkpoints that produced it
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DerivedQuantity {
    pub final_quantity: Quantity,
    /// Amount the percentage was applied to
    pub pre_size: Amount,
    /// Sized amount after rounding and clamping to the free balance
    pub post_size: Amount,
}

impl<E: Exchange> Trader<E> {
    /// Commission in percent for the session pair
    #[instrument(skip_all)]
    pub async fn trade_fee(&self, fee_kind: FeeKind) -> Result<Percent, TradeError> {
        let symbol = self.symbol();

        match self.exchange().trade_fee(&symbol).await {
            Ok(fee) => Ok(match fee_kind {
                FeeKind::Maker => fee.maker,
                FeeKind::Taker => fee.taker,
            }),
            Err(e) => Err(upstream("trade_fee", format!("{}|{}", fee_kind, symbol), e)),
        }
    }

    /// Base quantity to buy spending `size_percent` of the quote amount picked
    /// by `size_source`, net of the trading fee.
    #[instrument(skip_all)]
    pub async fn derive_to_buy(
        &self,
        fee_kind: FeeKind,
        order_type: OrderType,
        size_percent: Percent,
        size_source: SizeSource,
        limit_price: Option<&str>,
    ) -> Result<DerivedQuantity, TradeError> {
        const OPERATION: &str = "derive_to_buy";

        let pair = &self.account().pair;
        let inputs = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.account().wallet,
            fee_kind,
            order_type,
            size_percent,
            size_source,
            limit_price.unwrap_or_default(),
            pair.base,
            pair.quote
        );
        validate_size_percent(OPERATION, &inputs, size_percent)?;

        let free = self.free_balance(&pair.quote).await?;
        let pre_size = match size_source {
            SizeSource::OnlyAvailable => free,
            SizeSource::Total => self.estimated_total(&pair.quote).await?,
        };
        let post_size = post_size(OPERATION, &inputs, pre_size, size_percent, free)?;

        let lot_size = self.lot_size().await?;
        let min_notional = self.min_notional().await?;
        let fee = self.trade_fee(fee_kind).await?;
        let price = self.resolve_price(order_type, limit_price).await?;

        // Fee comes off the quote side, the fee-inclusive cost never exceeds post_size
        let fee_factor = (Decimal::ONE_HUNDRED - fee) / Decimal::ONE_HUNDRED;
        let quantity = post_size
            .checked_div(price)
            .and_then(|q| q.checked_mul(fee_factor))
            .ok_or_else(|| overflow(OPERATION, &inputs))?;

        let final_quantity = truncate_by_step_size(&quantity, &lot_size.step_size)
            .map_err(|e| failure(OPERATION, inputs.clone(), e.kind))?;
        check_floors(
            OPERATION,
            &inputs,
            final_quantity,
            price,
            lot_size.min_qty,
            min_notional,
        )?;

        debug!(%final_quantity, %pre_size, %post_size, %price, "derived quantity to buy");
        Ok(DerivedQuantity {
            final_quantity,
            pre_size,
            post_size,
        })
    }

    /// Base quantity to sell, `size_percent` of the free base balance. The
    /// exchange takes the fee from the quote proceeds, so none is deducted.
    #[instrument(skip_all)]
    pub async fn derive_to_sell(
        &self,
        order_type: OrderType,
        size_percent: Percent,
        limit_price: Option<&str>,
    ) -> Result<DerivedQuantity, TradeError> {
        const OPERATION: &str = "derive_to_sell";

        let pair = &self.account().pair;
        let inputs = format!(
            "{}|{}|{}|{}|{}|{}",
            self.account().wallet,
            order_type,
            size_percent,
            limit_price.unwrap_or_default(),
            pair.base,
            pair.quote
        );
        validate_size_percent(OPERATION, &inputs, size_percent)?;

        let free = self.free_balance(&pair.base).await?;
        let pre_size = free;
        let post_size = post_size(OPERATION, &inputs, pre_size, size_percent, free)?;

        let lot_size = self.lot_size().await?;
        let min_notional = self.min_notional().await?;
        let price = self.resolve_price(order_type, limit_price).await?;

        let final_quantity = truncate_by_step_size(&post_size, &lot_size.step_size)
            .map_err(|e| failure(OPERATION, inputs.clone(), e.kind))?;
        check_floors(
            OPERATION,
            &inputs,
            final_quantity,
            price,
            lot_size.min_qty,
            min_notional,
        )?;

        debug!(%final_quantity, %pre_size, %post_size, %price, "derived quantity to sell");
        Ok(DerivedQuantity {
            final_quantity,
            pre_size,
            post_size,
        })
    }
}

fn validate_size_percent(
    operation: &'static str,
    inputs: &str,
    size_percent: Percent,
) -> Result<(), TradeError> {
    if size_percent < Decimal::ZERO || size_percent > Decimal::ONE_HUNDRED {
        return Err(failure(
            operation,
            inputs,
            ErrorKind::InvalidInput {
                field: "size",
                reason: format!("{} is outside 0 to 100", size_percent),
            },
        ));
    }

    Ok(())
}

// round(pre_size / 100 * size_percent, 5) half-even, never above the free balance
fn post_size(
    operation: &'static str,
    inputs: &str,
    pre_size: Amount,
    size_percent: Percent,
    free: Amount,
) -> Result<Amount, TradeError> {
    let sized = (pre_size / Decimal::ONE_HUNDRED)
        .checked_mul(size_percent)
        .ok_or_else(|| overflow(operation, inputs))?;
    let sized = quantize(&sized, SIZE_DIGITS, Rounding::HalfEven);

    if sized > free {
        debug!(%sized, %free, "sized amount clamped to the free balance");
        return Ok(free);
    }

    Ok(sized)
}

fn check_floors(
    operation: &'static str,
    inputs: &str,
    quantity: Quantity,
    price: Price,
    min_qty: Quantity,
    min_notional: Amount,
) -> Result<(), TradeError> {
    if quantity <= min_qty {
        return Err(failure(
            operation,
            inputs,
            ErrorKind::BelowMinimum {
                floor: Floor::MinQuantity,
                value: quantity,
                threshold: min_qty,
            },
        ));
    }

    let notional = quantity
        .checked_mul(price)
        .ok_or_else(|| overflow(operation, inputs))?;
    if notional <= min_notional {
        return Err(failure(
            operation,
            inputs,
            ErrorKind::BelowMinimum {
                floor: Floor::MinNotional,
                value: notional,
                threshold: min_notional,
            },
        ));
    }

    Ok(())
}

fn overflow(operation: &'static str, inputs: &str) -> TradeError {
    failure(
        operation,
        inputs,
        ErrorKind::InvalidInput {
            field: "quantity",
            reason: String::from("arithmetic overflow"),
        },
    )
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::{account::WalletKind, testing::*};

    #[tokio::test]
    #[traced_test]
    async fn test_buy_half_of_free_quote_at_market() {
        // free 1000 USDT, 50 %, taker 0.1 %, average price 20000,
        // step 0.00001, minQty 0.0001, minNotional 10
        let trader = spot_trader(MockExchange::btc_usdt());

        let derived = trader
            .derive_to_buy(
                FeeKind::Taker,
                OrderType::Market,
                decimal("50"),
                SizeSource::OnlyAvailable,
                None,
            )
            .await
            .unwrap();

        assert_eq!(derived.pre_size, decimal("1000"));
        assert_eq!(derived.post_size.to_string(), "500.00000");
        assert_eq!(derived.final_quantity.to_string(), "0.02497");
        assert_eq!(derived.final_quantity * decimal("20000"), decimal("499.4"));
        assert!(logs_contain("derived quantity to buy"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_zero_percent_is_below_minimum() {
        let trader = spot_trader(MockExchange::btc_usdt());

        let e = trader
            .derive_to_buy(
                FeeKind::Taker,
                OrderType::Market,
                Decimal::ZERO,
                SizeSource::OnlyAvailable,
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(e.operation, "derive_to_buy");
        assert_eq!(
            e.kind,
            ErrorKind::BelowMinimum {
                floor: Floor::MinQuantity,
                value: Decimal::ZERO,
                threshold: decimal("0.0001"),
            }
        );
        assert_eq!(e.inputs, "spot|taker|market|0|only_available||BTC|USDT");
        assert!(logs_contain("derive_to_buy"));

        let e = trader
            .derive_to_sell(OrderType::Market, Decimal::ZERO, None)
            .await
            .unwrap_err();
        assert!(matches!(
            e.kind,
            ErrorKind::BelowMinimum {
                floor: Floor::MinQuantity,
                ..
            }
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_buy_at_limit_price_with_maker_fee() {
        let exchange = MockExchange::btc_usdt().with_fee("0.075", "0.1");
        let trader = spot_trader(exchange);

        let derived = trader
            .derive_to_buy(
                FeeKind::Maker,
                OrderType::Limit,
                decimal("25"),
                SizeSource::OnlyAvailable,
                Some("19000"),
            )
            .await
            .unwrap();

        // 250 / 19000 * 0.99925 = 0.0131480263...
        assert_eq!(derived.post_size, decimal("250"));
        assert_eq!(derived.final_quantity.to_string(), "0.01314");

        let calls = trader.exchange().calls();
        assert!(calls.iter().all(|call| !call.starts_with("average_price")));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_total_size_is_clamped_to_free_balance() {
        // total holdings 1000 USDT + 0.5 BTC * 20000 = 11000 USDT
        let trader = spot_trader(MockExchange::btc_usdt());

        let derived = trader
            .derive_to_buy(
                FeeKind::Taker,
                OrderType::Market,
                decimal("100"),
                SizeSource::Total,
                None,
            )
            .await
            .unwrap();

        assert_eq!(derived.pre_size, decimal("11000"));
        assert_eq!(derived.post_size, decimal("1000"));
        // 1000 / 20000 * 0.999
        assert_eq!(derived.final_quantity, decimal("0.04995"));

        let derived = trader
            .derive_to_buy(
                FeeKind::Taker,
                OrderType::Market,
                decimal("5"),
                SizeSource::Total,
                None,
            )
            .await
            .unwrap();
        assert_eq!(derived.post_size, decimal("550"));
        assert!(logs_contain("clamped to the free balance"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_quantity_is_monotonic_in_size() {
        let trader = spot_trader(MockExchange::btc_usdt());

        let mut previous = Decimal::ZERO;
        for percent in [5, 10, 25, 33, 50, 66, 75, 99, 100] {
            let derived = trader
                .derive_to_buy(
                    FeeKind::Taker,
                    OrderType::Market,
                    Decimal::from(percent),
                    SizeSource::OnlyAvailable,
                    None,
                )
                .await
                .unwrap();

            assert!(derived.final_quantity >= previous);
            assert!(derived.final_quantity > decimal("0.0001"));
            assert!(derived.final_quantity * decimal("20000") > decimal("10"));
            previous = derived.final_quantity;
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_buy_below_min_notional() {
        // 1 % of 1000 USDT = 10 USDT, 0.0004995 BTC -> 0.00049 * 20000 = 9.8
        let trader = spot_trader(MockExchange::btc_usdt());

        let e = trader
            .derive_to_buy(
                FeeKind::Taker,
                OrderType::Market,
                decimal("1"),
                SizeSource::OnlyAvailable,
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(
            e.kind,
            ErrorKind::BelowMinimum {
                floor: Floor::MinNotional,
                value: decimal("9.8"),
                threshold: decimal("10"),
            }
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_sell_half_of_free_base() {
        let trader = spot_trader(MockExchange::btc_usdt());

        let derived = trader
            .derive_to_sell(OrderType::Limit, decimal("50"), Some("21000"))
            .await
            .unwrap();

        assert_eq!(derived.pre_size, decimal("0.5"));
        assert_eq!(derived.post_size.to_string(), "0.25000");
        assert_eq!(derived.final_quantity.to_string(), "0.25000");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_sell_truncates_after_sizing() {
        // 33 % of 0.123456 BTC = 0.04074048 -> 0.04074 -> step 0.001 -> 0.040
        let exchange = MockExchange::btc_usdt()
            .with_balance("BTC", "0.123456", "0")
            .with_filter(serde_json::json!({
                "filterType": "LOT_SIZE",
                "minQty": "0.00100000",
                "maxQty": "9000.00000000",
                "stepSize": "0.00100000"
            }));
        let trader = spot_trader(exchange);

        let derived = trader
            .derive_to_sell(OrderType::Market, decimal("33"), None)
            .await
            .unwrap();

        assert_eq!(derived.post_size, decimal("0.04074"));
        assert_eq!(derived.final_quantity.to_string(), "0.040");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_sell_all_keeps_unrounded_free_balance() {
        // 100 % rounds 0.123456789 up to 0.12346, above free, so the free balance wins
        let exchange = MockExchange::btc_usdt().with_balance("BTC", "0.123456789", "0");
        let trader = spot_trader(exchange);

        let derived = trader
            .derive_to_sell(OrderType::Market, decimal("100"), None)
            .await
            .unwrap();

        assert_eq!(derived.pre_size, decimal("0.123456789"));
        assert_eq!(derived.post_size, decimal("0.123456789"));
        assert_eq!(derived.final_quantity.to_string(), "0.12345");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_zero_step_size_fails_in_derivation() {
        let exchange = MockExchange::btc_usdt().with_filter(serde_json::json!({
            "filterType": "LOT_SIZE",
            "minQty": "0.00010000",
            "maxQty": "9000.00000000",
            "stepSize": "0.00000000"
        }));
        let trader = spot_trader(exchange);

        let e = trader
            .derive_to_buy(
                FeeKind::Taker,
                OrderType::Market,
                decimal("50"),
                SizeSource::OnlyAvailable,
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(e.operation, "derive_to_buy");
        assert_eq!(e.inputs, "spot|taker|market|50|only_available||BTC|USDT");
        assert!(matches!(e.kind, ErrorKind::Conversion { .. }));

        let e = trader
            .derive_to_sell(OrderType::Market, decimal("50"), None)
            .await
            .unwrap_err();
        assert_eq!(e.operation, "derive_to_sell");
        assert_eq!(e.inputs, "spot|market|50||BTC|USDT");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_sell_below_min_notional() {
        let exchange = MockExchange::btc_usdt().with_balance("BTC", "0.0004", "0");
        let trader = spot_trader(exchange);

        let e = trader
            .derive_to_sell(OrderType::Market, decimal("100"), None)
            .await
            .unwrap_err();

        assert_eq!(e.operation, "derive_to_sell");
        assert_eq!(
            e.kind,
            ErrorKind::BelowMinimum {
                floor: Floor::MinNotional,
                value: decimal("8"),
                threshold: decimal("10"),
            }
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_size_outside_range() {
        let trader = spot_trader(MockExchange::btc_usdt());

        for size in ["100.01", "-1"] {
            let e = trader
                .derive_to_sell(OrderType::Market, decimal(size), None)
                .await
                .unwrap_err();
            assert!(matches!(e.kind, ErrorKind::InvalidInput { field: "size", .. }));
        }

        assert!(trader.exchange().calls().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_limit_price_aborts_derivation() {
        let trader = spot_trader(MockExchange::btc_usdt());

        let e = trader
            .derive_to_buy(
                FeeKind::Maker,
                OrderType::Limit,
                decimal("50"),
                SizeSource::OnlyAvailable,
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(e.operation, "resolve_price");
        assert!(matches!(e.kind, ErrorKind::MissingPrice { .. }));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_steps_run_in_order() {
        let trader = spot_trader(MockExchange::btc_usdt());

        trader
            .derive_to_buy(
                FeeKind::Taker,
                OrderType::Market,
                decimal("50"),
                SizeSource::OnlyAvailable,
                None,
            )
            .await
            .unwrap();

        assert_eq!(
            trader.exchange().calls(),
            vec![
                "balance:spot:USDT",
                "symbol_metadata:BTCUSDT",
                "symbol_metadata:BTCUSDT",
                "trade_fee:BTCUSDT",
                "average_price:BTCUSDT",
            ]
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_upstream_failure_aborts_derivation() {
        let trader = spot_trader(MockExchange::btc_usdt().failing("trade_fee"));

        let e = trader
            .derive_to_buy(
                FeeKind::Taker,
                OrderType::Market,
                decimal("50"),
                SizeSource::OnlyAvailable,
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(e.operation, "trade_fee");
        assert_eq!(
            e.kind,
            ErrorKind::Upstream {
                code: Some(-1000),
                message: String::from("An unknown error occurred while processing the request"),
            }
        );
        assert!(!trader
            .exchange()
            .calls()
            .iter()
            .any(|call| call.starts_with("average_price")));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_futures_have_no_min_notional() {
        let trader = futures_trader(MockExchange::btc_usdt());

        let e = trader
            .derive_to_buy(
                FeeKind::Taker,
                OrderType::Market,
                decimal("50"),
                SizeSource::OnlyAvailable,
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(
            e.kind,
            ErrorKind::UnsupportedForWallet {
                wallet: WalletKind::Futures,
                feature: String::from("MIN_NOTIONAL"),
            }
        );
    }
}
