use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    error::{failure, upstream, ErrorKind, TradeError},
    exchange::{Balance, Exchange, LeverageRecord, PositionRecord},
    noun::*,
    Trader,
};

pub const MAX_LEVERAGE: u32 = 125;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    Spot,
    Margin,
    Futures,
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spot => write!(f, "spot"),
            Self::Margin => write!(f, "margin"),
            Self::Futures => write!(f, "futures"),
        }
    }
}

impl FromStr for WalletKind {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spot" => Ok(Self::Spot),
            "margin" => Ok(Self::Margin),
            "futures" => Ok(Self::Futures),
            _ => Err(failure(
                "wallet_kind",
                s,
                ErrorKind::InvalidInput {
                    field: "wallet",
                    reason: String::from("expected spot, margin or futures"),
                },
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TradingPair {
    pub base: Asset,
    pub quote: Asset,
}

impl TradingPair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.trim().to_uppercase(),
            quote: quote.trim().to_uppercase(),
        }
    }

    pub fn symbol(&self) -> Symbol {
        format!("{}{}", self.base, self.quote)
    }
}

/// Wallet and pair a session trades on, fixed for the session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccountContext {
    pub wallet: WalletKind,
    pub pair: TradingPair,
}

impl AccountContext {
    pub fn new(wallet: WalletKind, pair: TradingPair) -> Self {
        Self { wallet, pair }
    }
}

/// Holdings valued in one asset
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EstimatedTotal {
    pub asset: Asset,
    pub free: Amount,
    pub locked: Amount,
    pub total: Amount,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AggregateBalance {
    pub assets: Vec<Balance>,
    pub totals: Vec<EstimatedTotal>,
}

impl AggregateBalance {
    pub fn total_in(&self, asset: &str) -> Option<&EstimatedTotal> {
        self.totals.iter().find(|t| t.asset == asset)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DustTransfer {
    pub asset: Asset,
    /// Amount of `asset` converted
    pub quantity: Quantity,
    /// BNB before the service charge
    pub gross: Amount,
    pub fee: Amount,
    pub net: Amount,
}

impl<E: Exchange> Trader<E> {
    #[instrument(skip_all)]
    pub async fn free_balance(&self, asset: &str) -> Result<Amount, TradeError> {
        let wallet = self.account().wallet;

        match self.exchange().balance(wallet, asset).await {
            Ok(balance) => Ok(balance.free),
            Err(e) => Err(upstream(
                "free_balance",
                format!("{}|{}", wallet, asset),
                e,
            )),
        }
    }

    /// Every held asset of the session wallet, plus free, locked and total
    /// holdings valued in each of `valuation_assets`. Assets without a market
    /// against a valuation asset are left out of that asset's totals.
    #[instrument(skip_all)]
    pub async fn aggregate_balance(
        &self,
        valuation_assets: &[&str],
    ) -> Result<AggregateBalance, TradeError> {
        const OPERATION: &str = "aggregate_balance";

        let wallet = self.account().wallet;
        let inputs = format!("{}|{}", wallet, valuation_assets.join(","));

        let assets = self
            .exchange()
            .balances(wallet)
            .await
            .map_err(|e| upstream(OPERATION, inputs.clone(), e))?;

        let mut totals = Vec::with_capacity(valuation_assets.len());
        for valuation in valuation_assets {
            let valuation = valuation.to_uppercase();
            let mut total = EstimatedTotal {
                asset: valuation.clone(),
                free: Decimal::ZERO,
                locked: Decimal::ZERO,
                total: Decimal::ZERO,
            };

            for balance in assets.iter() {
                let rate = match self.valuation_rate(&balance.asset, &valuation, &inputs).await? {
                    Some(rate) => rate,
                    None => {
                        debug!(asset = %balance.asset, valuation = %valuation, "no market, skipped");
                        continue;
                    }
                };

                let summed = balance
                    .free
                    .checked_mul(rate)
                    .zip(balance.locked.checked_mul(rate))
                    .and_then(|(free, locked)| {
                        Some((total.free.checked_add(free)?, total.locked.checked_add(locked)?))
                    });
                match summed {
                    Some((free, locked)) => {
                        total.free = free;
                        total.locked = locked;
                    }
                    None => {
                        return Err(overflow(
                            OPERATION,
                            inputs,
                            format!("{} valued in {} overflows", balance.asset, valuation),
                        ))
                    }
                }
            }

            total.total = match total.free.checked_add(total.locked) {
                Some(sum) => sum,
                None => {
                    return Err(overflow(
                        OPERATION,
                        inputs,
                        format!("total in {} overflows", valuation),
                    ))
                }
            };
            totals.push(total);
        }

        Ok(AggregateBalance { assets, totals })
    }

    /// Total holdings of the session wallet expressed in `asset`
    pub async fn estimated_total(&self, asset: &str) -> Result<Amount, TradeError> {
        let aggregate = self.aggregate_balance(&[asset]).await?;

        Ok(aggregate
            .totals
            .first()
            .map(|t| t.total)
            .unwrap_or(Decimal::ZERO))
    }

    // Price of one unit of `asset` in `valuation`, through either market direction
    async fn valuation_rate(
        &self,
        asset: &str,
        valuation: &str,
        inputs: &str,
    ) -> Result<Option<Price>, TradeError> {
        if asset == valuation {
            return Ok(Some(Decimal::ONE));
        }

        let direct = format!("{}{}", asset, valuation);
        match self.exchange().average_price(&direct).await {
            Ok(Some(price)) => return Ok(Some(price)),
            Ok(None) => {}
            Err(e) => return Err(upstream("aggregate_balance", inputs, e)),
        }

        let inverse = format!("{}{}", valuation, asset);
        match self.exchange().average_price(&inverse).await {
            Ok(Some(price)) if !price.is_zero() => match Decimal::ONE.checked_div(price) {
                Some(rate) => Ok(Some(rate)),
                None => Err(overflow(
                    "aggregate_balance",
                    inputs,
                    format!("1 / {} ({}) overflows", price, inverse),
                )),
            },
            Ok(_) => Ok(None),
            Err(e) => Err(upstream("aggregate_balance", inputs, e)),
        }
    }

    #[instrument(skip_all)]
    pub async fn position_information(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<PositionRecord>, TradeError> {
        const OPERATION: &str = "position_information";

        let wallet = self.account().wallet;
        let inputs = format!("{}|{}", wallet, symbol.unwrap_or_default());
        self.require_wallet(OPERATION, &inputs, WalletKind::Futures, "position information")?;

        self.exchange()
            .positions(symbol)
            .await
            .map_err(|e| upstream(OPERATION, inputs, e))
    }

    /// Sets the futures leverage of `symbol`, the session pair when `None`
    #[instrument(skip_all)]
    pub async fn set_leverage(
        &self,
        leverage: u32,
        symbol: Option<&str>,
    ) -> Result<LeverageRecord, TradeError> {
        const OPERATION: &str = "set_leverage";

        let wallet = self.account().wallet;
        let symbol = symbol.map(str::to_string).unwrap_or_else(|| self.symbol());
        let inputs = format!("{}|{}|{}", wallet, leverage, symbol);
        self.require_wallet(OPERATION, &inputs, WalletKind::Futures, "leverage")?;

        if leverage == 0 || leverage > MAX_LEVERAGE {
            return Err(failure(
                OPERATION,
                inputs,
                ErrorKind::InvalidInput {
                    field: "leverage",
                    reason: format!("expected 1 to {}", MAX_LEVERAGE),
                },
            ));
        }

        self.require_symbol(OPERATION, &inputs, &symbol).await?;

        self.exchange()
            .set_leverage(&symbol, leverage)
            .await
            .map_err(|e| upstream(OPERATION, inputs, e))
    }

    /// Converts the small balance of `asset` to BNB. Spot wallet only.
    #[instrument(skip_all)]
    pub async fn convert_dust(&self, asset: &str) -> Result<DustTransfer, TradeError> {
        const OPERATION: &str = "convert_dust";

        let wallet = self.account().wallet;
        let asset = asset.trim().to_uppercase();
        let inputs = format!("{}|{}", wallet, asset);
        self.require_wallet(OPERATION, &inputs, WalletKind::Spot, "dust conversion")?;

        let result = self
            .exchange()
            .transfer_dust(&asset)
            .await
            .map_err(|e| upstream(OPERATION, inputs.clone(), e))?;

        let quantity = result
            .transfer_result
            .iter()
            .try_fold(Decimal::ZERO, |sum, item| sum.checked_add(item.amount))
            .ok_or_else(|| {
                overflow(OPERATION, &inputs, String::from("converted quantity overflows"))
            })?;
        let net = result
            .total_transfered
            .checked_sub(result.total_service_charge)
            .ok_or_else(|| overflow(OPERATION, &inputs, String::from("net amount overflows")))?;

        Ok(DustTransfer {
            asset,
            quantity,
            gross: result.total_transfered,
            fee: result.total_service_charge,
            net,
        })
    }

    pub(crate) fn require_wallet(
        &self,
        operation: &'static str,
        inputs: &str,
        required: WalletKind,
        feature: &str,
    ) -> Result<(), TradeError> {
        let wallet = self.account().wallet;
        if wallet == required {
            return Ok(());
        }

        Err(failure(
            operation,
            inputs,
            ErrorKind::UnsupportedForWallet {
                wallet,
                feature: feature.to_string(),
            },
        ))
    }
}

fn overflow(operation: &'static str, inputs: impl Into<String>, reason: String) -> TradeError {
    failure(
        operation,
        inputs,
        ErrorKind::InvalidInput {
            field: "balance",
            reason,
        },
    )
}
