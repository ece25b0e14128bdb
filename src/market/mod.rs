use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    account::WalletKind,
    error::{failure, upstream, ErrorKind, TradeError},
    exchange::{Exchange, RateLimit},
    noun::*,
    Trader,
};

/// One rate limit worth knowing before trading, e.g. "Max Orders for 10 Second"
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitSummary {
    pub label: String,
    pub limit: u64,
}

impl RateLimitSummary {
    // Request weight per interval, orders per second and per day. Raw request
    // limits and other order windows are left out.
    fn from_limit(limit: &RateLimit) -> Option<Self> {
        let what = match (limit.rate_limit_type.as_str(), limit.interval.as_str()) {
            ("REQUEST_WEIGHT", _) => "Requests",
            ("ORDERS", "SECOND") | ("ORDERS", "DAY") => "Orders",
            _ => return None,
        };

        Some(Self {
            label: format!(
                "Max {} for {} {}",
                what,
                limit.interval_num,
                capitalize(&limit.interval)
            ),
            limit: limit.limit,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum SystemState {
    Normal,
    Maintenance,
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "System Normal"),
            Self::Maintenance => write!(f, "System Maintenance"),
        }
    }
}

impl<E: Exchange> Trader<E> {
    /// Whether `symbol`, the session pair when `None`, trades on the session wallet
    #[instrument(skip_all)]
    pub async fn symbol_exists(&self, symbol: Option<&str>) -> Result<bool, TradeError> {
        let wallet = self.account().wallet;
        let symbol = self.symbol_or_session(symbol);

        self.exchange()
            .symbol_exists(wallet, &symbol)
            .await
            .map_err(|e| upstream("symbol_exists", format!("{}|{}", wallet, symbol), e))
    }

    /// Fails `SymbolNotFound` unless `symbol` trades on the session wallet
    pub(crate) async fn require_symbol(
        &self,
        operation: &'static str,
        inputs: &str,
        symbol: &str,
    ) -> Result<(), TradeError> {
        let wallet = self.account().wallet;

        match self.exchange().symbol_exists(wallet, symbol).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(failure(
                operation,
                inputs,
                ErrorKind::SymbolNotFound {
                    symbol: symbol.to_string(),
                },
            )),
            Err(e) => Err(upstream(operation, inputs, e)),
        }
    }

    /// Futures mark price of `symbol`, the session pair when `None`
    #[instrument(skip_all)]
    pub async fn mark_price(&self, symbol: Option<&str>) -> Result<Price, TradeError> {
        const OPERATION: &str = "mark_price";

        let wallet = self.account().wallet;
        let symbol = self.symbol_or_session(symbol);
        let inputs = format!("{}|{}", wallet, symbol);
        self.require_wallet(OPERATION, &inputs, WalletKind::Futures, "mark price")?;

        match self.exchange().mark_price(&symbol).await {
            Ok(Some(price)) => Ok(price),
            Ok(None) => Err(failure(OPERATION, inputs, ErrorKind::SymbolNotFound { symbol })),
            Err(e) => Err(upstream(OPERATION, inputs, e)),
        }
    }

    #[instrument(skip_all)]
    pub async fn rate_limits(&self) -> Result<Vec<RateLimitSummary>, TradeError> {
        let limits = self
            .exchange()
            .rate_limits()
            .await
            .map_err(|e| upstream("rate_limits", "", e))?;

        Ok(limits.iter().filter_map(RateLimitSummary::from_limit).collect())
    }

    #[instrument(skip_all)]
    pub async fn system_status(&self) -> Result<SystemState, TradeError> {
        let status = self
            .exchange()
            .system_status()
            .await
            .map_err(|e| upstream("system_status", "", e))?;

        let state = match status.status {
            0 => SystemState::Normal,
            _ => SystemState::Maintenance,
        };
        info!(%state, msg = %status.msg, "system status");

        Ok(state)
    }

    pub(crate) fn symbol_or_session(&self, symbol: Option<&str>) -> Symbol {
        symbol
            .map(|s| s.trim().to_uppercase())
            .unwrap_or_else(|| self.symbol())
    }
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();

    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
