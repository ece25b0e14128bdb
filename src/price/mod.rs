use tracing::instrument;

use crate::{
    common::decimal::parse_decimal,
    error::{failure, upstream, ErrorKind, PriceField, TradeError},
    exchange::Exchange,
    noun::*,
    order::OrderType,
    Trader,
};

impl<E: Exchange> Trader<E> {
    /// Price an order of the session pair is valued at: the trailing average
    /// price for market orders, `supplied` for every other type.
    #[instrument(skip_all)]
    pub async fn resolve_price(
        &self,
        order_type: OrderType,
        supplied: Option<&str>,
    ) -> Result<Price, TradeError> {
        const OPERATION: &str = "resolve_price";

        let symbol = self.symbol();
        let inputs = format!("{}|{}|{}", order_type, supplied.unwrap_or_default(), symbol);

        let price = match order_type {
            OrderType::Market => match self.exchange().average_price(&symbol).await {
                Ok(Some(price)) => price,
                Ok(None) => {
                    return Err(failure(
                        OPERATION,
                        inputs,
                        ErrorKind::SymbolNotFound { symbol },
                    ))
                }
                Err(e) => return Err(upstream(OPERATION, inputs, e)),
            },
            _ => parse_price(OPERATION, &inputs, order_type, PriceField::Limit, supplied)?,
        };

        // Quantities are derived by dividing through the price
        if price <= Decimal::ZERO {
            return Err(failure(
                OPERATION,
                inputs,
                ErrorKind::InvalidInput {
                    field: "price",
                    reason: format!("{} is not positive", price),
                },
            ));
        }

        Ok(price)
    }
}

/// Parses a user supplied price, failing when it is absent or not a decimal
pub(crate) fn parse_price(
    operation: &'static str,
    inputs: &str,
    order_type: OrderType,
    field: PriceField,
    supplied: Option<&str>,
) -> Result<Price, TradeError> {
    let supplied = match supplied.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => {
            return Err(failure(
                operation,
                inputs,
                ErrorKind::MissingPrice { order_type, field },
            ))
        }
    };

    parse_decimal(supplied).ok_or_else(|| {
        failure(
            operation,
            inputs,
            ErrorKind::Conversion {
                value: supplied.to_string(),
            },
        )
    })
}
