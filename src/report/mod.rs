//! Human readable renderings of exchange responses.

use crate::{
    account::{DustTransfer, WalletKind},
    common::{
        decimal::{parse_decimal, quantize, Rounding},
        time::format_timestamp_millis,
    },
    error::{failure, ErrorKind, TradeError},
    exchange::{OrderRecord, PositionRecord},
    noun::*,
    order::OrderType,
};

const PLACEHOLDER: &str = "-";
const AVERAGE_PRICE_DIGITS: Precision = 8;
const MARGIN_DIGITS: Precision = 2;

/// Renders a created or cancelled order. `order_type` fills in for responses
/// that carry no type, the spot stop-limit and OCO acknowledgements.
pub fn format_order(
    record: &OrderRecord,
    wallet: WalletKind,
    order_type: Option<OrderType>,
    cancelled: bool,
) -> Result<String, TradeError> {
    const OPERATION: &str = "format_order";

    let inputs = || {
        format!(
            "{}|{}|{}|{}",
            wallet,
            order_type.map(|t| t.to_string()).unwrap_or_default(),
            cancelled,
            record.order_id.map(|id| id.to_string()).unwrap_or_default()
        )
    };

    let kind = match (record.order_type.as_deref(), order_type) {
        (Some(kind), _) => kind.to_uppercase(),
        (None, Some(OrderType::StopLimit)) => String::from("STOP_LOSS_LIMIT"),
        (None, _) => String::from("OCO"),
    };

    let timestamp = match kind.as_str() {
        "OCO" => date(record.transaction_time.or(record.transact_time)),
        _ => date(record.transact_time.or(record.update_time)),
    };

    let mut lines = Vec::new();
    if !cancelled {
        lines.push(format!("Date: {}", timestamp));
    }

    match kind.as_str() {
        "MARKET" => {
            let (bought, spent) = match record.side.as_deref() {
                Some("BUY") => ("Quantity bought", "Cost"),
                Some("SELL") => ("Quantity sold", "Revenue"),
                _ => {
                    return Err(failure(
                        OPERATION,
                        inputs(),
                        ErrorKind::InvalidInput {
                            field: "side",
                            reason: format!("{} is not BUY or SELL", text(&record.side)),
                        },
                    ))
                }
            };
            let fills = summarize_fills(record).map_err(|kind| failure(OPERATION, inputs(), kind))?;

            lines.push(format!("Status: {}", text(&record.status)));
            lines.push(format!("Order Id: {}", id(record.order_id)));
            lines.push(String::from("Type: Market"));
            lines.push(format!("Symbol: {}", text(&record.symbol)));
            lines.push(format!("Side: {}", side(record, wallet)));
            lines.push(format!("Price: {}", fills.average_price));
            lines.push(format!(
                "Fee paid in {}: {}",
                fills.fee_asset.as_deref().unwrap_or(PLACEHOLDER),
                fills.fee
            ));
            lines.push(format!("{}: {}", bought, text(&record.executed_qty)));
            lines.push(format!("{}: {}", spent, text(&record.cummulative_quote_qty)));
        }
        "LIMIT" | "LIMIT_MAKER" => {
            lines.push(format!("Status: {}", text(&record.status)));
            lines.push(format!("Order Id: {}", id(record.order_id)));
            lines.push(String::from("Type: Limit"));
            lines.push(format!("Symbol: {}", text(&record.symbol)));
            lines.push(format!("Side: {}", side(record, wallet)));
            lines.push(format!("Limit: {}", text(&record.price)));
            lines.push(format!("Quantity: {}", text(&record.orig_qty)));
        }
        "STOP_LOSS_LIMIT" | "STOP" | "TAKE_PROFIT" => {
            lines.push(format!("Status: {}", record.status.as_deref().unwrap_or("NEW")));
            lines.push(format!("Order Id: {}", id(record.order_id)));
            lines.push(String::from("Type: Stop-Limit"));
            lines.push(format!("Symbol: {}", text(&record.symbol)));
            lines.push(format!("Side: {}", side(record, wallet)));
            lines.push(format!("Stop: {}", text(&record.stop_price)));
            lines.push(format!("Limit: {}", text(&record.price)));
            lines.push(format!("Quantity: {}", text(&record.orig_qty)));
        }
        "STOP_MARKET" | "TAKE_PROFIT_MARKET" => {
            lines.push(format!("Status: {}", record.status.as_deref().unwrap_or("NEW")));
            lines.push(format!("Order Id: {}", id(record.order_id)));
            lines.push(String::from("Type: Stop-Market"));
            lines.push(format!("Symbol: {}", text(&record.symbol)));
            lines.push(format!("Side: {}", side(record, wallet)));
            lines.push(format!("Stop: {}", text(&record.stop_price)));
            lines.push(format!("Quantity: {}", text(&record.orig_qty)));
        }
        "OCO" => {
            let (stop_leg, limit_leg) = match record.order_reports.as_slice() {
                [stop_leg, limit_leg, ..] => (stop_leg, limit_leg),
                _ => {
                    return Err(failure(
                        OPERATION,
                        inputs(),
                        ErrorKind::InvalidInput {
                            field: "orderReports",
                            reason: String::from("an OCO order has two legs"),
                        },
                    ))
                }
            };

            lines.insert(0, String::from(">> Order OCO <<"));
            lines.push(format!(
                "Order Id: {}",
                record
                    .order_list_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| String::from(PLACEHOLDER))
            ));
            lines.push(format!("Symbol: {}", text(&record.symbol)));
            lines.push(format!("Side: {}", side(stop_leg, wallet)));
            lines.push(format!("Quantity: {}", text(&stop_leg.orig_qty)));

            lines.push(String::from("> Stop Limit"));
            lines.push(format!("Status: {}", text(&stop_leg.status)));
            lines.push(format!("Order Id: {}", id(stop_leg.order_id)));
            lines.push(format!("Type: {}", text(&stop_leg.order_type)));
            lines.push(format!("Stop: {}", text(&stop_leg.stop_price)));
            lines.push(format!("Limit: {}", text(&stop_leg.price)));

            lines.push(String::from("> Limit"));
            lines.push(format!("Status: {}", text(&limit_leg.status)));
            lines.push(format!("Order Id: {}", id(limit_leg.order_id)));
            lines.push(format!("Type: {}", text(&limit_leg.order_type)));
            lines.push(format!("Limit: {}", text(&limit_leg.price)));
        }
        _ => return Err(unknown_type(OPERATION, inputs(), &kind)),
    }

    Ok(lines.join("\n"))
}

/// One block per open order. OCO legs carry the id of their order list.
pub fn format_open_orders(
    records: &[OrderRecord],
    wallet: WalletKind,
) -> Result<Vec<String>, TradeError> {
    const OPERATION: &str = "format_open_orders";

    records
        .iter()
        .map(|record| {
            let kind = record
                .order_type
                .as_deref()
                .unwrap_or_default()
                .to_uppercase();

            let mut lines = vec![format!("Date: {}", date(record.time))];
            if let Some(list_id) = record.order_list_id.filter(|id| *id != -1) {
                lines.push(format!("OCO Id: {}", list_id));
            }
            lines.push(format!("Order Id: {}", id(record.order_id)));

            let (label, price, stop) = match kind.as_str() {
                "MARKET" => ("Market", false, false),
                "LIMIT" | "LIMIT_MAKER" => ("Limit", true, false),
                "STOP_LOSS_LIMIT" | "STOP" | "TAKE_PROFIT" => ("Stop-Limit", true, true),
                "STOP_MARKET" | "TAKE_PROFIT_MARKET" => ("Stop-Market", false, true),
                _ => {
                    return Err(unknown_type(
                        OPERATION,
                        format!("{}|{}", wallet, id(record.order_id)),
                        &kind,
                    ))
                }
            };

            lines.push(format!("Type: {}", label));
            lines.push(format!("Symbol: {}", text(&record.symbol)));
            lines.push(format!("Side: {}", side(record, wallet)));
            lines.push(format!("Quantity: {}", text(&record.orig_qty)));
            if price {
                lines.push(format!("Price: {}", text(&record.price)));
            }
            if stop {
                lines.push(format!("Stop: {}", text(&record.stop_price)));
            }

            Ok(lines.join("\n"))
        })
        .collect()
}

/// One block per futures position with a non-zero amount
pub fn format_open_positions(positions: &[PositionRecord]) -> Result<Vec<String>, TradeError> {
    const OPERATION: &str = "format_open_positions";

    let mut blocks = Vec::new();
    for position in positions.iter().filter(|p| !p.position_amt.is_zero()) {
        let inputs = || {
            format!(
                "{}|{}|{}|{}",
                position.symbol, position.position_amt, position.mark_price, position.leverage
            )
        };
        let invalid = |field: &'static str, reason: &str| {
            failure(
                OPERATION,
                inputs(),
                ErrorKind::InvalidInput {
                    field,
                    reason: reason.to_string(),
                },
            )
        };

        let notional = position
            .position_amt
            .abs()
            .checked_mul(position.mark_price)
            .ok_or_else(|| invalid("markPrice", "arithmetic overflow"))?;
        let margin = notional
            .checked_div(position.leverage)
            .ok_or_else(|| invalid("leverage", "leverage is zero"))?;
        let margin = quantize(&margin, MARGIN_DIGITS, Rounding::HalfEven);

        let roe = (position.un_realized_profit * Decimal::ONE_HUNDRED)
            .checked_div(margin)
            .ok_or_else(|| invalid("margin", "margin rounds to zero"))?;
        let roe = quantize(&roe, MARGIN_DIGITS, Rounding::HalfEven);

        let side = match position.position_amt.is_sign_positive() {
            true => "LONG",
            false => "SHORT",
        };

        blocks.push(
            [
                format!("Symbol: {}", position.symbol),
                format!("Side: {}", side),
                format!("Quantity: {}", position.position_amt),
                format!("Leverage: {}x", position.leverage),
                format!("Entry Price: {}", position.entry_price),
                format!("Mark Price: {}", position.mark_price),
                format!("Liq. Price: {}", position.liquidation_price),
                format!("Margin: {}", margin),
                format!("PNL (ROE %): {} ({}%)", position.un_realized_profit, roe),
            ]
            .join("\n"),
        );
    }

    Ok(blocks)
}

pub fn format_dust_transfer(transfer: &DustTransfer) -> String {
    [
        format!("Dust asset: {}", transfer.asset),
        format!("Dust quantity: {}", transfer.quantity),
        String::from("--------"),
        format!("BNB gross: {}", transfer.gross),
        format!("BNB fee: {}", transfer.fee),
        format!("BNB net: {}", transfer.net),
    ]
    .join("\n")
}

struct FillSummary {
    average_price: Decimal,
    fee: Decimal,
    fee_asset: Option<Asset>,
}

// Average price weighted by the quantity of every fill
fn summarize_fills(record: &OrderRecord) -> Result<FillSummary, ErrorKind> {
    let parse = |value: &str| {
        parse_decimal(value).ok_or_else(|| ErrorKind::Conversion {
            value: value.to_string(),
        })
    };

    let mut cost = Decimal::ZERO;
    let mut quantity = Decimal::ZERO;
    let mut fee = Decimal::ZERO;
    let mut fee_asset = None;

    for fill in &record.fills {
        let price = parse(&fill.price)?;
        let qty = parse(&fill.qty)?;

        cost += price * qty;
        quantity += qty;
        if !fill.commission.is_empty() {
            fee += parse(&fill.commission)?;
        }
        if !fill.commission_asset.is_empty() {
            fee_asset = Some(fill.commission_asset.clone());
        }
    }

    let average_price = match quantity.is_zero() {
        true => Decimal::ZERO,
        false => quantize(&(cost / quantity), AVERAGE_PRICE_DIGITS, Rounding::HalfEven).normalize(),
    };

    Ok(FillSummary {
        average_price,
        fee: fee.normalize(),
        fee_asset,
    })
}

fn unknown_type(operation: &'static str, inputs: String, kind: &str) -> TradeError {
    failure(
        operation,
        inputs,
        ErrorKind::InvalidInput {
            field: "type",
            reason: format!("unknown order type {}", kind),
        },
    )
}

// Futures report positions, not sides
fn side(record: &OrderRecord, wallet: WalletKind) -> &str {
    match (wallet, record.side.as_deref()) {
        (WalletKind::Futures, Some("BUY")) => "LONG",
        (WalletKind::Futures, Some(_)) => "SHORT",
        (_, side) => side.unwrap_or(PLACEHOLDER),
    }
}

fn date(millis: Option<i64>) -> String {
    millis
        .and_then(format_timestamp_millis)
        .unwrap_or_else(|| String::from(PLACEHOLDER))
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(PLACEHOLDER)
}

fn id(order_id: Option<OrderId>) -> String {
    order_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| String::from(PLACEHOLDER))
}
