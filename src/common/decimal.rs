use std::str::FromStr;

use rust_decimal::RoundingStrategy;

use crate::error::{failure, ErrorKind, TradeError};
use crate::noun::*;

const MAX_SCALE: i64 = 28;

/// Rounding applied by a decimal operation. Passed explicitly on every call,
/// there is no ambient rounding context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero, the result never exceeds the input in magnitude
    Truncate,
    /// Round half to even
    HalfEven,
}

impl Rounding {
    fn strategy(self) -> RoundingStrategy {
        match self {
            Self::Truncate => RoundingStrategy::ToZero,
            Self::HalfEven => RoundingStrategy::MidpointNearestEven,
        }
    }
}

// Plain ("0.00100000") or scientific ("1e-5") notation
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Number of fractional digits implied by a step size, `round(-log10(step))`.
///
/// Computed on the normalized mantissa `m * 10^-scale`: `-log10(step)` is
/// `scale - (width(m) - 1) - log10(lead)` with `lead = m / 10^(width(m) - 1)` in
/// `[1, 10)`, and `log10(lead)` rounds up exactly when `lead^2 >= 10`.
/// Returns `None` when the logarithm is undefined (`step <= 0`).
pub fn step_digits(step: &Decimal) -> Option<Precision> {
    if step.is_zero() || step.is_sign_negative() {
        return None;
    }

    let normalized = step.normalize();
    let mantissa = normalized.mantissa();
    let width = mantissa.to_string().len() as u32;
    let lead = Decimal::try_from_i128_with_scale(mantissa, width - 1).ok()?;
    let rounds_up = lead.checked_mul(lead)? >= Decimal::TEN;

    Some(normalized.scale() as Precision - (width as Precision - 1) - rounds_up as Precision)
}

/// Rounds `value` to `digits` fractional digits. The result always carries
/// exactly `digits` fractional digits; negative `digits` round to tens,
/// hundreds and so on.
pub fn quantize(value: &Decimal, digits: Precision, rounding: Rounding) -> Decimal {
    if digits >= 0 {
        let digits = digits.min(MAX_SCALE) as u32;
        let mut result = value.round_dp_with_strategy(digits, rounding.strategy());
        result.rescale(digits);

        return result;
    }

    let exponent = -digits;
    if exponent > MAX_SCALE {
        return Decimal::ZERO;
    }

    let factor = Decimal::from_i128_with_scale(10_i128.pow(exponent as u32), 0);
    (value / factor).round_dp_with_strategy(0, rounding.strategy()) * factor
}

/// Truncates `value` to the largest multiple of the precision implied by
/// `step_size`, so the result is never above what the exchange accepts.
pub fn truncate_by_step_size(value: &Decimal, step_size: &Decimal) -> Result<Quantity, TradeError> {
    match step_digits(step_size) {
        Some(digits) => Ok(quantize(value, digits, Rounding::Truncate)),
        None => Err(failure(
            "truncate_by_step_size",
            format!("{value}|{step_size}"),
            ErrorKind::Conversion {
                value: step_size.to_string(),
            },
        )),
    }
}

/// [`truncate_by_step_size`] over raw exchange or user strings.
pub fn truncate(value: &str, step_size: &str) -> Result<Quantity, TradeError> {
    let inputs = format!("{value}|{step_size}");
    let parse = |raw: &str| {
        parse_decimal(raw).ok_or_else(|| {
            failure(
                "truncate",
                inputs.clone(),
                ErrorKind::Conversion {
                    value: raw.to_string(),
                },
            )
        })
    };

    let value = parse(value)?;
    let step_size = parse(step_size)?;

    truncate_by_step_size(&value, &step_size)
}
