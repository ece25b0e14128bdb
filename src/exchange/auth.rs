use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{ExchangeError, ExchangeResult};

type HmacSha256 = Hmac<Sha256>;

pub fn sign(secret: &str, message: &str) -> ExchangeResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Auth(e.to_string()))?;
    mac.update(message.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn build_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Appends `timestamp`, `recvWindow` and the HMAC-SHA256 `signature` of the whole query
pub fn build_signed_query(
    params: &[(&str, String)],
    secret: &str,
    timestamp: i64,
    recv_window: u64,
) -> ExchangeResult<String> {
    let mut query = build_query(params);
    if !query.is_empty() {
        query.push('&');
    }
    query.push_str(&format!("recvWindow={}&timestamp={}", recv_window, timestamp));

    let signature = sign(secret, &query)?;
    query.push_str(&format!("&signature={}", signature));

    Ok(query)
}
