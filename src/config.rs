use std::{env, time::Duration};

use tracing::warn;

pub const SPOT_BASE_URL: &str = "https://api.binance.com";
pub const FUTURES_BASE_URL: &str = "https://fapi.binance.com";

pub const DEFAULT_RECV_WINDOW: u64 = 5000;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

// ===== Client Config =====
#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub secret_key: Option<String>,

    pub spot_base_url: String,
    pub futures_base_url: String,

    /// Milliseconds a signed request stays valid after its timestamp
    pub recv_window: u64,
    /// Applied to every exchange call
    pub request_timeout: Duration,

    pub option: Option<ClientOption>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOption {
    // Note that when true all transactions will be submitted to the exchange
    pub is_production: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            secret_key: None,
            spot_base_url: SPOT_BASE_URL.to_string(),
            futures_base_url: FUTURES_BASE_URL.to_string(),
            recv_window: DEFAULT_RECV_WINDOW,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            option: None,
        }
    }
}

impl ClientConfig {
    pub fn new(api_key: String, secret_key: String, option: Option<ClientOption>) -> Self {
        Self {
            api_key: Some(api_key),
            secret_key: Some(secret_key),
            option,
            ..Self::default()
        }
    }

    /// Reads `BINANCE_API_KEY`, `BINANCE_SECRET_KEY`, `BINANCE_PRODUCTION` and
    /// `BINANCE_REQUEST_TIMEOUT_SECS`. Unset or malformed values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self {
            api_key: env::var("BINANCE_API_KEY").ok(),
            secret_key: env::var("BINANCE_SECRET_KEY").ok(),
            ..Self::default()
        };

        if let Ok(value) = env::var("BINANCE_PRODUCTION") {
            config.option = Some(ClientOption {
                is_production: matches!(value.trim(), "1" | "true" | "TRUE" | "yes"),
            });
        }

        if let Ok(value) = env::var("BINANCE_REQUEST_TIMEOUT_SECS") {
            match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout = Duration::from_secs(secs),
                _ => warn!(value, "ignoring BINANCE_REQUEST_TIMEOUT_SECS"),
            }
        }

        config
    }

    pub fn is_production(&self) -> bool {
        match &self.option {
            Some(v) => v.is_production,
            None => false,
        }
    }

    pub fn with_production(mut self, is_production: bool) -> Self {
        self.option = Some(ClientOption { is_production });
        self
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |key: &Option<String>| key.as_ref().map(|_| "********");

        f.debug_struct("ClientConfig")
            .field("api_key", &mask(&self.api_key))
            .field("secret_key", &mask(&self.secret_key))
            .field("spot_base_url", &self.spot_base_url)
            .field("futures_base_url", &self.futures_base_url)
            .field("recv_window", &self.recv_window)
            .field("request_timeout", &self.request_timeout)
            .field("option", &self.option)
            .finish()
    }
}
