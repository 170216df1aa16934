use std::sync::OnceLock;
use tracing::{info, warn};

static DATA_PROVIDER_MODE: OnceLock<DataProviderMode> = OnceLock::new();
static YAHOO_BASE_URL: OnceLock<String> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataProviderMode {
    Yahoo,
    Mock,
}

impl DataProviderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::Mock => "mock",
        }
    }
}

pub fn parse_data_provider_mode(raw: &str) -> DataProviderMode {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yahoo" | "yfinance" => DataProviderMode::Yahoo,
        "mock" | "offline" => DataProviderMode::Mock,
        other => {
            warn!(
                "Unknown STOCKCAST_DATA_PROVIDER={} ; defaulting to yahoo. Allowed values: yahoo | mock",
                other
            );
            DataProviderMode::Yahoo
        }
    }
}

pub fn configured_data_provider_mode() -> DataProviderMode {
    *DATA_PROVIDER_MODE.get_or_init(|| {
        let mode = std::env::var("STOCKCAST_DATA_PROVIDER")
            .map(|v| parse_data_provider_mode(&v))
            .unwrap_or(DataProviderMode::Yahoo);
        info!("Data provider: {}", mode.as_str());
        mode
    })
}

pub fn yahoo_base_url() -> &'static str {
    YAHOO_BASE_URL.get_or_init(|| {
        std::env::var("STOCKCAST_YAHOO_BASE_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "https://query1.finance.yahoo.com".to_string())
    })
}

pub fn http_timeout() -> std::time::Duration {
    let secs = std::env::var("STOCKCAST_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
    std::time::Duration::from_secs(secs)
}

pub fn log_file_path() -> Option<std::path::PathBuf> {
    std::env::var("STOCKCAST_LOG_FILE")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(std::path::PathBuf::from)
}

pub const DEFAULT_TICKER: &str = "AAPL";
pub const DEFAULT_START: &str = "2015-01-01";
pub const DEFAULT_END: &str = "2023-12-31";
/// Date format used by every input field and report.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ── Model Settings ──────────────────────────────────────────────────────────
/// ARIMA(p, d, q) order fitted to the closing prices.
pub const ARIMA_ORDER: (usize, usize, usize) = (5, 1, 0);
/// Business days projected past the last observed close.
pub const FORECAST_STEPS: usize = 30;
/// Coverage of the forecast interval drawn around the point forecast.
pub const CONFIDENCE_LEVEL: f64 = 0.95;

// ── Display Settings ────────────────────────────────────────────────────────
/// Rows shown in the historical table (dataframe-style tail).
pub const TAIL_ROWS: usize = 5;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
