use crate::calendar;
use crate::config::{self, DataProviderMode};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// One daily bar. Fields the provider left empty are `NaN`.
#[derive(Clone, Debug, PartialEq)]
pub struct Candle {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Historical daily bars for one symbol, ascending by date with no duplicates.
#[derive(Clone, Debug)]
pub struct StockData {
    pub symbol: String,
    pub history: Vec<Candle>,
}

/// Parameters of a single history download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryRequest {
    pub symbol: String,
    pub start: NaiveDate,
    /// Exclusive.
    pub end: NaiveDate,
    /// Scale OHLC by the provider's adjusted close (splits and dividends).
    pub auto_adjust: bool,
}

impl HistoryRequest {
    pub fn new(symbol: &str, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            start,
            end,
            auto_adjust: true,
        }
    }

    pub fn is_empty_range(&self) -> bool {
        self.start >= self.end
    }
}

#[derive(Clone, Debug)]
pub enum DataProvider {
    Yahoo { base_url: String, client: reqwest::Client },
    Mock,
}

impl DataProvider {
    pub fn yahoo() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config::http_timeout())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self::Yahoo {
            base_url: config::yahoo_base_url().to_string(),
            client,
        })
    }

    pub fn from_mode(mode: DataProviderMode) -> Result<Self> {
        match mode {
            DataProviderMode::Yahoo => Self::yahoo(),
            DataProviderMode::Mock => Ok(Self::Mock),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Yahoo { .. } => "Yahoo Finance",
            Self::Mock => "Synthetic",
        }
    }

    /// Downloads daily bars for `[start, end)`.
    ///
    /// An empty or reversed range yields an empty table without contacting
    /// the provider.
    pub async fn fetch_history(&self, request: &HistoryRequest) -> Result<StockData> {
        if request.is_empty_range() {
            warn!(
                "Empty date range for {}: start {} is not before end {}",
                request.symbol, request.start, request.end
            );
            return Ok(StockData::empty(&request.symbol));
        }

        match self {
            Self::Yahoo { base_url, client } => fetch_yahoo(client, base_url, request).await,
            Self::Mock => Ok(StockData::new_mock(&request.symbol, request.start, request.end)),
        }
    }
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Deserialize, Debug)]
struct YahooError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct YahooResult {
    meta: Option<YahooMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct YahooMeta {
    gmtoffset: Option<i64>,
    exchange_timezone_name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct YahooIndicators {
    #[serde(default)]
    quote: Vec<YahooQuote>,
    #[serde(default)]
    adjclose: Vec<YahooAdjClose>,
}

#[derive(Deserialize, Debug, Default)]
struct YahooQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Deserialize, Debug)]
struct YahooAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn to_unix(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Chart endpoint for one request. The symbol is a single encoded path
/// segment, so reserved characters in it cannot alter the query.
pub fn yahoo_chart_url(base_url: &str, request: &HistoryRequest) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base_url)
        .with_context(|| format!("invalid Yahoo base URL '{}'", base_url))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Yahoo base URL '{}' cannot take a path", base_url))?
        .pop_if_empty()
        .extend(["v8", "finance", "chart"])
        .push(&request.symbol);
    url.query_pairs_mut()
        .append_pair("period1", &to_unix(request.start).to_string())
        .append_pair("period2", &to_unix(request.end).to_string())
        .append_pair("interval", "1d")
        .append_pair("events", "history")
        .append_pair("includeAdjustedClose", "true");
    Ok(url)
}

async fn fetch_yahoo(client: &reqwest::Client, base_url: &str, request: &HistoryRequest) -> Result<StockData> {
    let url = yahoo_chart_url(base_url, request)?;
    info!(
        "Fetching {} daily history {}..{} from Yahoo Finance",
        request.symbol, request.start, request.end
    );

    let resp = client
        .get(url)
        .header("User-Agent", "Mozilla/5.0")
        .send()
        .await
        .with_context(|| format!("request for {} failed", request.symbol))?;
    let status = resp.status();
    let body = resp
        .text()
        .await
        .with_context(|| format!("failed to read response body for {}", request.symbol))?;

    // Yahoo reports unknown symbols as a 404 with a JSON error payload.
    match parse_chart_response(request, &body) {
        Ok(data) => {
            info!("Fetched {} rows for {}", data.history.len(), data.symbol);
            Ok(data)
        }
        Err(e) if !status.is_success() => Err(e.context(format!("HTTP {}", status))),
        Err(e) => Err(e),
    }
}

/// Decodes a v8 chart payload into a sorted, de-duplicated table clipped to
/// the requested range.
pub fn parse_chart_response(request: &HistoryRequest, body: &str) -> Result<StockData> {
    let response: YahooChartResponse = serde_json::from_str(body)
        .with_context(|| format!("unexpected response format for {}", request.symbol))?;

    if let Some(err) = response.chart.error {
        let description = err
            .description
            .unwrap_or_else(|| "unknown provider error".to_string());
        return Err(match err.code {
            Some(code) => anyhow::anyhow!("{}: {} ({})", request.symbol, description, code),
            None => anyhow::anyhow!("{}: {}", request.symbol, description),
        });
    }

    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| anyhow::anyhow!("No data found for {}", request.symbol))?;

    let offset = result.meta.as_ref().and_then(|m| m.gmtoffset).unwrap_or(0);
    if let Some(tz) = result.meta.as_ref().and_then(|m| m.exchange_timezone_name.as_deref()) {
        tracing::debug!("{} trades in {} (gmtoffset {}s)", request.symbol, tz, offset);
    }

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adjclose = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let field = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten().unwrap_or(f64::NAN);

    let mut by_date: BTreeMap<NaiveDate, Candle> = BTreeMap::new();
    for (i, &timestamp) in result.timestamp.iter().enumerate() {
        let Some(close) = quote.close.get(i).copied().flatten() else {
            continue;
        };
        let Some(date) = DateTime::from_timestamp(timestamp + offset, 0).map(|dt| dt.date_naive()) else {
            warn!("Skipping out-of-range timestamp {} for {}", timestamp, request.symbol);
            continue;
        };
        if date < request.start || date >= request.end {
            continue;
        }

        let mut candle = Candle {
            date,
            open: field(&quote.open, i),
            high: field(&quote.high, i),
            low: field(&quote.low, i),
            close,
            volume: field(&quote.volume, i),
        };

        if request.auto_adjust {
            if let Some(adj) = adjclose.get(i).copied().flatten() {
                if close != 0.0 {
                    let ratio = adj / close;
                    candle.open *= ratio;
                    candle.high *= ratio;
                    candle.low *= ratio;
                    candle.close = adj;
                }
            }
        }

        by_date.insert(date, candle);
    }

    Ok(StockData {
        symbol: request.symbol.clone(),
        history: by_date.into_values().collect(),
    })
}

impl StockData {
    pub fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            history: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.history.first().map(|c| c.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.history.last().map(|c| c.date)
    }

    /// Last `n` rows (all rows when shorter).
    pub fn tail(&self, n: usize) -> &[Candle] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// Closing prices with missing values dropped.
    pub fn closes(&self) -> Vec<f64> {
        self.history
            .iter()
            .map(|c| c.close)
            .filter(|c| c.is_finite())
            .collect()
    }

    /// `(date, close)` pairs with missing closes dropped.
    pub fn close_series(&self) -> Vec<(NaiveDate, f64)> {
        self.history
            .iter()
            .filter(|c| c.close.is_finite())
            .map(|c| (c.date, c.close))
            .collect()
    }

    /// Deterministic random walk over the business days in `[start, end)`.
    ///
    /// The seed is derived from the symbol, so the same request always
    /// produces the same table. A blank symbol yields no rows.
    pub fn new_mock(symbol: &str, start: NaiveDate, end: NaiveDate) -> Self {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Self::empty(&symbol);
        }

        let seed = symbol
            .bytes()
            .fold(0xcbf29ce484222325_u64, |acc, b| (acc ^ b as u64).wrapping_mul(0x100000001b3));
        let mut rng = StdRng::seed_from_u64(seed);
        let mut current_price: f64 = rng.gen_range(50.0..250.0);

        let history = calendar::business_days_between(start, end)
            .into_iter()
            .map(|date| {
                let volatility = 0.02; // 2% daily volatility
                let change_pct: f64 = rng.gen_range(-volatility..volatility) + 0.0004;
                let open = current_price;
                let close = open * (1.0 + change_pct);
                let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
                let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
                let volume = rng.gen_range(1_000_000.0..10_000_000.0_f64).round();
                current_price = close;
                Candle { date, open, high, low, close, volume }
            })
            .collect();

        Self { symbol, history }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request() -> HistoryRequest {
        HistoryRequest::new("aapl", date(2024, 1, 1), date(2024, 1, 10))
    }

    // 2024-01-02 .. 2024-01-05 at 14:30 UTC, with gmtoffset -18000 (New York).
    const SAMPLE: &str = r#"{
        "chart": {
            "result": [{
                "meta": { "symbol": "AAPL", "gmtoffset": -18000, "exchangeTimezoneName": "America/New_York" },
                "timestamp": [1704205800, 1704292200, 1704378600, 1704465000],
                "indicators": {
                    "quote": [{
                        "open":   [187.15, 184.22, 182.15, null],
                        "high":   [188.44, 185.88, 183.09, 182.76],
                        "low":    [183.89, 183.43, 180.88, 180.17],
                        "close":  [185.64, 184.25, null, 181.18],
                        "volume": [82488700, 58414500, 71983600, 62303300]
                    }],
                    "adjclose": [{ "adjclose": [185.0, 183.6, null, 180.5] }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn symbol_is_normalized() {
        assert_eq!(request().symbol, "AAPL");
    }

    #[test]
    fn chart_url_uses_unix_bounds() {
        let url = yahoo_chart_url("https://example.test/", &request()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.test/v8/finance/chart/AAPL?period1=1704067200&period2=1704844800&interval=1d&events=history&includeAdjustedClose=true"
        );
    }

    #[test]
    fn chart_url_keeps_range_for_symbols_with_reserved_characters() {
        let req = HistoryRequest::new(
            "aapl?period1=0&period2=9999999999&interval=1wk#",
            date(2024, 1, 1),
            date(2024, 1, 10),
        );
        let url = yahoo_chart_url("https://example.test", &req).unwrap();

        assert_eq!(url.fragment(), None);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("period1".to_string(), "1704067200".to_string()),
                ("period2".to_string(), "1704844800".to_string()),
                ("interval".to_string(), "1d".to_string()),
                ("events".to_string(), "history".to_string()),
                ("includeAdjustedClose".to_string(), "true".to_string()),
            ]
        );
        let segment = url.path_segments().and_then(|mut s| s.next_back()).unwrap();
        assert!(segment.starts_with("AAPL%3FPERIOD1="));
        assert!(segment.ends_with("%23"));
    }

    #[test]
    fn chart_url_encodes_slash_in_symbol() {
        let req = HistoryRequest::new("brk/b", date(2024, 1, 1), date(2024, 1, 10));
        let url = yahoo_chart_url("https://example.test", &req).unwrap();
        let segments: Vec<&str> = url.path_segments().unwrap().collect();
        assert_eq!(segments, vec!["v8", "finance", "chart", "BRK%2FB"]);
    }

    #[test]
    fn parses_rows_and_skips_missing_close() {
        let mut req = request();
        req.auto_adjust = false;
        let data = parse_chart_response(&req, SAMPLE).unwrap();
        assert_eq!(data.symbol, "AAPL");
        let dates: Vec<NaiveDate> = data.history.iter().map(|c| c.date).collect();
        assert_eq!(dates, vec![date(2024, 1, 2), date(2024, 1, 3), date(2024, 1, 5)]);
        assert!(data.history[2].open.is_nan());
        assert_abs_diff_eq!(data.history[0].close, 185.64);
        assert_abs_diff_eq!(data.history[0].volume, 82488700.0);
    }

    #[test]
    fn auto_adjust_scales_prices() {
        let data = parse_chart_response(&request(), SAMPLE).unwrap();
        let first = &data.history[0];
        assert_abs_diff_eq!(first.close, 185.0, epsilon = 1e-12);
        assert_abs_diff_eq!(first.open, 187.15 * 185.0 / 185.64, epsilon = 1e-9);
        assert_abs_diff_eq!(first.volume, 82488700.0);
    }

    #[test]
    fn rows_outside_range_are_clipped() {
        let req = HistoryRequest::new("AAPL", date(2024, 1, 3), date(2024, 1, 5));
        let data = parse_chart_response(&req, SAMPLE).unwrap();
        let dates: Vec<NaiveDate> = data.history.iter().map(|c| c.date).collect();
        assert_eq!(dates, vec![date(2024, 1, 3)]);
    }

    #[test]
    fn unsorted_and_duplicate_timestamps_are_normalized() {
        let body = r#"{"chart":{"result":[{"timestamp":[1704292200,1704205800,1704292260],
            "indicators":{"quote":[{"open":[1,2,3],"high":[1,2,3],"low":[1,2,3],"close":[10.0,20.0,30.0],"volume":[1,2,3]}]}}],"error":null}}"#;
        let data = parse_chart_response(&request(), body).unwrap();
        assert_eq!(data.history.len(), 2);
        assert!(data.history.windows(2).all(|w| w[0].date < w[1].date));
        // The later bar for 2024-01-03 wins.
        assert_abs_diff_eq!(data.history[1].close, 30.0);
    }

    #[test]
    fn provider_error_is_reported() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart_response(&request(), body).unwrap_err();
        assert_eq!(err.to_string(), "AAPL: No data found, symbol may be delisted (Not Found)");
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(parse_chart_response(&request(), "<html>rate limited</html>").is_err());
    }

    #[test]
    fn result_without_timestamps_is_empty() {
        let body = r#"{"chart":{"result":[{"meta":{"gmtoffset":0},"indicators":{"quote":[{}]}}],"error":null}}"#;
        let data = parse_chart_response(&request(), body).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn tail_and_closes() {
        let data = StockData::new_mock("TEST", date(2024, 1, 1), date(2024, 3, 1));
        assert_eq!(data.tail(5).len(), 5);
        assert_eq!(data.tail(5).last(), data.history.last());
        assert_eq!(data.tail(10_000).len(), data.history.len());
        assert_eq!(data.closes().len(), data.history.len());
    }

    #[test]
    fn closes_drop_missing_values() {
        let mut data = StockData::new_mock("TEST", date(2024, 1, 1), date(2024, 2, 1));
        data.history[3].close = f64::NAN;
        assert_eq!(data.closes().len(), data.history.len() - 1);
        assert_eq!(data.close_series().len(), data.history.len() - 1);
    }

    #[test]
    fn mock_is_deterministic_and_weekday_only() {
        let a = StockData::new_mock("NVDA", date(2023, 1, 1), date(2023, 6, 1));
        let b = StockData::new_mock("nvda", date(2023, 1, 1), date(2023, 6, 1));
        assert_eq!(a.history, b.history);
        assert!(a.history.iter().all(|c| calendar::is_business_day(c.date)));
        assert!(a.history.windows(2).all(|w| w[0].date < w[1].date));
        assert!(a.history.iter().all(|c| c.low <= c.close && c.close <= c.high));
    }

    #[test]
    fn mock_blank_symbol_is_empty() {
        assert!(StockData::new_mock("  ", date(2023, 1, 1), date(2023, 6, 1)).is_empty());
    }

    #[tokio::test]
    async fn reversed_range_returns_empty_table() {
        let req = HistoryRequest::new("AAPL", date(2024, 1, 10), date(2024, 1, 1));
        let data = DataProvider::Mock.fetch_history(&req).await.unwrap();
        assert!(data.is_empty());

        let same = HistoryRequest::new("AAPL", date(2024, 1, 10), date(2024, 1, 10));
        assert!(DataProvider::Mock.fetch_history(&same).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mock_provider_covers_range() {
        let req = HistoryRequest::new("AAPL", date(2015, 1, 1), date(2023, 12, 31));
        let data = DataProvider::Mock.fetch_history(&req).await.unwrap();
        assert!(data.history.len() > 2000);
        assert!(data.first_date().unwrap() >= req.start);
        assert!(data.last_date().unwrap() < req.end);
    }
}
