use crate::ticker::Ticker;
use crate::time_series::{
    DateRange, PriceSource, PriceSourceError, RawCell, RawPriceTable, ADJ_CLOSE, CLOSE,
};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Offset, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_EXPONENT: u32 = 6;
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) seasonality/0.1";

/// Configuration for Yahoo Finance downloader
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Maximum number of attempts per request (default: 3)
    pub max_retries: u32,
    /// Rate limit: requests per second (default: 2.0)
    pub requests_per_second: f64,
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
    /// Chart endpoint base URL
    pub base_url: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        DownloaderConfig {
            max_retries: 3,
            requests_per_second: 2.0,
            timeout_seconds: 30,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl DownloaderConfig {
    /// Minimum spacing between two requests, `None` when unthrottled.
    fn min_interval(&self) -> Option<Duration> {
        if self.requests_per_second > 0.0 && self.requests_per_second.is_finite() {
            Some(Duration::from_secs_f64(1.0 / self.requests_per_second))
        } else {
            None
        }
    }
}

/// Yahoo Finance daily-history downloader.
///
/// Talks to the v8 chart endpoint and exposes the result as a
/// [`RawPriceTable`] with `Close` and `Adj Close` columns. Requests are
/// spaced according to `requests_per_second` and retried with exponential
/// backoff on transport errors, throttling and server errors.
#[derive(Debug)]
pub struct YahooFinanceDownloader {
    client: Client,
    config: DownloaderConfig,
    last_request: Mutex<Option<Instant>>,
}

impl YahooFinanceDownloader {
    /// Creates a new Yahoo Finance downloader with default configuration.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_config(DownloaderConfig::default())
    }

    /// Creates a new Yahoo Finance downloader with custom configuration.
    ///
    /// # Errors
    /// Returns `DownloadError::ClientCreation` if the HTTP client cannot be built.
    pub fn with_config(config: DownloaderConfig) -> Result<Self, DownloadError> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DownloadError::ClientCreation(e.to_string()))?;

        Ok(YahooFinanceDownloader {
            client,
            config,
            last_request: Mutex::new(None),
        })
    }

    /// Builds the chart URL for an inclusive date range.
    ///
    /// `period2` is exclusive on Yahoo's side, so it is set to midnight UTC
    /// of the day after `end`.
    pub fn chart_url(&self, symbol: &str, range: &DateRange) -> Result<String, DownloadError> {
        let period1 = range
            .start
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| DownloadError::InvalidDate(range.start.to_string()))?
            .and_utc()
            .timestamp();

        let day_after_end = range
            .end
            .checked_add_signed(ChronoDuration::days(1))
            .ok_or_else(|| DownloadError::InvalidDate(range.end.to_string()))?;
        let period2 = day_after_end
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| DownloadError::InvalidDate(day_after_end.to_string()))?
            .and_utc()
            .timestamp();

        Ok(format!(
            "{}/{}?period1={}&period2={}&interval=1d&events=div%2Csplits&includeAdjustedClose=true",
            self.config.base_url.trim_end_matches('/'),
            symbol,
            period1,
            period2
        ))
    }

    async fn throttle(&self) {
        let Some(min_interval) = self.config.min_interval() else {
            return;
        };

        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < min_interval {
                tokio::time::sleep(min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch_once(&self, url: &str) -> Result<String, DownloadError> {
        self.throttle().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::ApiError {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown error").to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| DownloadError::NetworkError(e.to_string()))
    }

    /// Fetches the raw chart JSON for `symbol` over `range`.
    pub async fn fetch_chart(&self, symbol: &str, range: &DateRange) -> Result<String, DownloadError> {
        let url = self.chart_url(symbol, range)?;
        let max_attempts = self.config.max_retries.max(1);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(&url).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let backoff = backoff_delay(attempt);
                    log::warn!(
                        "Yahoo fetch for {} failed (attempt {}/{}): {}; retrying in {:?}",
                        symbol,
                        attempt,
                        max_attempts,
                        err,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Downloads and parses daily history for one ticker.
    pub async fn download(&self, ticker: &Ticker, range: &DateRange) -> Result<RawPriceTable, DownloadError> {
        let body = self.fetch_chart(ticker.as_str(), range).await?;
        let table = parse_chart_response(&body)?;
        log::debug!("Downloaded {} rows for {}", table.len(), ticker);
        Ok(table)
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }
}

/// Delay before retrying after failed attempt number `attempt` (1-based).
///
/// Doubles from 500ms and stops growing at 32s.
fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    Duration::from_millis(BASE_BACKOFF_MS << exponent)
}

#[async_trait::async_trait]
impl PriceSource for YahooFinanceDownloader {
    async fn fetch_history(
        &self,
        ticker: &Ticker,
        start_year: i32,
        end_year: i32,
    ) -> Result<RawPriceTable, PriceSourceError> {
        let range =
            DateRange::for_years(start_year, end_year).ok_or(PriceSourceError::InvalidDateRange)?;
        if range.start > range.end {
            return Err(PriceSourceError::InvalidDateRange);
        }
        self.download(ticker, &range).await.map_err(PriceSourceError::from)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i32,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
    #[serde(default)]
    adjclose: Vec<AdjCloseSeries>,
}

#[derive(Debug, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseSeries {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn aligned(values: &[Option<f64>], len: usize) -> Vec<RawCell> {
    (0..len)
        .map(|i| RawCell::from_f64(values.get(i).copied().flatten()))
        .collect()
}

/// Parses a v8 chart response into a raw price table.
///
/// Timestamps are placed in the exchange's UTC offset (`meta.gmtoffset`).
/// A response without rows yields an empty table rather than an error.
pub fn parse_chart_response(body: &str) -> Result<RawPriceTable, DownloadError> {
    let response: ChartResponse =
        serde_json::from_str(body).map_err(|e| DownloadError::ParseError(e.to_string()))?;

    if let Some(error) = response.chart.error {
        return Err(DownloadError::ProviderError {
            code: error.code,
            description: error.description,
        });
    }

    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(RawPriceTable::default());
    };

    let gmtoffset = result.meta.map(|m| m.gmtoffset).unwrap_or(0);
    let offset = FixedOffset::east_opt(gmtoffset).unwrap_or_else(|| Utc.fix());

    let index = result
        .timestamp
        .iter()
        .map(|&ts| {
            DateTime::from_timestamp(ts, 0)
                .map(|utc| utc.with_timezone(&offset))
                .ok_or_else(|| DownloadError::ParseError(format!("invalid timestamp {}", ts)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let rows = index.len();
    let mut table = RawPriceTable::new(index);
    for series in &result.indicators.quote {
        table = table.with_column(CLOSE, aligned(&series.close, rows));
    }
    for series in &result.indicators.adjclose {
        table = table.with_column(ADJ_CLOSE, aligned(&series.adjclose, rows));
    }

    Ok(table)
}

/// Errors that can occur during Yahoo Finance data downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    /// HTTP client creation failed
    ClientCreation(String),
    /// Network error occurred
    NetworkError(String),
    /// Non-success HTTP status
    ApiError { status: u16, message: String },
    /// Error object inside a chart response
    ProviderError { code: String, description: String },
    /// Failed to parse response data
    ParseError(String),
    /// Invalid date provided
    InvalidDate(String),
}

impl DownloadError {
    /// Transport failures, throttling and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::NetworkError(_) => true,
            DownloadError::ApiError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadError::ClientCreation(msg) => write!(f, "Client creation error: {}", msg),
            DownloadError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DownloadError::ApiError { status, message } => {
                write!(f, "API error: HTTP {}: {}", status, message)
            }
            DownloadError::ProviderError { code, description } => {
                write!(f, "Provider error [{}]: {}", code, description)
            }
            DownloadError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DownloadError::InvalidDate(msg) => write!(f, "Invalid date: {}", msg),
        }
    }
}

impl std::error::Error for DownloadError {}

impl From<DownloadError> for PriceSourceError {
    fn from(err: DownloadError) -> Self {
        PriceSourceError::Fetch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    const SAMPLE: &str = r#"{"chart":{"result":[{"meta":{"currency":"USD","symbol":"AAPL","gmtoffset":-14400},"timestamp":[1686749400,1686835800,1686922200],"indicators":{"quote":[{"open":[183.3,183.9,186.7],"close":[183.95,186.01,null],"volume":[57462900,65433200,101235600]}],"adjclose":[{"adjclose":[182.5,184.6,184.9]}]}}],"error":null}}"#;

    #[test]
    fn test_downloader_creation() {
        let downloader = YahooFinanceDownloader::new();
        assert!(downloader.is_ok());
    }

    #[test]
    fn test_downloader_with_config() {
        let config = DownloaderConfig {
            max_retries: 5,
            requests_per_second: 4.0,
            timeout_seconds: 60,
            ..DownloaderConfig::default()
        };
        let downloader = YahooFinanceDownloader::with_config(config).unwrap();
        assert_eq!(downloader.config().max_retries, 5);
        assert_eq!(downloader.config().min_interval(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_unthrottled_config() {
        let config = DownloaderConfig {
            requests_per_second: 0.0,
            ..DownloaderConfig::default()
        };
        assert_eq!(config.min_interval(), None);
    }

    #[test]
    fn test_chart_url_covers_inclusive_span() {
        let downloader = YahooFinanceDownloader::new().unwrap();
        let range = DateRange::for_years(2020, 2020).unwrap();
        let url = downloader.chart_url("BRK-B", &range).unwrap();
        assert!(url.starts_with("https://query1.finance.yahoo.com/v8/finance/chart/BRK-B?"));
        // 2020-01-01T00:00:00Z and 2021-01-01T00:00:00Z
        assert!(url.contains("period1=1577836800"));
        assert!(url.contains("period2=1609459200"));
        assert!(url.contains("interval=1d"));
    }

    #[test]
    fn test_parse_chart_response() {
        let table = parse_chart_response(SAMPLE).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.index[0].offset().local_minus_utc(), -14400);
        assert_eq!(table.first_column(CLOSE).unwrap().values[2], RawCell::Missing);
        assert_eq!(
            table.first_column(ADJ_CLOSE).unwrap().values[0],
            RawCell::Number(182.5)
        );
    }

    #[test]
    fn test_parsed_chart_normalizes_to_exchange_days() {
        let table = parse_chart_response(SAMPLE).unwrap();
        let series = normalize(&table).unwrap();
        let days: Vec<String> = series.iter().map(|o| o.date.to_string()).collect();
        assert_eq!(days, vec!["2023-06-14", "2023-06-15", "2023-06-16"]);
        assert_eq!(series[0].close, 182.5);
    }

    #[test]
    fn test_parse_chart_without_rows() {
        let body = r#"{"chart":{"result":[{"meta":{"gmtoffset":-18000},"indicators":{"quote":[{}],"adjclose":[{}]}}],"error":null}}"#;
        let table = parse_chart_response(body).unwrap();
        assert!(table.is_empty());

        let body = r#"{"chart":{"result":[],"error":null}}"#;
        assert!(parse_chart_response(body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_chart_provider_error() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart_response(body).unwrap_err();
        assert!(matches!(err, DownloadError::ProviderError { .. }));
        assert!(err.to_string().contains("delisted"));
    }

    #[test]
    fn test_parse_chart_invalid_json() {
        assert!(matches!(
            parse_chart_response("<html>"),
            Err(DownloadError::ParseError(_))
        ));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(DownloadError::NetworkError("reset".to_string()).is_retryable());
        assert!(DownloadError::ApiError { status: 429, message: String::new() }.is_retryable());
        assert!(DownloadError::ApiError { status: 503, message: String::new() }.is_retryable());
        assert!(!DownloadError::ApiError { status: 404, message: String::new() }.is_retryable());
        assert!(!DownloadError::ParseError("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_download_error_display() {
        let error = DownloadError::NetworkError("Connection timeout".to_string());
        assert!(error.to_string().contains("Network error"));
        assert!(error.to_string().contains("Connection timeout"));
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(7), Duration::from_secs(32));
        assert_eq!(backoff_delay(8), Duration::from_secs(32));
        assert_eq!(backoff_delay(u32::MAX), Duration::from_secs(32));
    }
}
