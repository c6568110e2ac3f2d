//! Ticker-universe retrieval.
//!
//! The universe is the current constituent list of an index, read from a
//! chain of sources: a public HTML table first, then a CSV mirror, then an
//! optional local file. The first source that yields at least one symbol
//! wins. Membership is applied retroactively to every requested year.

use crate::ticker::Ticker;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WIKIPEDIA_URL: &str = "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies";
pub const DEFAULT_CSV_URL: &str =
    "https://raw.githubusercontent.com/datasets/s-and-p-500-companies/main/data/constituents.csv";
const SYMBOL_COLUMN: &str = "Symbol";

/// Errors raised by a single universe source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniverseError {
    /// HTTP or filesystem failure
    Fetch(String),
    /// The payload did not contain a usable symbol list
    Parse(String),
    /// The source answered but listed no symbols
    Empty,
}

impl fmt::Display for UniverseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniverseError::Fetch(msg) => write!(f, "fetch failed: {}", msg),
            UniverseError::Parse(msg) => write!(f, "parse failed: {}", msg),
            UniverseError::Empty => write!(f, "no symbols found"),
        }
    }
}

impl std::error::Error for UniverseError {}

impl From<reqwest::Error> for UniverseError {
    fn from(err: reqwest::Error) -> Self {
        UniverseError::Fetch(err.to_string())
    }
}

impl From<csv::Error> for UniverseError {
    fn from(err: csv::Error) -> Self {
        UniverseError::Parse(err.to_string())
    }
}

/// A provider of raw ticker symbols.
#[async_trait::async_trait]
pub trait UniverseSource: Send + Sync {
    /// Short label used in logs and failure reports.
    fn name(&self) -> String;

    async fn fetch_symbols(&self) -> Result<Vec<String>, UniverseError>;
}

/// One failed source in the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub error: UniverseError,
}

/// Every source in the chain failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseUnavailable {
    pub attempts: Vec<SourceFailure>,
}

impl fmt::Display for UniverseUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticker universe unavailable")?;
        for attempt in &self.attempts {
            write!(f, "; {}: {}", attempt.source, attempt.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for UniverseUnavailable {}

async fn get_text(client: &Client, url: &str) -> Result<String, UniverseError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(UniverseError::Fetch(format!("HTTP {} from {}", status.as_u16(), url)));
    }
    Ok(response.text().await?)
}

fn build_client(timeout: Duration) -> Result<Client, UniverseError> {
    Client::builder()
        .timeout(timeout)
        .user_agent("Mozilla/5.0 (X11; Linux x86_64) seasonality/0.1")
        .build()
        .map_err(|e| UniverseError::Fetch(e.to_string()))
}

fn selector(css: &str) -> Result<Selector, UniverseError> {
    Selector::parse(css).map_err(|e| UniverseError::Parse(format!("selector {}: {}", css, e)))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Extracts the `Symbol` column of the constituents table.
///
/// Looks for `table#constituents` first and otherwise uses the first table
/// on the page, as the page layout has moved around over time.
pub fn parse_symbol_table(html: &str) -> Result<Vec<String>, UniverseError> {
    let document = Html::parse_document(html);
    let by_id = selector("table#constituents")?;
    let any_table = selector("table")?;
    let rows = selector("tr")?;
    let headers = selector("th")?;
    let cells = selector("td")?;

    let table = document
        .select(&by_id)
        .next()
        .or_else(|| document.select(&any_table).next())
        .ok_or_else(|| UniverseError::Parse("no table on page".to_string()))?;

    let mut symbol_col = None;
    let mut symbols = Vec::new();
    for row in table.select(&rows) {
        if symbol_col.is_none() {
            symbol_col = row
                .select(&headers)
                .position(|th| cell_text(th) == SYMBOL_COLUMN);
            continue;
        }
        if let Some(idx) = symbol_col {
            if let Some(cell) = row.select(&cells).nth(idx) {
                let symbol = cell_text(cell);
                if !symbol.is_empty() {
                    symbols.push(symbol);
                }
            }
        }
    }

    if symbol_col.is_none() {
        return Err(UniverseError::Parse(format!("no '{}' column", SYMBOL_COLUMN)));
    }
    Ok(symbols)
}

/// Extracts the `Symbol` column of a CSV document with a header row.
pub fn parse_symbol_csv(data: &str) -> Result<Vec<String>, UniverseError> {
    let mut reader = csv::Reader::from_reader(data.as_bytes());
    let idx = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == SYMBOL_COLUMN)
        .ok_or_else(|| UniverseError::Parse(format!("no '{}' column", SYMBOL_COLUMN)))?;

    let mut symbols = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(symbol) = record.get(idx).map(str::trim).filter(|s| !s.is_empty()) {
            symbols.push(symbol.to_string());
        }
    }
    Ok(symbols)
}

/// Parses a plain list: one symbol per line, blank lines and `#` comments ignored.
pub fn parse_symbol_list(data: &str) -> Vec<String> {
    data.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Constituents table scraped from a Wikipedia page.
pub struct WikipediaSource {
    client: Client,
    url: String,
}

impl WikipediaSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, UniverseError> {
        Ok(WikipediaSource {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl UniverseSource for WikipediaSource {
    fn name(&self) -> String {
        format!("html:{}", self.url)
    }

    async fn fetch_symbols(&self) -> Result<Vec<String>, UniverseError> {
        let html = get_text(&self.client, &self.url).await?;
        parse_symbol_table(&html)
    }
}

/// Constituents CSV served over HTTP.
pub struct CsvUrlSource {
    client: Client,
    url: String,
}

impl CsvUrlSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, UniverseError> {
        Ok(CsvUrlSource {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl UniverseSource for CsvUrlSource {
    fn name(&self) -> String {
        format!("csv:{}", self.url)
    }

    async fn fetch_symbols(&self) -> Result<Vec<String>, UniverseError> {
        let body = get_text(&self.client, &self.url).await?;
        parse_symbol_csv(&body)
    }
}

/// Local file, either a CSV with a `Symbol` header or a plain list.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource { path: path.into() }
    }
}

#[async_trait::async_trait]
impl UniverseSource for FileSource {
    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn fetch_symbols(&self) -> Result<Vec<String>, UniverseError> {
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| UniverseError::Fetch(e.to_string()))?;

        let first_line = data.lines().next().unwrap_or_default();
        if first_line.split(',').any(|h| h.trim() == SYMBOL_COLUMN) {
            parse_symbol_csv(&data)
        } else {
            Ok(parse_symbol_list(&data))
        }
    }
}

/// Fixed list of symbols.
pub struct StaticSource {
    symbols: Vec<String>,
}

impl StaticSource {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StaticSource {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait::async_trait]
impl UniverseSource for StaticSource {
    fn name(&self) -> String {
        "static".to_string()
    }

    async fn fetch_symbols(&self) -> Result<Vec<String>, UniverseError> {
        Ok(self.symbols.clone())
    }
}

/// Result of resolving a universe: tickers plus the symbols that were rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    pub source: String,
    pub tickers: Vec<Ticker>,
    pub rejected: Vec<(String, String)>,
}

/// Normalizes symbols to tickers, dropping duplicates (first occurrence wins)
/// and invalid symbols, then applies `limit`.
pub fn normalize_symbols(symbols: &[String], limit: Option<usize>) -> (Vec<Ticker>, Vec<(String, String)>) {
    let mut seen = HashSet::new();
    let mut tickers = Vec::new();
    let mut rejected = Vec::new();

    for symbol in symbols {
        match Ticker::new(symbol) {
            Ok(ticker) => {
                if seen.insert(ticker.clone()) {
                    tickers.push(ticker);
                }
            }
            Err(e) => rejected.push((symbol.clone(), e.to_string())),
        }
    }

    if let Some(limit) = limit {
        tickers.truncate(limit);
    }
    (tickers, rejected)
}

/// Ordered chain of universe sources.
pub struct FallbackUniverse {
    sources: Vec<Box<dyn UniverseSource>>,
}

impl FallbackUniverse {
    pub fn new(sources: Vec<Box<dyn UniverseSource>>) -> Self {
        FallbackUniverse { sources }
    }

    /// HTML table, then CSV mirror, then an optional local file.
    pub fn standard(
        html_url: &str,
        csv_url: &str,
        file: Option<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, UniverseError> {
        let mut sources: Vec<Box<dyn UniverseSource>> = vec![
            Box::new(WikipediaSource::new(html_url, timeout)?),
            Box::new(CsvUrlSource::new(csv_url, timeout)?),
        ];
        if let Some(path) = file {
            sources.push(Box::new(FileSource::new(path)));
        }
        Ok(FallbackUniverse { sources })
    }

    /// Tries each source in order and returns the first usable universe.
    ///
    /// # Errors
    /// Returns `UniverseUnavailable` with every attempt when no source
    /// yields a valid ticker.
    pub async fn resolve(&self, limit: Option<usize>) -> Result<Universe, UniverseUnavailable> {
        let mut attempts = Vec::new();

        for source in &self.sources {
            let name = source.name();
            let outcome = match source.fetch_symbols().await {
                Ok(symbols) => {
                    let (tickers, rejected) = normalize_symbols(&symbols, limit);
                    if tickers.is_empty() {
                        Err(UniverseError::Empty)
                    } else {
                        Ok(Universe {
                            source: name.clone(),
                            tickers,
                            rejected,
                        })
                    }
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(universe) => {
                    tracing::info!(
                        source = %name,
                        tickers = universe.tickers.len(),
                        rejected = universe.rejected.len(),
                        "ticker universe resolved"
                    );
                    return Ok(universe);
                }
                Err(error) => {
                    tracing::warn!(source = %name, %error, "universe source failed; trying next");
                    attempts.push(SourceFailure {
                        source: name,
                        error,
                    });
                }
            }
        }

        Err(UniverseUnavailable { attempts })
    }
}
