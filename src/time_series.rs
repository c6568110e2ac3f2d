use crate::ticker::Ticker;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Column name for dividend/split adjusted closes.
pub const ADJ_CLOSE: &str = "Adj Close";
/// Column name for raw closes.
pub const CLOSE: &str = "Close";

/// One clean closing price for one trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub date: NaiveDate,
    pub close: f64,
}

impl PriceObservation {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        PriceObservation { date, close }
    }
}

/// A single cell of a raw price table as delivered by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawCell {
    Number(f64),
    Text(String),
    Missing,
}

impl RawCell {
    /// Wraps a provider value, mapping absent and non-finite values to `Missing`.
    pub fn from_f64(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => RawCell::Number(v),
            _ => RawCell::Missing,
        }
    }

    /// Numeric coercion: text is parsed, anything unparseable is `None`.
    pub fn to_number(&self) -> Option<f64> {
        let value = match self {
            RawCell::Number(v) => *v,
            RawCell::Text(s) => s.trim().parse::<f64>().ok()?,
            RawCell::Missing => return None,
        };
        value.is_finite().then_some(value)
    }
}

/// A named column of a raw price table, aligned with the table index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    pub name: String,
    pub values: Vec<RawCell>,
}

/// Time-indexed price table for one ticker, before normalization.
///
/// The index may be unordered, contain duplicate days and carry a UTC
/// offset. Several columns may share a name when a batch API returns
/// more than one series for the same field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPriceTable {
    pub index: Vec<DateTime<FixedOffset>>,
    pub columns: Vec<RawColumn>,
}

impl RawPriceTable {
    pub fn new(index: Vec<DateTime<FixedOffset>>) -> Self {
        RawPriceTable {
            index,
            columns: Vec::new(),
        }
    }

    /// Appends a column. Columns keep insertion order.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<RawCell>) -> Self {
        self.columns.push(RawColumn {
            name: name.into(),
            values,
        });
        self
    }

    /// Number of rows in the index.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// First column with the given name, if any.
    pub fn first_column(&self, name: &str) -> Option<&RawColumn> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// Inclusive calendar span requested from a price source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    /// Start date (inclusive)
    pub start: NaiveDate,
    /// End date (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// `[start_year-01-01, end_year-12-31]`, or `None` for an out-of-range year.
    pub fn for_years(start_year: i32, end_year: i32) -> Option<Self> {
        Some(DateRange {
            start: NaiveDate::from_ymd_opt(start_year, 1, 1)?,
            end: NaiveDate::from_ymd_opt(end_year, 12, 31)?,
        })
    }
}

/// Source of raw daily price history.
///
/// Implementations include the Yahoo Finance downloader, the SQLite
/// read-through cache wrapped around it, and an in-memory source for
/// tests.
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetches daily history covering `[start_year-01-01, end_year-12-31]`.
    ///
    /// An empty table is a valid answer; it is rejected later by the
    /// normalizer.
    async fn fetch_history(
        &self,
        ticker: &Ticker,
        start_year: i32,
        end_year: i32,
    ) -> Result<RawPriceTable, PriceSourceError>;
}

/// Errors returned by a price source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceSourceError {
    /// The source has nothing for this ticker
    TickerNotFound(String),
    /// The requested year span is invalid
    InvalidDateRange,
    /// Transport or provider failure
    Fetch(String),
}

impl std::fmt::Display for PriceSourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceSourceError::TickerNotFound(ticker) => write!(f, "Ticker not found: {}", ticker),
            PriceSourceError::InvalidDateRange => write!(f, "Invalid date range"),
            PriceSourceError::Fetch(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for PriceSourceError {}

/// In-memory price source for testing.
#[derive(Debug, Default)]
pub struct InMemoryPriceSource {
    data: HashMap<Ticker, RawPriceTable>,
    calls: AtomicUsize,
}

impl InMemoryPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, ticker: Ticker, table: RawPriceTable) {
        self.data.insert(ticker, table);
    }

    /// Number of `fetch_history` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PriceSource for InMemoryPriceSource {
    async fn fetch_history(
        &self,
        ticker: &Ticker,
        start_year: i32,
        end_year: i32,
    ) -> Result<RawPriceTable, PriceSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let range =
            DateRange::for_years(start_year, end_year).ok_or(PriceSourceError::InvalidDateRange)?;
        if range.start > range.end {
            return Err(PriceSourceError::InvalidDateRange);
        }

        let table = self
            .data
            .get(ticker)
            .ok_or_else(|| PriceSourceError::TickerNotFound(ticker.to_string()))?;

        let keep: Vec<usize> = table
            .index
            .iter()
            .enumerate()
            .filter(|(_, ts)| {
                let day = ts.date_naive();
                range.start <= day && day <= range.end
            })
            .map(|(i, _)| i)
            .collect();

        let mut filtered = RawPriceTable::new(keep.iter().map(|&i| table.index[i]).collect());
        for column in &table.columns {
            let values = keep
                .iter()
                .map(|&i| column.values.get(i).cloned().unwrap_or(RawCell::Missing))
                .collect();
            filtered = filtered.with_column(column.name.clone(), values);
        }

        Ok(filtered)
    }
}
