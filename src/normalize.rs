use crate::time_series::{PriceObservation, RawPriceTable, ADJ_CLOSE, CLOSE};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;

/// Errors raised while normalizing a raw price table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeError {
    /// The table has no rows
    EmptySeries,
    /// Neither an adjusted-close nor a close column is present
    NoPriceField,
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeError::EmptySeries => write!(f, "Price series is empty"),
            NormalizeError::NoPriceField => {
                write!(f, "Neither '{}' nor '{}' column present", ADJ_CLOSE, CLOSE)
            }
        }
    }
}

impl std::error::Error for NormalizeError {}

/// Turns a raw table into one close per calendar day, ascending by date.
///
/// Uses the first `Adj Close` column, else the first `Close` column.
/// Cells that do not coerce to a finite number are dropped. Dates are the
/// local calendar day of each timestamp with the offset discarded; when a
/// day appears more than once the later row wins.
pub fn normalize(table: &RawPriceTable) -> Result<Vec<PriceObservation>, NormalizeError> {
    if table.is_empty() {
        return Err(NormalizeError::EmptySeries);
    }

    let column = table
        .first_column(ADJ_CLOSE)
        .or_else(|| table.first_column(CLOSE))
        .ok_or(NormalizeError::NoPriceField)?;

    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (timestamp, cell) in table.index.iter().zip(column.values.iter()) {
        if let Some(close) = cell.to_number() {
            by_day.insert(timestamp.date_naive(), close);
        }
    }

    Ok(by_day
        .into_iter()
        .map(|(date, close)| PriceObservation::new(date, close))
        .collect())
}
