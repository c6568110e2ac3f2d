//! Cross-ticker ranking and report tables.
//!
//! The report is format-neutral: a summary table plus one detail table per
//! ticker, each with a sheet name that is valid for spreadsheet workbooks.
//! Percentages are rounded to two decimals here and nowhere else.

use crate::returns::YearlyReturn;
use crate::statistics::TickerStatistics;
use crate::ticker::Ticker;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::HashSet;

/// Name of the summary sheet.
pub const SUMMARY_SHEET: &str = "Statistics";
/// Workbook sheet-name length limit.
pub const MAX_SHEET_NAME_LEN: usize = 31;

pub const SUMMARY_HEADERS: [&str; 6] = [
    "Ticker",
    "Mean%",
    "Median%",
    "Stddev%",
    "%PositiveYears",
    "YearCount",
];
pub const DETAIL_HEADERS: [&str; 2] = ["Year", "Return%"];

/// A ticker that passed aggregation, with the returns behind its statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct QualifiedTicker {
    pub statistics: TickerStatistics,
    pub yearly_returns: Vec<YearlyReturn>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Integer(i64),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    fn new(name: impl Into<String>, headers: &[&str]) -> Self {
        Table {
            name: name.into(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

/// Rendered result of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// No ticker qualified
    Empty,
    Populated {
        summary: Table,
        details: Vec<Table>,
        /// Tickers whose detail sheet name collided with an earlier sheet
        dropped_details: Vec<Ticker>,
    },
}

impl Report {
    pub fn is_empty(&self) -> bool {
        matches!(self, Report::Empty)
    }

    /// Summary first, then detail tables in ranking order.
    pub fn tables(&self) -> Vec<&Table> {
        match self {
            Report::Empty => Vec::new(),
            Report::Populated {
                summary, details, ..
            } => std::iter::once(summary).chain(details.iter()).collect(),
        }
    }
}

/// Rounds to two decimals for display.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Sheet name for a ticker: characters workbooks reject become `_`, then
/// the name is cut to its first 31 characters. No disambiguation is applied.
pub fn sheet_name(ticker: &str) -> String {
    ticker
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            other => other,
        })
        .take(MAX_SHEET_NAME_LEN)
        .collect()
}

fn summary_row(stats: &TickerStatistics) -> Vec<Cell> {
    vec![
        Cell::Text(stats.ticker.to_string()),
        Cell::Number(round2(stats.mean)),
        Cell::Number(round2(stats.median)),
        stats.stddev.map(|v| Cell::Number(round2(v))).unwrap_or(Cell::Empty),
        Cell::Number(round2(stats.percent_positive)),
        Cell::Integer(stats.sample_count as i64),
    ]
}

fn detail_table(name: String, yearly_returns: &[YearlyReturn]) -> Table {
    let mut sorted = yearly_returns.to_vec();
    sorted.sort_by_key(|r| r.year);

    let mut table = Table::new(name, &DETAIL_HEADERS);
    table.rows = sorted
        .iter()
        .map(|r| vec![Cell::Integer(r.year as i64), Cell::Number(round2(r.value))])
        .collect();
    table
}

/// Ranks tickers by mean return and renders the report tables.
///
/// The sort is stable, so tickers with equal means keep their input order.
///
/// # Arguments
/// * `results` - Qualified tickers in run order
///
/// # Returns
/// `Report::Empty` when `results` is empty. Otherwise the `Statistics`
/// summary followed by one detail table per ticker; detail tables whose
/// sheet name is already taken are listed in `dropped_details`.
pub fn build_report(mut results: Vec<QualifiedTicker>) -> Report {
    if results.is_empty() {
        return Report::Empty;
    }

    results.sort_by_key(|r| Reverse(OrderedFloat(r.statistics.mean)));

    let mut summary = Table::new(SUMMARY_SHEET, &SUMMARY_HEADERS);
    let mut details = Vec::with_capacity(results.len());
    let mut dropped_details = Vec::new();

    // Workbooks compare sheet names case-insensitively.
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(SUMMARY_SHEET.to_lowercase());

    for result in &results {
        summary.rows.push(summary_row(&result.statistics));

        let name = sheet_name(result.statistics.ticker.as_str());
        if !seen.insert(name.to_lowercase()) {
            tracing::warn!(
                ticker = %result.statistics.ticker,
                sheet = %name,
                "detail sheet name already used; dropping detail sheet"
            );
            dropped_details.push(result.statistics.ticker.clone());
            continue;
        }
        details.push(detail_table(name, &result.yearly_returns));
    }

    Report::Populated {
        summary,
        details,
        dropped_details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qualified(symbol: &str, mean: f64) -> QualifiedTicker {
        QualifiedTicker {
            statistics: TickerStatistics {
                ticker: Ticker::new(symbol).unwrap(),
                mean,
                median: mean,
                stddev: Some(1.0),
                percent_positive: 50.0,
                sample_count: 2,
            },
            yearly_returns: vec![
                YearlyReturn { year: 2021, value: mean + 1.0 },
                YearlyReturn { year: 2020, value: mean - 1.0 },
            ],
        }
    }

    fn summary_tickers(report: &Report) -> Vec<String> {
        match report {
            Report::Populated { summary, .. } => summary
                .rows
                .iter()
                .map(|row| match &row[0] {
                    Cell::Text(t) => t.clone(),
                    other => panic!("unexpected cell {:?}", other),
                })
                .collect(),
            Report::Empty => Vec::new(),
        }
    }

    #[test]
    fn empty_input_gives_empty_report() {
        let report = build_report(Vec::new());
        assert!(report.is_empty());
        assert!(report.tables().is_empty());
    }

    #[test]
    fn sorts_by_mean_descending_and_stably() {
        let report = build_report(vec![
            qualified("A", 5.0),
            qualified("B", -2.0),
            qualified("C", 5.0),
            qualified("D", 10.0),
        ]);
        assert_eq!(summary_tickers(&report), vec!["D", "A", "C", "B"]);

        let names: Vec<&str> = report.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Statistics", "D", "A", "C", "B"]);
    }

    #[test]
    fn summary_row_is_rounded_at_render_time() {
        let mut q = qualified("AAPL", 1.23456);
        q.statistics.stddev = None;
        q.statistics.percent_positive = 66.666666;
        let report = build_report(vec![q]);
        let Report::Populated { summary, .. } = report else {
            panic!("expected populated report");
        };
        assert_eq!(summary.headers, SUMMARY_HEADERS.to_vec());
        assert_eq!(
            summary.rows[0],
            vec![
                Cell::Text("AAPL".to_string()),
                Cell::Number(1.23),
                Cell::Number(1.23),
                Cell::Empty,
                Cell::Number(66.67),
                Cell::Integer(2),
            ]
        );
    }

    #[test]
    fn detail_rows_ascend_by_year() {
        let report = build_report(vec![qualified("MSFT", 3.0)]);
        let Report::Populated { details, .. } = report else {
            panic!("expected populated report");
        };
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].headers, DETAIL_HEADERS.to_vec());
        assert_eq!(
            details[0].rows,
            vec![
                vec![Cell::Integer(2020), Cell::Number(2.0)],
                vec![Cell::Integer(2021), Cell::Number(4.0)],
            ]
        );
    }

    #[test]
    fn long_names_are_cut_to_31_chars() {
        let long = "A".repeat(40);
        let name = sheet_name(&long);
        assert_eq!(name.len(), 31);
        assert_eq!(name, long[..31]);
    }

    #[test]
    fn illegal_sheet_characters_are_replaced() {
        assert_eq!(sheet_name("A/B:C*D?"), "A_B_C_D_");
    }

    #[test]
    fn colliding_sheet_names_drop_the_later_detail() {
        let a = "X".repeat(35);
        let b = format!("{}Y", "X".repeat(34));
        let report = build_report(vec![qualified(&a, 2.0), qualified(&b, 1.0)]);
        let Report::Populated {
            summary,
            details,
            dropped_details,
        } = report
        else {
            panic!("expected populated report");
        };
        assert_eq!(summary.rows.len(), 2);
        assert_eq!(details.len(), 1);
        assert_eq!(dropped_details, vec![Ticker::new(&b).unwrap()]);
    }

    #[test]
    fn ticker_named_like_summary_sheet_is_dropped() {
        let report = build_report(vec![qualified("STATISTICS", 1.0)]);
        let Report::Populated { dropped_details, .. } = report else {
            panic!("expected populated report");
        };
        assert_eq!(dropped_details.len(), 1);
    }
}
