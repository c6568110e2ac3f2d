//! Seasonality run orchestration.
//!
//! A run resolves the window plan once, then pushes every ticker through the
//! same pipeline (fetch -> normalize -> windowed returns -> aggregate).
//! Tickers are isolated from each other: a failure is recorded as a
//! [`Warning`] and the run moves on. Results are collected in ticker order
//! before ranking, so the report does not depend on `concurrency`.

use crate::error::{FailureKind, SeasonalityError, Warning};
use crate::normalize::normalize;
use crate::report::{build_report, sheet_name, QualifiedTicker, Report};
use crate::returns::{compute, YearlyReturn};
use crate::statistics::{aggregate, AggregateConfig, TickerStatistics};
use crate::ticker::Ticker;
use crate::time_series::{PriceSource, RawPriceTable};
use crate::universe::FallbackUniverse;
use crate::window::{build_intervals, DateInterval};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Parameters of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalityRequest {
    /// Number of years ending at `end_year`
    pub n_years: u32,
    pub end_year: i32,
    /// Window start, `"MM-DD"`
    pub start_mmdd: String,
    /// Window end, `"MM-DD"`
    pub end_mmdd: String,
    /// Caps the universe size for quick iterations
    pub debug_limit: Option<usize>,
    pub aggregate: AggregateConfig,
    /// Number of ticker pipelines in flight; 1 is sequential
    pub concurrency: usize,
}

impl Default for SeasonalityRequest {
    fn default() -> Self {
        SeasonalityRequest {
            n_years: 15,
            end_year: 2024,
            start_mmdd: "06-14".to_string(),
            end_mmdd: "10-30".to_string(),
            debug_limit: None,
            aggregate: AggregateConfig::default(),
            concurrency: 1,
        }
    }
}

/// Calendar years a request may reference.
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1..=9999;

impl SeasonalityRequest {
    /// First year of the span, `end_year - n_years + 1`.
    ///
    /// Saturates instead of overflowing; [`validate`](Self::validate) rejects
    /// spans that leave [`YEAR_RANGE`].
    pub fn start_year(&self) -> i32 {
        let start = i64::from(self.end_year) - i64::from(self.n_years) + 1;
        start.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    /// Checks the request before any work starts.
    ///
    /// # Returns
    /// `Err(SeasonalityError::InvalidRequest)` when `n_years` is zero or above
    /// 200, when the span leaves [`YEAR_RANGE`], or when `concurrency` is zero.
    pub fn validate(&self) -> Result<(), SeasonalityError> {
        if self.n_years == 0 {
            return Err(SeasonalityError::InvalidRequest(
                "n_years must be at least 1".to_string(),
            ));
        }
        if !YEAR_RANGE.contains(&self.end_year) {
            return Err(SeasonalityError::InvalidRequest(format!(
                "end year {} is outside {}..={}",
                self.end_year,
                YEAR_RANGE.start(),
                YEAR_RANGE.end()
            )));
        }
        if self.n_years > 200 || !YEAR_RANGE.contains(&self.start_year()) {
            return Err(SeasonalityError::InvalidRequest(format!(
                "{} years ending {} is out of range",
                self.n_years, self.end_year
            )));
        }
        if self.concurrency == 0 {
            return Err(SeasonalityError::InvalidRequest(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Progress notifications emitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started { total: usize },
    TickerStarted { index: usize, total: usize, ticker: Ticker },
    TickerFinished { index: usize, total: usize, ticker: Ticker, qualified: bool },
    Finished { qualified: usize, warnings: usize },
}

pub type ProgressCallback = Box<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Everything computed for one ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerAnalysis {
    pub ticker: Ticker,
    /// Qualifying years, ascending
    pub yearly_returns: Vec<YearlyReturn>,
    /// `None` when the ticker has too few qualifying years
    pub statistics: Option<TickerStatistics>,
    /// Per-year skips and the exclusion reason, if any
    pub warnings: Vec<Warning>,
}

/// Runs the pure part of the pipeline on an already fetched table.
///
/// # Errors
/// Returns the failure that removes the whole ticker (empty series or no
/// price field). Per-year problems are recorded in `warnings`.
pub fn analyze_series(
    ticker: &Ticker,
    table: &RawPriceTable,
    intervals: &[DateInterval],
    config: &AggregateConfig,
) -> Result<TickerAnalysis, FailureKind> {
    let observations = normalize(table)?;

    let mut yearly_returns = Vec::with_capacity(intervals.len());
    let mut warnings = Vec::new();

    for interval in intervals {
        match compute(&observations, interval) {
            Ok(Some(r)) => yearly_returns.push(r),
            Ok(None) => warnings.push(Warning::year(
                ticker,
                interval.year,
                FailureKind::InsufficientObservations,
            )),
            Err(e) => warnings.push(Warning::year(ticker, interval.year, e.into())),
        }
    }

    let statistics = aggregate(ticker, &yearly_returns, config);
    if statistics.is_none() {
        warnings.push(Warning::ticker(
            ticker,
            FailureKind::InsufficientQualifyingYears {
                found: yearly_returns.len(),
                required: config.min_qualifying_years.max(1),
            },
        ));
    }

    Ok(TickerAnalysis {
        ticker: ticker.clone(),
        yearly_returns,
        statistics,
        warnings,
    })
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub tickers_processed: usize,
    pub report: Report,
    pub warnings: Vec<Warning>,
}

impl RunOutcome {
    /// True when no ticker qualified.
    pub fn is_empty(&self) -> bool {
        self.report.is_empty()
    }

    /// Warnings that removed a whole ticker from the report.
    pub fn ticker_failures(&self) -> impl Iterator<Item = &Warning> {
        self.warnings
            .iter()
            .filter(|w| w.ticker.is_some() && w.year.is_none())
    }
}

/// Drives seasonality runs against a price source.
pub struct SeasonalityEngine<S> {
    source: S,
    progress_callback: Option<ProgressCallback>,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl<S: PriceSource> SeasonalityEngine<S> {
    pub fn new(source: S) -> Self {
        SeasonalityEngine {
            source,
            progress_callback: None,
            cancel_flag: None,
        }
    }

    /// Registers a callback receiving progress events.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Registers a flag that abandons the run once set.
    ///
    /// The flag is checked after each ticker completes.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress_callback {
            callback(&event);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    async fn process_ticker(
        &self,
        ticker: &Ticker,
        intervals: &[DateInterval],
        request: &SeasonalityRequest,
    ) -> Result<TickerAnalysis, FailureKind> {
        let table = self
            .source
            .fetch_history(ticker, request.start_year(), request.end_year)
            .await?;
        analyze_series(ticker, &table, intervals, &request.aggregate)
    }

    /// Resolves the universe, then runs over it.
    ///
    /// # Errors
    /// Fails before any per-ticker work when every universe source fails.
    pub async fn run_universe(
        &self,
        universe: &FallbackUniverse,
        request: &SeasonalityRequest,
    ) -> Result<RunOutcome, SeasonalityError> {
        request.validate()?;
        let resolved = universe.resolve(request.debug_limit).await?;
        for (symbol, reason) in &resolved.rejected {
            tracing::warn!(%symbol, %reason, "symbol rejected from universe");
        }
        self.run(&resolved.tickers, request).await
    }

    /// Runs the pipeline over `tickers`.
    ///
    /// Always completes unless the request is invalid or the run is
    /// cancelled; an empty report signals that nothing qualified.
    ///
    /// # Arguments
    /// * `tickers` - Universe in iteration order. Repeated tickers are
    ///   processed once, at their first position.
    /// * `request` - Window, year span, aggregation and concurrency settings
    ///
    /// # Returns
    /// A `RunOutcome` with the ranked report and every warning collected,
    /// or `InvalidRequest` / `Cancelled`.
    pub async fn run(
        &self,
        tickers: &[Ticker],
        request: &SeasonalityRequest,
    ) -> Result<RunOutcome, SeasonalityError> {
        request.validate()?;

        let mut seen = HashSet::with_capacity(tickers.len());
        let unique: Vec<&Ticker> = tickers.iter().filter(|t| seen.insert(*t)).collect();
        if unique.len() < tickers.len() {
            tracing::warn!(
                duplicates = tickers.len() - unique.len(),
                "repeated tickers are processed once"
            );
        }
        let tickers = unique;

        let run_id = Uuid::new_v4();
        let start_year = request.start_year();
        let total = tickers.len();
        let window = format!("{}..{}", request.start_mmdd, request.end_mmdd);

        tracing::info!(
            %run_id,
            tickers = total,
            start_year,
            end_year = request.end_year,
            %window,
            "starting seasonality run"
        );

        let plan = build_intervals(
            &request.start_mmdd,
            &request.end_mmdd,
            start_year,
            request.end_year,
        );

        let mut warnings: Vec<Warning> = plan
            .skipped
            .iter()
            .map(|skipped| {
                tracing::warn!(year = skipped.year, error = %skipped.error, "window skipped");
                Warning {
                    ticker: None,
                    year: Some(skipped.year),
                    kind: skipped.error.clone().into(),
                }
            })
            .collect();

        self.emit(ProgressEvent::Started { total });

        let intervals = plan.intervals.as_slice();
        let mut results = stream::iter(tickers.iter().copied().enumerate())
            .map(|(index, ticker)| async move {
                self.emit(ProgressEvent::TickerStarted {
                    index,
                    total,
                    ticker: ticker.clone(),
                });
                let outcome = self.process_ticker(ticker, intervals, request).await;
                (index, ticker, outcome)
            })
            .buffered(request.concurrency);

        let mut qualified = Vec::new();
        while let Some((index, ticker, outcome)) = results.next().await {
            let is_qualified = match outcome {
                Ok(analysis) => {
                    for warning in &analysis.warnings {
                        tracing::debug!(%ticker, year = ?warning.year, kind = %warning.kind, "skipped");
                    }
                    warnings.extend(analysis.warnings);
                    match analysis.statistics {
                        Some(statistics) => {
                            qualified.push(QualifiedTicker {
                                statistics,
                                yearly_returns: analysis.yearly_returns,
                            });
                            true
                        }
                        None => false,
                    }
                }
                Err(kind) => {
                    tracing::warn!(%ticker, error = %kind, "ticker failed");
                    warnings.push(Warning::ticker(ticker, kind));
                    false
                }
            };

            self.emit(ProgressEvent::TickerFinished {
                index,
                total,
                ticker: ticker.clone(),
                qualified: is_qualified,
            });

            if self.is_cancelled() {
                tracing::info!(%run_id, completed = index + 1, "run cancelled");
                return Err(SeasonalityError::Cancelled);
            }
        }

        let report = build_report(qualified);
        if let Report::Populated { dropped_details, .. } = &report {
            for ticker in dropped_details {
                warnings.push(Warning::ticker(
                    ticker,
                    FailureKind::SheetNameCollision(sheet_name(ticker.as_str())),
                ));
            }
        }

        let qualified_count = match &report {
            Report::Populated { summary, .. } => summary.rows.len(),
            Report::Empty => 0,
        };

        self.emit(ProgressEvent::Finished {
            qualified: qualified_count,
            warnings: warnings.len(),
        });

        tracing::info!(
            %run_id,
            qualified = qualified_count,
            warnings = warnings.len(),
            "seasonality run complete"
        );

        Ok(RunOutcome {
            run_id,
            tickers_processed: total,
            report,
            warnings,
        })
    }
}
