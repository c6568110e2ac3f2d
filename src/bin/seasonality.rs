//! Seasonality report CLI
//!
//! Run with: `cargo run --bin seasonality -- --years 15 --start 06-14 --end 10-30`
//!
//! Set RUST_LOG to control log output, e.g. `RUST_LOG=seasonality=debug`.

use chrono::Datelike;
use clap::{Parser, ValueEnum};
use seasonality::{
    export, AggregateConfig, CachedPriceSource, ExportFormat, FallbackUniverse, PriceSource,
    ProgressEvent, RunOutcome, SeasonalityEngine, SeasonalityError, SeasonalityRequest, Settings,
    SqlitePriceCache, StdDevConvention, YahooFinanceDownloader,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Seasonal return statistics for S&P 500 constituents.
///
/// For every ticker, measures the return between the first and last trading
/// day inside a fixed calendar window in each of the last N years, then
/// ranks tickers by mean return.
#[derive(Debug, Parser)]
#[command(name = "seasonality", version, about = "Seasonal window returns for the S&P 500")]
struct Cli {
    /// Number of years ending at --end-year.
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u32).range(1..=30))]
    years: u32,

    /// Last year of the analysis span.
    #[arg(long, default_value_t = 2024)]
    end_year: i32,

    /// Window start as MM-DD.
    #[arg(long, default_value = "06-14")]
    start: String,

    /// Window end as MM-DD.
    #[arg(long, default_value = "10-30")]
    end: String,

    /// Only analyze the first N tickers of the universe.
    #[arg(long)]
    debug_limit: Option<usize>,

    /// Tickers with fewer qualifying years are left out.
    #[arg(long, default_value_t = 3)]
    min_years: usize,

    /// Standard deviation convention.
    #[arg(long, value_enum, default_value_t = StdDevArg::Sample)]
    stddev: StdDevArg,

    /// Number of tickers processed at once.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=64))]
    concurrency: u16,

    /// Output workbook path, or directory for --format csv.
    #[arg(long, default_value = "seasonality_sp500.xlsx")]
    output: PathBuf,

    /// Report format.
    #[arg(long, value_enum, default_value_t = FormatArg::Xlsx)]
    format: FormatArg,

    /// Bypass the SQLite price cache.
    #[arg(long, default_value_t = false)]
    no_cache: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StdDevArg {
    /// Divide by n - 1
    Sample,
    /// Divide by n
    Population,
}

impl From<StdDevArg> for StdDevConvention {
    fn from(arg: StdDevArg) -> Self {
        match arg {
            StdDevArg::Sample => StdDevConvention::Sample,
            StdDevArg::Population => StdDevConvention::Population,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// Single .xlsx workbook
    Xlsx,
    /// Directory of .csv files
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Xlsx => ExportFormat::Xlsx,
            FormatArg::Csv => ExportFormat::CsvDir,
        }
    }
}

impl Cli {
    fn request(&self) -> SeasonalityRequest {
        SeasonalityRequest {
            n_years: self.years,
            end_year: self.end_year,
            start_mmdd: self.start.clone(),
            end_mmdd: self.end.clone(),
            debug_limit: self.debug_limit,
            aggregate: AggregateConfig {
                min_qualifying_years: self.min_years,
                std_dev: self.stddev.into(),
            },
            concurrency: usize::from(self.concurrency),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("seasonality=info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let current_year = chrono::Utc::now().year();
    if !(2000..=current_year).contains(&cli.end_year) {
        eprintln!("error: --end-year must be between 2000 and {}", current_year);
        return ExitCode::from(1);
    }

    match run(&cli).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {}", error);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: &Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let settings = Settings::from_env();
    let request = cli.request();

    let universe = FallbackUniverse::standard(
        &settings.universe_url,
        &settings.universe_csv_url,
        settings.universe_file.clone(),
        settings.http_timeout(),
    )?;
    let downloader = YahooFinanceDownloader::with_config(settings.downloader_config())?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received, stopping after the current ticker");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let cache = if cli.no_cache {
        None
    } else {
        match SqlitePriceCache::new(&settings.cache_path, settings.cache_ttl()) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(path = %settings.cache_path.display(), error = %e, "cache unavailable; fetching directly");
                None
            }
        }
    };

    let result = match cache {
        Some(cache) => {
            if let Err(e) = cache.purge_expired() {
                tracing::warn!(error = %e, "could not purge expired cache entries");
            }
            let source = CachedPriceSource::new(downloader, cache);
            execute(source, &universe, &request, cancel).await
        }
        None => execute(downloader, &universe, &request, cancel).await,
    };

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(SeasonalityError::UniverseUnavailable(e)) => {
            eprintln!("error: {}", e);
            return Ok(ExitCode::from(1));
        }
        Err(e) => return Err(e.into()),
    };

    print_warnings(&outcome);

    if outcome.is_empty() {
        println!("no qualifying data");
        return Ok(ExitCode::from(2));
    }

    export(&outcome.report, cli.format.into(), &cli.output)?;
    println!(
        "Wrote {} ({} tickers processed, run {})",
        cli.output.display(),
        outcome.tickers_processed,
        outcome.run_id
    );
    Ok(ExitCode::SUCCESS)
}

async fn execute<S: PriceSource>(
    source: S,
    universe: &FallbackUniverse,
    request: &SeasonalityRequest,
    cancel: Arc<AtomicBool>,
) -> Result<RunOutcome, SeasonalityError> {
    let engine = SeasonalityEngine::new(source)
        .with_cancel_flag(cancel)
        .with_progress_callback(Box::new(|event: &ProgressEvent| match event {
            ProgressEvent::TickerFinished {
                index,
                total,
                ticker,
                qualified,
            } => tracing::info!("[{}/{}] {} {}", index + 1, total, ticker, if *qualified { "ok" } else { "skipped" }),
            ProgressEvent::Started { total } => tracing::info!("Processing {} tickers", total),
            _ => {}
        }));
    engine.run_universe(universe, request).await
}

fn print_warnings(outcome: &RunOutcome) {
    if outcome.warnings.is_empty() {
        return;
    }
    eprintln!(
        "{} warning(s), {} at ticker level:",
        outcome.warnings.len(),
        outcome.ticker_failures().count()
    );
    for warning in outcome.ticker_failures() {
        eprintln!("  {}", warning);
    }
    for warning in outcome.warnings.iter().filter(|w| w.ticker.is_none()) {
        eprintln!("  {}", warning);
    }
}
