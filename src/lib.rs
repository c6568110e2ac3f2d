pub mod ticker;
pub mod window;
pub mod time_series;
pub mod normalize;
pub mod returns;
pub mod statistics;
pub mod report;
pub mod export;
pub mod yahoo_finance;
pub mod cache;
pub mod universe;
pub mod error;
pub mod config;
pub mod pipeline;

pub use ticker::{Ticker, TickerError};
pub use window::{build_intervals, DateInterval, IntervalPlan, SkippedYear, WindowError};
pub use time_series::{
    DateRange, InMemoryPriceSource, PriceObservation, PriceSource, PriceSourceError, RawCell,
    RawColumn, RawPriceTable,
};
pub use normalize::{normalize, NormalizeError};
pub use returns::{YearlyReturn, ReturnError};
pub use statistics::{aggregate, AggregateConfig, StdDevConvention, TickerStatistics};
pub use report::{build_report, Cell, QualifiedTicker, Report, Table};
pub use export::{export, write_csv_dir, write_xlsx, ExportError, ExportFormat};
pub use yahoo_finance::{DownloadError, DownloaderConfig, YahooFinanceDownloader};
pub use cache::{CacheError, CachedPriceSource, SqlitePriceCache};
pub use universe::{
    FallbackUniverse, FileSource, StaticSource, Universe, UniverseError, UniverseSource,
    UniverseUnavailable,
};
pub use error::{FailureKind, SeasonalityError, Warning};
pub use config::Settings;
pub use pipeline::{
    analyze_series, ProgressCallback, ProgressEvent, RunOutcome, SeasonalityEngine,
    SeasonalityRequest, TickerAnalysis,
};
