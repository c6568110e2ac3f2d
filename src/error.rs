use crate::export::ExportError;
use crate::normalize::NormalizeError;
use crate::returns::ReturnError;
use crate::ticker::Ticker;
use crate::time_series::PriceSourceError;
use crate::universe::UniverseUnavailable;
use crate::window::WindowError;
use std::fmt;

/// Why a ticker, or one year of a ticker, is missing from the report.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    /// Price retrieval failed
    FetchFailed(String),
    /// The provider returned no rows
    EmptySeries,
    /// No adjusted-close or close field
    NoPriceField,
    /// The window could not be resolved for a year
    InvalidWindowFormat(String),
    /// Fewer than two observations inside a year's window
    InsufficientObservations,
    /// Zero start price inside a year's window
    DivisionByZero,
    /// Too few qualifying years to be reported
    InsufficientQualifyingYears { found: usize, required: usize },
    /// Detail sheet dropped because its name was already taken
    SheetNameCollision(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::FetchFailed(msg) => write!(f, "fetch failed: {}", msg),
            FailureKind::EmptySeries => write!(f, "empty price series"),
            FailureKind::NoPriceField => write!(f, "no price field"),
            FailureKind::InvalidWindowFormat(msg) => write!(f, "invalid window: {}", msg),
            FailureKind::InsufficientObservations => {
                write!(f, "fewer than two observations in window")
            }
            FailureKind::DivisionByZero => write!(f, "start price is zero"),
            FailureKind::InsufficientQualifyingYears { found, required } => write!(
                f,
                "{} qualifying year(s), {} required",
                found, required
            ),
            FailureKind::SheetNameCollision(name) => {
                write!(f, "detail sheet name '{}' already used", name)
            }
        }
    }
}

impl From<PriceSourceError> for FailureKind {
    fn from(err: PriceSourceError) -> Self {
        FailureKind::FetchFailed(err.to_string())
    }
}

impl From<NormalizeError> for FailureKind {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::EmptySeries => FailureKind::EmptySeries,
            NormalizeError::NoPriceField => FailureKind::NoPriceField,
        }
    }
}

impl From<ReturnError> for FailureKind {
    fn from(err: ReturnError) -> Self {
        match err {
            ReturnError::DivisionByZero { .. } => FailureKind::DivisionByZero,
        }
    }
}

impl From<WindowError> for FailureKind {
    fn from(err: WindowError) -> Self {
        FailureKind::InvalidWindowFormat(err.to_string())
    }
}

/// A non-fatal problem recorded during a run.
///
/// `ticker` is `None` for window problems that affect every ticker;
/// `year` is `None` for problems that affect a whole ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub ticker: Option<Ticker>,
    pub year: Option<i32>,
    pub kind: FailureKind,
}

impl Warning {
    pub fn ticker(ticker: &Ticker, kind: FailureKind) -> Self {
        Warning {
            ticker: Some(ticker.clone()),
            year: None,
            kind,
        }
    }

    pub fn year(ticker: &Ticker, year: i32, kind: FailureKind) -> Self {
        Warning {
            ticker: Some(ticker.clone()),
            year: Some(year),
            kind,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.ticker, self.year) {
            (Some(t), Some(y)) => write!(f, "{} {}: {}", t, y, self.kind),
            (Some(t), None) => write!(f, "{}: {}", t, self.kind),
            (None, Some(y)) => write!(f, "{}: {}", y, self.kind),
            (None, None) => write!(f, "{}", self.kind),
        }
    }
}

/// Errors that abort a run.
#[derive(Debug)]
pub enum SeasonalityError {
    /// Every ticker-universe source failed
    UniverseUnavailable(UniverseUnavailable),
    /// Request parameters are out of range
    InvalidRequest(String),
    /// The caller abandoned the run
    Cancelled,
    /// Writing the report failed
    Export(ExportError),
}

impl fmt::Display for SeasonalityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeasonalityError::UniverseUnavailable(err) => write!(f, "{}", err),
            SeasonalityError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            SeasonalityError::Cancelled => write!(f, "Run cancelled"),
            SeasonalityError::Export(err) => write!(f, "Export failed: {}", err),
        }
    }
}

impl std::error::Error for SeasonalityError {}

impl From<UniverseUnavailable> for SeasonalityError {
    fn from(err: UniverseUnavailable) -> Self {
        SeasonalityError::UniverseUnavailable(err)
    }
}

impl From<ExportError> for SeasonalityError {
    fn from(err: ExportError) -> Self {
        SeasonalityError::Export(err)
    }
}
