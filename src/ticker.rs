use serde::{Deserialize, Serialize};
use std::fmt;

/// Equity ticker in the price provider's symbol format.
///
/// Canonical exchange symbols use `.` as the share-class separator
/// (e.g. "BRK.B"); the provider expects `-` ("BRK-B"). Construction
/// trims whitespace, upper-cases and applies that substitution, so two
/// spellings of the same instrument compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticker(String);

impl Ticker {
    /// Creates a ticker from a raw symbol, normalizing it to provider format.
    ///
    /// # Errors
    /// Returns an error if the symbol is empty after trimming or contains
    /// characters other than ASCII alphanumerics, `-`, `_`, `^` and `=`.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, TickerError> {
        let normalized = Self::normalize(raw.as_ref());
        Self::validate(&normalized)?;
        Ok(Ticker(normalized))
    }

    fn normalize(raw: &str) -> String {
        raw.trim().to_ascii_uppercase().replace('.', "-")
    }

    fn validate(symbol: &str) -> Result<(), TickerError> {
        if symbol.is_empty() {
            return Err(TickerError::EmptySymbol);
        }

        if !symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '^' | '='))
        {
            return Err(TickerError::InvalidCharacters(symbol.to_string()));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when creating a ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickerError {
    /// The symbol is empty
    EmptySymbol,
    /// The symbol contains characters the provider does not accept
    InvalidCharacters(String),
}

impl fmt::Display for TickerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickerError::EmptySymbol => write!(f, "Ticker symbol cannot be empty"),
            TickerError::InvalidCharacters(symbol) => {
                write!(f, "Ticker symbol '{}' contains invalid characters", symbol)
            }
        }
    }
}

impl std::error::Error for TickerError {}
