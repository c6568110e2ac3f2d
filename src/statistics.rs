//! Per-ticker reduction of yearly returns to summary statistics.
//!
//! Values are sorted before any arithmetic so the result does not depend
//! on the order years were computed in; repeated runs over the same
//! returns are bit-identical. Nothing is rounded here.

use crate::returns::YearlyReturn;
use crate::ticker::Ticker;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Divisor used for the standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StdDevConvention {
    /// Divide by `n - 1`; undefined for a single year
    #[default]
    Sample,
    /// Divide by `n`
    Population,
}

impl FromStr for StdDevConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sample" => Ok(StdDevConvention::Sample),
            "population" => Ok(StdDevConvention::Population),
            other => Err(format!("unknown stddev convention '{}'", other)),
        }
    }
}

/// Aggregation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateConfig {
    /// Tickers with fewer qualifying years are excluded
    pub min_qualifying_years: usize,
    pub std_dev: StdDevConvention,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        AggregateConfig {
            min_qualifying_years: 3,
            std_dev: StdDevConvention::Sample,
        }
    }
}

/// Summary statistics of one ticker's yearly returns, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerStatistics {
    pub ticker: Ticker,
    pub mean: f64,
    pub median: f64,
    /// `None` when the convention is undefined for the sample size
    pub stddev: Option<f64>,
    pub percent_positive: f64,
    pub sample_count: usize,
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median of an ascending slice.
fn median_sorted(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

/// Standard deviation of `values`
///
/// # Arguments
/// * `values` - Sample to measure
/// * `convention` - `Sample` divides by n - 1, `Population` by n
///
/// # Returns
/// `None` when the divisor would be zero (fewer than two values for
/// `Sample`, none for `Population`).
pub fn std_dev(values: &[f64], convention: StdDevConvention) -> Option<f64> {
    let n = values.len();
    let divisor = match convention {
        StdDevConvention::Sample if n >= 2 => (n - 1) as f64,
        StdDevConvention::Population if n >= 1 => n as f64,
        _ => return None,
    };

    let mu = mean(values)?;
    let variance = values.iter().map(|&v| (v - mu).powi(2)).sum::<f64>() / divisor;
    Some(variance.sqrt())
}

/// Reduces a ticker's yearly returns to statistics.
///
/// Missing years are not imputed. Values are sorted before summing so any
/// permutation of the same returns gives bit-identical results.
///
/// # Arguments
/// * `ticker` - Ticker the returns belong to
/// * `yearly_returns` - Qualifying years only, in any order
/// * `config` - Minimum qualifying years and stddev convention
///
/// # Returns
/// `None` when fewer than `config.min_qualifying_years` returns (and at
/// least one) are available.
pub fn aggregate(
    ticker: &Ticker,
    yearly_returns: &[YearlyReturn],
    config: &AggregateConfig,
) -> Option<TickerStatistics> {
    let sample_count = yearly_returns.len();
    if sample_count == 0 || sample_count < config.min_qualifying_years {
        return None;
    }

    let mut values: Vec<f64> = yearly_returns.iter().map(|r| r.value).collect();
    values.sort_by(f64::total_cmp);

    let positive = values.iter().filter(|&&v| v > 0.0).count();

    Some(TickerStatistics {
        ticker: ticker.clone(),
        mean: mean(&values)?,
        median: median_sorted(&values)?,
        stddev: std_dev(&values, config.std_dev),
        percent_positive: positive as f64 / sample_count as f64 * 100.0,
        sample_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn returns(values: &[f64]) -> Vec<YearlyReturn> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| YearlyReturn {
                year: 2000 + i as i32,
                value,
            })
            .collect()
    }

    fn ticker() -> Ticker {
        Ticker::new("AAPL").unwrap()
    }

    #[test]
    fn computes_summary_values() {
        let config = AggregateConfig::default();
        let stats = aggregate(&ticker(), &returns(&[10.0, -5.0, 4.0, 3.0]), &config).unwrap();
        assert!((stats.mean - 3.0).abs() < 1e-12);
        assert!((stats.median - 3.5).abs() < 1e-12);
        assert!((stats.percent_positive - 75.0).abs() < 1e-12);
        assert_eq!(stats.sample_count, 4);
        // deviations 7, -8, 1, 0 -> 114 / 3
        assert!((stats.stddev.unwrap() - (114.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn population_convention_divides_by_n() {
        let config = AggregateConfig {
            min_qualifying_years: 1,
            std_dev: StdDevConvention::Population,
        };
        let stats = aggregate(&ticker(), &returns(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), &config)
            .unwrap();
        assert!((stats.stddev.unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn sample_stddev_undefined_for_one_year() {
        let config = AggregateConfig {
            min_qualifying_years: 1,
            std_dev: StdDevConvention::Sample,
        };
        let stats = aggregate(&ticker(), &returns(&[5.0]), &config).unwrap();
        assert_eq!(stats.stddev, None);
        assert_eq!(stats.median, 5.0);
    }

    #[test]
    fn below_threshold_is_excluded() {
        let config = AggregateConfig::default();
        assert!(aggregate(&ticker(), &returns(&[1.0, 2.0]), &config).is_none());
        assert!(aggregate(&ticker(), &[], &AggregateConfig {
            min_qualifying_years: 0,
            ..config
        })
        .is_none());
    }

    #[test]
    fn zero_is_not_positive() {
        let config = AggregateConfig::default();
        let stats = aggregate(&ticker(), &returns(&[0.0, 1.0, -1.0, 0.0]), &config).unwrap();
        assert!((stats.percent_positive - 25.0).abs() < 1e-12);
    }

    #[test]
    fn order_independent() {
        let config = AggregateConfig::default();
        let values = [0.1, 12.7, -3.3, 1e-9, 7.25, -0.4];
        let base = aggregate(&ticker(), &returns(&values), &config).unwrap();

        let mut reversed = values;
        reversed.reverse();
        let rotated = [7.25, -0.4, 0.1, 12.7, -3.3, 1e-9];

        for permutation in [&reversed[..], &rotated[..]] {
            let stats = aggregate(&ticker(), &returns(permutation), &config).unwrap();
            assert_eq!(stats, base);
        }
    }

    #[test]
    fn parses_convention() {
        assert_eq!("Sample".parse::<StdDevConvention>().unwrap(), StdDevConvention::Sample);
        assert_eq!(
            "population".parse::<StdDevConvention>().unwrap(),
            StdDevConvention::Population
        );
        assert!("ddof".parse::<StdDevConvention>().is_err());
    }
}
