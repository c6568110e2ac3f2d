use crate::time_series::PriceObservation;
use crate::window::DateInterval;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Percentage return realized inside one year's window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearlyReturn {
    pub year: i32,
    /// Signed percentage, e.g. `10.0` for +10%
    pub value: f64,
}

/// Errors raised while computing a windowed return.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReturnError {
    /// The first price inside the window is zero
    DivisionByZero { year: i32 },
}

impl fmt::Display for ReturnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnError::DivisionByZero { year } => {
                write!(f, "Start price is zero in the {} window", year)
            }
        }
    }
}

impl std::error::Error for ReturnError {}

/// Simple percentage return between two prices: `(end / start - 1) * 100`.
pub fn percent_return(start_price: f64, end_price: f64) -> Option<f64> {
    if start_price == 0.0 {
        return None;
    }
    Some((end_price / start_price - 1.0) * 100.0)
}

/// Computes the return between the first and last observation inside `interval`.
///
/// `observations` must be ascending by date. Both interval bounds are
/// inclusive. The bracketing prices are the chronologically first and last
/// observations, never the min/max.
///
/// # Arguments
/// * `observations` - One ticker's normalized series
/// * `interval` - The year's window
///
/// # Returns
/// `Ok(None)` when fewer than two observations fall in the window.
///
/// # Errors
/// Returns `ReturnError::DivisionByZero` when the start price is zero.
pub fn compute(
    observations: &[PriceObservation],
    interval: &DateInterval,
) -> Result<Option<YearlyReturn>, ReturnError> {
    let lo = observations.partition_point(|obs| obs.date < interval.start);
    let hi = observations.partition_point(|obs| obs.date <= interval.end);
    let inside = &observations[lo..hi.max(lo)];

    let (first, last) = match inside {
        [first, .., last] => (first, last),
        _ => return Ok(None),
    };

    let value = percent_return(first.close, last.close)
        .ok_or(ReturnError::DivisionByZero { year: interval.year })?;

    Ok(Some(YearlyReturn {
        year: interval.year,
        value,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, m, d).unwrap()
    }

    fn window() -> DateInterval {
        DateInterval {
            year: 2023,
            start: day(6, 14),
            end: day(10, 30),
        }
    }

    fn series(points: &[(u32, u32, f64)]) -> Vec<PriceObservation> {
        points
            .iter()
            .map(|&(m, d, close)| PriceObservation::new(day(m, d), close))
            .collect()
    }

    #[test]
    fn gain_of_ten_percent() {
        let obs = series(&[(6, 1, 50.0), (6, 14, 100.0), (8, 1, 130.0), (10, 30, 110.0), (11, 1, 1.0)]);
        let result = compute(&obs, &window()).unwrap().unwrap();
        assert_eq!(result.year, 2023);
        assert!((result.value - 10.0).abs() < 1e-9);
    }

    #[test]
    fn loss_of_ten_percent() {
        let obs = series(&[(6, 15, 100.0), (7, 1, 80.0), (10, 27, 90.0)]);
        let result = compute(&obs, &window()).unwrap().unwrap();
        assert!((result.value + 10.0).abs() < 1e-9);
    }

    #[test]
    fn uses_temporal_first_and_last_not_extremes() {
        let obs = series(&[(6, 20, 120.0), (7, 1, 200.0), (8, 1, 50.0), (9, 1, 60.0)]);
        let result = compute(&obs, &window()).unwrap().unwrap();
        assert!((result.value - (-50.0)).abs() < 1e-9);
    }

    #[test]
    fn single_observation_yields_nothing() {
        let obs = series(&[(6, 1, 100.0), (7, 4, 101.0), (11, 2, 102.0)]);
        assert_eq!(compute(&obs, &window()).unwrap(), None);
    }

    #[test]
    fn empty_window_yields_nothing() {
        let obs = series(&[(1, 3, 100.0), (12, 29, 101.0)]);
        assert_eq!(compute(&obs, &window()).unwrap(), None);
        assert_eq!(compute(&[], &window()).unwrap(), None);
    }

    #[test]
    fn zero_start_price_is_an_error() {
        let obs = series(&[(6, 14, 0.0), (10, 30, 5.0)]);
        assert_eq!(
            compute(&obs, &window()).unwrap_err(),
            ReturnError::DivisionByZero { year: 2023 }
        );
    }

    #[test]
    fn percent_return_helper() {
        assert_eq!(percent_return(0.0, 1.0), None);
        assert!((percent_return(200.0, 250.0).unwrap() - 25.0).abs() < 1e-12);
    }
}
