//! Savitzky–Golay baseline estimation.
//!
//! Interior points are the value at the window center of a degree-`P` least
//! squares fit over the `W` surrounding years. The first and last `W / 2`
//! points are taken from the polynomial fitted to the first (last) full
//! window, evaluated at their own positions, i.e. extrapolated from the
//! nearest full window rather than refitted on a truncated one. Shock flags
//! at series endpoints depend on this choice.

use nalgebra::{DMatrix, DVector};
use polars::prelude::*;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{GapStrategy, SmoothingConfig};
use crate::error::{Result, ShockError};
use crate::schema::{baseline, series};
use crate::series::{series_frame, split_by_country, CountrySeries};

/// Precomputed filter for one (window, polyorder) pair.
#[derive(Debug, Clone)]
pub struct SavitzkyGolay {
    config: SmoothingConfig,
    /// Window positions are `(j - h) / scale`, so they lie in `[-1, 1]`.
    scale: f64,
    /// Least squares solution operator (terms x window) of the window's
    /// Vandermonde matrix, from its SVD.
    pinv: DMatrix<f64>,
}

impl SavitzkyGolay {
    pub fn new(config: &SmoothingConfig) -> Result<Self> {
        config.validate()?;
        let w = config.window_length;
        let h = config.half_window() as f64;
        let scale = h.max(1.0);
        let terms = config.polyorder + 1;

        let vandermonde =
            DMatrix::from_fn(w, terms, |j, k| ((j as f64 - h) / scale).powi(k as i32));
        let svd = vandermonde.svd(true, true);
        let s_max = svd.singular_values.iter().fold(0.0_f64, |a, &b| a.max(b));
        let tol = f64::EPSILON * w as f64 * s_max;
        if svd.rank(tol) < terms {
            return Err(singular());
        }
        let pinv = svd.pseudo_inverse(tol).map_err(|e| {
            ShockError::InvalidConfiguration(format!("Smoothing least squares failed: {e}"))
        })?;

        Ok(Self {
            config: *config,
            scale,
            pinv,
        })
    }

    pub fn config(&self) -> &SmoothingConfig {
        &self.config
    }

    /// Smooth a contiguous sequence of at least `window_length` values.
    ///
    /// `country` only labels a `SeriesTooShort` error.
    pub fn apply(&self, country: &str, values: &[f64]) -> Result<Vec<f64>> {
        let w = self.config.window_length;
        let h = self.config.half_window();
        let n = values.len();
        if n < w {
            return Err(ShockError::SeriesTooShort {
                country: country.to_string(),
                len: n,
                window: w,
            });
        }

        let mut out = vec![0.0; n];
        for i in h..n - h {
            let (coeffs, mean) = self.fit(&values[i - h..=i + h]);
            out[i] = mean + coeffs[0];
        }

        let (head, mean) = self.fit(&values[..w]);
        for (i, slot) in out.iter_mut().enumerate().take(h) {
            *slot = mean + horner(&head, (i as f64 - h as f64) / self.scale);
        }
        let (tail, mean) = self.fit(&values[n - w..]);
        for i in n - h..n {
            out[i] = mean + horner(&tail, ((i + h + 1) as f64 - n as f64) / self.scale);
        }
        Ok(out)
    }

    /// Smooth one country, handling gaps per the configured strategy.
    ///
    /// The returned series has exactly the input's years. The window is
    /// checked against observed years only; interpolated ones don't count.
    pub fn smooth(&self, input: &CountrySeries) -> Result<CountrySeries> {
        let w = self.config.window_length;
        if input.len() < w {
            return Err(ShockError::SeriesTooShort {
                country: input.country.clone(),
                len: input.len(),
                window: w,
            });
        }

        let gap = input
            .years
            .windows(2)
            .find(|pair| pair[1] != pair[0] + 1)
            .map(|pair| (pair[0], pair[1]));

        let values = match (gap, self.config.gaps) {
            (None, _) => self.apply(&input.country, &input.values)?,
            (Some((after, next)), GapStrategy::Reject) => {
                return Err(ShockError::NonContiguousSeries {
                    country: input.country.clone(),
                    after,
                    next,
                })
            }
            (Some(_), GapStrategy::Interpolate) => {
                let (years, filled) = fill_gaps(input);
                warn!(
                    country = %input.country,
                    filled = filled.len() - input.len(),
                    "interpolated missing years before smoothing"
                );
                let smoothed = self.apply(&input.country, &filled)?;
                let first = years[0];
                input
                    .years
                    .iter()
                    .map(|&y| smoothed[(y - first) as usize])
                    .collect()
            }
        };

        debug!(country = %input.country, points = values.len(), "smoothed series");
        Ok(CountrySeries {
            country: input.country.clone(),
            years: input.years.clone(),
            values,
        })
    }

    /// Polynomial coefficients for one full window, fitted to the values
    /// minus their mean. Returns the coefficients and that mean.
    fn fit(&self, window: &[f64]) -> (DVector<f64>, f64) {
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        let centered = DVector::from_iterator(window.len(), window.iter().map(|v| v - mean));
        (&self.pinv * centered, mean)
    }
}

/// Baseline table for a (country, year, total_calories) series table.
///
/// Countries are smoothed independently in parallel. Output is sorted by
/// (country, year); when several countries fail, the error of the first
/// country in sort order is returned.
pub fn smooth_frame(df: &DataFrame, config: &SmoothingConfig) -> Result<DataFrame> {
    let filter = SavitzkyGolay::new(config)?;
    let inputs = split_by_country(df, series::COUNTRY, series::YEAR, series::TOTAL_CALORIES)?;

    let results: Vec<Result<CountrySeries>> =
        inputs.par_iter().map(|s| filter.smooth(s)).collect();
    let mut smoothed = results.into_iter().collect::<Result<Vec<_>>>()?;
    smoothed.sort_by(|a, b| a.country.cmp(&b.country));

    let mut countries = Vec::new();
    let mut years = Vec::new();
    let mut values = Vec::new();
    for s in smoothed {
        countries.extend(std::iter::repeat(s.country).take(s.years.len()));
        years.extend(s.years);
        values.extend(s.values);
    }

    info!(
        countries = inputs.len(),
        points = values.len(),
        window_length = config.window_length,
        polyorder = config.polyorder,
        "computed baselines"
    );
    series_frame(baseline::BASELINE, countries, years, values)
}

/// Linearly fill missing years. Returns the full year range and values.
pub(crate) fn fill_gaps(input: &CountrySeries) -> (Vec<i32>, Vec<f64>) {
    let mut years = Vec::new();
    let mut values = Vec::new();
    for (i, (&y, &v)) in input.years.iter().zip(&input.values).enumerate() {
        if i > 0 {
            let (py, pv) = (input.years[i - 1], input.values[i - 1]);
            let span = f64::from(y - py);
            for missing in py + 1..y {
                let t = f64::from(missing - py) / span;
                years.push(missing);
                values.push(pv + t * (v - pv));
            }
        }
        years.push(y);
        values.push(v);
    }
    (years, values)
}

fn horner(coeffs: &DVector<f64>, x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

fn singular() -> ShockError {
    ShockError::InvalidConfiguration("Smoothing design matrix is rank deficient".into())
}
