//! Co-movement of calorie shocks between countries.
//!
//! A country's calories are part of the world total, so correlating a
//! country against the world directly would partly correlate it with
//! itself. [`country_world_correlations`] instead compares each country with
//! the world minus that country, re-smoothed on its own.

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::*;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::{DetectionConfig, GapStrategy, SmoothingConfig};
use crate::error::Result;
use crate::schema::{correlation, series, shocks};
use crate::series::{split_by_country, CountrySeries};
use crate::shocks::ShockRecord;
use crate::smoothing::SavitzkyGolay;

pub const REST_OF_WORLD_WINDOW_LENGTH: usize = 15;
pub const REST_OF_WORLD_POLYORDER: usize = 3;

/// Smoother used for the rest-of-world series: W = 15, P = 3.
pub fn rest_of_world_smoothing() -> SmoothingConfig {
    SmoothingConfig {
        window_length: REST_OF_WORLD_WINDOW_LENGTH,
        polyorder: REST_OF_WORLD_POLYORDER,
        gaps: GapStrategy::Reject,
    }
}

/// Spearman correlation of every country's relative deviation with the
/// relative deviation of the rest of the world.
///
/// `series_df` is the (country, year, total_calories) table the shocks were
/// computed from; the world total per year is its sum over countries.
/// Countries with fewer than two shared years, or with a constant series,
/// are left out. Output is (country, correlation), strongest first.
pub fn country_world_correlations(
    series_df: &DataFrame,
    shocks_df: &DataFrame,
    config: &SmoothingConfig,
) -> Result<DataFrame> {
    let filter = SavitzkyGolay::new(config)?;
    let countries = split_by_country(
        series_df,
        series::COUNTRY,
        series::YEAR,
        series::TOTAL_CALORIES,
    )?;
    let own = split_by_country(
        shocks_df,
        shocks::COUNTRY,
        shocks::YEAR,
        shocks::RELATIVE_DEVIATION,
    )?;
    let own: BTreeMap<&str, &CountrySeries> =
        own.iter().map(|s| (s.country.as_str(), s)).collect();

    let world = series_df
        .clone()
        .lazy()
        .group_by([col(series::YEAR).cast(DataType::Int32)])
        .agg([col(series::TOTAL_CALORIES)
            .cast(DataType::Float64)
            .sum()
            .alias(series::TOTAL_CALORIES)])
        .sort([series::YEAR], SortMultipleOptions::default())
        .collect()?;
    let years: Vec<i32> = world.column(series::YEAR)?.i32()?.into_no_null_iter().collect();
    let totals: Vec<f64> = world
        .column(series::TOTAL_CALORIES)?
        .f64()?
        .into_no_null_iter()
        .collect();

    let results: Vec<Result<Option<(String, f64)>>> = countries
        .par_iter()
        .map(|country| {
            let Some(deviation) = own.get(country.country.as_str()) else {
                return Ok(None);
            };
            let rest = rest_of_world(&years, &totals, country);
            let rest_deviation = relative_deviations(&filter, &rest)?;

            let (x, y): (Vec<f64>, Vec<f64>) = deviation
                .years
                .iter()
                .zip(&deviation.values)
                .filter_map(|(year, &d)| rest_deviation.get(year).map(|&r| (d, r)))
                .unzip();
            Ok(spearman(&x, &y).map(|rho| (country.country.clone(), rho)))
        })
        .collect();

    let mut pairs: Vec<(String, f64)> = results
        .into_iter()
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if pairs.len() < countries.len() {
        debug!(
            skipped = countries.len() - pairs.len(),
            "countries without a defined rest-of-world correlation"
        );
    }
    info!(
        countries = pairs.len(),
        window_length = config.window_length,
        polyorder = config.polyorder,
        "computed country vs rest-of-world correlations"
    );

    let (names, values): (Vec<String>, Vec<f64>) = pairs.into_iter().unzip();
    let df = DataFrame::new(vec![
        Column::new(correlation::COUNTRY.into(), names),
        Column::new(correlation::CORRELATION.into(), values),
    ])?;
    Ok(df)
}

/// Pearson correlation matrix of relative deviations between countries.
///
/// Only countries observed in every year of the table are included. The
/// output has a `country` column followed by one column per country; an
/// entry is null when either series is constant.
pub fn correlation_matrix(shocks_df: &DataFrame) -> Result<DataFrame> {
    let deviations = split_by_country(
        shocks_df,
        shocks::COUNTRY,
        shocks::YEAR,
        shocks::RELATIVE_DEVIATION,
    )?;
    let all_years: BTreeSet<i32> = deviations
        .iter()
        .flat_map(|s| s.years.iter().copied())
        .collect();
    let complete: Vec<&CountrySeries> = deviations
        .iter()
        .filter(|s| s.len() == all_years.len())
        .collect();
    if complete.len() < deviations.len() {
        debug!(
            dropped = deviations.len() - complete.len(),
            "countries with missing years left out of the correlation matrix"
        );
    }

    let names: Vec<&str> = complete.iter().map(|s| s.country.as_str()).collect();
    let mut columns = vec![Column::new(correlation::COUNTRY.into(), &names)];
    for s in &complete {
        let row: Vec<Option<f64>> = complete
            .iter()
            .map(|other| pearson(&s.values, &other.values))
            .collect();
        columns.push(Column::new(s.country.as_str().into(), row));
    }
    Ok(DataFrame::new(columns)?)
}

/// World total minus one country, over every year of the world table.
fn rest_of_world(years: &[i32], totals: &[f64], country: &CountrySeries) -> CountrySeries {
    let own: BTreeMap<i32, f64> = country
        .years
        .iter()
        .copied()
        .zip(country.values.iter().copied())
        .collect();
    CountrySeries {
        country: format!("rest of world without {}", country.country),
        years: years.to_vec(),
        values: years
            .iter()
            .zip(totals)
            .map(|(year, total)| total - own.get(year).copied().unwrap_or(0.0))
            .collect(),
    }
}

fn relative_deviations(
    filter: &SavitzkyGolay,
    input: &CountrySeries,
) -> Result<BTreeMap<i32, f64>> {
    let smoothed = filter.smooth(input)?;
    let detection = DetectionConfig::default();
    input
        .years
        .iter()
        .zip(&input.values)
        .zip(&smoothed.values)
        .map(|((&year, &actual), &base)| {
            let r = ShockRecord::evaluate(input.country.as_str(), year, actual, base, &detection)?;
            Ok((year, r.relative_deviation))
        })
        .collect()
}

/// Spearman rank correlation, with tied values sharing their mean rank.
///
/// `None` for fewer than two pairs or when either side is constant.
pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() {
        return None;
    }
    pearson(&ranks(x), &ranks(y))
}

pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // 1-based mean of positions i..=j
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = rank;
        }
        i = j + 1;
    }
    ranks
}
