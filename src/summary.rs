//! Shock frequency and magnitude per country or per caller-defined group.

use std::collections::BTreeMap;

use polars::prelude::*;
use tracing::info;

use crate::error::{Result, ShockError};
use crate::ingest::require_columns;
use crate::schema::{annotation, shocks, summary};
use crate::shocks::read_shocks;

/// Statistics for one country (or group). Magnitudes are `None` when the
/// group has no shocks.
#[derive(Debug, Clone, PartialEq)]
pub struct CountrySummary {
    pub key: String,
    pub shock_count: u32,
    pub mean_magnitude: Option<f64>,
    pub max_magnitude: Option<f64>,
    pub first_year: i32,
    pub last_year: i32,
    pub years_covered: u32,
}

/// Per-country summary of a shock table.
pub fn summarize(shocks_df: &DataFrame) -> Result<DataFrame> {
    read_shocks(shocks_df)?;
    let out = summarize_on(shocks_df.clone(), shocks::COUNTRY)?;
    info!(countries = out.height(), "summarized shocks by country");
    Ok(out)
}

/// Summary over a caller-supplied partition of (country, year), e.g. region
/// or decade. The output key column is `group`.
pub fn summarize_by<F>(shocks_df: &DataFrame, group: F) -> Result<DataFrame>
where
    F: Fn(&str, i32) -> String,
{
    let keys: Vec<String> = read_shocks(shocks_df)?
        .iter()
        .map(|r| group(&r.country, r.year))
        .collect();
    let mut keyed = shocks_df.clone();
    keyed.with_column(Column::new(summary::GROUP.into(), keys))?;

    let out = summarize_on(keyed, summary::GROUP)?;
    info!(groups = out.height(), "summarized shocks by group");
    Ok(out)
}

/// Group a shock table on `key` and aggregate, ordered by key.
fn summarize_on(df: DataFrame, key: &str) -> Result<DataFrame> {
    let deviation = col(shocks::RELATIVE_DEVIATION);
    let magnitude = when(deviation.clone().lt(lit(0.0)))
        .then(lit(0.0) - deviation.clone())
        .otherwise(deviation)
        .filter(col(shocks::IS_SHOCK));

    let out = df
        .lazy()
        .group_by([col(key)])
        .agg([
            col(shocks::IS_SHOCK)
                .cast(DataType::UInt32)
                .sum()
                .cast(DataType::UInt32)
                .alias(summary::SHOCK_COUNT),
            magnitude.clone().mean().alias(summary::MEAN_MAGNITUDE),
            magnitude.max().alias(summary::MAX_MAGNITUDE),
            col(shocks::YEAR).min().alias(summary::FIRST_YEAR),
            col(shocks::YEAR).max().alias(summary::LAST_YEAR),
            col(shocks::YEAR)
                .n_unique()
                .cast(DataType::UInt32)
                .alias(summary::YEARS_COVERED),
        ])
        .sort([key], SortMultipleOptions::default())
        .collect()?;
    Ok(out)
}

/// Read a summary table back into typed rows. `key_col` is `country` or
/// `group`.
pub fn read_summaries(df: &DataFrame, key_col: &str) -> Result<Vec<CountrySummary>> {
    let key = df.column(key_col)?.str()?;
    let count = df.column(summary::SHOCK_COUNT)?.u32()?;
    let mean = df.column(summary::MEAN_MAGNITUDE)?.f64()?;
    let max = df.column(summary::MAX_MAGNITUDE)?.f64()?;
    let first = df.column(summary::FIRST_YEAR)?.i32()?;
    let last = df.column(summary::LAST_YEAR)?.i32()?;
    let covered = df.column(summary::YEARS_COVERED)?.u32()?;

    (0..df.height())
        .map(|i| -> Result<CountrySummary> {
            let null = |name: &str| ShockError::InvalidData(format!("Null {name} at row {i}"));
            Ok(CountrySummary {
                key: key.get(i).ok_or_else(|| null(key_col))?.to_string(),
                shock_count: count.get(i).ok_or_else(|| null(summary::SHOCK_COUNT))?,
                mean_magnitude: mean.get(i),
                max_magnitude: max.get(i),
                first_year: first.get(i).ok_or_else(|| null(summary::FIRST_YEAR))?,
                last_year: last.get(i).ok_or_else(|| null(summary::LAST_YEAR))?,
                years_covered: covered.get(i).ok_or_else(|| null(summary::YEARS_COVERED))?,
            })
        })
        .collect()
}

/// Decade label for time-window grouping, e.g. `1987 -> "1980s"`.
pub fn decade(year: i32) -> String {
    format!("{}s", year.div_euclid(10) * 10)
}

/// Shock-cause labels produced outside this crate, keyed by (country, year).
///
/// Read-only: labels are never generated or checked against the shocks.
#[derive(Debug, Clone, Default)]
pub struct AnnotationLabels {
    labels: BTreeMap<(String, i32), String>,
}

impl AnnotationLabels {
    /// Load from a table with `country`, `year` and `category` columns.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        require_columns(
            df,
            &[annotation::COUNTRY, annotation::YEAR, annotation::CATEGORY],
        )?;
        let country = df.column(annotation::COUNTRY)?.str()?;
        let year = df.column(annotation::YEAR)?.cast(&DataType::Int32)?;
        let year = year.i32()?;
        let category = df.column(annotation::CATEGORY)?.str()?;

        let mut labels = BTreeMap::new();
        for i in 0..df.height() {
            let (Some(c), Some(y)) = (country.get(i), year.get(i)) else {
                return Err(ShockError::InvalidData(format!(
                    "Null annotation key at row {i}"
                )));
            };
            // unlabeled rows are allowed in the source table
            let Some(label) = category.get(i) else {
                continue;
            };
            if labels.insert((c.to_string(), y), label.to_string()).is_some() {
                return Err(ShockError::InvalidData(format!(
                    "Duplicate annotation for ({c}, {y})"
                )));
            }
        }
        Ok(Self { labels })
    }

    pub fn label(&self, country: &str, year: i32) -> Option<&str> {
        self.labels
            .get(&(country.to_string(), year))
            .map(String::as_str)
    }

    /// Grouping function for [`summarize_by`].
    pub fn group_of(&self, country: &str, year: i32) -> String {
        self.label(country, year)
            .unwrap_or(annotation::UNLABELED)
            .to_string()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
