//! Deviation of actual calories from the baseline, and shock flags.

use polars::prelude::*;
use tracing::info;

use crate::config::DetectionConfig;
use crate::error::{Result, ShockError};
use crate::ingest::require_columns;
use crate::schema::{baseline, series, shocks};
use crate::series::split_by_country;

#[derive(Debug, Clone, PartialEq)]
pub struct ShockRecord {
    pub country: String,
    pub year: i32,
    pub actual: f64,
    pub baseline: f64,
    /// `(actual - baseline) / baseline`
    pub relative_deviation: f64,
    pub is_shock: bool,
}

impl ShockRecord {
    /// Fails with `InvalidBaseline` unless `baseline` is strictly positive.
    pub fn evaluate(
        country: impl Into<String>,
        year: i32,
        actual: f64,
        baseline: f64,
        config: &DetectionConfig,
    ) -> Result<Self> {
        let country = country.into();
        if !(baseline > 0.0) || !baseline.is_finite() {
            return Err(ShockError::InvalidBaseline {
                country,
                year,
                baseline,
            });
        }
        let relative_deviation = (actual - baseline) / baseline;
        Ok(Self {
            country,
            year,
            actual,
            baseline,
            relative_deviation,
            is_shock: config.is_shock(relative_deviation),
        })
    }

    pub fn magnitude(&self) -> f64 {
        self.relative_deviation.abs()
    }
}

/// Compare a series table against its baseline table.
///
/// Both tables must carry exactly the same (country, year) keys.
pub fn detect(
    series_df: &DataFrame,
    baseline_df: &DataFrame,
    config: &DetectionConfig,
) -> Result<DataFrame> {
    let records = detect_records(series_df, baseline_df, config)?;
    let flagged = records.iter().filter(|r| r.is_shock).count();
    info!(
        points = records.len(),
        shocks = flagged,
        threshold = config.threshold,
        "detected shocks"
    );
    records_to_frame(&records)
}

pub fn detect_records(
    series_df: &DataFrame,
    baseline_df: &DataFrame,
    config: &DetectionConfig,
) -> Result<Vec<ShockRecord>> {
    config.validate()?;
    let actual = split_by_country(
        series_df,
        series::COUNTRY,
        series::YEAR,
        series::TOTAL_CALORIES,
    )?;
    let expected = split_by_country(
        baseline_df,
        baseline::COUNTRY,
        baseline::YEAR,
        baseline::BASELINE,
    )?;

    if actual.len() != expected.len()
        || actual
            .iter()
            .zip(&expected)
            .any(|(a, e)| a.country != e.country || a.years != e.years)
    {
        return Err(ShockError::InvalidData(
            "Series and baseline tables do not share the same (country, year) keys".into(),
        ));
    }

    let mut records = Vec::with_capacity(series_df.height());
    for (a, e) in actual.iter().zip(&expected) {
        for ((&year, &value), &base) in a.years.iter().zip(&a.values).zip(&e.values) {
            records.push(ShockRecord::evaluate(
                a.country.as_str(),
                year,
                value,
                base,
                config,
            )?);
        }
    }
    Ok(records)
}

/// Read a shock table back into records.
pub fn read_shocks(df: &DataFrame) -> Result<Vec<ShockRecord>> {
    require_columns(
        df,
        &[
            shocks::COUNTRY,
            shocks::YEAR,
            shocks::ACTUAL,
            shocks::BASELINE,
            shocks::RELATIVE_DEVIATION,
            shocks::IS_SHOCK,
        ],
    )?;
    let country = df.column(shocks::COUNTRY)?.str()?;
    let year = df.column(shocks::YEAR)?.cast(&DataType::Int32)?;
    let year = year.i32()?;
    let actual = df.column(shocks::ACTUAL)?.f64()?;
    let base = df.column(shocks::BASELINE)?.f64()?;
    let deviation = df.column(shocks::RELATIVE_DEVIATION)?.f64()?;
    let flag = df.column(shocks::IS_SHOCK)?.bool()?;

    (0..df.height())
        .map(|i| -> Result<ShockRecord> {
            let null = |name: &str| ShockError::InvalidData(format!("Null {name} at row {i}"));
            Ok(ShockRecord {
                country: country.get(i).ok_or_else(|| null(shocks::COUNTRY))?.to_string(),
                year: year.get(i).ok_or_else(|| null(shocks::YEAR))?,
                actual: actual.get(i).ok_or_else(|| null(shocks::ACTUAL))?,
                baseline: base.get(i).ok_or_else(|| null(shocks::BASELINE))?,
                relative_deviation: deviation
                    .get(i)
                    .ok_or_else(|| null(shocks::RELATIVE_DEVIATION))?,
                is_shock: flag.get(i).ok_or_else(|| null(shocks::IS_SHOCK))?,
            })
        })
        .collect()
}

pub fn records_to_frame(records: &[ShockRecord]) -> Result<DataFrame> {
    let countries: Vec<&str> = records.iter().map(|r| r.country.as_str()).collect();
    let years: Vec<i32> = records.iter().map(|r| r.year).collect();
    let actual: Vec<f64> = records.iter().map(|r| r.actual).collect();
    let base: Vec<f64> = records.iter().map(|r| r.baseline).collect();
    let deviation: Vec<f64> = records.iter().map(|r| r.relative_deviation).collect();
    let flags: Vec<bool> = records.iter().map(|r| r.is_shock).collect();

    let df = DataFrame::new(vec![
        Column::new(shocks::COUNTRY.into(), &countries),
        Column::new(shocks::YEAR.into(), &years),
        Column::new(shocks::ACTUAL.into(), &actual),
        Column::new(shocks::BASELINE.into(), &base),
        Column::new(shocks::RELATIVE_DEVIATION.into(), &deviation),
        Column::new(shocks::IS_SHOCK.into(), &flags),
    ])?;
    Ok(df)
}
