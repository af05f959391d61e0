//! Country-year calorie totals.

use std::collections::BTreeMap;

use polars::prelude::*;
use tracing::debug;

use crate::calories::CalorieFrame;
use crate::error::{Result, ShockError};
use crate::ingest::require_columns;
use crate::schema::{production, series};

/// One country's values ordered by year.
#[derive(Debug, Clone, PartialEq)]
pub struct CountrySeries {
    pub country: String,
    pub years: Vec<i32>,
    pub values: Vec<f64>,
}

impl CountrySeries {
    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}

/// Sum every calorie column over every row sharing (country, year).
///
/// Only (country, year) pairs present in the input appear in the output,
/// sorted by country then year.
pub fn aggregate(calories: &CalorieFrame) -> Result<DataFrame> {
    aggregate_columns(&calories.frame, &calories.calorie_columns)
}

pub fn aggregate_columns(df: &DataFrame, calorie_columns: &[String]) -> Result<DataFrame> {
    let mut required = vec![production::COUNTRY, production::YEAR];
    required.extend(calorie_columns.iter().map(String::as_str));
    require_columns(df, &required)?;
    for name in required {
        if df.column(name)?.null_count() > 0 {
            return Err(ShockError::InvalidData(format!("Null {name} in calorie table")));
        }
    }

    let row_total = calorie_columns
        .iter()
        .map(|name| col(name.as_str()).cast(DataType::Float64))
        .reduce(|acc, c| acc + c)
        .unwrap_or_else(|| col(production::YEAR).cast(DataType::Float64) * lit(0.0));

    let totals = df
        .clone()
        .lazy()
        .group_by([
            col(production::COUNTRY),
            col(production::YEAR).cast(DataType::Int32),
        ])
        .agg([row_total.sum().alias(series::TOTAL_CALORIES)])
        .sort([series::COUNTRY, series::YEAR], SortMultipleOptions::default())
        .collect()?;

    debug!(
        rows = df.height(),
        points = totals.height(),
        "aggregated calories by country and year"
    );
    Ok(totals)
}

/// Split a (country, year, value) table into per-country series.
///
/// Each series is ordered by year; duplicate years are an error.
pub fn split_by_country(
    df: &DataFrame,
    country_col: &str,
    year_col: &str,
    value_col: &str,
) -> Result<Vec<CountrySeries>> {
    require_columns(df, &[country_col, year_col, value_col])?;
    let country = df.column(country_col)?.str()?;
    let year = df.column(year_col)?.cast(&DataType::Int32)?;
    let year = year.i32()?;
    let value = df.column(value_col)?.cast(&DataType::Float64)?;
    let value = value.f64()?;

    let mut by_country: BTreeMap<&str, BTreeMap<i32, f64>> = BTreeMap::new();
    for i in 0..df.height() {
        let c = country
            .get(i)
            .ok_or_else(|| ShockError::InvalidData(format!("Null {country_col} at row {i}")))?;
        let y = year
            .get(i)
            .ok_or_else(|| ShockError::InvalidData(format!("Null {year_col} at row {i}")))?;
        let v = value
            .get(i)
            .ok_or_else(|| ShockError::InvalidData(format!("Null {value_col} at row {i}")))?;
        if by_country.entry(c).or_default().insert(y, v).is_some() {
            return Err(ShockError::InvalidData(format!(
                "Duplicate year {y} for '{c}' in column {value_col}"
            )));
        }
    }

    Ok(by_country
        .into_iter()
        .map(|(c, points)| {
            let (years, values) = points.into_iter().unzip();
            CountrySeries {
                country: c.to_string(),
                years,
                values,
            }
        })
        .collect())
}

/// Build a (country, year, `value_col`) table sorted by country then year.
pub(crate) fn series_frame(
    value_col: &str,
    countries: Vec<String>,
    years: Vec<i32>,
    values: Vec<f64>,
) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Column::new(series::COUNTRY.into(), &countries),
        Column::new(series::YEAR.into(), &years),
        Column::new(value_col.into(), &values),
    ])?;
    Ok(df)
}
