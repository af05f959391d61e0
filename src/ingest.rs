//! Production table validation and row selection.
//!
//! The pipeline only accepts a production table that has passed
//! [`validate_production`]: typed columns, no nulls, no negative weights and
//! exactly one row per (country, crop, year).

use std::collections::HashSet;

use polars::prelude::*;
use tracing::debug;

use crate::error::{Result, ShockError};
use crate::schema::production;

const KEY: [&str; 3] = [production::COUNTRY, production::CROP, production::YEAR];

/// One row of the production table. Weights are in tonnes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductionRecord {
    pub country: String,
    pub crop: String,
    pub year: i32,
    pub production: f64,
}

impl ProductionRecord {
    pub fn new(
        country: impl Into<String>,
        crop: impl Into<String>,
        year: i32,
        production: f64,
    ) -> Self {
        Self {
            country: country.into(),
            crop: crop.into(),
            year,
            production,
        }
    }
}

/// Build a production table from typed records.
///
/// The records are validated exactly as a loaded table would be.
pub fn production_from_records(records: &[ProductionRecord]) -> Result<DataFrame> {
    let df = records_to_frame(records)?;
    validate_production(&df)
}

/// Check and normalize a production table.
///
/// Casts `year` to Int32 and `production` to Float64, and returns the rows
/// sorted by (country, crop, year). Extra columns are dropped.
pub fn validate_production(df: &DataFrame) -> Result<DataFrame> {
    require_columns(df, &production::ALL)?;
    let records = read_records(df)?;
    let normalized = records_to_frame(&records)?;

    let duplicates = normalized
        .clone()
        .lazy()
        .group_by(KEY.map(col))
        .agg([col(production::PRODUCTION).count().alias("_row_count")])
        .filter(col("_row_count").gt(lit(1)))
        .sort(KEY, SortMultipleOptions::default())
        .collect()?;
    if duplicates.height() > 0 {
        return Err(ShockError::DuplicateKey {
            country: duplicates
                .column(production::COUNTRY)?
                .str()?
                .get(0)
                .unwrap_or_default()
                .to_string(),
            crop: duplicates
                .column(production::CROP)?
                .str()?
                .get(0)
                .unwrap_or_default()
                .to_string(),
            year: duplicates.column(production::YEAR)?.i32()?.get(0).unwrap_or_default(),
        });
    }

    let sorted = normalized
        .lazy()
        .sort(KEY, SortMultipleOptions::default())
        .collect()?;
    debug!(rows = sorted.height(), "validated production table");
    Ok(sorted)
}

/// Read every row of a production table into typed records.
pub fn read_records(df: &DataFrame) -> Result<Vec<ProductionRecord>> {
    let country = df.column(production::COUNTRY)?.str()?;
    let crop = df.column(production::CROP)?.str()?;
    let year = df.column(production::YEAR)?.cast(&DataType::Int32)?;
    let year = year.i32()?;
    let weight = df.column(production::PRODUCTION)?.cast(&DataType::Float64)?;
    let weight = weight.f64()?;

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let country = country
            .get(i)
            .ok_or_else(|| null_at(production::COUNTRY, i))?;
        let crop = crop.get(i).ok_or_else(|| null_at(production::CROP, i))?;
        let year = year.get(i).ok_or_else(|| null_at(production::YEAR, i))?;
        let weight = weight
            .get(i)
            .ok_or_else(|| null_at(production::PRODUCTION, i))?;

        if !weight.is_finite() || weight < 0.0 {
            return Err(ShockError::InvalidData(format!(
                "Production for ({country}, {crop}, {year}) must be a non-negative number, got {weight}"
            )));
        }
        records.push(ProductionRecord::new(country, crop, year, weight));
    }
    Ok(records)
}

/// Explicit row selection applied before calorie conversion.
///
/// Rows for crops outside `crops` are dropped on purpose here, rather than
/// silently inside the converter.
#[derive(Debug, Clone, Default)]
pub struct ProductionFilter {
    pub crops: Option<Vec<String>>,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
}

impl ProductionFilter {
    pub fn crops<I, S>(mut self, crops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.crops = Some(crops.into_iter().map(Into::into).collect());
        self
    }

    pub fn years(mut self, first: i32, last: i32) -> Self {
        self.first_year = Some(first);
        self.last_year = Some(last);
        self
    }

    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        if let (Some(first), Some(last)) = (self.first_year, self.last_year) {
            if first > last {
                return Err(ShockError::InvalidConfiguration(format!(
                    "Year range is empty: {first}..={last}"
                )));
            }
        }
        require_columns(df, &[production::CROP, production::YEAR])?;

        let crop = df.column(production::CROP)?.str()?;
        let year = df.column(production::YEAR)?.cast(&DataType::Int32)?;
        let year = year.i32()?;
        let wanted: Option<HashSet<&str>> = self
            .crops
            .as_ref()
            .map(|c| c.iter().map(String::as_str).collect());

        let mask: BooleanChunked = crop
            .into_iter()
            .zip(year.into_iter())
            .map(|(c, y)| {
                let crop_ok = match (&wanted, c) {
                    (None, _) => true,
                    (Some(set), Some(c)) => set.contains(c),
                    (Some(_), None) => false,
                };
                let year_ok = match y {
                    Some(y) => {
                        self.first_year.map_or(true, |f| y >= f)
                            && self.last_year.map_or(true, |l| y <= l)
                    }
                    None => self.first_year.is_none() && self.last_year.is_none(),
                };
                Some(crop_ok && year_ok)
            })
            .collect();

        let filtered = df.filter(&mask)?;
        debug!(
            before = df.height(),
            after = filtered.height(),
            "applied production filter"
        );
        Ok(filtered)
    }
}

pub(crate) fn require_columns(df: &DataFrame, required: &[&str]) -> Result<()> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(ShockError::MissingColumn(col_name.to_string()));
        }
    }
    Ok(())
}

fn null_at(column: &str, row: usize) -> ShockError {
    ShockError::InvalidData(format!("Null {column} at row {row}"))
}

fn records_to_frame(records: &[ProductionRecord]) -> Result<DataFrame> {
    let countries: Vec<&str> = records.iter().map(|r| r.country.as_str()).collect();
    let crops: Vec<&str> = records.iter().map(|r| r.crop.as_str()).collect();
    let years: Vec<i32> = records.iter().map(|r| r.year).collect();
    let weights: Vec<f64> = records.iter().map(|r| r.production).collect();

    let df = DataFrame::new(vec![
        Column::new(production::COUNTRY.into(), &countries),
        Column::new(production::CROP.into(), &crops),
        Column::new(production::YEAR.into(), &years),
        Column::new(production::PRODUCTION.into(), &weights),
    ])?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame() -> DataFrame {
        df!(
            production::COUNTRY => ["B", "A", "A"],
            production::CROP => ["Rice", "Wheat", "Rice"],
            production::YEAR => [2001i64, 2000, 2000],
            production::PRODUCTION => [3.0, 2.0, 1.0],
            "unit" => ["t", "t", "t"],
        )
        .unwrap()
    }

    #[test]
    fn validation_sorts_and_normalizes() {
        let df = validate_production(&raw_frame()).unwrap();
        assert_eq!(df.width(), 4);
        assert_eq!(df.column(production::YEAR).unwrap().dtype(), &DataType::Int32);

        let records = read_records(&df).unwrap();
        assert_eq!(records[0], ProductionRecord::new("A", "Rice", 2000, 1.0));
        assert_eq!(records[1], ProductionRecord::new("A", "Wheat", 2000, 2.0));
        assert_eq!(records[2], ProductionRecord::new("B", "Rice", 2001, 3.0));
    }

    #[test]
    fn duplicate_key_is_an_error() {
        let records = vec![
            ProductionRecord::new("A", "Rice", 2000, 1.0),
            ProductionRecord::new("A", "Wheat", 2000, 1.0),
            ProductionRecord::new("A", "Rice", 2000, 5.0),
        ];
        match production_from_records(&records).unwrap_err() {
            ShockError::DuplicateKey { country, crop, year } => {
                assert_eq!((country.as_str(), crop.as_str(), year), ("A", "Rice", 2000));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn negative_production_is_rejected() {
        let records = vec![ProductionRecord::new("A", "Rice", 2000, -1.0)];
        assert!(matches!(
            production_from_records(&records),
            Err(ShockError::InvalidData(_))
        ));
    }

    #[test]
    fn missing_column_is_reported() {
        let df = raw_frame().drop(production::PRODUCTION).unwrap();
        match validate_production(&df).unwrap_err() {
            ShockError::MissingColumn(name) => assert_eq!(name, production::PRODUCTION),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn null_weight_is_rejected() {
        let df = df!(
            production::COUNTRY => ["A"],
            production::CROP => ["Rice"],
            production::YEAR => [2000i32],
            production::PRODUCTION => [None::<f64>],
        )
        .unwrap();
        assert!(matches!(
            validate_production(&df),
            Err(ShockError::InvalidData(_))
        ));
    }

    #[test]
    fn filter_selects_crops_and_years() {
        let df = validate_production(&raw_frame()).unwrap();
        let filtered = ProductionFilter::default()
            .crops(["Rice"])
            .years(2000, 2000)
            .apply(&df)
            .unwrap();
        let records = read_records(&filtered).unwrap();
        assert_eq!(records, vec![ProductionRecord::new("A", "Rice", 2000, 1.0)]);
    }

    #[test]
    fn empty_year_range_is_a_configuration_error() {
        let df = validate_production(&raw_frame()).unwrap();
        let err = ProductionFilter::default()
            .years(2001, 2000)
            .apply(&df)
            .unwrap_err();
        assert!(matches!(err, ShockError::InvalidConfiguration(_)));
    }
}
