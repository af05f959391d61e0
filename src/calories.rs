//! Crop production → calories.
//!
//! [`CalorieTable`] is the typed schema for crop identities: every crop that
//! reaches [`convert`] must have a factor, otherwise the whole conversion
//! fails with [`ShockError::UnknownCrop`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use polars::prelude::*;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, ShockError};
use crate::ingest::{require_columns, ProductionRecord};
use crate::schema::{calories, production};

/// Grams per tonne divided by the 100 g reference portion.
const PORTIONS_PER_TONNE: f64 = 10_000.0;

/// Crop → kcal per tonne of production.
#[derive(Debug, Clone, PartialEq)]
pub struct CalorieTable {
    factors: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalorieUnit {
    #[default]
    KcalPerTonne,
    #[serde(rename = "kcal_per_100g")]
    KcalPer100g,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CalorieTableFile {
    #[serde(default)]
    units: CalorieUnit,
    crops: BTreeMap<String, f64>,
}

impl CalorieTable {
    /// Factors are kcal per tonne.
    pub fn new<I, S>(factors: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (crop, factor) in factors {
            let crop = crop.into();
            if crop.trim().is_empty() {
                return Err(ShockError::InvalidConfiguration(
                    "Calorie table contains an empty crop name".into(),
                ));
            }
            if !factor.is_finite() || factor < 0.0 {
                return Err(ShockError::InvalidConfiguration(format!(
                    "Calorie factor for '{crop}' must be a non-negative number, got {factor}"
                )));
            }
            if map.insert(crop.clone(), factor).is_some() {
                return Err(ShockError::InvalidConfiguration(format!(
                    "Calorie table lists '{crop}' twice"
                )));
            }
        }
        Ok(Self { factors: map })
    }

    /// Build from FAO-style densities given in kcal per 100 g.
    pub fn from_kcal_per_100g<I, S>(densities: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self::new(
            densities
                .into_iter()
                .map(|(crop, kcal)| (crop, kcal * PORTIONS_PER_TONNE)),
        )
    }

    /// The staple crops of the FAO calorie analysis.
    pub fn fao_staples() -> Self {
        const KCAL_PER_100G: [(&str, f64); 22] = [
            // Cereals
            ("Maize (corn)", 356.0),
            ("Rice", 360.0),
            ("Wheat", 334.0),
            ("Barley", 332.0),
            ("Sorghum", 343.0),
            // Sugar crops
            ("Sugar cane", 30.0),
            ("Sugar beet", 70.0),
            // Roots and tubers
            ("Potatoes", 67.0),
            ("Cassava, fresh", 109.0),
            ("Sweet potatoes", 92.0),
            ("Yams", 101.0),
            ("Taro", 86.0),
            // Fruits
            ("Bananas", 60.0),
            ("Apples", 48.0),
            ("Oranges", 34.0),
            ("Grapes", 53.0),
            ("Watermelons", 17.0),
            // Vegetables
            ("Tomatoes", 17.0),
            ("Onions and shallots, green", 31.0),
            ("Cucumbers and gherkins", 13.0),
            ("Cabbages", 19.0),
            ("Eggplants (aubergines)", 21.0),
        ];
        Self {
            factors: KCAL_PER_100G
                .iter()
                .map(|&(crop, kcal)| (crop.to_string(), kcal * PORTIONS_PER_TONNE))
                .collect(),
        }
    }

    /// Parse a TOML document of the form
    ///
    /// ```toml
    /// units = "kcal_per_100g"   # or "kcal_per_tonne" (default)
    ///
    /// [crops]
    /// Wheat = 334
    /// Rice = 360
    /// ```
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: CalorieTableFile = toml::from_str(s)?;
        match file.units {
            CalorieUnit::KcalPerTonne => Self::new(file.crops),
            CalorieUnit::KcalPer100g => Self::from_kcal_per_100g(file.crops),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn factor(&self, crop: &str) -> Option<f64> {
        self.factors.get(crop).copied()
    }

    pub fn crops(&self) -> impl Iterator<Item = &str> {
        self.factors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

/// Production table enriched with one calorie column per crop.
#[derive(Debug, Clone)]
pub struct CalorieFrame {
    pub frame: DataFrame,
    /// Generated column names, in crop order.
    pub calorie_columns: Vec<String>,
}

/// Calories for a single production row, tagged with its crop.
#[derive(Debug, Clone, PartialEq)]
pub struct CalorieRecord {
    pub country: String,
    pub crop: String,
    pub year: i32,
    pub calories: f64,
}

/// Add a `calories_<crop>` column for every crop in `df`.
///
/// A row's own crop column holds `production * factor`; the other crop
/// columns hold zero for that row.
pub fn convert(df: &DataFrame, table: &CalorieTable) -> Result<CalorieFrame> {
    require_columns(df, &[production::CROP, production::PRODUCTION])?;

    let crop_col = df.column(production::CROP)?.str()?;
    let mut present = BTreeSet::new();
    for (i, crop) in crop_col.into_iter().enumerate() {
        let crop = crop.ok_or_else(|| {
            ShockError::InvalidData(format!("Null {} at row {i}", production::CROP))
        })?;
        present.insert(crop);
    }
    check_known(present.iter().copied(), table)?;

    let mut exprs = Vec::with_capacity(present.len());
    let mut calorie_columns = Vec::with_capacity(present.len());
    for crop in present {
        let factor = table
            .factor(crop)
            .ok_or_else(|| ShockError::UnknownCrop {
                crops: vec![crop.to_string()],
            })?;
        let name = calories::column_for(crop);
        exprs.push(
            when(col(production::CROP).eq(lit(crop)))
                .then(col(production::PRODUCTION).cast(DataType::Float64) * lit(factor))
                .otherwise(lit(0.0))
                .alias(name.as_str()),
        );
        calorie_columns.push(name);
    }

    let frame = if exprs.is_empty() {
        df.clone()
    } else {
        df.clone().lazy().with_columns(exprs).collect()?
    };
    debug!(
        rows = frame.height(),
        crops = calorie_columns.len(),
        "converted production to calories"
    );

    Ok(CalorieFrame {
        frame,
        calorie_columns,
    })
}

/// Row-level form of [`convert`].
pub fn calorie_records(
    records: &[ProductionRecord],
    table: &CalorieTable,
) -> Result<Vec<CalorieRecord>> {
    check_known(records.iter().map(|r| r.crop.as_str()), table)?;
    records
        .iter()
        .map(|r| {
            let factor = table.factor(&r.crop).ok_or_else(|| ShockError::UnknownCrop {
                crops: vec![r.crop.clone()],
            })?;
            Ok(CalorieRecord {
                country: r.country.clone(),
                crop: r.crop.clone(),
                year: r.year,
                calories: r.production * factor,
            })
        })
        .collect()
}

fn check_known<'a>(crops: impl Iterator<Item = &'a str>, table: &CalorieTable) -> Result<()> {
    let unknown: BTreeSet<&str> = crops.filter(|c| table.factor(c).is_none()).collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(ShockError::UnknownCrop {
            crops: unknown.into_iter().map(str::to_string).collect(),
        })
    }
}
