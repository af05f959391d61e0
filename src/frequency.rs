//! Historical shock frequency and largest shocks.
//!
//! Unlike [`crate::summary`], these work from `relative_deviation` directly,
//! so one shock table can be analyzed at several thresholds.

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::*;
use tracing::debug;

use crate::config::{DetectionConfig, ShockDirection};
use crate::error::Result;
use crate::schema::largest;
use crate::shocks::{read_shocks, ShockRecord};

/// Pooled frequency of shock years across every country in a table.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalFrequency {
    pub threshold: f64,
    pub total_years: u32,
    /// Years in which at least one country had a shock.
    pub years_with_events: u32,
    pub total_events: u32,
    /// `years_with_events / total_years`
    pub event_frequency: f64,
    /// Mean years between shock years; `None` without events.
    pub return_period: Option<f64>,
    /// Shocks per shock year; `None` without events.
    pub avg_events_per_event_year: Option<f64>,
}

pub fn historical_frequency(
    shocks_df: &DataFrame,
    config: &DetectionConfig,
) -> Result<HistoricalFrequency> {
    config.validate()?;
    let records = read_shocks(shocks_df)?;
    Ok(frequency_of(&records, config))
}

/// Event counting is strict: a deviation of exactly the threshold is not an
/// event here, unlike [`DetectionConfig::is_shock`].
pub fn frequency_of(records: &[ShockRecord], config: &DetectionConfig) -> HistoricalFrequency {
    let mut events_per_year: BTreeMap<i32, u32> = BTreeMap::new();
    for r in records {
        let events = events_per_year.entry(r.year).or_insert(0);
        if exceeds(config, r.relative_deviation) {
            *events += 1;
        }
    }

    let total_years = events_per_year.len() as u32;
    let years_with_events = events_per_year.values().filter(|&&n| n > 0).count() as u32;
    let total_events: u32 = events_per_year.values().sum();

    let event_frequency = if total_years > 0 {
        f64::from(years_with_events) / f64::from(total_years)
    } else {
        0.0
    };
    let (return_period, avg_events_per_event_year) = if years_with_events > 0 {
        (
            Some(f64::from(total_years) / f64::from(years_with_events)),
            Some(f64::from(total_events) / f64::from(years_with_events)),
        )
    } else {
        (None, None)
    };

    HistoricalFrequency {
        threshold: config.threshold,
        total_years,
        years_with_events,
        total_events,
        event_frequency,
        return_period,
        avg_events_per_event_year,
    }
}

fn exceeds(config: &DetectionConfig, deviation: f64) -> bool {
    let t = config.threshold;
    match config.direction {
        ShockDirection::Both => deviation.abs() > t,
        ShockDirection::Decline => deviation < -t,
        ShockDirection::Surge => deviation > t,
    }
}

/// Most negative relative deviation per country, with its year.
///
/// Ties go to the earliest year; countries without a finite deviation are
/// left out.
pub fn largest_shocks(shocks_df: &DataFrame) -> Result<DataFrame> {
    let records = read_shocks(shocks_df)?;

    let mut worst: BTreeMap<&str, (f64, i32)> = BTreeMap::new();
    let mut seen = BTreeSet::new();
    for r in &records {
        seen.insert(r.country.as_str());
        if !r.relative_deviation.is_finite() {
            continue;
        }
        worst
            .entry(r.country.as_str())
            .and_modify(|(dev, year)| {
                if r.relative_deviation < *dev || (r.relative_deviation == *dev && r.year < *year) {
                    *dev = r.relative_deviation;
                    *year = r.year;
                }
            })
            .or_insert((r.relative_deviation, r.year));
    }
    if worst.len() < seen.len() {
        debug!(
            skipped = seen.len() - worst.len(),
            "countries without a finite deviation"
        );
    }

    let countries: Vec<&str> = worst.keys().copied().collect();
    let deviations: Vec<f64> = worst.values().map(|&(d, _)| d).collect();
    let years: Vec<i32> = worst.values().map(|&(_, y)| y).collect();

    let df = DataFrame::new(vec![
        Column::new(largest::COUNTRY.into(), &countries),
        Column::new(largest::LARGEST_SHOCK.into(), &deviations),
        Column::new(largest::YEAR_OF_SHOCK.into(), &years),
    ])?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shocks::records_to_frame;
    use approx::assert_relative_eq;

    fn record(country: &str, year: i32, deviation: f64) -> ShockRecord {
        ShockRecord {
            country: country.into(),
            year,
            actual: 100.0 * (1.0 + deviation),
            baseline: 100.0,
            relative_deviation: deviation,
            is_shock: deviation.abs() >= 0.05,
        }
    }

    fn sample() -> Vec<ShockRecord> {
        vec![
            record("A", 2000, -0.10),
            record("B", 2000, -0.07),
            record("A", 2001, 0.00),
            record("B", 2001, 0.08),
            record("A", 2002, -0.01),
            record("B", 2002, -0.30),
            record("A", 2003, 0.02),
            record("B", 2003, 0.01),
        ]
    }

    #[test]
    fn decline_frequency_pools_countries() {
        let config = DetectionConfig::default().with_direction(ShockDirection::Decline);
        let f = frequency_of(&sample(), &config);
        assert_eq!(f.total_years, 4);
        assert_eq!(f.years_with_events, 2);
        assert_eq!(f.total_events, 3);
        assert_relative_eq!(f.event_frequency, 0.5);
        assert_relative_eq!(f.return_period.unwrap(), 2.0);
        assert_relative_eq!(f.avg_events_per_event_year.unwrap(), 1.5);
    }

    #[test]
    fn both_directions_count_surges() {
        let f = frequency_of(&sample(), &DetectionConfig::default());
        assert_eq!(f.years_with_events, 3);
        assert_eq!(f.total_events, 4);
    }

    #[test]
    fn deviation_at_threshold_is_not_an_event() {
        let records = vec![record("A", 2000, -0.05), record("A", 2001, -0.06)];
        let config = DetectionConfig::default().with_direction(ShockDirection::Decline);
        let f = frequency_of(&records, &config);
        assert_eq!(f.total_events, 1);
        assert_eq!(f.years_with_events, 1);
    }

    #[test]
    fn no_events_has_no_return_period() {
        let config = DetectionConfig::new(0.5).unwrap();
        let df = records_to_frame(&sample()).unwrap();
        let f = historical_frequency(&df, &config).unwrap();
        assert_eq!(f.years_with_events, 0);
        assert_eq!(f.event_frequency, 0.0);
        assert!(f.return_period.is_none());
        assert!(f.avg_events_per_event_year.is_none());
    }

    #[test]
    fn largest_shock_is_most_negative() {
        let mut records = sample();
        records.push(record("C", 1999, -0.2));
        records.push(record("C", 1998, -0.2));
        let out = largest_shocks(&records_to_frame(&records).unwrap()).unwrap();

        let countries = out.column(largest::COUNTRY).unwrap().str().unwrap();
        let dev = out.column(largest::LARGEST_SHOCK).unwrap().f64().unwrap();
        let year = out.column(largest::YEAR_OF_SHOCK).unwrap().i32().unwrap();
        assert_eq!(countries.get(0), Some("A"));
        assert_eq!((dev.get(0), year.get(0)), (Some(-0.10), Some(2000)));
        assert_eq!((dev.get(1), year.get(1)), (Some(-0.30), Some(2002)));
        // tie resolved to the earlier year
        assert_eq!((dev.get(2), year.get(2)), (Some(-0.2), Some(1998)));
    }
}
