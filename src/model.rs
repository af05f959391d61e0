use std::collections::HashMap;

use polars::prelude::*;
use pyo3::prelude::*;
use pyo3_polars::PyDataFrame;

use crate::calories::CalorieTable;
use crate::config::{
    DetectionConfig, GapStrategy, PipelineConfig, ShockDirection, SmoothingConfig,
};
use crate::correlation;
use crate::error::ShockError;
use crate::frequency;
use crate::ingest::ProductionFilter;
use crate::pipeline::{PipelineOutput, ShockPipeline};
use crate::summary::{self, AnnotationLabels};

#[pyclass]
pub struct ShockModel {
    pipeline: ShockPipeline,
    output: Option<PipelineOutput>,
}

#[pymethods]
impl ShockModel {
    /// Build a model from explicit parameters.
    ///
    /// `calorie_table` maps crop names to kcal per tonne; the FAO staple
    /// table is used when it is omitted.
    #[new]
    #[pyo3(signature = (
        window_length = 11,
        polyorder = 3,
        threshold = 0.05,
        gaps = "reject",
        direction = "both",
        calorie_table = None,
    ))]
    fn new(
        window_length: usize,
        polyorder: usize,
        threshold: f64,
        gaps: &str,
        direction: &str,
        calorie_table: Option<HashMap<String, f64>>,
    ) -> PyResult<Self> {
        let config = PipelineConfig {
            smoothing: SmoothingConfig::new(window_length, polyorder)?
                .with_gaps(GapStrategy::parse(gaps)?),
            detection: DetectionConfig::new(threshold)?
                .with_direction(ShockDirection::parse(direction)?),
        };
        let table = match calorie_table {
            Some(map) => CalorieTable::new(map)?,
            None => CalorieTable::fao_staples(),
        };
        Ok(Self {
            pipeline: ShockPipeline::new(config, table)?,
            output: None,
        })
    }

    /// Build a model from TOML files.
    #[staticmethod]
    #[pyo3(signature = (config_path, calorie_table_path=None))]
    fn from_files(config_path: &str, calorie_table_path: Option<&str>) -> PyResult<Self> {
        let config = PipelineConfig::from_path(config_path)?;
        let table = match calorie_table_path {
            Some(path) => CalorieTable::from_path(path)?,
            None => CalorieTable::fao_staples(),
        };
        Ok(Self {
            pipeline: ShockPipeline::new(config, table)?,
            output: None,
        })
    }

    /// Restrict later runs to the given crops and/or year range.
    #[pyo3(signature = (crops=None, first_year=None, last_year=None))]
    fn set_filter(
        &mut self,
        crops: Option<Vec<String>>,
        first_year: Option<i32>,
        last_year: Option<i32>,
    ) {
        let filter = ProductionFilter {
            crops,
            first_year,
            last_year,
        };
        self.pipeline = self.pipeline.clone().with_filter(filter);
        self.output = None;
    }

    // ── Running ─────────────────────────────────────────────────────────────

    /// Run every stage on a production table and return the summary.
    ///
    /// Required columns: country, crop, year, production (tonnes).
    fn run(&mut self, production: PyDataFrame) -> PyResult<PyDataFrame> {
        let output = self.pipeline.run(&production.0)?;
        let summary = output.summary.clone();
        self.output = Some(output);
        Ok(PyDataFrame(summary))
    }

    /// Summarize the last run's shocks by annotation category.
    ///
    /// `annotations` needs country, year and category columns.
    fn summarize_by_annotation(&self, annotations: PyDataFrame) -> PyResult<PyDataFrame> {
        let output = self.last_output()?;
        let labels = AnnotationLabels::from_frame(&annotations.0)?;
        let df = summary::summarize_by(&output.shocks, |c, y| labels.group_of(c, y))?;
        Ok(PyDataFrame(df))
    }

    /// Summarize the last run's shocks by a country → region mapping.
    ///
    /// Countries missing from `regions` are grouped under "unlabeled".
    fn summarize_by_region(&self, regions: HashMap<String, String>) -> PyResult<PyDataFrame> {
        let output = self.last_output()?;
        let df = summary::summarize_by(&output.shocks, |c, _| {
            regions
                .get(c)
                .cloned()
                .unwrap_or_else(|| crate::schema::annotation::UNLABELED.to_string())
        })?;
        Ok(PyDataFrame(df))
    }

    fn summarize_by_decade(&self) -> PyResult<PyDataFrame> {
        let output = self.last_output()?;
        let df = summary::summarize_by(&output.shocks, |_, y| summary::decade(y))?;
        Ok(PyDataFrame(df))
    }

    fn largest_shocks(&self) -> PyResult<PyDataFrame> {
        let output = self.last_output()?;
        Ok(PyDataFrame(frequency::largest_shocks(&output.shocks)?))
    }

    /// Spearman correlation of each country with the rest of the world,
    /// re-smoothed with its own window.
    #[pyo3(signature = (
        window_length = correlation::REST_OF_WORLD_WINDOW_LENGTH,
        polyorder = correlation::REST_OF_WORLD_POLYORDER,
    ))]
    fn country_world_correlations(
        &self,
        window_length: usize,
        polyorder: usize,
    ) -> PyResult<PyDataFrame> {
        let output = self.last_output()?;
        let config = SmoothingConfig::new(window_length, polyorder)?;
        let df = correlation::country_world_correlations(&output.series, &output.shocks, &config)?;
        Ok(PyDataFrame(df))
    }

    fn correlation_matrix(&self) -> PyResult<PyDataFrame> {
        let output = self.last_output()?;
        Ok(PyDataFrame(correlation::correlation_matrix(&output.shocks)?))
    }

    /// Pooled historical frequency of the last run's shocks.
    #[pyo3(signature = (threshold=None, direction="decline"))]
    fn historical_frequency(
        &self,
        threshold: Option<f64>,
        direction: &str,
    ) -> PyResult<HashMap<String, Option<f64>>> {
        let output = self.last_output()?;
        let config = DetectionConfig::new(
            threshold.unwrap_or(self.pipeline.config().detection.threshold),
        )?
        .with_direction(ShockDirection::parse(direction)?);
        let f = frequency::historical_frequency(&output.shocks, &config)?;

        Ok(HashMap::from([
            ("threshold".to_string(), Some(f.threshold)),
            ("total_years".to_string(), Some(f64::from(f.total_years))),
            ("years_with_events".to_string(), Some(f64::from(f.years_with_events))),
            ("total_events".to_string(), Some(f64::from(f.total_events))),
            ("event_frequency".to_string(), Some(f.event_frequency)),
            ("return_period".to_string(), f.return_period),
            (
                "avg_events_per_event_year".to_string(),
                f.avg_events_per_event_year,
            ),
        ]))
    }

    // ── Properties ──────────────────────────────────────────────────────────

    #[getter]
    fn calories_df(&self) -> Option<PyDataFrame> {
        self.output
            .as_ref()
            .map(|o| PyDataFrame(o.calories.frame.clone()))
    }

    #[getter]
    fn calorie_columns(&self) -> Option<Vec<String>> {
        self.output
            .as_ref()
            .map(|o| o.calories.calorie_columns.clone())
    }

    #[getter]
    fn series_df(&self) -> Option<PyDataFrame> {
        self.frame(|o| &o.series)
    }

    #[getter]
    fn baseline_df(&self) -> Option<PyDataFrame> {
        self.frame(|o| &o.baseline)
    }

    #[getter]
    fn shocks_df(&self) -> Option<PyDataFrame> {
        self.frame(|o| &o.shocks)
    }

    #[getter]
    fn summary_df(&self) -> Option<PyDataFrame> {
        self.frame(|o| &o.summary)
    }

    #[getter]
    fn crops(&self) -> Vec<String> {
        self.pipeline.table().crops().map(str::to_string).collect()
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

impl ShockModel {
    fn last_output(&self) -> Result<&PipelineOutput, ShockError> {
        self.output
            .as_ref()
            .ok_or_else(|| ShockError::InvalidData("No pipeline run yet; call run() first".into()))
    }

    fn frame(&self, pick: impl Fn(&PipelineOutput) -> &DataFrame) -> Option<PyDataFrame> {
        self.output.as_ref().map(|o| PyDataFrame(pick(o).clone()))
    }
}
