use polars::prelude::*;
use tracing::info;

use crate::calories::{self, CalorieFrame, CalorieTable};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ingest::{self, ProductionFilter};
use crate::{series, shocks, smoothing, summary};

/// Every table produced by one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub calories: CalorieFrame,
    pub series: DataFrame,
    pub baseline: DataFrame,
    pub shocks: DataFrame,
    pub summary: DataFrame,
}

/// Production → calories → country-year series → baseline → shocks → summary.
///
/// Each stage either succeeds for every row or the run fails; nothing is
/// written anywhere.
#[derive(Debug, Clone)]
pub struct ShockPipeline {
    config: PipelineConfig,
    table: CalorieTable,
    filter: Option<ProductionFilter>,
}

impl ShockPipeline {
    pub fn new(config: PipelineConfig, table: CalorieTable) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            table,
            filter: None,
        })
    }

    pub fn with_filter(mut self, filter: ProductionFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn table(&self) -> &CalorieTable {
        &self.table
    }

    pub fn run(&self, production: &DataFrame) -> Result<PipelineOutput> {
        info!(rows = production.height(), "starting shock pipeline");

        let selected = match &self.filter {
            Some(filter) => filter.apply(production)?,
            None => production.clone(),
        };
        let validated = ingest::validate_production(&selected)?;
        info!(rows = validated.height(), "validated production");

        let calories = calories::convert(&validated, &self.table)?;
        info!(crops = calories.calorie_columns.len(), "converted to calories");

        let series = series::aggregate(&calories)?;
        info!(points = series.height(), "aggregated country-year series");

        let baseline = smoothing::smooth_frame(&series, &self.config.smoothing)?;
        let shocks = shocks::detect(&series, &baseline, &self.config.detection)?;
        let summary = summary::summarize(&shocks)?;

        info!(countries = summary.height(), "shock pipeline finished");
        Ok(PipelineOutput {
            calories,
            series,
            baseline,
            shocks,
            summary,
        })
    }
}
