//! Agricultural production shocks from FAO-style crop tables.
//!
//! Production (tonnes) is converted to calories, summed per country and year,
//! smoothed with a Savitzky–Golay filter, and years deviating from the
//! smoothed baseline by at least a threshold fraction are flagged as shocks.

pub mod calories;
pub mod config;
pub mod correlation;
pub mod error;
pub mod frequency;
pub mod ingest;
pub mod pipeline;
pub mod schema;
pub mod series;
pub mod shocks;
pub mod smoothing;
pub mod summary;

#[cfg(feature = "python")]
mod model;

pub use calories::{CalorieFrame, CalorieRecord, CalorieTable};
pub use config::{DetectionConfig, GapStrategy, PipelineConfig, ShockDirection, SmoothingConfig};
pub use error::{Result, ShockError};
pub use ingest::{ProductionFilter, ProductionRecord};
pub use pipeline::{PipelineOutput, ShockPipeline};
pub use shocks::ShockRecord;
pub use smoothing::SavitzkyGolay;
pub use summary::{AnnotationLabels, CountrySummary};

#[cfg(feature = "python")]
mod python {
    use pyo3::prelude::*;
    use pyo3::types::PyModule;

    use crate::model::ShockModel;
    use crate::schema;

    /// Export schema constants as Python submodules
    fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
        // Production
        let production = PyModule::new(m.py(), "production")?;
        production.add("COUNTRY", schema::production::COUNTRY)?;
        production.add("CROP", schema::production::CROP)?;
        production.add("YEAR", schema::production::YEAR)?;
        production.add("PRODUCTION", schema::production::PRODUCTION)?;
        m.add_submodule(&production)?;

        // Calories
        let calories = PyModule::new(m.py(), "calories")?;
        calories.add("PREFIX", schema::calories::PREFIX)?;
        m.add_submodule(&calories)?;

        // Series
        let series = PyModule::new(m.py(), "series")?;
        series.add("COUNTRY", schema::series::COUNTRY)?;
        series.add("YEAR", schema::series::YEAR)?;
        series.add("TOTAL_CALORIES", schema::series::TOTAL_CALORIES)?;
        m.add_submodule(&series)?;

        // Baseline
        let baseline = PyModule::new(m.py(), "baseline")?;
        baseline.add("COUNTRY", schema::baseline::COUNTRY)?;
        baseline.add("YEAR", schema::baseline::YEAR)?;
        baseline.add("BASELINE", schema::baseline::BASELINE)?;
        m.add_submodule(&baseline)?;

        // Shocks
        let shocks = PyModule::new(m.py(), "shocks")?;
        shocks.add("COUNTRY", schema::shocks::COUNTRY)?;
        shocks.add("YEAR", schema::shocks::YEAR)?;
        shocks.add("ACTUAL", schema::shocks::ACTUAL)?;
        shocks.add("BASELINE", schema::shocks::BASELINE)?;
        shocks.add("RELATIVE_DEVIATION", schema::shocks::RELATIVE_DEVIATION)?;
        shocks.add("IS_SHOCK", schema::shocks::IS_SHOCK)?;
        m.add_submodule(&shocks)?;

        // Summary
        let summary = PyModule::new(m.py(), "summary")?;
        summary.add("COUNTRY", schema::summary::COUNTRY)?;
        summary.add("GROUP", schema::summary::GROUP)?;
        summary.add("SHOCK_COUNT", schema::summary::SHOCK_COUNT)?;
        summary.add("MEAN_MAGNITUDE", schema::summary::MEAN_MAGNITUDE)?;
        summary.add("MAX_MAGNITUDE", schema::summary::MAX_MAGNITUDE)?;
        summary.add("FIRST_YEAR", schema::summary::FIRST_YEAR)?;
        summary.add("LAST_YEAR", schema::summary::LAST_YEAR)?;
        summary.add("YEARS_COVERED", schema::summary::YEARS_COVERED)?;
        m.add_submodule(&summary)?;

        // Largest shocks
        let largest = PyModule::new(m.py(), "largest")?;
        largest.add("COUNTRY", schema::largest::COUNTRY)?;
        largest.add("LARGEST_SHOCK", schema::largest::LARGEST_SHOCK)?;
        largest.add("YEAR_OF_SHOCK", schema::largest::YEAR_OF_SHOCK)?;
        m.add_submodule(&largest)?;

        // Correlation
        let correlation = PyModule::new(m.py(), "correlation")?;
        correlation.add("COUNTRY", schema::correlation::COUNTRY)?;
        correlation.add("CORRELATION", schema::correlation::CORRELATION)?;
        m.add_submodule(&correlation)?;

        // Annotation
        let annotation = PyModule::new(m.py(), "annotation")?;
        annotation.add("COUNTRY", schema::annotation::COUNTRY)?;
        annotation.add("YEAR", schema::annotation::YEAR)?;
        annotation.add("CATEGORY", schema::annotation::CATEGORY)?;
        annotation.add("UNLABELED", schema::annotation::UNLABELED)?;
        m.add_submodule(&annotation)?;

        Ok(())
    }

    #[pymodule]
    fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_class::<ShockModel>()?;
        add_schema_exports(m)?;
        Ok(())
    }
}
