#[cfg(feature = "python")]
use pyo3::exceptions::{PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShockError>;

#[derive(Error, Debug)]
pub enum ShockError {
    #[error("Unknown crop(s) with no calorie factor: {}", crops.join(", "))]
    UnknownCrop { crops: Vec<String> },

    #[error("Duplicate production record for ({country}, {crop}, {year})")]
    DuplicateKey {
        country: String,
        crop: String,
        year: i32,
    },

    #[error("Series for '{country}' has {len} points, window length is {window}")]
    SeriesTooShort {
        country: String,
        len: usize,
        window: usize,
    },

    #[error("Series for '{country}' has a gap between {after} and {next}")]
    NonContiguousSeries {
        country: String,
        after: i32,
        next: i32,
    },

    #[error("Non-positive baseline {baseline} for ({country}, {year})")]
    InvalidBaseline {
        country: String,
        year: i32,
        baseline: f64,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("InvalidData: {0}")]
    InvalidData(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(feature = "python")]
impl From<ShockError> for PyErr {
    fn from(err: ShockError) -> PyErr {
        match err {
            ShockError::Polars(_) | ShockError::Io(_) => PyRuntimeError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}
