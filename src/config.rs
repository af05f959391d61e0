//! Pipeline parameters.
//!
//! Everything the stages need beyond their input tables lives here, so a
//! driver can load one TOML document and hand it to [`crate::pipeline`]:
//!
//! ```toml
//! [smoothing]
//! window_length = 11
//! polyorder = 3
//! gaps = "reject"
//!
//! [detection]
//! threshold = 0.05
//! direction = "both"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, ShockError};

/// Default Savitzky–Golay window length.
pub const DEFAULT_WINDOW_LENGTH: usize = 11;

/// Default Savitzky–Golay polynomial degree.
pub const DEFAULT_POLYORDER: usize = 3;

/// Default shock threshold (the 5% GCFF convention).
pub const DEFAULT_THRESHOLD: f64 = 0.05;

/// What the smoother does with missing years inside a country's series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapStrategy {
    /// Fail with `NonContiguousSeries`.
    #[default]
    Reject,
    /// Fill missing years by linear interpolation before smoothing.
    Interpolate,
}

impl GapStrategy {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "reject" => Ok(Self::Reject),
            "interpolate" => Ok(Self::Interpolate),
            _ => Err(ShockError::InvalidConfiguration(format!(
                "Invalid gap strategy: '{s}'. Must be 'reject' or 'interpolate'"
            ))),
        }
    }
}

/// Which sign of deviation counts as a shock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShockDirection {
    /// `|deviation| >= threshold`
    #[default]
    Both,
    /// `deviation <= -threshold`
    Decline,
    /// `deviation >= threshold`
    Surge,
}

impl ShockDirection {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "both" => Ok(Self::Both),
            "decline" => Ok(Self::Decline),
            "surge" => Ok(Self::Surge),
            _ => Err(ShockError::InvalidConfiguration(format!(
                "Invalid shock direction: '{s}'. Must be 'both', 'decline' or 'surge'"
            ))),
        }
    }

    pub fn is_shock(self, deviation: f64, threshold: f64) -> bool {
        match self {
            Self::Both => deviation.abs() >= threshold,
            Self::Decline => deviation <= -threshold,
            Self::Surge => deviation >= threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmoothingConfig {
    pub window_length: usize,
    pub polyorder: usize,
    pub gaps: GapStrategy,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window_length: DEFAULT_WINDOW_LENGTH,
            polyorder: DEFAULT_POLYORDER,
            gaps: GapStrategy::Reject,
        }
    }
}

impl SmoothingConfig {
    pub fn new(window_length: usize, polyorder: usize) -> Result<Self> {
        let config = Self {
            window_length,
            polyorder,
            gaps: GapStrategy::Reject,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_gaps(mut self, gaps: GapStrategy) -> Self {
        self.gaps = gaps;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_length % 2 == 0 {
            return Err(ShockError::InvalidConfiguration(format!(
                "window_length must be an odd integer, got {}",
                self.window_length
            )));
        }
        if self.polyorder >= self.window_length {
            return Err(ShockError::InvalidConfiguration(format!(
                "polyorder ({}) must be less than window_length ({})",
                self.polyorder, self.window_length
            )));
        }
        Ok(())
    }

    pub(crate) fn half_window(&self) -> usize {
        self.window_length / 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    pub threshold: f64,
    pub direction: ShockDirection,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            direction: ShockDirection::Both,
        }
    }
}

impl DetectionConfig {
    pub fn new(threshold: f64) -> Result<Self> {
        let config = Self {
            threshold,
            direction: ShockDirection::Both,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_direction(mut self, direction: ShockDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ShockError::InvalidConfiguration(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    pub fn is_shock(&self, deviation: f64) -> bool {
        self.direction.is_shock(deviation, self.threshold)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub smoothing: SmoothingConfig,
    pub detection: DetectionConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.smoothing.validate()?;
        self.detection.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_savgol_analysis() {
        let config = PipelineConfig::default();
        assert_eq!(config.smoothing.window_length, 11);
        assert_eq!(config.smoothing.polyorder, 3);
        assert_eq!(config.smoothing.gaps, GapStrategy::Reject);
        assert_eq!(config.detection.threshold, 0.05);
        assert_eq!(config.detection.direction, ShockDirection::Both);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn even_window_is_rejected() {
        let err = SmoothingConfig::new(6, 2).unwrap_err();
        assert!(matches!(err, ShockError::InvalidConfiguration(_)));
    }

    #[test]
    fn polyorder_must_be_below_window() {
        assert!(SmoothingConfig::new(5, 5).is_err());
        assert!(SmoothingConfig::new(5, 7).is_err());
        assert!(SmoothingConfig::new(5, 4).is_ok());
    }

    #[test]
    fn negative_threshold_is_rejected() {
        assert!(matches!(
            DetectionConfig::new(-0.01),
            Err(ShockError::InvalidConfiguration(_))
        ));
        assert!(DetectionConfig::new(f64::NAN).is_err());
        assert!(DetectionConfig::new(0.0).is_ok());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [smoothing]
            window_length = 7
            gaps = "interpolate"

            [detection]
            direction = "decline"
            "#,
        )
        .unwrap();
        assert_eq!(config.smoothing.window_length, 7);
        assert_eq!(config.smoothing.polyorder, DEFAULT_POLYORDER);
        assert_eq!(config.smoothing.gaps, GapStrategy::Interpolate);
        assert_eq!(config.detection.threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.detection.direction, ShockDirection::Decline);
    }

    #[test]
    fn toml_is_validated_after_parsing() {
        let err = PipelineConfig::from_toml_str("[smoothing]\nwindow_length = 4\n").unwrap_err();
        assert!(matches!(err, ShockError::InvalidConfiguration(_)));

        let err = PipelineConfig::from_toml_str("[detection]\nthreshold = -1.0\n").unwrap_err();
        assert!(matches!(err, ShockError::InvalidConfiguration(_)));
    }

    #[test]
    fn unknown_keys_are_a_parse_error() {
        let err = PipelineConfig::from_toml_str("[smoothing]\nwindow = 5\n").unwrap_err();
        assert!(matches!(err, ShockError::Toml(_)));
    }

    #[test]
    fn direction_filters_sign() {
        assert!(ShockDirection::Both.is_shock(-0.05, 0.05));
        assert!(ShockDirection::Both.is_shock(0.05, 0.05));
        assert!(ShockDirection::Decline.is_shock(-0.2, 0.05));
        assert!(!ShockDirection::Decline.is_shock(0.2, 0.05));
        assert!(ShockDirection::Surge.is_shock(0.2, 0.05));
        assert!(!ShockDirection::Surge.is_shock(-0.2, 0.05));
    }

    #[test]
    fn parse_names() {
        assert_eq!(GapStrategy::parse("interpolate").unwrap(), GapStrategy::Interpolate);
        assert!(GapStrategy::parse("drop").is_err());
        assert_eq!(ShockDirection::parse("surge").unwrap(), ShockDirection::Surge);
        assert!(ShockDirection::parse("down").is_err());
    }
}
