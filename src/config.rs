use std::path::Path;

use anyhow::Result;

use crate::prune::SelectionWindow;

pub const MIN_DELAY_UNIT: u32 = 1;
pub const MAX_DELAY_UNIT: u32 = 10;
pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("delay unit must be between 1 and 10, got {0}")]
    DelayUnitOutOfRange(u32),
    #[error("playback speed must be between 0.1 and 1.0, got {0}")]
    SpeedOutOfRange(f64),
    #[error("invalid selection window [{start}, {end}]")]
    InvalidWindow { start: f64, end: f64 },
}

/// Settings chosen by the operator before (and during) a replay.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Minimum rendered duration of a call, in milliseconds.
    pub delay_unit: u32,
    pub speed: f64,
    pub eager_expansion: bool,
    pub keep_afterimage: bool,
    pub selection_window: Option<SelectionWindow>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        ReplayConfig {
            delay_unit: 1,
            speed: 0.5,
            eager_expansion: true,
            keep_afterimage: true,
            selection_window: None,
        }
    }
}

pub fn validate_delay_unit(delay_unit: u32) -> Result<u32, ConfigError> {
    if (MIN_DELAY_UNIT..=MAX_DELAY_UNIT).contains(&delay_unit) {
        Ok(delay_unit)
    } else {
        Err(ConfigError::DelayUnitOutOfRange(delay_unit))
    }
}

pub fn validate_speed(speed: f64) -> Result<f64, ConfigError> {
    // NaN fails the range check as well
    if (MIN_SPEED..=MAX_SPEED).contains(&speed) {
        Ok(speed)
    } else {
        Err(ConfigError::SpeedOutOfRange(speed))
    }
}

pub fn validate_window(window: &SelectionWindow) -> Result<(), ConfigError> {
    if window.is_valid() {
        Ok(())
    } else {
        Err(ConfigError::InvalidWindow {
            start: window.start,
            end: window.end,
        })
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_delay_unit(self.delay_unit)?;
        validate_speed(self.speed)?;
        if let Some(window) = &self.selection_window {
            validate_window(window)?;
        }
        Ok(())
    }

    /// Reads a JSON config file. Missing fields take their default values.
    pub fn load(path: &Path) -> Result<ReplayConfig> {
        log::info!("Reading replay config from {}", path.display());
        let file = std::fs::File::open(path)?;
        let config: ReplayConfig = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }
}
