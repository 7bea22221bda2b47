//! Runtime configuration of the watcher.

use crate::calibration::CALIBRATION_STEP;
use crate::search::DEFAULT_THRESHOLD;
use crate::slots::{SlotRegion, DEFAULT_CAPTURE_REGION, DEFAULT_SLOTS};
use crate::store::codec::{validate_level, DEFAULT_COMPRESSION_LEVEL};
use crate::store::DEFAULT_CACHE_FILE;
use crate::util::{SlotWatchError, SlotWatchResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything the store and the detection loop need at startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Base slot rectangles, before calibration.
    pub slots: Vec<SlotRegion>,
    /// Region grabbed by the capture-reference command.
    pub capture_region: SlotRegion,
    /// Directory holding reference image files.
    pub reference_dir: PathBuf,
    /// Persisted cache file.
    pub cache_file: PathBuf,
    /// zlib level, 0..=9.
    pub compression_level: u32,
    /// Ingestion threads; `None` uses the available parallelism.
    pub workers: Option<usize>,
    /// Confidence floor for a match.
    pub threshold: f32,
    /// Detection ticks per second.
    pub tick_hz: f32,
    /// Sleep between command checks while monitoring is off.
    pub idle_ms: u64,
    /// Calibration step in pixels.
    pub calibration_step: f32,
    /// Start with monitoring enabled.
    pub monitor_on_start: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            slots: DEFAULT_SLOTS.to_vec(),
            capture_region: DEFAULT_CAPTURE_REGION,
            reference_dir: PathBuf::from("cache"),
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            workers: None,
            threshold: DEFAULT_THRESHOLD,
            tick_hz: 10.0,
            idle_ms: 250,
            calibration_step: CALIBRATION_STEP,
            monitor_on_start: false,
        }
    }
}

impl WatchConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(text: &str) -> SlotWatchResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|err| SlotWatchError::Config(format!("cannot parse config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> SlotWatchResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| SlotWatchError::io(path, err))?;
        Self::from_json_str(&text)
    }

    /// Pretty JSON of this config.
    pub fn to_json_pretty(&self) -> SlotWatchResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| SlotWatchError::Config(format!("cannot serialize config: {err}")))
    }

    /// Checks every field; all failures here are fatal at startup.
    pub fn validate(&self) -> SlotWatchResult<()> {
        if self.slots.is_empty() {
            return Err(SlotWatchError::Config("at least one slot is required".into()));
        }
        for slot in &self.slots {
            slot.validate()?;
        }
        self.capture_region.validate()?;
        validate_level(self.compression_level)?;
        if self.workers == Some(0) {
            return Err(SlotWatchError::Config("workers must be at least 1".into()));
        }
        if !(-1.0..=1.0).contains(&self.threshold) {
            return Err(SlotWatchError::Config(format!(
                "threshold {} is outside [-1, 1]",
                self.threshold
            )));
        }
        let period = 1.0 / f64::from(self.tick_hz);
        if !(self.tick_hz.is_finite() && self.tick_hz > 0.0)
            || Duration::try_from_secs_f64(period).is_err()
        {
            return Err(SlotWatchError::Config(format!(
                "tick_hz must be positive with a representable period, got {}",
                self.tick_hz
            )));
        }
        if !(self.calibration_step.is_finite() && self.calibration_step > 0.0) {
            return Err(SlotWatchError::Config(
                "calibration_step must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Target duration of one detection tick.
    ///
    /// Saturates for rates that [`validate`](Self::validate) rejects.
    pub fn tick_period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / f64::from(self.tick_hz)).unwrap_or(Duration::MAX)
    }

    /// Sleep while monitoring is disabled (never shorter than a tick).
    pub fn idle_period(&self) -> Duration {
        Duration::from_millis(self.idle_ms).max(self.tick_period())
    }

    /// Size references are resized to: the first slot's size.
    pub fn slot_size(&self) -> (usize, usize) {
        self.slots.first().map_or((0, 0), SlotRegion::size)
    }
}

#[cfg(test)]
mod tests {
    use super::WatchConfig;
    use crate::util::SlotWatchError;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        let config = WatchConfig::default();
        config.validate().unwrap();
        assert_eq!(config.slots.len(), 5);
        assert_eq!(config.tick_period(), Duration::from_millis(100));
        assert_eq!(config.slot_size(), (63, 44));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = WatchConfig::from_json_str(r#"{"threshold": 0.7, "workers": 2}"#).unwrap();
        assert_eq!(config.threshold, 0.7);
        assert_eq!(config.workers, Some(2));
        assert_eq!(config.compression_level, 6);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for text in [
            r#"{"compression_level": 10}"#,
            r#"{"threshold": 2.0}"#,
            r#"{"tick_hz": 0}"#,
            r#"{"tick_hz": 1e-30}"#,
            r#"{"workers": 0}"#,
            r#"{"slots": []}"#,
        ] {
            assert!(WatchConfig::from_json_str(text).is_err(), "{text}");
        }
    }

    #[test]
    fn tiny_tick_rate_is_rejected_without_panicking() {
        let config = WatchConfig {
            tick_hz: 1e-20,
            ..WatchConfig::default()
        };
        assert!(matches!(config.validate(), Err(SlotWatchError::Config(_))));
        assert_eq!(config.tick_period(), Duration::MAX);
    }

    #[test]
    fn json_round_trip() {
        let config = WatchConfig::default();
        let text = config.to_json_pretty().unwrap();
        assert_eq!(WatchConfig::from_json_str(&text).unwrap(), config);
    }
}
