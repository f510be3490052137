//! `NembConfig`: the on-disk JSON configuration file format, plus the
//! two named presets (`accuracy_preset`, `performance_preset`) built from
//! the numeric defaults the coordinator and timing subsystems use.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorConfig;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseFiltering {
    None,
    Basic,
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSourcePreference {
    Auto,
    Tsc,
    MonotonicRaw,
    Monotonic,
    Realtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMethod {
    Auto,
    Msr,
    Sysfs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracySettings {
    pub target_uncertainty_percent: f64,
    pub measurement_validation: bool,
    pub outlier_detection: bool,
    pub noise_filtering: NoiseFiltering,
}

impl Default for AccuracySettings {
    fn default() -> Self {
        Self {
            target_uncertainty_percent: 5.0,
            measurement_validation: true,
            outlier_detection: true,
            noise_filtering: NoiseFiltering::Basic,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    pub clock_source: ClockSourcePreference,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            clock_source: ClockSourcePreference::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    pub measurement_interval_ms: u64,
    pub cross_validation_threshold: f64,
    pub measurement_buffer_size: usize,
    pub auto_restart_failed_providers: bool,
    pub provider_restart_interval_s: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            measurement_interval_ms: 100,
            cross_validation_threshold: 0.05,
            measurement_buffer_size: 3600,
            auto_restart_failed_providers: true,
            provider_restart_interval_s: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub enabled: bool,
    pub access_method: AccessMethod,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            access_method: AccessMethod::Auto,
        }
    }
}

/// Full configuration, loadable from a JSON file on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NembConfig {
    #[serde(default)]
    pub accuracy: AccuracySettings,
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default)]
    pub coordinator: CoordinatorSettings,
    #[serde(default)]
    pub providers: std::collections::HashMap<String, ProviderSettings>,
}

impl NembConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Tuned for measurement fidelity: tighter thresholds, shorter
    /// intervals, outlier/noise filtering fully engaged.
    pub fn accuracy_preset() -> Self {
        Self {
            accuracy: AccuracySettings {
                target_uncertainty_percent: 2.0,
                measurement_validation: true,
                outlier_detection: true,
                noise_filtering: NoiseFiltering::Adaptive,
            },
            timing: TimingSettings {
                clock_source: ClockSourcePreference::Tsc,
            },
            coordinator: CoordinatorSettings {
                measurement_interval_ms: 1,
                cross_validation_threshold: 0.02,
                measurement_buffer_size: 100_000,
                auto_restart_failed_providers: true,
                provider_restart_interval_s: 10,
            },
            providers: std::collections::HashMap::new(),
        }
    }

    /// Tuned for low overhead: longer intervals, relaxed filtering.
    pub fn performance_preset() -> Self {
        Self {
            accuracy: AccuracySettings {
                target_uncertainty_percent: 10.0,
                measurement_validation: false,
                outlier_detection: false,
                noise_filtering: NoiseFiltering::None,
            },
            timing: TimingSettings {
                clock_source: ClockSourcePreference::Auto,
            },
            coordinator: CoordinatorSettings {
                measurement_interval_ms: 250,
                cross_validation_threshold: 0.10,
                measurement_buffer_size: 1800,
                auto_restart_failed_providers: true,
                provider_restart_interval_s: 60,
            },
            providers: std::collections::HashMap::new(),
        }
    }
}

impl From<&NembConfig> for CoordinatorConfig {
    /// Projects the `accuracy.*` / `coordinator.*` config sections onto the
    /// coordinator's runtime knobs: `measurement_validation` and
    /// `outlier_detection` gate cross-validation and outlier rejection,
    /// `noise_filtering` gates the EMA filter (any setting other than
    /// `None` enables it; `Adaptive` vs `Basic` is a front-end-visible
    /// distinction the coordinator itself does not currently vary its
    /// smoothing constant by).
    fn from(config: &NembConfig) -> Self {
        Self {
            measurement_interval: Duration::from_millis(config.coordinator.measurement_interval_ms),
            cross_validation_threshold: config.coordinator.cross_validation_threshold,
            measurement_buffer_size: config.coordinator.measurement_buffer_size,
            auto_restart_failed_providers: config.coordinator.auto_restart_failed_providers,
            provider_restart_interval: Duration::from_secs(config.coordinator.provider_restart_interval_s),
            enable_real_time_filtering: config.accuracy.noise_filtering != NoiseFiltering::None,
            enable_outlier_detection: config.accuracy.outlier_detection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_defaults() {
        let config = NembConfig::default();
        assert_eq!(config.coordinator.measurement_interval_ms, 100);
        assert_eq!(config.coordinator.cross_validation_threshold, 0.05);
    }

    #[test]
    fn accuracy_preset_tightens_thresholds_vs_default() {
        let default = NembConfig::default();
        let accuracy = NembConfig::accuracy_preset();
        assert!(accuracy.coordinator.cross_validation_threshold < default.coordinator.cross_validation_threshold);
        assert!(accuracy.coordinator.measurement_interval_ms < default.coordinator.measurement_interval_ms);
    }

    #[test]
    fn performance_preset_relaxes_thresholds_vs_default() {
        let default = NembConfig::default();
        let performance = NembConfig::performance_preset();
        assert!(performance.coordinator.cross_validation_threshold > default.coordinator.cross_validation_threshold);
        assert!(!performance.accuracy.outlier_detection);
    }

    #[test]
    fn round_trips_through_json() {
        let config = NembConfig::accuracy_preset();
        let text = serde_json::to_string(&config).unwrap();
        let parsed: NembConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.coordinator.measurement_interval_ms, config.coordinator.measurement_interval_ms);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let parsed: NembConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.coordinator.measurement_buffer_size, 3600);
    }

    #[test]
    fn coordinator_config_projects_noise_filtering_to_real_time_filtering() {
        let mut config = NembConfig::default();
        config.accuracy.noise_filtering = NoiseFiltering::None;
        let coordinator_config = CoordinatorConfig::from(&config);
        assert!(!coordinator_config.enable_real_time_filtering);

        config.accuracy.noise_filtering = NoiseFiltering::Basic;
        let coordinator_config = CoordinatorConfig::from(&config);
        assert!(coordinator_config.enable_real_time_filtering);
    }
}
