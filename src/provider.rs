//! Energy provider contract and the shared reading/specification types
//! every concrete provider produces.
//!
//! Providers are modeled as a tagged interface (`Box<dyn EnergyProvider +
//! Send>`) rather than a virtual class hierarchy: the coordinator holds a
//! heterogeneous collection of providers without knowing their concrete
//! type, and a small name-keyed registry stands in for a constructor
//! lookup table, mirroring how `gpu::amd`/`gpu::nvidia` are dispatched by
//! detected hardware in the AMD/NVIDIA GPU provider modules.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A single energy observation from one provider.
///
/// `energy_joules` is the provider's cumulative, monotonic total; it never
/// decreases across readings from the same provider within a run. When a
/// provider cannot produce a trustworthy reading, it sets `confidence` to
/// `0.0` rather than omitting the reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyReading {
    pub timestamp_ns: u64,
    pub provider_id: String,
    pub energy_joules: f64,
    pub instantaneous_power_watts: f64,
    pub average_power_watts: f64,
    pub domain_energy_joules: HashMap<String, f64>,
    pub domain_power_watts: HashMap<String, f64>,
    pub confidence: f64,
    pub uncertainty_percent: f64,
    pub sample_count: u32,
}

impl EnergyReading {
    /// An invalid placeholder reading: zero confidence, no domains.
    pub fn invalid(provider_id: impl Into<String>, timestamp_ns: u64) -> Self {
        Self {
            timestamp_ns,
            provider_id: provider_id.into(),
            energy_joules: 0.0,
            instantaneous_power_watts: 0.0,
            average_power_watts: 0.0,
            domain_energy_joules: HashMap::new(),
            domain_power_watts: HashMap::new(),
            confidence: 0.0,
            uncertainty_percent: 100.0,
            sample_count: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.confidence > 0.0 && !self.provider_id.is_empty()
    }
}

/// Hardware family a provider speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareType {
    CpuRapl,
    GpuNvidia,
    GpuAmd,
    ArmSoc,
}

/// Static description of a provider's capabilities, queried once after
/// initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub hardware_type: HardwareType,
    pub vendor: String,
    pub model: String,
    pub measurement_domains: Vec<String>,
    pub energy_resolution_joules: f64,
    pub power_resolution_watts: f64,
    pub update_interval_ms: u64,
    pub counter_width_bits: u32,
    pub typical_accuracy_percent: f64,
    pub overhead_percent: f64,
    pub supports_per_domain: bool,
    pub supported_metrics: Vec<String>,
}

/// Running success-rate counters every provider maintains.
#[derive(Debug, Default)]
pub struct ProviderMeasurementStats {
    pub total_measurements: AtomicU64,
    pub failed_measurements: AtomicU64,
}

impl ProviderMeasurementStats {
    pub fn record(&self, success: bool) {
        self.total_measurements.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_measurements.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_measurements.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        let failed = self.failed_measurements.load(Ordering::Relaxed);
        1.0 - (failed as f64 / total as f64)
    }
}

/// Contract every hardware energy source implements.
///
/// Providers never propagate exceptions out of `get_reading()`: a failed
/// read returns `EnergyReading::invalid`, and the coordinator counts the
/// failure.
pub trait EnergyProvider: Send {
    /// Probe and open the hardware interface. Idempotent: calling twice
    /// must not double-open file descriptors.
    fn initialize(&mut self) -> bool;

    /// Produce one reading. Must never panic; hardware failures surface as
    /// `EnergyReading::invalid`.
    fn get_reading(&mut self) -> EnergyReading;

    /// Static capability description.
    fn specification(&self) -> ProviderSpec;

    /// Two readings 100 ms apart must both be valid and non-decreasing in
    /// at least one domain.
    fn self_test(&mut self) -> bool {
        let first = self.get_reading();
        if !first.is_valid() {
            return false;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
        let second = self.get_reading();
        second.is_valid() && second.energy_joules >= first.energy_joules
    }

    /// Whether the underlying hardware interface was detected on this host.
    fn is_available(&self) -> bool;

    /// Release file descriptors / library handles. Idempotent.
    fn shutdown(&mut self);

    /// Stable provider name used as the key in the coordinator's map and as
    /// `EnergyReading::provider_id`.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_reading_has_zero_confidence() {
        let r = EnergyReading::invalid("rapl", 42);
        assert_eq!(r.confidence, 0.0);
        assert!(!r.is_valid());
    }

    #[test]
    fn measurement_stats_track_success_rate() {
        let stats = ProviderMeasurementStats::default();
        stats.record(true);
        stats.record(true);
        stats.record(false);
        assert!((stats.success_rate() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn measurement_stats_default_success_rate_is_one() {
        let stats = ProviderMeasurementStats::default();
        assert_eq!(stats.success_rate(), 1.0);
    }
}
