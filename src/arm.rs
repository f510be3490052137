//! ARM SoC energy provider.
//!
//! Scans `/sys/class/hwmon/*/name` for an entry reporting `scmi_energy` or
//! `arm_energy` and reads its `energy1_input` file (microjoules),
//! reporting a single `soc` domain. Mirrors the same hwmon-directory-
//! walking pattern used for IIO sensor discovery under `/sys/bus/iio/devices/`.

use std::path::PathBuf;

use crate::counter::CounterManager;
use crate::file_reader::NonBlockingFileReader;
use crate::provider::{EnergyProvider, EnergyReading, HardwareType, ProviderSpec};

const HWMON_ROOT: &str = "/sys/class/hwmon";
const COUNTER_BITS: u32 = 32;

/// ARM system-on-chip energy provider (SCMI / vendor hwmon energy counter).
pub struct ArmSocProvider {
    reader: Option<NonBlockingFileReader>,
    counters: CounterManager,
    last_joules: f64,
    initialized: bool,
}

impl ArmSocProvider {
    pub fn new() -> Self {
        Self {
            reader: None,
            counters: CounterManager::new(),
            last_joules: 0.0,
            initialized: false,
        }
    }

    fn discover() -> Option<PathBuf> {
        let entries = std::fs::read_dir(HWMON_ROOT).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            let name = std::fs::read_to_string(path.join("name")).ok()?;
            let name = name.trim();
            if name == "scmi_energy" || name == "arm_energy" {
                let energy_path = path.join("energy1_input");
                if energy_path.exists() {
                    return Some(energy_path);
                }
            }
        }
        None
    }
}

impl Default for ArmSocProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EnergyProvider for ArmSocProvider {
    fn initialize(&mut self) -> bool {
        if self.initialized {
            return true;
        }
        let Some(path) = Self::discover() else {
            return false;
        };
        self.reader = Some(NonBlockingFileReader::new(path));
        self.initialized = true;
        true
    }

    fn get_reading(&mut self) -> EnergyReading {
        let now_ns = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        let Some(reader) = self.reader.as_mut() else {
            return EnergyReading::invalid("arm_soc", now_ns);
        };
        let Some(raw_uj) = reader.read_u64_with_timeout(std::time::Duration::from_millis(10))
        else {
            return EnergyReading::invalid("arm_soc", now_ns);
        };

        let accumulated = self.counters.update("soc", raw_uj, COUNTER_BITS);
        let joules = accumulated as f64 * 1e-6;
        let power = (joules - self.last_joules).max(0.0);
        self.last_joules = joules;

        let mut domain_joules = std::collections::HashMap::new();
        domain_joules.insert("soc".to_string(), joules);
        let mut domain_power = std::collections::HashMap::new();
        domain_power.insert("soc".to_string(), power);

        EnergyReading {
            timestamp_ns: now_ns,
            provider_id: "arm_soc".to_string(),
            energy_joules: joules,
            instantaneous_power_watts: power,
            average_power_watts: power,
            domain_energy_joules: domain_joules,
            domain_power_watts: domain_power,
            confidence: 0.9,
            uncertainty_percent: 2.0,
            sample_count: 1,
        }
    }

    fn specification(&self) -> ProviderSpec {
        ProviderSpec {
            hardware_type: HardwareType::ArmSoc,
            vendor: "ARM".to_string(),
            model: "SCMI energy".to_string(),
            measurement_domains: vec!["soc".to_string()],
            energy_resolution_joules: 1e-6,
            power_resolution_watts: 1e-6,
            update_interval_ms: 10,
            counter_width_bits: COUNTER_BITS,
            typical_accuracy_percent: 2.0,
            overhead_percent: 0.1,
            supports_per_domain: false,
            supported_metrics: vec!["energy_joules".to_string()],
        }
    }

    fn is_available(&self) -> bool {
        Self::discover().is_some()
    }

    fn shutdown(&mut self) {
        self.reader = None;
        self.initialized = false;
    }

    fn name(&self) -> &str {
        "arm_soc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_provider_is_uninitialized() {
        let provider = ArmSocProvider::new();
        assert!(!provider.initialized);
    }

    #[test]
    fn get_reading_without_init_is_invalid() {
        let mut provider = ArmSocProvider::new();
        assert!(!provider.get_reading().is_valid());
    }

    #[test]
    fn specification_reports_single_soc_domain() {
        let provider = ArmSocProvider::new();
        assert_eq!(provider.specification().measurement_domains, vec!["soc".to_string()]);
    }
}
