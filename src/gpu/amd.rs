//! AMD GPU energy provider.
//!
//! ROCm SMI is not available as a maintained Rust crate, so this provider
//! enumerates `amdgpu` devices the way `gpu::amd`'s hwmon discovery does
//! (`/sys/class/drm/card*/device/hwmon/hwmon*/power1_average`, in
//! microwatts) and feeds the instantaneous reading through a
//! [`PowerIntegrator`] per device, the same integration path the NVIDIA
//! provider uses on top of NVML's instantaneous power.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::file_reader::NonBlockingFileReader;
use crate::gpu::PowerIntegrator;
use crate::provider::{EnergyProvider, EnergyReading, HardwareType, ProviderSpec};

const READ_TIMEOUT: Duration = Duration::from_millis(10);

struct AmdDevice {
    index: usize,
    reader: NonBlockingFileReader,
    integrator: PowerIntegrator,
}

/// AMD GPU energy provider (amdgpu driver via hwmon sysfs).
pub struct AmdGpuProvider {
    devices: Vec<AmdDevice>,
    initialized: bool,
}

impl AmdGpuProvider {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            initialized: false,
        }
    }

    fn discover() -> Vec<(usize, PathBuf)> {
        let mut found = Vec::new();
        let Ok(entries) = fs::read_dir("/sys/class/drm") else {
            return found;
        };
        let mut index = 0usize;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("card") || name.contains('-') {
                continue;
            }
            let vendor_path = entry.path().join("device/vendor");
            let is_amd = fs::read_to_string(&vendor_path)
                .map(|v| v.trim() == "0x1002")
                .unwrap_or(false);
            if !is_amd {
                continue;
            }
            if let Some(hwmon) = find_hwmon_power_path(&entry.path()) {
                found.push((index, hwmon));
                index += 1;
            }
        }
        found
    }
}

impl Default for AmdGpuProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EnergyProvider for AmdGpuProvider {
    fn initialize(&mut self) -> bool {
        if self.initialized {
            return true;
        }
        let found = Self::discover();
        if found.is_empty() {
            return false;
        }
        self.devices = found
            .into_iter()
            .map(|(index, hwmon_power_path)| AmdDevice {
                index,
                reader: NonBlockingFileReader::new(hwmon_power_path),
                integrator: PowerIntegrator::new(),
            })
            .collect();
        self.initialized = true;
        true
    }

    fn get_reading(&mut self) -> EnergyReading {
        let now_ns = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        if !self.initialized {
            return EnergyReading::invalid("amd_gpu", now_ns);
        }

        let mut domain_joules = HashMap::new();
        let mut domain_watts = HashMap::new();
        let mut any_success = false;

        for device in &mut self.devices {
            let Some(microwatts) = device.reader.read_u64_with_timeout(READ_TIMEOUT) else {
                continue;
            };
            any_success = true;
            let watts = microwatts as f64 / 1_000_000.0;
            let energy = device.integrator.sample(watts, now_ns);
            let key = format!("gpu{}", device.index);
            domain_joules.insert(key.clone(), energy);
            domain_watts.insert(key, watts);
        }

        if !any_success {
            return EnergyReading::invalid("amd_gpu", now_ns);
        }

        let total_energy: f64 = domain_joules.values().sum();
        let total_power: f64 = domain_watts.values().sum();

        EnergyReading {
            timestamp_ns: now_ns,
            provider_id: "amd_gpu".to_string(),
            energy_joules: total_energy,
            instantaneous_power_watts: total_power,
            average_power_watts: total_power,
            domain_energy_joules: domain_joules,
            domain_power_watts: domain_watts,
            confidence: 0.85,
            uncertainty_percent: 3.0,
            sample_count: 1,
        }
    }

    fn specification(&self) -> ProviderSpec {
        ProviderSpec {
            hardware_type: HardwareType::GpuAmd,
            vendor: "AMD".to_string(),
            model: "amdgpu".to_string(),
            measurement_domains: self
                .devices
                .iter()
                .map(|d| format!("gpu{}", d.index))
                .collect(),
            energy_resolution_joules: 1e-6,
            power_resolution_watts: 1e-6,
            update_interval_ms: 10,
            counter_width_bits: 0,
            typical_accuracy_percent: 3.0,
            overhead_percent: 0.2,
            supports_per_domain: true,
            supported_metrics: vec!["energy_joules".to_string(), "power_watts".to_string()],
        }
    }

    fn is_available(&self) -> bool {
        !Self::discover().is_empty()
    }

    fn shutdown(&mut self) {
        self.devices.clear();
        self.initialized = false;
    }

    fn name(&self) -> &str {
        "amd_gpu"
    }
}

fn find_hwmon_power_path(card_path: &std::path::Path) -> Option<PathBuf> {
    let hwmon_base = card_path.join("device/hwmon");
    let entries = fs::read_dir(&hwmon_base).ok()?;
    for entry in entries.flatten() {
        let candidate = entry.path().join("power1_average");
        if candidate.exists() {
            return Some(candidate);
        }
        let candidate = entry.path().join("power1_input");
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_provider_is_uninitialized() {
        let provider = AmdGpuProvider::new();
        assert!(!provider.initialized);
    }

    #[test]
    fn get_reading_without_init_is_invalid() {
        let mut provider = AmdGpuProvider::new();
        assert!(!provider.get_reading().is_valid());
    }

    #[test]
    fn specification_reports_amd_gpu_hardware_type() {
        let provider = AmdGpuProvider::new();
        assert_eq!(provider.specification().hardware_type, HardwareType::GpuAmd);
    }
}
