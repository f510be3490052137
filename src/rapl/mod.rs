//! Intel/AMD RAPL energy provider.
//!
//! Discovers powercap domains under `/sys/class/powercap/intel-rapl*`
//! (the sysfs interface is shared by Intel and AMD Zen family 17h+ under
//! Linux's `intel_rapl_common` driver), queries the energy resolution in
//! order of trust (MSR unit bits, then sysfs's fixed 1 µJ, then a
//! low-confidence fallback), and reads each domain through a
//! [`NonBlockingFileReader`] folded through the shared [`CounterManager`]
//! so a stuck domain file never stalls the coordinator.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::counter::CounterManager;
use crate::file_reader::NonBlockingFileReader;
use crate::provider::{EnergyProvider, EnergyReading, HardwareType, ProviderSpec};

/// Conservative fallback energy unit when neither MSR nor sysfs metadata
/// is available: ≈15.3 µJ, the historical default RAPL resolution on
/// older Intel parts.
const FALLBACK_ENERGY_UNIT_JOULES: f64 = 15.3e-6;

/// Intel sysfs `energy_uj` counters are 32 bits wide.
const SYSFS_COUNTER_BITS: u32 = 32;

const POWERCAP_ROOT: &str = "/sys/class/powercap";

/// MSR register offsets, used only when `/dev/cpu/0/msr` is readable.
mod msr {
    pub const UNIT: u64 = 0x606;
    pub const PKG_ENERGY: u64 = 0x611;
    pub const PP0_ENERGY: u64 = 0x639;
    pub const PP1_ENERGY: u64 = 0x641;
    pub const DRAM_ENERGY: u64 = 0x619;
    pub const PSYS_ENERGY: u64 = 0x64D;
    pub const AMD_ENERGY_UNIT: u64 = 0xC001_0299;
    pub const AMD_PKG_ENERGY: u64 = 0xC001_029B;
}

struct RaplDomain {
    /// Normalized name: "package", "core", "uncore", "dram", "psys", or a
    /// raw sysfs subdomain name when unrecognized.
    name: String,
    path: PathBuf,
    reader: NonBlockingFileReader,
    counter_key: String,
}

/// Intel/AMD RAPL hardware energy provider.
pub struct RaplProvider {
    domains: Vec<RaplDomain>,
    energy_unit_joules: f64,
    counters: CounterManager,
    last_domain_joules: HashMap<String, f64>,
    last_sample_time: Option<Instant>,
    initialized: bool,
    msr_backed: bool,
    is_amd: bool,
}

impl RaplProvider {
    pub fn new() -> Self {
        Self {
            domains: Vec::new(),
            energy_unit_joules: FALLBACK_ENERGY_UNIT_JOULES,
            counters: CounterManager::new(),
            last_domain_joules: HashMap::new(),
            last_sample_time: None,
            initialized: false,
            msr_backed: false,
            is_amd: is_amd_cpu(),
        }
    }

    fn discover_domains() -> Vec<(String, PathBuf)> {
        let mut found = Vec::new();
        let root = Path::new(POWERCAP_ROOT);
        let Ok(entries) = std::fs::read_dir(root) else {
            return found;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("intel-rapl"))
                .unwrap_or(false)
            {
                continue;
            }
            if let Some(name) = read_domain_name(&path) {
                found.push((name, path.clone()));
            }
            if let Ok(sub_entries) = std::fs::read_dir(&path) {
                for sub in sub_entries.flatten() {
                    let sub_path = sub.path();
                    if sub_path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with("intel-rapl"))
                        .unwrap_or(false)
                    {
                        if let Some(name) = read_domain_name(&sub_path) {
                            found.push((name, sub_path));
                        }
                    }
                }
            }
        }
        found
    }

    /// Energy resolution in order of trust: MSR unit bits, sysfs's fixed
    /// 1 µJ, then the hardcoded low-confidence fallback.
    fn query_energy_unit(is_amd: bool) -> (f64, bool) {
        let unit_reg = if is_amd { msr::AMD_ENERGY_UNIT } else { msr::UNIT };
        if let Some(raw) = read_msr(0, unit_reg) {
            let exponent = (raw >> 8) & 0x1F;
            return (1.0 / (1u64 << exponent) as f64, true);
        }
        // sysfs `energy_uj` is always reported in microjoules.
        (1e-6, false)
    }
}

impl Default for RaplProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EnergyProvider for RaplProvider {
    fn initialize(&mut self) -> bool {
        if self.initialized {
            return true;
        }

        let found = Self::discover_domains();
        if found.is_empty() {
            return false;
        }

        let (unit, msr_backed) = Self::query_energy_unit(self.is_amd);
        self.energy_unit_joules = unit;
        self.msr_backed = msr_backed;

        self.domains = found
            .into_iter()
            .map(|(name, path)| {
                let counter_key = format!("rapl:{name}:{}", path.display());
                RaplDomain {
                    reader: NonBlockingFileReader::new(path.join("energy_uj")),
                    counter_key,
                    name,
                    path,
                }
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
            return EnergyReading::invalid("rapl", now_ns);
        }

        let now = Instant::now();
        let mut domain_joules = HashMap::new();
        let mut any_success = false;

        for domain in &mut self.domains {
            let raw = if self.msr_backed {
                read_msr_domain_static(&domain.name, self.is_amd)
            } else {
                domain.reader.read_u64_with_timeout(Duration::from_millis(10))
            };
            let Some(raw) = raw else { continue };
            any_success = true;
            let accumulated = self.counters.update(&domain.counter_key, raw, SYSFS_COUNTER_BITS);
            let joules = accumulated as f64 * self.energy_unit_joules;
            domain_joules.insert(domain.name.clone(), joules);
        }

        if !any_success {
            return EnergyReading::invalid("rapl", now_ns);
        }

        // Non-overlapping aggregation:
        // `package` alone when present, else the first available domain.
        let total_joules = domain_joules
            .get("package")
            .copied()
            .unwrap_or_else(|| domain_joules.values().next().copied().unwrap_or(0.0));

        let dt = self
            .last_sample_time
            .map(|t| now.duration_since(t).as_secs_f64())
            .unwrap_or(0.0);

        let mut domain_watts = HashMap::new();
        for (name, joules) in &domain_joules {
            let watts = if dt > 0.0 {
                let prev = self.last_domain_joules.get(name).copied().unwrap_or(*joules);
                ((joules - prev) / dt).max(0.0)
            } else {
                0.0
            };
            domain_watts.insert(name.clone(), watts);
        }
        let total_watts = domain_watts
            .get("package")
            .copied()
            .unwrap_or_else(|| domain_watts.values().next().copied().unwrap_or(0.0));

        self.last_domain_joules = domain_joules.clone();
        self.last_sample_time = Some(now);

        EnergyReading {
            timestamp_ns: now_ns,
            provider_id: "rapl".to_string(),
            energy_joules: total_joules,
            instantaneous_power_watts: total_watts,
            average_power_watts: total_watts,
            domain_energy_joules: domain_joules,
            domain_power_watts: domain_watts,
            confidence: if self.msr_backed { 0.95 } else { 0.9 },
            uncertainty_percent: 1.0,
            sample_count: 1,
        }
    }

    fn specification(&self) -> ProviderSpec {
        ProviderSpec {
            hardware_type: HardwareType::CpuRapl,
            vendor: "Intel/AMD".to_string(),
            model: "RAPL".to_string(),
            measurement_domains: self.domains.iter().map(|d| d.name.clone()).collect(),
            energy_resolution_joules: self.energy_unit_joules,
            power_resolution_watts: self.energy_unit_joules * 100.0,
            update_interval_ms: 10,
            counter_width_bits: SYSFS_COUNTER_BITS,
            typical_accuracy_percent: 1.0,
            overhead_percent: 0.1,
            supports_per_domain: true,
            supported_metrics: vec!["energy_joules".to_string(), "power_watts".to_string()],
        }
    }

    fn is_available(&self) -> bool {
        Path::new(POWERCAP_ROOT).exists()
    }

    fn shutdown(&mut self) {
        self.domains.clear();
        self.initialized = false;
    }

    fn name(&self) -> &str {
        "rapl"
    }
}

fn read_domain_name(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path.join("name")).ok()?;
    let raw = raw.trim();
    let normalized = match raw {
        "package-0" | "package-1" | "package-2" | "package-3" | "package" => "package",
        "core" => "core",
        "uncore" => "uncore",
        "dram" => "dram",
        "psys" => "psys",
        other => other,
    };
    Some(normalized.to_string())
}

fn read_msr_domain_static(name: &str, is_amd: bool) -> Option<u64> {
    if is_amd {
        return if name == "package" {
            read_msr(0, msr::AMD_PKG_ENERGY)
        } else {
            None
        };
    }
    let reg = match name {
        "package" => msr::PKG_ENERGY,
        "core" => msr::PP0_ENERGY,
        "uncore" => msr::PP1_ENERGY,
        "dram" => msr::DRAM_ENERGY,
        "psys" => msr::PSYS_ENERGY,
        _ => return None,
    };
    read_msr(0, reg)
}

/// CPUID leaf 0 vendor string: `AuthenticAMD` identifies an AMD part.
#[cfg(target_arch = "x86_64")]
fn is_amd_cpu() -> bool {
    unsafe {
        let result = std::arch::x86_64::__cpuid(0);
        let mut vendor = [0u8; 12];
        vendor[0..4].copy_from_slice(&result.ebx.to_le_bytes());
        vendor[4..8].copy_from_slice(&result.edx.to_le_bytes());
        vendor[8..12].copy_from_slice(&result.ecx.to_le_bytes());
        &vendor == b"AuthenticAMD"
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn is_amd_cpu() -> bool {
    false
}

#[cfg(target_os = "linux")]
fn read_msr(cpu: u32, register: u64) -> Option<u64> {
    use std::io::{Read, Seek, SeekFrom};
    let path = format!("/dev/cpu/{cpu}/msr");
    let mut file = std::fs::File::open(path).ok()?;
    file.seek(SeekFrom::Start(register)).ok()?;
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf).ok()?;
    Some(u64::from_le_bytes(buf))
}

#[cfg(not(target_os = "linux"))]
fn read_msr(_cpu: u32, _register: u64) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_provider_is_uninitialized() {
        let provider = RaplProvider::new();
        assert!(!provider.initialized);
    }

    #[test]
    fn get_reading_without_init_is_invalid() {
        let mut provider = RaplProvider::new();
        let reading = provider.get_reading();
        assert!(!reading.is_valid());
    }

    #[test]
    fn specification_reports_rapl_hardware_type() {
        let provider = RaplProvider::new();
        let spec = provider.specification();
        assert_eq!(spec.hardware_type, HardwareType::CpuRapl);
        assert_eq!(spec.counter_width_bits, SYSFS_COUNTER_BITS);
    }

    #[test]
    fn msr_energy_unit_decodes_bits_12_8() {
        // Typical value 0x0A means unit = 2^-10 J (~0.977 mJ), matching
        // common Intel desktop parts.
        let raw: u64 = 0x0A << 8;
        let exponent = (raw >> 8) & 0x1F;
        let unit = 1.0 / (1u64 << exponent) as f64;
        assert!((unit - (1.0 / 1024.0)).abs() < 1e-12);
    }

    #[test]
    fn shutdown_clears_domains() {
        let mut provider = RaplProvider::new();
        provider.domains.push(RaplDomain {
            name: "package".into(),
            path: PathBuf::from("/tmp"),
            reader: NonBlockingFileReader::new("/tmp/energy_uj"),
            counter_key: "rapl:package:/tmp".into(),
        });
        provider.initialized = true;
        provider.shutdown();
        assert!(provider.domains.is_empty());
        assert!(!provider.initialized);
    }
}
