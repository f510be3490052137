//! Measurement Coordinator: owns a set of energy providers, runs a
//! sampling thread and a health thread, and emits [`SynchronizedReading`]
//! values into a ring buffer after cross-validation and EMA filtering.
//!
//! Concurrency model: the provider map lives behind an
//! `RwLock` (shared read while sampling, exclusive write for add/remove
//! and for the health thread's restart pass); the ring buffer and
//! statistics each live behind their own `Mutex`. Provider addition and
//! removal are rejected while the coordinator is running, matching the
//! precedent of gating mutation behind a `running` flag in `daemon`-style
//! background-thread modules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::provider::{EnergyProvider, EnergyReading};

/// A single coordinator sample tick: one or more provider readings
/// aligned to a common timestamp.
#[derive(Debug, Clone, Default)]
pub struct SynchronizedReading {
    pub common_timestamp_ns: u64,
    pub provider_readings: Vec<EnergyReading>,
    pub total_system_energy_joules: f64,
    pub total_system_power_watts: f64,
    pub providers_active: u32,
    pub providers_failed: u32,
    pub temporal_alignment_valid: bool,
    pub cross_validation_passed: bool,
    pub max_provider_deviation: f64,
    pub measurement_confidence: f64,
}

/// Fixed-capacity ring buffer returning readings in chronological order
/// regardless of wraparound.
pub struct RingBuffer<T> {
    capacity: usize,
    items: Vec<T>,
    write_index: usize,
    full: bool,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: Vec::with_capacity(capacity.max(1)),
            write_index: 0,
            full: false,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() < self.capacity {
            self.items.push(item);
            if self.items.len() == self.capacity {
                self.full = true;
                self.write_index = 0;
            }
        } else {
            self.items[self.write_index] = item;
            self.write_index = (self.write_index + 1) % self.capacity;
        }
    }

    /// Oldest-first snapshot of everything currently buffered.
    pub fn chronological(&self) -> Vec<T> {
        if !self.full {
            self.items.clone()
        } else {
            let mut out = Vec::with_capacity(self.items.len());
            out.extend_from_slice(&self.items[self.write_index..]);
            out.extend_from_slice(&self.items[..self.write_index]);
            out
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.write_index = 0;
        self.full = false;
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.clear();
        self.items.reserve(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Per-provider lifecycle bookkeeping the health thread acts on.
pub struct ProviderState {
    provider: Box<dyn EnergyProvider>,
    pub active: bool,
    pub failed: bool,
    pub consecutive_failures: u32,
    pub last_successful_reading_time: Option<Instant>,
    pub last_restart_attempt_time: Option<Instant>,
}

/// Tunable coordinator behavior, matching the `coordinator.*` config keys
/// in `NembConfig`.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub measurement_interval: Duration,
    pub cross_validation_threshold: f64,
    pub measurement_buffer_size: usize,
    pub auto_restart_failed_providers: bool,
    pub provider_restart_interval: Duration,
    pub enable_real_time_filtering: bool,
    pub enable_outlier_detection: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            measurement_interval: Duration::from_millis(10),
            cross_validation_threshold: 0.05,
            measurement_buffer_size: 1_000,
            auto_restart_failed_providers: true,
            provider_restart_interval: Duration::from_secs(30),
            enable_real_time_filtering: true,
            enable_outlier_detection: true,
        }
    }
}

impl CoordinatorConfig {
    /// "Accuracy" preset: tighter interval, larger buffer, faster
    /// restarts, stricter cross-validation threshold.
    pub fn accuracy_preset() -> Self {
        Self {
            measurement_interval: Duration::from_millis(1),
            cross_validation_threshold: 0.02,
            measurement_buffer_size: 100_000,
            auto_restart_failed_providers: true,
            provider_restart_interval: Duration::from_secs(10),
            enable_real_time_filtering: true,
            enable_outlier_detection: true,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CoordinatorStatistics {
    pub total_synchronized_readings: u64,
    pub failed_synchronizations: u64,
    pub cross_validation_failures: u64,
    pub provider_success_counts: HashMap<String, u64>,
    pub provider_failure_counts: HashMap<String, u64>,
}

struct OutlierHistory {
    totals: Vec<f64>,
}

impl OutlierHistory {
    const WINDOW: usize = 20;

    fn new() -> Self {
        Self { totals: Vec::new() }
    }

    /// Returns true (and records) if `value` is an outlier (>2σ from the
    /// rolling mean); always pushes `value` into the window afterward.
    fn check_and_push(&mut self, value: f64) -> bool {
        let is_outlier = if self.totals.len() >= 3 {
            let mean = self.totals.iter().sum::<f64>() / self.totals.len() as f64;
            let variance = self
                .totals
                .iter()
                .map(|v| (v - mean).powi(2))
                .sum::<f64>()
                / self.totals.len() as f64;
            let std_dev = variance.sqrt();
            std_dev > 0.0 && (value - mean).abs() > 2.0 * std_dev
        } else {
            false
        };
        self.totals.push(value);
        if self.totals.len() > Self::WINDOW {
            self.totals.remove(0);
        }
        is_outlier
    }
}

struct SamplerState {
    providers: RwLock<HashMap<String, ProviderState>>,
    buffer: Mutex<RingBuffer<SynchronizedReading>>,
    stats: Mutex<CoordinatorStatistics>,
    config: RwLock<CoordinatorConfig>,
    running: AtomicBool,
    condvar: Condvar,
    condvar_mutex: Mutex<()>,
    ema_power: Mutex<Option<f64>>,
    outliers: Mutex<OutlierHistory>,
}

/// Owns a set of providers and the background sampling + health threads.
pub struct MeasurementCoordinator {
    state: Arc<SamplerState>,
    sampler_thread: Option<JoinHandle<()>>,
    health_thread: Option<JoinHandle<()>>,
}

impl MeasurementCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            state: Arc::new(SamplerState {
                providers: RwLock::new(HashMap::new()),
                buffer: Mutex::new(RingBuffer::new(config.measurement_buffer_size)),
                stats: Mutex::new(CoordinatorStatistics::default()),
                config: RwLock::new(config),
                running: AtomicBool::new(false),
                condvar: Condvar::new(),
                condvar_mutex: Mutex::new(()),
                ema_power: Mutex::new(None),
                outliers: Mutex::new(OutlierHistory::new()),
            }),
            sampler_thread: None,
            health_thread: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Add a provider, initializing and self-testing it. Rejected while
    /// the coordinator is running.
    pub fn add_provider(&self, mut provider: Box<dyn EnergyProvider>) -> bool {
        if self.is_running() {
            warn!("cannot add provider while measurements are active");
            return false;
        }
        let name = provider.name().to_string();
        if !provider.is_available() {
            warn!("provider not available: {name}");
            return false;
        }
        if !provider.initialize() {
            warn!("failed to initialize provider: {name}");
            return false;
        }
        if !provider.self_test() {
            warn!("provider self-test failed: {name}");
            provider.shutdown();
            return false;
        }
        let state = ProviderState {
            provider,
            active: true,
            failed: false,
            consecutive_failures: 0,
            last_successful_reading_time: Some(Instant::now()),
            last_restart_attempt_time: None,
        };
        self.state.providers.write().unwrap().insert(name.clone(), state);
        info!("added energy provider: {name}");
        true
    }

    pub fn remove_provider(&self, name: &str) -> bool {
        if self.is_running() {
            warn!("cannot remove provider while measurements are active");
            return false;
        }
        let mut providers = self.state.providers.write().unwrap();
        if let Some(mut state) = providers.remove(name) {
            state.provider.shutdown();
            true
        } else {
            false
        }
    }

    pub fn active_provider_names(&self) -> Vec<String> {
        self.state
            .providers
            .read()
            .unwrap()
            .iter()
            .filter(|(_, s)| s.active && !s.failed)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn failed_provider_names(&self) -> Vec<String> {
        self.state
            .providers
            .read()
            .unwrap()
            .iter()
            .filter(|(_, s)| s.failed)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        if self.state.providers.read().unwrap().is_empty() {
            warn!("no energy providers available");
            return false;
        }
        *self.state.stats.lock().unwrap() = CoordinatorStatistics::default();
        self.state.running.store(true, Ordering::SeqCst);

        let sampler_state = Arc::clone(&self.state);
        self.sampler_thread = Some(std::thread::spawn(move || sampler_loop(sampler_state)));

        let health_state = Arc::clone(&self.state);
        self.health_thread = Some(std::thread::spawn(move || health_loop(health_state)));

        info!("measurements started");
        true
    }

    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        self.state.running.store(false, Ordering::SeqCst);
        self.state.condvar.notify_all();
        if let Some(handle) = self.sampler_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.health_thread.take() {
            let _ = handle.join();
        }
        info!("measurements stopped");
    }

    /// One-shot read independent of the ring buffer; never blocks on the
    /// sampler thread.
    pub fn get_synchronized_reading(&self) -> SynchronizedReading {
        let mut providers = self.state.providers.write().unwrap();
        collect_and_align(&mut providers)
    }

    /// Chronological snapshot of everything currently buffered.
    pub fn get_buffered_readings(&self) -> Vec<SynchronizedReading> {
        self.state.buffer.lock().unwrap().chronological()
    }

    pub fn set_buffer_size(&self, size: usize) {
        self.state.buffer.lock().unwrap().set_capacity(size);
        self.state.config.write().unwrap().measurement_buffer_size = size;
    }

    pub fn statistics(&self) -> CoordinatorStatistics {
        self.state.stats.lock().unwrap().clone()
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.state.config.read().unwrap().clone()
    }
}

impl Drop for MeasurementCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn collect_and_align(providers: &mut HashMap<String, ProviderState>) -> SynchronizedReading {
    let mut readings = Vec::new();
    for (name, state) in providers.iter_mut() {
        if !state.active || state.failed {
            continue;
        }
        let reading = state.provider.get_reading();
        if reading.is_valid() {
            state.last_successful_reading_time = Some(Instant::now());
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures += 1;
            if state.consecutive_failures >= 5 {
                state.failed = true;
                error!("provider failed after repeated errors: {name}");
            }
        }
        readings.push(reading);
    }
    align(readings)
}

fn align(readings: Vec<EnergyReading>) -> SynchronizedReading {
    if readings.is_empty() {
        return SynchronizedReading::default();
    }

    let max_timestamp = readings
        .iter()
        .filter(|r| r.is_valid())
        .map(|r| r.timestamp_ns)
        .max()
        .unwrap_or(0);

    let valid_count = readings.iter().filter(|r| r.is_valid()).count() as u32;
    let total_power: f64 = readings.iter().filter(|r| r.is_valid()).map(|r| r.average_power_watts).sum();
    let total_energy: f64 = readings.iter().filter(|r| r.is_valid()).map(|r| r.energy_joules).sum();
    let failed_count = readings.len() as u32 - valid_count;

    let confidence = if !readings.is_empty() {
        valid_count as f64 / readings.len() as f64
    } else {
        0.0
    };

    SynchronizedReading {
        common_timestamp_ns: max_timestamp,
        total_system_power_watts: total_power,
        total_system_energy_joules: total_energy,
        providers_active: valid_count,
        providers_failed: failed_count,
        temporal_alignment_valid: max_timestamp > 0,
        cross_validation_passed: true,
        max_provider_deviation: 0.0,
        measurement_confidence: confidence,
        provider_readings: readings,
    }
}

/// Cross-validation: mean of per-provider average power; any provider
/// deviating beyond `threshold` fails the check. Scaling all powers by a
/// constant factor does not change the pass/fail outcome (the deviation
/// ratio is scale-invariant).
fn cross_validate(reading: &mut SynchronizedReading, threshold: f64) {
    let powers: Vec<f64> = reading
        .provider_readings
        .iter()
        .filter(|r| r.is_valid() && r.average_power_watts > 0.0)
        .map(|r| r.average_power_watts)
        .collect();

    if powers.len() < 2 {
        reading.cross_validation_passed = true;
        return;
    }

    let mean = powers.iter().sum::<f64>() / powers.len() as f64;
    let mut max_deviation = 0.0f64;
    for power in &powers {
        let deviation = (power - mean).abs() / mean;
        max_deviation = max_deviation.max(deviation);
    }
    reading.max_provider_deviation = max_deviation;
    reading.cross_validation_passed = max_deviation <= threshold;
}

fn sampler_loop(state: Arc<SamplerState>) {
    while state.running.load(Ordering::SeqCst) {
        let start = Instant::now();
        let config = state.config.read().unwrap().clone();

        let mut reading = {
            let mut providers = state.providers.write().unwrap();
            collect_and_align(&mut providers)
        };

        if config.enable_outlier_detection && reading.providers_active > 0 {
            let is_outlier = state
                .outliers
                .lock()
                .unwrap()
                .check_and_push(reading.total_system_power_watts);
            if is_outlier {
                reading.measurement_confidence = (reading.measurement_confidence - 0.3).max(0.0);
                debug!("potential outlier sample, confidence reduced");
            }
        }

        if reading.providers_active >= 2 {
            cross_validate(&mut reading, config.cross_validation_threshold);
        }

        if config.enable_real_time_filtering && reading.providers_active > 0 {
            let mut ema = state.ema_power.lock().unwrap();
            let filtered = match *ema {
                Some(prev) => 0.1 * reading.total_system_power_watts + 0.9 * prev,
                None => reading.total_system_power_watts,
            };
            *ema = Some(filtered);
            reading.total_system_power_watts = filtered;
        }

        {
            let mut stats = state.stats.lock().unwrap();
            stats.total_synchronized_readings += 1;
            if !reading.cross_validation_passed {
                stats.cross_validation_failures += 1;
            }
            for r in &reading.provider_readings {
                if r.is_valid() {
                    *stats.provider_success_counts.entry(r.provider_id.clone()).or_insert(0) += 1;
                } else {
                    *stats.provider_failure_counts.entry(r.provider_id.clone()).or_insert(0) += 1;
                }
            }
        }

        state.buffer.lock().unwrap().push(reading);

        let elapsed = start.elapsed();
        if elapsed < config.measurement_interval {
            let sleep_for = config.measurement_interval - elapsed;
            let guard = state.condvar_mutex.lock().unwrap();
            let _ = state.condvar.wait_timeout(guard, sleep_for).unwrap();
        }
    }
}

fn health_loop(state: Arc<SamplerState>) {
    while state.running.load(Ordering::SeqCst) {
        let interval = state.config.read().unwrap().provider_restart_interval;
        {
            let guard = state.condvar_mutex.lock().unwrap();
            let _ = state.condvar.wait_timeout(guard, interval).unwrap();
        }
        if !state.running.load(Ordering::SeqCst) {
            break;
        }
        let auto_restart = state.config.read().unwrap().auto_restart_failed_providers;
        if !auto_restart {
            continue;
        }
        let mut providers = state.providers.write().unwrap();
        let now = Instant::now();
        for (name, provider_state) in providers.iter_mut() {
            if !provider_state.failed {
                continue;
            }
            let due = provider_state
                .last_restart_attempt_time
                .map(|t| now.duration_since(t) >= interval)
                .unwrap_or(true);
            if !due {
                continue;
            }
            provider_state.last_restart_attempt_time = Some(now);
            if provider_state.provider.initialize() {
                provider_state.failed = false;
                provider_state.active = true;
                provider_state.consecutive_failures = 0;
                provider_state.last_successful_reading_time = Some(now);
                info!("restarted failed provider: {name}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{HardwareType, ProviderSpec};

    struct FixedProvider {
        name: String,
        energy: f64,
        power: f64,
        available: bool,
    }

    impl EnergyProvider for FixedProvider {
        fn initialize(&mut self) -> bool {
            self.available
        }
        fn get_reading(&mut self) -> EnergyReading {
            if !self.available {
                return EnergyReading::invalid(&self.name, 1);
            }
            self.energy += self.power * 0.001;
            EnergyReading {
                timestamp_ns: 1,
                provider_id: self.name.clone(),
                energy_joules: self.energy,
                instantaneous_power_watts: self.power,
                average_power_watts: self.power,
                domain_energy_joules: HashMap::new(),
                domain_power_watts: HashMap::new(),
                confidence: 0.95,
                uncertainty_percent: 1.0,
                sample_count: 1,
            }
        }
        fn specification(&self) -> ProviderSpec {
            ProviderSpec {
                hardware_type: HardwareType::CpuRapl,
                vendor: "test".into(),
                model: "fixed".into(),
                measurement_domains: vec![],
                energy_resolution_joules: 1e-6,
                power_resolution_watts: 1e-6,
                update_interval_ms: 1,
                counter_width_bits: 32,
                typical_accuracy_percent: 1.0,
                overhead_percent: 0.0,
                supports_per_domain: false,
                supported_metrics: vec![],
            }
        }
        fn is_available(&self) -> bool {
            self.available
        }
        fn shutdown(&mut self) {}
        fn name(&self) -> &str {
            &self.name
        }
    }

    #[test]
    fn ring_buffer_returns_chronological_order_after_wrap() {
        let mut buf: RingBuffer<u32> = RingBuffer::new(3);
        for v in 0..5u32 {
            buf.push(v);
        }
        assert_eq!(buf.chronological(), vec![2, 3, 4]);
    }

    #[test]
    fn ring_buffer_not_full_returns_all_in_order() {
        let mut buf: RingBuffer<u32> = RingBuffer::new(5);
        buf.push(1);
        buf.push(2);
        assert_eq!(buf.chronological(), vec![1, 2]);
    }

    #[test]
    fn add_provider_rejected_while_running() {
        let mut coordinator = MeasurementCoordinator::new(CoordinatorConfig::default());
        assert!(coordinator.add_provider(Box::new(FixedProvider {
            name: "p1".into(),
            energy: 0.0,
            power: 5.0,
            available: true,
        })));
        assert!(coordinator.start());
        assert!(!coordinator.add_provider(Box::new(FixedProvider {
            name: "p2".into(),
            energy: 0.0,
            power: 5.0,
            available: true,
        })));
        coordinator.stop();
    }

    #[test]
    fn cross_validation_pass_and_fail() {
        let mut reading = SynchronizedReading {
            provider_readings: vec![
                EnergyReading {
                    average_power_watts: 10.0,
                    provider_id: "a".into(),
                    confidence: 1.0,
                    ..EnergyReading::invalid("a", 1)
                },
                EnergyReading {
                    average_power_watts: 10.4,
                    provider_id: "b".into(),
                    confidence: 1.0,
                    ..EnergyReading::invalid("b", 1)
                },
            ],
            ..SynchronizedReading::default()
        };
        cross_validate(&mut reading, 0.05);
        assert!(reading.cross_validation_passed);

        let mut reading2 = SynchronizedReading {
            provider_readings: vec![
                EnergyReading {
                    average_power_watts: 10.0,
                    provider_id: "a".into(),
                    confidence: 1.0,
                    ..EnergyReading::invalid("a", 1)
                },
                EnergyReading {
                    average_power_watts: 11.0,
                    provider_id: "b".into(),
                    confidence: 1.0,
                    ..EnergyReading::invalid("b", 1)
                },
            ],
            ..SynchronizedReading::default()
        };
        cross_validate(&mut reading2, 0.05);
        assert!(!reading2.cross_validation_passed);
        assert!((reading2.max_provider_deviation - 0.1).abs() < 1e-9);
    }

    #[test]
    fn cross_validation_is_scale_invariant() {
        let mut a = SynchronizedReading {
            provider_readings: vec![
                EnergyReading { average_power_watts: 10.0, provider_id: "a".into(), confidence: 1.0, ..EnergyReading::invalid("a", 1) },
                EnergyReading { average_power_watts: 10.4, provider_id: "b".into(), confidence: 1.0, ..EnergyReading::invalid("b", 1) },
            ],
            ..SynchronizedReading::default()
        };
        let mut b = SynchronizedReading {
            provider_readings: vec![
                EnergyReading { average_power_watts: 100.0, provider_id: "a".into(), confidence: 1.0, ..EnergyReading::invalid("a", 1) },
                EnergyReading { average_power_watts: 104.0, provider_id: "b".into(), confidence: 1.0, ..EnergyReading::invalid("b", 1) },
            ],
            ..SynchronizedReading::default()
        };
        cross_validate(&mut a, 0.05);
        cross_validate(&mut b, 0.05);
        assert_eq!(a.cross_validation_passed, b.cross_validation_passed);
    }

    #[test]
    fn single_provider_skips_cross_validation() {
        let mut reading = SynchronizedReading {
            provider_readings: vec![EnergyReading {
                average_power_watts: 10.0,
                provider_id: "a".into(),
                confidence: 1.0,
                ..EnergyReading::invalid("a", 1)
            }],
            ..SynchronizedReading::default()
        };
        cross_validate(&mut reading, 0.05);
        assert!(reading.cross_validation_passed);
    }
}
