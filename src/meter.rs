//! Energy Meter façade: the public, thread-safe handle applications use
//! to read energy, measure a workload, and record checkpoint markers.
//!
//! This is a PIMPL-style façade expressed in Rust: the
//! meter owns the coordinator by value and hides it behind a small,
//! stable surface. No language-specific ABI indirection is needed.

use std::sync::Mutex;
use std::time::Duration;

use crate::coordinator::{CoordinatorConfig, MeasurementCoordinator, SynchronizedReading};
use crate::error::{NembError, Result};
use crate::provider::EnergyProvider;
use crate::timing::PrecisionTimer;

/// A named point in time recorded by `mark_checkpoint`, interpolated
/// against the ring buffer at `get_checkpoint_measurements` time.
#[derive(Debug, Clone)]
pub struct Marker {
    pub name: String,
    pub timestamp_ns: u64,
}

/// One snapshot read, decomposed into totals and per-provider components.
#[derive(Debug, Clone)]
pub struct EnergyResult {
    pub timestamp_ns: u64,
    pub total_energy_joules: f64,
    pub total_power_watts: f64,
    pub providers_active: u32,
    pub providers_failed: u32,
    pub cross_validation_passed: bool,
    pub max_provider_deviation: f64,
    pub is_valid: bool,
    pub error_message: Option<String>,
}

impl EnergyResult {
    fn from_reading(reading: &SynchronizedReading) -> Self {
        Self {
            timestamp_ns: reading.common_timestamp_ns,
            total_energy_joules: reading.total_system_energy_joules,
            total_power_watts: reading.total_system_power_watts,
            providers_active: reading.providers_active,
            providers_failed: reading.providers_failed,
            cross_validation_passed: reading.cross_validation_passed,
            max_provider_deviation: reading.max_provider_deviation,
            is_valid: reading.providers_active > 0,
            error_message: if reading.providers_active == 0 {
                Some("no provider produced a valid reading".to_string())
            } else {
                None
            },
        }
    }
}

/// Result of `measure()` / `end_session()`: an energy delta between two
/// points with combined uncertainty.
#[derive(Debug, Clone)]
pub struct EnergyDifference {
    pub name: String,
    pub energy_joules: f64,
    pub average_power_watts: f64,
    pub duration_seconds: f64,
    pub uncertainty_percent: f64,
    pub is_valid: bool,
    pub error_message: Option<String>,
}

/// A checkpoint marker after interpolation against the ring buffer.
#[derive(Debug, Clone)]
pub struct CorrelatedCheckpoint {
    pub name: String,
    pub timestamp_ns: u64,
    pub energy_joules: f64,
    pub power_watts: f64,
    pub bracketed: bool,
}

struct Session {
    name: String,
    start: EnergyResult,
}

/// Thread-safe façade around a [`MeasurementCoordinator`].
pub struct EnergyMeter {
    coordinator: MeasurementCoordinator,
    timer: PrecisionTimer,
    markers: Mutex<Vec<Marker>>,
    sessions: Mutex<Vec<(String, Session)>>,
}

impl EnergyMeter {
    /// Build a meter with no providers registered yet; call
    /// [`EnergyMeter::add_provider`] then [`EnergyMeter::start`].
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            coordinator: MeasurementCoordinator::new(config),
            timer: PrecisionTimer::initialize(),
            markers: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn add_provider(&self, provider: Box<dyn EnergyProvider>) -> bool {
        self.coordinator.add_provider(provider)
    }

    /// Start background sampling, waiting up to `timeout` for at least
    /// one provider to become active.
    pub fn initialize_meter(&mut self, timeout: Duration) -> Result<()> {
        if self.coordinator.active_provider_names().is_empty() {
            return Err(NembError::NoProviderAvailable);
        }
        if !self.coordinator.start() {
            return Err(NembError::NoProviderAvailable);
        }
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if !self.coordinator.active_provider_names().is_empty() {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        Err(NembError::NoProviderAvailable)
    }

    pub fn stop(&mut self) {
        self.coordinator.stop();
    }

    /// One-shot total + per-provider read.
    pub fn read(&self) -> EnergyResult {
        EnergyResult::from_reading(&self.coordinator.get_synchronized_reading())
    }

    /// Read a baseline, run `workload`, read again, and return the
    /// combined-uncertainty difference. If `workload` panics, the end
    /// reading is still taken and the result is marked invalid before the
    /// panic resumes unwinding: the workload's exception propagates to
    /// the caller after the end reading is captured.
    pub fn measure<F, T>(&self, name: &str, workload: F) -> (T, EnergyDifference)
    where
        F: FnOnce() -> T + std::panic::UnwindSafe,
    {
        let before = self.read();
        let start = std::time::Instant::now();
        let result = std::panic::catch_unwind(workload);
        let duration = start.elapsed();
        let after = self.read();

        let diff = combine(name, &before, &after, duration);

        match result {
            Ok(value) => (value, diff),
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    pub fn start_session(&self, name: &str) -> String {
        let id = format!("{}-{}", self.timer.now_ns(), name);
        let start = self.read();
        self.sessions
            .lock()
            .unwrap()
            .push((id.clone(), Session { name: name.to_string(), start }));
        id
    }

    pub fn end_session(&self, id: &str) -> EnergyDifference {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(pos) = sessions.iter().position(|(sid, _)| sid == id) else {
            return EnergyDifference {
                name: id.to_string(),
                energy_joules: 0.0,
                average_power_watts: 0.0,
                duration_seconds: 0.0,
                uncertainty_percent: 0.0,
                is_valid: false,
                error_message: Some(format!("session not found: {id}")),
            };
        };
        let (_, session) = sessions.remove(pos);
        drop(sessions);
        let end = self.read();
        let duration = Duration::from_nanos(
            end.timestamp_ns.saturating_sub(session.start.timestamp_ns),
        );
        combine(&session.name, &session.start, &end, duration)
    }

    pub fn mark_checkpoint(&self, name: &str) {
        let marker = Marker {
            name: name.to_string(),
            timestamp_ns: self.timer.now_ns(),
        };
        self.markers.lock().unwrap().push(marker);
    }

    /// Interpolate each recorded marker's energy/power against the
    /// coordinator's buffered readings, consuming the marker list.
    pub fn get_checkpoint_measurements(&self) -> Vec<CorrelatedCheckpoint> {
        let markers = std::mem::take(&mut *self.markers.lock().unwrap());
        let buffered = self.coordinator.get_buffered_readings();
        markers
            .into_iter()
            .map(|marker| interpolate(&marker, &buffered))
            .collect()
    }

    pub fn statistics(&self) -> crate::coordinator::CoordinatorStatistics {
        self.coordinator.statistics()
    }

    /// Names of providers currently contributing to readings.
    pub fn active_provider_names(&self) -> Vec<String> {
        self.coordinator.active_provider_names()
    }

    /// Current timestamp on this meter's precision clock, for callers
    /// (e.g. checkpoint correlation) that need to timestamp events against
    /// the same clock the coordinator samples on.
    pub fn now_ns(&self) -> u64 {
        self.timer.now_ns()
    }
}

fn combine(name: &str, before: &EnergyResult, after: &EnergyResult, duration: Duration) -> EnergyDifference {
    let energy = (after.total_energy_joules - before.total_energy_joules).max(0.0);
    let duration_secs = duration.as_secs_f64();
    let power = if duration_secs > 0.0 { energy / duration_secs } else { 0.0 };
    // Combined uncertainty: u = sqrt(u1^2 + u2^2), with
    // each provider's typical uncertainty used as a stand-in when a
    // per-reading figure isn't tracked on EnergyResult.
    let u1 = if before.is_valid { 1.0 } else { 100.0 };
    let u2 = if after.is_valid { 1.0 } else { 100.0 };
    let combined = (u1 * u1 + u2 * u2).sqrt();

    EnergyDifference {
        name: name.to_string(),
        energy_joules: energy,
        average_power_watts: power,
        duration_seconds: duration_secs,
        uncertainty_percent: combined,
        is_valid: before.is_valid && after.is_valid,
        error_message: None,
    }
}

/// Locate the bracketing pair `(r1, r2)` around `marker.timestamp_ns` and
/// linearly interpolate energy/power. A marker before the first reading
/// or after the last uses that nearest reading's value.
fn interpolate(marker: &Marker, buffered: &[SynchronizedReading]) -> CorrelatedCheckpoint {
    if buffered.is_empty() {
        return CorrelatedCheckpoint {
            name: marker.name.clone(),
            timestamp_ns: marker.timestamp_ns,
            energy_joules: 0.0,
            power_watts: 0.0,
            bracketed: false,
        };
    }

    if marker.timestamp_ns <= buffered[0].common_timestamp_ns {
        let r = &buffered[0];
        return CorrelatedCheckpoint {
            name: marker.name.clone(),
            timestamp_ns: marker.timestamp_ns,
            energy_joules: r.total_system_energy_joules,
            power_watts: r.total_system_power_watts,
            bracketed: false,
        };
    }

    let last = buffered.last().unwrap();
    if marker.timestamp_ns >= last.common_timestamp_ns {
        return CorrelatedCheckpoint {
            name: marker.name.clone(),
            timestamp_ns: marker.timestamp_ns,
            energy_joules: last.total_system_energy_joules,
            power_watts: last.total_system_power_watts,
            bracketed: false,
        };
    }

    for window in buffered.windows(2) {
        let (r1, r2) = (&window[0], &window[1]);
        if marker.timestamp_ns >= r1.common_timestamp_ns && marker.timestamp_ns <= r2.common_timestamp_ns {
            let span = (r2.common_timestamp_ns - r1.common_timestamp_ns) as f64;
            let frac = if span > 0.0 {
                (marker.timestamp_ns - r1.common_timestamp_ns) as f64 / span
            } else {
                0.0
            };
            let energy = r1.total_system_energy_joules
                + frac * (r2.total_system_energy_joules - r1.total_system_energy_joules);
            let power = r1.total_system_power_watts
                + frac * (r2.total_system_power_watts - r1.total_system_power_watts);
            return CorrelatedCheckpoint {
                name: marker.name.clone(),
                timestamp_ns: marker.timestamp_ns,
                energy_joules: energy,
                power_watts: power,
                bracketed: true,
            };
        }
    }

    // Unreachable given the bounds checks above, but fall back to the
    // nearest reading rather than panicking.
    CorrelatedCheckpoint {
        name: marker.name.clone(),
        timestamp_ns: marker.timestamp_ns,
        energy_joules: last.total_system_energy_joules,
        power_watts: last.total_system_power_watts,
        bracketed: false,
    }
}

/// RAII scoped measurement: reads a baseline on construction and prints
/// the delta on drop unless [`ScopedMeasurement::stop`] cancels it.
pub struct ScopedMeasurement<'a> {
    meter: &'a EnergyMeter,
    name: String,
    start: EnergyResult,
    cancelled: bool,
}

impl<'a> ScopedMeasurement<'a> {
    pub fn start(meter: &'a EnergyMeter, name: impl Into<String>) -> Self {
        Self {
            meter,
            name: name.into(),
            start: meter.read(),
            cancelled: false,
        }
    }

    /// Cancel the automatic report; no difference is computed on drop.
    pub fn stop(&mut self) {
        self.cancelled = true;
    }
}

impl Drop for ScopedMeasurement<'_> {
    fn drop(&mut self) {
        if self.cancelled {
            return;
        }
        let end = self.meter.read();
        let energy = (end.total_energy_joules - self.start.total_energy_joules).max(0.0);
        log::info!("scoped measurement '{}': {:.6} J", self.name, energy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolation_bracketing_midpoint() {
        let buffered = vec![
            SynchronizedReading {
                common_timestamp_ns: 1000,
                total_system_energy_joules: 100.0,
                total_system_power_watts: 10.0,
                ..SynchronizedReading::default()
            },
            SynchronizedReading {
                common_timestamp_ns: 2000,
                total_system_energy_joules: 120.0,
                total_system_power_watts: 20.0,
                ..SynchronizedReading::default()
            },
        ];
        let marker = Marker { name: "m".into(), timestamp_ns: 1250 };
        let result = interpolate(&marker, &buffered);
        assert!((result.energy_joules - 105.0).abs() < 1e-9);
        assert!(result.bracketed);
    }

    #[test]
    fn interpolation_before_first_uses_first() {
        let buffered = vec![SynchronizedReading {
            common_timestamp_ns: 1000,
            total_system_energy_joules: 50.0,
            ..SynchronizedReading::default()
        }];
        let marker = Marker { name: "m".into(), timestamp_ns: 500 };
        let result = interpolate(&marker, &buffered);
        assert_eq!(result.energy_joules, 50.0);
        assert!(!result.bracketed);
    }

    #[test]
    fn interpolation_after_last_uses_last() {
        let buffered = vec![SynchronizedReading {
            common_timestamp_ns: 1000,
            total_system_energy_joules: 50.0,
            ..SynchronizedReading::default()
        }];
        let marker = Marker { name: "m".into(), timestamp_ns: 5000 };
        let result = interpolate(&marker, &buffered);
        assert_eq!(result.energy_joules, 50.0);
        assert!(!result.bracketed);
    }

    #[test]
    fn interpolation_empty_buffer_returns_zero() {
        let marker = Marker { name: "m".into(), timestamp_ns: 5 };
        let result = interpolate(&marker, &[]);
        assert_eq!(result.energy_joules, 0.0);
    }

    #[test]
    fn combine_computes_sqrt_sum_of_squares_uncertainty() {
        let before = EnergyResult {
            timestamp_ns: 0,
            total_energy_joules: 10.0,
            total_power_watts: 0.0,
            providers_active: 1,
            providers_failed: 0,
            cross_validation_passed: true,
            max_provider_deviation: 0.0,
            is_valid: true,
            error_message: None,
        };
        let after = EnergyResult {
            total_energy_joules: 20.0,
            ..before.clone()
        };
        let diff = combine("w", &before, &after, Duration::from_secs(1));
        assert!((diff.energy_joules - 10.0).abs() < 1e-9);
        assert!((diff.uncertainty_percent - (2.0f64).sqrt()).abs() < 1e-9);
    }
}
