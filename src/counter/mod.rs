//! Counter Manager: wraparound-aware accumulation of monotonic hardware
//! energy counters.
//!
//! RAPL and hwmon energy registers are fixed-width counters that wrap
//! around at `2^bits`. A naive `curr - prev` delta goes negative (as an
//! unsigned underflow, catastrophically large) the instant a counter wraps
//! between samples. `CounterManager` tracks the last raw value seen per
//! domain and folds the wraparound back in, the same arithmetic
//! `RaplMonitor::compute_power` used for its single `max_energy_range_uj`
//! special case, generalized here to an arbitrary bit width and to many
//! independently-wrapping domains under one lock.

use std::collections::HashMap;
use std::sync::Mutex;

/// Per-domain wraparound bookkeeping.
#[derive(Debug, Clone, Copy)]
struct CounterState {
    last_raw: u64,
    accumulated: u64,
    wraparounds: u64,
    bits: u32,
}

impl CounterState {
    fn span(&self) -> u64 {
        1u64 << self.bits
    }
}

/// Diagnostics snapshot for a single tracked domain.
#[derive(Debug, Clone, Copy)]
pub struct CounterDiagnostics {
    pub accumulated: u64,
    pub wraparounds: u64,
    pub last_raw: u64,
}

/// Thread-safe accumulator for wrapping hardware energy counters.
///
/// Each domain is identified by name (e.g. `"package:0"`, `"dram:1"`).
/// The first `update()` for a domain seeds the accumulator at the raw
/// value without adding anything, matching the "first sample" edge case:
/// there is no prior reading to delta against.
pub struct CounterManager {
    domains: Mutex<HashMap<String, CounterState>>,
}

impl CounterManager {
    pub fn new() -> Self {
        Self {
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Feed a fresh raw counter reading for `domain`, `bits` wide, and
    /// return the accumulated (monotonic, never-wrapping) total in the same
    /// units as `raw`.
    pub fn update(&self, domain: &str, raw: u64, bits: u32) -> u64 {
        let mut domains = self.domains.lock().unwrap();
        match domains.get_mut(domain) {
            None => {
                domains.insert(
                    domain.to_string(),
                    CounterState {
                        last_raw: raw,
                        accumulated: raw,
                        wraparounds: 0,
                        bits,
                    },
                );
                raw
            }
            Some(state) => {
                let delta = if raw >= state.last_raw {
                    raw - state.last_raw
                } else {
                    state.wraparounds += 1;
                    (state.span() - state.last_raw) + raw
                };
                state.accumulated = state.accumulated.saturating_add(delta);
                state.last_raw = raw;
                state.accumulated
            }
        }
    }

    /// Apply a batch of readings atomically with respect to concurrent
    /// `update()` calls from another thread, returning accumulated totals
    /// in the same order as `readings`.
    pub fn update_batch(&self, readings: &[(&str, u64, u32)]) -> Vec<u64> {
        let mut domains = self.domains.lock().unwrap();
        readings
            .iter()
            .map(|(domain, raw, bits)| match domains.get_mut(*domain) {
                None => {
                    domains.insert(
                        domain.to_string(),
                        CounterState {
                            last_raw: *raw,
                            accumulated: *raw,
                            wraparounds: 0,
                            bits: *bits,
                        },
                    );
                    *raw
                }
                Some(state) => {
                    let delta = if *raw >= state.last_raw {
                        *raw - state.last_raw
                    } else {
                        state.wraparounds += 1;
                        (state.span() - state.last_raw) + *raw
                    };
                    state.accumulated = state.accumulated.saturating_add(delta);
                    state.last_raw = *raw;
                    state.accumulated
                }
            })
            .collect()
    }

    /// Diagnostics for a tracked domain, if any reading has been seen.
    pub fn diagnostics(&self, domain: &str) -> Option<CounterDiagnostics> {
        let domains = self.domains.lock().unwrap();
        domains.get(domain).map(|state| CounterDiagnostics {
            accumulated: state.accumulated,
            wraparounds: state.wraparounds,
            last_raw: state.last_raw,
        })
    }

    /// Drop all tracked state for `domain`, e.g. after a provider restart
    /// where the underlying counter may have reset independently.
    pub fn reset(&self, domain: &str) {
        self.domains.lock().unwrap().remove(domain);
    }
}

impl Default for CounterManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds_without_delta() {
        let mgr = CounterManager::new();
        assert_eq!(mgr.update("package:0", 1000, 32), 1000);
    }

    #[test]
    fn accumulates_monotonic_deltas() {
        let mgr = CounterManager::new();
        mgr.update("package:0", 1000, 32);
        assert_eq!(mgr.update("package:0", 1500, 32), 1500);
        assert_eq!(mgr.update("package:0", 1800, 32), 1800);
    }

    #[test]
    fn handles_wraparound() {
        let mgr = CounterManager::new();
        let bits = 8u32; // span = 256, small enough to force a wrap in-test
        let span = 1u64 << bits;
        mgr.update("tiny", span - 10, bits);
        // Counter wraps: raw drops from span-10 to 5.
        let total = mgr.update("tiny", 5, bits);
        assert_eq!(total, (span - 10) + 10 + 5);
        let diag = mgr.diagnostics("tiny").unwrap();
        assert_eq!(diag.wraparounds, 1);
    }

    #[test]
    fn independent_domains_tracked_separately() {
        let mgr = CounterManager::new();
        mgr.update("a", 100, 32);
        mgr.update("b", 9000, 32);
        assert_eq!(mgr.update("a", 150, 32), 150);
        assert_eq!(mgr.update("b", 9100, 32), 9100);
    }

    #[test]
    fn reset_clears_tracked_state() {
        let mgr = CounterManager::new();
        mgr.update("a", 100, 32);
        mgr.reset("a");
        assert!(mgr.diagnostics("a").is_none());
        assert_eq!(mgr.update("a", 50, 32), 50);
    }
}
