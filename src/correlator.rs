//! Checkpoint Correlator: attributes a measurement session's energy to
//! the source checkpoints that produced it.
//!
//! Grounded on `energy_code_mapper.cpp`'s `correlate_energy_measurements`,
//! `apply_overhead_compensation`, `apply_statistical_filtering`,
//! `calculate_energy_deltas` and `build_source_energy_mapping`, generalized
//! from a single PMT-style sensor to the coordinator's buffered
//! `SynchronizedReading`s.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::coordinator::SynchronizedReading;

const STATISTICAL_NOISE_THRESHOLD_MS: f64 = 1.0;
const MIN_MEASUREMENTS_FOR_STATISTICS: usize = 5;
const OUTLIER_THRESHOLD_SIGMA: f64 = 2.5;

/// The kind of code location a checkpoint marks. Closed enumeration per
/// the instrumentation front-end contract; the six original types carry
/// the overhead multipliers measured for them, the remaining four inherit
/// the neutral 1.0 multiplier since no measured value exists for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckpointType {
    FunctionEnter,
    FunctionExit,
    LoopStart,
    Call,
    Expression,
    Assignment,
    Conditional,
    ClassEnter,
    ContextEnter,
    ComprehensionStart,
}

impl CheckpointType {
    pub fn as_key(self) -> &'static str {
        match self {
            CheckpointType::FunctionEnter => "function_enter",
            CheckpointType::FunctionExit => "function_exit",
            CheckpointType::LoopStart => "loop_start",
            CheckpointType::Call => "call",
            CheckpointType::Expression => "expression",
            CheckpointType::Assignment => "assignment",
            CheckpointType::Conditional => "conditional",
            CheckpointType::ClassEnter => "class_enter",
            CheckpointType::ContextEnter => "context_enter",
            CheckpointType::ComprehensionStart => "comprehension_start",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "function_enter" => CheckpointType::FunctionEnter,
            "function_exit" => CheckpointType::FunctionExit,
            "loop_start" => CheckpointType::LoopStart,
            "call" => CheckpointType::Call,
            "expression" => CheckpointType::Expression,
            "assignment" => CheckpointType::Assignment,
            "conditional" => CheckpointType::Conditional,
            "class_enter" => CheckpointType::ClassEnter,
            "context_enter" => CheckpointType::ContextEnter,
            "comprehension_start" => CheckpointType::ComprehensionStart,
            _ => return None,
        })
    }

    fn overhead_multiplier(self) -> f64 {
        match self {
            CheckpointType::FunctionEnter => 1.2,
            CheckpointType::FunctionExit => 1.0,
            CheckpointType::LoopStart => 0.8,
            CheckpointType::Expression => 0.6,
            CheckpointType::Call => 1.0,
            CheckpointType::Assignment => 0.5,
            CheckpointType::Conditional => 1.0,
            CheckpointType::ClassEnter => 1.0,
            CheckpointType::ContextEnter => 1.0,
            CheckpointType::ComprehensionStart => 1.0,
        }
    }
}

/// A code location a language front end instruments, as reported by
/// `InstrumentationFrontEnd`.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub id: String,
    pub checkpoint_type: CheckpointType,
    pub name: String,
    pub line: usize,
    pub column: usize,
    pub context: String,
}

/// A checkpoint correlated with the readings bracketing it in time.
#[derive(Debug, Clone)]
pub struct TimedCheckpoint {
    pub checkpoint: Checkpoint,
    pub timestamp_ns: u64,
    pub energy_before: Option<f64>,
    pub energy_after: Option<f64>,
    pub energy_consumed_joules: f64,
    pub power_consumed_watts: f64,
    pub duration_seconds: f64,
    pub has_energy_data: bool,
    pub source_lines_covered: Vec<usize>,
}

/// Per-source-line energy attribution, built by `build_source_energy_mapping`.
#[derive(Debug, Clone, Default)]
pub struct SourceLineEnergy {
    pub line_number: usize,
    pub line_content: String,
    pub total_energy_joules: f64,
    pub execution_count: u64,
    pub avg_energy_per_execution: f64,
    pub associated_checkpoints: Vec<String>,
}

/// A completed measurement session with source-level energy attribution.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub source_file_path: String,
    pub language: String,
    pub start_time_ns: u64,
    pub end_time_ns: u64,
    pub checkpoints: Vec<TimedCheckpoint>,
    pub total_energy_joules: f64,
    pub average_power_watts: f64,
    pub peak_power_watts: f64,
    pub line_energy_map: HashMap<usize, SourceLineEnergy>,
    pub original_source_lines: Vec<String>,
}

impl Session {
    pub fn function_energy_breakdown(&self) -> HashMap<String, f64> {
        let mut breakdown = HashMap::new();
        for checkpoint in self.checkpoints.iter().filter(|c| c.has_energy_data) {
            *breakdown.entry(checkpoint.checkpoint.name.clone()).or_insert(0.0) +=
                checkpoint.energy_consumed_joules;
        }
        breakdown
    }

    pub fn type_energy_breakdown(&self) -> HashMap<&'static str, f64> {
        let mut breakdown = HashMap::new();
        for checkpoint in self.checkpoints.iter().filter(|c| c.has_energy_data) {
            *breakdown.entry(checkpoint.checkpoint.checkpoint_type.as_key()).or_insert(0.0) +=
                checkpoint.energy_consumed_joules;
        }
        breakdown
    }

    pub fn top_energy_lines(&self, count: usize) -> Vec<(usize, f64)> {
        let mut lines: Vec<(usize, f64)> = self
            .line_energy_map
            .iter()
            .map(|(&line, energy)| (line, energy.total_energy_joules))
            .collect();
        lines.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        lines.truncate(count);
        lines
    }

    pub fn top_energy_consumers(&self, count: usize) -> Vec<&TimedCheckpoint> {
        let mut consumers: Vec<&TimedCheckpoint> =
            self.checkpoints.iter().filter(|c| c.has_energy_data).collect();
        consumers.sort_by(|a, b| {
            b.energy_consumed_joules
                .partial_cmp(&a.energy_consumed_joules)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        consumers.truncate(count);
        consumers
    }
}

/// An energy hotspot or optimization suggestion surfaced from thresholds.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub message: String,
}

/// Builds a [`Session`] incrementally: record checkpoints as they fire,
/// then finish to correlate, compensate, filter and attribute energy.
pub struct CorrelatorSession {
    session_id: String,
    source_file_path: String,
    language: String,
    start_time_ns: u64,
    records: Vec<(Checkpoint, u64, Option<f64>)>,
}

impl CorrelatorSession {
    pub fn start(source_file_path: impl Into<String>, language: impl Into<String>, now_ns: u64) -> Self {
        Self {
            session_id: generate_session_id(now_ns),
            source_file_path: source_file_path.into(),
            language: language.into(),
            start_time_ns: now_ns,
            records: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    /// Record a checkpoint firing, with the energy reading taken at the
    /// nearest point in time (`None` if no reading was available).
    pub fn record_checkpoint(&mut self, checkpoint: Checkpoint, now_ns: u64, energy_joules: Option<f64>) {
        self.records.push((checkpoint, now_ns, energy_joules));
    }

    /// Finish the session: correlate, compensate, filter, aggregate and
    /// map to source lines. `end_energy_joules` is folded in as the
    /// `energy_after` of the final checkpoint.
    pub fn finish(self, end_time_ns: u64, end_energy_joules: Option<f64>) -> Session {
        let mut checkpoints: Vec<TimedCheckpoint> = self
            .records
            .into_iter()
            .map(|(checkpoint, timestamp_ns, energy)| TimedCheckpoint {
                checkpoint,
                timestamp_ns,
                energy_before: energy,
                energy_after: None,
                energy_consumed_joules: 0.0,
                power_consumed_watts: 0.0,
                duration_seconds: 0.0,
                has_energy_data: energy.is_some(),
                source_lines_covered: Vec::new(),
            })
            .collect();

        if let (Some(last), Some(end)) = (checkpoints.last_mut(), end_energy_joules) {
            last.energy_after = Some(end);
        }

        correlate(&mut checkpoints);
        apply_overhead_compensation(&mut checkpoints, &self.language);
        apply_statistical_filtering(&mut checkpoints);
        let (total_energy_joules, average_power_watts, peak_power_watts) = aggregate(&checkpoints);

        let original_source_lines = fs::read_to_string(&self.source_file_path)
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default();

        let mut session = Session {
            session_id: self.session_id,
            source_file_path: self.source_file_path,
            language: self.language,
            start_time_ns: self.start_time_ns,
            end_time_ns,
            checkpoints,
            total_energy_joules,
            average_power_watts,
            peak_power_watts,
            line_energy_map: HashMap::new(),
            original_source_lines,
        };
        build_source_energy_mapping(&mut session);
        session
    }
}

fn generate_session_id(now_ns: u64) -> String {
    format!("nemb_{now_ns}")
}

/// `energy_after` of checkpoint `i` is pinned to checkpoint `i+1`'s
/// `energy_before` so every interior checkpoint has a well-defined delta
/// against its successor, matching the C++ original's pairwise
/// `curr->energy_before - prev->energy_before` pattern.
fn correlate(checkpoints: &mut [TimedCheckpoint]) {
    for i in 0..checkpoints.len().saturating_sub(1) {
        let next_before = checkpoints[i + 1].energy_before;
        checkpoints[i].energy_after = next_before;
    }

    for i in 1..checkpoints.len() {
        let (before_slice, after_slice) = checkpoints.split_at_mut(i);
        let prev = &before_slice[i - 1];
        let curr = &mut after_slice[0];

        if let (Some(curr_before), Some(prev_before)) = (curr.energy_before, prev.energy_before) {
            curr.energy_consumed_joules = (curr_before - prev_before).max(0.0);
            let duration_ns = curr.timestamp_ns.saturating_sub(prev.timestamp_ns);
            curr.duration_seconds = duration_ns as f64 / 1e9;
            if curr.duration_seconds > 0.0 {
                curr.power_consumed_watts = curr.energy_consumed_joules / curr.duration_seconds;
            }
        }
    }
}

fn language_baseline_joules(language: &str) -> f64 {
    match language {
        "python" => 5e-6,
        "cpp" | "c++" => 1e-6,
        "java" => 3e-6,
        "javascript" => 4e-6,
        _ => 2e-6,
    }
}

fn instrumentation_overhead(language: &str, checkpoint_type: CheckpointType) -> f64 {
    language_baseline_joules(language) * checkpoint_type.overhead_multiplier()
}

fn apply_overhead_compensation(checkpoints: &mut [TimedCheckpoint], language: &str) {
    for checkpoint in checkpoints.iter_mut() {
        if !checkpoint.has_energy_data || checkpoint.energy_consumed_joules <= 0.0 {
            continue;
        }
        let overhead = instrumentation_overhead(language, checkpoint.checkpoint.checkpoint_type);
        if checkpoint.energy_consumed_joules > overhead * 2.0 {
            checkpoint.energy_consumed_joules -= overhead;
            if let Some(before) = checkpoint.energy_before {
                checkpoint.energy_before = Some((before - overhead).max(0.0));
            }
        }
    }
}

fn apply_statistical_filtering(checkpoints: &mut [TimedCheckpoint]) {
    if checkpoints.len() < MIN_MEASUREMENTS_FOR_STATISTICS {
        return;
    }

    let baseline: Vec<f64> = checkpoints
        .iter()
        .filter(|c| c.has_energy_data && c.energy_consumed_joules > 0.0 && c.duration_seconds > 0.0)
        .map(|c| c.energy_consumed_joules)
        .collect();

    if baseline.len() < MIN_MEASUREMENTS_FOR_STATISTICS {
        return;
    }

    let mean = baseline.iter().sum::<f64>() / baseline.len() as f64;
    let variance = baseline.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / baseline.len() as f64;
    let std_dev = variance.sqrt();

    let len = checkpoints.len();
    for i in 0..len {
        if !checkpoints[i].has_energy_data || checkpoints[i].energy_consumed_joules <= 0.0 {
            continue;
        }

        let duration_ms = checkpoints[i].duration_seconds * 1000.0;
        if duration_ms < STATISTICAL_NOISE_THRESHOLD_MS {
            let start = i.saturating_sub(2);
            let end = (i + 3).min(len);
            let nearby: Vec<f64> = (start..end)
                .filter(|&j| j != i && checkpoints[j].has_energy_data && checkpoints[j].energy_consumed_joules > 0.0)
                .map(|j| checkpoints[j].energy_consumed_joules)
                .collect();
            if nearby.len() >= 2 {
                let filtered = nearby.iter().sum::<f64>() / nearby.len() as f64;
                checkpoints[i].energy_consumed_joules = 0.7 * filtered + 0.3 * checkpoints[i].energy_consumed_joules;
            }
        }

        let is_outlier = std_dev > 0.0
            && (checkpoints[i].energy_consumed_joules - mean).abs() / std_dev > OUTLIER_THRESHOLD_SIGMA;
        if is_outlier {
            let start = i.saturating_sub(3);
            let end = (i + 4).min(len);
            let mut nearby: Vec<f64> = (start..end)
                .filter(|&j| j != i && checkpoints[j].has_energy_data && checkpoints[j].energy_consumed_joules > 0.0)
                .map(|j| checkpoints[j].energy_consumed_joules)
                .collect();
            if !nearby.is_empty() {
                nearby.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                checkpoints[i].energy_consumed_joules = nearby[nearby.len() / 2];
            }
        }
    }
}

fn aggregate(checkpoints: &[TimedCheckpoint]) -> (f64, f64, f64) {
    let mut total = 0.0;
    let mut total_power = 0.0;
    let mut peak_power: f64 = 0.0;
    let mut valid = 0u32;

    for checkpoint in checkpoints {
        if checkpoint.has_energy_data && checkpoint.energy_consumed_joules > 0.0 {
            total += checkpoint.energy_consumed_joules;
            total_power += checkpoint.power_consumed_watts;
            peak_power = peak_power.max(checkpoint.power_consumed_watts);
            valid += 1;
        }
    }

    let average_power = if valid > 0 { total_power / valid as f64 } else { 0.0 };
    (total, average_power, peak_power)
}

fn build_source_energy_mapping(session: &mut Session) {
    for (i, line_content) in session.original_source_lines.iter().enumerate() {
        let line_number = i + 1;
        session.line_energy_map.insert(
            line_number,
            SourceLineEnergy {
                line_number,
                line_content: line_content.clone(),
                ..SourceLineEnergy::default()
            },
        );
    }

    for checkpoint in &session.checkpoints {
        if !checkpoint.has_energy_data {
            continue;
        }
        let lines_to_credit: &[usize] = if checkpoint.source_lines_covered.is_empty() {
            std::slice::from_ref(&checkpoint.checkpoint.line)
        } else {
            &checkpoint.source_lines_covered
        };
        let energy_per_line = checkpoint.energy_consumed_joules / lines_to_credit.len() as f64;

        for &line_number in lines_to_credit {
            if let Some(line_energy) = session.line_energy_map.get_mut(&line_number) {
                line_energy.total_energy_joules += energy_per_line;
                line_energy.execution_count += 1;
                line_energy
                    .associated_checkpoints
                    .push(checkpoint.checkpoint.id.clone());
                line_energy.avg_energy_per_execution =
                    line_energy.total_energy_joules / line_energy.execution_count as f64;
            }
        }
    }
}

/// Energy hotspots (checkpoints consuming ≥ `threshold_percentage` of the
/// session total) plus optimization suggestions from function/type/peak
/// thresholds.
pub fn find_hotspots(session: &Session, threshold_percentage: f64) -> Vec<Suggestion> {
    if session.total_energy_joules <= 0.0 {
        return Vec::new();
    }
    let threshold = session.total_energy_joules * threshold_percentage / 100.0;
    session
        .checkpoints
        .iter()
        .filter(|c| c.has_energy_data && c.energy_consumed_joules >= threshold)
        .map(|c| Suggestion {
            message: format!(
                "{} (line {}): {:.3} J",
                c.checkpoint.name, c.checkpoint.line, c.energy_consumed_joules
            ),
        })
        .collect()
}

pub fn generate_suggestions(session: &Session) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();
    if session.total_energy_joules <= 0.0 {
        return suggestions;
    }

    for (function, energy) in session.function_energy_breakdown() {
        let percentage = energy / session.total_energy_joules * 100.0;
        if percentage > 20.0 {
            suggestions.push(Suggestion {
                message: format!(
                    "function '{function}' consumes {percentage:.1}% of total energy - consider optimization"
                ),
            });
        }
    }

    let type_breakdown = session.type_energy_breakdown();
    if let Some(&loop_energy) = type_breakdown.get("loop_start") {
        let percentage = loop_energy / session.total_energy_joules * 100.0;
        if percentage > 30.0 {
            suggestions.push(Suggestion {
                message: format!(
                    "loops consume {percentage:.1}% of energy - consider loop optimization or vectorization"
                ),
            });
        }
    }

    if session.checkpoints.len() > 100 {
        suggestions.push(Suggestion {
            message: "high number of checkpoints detected - consider reducing function call overhead".to_string(),
        });
    }

    if session.peak_power_watts > session.average_power_watts * 3.0 {
        suggestions.push(Suggestion {
            message: "high peak power detected - consider load balancing or power management".to_string(),
        });
    }

    suggestions
}

/// Instrumented ("checkpointed") lines from a source file, as a
/// lightweight fallback when no language-specific frontend is wired in.
pub fn source_line(path: &Path, line_number: usize) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    contents.lines().nth(line_number.checked_sub(1)?).map(str::to_string)
}

/// Builds a [`SynchronizedReading`]-derived total-energy sample, used by
/// callers recording checkpoints against the live coordinator.
pub fn total_energy_joules(reading: &SynchronizedReading) -> Option<f64> {
    if reading.providers_active == 0 {
        None
    } else {
        Some(reading.total_system_energy_joules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_type_key_round_trips() {
        for ty in [
            CheckpointType::FunctionEnter,
            CheckpointType::FunctionExit,
            CheckpointType::LoopStart,
            CheckpointType::Call,
            CheckpointType::Expression,
            CheckpointType::Assignment,
            CheckpointType::Conditional,
            CheckpointType::ClassEnter,
            CheckpointType::ContextEnter,
            CheckpointType::ComprehensionStart,
        ] {
            assert_eq!(CheckpointType::from_key(ty.as_key()), Some(ty));
        }
        assert_eq!(CheckpointType::from_key("bogus"), None);
    }

    fn checkpoint(id: &str, name: &str, line: usize, checkpoint_type: CheckpointType) -> Checkpoint {
        Checkpoint {
            id: id.to_string(),
            checkpoint_type,
            name: name.to_string(),
            line,
            column: 0,
            context: String::new(),
        }
    }

    #[test]
    fn correlate_computes_nonnegative_energy_deltas() {
        let mut checkpoints = vec![
            TimedCheckpoint {
                checkpoint: checkpoint("c1", "f", 1, CheckpointType::FunctionEnter),
                timestamp_ns: 0,
                energy_before: Some(10.0),
                energy_after: None,
                energy_consumed_joules: 0.0,
                power_consumed_watts: 0.0,
                duration_seconds: 0.0,
                has_energy_data: true,
                source_lines_covered: Vec::new(),
            },
            TimedCheckpoint {
                checkpoint: checkpoint("c2", "f", 2, CheckpointType::FunctionExit),
                timestamp_ns: 1_000_000_000,
                energy_before: Some(15.0),
                energy_after: None,
                energy_consumed_joules: 0.0,
                power_consumed_watts: 0.0,
                duration_seconds: 0.0,
                has_energy_data: true,
                source_lines_covered: Vec::new(),
            },
        ];
        correlate(&mut checkpoints);
        assert!((checkpoints[1].energy_consumed_joules - 5.0).abs() < 1e-9);
        assert!((checkpoints[1].power_consumed_watts - 5.0).abs() < 1e-9);
        assert_eq!(checkpoints[0].energy_after, Some(15.0));
    }

    #[test]
    fn overhead_compensation_only_applies_above_2x_overhead() {
        let mut checkpoints = vec![TimedCheckpoint {
            checkpoint: checkpoint("c1", "f", 1, CheckpointType::FunctionEnter),
            timestamp_ns: 0,
            energy_before: Some(1e-6),
            energy_after: None,
            energy_consumed_joules: 1e-6, // below 2x overhead (python: 6e-6), untouched
            power_consumed_watts: 0.0,
            duration_seconds: 0.001,
            has_energy_data: true,
            source_lines_covered: Vec::new(),
        }];
        apply_overhead_compensation(&mut checkpoints, "python");
        assert!((checkpoints[0].energy_consumed_joules - 1e-6).abs() < 1e-12);

        checkpoints[0].energy_consumed_joules = 1e-4;
        apply_overhead_compensation(&mut checkpoints, "python");
        assert!(checkpoints[0].energy_consumed_joules < 1e-4);
    }

    #[test]
    fn outlier_is_replaced_by_median_of_window() {
        let mut checkpoints: Vec<TimedCheckpoint> = (0..6)
            .map(|i| TimedCheckpoint {
                checkpoint: checkpoint(&format!("c{i}"), "f", i, CheckpointType::Call),
                timestamp_ns: i as u64 * 10_000_000,
                energy_before: None,
                energy_after: None,
                energy_consumed_joules: if i == 3 { 100.0 } else { 1.0 },
                power_consumed_watts: 0.0,
                duration_seconds: 0.01,
                has_energy_data: true,
                source_lines_covered: Vec::new(),
            })
            .collect();
        apply_statistical_filtering(&mut checkpoints);
        assert!(checkpoints[3].energy_consumed_joules < 100.0);
    }

    #[test]
    fn statistical_filtering_skipped_below_minimum_samples() {
        let mut checkpoints: Vec<TimedCheckpoint> = (0..3)
            .map(|i| TimedCheckpoint {
                checkpoint: checkpoint(&format!("c{i}"), "f", i, CheckpointType::Call),
                timestamp_ns: i as u64,
                energy_before: None,
                energy_after: None,
                energy_consumed_joules: if i == 1 { 100.0 } else { 1.0 },
                power_consumed_watts: 0.0,
                duration_seconds: 0.01,
                has_energy_data: true,
                source_lines_covered: Vec::new(),
            })
            .collect();
        apply_statistical_filtering(&mut checkpoints);
        assert_eq!(checkpoints[1].energy_consumed_joules, 100.0);
    }

    #[test]
    fn source_energy_mapping_distributes_evenly_across_covered_lines() {
        let mut session = Session {
            session_id: "s".into(),
            source_file_path: "x".into(),
            language: "python".into(),
            start_time_ns: 0,
            end_time_ns: 0,
            checkpoints: vec![TimedCheckpoint {
                checkpoint: checkpoint("c1", "f", 1, CheckpointType::Call),
                timestamp_ns: 0,
                energy_before: None,
                energy_after: None,
                energy_consumed_joules: 4.0,
                power_consumed_watts: 0.0,
                duration_seconds: 0.01,
                has_energy_data: true,
                source_lines_covered: vec![1, 2],
            }],
            total_energy_joules: 4.0,
            average_power_watts: 0.0,
            peak_power_watts: 0.0,
            line_energy_map: HashMap::new(),
            original_source_lines: vec!["a".to_string(), "b".to_string()],
        };
        build_source_energy_mapping(&mut session);
        assert!((session.line_energy_map[&1].total_energy_joules - 2.0).abs() < 1e-9);
        assert!((session.line_energy_map[&2].total_energy_joules - 2.0).abs() < 1e-9);
    }

    #[test]
    fn hotspots_respect_threshold_percentage() {
        let session = Session {
            session_id: "s".into(),
            source_file_path: "x".into(),
            language: "python".into(),
            start_time_ns: 0,
            end_time_ns: 0,
            checkpoints: vec![
                TimedCheckpoint {
                    checkpoint: checkpoint("c1", "big", 1, CheckpointType::Call),
                    timestamp_ns: 0,
                    energy_before: None,
                    energy_after: None,
                    energy_consumed_joules: 9.0,
                    power_consumed_watts: 0.0,
                    duration_seconds: 0.01,
                    has_energy_data: true,
                    source_lines_covered: Vec::new(),
                },
                TimedCheckpoint {
                    checkpoint: checkpoint("c2", "small", 2, CheckpointType::Call),
                    timestamp_ns: 0,
                    energy_before: None,
                    energy_after: None,
                    energy_consumed_joules: 1.0,
                    power_consumed_watts: 0.0,
                    duration_seconds: 0.01,
                    has_energy_data: true,
                    source_lines_covered: Vec::new(),
                },
            ],
            total_energy_joules: 10.0,
            average_power_watts: 0.0,
            peak_power_watts: 0.0,
            line_energy_map: HashMap::new(),
            original_source_lines: Vec::new(),
        };
        let hotspots = find_hotspots(&session, 50.0);
        assert_eq!(hotspots.len(), 1);
        assert!(hotspots[0].message.contains("big"));
    }
}
