//! `nemb`: command-line front end over `nemblib`.
//!
//! Compile/execute orchestration for an arbitrary guest language is the job
//! of an external instrumentation front-end; this binary wires the library
//! together for the narrower slice it can do itself: detect hardware energy
//! providers, run a synthetic workload, preview instrumentation for a
//! source file, and wrap the execution of an already-runnable program with
//! a measurement session.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;

use nemblib::config::NembConfig;
use nemblib::coordinator::CoordinatorConfig;
use nemblib::correlator::{Checkpoint, CheckpointType, CorrelatorSession};
use nemblib::frontend::{InstrumentationFrontEnd, NullFrontEnd};
use nemblib::persistence::SessionStore;

#[derive(Parser)]
#[command(name = "nemb")]
#[command(about = "Native Energy Measurement Backend", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON config file; falls back to built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect hardware energy providers and run their self-tests.
    InitSensors,
    /// Run a synthetic CPU or memory workload and report its energy cost.
    MeasureWorkload {
        /// Duration to run the workload, in seconds.
        #[arg(long, default_value_t = 5)]
        duration: u64,
        /// Which synthetic workload to run.
        #[arg(long, value_enum, default_value = "cpu-stress")]
        workload: Workload,
    },
    /// Ask the instrumentation front end for checkpoints without executing.
    Analyze {
        source_file: PathBuf,
        /// Write the instrumented listing alongside checkpoint comments.
        #[arg(long)]
        save_instrumented: bool,
        /// Directory to write the instrumented listing into.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Instrument, run, and measure a source file's energy consumption.
    Run {
        /// Front-end-reported language tag, e.g. "python".
        language: String,
        source_file: PathBuf,
        /// Arguments forwarded to the executed program.
        args: Vec<String>,
        /// Write the session summary as JSON to this path.
        #[arg(long)]
        json_output: Option<PathBuf>,
        /// Persist the full session (checkpoints, line map) to this SQLite file.
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Workload {
    CpuStress,
    MemoryStress,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    let outcome = match &cli.command {
        Commands::InitSensors => init_sensors(),
        Commands::MeasureWorkload { duration, workload } => {
            measure_workload(&config, *duration, *workload)
        }
        Commands::Analyze { source_file, save_instrumented, output_dir, verbose } => {
            analyze(source_file, *save_instrumented, output_dir.as_deref(), *verbose)
        }
        Commands::Run { language, source_file, args, json_output, store } => {
            run(&config, language, source_file, args, json_output.as_deref(), store.as_deref())
        }
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(message) => {
            eprintln!("{} {}", "[ERROR]".red(), message);
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&Path>) -> NembConfig {
    if let Some(path) = path {
        if let Ok(config) = NembConfig::load(path) {
            return config;
        }
        eprintln!("{} could not load {}, using defaults", "[WARN]".yellow(), path.display());
    }
    NembConfig::default()
}

fn init_sensors() -> Result<(), String> {
    let mut providers = nemblib::detect_providers();
    if providers.is_empty() {
        return Err("no hardware energy provider detected on this host".to_string());
    }

    println!("{}", "=== Detected Energy Providers ===".cyan().bold());
    let mut all_passed = true;
    for provider in providers.iter_mut() {
        let spec = provider.specification();
        let initialized = provider.initialize();
        let passed = initialized && provider.self_test();
        all_passed &= passed;
        let status = if passed { "OK".green() } else { "FAILED".red() };
        println!(
            "{:<20} {:?}  vendor={}  model={}  [{}]",
            provider.name(),
            spec.hardware_type,
            spec.vendor,
            spec.model,
            status
        );
    }

    if all_passed {
        println!("{}", "[INFO] all providers passed self-test".cyan());
        Ok(())
    } else {
        Err("one or more providers failed self-test".to_string())
    }
}

fn measure_workload(config: &NembConfig, duration: u64, workload: Workload) -> Result<(), String> {
    let coordinator_config = CoordinatorConfig::from(config);
    let mut meter =
        nemblib::meter_with_detected_providers(coordinator_config).map_err(|e| e.to_string())?;
    meter
        .initialize_meter(Duration::from_secs(2))
        .map_err(|e| e.to_string())?;

    let label = match workload {
        Workload::CpuStress => "cpu_stress",
        Workload::MemoryStress => "memory_stress",
    };
    let run_duration = Duration::from_secs(duration);
    let (_, diff) = meter.measure(label, move || match workload {
        Workload::CpuStress => cpu_stress(run_duration),
        Workload::MemoryStress => memory_stress(run_duration),
    });
    meter.stop();

    println!("{}", "=== Workload Measurement ===".cyan().bold());
    println!("Energy consumed : {:.6} J", diff.energy_joules);
    println!("Average power   : {:.3} W", diff.average_power_watts);
    println!("Duration        : {:.3} s", diff.duration_seconds);
    println!("Valid           : {}", diff.is_valid);
    println!("Uncertainty     : {:.2}%", diff.uncertainty_percent);
    if !diff.is_valid {
        if let Some(message) = &diff.error_message {
            println!("{} {}", "[WARN]".yellow(), message);
        }
    }
    Ok(())
}

fn cpu_stress(duration: Duration) {
    let deadline = std::time::Instant::now() + duration;
    let mut acc: u64 = 0;
    while std::time::Instant::now() < deadline {
        for i in 0..10_000u64 {
            acc = acc.wrapping_add(i.wrapping_mul(2654435761));
        }
    }
    std::hint::black_box(acc);
}

fn memory_stress(duration: Duration) {
    let deadline = std::time::Instant::now() + duration;
    let mut buffer = vec![0u8; 64 * 1024 * 1024];
    while std::time::Instant::now() < deadline {
        for chunk in buffer.chunks_mut(4096) {
            chunk[0] = chunk[0].wrapping_add(1);
        }
    }
    std::hint::black_box(&buffer);
}

fn analyze(
    source_file: &Path,
    save_instrumented: bool,
    output_dir: Option<&Path>,
    verbose: bool,
) -> Result<(), String> {
    let front_end = NullFrontEnd;
    let checkpoints = front_end
        .checkpoints_for(source_file)
        .map_err(|e| e.to_string())?;
    let language = front_end.language_for(source_file);

    println!("{}", "=== Analysis (no execution) ===".cyan().bold());
    println!("file     : {}", source_file.display());
    println!("language : {language}");
    println!("checkpoints found: {}", checkpoints.len());
    if verbose {
        for checkpoint in &checkpoints {
            println!(
                "  {} {:?} {} line {} col {}",
                checkpoint.id,
                checkpoint.checkpoint_type,
                checkpoint.name,
                checkpoint.line,
                checkpoint.column
            );
        }
    }

    if save_instrumented {
        let source = fs::read_to_string(source_file).map_err(|e| e.to_string())?;
        let instrumented = instrument_preview(&source, &checkpoints);
        let dir = output_dir.unwrap_or_else(|| source_file.parent().unwrap_or(Path::new(".")));
        fs::create_dir_all(dir).map_err(|e| e.to_string())?;
        let stem = source_file.file_stem().and_then(|s| s.to_str()).unwrap_or("instrumented");
        let extension = source_file.extension().and_then(|s| s.to_str()).unwrap_or("txt");
        let out_path = dir.join(format!("{stem}.instrumented.{extension}"));
        let mut file = fs::File::create(&out_path).map_err(|e| e.to_string())?;
        file.write_all(instrumented.as_bytes()).map_err(|e| e.to_string())?;
        println!("instrumented listing written to {}", out_path.display());
    }

    Ok(())
}

/// Annotates each instrumented line with a trailing comment naming the
/// checkpoint that would fire there. A stand-in for the real rewrite an
/// external front-end performs; this crate never parses or compiles source.
fn instrument_preview(source: &str, checkpoints: &[Checkpoint]) -> String {
    let mut by_line: std::collections::HashMap<usize, Vec<&Checkpoint>> = std::collections::HashMap::new();
    for checkpoint in checkpoints {
        by_line.entry(checkpoint.line).or_default().push(checkpoint);
    }

    source
        .lines()
        .enumerate()
        .map(|(i, line)| {
            let line_number = i + 1;
            match by_line.get(&line_number) {
                Some(marks) => {
                    let names: Vec<&str> = marks.iter().map(|c| c.name.as_str()).collect();
                    format!("{line}  // nemb: {}", names.join(", "))
                }
                None => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn run(
    config: &NembConfig,
    language: &str,
    source_file: &Path,
    args: &[String],
    json_output: Option<&Path>,
    store: Option<&Path>,
) -> Result<(), String> {
    if !source_file.exists() {
        return Err(format!("source file not found: {}", source_file.display()));
    }

    let coordinator_config = CoordinatorConfig::from(config);
    let mut meter =
        nemblib::meter_with_detected_providers(coordinator_config).map_err(|e| e.to_string())?;
    meter
        .initialize_meter(Duration::from_secs(2))
        .map_err(|e| e.to_string())?;

    let front_end = NullFrontEnd;
    let extra_checkpoints = front_end
        .checkpoints_for(source_file)
        .map_err(|e| e.to_string())?;

    let source_path_str = source_file.display().to_string();
    let mut session = CorrelatorSession::start(source_path_str, language, meter.now_ns());
    let entry_name = source_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("main")
        .to_string();

    let start_reading = meter.read();
    session.record_checkpoint(
        Checkpoint {
            id: "entry".to_string(),
            checkpoint_type: CheckpointType::FunctionEnter,
            name: entry_name.clone(),
            line: 1,
            column: 0,
            context: String::new(),
        },
        meter.now_ns(),
        Some(start_reading.total_energy_joules),
    );

    for checkpoint in extra_checkpoints {
        let reading = meter.read();
        session.record_checkpoint(checkpoint, meter.now_ns(), Some(reading.total_energy_joules));
    }

    let status = Command::new(source_file)
        .args(args)
        .status()
        .map_err(|e| format!("failed to execute {}: {e}", source_file.display()))?;

    let end_reading = meter.read();
    session.record_checkpoint(
        Checkpoint {
            id: "exit".to_string(),
            checkpoint_type: CheckpointType::FunctionExit,
            name: entry_name,
            line: 1,
            column: 0,
            context: String::new(),
        },
        meter.now_ns(),
        Some(end_reading.total_energy_joules),
    );

    let finished = session.finish(meter.now_ns(), Some(end_reading.total_energy_joules));
    meter.stop();

    let duration_seconds = (finished.end_time_ns.saturating_sub(finished.start_time_ns)) as f64 / 1e9;
    println!("{}", "=== Session Summary ===".cyan().bold());
    println!("session_id  : {}", finished.session_id);
    println!("file        : {}", finished.source_file_path);
    println!("language    : {}", finished.language);
    println!("success     : {}", status.success());
    println!("total_joules: {:.6}", finished.total_energy_joules);
    println!("avg_watts   : {:.3}", finished.average_power_watts);
    println!("peak_watts  : {:.3}", finished.peak_power_watts);
    println!("duration_s  : {:.3}", duration_seconds);
    println!("checkpoints : {}", finished.checkpoints.len());

    if let Some(path) = json_output {
        let payload = serde_json::json!({
            "session_id": finished.session_id,
            "file_path": finished.source_file_path,
            "language": finished.language,
            "success": status.success(),
            "total_joules": finished.total_energy_joules,
            "average_watts": finished.average_power_watts,
            "peak_watts": finished.peak_power_watts,
            "duration_seconds": duration_seconds,
            "checkpoint_count": finished.checkpoints.len(),
        });
        fs::write(path, serde_json::to_string_pretty(&payload).map_err(|e| e.to_string())?)
            .map_err(|e| e.to_string())?;
        println!("json summary written to {}", path.display());
    }

    if let Some(path) = store {
        let mut store = SessionStore::open(path).map_err(|e| e.to_string())?;
        let created_at = finished.start_time_ns as i64 / 1_000_000_000;
        store.store_session(&finished, created_at).map_err(|e| e.to_string())?;
        println!("session persisted to {}", path.display());
    }

    if !status.success() {
        return Err(format!("executed program exited with status {status}"));
    }
    Ok(())
}
