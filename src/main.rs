use std::fs::File;
use std::io::BufReader;
use std::time::Instant;

use clap::Parser;

use csim::config::CacheConfig;
use csim::io::{map_trace, validate_trace};
use csim::simulator::Simulator;

#[cfg(debug_assertions)]
const DEBUG_DEFAULT: bool = true;

#[cfg(not(debug_assertions))]
const DEBUG_DEFAULT: bool = false;

#[derive(Parser, Debug)]
#[command(about = String::from("Set-associative LRU cache simulator for recorded memory traces"))]
struct Args {
    /// Path to the trace file
    trace: String,

    /// Path to a JSON geometry file; the built-in 32KiB 8-way geometry with
    /// 64 byte lines is used when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Thread id whose accesses are simulated; all others are discarded
    #[arg(short, long, default_value_t = 0)]
    thread: u16,

    /// Also print the full result as pretty JSON
    #[arg(short, long)]
    json: bool,

    #[arg(short, long)]
    performance: bool,

    /// Check the trace format before simulating. On by default in debug
    /// builds
    #[arg(long, default_value_t = DEBUG_DEFAULT)]
    validate: bool,

    #[arg(short, long, default_value_t = DEBUG_DEFAULT)]
    debug: bool,
}

fn main() -> Result<(), String> {
    let start = Instant::now();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => {
            let config_file = File::open(path)
                .map_err(|e| format!("Couldn't open the config file at path {path}: {e}"))?;
            serde_json::from_reader(BufReader::new(config_file))
                .map_err(|e| format!("Couldn't parse the config file: {e}"))?
        }
        None => CacheConfig::default(),
    };
    let mut simulator = Simulator::new(&config, args.thread)?;
    let trace_file = File::open(&args.trace)
        .map_err(|e| format!("Couldn't open the trace file at path {}: {e}", args.trace))?;
    let trace = map_trace(trace_file)?;
    if args.validate {
        validate_trace(&trace)?;
    }
    let result = simulator.simulate(&trace)?;
    println!("misses: {} hits: {}", result.misses, result.hits);
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(result)
                .map_err(|e| format!("Couldn't serialise the output {e}"))?
        );
    }
    if args.performance {
        let end = Instant::now();
        let simulation_time = simulator.get_execution_time();
        let total_time = end - start;
        println!("Simulation time: {}s", simulation_time.as_nanos() as f64 / 1e9);
        println!(
            "Total execution time (includes loading, configuration, and output): {}s",
            total_time.as_nanos() as f64 / 1e9
        )
    }
    if args.debug {
        #[cfg(debug_assertions)]
        println!("Running the debug binary, debug mode is enabled by default. If benchmarking, do not use this binary, re-compile with the --release argument when using cargo run");
        println!("Parsed input configuration: {config:?}");
        let cache = simulator.cache();
        println!(
            "Monitoring thread {}, {} of {} sets never reached capacity",
            simulator.monitored_thread(),
            cache.unfilled_set_count(),
            cache.num_sets()
        );
    }
    Ok(())
}
