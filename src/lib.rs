//! # heap-pressure
//!
//! Old-generation occupancy and GC overhead for a garbage-collected runtime,
//! derived from the collector's own end-of-cycle notifications.
//!
//! The runtime is reached through [`runtime::ManagedRuntime`]. Two
//! implementations ship with the crate:
//!
//! - [`runtime::arena::ArenaRuntime`]: a real collected heap on top of `gc-arena`.
//! - [`runtime::synthetic::SyntheticRuntime`]: scripted pools and collectors for tests.
//!
//! ## Environment
//!
//! - `HEAP_PRESSURE_LOOKBACK_MS`: GC overhead window, default 10000.
//! - `HEAP_PRESSURE_SAMPLE_MS`: resolution of that window, default 2000.
//! - `RUST_LOG`: log filter for the CLI, default `info`.
use clap::Parser;
use std::{io, process::ExitCode, time::Duration};
use tracing_subscriber::EnvFilter;

pub mod clock;
pub mod config;
pub mod demo;
pub mod error;
pub mod format;
pub mod metrics;
pub mod monitor;
pub mod runtime;
pub mod sync;
pub mod window;

pub use config::MonitorConfig;
pub use error::MonitorError;
pub use metrics::HeapPressureSnapshot;
pub use monitor::{HeapPressureMonitor, MonitorBuilder};
pub use window::WindowedSum;

use demo::{DemoMode, DemoOptions};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Drive a collected heap under load and report old gen usage and GC overhead"
)]
pub struct Args {
    #[arg(short, long, value_enum, default_value_t = DemoMode::Pressure)]
    pub mode: DemoMode,
    /// Heap capacity in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = 256 * 1024 * 1024)]
    pub heap: u64,
    /// Defaults to 20000 in pressure mode and 20 in grow mode.
    #[arg(short, long)]
    pub iterations: Option<usize>,
    #[arg(long, value_name = "N", default_value_t = 1000)]
    pub report_every: usize,
    /// Pause between grow steps.
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub step_ms: u64,
    /// Overrides HEAP_PRESSURE_LOOKBACK_MS.
    #[arg(long, value_name = "MS")]
    pub lookback_ms: Option<u64>,
    /// Overrides HEAP_PRESSURE_SAMPLE_MS.
    #[arg(long, value_name = "MS")]
    pub sample_ms: Option<u64>,
    /// Print one JSON snapshot per report instead of text.
    #[arg(long)]
    pub json: bool,
}

pub fn run_cli() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = match MonitorConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(2);
        }
    };
    if let Some(ms) = args.lookback_ms {
        config.lookback_ms = ms;
    }
    if let Some(ms) = args.sample_ms {
        config.sample_interval_ms = ms;
    }

    let options = DemoOptions {
        mode: args.mode,
        capacity: args.heap,
        iterations: args.iterations.unwrap_or(args.mode.default_iterations()),
        report_every: args.report_every,
        step_pause: Duration::from_millis(args.step_ms),
        json: args.json,
    };

    let mut out = io::stdout().lock();
    match demo::run_demo(&options, &config, &mut out) {
        Ok(summary) => {
            eprintln!(
                "{} iterations, {} collections, final: {}",
                summary.iterations, summary.collections, summary.last
            );
            if summary.out_of_memory {
                ExitCode::from(3)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(1)
        }
    }
}
