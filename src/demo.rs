//! Load generators that drive an [`ArenaRuntime`] while a monitor watches it.
//!
//! - [`DemoMode::Pressure`]: steady allocation churn with a large retained set,
//!   so collections are frequent and the old gen stays busy.
//! - [`DemoMode::Grow`]: the retained set doubles every iteration, with an
//!   explicit collection after each step, until the heap runs out.
use crate::{
    config::MonitorConfig,
    error::{ArenaError, DemoError},
    format::{human_bytes_si, percent},
    metrics::HeapPressureSnapshot,
    monitor::HeapPressureMonitor,
    runtime::arena::{ArenaRuntime, CHUNK_SIZE},
};
use std::{io::Write, thread, time::Duration};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DemoMode {
    Pressure,
    Grow,
}

impl DemoMode {
    pub fn default_iterations(self) -> usize {
        match self {
            DemoMode::Pressure => 20_000,
            DemoMode::Grow => 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub mode: DemoMode,
    /// Heap capacity in bytes.
    pub capacity: u64,
    pub iterations: usize,
    /// Pressure mode prints every this many iterations.
    pub report_every: usize,
    /// Grow mode sleeps this long between steps.
    pub step_pause: Duration,
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemoSummary {
    pub iterations: usize,
    pub collections: u64,
    pub out_of_memory: bool,
    pub last: HeapPressureSnapshot,
}

pub fn run_demo(
    options: &DemoOptions,
    config: &MonitorConfig,
    out: &mut impl Write,
) -> Result<DemoSummary, DemoError> {
    let mut runtime = ArenaRuntime::new(options.capacity);
    let monitor = HeapPressureMonitor::from_config(&runtime, config)?;
    info!(
        mode = ?options.mode,
        capacity = %human_bytes_si(options.capacity),
        lookback_ms = config.lookback_ms,
        sample_ms = config.sample_interval_ms,
        "heap pressure demo started"
    );

    let (iterations, out_of_memory) = match options.mode {
        DemoMode::Pressure => pressure(&mut runtime, &monitor, options, out)?,
        DemoMode::Grow => grow(&mut runtime, &monitor, options, out)?,
    };

    let summary = DemoSummary {
        iterations,
        collections: runtime.cycles(),
        out_of_memory,
        last: monitor.snapshot(),
    };
    monitor.close();
    Ok(summary)
}

fn pressure(
    runtime: &mut ArenaRuntime,
    monitor: &HeapPressureMonitor,
    options: &DemoOptions,
    out: &mut impl Write,
) -> Result<(usize, bool), DemoError> {
    // Keep about 60% of the heap alive at all times.
    let retained_chunks = (options.capacity * 3 / 5 / CHUNK_SIZE as u64) as usize;
    let report_every = options.report_every.max(1);

    for i in 0..options.iterations {
        let bytes = 40_000 + 400 * (i as u64 % 1_000);
        if let Err(e) = runtime.allocate(bytes) {
            warn!(error = %e, iteration = i, "allocation failed, dropping retained set");
            runtime.release_all();
            continue;
        }

        let live = runtime.live_chunks();
        if live > retained_chunks {
            runtime.release_oldest(live - retained_chunks);
        }

        if i % report_every == 0 {
            report(out, None, runtime, monitor, options.json)?;
        }
    }
    Ok((options.iterations, false))
}

fn grow(
    runtime: &mut ArenaRuntime,
    monitor: &HeapPressureMonitor,
    options: &DemoOptions,
    out: &mut impl Write,
) -> Result<(usize, bool), DemoError> {
    let mut required: u64 = 40;

    for iteration in 1..=options.iterations {
        report(out, Some(iteration), runtime, monitor, options.json)?;

        match runtime.allocate(required) {
            Ok(()) => {}
            Err(ArenaError::OutOfMemory {
                requested,
                used,
                capacity,
            }) => {
                writeln!(
                    out,
                    "Out of memory: needed {} with {} of {} in use",
                    human_bytes_si(requested),
                    human_bytes_si(used),
                    human_bytes_si(capacity)
                )?;
                return Ok((iteration, true));
            }
        }
        required = required.saturating_mul(2);
        runtime.collect("System.gc()");

        if !options.json {
            writeln!(out, "Required memory for next step: {}", human_bytes_si(required))?;
        }
        if !options.step_pause.is_zero() {
            thread::sleep(options.step_pause);
        }
    }
    Ok((options.iterations, false))
}

fn report(
    out: &mut impl Write,
    iteration: Option<usize>,
    runtime: &ArenaRuntime,
    monitor: &HeapPressureMonitor,
    json: bool,
) -> Result<(), DemoError> {
    if json {
        serde_json::to_writer(&mut *out, &monitor.snapshot())?;
        writeln!(out)?;
        return Ok(());
    }

    if let Some(iteration) = iteration {
        write!(out, "Iteration {} ", iteration)?;
    }
    writeln!(
        out,
        "Free Mem: {} Old Gen Pool Memory: {}  GC Overhead: {}",
        human_bytes_si(runtime.free()),
        percent(monitor.old_gen_usage_ratio()),
        percent(monitor.gc_overhead_ratio())
    )?;
    Ok(())
}
