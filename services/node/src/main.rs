//! skybus Node
//!
//! Runs one virtual component described by a context configuration: opens
//! its ports, registers with the simulation controller when one is
//! configured, then cycles import / send / progress at the configured
//! period. The controller's run state decides whether time advances:
//!
//! - `run`: free running, paced by the wall clock and the time ratio
//! - `step`: advances only while an `F_SYNCHRO` request is pending
//! - `hold`: keeps servicing the link without advancing
//! - `reset`: resets time and messages once, then waits

use anyhow::{Context as _, Result};
use clap::Parser;
use runtime::logging::init_tracing;
use runtime::{Context, ContextBuilder};
use skybus_config::ContextConfig;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use types::RunState;

#[derive(Parser, Debug)]
#[command(name = "skybus-node")]
#[command(about = "Run a skybus virtual component")]
struct Args {
    /// Context configuration file
    #[arg(short, long, default_value = "config/node.toml")]
    config: PathBuf,

    /// Stop after this many simulation steps
    #[arg(short, long)]
    steps: Option<u64>,

    /// Longest wait for input on each cycle, in milliseconds
    #[arg(long, default_value_t = 5)]
    import_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    Advanced,
    Idle,
}

struct Node {
    context: Context,
    period_us: u64,
    import_timeout: Duration,
    last_state: RunState,
}

impl Node {
    fn new(context: Context, import_timeout: Duration) -> Self {
        Self {
            period_us: context.period_us(),
            last_state: context.run_state(),
            context,
            import_timeout,
        }
    }

    /// One cycle of the step loop
    fn cycle(&mut self) -> Result<Cycle> {
        self.context
            .import(self.import_timeout)
            .context("Import failed")?;

        let state = self.context.run_state();
        if state != self.last_state {
            info!("Run state {} -> {}", self.last_state, state);
            if state == RunState::Reset {
                self.context.reset_all();
            }
            self.last_state = state;
        }

        let advance = match state {
            RunState::Run => true,
            RunState::Step => self.context.time_before_notify_us() > 0,
            RunState::Hold | RunState::Reset => false,
        };
        if !advance {
            return Ok(Cycle::Idle);
        }

        if self.context.is_powered() {
            self.context.send_all().context("Send failed")?;
        }
        self.context
            .progress(self.period_us)
            .context("Progress failed")?;
        Ok(Cycle::Advanced)
    }

    /// Wall-clock length of one step at the current time ratio
    fn pace(&self) -> Duration {
        step_duration(self.period_us, self.context.time_ratio())
    }

    fn run(&mut self, max_steps: Option<u64>) -> Result<()> {
        let mut steps = 0u64;
        while max_steps.map_or(true, |max| steps < max) {
            let started = Instant::now();
            if self.cycle()? == Cycle::Advanced {
                steps += 1;
            }
            if self.context.is_autonomous_realtime() {
                if let Some(rest) = self.pace().checked_sub(started.elapsed()) {
                    thread::sleep(rest);
                }
            }
        }
        debug!(steps, time_us = self.context.time_us(), "step loop finished");
        Ok(())
    }
}

/// `period_us / ratio` as a duration, the bare period when the ratio gives
/// no representable duration
fn step_duration(period_us: u64, ratio: f32) -> Duration {
    let period = Duration::from_micros(period_us);
    let nanos = period.as_nanos() as f64 / f64::from(ratio);
    if nanos.is_finite() && nanos >= 0.0 && nanos < u64::MAX as f64 {
        Duration::from_nanos(nanos as u64)
    } else {
        period
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = ContextConfig::load(&args.config)
        .with_context(|| format!("Failed to load {:?}", args.config))?;
    init_tracing(&config.logging)?;

    info!(
        "Starting virtual component {} ({} ports)",
        config.vc_name,
        config.ports.len()
    );
    let context = ContextBuilder::new(&config)
        .build()
        .with_context(|| format!("Failed to build context {}", config.vc_name))?;

    let mut node = Node::new(context, Duration::from_millis(args.import_timeout_ms));
    node.run(args.steps)?;

    info!("Virtual component {} stopped at {} us", config.vc_name, node.context.time_us());
    Ok(())
}
