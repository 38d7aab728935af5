use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, info};

use sr_lab_abstract::{CorruptPolicy, ProtocolConfig, RetransmitPolicy, SimConfig};
use sr_lab_simulator::{SimulationReport, Simulator, scenario_runner, validate_config};

#[derive(Parser, Debug)]
#[command(author, version, about = "Selective-Repeat ARQ simulator")]
struct Args {
    /// TOML run file with [sim], [protocol] and [source] tables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a scenario file and check its assertions instead of a generated workload.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Number of messages the application submits.
    #[arg(long)]
    messages: Option<u32>,

    /// Average time between application messages.
    #[arg(long)]
    interarrival: Option<u64>,

    /// Probability that the channel loses a packet.
    #[arg(long)]
    loss: Option<f64>,

    /// Probability that the channel corrupts a packet.
    #[arg(long)]
    corrupt: Option<f64>,

    /// Seed for the channel's random number generator.
    #[arg(long)]
    seed: Option<u64>,

    /// Stop the simulation at this time even if events remain.
    #[arg(long)]
    time_limit: Option<u64>,

    /// Sender and receiver window size.
    #[arg(long)]
    window: Option<usize>,

    /// Number of distinct sequence numbers; at least twice the window.
    #[arg(long)]
    seq_space: Option<usize>,

    /// Retransmission timeout in simulator time units.
    #[arg(long)]
    timeout: Option<u64>,

    /// Which outstanding packets a timeout resends.
    #[arg(long, value_enum)]
    retransmit_policy: Option<RetransmitPolicy>,

    /// How the receiver answers a corrupted data packet.
    #[arg(long, value_enum)]
    corrupt_policy: Option<CorruptPolicy>,

    /// 0 = warnings only, 1 = entity narrative, 2 = engine events, 3 = everything.
    #[arg(long, default_value_t = 1)]
    trace: u8,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SourceConfig {
    messages: u32,
    avg_interarrival: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            messages: 20,
            avg_interarrival: 10,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunFile {
    sim: SimConfig,
    protocol: ProtocolConfig,
    source: SourceConfig,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.trace);
    info!("sr-lab-sim starting…");

    let report = if let Some(path) = &args.scenario {
        scenario_runner::run_scenario(path)?
    } else {
        let run = args.resolve_run()?;
        run_generated(run)?
    };

    log_summary(&report);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

impl Args {
    /// Run-file values, overridden by any flag given on the command line.
    fn resolve_run(&self) -> Result<RunFile> {
        let mut run = match &self.config {
            Some(path) => load_run_file(path)?,
            None => RunFile::default(),
        };

        if let Some(v) = self.messages {
            run.source.messages = v;
        }
        if let Some(v) = self.interarrival {
            run.source.avg_interarrival = v;
        }
        if let Some(v) = self.loss {
            run.sim.loss_rate = v;
        }
        if let Some(v) = self.corrupt {
            run.sim.corrupt_rate = v;
        }
        if let Some(v) = self.seed {
            run.sim.seed = v;
        }
        if let Some(v) = self.time_limit {
            run.sim.time_limit = Some(v);
        }
        if let Some(v) = self.window {
            run.protocol.window_size = v;
        }
        if let Some(v) = self.seq_space {
            run.protocol.seq_space = v;
        }
        if let Some(v) = self.timeout {
            run.protocol.timeout = v;
        }
        if let Some(v) = self.retransmit_policy {
            run.protocol.retransmit_policy = v;
        }
        if let Some(v) = self.corrupt_policy {
            run.protocol.corrupt_policy = v;
        }

        validate_config(&run.sim)?;
        Ok(run)
    }
}

fn init_logging(trace: u8) {
    let level = match trace {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn run_generated(run: RunFile) -> Result<SimulationReport> {
    let sender = sr_lab_protocol::sender(&run.protocol).context("Invalid protocol configuration")?;
    let receiver =
        sr_lab_protocol::receiver(&run.protocol).context("Invalid protocol configuration")?;

    info!(
        "window={} seq_space={} timeout={} loss={} corrupt={} messages={}",
        run.protocol.window_size,
        run.protocol.seq_space,
        run.protocol.timeout,
        run.sim.loss_rate,
        run.sim.corrupt_rate,
        run.source.messages
    );

    let mut sim = Simulator::new(run.sim, sender, receiver);
    sim.schedule_messages(run.source.messages, run.source.avg_interarrival);
    sim.run_until_complete();
    info!("Simulation complete.");
    Ok(sim.export_report())
}

fn log_summary(report: &SimulationReport) {
    let metric = |name: &str| report.last_metric(name).unwrap_or(0.0);
    info!(
        "Simulation time: {} | sender packets: {} | receiver packets: {} | deliveries: {}",
        report.duration,
        report.sender_packet_count,
        report.receiver_packet_count,
        report.delivered.len()
    );
    info!(
        "Retransmissions: {} | window-full drops: {} | corrupted at receiver: {}",
        metric("sender.retransmissions"),
        metric("sender.window_full_drops"),
        metric("receiver.corrupted")
    );
    if report.remaining_events > 0 {
        info!("Stopped with {} events pending", report.remaining_events);
    }
}

fn load_run_file(path: &Path) -> Result<RunFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read run file {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse run file")
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
