use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use linkstat::aggregation::pipeline::PacketStatsPipeline;
use linkstat::api::routes;
use linkstat::capture::source::{discover_captures, PcapFileSource};
use linkstat::models::config::{AnalyzerConfig, AppConfig, Metric, MonitorConfig};
use linkstat::monitor::collectors::{DisabledProbeRunner, StaticTopology, SysfsCounterReader};
use linkstat::monitor::sampler::SamplingLoop;
use linkstat::monitor::store::LiveStatsStore;
use linkstat::utils::error::{AppError, AppResult};
use linkstat::utils::logging;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Per-protocol bandwidth profiling and live link monitoring")]
struct Cli {
    /// Log level (trace, debug, info, warn, error, off)
    #[clap(long, default_value = "info", global = true)]
    log_level: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bin capture files into fixed windows and export per-protocol rates
    Analyze(AnalyzeArgs),

    /// Sample interface counters and probes, serving live stats over HTTP
    Monitor(MonitorArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Capture files, or directories holding `*.pcap` files
    #[clap(required = true)]
    inputs: Vec<PathBuf>,

    /// Window width in seconds
    #[clap(short, long, default_value_t = 0.1)]
    interval: f64,

    /// Accumulate bits or packets per window
    #[clap(short, long, value_enum, default_value_t = Metric::Bits)]
    metric: Metric,

    /// Output CSV file
    #[clap(short, long, default_value = "bandwidth_usage.csv")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// Interface to sample, as NAME or NAME:NODE:PEER (repeatable)
    #[clap(short, long = "interface")]
    interfaces: Vec<String>,

    /// Node owning interfaces given without one
    #[clap(long, default_value = "local")]
    node: String,

    /// JSON topology file, replaces --interface and --probe-host
    #[clap(long)]
    topology: Option<PathBuf>,

    /// Probe endpoint (repeatable); even positions probe odd positions
    #[clap(long = "probe-host")]
    probe_hosts: Vec<String>,

    /// Port for the control API
    #[clap(short, long, default_value_t = 3000)]
    port: u16,

    /// Seconds between sampling cycles
    #[clap(long, default_value_t = 5.0)]
    sample_period: f64,

    /// Seconds each bandwidth probe runs
    #[clap(long, default_value_t = 2.0)]
    probe_duration: f64,

    /// Seconds between starting a responder and probing it
    #[clap(long, default_value_t = 0.5)]
    settle_delay: f64,

    /// Seconds between the bandwidth and latency probe of a pair
    #[clap(long, default_value_t = 0.5)]
    probe_gap: f64,

    /// Measure at most this many random probe pairs per cycle
    #[clap(long)]
    max_probe_pairs: Option<usize>,

    /// Keep at most this many samples per history
    #[clap(long)]
    history_limit: Option<usize>,

    /// Treat A-B and B-A as the same link
    #[clap(long)]
    canonical_links: bool,

    /// Directory for traffic, bandwidth and latency records
    #[clap(long, default_value = "network_stats")]
    output_dir: PathBuf,
}

impl MonitorArgs {
    fn app_config(&self) -> AppResult<AppConfig> {
        let monitor = MonitorConfig {
            sample_period: seconds("sample period", self.sample_period)?,
            probe_duration: seconds("probe duration", self.probe_duration)?,
            settle_delay: seconds("settle delay", self.settle_delay)?,
            probe_gap: seconds("probe gap", self.probe_gap)?,
            max_probe_pairs: self.max_probe_pairs,
            history_limit: self.history_limit,
            canonical_links: self.canonical_links,
            output_directory: self.output_dir.clone(),
        };
        monitor.validate()?;
        Ok(AppConfig {
            port: self.port,
            monitor,
        })
    }

    fn topology(&self) -> AppResult<StaticTopology> {
        let topology = match &self.topology {
            Some(path) => StaticTopology::from_file(path)?,
            None => StaticTopology::from_args(&self.interfaces, &self.node, &self.probe_hosts)?,
        };
        topology.validate()?;
        Ok(topology)
    }
}

fn seconds(name: &str, value: f64) -> AppResult<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        AppError::ConfigError(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, value
        ))
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logger(logging::parse_log_level(&cli.log_level)?);
    info!("Starting linkstat v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Analyze(args) => analyze(args),
        Command::Monitor(args) => actix_rt::System::new().block_on(monitor(args)),
    }
}

fn analyze(args: AnalyzeArgs) -> Result<()> {
    let config = AnalyzerConfig {
        interval: args.interval,
        metric: args.metric,
        output: args.output,
    };
    config.validate()?;

    let captures = collect_captures(&args.inputs)?;
    if captures.is_empty() {
        warn!("No capture files found");
    }

    let mut pipeline = PacketStatsPipeline::from_config(&config)?;
    for path in &captures {
        let source = match PcapFileSource::open(path) {
            Ok(source) => source,
            Err(e) => {
                error!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let summary = pipeline.process(source);
        info!(
            "Processed {}: {} packets, {} skipped",
            path.display(),
            summary.processed,
            summary.skipped
        );
    }

    let rows = pipeline
        .save(&config.output)
        .with_context(|| format!("failed to write {}", config.output.display()))?;
    let total = pipeline.summary();
    info!(
        "Wrote {} windows from {} packets ({} skipped) to {}",
        rows,
        total.processed,
        total.skipped,
        config.output.display()
    );
    Ok(())
}

/// Expand directories into their capture files, keeping argument order
fn collect_captures(inputs: &[PathBuf]) -> AppResult<Vec<PathBuf>> {
    let mut captures = Vec::new();
    for input in inputs {
        if input.is_dir() {
            captures.extend(discover_captures(input)?);
        } else {
            captures.push(input.clone());
        }
    }
    Ok(captures)
}

async fn monitor(args: MonitorArgs) -> Result<()> {
    let config = args.app_config()?;
    let topology = args.topology()?;

    if !topology.probe_pairs.is_empty() {
        warn!(
            "{} probe pairs configured but no probe backend is available; \
             bandwidth and latency will be recorded as 0",
            topology.probe_pairs.len()
        );
    }

    let store = Arc::new(LiveStatsStore::new(&config.monitor)?);
    let sampler = Arc::new(RwLock::new(SamplingLoop::new(
        config.monitor.clone(),
        Arc::new(topology),
        store.clone(),
        Arc::new(SysfsCounterReader::new()),
        Arc::new(DisabledProbeRunner),
    )));
    sampler.write().await.start()?;

    let store_data = web::Data::new(store.clone());
    let sampler_data = web::Data::new(sampler.clone());

    info!("Starting control API on port {}", config.port);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(store_data.clone())
            .app_data(sampler_data.clone())
            .configure(routes::configure)
    })
    .disable_signals()
    .bind(("127.0.0.1", config.port))?
    .run();
    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down");

    server_handle.stop(true).await;
    sampler.write().await.stop().await;
    if let Ok(Err(e)) = server_task.await {
        error!("Control API failed: {}", e);
    }

    print_report(&store, store.output_directory().as_deref());
    Ok(())
}

fn print_report(store: &LiveStatsStore, directory: Option<&Path>) {
    let links = store.snapshot();
    println!("\nNetwork statistics ({} links)", links.len());
    for (key, stats) in &links {
        println!("\nLink {}", key);
        println!("  Bytes sent/recv:   {} / {}", stats.bytes_sent, stats.bytes_recv);
        println!("  Packets sent/recv: {} / {}", stats.packets_sent, stats.packets_recv);
        if let Some(mbps) = stats.current_bandwidth() {
            println!("  Bandwidth:         {:.2} Mbps", mbps);
        }
        if let Some(ms) = stats.current_latency() {
            println!("  Latency:           {:.2} ms", ms);
        }
    }
    if store.persist_errors() > 0 {
        println!("\n{} records could not be written", store.persist_errors());
    }
    if let Some(directory) = directory {
        println!("\nRecords saved in {}", directory.display());
    }
}
