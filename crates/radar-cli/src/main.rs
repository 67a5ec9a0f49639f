mod render;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use radar_link::doctor as link_doctor;
use radar_link::{
    Clock, ConnectionState, LinkConfig, PortDescriptor, PortEnumerator, ProbeReport, Shutdown, SystemClock,
    SystemOpener, SystemPorts, TickLoop,
};
use serde::Serialize;

use render::TextRenderer;

#[derive(Debug, Parser)]
#[command(name = "radar", version, about = "Ultrasonic radar - live sweep from a serial-attached sensor")]
struct Cli {
    /// TOML config file; built-in defaults when omitted.
    #[arg(long)]
    config: Option<String>,

    /// Debug logging when RUST_LOG is unset.
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List serial ports considered as candidates.
    Ports {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Run one port selection and print what each probe saw.
    Probe {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration.
    Doctor,
    /// Acquire and display until Ctrl-C.
    Run,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    link: LinkConfig,
    display: DisplayCfg,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct DisplayCfg {
    tick_ms: u64,
    max_distance_cm: i32,
}

impl Default for DisplayCfg {
    fn default() -> Self {
        Self { tick_ms: 16, max_distance_cm: 120 }
    }
}

/// `radar probe --json` output.
#[derive(Debug, Serialize)]
struct ProbeSummary {
    chosen: Option<String>,
    reports: Vec<ProbeReport>,
}

impl ProbeSummary {
    fn new(state: ConnectionState, reports: Vec<ProbeReport>) -> Self {
        let chosen = match state {
            ConnectionState::Connected(port) => Some(port),
            _ => None,
        };
        Self { chosen, reports }
    }
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let Some(path) = path else { return Ok(Config::default()); };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cfg = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Ports { json } => ports(&cfg, json)?,
        Command::Probe { json } => probe(&cfg, json).await?,
        Command::Doctor => doctor(&cfg)?,
        Command::Run => run(&cfg).await?,
    }
    Ok(())
}

fn ports(cfg: &Config, json: bool) -> Result<()> {
    let ports: Vec<PortDescriptor> = SystemPorts::new(cfg.link.port.clone()).list_ports()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for p in ports {
        let mark = if p.is_bluetooth_serial() { "*" } else { " " };
        println!("{} {} ({})", mark, p.system_name, p.description);
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    link_doctor::check_link(&cfg.link)?;
    link_doctor::check_tick(cfg.display.tick_ms, cfg.link.data_timeout_ms)?;
    anyhow::ensure!(cfg.display.max_distance_cm > 0, "display.max_distance_cm must be > 0");
    info!("doctor: OK");
    Ok(())
}

async fn probe(cfg: &Config, json: bool) -> Result<()> {
    let link_cfg = cfg.link.clone();
    // probes block for seconds per candidate
    let (state, reports) = tokio::task::spawn_blocking(move || {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let mut mgr = link_cfg.manager(
            Box::new(SystemPorts::new(link_cfg.port.clone())),
            Box::new(SystemOpener),
            clock,
        );
        let state = mgr.connect();
        let reports = mgr.last_reports().to_vec();
        mgr.shutdown();
        (state, reports)
    })
    .await
    .context("probe task")?;

    let summary = ProbeSummary::new(state, reports);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!("CHOSEN: {}", summary.chosen.as_deref().unwrap_or("none"));
    for r in summary.reports {
        println!(
            "probe port={} pass={:?} outcome={:?} {}ms note={}",
            r.port, r.pass, r.outcome, r.elapsed_ms, r.note
        );
    }
    Ok(())
}

async fn run(cfg: &Config) -> Result<()> {
    doctor(cfg)?;
    info!("run: starting");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let shutdown = Shutdown::new();

    let manager = cfg.link.manager(
        Box::new(SystemPorts::new(cfg.link.port.clone())),
        Box::new(SystemOpener),
        clock.clone(),
    );
    let acquisition = cfg.link.acquisition(manager.link(), clock.clone(), shutdown.clone());
    let renderer = TextRenderer::new(std::io::stdout(), cfg.display.max_distance_cm, cfg.link.data_timeout_ms);
    let tick = TickLoop::new(
        manager,
        renderer,
        clock,
        Duration::from_millis(cfg.display.tick_ms),
        cfg.link.data_timeout_ms,
        shutdown.clone(),
    );

    // Both loops poll and make blocking serial calls.
    let acq_handle = tokio::task::spawn_blocking(move || acquisition.run());
    let mut tick_handle = tokio::task::spawn_blocking(move || tick.run());

    let exited_early = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("listen for ctrl-c")?;
            info!("run: shutdown requested");
            None
        }
        res = &mut tick_handle => Some(res),
    };

    shutdown.trigger();
    acq_handle.await.context("join acquisition loop")?;
    match exited_early {
        None => {
            tick_handle.await.context("join tick loop")?;
        }
        Some(res) => {
            res.context("join tick loop")?;
            warn!("run: tick loop exited unexpectedly");
            anyhow::bail!("tick loop stopped");
        }
    }
    info!("radar: shutdown");
    Ok(())
}
