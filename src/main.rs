use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use sr_routing::ids::{ConnectPoint, DeviceId, LinkKey};
use sr_routing::orchestrate::Orchestrator;
use sr_routing::runtime::{
    load_fixture_config, LoggingRulePopulator, MgmtServer, StaticDeviceConfig, StaticFabricView,
    StatusSnapshot,
};

#[derive(Debug, Parser)]
#[command(name = "sr-routingd")]
#[command(about = "Segment-routing default routing handler")]
struct Cli {
    /// Path to a fixture YAML describing devices, links, and config.
    #[arg(long, default_value = "fixture.yaml")]
    fixture: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a full reprogram cycle and exit.
    Reroute,
    /// Resume a previously aborted cycle and exit.
    Resume,
    /// Print the orchestrator's status, read-only.
    Status,
    /// Fail a link (given as two `device:port` endpoints) and reprogram.
    FailLink { a: String, b: String },
    /// Install punt rules and start the port-filter retry loop for a device.
    DeviceAdded { device: u32 },
    /// Purge a device's ECMP graph and reprogram.
    Purge { device: u32 },
    /// Poll the fixture on an interval and serve a status endpoint.
    Serve,
}

fn parse_connect_point(arg: &str) -> Result<ConnectPoint> {
    let (device, port) = arg
        .split_once(':')
        .with_context(|| format!("expected device:port, got {arg}"))?;
    Ok(ConnectPoint::new(
        device.parse::<u32>().context("invalid device id")?,
        port.parse::<u16>().context("invalid port id")?,
    ))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let fixture = load_fixture_config(&cli.fixture)
        .with_context(|| format!("failed to load fixture {}", cli.fixture.display()))?;

    let fabric = Arc::new(StaticFabricView::from_fixture(&fixture));
    let device_config = Arc::new(StaticDeviceConfig::from_fixture(&fixture));
    let rule_populator = Arc::new(LoggingRulePopulator::new(3));
    let orchestrator = Orchestrator::new(
        fabric.clone(),
        device_config,
        rule_populator,
    );

    match cli.command {
        Command::Reroute => {
            let ok = orchestrator.start_population_process();
            info!(ok, status = ?orchestrator.status(), "reroute cycle finished");
        }
        Command::Resume => {
            let ok = orchestrator.resume_population_process();
            info!(ok, status = ?orchestrator.status(), "resume cycle finished");
        }
        Command::Status => {
            println!(
                "status={:?} rule_counter={} roots={}",
                orchestrator.status(),
                orchestrator.rule_counter(),
                orchestrator.current_root_count()
            );
        }
        Command::FailLink { a, b } => {
            let key = LinkKey::new(parse_connect_point(&a)?, parse_connect_point(&b)?);
            fabric.fail_link(key);
            let ok = orchestrator.populate_routing_rules_for_link_status_change(Some(key));
            info!(ok, %key, "link-failure cycle finished");
        }
        Command::DeviceAdded { device } => {
            orchestrator.device_added(DeviceId(device));
            info!(device, "device-added handled");
        }
        Command::Purge { device } => {
            let ok = orchestrator.purge_ecmp_graph(DeviceId(device));
            info!(ok, device, "purge cycle finished");
        }
        Command::Serve => {
            orchestrator.start_population_process();

            let snapshot = StatusSnapshot {
                status: format!("{:?}", orchestrator.status()),
                rule_counter: orchestrator.rule_counter(),
                current_root_count: orchestrator.current_root_count(),
            };
            let mgmt = MgmtServer::start(snapshot, &fixture.management)?;

            let stop = Arc::new(AtomicBool::new(false));
            let stop_signal = Arc::clone(&stop);
            ctrlc::set_handler(move || {
                stop_signal.store(true, Ordering::SeqCst);
            })
            .context("failed to install signal handler")?;

            let tick = Duration::from_millis(fixture.poll_interval_ms.max(50));
            info!("sr-routingd serving, polling every {:?}", tick);
            while !stop.load(Ordering::SeqCst) {
                orchestrator.populate_routing_rules_for_link_status_change(None);
                mgmt.publish(StatusSnapshot {
                    status: format!("{:?}", orchestrator.status()),
                    rule_counter: orchestrator.rule_counter(),
                    current_root_count: orchestrator.current_root_count(),
                });
                thread::sleep(tick);
            }
        }
    }

    Ok(())
}
