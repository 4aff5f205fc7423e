use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use colored::*;
use swarm_consensus::{NodeStatus, Role, Timing};
use swarm_orchestrator::{describe, Report, Snapshot, Swarm, SwarmConfig, Transport};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "swarm")]
#[command(about = "Leader election and heartbeat simulator for control nodes on a shared bus", long_about = None)]
struct Cli {
    /// Number of nodes to simulate
    #[arg(long, default_value_t = 5)]
    nodes: usize,

    /// Run for this many seconds
    #[arg(long, default_value_t = 30)]
    duration: u64,

    /// Stop the current leader once to exercise recovery
    #[arg(long)]
    fault_test: bool,

    /// Seconds before the fault is injected
    #[arg(long, default_value_t = 10)]
    fault_after: u64,

    /// Bus transport (virtual, udp)
    #[arg(long, default_value = "virtual")]
    transport: Transport,

    /// Shorthand for --transport virtual
    #[arg(long = "virtual", conflicts_with = "transport")]
    virtual_bus: bool,

    /// Leader heartbeat interval
    #[arg(long, default_value_t = 100)]
    heartbeat_ms: u64,

    /// Lower bound of the randomized election timeout
    #[arg(long, default_value_t = 150)]
    election_min_ms: u64,

    /// Upper bound of the randomized election timeout
    #[arg(long, default_value_t = 300)]
    election_max_ms: u64,

    /// Node loop tick
    #[arg(long, default_value_t = 10)]
    tick_ms: u64,

    /// Status sampling interval
    #[arg(long, default_value_t = 1000)]
    sample_ms: u64,

    /// Print the final report as JSON instead of the status stream
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn config(&self) -> SwarmConfig {
        let transport = if self.virtual_bus {
            Transport::Virtual
        } else {
            self.transport
        };
        let timing = Timing {
            tick: Duration::from_millis(self.tick_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_ms),
            election_timeout_min: Duration::from_millis(self.election_min_ms),
            election_timeout_max: Duration::from_millis(self.election_max_ms),
        };

        let mut config = SwarmConfig::new(self.nodes)
            .with_duration(Duration::from_secs(self.duration))
            .with_transport(transport)
            .with_timing(timing)
            .with_sample_interval(Duration::from_millis(self.sample_ms));
        if self.fault_test {
            config = config.with_fault_after(Duration::from_secs(self.fault_after));
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Configuration errors are fatal before any node starts
    let config = cli.config();
    config.validate().context("Invalid configuration")?;

    let swarm = Swarm::launch(config).context("Failed to start swarm")?;
    let json = cli.json;
    if !json {
        print_banner(&swarm);
    }

    let report = swarm
        .run_until(ctrl_c(), |snapshot| {
            if !json {
                print_snapshot(snapshot);
            }
        })
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

async fn ctrl_c() {
    // Without a signal handler the run simply goes to completion
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn rule() -> String {
    "=".repeat(60)
}

fn print_banner(swarm: &Swarm) {
    let config = swarm.config();
    println!("{}", rule());
    println!("  {}", "Swarm Election Simulator".bold());
    println!("{}", rule());
    println!("  Nodes: {}", config.nodes);
    println!("  Bus: {}", swarm.bus_name());
    println!("  Duration: {}s", config.duration.as_secs());
    if let Some(fault) = config.fault {
        println!("  Fault test: leader stopped after {}s", fault.after.as_secs());
    }
    println!("{}", rule());
}

fn status_line(status: &NodeStatus) -> String {
    let text = describe(status);
    let painted = if !status.alive {
        text.red()
    } else {
        match status.role {
            Role::Leader => text.green().bold(),
            Role::Candidate => text.yellow(),
            Role::Follower => text.normal(),
        }
    };

    if status.alive {
        format!(
            "  Node {}: {} [tx:{} rx:{}]",
            status.id, painted, status.sent, status.received
        )
    } else {
        format!("  Node {}: {}", status.id, painted)
    }
}

fn print_snapshot(snapshot: &Snapshot) {
    println!();
    println!("--- Status (t={}s) ---", snapshot.elapsed.as_secs());
    for status in &snapshot.nodes {
        println!("{}", status_line(status));
    }
}

fn print_report(report: &Report) {
    if report.interrupted {
        println!("\n\n{}", "Interrupted by user".yellow());
    }
    println!();
    println!("{}", rule());
    println!("  {}", "Final Statistics".bold());
    println!("{}", rule());
    println!("{}", report);
    println!("{}", rule());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["swarm"]).unwrap();
        let config = cli.config();

        assert_eq!(config.nodes, 5);
        assert_eq!(config.duration, Duration::from_secs(30));
        assert!(config.fault.is_none());
        assert_eq!(config.transport, Transport::Virtual);
        assert_eq!(config.timing, Timing::default());
        assert_eq!(config, SwarmConfig::default());
    }

    #[test]
    fn test_cli_fault_and_transport() {
        let cli = Cli::try_parse_from([
            "swarm",
            "--nodes",
            "7",
            "--duration",
            "15",
            "--fault-test",
            "--fault-after",
            "4",
            "--transport",
            "udp",
        ])
        .unwrap();
        let config = cli.config();

        assert_eq!(config.nodes, 7);
        assert_eq!(config.fault.unwrap().after, Duration::from_secs(4));
        assert_eq!(config.transport, Transport::Udp);
    }

    #[test]
    fn test_cli_virtual_flag() {
        let cli = Cli::try_parse_from(["swarm", "--virtual"]).unwrap();
        assert_eq!(cli.config().transport, Transport::Virtual);

        // Contradictory transport selection is rejected by the parser
        assert!(Cli::try_parse_from(["swarm", "--virtual", "--transport", "udp"]).is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_transport() {
        assert!(Cli::try_parse_from(["swarm", "--transport", "can0"]).is_err());
    }

    #[test]
    fn test_zero_nodes_is_a_config_error() {
        let cli = Cli::try_parse_from(["swarm", "--nodes", "0"]).unwrap();
        let err = cli.config().validate().unwrap_err();
        assert!(err.to_string().contains("Configuration Error"));
    }

    #[test]
    fn test_status_line_formatting() {
        colored::control::set_override(false);

        let mut status = NodeStatus {
            id: 2,
            alive: true,
            role: Role::Leader,
            term: 4,
            voted_for: Some(2),
            leader_id: Some(2),
            votes_received: 3,
            sent: 10,
            received: 7,
            send_failures: 0,
            heartbeats_sent: 8,
        };
        assert_eq!(status_line(&status), "  Node 2: LEADER (term 4) [tx:10 rx:7]");

        status.alive = false;
        assert_eq!(status_line(&status), "  Node 2: OFFLINE");
    }
}
