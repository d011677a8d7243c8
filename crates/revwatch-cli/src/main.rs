//! revwatch demonstration CLI.
//!
//! Wires a synthetic [`mock_backing::MockBacking`] to a
//! `revwatch_coordinator::Coordinator` and a handful of Observer tasks that
//! print their delta streams, exercising the whole pipeline without a real
//! database behind it.

mod machine;
mod mock_backing;

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::info;

use revwatch_coordinator::{Coordinator, CoordinatorConfig};
use revwatch_core::Delta;
use revwatch_wire::KindRegistry;

use machine::Machine;
use mock_backing::MockBacking;

#[derive(Parser)]
#[command(name = "revwatch")]
#[command(about = "Demonstration harness for the revwatch change-broadcaster")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Coordinator against a synthetic backing store and print the
    /// delta streams a handful of Observers see.
    Demo {
        /// Number of machines the mock backing churns through.
        #[arg(long, default_value_t = 3)]
        machines: usize,

        /// Number of concurrent Observers to subscribe.
        #[arg(long, default_value_t = 2)]
        observers: usize,

        /// How long to run before shutting down, in seconds.
        #[arg(long, default_value_t = 8)]
        duration_secs: u64,

        /// Milliseconds between each churn step.
        #[arg(long, default_value_t = 300)]
        tick_ms: u64,
    },

    /// Encode one change as a wire envelope and print both its JSON and
    /// MessagePack forms.
    Encode {
        #[arg(long, default_value = "machine")]
        kind: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        status: String,
        #[arg(long)]
        remove: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt().with_target(false).init();
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            machines,
            observers,
            duration_secs,
            tick_ms,
        } => run_demo(machines, observers, duration_secs, tick_ms).await,
        Commands::Encode { kind, id, status, remove } => run_encode(kind, id, status, remove),
    }
}

async fn run_demo(machines: usize, observer_count: usize, duration_secs: u64, tick_ms: u64) -> Result<()> {
    let backing = MockBacking::new(machines, Duration::from_millis(tick_ms));
    let (coordinator, handle) = Coordinator::new(backing, CoordinatorConfig::default());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    info!(machines, observer_count, duration_secs, "starting demo");
    let coordinator_task = tokio::spawn(coordinator.run(shutdown_rx));

    let mut observer_tasks = Vec::new();
    for n in 0..observer_count {
        let observer = handle.subscribe();
        observer_tasks.push(tokio::spawn(async move {
            loop {
                match observer.next().await {
                    Ok(deltas) => {
                        for delta in deltas {
                            println!(
                                "observer {n}: {} {:?}",
                                if delta.removed { "remove" } else { "change" },
                                delta.entity
                            );
                        }
                    }
                    Err(err) => {
                        println!("observer {n}: terminated: {err}");
                        return;
                    }
                }
            }
        }));
    }

    tokio::time::sleep(Duration::from_secs(duration_secs)).await;
    info!("demo duration elapsed, signalling shutdown");
    let _ = shutdown_tx.send(());

    for task in observer_tasks {
        let _ = task.await;
    }
    coordinator_task.await??;
    Ok(())
}

fn run_encode(kind: String, id: String, status: String, remove: bool) -> Result<()> {
    let mut registry = KindRegistry::new();
    registry.register(kind.clone());

    let delta = Delta {
        removed: remove,
        entity: Machine::new(id, status),
    };
    let envelope = registry.encode(&kind, &delta)?;

    println!("json:     {}", envelope.to_json()?);
    println!("msgpack:  {}", hex_encode(&envelope.to_msgpack()?));

    let decoded: Delta<Machine> = registry.decode(&envelope)?;
    println!("decoded:  {decoded:?}");
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
