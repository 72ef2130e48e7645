//! custodian - object expirer / container reconciler daemons.
//!
//! The production object store is an external collaborator; this binary
//! drives the daemons against in-memory stores seeded from a JSON fixture.

mod fixture;
mod logging;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use custodian_core::app::{DaemonBuilder, DaemonConfig, DaemonKind};
use custodian_core::domain::{ObjectPath, PolicyIndex, Task};
use custodian_core::impls::{InMemoryObjectStore, InMemoryTaskStore};
use custodian_core::ports::{Clock, FixedClock, SystemClock};

use fixture::{Fixture, epoch};

#[derive(Parser)]
#[command(
    name = "custodian",
    version,
    about = "Deferred-task daemons for an object store"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a daemon.
    Run {
        /// TOML file with [object-expirer] / [container-reconciler] sections.
        #[arg(short, long)]
        config: PathBuf,

        /// object-expirer or container-reconciler.
        daemon: DaemonKind,

        /// Run a single cycle and print its snapshot.
        #[arg(long)]
        once: bool,

        /// JSON fixture used to seed the in-memory stores.
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
    /// Parse and validate both daemon sections.
    CheckConfig {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the hidden-namespace path a task would be written to.
    #[command(subcommand)]
    Enqueue(EnqueueCommand),
}

#[derive(Subcommand)]
enum EnqueueCommand {
    /// Queue an object for deletion at `delete_at` (epoch seconds).
    Expire { path: String, delete_at: i64 },
    /// Queue an object for a copy between storage policies.
    Reconcile {
        path: String,
        source_policy: u32,
        dest_policy: u32,
        timestamp: i64,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config,
            daemon,
            once,
            fixture,
        } => cmd_run(config, daemon, once, fixture).await,
        Command::CheckConfig { config } => cmd_check_config(config),
        Command::Enqueue(cmd) => cmd_enqueue(cmd),
    }
}

async fn cmd_run(
    config_path: PathBuf,
    kind: DaemonKind,
    once: bool,
    fixture: Option<PathBuf>,
) -> Result<()> {
    let config = DaemonConfig::load(&config_path, kind)
        .with_context(|| format!("load [{kind}] from {}", config_path.display()))?;
    logging::init(&config.log_level);
    // subscriber が無い間に出た警告をもう一度出す
    let config = DaemonConfig::load(&config_path, kind)?;

    let fixture = match fixture {
        Some(path) => Fixture::load(&path)?,
        None => Fixture::default(),
    };
    let clock: Arc<dyn Clock> = match fixture.now {
        Some(now) => Arc::new(FixedClock::new(epoch(now)?)),
        None => Arc::new(SystemClock),
    };

    let tasks = InMemoryTaskStore::new();
    let objects = InMemoryObjectStore::new();
    fixture.seed(&tasks, &objects, clock.now()).await?;

    let daemon = DaemonBuilder::new(config)
        .task_store(Arc::new(tasks))
        .object_store(Arc::new(objects))
        .clock(clock)
        .build()
        .context("build daemon")?;

    if once {
        let snapshot = daemon.run_once().await;
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot).context("serialize snapshot")?
        );
        return Ok(());
    }

    let handle = Arc::new(daemon).spawn();
    tokio::signal::ctrl_c()
        .await
        .context("wait for ctrl-c")?;
    tracing::info!(daemon = %kind, "shutting down");
    handle.shutdown_and_join().await;
    Ok(())
}

fn cmd_check_config(config_path: PathBuf) -> Result<()> {
    logging::init("warn");
    let mut failed = Vec::new();
    for kind in DaemonKind::ALL {
        match DaemonConfig::load(&config_path, kind) {
            Ok(config) => println!(
                "[{kind}] ok: interval={}s concurrency={} processes={} process={} delays={}",
                config.interval.as_secs_f64(),
                config.concurrency,
                config.processes,
                config.process,
                config.delays.len()
            ),
            Err(e) => {
                println!("[{kind}] invalid: {e}");
                failed.push(kind.section());
            }
        }
    }
    if !failed.is_empty() {
        bail!("invalid sections: {}", failed.join(", "));
    }
    Ok(())
}

fn cmd_enqueue(cmd: EnqueueCommand) -> Result<()> {
    let now = SystemClock.now();
    let task = match cmd {
        EnqueueCommand::Expire { path, delete_at } => {
            Task::expiration(ObjectPath::parse(&path)?, epoch(delete_at)?, now)
        }
        EnqueueCommand::Reconcile {
            path,
            source_policy,
            dest_policy,
            timestamp,
        } => {
            if source_policy == dest_policy {
                bail!("source and destination policy are both {source_policy}");
            }
            Task::reconcile(
                ObjectPath::parse(&path)?,
                PolicyIndex(source_policy),
                PolicyIndex(dest_policy),
                epoch(timestamp)?,
                now,
            )
        }
    };
    println!("/{}/{}", task.scope, task.id);
    Ok(())
}
