//! rawork CLI - work manager configuration checks and load simulation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rawork_core::{WorkError, WorkManagerConfig};
use rawork_monitor::ProbeProvider;
use rawork_work::{work_fn, PooledWorkManager, ThreadPoolManager, WorkManager, WorkSpec};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rawork")]
#[command(about = "Work manager for resource adapters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a configuration file and print the effective pool settings
    CheckConfig {
        /// Configuration file (JSON)
        file: PathBuf,
    },
    /// Drive synthetic work through one work manager
    Simulate {
        /// Configuration file (JSON); built-in defaults when absent
        #[arg(long)]
        config: Option<PathBuf>,
        /// Resource adapter submitting the work
        #[arg(long, default_value = "demo-ra")]
        adapter: String,
        /// Thread pool to bind to; the default pool when absent
        #[arg(long)]
        thread_pool: Option<String>,
        /// Number of work units
        #[arg(long, default_value = "20")]
        units: usize,
        /// Time each unit runs
        #[arg(long, default_value = "10")]
        work_millis: u64,
        /// Start timeout of each unit; none when absent
        #[arg(long)]
        start_timeout_millis: Option<u64>,
        /// Submission mode
        #[arg(long, value_enum, default_value = "schedule")]
        mode: Mode,
        /// Make every k-th unit fail
        #[arg(long)]
        fail_every: Option<usize>,
        /// Print every probe event as a JSON line
        #[arg(long)]
        events: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Return once queued
    Schedule,
    /// Wait until started
    Start,
    /// Wait until finished
    Do,
}

struct Simulation {
    config: Option<PathBuf>,
    adapter: String,
    thread_pool: Option<String>,
    units: usize,
    work_millis: u64,
    start_timeout_millis: Option<u64>,
    mode: Mode,
    fail_every: Option<usize>,
    events: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig { file } => check_config(file)?,
        Commands::Simulate {
            config,
            adapter,
            thread_pool,
            units,
            work_millis,
            start_timeout_millis,
            mode,
            fail_every,
            events,
        } => {
            simulate(Simulation {
                config,
                adapter,
                thread_pool,
                units,
                work_millis,
                start_timeout_millis,
                mode,
                fail_every,
                events,
            })
            .await?
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<WorkManagerConfig> {
    match path {
        Some(path) => WorkManagerConfig::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display())),
        None => Ok(WorkManagerConfig::default()),
    }
}

fn check_config(file: PathBuf) -> Result<()> {
    let config = load_config(Some(&file))?;
    // Rejects duplicate pool ids.
    ThreadPoolManager::from_config(&config)?;

    let pools: Vec<_> = config
        .pools()
        .iter()
        .map(|pool| {
            serde_json::json!({
                "id": pool.id,
                "settings": pool.settings(),
            })
        })
        .collect();

    let resolved = serde_json::json!({
        "default-thread-pool": config.default_thread_pool,
        "thread-pools": pools,
        "monitoring": config.monitoring,
    });
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

async fn simulate(sim: Simulation) -> Result<()> {
    let config = load_config(sim.config.as_ref())?;
    let pools = ThreadPoolManager::from_config(&config)?;
    let monitor = Arc::new(ProbeProvider::new());

    let printer = sim.events.then(|| {
        let mut rx = monitor.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("failed to encode probe event: {}", e),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("event printer lagged, {} probe events skipped", skipped)
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let manager = Arc::new(PooledWorkManager::new(
        sim.adapter.clone(),
        sim.thread_pool.as_deref(),
        &pools,
        monitor.clone(),
        &config.monitoring,
    )?);

    info!(
        "simulating {} units of {} ms on [{}] via thread-pool [{}], mode {:?}",
        sim.units,
        sim.work_millis,
        sim.adapter,
        manager.pool().id(),
        sim.mode
    );

    let mut submitters = Vec::with_capacity(sim.units);
    for index in 0..sim.units {
        let manager = manager.clone();
        let fails = sim.fail_every.is_some_and(|k| k > 0 && (index + 1) % k == 0);
        let work_time = Duration::from_millis(sim.work_millis);
        let work = work_fn(move || async move {
            tokio::time::sleep(work_time).await;
            if fails {
                anyhow::bail!("unit {} failed on purpose", index);
            }
            Ok(())
        });

        let mut spec = WorkSpec::new();
        if let Some(millis) = sim.start_timeout_millis {
            spec = spec.with_start_timeout(Duration::from_millis(millis));
        }

        let mode = sim.mode;
        submitters.push(tokio::spawn(async move {
            match mode {
                Mode::Schedule => manager.schedule_work(work, spec).await.map(|_| ()),
                Mode::Start => manager.start_work(work, spec).await.map(|_| ()),
                Mode::Do => manager.do_work(work, spec).await,
            }
        }));
    }

    let mut errors: Vec<WorkError> = Vec::new();
    for submitter in submitters {
        if let Err(err) = submitter.await? {
            errors.push(err);
        }
    }

    // Waits for every unit still queued or running.
    let stats = loop {
        let stats = manager.stats();
        let settled = stats.as_ref().map_or(true, |s| {
            s.completed_work_count + s.rejected_work_count >= s.submitted_work_count
                && s.active_work_count.current == 0
        });
        if settled {
            break stats;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    let pool_statuses = pools.statuses();
    manager.shutdown().await;
    pools.shutdown().await;

    drop(manager);
    drop(monitor);
    if let Some(printer) = printer {
        printer.await?;
    }

    let summary = serde_json::json!({
        "adapter": sim.adapter,
        "units": sim.units,
        "failed": errors.len(),
        "errors": errors,
        "pools": pool_statuses,
        "stats": stats,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulate_defaults() {
        let cli = Cli::try_parse_from(["rawork", "simulate"]).unwrap();
        let Commands::Simulate { adapter, units, mode, events, start_timeout_millis, .. } =
            cli.command
        else {
            panic!("expected simulate");
        };
        assert_eq!(adapter, "demo-ra");
        assert_eq!(units, 20);
        assert_eq!(mode, Mode::Schedule);
        assert!(!events);
        assert!(start_timeout_millis.is_none());
    }

    #[test]
    fn test_simulate_flags() {
        let cli = Cli::try_parse_from([
            "rawork",
            "simulate",
            "--mode",
            "do",
            "--units",
            "5",
            "--fail-every",
            "2",
            "--start-timeout-millis",
            "100",
            "--events",
        ])
        .unwrap();
        let Commands::Simulate { mode, units, fail_every, start_timeout_millis, events, .. } =
            cli.command
        else {
            panic!("expected simulate");
        };
        assert_eq!(mode, Mode::Do);
        assert_eq!(units, 5);
        assert_eq!(fail_every, Some(2));
        assert_eq!(start_timeout_millis, Some(100));
        assert!(events);
    }

    #[test]
    fn test_check_config_requires_file() {
        assert!(Cli::try_parse_from(["rawork", "check-config"]).is_err());
    }

    #[tokio::test]
    async fn test_simulate_runs_to_completion() {
        simulate(Simulation {
            config: None,
            adapter: "sim-ra".to_string(),
            thread_pool: None,
            units: 6,
            work_millis: 1,
            start_timeout_millis: None,
            mode: Mode::Do,
            fail_every: Some(3),
            events: true,
        })
        .await
        .unwrap();
    }
}
