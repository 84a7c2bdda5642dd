mod commands;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use oxen_config::{ProcessorConfig, QueueConfig};
use oxen_core::{EnqueueOutcome, JobView, NewJob, NoopErrorCallback, NoopSuccessCallback, WorkFn};
use oxen_runtime::{Controller, ProcessorSpec};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "oxen")]
#[command(about = "oxen-queue CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local overlay)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Enqueue a single job
    Enqueue {
        /// Logical queue name
        #[arg(long)]
        job_type: String,

        /// Inline JSON body
        #[arg(long)]
        body: Option<String>,

        /// Path to a file containing the JSON body
        #[arg(long)]
        body_file: Option<String>,

        /// Lower sorts earlier; defaults to the enqueue wall-clock in millis
        #[arg(long)]
        priority: Option<i64>,

        /// Delay eligibility by this many seconds (mutually exclusive with --start-time)
        #[arg(long)]
        delay_seconds: Option<i64>,

        /// Absolute earliest-eligible RFC3339 timestamp
        #[arg(long)]
        start_time: Option<DateTime<Utc>>,

        /// Dedup key; a conflicting live key is silently dropped
        #[arg(long)]
        unique_key: Option<u32>,

        /// Layered config paths in merge order; omit to use OXEN_DATABASE_URL directly
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Run lifecycle commands
    Run {
        #[command(subcommand)]
        cmd: RunCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[derive(Subcommand)]
enum RunCmd {
    /// Start a foreground Controller for one job_type and block until Ctrl-C,
    /// draining in-flight jobs on shutdown.
    ///
    /// Dispatches via a built-in echo work function (success := the decoded
    /// body, unchanged) — this binary is an ops shell for exercising the
    /// queue end to end, not a host for arbitrary user code. Applications
    /// with a real work function embed `oxen-runtime` directly instead of
    /// shelling out to this command.
    Start {
        /// job_type to process; must match a `/processors` entry in --config
        #[arg(long)]
        job_type: String,

        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = oxen_db::connect_from_env(2).await?;
            match cmd {
                DbCmd::Status => {
                    let s = oxen_db::status(&pool).await?;
                    println!("db_ok={} has_queue_table={}", s.ok, s.has_queue_table);
                }
                DbCmd::Migrate => {
                    oxen_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
            let loaded = oxen_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Enqueue {
            job_type,
            body,
            body_file,
            priority,
            delay_seconds,
            start_time,
            unique_key,
            config_paths,
        } => {
            if delay_seconds.is_some() && start_time.is_some() {
                anyhow::bail!("--delay-seconds and --start-time are mutually exclusive");
            }

            let body_json = commands::load_body(body, body_file)?;
            let (pool, extra_fields) = connect_pool(&config_paths, 2).await?;
            let store = oxen_db::Store::new(pool).with_extra_fields(extra_fields);

            let mut job = NewJob::new(job_type, body_json);
            job.priority = priority;
            job.unique_key = unique_key;
            job.start_time = start_time.or_else(|| {
                delay_seconds.map(|s| Utc::now() + chrono::Duration::seconds(s))
            });

            match store.enqueue(&job).await? {
                EnqueueOutcome::Inserted(id) => println!("outcome=inserted id={id}"),
                EnqueueOutcome::Deduplicated => println!("outcome=deduplicated"),
            }
        }

        Commands::Run { cmd } => match cmd {
            RunCmd::Start { job_type, config_paths } => {
                run_start(job_type, config_paths).await?;
            }
        },
    }

    Ok(())
}

/// Connect using the DB URL + `extraFields` resolved from layered config, or
/// fall back to `OXEN_DATABASE_URL` directly with no extra fields when no
/// `--config` layers are given.
async fn connect_pool(
    config_paths: &[String],
    max_connections: u32,
) -> Result<(sqlx::PgPool, Vec<String>)> {
    if config_paths.is_empty() {
        let pool = oxen_db::connect_from_env(max_connections).await?;
        return Ok((pool, Vec::new()));
    }

    let path_refs: Vec<&str> = config_paths.iter().map(String::as_str).collect();
    let loaded = oxen_config::load_layered_yaml(&path_refs)?;
    let queue_cfg = QueueConfig::from_config_json(&loaded.config_json)?;
    queue_cfg.validate()?;

    let secret = oxen_config::resolve_db_url(&loaded.config_json)?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&secret.url)
        .await
        .context("failed to connect to Postgres")?;

    Ok((pool, queue_cfg.extra_fields))
}

async fn run_start(job_type: String, config_paths: Vec<String>) -> Result<()> {
    let path_refs: Vec<&str> = config_paths.iter().map(String::as_str).collect();
    let loaded = oxen_config::load_layered_yaml(&path_refs)?;
    let queue_cfg = QueueConfig::from_config_json(&loaded.config_json)?;
    queue_cfg.validate()?;

    let processor_cfg = ProcessorConfig::from_config_json(&loaded.config_json, &job_type)?;
    processor_cfg.validate()?;

    let secret = oxen_config::resolve_db_url(&loaded.config_json)?;
    let max_connections =
        oxen_config::resolve_max_connections(&loaded.config_json, std::slice::from_ref(&processor_cfg))?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&secret.url)
        .await
        .context("failed to connect to Postgres")?;
    oxen_db::migrate(&pool).await?;

    let store = oxen_db::Store::new(pool).with_extra_fields(queue_cfg.extra_fields.clone());
    let mut controller = Controller::new(store);

    controller
        .start_processing(ProcessorSpec {
            job_type: job_type.clone(),
            concurrency: processor_cfg.concurrency,
            timeout: processor_cfg.timeout(),
            recover_stuck_jobs: processor_cfg.recover_stuck_jobs,
            recovery_threshold: processor_cfg.recovery_threshold(),
            fastest_polling_rate: queue_cfg.fastest_polling_rate(),
            slowest_polling_rate: queue_cfg.slowest_polling_rate(),
            polling_backoff_rate: queue_cfg.polling_backoff_rate,
            work_fn: Arc::new(EchoWorkFn),
            on_success: Arc::new(NoopSuccessCallback),
            on_error: Arc::new(NoopErrorCallback),
        })
        .await?;

    println!("processing started: job_type={job_type}, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    println!("shutting down, draining in-flight jobs...");
    controller.shutdown().await?;
    println!("stopped cleanly");

    Ok(())
}

/// Echoes the decoded body back as its result. See [`RunCmd::Start`]'s doc
/// comment for why this binary ships a stand-in work function.
struct EchoWorkFn;

#[async_trait]
impl WorkFn for EchoWorkFn {
    async fn call(&self, body: Value, _view: JobView) -> anyhow::Result<Value> {
        Ok(body)
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}