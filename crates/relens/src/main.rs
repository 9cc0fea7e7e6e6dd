//! Relens launcher.
//!
//! Composition root: builds the SQLite stores, the keyword detector and alias
//! resolver from the rules file, wires them into the job engine, and maps the
//! subcommands onto engine operations. The engine itself never touches the
//! CLI or the pool; everything it needs is handed to it here.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use relens_db::{SqliteJobStore, SqliteRecordStore};
use relens_engine::{EngineConfig, JobEngine};
use relens_protocol::{
    JobId, JobParameters, JobStatus, ReanalysisJob, ToolId, TriggerType, DEFAULT_BATCH_SIZE,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

mod rules;

use rules::{KeywordDetector, RulesAliasResolver, RulesFile};

#[derive(Parser, Debug)]
#[command(name = "relens", about = "Reanalysis job engine for tool-mention records")]
struct Cli {
    /// Path to the SQLite database (default: ~/.relens/relens.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Keyword rules file (tool_id -> keywords + aliases)
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database schema
    InitDb,
    /// Insert synthetic records for demos and local testing
    Seed {
        /// Number of records to insert
        #[arg(long, default_value_t = 100)]
        count: u32,
    },
    /// Create a new reanalysis job (QUEUED)
    Create {
        /// Only records recorded at or after this date (RFC3339 or YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Only records recorded at or before this date (RFC3339 or YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Restrict to these tool ids (repeatable; expanded to alias families)
        #[arg(long = "tool")]
        tools: Vec<String>,
        /// Records per batch (clamped to 1..=1000)
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: u32,
        /// Who asked for this job
        #[arg(long, default_value = "cli")]
        triggered_by: String,
    },
    /// Run a job to a terminal state
    Run {
        /// Job ID
        id: String,
    },
    /// Re-run jobs left RUNNING by an interrupted process
    Resume,
    /// Print the full job document as JSON
    Status {
        /// Job ID
        id: String,
    },
    /// List jobs, newest first
    List {
        /// Filter by status (QUEUED, RUNNING, COMPLETED, FAILED, CANCELLED)
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of jobs to show
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Cancel a QUEUED job
    Cancel {
        /// Job ID
        id: String,
        /// Who is cancelling
        #[arg(long, default_value = "cli")]
        by: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = relens_logging::init_logging("relens", cli.verbose) {
        eprintln!("Failed to initialize logging: {:#}", err);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let db_path = cli
        .db
        .unwrap_or_else(|| relens_logging::relens_home().join("relens.db"));
    let pool = open_pool(&db_path).await?;

    if let Commands::InitDb = cli.command {
        SqliteJobStore::init_schema(&pool).await?;
        SqliteRecordStore::init_schema(&pool).await?;
        println!("Initialized schema at {}", db_path.display());
        return Ok(());
    }

    let rules = match &cli.rules {
        Some(path) => RulesFile::load(path)?,
        None => {
            warn!("No rules file supplied; detector will classify every record as uncategorized");
            RulesFile::default()
        }
    };

    let job_store = Arc::new(SqliteJobStore::new(pool.clone()));
    let record_store = Arc::new(SqliteRecordStore::new(pool.clone()));
    let engine = JobEngine::new(
        job_store,
        record_store.clone(),
        Arc::new(KeywordDetector::from_rules(&rules)),
        Arc::new(RulesAliasResolver::from_rules(&rules)),
        EngineConfig::default(),
    );

    match cli.command {
        Commands::InitDb => unreachable!("handled above"),
        Commands::Seed { count } => seed(&record_store, &rules, count).await,
        Commands::Create {
            from,
            to,
            tools,
            batch_size,
            triggered_by,
        } => {
            let parameters = JobParameters {
                from: from.as_deref().map(parse_bound).transpose()?,
                to: to.as_deref().map(parse_bound).transpose()?,
                target_tool_ids: if tools.is_empty() {
                    None
                } else {
                    Some(tools.iter().map(ToolId::new).collect())
                },
                batch_size,
            }
            .normalized();

            let summary = engine
                .create_job(parameters, TriggerType::Manual, &triggered_by)
                .await?;
            println!(
                "Created job {} ({}): {} records in scope",
                summary.job_id, summary.status, summary.estimated_docs
            );
            Ok(())
        }
        Commands::Run { id } => {
            let job = engine.run_job(&JobId::from_string(id)).await?;
            print_outcome(&job);
            Ok(())
        }
        Commands::Resume => {
            let interrupted = engine.recover_interrupted().await?;
            if interrupted.is_empty() {
                println!("No interrupted jobs");
                return Ok(());
            }
            for id in interrupted {
                info!("Resuming interrupted job {}", id);
                let job = engine.run_job(&id).await?;
                print_outcome(&job);
            }
            Ok(())
        }
        Commands::Status { id } => {
            let job = engine.get_job(&JobId::from_string(id)).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(())
        }
        Commands::List { status, limit } => {
            let status = status
                .as_deref()
                .map(|s| s.parse::<JobStatus>().map_err(anyhow::Error::msg))
                .transpose()?;
            let jobs = engine.list_jobs(status, limit).await?;
            if jobs.is_empty() {
                println!("No jobs");
                return Ok(());
            }
            println!(
                "{:<38} {:<10} {:>8} {:>10} {:>8}  {}",
                "JOB", "STATUS", "TOTAL", "PROCESSED", "PCT", "CREATED"
            );
            for job in jobs {
                println!(
                    "{:<38} {:<10} {:>8} {:>10} {:>7.1}%  {}",
                    job.id,
                    job.status,
                    job.progress.total_count,
                    job.progress.processed_count,
                    job.progress.percentage,
                    job.created_at.to_rfc3339()
                );
            }
            Ok(())
        }
        Commands::Cancel { id, by } => {
            let job = engine.cancel_job(&JobId::from_string(id), &by).await?;
            println!("Cancelled job {} ({})", job.id, job.status);
            Ok(())
        }
    }
}

async fn open_pool(path: &std::path::Path) -> Result<Pool<Sqlite>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", path.display()))
}

/// Insert `count` synthetic records with bodies cycling through the rules
/// vocabulary, so seeded data exercises the detector out of the box.
async fn seed(store: &SqliteRecordStore, rules: &RulesFile, count: u32) -> Result<()> {
    let mut bodies: Vec<String> = rules
        .tools
        .iter()
        .flat_map(|rule| {
            rule.keywords
                .iter()
                .map(|k| format!("Team update: rolled out {} to staging", k))
        })
        .collect();
    bodies.push("Weekly sync notes, nothing tool-related".to_string());

    let now = Utc::now();
    for i in 0..count {
        let body = &bodies[i as usize % bodies.len()];
        let recorded_at = now - chrono::Duration::minutes((count - i) as i64);
        store.insert_record(body, recorded_at).await?;
    }
    println!("Seeded {} records", count);
    Ok(())
}

/// Accepts RFC3339 or a bare date (treated as midnight UTC).
fn parse_bound(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}': expected RFC3339 or YYYY-MM-DD", raw))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .context("Invalid date: no midnight")?;
    Ok(DateTime::from_naive_utc_and_offset(midnight, Utc))
}

fn print_outcome(job: &ReanalysisJob) {
    println!(
        "Job {} {}: {}/{} processed, {} categorized, {} uncategorized, {} errors",
        job.id,
        job.status,
        job.progress.processed_count,
        job.progress.total_count,
        job.statistics.categorized_count,
        job.statistics.uncategorized_count,
        job.statistics.errors_count
    );
    if let Some(first) = job.error_log.first() {
        println!("First error: {}", first.error);
    }
}
