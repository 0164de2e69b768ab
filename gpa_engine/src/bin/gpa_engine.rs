use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gpa_engine::config::{EngineConfig, load_config_path};
use gpa_engine::dispatch::{Dispatcher, JobMessage, execute, parse_messages};
use gpa_engine::filter::{RankFilter, RecomputeFilter};
use gpa_engine::logging::init_logging;
use gpa_engine::store::SqliteStore;

#[derive(Parser)]
#[command(version, about = "GPA/CPA recompute and ranking")]
struct Cli {
    /// TOML config file; defaults apply when omitted.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply pending schema migrations.
    Migrate,
    /// Recompute term GPA and CPA for the selected scores.
    Recompute(RecomputeArgs),
    /// Recompute CPA ranks from stored values.
    Rerank(RerankArgs),
    /// Run queued job messages (one JSON object per line) on a worker.
    Worker {
        #[arg(long, value_name = "FILE")]
        messages: PathBuf,
    },
}

#[derive(Args)]
struct RecomputeArgs {
    #[arg(long = "term", value_name = "ID")]
    term_id: Option<String>,
    #[arg(long = "program", value_name = "ID")]
    program_id: Option<String>,
    #[arg(long = "school", value_name = "ID")]
    school_id: Option<String>,
}

#[derive(Args)]
struct RerankArgs {
    #[arg(long = "grade", value_name = "ID")]
    grade_id: Option<String>,
    #[arg(long = "program", value_name = "ID")]
    program_id: Option<String>,
    #[arg(long = "school", value_name = "ID")]
    school_id: Option<String>,
    #[arg(long = "student", value_name = "ID")]
    student_id: Option<String>,
}

fn load(path: Option<&Path>) -> Result<EngineConfig> {
    let mut cfg = match path {
        Some(p) => load_config_path(p)?,
        None => EngineConfig::default(),
    };
    cfg.apply_env();
    cfg.validate()?;
    Ok(cfg)
}

fn run_once(cfg: &EngineConfig, message: JobMessage) -> Result<()> {
    let mut store = SqliteStore::open(&cfg.database_url)?;
    let summary = execute(&mut store, &message, &cfg.engine)?;
    println!("{summary}");
    Ok(())
}

fn run_worker(cfg: &EngineConfig, messages: &Path) -> Result<()> {
    let input = std::fs::read_to_string(messages)
        .with_context(|| format!("reading {}", messages.display()))?;
    let messages = parse_messages(&input)?;

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let url = cfg.database_url.clone();
        let (dispatcher, worker) = Dispatcher::spawn(
            move || SqliteStore::open(&url),
            cfg.engine.clone(),
            cfg.dispatch.queue_capacity,
        );
        for message in messages {
            let ack = dispatcher.submit(message).await?;
            println!("queued {}", ack.job_id);
        }
        drop(dispatcher);
        anyhow::Ok(worker.join().await)
    })?;

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(summary) => println!("{} ok: {summary}", outcome.job_id),
            Err(e) => println!("{} failed: {e}", outcome.job_id),
        }
    }
    if report.failed > 0 {
        anyhow::bail!("{} of {} jobs failed", report.failed, report.outcomes.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load(cli.config.as_deref())?;
    init_logging(&cfg.logging)?;

    match cli.cmd {
        Cmd::Migrate => gpa_engine::db::migrate::run_all(&cfg.database_url)?,
        Cmd::Recompute(a) => run_once(
            &cfg,
            JobMessage::Recompute(RecomputeFilter {
                term_id: a.term_id,
                program_id: a.program_id,
                school_id: a.school_id,
            }),
        )?,
        Cmd::Rerank(a) => run_once(
            &cfg,
            JobMessage::Rerank(RankFilter {
                grade_id: a.grade_id,
                program_id: a.program_id,
                school_id: a.school_id,
                student_id: a.student_id,
            }),
        )?,
        Cmd::Worker { messages } => run_worker(&cfg, &messages)?,
    }

    Ok(())
}
