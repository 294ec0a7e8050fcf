mod publisher;
mod timeline;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use publisher::JobPublisher;
use ymm_core::script::save_project_script;
use ymm_core::timeline::DEFAULT_FPS;
use ymm_core::{JobTrigger, RunMode, Script, StepName, StepStateStore, TimelineOperation, WORKFLOW_STEPS};
use ymm_worker::db::{create_pool, PgStore};
use ymm_worker::DatabaseConfig;

#[derive(Parser)]
#[command(name = "ymm")]
#[command(version, about = "YMM pipeline command line tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List pipeline steps in execution order
    Steps,

    /// Publish a job trigger for the workers
    ///
    /// Examples:
    ///     ymm trigger 6f1c...                       # resume
    ///     ymm trigger 6f1c... --mode full           # rerun every step
    ///     ymm trigger 6f1c... --skip publish_upload # never upload
    #[command(verbatim_doc_comment)]
    Trigger {
        /// Job id
        job_id: Uuid,

        /// Run mode
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,

        /// Steps to skip, can be repeated
        #[arg(short, long = "skip", value_name = "STEP")]
        skip: Vec<StepName>,

        /// NATS server URL
        #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
        nats_url: String,

        /// Subject to publish on
        #[arg(long, env = "NATS_SUBJECT")]
        subject: Option<String>,

        /// JetStream stream name
        #[arg(long, env = "NATS_STREAM")]
        stream: Option<String>,
    },

    /// Show step state of a job
    Status {
        /// Job id
        job_id: Uuid,

        /// Emit JSON instead of a table
        #[arg(short, long)]
        json: bool,
    },

    /// Project scripts
    Script {
        #[command(subcommand)]
        command: ScriptCommand,
    },

    /// Timeline editing
    Timeline {
        /// Output root holding the project tree
        #[arg(long, env = "YMM_OUTPUT_ROOT", default_value = "./data", global = true)]
        root: PathBuf,

        #[command(subcommand)]
        command: TimelineCommand,
    },
}

#[derive(Subcommand)]
enum ScriptCommand {
    /// Save a hand-edited script as the project's latest
    Save {
        project: String,
        file: PathBuf,

        /// Output root holding the project tree
        #[arg(long, env = "YMM_OUTPUT_ROOT", default_value = "./data")]
        root: PathBuf,
    },
}

#[derive(Subcommand)]
enum TimelineCommand {
    /// Print the project's timeline, creating it from the script if needed
    Show { project: String },

    /// Move a clip
    Move {
        project: String,
        track: String,
        clip: String,
        /// New start in milliseconds
        start_ms: i64,
    },

    /// Resize a clip
    Resize {
        project: String,
        track: String,
        clip: String,
        /// New duration in milliseconds
        duration_ms: i64,
    },

    /// Set the playback range
    Range {
        project: String,
        in_ms: i64,
        out_ms: i64,
    },

    /// Apply an edit given as JSON, e.g. {"operation":"move",...}
    Apply { project: String, operation: String },

    /// Print renderer props
    Props {
        project: String,

        #[arg(long, default_value_t = DEFAULT_FPS)]
        fps: u32,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Full,
    Resume,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Full => RunMode::Full,
            ModeArg::Resume => RunMode::Resume,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Steps => {
            for (idx, step) in WORKFLOW_STEPS.iter().enumerate() {
                println!(
                    "{:>2}  {:<24} {}",
                    idx + 1,
                    step.as_str(),
                    step.signature_artifact().unwrap_or("-")
                );
            }
        }
        Commands::Trigger {
            job_id,
            mode,
            skip,
            nats_url,
            subject,
            stream,
        } => {
            let trigger = build_trigger(job_id, mode, skip);
            let publisher = JobPublisher::connect(&nats_url, subject.as_deref(), stream.as_deref())
                .await
                .context("Failed to connect to NATS")?;
            publisher.publish(&trigger).await?;
            println!("Triggered job {}", job_id);
        }
        Commands::Status { job_id, json } => {
            show_status(job_id, json).await?;
        }
        Commands::Script { command } => match command {
            ScriptCommand::Save {
                project,
                file,
                root,
            } => {
                let body = tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let script: Script = serde_json::from_slice(&body)
                    .with_context(|| format!("Invalid script in {}", file.display()))?;
                let path = save_project_script(&root, &project, &script).await?;
                println!("Saved {}", path.display());
            }
        },
        Commands::Timeline { root, command } => run_timeline(&root, command).await?,
    }

    Ok(())
}

fn build_trigger(job_id: Uuid, mode: Option<ModeArg>, skip: Vec<StepName>) -> JobTrigger {
    let mut trigger = JobTrigger::new(job_id);
    if let Some(mode) = mode {
        trigger = trigger.with_mode(mode.into());
    }
    skip.into_iter().fold(trigger, JobTrigger::with_skip)
}

async fn show_status(job_id: Uuid, json: bool) -> Result<()> {
    let database = DatabaseConfig::from_env().context("Invalid database configuration")?;
    let pool = create_pool(&database)
        .await
        .with_context(|| format!("Failed to connect to {}", database.display_target()))?;
    let rows = PgStore::new(pool).list_steps(job_id).await?;

    if json {
        print_json(&rows)?;
        return Ok(());
    }

    if rows.is_empty() {
        println!("No steps recorded for job {}", job_id);
        return Ok(());
    }
    for row in rows {
        let note = row
            .skip_reason()
            .map(|r| r.as_str().to_string())
            .or(row.error.clone())
            .unwrap_or_default();
        println!("{:<24} {:<10} {}", row.step_name.as_str(), row.status.as_str(), note);
    }
    Ok(())
}

async fn run_timeline(root: &Path, command: TimelineCommand) -> Result<()> {
    match command {
        TimelineCommand::Show { project } => {
            print_json(&timeline::load(root, &project).await?)?;
        }
        TimelineCommand::Props { project, fps } => {
            print_json(&timeline::render_props(root, &project, fps).await?)?;
        }
        command => {
            let (project, operation) = edit_operation(command)?;
            print_json(&timeline::apply(root, &project, &operation).await?)?;
        }
    }
    Ok(())
}

fn edit_operation(command: TimelineCommand) -> Result<(String, TimelineOperation)> {
    let pair = match command {
        TimelineCommand::Move {
            project,
            track,
            clip,
            start_ms,
        } => (
            project,
            TimelineOperation::Move {
                track_id: track,
                clip_id: clip,
                new_start_ms: start_ms,
            },
        ),
        TimelineCommand::Resize {
            project,
            track,
            clip,
            duration_ms,
        } => (
            project,
            TimelineOperation::Resize {
                track_id: track,
                clip_id: clip,
                new_duration_ms: duration_ms,
            },
        ),
        TimelineCommand::Range {
            project,
            in_ms,
            out_ms,
        } => (project, TimelineOperation::PlaybackRange { in_ms, out_ms }),
        TimelineCommand::Apply { project, operation } => {
            let op = serde_json::from_str(&operation).context("Invalid timeline operation")?;
            (project, op)
        }
        TimelineCommand::Show { .. } | TimelineCommand::Props { .. } => {
            anyhow::bail!("not an edit command")
        }
    };
    Ok(pair)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
