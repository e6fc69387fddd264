//! Greenlight - auto-approval policy engine for code-execution jobs
//!
//! `greenlight run` hosts the decision engine against a spool-directory job
//! queue; the remaining subcommands are the administrative surface for the
//! allowlist, the trusted-code registry, the captured history, and the
//! decision audit log.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use greenlight_core::engine::{DecisionEngine, EngineConfig};
use greenlight_core::signature::short;
use greenlight_core::source::fs_queue::FsQueueSource;
use greenlight_core::store::{Allowlist, HistoryStore, RecordStore, TrustedCodeStore};

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "greenlight",
    about = "Auto-approval policy engine for code-execution jobs",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Data directory for trust and history records
    /// (defaults to the platform data dir, e.g. ~/.local/share/greenlight)
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Seed email written when the allowlist is found empty
    #[clap(long, global = true, default_value = "admin@localhost")]
    default_sender: String,

    /// Log level
    #[clap(long, global = true, value_enum, default_value = "info")]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the auto-approval engine loop
    Run {
        /// Root of the spool-directory job queue
        /// (pending/, approved/, completed/)
        #[clap(long)]
        queue_dir: PathBuf,

        /// This operator's email, used for labeling approvals
        #[clap(long)]
        operator_email: String,

        /// Seconds between pending-job evaluation cycles
        #[clap(long, default_value_t = 1)]
        poll_interval: u64,

        /// Seconds between allowlist refreshes
        #[clap(long, default_value_t = 30)]
        allowlist_refresh_interval: u64,

        /// Seconds between completed-job history captures
        #[clap(long, default_value_t = 10)]
        history_capture_interval: u64,

        /// Days of decision-log retention
        #[clap(long, default_value_t = 30)]
        keep_days: i64,
    },

    /// Manage the trusted-sender allowlist
    #[clap(subcommand)]
    Allowlist(AllowlistCommand),

    /// Manage trusted code patterns
    #[clap(subcommand)]
    Trusted(TrustedCommand),

    /// Show captured job history (promotion candidates)
    History {
        /// Maximum records to show
        #[clap(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show the decision audit log
    Decisions {
        /// Maximum records to show
        #[clap(long, default_value_t = 20)]
        limit: usize,
    },

    /// Prune decision records older than the retention window
    Prune {
        /// Days of decision-log retention
        #[clap(long, default_value_t = 30)]
        keep_days: i64,
    },
}

#[derive(Subcommand, Debug)]
enum AllowlistCommand {
    /// Show all trusted senders
    List,
    /// Trust a sender (idempotent)
    Add { email: String },
    /// Stop trusting a sender (idempotent)
    Remove { email: String },
}

#[derive(Subcommand, Debug)]
enum TrustedCommand {
    /// Show all trusted code patterns, most recently marked first
    List,
    /// Promote a job from history to trusted code by signature
    Mark { signature: String },
    /// Demote a trusted code pattern (idempotent)
    Unmark { signature: String },
}

#[derive(Tabled)]
struct AllowlistRow {
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Added")]
    added_at: String,
}

#[derive(Tabled)]
struct TrustedRow {
    #[tabled(rename = "Signature")]
    signature: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Requester")]
    requester: String,
    #[tabled(rename = "Marked")]
    trusted_at: String,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Signature")]
    signature: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Requester")]
    requester: String,
    #[tabled(rename = "Files")]
    files: usize,
    #[tabled(rename = "Stored")]
    stored_at: String,
}

#[derive(Tabled)]
struct DecisionRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Decided")]
    decided_at: String,
}

fn init_logging(level: &LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_filter_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn resolve_data_dir(override_dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir);
    }
    let dirs = directories::ProjectDirs::from("", "", "greenlight")
        .context("could not determine a platform data directory; pass --data-dir")?;
    Ok(dirs.data_dir().to_path_buf())
}

fn print_table<R: Tabled>(rows: Vec<R>) {
    if rows.is_empty() {
        println!("(none)");
        return;
    }
    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));
    println!("{table}");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let data_dir = resolve_data_dir(cli.data_dir)?;
    let store = RecordStore::new(&data_dir);

    match cli.command {
        Command::Run {
            queue_dir,
            operator_email,
            poll_interval,
            allowlist_refresh_interval,
            history_capture_interval,
            keep_days,
        } => {
            info!("data directory: {}", data_dir.display());
            info!("job queue: {}", queue_dir.display());

            let source = Arc::new(FsQueueSource::new(&queue_dir, operator_email.clone()));
            let mut config = EngineConfig::new(operator_email, cli.default_sender);
            config.poll_interval = Duration::from_secs(poll_interval.max(1));
            config.allowlist_refresh_interval = Duration::from_secs(allowlist_refresh_interval);
            config.history_capture_interval = Duration::from_secs(history_capture_interval);
            config.decision_keep_days = keep_days;

            let mut engine = DecisionEngine::new(&store, source, config);
            engine.run().await
        }

        Command::Allowlist(command) => {
            let allowlist = Allowlist::new(&store, cli.default_sender);
            match command {
                AllowlistCommand::List => {
                    let mut rows = Vec::new();
                    for email in allowlist.list()? {
                        let entry = allowlist.entry(&email)?;
                        rows.push(AllowlistRow {
                            email: entry.email,
                            added_at: entry.added_at.to_rfc3339(),
                        });
                    }
                    print_table(rows);
                }
                AllowlistCommand::Add { email } => {
                    allowlist.add(&email)?;
                    println!("Trusted sender: {email}");
                }
                AllowlistCommand::Remove { email } => {
                    allowlist.remove(&email)?;
                    println!("Removed sender: {email}");
                }
            }
            Ok(())
        }

        Command::Trusted(command) => {
            let trusted = TrustedCodeStore::new(&store);
            match command {
                TrustedCommand::List => {
                    let rows = trusted
                        .list()?
                        .into_iter()
                        .map(|p| TrustedRow {
                            signature: short(&p.signature).to_string(),
                            name: p.name,
                            requester: p.requester_email,
                            trusted_at: p.trusted_at.to_rfc3339(),
                        })
                        .collect();
                    print_table(rows);
                }
                TrustedCommand::Mark { signature } => {
                    let history = HistoryStore::new(&store);
                    let pattern = trusted.mark(&history, &signature)?;
                    println!(
                        "Marked '{}' ({}) as trusted code",
                        pattern.name,
                        short(&pattern.signature)
                    );
                }
                TrustedCommand::Unmark { signature } => {
                    trusted.unmark(&signature)?;
                    println!("Unmarked {}", short(&signature));
                }
            }
            Ok(())
        }

        Command::History { limit } => {
            let rows = HistoryStore::new(&store)
                .list(Some(limit))?
                .into_iter()
                .map(|r| HistoryRow {
                    signature: short(&r.signature).to_string(),
                    name: r.name,
                    requester: r.requester_email,
                    files: r.code_files.len(),
                    stored_at: r.stored_at.to_rfc3339(),
                })
                .collect();
            print_table(rows);
            Ok(())
        }

        Command::Decisions { limit } => {
            let rows = HistoryStore::new(&store)
                .decisions(Some(limit))?
                .into_iter()
                .map(|d| DecisionRow {
                    action: d.action.to_string(),
                    target: d.target,
                    reason: d.reason,
                    decided_at: d.decided_at.to_rfc3339(),
                })
                .collect();
            print_table(rows);
            Ok(())
        }

        Command::Prune { keep_days } => {
            let removed = HistoryStore::new(&store).prune(keep_days)?;
            println!("Pruned {removed} decision record(s) older than {keep_days} day(s)");
            Ok(())
        }
    }
}
