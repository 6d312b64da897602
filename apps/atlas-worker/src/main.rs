//! # Atlas Worker
//!
//! One command per invocation, run by an external scheduler.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  argv ──► Invocation ──► WorkerConfig::load ──► init_tracing            │
//! │                                   │                                     │
//! │                                   ▼                                     │
//! │                     Database::new (migrations run)                      │
//! │                                   │                                     │
//! │          ┌──────────────┬─────────┴──────┬──────────────┐               │
//! │          ▼              ▼                ▼              ▼               │
//! │       refills         audit           resync      value / trial-balance │
//! │          │              │                │              │               │
//! │          └──────────────┴───────┬────────┴──────────────┘               │
//! │                                 ▼                                       │
//! │                        JSON report on stdout                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Exit Status
//! - `0` success
//! - `1` the command failed
//! - `2` `refills` had failed contracts, or `audit` found drift

mod config;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use atlas_db::Database;
use config::WorkerConfig;
use error::{WorkerError, WorkerResult};

const USAGE: &str = "\
Usage: atlas-worker [--config <PATH>] <COMMAND>

Commands:
  refills [--now <DATE|RFC3339>]   Bill every service contract due now
  audit                            Compare item caches with their layers
  resync                           Rewrite drifted item caches
  value <SKU>                      Layer-derived quantity and value of an item
  trial-balance                    Per-account debit and credit totals

Options:
  -c, --config <PATH>   Config file (default: platform config dir/atlas.toml)
  -h, --help            Show this help message";

// =============================================================================
// Command Line
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Refills { now: Option<DateTime<Utc>> },
    Audit,
    Resync,
    Value { sku: String },
    TrialBalance,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: &[String]) -> WorkerResult<Invocation> {
    let mut config_path = None;
    let mut rest = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                let path = args
                    .get(i + 1)
                    .ok_or_else(|| WorkerError::Usage("--config needs a path".into()))?;
                config_path = Some(PathBuf::from(path));
                i += 1;
            }
            "--help" | "-h" => {
                return Ok(Invocation {
                    config_path,
                    command: Command::Help,
                })
            }
            other => rest.push(other),
        }
        i += 1;
    }

    let command = match rest.as_slice() {
        ["refills"] => Command::Refills { now: None },
        ["refills", "--now", when] => Command::Refills {
            now: Some(parse_now(when)?),
        },
        ["audit"] => Command::Audit,
        ["resync"] => Command::Resync,
        ["value", sku] => Command::Value {
            sku: sku.to_string(),
        },
        ["trial-balance"] => Command::TrialBalance,
        [] => return Err(WorkerError::Usage("missing command".into())),
        other => {
            return Err(WorkerError::Usage(format!(
                "unrecognised arguments: {}",
                other.join(" ")
            )))
        }
    };

    Ok(Invocation {
        config_path,
        command,
    })
}

/// Accepts a plain date (midnight UTC) or a full RFC 3339 timestamp.
fn parse_now(value: &str) -> WorkerResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| WorkerError::Usage(format!("--now: not a date or timestamp: {value}")))
}

// =============================================================================
// Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let invocation = match parse_args(&args) {
        Ok(inv) => inv,
        Err(e) => {
            eprintln!("error: {e}\n\n{USAGE}");
            return Ok(ExitCode::from(1));
        }
    };

    if invocation.command == Command::Help {
        println!("{USAGE}");
        return Ok(ExitCode::SUCCESS);
    }

    let config = WorkerConfig::load(invocation.config_path).context("loading configuration")?;
    init_tracing(&config.logging.filter);

    info!(path = %config.database.path.display(), "Opening database");
    let db = Database::new(config.db_config())
        .await
        .context("opening database")?;

    let status = run(&db, invocation.command).await?;
    db.close().await;

    Ok(status)
}

/// Initializes the tracing subscriber for structured logging.
///
/// `RUST_LOG` wins over the configured filter.
fn init_tracing(configured: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(db: &Database, command: Command) -> WorkerResult<ExitCode> {
    match command {
        Command::Refills { now } => {
            let report = db.refills().run_due_refills(now.unwrap_or_else(Utc::now)).await?;
            print_json(&report)?;

            if report.failed.is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                warn!(failed = report.failed.len(), "Some contracts were not billed");
                Ok(ExitCode::from(2))
            }
        }

        Command::Audit => {
            let report = db.auditor().audit().await?;
            print_json(&report)?;

            Ok(if report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }

        Command::Resync => {
            let corrected = db.auditor().resync().await?;
            print_json(&serde_json::json!({ "corrected": corrected }))?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Value { sku } => {
            let item = db
                .items()
                .get_by_sku(&sku)
                .await?
                .ok_or_else(|| WorkerError::UnknownSku(sku.clone()))?;
            let valuation = db.layer_store().value_on_hand(&item.id).await?;
            print_json(&valuation)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::TrialBalance => {
            let tb = db.poster().trial_balance().await?;
            print_json(&tb)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Help => Ok(ExitCode::SUCCESS),
    }
}

fn print_json<T: Serialize>(value: &T) -> WorkerResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        let inv = parse_args(&args(&["audit"])).unwrap();
        assert_eq!(inv.command, Command::Audit);
        assert_eq!(inv.config_path, None);

        let inv = parse_args(&args(&["--config", "/etc/atlas.toml", "value", "RESIN-01"])).unwrap();
        assert_eq!(inv.config_path, Some(PathBuf::from("/etc/atlas.toml")));
        assert_eq!(
            inv.command,
            Command::Value {
                sku: "RESIN-01".to_string()
            }
        );

        let inv = parse_args(&args(&["trial-balance"])).unwrap();
        assert_eq!(inv.command, Command::TrialBalance);
    }

    #[test]
    fn test_parse_refills_now() {
        let inv = parse_args(&args(&["refills", "--now", "2026-01-20"])).unwrap();
        let Command::Refills { now: Some(now) } = inv.command else {
            panic!("expected refills with --now");
        };
        assert_eq!(now.date_naive(), NaiveDate::from_ymd_opt(2026, 1, 20).unwrap());

        let inv = parse_args(&args(&["refills", "--now", "2026-01-20T23:30:00-02:00"])).unwrap();
        let Command::Refills { now: Some(now) } = inv.command else {
            panic!("expected refills with --now");
        };
        // 23:30 at -02:00 is the next day in UTC
        assert_eq!(now.date_naive(), NaiveDate::from_ymd_opt(2026, 1, 21).unwrap());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["value"])).is_err());
        assert!(parse_args(&args(&["refills", "--now", "someday"])).is_err());
        assert!(parse_args(&args(&["--config"])).is_err());
        assert!(parse_args(&args(&["bill-everyone"])).is_err());
    }

    #[test]
    fn test_help_short_circuits() {
        let inv = parse_args(&args(&["audit", "--help"])).unwrap();
        assert_eq!(inv.command, Command::Help);
    }
}
