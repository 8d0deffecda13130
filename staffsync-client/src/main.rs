//! staffsync - assignment and status command-line client
//!
//! Every subcommand runs through the same session the library exposes: the
//! assignment cache in front of the HTTP store, and the status store backed
//! by SQLite. Results are printed as JSON on stdout; logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use staffsync_client::cache::LinkOutcome;
use staffsync_client::rules::TrackedEntity;
use staffsync_client::Session;
use staffsync_common::config::load_config;
use staffsync_common::models::{AssignmentId, AssignmentMeta, AssignmentPatch, AssignmentStatus, StatusValue};
use staffsync_common::time::WeekKey;
use tracing::{error, info};

/// Command-line arguments for staffsync
#[derive(Parser, Debug)]
#[command(name = "staffsync")]
#[command(about = "Person/project assignment sync and status flags")]
#[command(version)]
struct Args {
    /// Config file (overrides STAFFSYNC_CONFIG)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Assignment API base URL (overrides store.base_url)
    #[arg(long, env = "STAFFSYNC_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a person's assignments
    Person {
        key: String,
        #[arg(long)]
        refresh: bool,
    },
    /// List a project's assignments
    Project {
        key: String,
        #[arg(long)]
        refresh: bool,
    },
    /// Link a person to a project
    Link {
        person: String,
        project: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Change fields of an assignment
    Update {
        /// Assignment id
        id: String,
        /// Person owning the assignment, loaded first so both sides stay in sync
        #[arg(long)]
        person: String,
        #[command(flatten)]
        fields: FieldArgs,
        /// Fields to reset to empty
        #[arg(long, value_enum)]
        clear: Vec<ClearField>,
    },
    /// Delete an assignment
    Unlink {
        id: String,
        #[arg(long)]
        person: String,
    },
    /// Set a manual status value (true/false, anything else is a label)
    SetManual {
        entity: String,
        value: String,
        /// Who made the change
        #[arg(long)]
        by: Option<String>,
    },
    /// Drop a manual status value
    ClearManual { entity: String },
    /// Show the status of one entity, or all entries
    Status { entity: Option<String> },
    /// Run the rule engine over tracked entities read from a JSON file
    Evaluate {
        file: PathBuf,
        /// ISO week to evaluate from (YYYY-Www); defaults to the current week
        #[arg(long)]
        week: Option<WeekKey>,
    },
}

#[derive(clap::Args, Debug, Default)]
struct FieldArgs {
    #[arg(long)]
    status: Option<AssignmentStatus>,
    /// Allocation percentage 0-100
    #[arg(long)]
    allocation: Option<u8>,
    #[arg(long)]
    start: Option<NaiveDate>,
    #[arg(long)]
    end: Option<NaiveDate>,
    /// Win probability 0-100 (planned/onHold only)
    #[arg(long)]
    probability: Option<u8>,
    #[arg(long)]
    comment: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ClearField {
    Allocation,
    Start,
    End,
    Probability,
    Comment,
}

impl FieldArgs {
    fn into_meta(self) -> AssignmentMeta {
        AssignmentMeta {
            status: self.status,
            allocation_pct: self.allocation,
            start_date: self.start,
            end_date: self.end,
            probability: self.probability,
            comment: self.comment,
        }
    }

    fn into_patch(self, clear: &[ClearField]) -> AssignmentPatch {
        AssignmentPatch {
            status: self.status,
            allocation_pct: patch_field(self.allocation, clear, ClearField::Allocation),
            start_date: patch_field(self.start, clear, ClearField::Start),
            end_date: patch_field(self.end, clear, ClearField::End),
            probability: patch_field(self.probability, clear, ClearField::Probability),
            comment: patch_field(self.comment, clear, ClearField::Comment),
        }
    }
}

/// Clearing wins over a value given for the same field
fn patch_field<T>(value: Option<T>, clear: &[ClearField], which: ClearField) -> Option<Option<T>> {
    if clear.contains(&which) {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn parse_status_value(raw: &str) -> StatusValue {
    match raw {
        "true" => StatusValue::Flag(true),
        "false" => StatusValue::Flag(false),
        label => StatusValue::Label(label.to_string()),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(base_url) = args.base_url {
        config.store.base_url = base_url;
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting staffsync v{}", env!("CARGO_PKG_VERSION"));

    let session = Session::open(config)
        .await
        .context("Failed to open session")?;

    if let Err(e) = run(&session, args.command).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(session: &Session, command: Command) -> Result<()> {
    let cache = &session.cache;
    let status = &session.status;

    match command {
        Command::Person { key, refresh } => {
            print_json(&cache.get_for_person(&key, refresh).await?)?;
        }
        Command::Project { key, refresh } => {
            print_json(&cache.get_for_project(&key, refresh).await?)?;
        }
        Command::Link {
            person,
            project,
            fields,
        } => {
            cache.get_for_person(&person, false).await?;
            let outcome = cache.link(&person, &project, fields.into_meta()).await?;
            let body = match &outcome {
                LinkOutcome::Existing(id) => json!({ "id": id, "created": false }),
                LinkOutcome::Committed { temp_id, id } => {
                    json!({ "id": id, "tempId": temp_id, "created": true })
                }
            };
            print_json(&body)?;
        }
        Command::Update {
            id,
            person,
            fields,
            clear,
        } => {
            cache.get_for_person(&person, false).await?;
            let id = AssignmentId::new(id);
            cache.update(&id, fields.into_patch(&clear)).await?;
            print_json(&cache.find(&id).await)?;
        }
        Command::Unlink { id, person } => {
            cache.get_for_person(&person, false).await?;
            let id = AssignmentId::new(id);
            cache.unlink(&id).await?;
            print_json(&json!({ "id": id, "removed": true }))?;
        }
        Command::SetManual { entity, value, by } => {
            status
                .set_manual(&entity, parse_status_value(&value), by.as_deref())
                .await?;
            print_json(&json!({ "entity": entity, "entry": status.entry(&entity).await }))?;
        }
        Command::ClearManual { entity } => {
            let cleared = status.clear_manual(&entity).await?;
            print_json(&json!({ "entity": entity, "cleared": cleared }))?;
        }
        Command::Status { entity: Some(entity) } => {
            print_json(&json!({
                "entity": entity,
                "value": status.get(&entity).await,
                "source": status.get_source(&entity).await,
            }))?;
        }
        Command::Status { entity: None } => {
            let entries: std::collections::BTreeMap<_, _> = status.snapshot().await.into_iter().collect();
            print_json(&entries)?;
        }
        Command::Evaluate { file, week } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let entities: Vec<TrackedEntity> = serde_json::from_str(&content)
                .with_context(|| format!("Invalid tracked entities in {}", file.display()))?;
            let week = week.unwrap_or_else(WeekKey::current);
            let report = session.rules.run(&entities, week, status).await;
            print_json(&report)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_value_parsing() {
        assert_eq!(parse_status_value("true"), StatusValue::Flag(true));
        assert_eq!(parse_status_value("false"), StatusValue::Flag(false));
        assert_eq!(parse_status_value("bench"), StatusValue::Label("bench".into()));
    }

    #[test]
    fn test_patch_from_flags() {
        let fields = FieldArgs {
            status: Some(AssignmentStatus::Active),
            allocation: Some(60),
            ..Default::default()
        };
        let patch = fields.into_patch(&[ClearField::Probability]);

        assert_eq!(patch.status, Some(AssignmentStatus::Active));
        assert_eq!(patch.allocation_pct, Some(Some(60)));
        assert_eq!(patch.probability, Some(None));
        assert_eq!(patch.comment, None);
    }

    #[test]
    fn test_cli_parses_evaluate_week() {
        let args = Args::try_parse_from(["staffsync", "evaluate", "team.json", "--week", "2026-W10"]).unwrap();
        match args.command {
            Command::Evaluate { week, .. } => assert_eq!(week, WeekKey::new(2026, 10)),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
