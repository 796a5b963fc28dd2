//! `toolgate` operator tool
//!
//! Inspects the risk and validation policy, and manages the persisted grant
//! store used by the gateway.

use std::convert::Infallible;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use toolgate_core::config::{self, Config};
use toolgate_core::db::unix_timestamp;
use toolgate_core::risk;
use toolgate_core::tracing_init::{default_filter, init_tracing};
use toolgate_gateway::storage::Database;
use toolgate_gateway::{CallLog, RequestError, RequestValidator, TracingMonitor};

#[derive(Parser, Debug)]
#[command(name = "toolgate")]
#[command(version, about = "toolgate - authorization gateway for agent tool calls")]
struct Args {
    /// Log level filter (e.g. "info", "debug", "warn"). Overrides the config.
    #[arg(long, global = true, env = "TOOLGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON.
    #[arg(long, global = true, env = "TOOLGATE_LOG_JSON")]
    log_json: bool,

    /// Grant store path. Defaults to the configured or platform data path.
    #[arg(long, global = true, env = "TOOLGATE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Project directory holding `.toolgate/settings.json`.
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assess the risk of a tool call under the configured settings.
    Assess {
        operation: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Call arguments as JSON.
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Run call arguments through the request validation pipeline.
    Check {
        channel: String,
        /// Arguments as a JSON array.
        #[arg(long, default_value = "[]")]
        args: String,
    },
    /// List persisted permission records.
    Grants,
    /// Delete a persisted permission record.
    Revoke { provider: String, operation: String },
    /// Add a provider to the persisted trusted list.
    Trust { provider: String },
    /// Remove a provider from the persisted trusted list.
    Untrust { provider: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = config::load_config(args.project_dir.as_deref())?;
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.gateway.log_level.clone());
    init_tracing(
        &default_filter("toolgate_gateway", &level),
        args.log_json || config.gateway.log_json,
    );

    let mut out = io::stdout();
    match args.command {
        Command::Assess {
            operation,
            description,
            args: raw,
        } => {
            let call_args: Value =
                serde_json::from_str(&raw).context("--args must be valid JSON")?;
            let assessment =
                risk::assess(&operation, &description, &call_args, &config.permissions);
            let auto = config.permissions.auto_approve_level.permits(assessment.level);
            writeln!(out, "Risk:    {} (score {})", assessment.level, assessment.score)?;
            writeln!(out, "Reasons: {}", assessment.reasons.join(", "))?;
            writeln!(
                out,
                "Policy:  {} (auto-approve threshold {})",
                if auto { "auto-approve" } else { "escalate" },
                config.permissions.auto_approve_level
            )?;
        }
        Command::Check {
            channel,
            args: raw,
        } => {
            let call_args: Vec<Value> =
                serde_json::from_str(&raw).context("--args must be a JSON array")?;
            let validator = RequestValidator::from_config(
                &config.validation,
                Arc::new(CallLog::new()),
                Arc::new(TracingMonitor),
            );
            let handler = validator.wrap(channel, |_args: Vec<Value>| async {
                Ok::<(), Infallible>(())
            });
            match handler.call(call_args).await {
                Ok(()) => writeln!(out, "ok: admitted on {}", handler.channel())?,
                Err(e) => {
                    match &e {
                        RequestError::SecurityRejected(violation) => {
                            writeln!(out, "rejected: {e} [{}]", violation.kind())?;
                        }
                        _ => writeln!(out, "rejected: {e}")?,
                    }
                    out.flush()?;
                    std::process::exit(2);
                }
            }
        }
        Command::Grants => {
            let db = open_db(args.db_path.as_deref(), &config).await?;
            let records = db.list_permissions().await?;
            if records.is_empty() {
                writeln!(out, "No persisted permissions.")?;
            } else {
                let now = unix_timestamp();
                writeln!(
                    out,
                    "{:<24}  {:<24}  {:<6}  {:<7}  {:<6}  {:<10}",
                    "PROVIDER", "OPERATION", "ACTION", "SCOPE", "RISK", "EXPIRES"
                )?;
                for r in &records {
                    let expires = match r.expires_at {
                        _ if r.decision == toolgate_core::Decision::Deny => "never".to_string(),
                        Some(at) if at <= now => "expired".to_string(),
                        Some(at) => format!("in {}d", (at - now) / 86_400),
                        None => "-".to_string(),
                    };
                    writeln!(
                        out,
                        "{:<24}  {:<24}  {:<6}  {:<7}  {:<6}  {:<10}",
                        r.provider_id,
                        r.operation,
                        r.decision.as_str(),
                        r.scope.as_str(),
                        r.risk_level.as_str(),
                        expires
                    )?;
                }
                writeln!(out, "\n{} record(s)", records.len())?;
            }

            let trusted = db.list_trusted_servers().await?;
            if !trusted.is_empty() {
                let ids: Vec<&str> = trusted.iter().map(|t| t.provider_id.as_str()).collect();
                writeln!(out, "Trusted providers: {}", ids.join(", "))?;
            }
        }
        Command::Revoke {
            provider,
            operation,
        } => {
            let db = open_db(args.db_path.as_deref(), &config).await?;
            if db.delete_permission(&provider, &operation).await? {
                info!(%provider, %operation, "Permission revoked");
                writeln!(out, "Revoked {provider}/{operation}.")?;
            } else {
                writeln!(out, "No permission stored for {provider}/{operation}.")?;
            }
        }
        Command::Trust { provider } => {
            let db = open_db(args.db_path.as_deref(), &config).await?;
            if db.add_trusted_server(&provider).await? {
                writeln!(out, "Trusted {provider}.")?;
            } else {
                writeln!(out, "{provider} is already trusted.")?;
            }
        }
        Command::Untrust { provider } => {
            let db = open_db(args.db_path.as_deref(), &config).await?;
            if db.remove_trusted_server(&provider).await? {
                writeln!(out, "{provider} is no longer trusted.")?;
            } else {
                writeln!(out, "{provider} was not trusted.")?;
            }
        }
    }

    Ok(())
}

async fn open_db(cli_path: Option<&Path>, config: &Config) -> anyhow::Result<Database> {
    let path = cli_path
        .map(Path::to_path_buf)
        .or_else(|| config.database_path())
        .ok_or_else(|| anyhow::anyhow!("Cannot determine database path, pass --db-path"))?;
    info!(path = %path.display(), "Opening grant store");
    Ok(Database::open(&path).await?)
}
