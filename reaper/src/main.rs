//! Command-line entry point: one reaper run against the deployment API.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use deploy_reaper::config::ReaperConfig;
use deploy_reaper::observability::{init_tracing, LogFormat};
use deploy_reaper::reaper::{NowClient, Reaper};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "deploy-reaper")]
#[command(version)]
#[command(about = "Removes deployments stuck in a failed state past the retention window", long_about = None)]
struct Args {
    /// Maximum deployments processed at once
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Days a deployment may stay in a failed state
    #[arg(short, long)]
    retention_days: Option<i64>,

    /// Base URL of the deployment API
    #[arg(long)]
    api_url: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let now = Utc::now();
    let args = Args::parse();

    let format = if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(format).context("failed to install tracing subscriber")?;

    let mut config = ReaperConfig::from_env()?;
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(days) = args.retention_days {
        config = config.with_retention_days(days);
    }
    if let Some(url) = args.api_url {
        config = config.with_api_base_url(url);
    }
    config.validate_with_token()?;

    let api = Arc::new(NowClient::new(&config)?);
    let reaper = Reaper::new(api, config);

    match reaper.run(now).await {
        Ok(report) => {
            info!(
                found = report.found,
                removed = report.removed.len(),
                failed = report.failures.len(),
                duration_ms = report.summary.duration_ms,
                "Reaper run finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Reaper run aborted");
            Err(e.into())
        }
    }
}
