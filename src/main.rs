// src/main.rs

//! newsring CLI: one aggregation cycle per invocation.
//!
//! Scheduling lives outside this binary (cron, CI workflow); a run
//! discovers items, delivers what changed, and commits dedup state.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;

use newsring::delivery::{DeliverySink, DryRunSink, WebhookSink};
use newsring::error::{AppError, Result};
use newsring::models::{Config, Game, Platform};
use newsring::pipeline::{RunFilters, run_cycle};
use newsring::services::{SourceAdapter, create_adapter};
use newsring::storage::StateStore;
use newsring::utils::http::create_client;

const WEBHOOK_ENV: &str = "WEBHOOK_URL_NEWS";
const DEFAULT_STATE_PATH: &str = "news_state.json";

#[derive(Parser, Debug)]
#[command(
    name = "newsring",
    version,
    about = "Aggregates game news feeds and dispatches Discord notifications"
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "data/config.toml")]
    config: String,

    /// State file path (falls back to env NEWS_STATE_PATH)
    #[arg(long)]
    state_file: Option<String>,

    /// Restrict the run to one game (falls back to env ONLY_GAME)
    #[arg(long)]
    game: Option<String>,

    /// Log deliveries without sending or writing state (env DRY_RUN)
    #[arg(long)]
    dry_run: bool,

    /// Only process items updated within the last N hours (env SINCE_HOURS)
    #[arg(long)]
    since_hours: Option<u64>,
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_flag(name: &str) -> bool {
    env_string(name).is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config);
    config.validate()?;

    let only_game = cli
        .game
        .or_else(|| env_string("ONLY_GAME"))
        .map(|name| Game::from_str(&name).map_err(AppError::config))
        .transpose()?;
    let dry_run = cli.dry_run || env_flag("DRY_RUN");
    let since_hours = cli
        .since_hours
        .or_else(|| env_string("SINCE_HOURS").and_then(|value| value.parse().ok()));
    let state_path = cli
        .state_file
        .or_else(|| env_string("NEWS_STATE_PATH"))
        .unwrap_or_else(|| DEFAULT_STATE_PATH.to_string());

    let client = create_client(&config.http)?;

    let sink: Box<dyn DeliverySink> = if dry_run {
        Box::new(DryRunSink)
    } else {
        let webhook_url = env_string(WEBHOOK_ENV)
            .ok_or_else(|| AppError::config(format!("Missing env var {WEBHOOK_ENV}")))?;
        Box::new(WebhookSink::new(client.clone(), webhook_url))
    };

    let mut adapters: HashMap<Platform, Box<dyn SourceAdapter>> = HashMap::new();
    for source in &config.feeds.sources {
        adapters
            .entry(source.platform)
            .or_insert_with(|| create_adapter(source.platform, client.clone(), &config));
    }

    let mut store = StateStore::load(&state_path).await;
    log::info!(
        "Loaded {} state records from {:?}",
        store.len(),
        store.path()
    );

    let filters = RunFilters {
        only_game,
        updated_after: since_hours.map(|hours| Utc::now().timestamp() - (hours as i64) * 3600),
        dry_run,
    };

    let deadline = Duration::from_secs(config.runtime.deadline_secs);
    let summary = tokio::time::timeout(
        deadline,
        run_cycle(&config, &filters, &adapters, sink.as_ref(), &mut store),
    )
    .await
    .map_err(|_| AppError::Deadline(deadline))??;

    log::info!(
        "Cycle complete: {} discovered ({} new, {} modified, {} unchanged), \
         {} delivered, {} skipped, {} failed, {} flagged, {} discovery failures{}",
        summary.discovered,
        summary.new,
        summary.modified,
        summary.unchanged,
        summary.delivered,
        summary.skipped,
        summary.failed,
        summary.flagged,
        summary.discovery_failures,
        if summary.baseline { " [baseline]" } else { "" },
    );

    Ok(())
}
