pub mod breaks;
pub mod calibration;
pub mod db;
pub mod models;
pub mod notify;
pub mod pose_source;
pub mod posture;
pub mod session;
pub mod settings;
pub mod stats;
pub mod sync;
mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use db::Database;
use models::daily_stats::format_hms;
use notify::{LogNotifier, NoopNotifier, NotificationSink};
use pose_source::pose_channel;
use session::{
    commands::{handle_command, parse_command},
    SessionController,
};
use settings::SettingsStore;
use sync::RemoteSync;

const DATA_DIR_ENV: &str = "POSTUREWATCH_DATA_DIR";
const QUIET_ENV: &str = "POSTUREWATCH_QUIET";
const DEFAULT_DATA_DIR: &str = "posturewatch-data";
const HISTORY_DAYS: usize = 7;

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("posturewatch starting up...");

    let result = tokio::runtime::Runtime::new()
        .context("failed to start tokio runtime")
        .and_then(|runtime| runtime.block_on(serve()));

    if let Err(err) = result {
        error!("posturewatch exited with an error: {err:#}");
        std::process::exit(1);
    }
}

fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

fn notifier() -> Arc<dyn NotificationSink> {
    let quiet = std::env::var(QUIET_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if quiet {
        Arc::new(NoopNotifier)
    } else {
        Arc::new(LogNotifier)
    }
}

async fn serve() -> Result<()> {
    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let database = Database::new(data_dir.join("posturewatch.sqlite3"))?;
    let settings = Arc::new(SettingsStore::new(data_dir.join("settings.json"))?);

    match database.list_daily_stats(HISTORY_DAYS).await {
        Ok(days) => {
            for day in days {
                info!(
                    "{}: tracked {} good {} no-pose {} quality {:.0}% alerts {}",
                    day.date_key,
                    format_hms(day.total_ms),
                    format_hms(day.good_ms),
                    format_hms(day.unknown_ms()),
                    day.quality_pct(),
                    day.alert_count
                );
            }
        }
        Err(err) => warn!("failed to read stats history: {err:#}"),
    }

    let remote = RemoteSync::from_settings(&settings.current());
    let (feed, source) = pose_channel();
    let controller = SessionController::new(
        database,
        settings,
        remote,
        notifier(),
        Box::new(source),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let command = match parse_command(&line, Utc::now()) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("error: {err:#}");
                continue;
            }
        };

        match handle_command(&controller, &feed, command).await {
            Ok(Some(reply)) => println!("{reply}"),
            Ok(None) => {}
            Err(err) => println!("error: {err}"),
        }
    }

    if controller.is_active().await {
        info!("input closed; stopping session");
        controller.stop_session().await?;
    }
    Ok(())
}
