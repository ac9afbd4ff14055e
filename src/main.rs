use anyhow::{Result, anyhow};
use chrono::{FixedOffset, Utc};
use log::{info, warn};
use signalscan::config::AppConfig;
use signalscan::notify::LogNotifier;
use signalscan::scanner::Scanner;
use signalscan::source::{CachedSession, DirectorySource, EnvTokenIssuer};
use std::env;
use tokio::time::{Duration, interval};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger with default info level if RUST_LOG not set
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();
    info!("Starting signal scanner");

    // Config file from the first non-flag argument, `--once` runs a single cycle
    let args: Vec<String> = env::args().skip(1).collect();
    let once = args.iter().any(|a| a == "--once");
    let config_file = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .map(String::as_str)
        .unwrap_or("config.json");

    info!("Loading configuration from: {}", config_file);
    let config = AppConfig::load_from_file(config_file)?;

    let mut source = DirectorySource::new(&config.source.directory, &config.source.file_prefix);
    if let Some(variable) = &config.source.token_env {
        let issuer = EnvTokenIssuer {
            variable: variable.clone(),
            lifetime: chrono::Duration::seconds(config.source.token_lifetime_secs),
        };
        source = source.with_session(Box::new(CachedSession::new(issuer)));
    }

    let offset = FixedOffset::east_opt(config.source.utc_offset_hours * 3600)
        .ok_or_else(|| anyhow!("Invalid UTC offset {}h", config.source.utc_offset_hours))?;
    let replay_date = config.source.replay_date.clone();
    let replay_times = config.source.replay_times.clone();
    let poll_secs = config.source.poll_interval_secs.max(1);

    let notifier = LogNotifier::new(config.report.format);
    let mut scanner = Scanner::new(config, source, notifier)?;

    if let Some(date) = replay_date {
        info!("Replaying {} snapshot(s) for {}", replay_times.len(), date);
        for time in &replay_times {
            scanner.poll(&date, time);
        }
        return Ok(());
    }

    let mut ticker = interval(Duration::from_secs(poll_secs));
    let mut last_key: Option<(String, String)> = None;

    info!("Polling every {}s", poll_secs);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now().with_timezone(&offset);
                let key = (now.format("%Y%m%d").to_string(), now.format("%H%M").to_string());
                if last_key.as_ref() == Some(&key) {
                    continue;
                }

                if scanner.poll(&key.0, &key.1) {
                    last_key = Some(key);
                    if once {
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, shutting down");
                break;
            }
        }
    }

    Ok(())
}
