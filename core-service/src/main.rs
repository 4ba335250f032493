//! GiftShield - batch entry point
//!
//! Reads newline-delimited JSON webhook events from a file (or stdin), feeds
//! them through the defense pipeline and prints a status report as JSON.
//!
//! ```text
//! giftshield [events.ndjson] [--regression]
//! ```

use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use giftshield_core::api;
use giftshield_core::constants::{env_string, APP_NAME, APP_VERSION};
use giftshield_core::logic::config::RuntimeConfig;
use giftshield_core::{DefenseContext, DefenseResult};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting {} v{}...", APP_NAME, APP_VERSION);

    if let Err(e) = run().await {
        log::error!("{} failed: {}", APP_NAME, e);
        std::process::exit(1);
    }
}

async fn run() -> DefenseResult<()> {
    let mut input: Option<PathBuf> = None;
    let mut regression = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--regression" => regression = true,
            other => input = Some(PathBuf::from(other)),
        }
    }

    let ctx = DefenseContext::new(load_config()?);
    let channels = ctx.pipeline.dispatcher().channel_names();
    log::info!("Alert channels: {}", channels.join(", "));

    let processed = match input {
        Some(path) => {
            log::info!("Reading events from {}", path.display());
            let file = tokio::fs::File::open(&path).await?;
            ingest(&ctx, BufReader::new(file)).await?
        }
        None => ingest(&ctx, BufReader::new(tokio::io::stdin())).await?,
    };
    log::info!("Processed {} events", processed);

    if regression {
        let executions = ctx.replay.run_scheduled_regression().await?;
        log::info!("Regression finished: {} scenarios replayed", executions.len());
        match ctx.learning.run_training_session(None, true) {
            Ok(session) => log::info!(
                "Training: {} rules generated, {} applied",
                session.rules_generated.len(),
                session.rules_applied.len()
            ),
            Err(e) => log::warn!("Training skipped: {}", e),
        }
    }

    let report = serde_json::json!({
        "status": api::get_engine_status(&ctx),
        "signals": api::get_signal_stats(&ctx),
        "threats": api::get_threat_stats(&ctx),
        "responses": api::get_response_stats(&ctx),
        "alerts": api::get_dispatch_stats(&ctx),
        "replay": api::get_replay_stats(&ctx),
        "learning": api::get_learning_stats(&ctx),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// `GIFTSHIELD_CONFIG` file when set, otherwise defaults with env overrides
fn load_config() -> DefenseResult<RuntimeConfig> {
    match env_string("GIFTSHIELD_CONFIG") {
        Some(path) => RuntimeConfig::load(&PathBuf::from(path)),
        None => {
            let default_path = RuntimeConfig::default_path();
            if default_path.exists() {
                RuntimeConfig::load(&default_path)
            } else {
                Ok(RuntimeConfig::from_env())
            }
        }
    }
}

async fn ingest<R: AsyncBufRead + Unpin>(ctx: &DefenseContext, reader: R) -> DefenseResult<usize> {
    let mut lines = reader.lines();
    let mut processed = 0;
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let payload: serde_json::Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Line {}: invalid JSON: {}", line_no, e);
                continue;
            }
        };
        match api::ingest_event(ctx, &payload).await {
            Ok(outcome) => {
                processed += 1;
                if !outcome.responses.is_empty() {
                    log::info!(
                        "Event {} -> {} signals, {} responses",
                        outcome.event_id,
                        outcome.signals.len(),
                        outcome.responses.len()
                    );
                }
            }
            Err(e) => log::warn!("Line {}: {}", line_no, e),
        }
    }
    Ok(processed)
}
