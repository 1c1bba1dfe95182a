mod alarms;
mod api;
mod app;
mod engine;
mod error;
mod popup;
mod storage;
mod utils;
mod worker;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::alarms::TokioScheduler;
use crate::api::client::ApiClient;
use crate::api::events::IncomingEvent;
use crate::app::AppState;
use crate::engine::Services;
use crate::popup::ProcessNotifier;
use crate::storage::SqliteSessionStore;
use crate::utils::RUNTIME;
use crate::worker::Worker;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = RUNTIME.block_on(run()) {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> error::Result<()> {
    let state = AppState::load();
    info!("backend {} with key {}", state.base_url, state.masked_key());

    let api = ApiClient::new(&state.base_url, &state.private_key)?;
    let (scheduler, fired) = TokioScheduler::new();
    let svc = Services {
        store: Arc::new(SqliteSessionStore::open()?),
        api: Arc::new(api),
        alarms: Arc::new(scheduler),
        popups: Arc::new(ProcessNotifier::new(state.launcher.clone())),
        timing: state.timing.clone(),
    };

    let (tx, events) = mpsc::unbounded_channel();
    tokio::spawn(read_events(tx));

    Worker::new(svc).run(fired, events).await;
    Ok(())
}

/// Local requests, one JSON object per line on stdin.
async fn read_events(tx: mpsc::UnboundedSender<IncomingEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match IncomingEvent::parse(&line) {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("ignoring local event {line:?}: {e}"),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("reading local events: {e}");
                break;
            }
        }
    }
}
