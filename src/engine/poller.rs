use std::collections::HashSet;

use log::{debug, warn};

use crate::alarms::Target;
use crate::api::models::IntercomMessage;
use crate::engine::incoming::{target_for, Lifecycle};
use crate::engine::Services;
use crate::error::Result;
use crate::storage;

/// Totals of one poll cycle, for logging.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub dispatched: usize,
    pub skipped: usize,
    pub withdrawn: usize,
}

/// Fetches the active intercom messages and routes them by type.
pub struct Poller {
    svc: Services,
    lifecycle: Lifecycle,
}

impl Poller {
    pub fn new(svc: Services) -> Self {
        let lifecycle = Lifecycle::new(svc.clone());
        Self { svc, lifecycle }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// One cycle. A failed fetch is returned as is; the next tick retries.
    pub async fn poll(&self) -> Result<PollReport> {
        // Always the full active list: the sweep below needs all of it.
        let items = self.svc.api.list_messages(0).await?;
        let mut report = PollReport::default();
        if items.is_empty() {
            // No sweep here. A record withdrawn upstream goes away when its
            // watch alarm finds it resolved, or when it expires.
            return Ok(report);
        }

        let mut present: HashSet<(Target, String)> = HashSet::new();
        for item in items {
            let msg: IntercomMessage = match serde_json::from_value(item) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("skipping malformed intercom message: {e}");
                    report.skipped += 1;
                    continue;
                }
            };
            let Some(target) = target_for(&msg.message_type) else {
                debug!("ignoring message {} of type {:?}", msg.id, msg.message_type);
                report.skipped += 1;
                continue;
            };
            if msg.id.is_empty() {
                warn!("skipping intercom message without id");
                report.skipped += 1;
                continue;
            }
            present.insert((target, msg.id.clone()));
            match self.lifecycle.handle(&msg).await {
                Ok(sighting) => {
                    debug!("{} {}: {sighting:?}", target.prefix(), msg.id);
                    report.dispatched += 1;
                }
                Err(e) => {
                    warn!("handling {} {}: {e}", target.prefix(), msg.id);
                    report.skipped += 1;
                }
            }
        }

        report.withdrawn = self.sweep(&present).await?;
        Ok(report)
    }

    /// Drop local copies the server no longer lists: their sender withdrew them.
    async fn sweep(&self, present: &HashSet<(Target, String)>) -> Result<usize> {
        let mut withdrawn = 0;
        for target in [Target::InCall, Target::InText] {
            for id in storage::record_ids(self.svc.store.as_ref(), target).await? {
                if present.contains(&(target, id.clone())) {
                    continue;
                }
                debug!("{} {id} withdrawn upstream", target.prefix());
                self.lifecycle.cleanup(target, &id).await?;
                withdrawn += 1;
            }
        }
        Ok(withdrawn)
    }
}
