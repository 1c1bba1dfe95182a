use std::sync::Arc;

use log::{debug, warn};

use crate::api::client::Intercom;

/// Heartbeat telling contacts we are around. Fire and forget.
pub struct Presence {
    api: Arc<dyn Intercom>,
}

impl Presence {
    pub fn new(api: Arc<dyn Intercom>) -> Self {
        Self { api }
    }

    pub async fn ping(&self) -> bool {
        match self.api.ping().await {
            Ok(()) => {
                debug!("presence updated");
                true
            }
            Err(e) => {
                warn!("ping failed: {e}");
                false
            }
        }
    }
}
