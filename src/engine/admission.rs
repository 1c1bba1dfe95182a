use log::{debug, warn};

use crate::alarms::{Alarm, Target};
use crate::api::models::IntercomMessage;
use crate::engine::Services;
use crate::error::Result;
use crate::popup::{Popup, PopupKind};
use crate::storage::{self, SessionKey, SessionStore};

/// Append a text message to the popup queue unless it is already waiting.
pub async fn enqueue(store: &dyn SessionStore, id: &str) -> Result<()> {
    let mut queue = load_queue(store).await?;
    if !queue.iter().any(|q| q == id) {
        queue.push(id.to_string());
        storage::set_json(store, &SessionKey::MessageQueue, &queue).await?;
    }
    Ok(())
}

pub async fn load_queue(store: &dyn SessionStore) -> Result<Vec<String>> {
    Ok(storage::get_json(store, &SessionKey::MessageQueue)
        .await?
        .unwrap_or_default())
}

/// Caps the number of notification windows on screen. Calls bypass it, only
/// text messages wait here.
pub struct PopupGate {
    svc: Services,
}

impl PopupGate {
    pub fn new(svc: Services) -> Self {
        Self { svc }
    }

    /// One admission pass. Returns how many popups were opened.
    pub async fn admit(&self) -> Result<usize> {
        let open = self.svc.popups.open_count();
        let available = self.svc.timing.max_popups.saturating_sub(open);
        if available < 1 {
            return Ok(0);
        }

        let store = self.svc.store.as_ref();
        let mut queue = load_queue(store).await?;
        let take = available.min(queue.len());
        let mut shown = 0;
        for id in queue.drain(..take).collect::<Vec<_>>() {
            match self.display(&id).await {
                Ok(true) => shown += 1,
                Ok(false) => debug!("queued text {id} is gone"),
                Err(e) => warn!("showing text {id}: {e}"),
            }
        }
        storage::set_json(store, &SessionKey::MessageQueue, &queue).await?;
        Ok(shown)
    }

    async fn display(&self, id: &str) -> Result<bool> {
        let key = SessionKey::Record(Target::InText, id.to_string());
        let stored: Option<IntercomMessage> = storage::get_json(self.svc.store.as_ref(), &key).await?;
        if stored.is_none() {
            return Ok(false);
        }
        self.svc.popups.open(Popup::new(PopupKind::InText, id))?;
        self.svc
            .alarms
            .create(Alarm::watch(Target::InText, id), self.svc.timing.intext_watch_delay());
        Ok(true)
    }
}
