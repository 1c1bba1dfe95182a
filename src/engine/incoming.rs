use chrono::Utc;
use log::{debug, warn};

use crate::alarms::{Alarm, Target};
use crate::api::models::{IntercomMessage, MessageStatus, MessageType};
use crate::engine::admission;
use crate::engine::Services;
use crate::error::{Error, Result};
use crate::popup::{Popup, PopupKind};
use crate::storage::{self, SessionKey};

/// What a delivery of an incoming message led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    /// Already stored, only the stored copy was refreshed.
    Repeat,
    /// First sighting of a call: popup opened right away.
    Shown,
    /// First sighting of a text: waiting for a free popup slot.
    Queued,
    /// First sighting, but resolved elsewhere or already expired.
    Discarded,
}

/// Store-or-skip and expiry of incoming calls, phone calls and texts.
pub struct Lifecycle {
    svc: Services,
}

pub fn target_for(message_type: &MessageType) -> Option<Target> {
    match message_type {
        MessageType::Call | MessageType::Phone => Some(Target::InCall),
        MessageType::Text => Some(Target::InText),
        MessageType::Other(_) => None,
    }
}

impl Lifecycle {
    pub fn new(svc: Services) -> Self {
        Self { svc }
    }

    pub async fn handle(&self, msg: &IntercomMessage) -> Result<Sighting> {
        if msg.id.is_empty() {
            return Err(Error::Missing("message id"));
        }
        let target = target_for(&msg.message_type).ok_or(Error::Missing("known message type"))?;
        let store = self.svc.store.as_ref();
        let key = SessionKey::Record(target, msg.id.clone());

        // Checked before the upsert: only the first delivery starts anything.
        let known = storage::contains(store, &key).await?;
        storage::set_json(store, &key, msg).await?;
        if known {
            return Ok(Sighting::Repeat);
        }
        self.start(target, msg).await
    }

    async fn start(&self, target: Target, msg: &IntercomMessage) -> Result<Sighting> {
        let expiry = match target {
            Target::InText => self.svc.timing.intext_expiry(),
            _ => self.svc.timing.incall_expiry(),
        };
        self.svc.alarms.create(Alarm::cleanup(target, &msg.id), expiry);

        if msg.status != MessageStatus::None {
            debug!("{} {} already {}", target.prefix(), msg.id, msg.status);
            self.cleanup(target, &msg.id).await?;
            return Ok(Sighting::Discarded);
        }
        if msg.is_expired_at(Utc::now()) {
            debug!("{} {} expired before it was seen", target.prefix(), msg.id);
            self.cleanup(target, &msg.id).await?;
            return Ok(Sighting::Discarded);
        }

        match target {
            Target::InText => {
                admission::enqueue(self.svc.store.as_ref(), &msg.id).await?;
                Ok(Sighting::Queued)
            }
            _ => {
                let kind = PopupKind::for_message(&msg.message_type).unwrap_or(PopupKind::InCall);
                self.svc.popups.open(Popup::new(kind, &msg.id))?;
                self.svc
                    .alarms
                    .create(Alarm::watch(target, &msg.id), self.svc.timing.incall_watch());
                Ok(Sighting::Shown)
            }
        }
    }

    /// Forget a message locally. Safe to call any number of times.
    pub async fn cleanup(&self, target: Target, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::Missing("message id"));
        }
        storage::remove(self.svc.store.as_ref(), &SessionKey::Record(target, id.to_string())).await?;
        // Also reached directly, before the alarm fired.
        self.svc.alarms.clear(&Alarm::cleanup(target, id));
        self.svc.alarms.clear(&Alarm::watch(target, id));
        for kind in popup_kinds(target) {
            self.svc.popups.close(&Popup::new(*kind, id));
        }
        Ok(())
    }

    /// The user answered an incoming call from its popup.
    pub async fn answer_call(&self, id: &str, status: MessageStatus) -> Result<()> {
        let key = SessionKey::Record(Target::InCall, id.to_string());
        let stored: Option<IntercomMessage> = storage::get_json(self.svc.store.as_ref(), &key).await?;
        self.svc.api.set_status(id, &status).await?;
        if status == MessageStatus::Accepted {
            match stored.as_ref().and_then(IntercomMessage::call_url) {
                Some(url) => self.svc.popups.open_tab(url)?,
                None => warn!("accepted call {id} has no url"),
            }
        }
        self.cleanup(Target::InCall, id).await
    }

    /// The user read a text from its popup.
    pub async fn mark_seen(&self, id: &str) -> Result<()> {
        self.svc.api.set_status(id, &MessageStatus::Seen).await?;
        self.cleanup(Target::InText, id).await
    }

    /// Re-check an open popup against the backend. Returns whether the popup
    /// is still being watched.
    pub async fn watch(&self, target: Target, id: &str) -> Result<bool> {
        let period = match target {
            Target::InText => self.svc.timing.intext_watch(),
            _ => self.svc.timing.incall_watch(),
        };
        let still_open = match self.svc.api.get_message(id).await {
            Ok(Some(msg)) => msg.status == MessageStatus::None && !msg.is_expired_at(Utc::now()),
            Ok(None) => false,
            Err(e) => {
                // No answer is not a verdict, look again later.
                warn!("watching {} {id}: {e}", target.prefix());
                true
            }
        };
        if still_open {
            self.svc.alarms.create(Alarm::watch(target, id), period);
        } else {
            self.cleanup(target, id).await?;
        }
        Ok(still_open)
    }
}

fn popup_kinds(target: Target) -> &'static [PopupKind] {
    match target {
        Target::InCall => &[PopupKind::InCall, PopupKind::InPhone],
        Target::InText => &[PopupKind::InText],
        Target::OutCall => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::admission::load_queue;
    use crate::storage::SessionStore;
    use crate::testing::{message, Harness};

    fn lifecycle(h: &Harness) -> Lifecycle {
        Lifecycle::new(h.services())
    }

    #[tokio::test]
    async fn first_call_opens_one_popup() {
        let h = Harness::new();
        let engine = lifecycle(&h);
        let msg = message("m1", "call", "none", 60);

        assert_eq!(engine.handle(&msg).await.unwrap(), Sighting::Shown);
        assert_eq!(engine.handle(&msg).await.unwrap(), Sighting::Repeat);

        assert_eq!(h.popups.opened(), vec![Popup::new(PopupKind::InCall, "m1")]);
        assert!(h.store.get("incall-m1").await.unwrap().is_some());
        assert!(h.alarms.is_pending(&Alarm::cleanup(Target::InCall, "m1")));
        assert_eq!(
            h.alarms.delay_of(&Alarm::cleanup(Target::InCall, "m1")),
            Some(h.timing().incall_expiry())
        );
    }

    #[tokio::test]
    async fn phone_call_uses_phone_popup_and_incall_key() {
        let h = Harness::new();
        let msg = message("p1", "phone", "none", 60);
        assert_eq!(lifecycle(&h).handle(&msg).await.unwrap(), Sighting::Shown);
        assert_eq!(h.popups.opened(), vec![Popup::new(PopupKind::InPhone, "p1")]);
        assert!(h.store.get("incall-p1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn repeat_delivery_refreshes_stored_copy() {
        let h = Harness::new();
        let engine = lifecycle(&h);
        engine.handle(&message("m1", "text", "none", 60)).await.unwrap();
        let mut updated = message("m1", "text", "none", 60);
        updated.contact_name = Some("Renamed".into());
        assert_eq!(engine.handle(&updated).await.unwrap(), Sighting::Repeat);

        let stored: IntercomMessage = storage::get_json(
            h.store.as_ref(),
            &SessionKey::Record(Target::InText, "m1".into()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stored.contact_name.as_deref(), Some("Renamed"));
        assert_eq!(load_queue(h.store.as_ref()).await.unwrap(), vec!["m1"]);
    }

    #[tokio::test]
    async fn first_text_is_queued_not_shown() {
        let h = Harness::new();
        let msg = message("m1", "text", "none", 3600);
        assert_eq!(lifecycle(&h).handle(&msg).await.unwrap(), Sighting::Queued);
        assert!(h.popups.opened().is_empty());
        assert!(h.store.get("intext-m1").await.unwrap().is_some());
        assert_eq!(load_queue(h.store.as_ref()).await.unwrap(), vec!["m1"]);
        assert_eq!(
            h.alarms.delay_of(&Alarm::cleanup(Target::InText, "m1")),
            Some(h.timing().intext_expiry())
        );
    }

    #[tokio::test]
    async fn resolved_elsewhere_is_cleaned_up_at_once() {
        let h = Harness::new();
        let msg = message("m1", "call", "accepted", 60);
        assert_eq!(lifecycle(&h).handle(&msg).await.unwrap(), Sighting::Discarded);
        assert!(h.popups.opened().is_empty());
        assert_eq!(h.store.get("incall-m1").await.unwrap(), None);
        assert!(!h.alarms.is_pending(&Alarm::cleanup(Target::InCall, "m1")));
    }

    #[tokio::test]
    async fn expired_on_arrival_is_cleaned_up_at_once() {
        let h = Harness::new();
        let msg = message("t1", "text", "none", -5);
        assert_eq!(lifecycle(&h).handle(&msg).await.unwrap(), Sighting::Discarded);
        assert_eq!(h.store.get("intext-t1").await.unwrap(), None);
        assert!(load_queue(h.store.as_ref()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_id_is_rejected() {
        let h = Harness::new();
        let msg = message("", "call", "none", 60);
        assert!(matches!(lifecycle(&h).handle(&msg).await, Err(Error::Missing(_))));
        assert!(h.store.keys_with_prefix("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cleanup_twice_is_fine() {
        let h = Harness::new();
        let engine = lifecycle(&h);
        engine.handle(&message("m1", "call", "none", 60)).await.unwrap();
        engine.cleanup(Target::InCall, "m1").await.unwrap();
        engine.cleanup(Target::InCall, "m1").await.unwrap();
        assert_eq!(h.store.get("incall-m1").await.unwrap(), None);
        assert!(h.popups.open_ids().is_empty());
    }

    #[tokio::test]
    async fn accepting_opens_room_and_cleans_up() {
        let h = Harness::new();
        let engine = lifecycle(&h);
        engine.handle(&message("m1", "call", "none", 60)).await.unwrap();

        engine.answer_call("m1", MessageStatus::Accepted).await.unwrap();
        assert_eq!(h.api.log(), vec!["set:accepted:m1"]);
        assert_eq!(h.popups.tabs(), vec!["https://meet.example/m1"]);
        assert_eq!(h.store.get("incall-m1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_answer_keeps_the_call() {
        let h = Harness::new();
        let engine = lifecycle(&h);
        engine.handle(&message("m1", "call", "none", 60)).await.unwrap();
        h.api.fail_requests(true);

        assert!(engine.answer_call("m1", MessageStatus::Rejected).await.is_err());
        assert!(h.store.get("incall-m1").await.unwrap().is_some());
        assert!(h.popups.tabs().is_empty());
    }

    #[tokio::test]
    async fn watch_closes_popup_once_resolved() {
        let h = Harness::new();
        let engine = lifecycle(&h);
        engine.handle(&message("m1", "call", "none", 60)).await.unwrap();

        h.api.put_message(message("m1", "call", "none", 60));
        assert!(engine.watch(Target::InCall, "m1").await.unwrap());
        assert!(h.alarms.is_pending(&Alarm::watch(Target::InCall, "m1")));

        h.api.put_message(message("m1", "call", "rejected", 60));
        assert!(!engine.watch(Target::InCall, "m1").await.unwrap());
        assert!(h.popups.open_ids().is_empty());
        assert_eq!(h.store.get("incall-m1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn watch_survives_backend_errors() {
        let h = Harness::new();
        let engine = lifecycle(&h);
        engine.handle(&message("m1", "call", "none", 60)).await.unwrap();
        h.api.fail_requests(true);

        assert!(engine.watch(Target::InCall, "m1").await.unwrap());
        assert_eq!(h.popups.open_ids(), vec!["m1"]);
    }
}
