//! In-memory stand-ins for the host, shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::alarms::{Alarm, Scheduler};
use crate::api::client::Intercom;
use crate::api::models::{
    Contact, IntercomAttr, IntercomMessage, MessageStatus, MessageType, OutgoingCall, Ring,
};
use crate::app::Timing;
use crate::engine::Services;
use crate::error::{Error, Result};
use crate::popup::{Notifier, Popup};
use crate::storage::SqliteSessionStore;

pub fn message(id: &str, kind: &str, status: &str, expires_in_secs: i64) -> IntercomMessage {
    IntercomMessage {
        id: id.to_string(),
        message_type: MessageType::from(kind.to_string()),
        status: MessageStatus::from(status.to_string()),
        expired_at: (Utc::now() + chrono::Duration::seconds(expires_in_secs)).to_rfc3339(),
        contact_id: Some("c1".into()),
        contact_name: Some("Ada".into()),
        created_at: None,
        intercom_attr: Some(IntercomAttr {
            url: Some(format!("https://meet.example/{id}")),
            owner_url: Some(format!("https://meet.example/owner/{id}")),
            phone_name: Some("Front desk".into()),
            message: Some("hello".into()),
            extra: Map::new(),
        }),
        extra: Map::new(),
    }
}

pub fn outgoing_call(id: &str, contact_id: &str) -> OutgoingCall {
    OutgoingCall {
        id: id.to_string(),
        contact_id: contact_id.to_string(),
        url: format!("https://meet.example/{id}"),
        status: MessageStatus::None,
        extra: Map::new(),
    }
}

#[derive(Default)]
pub struct RecordingScheduler {
    created: Mutex<Vec<(Alarm, Duration)>>,
    pending: Mutex<HashMap<Alarm, Duration>>,
}

impl RecordingScheduler {
    pub fn is_pending(&self, alarm: &Alarm) -> bool {
        self.pending.lock().unwrap().contains_key(alarm)
    }

    pub fn delay_of(&self, alarm: &Alarm) -> Option<Duration> {
        self.pending.lock().unwrap().get(alarm).copied()
    }

    pub fn created_count(&self, alarm: &Alarm) -> usize {
        self.created.lock().unwrap().iter().filter(|(a, _)| a == alarm).count()
    }
}

impl Scheduler for RecordingScheduler {
    fn create(&self, alarm: Alarm, delay: Duration) {
        self.created.lock().unwrap().push((alarm.clone(), delay));
        self.pending.lock().unwrap().insert(alarm, delay);
    }

    fn create_repeating(&self, alarm: Alarm, delay: Duration, _period: Duration) {
        self.create(alarm, delay);
    }

    fn clear(&self, alarm: &Alarm) -> bool {
        self.pending.lock().unwrap().remove(alarm).is_some()
    }
}

/// Scripted backend recording every request as `op:id`.
#[derive(Default)]
pub struct FakeIntercom {
    messages: Mutex<Vec<Value>>,
    rings: Mutex<VecDeque<MessageStatus>>,
    failing: Mutex<bool>,
    failing_ops: Mutex<Vec<String>>,
    log: Mutex<Vec<String>>,
}

impl FakeIntercom {
    pub fn set_messages(&self, items: Vec<Value>) {
        *self.messages.lock().unwrap() = items;
    }

    /// Replace or add the server copy of a message.
    pub fn put_message(&self, msg: IntercomMessage) {
        let mut messages = self.messages.lock().unwrap();
        messages.retain(|m| m.get("id").and_then(Value::as_str) != Some(msg.id.as_str()));
        messages.push(serde_json::to_value(msg).unwrap());
    }

    pub fn push_ring(&self, status: MessageStatus) {
        self.rings.lock().unwrap().push_back(status);
    }

    pub fn fail_requests(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    /// Fail only the requests whose log entry starts with `op`.
    pub fn fail_on(&self, op: &str) {
        self.failing_ops.lock().unwrap().push(op.to_string());
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    fn record(&self, entry: String) -> Result<()> {
        let op_fails = self.failing_ops.lock().unwrap().iter().any(|op| entry.starts_with(op.as_str()));
        self.log.lock().unwrap().push(entry);
        if op_fails || *self.failing.lock().unwrap() {
            return Err(Error::Status(503));
        }
        Ok(())
    }
}

#[async_trait]
impl Intercom for FakeIntercom {
    async fn ping(&self) -> Result<()> {
        self.record("ping".into())
    }

    async fn list_messages(&self, _since: i64) -> Result<Vec<Value>> {
        self.record("list".into())?;
        Ok(self.messages.lock().unwrap().clone())
    }

    async fn get_message(&self, id: &str) -> Result<Option<IntercomMessage>> {
        self.record(format!("get:{id}"))?;
        let messages = self.messages.lock().unwrap();
        let found = messages
            .iter()
            .find(|m| m.get("id").and_then(Value::as_str) == Some(id))
            .cloned();
        Ok(found.map(serde_json::from_value).transpose()?)
    }

    async fn set_status(&self, id: &str, status: &MessageStatus) -> Result<()> {
        self.record(format!("set:{status}:{id}"))
    }

    async fn delete_message(&self, id: &str) -> Result<()> {
        self.record(format!("del:{id}"))
    }

    async fn delete_with_notification(&self, id: &str) -> Result<()> {
        self.record(format!("del-notify:{id}"))
    }

    async fn initiate_call(&self, contact_id: &str) -> Result<OutgoingCall> {
        self.record(format!("call:{contact_id}"))?;
        Ok(outgoing_call(&format!("call-{contact_id}"), contact_id))
    }

    async fn ring_call(&self, id: &str) -> Result<Ring> {
        self.record(format!("ring:{id}"))?;
        let status = self.rings.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Ring { status, extra: Map::new() })
    }

    async fn contacts(&self) -> Result<Vec<Contact>> {
        self.record("contacts".into())?;
        Ok(vec![serde_json::from_value(json!({"id": "c1", "name": "Ada"}))?])
    }

    async fn send_text(&self, contact_id: &str, message: &str) -> Result<Value> {
        self.record(format!("text:{contact_id}:{message}"))?;
        Ok(json!({"id": "t-out"}))
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    open: Mutex<Vec<Popup>>,
    opened: Mutex<Vec<Popup>>,
    external: Mutex<usize>,
    tabs: Mutex<Vec<String>>,
}

impl FakeNotifier {
    /// Popups opened by someone else that still take room on screen.
    pub fn preopen(&self, n: usize) {
        *self.external.lock().unwrap() = n;
    }

    pub fn opened(&self) -> Vec<Popup> {
        self.opened.lock().unwrap().clone()
    }

    pub fn opened_ids(&self) -> Vec<String> {
        self.opened().into_iter().map(|p| p.id).collect()
    }

    pub fn open_ids(&self) -> Vec<String> {
        self.open.lock().unwrap().iter().map(|p| p.id.clone()).collect()
    }

    pub fn tabs(&self) -> Vec<String> {
        self.tabs.lock().unwrap().clone()
    }
}

impl Notifier for FakeNotifier {
    fn open(&self, popup: Popup) -> Result<()> {
        self.opened.lock().unwrap().push(popup.clone());
        self.open.lock().unwrap().push(popup);
        Ok(())
    }

    fn close(&self, popup: &Popup) {
        self.open.lock().unwrap().retain(|p| p != popup);
    }

    fn open_count(&self) -> usize {
        *self.external.lock().unwrap() + self.open.lock().unwrap().len()
    }

    fn open_tab(&self, url: &str) -> Result<()> {
        self.tabs.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<SqliteSessionStore>,
    pub api: Arc<FakeIntercom>,
    pub alarms: Arc<RecordingScheduler>,
    pub popups: Arc<FakeNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(SqliteSessionStore::open().unwrap()),
            api: Arc::new(FakeIntercom::default()),
            alarms: Arc::new(RecordingScheduler::default()),
            popups: Arc::new(FakeNotifier::default()),
        }
    }

    pub fn timing(&self) -> Timing {
        Timing::default()
    }

    pub fn services(&self) -> Services {
        Services {
            store: self.store.clone(),
            api: self.api.clone(),
            alarms: self.alarms.clone(),
            popups: self.popups.clone(),
            timing: self.timing(),
        }
    }
}
