//! The worker's state machines. Nothing in here keeps state in memory between
//! two handler calls: whatever must survive lives in the session store.

pub mod admission;
pub mod incoming;
pub mod outgoing;
pub mod poller;
pub mod presence;

use std::sync::Arc;

use crate::alarms::Scheduler;
use crate::api::client::Intercom;
use crate::app::Timing;
use crate::popup::Notifier;
use crate::storage::SessionStore;

/// Host collaborators handed to every component.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn SessionStore>,
    pub api: Arc<dyn Intercom>,
    pub alarms: Arc<dyn Scheduler>,
    pub popups: Arc<dyn Notifier>,
    pub timing: Timing,
}
