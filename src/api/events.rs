use serde::{Deserialize, Serialize};

use crate::api::models::OutgoingCall;

/// Local requests coming from the UI side (contact list, popups), one JSON
/// object per line tagged by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum IncomingEvent {
    /// The UI already initiated the call on the backend.
    OutcallStart(OutgoingCall),
    OutcallDial { contact_id: String },
    OutcallCancel { contact_id: String },
    IncallAccept { id: String },
    IncallReject { id: String },
    IntextSeen { id: String },
    TextSend { contact_id: String, message: String },
    Contacts,
}

impl IncomingEvent {
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}
