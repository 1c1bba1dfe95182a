use log::{debug, info, warn};

use crate::alarms::{Alarm, Target};
use crate::api::models::{MessageStatus, OutgoingCall};
use crate::engine::Services;
use crate::error::{Error, Result};
use crate::storage::{self, SessionKey};

/// Where one ring tick left the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingOutcome {
    /// The record is gone (expired or already finished). Nothing done.
    Gone,
    /// The contact no longer points at this call: hung up or superseded.
    Cancelled,
    /// Peer has not answered yet, another tick is scheduled.
    Ringing,
    /// Peer answered (accepted, rejected, ...). The call is torn down.
    Answered(MessageStatus),
}

/// Caller side of a direct call.
///
/// `contact-{contact_id}` holds the id of the one live call towards that
/// contact. Ringing goes on only while it names this call, so removing it is
/// how the user hangs up; the next tick notices, at most one ring delay later.
pub struct OutgoingCalls {
    svc: Services,
}

impl OutgoingCalls {
    pub fn new(svc: Services) -> Self {
        Self { svc }
    }

    /// Ask the backend for a new call to the contact, then start ringing.
    pub async fn dial(&self, contact_id: &str) -> Result<OutgoingCall> {
        let call = self.svc.api.initiate_call(contact_id).await?;
        self.start(call.clone()).await?;
        Ok(call)
    }

    pub async fn start(&self, call: OutgoingCall) -> Result<()> {
        if call.id.is_empty() {
            return Err(Error::Missing("call id"));
        }
        if call.contact_id.is_empty() {
            return Err(Error::Missing("contact id"));
        }
        let store = self.svc.store.as_ref();
        let timing = &self.svc.timing;

        self.svc
            .alarms
            .create(Alarm::cleanup(Target::OutCall, &call.id), timing.outcall_expiry());
        storage::set_json(store, &SessionKey::Contact(call.contact_id.clone()), &call.id).await?;
        storage::set_json(store, &SessionKey::Record(Target::OutCall, call.id.clone()), &call).await?;
        self.svc.alarms.create(Alarm::ring(&call.id), timing.ring_delay());
        info!("calling contact {} ({})", call.contact_id, call.id);
        Ok(())
    }

    /// Hang up locally. The ring loop does the rest.
    pub async fn cancel(&self, contact_id: &str) -> Result<()> {
        storage::remove(self.svc.store.as_ref(), &SessionKey::Contact(contact_id.to_string())).await
    }

    pub async fn ring(&self, id: &str) -> Result<RingOutcome> {
        let Some(call) = self.stored(id).await? else {
            return Ok(RingOutcome::Gone);
        };
        if self.active_call(&call.contact_id).await?.as_deref() != Some(id) {
            self.terminate(id).await?;
            return Ok(RingOutcome::Cancelled);
        }

        let ring = self.svc.api.ring_call(id).await?;
        if ring.status.is_pending() {
            self.svc.alarms.create(Alarm::ring(id), self.svc.timing.ring_delay());
            return Ok(RingOutcome::Ringing);
        }

        debug!("call {id} answered: {}", ring.status);
        let store = self.svc.store.as_ref();
        storage::remove(store, &SessionKey::Record(Target::OutCall, id.to_string())).await?;
        self.release_contact(&call).await?;
        self.svc.alarms.clear(&Alarm::cleanup(Target::OutCall, id));
        // The answer stands even if the backend copy lingers.
        if let Err(e) = self.svc.api.delete_message(id).await {
            warn!("deleting answered call {id}: {e}");
        }
        if ring.status == MessageStatus::Accepted {
            self.svc.popups.open_tab(&call.url)?;
        }
        Ok(RingOutcome::Answered(ring.status))
    }

    /// Expiry alarm: nobody answered in time.
    pub async fn expire(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::Missing("call id"));
        }
        let Some(call) = self.stored(id).await? else {
            return Ok(());
        };
        storage::remove(self.svc.store.as_ref(), &SessionKey::Record(Target::OutCall, id.to_string())).await?;
        self.release_contact(&call).await?;
        self.svc.alarms.clear(&Alarm::ring(id));
        info!("call {id} to {} was not answered", call.contact_id);
        self.svc.api.delete_with_notification(id).await
    }

    async fn terminate(&self, id: &str) -> Result<()> {
        storage::remove(self.svc.store.as_ref(), &SessionKey::Record(Target::OutCall, id.to_string())).await?;
        self.svc.alarms.clear(&Alarm::cleanup(Target::OutCall, id));
        info!("call {id} stopped");
        self.svc.api.delete_with_notification(id).await
    }

    async fn stored(&self, id: &str) -> Result<Option<OutgoingCall>> {
        storage::get_json(self.svc.store.as_ref(), &SessionKey::Record(Target::OutCall, id.to_string())).await
    }

    async fn active_call(&self, contact_id: &str) -> Result<Option<String>> {
        storage::get_json(self.svc.store.as_ref(), &SessionKey::Contact(contact_id.to_string())).await
    }

    /// Clear the contact pointer unless a newer call took it over.
    async fn release_contact(&self, call: &OutgoingCall) -> Result<()> {
        if self.active_call(&call.contact_id).await?.as_deref() == Some(call.id.as_str()) {
            storage::remove(self.svc.store.as_ref(), &SessionKey::Contact(call.contact_id.clone())).await?;
        }
        Ok(())
    }
}
