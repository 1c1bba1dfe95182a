use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::alarms::{Alarm, Target};
use crate::api::events::IncomingEvent;
use crate::api::models::MessageStatus;
use crate::engine::admission::PopupGate;
use crate::engine::outgoing::OutgoingCalls;
use crate::engine::poller::Poller;
use crate::engine::presence::Presence;
use crate::engine::Services;
use crate::error::Result;

/// Routes fired alarms and local events to the components. Handlers run one
/// at a time; a failing handler is logged and never stops the loop.
pub struct Worker {
    svc: Services,
    poller: Poller,
    gate: PopupGate,
    outgoing: OutgoingCalls,
    presence: Presence,
}

impl Worker {
    pub fn new(svc: Services) -> Self {
        Self {
            poller: Poller::new(svc.clone()),
            gate: PopupGate::new(svc.clone()),
            outgoing: OutgoingCalls::new(svc.clone()),
            presence: Presence::new(svc.api.clone()),
            svc,
        }
    }

    /// Register the recurring alarms.
    pub fn install(&self) {
        let timing = &self.svc.timing;
        self.svc
            .alarms
            .create_repeating(Alarm::Ping, timing.ping_delay(), timing.ping_interval());
        self.svc.alarms.create(Alarm::PollMessages, timing.poll_interval());
    }

    pub async fn run(
        &self,
        mut alarms: mpsc::UnboundedReceiver<Alarm>,
        mut events: mpsc::UnboundedReceiver<IncomingEvent>,
    ) {
        self.install();
        let mut events_open = true;
        loop {
            tokio::select! {
                alarm = alarms.recv() => match alarm {
                    Some(alarm) => self.on_alarm(alarm).await,
                    None => break,
                },
                event = events.recv(), if events_open => match event {
                    Some(event) => self.on_event(event).await,
                    None => events_open = false,
                },
            }
        }
        info!("alarm channel closed, worker stopping");
    }

    pub async fn on_alarm(&self, alarm: Alarm) {
        debug!("alarm {alarm}");
        let name = alarm.to_string();
        if let Err(e) = self.dispatch_alarm(alarm).await {
            warn!("{name}: {e}");
        }
    }

    async fn dispatch_alarm(&self, alarm: Alarm) -> Result<()> {
        let lifecycle = self.poller.lifecycle();
        match alarm {
            Alarm::Ping => {
                self.presence.ping().await;
            }
            Alarm::PollMessages => {
                // Next cycle first, so a slow or failing one cannot stop polling.
                // Cycles may then overlap and reorder messages; accepted.
                self.svc
                    .alarms
                    .create(Alarm::PollMessages, self.svc.timing.poll_interval());
                match self.poller.poll().await {
                    Ok(report) => debug!("poll: {report:?}"),
                    Err(e) => warn!("no intercom messages this cycle: {e}"),
                }
                self.gate.admit().await?;
            }
            Alarm::Cleanup { target: Target::OutCall, id } => self.outgoing.expire(&id).await?,
            Alarm::Cleanup { target, id } => lifecycle.cleanup(target, &id).await?,
            Alarm::Ring { id } => {
                let outcome = self.outgoing.ring(&id).await?;
                debug!("ring {id}: {outcome:?}");
            }
            Alarm::Watch { target: Target::OutCall, id } => debug!("no popup to watch for call {id}"),
            Alarm::Watch { target, id } => {
                lifecycle.watch(target, &id).await?;
                // A closed popup frees a slot.
                self.gate.admit().await?;
            }
        }
        Ok(())
    }

    pub async fn on_event(&self, event: IncomingEvent) {
        debug!("event {event:?}");
        if let Err(e) = self.dispatch_event(event).await {
            warn!("local event failed: {e}");
        }
    }

    async fn dispatch_event(&self, event: IncomingEvent) -> Result<()> {
        let lifecycle = self.poller.lifecycle();
        match event {
            IncomingEvent::OutcallStart(call) => self.outgoing.start(call).await?,
            IncomingEvent::OutcallDial { contact_id } => {
                self.outgoing.dial(&contact_id).await?;
            }
            IncomingEvent::OutcallCancel { contact_id } => self.outgoing.cancel(&contact_id).await?,
            IncomingEvent::IncallAccept { id } => lifecycle.answer_call(&id, MessageStatus::Accepted).await?,
            IncomingEvent::IncallReject { id } => lifecycle.answer_call(&id, MessageStatus::Rejected).await?,
            IncomingEvent::IntextSeen { id } => {
                lifecycle.mark_seen(&id).await?;
                self.gate.admit().await?;
            }
            IncomingEvent::TextSend { contact_id, message } => {
                self.svc.api.send_text(&contact_id, &message).await?;
                info!("text sent to {contact_id}");
            }
            IncomingEvent::Contacts => {
                for contact in self.svc.api.contacts().await? {
                    println!("{}", serde_json::to_string(&contact)?);
                }
            }
        }
        Ok(())
    }
}
