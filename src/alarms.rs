use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Which kind of locally stored record an alarm is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    InCall,
    InText,
    OutCall,
}

impl Target {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::InCall => "incall",
            Self::InText => "intext",
            Self::OutCall => "outcall",
        }
    }

    fn from_prefix(s: &str) -> Option<Self> {
        match s {
            "incall" => Some(Self::InCall),
            "intext" => Some(Self::InText),
            "outcall" => Some(Self::OutCall),
            _ => None,
        }
    }
}

/// A named timer. The names are the ones the host knows (`cleanup-incall-42`);
/// they are decoded once when an alarm fires.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Alarm {
    Ping,
    PollMessages,
    Cleanup { target: Target, id: String },
    Ring { id: String },
    Watch { target: Target, id: String },
}

impl Alarm {
    pub fn cleanup(target: Target, id: &str) -> Self {
        Self::Cleanup { target, id: id.to_string() }
    }

    pub fn watch(target: Target, id: &str) -> Self {
        Self::Watch { target, id: id.to_string() }
    }

    pub fn ring(id: &str) -> Self {
        Self::Ring { id: id.to_string() }
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => f.write_str("ping"),
            Self::PollMessages => f.write_str("intercomMessages"),
            Self::Cleanup { target, id } => write!(f, "cleanup-{}-{id}", target.prefix()),
            Self::Ring { id } => write!(f, "ring-outcall-{id}"),
            Self::Watch { target, id } => write!(f, "watch-{}-{id}", target.prefix()),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownAlarm(pub String);

impl fmt::Display for UnknownAlarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown alarm {:?}", self.0)
    }
}

impl std::error::Error for UnknownAlarm {}

impl FromStr for Alarm {
    type Err = UnknownAlarm;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownAlarm(name.to_string());
        match name {
            "ping" => return Ok(Self::Ping),
            "intercomMessages" => return Ok(Self::PollMessages),
            _ => {}
        }
        let (kind, rest) = name.split_once('-').ok_or_else(unknown)?;
        let (prefix, id) = rest.split_once('-').ok_or_else(unknown)?;
        let target = Target::from_prefix(prefix).ok_or_else(unknown)?;
        if id.is_empty() {
            return Err(unknown());
        }
        let id = id.to_string();
        match (kind, target) {
            ("cleanup", target) => Ok(Self::Cleanup { target, id }),
            ("watch", target) => Ok(Self::Watch { target, id }),
            ("ring", Target::OutCall) => Ok(Self::Ring { id }),
            _ => Err(unknown()),
        }
    }
}

/// Shortest period a repeating alarm runs at.
pub const MIN_PERIOD: Duration = Duration::from_millis(100);

/// Timer facility. Creating an alarm that already exists replaces it, clearing
/// a missing alarm is a no-op.
pub trait Scheduler: Send + Sync {
    fn create(&self, alarm: Alarm, delay: Duration);
    fn create_repeating(&self, alarm: Alarm, delay: Duration, period: Duration);
    fn clear(&self, alarm: &Alarm) -> bool;
}

/// Runs each alarm as a tokio task and hands fired alarms to the worker loop.
pub struct TokioScheduler {
    fired: mpsc::UnboundedSender<Alarm>,
    timers: Mutex<HashMap<Alarm, JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alarm>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            fired: tx,
            timers: Mutex::new(HashMap::new()),
        };
        (scheduler, rx)
    }

    fn install(&self, alarm: Alarm, handle: JoinHandle<()>) {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        timers.retain(|_, h| !h.is_finished());
        if let Some(old) = timers.insert(alarm, handle) {
            old.abort();
        }
    }
}

impl Scheduler for TokioScheduler {
    fn create(&self, alarm: Alarm, delay: Duration) {
        debug!("alarm {alarm} in {delay:?}");
        let tx = self.fired.clone();
        let name = alarm.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(name);
        });
        self.install(alarm, handle);
    }

    fn create_repeating(&self, alarm: Alarm, delay: Duration, period: Duration) {
        let period = period.max(MIN_PERIOD);
        debug!("alarm {alarm} in {delay:?}, every {period:?}");
        let tx = self.fired.clone();
        let name = alarm.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if tx.send(name.clone()).is_err() {
                    break;
                }
            }
        });
        self.install(alarm, handle);
    }

    fn clear(&self, alarm: &Alarm) -> bool {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        match timers.remove(alarm) {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }
}
