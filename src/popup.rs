use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;

use log::{debug, warn};
use tokio::process::{Child, Command};

use crate::api::models::MessageType;
use crate::app::Launcher;
use crate::error::{Error, Result};

pub const POPUP_WIDTH: u32 = 320;
pub const POPUP_HEIGHT: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PopupKind {
    InCall,
    InPhone,
    InText,
}

impl PopupKind {
    pub fn for_message(message_type: &MessageType) -> Option<Self> {
        match message_type {
            MessageType::Call => Some(Self::InCall),
            MessageType::Phone => Some(Self::InPhone),
            MessageType::Text => Some(Self::InText),
            MessageType::Other(_) => None,
        }
    }

    pub fn page(self) -> &'static str {
        match self {
            Self::InCall => "ui/in-call.html",
            Self::InPhone => "ui/in-phone.html",
            Self::InText => "ui/in-text.html",
        }
    }
}

/// One notification window, identified by the message it shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Popup {
    pub kind: PopupKind,
    pub id: String,
}

impl Popup {
    pub fn new(kind: PopupKind, id: &str) -> Self {
        Self { kind, id: id.to_string() }
    }

    pub fn surface(&self) -> String {
        format!("{}?id={}", self.kind.page(), self.id)
    }
}

/// The windowing side of the host.
pub trait Notifier: Send + Sync {
    fn open(&self, popup: Popup) -> Result<()>;
    fn close(&self, popup: &Popup);
    /// Notification popups currently on screen.
    fn open_count(&self) -> usize;
    fn open_tab(&self, url: &str) -> Result<()>;
}

/// Shows popups by launching a window command per popup. A popup is open for
/// as long as its process runs, so the command must stay in the foreground.
pub struct ProcessNotifier {
    launcher: Launcher,
    children: Mutex<HashMap<Popup, Child>>,
}

impl ProcessNotifier {
    pub fn new(launcher: Launcher) -> Self {
        Self {
            launcher,
            children: Mutex::new(HashMap::new()),
        }
    }

    fn command(template: &[String], url: &str, id: &str) -> Result<Command> {
        let (program, args) = template
            .split_first()
            .ok_or(Error::Config("empty launcher command".into()))?;
        let mut cmd = Command::new(program);
        for arg in args {
            cmd.arg(
                arg.replace("{url}", url)
                    .replace("{id}", id)
                    .replace("{width}", &POPUP_WIDTH.to_string())
                    .replace("{height}", &POPUP_HEIGHT.to_string()),
            );
        }
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        Ok(cmd)
    }
}

impl Notifier for ProcessNotifier {
    fn open(&self, popup: Popup) -> Result<()> {
        let url = format!("{}/{}", self.launcher.surface_base.trim_end_matches('/'), popup.surface());
        let child = Self::command(&self.launcher.popup_command, &url, &popup.id)?.spawn()?;
        debug!("popup {url} opened");
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut old) = children.insert(popup, child) {
            let _ = old.start_kill();
        }
        Ok(())
    }

    fn close(&self, popup: &Popup) {
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut child) = children.remove(popup) {
            if let Err(e) = child.start_kill() {
                warn!("closing popup {}: {e}", popup.surface());
            }
        }
    }

    fn open_count(&self) -> usize {
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        children.retain(|_, child| matches!(child.try_wait(), Ok(None)));
        children.len()
    }

    fn open_tab(&self, url: &str) -> Result<()> {
        // Tabs belong to the browser; they are not tracked as popups.
        Self::command(&self.launcher.tab_command, url, "")?.spawn()?;
        Ok(())
    }
}
