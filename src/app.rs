use directories::{BaseDirs, ProjectDirs};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::normalize_base_url;

pub const DEFAULT_BASE_URL: &str = "https://app.eparto.net";

/// Durable local settings: credential, backend and the worker's timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppState {
    #[serde(alias = "base-url")]
    pub base_url: String,
    #[serde(alias = "private-key")]
    pub private_key: String,
    pub timing: Timing,
    pub launcher: Launcher,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            private_key: String::new(),
            timing: Timing::default(),
            launcher: Launcher::default(),
        }
    }
}

/// Intervals and expiries. Expiry of an incoming call must stay longer than
/// the outgoing one, or the callee loses the call before the caller gives up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Timing {
    pub ping_delay_secs: u64,
    pub ping_interval_secs: u64,
    pub poll_interval_secs: u64,
    pub incall_expire_secs: u64,
    pub intext_expire_secs: u64,
    pub outcall_expire_secs: u64,
    pub ring_delay_ms: u64,
    pub incall_watch_ms: u64,
    pub intext_watch_delay_secs: u64,
    pub intext_watch_secs: u64,
    pub max_popups: usize,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            ping_delay_secs: 2,
            ping_interval_secs: 60,
            poll_interval_secs: 2,
            incall_expire_secs: 60,
            intext_expire_secs: 8 * 60 * 60,
            outcall_expire_secs: 30,
            ring_delay_ms: 1200,
            incall_watch_ms: 1000,
            intext_watch_delay_secs: 30,
            intext_watch_secs: 300,
            max_popups: 5,
        }
    }
}

impl Timing {
    /// Zero or tiny periods would spin the loops. Raise them to a floor.
    fn clamped(mut self) -> Self {
        fn floor(name: &str, value: &mut u64, min: u64) {
            if *value < min {
                warn!("timing.{name} = {value} is too short, using {min}");
                *value = min;
            }
        }
        floor("ping_interval_secs", &mut self.ping_interval_secs, 1);
        floor("poll_interval_secs", &mut self.poll_interval_secs, 1);
        floor("ring_delay_ms", &mut self.ring_delay_ms, 100);
        floor("incall_watch_ms", &mut self.incall_watch_ms, 100);
        floor("intext_watch_secs", &mut self.intext_watch_secs, 1);
        self
    }

    pub fn ping_delay(&self) -> Duration {
        Duration::from_secs(self.ping_delay_secs)
    }
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
    pub fn incall_expiry(&self) -> Duration {
        Duration::from_secs(self.incall_expire_secs)
    }
    pub fn intext_expiry(&self) -> Duration {
        Duration::from_secs(self.intext_expire_secs)
    }
    pub fn outcall_expiry(&self) -> Duration {
        Duration::from_secs(self.outcall_expire_secs)
    }
    pub fn ring_delay(&self) -> Duration {
        Duration::from_millis(self.ring_delay_ms)
    }
    pub fn incall_watch(&self) -> Duration {
        Duration::from_millis(self.incall_watch_ms)
    }
    pub fn intext_watch_delay(&self) -> Duration {
        Duration::from_secs(self.intext_watch_delay_secs)
    }
    pub fn intext_watch(&self) -> Duration {
        Duration::from_secs(self.intext_watch_secs)
    }
}

/// Commands used to show popups and open call rooms. `{url}`, `{id}`,
/// `{width}` and `{height}` are substituted in the arguments.
///
/// A popup counts as open while its command runs. Chromium hands a window to
/// an instance already running on the same profile and exits, so the default
/// gives every popup its own `--user-data-dir`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Launcher {
    pub popup_command: Vec<String>,
    pub tab_command: Vec<String>,
    pub surface_base: String,
}

impl Default for Launcher {
    fn default() -> Self {
        Self {
            popup_command: vec![
                "chromium".into(),
                format!(
                    "--user-data-dir={}",
                    std::env::temp_dir().join("intercom-worker").join("popup-{id}").display()
                ),
                "--app={url}".into(),
                "--window-size={width},{height}".into(),
            ],
            tab_command: vec!["xdg-open".into(), "{url}".into()],
            surface_base: "file:///usr/share/intercom-worker".into(),
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    // TOML is the native format. A JSON export of the extension's local
    // storage is picked up once and rewritten as TOML.
    fn toml_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("INTERCOM_CONFIG") {
            return Some(PathBuf::from(path));
        }
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("intercom.toml"))
    }

    fn legacy_json_path() -> Option<PathBuf> {
        let proj = ProjectDirs::from("net", "eparto", "Intercom")?;
        Some(proj.config_dir().join("storage.json"))
    }

    /// Load the settings. On a first run a template is written for the user
    /// to fill in.
    pub fn load() -> Self {
        let Some(path) = Self::toml_path() else {
            return Self::new();
        };
        let state = Self::load_from(&path, Self::legacy_json_path().as_deref());
        if !path.exists() {
            match state.save_to(&path) {
                Ok(()) => info!("wrote settings template to {}", path.display()),
                Err(e) => warn!("could not write {}: {e}", path.display()),
            }
        }
        state
    }

    pub fn load_from(toml_path: &Path, legacy: Option<&Path>) -> Self {
        if let Ok(text) = fs::read_to_string(toml_path) {
            match toml::from_str::<AppState>(&text) {
                Ok(state) => return state.normalized(),
                Err(e) => warn!("ignoring {}: {e}", toml_path.display()),
            }
        }

        if let Some(legacy) = legacy {
            if let Ok(bytes) = fs::read(legacy) {
                if let Ok(state) = serde_json::from_slice::<AppState>(&bytes) {
                    let state = state.normalized();
                    match state.save_to(toml_path) {
                        Ok(()) => info!("migrated {} to {}", legacy.display(), toml_path.display()),
                        Err(e) => warn!("could not migrate settings: {e}"),
                    }
                    return state;
                }
            }
        }

        Self::new()
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self).map_err(|e| std::io::Error::other(e.to_string()))?;
        fs::write(path, toml)
    }

    fn normalized(mut self) -> Self {
        self.base_url = normalize_base_url(&self.base_url);
        self.private_key = self.private_key.trim().to_string();
        self.timing = self.timing.clamped();
        self
    }

    /// The key as shown back to the user: only both ends are revealed.
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.private_key.chars().collect();
        if chars.len() <= 4 {
            return "*****".into();
        }
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{head}*****{tail}")
    }
}
