//! Load config from file and environment.

use std::path::PathBuf;
use std::time::Duration;

use inertia_core::RouterConfig;
use serde::Deserialize;

/// Host configuration. File: ~/.config/inertia-headless/config.toml or
/// /etc/inertia-headless/config.toml.
/// Env overrides: INERTIA_TIMEOUT_SECS, INERTIA_SCROLL_DEBOUNCE_MS, INERTIA_USER_AGENT,
/// INERTIA_SESSION_FILE.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Request timeout in seconds (default 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Quiet period before reported scroll offsets are saved (default 100 ms).
    #[serde(default = "default_scroll_debounce_ms")]
    pub scroll_debounce_ms: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Where session storage is persisted. In memory only when unset.
    #[serde(default)]
    pub session_file: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_scroll_debounce_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            scroll_debounce_ms: default_scroll_debounce_ms(),
            user_agent: None,
            session_file: None,
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            scroll_debounce: Duration::from_millis(self.scroll_debounce_ms),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let c = load_file().unwrap_or_default();
    apply_overrides(c, |key| std::env::var(key).ok())
}

/// Apply overrides from `lookup` (the process environment in `load`).
pub fn apply_overrides(mut c: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(v) = lookup("INERTIA_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
        c.timeout_secs = v;
    }
    if let Some(v) = lookup("INERTIA_SCROLL_DEBOUNCE_MS").and_then(|s| s.parse().ok()) {
        c.scroll_debounce_ms = v;
    }
    if let Some(v) = lookup("INERTIA_USER_AGENT").filter(|s| !s.is_empty()) {
        c.user_agent = Some(v);
    }
    if let Some(v) = lookup("INERTIA_SESSION_FILE").filter(|s| !s.is_empty()) {
        c.session_file = Some(PathBuf::from(v));
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/inertia-headless/config.toml"));
    }
    out.push(PathBuf::from("/etc/inertia-headless/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p).map(|s| toml::from_str::<Config>(&s)) {
                Ok(Ok(c)) => return Some(c),
                Ok(Err(e)) => tracing::warn!(path = %p.display(), error = %e, "ignoring malformed config"),
                Err(e) => tracing::warn!(path = %p.display(), error = %e, "cannot read config"),
            }
            break;
        }
    }
    None
}
