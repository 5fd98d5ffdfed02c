use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::{LogLevel, ServerLog};

pub const DEFAULT_PORT: u16 = 6103;
pub const DEFAULT_CONFIG_PATH: &str = "tickwire/tickwire.json";
pub const DEFAULT_INDEX_URL: &str =
    "https://raw.githubusercontent.com/derekShaheen/WickerREST/main/web/index.html";
pub const DEFAULT_FAVICON_URL: &str =
    "https://raw.githubusercontent.com/derekShaheen/WickerREST/main/web/resources/favicon.ico";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Stored wider than `u16` so an out-of-range value in the file can be
    /// reported and reset instead of failing to parse.
    pub listening_port: i64,
    /// 0: none, 1: raised, 2: verbose.
    pub debug_level: i64,
    pub bind_address: String,
    pub resources_dir: PathBuf,
    pub index_url: String,
    pub favicon_url: String,
    pub invocation_timeout_ms: u64,
    pub product_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listening_port: DEFAULT_PORT as i64,
            debug_level: 0,
            bind_address: "127.0.0.1".to_string(),
            resources_dir: PathBuf::from("tickwire/resources"),
            index_url: DEFAULT_INDEX_URL.to_string(),
            favicon_url: DEFAULT_FAVICON_URL.to_string(),
            invocation_timeout_ms: 30_000,
            product_name: "Tickwire".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn port(&self) -> u16 {
        u16::try_from(self.listening_port).unwrap_or(DEFAULT_PORT)
    }

    pub fn debug_level(&self) -> u8 {
        u8::try_from(self.debug_level.clamp(0, LogLevel::MAX as i64)).unwrap_or(0)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms.max(1))
    }

    /// Loads the file named by `TICKWIRE_CONFIG` (or the default path), then
    /// applies `TICKWIRE_PORT` / `TICKWIRE_DEBUG_LEVEL`.
    pub fn load(log: &ServerLog) -> Self {
        let path = std::env::var("TICKWIRE_CONFIG")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_with_env(&path, |name| std::env::var(name).ok(), log)
    }

    /// Env overrides only reach the file when it did not exist yet, in which
    /// case it is written with the effective values. An existing file keeps
    /// its own values. `log` adopts the effective debug level.
    pub fn load_with_env(
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
        log: &ServerLog,
    ) -> Self {
        if !path.exists() {
            let mut config = ServerConfig::default();
            config.apply_env_overrides(&env);
            config.validate(log);
            log.set_debug_level(config.debug_level());
            config.save(path, log);
            return config;
        }
        let mut config = Self::load_from(path, log);
        config.apply_env_overrides(&env);
        config.validate(log);
        log.set_debug_level(config.debug_level());
        config
    }

    /// Reads a config file. A missing file is created with defaults; a
    /// malformed one is reported and ignored.
    pub fn load_from(path: &Path, log: &ServerLog) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<ServerConfig>(&contents) {
                Ok(mut cfg) => {
                    let changed = cfg.validate(log);
                    log.set_debug_level(cfg.debug_level());
                    log.log_message(
                        format!("Loaded config from {}", path.display()),
                        LogLevel::Raised,
                    );
                    if changed {
                        cfg.save(path, log);
                    }
                    cfg
                }
                Err(e) => {
                    log.warn(format!("Failed to parse {}: {e}", path.display()));
                    ServerConfig::default()
                }
            },
            Err(_) => {
                let cfg = ServerConfig::default();
                cfg.save(path, log);
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self, env: &impl Fn(&str) -> Option<String>) {
        if let Some(port) = env_i64(env, "TICKWIRE_PORT") {
            self.listening_port = port;
        }
        if let Some(level) = env_i64(env, "TICKWIRE_DEBUG_LEVEL") {
            self.debug_level = level;
        }
    }

    /// Resets out-of-range values to their defaults. Returns true if
    /// anything changed.
    pub fn validate(&mut self, log: &ServerLog) -> bool {
        let mut changed = false;
        if !(1..=i64::from(u16::MAX)).contains(&self.listening_port) {
            self.listening_port = i64::from(DEFAULT_PORT);
            log.log_message(
                format!("Listening port was invalid. Reset to default {DEFAULT_PORT}."),
                LogLevel::Normal,
            );
            changed = true;
        }
        if !(0..=i64::from(LogLevel::MAX)).contains(&self.debug_level) {
            self.debug_level = 0;
            log.log_message("Debug level was invalid. Reset to default 0.", LogLevel::Normal);
            changed = true;
        }
        changed
    }

    pub fn save(&self, path: &Path, log: &ServerLog) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let result = serde_json::to_string_pretty(self)
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::write(path, json));
        if let Err(e) = result {
            log.warn(format!("Failed to write {}: {e}", path.display()));
        }
    }
}

fn env_i64(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<i64> {
    env(name).and_then(|v| v.trim().parse::<i64>().ok())
}
