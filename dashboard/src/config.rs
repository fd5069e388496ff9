use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use lib_livefeed::ReconnectPolicy;
use lib_livefeed::boards::SessionFilter;
use lib_livefeed::model::SessionStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Headless live mirror of the monitoring dashboard", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "DASHBOARD_SERVER_URL", help = "Base URL of the monitoring backend.")]
    pub server_url: Option<String>,

    #[clap(long, env = "DASHBOARD_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "DASHBOARD_WS_PATH", help = "Path of the feed endpoint on the server.")]
    pub ws_path: Option<String>,

    #[clap(long, env = "DASHBOARD_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "DASHBOARD_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "DASHBOARD_RECONNECT_BASE_DELAY_MS", help = "Base delay in milliseconds for feed reconnect attempts.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "DASHBOARD_RECONNECT_MAX_DELAY_MS", help = "Maximum delay in milliseconds for feed reconnect attempts.")]
    pub reconnect_max_delay_ms: Option<u64>,

    #[clap(long, env = "DASHBOARD_MAX_RECONNECT_ATTEMPTS", help = "Consecutive failed attempts before the feed gives up.")]
    pub max_reconnect_attempts: Option<u32>,

    #[clap(long, env = "DASHBOARD_HEARTBEAT_INTERVAL_MS", help = "Keepalive ping interval in milliseconds; 0 disables pings.")]
    pub heartbeat_interval_ms: Option<u64>,

    #[clap(long, env = "DASHBOARD_FILTER_USER", help = "Only mirror sessions of this user id.")]
    pub filter_user: Option<String>,

    #[clap(long, env = "DASHBOARD_FILTER_STATUS", help = "Only mirror sessions with this status (ACTIVE or STOPPED).")]
    pub filter_status: Option<String>,

    #[clap(long, env = "DASHBOARD_WATCH_SESSION", help = "Mirror the detail view of this session instead of the boards.")]
    pub watch_session: Option<Uuid>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            server_url: other.server_url.or(self.server_url),
            config_path: other.config_path.or(self.config_path),
            ws_path: other.ws_path.or(self.ws_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            max_reconnect_attempts: other.max_reconnect_attempts.or(self.max_reconnect_attempts),
            heartbeat_interval_ms: other.heartbeat_interval_ms.or(self.heartbeat_interval_ms),
            filter_user: other.filter_user.or(self.filter_user),
            filter_status: other.filter_status.or(self.filter_status),
            watch_session: other.watch_session.or(self.watch_session),
        }
    }
}

/// Fully resolved configuration handed to the rest of the binary.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server_url: String,
    pub ws_path: String,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub heartbeat_interval_ms: u64,
    pub filter_user: Option<String>,
    pub filter_status: Option<String>,
    pub watch_session: Option<Uuid>,
}

impl Settings {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect_base_delay_ms),
            Duration::from_millis(self.reconnect_max_delay_ms),
            self.max_reconnect_attempts,
        )
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// The session filter selected on the command line. An unrecognized
    /// status is dropped with a warning rather than failing startup.
    pub fn session_filter(&self) -> SessionFilter {
        let status = match self.filter_status.as_deref() {
            None => None,
            Some("ACTIVE") => Some(SessionStatus::Active),
            Some("STOPPED") => Some(SessionStatus::Stopped),
            Some(other) => {
                log::warn!("ignoring unknown session status filter '{other}'");
                None
            }
        };
        SessionFilter {
            user_id: self.filter_user.clone(),
            status,
        }
    }
}

pub fn load_config() -> Settings {
    // 1. Load defaults
    let default_config = Config {
        server_url: Some("http://localhost:8080".to_string()),
        ws_path: Some("/ws".to_string()),
        log_dir: Some(PathBuf::from("./logs")),
        log_level: Some("info".to_string()),
        reconnect_base_delay_ms: Some(1000),
        reconnect_max_delay_ms: Some(30000),
        max_reconnect_attempts: Some(10),
        heartbeat_interval_ms: Some(4000),
        ..Default::default()
    };

    // 2. Parse CLI arguments (clap also reads the environment variables).
    let cli_args = Config::parse();

    // 3. Load the config file if present; CLI may override its location.
    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("dashboard.conf"));

    let mut current_config = default_config;

    if config_file_path.exists() {
        if let Ok(config_str) = fs::read_to_string(&config_file_path) {
            if let Ok(file_config) = serde_json::from_str::<Config>(&config_str) {
                current_config = current_config.merge(file_config);
            } else {
                log::warn!(
                    "Failed to parse config file: {}. Falling back to other sources.",
                    config_file_path.display()
                );
            }
        } else {
            log::warn!(
                "Failed to read config file: {}. Falling back to other sources.",
                config_file_path.display()
            );
        }
    }

    // 4. CLI and environment win over file and defaults.
    let merged = current_config.merge(cli_args);

    Settings {
        server_url: merged.server_url.unwrap_or_else(|| "http://localhost:8080".to_string()),
        ws_path: merged.ws_path.unwrap_or_else(|| "/ws".to_string()),
        log_dir: merged.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
        log_level: merged.log_level.unwrap_or_else(|| "info".to_string()),
        reconnect_base_delay_ms: merged.reconnect_base_delay_ms.unwrap_or(1000),
        reconnect_max_delay_ms: merged.reconnect_max_delay_ms.unwrap_or(30000),
        max_reconnect_attempts: merged.max_reconnect_attempts.unwrap_or(10),
        heartbeat_interval_ms: merged.heartbeat_interval_ms.unwrap_or(4000),
        filter_user: merged.filter_user,
        filter_status: merged.filter_status,
        watch_session: merged.watch_session,
    }
}
