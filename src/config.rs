use serde::{Deserialize, Serialize};
use std::{env, fs, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use crate::naming::{FilenameMetadata, PathComponent, ReplaceChar};

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub recorder: Recorder,
    #[serde(default)]
    pub naming: Naming,
    #[serde(default)]
    pub capture: Capture,
    #[serde(default)]
    pub scheduler: Scheduler,
    #[serde(default)]
    pub monitor: Monitor,
    #[serde(default)]
    pub stream: Stream,
    #[serde(default)]
    pub catalog: Catalog,
    #[serde(default)]
    pub webhook: Webhook,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Http {
    #[serde(default = "default_http_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `compact` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recorder {
    /// Final output location, also the volume checked for free space
    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: PathBuf,
    /// Working directory for segments, `<recordings_dir>/tmp` when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Used when the profile carries no `-b:v` argument (~2 Mbps)
    #[serde(default = "default_bytes_per_second")]
    pub default_bytes_per_second: u64,
    #[serde(default = "default_disk_safety_margin")]
    pub disk_safety_margin: f64,
}

impl Recorder {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| self.recordings_dir.join("tmp"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Naming {
    #[serde(default = "default_path_structure")]
    pub path_structure: Vec<PathComponent>,
    #[serde(default)]
    pub filename_metadata: Vec<FilenameMetadata>,
    #[serde(default)]
    pub name_filter_enabled: bool,
    #[serde(default)]
    pub name_filter_patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub clean_special_chars: bool,
    #[serde(default)]
    pub replace_char: ReplaceChar,
    #[serde(default = "default_true")]
    pub remove_consecutive_chars: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capture {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_size_refresh_interval")]
    pub size_refresh_interval: u64,
    /// Seconds past the padded end before a running capture is stopped
    #[serde(default = "default_end_grace")]
    pub end_grace: u64,
    /// Milliseconds to wait for exit after a stop request before killing
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: u64,
    /// Exit code ffmpeg reports when the upstream ended on its own
    #[serde(default = "default_natural_end_exit_code")]
    pub natural_end_exit_code: i32,
    /// Milliseconds for the concat run
    #[serde(default = "default_concat_timeout")]
    pub concat_timeout: u64,
}

impl Capture {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    pub fn size_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.size_refresh_interval)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scheduler {
    #[serde(default = "default_tick_time")]
    pub tick_time: u64,
    /// Window around now, in seconds, for picking up scheduled starts
    #[serde(default = "default_lookbehind")]
    pub lookbehind: i64,
    #[serde(default = "default_lookahead")]
    pub lookahead: i64,
    /// Padded starts at most this many seconds ahead dispatch immediately
    #[serde(default = "default_immediate_threshold")]
    pub immediate_threshold: i64,
    /// Seconds between two retries of the same recording
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    #[serde(default = "default_tick_time")]
    pub tick_time: u64,
    /// Seconds
    #[serde(default = "default_max_recording_duration")]
    pub max_recording_duration: i64,
    /// Seconds past the padded end before a long capture counts as stuck
    #[serde(default = "default_end_grace_secs")]
    pub stuck_grace: i64,
    /// Seconds past `scheduled_start` before a scheduled entry counts as missed
    #[serde(default = "default_missed_start")]
    pub missed_start: i64,
    #[serde(default = "default_disk_warn_bytes")]
    pub disk_warn_bytes: u64,
    #[serde(default = "default_disk_critical_bytes")]
    pub disk_critical_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    /// Base URL of the stream proxy, prefixed to returned endpoints
    #[serde(default = "default_proxy_host")]
    pub proxy_host: String,
    #[serde(default = "default_create_path")]
    pub create_path: String,
    #[serde(default)]
    pub api_token: Option<String>,
    /// Milliseconds
    #[serde(default = "default_stream_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// TOML file describing channels, episodes, series, sources and profiles
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Webhook {
    #[serde(default)]
    pub webhooks: Vec<String>,
}

fn default_http_listen() -> SocketAddr {
    SocketAddr::from_str(&format!(
        "0.0.0.0:{}",
        env::var("PORT").unwrap_or(String::from("8899"))
    ))
    .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8899)))
}

fn default_log_level() -> String {
    env::var("LOG_LEVEL").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug".to_string()
        } else {
            "info".to_string()
        }
    })
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_database_url() -> String {
    env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://dvrman.db?mode=rwc".to_string())
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_recordings_dir() -> PathBuf {
    PathBuf::from("./recordings")
}

fn default_bytes_per_second() -> u64 {
    250_000
}

fn default_disk_safety_margin() -> f64 {
    1.1
}

fn default_path_structure() -> Vec<PathComponent> {
    vec![PathComponent::Type]
}

fn default_true() -> bool {
    true
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_poll_interval() -> u64 {
    10 * 1000
}

fn default_size_refresh_interval() -> u64 {
    30 * 1000
}

fn default_end_grace() -> u64 {
    10 * 60
}

fn default_end_grace_secs() -> i64 {
    10 * 60
}

fn default_stop_timeout() -> u64 {
    30 * 1000
}

fn default_natural_end_exit_code() -> i32 {
    255
}

fn default_concat_timeout() -> u64 {
    60 * 60 * 1000
}

fn default_tick_time() -> u64 {
    60 * 1000
}

fn default_lookbehind() -> i64 {
    60
}

fn default_lookahead() -> i64 {
    120
}

fn default_immediate_threshold() -> i64 {
    0
}

fn default_retry_backoff() -> i64 {
    5 * 60
}

fn default_max_recording_duration() -> i64 {
    12 * 60 * 60
}

fn default_missed_start() -> i64 {
    5 * 60
}

fn default_disk_warn_bytes() -> u64 {
    5 * 1024 * 1024 * 1024
}

fn default_disk_critical_bytes() -> u64 {
    1024 * 1024 * 1024
}

fn default_proxy_host() -> String {
    env::var("STREAM_PROXY_HOST").unwrap_or_else(|_| "http://127.0.0.1:8085".to_string())
}

fn default_create_path() -> String {
    "/transcode".to_string()
}

fn default_stream_timeout() -> u64 {
    10 * 1000
}

impl Default for Http {
    fn default() -> Self {
        Self {
            listen: default_http_listen(),
            cors: Default::default(),
        }
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self {
            recordings_dir: default_recordings_dir(),
            temp_dir: None,
            default_bytes_per_second: default_bytes_per_second(),
            disk_safety_margin: default_disk_safety_margin(),
        }
    }
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            path_structure: default_path_structure(),
            filename_metadata: vec![],
            name_filter_enabled: false,
            name_filter_patterns: vec![],
            clean_special_chars: true,
            replace_char: ReplaceChar::default(),
            remove_consecutive_chars: true,
        }
    }
}

impl Default for Capture {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            poll_interval: default_poll_interval(),
            size_refresh_interval: default_size_refresh_interval(),
            end_grace: default_end_grace(),
            stop_timeout: default_stop_timeout(),
            natural_end_exit_code: default_natural_end_exit_code(),
            concat_timeout: default_concat_timeout(),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            tick_time: default_tick_time(),
            lookbehind: default_lookbehind(),
            lookahead: default_lookahead(),
            immediate_threshold: default_immediate_threshold(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            tick_time: default_tick_time(),
            max_recording_duration: default_max_recording_duration(),
            stuck_grace: default_end_grace_secs(),
            missed_start: default_missed_start(),
            disk_warn_bytes: default_disk_warn_bytes(),
            disk_critical_bytes: default_disk_critical_bytes(),
        }
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self {
            proxy_host: default_proxy_host(),
            create_path: default_create_path(),
            api_token: None,
            timeout: default_stream_timeout(),
        }
    }
}

impl Config {
    pub fn parse(path: Option<String>) -> anyhow::Result<Self> {
        let result = fs::read_to_string(path.unwrap_or(String::from("dvrman.toml")))
            .or(fs::read_to_string("/etc/dvrman/dvrman.toml"))
            .unwrap_or("".to_string());
        let cfg: Self = toml::from_str(result.as_str())
            .map_err(|e| anyhow::anyhow!("config parse error: {}", e))?;
        cfg.validate()
            .map_err(|e| anyhow::anyhow!("config validate [{}]", e))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.capture.poll_interval == 0 {
            return Err(anyhow::anyhow!("capture.poll_interval must be positive"));
        }
        if self.scheduler.tick_time == 0 || self.monitor.tick_time == 0 {
            return Err(anyhow::anyhow!("tick_time must be positive"));
        }
        if self.recorder.recordings_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("recorder.recordings_dir is empty"));
        }
        if self.recorder.disk_safety_margin < 1.0 {
            return Err(anyhow::anyhow!(
                "recorder.disk_safety_margin must be at least 1.0"
            ));
        }
        if self.monitor.disk_critical_bytes > self.monitor.disk_warn_bytes {
            return Err(anyhow::anyhow!(
                "monitor.disk_critical_bytes exceeds monitor.disk_warn_bytes"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.capture.poll_interval(), Duration::from_secs(10));
        assert_eq!(cfg.capture.natural_end_exit_code, 255);
        assert_eq!(cfg.scheduler.retry_backoff, 300);
        assert_eq!(cfg.monitor.max_recording_duration, 12 * 3600);
        assert_eq!(cfg.recorder.temp_dir(), PathBuf::from("./recordings/tmp"));
        assert_eq!(cfg.naming.path_structure, vec![PathComponent::Type]);
    }

    #[test]
    fn test_naming_section() {
        let cfg: Config = toml::from_str(
            r#"
            [naming]
            path_structure = ["category", "series", "season"]
            filename_metadata = ["date", "season", "episode"]
            replace_char = "dash"
            "#,
        )
        .unwrap();
        assert_eq!(
            cfg.naming.path_structure,
            vec![
                PathComponent::Category,
                PathComponent::Series,
                PathComponent::Season
            ]
        );
        assert_eq!(cfg.naming.replace_char, ReplaceChar::Dash);
        assert!(cfg.naming.clean_special_chars);
    }

    #[test]
    fn test_validate_rejects_zero_poll() {
        let cfg: Config = toml::from_str("[capture]\npoll_interval = 0").unwrap();
        assert!(cfg.validate().is_err());
    }
}
