use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration loaded from environment variables or a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path to the DuckDB database file, or `:memory:` for an in-process
    /// store. If not set, the service runs in degraded mode: ingests are
    /// accepted and dropped, queries return empty results.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Allowed origin for browser CORS on the query endpoints.
    /// If not set, any origin is allowed.
    #[serde(default)]
    pub allowed_origin: Option<String>,
    /// Shared secret for the bearer-token auth gate on query endpoints.
    /// If not set, a random token is generated at startup (and logged).
    #[serde(default)]
    pub api_token: Option<String>,
    /// Rate-limit window length in seconds (default: 900 = 15 minutes).
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    /// Maximum requests per client address per window. 0 = no limit.
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,
    /// Maximum accepted ingest payload size in bytes (default: 10 MiB).
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    /// Timeout for a single storage write at the ingest endpoint, in seconds.
    #[serde(default = "default_storage_timeout_secs")]
    pub storage_timeout_secs: u64,
    /// Raw-event retention in days. 0 = unlimited (no eviction).
    #[serde(default)]
    pub retention_days: u32,
    /// Interval between maintenance sweeps in seconds (default: 3600).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    4600
}

const fn default_rate_limit_window_secs() -> u64 {
    900
}

const fn default_rate_limit_max_requests() -> u32 {
    1000
}

const fn default_max_payload_bytes() -> usize {
    10 * 1024 * 1024
}

const fn default_storage_timeout_secs() -> u64 {
    5
}

const fn default_cleanup_interval_secs() -> u64 {
    3600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_path: None,
            allowed_origin: None,
            api_token: None,
            rate_limit_window_secs: default_rate_limit_window_secs(),
            rate_limit_max_requests: default_rate_limit_max_requests(),
            max_payload_bytes: default_max_payload_bytes(),
            storage_timeout_secs: default_storage_timeout_secs(),
            retention_days: 0,
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Environment variables override file values:
    /// - `PULSE_HOST` → host
    /// - `PULSE_PORT` → port
    /// - `PULSE_DATABASE_PATH` → database_path
    /// - `PULSE_ALLOWED_ORIGIN` → allowed_origin
    /// - `PULSE_API_TOKEN` → api_token
    /// - `PULSE_RATE_LIMIT_WINDOW` → rate_limit_window_secs
    /// - `PULSE_RATE_LIMIT_MAX` → rate_limit_max_requests
    /// - `PULSE_MAX_PAYLOAD_BYTES` → max_payload_bytes
    /// - `PULSE_STORAGE_TIMEOUT` → storage_timeout_secs
    /// - `PULSE_RETENTION_DAYS` → retention_days
    /// - `PULSE_CLEANUP_INTERVAL` → cleanup_interval_secs
    pub fn load(config_path: Option<&Path>) -> Self {
        let mut config =
            config_path.map_or_else(Self::default, |path| match std::fs::read_to_string(path) {
                Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                    tracing::warn!("Failed to parse config file: {e}, using defaults");
                    Self::default()
                }),
                Err(e) => {
                    tracing::warn!("Failed to read config file: {e}, using defaults");
                    Self::default()
                }
            });

        if let Ok(host) = std::env::var("PULSE_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("PULSE_PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }
        if let Ok(path) = std::env::var("PULSE_DATABASE_PATH") {
            config.database_path = Some(PathBuf::from(path));
        }
        if let Ok(origin) = std::env::var("PULSE_ALLOWED_ORIGIN") {
            config.allowed_origin = Some(origin);
        }
        if let Ok(token) = std::env::var("PULSE_API_TOKEN") {
            config.api_token = Some(token);
        }
        if let Ok(val) = std::env::var("PULSE_RATE_LIMIT_WINDOW") {
            if let Ok(w) = val.parse() {
                config.rate_limit_window_secs = w;
            }
        }
        if let Ok(val) = std::env::var("PULSE_RATE_LIMIT_MAX") {
            if let Ok(m) = val.parse() {
                config.rate_limit_max_requests = m;
            }
        }
        if let Ok(val) = std::env::var("PULSE_MAX_PAYLOAD_BYTES") {
            if let Ok(b) = val.parse() {
                config.max_payload_bytes = b;
            }
        }
        if let Ok(val) = std::env::var("PULSE_STORAGE_TIMEOUT") {
            if let Ok(t) = val.parse() {
                config.storage_timeout_secs = t;
            }
        }
        if let Ok(val) = std::env::var("PULSE_RETENTION_DAYS") {
            if let Ok(d) = val.parse() {
                config.retention_days = d;
            }
        }
        if let Ok(val) = std::env::var("PULSE_CLEANUP_INTERVAL") {
            if let Ok(i) = val.parse() {
                config.cleanup_interval_secs = i;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    /// Serializes tests that touch `Config::load`, since it reads process
    /// environment variables and `test_env_var_overrides` mutates them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 4600);
        assert!(config.database_path.is_none());
        assert!(config.allowed_origin.is_none());
        assert!(config.api_token.is_none());
        assert_eq!(config.rate_limit_window_secs, 900);
        assert_eq!(config.rate_limit_max_requests, 1000);
        assert_eq!(config.max_payload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.storage_timeout_secs, 5);
        assert_eq!(config.retention_days, 0);
        assert_eq!(config.cleanup_interval_secs, 3600);
    }

    #[test]
    fn test_load_from_toml() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        write!(
            file,
            r#"
host = "127.0.0.1"
port = 9000
database_path = "/var/pulse/events.duckdb"
allowed_origin = "https://dashboard.example.com"
api_token = "s3cret"
rate_limit_window_secs = 60
rate_limit_max_requests = 50
max_payload_bytes = 1048576
storage_timeout_secs = 2
retention_days = 90
"#
        )
        .unwrap();

        let config = Config::load(Some(&config_path));
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/var/pulse/events.duckdb"))
        );
        assert_eq!(
            config.allowed_origin.as_deref(),
            Some("https://dashboard.example.com")
        );
        assert_eq!(config.api_token.as_deref(), Some("s3cret"));
        assert_eq!(config.rate_limit_window_secs, 60);
        assert_eq!(config.rate_limit_max_requests, 50);
        assert_eq!(config.max_payload_bytes, 1_048_576);
        assert_eq!(config.storage_timeout_secs, 2);
        assert_eq!(config.retention_days, 90);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let config = Config::load(Some(Path::new("/nonexistent/config.toml")));
        assert_eq!(config.port, 4600);
    }

    #[test]
    fn test_load_no_path_uses_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let config = Config::load(None);
        assert_eq!(config.port, 4600);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_env_var_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();

        let orig_port = std::env::var("PULSE_PORT").ok();
        let orig_token = std::env::var("PULSE_API_TOKEN").ok();

        std::env::set_var("PULSE_PORT", "3000");
        std::env::set_var("PULSE_API_TOKEN", "from-env");
        let config = Config::load(None);
        assert_eq!(config.port, 3000);
        assert_eq!(config.api_token.as_deref(), Some("from-env"));

        match orig_port {
            Some(v) => std::env::set_var("PULSE_PORT", v),
            None => std::env::remove_var("PULSE_PORT"),
        }
        match orig_token {
            Some(v) => std::env::set_var("PULSE_API_TOKEN", v),
            None => std::env::remove_var("PULSE_API_TOKEN"),
        }
    }

    #[test]
    fn test_invalid_toml_uses_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "this is not valid toml {{{").unwrap();

        let config = Config::load(Some(&config_path));
        assert_eq!(config.port, 4600);
    }
}
