use std::path::PathBuf;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time bound for a single pipeline stage (default: `300`).
    pub stage_timeout_secs: u64,
    /// JSON rule table; the built-in table is used when unset.
    pub assumption_rules_path: Option<PathBuf>,
    /// Fallback polling interval advertised to clients (default: `2000`).
    pub status_poll_interval_ms: u64,
    /// How long shutdown waits for active runs to finish (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `3000`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `STAGE_TIMEOUT_SECS`      | `300`                   |
    /// | `ASSUMPTION_RULES_PATH`   | unset                   |
    /// | `STATUS_POLL_INTERVAL_MS` | `2000`                  |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `30`                    |
    ///
    /// Panics on unparseable values; misconfiguration should stop startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = env_u64("REQUEST_TIMEOUT_SECS", 30);
        let stage_timeout_secs = env_u64("STAGE_TIMEOUT_SECS", 300);
        let status_poll_interval_ms = env_u64("STATUS_POLL_INTERVAL_MS", 2000);
        let shutdown_timeout_secs = env_u64("SHUTDOWN_TIMEOUT_SECS", 30);

        let assumption_rules_path = std::env::var("ASSUMPTION_RULES_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            stage_timeout_secs,
            assumption_rules_path,
            status_poll_interval_ms,
            shutdown_timeout_secs,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        Err(_) => default,
    }
}
