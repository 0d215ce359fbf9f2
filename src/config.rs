use crate::error::{Result, TailError};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiServerConfig,
    /// Container runtime connection
    pub docker: DockerConfig,
    /// Log fan-out tuning
    pub stream: StreamConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port for the API server (default: 3100)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Allowed CORS origins (comma-separated, empty = localhost only)
    pub cors_origins: Vec<String>,
    /// Directory holding index.html and the static assets
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerEndpoint {
    /// Unix domain socket path
    Unix(PathBuf),
    /// host:port reachable over plain TCP
    Tcp(String),
}

#[derive(Debug, Clone)]
pub struct DockerConfig {
    pub endpoint: DockerEndpoint,
    /// Optional API version prefix, e.g. "1.43"
    pub api_version: Option<String>,
    /// Value for the logs `tail` parameter ("0" starts at the live edge)
    pub log_tail: String,
    /// Docker client request timeout
    pub request_timeout: Duration,
}

/// Sizing and lifecycle knobs for the per-workload hubs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Replay buffer capacity per workload
    pub buffer_capacity: usize,
    /// Pending lines a subscriber may have queued before it is dropped
    pub subscriber_queue: usize,
    /// How long a hub without subscribers (or an ended hub) is kept warm
    pub idle_timeout: Duration,
    /// How often the registry looks for idle hubs
    pub sweep_interval: Duration,
    /// Longest a single frame write to a viewer may block
    pub send_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 400,
            subscriber_queue: 256,
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(15),
            send_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            api: ApiServerConfig {
                port: get_env_or("API_PORT", "3100").parse().map_err(|_| {
                    TailError::InvalidConfig("API_PORT must be a valid port number".into())
                })?,
                host: get_env_or("API_HOST", "0.0.0.0"),
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                static_dir: PathBuf::from(get_env_or("STATIC_DIR", "static")),
            },
            docker: DockerConfig {
                endpoint: parse_docker_host(&get_env_or(
                    "DOCKER_HOST",
                    "unix:///var/run/docker.sock",
                ))?,
                api_version: env::var("DOCKER_API_VERSION")
                    .ok()
                    .map(|v| v.trim().trim_start_matches('v').to_string())
                    .filter(|v| !v.is_empty()),
                log_tail: parse_log_tail(&get_env_or("DOCKER_LOG_TAIL", "0"))?,
                request_timeout: Duration::from_secs(parse_env("DOCKER_TIMEOUT_SECS", 10)?),
            },
            stream: StreamConfig {
                buffer_capacity: parse_positive("LOG_BUFFER_SIZE", 400)?,
                subscriber_queue: parse_positive("SUBSCRIBER_QUEUE_SIZE", 256)?,
                idle_timeout: Duration::from_secs(parse_env("HUB_IDLE_TIMEOUT_SECS", 60)?),
                sweep_interval: Duration::from_secs(
                    parse_positive("HUB_SWEEP_INTERVAL_SECS", 15)? as u64,
                ),
                send_timeout: Duration::from_secs(
                    parse_positive("VIEWER_SEND_TIMEOUT_SECS", 10)? as u64,
                ),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the API server address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_docker_host(raw: &str) -> Result<DockerEndpoint> {
    let raw = raw.trim();
    let url = Url::parse(raw).map_err(|e| {
        TailError::InvalidConfig(format!("DOCKER_HOST must be a valid URL: {}", e))
    })?;

    match url.scheme() {
        "unix" => {
            let path = url.path();
            if path.is_empty() || path == "/" {
                return Err(TailError::InvalidConfig(
                    "DOCKER_HOST unix socket must include a path".into(),
                ));
            }
            Ok(DockerEndpoint::Unix(PathBuf::from(path)))
        }
        "tcp" | "http" => {
            let host = url.host_str().ok_or_else(|| {
                TailError::InvalidConfig("DOCKER_HOST must include a host".into())
            })?;
            let port = url.port().unwrap_or(2375);
            Ok(DockerEndpoint::Tcp(format!("{}:{}", host, port)))
        }
        other => Err(TailError::InvalidConfig(format!(
            "DOCKER_HOST has unsupported scheme: {}",
            other
        ))),
    }
}

fn parse_log_tail(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw == "all" || raw.parse::<u64>().is_ok() {
        Ok(raw.to_string())
    } else {
        Err(TailError::InvalidConfig(
            "DOCKER_LOG_TAIL must be a number or \"all\"".into(),
        ))
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| TailError::InvalidConfig(format!("{} must be a valid number", key))),
        Err(_) => Ok(default),
    }
}

fn parse_positive(key: &str, default: usize) -> Result<usize> {
    let value: usize = parse_env(key, default)?;
    if value == 0 {
        return Err(TailError::InvalidConfig(format!(
            "{} must be greater than zero",
            key
        )));
    }
    Ok(value)
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "API_PORT",
        "API_HOST",
        "CORS_ORIGINS",
        "STATIC_DIR",
        "DOCKER_HOST",
        "DOCKER_API_VERSION",
        "DOCKER_LOG_TAIL",
        "DOCKER_TIMEOUT_SECS",
        "LOG_BUFFER_SIZE",
        "SUBSCRIBER_QUEUE_SIZE",
        "HUB_IDLE_TIMEOUT_SECS",
        "HUB_SWEEP_INTERVAL_SECS",
        "VIEWER_SEND_TIMEOUT_SECS",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert_eq!(config.api.port, 3100);
        assert_eq!(config.api.host, "0.0.0.0");
        assert!(config.api.cors_origins.is_empty());
        assert_eq!(config.api.static_dir, PathBuf::from("static"));

        assert_eq!(
            config.docker.endpoint,
            DockerEndpoint::Unix(PathBuf::from("/var/run/docker.sock"))
        );
        assert!(config.docker.api_version.is_none());
        assert_eq!(config.docker.log_tail, "0");
        assert_eq!(config.docker.request_timeout, Duration::from_secs(10));

        assert_eq!(config.stream, StreamConfig::default());
        assert_eq!(config.stream.buffer_capacity, 400);
        assert_eq!(config.log.format, "pretty");
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("API_PORT", "9001");
        env::set_var("API_HOST", "127.0.0.1");
        env::set_var("CORS_ORIGINS", "https://a.example, https://b.example");
        env::set_var("DOCKER_HOST", "tcp://docker.example:2376");
        env::set_var("DOCKER_API_VERSION", "v1.43");
        env::set_var("DOCKER_LOG_TAIL", "all");
        env::set_var("LOG_BUFFER_SIZE", "2");
        env::set_var("SUBSCRIBER_QUEUE_SIZE", "8");
        env::set_var("HUB_IDLE_TIMEOUT_SECS", "0");

        let config = Config::from_env().unwrap();

        assert_eq!(config.api.port, 9001);
        assert_eq!(config.api_addr(), "127.0.0.1:9001");
        assert_eq!(
            config.api.cors_origins,
            vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ]
        );
        assert_eq!(
            config.docker.endpoint,
            DockerEndpoint::Tcp("docker.example:2376".to_string())
        );
        assert_eq!(config.docker.api_version.as_deref(), Some("1.43"));
        assert_eq!(config.docker.log_tail, "all");
        assert_eq!(config.stream.buffer_capacity, 2);
        assert_eq!(config.stream.subscriber_queue, 8);
        assert_eq!(config.stream.idle_timeout, Duration::ZERO);
    }

    #[test]
    fn test_config_from_env_invalid_port() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("API_PORT", "not-a-port");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, TailError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_rejects_zero_buffer() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("LOG_BUFFER_SIZE", "0");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, TailError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_rejects_bad_log_tail() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("DOCKER_LOG_TAIL", "last-ten");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, TailError::InvalidConfig(_)));
    }

    #[test]
    fn test_parse_docker_host_variants() {
        assert_eq!(
            parse_docker_host("unix:///run/user/1000/docker.sock").unwrap(),
            DockerEndpoint::Unix(PathBuf::from("/run/user/1000/docker.sock"))
        );
        assert_eq!(
            parse_docker_host("tcp://10.0.0.5").unwrap(),
            DockerEndpoint::Tcp("10.0.0.5:2375".to_string())
        );
        assert!(matches!(
            parse_docker_host("npipe:////./pipe/docker_engine"),
            Err(TailError::InvalidConfig(_))
        ));
        assert!(matches!(
            parse_docker_host("not a url"),
            Err(TailError::InvalidConfig(_))
        ));
    }
}
