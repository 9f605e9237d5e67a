use std::num::NonZeroU64;
use std::path::PathBuf;
use std::time::Duration;

use crate::limits::DEFAULT_CONFERENCE_ROOM_ID;
use crate::model::ResourceId;

/// Where availability data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    Backend { url: String, token: Option<String> },
    Fixture(PathBuf),
}

/// Start-up settings, read once from `BAYCHECK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub password: String,
    pub max_connections: usize,
    pub source: FeedSource,
    pub conference_room_id: ResourceId,
    pub sweep_interval: Duration,
    pub http_timeout: Duration,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
    MissingSource,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "{var}: cannot parse {value:?}"),
            ConfigError::MissingSource => {
                write!(f, "set BAYCHECK_BACKEND_URL, or BAYCHECK_FIXTURE for offline data")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let source = match (get("BAYCHECK_FIXTURE"), get("BAYCHECK_BACKEND_URL")) {
            (Some(path), _) => FeedSource::Fixture(PathBuf::from(path)),
            (None, Some(url)) => FeedSource::Backend {
                url,
                token: get("BAYCHECK_BACKEND_TOKEN"),
            },
            (None, None) => return Err(ConfigError::MissingSource),
        };

        Ok(Self {
            port: parsed(&get, "BAYCHECK_PORT")?.unwrap_or(5434),
            bind: get("BAYCHECK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            password: get("BAYCHECK_PASSWORD").unwrap_or_else(|| "baycheck".into()),
            max_connections: parsed(&get, "BAYCHECK_MAX_CONNECTIONS")?.unwrap_or(256),
            source,
            conference_room_id: parsed(&get, "BAYCHECK_CONFERENCE_ROOM_ID")?.unwrap_or(DEFAULT_CONFERENCE_ROOM_ID),
            sweep_interval: seconds(&get, "BAYCHECK_SWEEP_INTERVAL_SECS", 30)?,
            http_timeout: seconds(&get, "BAYCHECK_HTTP_TIMEOUT_SECS", 10)?,
            metrics_port: parsed(&get, "BAYCHECK_METRICS_PORT")?,
            tls_cert: get("BAYCHECK_TLS_CERT"),
            tls_key: get("BAYCHECK_TLS_KEY"),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parsed<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(var)
        .map(|value| value.trim().parse().map_err(|_| ConfigError::Invalid { var, value }))
        .transpose()
}

/// A whole number of seconds; zero is rejected.
fn seconds(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let secs = parsed::<NonZeroU64>(get, var)?.map_or(default, NonZeroU64::get);
    Ok(Duration::from_secs(secs))
}
