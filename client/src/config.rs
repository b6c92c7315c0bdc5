use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

use tracing::{info, warn};

pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_DATA_DIR: &str = ".palpites";

/// Network backend tried before falling back to local storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryBackend {
    Api,
    Cloud,
}

impl FromStr for PrimaryBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(PrimaryBackend::Api),
            "cloud" | "supabase" => Ok(PrimaryBackend::Cloud),
            other => Err(format!("unknown backend '{other}', expected 'api' or 'cloud'")),
        }
    }
}

impl fmt::Display for PrimaryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryBackend::Api => write!(f, "api"),
            PrimaryBackend::Cloud => write!(f, "cloud"),
        }
    }
}

/// How reads reach the primary backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPolicy {
    /// Attempt the read directly and fall back on failure
    Optimistic,
    /// Probe first and go straight to local storage when unreachable
    ProbeFirst,
}

impl FromStr for ReadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "optimistic" => Ok(ReadPolicy::Optimistic),
            "probe-first" | "probe" => Ok(ReadPolicy::ProbeFirst),
            other => Err(format!("unknown read policy '{other}'")),
        }
    }
}

impl fmt::Display for ReadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadPolicy::Optimistic => write!(f, "optimistic"),
            ReadPolicy::ProbeFirst => write!(f, "probe-first"),
        }
    }
}

/// Upper bounds for every network attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub write: Duration,
    pub read: Duration,
    pub probe: Duration,
    /// How long the cloud driver waits for credentials to show up
    pub config_wait: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            write: Duration::from_millis(10_000),
            read: Duration::from_millis(5_000),
            probe: Duration::from_millis(3_000),
            config_wait: Duration::from_millis(5_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin the site was loaded from; drives hosting detection and is the
    /// base URL of the REST API
    pub origin: String,
    pub primary: PrimaryBackend,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    /// Directory holding the local-storage file
    pub data_dir: PathBuf,
    pub timeouts: Timeouts,
    pub read_policy: ReadPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            primary: PrimaryBackend::Api,
            supabase_url: None,
            supabase_anon_key: None,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            timeouts: Timeouts::default(),
            read_policy: ReadPolicy::Optimistic,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            write: try_load_millis("PALPITES_WRITE_TIMEOUT_MS", defaults.write),
            read: try_load_millis("PALPITES_READ_TIMEOUT_MS", defaults.read),
            probe: try_load_millis("PALPITES_PROBE_TIMEOUT_MS", defaults.probe),
            config_wait: try_load_millis("PALPITES_CONFIG_WAIT_MS", defaults.config_wait),
        };

        Self {
            origin: try_load("PALPITES_ORIGIN", DEFAULT_ORIGIN.to_string()),
            primary: try_load("PALPITES_PRIMARY", PrimaryBackend::Api),
            supabase_url: non_empty_var("SUPABASE_URL"),
            supabase_anon_key: non_empty_var("SUPABASE_ANON_KEY"),
            data_dir: try_load("PALPITES_DATA_DIR", DEFAULT_DATA_DIR.to_string()).into(),
            timeouts,
            read_policy: try_load("PALPITES_READ_POLICY", ReadPolicy::Optimistic),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + fmt::Display,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}

fn try_load_millis(key: &str, default: Duration) -> Duration {
    Duration::from_millis(try_load(key, default.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!("api".parse::<PrimaryBackend>(), Ok(PrimaryBackend::Api));
        assert_eq!(" Cloud ".parse::<PrimaryBackend>(), Ok(PrimaryBackend::Cloud));
        assert!("sqlite".parse::<PrimaryBackend>().is_err());
    }

    #[test]
    fn test_read_policy_names() {
        assert_eq!("probe-first".parse::<ReadPolicy>(), Ok(ReadPolicy::ProbeFirst));
        assert_eq!("optimistic".parse::<ReadPolicy>(), Ok(ReadPolicy::Optimistic));
        assert!("eager".parse::<ReadPolicy>().is_err());
    }

    #[test]
    fn test_default_bounds() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.write, Duration::from_secs(10));
        assert_eq!(timeouts.read, Duration::from_secs(5));
        assert_eq!(timeouts.probe, Duration::from_secs(3));
        assert!(timeouts.probe < timeouts.read);
    }
}
