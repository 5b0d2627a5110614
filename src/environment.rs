use std::fmt;
use std::path::PathBuf;

/// Key variables, first non-empty wins.
pub const ENV_API_KEY: &[&str] = &[
    "EXOSCALE_API_KEY",
    "EXOSCALE_KEY",
    "CLOUDSTACK_KEY",
    "CLOUDSTACK_API_KEY",
];
/// Secret variables, first non-empty wins.
pub const ENV_API_SECRET: &[&str] = &[
    "EXOSCALE_API_SECRET",
    "EXOSCALE_SECRET",
    "EXOSCALE_SECRET_KEY",
    "CLOUDSTACK_SECRET",
    "CLOUDSTACK_SECRET_KEY",
];
pub const ENV_API_ENDPOINT: &str = "EXOSCALE_API_ENDPOINT";
pub const ENV_API_TIMEOUT: &str = "EXOSCALE_API_TIMEOUT";
pub const ENV_TRACE: &str = "EXOSCALE_TRACE";
pub const ENV_ACCOUNT: &str = "EXOSCALE_ACCOUNT";
pub const ENV_CONFIG: &str = "EXOSCALE_CONFIG";
pub const ENV_ZONE: &str = "EXO_ZONE";
pub const ENV_OUTPUT: &str = "EXO_OUTPUT";

/// Snapshot of the process environment taken once at startup. Everything
/// downstream reads from this instead of `std::env`.
#[derive(Clone, Default)]
pub struct Environment {
    pub xdg_config_home: Option<PathBuf>,
    pub home: Option<PathBuf>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_endpoint: Option<String>,
    /// Raw `EXOSCALE_API_TIMEOUT`, in minutes.
    pub api_timeout: Option<String>,
    /// `EXOSCALE_TRACE` is set: log HTTP round trips.
    pub trace: bool,
    pub account: Option<String>,
    pub config: Option<PathBuf>,
    pub zone: Option<String>,
    pub output: Option<String>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the snapshot from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let first = |names: &[&str]| names.iter().find_map(|&name| var(name));

        Self {
            xdg_config_home: var("XDG_CONFIG_HOME").map(PathBuf::from),
            home: var("HOME").map(PathBuf::from),
            api_key: first(ENV_API_KEY),
            api_secret: first(ENV_API_SECRET),
            api_endpoint: var(ENV_API_ENDPOINT),
            api_timeout: var(ENV_API_TIMEOUT),
            trace: var(ENV_TRACE).is_some(),
            account: var(ENV_ACCOUNT),
            config: var(ENV_CONFIG).map(PathBuf::from),
            zone: var(ENV_ZONE),
            output: var(ENV_OUTPUT),
        }
    }

    /// Both halves of the API credentials, or nothing.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => Some((key.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("xdg_config_home", &self.xdg_config_home)
            .field("home", &self.home)
            .field("api_key", &self.api_key)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "[REDACTED]"))
            .field("api_endpoint", &self.api_endpoint)
            .field("api_timeout", &self.api_timeout)
            .field("trace", &self.trace)
            .field("account", &self.account)
            .field("config", &self.config)
            .field("zone", &self.zone)
            .field("output", &self.output)
            .finish()
    }
}
