//! YAML configuration for the discovery adapter.
//!
//! Credentials may be left out of the file and are then taken from the
//! `ALIYUN_ACCESS_KEY_ID` / `ALIYUN_SECRET_ACCESS_KEY` environment
//! variables. Configuration errors are fatal; the process refuses to start
//! on missing credentials or an empty filter value.

use std::path::Path;

pub const ACCESS_KEY_ENV: &str = "ALIYUN_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV: &str = "ALIYUN_SECRET_ACCESS_KEY";

const DEFAULT_REGION: &str = "cn-beijing";
const DEFAULT_PORT: u16 = 80;
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file `{path}`: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML: {0}")]
    Parse(#[source] serde_yaml::Error),
    #[error("aliyun access_key/secret_key not configured")]
    MissingCredentials,
    #[error("filter `{0}` has an empty value")]
    EmptyFilterValue(String),
    #[error("refresh_interval must be at least one second")]
    InvalidRefreshInterval,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub ecs_sd_config: SdConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SdConfig {
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Discovery refresh interval in seconds.
    pub refresh_interval: u64,
    /// Port joined to each instance's private IP to form the target address.
    pub port: u16,
    pub filters: Vec<Filter>,
}

impl Default for SdConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_owned(),
            access_key: String::new(),
            secret_key: String::new(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL_SECS,
            port: DEFAULT_PORT,
            filters: Vec::default(),
        }
    }
}

/// A named filter applied to every inventory listing call.
///
/// Recognized names are `InstanceIds`, `Status`, `Tag` and `InstanceName`;
/// unrecognized names are carried but ignored by the client.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    pub name: String,
    pub value: String,
}

impl SdConfig {
    fn validate(mut self) -> Result<Self> {
        if self.region.is_empty() {
            self.region = DEFAULT_REGION.to_owned();
        }
        if self.access_key.is_empty() {
            self.access_key = std::env::var(ACCESS_KEY_ENV).unwrap_or_default();
        }
        if self.secret_key.is_empty() {
            self.secret_key = std::env::var(SECRET_KEY_ENV).unwrap_or_default();
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(Error::MissingCredentials);
        }
        if self.refresh_interval == 0 {
            return Err(Error::InvalidRefreshInterval);
        }
        for filter in &self.filters {
            if filter.value.is_empty() {
                return Err(Error::EmptyFilterValue(filter.name.clone()));
            }
        }

        Ok(self)
    }
}

/// Parses and validates the YAML input `s`.
pub fn load(s: &str) -> Result<Config> {
    let mut config: Config = serde_yaml::from_str(s).map_err(Error::Parse)?;
    config.ecs_sd_config = config.ecs_sd_config.validate()?;
    Ok(config)
}

/// Reads, parses and validates the given YAML file.
pub fn load_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| Error::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    load(&content)
}
