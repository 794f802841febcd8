//! Configuration for vendor credentials, endpoints and HTTP behaviour.
//!
//! A [`BraidConfig`] can be loaded from a TOML, YAML or JSON file, from
//! environment variables, or from a file with environment overrides on top.
//! Callers turn it into per-turn [`VendorCredentials`] with
//! [`BraidConfig::credentials_for`].

use crate::llm::traits::{Vendor, VendorCredentials};
use crate::telemetry::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable parsing error: {0}")]
    EnvVarParse(String),
    #[error("File parsing error: {0}")]
    FileParse(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BraidConfig {
    /// Per-vendor settings keyed by vendor name
    #[serde(default)]
    pub vendors: HashMap<Vendor, VendorSettings>,
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for one vendor
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct VendorSettings {
    pub api_key: Option<String>,
    /// Override for the vendor's default endpoint
    pub base_url: Option<String>,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    /// Path to a service account JSON key (Vertex)
    pub service_account_path: Option<PathBuf>,
    pub region: Option<String>,
}

impl std::fmt::Debug for VendorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use crate::utils::logging::obscure_credential;
        f.debug_struct("VendorSettings")
            .field("api_key", &self.api_key.as_deref().map(obscure_credential))
            .field("base_url", &self.base_url)
            .field(
                "extra_headers",
                &self.extra_headers.keys().collect::<Vec<_>>(),
            )
            .field("service_account_path", &self.service_account_path)
            .field("region", &self.region)
            .finish()
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connect timeout in seconds
    #[serde(with = "duration_seconds", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Whole-request timeout in seconds; streams are unbounded when unset
    #[serde(with = "optional_duration_seconds", default)]
    pub request_timeout: Option<Duration>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: None,
        }
    }
}

impl HttpConfig {
    /// Build a reqwest client honouring these timeouts
    pub fn build_client(&self) -> Result<reqwest::Client, ConfigError> {
        let mut builder = reqwest::Client::builder().connect_timeout(self.connect_timeout);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| ConfigError::Validation(format!("HTTP client: {}", e)))
    }
}

impl BraidConfig {
    /// Load configuration from a file (supports TOML, YAML, JSON)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let extension = path.extension().and_then(|s| s.to_str());

        match extension {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            _ => Err(ConfigError::FileParse(
                "Unsupported file format. Use .toml, .yaml, .yml, or .json".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for vendor in Vendor::ALL {
            let settings = vendor_settings_from_env(vendor);
            if settings.api_key.is_some()
                || settings.base_url.is_some()
                || settings.service_account_path.is_some()
                || settings.region.is_some()
            {
                config.vendors.insert(vendor, settings);
            }
        }

        if let Ok(timeout) = env::var("BRAID_HTTP_TIMEOUT") {
            let secs: u64 = timeout
                .parse()
                .map_err(|e| ConfigError::EnvVarParse(format!("BRAID_HTTP_TIMEOUT: {}", e)))?;
            config.http.request_timeout = Some(Duration::from_secs(secs));
        }
        if let Ok(timeout) = env::var("BRAID_CONNECT_TIMEOUT") {
            config.http.connect_timeout =
                Duration::from_secs(timeout.parse().map_err(|e| {
                    ConfigError::EnvVarParse(format!("BRAID_CONNECT_TIMEOUT: {}", e))
                })?);
        }

        config.logging = LoggingConfig::from_env();

        Ok(config)
    }

    /// Merge configuration with environment variable overrides
    pub fn merge_with_env(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;

        // Environment takes precedence field by field
        for (vendor, overrides) in env_config.vendors {
            let settings = self.vendors.entry(vendor).or_default();
            if overrides.api_key.is_some() {
                settings.api_key = overrides.api_key;
            }
            if overrides.base_url.is_some() {
                settings.base_url = overrides.base_url;
            }
            if overrides.service_account_path.is_some() {
                settings.service_account_path = overrides.service_account_path;
            }
            if overrides.region.is_some() {
                settings.region = overrides.region;
            }
        }

        if env::var("BRAID_HTTP_TIMEOUT").is_ok() {
            self.http.request_timeout = env_config.http.request_timeout;
        }
        if env::var("BRAID_CONNECT_TIMEOUT").is_ok() {
            self.http.connect_timeout = env_config.http.connect_timeout;
        }
        if env::var("BRAID_LOG_LEVEL").is_ok() {
            self.logging.level = env_config.logging.level;
        }
        if env::var("BRAID_LOG_DIR").is_ok() {
            self.logging.log_dir = env_config.logging.log_dir;
        }

        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (vendor, settings) in &self.vendors {
            if let Some(base_url) = &settings.base_url {
                url::Url::parse(base_url).map_err(|e| {
                    ConfigError::Validation(format!("{} base_url '{}': {}", vendor, base_url, e))
                })?;
            }
            if matches!(&settings.api_key, Some(key) if key.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "{} api_key cannot be empty",
                    vendor
                )));
            }
            if settings.service_account_path.is_some() && *vendor != Vendor::Vertex {
                return Err(ConfigError::Validation(format!(
                    "service_account_path is only used by vertex, not {}",
                    vendor
                )));
            }
        }

        if self.http.connect_timeout.as_secs() == 0 {
            return Err(ConfigError::Validation(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }
        if matches!(self.http.request_timeout, Some(t) if t.as_secs() == 0) {
            return Err(ConfigError::Validation(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the credentials for one vendor.
    ///
    /// A configured service account file is read here so the turn itself
    /// never touches the filesystem for credentials.
    pub fn credentials_for(&self, vendor: Vendor) -> Result<VendorCredentials, ConfigError> {
        let Some(settings) = self.vendors.get(&vendor) else {
            return Ok(VendorCredentials::default());
        };

        let service_account = match &settings.service_account_path {
            Some(path) => Some(fs::read_to_string(path)?),
            None => None,
        };

        Ok(VendorCredentials {
            api_key: settings.api_key.clone(),
            service_account,
            base_url: settings.base_url.clone(),
            region: settings.region.clone(),
            extra_headers: settings.extra_headers.clone(),
        })
    }

    /// Get the settings for a vendor, if any
    pub fn vendor(&self, vendor: Vendor) -> Option<&VendorSettings> {
        self.vendors.get(&vendor)
    }
}

fn vendor_settings_from_env(vendor: Vendor) -> VendorSettings {
    let prefix = vendor.as_str().to_uppercase();
    let mut settings = VendorSettings {
        api_key: vendor.api_key_env().and_then(|name| env::var(name).ok()),
        base_url: env::var(format!("{}_BASE_URL", prefix)).ok(),
        ..Default::default()
    };

    if vendor == Vendor::Vertex {
        settings.service_account_path = env::var("GOOGLE_APPLICATION_CREDENTIALS")
            .ok()
            .map(PathBuf::from);
        settings.region = env::var("VERTEX_REGION").ok();
    }

    settings
}

/// Custom serialization for Duration as seconds
mod duration_seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod optional_duration_seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}
