use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{OtsError, OtsResult};
use crate::types::CipherKind;

/// Top-level client configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OtsConfig {
    pub backend: BackendConfig,
    pub link: LinkConfig,
    pub lifecycle: LifecycleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// API root; secrets are posted to `{endpoint}/secret`
    pub endpoint: String,
    /// Per-request timeout in seconds (default: 10)
    pub timeout_secs: u64,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Base of the share page; links look like `{base_url}/view/{id}`
    pub base_url: String,
}

/// Expiry policy owned by the lifecycle controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// ttl used when none is given (default: 24h)
    pub default_ttl_secs: u64,
    /// Shortest accepted ttl (default: 5 minutes)
    pub min_ttl_secs: u64,
    /// Longest accepted ttl (default: 7 days)
    pub max_ttl_secs: u64,
    /// Cipher used when none is given
    pub default_cipher: CipherKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4000/api".into(),
            timeout_secs: 10,
            enforce_tls: false,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".into(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 24 * 60 * 60,
            min_ttl_secs: 5 * 60,
            max_ttl_secs: 7 * 24 * 60 * 60,
            default_cipher: CipherKind::ChaCha20Poly1305,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LifecycleConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn min_ttl(&self) -> Duration {
        Duration::from_secs(self.min_ttl_secs)
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }
}

/// `$XDG_CONFIG_HOME/ots/config.toml`, else `$HOME/.config/ots/config.toml`.
pub fn default_config_path() -> PathBuf {
    resolve_config_path(
        std::env::var_os("XDG_CONFIG_HOME"),
        std::env::var_os("HOME"),
    )
}

fn resolve_config_path(xdg: Option<OsString>, home: Option<OsString>) -> PathBuf {
    let base = match (xdg.filter(|v| !v.is_empty()), home) {
        (Some(xdg), _) => PathBuf::from(xdg),
        (None, Some(home)) => PathBuf::from(home).join(".config"),
        (None, None) => PathBuf::from("."),
    };
    base.join("ots").join("config.toml")
}

impl OtsConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml(content: &str) -> OtsResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| OtsError::Config(format!("parsing: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> OtsResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| match e {
            OtsError::Config(msg) => OtsError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn validate(&self) -> OtsResult<()> {
        let lc = &self.lifecycle;
        if lc.min_ttl_secs == 0 {
            return Err(OtsError::Config("lifecycle.min_ttl_secs must be positive".into()));
        }
        if lc.min_ttl_secs > lc.max_ttl_secs {
            return Err(OtsError::Config(format!(
                "lifecycle.min_ttl_secs ({}) exceeds max_ttl_secs ({})",
                lc.min_ttl_secs, lc.max_ttl_secs
            )));
        }
        if !(lc.min_ttl_secs..=lc.max_ttl_secs).contains(&lc.default_ttl_secs) {
            return Err(OtsError::Config(format!(
                "lifecycle.default_ttl_secs ({}) outside [{}, {}]",
                lc.default_ttl_secs, lc.min_ttl_secs, lc.max_ttl_secs
            )));
        }
        if self.backend.timeout_secs == 0 {
            return Err(OtsError::Config("backend.timeout_secs must be positive".into()));
        }
        url::Url::parse(&self.backend.endpoint)
            .map_err(|e| OtsError::Config(format!("backend.endpoint: {e}")))?;
        url::Url::parse(&self.link.base_url)
            .map_err(|e| OtsError::Config(format!("link.base_url: {e}")))?;
        Ok(())
    }
}
