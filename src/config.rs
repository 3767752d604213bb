//! Engine configuration loaded from TOML.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::{ClientOptions, RetryPolicy};
use crate::jsonapi::DocumentAssembler;
use crate::pagination::DEFAULT_TAKE;
use crate::query::CompilerSettings;
use crate::schema::is_identifier;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PENUMBRA_CONFIG";

/// Resolved configuration with every default applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EngineConfig {
    /// Where the values came from, if a file was read.
    #[serde(skip)]
    pub path: Option<PathBuf>,
    /// Database connection and pool.
    pub connection: ConnectionConfig,
    /// Write retries.
    pub retry: RetryConfig,
    /// Page sizes.
    pub pagination: PaginationConfig,
    /// Tenant graph shape.
    pub tenancy: TenancyConfig,
    /// Outer API surface.
    pub api: ApiConfig,
}

/// `[connection]`
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionConfig {
    /// Bolt URI.
    pub uri: String,
    /// User name.
    pub user: String,
    /// Password; never printed.
    #[serde(skip_serializing)]
    pub password: String,
    /// Database name; the server default when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Session pool ceiling.
    pub max_connections: usize,
    /// Longest wait for a pooled session, in milliseconds.
    pub acquire_timeout_ms: u64,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .finish()
    }
}

/// `[retry]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RetryConfig {
    /// Attempts per write, including the first.
    pub max_attempts: u32,
    /// Backoff unit in milliseconds.
    pub base_delay_ms: u64,
}

/// `[pagination]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaginationConfig {
    /// Page size when the request omits `take`.
    pub default_take: usize,
}

/// `[tenancy]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TenancyConfig {
    /// Label of tenant nodes.
    pub tenant_label: String,
    /// Relationship from scoped entities to their tenant.
    pub membership_edge: String,
}

/// `[api]`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ApiConfig {
    /// Base URL used for resource `self` links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig::default(), None)
    }
}

impl EngineConfig {
    /// Loads from `explicit`, else `$PENUMBRA_CONFIG`, else the user config
    /// directory. A missing file at the fallback locations yields defaults;
    /// an explicit path must exist.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_file(&path);
        }
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(default_config_path);
        match path {
            Some(path) if path.exists() => Self::load_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Reads and validates one file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents, path)
    }

    /// Parses TOML text; `origin` is used in error messages.
    pub fn from_toml(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        let config = Self::from_raw(raw, Some(origin.to_path_buf()));
        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: RawConfig, path: Option<PathBuf>) -> Self {
        let defaults = ClientOptions::default();
        let connection = raw.connection;
        let retry = raw.retry;
        let tenancy = raw.tenancy;
        Self {
            path,
            connection: ConnectionConfig {
                uri: connection
                    .uri
                    .unwrap_or_else(|| "bolt://localhost:7687".into()),
                user: connection.user.unwrap_or_else(|| "neo4j".into()),
                password: connection.password.unwrap_or_default(),
                database: connection.database,
                max_connections: connection
                    .max_connections
                    .unwrap_or(defaults.max_connections),
                acquire_timeout_ms: connection
                    .acquire_timeout_ms
                    .unwrap_or(defaults.acquire_timeout.as_millis() as u64),
            },
            retry: RetryConfig {
                max_attempts: retry.max_attempts.unwrap_or(defaults.retry.max_attempts),
                base_delay_ms: retry
                    .base_delay_ms
                    .unwrap_or(defaults.retry.base_delay.as_millis() as u64),
            },
            pagination: PaginationConfig {
                default_take: raw.pagination.default_take.unwrap_or(DEFAULT_TAKE),
            },
            tenancy: TenancyConfig {
                tenant_label: tenancy.tenant_label.unwrap_or_else(|| "Company".into()),
                membership_edge: tenancy
                    .membership_edge
                    .unwrap_or_else(|| "BELONGS_TO".into()),
            },
            api: ApiConfig {
                base_url: raw.api.base_url,
            },
        }
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.max_connections == 0 {
            return Err(ConfigError::invalid("connection.max_connections", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.pagination.default_take == 0 {
            return Err(ConfigError::invalid("pagination.default_take", "must be at least 1"));
        }
        if !is_identifier(&self.tenancy.tenant_label) {
            return Err(ConfigError::invalid(
                "tenancy.tenant_label",
                "must be a plain identifier",
            ));
        }
        if !is_identifier(&self.tenancy.membership_edge) {
            return Err(ConfigError::invalid(
                "tenancy.membership_edge",
                "must be a plain identifier",
            ));
        }
        if let Some(base) = &self.api.base_url {
            url::Url::parse(base)
                .map_err(|err| ConfigError::invalid("api.base_url", err.to_string()))?;
        }
        Ok(())
    }

    /// Retry policy for the execution client.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
        )
    }

    /// Pool and retry settings for the execution client.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            max_connections: self.connection.max_connections,
            acquire_timeout: Duration::from_millis(self.connection.acquire_timeout_ms),
            retry: self.retry_policy(),
        }
    }

    /// Settings for the query compiler.
    pub fn compiler_settings(&self) -> CompilerSettings {
        CompilerSettings {
            tenant_label: self.tenancy.tenant_label.clone(),
            membership_edge: self.tenancy.membership_edge.clone(),
            default_take: self.pagination.default_take,
        }
    }

    /// Document assembler linking resources under `[api].base_url`.
    pub fn assembler(&self) -> Result<DocumentAssembler, ConfigError> {
        let assembler = DocumentAssembler::new();
        match &self.api.base_url {
            Some(base) => {
                let base = url::Url::parse(base)
                    .map_err(|err| ConfigError::invalid("api.base_url", err.to_string()))?;
                Ok(assembler.with_base_url(base))
            }
            None => Ok(assembler),
        }
    }

    /// Renders the effective configuration (password omitted).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    connection: RawConnection,
    #[serde(default)]
    retry: RawRetry,
    #[serde(default)]
    pagination: RawPagination,
    #[serde(default)]
    tenancy: RawTenancy,
    #[serde(default)]
    api: RawApi,
}

#[derive(Debug, Default, Deserialize)]
struct RawConnection {
    uri: Option<String>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    max_connections: Option<usize>,
    acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRetry {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPagination {
    default_take: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTenancy {
    tenant_label: Option<String>,
    membership_edge: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawApi {
    base_url: Option<String>,
}

/// Failures while loading configuration or schema files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Offending path.
        path: PathBuf,
        /// I/O failure.
        source: std::io::Error,
    },
    /// The file is not valid TOML for the expected shape.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Parser failure.
        source: toml::de::Error,
    },
    /// The effective configuration could not be rendered.
    #[error("failed to serialize config: {source}")]
    Serialize {
        /// Serializer failure.
        source: toml::ser::Error,
    },
    /// A value is out of range.
    #[error("invalid config value {field}: {reason}")]
    Invalid {
        /// Dotted key.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// `<config dir>/penumbra/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("penumbra").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = EngineConfig::from_toml("", Path::new("mem.toml")).expect("parses");
        assert_eq!(config.connection.max_connections, 16);
        assert_eq!(config.connection.acquire_timeout_ms, 5_000);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.pagination.default_take, 26);
        assert_eq!(config.compiler_settings(), CompilerSettings::default());
        assert!(config.assembler().expect("no base url").base_url().is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[connection]\nuri = \"bolt://db:7687\"\npassword = \"s3cret\"\nmax_connections = 4\n\
             [retry]\nmax_attempts = 5\nbase_delay_ms = 10\n\
             [tenancy]\ntenant_label = \"Org\"\n\
             [api]\nbase_url = \"https://api.example.com\""
        )
        .expect("write");
        let config = EngineConfig::load(Some(file.path().to_path_buf())).expect("loads");
        assert_eq!(config.connection.uri, "bolt://db:7687");
        assert_eq!(config.client_options().max_connections, 4);
        assert_eq!(config.retry_policy().backoff(2), Duration::from_millis(20));
        assert_eq!(config.compiler_settings().tenant_label, "Org");
        let assembler = config.assembler().expect("valid base url");
        assert_eq!(
            assembler.base_url().map(url::Url::as_str),
            Some("https://api.example.com/")
        );
        assert!(!format!("{:?}", config.connection).contains("s3cret"));
        let rendered = config.to_toml().expect("renders");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("max_attempts = 5"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineConfig::from_toml("[retry]\nmax_attempts = 0", Path::new("x.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "retry.max_attempts", .. }));
        let err = EngineConfig::from_toml("[tenancy]\ntenant_label = \"Bad Label\"", Path::new("x.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(matches!(
            EngineConfig::from_toml("[nope]\n", Path::new("x.toml")),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = EngineConfig::load(Some(PathBuf::from("/definitely/missing.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
