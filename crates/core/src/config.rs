use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub gate: GateConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// External compliance rule engine endpoint.
///
/// `fail_open` preserves the inherited behavior of letting transitions
/// proceed when the gate is unreachable; flip it to fail closed.
#[derive(Clone, Debug)]
pub struct GateConfig {
    pub base_url: Option<String>,
    pub api_token: Option<SecretString>,
    pub timeout_secs: u64,
    pub fail_open: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub gate_base_url: Option<String>,
    pub gate_fail_open: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://despacho.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            gate: GateConfig { base_url: None, api_token: None, timeout_secs: 5, fail_open: true },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("despacho.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(gate) = patch.gate {
            if let Some(base_url) = gate.base_url {
                self.gate.base_url = Some(base_url);
            }
            if let Some(api_token_value) = gate.api_token {
                self.gate.api_token = Some(SecretString::from(api_token_value));
            }
            if let Some(timeout_secs) = gate.timeout_secs {
                self.gate.timeout_secs = timeout_secs;
            }
            if let Some(fail_open) = gate.fail_open {
                self.gate.fail_open = fail_open;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DESPACHO_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DESPACHO_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("DESPACHO_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DESPACHO_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("DESPACHO_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DESPACHO_GATE_BASE_URL") {
            self.gate.base_url = Some(value);
        }
        if let Some(value) = read_env("DESPACHO_GATE_API_TOKEN") {
            self.gate.api_token = Some(SecretString::from(value));
        }
        if let Some(value) = read_env("DESPACHO_GATE_TIMEOUT_SECS") {
            self.gate.timeout_secs = parse_u64("DESPACHO_GATE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("DESPACHO_GATE_FAIL_OPEN") {
            self.gate.fail_open = parse_bool("DESPACHO_GATE_FAIL_OPEN", &value)?;
        }

        if let Some(value) = read_env("DESPACHO_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DESPACHO_SERVER_PORT") {
            self.server.port = parse_u16("DESPACHO_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("DESPACHO_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("DESPACHO_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(gate_base_url) = overrides.gate_base_url {
            self.gate.base_url = Some(gate_base_url);
        }
        if let Some(gate_fail_open) = overrides.gate_fail_open {
            self.gate.fail_open = gate_fail_open;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.gate.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "gate.timeout_secs must be at least 1".to_string(),
            ));
        }
        if let Some(base_url) = &self.gate.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "gate.base_url must be an http(s) URL, got `{base_url}`"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    gate: Option<GatePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct GatePatch {
    base_url: Option<String>,
    api_token: Option<String>,
    timeout_secs: Option<u64>,
    fail_open: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let default = PathBuf::from("despacho.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let interpolated = interpolate_env(&raw)?;
    toml::from_str(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces `${VAR}` expressions in the raw config text with environment
/// values before parsing.
fn interpolate_env(raw: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(ConfigError::UnterminatedInterpolation);
        };
        let var = &after[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
