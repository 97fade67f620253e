use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use despacho_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let doc = config_file_doc.as_ref();
    let path = config_file_path.as_deref();

    let gate_base_url = config.gate.base_url.clone().unwrap_or_else(|| "(unset)".to_string());
    let gate_token = config
        .gate
        .api_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "(unset)".to_string());

    let entries: Vec<(&str, String, Option<&str>)> = vec![
        ("database.url", config.database.url.clone(), Some("DESPACHO_DATABASE_URL")),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            Some("DESPACHO_DATABASE_MAX_CONNECTIONS"),
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            Some("DESPACHO_DATABASE_TIMEOUT_SECS"),
        ),
        ("gate.base_url", gate_base_url, Some("DESPACHO_GATE_BASE_URL")),
        ("gate.api_token", gate_token, Some("DESPACHO_GATE_API_TOKEN")),
        ("gate.timeout_secs", config.gate.timeout_secs.to_string(), Some("DESPACHO_GATE_TIMEOUT_SECS")),
        ("gate.fail_open", config.gate.fail_open.to_string(), Some("DESPACHO_GATE_FAIL_OPEN")),
        ("server.bind_address", config.server.bind_address.clone(), Some("DESPACHO_SERVER_BIND_ADDRESS")),
        ("server.port", config.server.port.to_string(), Some("DESPACHO_SERVER_PORT")),
        ("logging.level", config.logging.level.clone(), Some("DESPACHO_LOG_LEVEL")),
        ("logging.format", format!("{:?}", config.logging.format).to_lowercase(), Some("DESPACHO_LOG_FORMAT")),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_var) in entries {
        lines.push(render_line(key, &value, field_source(key, env_var, doc, path)));
    }
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let default = PathBuf::from("despacho.toml");
    default.exists().then_some(default)
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key: &str,
    env_var: Option<&str>,
    doc: Option<&Value>,
    path: Option<&Path>,
) -> String {
    if let Some(env_var) = env_var {
        if env::var(env_var).ok().filter(|value| !value.trim().is_empty()).is_some() {
            return format!("env:{env_var}");
        }
    }

    if let (Some(doc), Some(path)) = (doc, path) {
        let mut current = doc;
        let mut found = true;
        for segment in key.split('.') {
            match current.get(segment) {
                Some(next) => current = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            return format!("file:{}", path.display());
        }
    }

    "default".to_string()
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value}  ({source})")
}

fn redact_token(token: &str) -> String {
    if token.is_empty() {
        return "(empty)".to_string();
    }
    let visible: String = token.chars().take(4).collect();
    format!("{visible}…(redacted)")
}

#[cfg(test)]
mod tests {
    use super::{field_source, redact_token};

    #[test]
    fn tokens_are_redacted_after_four_characters() {
        assert_eq!(redact_token("secret-token-value"), "secr…(redacted)");
        assert_eq!(redact_token(""), "(empty)");
    }

    #[test]
    fn field_source_falls_back_to_default() {
        assert_eq!(field_source("database.url", None, None, None), "default");
    }
}
