//! Environment variable binding (spec §6).
//!
//! The teacher reads `PORT` with a plain `std::env::var(...).unwrap_or_else`
//! in `main.rs`; this follows the same style for every variable instead of
//! introducing a config-file DSL.

use std::collections::HashMap;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub openai_api_key: String,
    pub openai_max_tokens: u32,
    pub openai_temperature: f32,
    pub cors_headers: HashMap<String, String>,
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub ssl_mode: String,
    pub table_prompt: String,
    pub table_prediction: String,
    pub smtp_relay: String,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_from: String,
    pub signing_key_seed: Option<String>,
    pub renderer_base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_env<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(v) => v
            .parse()
            .map_err(|e| ConfigError::Invalid { name, source: Box::new(e) }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_env("PORT", 8080u16)?;
        let openai_api_key = required("OPENAI_API_KEY")?;
        let openai_max_tokens = parse_env("OPENAI_MAX_TOKENS", 1024u32)?;
        let openai_temperature = parse_env("OPENAI_TEMPERATURE", 0.2f32)?;

        let cors_headers = match env::var("CORS_HEADERS") {
            Ok(raw) => parse_cors_headers(&raw).map_err(|e| ConfigError::Invalid {
                name: "CORS_HEADERS",
                source: Box::new(e),
            })?,
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            port,
            openai_api_key,
            openai_max_tokens,
            openai_temperature,
            cors_headers,
            db_host: required("DB_HOST")?,
            db_port: parse_env("DB_PORT", 5432u16)?,
            db_name: required("DB_NAME")?,
            db_user: required("DB_USER")?,
            db_password: required("DB_PASSWORD")?,
            ssl_mode: env::var("SSL_MODE").unwrap_or_default(),
            table_prompt: env::var("TABLE_PROMPT").unwrap_or_else(|_| "prompt".into()),
            table_prediction: env::var("TABLE_PREDICTION").unwrap_or_else(|_| "prediction".into()),
            smtp_relay: env::var("SMTP_RELAY").unwrap_or_default(),
            smtp_username: env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            smtp_from: env::var("SMTP_FROM").unwrap_or_else(|_| "noreply@diagramastext.dev".into()),
            signing_key_seed: env::var("SIGNING_KEY_SEED").ok(),
            renderer_base_url: env::var("RENDERER_BASE_URL")
                .unwrap_or_else(|_| "https://www.plantuml.com/plantuml".into()),
        })
    }
}

/// Parses the `CORS_HEADERS` JSON object and unquotes single-quoted values
/// (`"'*'"` -> `"*"`) per spec §4.6.
fn parse_cors_headers(raw: &str) -> Result<HashMap<String, String>, serde_json::Error> {
    let map: HashMap<String, String> = serde_json::from_str(raw)?;
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let unquoted = if v.len() >= 2 && v.starts_with('\'') && v.ends_with('\'') {
                v[1..v.len() - 1].to_string()
            } else {
                v
            };
            (k, unquoted)
        })
        .collect())
}
