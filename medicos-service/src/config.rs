use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CHAT_MODEL: &str = "google/gemini-flash-1.5";
pub const DEFAULT_OCR_MODEL: &str = "openai/gpt-4.1-mini";
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &["http://localhost:3000", "http://localhost:5000"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime settings, read from the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: String,
    pub port: u16,
    pub chat_model: String,
    pub ocr_model: String,
    pub model_timeout: Duration,
    pub simplify_responses: bool,
    pub allowed_origins: Vec<String>,
    pub session_idle_ttl: Option<Duration>,
    pub max_upload_bytes: usize,
    pub symptom_rules_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("OPENROUTER_API_KEY").ok_or(ConfigError::Missing("OPENROUTER_API_KEY"))?;

        let allowed_origins = match get("ALLOWED_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect(),
            None => DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        Ok(Self {
            api_key,
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            chat_model: get("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            ocr_model: get("OCR_MODEL").unwrap_or_else(|| DEFAULT_OCR_MODEL.to_string()),
            model_timeout: Duration::from_secs(parse_or(
                "MODEL_TIMEOUT_SECS",
                get("MODEL_TIMEOUT_SECS"),
                DEFAULT_MODEL_TIMEOUT_SECS,
            )?),
            simplify_responses: parse_or("SIMPLIFY_RESPONSES", get("SIMPLIFY_RESPONSES"), false)?,
            allowed_origins,
            session_idle_ttl: get("SESSION_IDLE_TTL_SECS")
                .map(|v| parse("SESSION_IDLE_TTL_SECS", v))
                .transpose()?
                .map(Duration::from_secs),
            max_upload_bytes: parse_or(
                "MAX_UPLOAD_BYTES",
                get("MAX_UPLOAD_BYTES"),
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            symptom_rules_path: get("SYMPTOM_RULES_PATH").map(PathBuf::from),
        })
    }
}

fn parse<T: FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}

fn parse_or<T: FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    value.map_or(Ok(default), |v| parse(name, v))
}
