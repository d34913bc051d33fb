use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables.
///
/// The model credential is not part of it: it is entered per session and
/// lives in the session store.
#[derive(Debug, Clone)]
pub struct Config {
    pub model: ModelConfig,
    pub request: RequestConfig,
    pub generation: GenerationConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Chat-completions endpoint and model settings
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    /// Sent as `reasoning_format`; `None` omits the field.
    pub reasoning_format: Option<String>,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Content pipeline configuration
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Extra attempts for structured tasks whose output fails to decode.
    pub decode_retries: u32,
}

/// Session store configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    pub database: DatabaseConfig,
}

/// Where session slots are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    /// Process-scoped; gone when the process exits.
    Memory,
    /// SQLite file; survives restarts.
    Sqlite,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = ModelConfig::default();
        let model = ModelConfig {
            base_url: env::var("GROQ_BASE_URL").unwrap_or(defaults.base_url),
            model: env::var("GROQ_MODEL").unwrap_or(defaults.model),
            temperature: parse_var("GROQ_TEMPERATURE").unwrap_or(defaults.temperature),
            reasoning_format: match env::var("GROQ_REASONING_FORMAT") {
                Ok(v) if v.trim().is_empty() || v.eq_ignore_ascii_case("none") => None,
                Ok(v) => Some(v),
                Err(_) => defaults.reasoning_format,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_var("REQUEST_TIMEOUT_MS").unwrap_or(30000),
            max_retries: parse_var("MAX_RETRIES").unwrap_or(0),
            retry_delay_ms: parse_var("RETRY_DELAY_MS").unwrap_or(1000),
        };

        let generation = GenerationConfig {
            decode_retries: parse_var("DECODE_RETRIES").unwrap_or(1),
        };

        let backend = env::var("SESSION_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .parse::<SessionBackend>()
            .map_err(|message| AppError::Config { message })?;

        let session = SessionConfig {
            backend,
            database: DatabaseConfig {
                path: PathBuf::from(
                    env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/sessions.db".to_string()),
                ),
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS").unwrap_or(5),
            },
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config {
            model,
            request,
            generation,
            session,
            logging,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "qwen-qwq-32b".to_string(),
            temperature: 0.6,
            reasoning_format: Some("hidden".to_string()),
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 0,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { decode_retries: 1 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/sessions.db"),
            max_connections: 5,
        }
    }
}

impl std::str::FromStr for SessionBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(SessionBackend::Memory),
            "sqlite" => Ok(SessionBackend::Sqlite),
            _ => Err(format!("Unknown session backend: {}", s)),
        }
    }
}
