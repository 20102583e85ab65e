use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use kopi_core::config::AppConfig;
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::load_config;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    let config = match load_config() {
        Ok(config) => config,
        Err((_, message, _)) => return format!("config validation failed: {message}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let llm_api_key = match &config.llm.api_key {
        Some(key) => redact_key(key.expose_secret()),
        None => "<unset>".to_string(),
    };

    vec![
        Field::new("database.url", &config.database.url, &["KOPI_DATABASE_URL"]),
        Field::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["KOPI_DATABASE_MAX_CONNECTIONS"],
        ),
        Field::new(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["KOPI_DATABASE_TIMEOUT_SECS"],
        ),
        Field::new("llm.provider", format!("{:?}", config.llm.provider), &["KOPI_LLM_PROVIDER"]),
        Field::new("llm.model", &config.llm.model, &["KOPI_LLM_MODEL"]),
        Field::new("llm.base_url", config.llm.endpoint_base(), &["KOPI_LLM_BASE_URL"]),
        Field::new("llm.api_key", llm_api_key, &["KOPI_LLM_API_KEY", "GROQ_API_KEY"]),
        Field::new(
            "llm.temperature",
            config.llm.temperature.to_string(),
            &["KOPI_LLM_TEMPERATURE"],
        ),
        Field::new(
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            &["KOPI_LLM_TIMEOUT_SECS"],
        ),
        Field::new("llm.max_retries", config.llm.max_retries.to_string(), &["KOPI_LLM_MAX_RETRIES"]),
        Field::new(
            "agent.max_message_chars",
            config.agent.max_message_chars.to_string(),
            &["KOPI_AGENT_MAX_MESSAGE_CHARS"],
        ),
        Field::new(
            "agent.tool_timeout_secs",
            config.agent.tool_timeout_secs.to_string(),
            &["KOPI_AGENT_TOOL_TIMEOUT_SECS"],
        ),
        Field::new("retrieval.top_k", config.retrieval.top_k.to_string(), &["KOPI_RETRIEVAL_TOP_K"]),
        Field::new(
            "retrieval.chunk_size",
            config.retrieval.chunk_size.to_string(),
            &["KOPI_RETRIEVAL_CHUNK_SIZE"],
        ),
        Field::new(
            "retrieval.chunk_overlap",
            config.retrieval.chunk_overlap.to_string(),
            &["KOPI_RETRIEVAL_CHUNK_OVERLAP"],
        ),
        Field::new("retrieval.embedding_dims", config.retrieval.embedding_dims.to_string(), &[]),
        Field::new(
            "server.bind_address",
            &config.server.bind_address,
            &["KOPI_SERVER_BIND_ADDRESS"],
        ),
        Field::new("server.port", config.server.port.to_string(), &["KOPI_SERVER_PORT"]),
        Field::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["KOPI_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Field::new(
            "server.cors_allowed_origins",
            config.server.cors_allowed_origins.join(","),
            &["KOPI_SERVER_CORS_ALLOWED_ORIGINS"],
        ),
        Field::new("logging.level", &config.logging.level, &["KOPI_LOGGING_LEVEL", "KOPI_LOG_LEVEL"]),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["KOPI_LOGGING_FORMAT", "KOPI_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["kopi.toml", "config/kopi.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('_') {
        return format!("{prefix}_***");
    }

    "<redacted>".to_string()
}
