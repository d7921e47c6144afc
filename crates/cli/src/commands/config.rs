use std::env;
use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use telroute_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key: String,
    value: String,
    env_keys: Vec<String>,
}

impl Field {
    fn new(key: &str, value: impl ToString, env_key: &str) -> Self {
        Self { key: key.to_string(), value: value.to_string(), env_keys: vec![env_key.to_string()] }
    }

    fn with_alias(mut self, env_key: &str) -> Self {
        self.env_keys.push(env_key.to_string());
        self
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = config_file_path.as_deref().and_then(load_config_file_doc);

    let mut lines = vec![
        "effective config (source precedence: override > env > file > default):".to_string(),
    ];
    for field in fields(&config) {
        let source = field_source(&field, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let routing = &config.routing;
    let mut fields = vec![
        Field::new(
            "routing.confidence_threshold",
            routing.confidence_threshold,
            "TELROUTE_ROUTING_CONFIDENCE_THRESHOLD",
        ),
        Field::new("routing.max_alternates", routing.max_alternates, "TELROUTE_ROUTING_MAX_ALTERNATES"),
        Field::new(
            "routing.default_provider",
            &routing.default_provider,
            "TELROUTE_ROUTING_DEFAULT_PROVIDER",
        ),
        Field::new("routing.classifier", lowercase_debug(&routing.classifier), "TELROUTE_ROUTING_CLASSIFIER"),
    ];
    for (intent, provider_id) in &routing.intent_providers {
        let key = intent.as_key();
        fields.push(Field::new(
            &format!("routing.intents.{key}"),
            provider_id,
            &format!("TELROUTE_ROUTING_PROVIDER_{}", key.to_ascii_uppercase()),
        ));
    }

    fields.extend([
        Field::new("timeouts.classifier_ms", config.timeouts.classifier_ms, "TELROUTE_TIMEOUTS_CLASSIFIER_MS"),
        Field::new("timeouts.provider_ms", config.timeouts.provider_ms, "TELROUTE_TIMEOUTS_PROVIDER_MS"),
        Field::new("session.context_window", config.session.context_window, "TELROUTE_SESSION_CONTEXT_WINDOW"),
        Field::new(
            "session.idle_timeout_secs",
            config.session.idle_timeout_secs,
            "TELROUTE_SESSION_IDLE_TIMEOUT_SECS",
        ),
        Field::new("session.store", lowercase_debug(&config.session.store), "TELROUTE_SESSION_STORE"),
        Field::new("database.url", &config.database.url, "TELROUTE_DATABASE_URL"),
        Field::new(
            "database.max_connections",
            config.database.max_connections,
            "TELROUTE_DATABASE_MAX_CONNECTIONS",
        ),
        Field::new("database.timeout_secs", config.database.timeout_secs, "TELROUTE_DATABASE_TIMEOUT_SECS"),
        Field::new(
            "database.customer_directory",
            config.database.customer_directory,
            "TELROUTE_DATABASE_CUSTOMER_DIRECTORY",
        ),
        Field::new("llm.provider", lowercase_debug(&config.llm.provider), "TELROUTE_LLM_PROVIDER"),
        Field::new("llm.model", &config.llm.model, "TELROUTE_LLM_MODEL"),
        Field::new(
            "llm.base_url",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
            "TELROUTE_LLM_BASE_URL",
        ),
        Field::new(
            "llm.api_key",
            config.llm.api_key.as_ref().map_or("<unset>".to_string(), |key| redact_secret(key.expose_secret())),
            "TELROUTE_LLM_API_KEY",
        ),
        Field::new("llm.timeout_secs", config.llm.timeout_secs, "TELROUTE_LLM_TIMEOUT_SECS"),
        Field::new("server.bind_address", &config.server.bind_address, "TELROUTE_SERVER_BIND_ADDRESS"),
        Field::new("server.port", config.server.port, "TELROUTE_SERVER_PORT"),
        Field::new("logging.level", &config.logging.level, "TELROUTE_LOGGING_LEVEL")
            .with_alias("TELROUTE_LOG_LEVEL"),
        Field::new("logging.format", lowercase_debug(&config.logging.format), "TELROUTE_LOGGING_FORMAT")
            .with_alias("TELROUTE_LOG_FORMAT"),
    ]);
    fields
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(field: &Field, config_file_doc: Option<&Value>, config_file_path: Option<&Path>) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key.as_str()).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, &field.key) {
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

fn lowercase_debug(value: &impl std::fmt::Debug) -> String {
    format!("{value:?}").to_ascii_lowercase()
}

/// Keeps a short prefix such as `sk-` so operators can tell keys apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        if prefix.len() <= 4 {
            return format!("{prefix}-***");
        }
    }

    "<redacted>".to_string()
}
