use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::intent::{Intent, ProviderId};

pub const DEFAULT_CONFIG_FILE: &str = "telroute.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub routing: RoutingConfig,
    pub timeouts: TimeoutConfig,
    pub session: SessionConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoutingConfig {
    pub confidence_threshold: f64,
    pub max_alternates: usize,
    pub default_provider: ProviderId,
    pub classifier: ClassifierKind,
    pub intent_providers: BTreeMap<Intent, ProviderId>,
}

impl RoutingConfig {
    pub fn provider_for(&self, intent: Intent) -> Option<&ProviderId> {
        self.intent_providers.get(&intent)
    }

    /// Every provider id the routing table can select, default included.
    pub fn referenced_providers(&self) -> Vec<ProviderId> {
        let mut providers: Vec<ProviderId> = self.intent_providers.values().cloned().collect();
        providers.push(self.default_provider.clone());
        providers.sort();
        providers.dedup();
        providers
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub classifier_ms: u64,
    pub provider_ms: u64,
}

impl TimeoutConfig {
    pub fn classifier(&self) -> Duration {
        Duration::from_millis(self.classifier_ms)
    }

    pub fn provider(&self) -> Duration {
        Duration::from_millis(self.provider_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub context_window: usize,
    pub idle_timeout_secs: u64,
    pub store: SessionStoreKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    /// Ground billing, plan and support answers in the customer tables of this database.
    pub customer_directory: bool,
}

impl DatabaseConfig {
    pub fn is_required(&self, session: &SessionConfig) -> bool {
        self.customer_directory || session.store == SessionStoreKind::Sqlite
    }
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Offline,
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    Keyword,
    Llm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStoreKind {
    Memory,
    Sqlite,
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
    pub confidence_threshold: Option<f64>,
    pub default_provider: Option<String>,
    pub classifier: Option<ClassifierKind>,
    pub classifier_timeout_ms: Option<u64>,
    pub provider_timeout_ms: Option<u64>,
    pub context_window: Option<usize>,
    pub session_store: Option<SessionStoreKind>,
    pub database_url: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub log_level: Option<String>,
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

pub fn default_intent_providers() -> BTreeMap<Intent, ProviderId> {
    Intent::ROUTABLE.iter().map(|intent| (*intent, ProviderId::new(intent.as_key()))).collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            routing: RoutingConfig {
                confidence_threshold: 0.5,
                max_alternates: 2,
                default_provider: ProviderId::new(Intent::TechnicalSupport.as_key()),
                classifier: ClassifierKind::Keyword,
                intent_providers: default_intent_providers(),
            },
            timeouts: TimeoutConfig { classifier_ms: 2_000, provider_ms: 20_000 },
            session: SessionConfig {
                context_window: 6,
                idle_timeout_secs: 1_800,
                store: SessionStoreKind::Memory,
            },
            database: DatabaseConfig {
                url: "sqlite://telroute.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
                customer_directory: false,
            },
            llm: LlmConfig {
                provider: LlmProvider::Offline,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "offline" => Ok(Self::Offline),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected offline|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for ClassifierKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "llm" => Ok(Self::Llm),
            other => Err(ConfigError::Validation(format!(
                "unsupported classifier `{other}` (expected keyword|llm)"
            ))),
        }
    }
}

impl std::str::FromStr for SessionStoreKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unsupported session store `{other}` (expected memory|sqlite)"
            ))),
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
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(routing) = patch.routing {
            if let Some(confidence_threshold) = routing.confidence_threshold {
                self.routing.confidence_threshold = confidence_threshold;
            }
            if let Some(max_alternates) = routing.max_alternates {
                self.routing.max_alternates = max_alternates;
            }
            if let Some(default_provider) = routing.default_provider {
                self.routing.default_provider = ProviderId::new(default_provider);
            }
            if let Some(classifier) = routing.classifier {
                self.routing.classifier = classifier;
            }
            if let Some(intents) = routing.intents {
                for (key, provider) in intents {
                    let intent = key
                        .parse::<Intent>()
                        .map_err(|error| ConfigError::Validation(format!("routing.intents: {error}")))?;
                    self.routing.intent_providers.insert(intent, ProviderId::new(provider));
                }
            }
        }

        if let Some(timeouts) = patch.timeouts {
            if let Some(classifier_ms) = timeouts.classifier_ms {
                self.timeouts.classifier_ms = classifier_ms;
            }
            if let Some(provider_ms) = timeouts.provider_ms {
                self.timeouts.provider_ms = provider_ms;
            }
        }

        if let Some(session) = patch.session {
            if let Some(context_window) = session.context_window {
                self.session.context_window = context_window;
            }
            if let Some(idle_timeout_secs) = session.idle_timeout_secs {
                self.session.idle_timeout_secs = idle_timeout_secs;
            }
            if let Some(store) = session.store {
                self.session.store = store;
            }
        }

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
            if let Some(customer_directory) = database.customer_directory {
                self.database.customer_directory = customer_directory;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
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

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TELROUTE_ROUTING_CONFIDENCE_THRESHOLD") {
            self.routing.confidence_threshold =
                parse_f64("TELROUTE_ROUTING_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("TELROUTE_ROUTING_MAX_ALTERNATES") {
            self.routing.max_alternates = parse_usize("TELROUTE_ROUTING_MAX_ALTERNATES", &value)?;
        }
        if let Some(value) = read_env("TELROUTE_ROUTING_DEFAULT_PROVIDER") {
            self.routing.default_provider = ProviderId::new(value);
        }
        if let Some(value) = read_env("TELROUTE_ROUTING_CLASSIFIER") {
            self.routing.classifier = value.parse()?;
        }
        for intent in Intent::ROUTABLE {
            let key = format!("TELROUTE_ROUTING_PROVIDER_{}", intent.as_key().to_ascii_uppercase());
            if let Some(value) = read_env(&key) {
                self.routing.intent_providers.insert(intent, ProviderId::new(value));
            }
        }

        if let Some(value) = read_env("TELROUTE_TIMEOUTS_CLASSIFIER_MS") {
            self.timeouts.classifier_ms = parse_u64("TELROUTE_TIMEOUTS_CLASSIFIER_MS", &value)?;
        }
        if let Some(value) = read_env("TELROUTE_TIMEOUTS_PROVIDER_MS") {
            self.timeouts.provider_ms = parse_u64("TELROUTE_TIMEOUTS_PROVIDER_MS", &value)?;
        }

        if let Some(value) = read_env("TELROUTE_SESSION_CONTEXT_WINDOW") {
            self.session.context_window = parse_usize("TELROUTE_SESSION_CONTEXT_WINDOW", &value)?;
        }
        if let Some(value) = read_env("TELROUTE_SESSION_IDLE_TIMEOUT_SECS") {
            self.session.idle_timeout_secs =
                parse_u64("TELROUTE_SESSION_IDLE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TELROUTE_SESSION_STORE") {
            self.session.store = value.parse()?;
        }

        if let Some(value) = read_env("TELROUTE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TELROUTE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("TELROUTE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TELROUTE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TELROUTE_DATABASE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TELROUTE_DATABASE_CUSTOMER_DIRECTORY") {
            self.database.customer_directory =
                parse_bool("TELROUTE_DATABASE_CUSTOMER_DIRECTORY", &value)?;
        }

        if let Some(value) = read_env("TELROUTE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TELROUTE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TELROUTE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("TELROUTE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TELROUTE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TELROUTE_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TELROUTE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TELROUTE_SERVER_PORT") {
            self.server.port = parse_u16("TELROUTE_SERVER_PORT", &value)?;
        }

        let log_level =
            read_env("TELROUTE_LOGGING_LEVEL").or_else(|| read_env("TELROUTE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TELROUTE_LOGGING_FORMAT").or_else(|| read_env("TELROUTE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(confidence_threshold) = overrides.confidence_threshold {
            self.routing.confidence_threshold = confidence_threshold;
        }
        if let Some(default_provider) = overrides.default_provider {
            self.routing.default_provider = ProviderId::new(default_provider);
        }
        if let Some(classifier) = overrides.classifier {
            self.routing.classifier = classifier;
        }
        if let Some(classifier_timeout_ms) = overrides.classifier_timeout_ms {
            self.timeouts.classifier_ms = classifier_timeout_ms;
        }
        if let Some(provider_timeout_ms) = overrides.provider_timeout_ms {
            self.timeouts.provider_ms = provider_timeout_ms;
        }
        if let Some(context_window) = overrides.context_window {
            self.session.context_window = context_window;
        }
        if let Some(session_store) = overrides.session_store {
            self.session.store = session_store;
        }
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_routing(&self.routing, &self.llm)?;
        validate_timeouts(&self.timeouts)?;
        validate_session(&self.session)?;
        if self.database.is_required(&self.session) {
            validate_database(&self.database)?;
        }
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_routing(routing: &RoutingConfig, llm: &LlmConfig) -> Result<(), ConfigError> {
    let threshold = routing.confidence_threshold;
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(ConfigError::Validation(
            "routing.confidence_threshold must be within 0.0..=1.0".to_string(),
        ));
    }

    if routing.max_alternates > 3 {
        return Err(ConfigError::Validation(
            "routing.max_alternates must be in range 0..=3".to_string(),
        ));
    }

    if routing.default_provider.as_str().trim().is_empty() {
        return Err(ConfigError::Validation(
            "routing.default_provider is required (e.g. `technical_support`)".to_string(),
        ));
    }

    if let Some((intent, _)) =
        routing.intent_providers.iter().find(|(_, provider)| provider.as_str().trim().is_empty())
    {
        return Err(ConfigError::Validation(format!(
            "routing.intents.{intent} must name a provider"
        )));
    }

    if routing.intent_providers.contains_key(&Intent::Unknown) {
        return Err(ConfigError::Validation(
            "routing.intents.unknown is not routable; use routing.default_provider instead"
                .to_string(),
        ));
    }

    if routing.classifier == ClassifierKind::Llm && llm.provider == LlmProvider::Offline {
        return Err(ConfigError::Validation(
            "routing.classifier = \"llm\" requires llm.provider openai|ollama".to_string(),
        ));
    }

    Ok(())
}

fn validate_timeouts(timeouts: &TimeoutConfig) -> Result<(), ConfigError> {
    if timeouts.classifier_ms == 0 || timeouts.classifier_ms > 300_000 {
        return Err(ConfigError::Validation(
            "timeouts.classifier_ms must be in range 1..=300000".to_string(),
        ));
    }
    if timeouts.provider_ms == 0 || timeouts.provider_ms > 300_000 {
        return Err(ConfigError::Validation(
            "timeouts.provider_ms must be in range 1..=300000".to_string(),
        ));
    }
    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.context_window == 0 || session.context_window > 100 {
        return Err(ConfigError::Validation(
            "session.context_window must be in range 1..=100".to_string(),
        ));
    }
    if session.idle_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "session.idle_timeout_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::Offline => {}
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }),
    }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    routing: Option<RoutingPatch>,
    timeouts: Option<TimeoutPatch>,
    session: Option<SessionPatch>,
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    confidence_threshold: Option<f64>,
    max_alternates: Option<usize>,
    default_provider: Option<String>,
    classifier: Option<ClassifierKind>,
    intents: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TimeoutPatch {
    classifier_ms: Option<u64>,
    provider_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    context_window: Option<usize>,
    idle_timeout_secs: Option<u64>,
    store: Option<SessionStoreKind>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    customer_directory: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
