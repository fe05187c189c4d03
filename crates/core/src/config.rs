use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tenant::{DEFAULT_TENANT, DEFAULT_USER, DEFAULT_WEBSOCKET_PREFIX};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub tenancy: TenancyConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub anthropic_version: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_iterations: usize,
    /// Wall-clock bound for a single conversation run; 0 disables it.
    pub max_run_secs: u64,
    pub system_prompt: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TenancyConfig {
    pub default_tenant: String,
    pub default_user: String,
    pub websocket_session_prefix: String,
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
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub agent_max_iterations: Option<usize>,
    pub default_tenant: Option<String>,
    pub server_port: Option<u16>,
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
                url: "sqlite://procura.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: String::new().into(),
                base_url: "https://api.anthropic.com".to_string(),
                model: "claude-sonnet-4-5".to_string(),
                anthropic_version: "2023-06-01".to_string(),
                timeout_secs: 120,
                max_tokens: 4096,
            },
            agent: AgentConfig { max_iterations: 10, max_run_secs: 0, system_prompt: None },
            tenancy: TenancyConfig {
                default_tenant: DEFAULT_TENANT.to_string(),
                default_user: DEFAULT_USER.to_string(),
                websocket_session_prefix: DEFAULT_WEBSOCKET_PREFIX.to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("procura.toml"));
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

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = secret_value(api_key);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(anthropic_version) = llm.anthropic_version {
                self.llm.anthropic_version = anthropic_version;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_iterations) = agent.max_iterations {
                self.agent.max_iterations = max_iterations;
            }
            if let Some(max_run_secs) = agent.max_run_secs {
                self.agent.max_run_secs = max_run_secs;
            }
            if let Some(system_prompt) = agent.system_prompt {
                self.agent.system_prompt = Some(system_prompt);
            }
        }

        if let Some(tenancy) = patch.tenancy {
            if let Some(default_tenant) = tenancy.default_tenant {
                self.tenancy.default_tenant = default_tenant;
            }
            if let Some(default_user) = tenancy.default_user {
                self.tenancy.default_user = default_user;
            }
            if let Some(prefix) = tenancy.websocket_session_prefix {
                self.tenancy.websocket_session_prefix = prefix;
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
        if let Some(value) = read_env("PROCURA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PROCURA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_number("PROCURA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PROCURA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_number("PROCURA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PROCURA_LLM_API_KEY") {
            self.llm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("PROCURA_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("PROCURA_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PROCURA_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_number("PROCURA_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PROCURA_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_number("PROCURA_LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("PROCURA_AGENT_MAX_ITERATIONS") {
            self.agent.max_iterations = parse_number("PROCURA_AGENT_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("PROCURA_AGENT_MAX_RUN_SECS") {
            self.agent.max_run_secs = parse_number("PROCURA_AGENT_MAX_RUN_SECS", &value)?;
        }

        if let Some(value) = read_env("PROCURA_TENANCY_DEFAULT_TENANT") {
            self.tenancy.default_tenant = value;
        }
        if let Some(value) = read_env("PROCURA_TENANCY_DEFAULT_USER") {
            self.tenancy.default_user = value;
        }

        if let Some(value) = read_env("PROCURA_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PROCURA_SERVER_PORT") {
            self.server.port = parse_number("PROCURA_SERVER_PORT", &value)?;
        }

        let log_level =
            read_env("PROCURA_LOGGING_LEVEL").or_else(|| read_env("PROCURA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PROCURA_LOGGING_FORMAT").or_else(|| read_env("PROCURA_LOG_FORMAT"));
        if let Some(value) = log_format {
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
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = secret_value(api_key);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(max_iterations) = overrides.agent_max_iterations {
            self.agent.max_iterations = max_iterations;
        }
        if let Some(default_tenant) = overrides.default_tenant {
            self.tenancy.default_tenant = default_tenant;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_tenancy(&self.tenancy)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("procura.toml"), PathBuf::from("config/procura.toml")]
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
    if llm.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.api_key is required (set PROCURA_LLM_API_KEY or [llm].api_key)".to_string(),
        ));
    }

    let base_url = llm.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_iterations == 0 || agent.max_iterations > 50 {
        return Err(ConfigError::Validation(
            "agent.max_iterations must be in range 1..=50".to_string(),
        ));
    }

    Ok(())
}

fn validate_tenancy(tenancy: &TenancyConfig) -> Result<(), ConfigError> {
    let valid_segment = |value: &str| {
        !value.is_empty()
            && value.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'))
    };

    if !valid_segment(&tenancy.default_tenant) {
        return Err(ConfigError::Validation(
            "tenancy.default_tenant must be non-empty and use only [A-Za-z0-9_-]".to_string(),
        ));
    }
    if !valid_segment(&tenancy.default_user) {
        return Err(ConfigError::Validation(
            "tenancy.default_user must be non-empty and use only [A-Za-z0-9_-]".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    tenancy: Option<TenancyPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    anthropic_version: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_iterations: Option<usize>,
    max_run_secs: Option<u64>,
    system_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TenancyPatch {
    default_tenant: Option<String>,
    default_user: Option<String>,
    websocket_session_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
