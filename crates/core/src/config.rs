use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub mattermost: MattermostConfig,
    pub backend: BackendConfig,
    pub gateway: GatewayConfig,
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
pub struct MattermostConfig {
    pub servers: Vec<MattermostServerConfig>,
    pub ping_interval_secs: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct MattermostServerConfig {
    pub name: String,
    pub url: String,
    pub bot_token: SecretString,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub retry_backoff_secs: u64,
    pub max_in_flight_per_tenant: u32,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub queue_capacity: usize,
    pub channel_queue_capacity: usize,
    pub dedupe_ttl_secs: u64,
    pub dedupe_capacity: usize,
    pub session_idle_secs: u64,
    pub session_capacity: usize,
    pub tenant_cache_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
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
    pub backend_base_url: Option<String>,
    pub mattermost_server_url: Option<String>,
    pub mattermost_bot_token: Option<String>,
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
                url: "sqlite://mattergate.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            mattermost: MattermostConfig {
                servers: Vec::new(),
                ping_interval_secs: 30,
                reconnect_base_delay_ms: 1_000,
                reconnect_max_delay_ms: 60_000,
            },
            backend: BackendConfig {
                base_url: String::new(),
                timeout_secs: 180,
                retry_backoff_secs: 2,
                max_in_flight_per_tenant: 4,
            },
            gateway: GatewayConfig {
                queue_capacity: 256,
                channel_queue_capacity: 32,
                dedupe_ttl_secs: 300,
                dedupe_capacity: 8_192,
                session_idle_secs: 21_600,
                session_capacity: 4_096,
                tenant_cache_ttl_secs: 60,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("mattergate.toml"));
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

        if let Some(mattermost) = patch.mattermost {
            if let Some(servers) = mattermost.servers {
                self.mattermost.servers = servers
                    .into_iter()
                    .map(|server| MattermostServerConfig {
                        name: server.name.unwrap_or_else(|| "default".to_string()),
                        url: server.url,
                        bot_token: secret_value(server.bot_token),
                    })
                    .collect();
            }
            if let Some(ping_interval_secs) = mattermost.ping_interval_secs {
                self.mattermost.ping_interval_secs = ping_interval_secs;
            }
            if let Some(reconnect_base_delay_ms) = mattermost.reconnect_base_delay_ms {
                self.mattermost.reconnect_base_delay_ms = reconnect_base_delay_ms;
            }
            if let Some(reconnect_max_delay_ms) = mattermost.reconnect_max_delay_ms {
                self.mattermost.reconnect_max_delay_ms = reconnect_max_delay_ms;
            }
        }

        if let Some(backend) = patch.backend {
            if let Some(base_url) = backend.base_url {
                self.backend.base_url = base_url;
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
            if let Some(retry_backoff_secs) = backend.retry_backoff_secs {
                self.backend.retry_backoff_secs = retry_backoff_secs;
            }
            if let Some(max_in_flight_per_tenant) = backend.max_in_flight_per_tenant {
                self.backend.max_in_flight_per_tenant = max_in_flight_per_tenant;
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(queue_capacity) = gateway.queue_capacity {
                self.gateway.queue_capacity = queue_capacity;
            }
            if let Some(channel_queue_capacity) = gateway.channel_queue_capacity {
                self.gateway.channel_queue_capacity = channel_queue_capacity;
            }
            if let Some(dedupe_ttl_secs) = gateway.dedupe_ttl_secs {
                self.gateway.dedupe_ttl_secs = dedupe_ttl_secs;
            }
            if let Some(dedupe_capacity) = gateway.dedupe_capacity {
                self.gateway.dedupe_capacity = dedupe_capacity;
            }
            if let Some(session_idle_secs) = gateway.session_idle_secs {
                self.gateway.session_idle_secs = session_idle_secs;
            }
            if let Some(session_capacity) = gateway.session_capacity {
                self.gateway.session_capacity = session_capacity;
            }
            if let Some(tenant_cache_ttl_secs) = gateway.tenant_cache_ttl_secs {
                self.gateway.tenant_cache_ttl_secs = tenant_cache_ttl_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
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
        if let Some(value) = read_env("MATTERGATE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("MATTERGATE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("MATTERGATE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("MATTERGATE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("MATTERGATE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MATTERGATE_MATTERMOST_SERVER_URL") {
            self.default_server_mut().url = value;
        }
        if let Some(value) = read_env("MATTERGATE_MATTERMOST_BOT_TOKEN") {
            self.default_server_mut().bot_token = secret_value(value);
        }
        if let Some(value) = read_env("MATTERGATE_MATTERMOST_PING_INTERVAL_SECS") {
            self.mattermost.ping_interval_secs =
                parse_u64("MATTERGATE_MATTERMOST_PING_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("MATTERGATE_MATTERMOST_RECONNECT_BASE_DELAY_MS") {
            self.mattermost.reconnect_base_delay_ms =
                parse_u64("MATTERGATE_MATTERMOST_RECONNECT_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("MATTERGATE_MATTERMOST_RECONNECT_MAX_DELAY_MS") {
            self.mattermost.reconnect_max_delay_ms =
                parse_u64("MATTERGATE_MATTERMOST_RECONNECT_MAX_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("MATTERGATE_BACKEND_BASE_URL") {
            self.backend.base_url = value;
        }
        if let Some(value) = read_env("MATTERGATE_BACKEND_TIMEOUT_SECS") {
            self.backend.timeout_secs = parse_u64("MATTERGATE_BACKEND_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("MATTERGATE_BACKEND_RETRY_BACKOFF_SECS") {
            self.backend.retry_backoff_secs =
                parse_u64("MATTERGATE_BACKEND_RETRY_BACKOFF_SECS", &value)?;
        }
        if let Some(value) = read_env("MATTERGATE_BACKEND_MAX_IN_FLIGHT_PER_TENANT") {
            self.backend.max_in_flight_per_tenant =
                parse_u32("MATTERGATE_BACKEND_MAX_IN_FLIGHT_PER_TENANT", &value)?;
        }

        if let Some(value) = read_env("MATTERGATE_GATEWAY_QUEUE_CAPACITY") {
            self.gateway.queue_capacity = parse_usize("MATTERGATE_GATEWAY_QUEUE_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("MATTERGATE_GATEWAY_CHANNEL_QUEUE_CAPACITY") {
            self.gateway.channel_queue_capacity =
                parse_usize("MATTERGATE_GATEWAY_CHANNEL_QUEUE_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("MATTERGATE_GATEWAY_DEDUPE_TTL_SECS") {
            self.gateway.dedupe_ttl_secs = parse_u64("MATTERGATE_GATEWAY_DEDUPE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("MATTERGATE_GATEWAY_DEDUPE_CAPACITY") {
            self.gateway.dedupe_capacity =
                parse_usize("MATTERGATE_GATEWAY_DEDUPE_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("MATTERGATE_GATEWAY_SESSION_IDLE_SECS") {
            self.gateway.session_idle_secs =
                parse_u64("MATTERGATE_GATEWAY_SESSION_IDLE_SECS", &value)?;
        }
        if let Some(value) = read_env("MATTERGATE_GATEWAY_SESSION_CAPACITY") {
            self.gateway.session_capacity =
                parse_usize("MATTERGATE_GATEWAY_SESSION_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("MATTERGATE_GATEWAY_TENANT_CACHE_TTL_SECS") {
            self.gateway.tenant_cache_ttl_secs =
                parse_u64("MATTERGATE_GATEWAY_TENANT_CACHE_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("MATTERGATE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MATTERGATE_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("MATTERGATE_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("MATTERGATE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("MATTERGATE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("MATTERGATE_LOGGING_LEVEL").or_else(|| read_env("MATTERGATE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MATTERGATE_LOGGING_FORMAT").or_else(|| read_env("MATTERGATE_LOG_FORMAT"));
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
        if let Some(backend_base_url) = overrides.backend_base_url {
            self.backend.base_url = backend_base_url;
        }
        if let Some(mattermost_server_url) = overrides.mattermost_server_url {
            self.default_server_mut().url = mattermost_server_url;
        }
        if let Some(mattermost_bot_token) = overrides.mattermost_bot_token {
            self.default_server_mut().bot_token = secret_value(mattermost_bot_token);
        }
    }

    /// The server entry env vars and overrides target. Created on first use so
    /// a file-less deployment can be configured entirely from the environment.
    fn default_server_mut(&mut self) -> &mut MattermostServerConfig {
        let position = self.mattermost.servers.iter().position(|server| server.name == "default");
        let index = match position {
            Some(index) => index,
            None => {
                self.mattermost.servers.push(MattermostServerConfig {
                    name: "default".to_string(),
                    url: String::new(),
                    bot_token: secret_value(String::new()),
                });
                self.mattermost.servers.len() - 1
            }
        };
        &mut self.mattermost.servers[index]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_mattermost(&self.mattermost)?;
        validate_backend(&self.backend)?;
        validate_gateway(&self.gateway)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("mattergate.toml"), PathBuf::from("config/mattergate.toml")]
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

fn validate_mattermost(mattermost: &MattermostConfig) -> Result<(), ConfigError> {
    if mattermost.servers.is_empty() {
        return Err(ConfigError::Validation(
            "no mattermost servers configured. Add a [[mattermost.servers]] entry or set \
             MATTERGATE_MATTERMOST_SERVER_URL and MATTERGATE_MATTERMOST_BOT_TOKEN"
                .to_string(),
        ));
    }

    for server in &mattermost.servers {
        if server.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "mattermost.servers entries must have a non-empty name".to_string(),
            ));
        }

        let url = server.url.trim();
        if url.is_empty() {
            return Err(ConfigError::Validation(format!(
                "mattermost server `{}` has no url. Set it to the server base, e.g. \
                 https://chat.example.com",
                server.name
            )));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "mattermost server `{}` url must start with http:// or https://",
                server.name
            )));
        }

        if server.bot_token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "mattermost server `{}` has no bot_token. Create one under System Console > \
                 Integrations > Bot Accounts",
                server.name
            )));
        }
    }

    for (index, server) in mattermost.servers.iter().enumerate() {
        let duplicate =
            mattermost.servers.iter().skip(index + 1).any(|other| other.name == server.name);
        if duplicate {
            return Err(ConfigError::Validation(format!(
                "mattermost server name `{}` is configured more than once",
                server.name
            )));
        }
    }

    if mattermost.ping_interval_secs == 0 || mattermost.ping_interval_secs > 300 {
        return Err(ConfigError::Validation(
            "mattermost.ping_interval_secs must be in range 1..=300".to_string(),
        ));
    }

    if mattermost.reconnect_base_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "mattermost.reconnect_base_delay_ms must be greater than zero".to_string(),
        ));
    }

    if mattermost.reconnect_max_delay_ms < mattermost.reconnect_base_delay_ms {
        return Err(ConfigError::Validation(
            "mattermost.reconnect_max_delay_ms must be at least reconnect_base_delay_ms"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    let base_url = backend.base_url.trim();
    if base_url.is_empty() {
        return Err(ConfigError::Validation(
            "backend.base_url is required. Set it to the answer service base, e.g. \
             https://answers.example.com"
                .to_string(),
        ));
    }
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "backend.base_url must start with http:// or https://".to_string(),
        ));
    }

    if backend.timeout_secs == 0 || backend.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "backend.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if backend.retry_backoff_secs == 0 || backend.retry_backoff_secs > 60 {
        return Err(ConfigError::Validation(
            "backend.retry_backoff_secs must be in range 1..=60".to_string(),
        ));
    }

    if backend.max_in_flight_per_tenant == 0 {
        return Err(ConfigError::Validation(
            "backend.max_in_flight_per_tenant must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "gateway.queue_capacity must be greater than zero".to_string(),
        ));
    }

    if gateway.channel_queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "gateway.channel_queue_capacity must be greater than zero".to_string(),
        ));
    }

    if gateway.dedupe_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "gateway.dedupe_ttl_secs must be greater than zero".to_string(),
        ));
    }

    if gateway.dedupe_capacity == 0 {
        return Err(ConfigError::Validation(
            "gateway.dedupe_capacity must be greater than zero".to_string(),
        ));
    }

    if gateway.session_idle_secs == 0 {
        return Err(ConfigError::Validation(
            "gateway.session_idle_secs must be greater than zero".to_string(),
        ));
    }

    if gateway.session_capacity == 0 {
        return Err(ConfigError::Validation(
            "gateway.session_capacity must be greater than zero".to_string(),
        ));
    }

    if gateway.tenant_cache_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "gateway.tenant_cache_ttl_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
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

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    mattermost: Option<MattermostPatch>,
    backend: Option<BackendPatch>,
    gateway: Option<GatewayPatch>,
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
struct MattermostPatch {
    servers: Option<Vec<MattermostServerPatch>>,
    ping_interval_secs: Option<u64>,
    reconnect_base_delay_ms: Option<u64>,
    reconnect_max_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MattermostServerPatch {
    name: Option<String>,
    url: String,
    bot_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    retry_backoff_secs: Option<u64>,
    max_in_flight_per_tenant: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    queue_capacity: Option<usize>,
    channel_queue_capacity: Option<usize>,
    dedupe_ttl_secs: Option<u64>,
    dedupe_capacity: Option<usize>,
    session_idle_secs: Option<u64>,
    session_capacity: Option<usize>,
    tenant_cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
