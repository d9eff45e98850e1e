use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Content engine bridge
    #[serde(default)]
    pub engine: EngineConfig,
    /// API key / JWT secrets and the public allowlist
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Response cache TTLs
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub content: ContentSettings,
    /// Site metadata echoed by `/config`
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Engine validations
        if url::Url::parse(&self.engine.base_url).is_err() {
            return Err(format!(
                "engine.base_url is not a valid URL: {}",
                self.engine.base_url
            ));
        }
        if self.engine.timeout_ms == 0 {
            return Err("engine.timeout_ms must be > 0".into());
        }
        if self.engine.max_concurrency == 0 {
            return Err("engine.max_concurrency must be > 0".into());
        }
        // Rate limit validations
        if self.rate_limit.enabled {
            if self.rate_limit.max_requests == 0 {
                return Err("rate_limit.max_requests must be > 0".into());
            }
            if self.rate_limit.window_secs == 0 {
                return Err("rate_limit.window_secs must be > 0".into());
            }
        }
        // Content validations
        if self.content.max_search_limit == 0 {
            return Err("content.max_search_limit must be > 0".into());
        }
        if self.content.default_search_limit == 0
            || self.content.default_search_limit > self.content.max_search_limit
        {
            return Err(
                "content.default_search_limit must be > 0 and <= content.max_search_limit".into(),
            );
        }
        if self.content.max_batch_size == 0 {
            return Err("content.max_batch_size must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// Origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3001
}
fn default_body_limit() -> usize {
    1024 * 1024
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".into(),
        "http://localhost:8080".into(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// How the gateway reaches the content engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine's local origin (document root), e.g. `http://127.0.0.1:8088`
    #[serde(default = "default_engine_base_url")]
    pub base_url: String,

    /// Engine-side base of the structured-content API
    #[serde(default = "default_content_api_base")]
    pub content_api_base: String,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_engine_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum in-flight engine calls
    #[serde(default = "default_engine_max_concurrency")]
    pub max_concurrency: usize,

    /// Forward Authorization/Cookie headers to the engine
    #[serde(default)]
    pub forward_auth_headers: bool,
}

fn default_engine_base_url() -> String {
    "http://127.0.0.1:8088".into()
}
fn default_content_api_base() -> String {
    "/jsonapi".into()
}
fn default_engine_timeout_ms() -> u64 {
    10_000
}
fn default_engine_max_concurrency() -> usize {
    8
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_engine_base_url(),
            content_api_base: default_content_api_base(),
            timeout_ms: default_engine_timeout_ms(),
            max_concurrency: default_engine_max_concurrency(),
            forward_auth_headers: false,
        }
    }
}

/// Authentication settings.
///
/// Secrets are best supplied through the environment:
/// - CONTENTGATE__AUTH__API_KEY
/// - CONTENTGATE__AUTH__JWT_SECRET
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Shared secret expected in `X-API-Key` (empty disables)
    #[serde(default)]
    pub api_key: String,

    /// HS256 signing secret for bearer tokens (empty disables)
    #[serde(default)]
    pub jwt_secret: String,

    /// Paths admitted without credentials
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec![
        "/health".into(),
        "/metrics".into(),
        "/config".into(),
        "/content/featured".into(),
    ]
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            jwt_secret: String::new(),
            public_paths: default_public_paths(),
        }
    }
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("api_key", &(!self.api_key.is_empty()))
            .field("jwt_secret", &(!self.jwt_secret.is_empty()))
            .field("public_paths", &self.public_paths)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,

    /// Requests allowed per client per window
    #[serde(default = "default_rate_limit_max")]
    pub max_requests: u32,

    #[serde(default = "default_rate_limit_window")]
    pub window_secs: u64,

    /// Use the first X-Forwarded-For hop as the client identity
    #[serde(default)]
    pub trust_forwarded_for: bool,

    /// Upper bound on tracked client windows
    #[serde(default = "default_max_tracked_clients")]
    pub max_tracked_clients: usize,
}

fn default_rate_limit_enabled() -> bool {
    true
}
fn default_rate_limit_max() -> u32 {
    1000
}
fn default_rate_limit_window() -> u64 {
    60
}
fn default_max_tracked_clients() -> usize {
    100_000
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            max_requests: default_rate_limit_max(),
            window_secs: default_rate_limit_window(),
            trust_forwarded_for: false,
            max_tracked_clients: default_max_tracked_clients(),
        }
    }
}

/// Cache TTLs per handler type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Proxy pass-through responses
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Aggregated featured content
    #[serde(default = "default_featured_ttl_secs")]
    pub featured_ttl_secs: u64,

    /// Search results and content statistics
    #[serde(default = "default_search_ttl_secs")]
    pub search_ttl_secs: u64,

    /// Expired-entry sweep interval; 0 disables the sweeper
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    300 // 5 minutes
}
fn default_featured_ttl_secs() -> u64 {
    600 // 10 minutes
}
fn default_search_ttl_secs() -> u64 {
    300 // 5 minutes
}
fn default_sweep_interval_secs() -> u64 {
    60
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
    pub fn featured_ttl(&self) -> Duration {
        Duration::from_secs(self.featured_ttl_secs)
    }
    pub fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.search_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            featured_ttl_secs: default_featured_ttl_secs(),
            search_ttl_secs: default_search_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSettings {
    #[serde(default = "default_search_limit")]
    pub default_search_limit: u32,
    #[serde(default = "default_max_search_limit")]
    pub max_search_limit: u32,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_search_limit() -> u32 {
    10
}
fn default_max_search_limit() -> u32 {
    50
}
fn default_max_batch_size() -> usize {
    50
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            default_search_limit: default_search_limit(),
            max_search_limit: default_max_search_limit(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_name")]
    pub name: String,
    #[serde(default = "default_site_description")]
    pub description: String,
    #[serde(default = "default_site_url")]
    pub url: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_site_name() -> String {
    "Headless Content Site".into()
}
fn default_site_description() -> String {
    "A headless content site served through contentgate".into()
}
fn default_site_url() -> String {
    "http://localhost:3000".into()
}
fn default_api_url() -> String {
    "http://localhost:3001".into()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            description: default_site_description(),
            url: default_site_url(),
            api_url: default_api_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "contentgate.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            return Err(format!("config file not found: {}", pathbuf.display()));
        }
        // Environment variable overrides, e.g., CONTENTGATE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("CONTENTGATE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("server.cors_origins")
                .with_list_parse_key("auth.public_paths"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
