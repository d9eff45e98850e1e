use std::env;

use contentgate_server::ServerBuilder;
use contentgate_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From CONTENTGATE_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (contentgate.toml), optional
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (CONTENTGATE_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    // Initialize tracing early with the default level
    contentgate_server::observability::init_tracing();

    let (config_path, source) = resolve_config_path();

    // An explicit path must exist; the default file is optional
    let explicit = config_path.as_deref();
    let cfg = match load_config(explicit) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path.as_deref().unwrap_or(DEFAULT_CONFIG_FILE),
        source = %source,
        api_key = !cfg.auth.api_key.is_empty(),
        jwt = !cfg.auth.jwt_secret.is_empty(),
        "Configuration loaded"
    );

    contentgate_server::observability::apply_logging_level(&cfg.logging.level);
    contentgate_server::metrics::init_metrics();

    let server = match ServerBuilder::new().with_config(cfg).build() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: CONTENTGATE_CONFIG
/// 3. Default: contentgate.toml (skipped when absent)
fn resolve_config_path() -> (Option<String>, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config"
            && let Some(path) = args.next()
        {
            return (Some(path), ConfigSource::CliArgument);
        }
    }

    if let Ok(path) = env::var("CONTENTGATE_CONFIG")
        && !path.is_empty()
    {
        return (Some(path), ConfigSource::EnvironmentVariable);
    }

    (None, ConfigSource::Default)
}
