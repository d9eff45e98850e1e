//! Log output for the gateway. The level set in `[logging]` can be applied
//! after startup because tracing is initialized before config is loaded.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER: OnceLock<FilterHandle> = OnceLock::new();

/// Transport crates log every engine connection at `info`.
const QUIET_DEPENDENCIES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2"];

/// Filter directives for a gateway-wide level.
pub fn filter_directives(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    if level != "info" {
        return level;
    }
    let mut directives = vec![level];
    directives.extend(QUIET_DEPENDENCIES.iter().map(|krate| format!("{krate}=warn")));
    directives.join(",")
}

fn env_override() -> Option<EnvFilter> {
    std::env::var_os("RUST_LOG")?;
    EnvFilter::try_from_default_env().ok()
}

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    let filter = env_override().unwrap_or_else(|| EnvFilter::new(filter_directives(level)));
    let (filter, handle) = reload::Layer::new(filter);
    let _ = FILTER.set(handle);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Switch to the configured level. `RUST_LOG` wins when set.
pub fn apply_logging_level(level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let Some(handle) = FILTER.get() else {
        return;
    };
    if let Err(e) = handle.reload(EnvFilter::new(filter_directives(level))) {
        tracing::warn!(error = %e, level, "Failed to apply logging level");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_quiets_transport_crates() {
        let directives = filter_directives("info");
        assert!(directives.starts_with("info,"));
        assert!(directives.contains("hyper=warn"));
        assert!(directives.contains("reqwest=warn"));
    }

    #[test]
    fn test_debug_keeps_everything() {
        assert_eq!(filter_directives(" debug "), "debug");
        assert_eq!(filter_directives("trace"), "trace");
        assert_eq!(filter_directives("off"), "off");
        assert!(filter_directives("INFO").starts_with("info,"));
    }
}
