use std::{env, fs};

use contentgate_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    // Create a temporary TOML configuration file
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("contentgate.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
body_limit_bytes = 4096
cors_origins = ["https://www.example.org"]

[engine]
base_url = "http://127.0.0.1:9000"
content_api_base = "/api/content"
timeout_ms = 2500
max_concurrency = 2

[auth]
public_paths = ["/health", "/content/featured"]

[rate_limit]
max_requests = 20
window_secs = 10

[cache]
featured_ttl_secs = 30

[content]
max_batch_size = 5

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses; unspecified sections keep defaults
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.server.cors_origins, vec!["https://www.example.org"]);
    assert_eq!(cfg.engine.content_api_base, "/api/content");
    assert_eq!(cfg.engine.max_concurrency, 2);
    assert_eq!(cfg.auth.public_paths.len(), 2);
    assert!(cfg.auth.api_key.is_empty());
    assert_eq!(cfg.rate_limit.max_requests, 20);
    assert!(cfg.rate_limit.enabled);
    assert_eq!(cfg.cache.featured_ttl_secs, 30);
    assert_eq!(cfg.cache.search_ttl_secs, 300);
    assert_eq!(cfg.content.max_batch_size, 5);
    assert_eq!(cfg.site.api_url, "http://localhost:3001");
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");

    // 2) Env override should win over file
    unsafe {
        env::set_var("CONTENTGATE__RATE_LIMIT__MAX_REQUESTS", "7");
        env::set_var("CONTENTGATE__AUTH__API_KEY", "from-env");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.rate_limit.max_requests, 7);
    assert_eq!(cfg_env.auth.api_key, "from-env");
    unsafe {
        env::remove_var("CONTENTGATE__RATE_LIMIT__MAX_REQUESTS");
        env::remove_var("CONTENTGATE__AUTH__API_KEY");
    }

    // 3) Validation failure is reported
    let bad = dir.path().join("bad.toml");
    fs::write(&bad, "[engine]\nmax_concurrency = 0\n").expect("write bad toml");
    let err = load_config(bad.to_str()).expect_err("validation should fail");
    assert!(err.contains("engine.max_concurrency"), "unexpected error: {err}");

    // 4) An explicit path that does not exist is an error
    let missing = dir.path().join("missing.toml");
    assert!(load_config(missing.to_str()).is_err());
}
