//! Configuration loader
//!
//! Loads the transport configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `PINPOST_BASE_URL` is not set, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! Whatever the source, the result is validated before it is returned.
//!
//! ## Environment Variables
//! - `PINPOST_BASE_URL`: API base URL (required for the env path)
//! - `PINPOST_USER_AGENT`: `User-Agent` header value
//! - `PINPOST_CONNECT_TIMEOUT_MS`: Connect timeout in milliseconds
//! - `PINPOST_READ_TIMEOUT_MS`: Read timeout in milliseconds
//! - `PINPOST_MAX_RETRIES`: Retries after the first attempt
//! - `PINPOST_INITIAL_BACKOFF_MS`: First backoff delay in milliseconds
//! - `PINPOST_WORKER_COUNT`: Task queue workers
//! - `PINPOST_ALLOW_PLAINTEXT`: Permit `http://` base URLs (true/false)
//! - `PINPOST_APPLICATION_ID`: Application id applied at startup
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./pinpost.json` or `./pinpost.toml` (current working directory)
//! 2. `./config.json` or `./config.toml` (current working directory)
//! 3. The same names in the parent and grandparent directories
//! 4. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use pinpost_domain::{ConfigError, TransportConfig};

type Result<T> = std::result::Result<T, ConfigError>;

const FILE_NAMES: [&str; 4] = ["pinpost.json", "pinpost.toml", "config.json", "config.toml"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the required
/// variable is missing, falls back to loading from a config file.
///
/// # Errors
/// Returns a `ConfigError` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - A value fails validation
pub fn load() -> Result<TransportConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(ConfigError::MissingVar(var)) => {
            tracing::debug!(%var, "Environment incomplete, trying file");
            load_from_file(None)
        }
        Err(e) => Err(e),
    }
}

/// Load configuration from environment variables
///
/// Only `PINPOST_BASE_URL` is required; every other field falls back to its
/// default when unset.
///
/// # Errors
/// Returns `ConfigError::MissingVar` if `PINPOST_BASE_URL` is missing and
/// `ConfigError::InvalidValue` for unparsable or invalid values.
pub fn load_from_env() -> Result<TransportConfig> {
    let defaults = TransportConfig::default();

    let config = TransportConfig {
        base_url: env_var("PINPOST_BASE_URL")?,
        user_agent: std::env::var("PINPOST_USER_AGENT").unwrap_or(defaults.user_agent),
        connect_timeout_ms: env_parse("PINPOST_CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms)?,
        read_timeout_ms: env_parse("PINPOST_READ_TIMEOUT_MS", defaults.read_timeout_ms)?,
        max_retries: env_parse("PINPOST_MAX_RETRIES", defaults.max_retries)?,
        initial_backoff_ms: env_parse("PINPOST_INITIAL_BACKOFF_MS", defaults.initial_backoff_ms)?,
        worker_count: env_parse("PINPOST_WORKER_COUNT", defaults.worker_count)?,
        allow_plaintext: env_bool("PINPOST_ALLOW_PLAINTEXT", defaults.allow_plaintext),
        application_id: std::env::var("PINPOST_APPLICATION_ID").ok().filter(|id| !id.is_empty()),
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns a `ConfigError` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - A value fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<TransportConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::Io {
                    path: p.display().to_string(),
                    message: "file not found".to_string(),
                });
            }
            p
        }
        None => probe_config_paths().ok_or(ConfigError::NotFound)?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
        path: config_path.display().to_string(),
        message: e.to_string(),
    })?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<TransportConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
    let parse_error = |message: String| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    };

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| parse_error(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| parse_error(format!("Invalid JSON format: {e}"))),
        _ => Err(parse_error(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches the current working directory, its parent and grandparent, then
/// the same three levels relative to the executable.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.push(exe_dir.to_path_buf());
        }
    }

    roots
        .iter()
        .flat_map(|root| [root.clone(), root.join(".."), root.join("../..")])
        .flat_map(|dir| FILE_NAMES.map(|name| dir.join(name)))
        .find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
}

/// Parse an optional numeric environment variable, `default` when unset.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e| ConfigError::invalid(key, format!("{e}"))),
        Err(_) => Ok(default),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ALL_VARS: [&str; 9] = [
        "PINPOST_BASE_URL",
        "PINPOST_USER_AGENT",
        "PINPOST_CONNECT_TIMEOUT_MS",
        "PINPOST_READ_TIMEOUT_MS",
        "PINPOST_MAX_RETRIES",
        "PINPOST_INITIAL_BACKOFF_MS",
        "PINPOST_WORKER_COUNT",
        "PINPOST_ALLOW_PLAINTEXT",
        "PINPOST_APPLICATION_ID",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
    }

    fn temp_config(contents: &str, extension: &str) -> PathBuf {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        path
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        for (i, value) in ["1", "true", "yes", "on", "TRUE"].iter().enumerate() {
            let key = format!("PINPOST_TEST_BOOL_TRUE_{i}");
            std::env::set_var(&key, value);
            assert!(env_bool(&key, false), "{value} should be true");
            std::env::remove_var(&key);
        }

        for (i, value) in ["0", "false", "no", "off"].iter().enumerate() {
            let key = format!("PINPOST_TEST_BOOL_FALSE_{i}");
            std::env::set_var(&key, value);
            assert!(!env_bool(&key, true), "{value} should be false");
            std::env::remove_var(&key);
        }

        std::env::remove_var("PINPOST_TEST_BOOL_MISSING");
        assert!(env_bool("PINPOST_TEST_BOOL_MISSING", true));
        assert!(!env_bool("PINPOST_TEST_BOOL_MISSING", false));
    }

    #[test]
    fn test_load_from_env_all_vars_set() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("PINPOST_BASE_URL", "https://staging.example.com");
        std::env::set_var("PINPOST_USER_AGENT", "merchant-app/2.1");
        std::env::set_var("PINPOST_CONNECT_TIMEOUT_MS", "2500");
        std::env::set_var("PINPOST_READ_TIMEOUT_MS", "9000");
        std::env::set_var("PINPOST_MAX_RETRIES", "2");
        std::env::set_var("PINPOST_INITIAL_BACKOFF_MS", "50");
        std::env::set_var("PINPOST_WORKER_COUNT", "3");
        std::env::set_var("PINPOST_ALLOW_PLAINTEXT", "false");
        std::env::set_var("PINPOST_APPLICATION_ID", "app-123abc");

        let result = load_from_env();
        clear_env();

        let config = result.expect("config should load from env");
        assert_eq!(config.base_url, "https://staging.example.com");
        assert_eq!(config.user_agent, "merchant-app/2.1");
        assert_eq!(config.connect_timeout_ms, 2500);
        assert_eq!(config.read_timeout_ms, 9000);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.initial_backoff_ms, 50);
        assert_eq!(config.worker_count, 3);
        assert!(!config.allow_plaintext);
        assert_eq!(config.application_id.as_deref(), Some("app-123abc"));
    }

    #[test]
    fn test_load_from_env_defaults_optional_vars() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("PINPOST_BASE_URL", "https://api.example.com");

        let result = load_from_env();
        clear_env();

        let config = result.expect("config should load from env");
        assert_eq!(
            config,
            TransportConfig {
                base_url: "https://api.example.com".to_string(),
                ..TransportConfig::default()
            }
        );
    }

    #[test]
    fn test_load_from_env_missing_base_url() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let err = load_from_env().unwrap_err();

        assert_eq!(err, ConfigError::MissingVar("PINPOST_BASE_URL".to_string()));
    }

    #[test]
    fn test_load_from_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("PINPOST_BASE_URL", "https://api.example.com");
        std::env::set_var("PINPOST_MAX_RETRIES", "not-a-number");

        let result = load_from_env();
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "PINPOST_MAX_RETRIES"
        ));
    }

    #[test]
    fn test_load_from_env_rejects_plaintext_by_default() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("PINPOST_BASE_URL", "http://localhost:8080");

        let rejected = load_from_env();
        std::env::set_var("PINPOST_ALLOW_PLAINTEXT", "yes");
        let allowed = load_from_env();
        clear_env();

        assert!(matches!(rejected, Err(ConfigError::InvalidValue { .. })));
        assert!(allowed.expect("plaintext allowed").allow_plaintext);
    }

    #[test]
    fn test_load_from_file_json() {
        let path = temp_config(
            r#"{ "base_url": "https://api.example.com", "max_retries": 1, "worker_count": 2 }"#,
            "json",
        );

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        let config = result.expect("config should load from JSON file");
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.read_timeout_ms, 15_000);
    }

    #[test]
    fn test_load_from_file_toml() {
        let path = temp_config(
            r#"
base_url = "https://api.example.com"
connect_timeout_ms = 1000
application_id = "app-toml"
"#,
            "toml",
        );

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        let config = result.expect("config should load from TOML file");
        assert_eq!(config.connect_timeout_ms, 1000);
        assert_eq!(config.application_id.as_deref(), Some("app-toml"));
    }

    #[test]
    fn test_load_from_file_validates() {
        let path = temp_config(r#"{ "worker_count": 0 }"#, "json");

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "worker_count"
        ));
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/pinpost.json")));

        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let path = temp_config(r#"{ "this is": "not valid json" "#, "json");

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("some content", Path::new("pinpost.yaml"));

        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
