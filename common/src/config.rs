//! Service configuration.
//!
//! Loaded from environment variables. A `.env` file in the working
//! directory is read first; variables already present in the environment win.

use std::time::Duration;

/// Default public pub.dev API endpoint.
pub const DEFAULT_PACKAGE_REGISTRY_URL: &str = "https://pub.dev/api/packages";

/// Runtime configuration shared by all services.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Service name (used in logs and response metadata).
    pub service_name: String,
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Timeout for establishing a connection to a target database.
    pub connect_timeout_secs: u64,
    /// Default upper bound for a whole operation, session included.
    pub operation_timeout_secs: u64,
    /// Package registry base URL.
    pub package_registry_url: String,
    /// Attempts made against the package registry before giving up.
    pub package_lookup_retries: u32,
    /// Per-request timeout for package registry calls.
    pub package_lookup_timeout_secs: u64,
    /// Attempts at drawing an unused developer key.
    pub dev_key_max_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "data-service".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8083,
            connect_timeout_secs: 10,
            operation_timeout_secs: 30,
            package_registry_url: DEFAULT_PACKAGE_REGISTRY_URL.to_string(),
            package_lookup_retries: 3,
            package_lookup_timeout_secs: 10,
            dev_key_max_attempts: 32,
        }
    }
}

impl AppConfig {
    /// Loads configuration for the named service.
    pub fn load_with_service(service_name: &str) -> Self {
        load_dotenv();
        let defaults = Self::default();

        Self {
            service_name: service_name.to_string(),
            host: env_or("SERVER_HOST", defaults.host),
            port: env_parse("SERVER_PORT", defaults.port),
            connect_timeout_secs: env_parse("CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
            operation_timeout_secs: env_parse(
                "OPERATION_TIMEOUT_SECS",
                defaults.operation_timeout_secs,
            ),
            package_registry_url: env_or("PACKAGE_REGISTRY_URL", defaults.package_registry_url),
            package_lookup_retries: env_parse(
                "PACKAGE_LOOKUP_RETRIES",
                defaults.package_lookup_retries,
            )
            .max(1),
            package_lookup_timeout_secs: env_parse(
                "PACKAGE_LOOKUP_TIMEOUT_SECS",
                defaults.package_lookup_timeout_secs,
            ),
            dev_key_max_attempts: env_parse("DEV_KEY_MAX_ATTEMPTS", defaults.dev_key_max_attempts)
                .max(1),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn package_lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.package_lookup_timeout_secs)
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Load .env file from the working directory (best-effort, no error if missing).
fn load_dotenv() {
    let env_path = std::path::Path::new(".env");
    let Ok(content) = std::fs::read_to_string(env_path) else {
        return;
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            // Only set if not already set by the environment
            if std::env::var(key).is_err() {
                std::env::set_var(key, value.trim());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
        assert_eq!(config.package_registry_url, DEFAULT_PACKAGE_REGISTRY_URL);
        assert!(config.dev_key_max_attempts > 0);
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        std::env::set_var("OYDA_TEST_GARBAGE_PORT", "not-a-number");
        assert_eq!(env_parse("OYDA_TEST_GARBAGE_PORT", 42u16), 42);
        std::env::set_var("OYDA_TEST_GOOD_PORT", " 9000 ");
        assert_eq!(env_parse("OYDA_TEST_GOOD_PORT", 42u16), 9000);
    }
}
