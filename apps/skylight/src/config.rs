use std::env;
use std::time::Duration;
#[cfg(test)]
use std::sync::Mutex;

/// Skylight client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the gateway backend (defaults to "http://127.0.0.1:8000")
    pub server_url: String,
    /// Polling fallback period
    pub poll_interval: Duration,
    /// How many log lines a full fetch requests
    pub log_fetch_limit: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let server = env::var("SKYLIGHT_SERVER")
            .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());
        let poll_interval = env::var("SKYLIGHT_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Self::default().poll_interval);
        Self {
            server_url: normalize_server_url(&server),
            poll_interval,
            ..Self::default()
        }
    }

    /// Replace the server URL, normalizing it the same way `from_env` does.
    pub fn with_server_url(mut self, url: &str) -> Self {
        self.server_url = normalize_server_url(url);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            poll_interval: Duration::from_millis(4000),
            log_fetch_limit: 200,
        }
    }
}

/// Trim trailing slashes and normalize localhost to IPv4 to avoid the
/// IPv6 (::1) preference on macOS.
fn normalize_server_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    for scheme in ["http://", "https://"] {
        if let Some(rest) = url.strip_prefix(scheme) {
            if let Some(tail) = rest.strip_prefix("localhost") {
                if tail.is_empty() || tail.starts_with(':') || tail.starts_with('/') {
                    return format!("{scheme}127.0.0.1{tail}");
                }
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    // Mutex to ensure environment variable tests don't run in parallel
    static ENV_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "http://127.0.0.1:8000");
        assert_eq!(config.poll_interval, Duration::from_millis(4000));
    }

    #[test]
    fn test_config_from_env_default() {
        let _lock = ENV_MUTEX.lock().unwrap();

        unsafe {
            env::remove_var("SKYLIGHT_SERVER");
            env::remove_var("SKYLIGHT_POLL_INTERVAL_MS");
        }
        let config = Config::from_env();
        assert_eq!(config.server_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_config_from_env_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();

        let original = env::var("SKYLIGHT_SERVER").ok();

        unsafe {
            env::set_var("SKYLIGHT_SERVER", "https://gateway.example.com/");
        }
        let config = Config::from_env();
        assert_eq!(config.server_url, "https://gateway.example.com");

        unsafe {
            if let Some(orig) = original {
                env::set_var("SKYLIGHT_SERVER", orig);
            } else {
                env::remove_var("SKYLIGHT_SERVER");
            }
        }
    }

    #[test]
    fn test_localhost_normalized_to_ipv4() {
        let config = Config::default().with_server_url("http://localhost:8000/");
        assert_eq!(config.server_url, "http://127.0.0.1:8000");

        // Hosts merely starting with "localhost" are left alone.
        let config = Config::default().with_server_url("http://localhost-cdn.example.com");
        assert_eq!(config.server_url, "http://localhost-cdn.example.com");
    }
}
