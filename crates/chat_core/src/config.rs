use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::paths;

const CONFIG_FILE_PATH: &str = "config.toml";
const DEFAULT_API_BASE: &str = "http://localhost:8000";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base: String,
    pub http_proxy: String,
    pub https_proxy: String,
    /// Timeout for non-streaming calls. The chat stream is never timed out.
    pub request_timeout_secs: u64,
    /// Messages an unauthenticated user may send before being asked to sign in.
    pub anonymous_message_limit: u32,
    /// A credential this close to its expiry is treated as expired.
    pub token_expiry_margin_secs: u64,
    /// Identity-bootstrap endpoint; a 401 from it is never retried.
    pub bootstrap_path: String,
    pub app_data_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            http_proxy: String::new(),
            https_proxy: String::new(),
            request_timeout_secs: 30,
            anonymous_message_limit: 2,
            token_expiry_margin_secs: 30,
            bootstrap_path: "/auth/me".to_string(),
            app_data_dir: paths::client_dir(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("Ignoring invalid value for {key}: {value:?}");
            None
        }
    }
}

impl ClientConfig {
    /// Defaults, then `~/.chat_client/config.json`, then `./config.toml`,
    /// then environment overrides.
    pub fn load() -> Self {
        let mut config = ClientConfig::default();

        let mut loaded = false;
        let json_path = paths::config_json_path();
        if json_path.exists() {
            match std::fs::read_to_string(&json_path) {
                Ok(content) => match serde_json::from_str::<ClientConfig>(&content) {
                    Ok(file_config) => {
                        config = file_config;
                        loaded = true;
                    }
                    Err(e) => log::warn!("Failed to parse {}: {e}", json_path.display()),
                },
                Err(e) => log::warn!("Failed to read {}: {e}", json_path.display()),
            }
        }

        if !loaded && std::path::Path::new(CONFIG_FILE_PATH).exists() {
            if let Ok(content) = std::fs::read_to_string(CONFIG_FILE_PATH) {
                match toml::from_str::<ClientConfig>(&content) {
                    Ok(file_config) => config = file_config,
                    Err(e) => log::warn!("Failed to parse {CONFIG_FILE_PATH}: {e}"),
                }
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_base) = lookup("CHAT_API_BASE") {
            self.api_base = api_base;
        }
        if let Some(proxy) = lookup("CHAT_HTTP_PROXY").or_else(|| lookup("HTTP_PROXY")) {
            self.http_proxy = proxy;
        }
        if let Some(proxy) = lookup("CHAT_HTTPS_PROXY").or_else(|| lookup("HTTPS_PROXY")) {
            self.https_proxy = proxy;
        }
        if let Some(secs) = lookup("CHAT_REQUEST_TIMEOUT_SECS")
            .and_then(|v| parse_env("CHAT_REQUEST_TIMEOUT_SECS", &v))
        {
            self.request_timeout_secs = secs;
        }
        if let Some(limit) = lookup("CHAT_ANON_MESSAGE_LIMIT")
            .and_then(|v| parse_env("CHAT_ANON_MESSAGE_LIMIT", &v))
        {
            self.anonymous_message_limit = limit;
        }
        if let Some(margin) = lookup("CHAT_TOKEN_MARGIN_SECS")
            .and_then(|v| parse_env("CHAT_TOKEN_MARGIN_SECS", &v))
        {
            self.token_expiry_margin_secs = margin;
        }
        if let Some(dir) = lookup("CHAT_APP_DATA_DIR") {
            self.app_data_dir = PathBuf::from(dir);
        }
    }

    /// Config pointing at `api_base`, everything else default.
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_expiry_margin(&self) -> Duration {
        Duration::from_secs(self.token_expiry_margin_secs)
    }

    /// Absolute URL for an API path.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_service_contract() {
        let config = ClientConfig::default();
        assert_eq!(config.anonymous_message_limit, 2);
        assert_eq!(config.token_expiry_margin(), Duration::from_secs(30));
        assert_eq!(config.bootstrap_path, "/auth/me");
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        let mut config = ClientConfig::default();
        config.apply_env(lookup_from(&[
            ("CHAT_API_BASE", "https://chat.example.com"),
            ("HTTPS_PROXY", "http://proxy:3128"),
            ("CHAT_ANON_MESSAGE_LIMIT", "5"),
            ("CHAT_TOKEN_MARGIN_SECS", "60"),
        ]));

        assert_eq!(config.api_base, "https://chat.example.com");
        assert_eq!(config.https_proxy, "http://proxy:3128");
        assert_eq!(config.anonymous_message_limit, 5);
        assert_eq!(config.token_expiry_margin_secs, 60);
    }

    #[test]
    fn test_invalid_numeric_env_values_are_ignored() {
        let mut config = ClientConfig::default();
        config.apply_env(lookup_from(&[("CHAT_REQUEST_TIMEOUT_SECS", "soon")]));
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ClientConfig =
            toml::from_str("api_base = \"https://api.example.com\"\n").expect("parse");
        assert_eq!(config.api_base, "https://api.example.com");
        assert_eq!(config.anonymous_message_limit, 2);
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let config = ClientConfig::with_api_base("https://api.example.com/");
        assert_eq!(
            config.endpoint("/chat/sessions"),
            "https://api.example.com/chat/sessions"
        );
    }
}
