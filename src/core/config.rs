use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::path::PathBuf;

/// Default tolerance the exchange applies to request timestamps
pub const DEFAULT_RECV_WINDOW_MS: u64 = 5000;

/// How authenticated requests are signed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    None,
    SharedSecret,
    PrivateKey,
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub api_key: Secret<String>,
    pub secret_key: Secret<String>,
    pub private_key_path: Option<PathBuf>,
    pub testnet: bool,
    pub base_url: Option<String>,
    pub ws_public_url: Option<String>,
    pub ws_private_url: Option<String>,
    pub recv_window_ms: u64,
}

// Custom Serialize implementation - never expose secrets in serialization
impl Serialize for ExchangeConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExchangeConfig", 8)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("secret_key", "[REDACTED]")?;
        state.serialize_field("private_key_path", &self.private_key_path)?;
        state.serialize_field("testnet", &self.testnet)?;
        state.serialize_field("base_url", &self.base_url)?;
        state.serialize_field("ws_public_url", &self.ws_public_url)?;
        state.serialize_field("ws_private_url", &self.ws_private_url)?;
        state.serialize_field("recv_window_ms", &self.recv_window_ms)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ExchangeConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ExchangeConfigHelper {
            #[serde(default)]
            api_key: String,
            #[serde(default)]
            secret_key: String,
            #[serde(default)]
            private_key_path: Option<PathBuf>,
            #[serde(default)]
            testnet: bool,
            #[serde(default)]
            base_url: Option<String>,
            #[serde(default)]
            ws_public_url: Option<String>,
            #[serde(default)]
            ws_private_url: Option<String>,
            #[serde(default = "default_recv_window")]
            recv_window_ms: u64,
        }

        fn default_recv_window() -> u64 {
            DEFAULT_RECV_WINDOW_MS
        }

        let helper = ExchangeConfigHelper::deserialize(deserializer)?;
        Ok(Self {
            api_key: Secret::new(helper.api_key),
            secret_key: Secret::new(helper.secret_key),
            private_key_path: helper.private_key_path,
            testnet: helper.testnet,
            base_url: helper.base_url,
            ws_public_url: helper.ws_public_url,
            ws_private_url: helper.ws_private_url,
            recv_window_ms: helper.recv_window_ms,
        })
    }
}

impl ExchangeConfig {
    /// Create a new configuration signing with a shared secret
    #[must_use]
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            private_key_path: None,
            testnet: false,
            base_url: None,
            ws_public_url: None,
            ws_private_url: None,
            recv_window_ms: DEFAULT_RECV_WINDOW_MS,
        }
    }

    /// Create a new configuration signing with an RSA private key stored in a PEM file
    #[must_use]
    pub fn with_private_key(api_key: String, private_key_path: impl Into<PathBuf>) -> Self {
        Self {
            private_key_path: Some(private_key_path.into()),
            ..Self::new(api_key, String::new())
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_API_KEY` (e.g., `BYBIT_API_KEY`)
    /// - `{PREFIX}_SECRET_KEY` or `{PREFIX}_PRIVATE_KEY_PATH`
    /// - `{PREFIX}_TESTNET` (optional, defaults to false)
    /// - `{PREFIX}_BASE_URL` (optional)
    /// - `{PREFIX}_RECV_WINDOW` (optional, milliseconds)
    pub fn from_env(exchange_prefix: &str) -> Result<Self, ConfigError> {
        let prefix = exchange_prefix.to_uppercase();
        let api_key_var = format!("{}_API_KEY", prefix);
        let secret_key_var = format!("{}_SECRET_KEY", prefix);
        let private_key_var = format!("{}_PRIVATE_KEY_PATH", prefix);

        let api_key = env::var(&api_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(api_key_var))?;

        let secret_key = env::var(&secret_key_var).ok();
        let private_key_path = env::var(&private_key_var).ok().map(PathBuf::from);

        if secret_key.is_none() && private_key_path.is_none() {
            return Err(ConfigError::MissingEnvironmentVariable(secret_key_var));
        }

        let testnet = env::var(format!("{}_TESTNET", prefix))
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        let recv_window_ms = match env::var(format!("{}_RECV_WINDOW", prefix)) {
            Ok(raw) => raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidConfiguration(format!(
                    "Invalid receive window '{}': {}",
                    raw, e
                ))
            })?,
            Err(_) => DEFAULT_RECV_WINDOW_MS,
        };

        Ok(Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key.unwrap_or_default()),
            private_key_path,
            testnet,
            base_url: env::var(format!("{}_BASE_URL", prefix)).ok(),
            ws_public_url: None,
            ws_private_url: None,
            recv_window_ms,
        })
    }

    /// Create configuration from a .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(exchange_prefix: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(".env") {
            Ok(_) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file: {}",
                    e
                )));
            }
        }

        Self::from_env(exchange_prefix)
    }

    /// Configuration for public endpoints only
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(String::new(), String::new())
    }

    /// Authentication mode, fixed by what credentials were supplied
    pub fn auth_mode(&self) -> AuthMode {
        if self.api_key.expose_secret().is_empty() {
            AuthMode::None
        } else if self.private_key_path.is_some() {
            AuthMode::PrivateKey
        } else if !self.secret_key.expose_secret().is_empty() {
            AuthMode::SharedSecret
        } else {
            AuthMode::None
        }
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.auth_mode() != AuthMode::None
    }

    #[must_use]
    pub const fn testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    #[must_use]
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    #[must_use]
    pub fn ws_public_url(mut self, url: String) -> Self {
        self.ws_public_url = Some(url);
        self
    }

    #[must_use]
    pub fn ws_private_url(mut self, url: String) -> Self {
        self.ws_private_url = Some(url);
        self
    }

    #[must_use]
    pub const fn recv_window_ms(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    /// Sign with the RSA key in this PEM file instead of the shared secret
    #[must_use]
    pub fn private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Get secret key (use carefully - exposes secret)
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_mode_selection() {
        assert_eq!(ExchangeConfig::read_only().auth_mode(), AuthMode::None);
        assert_eq!(
            ExchangeConfig::new("key".to_string(), "secret".to_string()).auth_mode(),
            AuthMode::SharedSecret
        );
        assert_eq!(
            ExchangeConfig::with_private_key("key".to_string(), "/tmp/key.pem").auth_mode(),
            AuthMode::PrivateKey
        );
        assert_eq!(
            ExchangeConfig::new(String::new(), "secret".to_string()).auth_mode(),
            AuthMode::None
        );
    }

    #[test]
    fn test_serialization_redacts_secrets() {
        let config = ExchangeConfig::new("my_key".to_string(), "my_secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("my_key"));
        assert!(!json.contains("my_secret"));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn test_deserialize_defaults_recv_window() {
        let config: ExchangeConfig =
            serde_json::from_str(r#"{"api_key":"k","secret_key":"s","testnet":true}"#).unwrap();
        assert_eq!(config.recv_window_ms, DEFAULT_RECV_WINDOW_MS);
        assert!(config.testnet);
        assert_eq!(config.api_key(), "k");
    }

    #[test]
    fn test_from_env() {
        env::set_var("BYBITX_CFG_TEST_API_KEY", "env_key");
        env::set_var("BYBITX_CFG_TEST_SECRET_KEY", "env_secret");
        env::set_var("BYBITX_CFG_TEST_RECV_WINDOW", "10000");

        let config = ExchangeConfig::from_env("bybitx_cfg_test").unwrap();
        assert_eq!(config.api_key(), "env_key");
        assert_eq!(config.secret_key(), "env_secret");
        assert_eq!(config.recv_window_ms, 10000);
        assert_eq!(config.auth_mode(), AuthMode::SharedSecret);
    }

    #[test]
    fn test_from_env_requires_secret_material() {
        env::set_var("BYBITX_NOSECRET_API_KEY", "env_key");
        let err = ExchangeConfig::from_env("bybitx_nosecret").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEnvironmentVariable(ref var) if var == "BYBITX_NOSECRET_SECRET_KEY"
        ));
    }
}
