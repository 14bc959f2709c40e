/// Client configuration
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Paths of the authorization and identity endpoints, relative to `base_url`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub token: String,
    pub refresh: String,
    pub profile: String,
    pub change_password: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token: "/oauth/token".to_string(),
            refresh: "/oauth/refresh".to_string(),
            profile: "/oauth/me".to_string(),
            change_password: "/oauth/me/change-password".to_string(),
        }
    }
}

impl Endpoints {
    /// Whether `path` targets token issuance or refresh. 401s from these are
    /// never recovered by refreshing.
    pub fn is_token_endpoint(&self, path: &str) -> bool {
        path.contains(&self.token) || self.is_refresh_endpoint(path)
    }

    pub fn is_refresh_endpoint(&self, path: &str) -> bool {
        path.contains(&self.refresh)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Budget for each request, including replays
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub endpoints: Endpoints,
    /// Where a hard redirect sends the application when the session is lost
    pub landing_location: String,
    /// Durable storage key of the access token
    pub storage_key: String,
    pub default_content_type: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            timeout: Duration::from_secs(10),
            endpoints: Endpoints::default(),
            landing_location: "/".to_string(),
            storage_key: "token".to_string(),
            default_content_type: "application/json".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_landing_location(mut self, location: impl Into<String>) -> Self {
        self.landing_location = location.into();
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
