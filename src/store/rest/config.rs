//! Connection settings for the REST backend.

use std::time::Duration;

use super::error::{RestDaoError, RestResult};

/// Default delay between two change-feed polling passes.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Runtime configuration describing how to reach the row API.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Base URL of the REST endpoint, e.g. `https://host/rest/v1`.
    pub base_url: String,
    /// Optional API key sent as `apikey` and bearer token.
    pub api_key: Option<String>,
    /// Delay between change-feed polling passes.
    pub poll_interval: Duration,
}

impl RestConfig {
    /// Construct a configuration from an explicit base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Attach an API key to the configuration.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override the change-feed polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Build a configuration by reading the expected environment variables.
    pub fn from_env() -> RestResult<Self> {
        let base_url =
            std::env::var("PLANIO_STORE_URL").map_err(|_| RestDaoError::MissingEnvVar {
                var: "PLANIO_STORE_URL",
            })?;

        let mut config = Self::new(base_url);
        if let Ok(api_key) = std::env::var("PLANIO_STORE_API_KEY") {
            config = config.with_api_key(api_key);
        }

        Ok(config)
    }
}
