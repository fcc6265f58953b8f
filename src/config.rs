//! Azure Computer Vision credentials, loaded from the environment.

use std::{env, fmt};

use reqwest::Url;

use crate::prelude::*;

/// Environment variable holding the subscription key.
pub const AZURE_KEY_VAR: &str = "AZURE_KEY";

/// Environment variable holding the resource endpoint URL.
pub const AZURE_ENDPOINT_VAR: &str = "AZURE_ENDPOINT";

/// Connection settings for an Azure Computer Vision resource.
#[derive(Clone)]
pub struct AzureConfig {
    /// The `Ocp-Apim-Subscription-Key` value.
    key: String,

    /// The resource endpoint, e.g. `https://example.cognitiveservices.azure.com/`.
    endpoint: Url,
}

impl AzureConfig {
    /// Build and validate a configuration.
    pub fn new(key: impl Into<String>, endpoint: &str) -> Result<Self> {
        let key = key.into().trim().to_owned();
        if key.is_empty() {
            return Err(anyhow!("Azure subscription key must not be empty"));
        }
        let endpoint = Url::parse(endpoint.trim())
            .with_context(|| format!("Invalid Azure endpoint URL: {endpoint:?}"))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(anyhow!(
                "Azure endpoint must be an http or https URL, found: {endpoint}"
            ));
        }
        Ok(Self { key, endpoint })
    }

    /// Load our configuration from `AZURE_KEY` and `AZURE_ENDPOINT`.
    pub fn from_env() -> Result<Self> {
        let key = required_var(AZURE_KEY_VAR)?;
        let endpoint = required_var(AZURE_ENDPOINT_VAR)?;
        Self::new(key, &endpoint)
    }

    /// The subscription key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The resource endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

// Never print the key.
impl fmt::Debug for AzureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureConfig")
            .field("key", &"<redacted>")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

/// Look up a required environment variable.
fn required_var(name: &str) -> Result<String> {
    env::var(name).with_context(|| {
        format!("Missing environment variable {name} (it may also be set in a `.env` file)")
    })
}
