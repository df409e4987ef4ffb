//! Result-reporting endpoint configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportingConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ReportingConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let uri: hyper::Uri = self
            .endpoint
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid reporting.endpoint '{}': {e}", self.endpoint))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => Ok(()),
            _ => anyhow::bail!(
                "reporting.endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            ),
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "https://results.privacytests.org/post".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}
