//! Root certificate authority location.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where to find the root CA used to mint interception certificates.
///
/// Resolution order: explicit `cert_path`/`key_path`, then `ca_root`
/// (a directory holding `rootCA.pem` and `rootCA-key.pem`), then the
/// directory reported by `<mkcert_binary> -CAROOT`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CertificateAuthorityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
    #[serde(default = "default_mkcert_binary")]
    pub mkcert_binary: String,
    /// Maximum number of minted leaf configurations kept in memory
    #[serde(default = "default_leaf_cache_size")]
    pub leaf_cache_size: usize,
}

impl CertificateAuthorityConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match (&self.cert_path, &self.key_path) {
            (Some(_), None) | (None, Some(_)) => anyhow::bail!(
                "certificate_authority.cert_path and certificate_authority.key_path must be set together"
            ),
            _ => {}
        }
        if self.mkcert_binary.trim().is_empty() {
            anyhow::bail!("certificate_authority.mkcert_binary must not be empty");
        }
        if self.leaf_cache_size == 0 {
            anyhow::bail!("certificate_authority.leaf_cache_size must be at least 1");
        }
        Ok(())
    }
}

impl Default for CertificateAuthorityConfig {
    fn default() -> Self {
        Self {
            ca_root: None,
            cert_path: None,
            key_path: None,
            mkcert_binary: default_mkcert_binary(),
            leaf_cache_size: default_leaf_cache_size(),
        }
    }
}

fn default_mkcert_binary() -> String {
    "mkcert".to_string()
}

fn default_leaf_cache_size() -> usize {
    1024
}
