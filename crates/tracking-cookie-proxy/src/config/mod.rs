//! Configuration types for the tracking cookie proxy.

mod ca;
mod listen;
mod pending;
mod reporting;
mod upstream;

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use ca::CertificateAuthorityConfig;
pub use listen::{AdminConfig, ListenConfig};
pub use pending::PendingConfig;
pub use reporting::ReportingConfig;
pub use upstream::UpstreamConfig;

/// Top-level configuration. Every section is optional in the YAML file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,

    #[serde(default)]
    pub certificate_authority: CertificateAuthorityConfig,

    /// Virtual host that serves the root CA download page
    #[serde(default = "default_cert_host")]
    pub cert_host: String,

    #[serde(default)]
    pub pending: PendingConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub reporting: ReportingConfig,

    /// Emit a diagnostic record for every tagged request and injected cookie
    #[serde(default)]
    pub debug: bool,
}

fn default_cert_host() -> String {
    "p.test".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            certificate_authority: CertificateAuthorityConfig::default(),
            cert_host: default_cert_host(),
            pending: PendingConfig::default(),
            upstream: UpstreamConfig::default(),
            admin: AdminConfig::default(),
            reporting: ReportingConfig::default(),
            debug: false,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let cert_host = self.cert_host.trim();
        if cert_host.is_empty() {
            anyhow::bail!("cert_host must not be empty");
        }
        if cert_host.contains(['/', ':', ' ']) {
            anyhow::bail!("cert_host must be a bare hostname, got '{}'", self.cert_host);
        }

        self.certificate_authority.validate()?;
        self.pending.validate()?;
        self.reporting.validate()?;

        if self.admin.enabled
            && self.admin.port != 0
            && self.admin.port == self.listen.port
            && self.admin.host == self.listen.host
        {
            anyhow::bail!(
                "admin.port ({}) must differ from listen.port when both bind {}",
                self.admin.port,
                self.admin.host
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.listen.port, 9090);
        assert_eq!(config.listen.shutdown_grace_secs, 10);
        assert_eq!(config.cert_host, "p.test");
        assert_eq!(config.pending.ttl_secs, 300);
        assert_eq!(config.pending.sweep_interval_secs, 30);
        assert_eq!(config.pending.max_entries, 65_536);
        assert_eq!(config.admin.port, 9091);
        assert!(config.admin.enabled);
        assert!(!config.upstream.tls_skip_verify);
        assert_eq!(config.reporting.endpoint, "https://results.privacytests.org/post");
        assert_eq!(config.certificate_authority.mkcert_binary, "mkcert");
        assert!(!config.debug);
        config.validate().unwrap();
    }

    #[test]
    fn test_default_matches_empty_file() {
        let config = Config::default();
        assert_eq!(config.cert_host, "p.test");
        assert_eq!(config.listen.port, 9090);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
listen:
  host: 0.0.0.0
  port: 8080
certificate_authority:
  ca_root: /tmp/ca
cert_host: cert.test
pending:
  ttl_secs: 60
  sweep_interval_secs: 5
  max_entries: 1000
upstream:
  tls_skip_verify: true
  connect_timeout_secs: 3
admin:
  enabled: false
  port: 9999
reporting:
  endpoint: "http://127.0.0.1:4000/post"
debug: true
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listen.port, 8080);
        assert_eq!(config.listen.host.to_string(), "0.0.0.0");
        assert_eq!(
            config.certificate_authority.ca_root,
            Some(PathBuf::from("/tmp/ca"))
        );
        assert_eq!(config.cert_host, "cert.test");
        assert_eq!(config.pending.max_entries, 1000);
        assert!(config.upstream.tls_skip_verify);
        assert_eq!(config.upstream.connect_timeout_secs, 3);
        assert_eq!(config.upstream.idle_timeout_secs, 90);
        assert!(!config.admin.enabled);
        assert!(config.debug);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let config: Config = serde_yaml::from_str("pending:\n  ttl_secs: 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ttl_secs"));
    }

    #[test]
    fn test_validate_rejects_half_ca_paths() {
        let config: Config =
            serde_yaml::from_str("certificate_authority:\n  cert_path: /tmp/rootCA.pem\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must be set together"));
    }

    #[test]
    fn test_validate_rejects_port_clash() {
        let config: Config =
            serde_yaml::from_str("listen:\n  port: 7000\nadmin:\n  port: 7000\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_cert_host() {
        let config: Config = serde_yaml::from_str("cert_host: \"p.test:80\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_endpoint() {
        let config: Config =
            serde_yaml::from_str("reporting:\n  endpoint: \"ftp://example.test/post\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen:\n  port: 7070\ndebug: true").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.listen.port, 7070);
        assert!(config.debug);
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file("/nonexistent/proxy.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
