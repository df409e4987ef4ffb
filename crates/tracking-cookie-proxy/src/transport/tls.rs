//! Root CA loading and per-host certificate minting.
//!
//! The proxy never generates its own root: it signs interception leaves
//! with an existing CA (normally the one `mkcert -install` placed in the
//! system trust store) so browsers accept the intercepted tunnels.

use crate::config::CertificateAuthorityConfig;
use chrono::{Datelike, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use rcgen::{
    date_time_ymd, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime,
};
use rustls::{DigitallySignedStruct, ServerConfig};
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Once};
use tracing::{debug, info};

pub const CA_CERT_FILE: &str = "rootCA.pem";
pub const CA_KEY_FILE: &str = "rootCA-key.pem";

#[derive(Debug, thiserror::Error)]
pub enum CaError {
    #[error("failed to run '{binary} -CAROOT': {source}")]
    MkcertUnavailable {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{binary} -CAROOT' failed: {message}")]
    MkcertFailed { binary: String, message: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {}", path.display())]
    NoCertificate { path: PathBuf },

    #[error("invalid CA material in {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },

    #[error("failed to issue certificate for '{host}': {source}")]
    Issue {
        host: String,
        #[source]
        source: rcgen::Error,
    },

    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),
}

static CRYPTO_PROVIDER: Once = Once::new();

/// Install the ring crypto provider as the process default.
///
/// Several crates in the tree enable rustls backends; without an explicit
/// default `ServerConfig::builder()` cannot pick one.
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        // Err means another provider was installed first, which is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolved locations of the root certificate and its private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl CaPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            cert: dir.join(CA_CERT_FILE),
            key: dir.join(CA_KEY_FILE),
        }
    }

    pub fn resolve(config: &CertificateAuthorityConfig) -> Result<Self, CaError> {
        if let (Some(cert), Some(key)) = (&config.cert_path, &config.key_path) {
            return Ok(Self {
                cert: cert.clone(),
                key: key.clone(),
            });
        }
        if let Some(dir) = &config.ca_root {
            return Ok(Self::in_dir(dir));
        }
        let dir = mkcert_ca_root(&config.mkcert_binary)?;
        Ok(Self::in_dir(&dir))
    }
}

fn mkcert_ca_root(binary: &str) -> Result<PathBuf, CaError> {
    let output = Command::new(binary)
        .arg("-CAROOT")
        .output()
        .map_err(|source| CaError::MkcertUnavailable {
            binary: binary.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(CaError::MkcertFailed {
            binary: binary.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    let dir = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if dir.is_empty() {
        return Err(CaError::MkcertFailed {
            binary: binary.to_string(),
            message: "empty CA root".to_string(),
        });
    }
    debug!(ca_root = %dir, "resolved CA root via mkcert");
    Ok(PathBuf::from(dir))
}

#[derive(Default)]
struct LeafCache {
    configs: HashMap<String, Arc<ServerConfig>>,
    lru: VecDeque<String>,
}

impl LeafCache {
    fn get(&mut self, host: &str) -> Option<Arc<ServerConfig>> {
        let config = self.configs.get(host).map(Arc::clone)?;
        self.touch(host);
        Some(config)
    }

    fn insert(&mut self, host: String, config: Arc<ServerConfig>, capacity: usize) {
        if !self.configs.contains_key(&host) && self.configs.len() >= capacity {
            if let Some(oldest) = self.lru.pop_front() {
                self.configs.remove(&oldest);
            }
        }
        self.configs.insert(host.clone(), config);
        self.touch(&host);
    }

    fn touch(&mut self, host: &str) {
        if let Some(position) = self.lru.iter().position(|entry| entry == host) {
            self.lru.remove(position);
        }
        self.lru.push_back(host.to_string());
    }
}

/// A loaded root CA able to mint TLS server configurations per host.
pub struct CertificateAuthority {
    issuer: Issuer<'static, KeyPair>,
    cert_pem: String,
    cert_der: CertificateDer<'static>,
    leaves: Mutex<LeafCache>,
    cache_capacity: usize,
}

impl CertificateAuthority {
    /// Locate and load the root CA described by `config`.
    pub fn load(config: &CertificateAuthorityConfig) -> Result<Self, CaError> {
        let paths = CaPaths::resolve(config)?;
        let ca = Self::from_files(&paths, config.leaf_cache_size)?;
        info!(cert = %paths.cert.display(), "loaded root certificate authority");
        Ok(ca)
    }

    pub fn from_files(paths: &CaPaths, cache_capacity: usize) -> Result<Self, CaError> {
        let cert_pem = read(&paths.cert)?;
        let key_pem = read(&paths.key)?;
        Self::parse(cert_pem, &key_pem, &paths.cert, &paths.key, cache_capacity)
    }

    pub fn from_pem(cert_pem: &str, key_pem: &str, cache_capacity: usize) -> Result<Self, CaError> {
        let inline = PathBuf::from("<inline>");
        Self::parse(cert_pem.to_string(), key_pem, &inline, &inline, cache_capacity)
    }

    fn parse(
        cert_pem: String,
        key_pem: &str,
        cert_path: &Path,
        key_path: &Path,
        cache_capacity: usize,
    ) -> Result<Self, CaError> {
        let cert_der = rustls_pemfile::certs(&mut cert_pem.as_bytes())
            .next()
            .ok_or_else(|| CaError::NoCertificate {
                path: cert_path.to_path_buf(),
            })?
            .map_err(|e| CaError::Invalid {
                path: cert_path.to_path_buf(),
                message: e.to_string(),
            })?;
        let key = KeyPair::from_pem(key_pem).map_err(|e| CaError::Invalid {
            path: key_path.to_path_buf(),
            message: e.to_string(),
        })?;
        let issuer = Issuer::from_ca_cert_der(&cert_der, key).map_err(|e| CaError::Invalid {
            path: cert_path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(Self {
            issuer,
            cert_pem,
            cert_der,
            leaves: Mutex::new(LeafCache::default()),
            cache_capacity: cache_capacity.max(1),
        })
    }

    /// The root certificate as PEM, as served by the download route.
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// TLS server configuration presenting a leaf for `host`, minted on
    /// first use and cached afterwards.
    pub fn server_config_for_host(&self, host: &str) -> Result<Arc<ServerConfig>, CaError> {
        let host = normalize_host(host);
        if let Some(config) = self.leaves.lock().get(&host) {
            return Ok(config);
        }

        let config = self.issue(&host)?;
        self.leaves
            .lock()
            .insert(host.clone(), Arc::clone(&config), self.cache_capacity);
        debug!(host = %host, "minted interception certificate");
        Ok(config)
    }

    fn issue(&self, host: &str) -> Result<Arc<ServerConfig>, CaError> {
        ensure_crypto_provider();
        let issue_err = |source| CaError::Issue {
            host: host.to_string(),
            source,
        };

        let params = leaf_params(host).map_err(issue_err)?;
        let leaf_key = KeyPair::generate().map_err(issue_err)?;
        let leaf_cert = params.signed_by(&leaf_key, &self.issuer).map_err(issue_err)?;

        let chain = vec![leaf_cert.der().clone(), self.cert_der.clone()];
        let private_key = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(leaf_key.serialize_der()));
        let mut server_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(chain, private_key)?;
        server_config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(Arc::new(server_config))
    }
}

fn read(path: &Path) -> Result<String, CaError> {
    std::fs::read_to_string(path).map_err(|source| CaError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn leaf_params(host: &str) -> Result<CertificateParams, rcgen::Error> {
    let mut params = CertificateParams::new(Vec::<String>::new())?;
    params.use_authority_key_identifier_extension = true;
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, host.to_string());
    params.distinguished_name = distinguished_name;

    // Browsers reject leaves valid for more than about a year.
    let yesterday = Utc::now() - ChronoDuration::days(1);
    let day = yesterday.day().min(28) as u8;
    params.not_before = date_time_ymd(yesterday.year(), yesterday.month() as u8, day);
    params.not_after = date_time_ymd(yesterday.year() + 1, yesterday.month() as u8, day);

    if let Ok(ip) = host.parse::<IpAddr>() {
        params.subject_alt_names.push(SanType::IpAddress(ip));
    } else {
        params
            .subject_alt_names
            .push(SanType::DnsName(host.try_into()?));
    }

    Ok(params)
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    match host.parse::<IpAddr>() {
        Ok(_) => host.to_string(),
        Err(_) => host.to_ascii_lowercase(),
    }
}

/// No-op certificate verifier for development/testing with self-signed certificates.
///
/// # Warning
/// This disables all upstream TLS security checks - use only in development!
#[derive(Debug)]
pub struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PSS_SHA256,
        ]
    }
}

#[cfg(test)]
pub(crate) mod test_ca {
    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose};

    /// A freshly generated root CA as `(cert_pem, key_pem)`.
    pub fn generate() -> (String, String) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
        ];
        params
            .distinguished_name
            .push(DnType::CommonName, "tracking-cookie-proxy test CA");
        let cert = params.self_signed(&key).unwrap();
        (cert.pem(), key.serialize_pem())
    }
}
