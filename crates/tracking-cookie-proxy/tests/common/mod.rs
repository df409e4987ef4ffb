//! Shared fixtures: a throwaway root CA, local origins and a running proxy.

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE, SET_COOKIE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracking_cookie_proxy::config::Config;
use tracking_cookie_proxy::controller::ProxyController;
use tracking_cookie_proxy::transport::tls::ensure_crypto_provider;
use tracking_cookie_proxy::transport::CaPaths;

/// Body every origin answers with.
pub const ORIGIN_BODY: &str = "hello from origin";

/// Write a fresh root CA into `dir` using the on-disk file names the proxy
/// looks for. Returns the certificate PEM.
pub fn write_test_ca(dir: &Path) -> String {
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
        .push(DnType::CommonName, "tracking-cookie-proxy integration CA");
    let cert = params.self_signed(&key).unwrap();

    let paths = CaPaths::in_dir(dir);
    std::fs::write(&paths.cert, cert.pem()).unwrap();
    std::fs::write(&paths.key, key.serialize_pem()).unwrap();
    cert.pem()
}

async fn origin_service(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let mut response = Response::new(Full::new(Bytes::from(ORIGIN_BODY)));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(SET_COOKIE, HeaderValue::from_static("origin=1"));
    if let Some(cookie) = req.headers().get(hyper::header::COOKIE) {
        headers.insert("x-origin-saw-cookie", cookie.clone());
    }
    Ok(response)
}

/// Plain HTTP origin on an ephemeral loopback port.
pub async fn start_http_origin() -> SocketAddr {
    start_slow_http_origin(Duration::ZERO).await
}

/// Plain HTTP origin that waits `delay` before answering each request.
pub async fn start_slow_http_origin(delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let service = service_fn(move |req| async move {
                    tokio::time::sleep(delay).await;
                    origin_service(req).await
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });
    addr
}

/// HTTPS origin on an ephemeral loopback port with a self-signed certificate.
pub async fn start_https_origin() -> SocketAddr {
    ensure_crypto_provider();
    let key = KeyPair::generate().unwrap();
    let cert = CertificateParams::new(vec!["127.0.0.1".to_string()])
        .unwrap()
        .self_signed(&key)
        .unwrap();
    let chain = vec![CertificateDer::from(cert.der().to_vec())];
    let private_key = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(key.serialize_der()));
    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, private_key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(server_config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(tls) = acceptor.accept(stream).await else {
                    return;
                };
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(tls), service_fn(origin_service))
                    .await;
            });
        }
    });
    addr
}

/// Client routing all traffic through the proxy at `addr`.
pub fn proxy_client(addr: SocketAddr, ca_pem: &str) -> reqwest::Client {
    reqwest::Client::builder()
        .proxy(reqwest::Proxy::all(format!("http://{addr}")).unwrap())
        .add_root_certificate(reqwest::Certificate::from_pem(ca_pem.as_bytes()).unwrap())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// A started proxy plus the CA it intercepts with.
pub struct TestProxy {
    pub controller: Arc<ProxyController>,
    pub addr: SocketAddr,
    pub ca_pem: String,
    _ca_dir: TempDir,
}

impl TestProxy {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(customize: impl FnOnce(&mut Config)) -> Self {
        let ca_dir = TempDir::new().unwrap();
        let ca_pem = write_test_ca(ca_dir.path());

        let mut config = Config::default();
        config.certificate_authority.ca_root = Some(ca_dir.path().to_path_buf());
        // Test origins present self-signed certificates.
        config.upstream.tls_skip_verify = true;
        customize(&mut config);

        let controller = Arc::new(ProxyController::new(config));
        let addr = controller.start(0).unwrap();
        Self {
            controller,
            addr,
            ca_pem,
            _ca_dir: ca_dir,
        }
    }

    pub fn proxy_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client routing all traffic through the proxy and trusting its CA.
    pub fn client(&self) -> reqwest::Client {
        proxy_client(self.addr, &self.ca_pem)
    }

    pub async fn stop(&self) {
        self.controller.stop().await.unwrap();
    }
}
