//! Root certificate download pages served on the certificate host.

use super::body::{full, ProxyBody};
use bytes::Bytes;
use hyper::header::{HeaderValue, ALLOW, CONTENT_DISPOSITION, CONTENT_TYPE};
use hyper::{Method, Response, StatusCode};

pub const CA_CONTENT_TYPE: &str = "application/x-x509-ca-cert";
pub const CA_CONTENT_DISPOSITION: &str = "inline; filename=rootCA.pem";

const LANDING_PAGE: &str = "<!DOCTYPE html>\n<html>\n<head><title>Tracking Cookie Proxy</title></head>\n<body>\n<a href=\"ca\">Download Certificate</a>\n</body>\n</html>\n";

/// Routes for the virtual certificate host (`p.test` by default).
#[derive(Debug, Clone)]
pub struct CertificateRoutes {
    host: String,
    pem: Bytes,
}

impl CertificateRoutes {
    pub fn new(host: &str, pem: impl Into<Bytes>) -> Self {
        Self {
            host: host.to_ascii_lowercase(),
            pem: pem.into(),
        }
    }

    /// Whether `host` (with or without a port) names the certificate host.
    pub fn matches_host(&self, host: &str) -> bool {
        let bare = match host.rsplit_once(':') {
            Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
            _ => host,
        };
        bare.eq_ignore_ascii_case(&self.host)
    }

    pub fn respond(&self, method: &Method, path: &str) -> Response<ProxyBody> {
        if method != Method::GET && method != Method::HEAD {
            return Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header(ALLOW, "GET, HEAD")
                .body(full("method not allowed"))
                .unwrap();
        }

        match path {
            "/" | "" => Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "text/html; charset=utf-8")
                .body(full(LANDING_PAGE))
                .unwrap(),
            "/ca" => {
                let mut response = Response::new(full(self.pem.clone()));
                let headers = response.headers_mut();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(CA_CONTENT_TYPE));
                headers.insert(
                    CONTENT_DISPOSITION,
                    HeaderValue::from_static(CA_CONTENT_DISPOSITION),
                );
                response
            }
            _ => Response::builder()
                .status(StatusCode::NOT_FOUND)
                .header(CONTENT_TYPE, "text/plain")
                .body(full("not found"))
                .unwrap(),
        }
    }
}
