//! Diagnostic records for tagged traffic.
//!
//! Emitted only in diagnostic (debug) mode, one JSON object per tagged
//! request or injected cookie, on the [`DIAGNOSTICS_TARGET`] tracing target.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

pub const DIAGNOSTICS_TARGET: &str = "tracking_cookie_proxy::diagnostics";

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Diagnostic<'a> {
    #[serde(rename_all = "camelCase")]
    Read {
        time: String,
        url: &'a str,
        read_cookie: bool,
        session_id: Option<&'a str>,
        pto_cookie: Option<&'a str>,
        leak: bool,
    },
    #[serde(rename_all = "camelCase")]
    Write {
        time: String,
        url: &'a str,
        session_id: &'a str,
        write_cookie: bool,
        set_cookie_header: &'a str,
    },
}

/// Current time in the HTTP-date style used by the diagnostics log.
pub fn timestamp() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn emit(record: &Diagnostic<'_>) {
    match serde_json::to_string(record) {
        Ok(json) => info!(target: DIAGNOSTICS_TARGET, "{json}"),
        Err(e) => warn!("failed to serialize diagnostic record: {e}"),
    }
}
