//! Client for the result-reporting service.
//!
//! Test pages post their findings under the `sessionId` of the page URL; the
//! service may answer with where the harness should go next.

use crate::config::ReportingConfig;
use crate::tracking::markers::{parse_query_string, SESSION_ID_PARAM};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ReportingError {
    #[error("results request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("results endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid results reply: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultSubmission {
    pub session_id: String,
    pub url: String,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Optional follow-up navigation returned by the results service.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NavigationDirective {
    #[serde(default)]
    pub new_tab_url: Option<String>,
    #[serde(default)]
    pub navigate_url: Option<String>,
}

/// `sessionId` query parameter of a page URL, if present and non-empty.
pub fn session_id_from_url(url: &str) -> Option<String> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let (_, query) = without_fragment.split_once('?')?;
    parse_query_string(Some(query))
        .remove(SESSION_ID_PARAM)
        .filter(|id| !id.is_empty())
}

pub struct ResultsClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ResultsClient {
    pub fn new(config: &ReportingConfig) -> Result<Self, ReportingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn post(
        &self,
        submission: &ResultSubmission,
    ) -> Result<NavigationDirective, ReportingError> {
        debug!(session_id = %submission.session_id, endpoint = %self.endpoint, "posting results");
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(submission)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(ReportingError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(NavigationDirective::default());
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Post `data` for the page at `page_url`.
    ///
    /// Returns `Ok(None)` without contacting the service when the page URL
    /// carries no session id.
    pub async fn post_for_page(
        &self,
        page_url: &str,
        data: serde_json::Value,
        category: Option<&str>,
    ) -> Result<Option<NavigationDirective>, ReportingError> {
        let Some(session_id) = session_id_from_url(page_url) else {
            debug!(page_url, "no sessionId in page URL; not posting results");
            return Ok(None);
        };
        let submission = ResultSubmission {
            session_id,
            url: page_url.to_string(),
            data,
            category: category.map(str::to_string),
        };
        self.post(&submission).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_from_url() {
        assert_eq!(
            session_id_from_url("https://a.test/page?sessionId=S1&x=2"),
            Some("S1".to_string())
        );
        assert_eq!(
            session_id_from_url("https://a.test/page?x=2&sessionId=a%20b#frag"),
            Some("a b".to_string())
        );
        assert_eq!(session_id_from_url("https://a.test/page"), None);
        assert_eq!(session_id_from_url("https://a.test/page?sessionId="), None);
        assert_eq!(session_id_from_url("https://a.test/#?sessionId=S1"), None);
    }

    #[test]
    fn test_submission_shape() {
        let submission = ResultSubmission {
            session_id: "S1".to_string(),
            url: "https://a.test/?sessionId=S1".to_string(),
            data: serde_json::json!({"passed": true}),
            category: Some("tracking".to_string()),
        };
        let value = serde_json::to_value(&submission).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "sessionId": "S1",
                "url": "https://a.test/?sessionId=S1",
                "data": {"passed": true},
                "category": "tracking",
            })
        );
    }

    #[test]
    fn test_directive_decoding() {
        let directive: NavigationDirective =
            serde_json::from_str(r#"{"navigateUrl":"https://next.test/"}"#).unwrap();
        assert_eq!(directive.navigate_url.as_deref(), Some("https://next.test/"));
        assert_eq!(directive.new_tab_url, None);

        let empty: NavigationDirective = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, NavigationDirective::default());
    }

    #[tokio::test]
    async fn test_post_for_page_without_session_skips_request() {
        let config = ReportingConfig {
            // Nothing listens here; a request would fail.
            endpoint: "http://127.0.0.1:9/post".to_string(),
            timeout_secs: 1,
        };
        let client = ResultsClient::new(&config).unwrap();
        let result = client
            .post_for_page("https://a.test/page", serde_json::json!({}), None)
            .await
            .unwrap();
        assert_eq!(result, None);
    }
}
