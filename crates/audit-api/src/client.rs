use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::ApiError;
use crate::models::{
    AuditListItem, CreateAuditRequest, CreateAuditResponse, Report, RunStatusResponse,
};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Typed client for the audit backend. One reqwest client, JSON in and
/// out, uniform error translation. All state lives server-side; every
/// method is a plain read or a single submission.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base: &str, timeout_ms: u64) -> Result<Self, ApiError> {
        let base = Url::parse(base.trim()).map_err(|_| ApiError::BaseUrl(base.to_string()))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(ApiError::BaseUrl(base.to_string()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .user_agent(concat!("audit-console/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;
        Ok(ApiClient { http, base })
    }

    /// Submit a URL for analysis. The backend answers immediately with the
    /// queued run; completion is observed by polling.
    pub async fn create_audit(&self, url: &str) -> Result<CreateAuditResponse, ApiError> {
        debug!(url, "creating audit");
        let body = CreateAuditRequest {
            url: url.to_string(),
        };
        let resp = self
            .http
            .post(self.endpoint(["api", "audits"]))
            .json(&body)
            .send()
            .await?;
        decode(expect_2xx(resp).await?).await
    }

    /// Fetch every known audit with its latest run. An empty backend may
    /// answer 204, which decodes to an empty list.
    pub async fn list_audits(&self) -> Result<Vec<AuditListItem>, ApiError> {
        let resp = self
            .http
            .get(self.endpoint(["api", "audits"]))
            .send()
            .await?;
        let resp = expect_2xx(resp).await?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        decode(resp).await
    }

    pub async fn run_status(&self, run_id: i64) -> Result<RunStatusResponse, ApiError> {
        let resp = self
            .http
            .get(self.endpoint(["api", "audits", "runs", &run_id.to_string()]))
            .send()
            .await?;
        decode(expect_2xx(resp).await?).await
    }

    /// Fetch a published report. 404 maps to [`ApiError::NotFound`];
    /// unknown and expired tokens are indistinguishable on the wire.
    pub async fn fetch_report(&self, token: &str) -> Result<Report, ApiError> {
        debug!(token = %console_core::abbrev_token(token), "fetching report");
        let resp = self
            .http
            .get(self.endpoint(["api", "reports", token]))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        decode(expect_2xx(resp).await?).await
    }

    /// Build an endpoint URL. Segments are percent-encoded individually,
    /// so tokens and ids are safe to splice in.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .expect("http(s) base url")
            .pop_if_empty()
            .extend(segments);
        url
    }
}

async fn expect_2xx(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or(""),
        body,
    })
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(ApiError::Decode)
}
