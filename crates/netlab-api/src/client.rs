// Backend HTTP client
//
// Wraps `reqwest::Client` with lab-scoped URL construction and uniform
// response handling. Endpoint groups (labs, nodes, jobs, catalog, system)
// are implemented as inherent methods in separate files to keep this
// module focused on transport mechanics.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Error body shapes returned by the backend. FastAPI-style servers use
/// `detail`, others `message`.
#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Async client for the lab orchestration backend.
///
/// Cheap to clone: the inner `reqwest::Client` is reference-counted.
#[derive(Clone)]
pub struct LabClient {
    http: reqwest::Client,
    base_url: Url,
}

impl LabClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client for `base_url` (e.g. `https://lab.example/api`).
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::from_reqwest(base_url, http)
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self { http, base_url })
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Append percent-encoded path segments to the base URL.
    ///
    /// Lab and node identifiers are user-influenced, so they are pushed as
    /// segments instead of being formatted into a path string.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {url}");
        let resp = self.http.get(url).send().await?;
        Self::parse_json(resp).await
    }

    /// POST without a request body, discarding the response payload.
    pub(crate) async fn post_empty(&self, url: Url) -> Result<(), Error> {
        debug!("POST {url}");
        let resp = self.http.post(url).send().await?;
        Self::check_status(resp).await.map(drop)
    }

    /// POST a JSON body, discarding the response payload.
    pub(crate) async fn post_no_content<B: Serialize + Sync>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<(), Error> {
        debug!("POST {url}");
        let resp = self.http.post(url).json(body).send().await?;
        Self::check_status(resp).await.map(drop)
    }

    /// PUT a JSON body, discarding the response payload.
    pub(crate) async fn put_no_content<B: Serialize + Sync>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<(), Error> {
        debug!("PUT {url}");
        let resp = self.http.put(url).json(body).send().await?;
        Self::check_status(resp).await.map(drop)
    }

    // ── Response handling ────────────────────────────────────────────

    /// Map non-success statuses to `Error`, passing successful responses on.
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Unauthorized {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.unwrap_or_default();
        Err(Error::Api {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let resp = Self::check_status(resp).await?;
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            let preview = &body[..floor_char_boundary(&body, 200)];
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })
    }
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        match (parsed.detail, parsed.message) {
            (Some(serde_json::Value::String(detail)), _) => return detail,
            (Some(detail), _) => return detail.to_string(),
            (None, Some(message)) => return message,
            (None, None) => {}
        }
    }
    body[..floor_char_boundary(body, 200)].to_owned()
}

/// Largest char boundary not past `max`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
