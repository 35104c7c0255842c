//! Minimal JSON HTTP client with safe logging and flexible auth.
//!
//! - Request options: `Auth`, query params, timeout
//! - Redacts sensitive query params and never logs secret values
//! - Single-shot: a failed request is reported to the caller, never retried
//! - Optional *raw* request/response logging via `VERITY_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), verity_http::HttpError> {
//! let client = verity_http::HttpClient::new("https://api.example.com")?;
//! let got: serde_json::Value = client
//!     .get_json("v1/items", verity_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```
//!
//! Security: `Auth::Bearer` values are sanitized before use, and logs only
//! ever include the auth kind (bearer/query/none), not the secret.
//!
//! Observability: structured `tracing` events are emitted for request start,
//! response headers, body snippets (truncated), final errors, and (optionally)
//! raw request/response lines (target `http.raw`) when `VERITY_HTTP_RAW=1`.

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use std::time::Duration;
use thiserror::Error;

// ==============================
// Raw logging toggles
// ==============================

const RAW_ENV: &str = "VERITY_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024; // cap raw body logs (64 KiB)

const SECRET_PARAMS: &[&str] = &[
    "access_token",
    "authorization",
    "auth",
    "key",
    "api_key",
    "token",
    "secret",
    "client_secret",
    "bearer",
];

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn is_secret_param(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SECRET_PARAMS.contains(&lower.as_str())
}

/// Render a best-effort curl command for repro/debug, with secrets redacted.
fn make_curl(method: &Method, url: &Url, body: Option<&[u8]>, auth_kind: &str) -> String {
    let mut parts = vec!["curl".to_string(), format!("-X{}", method)];
    if auth_kind == "bearer" {
        parts.push("-H 'Authorization: Bearer <redacted>'".to_string());
    }
    if let Some(bytes) = body {
        parts.push("-H 'content-type: application/json'".to_string());
        if let Ok(s) = std::str::from_utf8(bytes) {
            let mut s = s.to_string();
            if s.len() > RAW_MAX_BODY {
                truncate_on_char_boundary(&mut s, RAW_MAX_BODY);
                s.push('…');
            }
            parts.push(format!("-d '{}'", s.replace('\'', r"'\''")));
        } else {
            parts.push(format!("--data-binary @- # ({} bytes)", bytes.len()));
        }
    }
    parts.push(format!("'{}'", redact_url(url)));
    parts.join(" ")
}

/// Redact sensitive headers for logging
fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let mut val = v.to_str().unwrap_or("").to_string();
            if key.eq_ignore_ascii_case("authorization") {
                val = "Bearer <redacted>".into();
            }
            (key, val)
        })
        .collect()
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

// ==============================
// Auth & Request Options
// ==============================

/// Authentication strategies supported by the HTTP client helpers.
///
/// ```
/// use verity_http::Auth;
///
/// let bearer = Auth::Bearer("token");
/// match bearer {
///     Auth::Bearer(value) => assert_eq!(value, "token"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Clone, Debug)]
pub enum Auth<'a> {
    /// Authorization: Bearer <token>
    Bearer(&'a str),
    /// Auth via query param (e.g. Gemini: `?key=`)
    Query {
        name: &'a str,
        value: Cow<'a, str>,
    },
}

/// Per-request tuning knobs for the HTTP client.
///
/// ```
/// use verity_http::{Auth, RequestOpts};
/// use std::borrow::Cow;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     auth: Some(Auth::Query {
///         name: "key",
///         value: Cow::Borrowed("demo"),
///     }),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(opts.query.is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub auth: Option<Auth<'a>>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>, // e.g. [("text", "body".into())]
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    pub default_timeout: Duration,
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use verity_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://api.example.com")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(30));
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: Duration::from_secs(30),
        })
    }

    /// Override the default timeout returned by [`HttpClient::new`].
    ///
    /// ```no_run
    /// use verity_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://api.example.com")?
    ///     .with_timeout(Duration::from_secs(2));
    /// assert_eq!(client.default_timeout, Duration::from_secs(2));
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// GET JSON with per-request options (query/auth/timeout).
    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        self.request_json_internal::<(), T>(Method::GET, path, None, opts)
            .await
    }

    /// POST JSON with per-request options (query/auth/timeout).
    pub async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json_internal(Method::POST, path, Some(body), opts)
            .await
    }

    // ==============================
    // Core request implementation
    // ==============================

    async fn request_json_internal<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))?;

        // Query params land on the URL itself so the logged form and the sent
        // form are the same (minus redaction).
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(q) = &opts.query {
                for (k, v) in q {
                    pairs.append_pair(k, v);
                }
            }
            if let Some(Auth::Query { name, value }) = &opts.auth {
                pairs.append_pair(name, value);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        // ----- Build request -----
        let mut rb = self.inner.request(method.clone(), url.clone());

        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        rb = rb.timeout(timeout);

        let mut request_body_bytes: Option<Vec<u8>> = None;
        if let Some(b) = body {
            let bytes = serde_json::to_vec(b).map_err(|e| HttpError::Build(e.to_string()))?;
            request_body_bytes = Some(bytes.clone());
            rb = rb
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(bytes);
        }

        if let Some(Auth::Bearer(tok)) = &opts.auth {
            let tok = sanitize_api_key(tok)?;
            rb = rb.bearer_auth(tok);
        }

        // ----- Safe request logging (pre-send) -----
        let auth_kind = match &opts.auth {
            Some(Auth::Bearer(_)) => "bearer",
            Some(Auth::Query { .. }) => "query",
            None => "none",
        };
        let (host_path, redacted_q) = redact_query(&url);
        let req_id = uuid::Uuid::new_v4().simple().to_string();

        tracing::debug!(
            req_id=%req_id,
            method=%method,
            host_path=%host_path,
            query=?redacted_q,
            timeout_ms=timeout.as_millis() as u64,
            auth_kind,
            has_body=%body.is_some(),
            "http.request.start"
        );

        if raw_enabled() {
            let curl = make_curl(&method, &url, request_body_bytes.as_deref(), auth_kind);
            tracing::debug!(target: "http.raw", %req_id, %curl, "request");
        }

        // ----- Send -----
        let t0 = std::time::Instant::now();
        let resp = rb.send().await.map_err(|err| {
            let err = err.without_url();
            tracing::warn!(req_id=%req_id, host_path=%host_path, message=%err, "http.network_error.send");
            classify_transport_error(err, timeout)
        })?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await.map_err(|err| {
            let err = err.without_url();
            tracing::warn!(req_id=%req_id, host_path=%host_path, message=%err, "http.network_error.body");
            classify_transport_error(err, timeout)
        })?;
        let dur_ms = t0.elapsed().as_millis() as u64;

        let req_hdr_id = headers
            .get("x-request-id")
            .or_else(|| headers.get("x-correlation-id"))
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");

        tracing::debug!(
            req_id=%req_id,
            %status,
            duration_ms=dur_ms,
            body_len=bytes.len(),
            x_request_id=%req_hdr_id,
            "http.response.headers"
        );

        if raw_enabled() {
            let hdrs = redact_headers(&headers);
            let truncated = bytes.len() > RAW_MAX_BODY;
            let text = String::from_utf8_lossy(&bytes[..bytes.len().min(RAW_MAX_BODY)]);
            tracing::info!(
                target:"http.raw",
                %req_id,
                status=%status,
                duration_ms=dur_ms,
                headers=?hdrs,
                body=%text,
                truncated
            );
        }

        let snippet = snip_body(&bytes);
        tracing::trace!(
            req_id=%req_id,
            body_snippet=%snippet,
            "http.response.body_snippet"
        );

        // ----- Success path -----
        if status.is_success() {
            return serde_json::from_slice::<T>(&bytes).map_err(|e| {
                tracing::warn!(
                    req_id=%req_id,
                    serde_line=%e.line(),
                    serde_col=%e.column(),
                    serde_err=%e.to_string(),
                    body_snippet=%snippet,
                    "http.response.decode_error"
                );
                HttpError::Decode(e.to_string(), snippet)
            });
        }

        // ----- Non-success -----
        let message = extract_error_message(&bytes);
        let request_id = req_hdr_id.to_string();

        tracing::warn!(
            req_id=%req_id,
            %status,
            message=%message,
            x_request_id=%request_id,
            body_snippet=%snippet,
            "http.error"
        );
        Err(HttpError::Api {
            status,
            message,
            request_id,
        })
    }
}

// ==============================
// Helpers
// ==============================

/// The URL is stripped first: query-param auth would otherwise end up in the
/// error text.
fn classify_transport_error(err: reqwest::Error, timeout: Duration) -> HttpError {
    let err = err.without_url();
    if err.is_timeout() {
        HttpError::Timeout(timeout)
    } else {
        HttpError::Network(err.to_string())
    }
}

fn extract_error_message(body: &[u8]) -> String {
    // Google / OpenAI style: {"error":{"message":"..."}}
    #[derive(Deserialize)]
    struct NestedEnv {
        error: NestedDetail,
    }
    #[derive(Deserialize)]
    struct NestedDetail {
        message: String,
    }

    // Generic: {"message":"..."} or {"detail":"..."} or {"error":"..."}
    #[derive(Deserialize)]
    struct Msg {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        error: String,
    }

    if let Ok(env) = serde_json::from_slice::<NestedEnv>(body) {
        return env.error.message;
    }
    if let Ok(m) = serde_json::from_slice::<Msg>(body) {
        if !m.message.is_empty() {
            return m.message;
        }
        if !m.detail.is_empty() {
            return m.detail;
        }
        if !m.error.is_empty() {
            return m.error;
        }
    }
    snip_body(body)
}

fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > 500 {
        truncate_on_char_boundary(&mut snip, 500);
        snip.push_str("...");
    }
    snip
}

fn sanitize_api_key(raw: &str) -> Result<String, HttpError> {
    // 1) Trim outer spaces/quotes
    let mut s = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();

    // 2) Remove *all* ASCII whitespace (spaces, tabs, newlines, carriage returns)
    s.retain(|ch| !ch.is_ascii_whitespace());

    // 3) Ensure ASCII and no control chars
    if !s.is_ascii() {
        return Err(HttpError::Build("API key contains non-ASCII bytes".into()));
    }
    if s.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "API key contains control characters".into(),
        ));
    }

    // 4) Validate header value upfront for clear errors
    HeaderValue::from_str(&format!("Bearer {}", s))
        .map_err(|e| HttpError::Build(format!("invalid Authorization header: {e}")))?;
    Ok(s)
}

fn redact_query(url: &Url) -> (String, Vec<(String, String)>) {
    // "host + path" string and redacted query list for logging
    let host_path = format!("{}{}", url.host_str().unwrap_or("-"), url.path());
    let redacted = url
        .query_pairs()
        .map(|(k, v)| {
            let k = k.to_string();
            let v = if is_secret_param(&k) {
                "<redacted>".to_string()
            } else {
                v.to_string()
            };
            (k, v)
        })
        .collect::<Vec<_>>();
    (host_path, redacted)
}

fn redact_url(url: &Url) -> String {
    let mut out = url.clone();
    if url.query().is_some() {
        let (_, pairs) = redact_query(url);
        out.query_pairs_mut().clear().extend_pairs(pairs);
    }
    out.to_string()
}
