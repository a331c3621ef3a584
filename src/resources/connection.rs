use std::{
    fmt,
    io::{self, Cursor, Read},
    time::Duration,
};

use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};

use crate::config::{ConfigError, ConnectionConfig};

const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// The request-issuing collaborator shared by every resource handle.
///
/// Each call issues exactly one request and blocks until the status line and
/// headers are available. The returned [`Response`] body must be consumed
/// before the connection is reused.
pub trait Connection {
    /// Whether the account has access to the CDN management endpoint.
    fn cdn_enabled(&self) -> bool;

    /// Issue a request against the storage endpoint.
    fn make_request(
        &self,
        method: Method,
        path: &[&str],
        params: &[(&str, &str)],
        headers: HeaderMap,
    ) -> Result<Response, ConnectionError>;

    /// Issue a request against the CDN management endpoint.
    fn cdn_request(
        &self,
        method: Method,
        path: &[&str],
        headers: HeaderMap,
    ) -> Result<Response, ConnectionError>;
}

pub struct Response {
    pub status: u16,
    pub reason: String,
    headers: Vec<(String, String)>,
    body: Box<dyn Read + Send>,
}

impl Response {
    pub fn new(
        status: u16,
        reason: impl Into<String>,
        headers: Vec<(String, String)>,
        body: impl Read + Send + 'static,
    ) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers,
            body: Box::new(body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Response headers in the order the server sent them.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header whose name matches `name`, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Read the remainder of the body.
    pub fn read(&mut self) -> Result<Vec<u8>, ConnectionError> {
        let mut buf = Vec::new();
        self.body.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Consume and discard the remainder of the body.
    pub fn drain(&mut self) -> Result<(), ConnectionError> {
        io::copy(&mut self.body, &mut io::sink())?;
        Ok(())
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// A request that completed with a non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status} {reason}")]
pub struct ResponseError {
    pub status: u16,
    pub reason: String,
}

impl ResponseError {
    /// Turn a failed response into an error, draining its body first so the
    /// connection stays usable. Successful responses are left untouched.
    pub fn check(response: &mut Response) -> Result<(), ResponseError> {
        if response.is_success() {
            return Ok(());
        }
        if let Err(err) = response.drain() {
            tracing::debug!("Failed to drain body of {} response: {}", response.status, err);
        }
        Err(ResponseError {
            status: response.status,
            reason: response.reason.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConnectionError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no CDN management endpoint is configured")]
    CdnNotConfigured,
}

/// Blocking [`Connection`] over HTTP.
pub struct HttpConnection {
    config: ConnectionConfig,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl HttpConnection {
    pub fn new(config: ConnectionConfig) -> Result<Self, ConnectionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            config,
            client,
            runtime,
        })
    }

    /// Create a connection with the configuration loaded from the
    /// environment.
    pub fn from_env() -> Result<Self, ConnectionError> {
        Self::new(ConnectionConfig::from_env()?)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn execute(
        &self,
        method: Method,
        url: String,
        params: &[(&str, &str)],
        mut headers: HeaderMap,
    ) -> Result<Response, ConnectionError> {
        headers.insert(AUTH_TOKEN_HEADER, HeaderValue::from_str(&self.config.auth_token)?);
        tracing::debug!("{} {}", method, url);
        self.runtime.block_on(async {
            let mut request = self.client.request(method, url).headers(headers);
            if !params.is_empty() {
                request = request.query(params);
            }
            let response = request.send().await?;
            let status = response.status();
            let reason = reason_phrase(&response);
            let headers = response
                .headers()
                .iter()
                .map(|(k, v)| {
                    (
                        k.to_string(),
                        String::from_utf8_lossy(v.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = response.bytes().await?;
            Ok::<_, ConnectionError>(Response::new(
                status.as_u16(),
                reason,
                headers,
                Cursor::new(body),
            ))
        })
    }
}

/// The reason phrase the server sent, or the standard one for the status when
/// the protocol carries none (HTTP/2) or it matched the standard phrase.
fn reason_phrase(response: &reqwest::Response) -> String {
    match response.extensions().get::<hyper::ext::ReasonPhrase>() {
        Some(phrase) => String::from_utf8_lossy(phrase.as_bytes()).into_owned(),
        None => response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Append percent-encoded path segments to `base`.
fn build_url(base: &str, path: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    if path.is_empty() {
        url.push('/');
    }
    for segment in path {
        url.push('/');
        url.push_str(&urlencoding::encode(segment));
    }
    url
}

impl Connection for HttpConnection {
    fn cdn_enabled(&self) -> bool {
        self.config.cdn_url.is_some()
    }

    fn make_request(
        &self,
        method: Method,
        path: &[&str],
        params: &[(&str, &str)],
        headers: HeaderMap,
    ) -> Result<Response, ConnectionError> {
        let url = build_url(&self.config.storage_url, path);
        self.execute(method, url, params, headers)
    }

    fn cdn_request(
        &self,
        method: Method,
        path: &[&str],
        headers: HeaderMap,
    ) -> Result<Response, ConnectionError> {
        let cdn_url = self
            .config
            .cdn_url
            .as_deref()
            .ok_or(ConnectionError::CdnNotConfigured)?;
        let url = build_url(cdn_url, path);
        self.execute(method, url, &[], headers)
    }
}
