//! Minimal HTTP/1 client for the Docker Engine and Kubernetes APIs.
//!
//! One connection per request over a unix socket or TCP, driven by hyper's
//! low-level `client::conn` API.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::{InfraError, InfraResult};

/// Convert any `Display` error into an `InfraError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| InfraError::$variant(e.to_string())
    };
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "fleet/0.1";

/// Where an API listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp { authority: String },
}

impl Endpoint {
    /// Parse `unix:///path`, `http://host[:port]`, or `tcp://host[:port]`.
    /// Any path after the authority is ignored.
    pub fn parse(url: &str) -> InfraResult<Self> {
        let invalid = || InfraError::InvalidEndpoint(url.to_string());
        let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
        match scheme {
            "unix" => {
                if rest.is_empty() {
                    return Err(invalid());
                }
                Ok(Self::Unix(PathBuf::from(rest)))
            }
            "http" | "tcp" => {
                let authority = rest.split('/').next().unwrap_or("");
                if authority.is_empty() {
                    return Err(invalid());
                }
                let authority = if authority.contains(':') {
                    authority.to_string()
                } else if scheme == "http" {
                    format!("{authority}:80")
                } else {
                    format!("{authority}:2375")
                };
                Ok(Self::Tcp { authority })
            }
            _ => Err(invalid()),
        }
    }

    /// Host part of a TCP endpoint.
    pub fn host(&self) -> Option<&str> {
        match self {
            Self::Unix(_) => None,
            Self::Tcp { authority } => authority.rsplit_once(':').map(|(host, _)| host),
        }
    }

    fn host_header(&self) -> &str {
        match self {
            Self::Unix(_) => "localhost",
            Self::Tcp { authority } => authority,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp { authority } => write!(f, "http://{authority}"),
        }
    }
}

/// A response with its body fully read.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ApiResponse {
    fn body_text(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        let text = text.trim();
        match text.char_indices().nth(512) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    endpoint: Endpoint,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send one request and read the whole response body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> InfraResult<ApiResponse> {
        let timed_out = || InfraError::Timeout {
            method: method.to_string(),
            path: path.to_string(),
        };
        tokio::time::timeout(
            self.timeout,
            self.send(method.clone(), path, content_type, body),
        )
        .await
        .map_err(|_| timed_out())?
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> InfraResult<ApiResponse> {
        let mut sender = self.connect().await?;

        let mut builder = http::Request::builder()
            .method(method.clone())
            .uri(path)
            .header(http::header::HOST, self.endpoint.host_header())
            .header(http::header::USER_AGENT, USER_AGENT);
        if let Some(content_type) = content_type {
            builder = builder.header(http::header::CONTENT_TYPE, content_type);
        }
        let req = builder.body(Full::new(body)).map_err(map_err!(Transport))?;

        let resp = sender.send_request(req).await.map_err(map_err!(Transport))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(map_err!(Transport))?
            .to_bytes();
        debug!(%method, %path, status = status.as_u16(), bytes = body.len(), "api call");
        Ok(ApiResponse { status, body })
    }

    async fn connect(&self) -> InfraResult<SendRequest<Full<Bytes>>> {
        let connect_err = |source: std::io::Error| InfraError::Connect {
            endpoint: self.endpoint.to_string(),
            source,
        };
        match &self.endpoint {
            Endpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path)
                    .await
                    .map_err(connect_err)?;
                handshake(stream).await
            }
            Endpoint::Tcp { authority } => {
                let stream = tokio::net::TcpStream::connect(authority.as_str())
                    .await
                    .map_err(connect_err)?;
                handshake(stream).await
            }
        }
    }

    /// GET and decode JSON. A 404 resolves to `None`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> InfraResult<Option<T>> {
        let resp = self.request(Method::GET, path, None, Bytes::new()).await?;
        if resp.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success(Method::GET, path, resp)?;
        decode(path, &resp.body).map(Some)
    }

    /// Send a JSON body and decode the JSON response.
    pub async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        content_type: &str,
        body: &B,
    ) -> InfraResult<T> {
        let payload = serde_json::to_vec(body).map_err(map_err!(Encode))?;
        let resp = self
            .request(method.clone(), path, Some(content_type), Bytes::from(payload))
            .await?;
        let resp = ensure_success(method, path, resp)?;
        decode(path, &resp.body)
    }

    /// DELETE. Resolves to `false` on 404.
    pub async fn delete(&self, path: &str) -> InfraResult<bool> {
        let resp = self.request(Method::DELETE, path, None, Bytes::new()).await?;
        if resp.status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(Method::DELETE, path, resp)?;
        Ok(true)
    }
}

async fn handshake<S>(stream: S) -> InfraResult<SendRequest<Full<Bytes>>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(map_err!(Transport))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "api connection closed with error");
        }
    });

    Ok(sender)
}

pub(crate) fn ensure_success(
    method: Method,
    path: &str,
    resp: ApiResponse,
) -> InfraResult<ApiResponse> {
    if resp.status.is_success() {
        return Ok(resp);
    }
    Err(InfraError::Status {
        method: method.to_string(),
        path: path.to_string(),
        status: resp.status.as_u16(),
        body: resp.body_text(),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(path: &str, body: &[u8]) -> InfraResult<T> {
    serde_json::from_slice(body).map_err(|source| InfraError::Decode {
        path: path.to_string(),
        source,
    })
}
