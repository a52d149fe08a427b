//! Minimal HTTP seam between the auth flows and the relay.
//!
//! The flows only need JSON requests with an optional bearer token, so the
//! trait is deliberately narrow; tests drive the flows with a scripted
//! implementation and production uses [`HyperHttpClient`].

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request relative to the relay base URL.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path and query, e.g. `/v1/auth/request/status?publicKey=...`
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            bearer: None,
            body: None,
        }
    }

    pub fn post_json<T: serde::Serialize>(path: impl Into<String>, body: &T) -> Result<Self, AuthError> {
        Ok(Self {
            method: Method::Post,
            path: path.into(),
            bearer: None,
            body: Some(serde_json::to_vec(body)?),
        })
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }
}

impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("bearer", &self.bearer.as_ref().map(|_| "[REDACTED]"))
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse a 2xx body as JSON; any other status becomes [`AuthError::Http`].
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, AuthError> {
        if !self.is_success() {
            return Err(AuthError::Http {
                status: self.status,
                body: String::from_utf8_lossy(&self.body).into_owned(),
            });
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send one request. Transport failures are [`AuthError::Network`]; any
    /// HTTP status, including errors, is returned as a response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError>;
}

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

/// HTTPS client over hyper with rustls and the webpki root store.
#[derive(Clone)]
pub struct HyperHttpClient {
    base_url: String,
    client: Client<HttpsConnector, Full<Bytes>>,
}

impl HyperHttpClient {
    pub fn new(base_url: &str) -> Self {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder(TokioExecutor::new()).build(connector),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for HyperHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperHttpClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HttpClient for HyperHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        let url = format!("{}{}", self.base_url, request.path);
        let method = match request.method {
            Method::Get => hyper::Method::GET,
            Method::Post => hyper::Method::POST,
        };

        let mut builder = hyper::Request::builder()
            .method(method)
            .uri(&url)
            .header(ACCEPT, "application/json");
        if request.body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        if let Some(token) = &request.bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = builder
            .body(Full::new(Bytes::from(request.body.unwrap_or_default())))
            .map_err(|e| AuthError::Network(format!("building request for {}: {e}", request.path)))?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| AuthError::Network(format!("{} {}: {e}", req_label(request.method), request.path)))?;
        let status = response.status().as_u16();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| AuthError::Network(format!("reading response body: {e}")))?
            .to_bytes();

        tracing::debug!(path = %request.path, status, "relay response");
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn req_label(method: Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::Post => "POST",
    }
}
