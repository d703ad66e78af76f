//! Authenticated HTTP transport.
//!
//! # Design
//! - Relative paths resolve against the configured base URL; absolute
//!   `http(s)` URLs (pagination cursors) are used verbatim.
//! - The bearer header is attached only while the session is authenticated.
//! - A 401 on a request that carried the current credentials invalidates the
//!   session. Nothing is retried.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{Instrument, debug, debug_span, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, ErrorBody};
use crate::form::FormPayload;
use crate::session::{InvalidationReason, Session};

/// Header carrying the invocation correlation id.
pub const HEADER_REQUEST_ID: &str = "x-request-id";

/// Body attached to an outgoing request.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// `application/json` body.
    Json(Value),
    /// `multipart/form-data` body.
    Multipart(FormPayload),
}

impl RequestBody {
    /// Serialize `value` into a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] when `value` cannot be represented as
    /// JSON.
    pub fn json(value: &impl Serialize) -> ClientResult<Self> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|source| ClientError::Decode {
                context: "request body".to_string(),
                source,
            })
    }
}

/// HTTP client bound to one API base URL and one session.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: Url,
    session: Session,
}

impl HttpClient {
    /// Build a client from `config`, sharing `session`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Precondition`] when the underlying HTTP client
    /// cannot be constructed.
    pub fn new(config: &ClientConfig, session: Session) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("sekolah-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                ClientError::precondition(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self::with_client(client, config.api_base_url.clone(), session))
    }

    /// Wrap an existing `reqwest` client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client, base_url: Url, session: Session) -> Self {
        Self {
            client,
            base_url,
            session,
        }
    }

    /// Client sharing the connection pool but sending no credentials.
    #[must_use]
    pub fn anonymous(&self) -> Self {
        Self::with_client(self.client.clone(), self.base_url.clone(), Session::in_memory())
    }

    /// Base URL relative paths resolve against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Session whose credentials are attached.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Resolve `path` to a full URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] when `path` cannot be joined.
    pub fn resolve(&self, path: &str) -> ClientResult<Url> {
        let trimmed = path.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Url::parse(trimmed).map_err(|source| ClientError::InvalidUrl {
                input: path.to_string(),
                source,
            });
        }
        self.base_url
            .join(trimmed.trim_start_matches('/'))
            .map_err(|source| ClientError::InvalidUrl {
                input: path.to_string(),
                source,
            })
    }

    /// Assemble a request without sending it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when the request cannot be built,
    /// or [`ClientError::Precondition`] for malformed multipart uploads.
    pub fn build_request(
        &self,
        method: Method,
        url: Url,
        body: RequestBody,
    ) -> ClientResult<reqwest::Request> {
        let target = url.to_string();
        let mut builder = self.client.request(method, url);
        if let Some(header) = self.session.auth_header() {
            builder = builder.header(AUTHORIZATION, header);
        }
        if let Some(request_id) = sekolah_telemetry::current_invocation_id() {
            builder = builder.header(HEADER_REQUEST_ID, request_id);
        }
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(payload) => builder.multipart(payload.into_multipart()?),
        };
        builder.build().map_err(|source| ClientError::Transport {
            url: target,
            source,
        })
    }

    /// Send a request and return its JSON body, `None` when the response is
    /// empty (204 and friends).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] for transport failures, non-2xx statuses and
    /// undecodable bodies.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> ClientResult<Option<Value>> {
        let url = self.resolve(path)?;
        let target = url.to_string();
        let response = self.execute(method, url, body).await?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ClientError::Transport {
                url: target.clone(),
                source,
            })?;
        if status == StatusCode::NO_CONTENT || bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| ClientError::Decode {
                context: format!("response from {target}"),
                source,
            })
    }

    /// `GET` `path` and decode the body as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the call fails or the body does not
    /// decode.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.send_json(Method::GET, path, RequestBody::Empty).await
    }

    /// Send `body` and decode the response as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the call fails, the body is empty, or it
    /// does not decode.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> ClientResult<T> {
        let value = self.send(method, path, body).await?.unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|source| ClientError::Decode {
            context: format!("response from {path}"),
            source,
        })
    }

    /// `GET` `path` and return the raw body bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] for transport failures and non-2xx statuses.
    pub async fn get_bytes(&self, path: &str) -> ClientResult<Vec<u8>> {
        let url = self.resolve(path)?;
        let target = url.to_string();
        let response = self.execute(Method::GET, url, RequestBody::Empty).await?;
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|source| ClientError::Transport {
                url: target,
                source,
            })
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: RequestBody,
    ) -> ClientResult<reqwest::Response> {
        let span = debug_span!("http_request", method = %method, url = %url);
        async move {
            let request = self.build_request(method, url, body)?;
            let target = request.url().to_string();
            let sent_credentials = request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            let response = self.client.execute(request).await.map_err(|source| {
                warn!(error = %source, "request did not complete");
                ClientError::Transport {
                    url: target,
                    source,
                }
            })?;
            let status = response.status();
            debug!(status = %status, "response received");

            if status.is_success() {
                return Ok(response);
            }
            if status == StatusCode::UNAUTHORIZED
                && let Some(sent) = sent_credentials
            {
                // A login that happened while this request was in flight keeps
                // its fresh credentials.
                if let Err(err) = self
                    .session
                    .invalidate_current(&sent, InvalidationReason::Unauthorized)
                    .await
                {
                    warn!(error = %err, "failed to clear persisted tokens");
                }
                return Err(ClientError::Unauthorized);
            }

            let body = read_error_body(response).await;
            warn!(status = %status, "request rejected");
            Err(ClientError::Api { status, body })
        }
        .instrument(span)
        .await
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("json"))
}

async fn read_error_body(response: reqwest::Response) -> ErrorBody {
    let json = is_json(response.headers());
    let text = response.text().await.unwrap_or_default();
    if json {
        serde_json::from_str(&text).map_or(ErrorBody::Text(text), ErrorBody::Json)
    } else {
        ErrorBody::Text(text)
    }
}
