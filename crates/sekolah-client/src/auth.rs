//! Credential flows: password login, social-login callback, explicit token
//! refresh and logout.

use reqwest::{Method, StatusCode};
use sekolah_api_models::{TokenPair, TokenRefreshRequest, TokenRefreshResponse, TokenRequest};
use tracing::{info, warn};
use url::Url;

use crate::config::DEFAULT_SOCIAL_AUTH_PATH;
use crate::error::{ClientError, ClientResult};
use crate::http::{HttpClient, RequestBody};
use crate::session::{Claims, InvalidationReason, Session};

/// Token endpoint.
pub const TOKEN_PATH: &str = "api/token/";
/// Token refresh endpoint.
pub const TOKEN_REFRESH_PATH: &str = "api/token/refresh/";

const CALLBACK_ACCESS_PARAM: &str = "access";
const CALLBACK_REFRESH_PARAM: &str = "refresh";

/// Login, logout and token maintenance over one [`HttpClient`].
#[derive(Debug, Clone)]
pub struct AuthService {
    http: HttpClient,
    social_auth_path: String,
}

impl AuthService {
    /// Service using the default social-auth entry path.
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self::with_social_auth_path(http, DEFAULT_SOCIAL_AUTH_PATH)
    }

    /// Service using `social_auth_path` for [`AuthService::social_login_url`].
    #[must_use]
    pub fn with_social_auth_path(http: HttpClient, social_auth_path: impl Into<String>) -> Self {
        Self {
            http,
            social_auth_path: social_auth_path.into(),
        }
    }

    /// Session the service maintains.
    #[must_use]
    pub const fn session(&self) -> &Session {
        self.http.session()
    }

    /// Exchange credentials for a token pair and enter the authenticated
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Precondition`] for blank credentials, or the
    /// backend's error (wrong credentials come back as a 401
    /// [`ClientError::Api`]).
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<Claims> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ClientError::precondition(
                "username and password are required",
            ));
        }
        let body = RequestBody::json(&TokenRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        let tokens: TokenPair = self
            .http
            .anonymous()
            .send_json(Method::POST, TOKEN_PATH, body)
            .await?;
        let claims = Claims::decode(&tokens.access)?;
        self.session().establish(tokens).await?;
        info!(username, "logged in");
        Ok(claims)
    }

    /// URL of the backend-hosted social login entry.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] when the path cannot be joined.
    pub fn social_login_url(&self) -> ClientResult<Url> {
        self.http.resolve(&self.social_auth_path)
    }

    /// Accept the tokens carried by a social-login callback URL.
    ///
    /// Returns the callback URL with the token parameters removed, which is
    /// where the operator should land next.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] for a malformed URL,
    /// [`ClientError::Precondition`] when either token is missing, or the
    /// session's error when the tokens cannot be established.
    pub async fn consume_callback(&self, callback: &str) -> ClientResult<Url> {
        let mut url = Url::parse(callback.trim()).map_err(|source| ClientError::InvalidUrl {
            input: callback.to_string(),
            source,
        })?;

        let mut access = None;
        let mut refresh = None;
        let mut remaining = Vec::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                CALLBACK_ACCESS_PARAM => access = Some(value.into_owned()),
                CALLBACK_REFRESH_PARAM => refresh = Some(value.into_owned()),
                _ => remaining.push((key.into_owned(), value.into_owned())),
            }
        }
        let (Some(access), Some(refresh)) = (
            access.filter(|token| !token.is_empty()),
            refresh.filter(|token| !token.is_empty()),
        ) else {
            return Err(ClientError::precondition(
                "callback URL does not carry both access and refresh tokens",
            ));
        };

        self.session()
            .establish(TokenPair { access, refresh })
            .await?;

        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }
        info!("logged in through social login");
        Ok(url)
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Precondition`] when logged out, and
    /// [`ClientError::Unauthorized`] after invalidating the session when the
    /// refresh token itself was rejected.
    pub async fn refresh(&self) -> ClientResult<Claims> {
        let current = self
            .session()
            .tokens()
            .ok_or_else(|| ClientError::precondition("not logged in"))?;
        let body = RequestBody::json(&TokenRefreshRequest {
            refresh: current.refresh.clone(),
        })?;
        let response: TokenRefreshResponse = match self
            .http
            .anonymous()
            .send_json(Method::POST, TOKEN_REFRESH_PATH, body)
            .await
        {
            Ok(response) => response,
            Err(err) if err.status() == Some(StatusCode::UNAUTHORIZED) => {
                warn!("refresh token rejected");
                if let Err(clear) = self.session().invalidate(InvalidationReason::Expired).await {
                    warn!(error = %clear, "failed to clear persisted tokens");
                }
                return Err(ClientError::Unauthorized);
            }
            Err(err) => return Err(err),
        };

        let tokens = TokenPair {
            access: response.access,
            refresh: response.refresh.unwrap_or(current.refresh),
        };
        let claims = Claims::decode(&tokens.access)?;
        self.session().establish(tokens).await?;
        info!("access token refreshed");
        Ok(claims)
    }

    /// Leave the authenticated state.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] when persisted tokens cannot be
    /// removed.
    pub async fn logout(&self) -> ClientResult<()> {
        self.session().logout().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::session::MemoryTokenStorage;
    use httpmock::prelude::*;
    use sekolah_test_support::{fresh_token, mint_token};
    use serde_json::json;
    use std::sync::Arc;

    fn service(server: &MockServer, storage: Arc<MemoryTokenStorage>) -> AuthService {
        let config = ClientConfig::parse(&server.base_url()).expect("config");
        let http = HttpClient::new(&config, Session::anonymous(storage)).expect("client");
        AuthService::new(http)
    }

    #[tokio::test]
    async fn login_establishes_and_persists_session() {
        let server = MockServer::start_async().await;
        let storage = Arc::new(MemoryTokenStorage::new());
        let auth = service(&server, storage.clone());
        let access = fresh_token();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/token/")
                .json_body(json!({"username": "admin", "password": "rahasia"}));
            then.status(200)
                .json_body(json!({"access": access, "refresh": "refresh-1"}));
        });

        let claims = auth.login(" admin ", "rahasia").await.expect("login");
        mock.assert();
        assert_eq!(claims.user_id, Some(1));
        assert!(auth.session().is_authenticated());
        assert_eq!(
            storage.current().map(|tokens| tokens.refresh),
            Some("refresh-1".to_string())
        );
    }

    #[tokio::test]
    async fn wrong_credentials_leave_session_anonymous() {
        let server = MockServer::start_async().await;
        let auth = service(&server, Arc::new(MemoryTokenStorage::new()));
        server.mock(|when, then| {
            when.method(POST).path("/api/token/");
            then.status(401)
                .header("content-type", "application/json")
                .json_body(json!({
                "detail": "No active account found with the given credentials"
            }));
        });

        let err = auth.login("admin", "salah").await.expect_err("401");
        assert_eq!(
            err.user_message(),
            "No active account found with the given credentials"
        );
        assert!(!auth.session().is_authenticated());
    }

    #[tokio::test]
    async fn blank_credentials_are_rejected_locally() {
        let server = MockServer::start_async().await;
        let auth = service(&server, Arc::new(MemoryTokenStorage::new()));
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/token/");
            then.status(200);
        });
        let err = auth.login("  ", "x").await.expect_err("blank");
        assert!(matches!(err, ClientError::Precondition(_)));
        assert_eq!(mock.hits(), 0);
    }

    #[tokio::test]
    async fn callback_tokens_are_consumed_and_stripped() {
        let server = MockServer::start_async().await;
        let auth = service(&server, Arc::new(MemoryTokenStorage::new()));
        let callback = format!(
            "https://admin.sekolah.example/auth/callback?next=%2Fstudents&access={}&refresh=r-9",
            fresh_token()
        );

        let onward = auth.consume_callback(&callback).await.expect("callback");
        assert_eq!(
            onward.as_str(),
            "https://admin.sekolah.example/auth/callback?next=%2Fstudents"
        );
        assert!(auth.session().is_authenticated());

        let bare = format!(
            "https://admin.sekolah.example/auth/callback?access={}&refresh=r-9",
            fresh_token()
        );
        let onward = auth.consume_callback(&bare).await.expect("callback");
        assert_eq!(onward.query(), None);
    }

    #[tokio::test]
    async fn callback_without_tokens_is_rejected() {
        let server = MockServer::start_async().await;
        let auth = service(&server, Arc::new(MemoryTokenStorage::new()));
        let err = auth
            .consume_callback("https://admin.sekolah.example/auth/callback?access=abc")
            .await
            .expect_err("missing refresh");
        assert!(matches!(err, ClientError::Precondition(_)));
        assert!(!auth.session().is_authenticated());
    }

    #[tokio::test]
    async fn refresh_replaces_access_and_keeps_refresh_token() {
        let server = MockServer::start_async().await;
        let storage = Arc::new(MemoryTokenStorage::new());
        let auth = service(&server, storage.clone());
        auth.session()
            .establish(TokenPair {
                access: fresh_token(),
                refresh: "refresh-1".into(),
            })
            .await
            .expect("establish");
        let renewed = mint_token(chrono::Utc::now().timestamp() + 7_200, 1);
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/token/refresh/")
                .json_body(json!({"refresh": "refresh-1"}));
            then.status(200).json_body(json!({"access": renewed}));
        });

        auth.refresh().await.expect("refresh");
        mock.assert();
        let tokens = storage.current().expect("stored");
        assert_eq!(tokens.access, renewed);
        assert_eq!(tokens.refresh, "refresh-1");
    }

    #[tokio::test]
    async fn rejected_refresh_invalidates_session() {
        let server = MockServer::start_async().await;
        let storage = Arc::new(MemoryTokenStorage::new());
        let auth = service(&server, storage.clone());
        auth.session()
            .establish(TokenPair {
                access: fresh_token(),
                refresh: "stale".into(),
            })
            .await
            .expect("establish");
        server.mock(|when, then| {
            when.method(POST).path("/api/token/refresh/");
            then.status(401)
                .header("content-type", "application/json")
                .json_body(json!({"detail": "Token is invalid or expired"}));
        });

        let err = auth.refresh().await.expect_err("401");
        assert!(err.is_unauthorized());
        assert!(!auth.session().is_authenticated());
        assert!(storage.current().is_none());
    }

    #[tokio::test]
    async fn refresh_requires_a_session() {
        let server = MockServer::start_async().await;
        let auth = service(&server, Arc::new(MemoryTokenStorage::new()));
        assert!(matches!(
            auth.refresh().await,
            Err(ClientError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn social_url_and_logout() {
        let server = MockServer::start_async().await;
        let storage = Arc::new(MemoryTokenStorage::new());
        let auth = service(&server, storage.clone());
        assert_eq!(
            auth.social_login_url().expect("url").as_str(),
            format!("{}/auth/login/google-oauth2/", server.base_url())
        );

        auth.session()
            .establish(TokenPair {
                access: fresh_token(),
                refresh: "r".into(),
            })
            .await
            .expect("establish");
        auth.logout().await.expect("logout");
        assert!(!auth.session().is_authenticated());
        assert!(storage.current().is_none());
    }
}
