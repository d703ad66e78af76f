//! Auth session store.
//!
//! # Design
//! - Two states only: [`SessionState::Anonymous`] and
//!   [`SessionState::Authenticated`]. Claims are decoded from the access token
//!   when the authenticated state is built and are never stored separately.
//! - The state lives in a `watch` channel: readers take a cheap synchronous
//!   borrow, and subscribers observe every transition (the login-redirect hook).
//! - Expiry is checked once, when persisted tokens are restored. Afterwards
//!   expiry is only discovered reactively through a 401.
//! - Transitions (establish, logout, invalidation) are serialised, so the
//!   persisted pair always matches the last state published.

use std::fmt::{self, Debug, Formatter};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use sekolah_api_models::TokenPair;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::{info, warn};

use crate::error::{ClientError, ClientResult};

/// Claims carried in the access token payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiry as a Unix timestamp in seconds.
    pub exp: i64,
    #[serde(default)]
    /// Backend user id.
    pub user_id: Option<i64>,
    #[serde(default)]
    /// Username, when the backend embeds it.
    pub username: Option<String>,
    #[serde(default)]
    /// Token type (`access` for access tokens).
    pub token_type: Option<String>,
    #[serde(default)]
    /// Token identifier.
    pub jti: Option<String>,
    #[serde(flatten)]
    /// Any additional claims.
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Decode the payload segment of a JWT without verifying its signature.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidToken`] when the token is not a
    /// three-segment JWT with a base64url JSON payload containing `exp`.
    pub fn decode(token: &str) -> ClientResult<Self> {
        let mut segments = token.trim().split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(ClientError::InvalidToken {
                reason: "expected three dot-separated segments",
            });
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|_| ClientError::InvalidToken {
                reason: "payload is not base64url",
            })?;
        serde_json::from_slice(&bytes).map_err(|_| ClientError::InvalidToken {
            reason: "payload is not a JSON claims object",
        })
    }

    /// Expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Whether the token is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}

/// Authenticated session data: a token pair plus the claims derived from it.
#[derive(Clone, PartialEq)]
pub struct AuthenticatedSession {
    tokens: TokenPair,
    claims: Claims,
}

impl AuthenticatedSession {
    /// Build the session, decoding claims from the access token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidToken`] when the access token cannot be
    /// decoded.
    pub fn new(tokens: TokenPair) -> ClientResult<Self> {
        let claims = Claims::decode(&tokens.access)?;
        Ok(Self { tokens, claims })
    }

    /// Token pair backing the session.
    #[must_use]
    pub const fn tokens(&self) -> &TokenPair {
        &self.tokens
    }

    /// Claims decoded from the access token.
    #[must_use]
    pub const fn claims(&self) -> &Claims {
        &self.claims
    }

    /// `Authorization` header value for this session.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.tokens.access)
    }
}

impl Debug for AuthenticatedSession {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthenticatedSession")
            .field("tokens", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Authentication state shared by every request.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    /// No usable credentials.
    #[default]
    Anonymous,
    /// A decoded, persisted token pair.
    Authenticated(AuthenticatedSession),
}

impl SessionState {
    /// Whether the state carries credentials.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Why a session was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    /// The operator logged out.
    Logout,
    /// The persisted access token had expired at startup.
    Expired,
    /// The backend answered 401.
    Unauthorized,
}

/// Persistence backend for the token pair.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Load the persisted pair, if any.
    async fn load(&self) -> ClientResult<Option<TokenPair>>;
    /// Persist the pair, replacing any previous one.
    async fn save(&self, tokens: &TokenPair) -> ClientResult<()>;
    /// Remove the persisted pair.
    async fn clear(&self) -> ClientResult<()>;
}

/// Token pair persisted as one JSON blob `{access, refresh}` in a file.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    /// Storage at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File backing the storage.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStorage for FileTokenStorage {
    async fn load(&self) -> ClientResult<Option<TokenPair>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ClientError::Storage {
                    operation: "load",
                    source,
                });
            }
        };
        match serde_json::from_slice::<TokenPair>(&bytes) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring unreadable token file");
                Ok(None)
            }
        }
    }

    async fn save(&self, tokens: &TokenPair) -> ClientResult<()> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ClientError::Storage {
                    operation: "create directory",
                    source,
                })?;
        }
        let body = serde_json::to_vec(tokens).map_err(|source| ClientError::Decode {
            context: "token pair".to_string(),
            source,
        })?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|source| ClientError::Storage {
                operation: "save",
                source,
            })
    }

    async fn clear(&self) -> ClientResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ClientError::Storage {
                operation: "clear",
                source,
            }),
        }
    }
}

/// Process-local storage, used when nothing should touch the disk.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    tokens: Mutex<Option<TokenPair>>,
}

impl MemoryTokenStorage {
    /// Empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with `tokens`.
    #[must_use]
    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
        }
    }

    /// Currently stored pair.
    #[must_use]
    pub fn current(&self) -> Option<TokenPair> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn load(&self) -> ClientResult<Option<TokenPair>> {
        Ok(self.current())
    }

    async fn save(&self, tokens: &TokenPair) -> ClientResult<()> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> ClientResult<()> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Shared handle to the auth session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    state: watch::Sender<SessionState>,
    storage: Arc<dyn TokenStorage>,
    transitions: AsyncMutex<()>,
}

impl Debug for Session {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Session")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Anonymous session persisting through `storage`.
    #[must_use]
    pub fn anonymous(storage: Arc<dyn TokenStorage>) -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        Self {
            inner: Arc::new(SessionInner {
                state,
                storage,
                transitions: AsyncMutex::new(()),
            }),
        }
    }

    /// Anonymous session with in-memory storage.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::anonymous(Arc::new(MemoryTokenStorage::new()))
    }

    /// Restore the session persisted in `storage`, checking expiry now.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] when the storage cannot be read.
    pub async fn restore(storage: Arc<dyn TokenStorage>) -> ClientResult<Self> {
        Self::restore_at(storage, Utc::now()).await
    }

    /// Restore the session persisted in `storage`, checking expiry at `now`.
    ///
    /// Expired or undecodable tokens are cleared and the session starts
    /// anonymous.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] when the storage cannot be read or
    /// cleared.
    pub async fn restore_at(
        storage: Arc<dyn TokenStorage>,
        now: DateTime<Utc>,
    ) -> ClientResult<Self> {
        let session = Self::anonymous(Arc::clone(&storage));
        let Some(tokens) = storage.load().await? else {
            return Ok(session);
        };

        match AuthenticatedSession::new(tokens) {
            Ok(authenticated) if !authenticated.claims().is_expired_at(now) => {
                session.inner.state.send_replace(SessionState::Authenticated(authenticated));
            }
            Ok(_) => {
                info!("persisted session expired; starting anonymous");
                storage.clear().await?;
            }
            Err(err) => {
                warn!(error = %err, "persisted session unreadable; starting anonymous");
                storage.clear().await?;
            }
        }
        Ok(session)
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Whether requests currently carry credentials.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// `Authorization` header value, `None` when anonymous.
    #[must_use]
    pub fn auth_header(&self) -> Option<String> {
        match &*self.inner.state.borrow() {
            SessionState::Authenticated(session) => Some(session.bearer()),
            SessionState::Anonymous => None,
        }
    }

    /// Claims of the authenticated session.
    #[must_use]
    pub fn claims(&self) -> Option<Claims> {
        match &*self.inner.state.borrow() {
            SessionState::Authenticated(session) => Some(session.claims().clone()),
            SessionState::Anonymous => None,
        }
    }

    /// Token pair of the authenticated session.
    #[must_use]
    pub fn tokens(&self) -> Option<TokenPair> {
        match &*self.inner.state.borrow() {
            SessionState::Authenticated(session) => Some(session.tokens().clone()),
            SessionState::Anonymous => None,
        }
    }

    /// Observe every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Enter the authenticated state with `tokens` and persist them.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidToken`] when the access token cannot be
    /// decoded, or [`ClientError::Storage`] when persisting fails. The state is
    /// unchanged in both cases.
    pub async fn establish(&self, tokens: TokenPair) -> ClientResult<()> {
        let authenticated = AuthenticatedSession::new(tokens)?;
        let _transition = self.inner.transitions.lock().await;
        self.inner.storage.save(authenticated.tokens()).await?;
        info!(
            user_id = ?authenticated.claims().user_id,
            "session established"
        );
        self.inner
            .state
            .send_replace(SessionState::Authenticated(authenticated));
        Ok(())
    }

    /// Leave the authenticated state at the operator's request.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] when the persisted pair cannot be
    /// removed; the in-memory state is anonymous regardless.
    pub async fn logout(&self) -> ClientResult<()> {
        self.invalidate(InvalidationReason::Logout).await
    }

    /// Drop the session for `reason`.
    ///
    /// Waits for any transition in flight, then flips the in-memory state to
    /// anonymous before storage is touched, so no request issued after this
    /// call carries the old token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] when the persisted pair cannot be
    /// removed.
    pub async fn invalidate(&self, reason: InvalidationReason) -> ClientResult<()> {
        let _transition = self.inner.transitions.lock().await;
        self.clear(reason).await
    }

    /// Drop the session for `reason` only while `credentials` is still the
    /// current `Authorization` value. Returns whether the session was dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] when the persisted pair cannot be
    /// removed.
    pub async fn invalidate_current(
        &self,
        credentials: &str,
        reason: InvalidationReason,
    ) -> ClientResult<bool> {
        let _transition = self.inner.transitions.lock().await;
        if self.auth_header().as_deref() != Some(credentials) {
            return Ok(false);
        }
        self.clear(reason).await.map(|()| true)
    }

    async fn clear(&self, reason: InvalidationReason) -> ClientResult<()> {
        let previous = self.inner.state.send_replace(SessionState::Anonymous);
        if previous.is_authenticated() {
            match reason {
                InvalidationReason::Logout => info!("session closed by logout"),
                InvalidationReason::Expired | InvalidationReason::Unauthorized => {
                    warn!(?reason, "session invalidated");
                }
            }
        }
        self.inner.storage.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sekolah_test_support::{expired_token, fresh_token, mint_token};

    fn pair(access: String) -> TokenPair {
        TokenPair {
            access,
            refresh: "refresh-token".into(),
        }
    }

    #[test]
    fn claims_decode_reads_exp_and_user() {
        let claims = Claims::decode(&mint_token(1_900_000_000, 42)).expect("claims");
        assert_eq!(claims.exp, 1_900_000_000);
        assert_eq!(claims.user_id, Some(42));
        assert_eq!(claims.username.as_deref(), Some("user42"));
        assert_eq!(claims.token_type.as_deref(), Some("access"));
        assert!(claims.expires_at().is_some());
    }

    #[test]
    fn claims_decode_rejects_malformed_tokens() {
        assert!(matches!(
            Claims::decode("not-a-jwt"),
            Err(ClientError::InvalidToken { .. })
        ));
        assert!(matches!(
            Claims::decode("a.%%%.c"),
            Err(ClientError::InvalidToken { .. })
        ));
        let not_json = format!("a.{}.c", URL_SAFE_NO_PAD.encode("plain"));
        assert!(matches!(
            Claims::decode(&not_json),
            Err(ClientError::InvalidToken { .. })
        ));
    }

    #[tokio::test]
    async fn restore_with_valid_token_is_authenticated() {
        let access = fresh_token();
        let storage = Arc::new(MemoryTokenStorage::with_tokens(pair(access.clone())));
        let session = Session::restore(storage).await.expect("restore");
        assert!(session.is_authenticated());
        assert_eq!(session.auth_header(), Some(format!("Bearer {access}")));
        assert_eq!(session.claims().and_then(|claims| claims.user_id), Some(1));
    }

    #[tokio::test]
    async fn restore_with_expired_token_clears_storage() {
        let storage = Arc::new(MemoryTokenStorage::with_tokens(pair(expired_token())));
        let session = Session::restore(Arc::clone(&storage) as Arc<dyn TokenStorage>)
            .await
            .expect("restore");
        assert!(!session.is_authenticated());
        assert_eq!(session.auth_header(), None);
        assert!(storage.current().is_none());
    }

    #[tokio::test]
    async fn restore_at_checks_expiry_against_supplied_clock() {
        let exp = Utc::now().timestamp() + 60;
        let storage = Arc::new(MemoryTokenStorage::with_tokens(pair(mint_token(exp, 3))));
        let later = Utc::now() + Duration::minutes(5);
        let session = Session::restore_at(storage, later).await.expect("restore");
        assert_eq!(session.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn restore_with_garbage_token_starts_anonymous() {
        let storage = Arc::new(MemoryTokenStorage::with_tokens(pair("garbage".into())));
        let session = Session::restore(Arc::clone(&storage) as Arc<dyn TokenStorage>)
            .await
            .expect("restore");
        assert!(!session.is_authenticated());
        assert!(storage.current().is_none());
    }

    #[tokio::test]
    async fn establish_then_logout_transitions_and_notifies() {
        let storage = Arc::new(MemoryTokenStorage::new());
        let session = Session::anonymous(Arc::clone(&storage) as Arc<dyn TokenStorage>);
        let mut updates = session.subscribe();

        session.establish(pair(fresh_token())).await.expect("establish");
        assert!(updates.has_changed().expect("sender alive"));
        assert!(updates.borrow_and_update().is_authenticated());
        assert!(storage.current().is_some());

        session.logout().await.expect("logout");
        assert!(updates.has_changed().expect("sender alive"));
        assert!(!updates.borrow_and_update().is_authenticated());
        assert!(storage.current().is_none());
        assert_eq!(session.tokens(), None);
    }

    struct SlowStorage {
        inner: MemoryTokenStorage,
        delay: std::time::Duration,
    }

    #[async_trait]
    impl TokenStorage for SlowStorage {
        async fn load(&self) -> ClientResult<Option<TokenPair>> {
            self.inner.load().await
        }

        async fn save(&self, tokens: &TokenPair) -> ClientResult<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.save(tokens).await
        }

        async fn clear(&self) -> ClientResult<()> {
            self.inner.clear().await
        }
    }

    #[tokio::test]
    async fn logout_during_pending_establish_wins() {
        let storage = Arc::new(SlowStorage {
            inner: MemoryTokenStorage::new(),
            delay: std::time::Duration::from_millis(50),
        });
        let session = Session::anonymous(Arc::clone(&storage) as Arc<dyn TokenStorage>);

        let login = {
            let session = session.clone();
            tokio::spawn(async move { session.establish(pair(fresh_token())).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        session.logout().await.expect("logout");
        login.await.expect("join").expect("establish");

        assert!(!session.is_authenticated());
        assert!(storage.inner.current().is_none());
    }

    #[tokio::test]
    async fn invalidate_current_ignores_replaced_credentials() {
        let session = Session::in_memory();
        session.establish(pair(fresh_token())).await.expect("first login");
        let stale = session.auth_header().expect("bearer");
        session
            .establish(pair(mint_token(Utc::now().timestamp() + 7200, 2)))
            .await
            .expect("second login");

        let dropped = session
            .invalidate_current(&stale, InvalidationReason::Unauthorized)
            .await
            .expect("invalidate");
        assert!(!dropped);
        assert!(session.is_authenticated());

        let current = session.auth_header().expect("bearer");
        let dropped = session
            .invalidate_current(&current, InvalidationReason::Unauthorized)
            .await
            .expect("invalidate");
        assert!(dropped);
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn establish_rejects_undecodable_access_token() {
        let session = Session::in_memory();
        let err = session
            .establish(pair("nope".into()))
            .await
            .expect_err("invalid token");
        assert!(matches!(err, ClientError::InvalidToken { .. }));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn file_storage_round_trips_single_blob() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("session.json");
        let storage = FileTokenStorage::new(&path);
        assert_eq!(storage.load().await.expect("load"), None);

        let tokens = pair(fresh_token());
        storage.save(&tokens).await.expect("save");
        let raw: Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json blob");
        assert_eq!(raw["refresh"], "refresh-token");
        assert_eq!(storage.load().await.expect("load"), Some(tokens));

        storage.clear().await.expect("clear");
        assert!(!path.exists());
        storage.clear().await.expect("clear twice");
    }

    #[tokio::test]
    async fn file_storage_ignores_corrupt_blob() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").expect("write");
        let storage = FileTokenStorage::new(&path);
        assert_eq!(storage.load().await.expect("load"), None);
    }
}
