//! Generic list/CRUD state for one collection endpoint.
//!
//! # Design
//! - Every list call bumps a per-resource generation counter; a response is
//!   applied only when its generation is still the newest, so a slow earlier
//!   response can never overwrite a later one.
//! - Mutations never edit `items` directly. On success the active list
//!   request is fetched again; on failure only `error` changes.
//! - Pagination cursors are opaque and followed verbatim.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Method;
use sekolah_api_models::{Listing, Record, RecordId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

use crate::config::DEFAULT_SEARCH_DEBOUNCE;
use crate::debounce::Debouncer;
use crate::error::{ClientError, ClientResult, default_error_message};
use crate::form::{FormMode, FormPayload, Upload};
use crate::http::{HttpClient, RequestBody};

/// Turns a client error into the message stored in [`ListState::error`].
pub type ErrorMapper = Arc<dyn Fn(&ClientError) -> String + Send + Sync>;

/// Per-resource settings.
#[derive(Clone)]
pub struct ResourceConfig {
    /// Collection path, relative to the API base URL, ending in `/`.
    pub collection_url: String,
    /// Quiet window applied to [`Resource::search`].
    pub search_debounce: Duration,
    /// Error-to-message mapping.
    pub map_error: ErrorMapper,
}

impl fmt::Debug for ResourceConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ResourceConfig")
            .field("collection_url", &self.collection_url)
            .field("search_debounce", &self.search_debounce)
            .finish_non_exhaustive()
    }
}

impl ResourceConfig {
    /// Settings for `collection_url` with default debounce and messages.
    #[must_use]
    pub fn new(collection_url: impl Into<String>) -> Self {
        let mut collection_url = collection_url.into();
        if !collection_url.ends_with('/') {
            collection_url.push('/');
        }
        Self {
            collection_url,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            map_error: Arc::new(default_error_message),
        }
    }

    /// Settings for the endpoint of record type `T`.
    #[must_use]
    pub fn for_record<T: Record>() -> Self {
        Self::new(T::ENDPOINT)
    }

    /// Override the search debounce window.
    #[must_use]
    pub fn with_search_debounce(mut self, window: Duration) -> Self {
        self.search_debounce = window;
        self
    }

    /// Override the error mapping.
    #[must_use]
    pub fn with_error_mapper(
        mut self,
        mapper: impl Fn(&ClientError) -> String + Send + Sync + 'static,
    ) -> Self {
        self.map_error = Arc::new(mapper);
        self
    }
}

/// Search term plus filters sent as query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Free-text `search` parameter.
    pub search: Option<String>,
    /// Additional filter parameters.
    pub filters: BTreeMap<String, String>,
}

impl ListQuery {
    /// Empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the search term; blank terms clear it.
    #[must_use]
    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        let term = term.trim();
        self.search = (!term.is_empty()).then(|| term.to_string());
        self
    }

    /// Add a filter parameter.
    #[must_use]
    pub fn with_filter(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.filters.insert(key.into(), value.to_string());
        self
    }

    /// Query parameters in a stable order.
    #[must_use]
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .search
            .iter()
            .map(|term| ("search".to_string(), term.clone()))
            .collect();
        pairs.extend(
            self.filters
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        pairs
    }

    fn apply(&self, url: &mut Url) {
        let pairs = self.pairs();
        if pairs.is_empty() {
            return;
        }
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(&key, &value);
        }
    }
}

/// What a list call fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRequest {
    /// The collection endpoint with query parameters.
    Query(ListQuery),
    /// An opaque cursor URL returned by the backend.
    Cursor(String),
}

impl Default for ListRequest {
    fn default() -> Self {
        Self::Query(ListQuery::default())
    }
}

/// Observable list state of one resource.
#[derive(Debug, Clone)]
pub struct ListState<T> {
    /// Records of the current page.
    pub items: Vec<T>,
    /// Total matching records across pages.
    pub count: u64,
    /// Cursor URL of the next page.
    pub next: Option<String>,
    /// Cursor URL of the previous page.
    pub previous: Option<String>,
    /// Whether a list request is in flight.
    pub is_loading: bool,
    /// Message of the last failure, cleared by the next successful list.
    pub error: Option<String>,
    /// Request the current items came from; `None` until the first list.
    pub active: Option<ListRequest>,
    /// Last query-style request; kept while paging so searches retain
    /// filters.
    pub query: ListQuery,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next: None,
            previous: None,
            is_loading: false,
            error: None,
            active: None,
            query: ListQuery::default(),
        }
    }
}

/// Outcome of a list call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// The response was stored in the list state.
    Applied,
    /// A newer list call started meanwhile; the response was discarded.
    Stale,
    /// A later keystroke superseded this search; nothing was sent.
    Debounced,
}

/// List/CRUD hook over one collection endpoint.
pub struct Resource<T> {
    inner: Arc<ResourceInner<T>>,
}

struct ResourceInner<T> {
    http: HttpClient,
    config: ResourceConfig,
    state: watch::Sender<ListState<T>>,
    generation: AtomicU64,
    debouncer: Debouncer,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Resource")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<T: Record> Resource<T> {
    /// Hook over `config.collection_url` using `http`.
    #[must_use]
    pub fn new(http: HttpClient, config: ResourceConfig) -> Self {
        let (state, _) = watch::channel(ListState::default());
        let debouncer = Debouncer::new(config.search_debounce);
        Self {
            inner: Arc::new(ResourceInner {
                http,
                config,
                state,
                generation: AtomicU64::new(0),
                debouncer,
            }),
        }
    }

    /// Hook over `T::ENDPOINT` with default settings.
    #[must_use]
    pub fn for_record(http: HttpClient) -> Self {
        Self::new(http, ResourceConfig::for_record::<T>())
    }

    /// Settings in use.
    #[must_use]
    pub fn config(&self) -> &ResourceConfig {
        &self.inner.config
    }

    /// Transport in use.
    #[must_use]
    pub fn http(&self) -> &HttpClient {
        &self.inner.http
    }

    /// Clone of the current list state.
    #[must_use]
    pub fn snapshot(&self) -> ListState<T> {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every list state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ListState<T>> {
        self.inner.state.subscribe()
    }

    /// Path of the record `id`.
    #[must_use]
    pub fn item_path(&self, id: RecordId) -> String {
        format!("{}{id}/", self.inner.config.collection_url)
    }

    fn action_path(&self, action: &str) -> String {
        format!(
            "{}{}/",
            self.inner.config.collection_url,
            action.trim_matches('/')
        )
    }

    fn request_url(&self, request: &ListRequest) -> ClientResult<Url> {
        match request {
            ListRequest::Query(query) => {
                let mut url = self.inner.http.resolve(&self.inner.config.collection_url)?;
                query.apply(&mut url);
                Ok(url)
            }
            ListRequest::Cursor(cursor) => self.inner.http.resolve(cursor),
        }
    }

    /// Fetch `request` and store the page.
    ///
    /// A request whose URL cannot be resolved fails like any other fetch but
    /// never becomes the active request.
    ///
    /// # Errors
    ///
    /// Returns the [`ClientError`] of a failed fetch after storing its message
    /// and clearing the list. Failures of superseded fetches are swallowed as
    /// [`Fetch::Stale`].
    pub async fn list(&self, request: ListRequest) -> ClientResult<Fetch> {
        let target = match &request {
            ListRequest::Query(_) => self.inner.config.collection_url.clone(),
            ListRequest::Cursor(cursor) => cursor.clone(),
        };
        let resolved = self.request_url(&request);
        let accepted = resolved.is_ok();
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.send_modify(|state| {
            if accepted {
                if let ListRequest::Query(query) = &request {
                    state.query = query.clone();
                }
                state.active = Some(request);
            }
            state.is_loading = true;
        });

        let result = match resolved {
            Ok(url) => {
                self.inner
                    .http
                    .get_json::<Listing<T>>(url.as_str())
                    .await
            }
            Err(err) => Err(err),
        };

        if self.inner.generation.load(Ordering::SeqCst) != generation {
            debug!(url = %target, "discarding superseded list response");
            return Ok(Fetch::Stale);
        }

        match result {
            Ok(listing) => {
                let page = listing.into_page();
                debug!(url = %target, count = page.count, "list applied");
                self.inner.state.send_modify(|state| {
                    state.items = page.results;
                    state.count = page.count;
                    state.next = page.next;
                    state.previous = page.previous;
                    state.is_loading = false;
                    state.error = None;
                });
                Ok(Fetch::Applied)
            }
            Err(err) => {
                let message = (self.inner.config.map_error)(&err);
                warn!(url = %target, error = %message, "list failed");
                self.inner.state.send_modify(|state| {
                    state.items.clear();
                    state.count = 0;
                    state.next = None;
                    state.previous = None;
                    state.is_loading = false;
                    state.error = Some(message);
                });
                Err(err)
            }
        }
    }

    /// Fetch the collection with `query`.
    ///
    /// # Errors
    ///
    /// See [`Resource::list`].
    pub async fn query(&self, query: ListQuery) -> ClientResult<Fetch> {
        self.list(ListRequest::Query(query)).await
    }

    /// Repeat the active request (the unfiltered collection before the first
    /// list).
    ///
    /// # Errors
    ///
    /// See [`Resource::list`].
    pub async fn refresh(&self) -> ClientResult<Fetch> {
        let active = self.inner.state.borrow().active.clone();
        self.list(active.unwrap_or_default()).await
    }

    /// Debounced search keeping the current filters.
    ///
    /// # Errors
    ///
    /// See [`Resource::list`].
    pub async fn search(&self, term: &str) -> ClientResult<Fetch> {
        if !self.inner.debouncer.settle().await {
            return Ok(Fetch::Debounced);
        }
        let query = self.inner.state.borrow().query.clone().with_search(term);
        self.list(ListRequest::Query(query)).await
    }

    /// Follow an opaque pagination cursor.
    ///
    /// # Errors
    ///
    /// See [`Resource::list`].
    pub async fn paginate(&self, cursor_url: &str) -> ClientResult<Fetch> {
        self.list(ListRequest::Cursor(cursor_url.to_string())).await
    }

    /// Follow the `next` cursor of the current page.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Precondition`] on the last page, otherwise see
    /// [`Resource::list`].
    pub async fn next_page(&self) -> ClientResult<Fetch> {
        let next = self.inner.state.borrow().next.clone();
        let cursor = next.ok_or_else(|| ClientError::precondition("already on the last page"))?;
        self.paginate(&cursor).await
    }

    /// Follow the `previous` cursor of the current page.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Precondition`] on the first page, otherwise see
    /// [`Resource::list`].
    pub async fn previous_page(&self) -> ClientResult<Fetch> {
        let previous = self.inner.state.borrow().previous.clone();
        let cursor =
            previous.ok_or_else(|| ClientError::precondition("already on the first page"))?;
        self.paginate(&cursor).await
    }

    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the call fails or the body does not
    /// decode.
    pub async fn retrieve(&self, id: RecordId) -> ClientResult<T> {
        self.inner.http.get_json(&self.item_path(id)).await
    }

    /// `POST` a new record.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the backend rejects the record, or
    /// [`ClientError::EmptyWriteResponse`] when it accepts it without echoing
    /// the record back.
    pub async fn create(&self, payload: FormPayload) -> ClientResult<T> {
        let path = self.inner.config.collection_url.clone();
        let body = self.mutate(Method::POST, &path, payload.encode()).await?;
        decode_saved(body, &path)
    }

    /// `PUT` a full replacement of record `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the backend rejects the update, or
    /// [`ClientError::EmptyWriteResponse`] when it accepts it without echoing
    /// the record back.
    pub async fn update(&self, id: RecordId, payload: FormPayload) -> ClientResult<T> {
        let path = self.item_path(id);
        let body = self.mutate(Method::PUT, &path, payload.encode()).await?;
        decode_saved(body, &path)
    }

    /// `PATCH` the given fields of record `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the backend rejects the update, or
    /// [`ClientError::EmptyWriteResponse`] when it accepts it without echoing
    /// the record back.
    pub async fn partial_update(&self, id: RecordId, payload: FormPayload) -> ClientResult<T> {
        let path = self.item_path(id);
        let body = self.mutate(Method::PATCH, &path, payload.encode()).await?;
        decode_saved(body, &path)
    }

    /// Create or update depending on `mode`; the target of
    /// [`crate::FormDraft::submit`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the backend rejects the record.
    pub async fn save(&self, mode: FormMode, payload: FormPayload) -> ClientResult<T> {
        match mode {
            FormMode::Create => self.create(payload).await,
            FormMode::Edit(id) => self.update(id, payload).await,
        }
    }

    /// `DELETE` record `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the backend refuses the deletion.
    pub async fn delete(&self, id: RecordId) -> ClientResult<()> {
        let path = self.item_path(id);
        self.mutate(Method::DELETE, &path, RequestBody::Empty)
            .await
            .map(|_| ())
    }

    /// Call a collection-level action (`{collection}/{action}/`). Anything
    /// but `GET` counts as a mutation.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the call fails.
    pub async fn collection_action(
        &self,
        method: Method,
        action: &str,
        body: RequestBody,
    ) -> ClientResult<Option<Value>> {
        let path = self.action_path(action);
        self.action(method, &path, body).await
    }

    /// Call an item-level action (`{collection}/{id}/{action}/`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the call fails.
    pub async fn item_action(
        &self,
        id: RecordId,
        method: Method,
        action: &str,
        body: RequestBody,
    ) -> ClientResult<Option<Value>> {
        let path = format!("{}{}/", self.item_path(id), action.trim_matches('/'));
        self.action(method, &path, body).await
    }

    /// Create several records in one call (`batch-create/`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Precondition`] when a payload carries a file, or
    /// the backend's error.
    pub async fn batch_create(&self, payloads: Vec<FormPayload>) -> ClientResult<Vec<T>> {
        if payloads.iter().any(FormPayload::has_file) {
            return Err(ClientError::precondition(
                "batch creation does not accept file uploads",
            ));
        }
        let body = RequestBody::Json(Value::Array(
            payloads.iter().map(FormPayload::to_json).collect(),
        ));
        let path = self.action_path("batch-create");
        match self.mutate(Method::POST, &path, body).await? {
            None => Ok(Vec::new()),
            Some(value) => decode::<Listing<T>>(Some(value), &path)
                .map(|listing| listing.into_page().results),
        }
    }

    /// Download the collection export (`export/`) for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the download fails.
    pub async fn export(&self, query: &ListQuery) -> ClientResult<Vec<u8>> {
        let mut url = self.inner.http.resolve(&self.action_path("export"))?;
        query.apply(&mut url);
        self.inner.http.get_bytes(url.as_str()).await
    }

    /// Upload a bulk import file (`import/`) as the `file` part.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the backend rejects the file.
    pub async fn import(&self, upload: Upload) -> ClientResult<Option<Value>> {
        let body = FormPayload::new().with("file", upload).encode();
        let path = self.action_path("import");
        self.mutate(Method::POST, &path, body).await
    }

    async fn action(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> ClientResult<Option<Value>> {
        if method == Method::GET {
            self.inner.http.send(method, path, body).await
        } else {
            self.mutate(method, path, body).await
        }
    }

    async fn mutate(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> ClientResult<Option<Value>> {
        match self.inner.http.send(method.clone(), path, body).await {
            Ok(body) => {
                debug!(method = %method, path, "mutation confirmed");
                self.refetch_active().await;
                Ok(body)
            }
            Err(err) => {
                let message = (self.inner.config.map_error)(&err);
                warn!(method = %method, path, error = %message, "mutation failed");
                self.inner
                    .state
                    .send_modify(|state| state.error = Some(message));
                Err(err)
            }
        }
    }

    async fn refetch_active(&self) {
        let active = self.inner.state.borrow().active.clone();
        let Some(active) = active else {
            return;
        };
        if let Err(err) = self.list(active).await {
            warn!(error = %err, "refetch after mutation failed");
        }
    }
}

fn decode_saved<R: DeserializeOwned>(body: Option<Value>, path: &str) -> ClientResult<R> {
    match body {
        Some(value) => decode(Some(value), path),
        None => Err(ClientError::EmptyWriteResponse {
            path: path.to_string(),
        }),
    }
}

fn decode<R: DeserializeOwned>(body: Option<Value>, path: &str) -> ClientResult<R> {
    serde_json::from_value(body.unwrap_or(Value::Null)).map_err(|source| ClientError::Decode {
        context: format!("response from {path}"),
        source,
    })
}
