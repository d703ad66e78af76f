//! Searchable dropdown loader for relational form fields.
//!
//! Each lookup is tagged with its query. A response is shown only if its
//! query is still the latest one typed, so out-of-order responses never
//! replace newer options. Results are cached per query.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sekolah_api_models::{Listing, Record, RecordId, SelectOption};
use tracing::debug;

use crate::config::DEFAULT_SELECT_DEBOUNCE;
use crate::debounce::Debouncer;
use crate::error::ClientResult;
use crate::http::HttpClient;
use crate::resource::ListQuery;

/// Maps a record onto a dropdown option.
pub type OptionFormatter<T> = Arc<dyn Fn(&T) -> SelectOption + Send + Sync>;

/// Outcome of [`SelectLoader::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Fetched from the backend and now displayed.
    Loaded(Vec<SelectOption>),
    /// Served from the option cache and now displayed.
    Cached(Vec<SelectOption>),
    /// A later keystroke superseded this lookup; nothing was sent.
    Debounced,
    /// The query changed while the request was in flight; nothing displayed.
    Stale,
}

/// Debounced, cached option loader over one collection endpoint.
pub struct SelectLoader<T> {
    inner: Arc<SelectInner<T>>,
}

struct SelectInner<T> {
    http: HttpClient,
    endpoint: String,
    formatter: OptionFormatter<T>,
    debouncer: Debouncer,
    latest_query: Mutex<Option<String>>,
    cache: Mutex<HashMap<String, Vec<SelectOption>>>,
    options: Mutex<Vec<SelectOption>>,
}

impl<T> Clone for SelectLoader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for SelectLoader<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SelectLoader")
            .field("endpoint", &self.inner.endpoint)
            .field("debounce", &self.inner.debouncer.window())
            .finish_non_exhaustive()
    }
}

impl<T: Record> SelectLoader<T> {
    /// Loader over `endpoint` with a custom formatter.
    #[must_use]
    pub fn new(
        http: HttpClient,
        endpoint: impl Into<String>,
        formatter: impl Fn(&T) -> SelectOption + Send + Sync + 'static,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SelectInner {
                http,
                endpoint: endpoint.into(),
                formatter: Arc::new(formatter),
                debouncer: Debouncer::new(debounce),
                latest_query: Mutex::new(None),
                cache: Mutex::new(HashMap::new()),
                options: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Loader over `T::ENDPOINT` using [`Record::to_option`] and the default
    /// debounce.
    #[must_use]
    pub fn for_record(http: HttpClient) -> Self {
        Self::new(http, T::ENDPOINT, T::to_option, DEFAULT_SELECT_DEBOUNCE)
    }

    /// Same loader with another debounce window.
    #[must_use]
    pub fn with_debounce(http: HttpClient, debounce: Duration) -> Self {
        Self::new(http, T::ENDPOINT, T::to_option, debounce)
    }

    /// Options currently displayed.
    #[must_use]
    pub fn options(&self) -> Vec<SelectOption> {
        self.inner
            .options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        self.inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Look up options matching `query`.
    ///
    /// # Errors
    ///
    /// Returns the [`crate::ClientError`] of a failed lookup that was still
    /// current; displayed options are left untouched.
    pub async fn load(&self, query: &str) -> ClientResult<Lookup> {
        let query = query.trim().to_string();
        self.set_latest(&query);

        let cached = self
            .inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&query)
            .cloned();
        if let Some(options) = cached {
            self.inner.debouncer.cancel();
            self.display(options.clone());
            return Ok(Lookup::Cached(options));
        }

        if !self.inner.debouncer.settle().await {
            return Ok(Lookup::Debounced);
        }

        let mut url = self.inner.http.resolve(&self.inner.endpoint)?;
        if let Some(term) = ListQuery::new().with_search(query.as_str()).search {
            url.query_pairs_mut().append_pair("search", &term);
        }
        let result = self.inner.http.get_json::<Listing<T>>(url.as_str()).await;
        let current = self.is_latest(&query);

        let listing = match result {
            Ok(listing) => listing,
            Err(_) if !current => return Ok(Lookup::Stale),
            Err(err) => return Err(err),
        };
        let options: Vec<SelectOption> = listing
            .into_page()
            .results
            .iter()
            .map(|record| (self.inner.formatter)(record))
            .collect();
        self.inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(query.clone(), options.clone());

        if current {
            debug!(query = %query, count = options.len(), "select options loaded");
            self.display(options.clone());
            Ok(Lookup::Loaded(options))
        } else {
            debug!(query = %query, "discarding superseded select options");
            Ok(Lookup::Stale)
        }
    }

    /// Option for the already-selected record `id` (edit forms).
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError`] when the record cannot be fetched.
    pub async fn option_for(&self, id: RecordId) -> ClientResult<SelectOption> {
        let path = format!("{}{id}/", self.inner.endpoint);
        let record: T = self.inner.http.get_json(&path).await?;
        Ok((self.inner.formatter)(&record))
    }

    fn set_latest(&self, query: &str) {
        *self
            .inner
            .latest_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(query.to_string());
    }

    fn is_latest(&self, query: &str) -> bool {
        self.inner
            .latest_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            == Some(query)
    }

    fn display(&self, options: Vec<SelectOption>) {
        *self
            .inner
            .options
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = options;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::session::Session;
    use httpmock::prelude::*;
    use sekolah_api_models::Teacher;
    use sekolah_test_support::{sample_teacher, teacher_page};
    use serde_json::json;

    fn http_for(server: &MockServer) -> HttpClient {
        let config = ClientConfig::parse(&server.base_url()).expect("config");
        HttpClient::new(&config, Session::in_memory()).expect("client")
    }

    fn option(value: RecordId, label: &str) -> SelectOption {
        SelectOption {
            value,
            label: label.to_string(),
        }
    }

    #[tokio::test]
    async fn keystroke_burst_issues_one_lookup() {
        let server = MockServer::start_async().await;
        let loader: SelectLoader<Teacher> =
            SelectLoader::with_debounce(http_for(&server), Duration::from_millis(50));
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/teachers/")
                .query_param("search", "sit");
            then.status(200).json_body(teacher_page(&[(2, "Siti")]));
        });

        let early = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load("s").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let last = loader.load("sit").await.expect("lookup");

        assert_eq!(early.await.expect("join").expect("early"), Lookup::Debounced);
        assert_eq!(last, Lookup::Loaded(vec![option(2, "Siti")]));
        assert_eq!(mock.hits(), 1);
        assert_eq!(loader.options(), vec![option(2, "Siti")]);
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache() {
        let server = MockServer::start_async().await;
        let loader: SelectLoader<Teacher> =
            SelectLoader::with_debounce(http_for(&server), Duration::ZERO);
        let ahmad = server.mock(|when, then| {
            when.method(GET)
                .path("/api/teachers/")
                .query_param("search", "ahmad");
            then.status(200).json_body(teacher_page(&[(1, "Ahmad")]));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/teachers/")
                .query_param("search", "budi");
            then.status(200).json_body(teacher_page(&[(5, "Budi")]));
        });

        loader.load("ahmad").await.expect("first");
        loader.load("budi").await.expect("second");
        let again = loader.load("ahmad").await.expect("cached");
        assert_eq!(again, Lookup::Cached(vec![option(1, "Ahmad")]));
        assert_eq!(ahmad.hits(), 1);
        assert_eq!(loader.options(), vec![option(1, "Ahmad")]);

        loader.clear_cache();
        loader.load("ahmad").await.expect("refetch");
        assert_eq!(ahmad.hits(), 2);
    }

    #[tokio::test]
    async fn out_of_order_response_does_not_replace_newer_options() {
        let server = MockServer::start_async().await;
        let loader: SelectLoader<Teacher> =
            SelectLoader::with_debounce(http_for(&server), Duration::ZERO);
        server.mock(|when, then| {
            when.method(GET).path("/api/teachers/").query_param("search", "a");
            then.status(200)
                .delay(Duration::from_millis(300))
                .json_body(teacher_page(&[(1, "Ahmad")]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/teachers/").query_param("search", "b");
            then.status(200).json_body(teacher_page(&[(5, "Budi")]));
        });

        let slow = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load("a").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let fast = loader.load("b").await.expect("fast");

        assert_eq!(fast, Lookup::Loaded(vec![option(5, "Budi")]));
        assert_eq!(slow.await.expect("join").expect("slow"), Lookup::Stale);
        assert_eq!(loader.options(), vec![option(5, "Budi")]);
    }

    #[tokio::test]
    async fn custom_formatter_and_empty_query() {
        let server = MockServer::start_async().await;
        let loader = SelectLoader::new(
            http_for(&server),
            "api/teachers/",
            |teacher: &Teacher| SelectOption {
                value: teacher.id,
                label: format!("{} ({})", teacher.teacher_name, teacher.niy.unwrap_or_default()),
            },
            Duration::ZERO,
        );
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api/teachers/");
            then.status(200).json_body(json!([sample_teacher(3, "Citra")]));
        });

        let lookup = loader.load("  ").await.expect("lookup");
        mock.assert();
        assert_eq!(lookup, Lookup::Loaded(vec![option(3, "Citra (10003)")]));
    }

    #[tokio::test]
    async fn failed_lookup_keeps_displayed_options() {
        let server = MockServer::start_async().await;
        let loader: SelectLoader<Teacher> =
            SelectLoader::with_debounce(http_for(&server), Duration::ZERO);
        server.mock(|when, then| {
            when.method(GET).path("/api/teachers/").query_param("search", "ok");
            then.status(200).json_body(teacher_page(&[(1, "Ahmad")]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/teachers/").query_param("search", "boom");
            then.status(500).body("");
        });

        loader.load("ok").await.expect("ok");
        let err = loader.load("boom").await.expect_err("500");
        assert_eq!(err.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(loader.options(), vec![option(1, "Ahmad")]);
    }

    #[tokio::test]
    async fn option_for_resolves_selected_value() {
        let server = MockServer::start_async().await;
        let loader: SelectLoader<Teacher> = SelectLoader::for_record(http_for(&server));
        server.mock(|when, then| {
            when.method(GET).path("/api/teachers/8/");
            then.status(200).json_body(sample_teacher(8, "Hadi"));
        });

        let selected = loader.option_for(8).await.expect("option");
        assert_eq!(selected, option(8, "Hadi"));
    }
}
