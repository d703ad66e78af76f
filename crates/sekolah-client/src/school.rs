//! One [`Resource`] per backend entity, all sharing a single [`HttpClient`].

use std::ops::Deref;
use std::sync::Arc;

use reqwest::Method;
use sekolah_api_models::{
    Achievement, Comment, Notification, OlympiadReport, Post, Record, RecordId, Schedule,
    SchoolClass, Student, Teacher,
};

use crate::auth::AuthService;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::form::FormFields;
use crate::forms::ScheduleForm;
use crate::http::{HttpClient, RequestBody};
use crate::resource::{Fetch, ListQuery, Resource, ResourceConfig};
use crate::select::SelectLoader;
use crate::session::{FileTokenStorage, MemoryTokenStorage, Session, TokenStorage};

/// Notifications with read-state actions.
#[derive(Debug, Clone)]
pub struct Notifications(Resource<Notification>);

impl Deref for Notifications {
    type Target = Resource<Notification>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Notifications {
    /// Mark notification `id` as read.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError`] when the backend refuses.
    pub async fn mark_read(&self, id: RecordId) -> ClientResult<()> {
        self.0
            .item_action(id, Method::POST, "mark-read", RequestBody::Empty)
            .await
            .map(|_| ())
    }

    /// Mark every notification as read.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError`] when the backend refuses.
    pub async fn mark_all_read(&self) -> ClientResult<()> {
        self.0
            .collection_action(Method::POST, "mark-all-read", RequestBody::Empty)
            .await
            .map(|_| ())
    }

    /// List unread notifications only.
    ///
    /// # Errors
    ///
    /// See [`Resource::list`].
    pub async fn unread(&self) -> ClientResult<Fetch> {
        self.0
            .query(ListQuery::new().with_filter("is_read", false))
            .await
    }
}

/// Schedules with bulk entry.
#[derive(Debug, Clone)]
pub struct Schedules(Resource<Schedule>);

impl Deref for Schedules {
    type Target = Resource<Schedule>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Schedules {
    /// Validate every form, then create them in one call.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Precondition`] naming the first invalid
    /// row before anything is sent, or the backend's error.
    pub async fn batch_create(&self, forms: &[ScheduleForm]) -> ClientResult<Vec<Schedule>> {
        let mut payloads = Vec::with_capacity(forms.len());
        for (index, form) in forms.iter().enumerate() {
            let payload = form.to_payload();
            payload
                .require(ScheduleForm::REQUIRED)
                .and_then(|()| form.validate())
                .map_err(|err| {
                    ClientError::precondition(format!(
                        "row {}: {}",
                        index + 1,
                        err.user_message()
                    ))
                })?;
            payloads.push(payload);
        }
        self.0.batch_create(payloads).await
    }

    /// List the timetable of class `class_id`.
    ///
    /// # Errors
    ///
    /// See [`Resource::list`].
    pub async fn for_class(&self, class_id: RecordId) -> ClientResult<Fetch> {
        self.0
            .query(ListQuery::new().with_filter("class_id", class_id))
            .await
    }
}

/// Post comments, usually viewed per post.
#[derive(Debug, Clone)]
pub struct Comments(Resource<Comment>);

impl Deref for Comments {
    type Target = Resource<Comment>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Comments {
    /// List the comments of post `post_id`.
    ///
    /// # Errors
    ///
    /// See [`Resource::list`].
    pub async fn for_post(&self, post_id: RecordId) -> ClientResult<Fetch> {
        self.0
            .query(ListQuery::new().with_filter("post", post_id))
            .await
    }
}

/// Entry point bundling every entity of the administration API.
#[derive(Debug, Clone)]
pub struct SchoolApi {
    http: HttpClient,
    config: ClientConfig,
    /// Students.
    pub students: Resource<Student>,
    /// Teachers.
    pub teachers: Resource<Teacher>,
    /// Classes.
    pub classes: Resource<SchoolClass>,
    /// Timetable entries.
    pub schedules: Schedules,
    /// Student achievements.
    pub achievements: Resource<Achievement>,
    /// Olympiad participation reports.
    pub olympiad_reports: Resource<OlympiadReport>,
    /// Admin notifications.
    pub notifications: Notifications,
    /// Blog posts.
    pub posts: Resource<Post>,
    /// Post comments.
    pub comments: Comments,
}

impl SchoolApi {
    /// Restore the persisted session (when `config.token_path` is set) and
    /// build every resource.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError`] when stored tokens cannot be read or the
    /// HTTP client cannot be built.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        let storage: Arc<dyn TokenStorage> = match &config.token_path {
            Some(path) => Arc::new(FileTokenStorage::new(path.clone())),
            None => Arc::new(MemoryTokenStorage::new()),
        };
        let session = Session::restore(storage).await?;
        let http = HttpClient::new(&config, session)?;
        Ok(Self::with_http(http, config))
    }

    /// Build every resource over an existing client.
    #[must_use]
    pub fn with_http(http: HttpClient, config: ClientConfig) -> Self {
        Self {
            students: resource(&http, &config),
            teachers: resource(&http, &config),
            classes: resource(&http, &config),
            schedules: Schedules(resource(&http, &config)),
            achievements: resource(&http, &config),
            olympiad_reports: resource(&http, &config),
            notifications: Notifications(resource(&http, &config)),
            posts: resource(&http, &config),
            comments: Comments(resource(&http, &config)),
            http,
            config,
        }
    }

    /// Shared transport.
    #[must_use]
    pub const fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Shared session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        self.http.session()
    }

    /// Configuration the API was built from.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Credential flows over the shared session.
    #[must_use]
    pub fn auth(&self) -> AuthService {
        AuthService::with_social_auth_path(self.http.clone(), self.config.social_auth_path.clone())
    }

    /// Dropdown loader for records of type `T`.
    #[must_use]
    pub fn select<T: Record>(&self) -> SelectLoader<T> {
        SelectLoader::with_debounce(self.http.clone(), self.config.select_debounce)
    }
}

fn resource<T: Record>(http: &HttpClient, config: &ClientConfig) -> Resource<T> {
    Resource::new(
        http.clone(),
        ResourceConfig::for_record::<T>().with_search_debounce(config.search_debounce),
    )
}
