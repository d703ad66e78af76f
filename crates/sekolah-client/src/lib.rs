#![forbid(unsafe_code)]
#![warn(
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Typed data-access layer for the Sekolah administration API.
//!
//! Layout: `config.rs` (environment-driven settings), `error.rs`
//! (`ClientError` and message mapping), `http.rs` (authenticated transport),
//! `session.rs` (token state and persistence), `auth.rs` (login flows),
//! `debounce.rs`, `resource.rs` (generic list/CRUD hook), `select.rs`
//! (dropdown loader), `form.rs` / `forms.rs` (payload encoding and entity
//! forms), `school.rs` (one resource per entity).

pub mod auth;
pub mod config;
pub mod debounce;
pub mod error;
pub mod form;
pub mod forms;
pub mod http;
pub mod resource;
pub mod school;
pub mod select;
pub mod session;

pub use auth::AuthService;
pub use config::{ClientConfig, ConfigError};
pub use debounce::Debouncer;
pub use error::{ClientError, ClientResult, ErrorBody, default_error_message};
pub use form::{FieldValue, FormDraft, FormFields, FormMode, FormPayload, Upload};
pub use forms::{
    AchievementForm, ClassForm, CommentForm, NotificationForm, OlympiadReportForm, PostForm,
    ScheduleForm, StudentForm, TeacherForm,
};
pub use http::{HttpClient, RequestBody};
pub use resource::{Fetch, ListQuery, ListRequest, ListState, Resource, ResourceConfig};
pub use school::{Comments, Notifications, SchoolApi, Schedules};
pub use select::{Lookup, SelectLoader};
pub use session::{
    Claims, FileTokenStorage, InvalidationReason, MemoryTokenStorage, Session, SessionState,
    TokenStorage,
};
