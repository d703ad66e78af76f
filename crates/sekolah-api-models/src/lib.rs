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
//! Shared HTTP DTOs for the Sekolah administration API.
//!
//! The backend owns validation and persistence; these types only describe the
//! JSON it exchanges so the client and CLI encode and decode the same shapes.
//! Every collection is addressed through [`Record::ENDPOINT`], relative to the
//! configured API base URL.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend primary key type.
pub type RecordId = i64;

/// Pagination envelope returned by every paginated collection endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    /// Total number of records matching the query across all pages.
    pub count: u64,
    #[serde(default)]
    /// Absolute URL of the next page, when one exists.
    pub next: Option<String>,
    #[serde(default)]
    /// Absolute URL of the previous page, when one exists.
    pub previous: Option<String>,
    /// Records on this page.
    pub results: Vec<T>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: Vec::new(),
        }
    }
}

/// Collection body as returned by the backend: paginated or a bare array.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Listing<T> {
    /// `{count, next, previous, results}` envelope.
    Paginated(Page<T>),
    /// Unpaginated endpoints return the records directly.
    Plain(Vec<T>),
}

impl<T> Listing<T> {
    /// Normalise the listing into a page envelope.
    #[must_use]
    pub fn into_page(self) -> Page<T> {
        match self {
            Self::Paginated(page) => page,
            Self::Plain(results) => Page {
                count: u64::try_from(results.len()).unwrap_or(u64::MAX),
                next: None,
                previous: None,
                results,
            },
        }
    }
}

/// Access/refresh token pair issued by `POST api/token/`.
///
/// This is also the only client-side state persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    /// Short-lived bearer token.
    pub access: String,
    /// Long-lived refresh token.
    pub refresh: String,
}

/// Credential login body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenRequest {
    /// Account username.
    pub username: String,
    /// Account password.
    pub password: String,
}

/// Body of `POST api/token/refresh/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenRefreshRequest {
    /// Refresh token to exchange.
    pub refresh: String,
}

/// Response of `POST api/token/refresh/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenRefreshResponse {
    /// Newly issued access token.
    pub access: String,
    #[serde(default)]
    /// Rotated refresh token, when the backend rotates them.
    pub refresh: Option<String>,
}

/// Value/label pair feeding a searchable dropdown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectOption {
    /// Primary key submitted with the form.
    pub value: RecordId,
    /// Text shown to the operator.
    pub label: String,
}

/// A backend record addressable through a collection endpoint.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection path relative to the API base URL, with a trailing slash.
    const ENDPOINT: &'static str;

    /// Primary key of the record.
    fn id(&self) -> RecordId;

    /// Short human-readable label.
    fn label(&self) -> String;

    /// Default dropdown mapping for relational fields.
    fn to_option(&self) -> SelectOption {
        SelectOption {
            value: self.id(),
            label: self.label(),
        }
    }
}

/// Gender codes used by the backend (`L` laki-laki, `P` perempuan).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Gender {
    /// Male.
    L,
    /// Female.
    P,
}

impl Gender {
    /// Wire code for the gender.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::L => "L",
            Self::P => "P",
        }
    }
}

/// Student record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Student {
    /// Primary key.
    pub id: RecordId,
    /// Full name.
    pub student_name: String,
    #[serde(default)]
    /// National student number.
    pub nisn: Option<String>,
    #[serde(default)]
    /// School-local student number.
    pub nis: Option<String>,
    #[serde(default)]
    /// Gender code.
    pub gender: Option<Gender>,
    #[serde(default)]
    /// Class the student belongs to.
    pub class_id: Option<RecordId>,
    #[serde(default)]
    /// Read-only class name resolved by the backend.
    pub class_name: Option<String>,
    #[serde(default)]
    /// Place of birth.
    pub birth_place: Option<String>,
    #[serde(default)]
    /// Date of birth.
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    /// Home address.
    pub address: Option<String>,
    #[serde(default)]
    /// URL of the uploaded photo.
    pub photo: Option<String>,
}

impl Record for Student {
    const ENDPOINT: &'static str = "api/students/";

    fn id(&self) -> RecordId {
        self.id
    }

    fn label(&self) -> String {
        match &self.nisn {
            Some(nisn) if !nisn.is_empty() => format!("{} ({nisn})", self.student_name),
            _ => self.student_name.clone(),
        }
    }
}

/// Teacher record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Teacher {
    /// Primary key.
    pub id: RecordId,
    /// Full name.
    pub teacher_name: String,
    #[serde(default)]
    /// Foundation staff number (nomor induk yayasan).
    pub niy: Option<i64>,
    #[serde(default)]
    /// Gender code.
    pub gender: Option<Gender>,
    #[serde(default)]
    /// Main subject taught.
    pub subject: Option<String>,
    #[serde(default)]
    /// Contact e-mail.
    pub email: Option<String>,
    #[serde(default)]
    /// Contact phone number.
    pub phone: Option<String>,
    #[serde(default)]
    /// URL of the uploaded photo.
    pub photo: Option<String>,
}

impl Record for Teacher {
    const ENDPOINT: &'static str = "api/teachers/";

    fn id(&self) -> RecordId {
        self.id
    }

    fn label(&self) -> String {
        self.teacher_name.clone()
    }
}

/// Class (rombongan belajar) record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchoolClass {
    /// Primary key.
    pub id: RecordId,
    /// Display name, e.g. `VII-A`.
    pub class_name: String,
    #[serde(default)]
    /// Grade level.
    pub grade: Option<u8>,
    #[serde(default)]
    /// Homeroom teacher.
    pub homeroom_teacher_id: Option<RecordId>,
    #[serde(default)]
    /// Read-only homeroom teacher name.
    pub homeroom_teacher_name: Option<String>,
    #[serde(default)]
    /// Academic year, e.g. `2025/2026`.
    pub academic_year: Option<String>,
}

impl Record for SchoolClass {
    const ENDPOINT: &'static str = "api/classes/";

    fn id(&self) -> RecordId {
        self.id
    }

    fn label(&self) -> String {
        self.class_name.clone()
    }
}

/// Weekly timetable slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    /// Primary key.
    pub id: RecordId,
    /// Class attending the slot.
    pub class_id: RecordId,
    /// Teacher giving the lesson.
    pub teacher_id: RecordId,
    /// Subject name.
    pub subject: String,
    /// Day of the week as used by the backend (`Senin`, `Selasa`, ...).
    pub day: String,
    /// Lesson start time.
    pub start_time: NaiveTime,
    /// Lesson end time.
    pub end_time: NaiveTime,
    #[serde(default)]
    /// Read-only class name.
    pub class_name: Option<String>,
    #[serde(default)]
    /// Read-only teacher name.
    pub teacher_name: Option<String>,
}

impl Record for Schedule {
    const ENDPOINT: &'static str = "api/schedules/";

    fn id(&self) -> RecordId {
        self.id
    }

    fn label(&self) -> String {
        format!(
            "{} {} {}-{}",
            self.subject,
            self.day,
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

/// Student achievement (prestasi).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Achievement {
    /// Primary key.
    pub id: RecordId,
    /// Student who earned the achievement.
    pub student_id: RecordId,
    #[serde(default)]
    /// Read-only student name.
    pub student_name: Option<String>,
    /// Achievement title.
    pub title: String,
    #[serde(default)]
    /// Competition level (school, district, national, ...).
    pub level: Option<String>,
    #[serde(default)]
    /// Rank or medal obtained.
    pub rank: Option<String>,
    #[serde(default)]
    /// Date the achievement was awarded.
    pub achieved_on: Option<NaiveDate>,
    #[serde(default)]
    /// Free-form description.
    pub description: Option<String>,
    #[serde(default)]
    /// URL of the uploaded certificate.
    pub certificate: Option<String>,
}

impl Record for Achievement {
    const ENDPOINT: &'static str = "api/achievements/";

    fn id(&self) -> RecordId {
        self.id
    }

    fn label(&self) -> String {
        self.title.clone()
    }
}

/// Olympiad participation report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OlympiadReport {
    /// Primary key.
    pub id: RecordId,
    /// Participating student.
    pub student_id: RecordId,
    #[serde(default)]
    /// Read-only student name.
    pub student_name: Option<String>,
    /// Competition name.
    pub competition: String,
    /// Olympiad field, e.g. mathematics.
    pub field: String,
    #[serde(default)]
    /// Stage reached (district, province, national).
    pub stage: Option<String>,
    #[serde(default)]
    /// Result or medal.
    pub result: Option<String>,
    #[serde(default)]
    /// Competition year.
    pub year: Option<i32>,
    #[serde(default)]
    /// URL of the uploaded certificate.
    pub certificate: Option<String>,
}

impl Record for OlympiadReport {
    const ENDPOINT: &'static str = "api/olympiad-reports/";

    fn id(&self) -> RecordId {
        self.id
    }

    fn label(&self) -> String {
        format!("{} ({})", self.competition, self.field)
    }
}

/// Operator notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    /// Primary key.
    pub id: RecordId,
    /// Headline.
    pub title: String,
    #[serde(default)]
    /// Body text.
    pub message: String,
    #[serde(default)]
    /// Whether the notification was acknowledged.
    pub is_read: bool,
    #[serde(default)]
    /// Optional deep link into the admin.
    pub link: Option<String>,
    #[serde(default)]
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Notification {
    const ENDPOINT: &'static str = "api/notifications/";

    fn id(&self) -> RecordId {
        self.id
    }

    fn label(&self) -> String {
        self.title.clone()
    }
}

/// News/blog post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    /// Primary key.
    pub id: RecordId,
    /// Headline.
    pub title: String,
    #[serde(default)]
    /// URL slug.
    pub slug: Option<String>,
    #[serde(default)]
    /// Body markup as stored by the editor.
    pub content: String,
    #[serde(default)]
    /// URL of the cover image.
    pub image: Option<String>,
    #[serde(default)]
    /// Read-only author display name.
    pub author_name: Option<String>,
    #[serde(default)]
    /// Whether the post is visible publicly.
    pub is_published: bool,
    #[serde(default)]
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Post {
    const ENDPOINT: &'static str = "api/posts/";

    fn id(&self) -> RecordId {
        self.id
    }

    fn label(&self) -> String {
        self.title.clone()
    }
}

/// Reader comment on a post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    /// Primary key.
    pub id: RecordId,
    /// Post the comment belongs to.
    pub post: RecordId,
    /// Commenter display name.
    pub name: String,
    #[serde(default)]
    /// Comment text.
    pub content: String,
    #[serde(default)]
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Comment {
    const ENDPOINT: &'static str = "api/comments/";

    fn id(&self) -> RecordId {
        self.id
    }

    fn label(&self) -> String {
        const PREVIEW_CHARS: usize = 40;
        let preview: String = self.content.chars().take(PREVIEW_CHARS).collect();
        if preview.is_empty() {
            self.name.clone()
        } else {
            format!("{}: {preview}", self.name)
        }
    }
}

/// Flatten a backend error document into one human-readable line.
///
/// Handles the common shapes: `{"detail": ".."}`, field maps such as
/// `{"niy": ["already exists"]}`, `non_field_errors`, nested objects and bare
/// strings or arrays. Returns `None` when nothing readable is found.
#[must_use]
pub fn flatten_error_body(body: &Value) -> Option<String> {
    let mut parts = Vec::new();
    collect_messages(None, body, &mut parts);
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn collect_messages(field: Option<&str>, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(message) => {
            let message = message.trim();
            if message.is_empty() {
                return;
            }
            match field {
                Some(name) if !is_generic_field(name) => out.push(format!("{name}: {message}")),
                _ => out.push(message.to_string()),
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_messages(field, item, out);
            }
        }
        Value::Object(map) => {
            let ordered: BTreeMap<&String, &Value> = map.iter().collect();
            // `detail` first so the headline message leads.
            if let Some(detail) = map.get("detail") {
                collect_messages(Some("detail"), detail, out);
            }
            for (name, nested) in ordered {
                if name == "detail" {
                    continue;
                }
                let qualified = match field {
                    Some(parent) if !is_generic_field(parent) => format!("{parent}.{name}"),
                    _ => name.clone(),
                };
                collect_messages(Some(qualified.as_str()), nested, out);
            }
        }
        Value::Number(number) => out.push(number.to_string()),
        Value::Bool(_) | Value::Null => {}
    }
}

fn is_generic_field(name: &str) -> bool {
    matches!(name, "detail" | "non_field_errors" | "message" | "error")
}
