//! Form payloads and their wire encoding.
//!
//! A payload is an ordered list of named fields. It encodes as a JSON object
//! unless at least one field carries a file, in which case the whole payload
//! goes out as `multipart/form-data` with the files attached as binary parts.

use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use reqwest::multipart::{Form, Part};
use sekolah_api_models::{Gender, Record, RecordId};
use serde_json::{Map, Number, Value};

use crate::error::{ClientError, ClientResult};
use crate::http::RequestBody;

/// Binary file attached to a form.
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    /// File name sent with the part.
    pub file_name: String,
    /// MIME type of the content.
    pub content_type: String,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Upload {
    /// Upload from in-memory bytes.
    #[must_use]
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read `path`, guessing the content type from its extension.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Upload`] when the file cannot be read.
    pub async fn from_path(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::Upload {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        let content_type = guess_content_type(&file_name).to_string();
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }
}

/// Guess a MIME type from a file name's extension.
#[must_use]
pub fn guess_content_type(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "csv" => "text/csv",
        "json" => "application/json",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// Value of one form field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Explicit null (cleared relation, empty optional).
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Integer, including foreign keys.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Free text.
    Text(String),
    /// Nested JSON (arrays, objects).
    Json(Value),
    /// Binary upload; forces multipart encoding.
    File(Upload),
}

impl FieldValue {
    /// Whether the value counts as "not filled in".
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.trim().is_empty(),
            Self::Bool(_) | Self::Integer(_) | Self::Float(_) | Self::Json(_) | Self::File(_) => {
                false
            }
        }
    }

    fn to_json(&self) -> Option<Value> {
        match self {
            Self::Null => Some(Value::Null),
            Self::Bool(flag) => Some(Value::Bool(*flag)),
            Self::Integer(number) => Some(Value::from(*number)),
            Self::Float(number) => {
                Some(Number::from_f64(*number).map_or(Value::Null, Value::Number))
            }
            Self::Text(text) => Some(Value::String(text.clone())),
            Self::Json(value) => Some(value.clone()),
            Self::File(_) => None,
        }
    }

    fn to_text(&self) -> Option<String> {
        match self {
            Self::Null | Self::File(_) => None,
            Self::Bool(flag) => Some(flag.to_string()),
            Self::Integer(number) => Some(number.to_string()),
            Self::Float(number) => Some(number.to_string()),
            Self::Text(text) => Some(text.clone()),
            Self::Json(value) => Some(value.to_string()),
        }
    }

    /// Interpret a JSON value as a field.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => number
                .as_i64()
                .map(Self::Integer)
                .or_else(|| number.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            Value::String(text) => Self::Text(text),
            other @ (Value::Array(_) | Value::Object(_)) => Self::Json(other),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u8> for FieldValue {
    fn from(value: u8) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Gender> for FieldValue {
    fn from(value: Gender) -> Self {
        Self::Text(value.as_str().to_string())
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Text(value.format("%Y-%m-%d").to_string())
    }
}

impl From<NaiveTime> for FieldValue {
    fn from(value: NaiveTime) -> Self {
        Self::Text(value.format("%H:%M:%S").to_string())
    }
}

impl From<Upload> for FieldValue {
    fn from(value: Upload) -> Self {
        Self::File(value)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::from_json(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Ordered set of named form fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormPayload {
    fields: Vec<(String, FieldValue)>,
}

impl FormPayload {
    /// Empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`FormPayload::set`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set `name`, replacing an existing value in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    /// Set `name` only when `value` is present.
    pub fn set_opt(&mut self, name: impl Into<String>, value: Option<impl Into<FieldValue>>) {
        if let Some(value) = value {
            self.set(name, value);
        }
    }

    /// Value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether any field carries a file.
    #[must_use]
    pub fn has_file(&self) -> bool {
        self.fields
            .iter()
            .any(|(_, value)| matches!(value, FieldValue::File(_)))
    }

    /// Check that every name in `required` is present and not blank.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Precondition`] naming every missing field.
    pub fn require(&self, required: &[&str]) -> ClientResult<()> {
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|name| self.get(name).is_none_or(FieldValue::is_blank))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ClientError::precondition(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )))
        }
    }

    /// Build a payload from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Precondition`] when `value` is not an object.
    pub fn from_json(value: Value) -> ClientResult<Self> {
        let Value::Object(map) = value else {
            return Err(ClientError::precondition(
                "form payload must be a JSON object",
            ));
        };
        let mut payload = Self::new();
        for (name, value) in map {
            payload.set(name, FieldValue::from_json(value));
        }
        Ok(payload)
    }

    /// JSON object view of the payload; file fields are left out.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .filter_map(|(name, value)| value.to_json().map(|json| (name.clone(), json)))
            .collect();
        Value::Object(map)
    }

    /// Choose the wire encoding: multipart when a file is present, JSON
    /// otherwise.
    #[must_use]
    pub fn encode(self) -> RequestBody {
        if self.has_file() {
            RequestBody::Multipart(self)
        } else {
            RequestBody::Json(self.to_json())
        }
    }

    /// Convert into a multipart form. Nulls are omitted; scalars become text
    /// parts.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Precondition`] when an upload declares an
    /// unparseable content type.
    pub(crate) fn into_multipart(self) -> ClientResult<Form> {
        let mut form = Form::new();
        for (name, value) in self.fields {
            if let FieldValue::File(upload) = value {
                let content_type = upload.content_type.clone();
                let part = Part::bytes(upload.bytes)
                    .file_name(upload.file_name)
                    .mime_str(&content_type)
                    .map_err(|_| {
                        ClientError::precondition(format!(
                            "invalid content type '{content_type}' for field '{name}'"
                        ))
                    })?;
                form = form.part(name, part);
            } else if let Some(text) = value.to_text() {
                form = form.text(name, text);
            }
        }
        Ok(form)
    }
}

/// Whether a form creates a record or edits an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    /// New record.
    Create,
    /// Existing record with this id.
    Edit(RecordId),
}

/// Typed draft of one entity's form.
pub trait FormFields: Clone + Send + Sync {
    /// Record the form edits.
    type Record: Record;

    /// Fields that must be filled before submission.
    const REQUIRED: &'static [&'static str];

    /// Blank draft for `None`, prefilled draft for an existing record.
    fn from_record(record: Option<&Self::Record>) -> Self;

    /// Wire payload of the draft.
    fn to_payload(&self) -> FormPayload;

    /// Cross-field checks beyond required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Precondition`] describing the problem.
    fn validate(&self) -> ClientResult<()> {
        Ok(())
    }
}

/// A form being filled in, plus whether it creates or edits.
#[derive(Debug, Clone, PartialEq)]
pub struct FormDraft<F> {
    mode: FormMode,
    /// Editable field values.
    pub fields: F,
}

impl<F: FormFields> FormDraft<F> {
    /// Blank draft for a new record.
    #[must_use]
    pub fn create() -> Self {
        Self {
            mode: FormMode::Create,
            fields: F::from_record(None),
        }
    }

    /// Draft prefilled from `record`.
    #[must_use]
    pub fn edit(record: &F::Record) -> Self {
        Self {
            mode: FormMode::Edit(record.id()),
            fields: F::from_record(Some(record)),
        }
    }

    /// Create or edit.
    #[must_use]
    pub const fn mode(&self) -> FormMode {
        self.mode
    }

    /// Validate and hand the payload to `on_save`. No request is made here;
    /// the caller decides what saving means.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Precondition`] when a required field is blank
    /// or cross-field validation fails; `on_save` is not called then.
    pub fn submit<R>(&self, on_save: impl FnOnce(FormMode, FormPayload) -> R) -> ClientResult<R> {
        let payload = self.fields.to_payload();
        payload.require(F::REQUIRED)?;
        self.fields.validate()?;
        Ok(on_save(self.mode, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn teacher_payload() -> FormPayload {
        FormPayload::new()
            .with("teacher_name", "Ahmad")
            .with("niy", 12_345_i64)
            .with("gender", Gender::L)
    }

    #[test]
    fn payload_without_files_encodes_as_json() {
        match teacher_payload().encode() {
            RequestBody::Json(body) => assert_eq!(
                body,
                json!({"teacher_name": "Ahmad", "niy": 12345, "gender": "L"})
            ),
            other => panic!("expected JSON body, got {other:?}"),
        }
    }

    #[test]
    fn payload_with_file_encodes_as_multipart() {
        let payload =
            teacher_payload().with("photo", Upload::new("ahmad.jpg", "image/jpeg", vec![1, 2, 3]));
        assert!(payload.has_file());
        assert!(matches!(payload.encode(), RequestBody::Multipart(_)));
    }

    #[test]
    fn multipart_conversion_accepts_scalars_and_files() {
        let payload = teacher_payload()
            .with("is_active", true)
            .with("email", Option::<String>::None)
            .with("photo", Upload::new("ahmad.png", "image/png", vec![0_u8; 8]));
        let form = payload.into_multipart().expect("multipart form");
        assert!(form.boundary().len() > 8);
    }

    #[test]
    fn multipart_conversion_rejects_bad_content_type() {
        let payload = FormPayload::new().with("photo", Upload::new("x", "not a mime", vec![1]));
        let err = payload.into_multipart().expect_err("bad mime");
        assert!(err.user_message().contains("photo"));
    }

    #[test]
    fn set_replaces_in_place_and_keeps_order() {
        let mut payload = teacher_payload();
        payload.set("niy", 54_321_i64);
        payload.set_opt("subject", Some("Fisika"));
        payload.set_opt("phone", Option::<String>::None);
        let names: Vec<&str> = payload.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["teacher_name", "niy", "gender", "subject"]);
        assert_eq!(payload.get("niy"), Some(&FieldValue::Integer(54_321)));
        assert_eq!(payload.len(), 4);
    }

    #[test]
    fn require_reports_missing_and_blank_fields() {
        let payload = FormPayload::new()
            .with("teacher_name", "  ")
            .with("niy", Option::<i64>::None);
        let err = payload
            .require(&["teacher_name", "niy", "gender"])
            .expect_err("missing fields");
        assert_eq!(
            err.user_message(),
            "missing required field(s): teacher_name, niy, gender"
        );
        assert!(teacher_payload().require(&["teacher_name", "niy"]).is_ok());
    }

    #[test]
    fn from_json_maps_value_kinds() {
        let payload = FormPayload::from_json(json!({
            "title": "Rapat",
            "count": 3,
            "ratio": 0.5,
            "is_read": false,
            "tags": ["a", "b"],
            "link": null
        }))
        .expect("object payload");
        assert_eq!(payload.get("count"), Some(&FieldValue::Integer(3)));
        assert_eq!(payload.get("ratio"), Some(&FieldValue::Float(0.5)));
        assert_eq!(payload.get("tags"), Some(&FieldValue::Json(json!(["a", "b"]))));
        assert_eq!(payload.get("link"), Some(&FieldValue::Null));
        assert!(FormPayload::from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn dates_and_times_use_backend_formats() {
        let payload = FormPayload::new()
            .with("birth_date", NaiveDate::from_ymd_opt(2011, 4, 2).expect("date"))
            .with("start_time", NaiveTime::from_hms_opt(7, 30, 0).expect("time"));
        assert_eq!(
            payload.to_json(),
            json!({"birth_date": "2011-04-02", "start_time": "07:30:00"})
        );
    }

    #[test]
    fn content_type_guess_covers_common_uploads() {
        assert_eq!(guess_content_type("foto.JPG"), "image/jpeg");
        assert_eq!(guess_content_type("sertifikat.pdf"), "application/pdf");
        assert_eq!(guess_content_type("siswa.xlsx").len(), 65);
        assert_eq!(guess_content_type("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn upload_from_path_reads_bytes_and_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("foto.png");
        std::fs::write(&path, [9_u8, 8, 7]).expect("write");
        let upload = Upload::from_path(&path).await.expect("upload");
        assert_eq!(upload.file_name, "foto.png");
        assert_eq!(upload.content_type, "image/png");
        assert_eq!(upload.bytes, vec![9, 8, 7]);

        let missing = Upload::from_path(dir.path().join("missing.png")).await;
        assert!(matches!(missing, Err(ClientError::Upload { .. })));
    }
}
