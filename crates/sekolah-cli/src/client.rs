//! Shared context, error types, and argument parsers for the CLI.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use anyhow::anyhow;
use reqwest::StatusCode;
use sekolah_client::{ClientError, FieldValue, SchoolApi};
use url::Url;

use crate::cli::OutputFormat;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<ClientError> for CliError {
    fn from(error: ClientError) -> Self {
        let message = error.user_message();
        match &error {
            ClientError::Precondition(_) => Self::validation(message),
            ClientError::Api { status, .. }
                if matches!(
                    *status,
                    StatusCode::BAD_REQUEST
                        | StatusCode::CONFLICT
                        | StatusCode::UNPROCESSABLE_ENTITY
                ) =>
            {
                Self::validation(message)
            }
            ClientError::Api { status, .. } if *status == StatusCode::UNAUTHORIZED => {
                Self::failure(anyhow!("{message} (run `sekolah login` first)"))
            }
            ClientError::Api { status, .. } => {
                Self::failure(anyhow!("{message} (status {})", status.as_u16()))
            }
            ClientError::Unauthorized => Self::failure(anyhow!(message)),
            _ => Self::failure(anyhow::Error::new(error).context(message)),
        }
    }
}

/// Application context passed to command handlers.
#[derive(Clone)]
pub(crate) struct AppContext {
    pub(crate) api: SchoolApi,
    pub(crate) output: OutputFormat,
}

/// Parse the API URL provided to the CLI.
pub(crate) fn parse_url(input: &str) -> Result<Url, String> {
    sekolah_client::config::parse_base_url(input).map_err(|err| err.to_string())
}

/// Parse a `key=value` pair.
pub(crate) fn parse_key_value(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{input}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing field name in '{input}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parse a `field=path` attachment.
pub(crate) fn parse_attachment(input: &str) -> Result<(String, PathBuf), String> {
    let (key, path) = parse_key_value(input)?;
    if path.trim().is_empty() {
        return Err(format!("missing file path in '{input}'"));
    }
    Ok((key, PathBuf::from(path)))
}

/// Interpret a `--set` value. Only `null` is special; everything else is sent
/// as text and coerced by the backend serializer, so identifiers such as a
/// NISN keep their leading zeros.
pub(crate) fn field_value(raw: &str) -> FieldValue {
    if raw == "null" {
        FieldValue::Null
    } else {
        FieldValue::Text(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sekolah_client::ErrorBody;
    use serde_json::json;

    #[test]
    fn parse_url_normalises_and_rejects() {
        let url = parse_url("http://127.0.0.1:8000/backend").expect("valid URL");
        assert_eq!(url.as_str(), "http://127.0.0.1:8000/backend/");
        assert!(parse_url("not a url").is_err());
        assert!(parse_url("ftp://example.com").is_err());
    }

    #[test]
    fn key_value_parsing() {
        assert_eq!(
            parse_key_value("gender=L").expect("pair"),
            ("gender".to_string(), "L".to_string())
        );
        assert_eq!(
            parse_key_value("address=Jl. Merdeka=1").expect("pair"),
            ("address".to_string(), "Jl. Merdeka=1".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
        assert!(parse_attachment("photo=").is_err());
        assert_eq!(
            parse_attachment("photo=/tmp/a.jpg").expect("attachment").1,
            PathBuf::from("/tmp/a.jpg")
        );
    }

    #[test]
    fn field_values_keep_text_verbatim() {
        assert_eq!(field_value("null"), FieldValue::Null);
        assert_eq!(
            field_value("0051234567"),
            FieldValue::Text("0051234567".into())
        );
        assert_eq!(field_value("7A"), FieldValue::Text("7A".into()));
    }

    #[test]
    fn client_errors_map_to_exit_codes() {
        let validation: CliError = ClientError::Api {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::Json(json!({"nisn": ["This field is required."]})),
        }
        .into();
        assert_eq!(validation.exit_code(), 2);
        assert_eq!(validation.display_message(), "nisn: This field is required.");

        let forbidden: CliError = ClientError::Api {
            status: StatusCode::FORBIDDEN,
            body: ErrorBody::Json(json!({"detail": "Forbidden"})),
        }
        .into();
        assert_eq!(forbidden.exit_code(), 3);
        assert_eq!(forbidden.display_message(), "Forbidden (status 403)");

        let expired: CliError = ClientError::Unauthorized.into();
        assert_eq!(expired.exit_code(), 3);
        assert!(expired.display_message().contains("log in again"));

        let local: CliError = ClientError::precondition("already on the last page").into();
        assert_eq!(local.exit_code(), 2);
    }
}
