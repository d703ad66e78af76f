//! Output renderers and formatting helpers for CLI commands.

use anyhow::anyhow;
use sekolah_api_models::{
    Achievement, Comment, Notification, OlympiadReport, Page, Post, Schedule, SchoolClass,
    SelectOption, Student, Teacher,
};
use sekolah_client::{Claims, ListState};
use serde::Serialize;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

/// Table projection of a record.
pub(crate) trait TableRow {
    const HEADERS: &'static [&'static str];

    fn cells(&self) -> Vec<String>;
}

fn opt<T: ToString>(value: Option<&T>) -> String {
    value.map_or_else(|| "-".to_string(), ToString::to_string)
}

fn truncate(text: &str, max: usize) -> String {
    let single_line = text.replace(['\r', '\n'], " ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let mut cut: String = single_line.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

impl TableRow for Student {
    const HEADERS: &'static [&'static str] = &["ID", "NAME", "NISN", "GENDER", "CLASS"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.student_name.clone(),
            opt(self.nisn.as_ref()),
            opt(self.gender.map(|gender| gender.as_str()).as_ref()),
            self.class_name
                .clone()
                .or_else(|| self.class_id.map(|id| id.to_string()))
                .unwrap_or_else(|| "-".to_string()),
        ]
    }
}

impl TableRow for Teacher {
    const HEADERS: &'static [&'static str] = &["ID", "NAME", "NIY", "GENDER", "SUBJECT"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.teacher_name.clone(),
            opt(self.niy.as_ref()),
            opt(self.gender.map(|gender| gender.as_str()).as_ref()),
            opt(self.subject.as_ref()),
        ]
    }
}

impl TableRow for SchoolClass {
    const HEADERS: &'static [&'static str] = &["ID", "CLASS", "GRADE", "HOMEROOM", "YEAR"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.class_name.clone(),
            opt(self.grade.as_ref()),
            opt(self.homeroom_teacher_name.as_ref()),
            opt(self.academic_year.as_ref()),
        ]
    }
}

impl TableRow for Schedule {
    const HEADERS: &'static [&'static str] = &["ID", "DAY", "TIME", "SUBJECT", "CLASS", "TEACHER"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.day.clone(),
            format!(
                "{}-{}",
                self.start_time.format("%H:%M"),
                self.end_time.format("%H:%M")
            ),
            self.subject.clone(),
            self.class_name
                .clone()
                .unwrap_or_else(|| self.class_id.to_string()),
            self.teacher_name
                .clone()
                .unwrap_or_else(|| self.teacher_id.to_string()),
        ]
    }
}

impl TableRow for Achievement {
    const HEADERS: &'static [&'static str] = &["ID", "STUDENT", "TITLE", "LEVEL", "RANK", "DATE"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.student_name
                .clone()
                .unwrap_or_else(|| self.student_id.to_string()),
            truncate(&self.title, 40),
            opt(self.level.as_ref()),
            opt(self.rank.as_ref()),
            opt(self.achieved_on.as_ref()),
        ]
    }
}

impl TableRow for OlympiadReport {
    const HEADERS: &'static [&'static str] =
        &["ID", "STUDENT", "COMPETITION", "FIELD", "STAGE", "RESULT", "YEAR"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.student_name
                .clone()
                .unwrap_or_else(|| self.student_id.to_string()),
            truncate(&self.competition, 32),
            self.field.clone(),
            opt(self.stage.as_ref()),
            opt(self.result.as_ref()),
            opt(self.year.as_ref()),
        ]
    }
}

impl TableRow for Notification {
    const HEADERS: &'static [&'static str] = &["ID", "READ", "TITLE", "MESSAGE"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            if self.is_read { "yes" } else { "no" }.to_string(),
            truncate(&self.title, 32),
            truncate(&self.message, 48),
        ]
    }
}

impl TableRow for Post {
    const HEADERS: &'static [&'static str] = &["ID", "TITLE", "AUTHOR", "PUBLISHED"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            truncate(&self.title, 48),
            opt(self.author_name.as_ref()),
            if self.is_published { "yes" } else { "no" }.to_string(),
        ]
    }
}

impl TableRow for Comment {
    const HEADERS: &'static [&'static str] = &["ID", "POST", "NAME", "COMMENT"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.post.to_string(),
            self.name.clone(),
            truncate(&self.content, 48),
        ]
    }
}

/// Lay rows out in left-aligned columns sized to their widest cell.
pub(crate) fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|header| header.chars().count()).collect();
    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(index) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let line = |cells: &mut dyn Iterator<Item = &str>| {
        let mut out = String::new();
        for (index, cell) in cells.enumerate() {
            if index > 0 {
                out.push(' ');
            }
            let width = widths.get(index).copied().unwrap_or_default();
            out.push_str(&format!("{cell:<width$}"));
        }
        out.trim_end().to_string()
    };

    let mut lines = vec![line(&mut headers.iter().copied())];
    for row in rows {
        lines.push(line(&mut row.iter().map(String::as_str)));
    }
    lines.join("\n")
}

pub(crate) fn render_json(value: &impl Serialize) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}

pub(crate) fn render_list<T: TableRow + Serialize + Clone>(
    state: &ListState<T>,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => render_json(&Page {
            count: state.count,
            next: state.next.clone(),
            previous: state.previous.clone(),
            results: state.items.clone(),
        }),
        OutputFormat::Table => {
            let rows: Vec<Vec<String>> = state.items.iter().map(TableRow::cells).collect();
            println!("{}", format_table(T::HEADERS, &rows));
            println!("{} record(s) in total", state.count);
            if let Some(next) = &state.next {
                println!("next cursor: {next}");
            }
            if let Some(previous) = &state.previous {
                println!("previous cursor: {previous}");
            }
            Ok(())
        }
    }
}

pub(crate) fn render_record<T: TableRow + Serialize>(
    record: &T,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => render_json(record),
        OutputFormat::Table => {
            for (header, cell) in T::HEADERS.iter().zip(record.cells()) {
                println!("{}: {cell}", header.to_lowercase());
            }
            Ok(())
        }
    }
}

pub(crate) fn render_options(options: &[SelectOption], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => render_json(&options),
        OutputFormat::Table => {
            let rows: Vec<Vec<String>> = options
                .iter()
                .map(|option| vec![option.value.to_string(), option.label.clone()])
                .collect();
            println!("{}", format_table(&["VALUE", "LABEL"], &rows));
            Ok(())
        }
    }
}

pub(crate) fn render_session(claims: Option<&Claims>, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => render_json(&json!({
            "authenticated": claims.is_some(),
            "claims": claims,
        })),
        OutputFormat::Table => {
            match claims {
                None => println!("not logged in"),
                Some(claims) => {
                    println!("logged in");
                    if let Some(username) = &claims.username {
                        println!("username: {username}");
                    }
                    if let Some(user_id) = claims.user_id {
                        println!("user id: {user_id}");
                    }
                    match claims.expires_at() {
                        Some(expires) => println!("access token expires: {expires}"),
                        None => println!("access token expires: {}", claims.exp),
                    }
                }
            }
            Ok(())
        }
    }
}
