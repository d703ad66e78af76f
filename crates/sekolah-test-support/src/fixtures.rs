//! JSON bodies served by mock backends in integration tests.

use serde_json::{Value, json};

/// Pagination envelope around `results`.
#[must_use]
pub fn page(results: Vec<Value>, next: Option<&str>, previous: Option<&str>) -> Value {
    json!({
        "count": results.len(),
        "next": next,
        "previous": previous,
        "results": results,
    })
}

/// Teacher record as the backend returns it.
#[must_use]
pub fn sample_teacher(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "teacher_name": name,
        "niy": 10_000 + id,
        "gender": "L",
        "subject": null,
        "email": null,
        "phone": null,
        "photo": null,
    })
}

/// Single-page teacher listing with the given `(id, name)` rows.
#[must_use]
pub fn teacher_page(rows: &[(i64, &str)]) -> Value {
    page(
        rows.iter()
            .map(|(id, name)| sample_teacher(*id, name))
            .collect(),
        None,
        None,
    )
}
