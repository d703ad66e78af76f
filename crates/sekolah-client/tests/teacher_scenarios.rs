use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use sekolah_api_models::{Gender, Record, TokenPair};
use sekolah_client::{
    ClientConfig, FormDraft, HttpClient, MemoryTokenStorage, SchoolApi, Session, TeacherForm,
};
use sekolah_test_support::{fresh_token, sample_teacher, teacher_page};
use serde_json::json;

async fn logged_in_api(server: &MockServer) -> anyhow::Result<SchoolApi> {
    let config = ClientConfig::parse(&server.base_url())?
        .with_debounce(Duration::ZERO, Duration::ZERO);
    let session = Session::anonymous(Arc::new(MemoryTokenStorage::new()));
    session
        .establish(TokenPair {
            access: fresh_token(),
            refresh: "refresh-token".into(),
        })
        .await?;
    let http = HttpClient::new(&config, session)?;
    Ok(SchoolApi::with_http(http, config))
}

#[tokio::test]
async fn created_teacher_appears_in_next_list() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let api = logged_in_api(&server).await?;
    let bearer = api.session().auth_header().unwrap_or_default();

    let mut initial = server.mock(|when, then| {
        when.method(GET).path("/api/teachers/");
        then.status(200).json_body(teacher_page(&[(1, "Ahmad")]));
    });
    api.teachers.refresh().await?;
    initial.delete();

    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/api/teachers/")
            .header("authorization", bearer.as_str())
            .header("content-type", "application/json")
            .json_body(json!({
                "teacher_name": "Budi Santoso",
                "niy": 10007,
                "gender": "L",
                "subject": "Matematika",
                "email": null,
                "phone": null
            }));
        then.status(201).json_body(sample_teacher(7, "Budi Santoso"));
    });
    let refreshed = server.mock(|when, then| {
        when.method(GET).path("/api/teachers/");
        then.status(200)
            .json_body(teacher_page(&[(1, "Ahmad"), (7, "Budi Santoso")]));
    });

    let mut draft: FormDraft<TeacherForm> = FormDraft::create();
    draft.fields = TeacherForm {
        teacher_name: "Budi Santoso".into(),
        niy: Some(10_007),
        gender: Some(Gender::L),
        subject: "Matematika".into(),
        ..TeacherForm::default()
    };
    let teachers = api.teachers.clone();
    let created = draft
        .submit(|mode, payload| async move { teachers.save(mode, payload).await })?
        .await?;

    create.assert();
    refreshed.assert();
    assert_eq!(created.id(), 7);
    let state = api.teachers.snapshot();
    assert!(state.items.iter().any(|teacher| teacher.id == 7));
    assert!(state.error.is_none());
    Ok(())
}

#[tokio::test]
async fn confirmed_delete_removes_teacher() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let api = logged_in_api(&server).await?;

    let mut before = server.mock(|when, then| {
        when.method(GET).path("/api/teachers/");
        then.status(200)
            .json_body(teacher_page(&[(1, "Ahmad"), (3, "Citra")]));
    });
    api.teachers.refresh().await?;
    before.delete();

    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/api/teachers/3/");
        then.status(204);
    });
    let after = server.mock(|when, then| {
        when.method(GET).path("/api/teachers/");
        then.status(200).json_body(teacher_page(&[(1, "Ahmad")]));
    });

    api.teachers.delete(3).await?;
    delete.assert();
    after.assert();
    let state = api.teachers.snapshot();
    assert!(state.items.iter().all(|teacher| teacher.id != 3));
    assert!(state.error.is_none());
    Ok(())
}

#[tokio::test]
async fn forbidden_delete_keeps_teacher_and_reports_error() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let api = logged_in_api(&server).await?;

    let list = server.mock(|when, then| {
        when.method(GET).path("/api/teachers/");
        then.status(200)
            .json_body(teacher_page(&[(1, "Ahmad"), (3, "Citra")]));
    });
    server.mock(|when, then| {
        when.method(DELETE).path("/api/teachers/3/");
        then.status(403)
            .header("content-type", "application/json")
            .json_body(json!({
            "detail": "You do not have permission to perform this action."
        }));
    });

    api.teachers.refresh().await?;
    let err = api
        .teachers
        .delete(3)
        .await
        .expect_err("delete should be refused");

    assert_eq!(err.status().map(|status| status.as_u16()), Some(403));
    assert_eq!(list.hits(), 1);
    let state = api.teachers.snapshot();
    assert!(state.items.iter().any(|teacher| teacher.id == 3));
    assert_eq!(
        state.error.as_deref(),
        Some("You do not have permission to perform this action.")
    );
    assert!(api.session().is_authenticated());
    Ok(())
}
