use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, anyhow};
use sekolah_api_models::{Record, RecordId};
use sekolah_client::{FormFields, FormPayload, ListQuery, NotificationForm, Resource, Upload};

use crate::cli::{
    ExportArgs, ListArgs, NotificationCommand, OutputFormat, ResourceCommand, WriteArgs,
};
use crate::client::{AppContext, CliError, CliResult, field_value};
use crate::output::{TableRow, render_json, render_list, render_record};

/// Run one CRUD-style command against `resource`, checking `F::REQUIRED` before
/// creates and full updates.
pub(crate) async fn handle_resource<F>(
    ctx: &AppContext,
    resource: &Resource<F::Record>,
    command: ResourceCommand,
) -> CliResult<()>
where
    F: FormFields,
    F::Record: TableRow,
{
    match command {
        ResourceCommand::List(args) => {
            match args.cursor {
                Some(cursor) => resource.paginate(&cursor).await?,
                None => resource.query(list_query(&args)).await?,
            };
            render_list(&resource.snapshot(), ctx.output)
        }
        ResourceCommand::Get { id } => {
            let record = resource.retrieve(id).await?;
            render_record(&record, ctx.output)
        }
        ResourceCommand::Create(write) => {
            let payload = build_payload(&write).await?;
            payload.require(F::REQUIRED)?;
            let record = resource.create(payload).await?;
            report_saved("Created", &record, ctx)
        }
        ResourceCommand::Update { id, write } => {
            let payload = build_payload(&write).await?;
            payload.require(F::REQUIRED)?;
            let record = resource.update(id, payload).await?;
            report_saved("Updated", &record, ctx)
        }
        ResourceCommand::Patch { id, write } => {
            let payload = build_payload(&write).await?;
            let record = resource.partial_update(id, payload).await?;
            report_saved("Updated", &record, ctx)
        }
        ResourceCommand::Delete { id, yes } => {
            if !yes && !confirm_delete(id)? {
                return Err(CliError::validation("deletion cancelled"));
            }
            resource.delete(id).await?;
            println!("Deleted record {id}");
            Ok(())
        }
        ResourceCommand::Export(args) => handle_export(resource, args).await,
        ResourceCommand::Import { path } => {
            let upload = Upload::from_path(&path).await?;
            match resource.import(upload).await? {
                Some(summary) => render_json(&summary),
                None => {
                    println!("Import of {} accepted", path.display());
                    Ok(())
                }
            }
        }
    }
}

pub(crate) async fn handle_notification(
    ctx: &AppContext,
    command: NotificationCommand,
) -> CliResult<()> {
    let notifications = &ctx.api.notifications;
    match command {
        NotificationCommand::Common(common) => {
            handle_resource::<NotificationForm>(ctx, notifications, common).await
        }
        NotificationCommand::MarkRead { id } => {
            notifications.mark_read(id).await?;
            println!("Notification {id} marked as read");
            Ok(())
        }
        NotificationCommand::MarkAllRead => {
            notifications.mark_all_read().await?;
            println!("All notifications marked as read");
            Ok(())
        }
    }
}

fn list_query(args: &ListArgs) -> ListQuery {
    to_query(args.search.as_deref(), &args.filters)
}

fn to_query(search: Option<&str>, filters: &[(String, String)]) -> ListQuery {
    filters.iter().fold(
        ListQuery::new().with_search(search.unwrap_or_default()),
        |query, (key, value)| query.with_filter(key.clone(), value),
    )
}

async fn handle_export<T: Record>(resource: &Resource<T>, args: ExportArgs) -> CliResult<()> {
    let query = to_query(args.search.as_deref(), &args.filters);
    let bytes = resource.export(&query).await?;
    match args.out {
        Some(path) => {
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("failed to write {}", path.display()))
                .map_err(CliError::failure)?;
            println!("Wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(&bytes)
                .and_then(|()| stdout.flush())
                .map_err(|err| CliError::failure(anyhow!("failed to write export: {err}")))?;
        }
    }
    Ok(())
}

/// Merge `--file`, `--set` and `--attach` into one payload, in that order.
pub(crate) async fn build_payload(write: &WriteArgs) -> CliResult<FormPayload> {
    let mut payload = match &write.file {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))
                .map_err(CliError::failure)?;
            let value = serde_json::from_str(&text).map_err(|err| {
                CliError::validation(format!("{} is not valid JSON: {err}", path.display()))
            })?;
            FormPayload::from_json(value)?
        }
        None => FormPayload::new(),
    };
    for (name, raw) in &write.set {
        payload.set(name.as_str(), field_value(raw));
    }
    for (name, path) in &write.attach {
        payload.set(name.as_str(), Upload::from_path(path).await?);
    }
    if payload.is_empty() {
        return Err(CliError::validation(
            "no fields given; use --file, --set or --attach",
        ));
    }
    Ok(payload)
}

fn report_saved<T: Record + TableRow>(verb: &str, record: &T, ctx: &AppContext) -> CliResult<()> {
    if ctx.output == OutputFormat::Table {
        println!("{verb} {} (id {})", record.label(), record.id());
    }
    render_record(record, ctx.output)
}

fn confirm_delete(id: RecordId) -> CliResult<bool> {
    if !io::stdin().is_terminal() {
        return Err(CliError::validation(
            "refusing to delete without --yes when running non-interactively",
        ));
    }
    eprint!("Delete record {id}? This cannot be undone. [y/N] ");
    io::stderr()
        .flush()
        .map_err(|err| CliError::failure(anyhow!("failed to write prompt: {err}")))?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|err| CliError::failure(anyhow!("failed to read confirmation: {err}")))?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
