//! Invocation context propagation.
//!
//! # Design
//! - One identifier per CLI invocation, kept in task-local storage.
//! - The HTTP client reads it to stamp `x-request-id` on outgoing calls so
//!   backend logs can be correlated with a single command run.

use std::future::Future;
use std::sync::Arc;

use tracing::Instrument;

use crate::init::build_sha;

#[derive(Clone)]
struct InvocationContext {
    id: Arc<str>,
    command: Arc<str>,
}

tokio::task_local! {
    static ACTIVE_INVOCATION: InvocationContext;
}

/// Run `fut` with the supplied invocation identifier available to downstream
/// code, inside an `invocation` span carrying the command name.
pub async fn with_invocation_context<Fut, T>(
    id: impl Into<String>,
    command: impl Into<String>,
    fut: Fut,
) -> T
where
    Fut: Future<Output = T>,
{
    let context = InvocationContext {
        id: Arc::from(id.into()),
        command: Arc::from(command.into()),
    };
    let span = tracing::info_span!(
        "invocation",
        id = %context.id,
        command = %context.command,
        build_sha = %build_sha()
    );
    ACTIVE_INVOCATION
        .scope(context, fut.instrument(span))
        .await
}

/// Identifier of the invocation running on the current task, if any.
#[must_use]
pub fn current_invocation_id() -> Option<String> {
    ACTIVE_INVOCATION
        .try_with(|ctx| ctx.id.as_ref().to_string())
        .ok()
}

/// Command label of the invocation running on the current task, if any.
#[must_use]
pub fn current_command() -> Option<String> {
    ACTIVE_INVOCATION
        .try_with(|ctx| ctx.command.as_ref().to_string())
        .ok()
}
