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

//! Logging and invocation-context helpers shared by the Sekolah crates.
//!
//! Layout: `init.rs` (subscriber installation and log format selection),
//! `context.rs` (task-local invocation identifiers propagated as
//! `x-request-id`).

pub mod context;
pub mod init;

pub use context::{current_command, current_invocation_id, with_invocation_context};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
