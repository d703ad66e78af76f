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

//! Shared test helpers used across the client and CLI suites.
//! Layout: tokens.rs (unsigned JWT minting), fixtures.rs (JSON bodies the
//! mock backend serves).

pub mod fixtures;
pub mod tokens;

pub use fixtures::{page, sample_teacher, teacher_page};
pub use tokens::{expired_token, fresh_token, mint_token};
