//! Thin entrypoint for the `sekolah` binary.

#[tokio::main]
async fn main() {
    let code = sekolah_cli::run().await;
    std::process::exit(code);
}
