//! Command handlers grouped by concern.

pub(crate) mod auth;
pub(crate) mod lookup;
pub(crate) mod resources;

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use httpmock::MockServer;
    use sekolah_api_models::TokenPair;
    use sekolah_client::{ClientConfig, HttpClient, SchoolApi, Session};
    use sekolah_test_support::fresh_token;

    use crate::cli::OutputFormat;
    use crate::client::AppContext;

    pub(crate) fn context_with(server: &MockServer) -> AppContext {
        let config = ClientConfig::parse(&server.base_url())
            .expect("config")
            .with_debounce(Duration::ZERO, Duration::ZERO);
        let http = HttpClient::new(&config, Session::in_memory()).expect("client");
        AppContext {
            api: SchoolApi::with_http(http, config),
            output: OutputFormat::Table,
        }
    }

    pub(crate) async fn logged_in_context(server: &MockServer) -> AppContext {
        let ctx = context_with(server);
        ctx.api
            .session()
            .establish(TokenPair {
                access: fresh_token(),
                refresh: "refresh-token".into(),
            })
            .await
            .expect("establish");
        ctx
    }
}
