use std::io::{self, IsTerminal};

use anyhow::anyhow;
use reqwest::StatusCode;

use crate::cli::LoginArgs;
use crate::client::{AppContext, CliError, CliResult};
use crate::output::render_session;

pub(crate) async fn handle_login(ctx: &AppContext, args: LoginArgs) -> CliResult<()> {
    let password = resolve_password(args.password)?;
    let claims = match ctx.api.auth().login(&args.username, &password).await {
        Ok(claims) => claims,
        Err(err) if err.status() == Some(StatusCode::UNAUTHORIZED) => {
            return Err(CliError::failure(anyhow!(err.user_message())));
        }
        Err(err) => return Err(err.into()),
    };
    println!("Logged in as {}", args.username.trim());
    if let Some(expires) = claims.expires_at() {
        println!("access token expires: {expires}");
    }
    Ok(())
}

pub(crate) async fn handle_logout(ctx: &AppContext) -> CliResult<()> {
    ctx.api.auth().logout().await?;
    println!("Logged out");
    Ok(())
}

pub(crate) fn handle_session_status(ctx: &AppContext) -> CliResult<()> {
    render_session(ctx.api.session().claims().as_ref(), ctx.output)
}

pub(crate) async fn handle_refresh(ctx: &AppContext) -> CliResult<()> {
    let claims = ctx.api.auth().refresh().await?;
    render_session(Some(&claims), ctx.output)
}

pub(crate) async fn handle_callback(ctx: &AppContext, url: &str) -> CliResult<()> {
    let landing = ctx.api.auth().consume_callback(url).await?;
    println!("Logged in through social login");
    println!("continue at: {landing}");
    Ok(())
}

pub(crate) fn handle_social_url(ctx: &AppContext) -> CliResult<()> {
    let url = ctx.api.auth().social_login_url()?;
    println!("{url}");
    Ok(())
}

fn resolve_password(flag: Option<String>) -> CliResult<String> {
    if let Some(value) = flag {
        if value.is_empty() {
            return Err(CliError::validation("password cannot be empty"));
        }
        return Ok(value);
    }

    if io::stdin().is_terminal() {
        let password = rpassword::prompt_password("Password: ").map_err(|err| {
            CliError::failure(anyhow!("failed to read password from stdin: {err}"))
        })?;
        if password.is_empty() {
            return Err(CliError::validation("password cannot be empty"));
        }
        Ok(password)
    } else {
        Err(CliError::validation(
            "password required; pass --password or set SEKOLAH_PASSWORD",
        ))
    }
}
