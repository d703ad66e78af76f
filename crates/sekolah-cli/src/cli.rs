//! Command-line client for administering a Sekolah backend.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use sekolah_api_models::RecordId;
use sekolah_client::config::{DEFAULT_API_URL, DEFAULT_SOCIAL_AUTH_PATH};
use sekolah_client::{
    AchievementForm, ClassForm, ClientConfig, CommentForm, OlympiadReportForm, PostForm,
    ScheduleForm, SchoolApi, StudentForm, TeacherForm,
};
use sekolah_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
use url::Url;
use uuid::Uuid;

use crate::client::{AppContext, CliResult, parse_attachment, parse_key_value, parse_url};
use crate::commands::auth::{
    handle_callback, handle_login, handle_logout, handle_refresh, handle_session_status,
    handle_social_url,
};
use crate::commands::lookup::handle_lookup;
use crate::commands::resources::{handle_notification, handle_resource};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const BUILD_SHA: &str = match option_env!("SEKOLAH_BUILD_SHA") {
    Some(sha) => sha,
    None => "dev",
};

/// Parses CLI arguments, executes the requested command inside an invocation
/// context, and returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let logging = LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format.unwrap_or_else(LogFormat::infer),
        build_sha: BUILD_SHA,
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: {err:#}");
    }

    let command_name = command_label(&cli.command);
    let trace_id = Uuid::new_v4().to_string();
    let result =
        sekolah_telemetry::with_invocation_context(trace_id, command_name, execute(cli)).await;

    match result {
        Ok(()) => 0,
        Err(err) => {
            let message = err.display_message();
            tracing::debug!(error = %message, "command failed");
            eprintln!("error: {message}");
            err.exit_code()
        }
    }
}

async fn execute(cli: Cli) -> CliResult<()> {
    let ctx = build_context(&cli).await?;
    dispatch(cli.command, &ctx).await
}

async fn build_context(cli: &Cli) -> CliResult<AppContext> {
    let mut config = ClientConfig::new(cli.api_url.clone())
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_debounce(Duration::ZERO, Duration::ZERO);
    config.social_auth_path = cli.social_auth_path.trim().trim_start_matches('/').to_string();
    if let Some(path) = cli.token_file.clone().or_else(default_token_path) {
        config = config.with_token_path(path);
    }

    let api = SchoolApi::connect(config).await?;
    Ok(AppContext {
        api,
        output: cli.output,
    })
}

/// `$HOME/.config/sekolah/tokens.json`, when a home directory is known.
pub(crate) fn default_token_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(".config/sekolah/tokens.json"))
}

pub(crate) async fn dispatch(command: Command, ctx: &AppContext) -> CliResult<()> {
    let api = &ctx.api;
    match command {
        Command::Login(args) => handle_login(ctx, args).await,
        Command::Logout => handle_logout(ctx).await,
        Command::Session(session) => match session {
            SessionCommand::Status => handle_session_status(ctx),
            SessionCommand::Refresh => handle_refresh(ctx).await,
            SessionCommand::Callback { url } => handle_callback(ctx, &url).await,
            SessionCommand::SocialUrl => handle_social_url(ctx),
        },
        Command::Students(cmd) => handle_resource::<StudentForm>(ctx, &api.students, cmd).await,
        Command::Teachers(cmd) => handle_resource::<TeacherForm>(ctx, &api.teachers, cmd).await,
        Command::Classes(cmd) => handle_resource::<ClassForm>(ctx, &api.classes, cmd).await,
        Command::Schedules(cmd) => handle_resource::<ScheduleForm>(ctx, &api.schedules, cmd).await,
        Command::Achievements(cmd) => {
            handle_resource::<AchievementForm>(ctx, &api.achievements, cmd).await
        }
        Command::OlympiadReports(cmd) => {
            handle_resource::<OlympiadReportForm>(ctx, &api.olympiad_reports, cmd).await
        }
        Command::Notifications(cmd) => handle_notification(ctx, cmd).await,
        Command::Posts(cmd) => handle_resource::<PostForm>(ctx, &api.posts, cmd).await,
        Command::Comments(cmd) => handle_resource::<CommentForm>(ctx, &api.comments, cmd).await,
        Command::Lookup(args) => handle_lookup(ctx, args).await,
    }
}

#[derive(Parser)]
#[command(name = "sekolah", about = "Administrative CLI for the Sekolah school platform")]
pub(crate) struct Cli {
    #[arg(
        long,
        global = true,
        env = "SEKOLAH_API_URL",
        value_parser = parse_url,
        default_value = DEFAULT_API_URL
    )]
    pub(crate) api_url: Url,
    #[arg(
        long,
        global = true,
        env = "SEKOLAH_HTTP_TIMEOUT_SECS",
        value_parser = clap::value_parser!(u64).range(1..),
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    pub(crate) timeout: u64,
    #[arg(
        long,
        global = true,
        env = "SEKOLAH_TOKEN_FILE",
        help = "Where the login session is stored (defaults to ~/.config/sekolah/tokens.json)"
    )]
    pub(crate) token_file: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "SEKOLAH_SOCIAL_AUTH_PATH",
        default_value = DEFAULT_SOCIAL_AUTH_PATH
    )]
    pub(crate) social_auth_path: String,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    pub(crate) output: OutputFormat,
    #[arg(long, global = true, env = "SEKOLAH_LOG", default_value = DEFAULT_LOG_LEVEL)]
    pub(crate) log_level: String,
    #[arg(long, global = true, env = "SEKOLAH_LOG_FORMAT", value_parser = parse_log_format)]
    pub(crate) log_format: Option<LogFormat>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Log in with username and password.
    Login(LoginArgs),
    /// Drop the stored session.
    Logout,
    #[command(subcommand)]
    Session(SessionCommand),
    #[command(subcommand)]
    Students(ResourceCommand),
    #[command(subcommand)]
    Teachers(ResourceCommand),
    #[command(subcommand)]
    Classes(ResourceCommand),
    #[command(subcommand)]
    Schedules(ResourceCommand),
    #[command(subcommand)]
    Achievements(ResourceCommand),
    #[command(subcommand)]
    OlympiadReports(ResourceCommand),
    #[command(subcommand)]
    Notifications(NotificationCommand),
    #[command(subcommand)]
    Posts(ResourceCommand),
    #[command(subcommand)]
    Comments(ResourceCommand),
    /// Search dropdown options for a relational field.
    Lookup(LookupArgs),
}

#[derive(Args)]
pub(crate) struct LoginArgs {
    #[arg(long, short, env = "SEKOLAH_USERNAME")]
    pub(crate) username: String,
    #[arg(
        long,
        env = "SEKOLAH_PASSWORD",
        hide_env_values = true,
        help = "Password; prompted for when omitted on a terminal"
    )]
    pub(crate) password: Option<String>,
}

#[derive(Subcommand)]
pub(crate) enum SessionCommand {
    /// Show whether a session is active and when it expires.
    Status,
    /// Exchange the refresh token for a new access token.
    Refresh,
    /// Accept the tokens carried by a social-login redirect URL.
    Callback {
        #[arg(help = "Full redirect URL including access and refresh parameters")]
        url: String,
    },
    /// Print the backend's social login entry URL.
    SocialUrl,
}

#[derive(Subcommand)]
pub(crate) enum ResourceCommand {
    /// List one page of records.
    List(ListArgs),
    /// Show one record.
    Get {
        id: RecordId,
    },
    /// Create a record.
    Create(WriteArgs),
    /// Replace a record (PUT).
    Update {
        id: RecordId,
        #[command(flatten)]
        write: WriteArgs,
    },
    /// Change some fields of a record (PATCH).
    Patch {
        id: RecordId,
        #[command(flatten)]
        write: WriteArgs,
    },
    /// Delete a record.
    Delete {
        id: RecordId,
        #[arg(long, short, help = "Skip the confirmation prompt")]
        yes: bool,
    },
    /// Download the collection export.
    Export(ExportArgs),
    /// Upload a bulk import file.
    Import {
        path: PathBuf,
    },
}

#[derive(Subcommand)]
pub(crate) enum NotificationCommand {
    #[command(flatten)]
    Common(ResourceCommand),
    /// Mark one notification as read.
    MarkRead {
        id: RecordId,
    },
    /// Mark every notification as read.
    MarkAllRead,
}

#[derive(Args, Default)]
pub(crate) struct ListArgs {
    #[arg(long, short)]
    pub(crate) search: Option<String>,
    #[arg(
        long = "filter",
        value_parser = parse_key_value,
        help = "Filter as field=value (repeatable)"
    )]
    pub(crate) filters: Vec<(String, String)>,
    #[arg(
        long,
        help = "Cursor URL printed by a previous page",
        conflicts_with_all = ["search", "filters"]
    )]
    pub(crate) cursor: Option<String>,
}

#[derive(Args, Default)]
pub(crate) struct WriteArgs {
    #[arg(long, help = "JSON object with the record fields")]
    pub(crate) file: Option<PathBuf>,
    #[arg(
        long = "set",
        value_parser = parse_key_value,
        help = "Field as name=value (repeatable)"
    )]
    pub(crate) set: Vec<(String, String)>,
    #[arg(
        long = "attach",
        value_parser = parse_attachment,
        help = "File field as name=PATH (repeatable)"
    )]
    pub(crate) attach: Vec<(String, PathBuf)>,
}

#[derive(Args, Default)]
pub(crate) struct ExportArgs {
    #[arg(long, short)]
    pub(crate) search: Option<String>,
    #[arg(long = "filter", value_parser = parse_key_value)]
    pub(crate) filters: Vec<(String, String)>,
    #[arg(long, short, help = "Write to this file instead of stdout")]
    pub(crate) out: Option<PathBuf>,
}

#[derive(Args)]
pub(crate) struct LookupArgs {
    #[arg(value_enum)]
    pub(crate) resource: LookupTarget,
    #[arg(default_value = "")]
    pub(crate) query: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum LookupTarget {
    Students,
    Teachers,
    Classes,
    Posts,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

const fn resource_label(command: &ResourceCommand) -> &'static str {
    match command {
        ResourceCommand::List(_) => "list",
        ResourceCommand::Get { .. } => "get",
        ResourceCommand::Create(_) => "create",
        ResourceCommand::Update { .. } => "update",
        ResourceCommand::Patch { .. } => "patch",
        ResourceCommand::Delete { .. } => "delete",
        ResourceCommand::Export(_) => "export",
        ResourceCommand::Import { .. } => "import",
    }
}

pub(crate) const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Login(_) => "login",
        Command::Logout => "logout",
        Command::Session(SessionCommand::Status) => "session_status",
        Command::Session(SessionCommand::Refresh) => "session_refresh",
        Command::Session(SessionCommand::Callback { .. }) => "session_callback",
        Command::Session(SessionCommand::SocialUrl) => "session_social_url",
        Command::Notifications(NotificationCommand::MarkRead { .. }) => "notifications_mark_read",
        Command::Notifications(NotificationCommand::MarkAllRead) => "notifications_mark_all_read",
        Command::Notifications(NotificationCommand::Common(_)) => "notifications",
        Command::Students(cmd)
        | Command::Teachers(cmd)
        | Command::Classes(cmd)
        | Command::Schedules(cmd)
        | Command::Achievements(cmd)
        | Command::OlympiadReports(cmd)
        | Command::Posts(cmd)
        | Command::Comments(cmd) => resource_label(cmd),
        Command::Lookup(_) => "lookup",
    }
}

fn parse_log_format(input: &str) -> Result<LogFormat, String> {
    input.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_resource_list_with_filters() {
        let cli = Cli::try_parse_from([
            "sekolah",
            "--api-url",
            "http://localhost:8000/backend",
            "students",
            "list",
            "--search",
            "budi",
            "--filter",
            "class_id=3",
        ])
        .expect("parse");
        assert_eq!(cli.api_url.as_str(), "http://localhost:8000/backend/");
        let Command::Students(ResourceCommand::List(args)) = cli.command else {
            panic!("expected students list");
        };
        assert_eq!(args.search.as_deref(), Some("budi"));
        assert_eq!(args.filters, vec![("class_id".to_string(), "3".to_string())]);
    }

    #[test]
    fn parses_write_arguments() {
        let cli = Cli::try_parse_from([
            "sekolah",
            "teachers",
            "patch",
            "4",
            "--set",
            "subject=Fisika",
            "--attach",
            "photo=/tmp/dewi.jpg",
            "--output",
            "json",
        ])
        .expect("parse");
        assert_eq!(cli.output, OutputFormat::Json);
        let Command::Teachers(ResourceCommand::Patch { id, write }) = cli.command else {
            panic!("expected teachers patch");
        };
        assert_eq!(id, 4);
        assert_eq!(write.set, vec![("subject".to_string(), "Fisika".to_string())]);
        assert_eq!(
            write.attach,
            vec![("photo".to_string(), PathBuf::from("/tmp/dewi.jpg"))]
        );
    }

    #[test]
    fn notifications_accept_common_and_specific_commands() {
        let cli = Cli::try_parse_from(["sekolah", "notifications", "mark-read", "12"])
            .expect("parse");
        assert_eq!(command_label(&cli.command), "notifications_mark_read");

        let cli = Cli::try_parse_from(["sekolah", "notifications", "delete", "3", "--yes"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Command::Notifications(NotificationCommand::Common(ResourceCommand::Delete {
                id: 3,
                yes: true
            }))
        ));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert!(Cli::try_parse_from(["sekolah", "--api-url", "ftp://x", "logout"]).is_err());
        assert!(
            Cli::try_parse_from(["sekolah", "students", "list", "--filter", "oops"]).is_err()
        );
        assert!(
            Cli::try_parse_from(["sekolah", "--log-format", "xml", "logout"]).is_err()
        );
        assert!(Cli::try_parse_from(["sekolah", "--timeout", "0", "logout"]).is_err());
        let cli = Cli::try_parse_from(["sekolah", "--timeout", "3", "logout"]).expect("parse");
        assert_eq!(cli.timeout, 3);
    }

    #[test]
    fn command_label_matches_variants() {
        assert_eq!(
            command_label(&Command::OlympiadReports(ResourceCommand::Get { id: 1 })),
            "get"
        );
        assert_eq!(
            command_label(&Command::Session(SessionCommand::SocialUrl)),
            "session_social_url"
        );
        assert_eq!(command_label(&Command::Logout), "logout");
    }
}
