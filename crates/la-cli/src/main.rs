use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use la_core::auth::StudentData;
use la_core::lifecycle::InstallReason;
use la_execution::{LogFormat, init_tracing};

mod commands;

#[derive(Parser)]
#[command(name = "la")]
#[command(about = "Learning Assistant - session and chat runtime", long_about = None)]
struct Cli {
    /// Durable store file (defaults to ~/.config/learning-assistant/store.json)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Optional TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fire the install hook (sweeps stale sessions)
    Install {
        #[arg(long, value_enum, default_value_t = Reason::Install)]
        reason: Reason,
    },
    /// Fire the browser-startup hook (sweeps stale sessions)
    Startup,
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in with a one-time email code
    Otp {
        #[command(subcommand)]
        action: OtpAction,
    },
    /// Sign in through the provider's browser redirect
    Oauth {
        /// Redirect target registered with the provider
        #[arg(long, default_value = commands::auth::DEFAULT_REDIRECT_URL)]
        redirect_url: String,
    },
    /// Re-validate the stored session and show it
    Status,
    /// Clear the stored session
    SignOut,
    /// Show the widget as it would render on a page
    Page {
        #[arg(long, default_value = commands::chat::DEFAULT_PAGE_URL)]
        url: String,
    },
    /// Send one chat message from a page widget
    Chat {
        message: String,
        #[arg(long, default_value = commands::chat::DEFAULT_PAGE_URL)]
        url: String,
    },
    /// Read organization content or your threads (students only)
    Data {
        #[arg(value_enum)]
        kind: DataKind,
        /// Organization to read (defaults to the session's organization)
        #[arg(long)]
        org: Option<String>,
    },
    /// Manage configuration keys in the store
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum OtpAction {
    /// Email a one-time code
    Send {
        #[arg(long)]
        email: String,
    },
    /// Verify a code and sign in
    Verify {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the resolved configuration
    Show,
    /// Store a key (API_BASE_URL, SUPABASE_URL, SUPABASE_ANON_KEY)
    Set { key: String, value: String },
    /// Remove a key from the store
    Unset { key: String },
    /// Check that the configured provider answers
    Test,
}

#[derive(Clone, Copy, ValueEnum)]
enum DataKind {
    Content,
    Threads,
}

impl From<DataKind> for StudentData {
    fn from(kind: DataKind) -> Self {
        match kind {
            DataKind::Content => StudentData::Content,
            DataKind::Threads => StudentData::Threads,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Reason {
    Install,
    Update,
    BrowserUpdate,
}

impl From<Reason> for InstallReason {
    fn from(reason: Reason) -> Self {
        match reason {
            Reason::Install => InstallReason::Install,
            Reason::Update => InstallReason::Update,
            Reason::BrowserUpdate => InstallReason::BrowserUpdate,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(format, Some("warn"));

    let ctx = commands::Context::open(cli.store, cli.config).await?;

    match cli.command {
        Commands::Install { reason } => commands::lifecycle::install(&ctx, reason.into()).await?,
        Commands::Startup => commands::lifecycle::startup(&ctx).await?,
        Commands::Login { email, password } => {
            commands::auth::login(&ctx, &email, &password).await?
        }
        Commands::Otp { action } => match action {
            OtpAction::Send { email } => commands::auth::send_code(&ctx, &email).await?,
            OtpAction::Verify { email, code } => {
                commands::auth::verify_code(&ctx, &email, &code).await?
            }
        },
        Commands::Oauth { redirect_url } => commands::auth::oauth(&ctx, redirect_url).await?,
        Commands::Status => commands::auth::status(&ctx).await?,
        Commands::SignOut => commands::auth::sign_out(&ctx).await?,
        Commands::Page { url } => commands::chat::page(&ctx, &url).await?,
        Commands::Chat { message, url } => commands::chat::chat(&ctx, &url, &message).await?,
        Commands::Data { kind, org } => commands::data::read(&ctx, kind.into(), org).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&ctx).await?,
            ConfigAction::Set { key, value } => commands::config::set(&ctx, &key, &value).await?,
            ConfigAction::Unset { key } => commands::config::unset(&ctx, &key).await?,
            ConfigAction::Test => commands::config::test(&ctx).await?,
        },
    }

    ctx.shutdown().await;
    Ok(())
}
