mod auth_commands;

use std::{path::PathBuf, process::ExitCode};

use {
    clap::Parser,
    cs_config::ConfigError,
    cs_oauth::{LoginError, TlsError, TokenStoreError},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use auth_commands::{AuthAction, AuthPaths};

const EXIT_UNEXPECTED: u8 = 2;
const EXIT_CONFIGURATION: u8 = 4;
const EXIT_LOGIN: u8 = 5;
const EXIT_TOKEN_STORE: u8 = 6;

#[derive(Parser)]
#[command(
    name = "cs",
    version,
    about = "Carbyne Stack CLI: log in to the configured Virtual Cloud Providers"
)]
struct Cli {
    #[command(subcommand)]
    command: AuthAction,

    /// Configuration file [default: ~/.cs/config].
    #[arg(long, global = true, env = "CS_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Access token store [default: ~/.cs/access-tokens.json].
    #[arg(long, global = true, env = "CS_TOKEN_STORE")]
    token_store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn resolve_paths(cli: &Cli) -> Result<AuthPaths, ConfigError> {
    let config = match &cli.config {
        Some(path) => path.clone(),
        None => cs_config::default_config_path()?,
    };
    let token_store = match &cli.token_store {
        Some(path) => path.clone(),
        None => cs_config::default_token_store_path()?,
    };
    Ok(AuthPaths {
        config,
        token_store,
    })
}

/// Maps a failure to the process exit code, using the first typed error in
/// the chain.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| {
            if let Some(login) = cause.downcast_ref::<LoginError>() {
                return Some(match login {
                    LoginError::TokenStore(_) => EXIT_TOKEN_STORE,
                    _ => EXIT_LOGIN,
                });
            }
            if cause.is::<TokenStoreError>() {
                Some(EXIT_TOKEN_STORE)
            } else if cause.is::<ConfigError>() || cause.is::<TlsError>() {
                Some(EXIT_CONFIGURATION)
            } else {
                None
            }
        })
        .unwrap_or(EXIT_UNEXPECTED)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = resolve_paths(&cli)?;
    debug!(
        config = %paths.config.display(),
        token_store = %paths.token_store.display(),
        "resolved paths"
    );
    auth_commands::handle_auth(cli.command, &paths).await
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "cs starting");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!(error = ?e, "command failed");
            eprintln!("Error: {e}");
            ExitCode::from(exit_code_for(&e))
        },
    }
}
