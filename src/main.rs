use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use lazyday_session::{AuthFlow, SessionConfig, SessionError, SessionStore};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("output encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "lazyday-session", about = "Lazy Days session CLI")]
struct Cli {
    #[arg(long, env = "SESSION_API_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "SESSION_STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stored user without contacting the server.
    Whoami,
    /// Re-read the user from the server and update local storage.
    Refresh,
    SignIn(CredentialArgs),
    SignUp(CredentialArgs),
    SignOut,
    /// List the signed-in user's appointments.
    Appointments,
}

#[derive(Args, Debug)]
struct CredentialArgs {
    #[arg(long)]
    email: String,
    #[arg(long, env = "SESSION_PASSWORD")]
    password: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = SessionConfig::from_env_with_base_url(cli.base_url.as_deref())?;
    if let Some(path) = cli.storage_path {
        config.storage_path = path;
    }

    let session = SessionStore::from_config(&config)?;
    let auth = AuthFlow::new(session.api(), session.clone());
    tracing::debug!(base_url = %config.api_base_url, storage = %config.storage_path.display(), "session configured");

    match cli.command {
        Command::Whoami => print_json(&session.peek_user())?,
        Command::Refresh => print_json(&session.refresh().await?)?,
        Command::SignIn(args) => print_json(&auth.sign_in(&args.email, &args.password).await?)?,
        Command::SignUp(args) => print_json(&auth.sign_up(&args.email, &args.password).await?)?,
        Command::SignOut => {
            auth.sign_out();
            println!("signed out");
        }
        Command::Appointments => print_json(&session.user_appointments().await?)?,
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
