//! Kyrant auth CLI - drives the auth orchestrator from a terminal.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kyrant_auth::Role;
use kyrant_config_and_utils::{init_logging, Config, Paths};

/// Kyrant auth command-line interface.
#[derive(Parser)]
#[command(name = "kyrant-auth")]
#[command(about = "Sign in, sign up and inspect the Kyrant auth state")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, storage and logs. Defaults to ~/.kyrant
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved auth state
    Status,
    /// Sign in with email and password
    SignIn {
        email: String,
        #[arg(long, env = "KYRANT_PASSWORD", hide_env_values = true)]
        password: String,
        /// Only accept the session if the profile has this role
        #[arg(long, value_parser = parse_role)]
        expect_role: Option<Role>,
    },
    /// Create an account with email and password
    SignUp {
        email: String,
        #[arg(long, env = "KYRANT_PASSWORD", hide_env_values = true)]
        password: String,
        /// designer or merchant
        #[arg(long, default_value = "merchant")]
        role: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Sign out and clear local session state
    SignOut,
    /// Print the URL that starts a social login
    OauthStart {
        /// Role to assign once the new account lands
        #[arg(long)]
        signup_role: Option<String>,
        /// Role whose login page started the flow
        #[arg(long, value_parser = parse_role)]
        expect_role: Option<Role>,
    },
    /// Finish a social login from the URL the browser was redirected to
    OauthComplete { callback_url: String },
    /// Re-read the current user's profile
    RefreshProfile,
}

fn parse_role(raw: &str) -> Result<Role, String> {
    Role::parse(raw).ok_or_else(|| format!("unknown role '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;
    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    let ctx = commands::Context::open(&paths, &config)?;

    match cli.command {
        Commands::Status => commands::status(&ctx).await?,
        Commands::SignIn {
            email,
            password,
            expect_role,
        } => commands::sign_in(&ctx, &email, &password, expect_role).await?,
        Commands::SignUp {
            email,
            password,
            role,
            name,
        } => commands::sign_up(&ctx, &email, &password, &role, name.as_deref()).await?,
        Commands::SignOut => commands::sign_out(&ctx).await?,
        Commands::OauthStart {
            signup_role,
            expect_role,
        } => commands::oauth_start(&ctx, signup_role.as_deref(), expect_role).await?,
        Commands::OauthComplete { callback_url } => {
            commands::oauth_complete(&ctx, &callback_url).await?
        }
        Commands::RefreshProfile => commands::refresh_profile(&ctx).await?,
    }

    Ok(())
}
