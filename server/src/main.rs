use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use platform_authz::{AliasTable, DeploymentMode, PolicyBuilder, Principal, subjects::USERS};
use platform_db::{MemoryStore, Paginate};
use platform_obs::{ObsConfig, init_tracing};
use server::{
    config::AppConfig,
    http::{self, AppState, ServeConfig},
    seed,
};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "reservations-server", version, about = "Seat reservation services")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server.
    Serve(ServeCommand),
    /// Print the rule set compiled for a principal.
    Policy(PolicyCommand),
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, help = "Load fixture rooms, users and reservations on start")]
    seed: bool,
}

#[derive(Args, Debug)]
struct PolicyCommand {
    /// Identity of the principal; anonymous when omitted.
    #[arg(long, value_name = "UUID")]
    user: Option<Uuid>,
    #[arg(long, requires = "user")]
    admin: bool,
    #[arg(long, help = "Compile as a production deployment")]
    production: bool,
}

impl From<&ServeCommand> for ServeConfig {
    fn from(value: &ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let app_config = Arc::new(AppConfig::load()?);
    init_tracing(ObsConfig {
        otlp_endpoint: app_config.otlp_endpoint.clone(),
        ..ObsConfig::for_service("reservations-server")
    })?;
    match cli.command {
        Command::Serve(cmd) => run_server(cmd, app_config).await,
        Command::Policy(cmd) => print_policy(cmd),
    }
}

async fn run_server(cmd: ServeCommand, config: Arc<AppConfig>) -> Result<()> {
    let store = MemoryStore::new(Paginate::default()).with_schema(USERS, seed::USER_FIELDS);
    if cmd.seed {
        seed::load(&store).await?;
    }
    let state = AppState::new(Arc::new(store), config);
    tracing::info!(mode = ?state.authorize.builder().mode(), "policy deployment mode");
    http::serve((&cmd).into(), state).await
}

fn print_policy(cmd: PolicyCommand) -> Result<()> {
    let principal = match cmd.user {
        Some(id) if cmd.admin => Principal::admin(id),
        Some(id) => Principal::user(id),
        None => Principal::Anonymous,
    };
    let mode = if cmd.production {
        DeploymentMode::Production
    } else {
        DeploymentMode::Development
    };
    let policy = PolicyBuilder::new(AliasTable::default(), mode).build(&principal);
    let rendered = serde_json::to_string_pretty(&policy).context("serializing rule set")?;
    println!("{rendered}");
    Ok(())
}
