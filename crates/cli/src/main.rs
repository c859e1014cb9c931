mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::ProvisionerClient;
use qa_models::ProvisionRequest;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "qa-cli")]
#[command(about = "Manage per-branch QA environments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the provisioner API
    #[arg(long, env = "QA_ENDPOINT", default_value = "http://localhost:8088")]
    endpoint: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and expose an environment for a branch
    Provision {
        /// Branch to deploy
        branch: String,

        /// Service to expose
        #[arg(long, default_value = "web")]
        service: String,

        /// Lifetime in minutes (server default when omitted)
        #[arg(long)]
        ttl_minutes: Option<u32>,
    },

    /// Tear down an environment
    Destroy {
        /// Environment ID
        env_id: String,
    },

    /// List live environments
    List,

    /// Destroy every expired environment
    Gc,

    /// Health check
    Health,
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = ProvisionerClient::new(cli.endpoint.clone());
    tracing::debug!(endpoint = %cli.endpoint, "Using provisioner endpoint");

    match cli.command {
        Commands::Provision {
            branch,
            service,
            ttl_minutes,
        } => {
            let response = client
                .provision(&ProvisionRequest {
                    branch,
                    service,
                    ttl_minutes,
                })
                .await?;
            print(&response)?;
        }
        Commands::Destroy { env_id } => print(&client.destroy(&env_id).await?)?,
        Commands::List => print(&client.list().await?)?,
        Commands::Gc => print(&client.gc().await?)?,
        Commands::Health => print(&client.health().await?)?,
    }

    Ok(())
}
