use clap::Subcommand;
use serde_json::json;

use crate::cli::client::ApiClient;
use crate::cli::config::{load_session, save_session};
use crate::cli::utils::{output_api_response, output_success};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ServerCommands {
    #[command(about = "Point the CLI at a server (drops any existing login)")]
    Use {
        #[arg(help = "Server base URL, e.g. http://localhost:5111")]
        url: String,
    },

    #[command(about = "Show the currently selected server")]
    Current,

    #[command(about = "Check server health via /health")]
    Health,
}

pub async fn handle(cmd: ServerCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ServerCommands::Use { url } => {
            let url = url::Url::parse(&url).map_err(|e| anyhow::anyhow!("invalid server URL '{}': {}", url, e))?;
            let url = url.as_str().trim_end_matches('/').to_string();

            let mut session = load_session()?;
            if session.server_url != url {
                session.logout();
            }
            session.server_url = url.clone();
            save_session(&session)?;

            output_success(
                &output_format,
                &format!("Using server {}", url),
                Some(json!({ "server_url": url })),
            )
        }
        ServerCommands::Current => {
            let session = load_session()?;
            output_success(
                &output_format,
                &format!("Current server: {}", session.server_url),
                Some(json!({ "server_url": session.server_url })),
            )
        }
        ServerCommands::Health => {
            let session = load_session()?;
            let client = ApiClient::from_session(&session)?;
            let response = client.health().await?;
            output_api_response(&output_format, &response)
        }
    }
}
