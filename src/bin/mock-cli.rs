use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "mock-cli")]
#[command(about = "Management CLI for the mock Vault server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8201")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server status
    Status,
    /// List mounted backends
    Mounts,
    /// List routes in match order
    Routes,
    /// Mount a backend under a path prefix
    Mount {
        path: String,
        /// Backend kind: sys or kv
        #[arg(long, default_value = "kv")]
        kind: String,
    },
    /// Unmount the backend at a path prefix
    Unmount { path: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Status => {
            client
                .get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Mounts => {
            client
                .get(format!("{}/admin/mounts", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Routes => {
            client
                .get(format!("{}/admin/routes", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Mount { path, kind } => {
            client
                .post(format!("{}/admin/mounts", cli.url))
                .headers(headers)
                .json(&json!({ "path": path, "kind": kind }))
                .send()
                .await?
        }
        Commands::Unmount { path } => {
            client
                .delete(format!("{}/admin/mounts/{}", cli.url, path.trim_matches('/')))
                .headers(headers)
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
