use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "ops-cli")]
#[command(about = "Management CLI for the crm-ops daemon", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "CRM_OPS_ADMIN_API_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status and breaker states
    Status,
    /// Inspect or override circuit breakers
    Breakers {
        #[command(subcommand)]
        action: BreakerCommand,
    },
    /// Manage database backups
    Backups {
        #[command(subcommand)]
        action: BackupCommand,
    },
}

#[derive(Subcommand)]
enum BreakerCommand {
    /// List all breakers
    List,
    /// Reset one breaker, or all when no name is given
    Reset { name: Option<String> },
    /// Force a breaker open
    Open { name: String },
    /// Force a breaker closed
    Close { name: String },
}

#[derive(Subcommand)]
enum BackupCommand {
    /// List backups, newest first
    List,
    /// Create a backup now
    Create,
    /// Check a backup's checksum
    Verify { id: String },
    /// Restore a backup into the configured database
    Restore { id: String },
    /// Delete a backup
    Delete { id: String },
    /// Remove backups older than the retention window
    Cleanup,
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

    let (method, path) = match cli.command {
        Commands::Status => (Method::GET, "/admin/status".to_string()),
        Commands::Breakers { action } => match action {
            BreakerCommand::List => (Method::GET, "/admin/breakers".to_string()),
            BreakerCommand::Reset { name: None } => (Method::POST, "/admin/breakers/reset".to_string()),
            BreakerCommand::Reset { name: Some(name) } => (Method::POST, format!("/admin/breakers/{}/reset", name)),
            BreakerCommand::Open { name } => (Method::POST, format!("/admin/breakers/{}/open", name)),
            BreakerCommand::Close { name } => (Method::POST, format!("/admin/breakers/{}/close", name)),
        },
        Commands::Backups { action } => match action {
            BackupCommand::List => (Method::GET, "/admin/backups".to_string()),
            BackupCommand::Create => (Method::POST, "/admin/backups".to_string()),
            BackupCommand::Verify { id } => (Method::POST, format!("/admin/backups/{}/verify", id)),
            BackupCommand::Restore { id } => (Method::POST, format!("/admin/backups/{}/restore", id)),
            BackupCommand::Delete { id } => (Method::DELETE, format!("/admin/backups/{}", id)),
            BackupCommand::Cleanup => (Method::POST, "/admin/backups/cleanup".to_string()),
        },
    };

    let res = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
