use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the domain gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "DOMAIN_GATE_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// Summarize the lookup cache
    Cache,
    /// Purge the whole cache, or a single host
    Purge {
        /// Host to evict; omit to purge everything
        host: Option<String>,
    },
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

    let request = match &cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Cache => client.get(format!("{}/admin/cache", cli.url)),
        Commands::Purge { host: None } => client.delete(format!("{}/admin/cache", cli.url)),
        Commands::Purge { host: Some(host) } => {
            client.delete(format!("{}/admin/cache/{}", cli.url, host))
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
