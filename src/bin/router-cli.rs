use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "router-cli")]
#[command(about = "Management CLI for hotswap-router", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "admin-secret-key")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show router status
    Status,
    /// List registered aliases
    Aliases {
        /// Only aliases at or below this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// List registered filters
    Filters,
    /// Refuse new requests with 503
    Drain,
    /// Accept requests again after a drain
    Resume,
    /// Tear down everything a module registered
    Unload { id: String },
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

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Aliases { prefix } => {
            let request = client.get(format!("{}/admin/aliases", cli.url));
            match prefix {
                Some(prefix) => request.query(&[("prefix", prefix)]),
                None => request,
            }
        }
        Commands::Filters => client.get(format!("{}/admin/filters", cli.url)),
        Commands::Drain => client.post(format!("{}/admin/shutdown", cli.url)),
        Commands::Resume => client.delete(format!("{}/admin/shutdown", cli.url)),
        Commands::Unload { id } => client.delete(format!("{}/admin/modules/{}", cli.url, id)),
    };

    let res = request.headers(headers).send().await?;
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
