use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the manuscript gateway", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAY_ADMIN_URL", default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gateway status summary
    Status,
    /// List every circuit breaker
    Breakers,
    /// Show one circuit breaker
    Breaker { name: String },
    /// Reset a circuit breaker to CLOSED
    Reset { name: String },
    /// Reset every circuit breaker
    ResetAll,
    /// Force a circuit breaker OPEN
    Open { name: String },
    /// Force a circuit breaker CLOSED
    Close { name: String },
    /// Admission load statistics
    Load,
}

impl Commands {
    fn request(&self) -> (Method, String) {
        match self {
            Commands::Status => (Method::GET, "/admin/status".into()),
            Commands::Breakers => (Method::GET, "/admin/breakers".into()),
            Commands::Breaker { name } => (Method::GET, format!("/admin/breakers/{}", name)),
            Commands::Reset { name } => (Method::POST, format!("/admin/breakers/{}/reset", name)),
            Commands::ResetAll => (Method::POST, "/admin/breakers/reset-all".into()),
            Commands::Open { name } => (Method::POST, format!("/admin/breakers/{}/open", name)),
            Commands::Close { name } => (Method::POST, format!("/admin/breakers/{}/close", name)),
            Commands::Load => (Method::GET, "/admin/load".into()),
        }
    }
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

    let (method, path) = cli.command.request();
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

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
