use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Parser)]
#[command(name = "strangedb")]
#[command(about = "StrangeDB command line client", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Node HTTP API to talk to
    #[arg(long, default_value = "http://127.0.0.1:8080", global = true)]
    server: String,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a value under a key
    Set {
        key: String,
        value: String,
    },
    /// Fetch a value by key
    Get {
        key: String,
    },
    /// Delete a key (writes a tombstone)
    Delete {
        key: String,
    },
    /// Show cluster membership and uptime
    Status,
    /// Show consistent-hash ring layout
    Ring,
    /// Check node health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    match cli.command {
        Commands::Set { key, value } => set_key(&cli.server, key, value).await?,
        Commands::Get { key } => get_key(&cli.server, &key).await?,
        Commands::Delete { key } => delete_key(&cli.server, &key).await?,
        Commands::Status => cluster_status(&cli.server).await?,
        Commands::Ring => ring_status(&cli.server).await?,
        Commands::Health => health(&cli.server).await?,
    }

    Ok(())
}

async fn set_key(server: &str, key: String, value: String) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{server}/api/v1/kv"))
        .json(&json!({ "key": key, "value": value }))
        .send()
        .await?;

    if response.status().is_success() {
        let result: serde_json::Value = response.json().await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_error("set", response).await;
    }
    Ok(())
}

async fn get_key(server: &str, key: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{server}/api/v1/kv/{key}"))
        .send()
        .await?;

    if response.status().is_success() {
        let result: serde_json::Value = response.json().await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_error("get", response).await;
    }
    Ok(())
}

async fn delete_key(server: &str, key: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .delete(format!("{server}/api/v1/kv/{key}"))
        .send()
        .await?;

    if response.status().is_success() {
        let result: serde_json::Value = response.json().await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_error("delete", response).await;
    }
    Ok(())
}

async fn cluster_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{server}/api/v1/cluster/status"))
        .send()
        .await?;

    if response.status().is_success() {
        let result: serde_json::Value = response.json().await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_error("status", response).await;
    }
    Ok(())
}

async fn ring_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{server}/api/v1/ring/status"))
        .send()
        .await?;

    if response.status().is_success() {
        let result: serde_json::Value = response.json().await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_error("ring", response).await;
    }
    Ok(())
}

async fn health(server: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    match client.get(format!("{server}/health")).send().await {
        Ok(response) if response.status().is_success() => {
            let result: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Ok(response) => {
            print_error("health", response).await;
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("cannot reach {server}: {e}");
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn print_error(op: &str, response: reqwest::Response) {
    let status = response.status();
    let body = response
        .json::<serde_json::Value>()
        .await
        .unwrap_or_else(|_| json!({}));
    eprintln!("{op} failed: {status}\n{}", serde_json::to_string_pretty(&body).unwrap_or_default());
}
