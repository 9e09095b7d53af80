//! tsquery CLI
//!
//! Command-line interface for tsquery operations:
//! - Run query batches against the server
//! - Preview the quantized interval for a time range
//! - Print the default configuration
//! - Check server health

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tsquery::config::generate_default_config;
use tsquery::tsdb::{calculate_interval, TimeRange};

#[derive(Parser)]
#[command(name = "tsquery-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query time-series backends through a tsquery server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8086", global = true)]
    pub api_url: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a batch of queries
    Query {
        /// Data source for queries that do not name one
        #[arg(short, long)]
        datasource: Option<String>,
        /// Lower bound (e.g. 6h, now-6h, epoch ms)
        #[arg(short, long, default_value = "6h")]
        from: String,
        /// Upper bound
        #[arg(short, long, default_value = "now")]
        to: String,
        /// Target bucket count
        #[arg(short, long)]
        resolution: Option<u32>,
        /// JSON file holding one query object or an array of them
        #[arg(long)]
        file: PathBuf,
    },

    /// Show the interval a time range quantizes to
    Interval {
        #[arg(short, long, default_value = "6h")]
        from: String,
        #[arg(short, long, default_value = "now")]
        to: String,
        #[arg(short, long)]
        resolution: Option<u32>,
    },

    /// Print the default configuration file
    Config,

    /// Show server health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Query {
            datasource,
            from,
            to,
            resolution,
            file,
        } => {
            let content = std::fs::read_to_string(&file)?;
            let parsed: serde_json::Value = serde_json::from_str(&content)?;

            let mut queries = match parsed {
                serde_json::Value::Array(items) => items,
                single => vec![single],
            };

            for (i, query) in queries.iter_mut().enumerate() {
                let Some(obj) = query.as_object_mut() else {
                    anyhow::bail!("query #{} in {:?} is not an object", i, file);
                };
                if !obj.contains_key("datasource") {
                    match &datasource {
                        Some(name) => {
                            obj.insert("datasource".into(), name.clone().into());
                        }
                        None => anyhow::bail!(
                            "query #{} has no datasource; pass --datasource",
                            i
                        ),
                    }
                }
                if !obj.contains_key("refId") {
                    obj.insert("refId".into(), ref_id_for(i).into());
                }
            }

            let body = serde_json::json!({
                "from": from,
                "to": to,
                "resolution": resolution,
                "queries": queries,
            });

            let response = client
                .post(format!("{}/api/tsdb/query", cli.api_url))
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                eprintln!("Query failed ({}): {}", status, text);
                std::process::exit(1);
            }

            let data: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }

        Commands::Interval {
            from,
            to,
            resolution,
        } => {
            let range = TimeRange::new(from, to);
            let (start, end) = range.epoch_bounds()?;
            let interval = calculate_interval(&range, resolution)?;

            println!("Range:    {} .. {} ({} ms)", start, end, end - start);
            println!("Interval: {} ({} ms)", interval, interval.millis);
        }

        Commands::Config => {
            print!("{}", generate_default_config());
        }

        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.api_url))
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let health: serde_json::Value = resp.json().await?;

                    println!(
                        "tsquery v{}",
                        health["version"].as_str().unwrap_or("unknown")
                    );
                    println!();
                    println!(
                        "Status: {}",
                        health["status"].as_str().unwrap_or("unknown")
                    );
                    if let Some(backends) = health["backends"].as_array() {
                        let names: Vec<&str> = backends.iter().filter_map(|b| b.as_str()).collect();
                        println!("Backends: {}", names.join(", "));
                    }
                    if let Some(count) = health["datasources"].as_u64() {
                        println!("Data sources: {}", count);
                    }
                    if let Some(uptime) = health["uptime_seconds"].as_u64() {
                        println!("Uptime: {}", format_duration(uptime));
                    }
                }
                Ok(resp) => {
                    eprintln!("API returned error: {}", resp.status());
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Cannot connect to tsquery API at {}", cli.api_url);
                    eprintln!("Error: {}", e);
                    eprintln!();
                    eprintln!("Make sure the server is running:");
                    eprintln!("  cargo run --bin tsquery");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// A, B, ..., Z, AA, AB, ...
fn ref_id_for(index: usize) -> String {
    let mut n = index + 1;
    let mut id = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        id.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    id.reverse();
    String::from_utf8_lossy(&id).into_owned()
}

fn format_duration(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let mins = (secs % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, mins)
    } else if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}m {}s", mins, secs % 60)
    }
}
