//! # flow: the FLOWSCOPE command line
//!
//! - `flow flows --filters 'SrcPort=443|DstPort=443' --time-range 300` queries the hub.
//! - `flow filters <raw>` shows how a filters expression is grouped.
//! - `flow status` / `flow ready` report hub and Loki health.

use clap::{Parser, Subcommand};
use flow_core::{encode_filters, parse_filters, render_filters, AggregatedQueryResponse, FilterGroup};
use tabled::{Table, Tabled};

/// Query network flows through the FLOWSCOPE hub.
#[derive(Parser)]
#[command(name = "flow", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch flows from the hub.
    Flows {
        /// Filters expression, e.g. `SrcK8S_Namespace=prod&DstPort=443|Proto=17`.
        #[arg(long)]
        filters: Option<String>,

        /// Maximum number of flows.
        #[arg(long)]
        limit: Option<usize>,

        /// Look back this many seconds from now.
        #[arg(long)]
        time_range: Option<u64>,

        /// Absolute start (unix seconds), wins over --time-range.
        #[arg(long)]
        start: Option<String>,

        /// Absolute end (unix seconds).
        #[arg(long)]
        end: Option<String>,

        /// `source`, `destination` or `both`.
        #[arg(long)]
        reporter: Option<String>,

        /// Print a table instead of raw JSON.
        #[arg(long)]
        table: bool,
    },

    /// Parse a filters expression locally and print its groups.
    Filters { raw: String },

    /// Report hub status as JSON.
    Status,

    /// Check whether Loki is ready.
    Ready,
}

#[derive(Tabled)]
struct FlowRow {
    time: String,
    labels: String,
    flow: String,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Filters { raw } => match parse_filters(&raw) {
            Ok(groups) => print_groups(&groups),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },

        // Async Commands
        cmd => {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("Failed to build tokio runtime: {}", e);
                    std::process::exit(1);
                }
            };

            if let Err(e) = rt.block_on(async_main(cmd)) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn async_main(cmd: Commands) -> Result<(), String> {
    let client = reqwest::Client::new();
    let base_url =
        std::env::var("FLOW_HUB_URL").unwrap_or_else(|_| "http://127.0.0.1:9001".to_string());

    match cmd {
        Commands::Flows {
            filters,
            limit,
            time_range,
            start,
            end,
            reporter,
            table,
        } => {
            let mut params: Vec<(&str, String)> = Vec::new();
            if let Some(raw) = filters {
                let groups = parse_filters(&raw).map_err(|e| e.to_string())?;
                params.push(("filters", encode_filters(&groups)));
            }
            if let Some(limit) = limit {
                params.push(("limit", limit.to_string()));
            }
            if let Some(range) = time_range {
                params.push(("timeRange", range.to_string()));
            }
            if let Some(start) = start {
                params.push(("startTime", start));
            }
            if let Some(end) = end {
                params.push(("endTime", end));
            }
            if let Some(reporter) = reporter {
                params.push(("reporter", reporter));
            }

            let url = format!("{}/api/loki/flows", base_url);
            let json = get_json(client.get(&url).query(&params)).await?;

            if table {
                let response: AggregatedQueryResponse =
                    serde_json::from_value(json).map_err(|e| e.to_string())?;
                print_table(&response);
            } else {
                print_json(&json);
            }
        }

        Commands::Status => {
            let url = format!("{}/api/status", base_url);
            print_json(&get_json(client.get(&url)).await?);
        }

        Commands::Ready => {
            let url = format!("{}/api/loki/ready", base_url);
            let resp = client.get(&url).send().await.map_err(|e| e.to_string())?;
            let status = resp.status();
            let text = resp.text().await.map_err(|e| e.to_string())?;
            if !status.is_success() {
                return Err(format!("[{}] {}", status.as_u16(), text));
            }
            println!("{}", text);
        }

        Commands::Filters { .. } => {}
    }
    Ok(())
}

async fn get_json(request: reqwest::RequestBuilder) -> Result<serde_json::Value, String> {
    let resp = request.send().await.map_err(|e| e.to_string())?;
    let status = resp.status();
    let json = resp
        .json::<serde_json::Value>()
        .await
        .map_err(|e| e.to_string())?;
    if !status.is_success() {
        let message = json
            .get("error")
            .and_then(|e| e.as_str())
            .map(ToString::to_string)
            .unwrap_or_else(|| json.to_string());
        return Err(format!("[{}] {}", status.as_u16(), message));
    }
    Ok(json)
}

fn print_json(json: &serde_json::Value) {
    match serde_json::to_string_pretty(json) {
        Ok(pretty) => println!("{}", pretty),
        Err(_) => println!("{}", json),
    }
}

fn print_groups(groups: &[FilterGroup]) {
    if groups.is_empty() {
        println!("(no filters)");
        return;
    }
    for (i, group) in groups.iter().enumerate() {
        let pairs: Vec<String> = group.iter().map(ToString::to_string).collect();
        println!("group {}: {}", i + 1, pairs.join(" AND "));
    }
    println!("normalized: {}", render_filters(groups));
    println!("encoded:    {}", encode_filters(groups));
}

fn print_table(response: &AggregatedQueryResponse) {
    let rows: Vec<FlowRow> = response
        .result
        .iter()
        .flat_map(|stream| {
            let labels = stream
                .labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",");
            stream.entries.iter().map(move |entry| FlowRow {
                time: format_timestamp(&entry.timestamp),
                labels: labels.clone(),
                flow: entry.line.clone(),
            })
        })
        .collect();

    println!("{}", Table::new(rows));
    println!(
        "{} flows from {} queries{}",
        response.stats.total_entries,
        response.stats.num_queries,
        if response.stats.limit_reached {
            " (limit reached)"
        } else {
            ""
        }
    );
}

/// Loki nanosecond timestamps as RFC 3339; anything else as-is.
fn format_timestamp(raw: &str) -> String {
    raw.parse::<i64>()
        .map(|ns| chrono::DateTime::from_timestamp_nanos(ns).to_rfc3339())
        .unwrap_or_else(|_| raw.to_string())
}
