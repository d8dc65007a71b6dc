//! Logs query command
//!
//! Query a running server's history, or tail its live stream.

use anyhow::{anyhow, Result};
use clap::Parser;
use colored::Colorize;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use opslog::logs::{LogEntry, LogLevel, LogQuery, Page};
use std::time::Duration;

/// Upper bound for the reconnect delay in follow mode
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Query and display logs
#[derive(Debug, Clone, Parser)]
pub struct LogsArgs {
    /// Base URL of the running server
    #[arg(long, env = "OPSLOG_URL", default_value = "http://127.0.0.1:8080")]
    pub url: String,

    /// Filter by exact source
    #[arg(short, long)]
    pub source: Option<String>,

    /// Minimum level (DEBUG, INFO, WARNING, ERROR, CRITICAL)
    #[arg(short, long)]
    pub level: Option<String>,

    /// Case-insensitive message substring
    #[arg(short = 'q', long = "query")]
    pub query: Option<String>,

    /// Maximum number of results (0 = all retained)
    #[arg(long, default_value = "100")]
    pub limit: usize,

    /// Only entries with an id greater than this
    #[arg(long)]
    pub after: Option<u64>,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    pub format: String,

    /// Follow logs in real-time (tail -f mode)
    #[arg(long)]
    pub follow: bool,
}

impl LogsArgs {
    fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Client-side filter for follow mode, where the stream carries every entry
    fn stream_filter(&self) -> Result<LogQuery> {
        let level = self
            .level
            .as_deref()
            .map(|l| l.parse::<LogLevel>())
            .transpose()
            .map_err(|e| anyhow!("{}", e))?;

        Ok(LogQuery {
            source: self.source.clone(),
            level,
            q: self.query.clone(),
            limit: 0,
            after: None,
        })
    }
}

/// Execute the logs command
pub async fn execute(args: LogsArgs) -> Result<()> {
    let client = reqwest::Client::new();

    if args.follow {
        return follow_logs(&client, &args).await;
    }

    let page = fetch_page(&client, &args, args.after, args.limit).await?;

    if page.items.is_empty() {
        println!("{}", "No logs found matching the criteria".yellow());
        return Ok(());
    }

    match args.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        _ => {
            println!("{}", format!("Found {} log entries", page.items.len()).bold());
            println!();
            for entry in &page.items {
                print_entry(entry);
            }
            if let Some(next) = page.next {
                println!();
                println!("{}", format!("next cursor: --after {}", next).dimmed());
            }
        }
    }

    Ok(())
}

/// GET /logs with the args' filters and the given cursor and page size
async fn fetch_page(
    client: &reqwest::Client,
    args: &LogsArgs,
    after: Option<u64>,
    limit: usize,
) -> Result<Page> {
    let mut params: Vec<(&str, String)> = vec![("limit", limit.to_string())];
    if let Some(source) = &args.source {
        params.push(("source", source.clone()));
    }
    if let Some(level) = &args.level {
        params.push(("level", level.clone()));
    }
    if let Some(q) = &args.query {
        params.push(("q", q.clone()));
    }
    if let Some(after) = after {
        params.push(("after", after.to_string()));
    }

    let response = client
        .get(format!("{}/logs", args.base_url()))
        .query(&params)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("Server returned {}: {}", status, body));
    }

    Ok(response.json::<Page>().await?)
}

/// Tail the SSE stream, reconnecting with exponential backoff and resuming
/// from the last id seen
async fn follow_logs(client: &reqwest::Client, args: &LogsArgs) -> Result<()> {
    let filter = args.stream_filter()?;
    let mut last_id = args.after;
    let mut retry: u32 = 0;

    println!("{}", "Following logs (Ctrl+C to stop)...".bold());
    println!();

    loop {
        match stream_once(client, args, &filter, &mut last_id, &mut retry).await {
            Ok(()) => eprintln!("{}", "Stream closed by server".yellow()),
            Err(e) => eprintln!("{}", format!("Stream error: {}", e).red()),
        }

        let delay = reconnect_delay(retry);
        retry = retry.saturating_add(1);
        eprintln!(
            "{}",
            format!("Reconnecting in {:.1}s...", delay.as_secs_f64()).dimmed()
        );
        tokio::time::sleep(delay).await;
    }
}

async fn stream_once(
    client: &reqwest::Client,
    args: &LogsArgs,
    filter: &LogQuery,
    last_id: &mut Option<u64>,
    retry: &mut u32,
) -> Result<()> {
    let mut request = client
        .get(format!("{}/logs/stream", args.base_url()))
        .header(reqwest::header::ACCEPT, "text/event-stream");
    if let Some(id) = *last_id {
        request = request.header("Last-Event-ID", id.to_string());
    }

    let response = request.send().await?.error_for_status()?;
    *retry = 0;

    // Ids already printed by an overflow catch-up on this connection
    let mut skip_through = 0;

    let mut events = response.bytes_stream().eventsource();
    while let Some(event) = events.next().await {
        let event = event.map_err(|e| anyhow!("{}", e))?;

        if event.event == "warning" {
            eprintln!(
                "{}",
                "warning: stream queue overflowed, fetching skipped entries".yellow().bold()
            );
            let Some(resume) = overflow_last_id(&event.data).or(*last_id) else {
                eprintln!("{}", "no cursor to catch up from, continuing live".dimmed());
                continue;
            };

            let page = fetch_page(client, args, Some(resume), 0).await?;
            for entry in &page.items {
                print_streamed(args, entry)?;
            }
            if let Some(next) = page.next {
                skip_through = skip_through.max(next);
                *last_id = Some(next.max(resume));
            }
            continue;
        }

        let entry: LogEntry = serde_json::from_str(&event.data)?;
        if entry.id <= skip_through {
            continue;
        }
        *last_id = Some(entry.id);

        if filter.matches(&entry) {
            print_streamed(args, &entry)?;
        }
    }

    Ok(())
}

/// Cursor carried by an overflow warning: the last id the server sent on this stream
fn overflow_last_id(data: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(data)
        .ok()?
        .get("last_id")?
        .as_u64()
}

fn print_streamed(args: &LogsArgs, entry: &LogEntry) -> Result<()> {
    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string(entry)?),
        _ => print_entry(entry),
    }
    Ok(())
}

/// `min(1s * 2^retry, 30s)`
fn reconnect_delay(retry: u32) -> Duration {
    let factor = 1u64 << retry.min(5);
    Duration::from_secs(factor).min(MAX_RECONNECT_DELAY)
}

/// Display one entry in human-friendly text format
fn print_entry(entry: &LogEntry) {
    let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");

    let level = entry.level.as_str();
    let level_colored = match entry.level {
        LogLevel::Critical => level.magenta().bold(),
        LogLevel::Error => level.red().bold(),
        LogLevel::Warning => level.yellow().bold(),
        LogLevel::Info => level.green(),
        LogLevel::Debug => level.blue(),
    };

    println!(
        "{} {} {} {} {}",
        format!("#{}", entry.id).dimmed(),
        timestamp.to_string().dimmed(),
        level_colored,
        entry.source.as_deref().unwrap_or("-").cyan(),
        entry.message
    );

    if let Some(metadata) = entry.metadata.as_ref().filter(|m| !m.is_empty()) {
        if let Ok(fields) = serde_json::to_string(metadata) {
            println!("  {}", format!("metadata: {}", fields).dimmed());
        }
    }
}
