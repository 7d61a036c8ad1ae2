use std::fs;
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use nu_ansi_term::Color;
use serde_json::json;

use crate::models::{CaptureRole, DiffPatch, DiffResult, PatchStats, ResultId, UrlId};
use crate::pipeline::{self, DiffEngine, DiffLimits, DEFAULT_MAX_LINES};
use crate::runtime;
use crate::storage::{StorageEngine, Store};
use crate::tracker::{self, DiffTracker};
use crate::util;

#[derive(Parser)]
#[command(author, version, about = "pagediff web page change tracker")]
pub struct Cli {
    #[arg(short, long, action = ArgAction::Count, global = true, help = "Increase verbosity (-v, -vv)")]
    verbose: u8,
    #[arg(long, global = true, env = "PAGEDIFF_DB", help = "Database path (defaults to ~/.pagediff/pagediff.db)")]
    db: Option<PathBuf>,
    #[arg(long, global = true, env = "PAGEDIFF_MAX_LINES", default_value_t = DEFAULT_MAX_LINES, help = "Largest document, in lines, the diff engine accepts")]
    max_lines: usize,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(subcommand)]
    Url(UrlCommands),
    #[command(subcommand)]
    Snapshot(SnapshotCommands),
    Diff(DiffArgs),
    Compare(CompareArgs),
    #[command(subcommand)]
    Result(ResultCommands),
    #[command(subcommand)]
    Polls(PollCommands),
}

#[derive(Subcommand)]
pub enum UrlCommands {
    Add(UrlAddArgs),
    List(JsonArgs),
    Show(UrlIdArgs),
    Activate(UrlIdArgs),
    Deactivate(UrlIdArgs),
    Remove(UrlIdArgs),
}

#[derive(Args)]
pub struct UrlAddArgs {
    pub url: String,
}

#[derive(Args)]
pub struct UrlIdArgs {
    pub id: i64,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct JsonArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum SnapshotCommands {
    Record(SnapshotRecordArgs),
    Latest(SnapshotLatestArgs),
    List(SnapshotListArgs),
}

#[derive(Args)]
pub struct SnapshotRecordArgs {
    #[arg(long)]
    pub url_id: i64,
    #[arg(long, help = "pre or post")]
    pub role: String,
    #[arg(long, help = "Read capture from file instead of stdin")]
    pub file: Option<PathBuf>,
    #[arg(long, value_name = "RFC3339", help = "Capture time (defaults to now)")]
    pub at: Option<String>,
}

#[derive(Args)]
pub struct SnapshotLatestArgs {
    #[arg(long)]
    pub url_id: i64,
    #[arg(long)]
    pub role: String,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct SnapshotListArgs {
    #[arg(long)]
    pub url_id: i64,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct DiffArgs {
    pub pre: PathBuf,
    pub post: PathBuf,
    #[arg(long)]
    pub json: bool,
    #[arg(long)]
    pub stat: bool,
}

#[derive(Args)]
pub struct CompareArgs {
    #[arg(long, conflicts_with = "all", required_unless_present = "all")]
    pub url_id: Option<i64>,
    #[arg(long, help = "Compare every active URL")]
    pub all: bool,
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum ResultCommands {
    Show(ResultShowArgs),
    List(ResultListArgs),
    Delete(ResultDeleteArgs),
}

#[derive(Args)]
pub struct ResultShowArgs {
    pub id: i64,
    #[arg(long)]
    pub json: bool,
    #[arg(long)]
    pub stat: bool,
}

#[derive(Args)]
pub struct ResultListArgs {
    #[arg(long)]
    pub url_id: i64,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ResultDeleteArgs {
    pub id: i64,
}

#[derive(Subcommand)]
pub enum PollCommands {
    Last(JsonArgs),
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    runtime::init_tracing(cli.verbose)?;
    let engine = DiffEngine::new(DiffLimits {
        max_lines: cli.max_lines,
    });
    match cli.command {
        Commands::Diff(args) => handle_diff(&engine, args),
        Commands::Url(cmd) => handle_url(&open_tracker(cli.db, engine)?, cmd),
        Commands::Snapshot(cmd) => handle_snapshot(&open_tracker(cli.db, engine)?, cmd),
        Commands::Compare(args) => handle_compare(open_tracker(cli.db, engine)?, args).await,
        Commands::Result(cmd) => handle_result(&open_tracker(cli.db, engine)?, cmd),
        Commands::Polls(cmd) => handle_polls(&open_tracker(cli.db, engine)?, cmd),
    }
}

fn open_tracker(db: Option<PathBuf>, engine: DiffEngine) -> Result<DiffTracker<StorageEngine>> {
    let path = match db {
        Some(path) => path,
        None => util::default_db_path()?,
    };
    let storage = StorageEngine::open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(DiffTracker::new(storage, engine))
}

fn handle_url(tracker: &DiffTracker<StorageEngine>, cmd: UrlCommands) -> Result<()> {
    let store = tracker.store();
    match cmd {
        UrlCommands::Add(args) => {
            let url = tracker.add_url(&args.url)?;
            println!("Added url {} ({})", url.id, url.url);
        }
        UrlCommands::List(args) => {
            let urls = store.list_urls()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&urls)?);
            } else if urls.is_empty() {
                println!("No urls monitored yet");
            } else {
                println!("{:<6} {:<8} {}", "Id", "Active", "Url");
                for url in urls {
                    println!("{:<6} {:<8} {}", url.id, url.active, url.url);
                }
            }
        }
        UrlCommands::Show(args) => {
            let url = tracker.require_url(UrlId(args.id))?;
            let snapshots = store.list_snapshots(url.id)?;
            let results = store.list_diff_results(url.id)?;
            if args.json {
                let payload = json!({
                    "url": url,
                    "snapshots": snapshots.len(),
                    "results": results.len(),
                    "latest_result": results.first(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Url: {} ({})", url.url, url.id);
                println!("Active: {}", url.active);
                println!("Created: {}", url.created_at);
                println!("Snapshots: {}", snapshots.len());
                println!("Results: {}", results.len());
                if let Some(latest) = results.first() {
                    println!(
                        "Latest result: {} at {} ({})",
                        latest.id,
                        latest.captured_at,
                        stats_line(&latest.stats)
                    );
                }
            }
        }
        UrlCommands::Activate(args) => {
            store.set_url_active(UrlId(args.id), true)?;
            println!("Url {} activated", args.id);
        }
        UrlCommands::Deactivate(args) => {
            store.set_url_active(UrlId(args.id), false)?;
            println!("Url {} deactivated", args.id);
        }
        UrlCommands::Remove(args) => {
            store.delete_url(UrlId(args.id))?;
            println!("Url {} removed with its snapshots and results", args.id);
        }
    }
    Ok(())
}

fn handle_snapshot(tracker: &DiffTracker<StorageEngine>, cmd: SnapshotCommands) -> Result<()> {
    match cmd {
        SnapshotCommands::Record(args) => {
            let role: CaptureRole = args.role.parse()?;
            let text = match args.file {
                Some(ref path) => fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read capture from stdin")?;
                    buf
                }
            };
            let captured_at = match args.at {
                Some(ref ts) => parse_datetime(ts)?,
                None => util::now_utc(),
            };
            let snapshot = tracker.record_snapshot(UrlId(args.url_id), role, &text, captured_at)?;
            println!(
                "Recorded {} snapshot {} for url {} ({})",
                snapshot.role,
                snapshot.id,
                snapshot.url_id,
                short_hash(&snapshot.body_hash)
            );
        }
        SnapshotCommands::Latest(args) => {
            let role: CaptureRole = args.role.parse()?;
            match tracker.get_latest_snapshot(UrlId(args.url_id), role)? {
                Some(snapshot) if args.json => {
                    println!("{}", serde_json::to_string_pretty(&snapshot)?)
                }
                Some(snapshot) => {
                    println!(
                        "Snapshot {} ({}) captured {}",
                        snapshot.id, snapshot.role, snapshot.captured_at
                    );
                    println!("{}", snapshot.body);
                }
                None => println!("No {role} snapshot yet for url {}", args.url_id),
            }
        }
        SnapshotCommands::List(args) => {
            let snapshots = tracker.catalog().find_all(UrlId(args.url_id))?;
            if args.json {
                let rows: Vec<_> = snapshots
                    .iter()
                    .map(|s| {
                        json!({
                            "id": s.id,
                            "role": s.role,
                            "captured_at": s.captured_at,
                            "body_hash": s.body_hash,
                            "bytes": s.body.len(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!(
                    "{:<8} {:<11} {:<32} {:>9} {}",
                    "Id", "Role", "Captured", "Bytes", "Hash"
                );
                for s in snapshots {
                    println!(
                        "{:<8} {:<11} {:<32} {:>9} {}",
                        s.id,
                        s.role.as_str(),
                        s.captured_at.to_rfc3339(),
                        s.body.len(),
                        short_hash(&s.body_hash)
                    );
                }
            }
        }
    }
    Ok(())
}

fn handle_diff(engine: &DiffEngine, args: DiffArgs) -> Result<()> {
    let pre = fs::read_to_string(&args.pre)
        .with_context(|| format!("failed to read {}", args.pre.display()))?;
    let post = fs::read_to_string(&args.post)
        .with_context(|| format!("failed to read {}", args.post.display()))?;
    let patch = pipeline::compute_diff(engine, &pre, &post, util::now_utc())?;
    print_patch(&patch, args.json, args.stat)
}

async fn handle_compare(tracker: DiffTracker<StorageEngine>, args: CompareArgs) -> Result<()> {
    if args.all {
        let outcomes = tracker::compare_active(Arc::new(tracker)).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
            return Ok(());
        }
        if outcomes.is_empty() {
            println!("No active urls to compare");
        }
        for outcome in outcomes {
            match (outcome.result_id, outcome.stats, outcome.error) {
                (Some(id), Some(stats), _) => println!(
                    "url {} -> result {} ({})",
                    outcome.url_id,
                    id,
                    stats_line(&stats)
                ),
                (_, _, Some(err)) => println!("url {} failed: {}", outcome.url_id, err),
                _ => println!("url {} produced no result", outcome.url_id),
            }
        }
        return Ok(());
    }

    let url_id = args
        .url_id
        .ok_or_else(|| anyhow!("provide --url-id or --all"))?;
    let result = tracker.compare_latest(UrlId(url_id))?;
    print_result(&result, args.json, true)
}

fn handle_result(tracker: &DiffTracker<StorageEngine>, cmd: ResultCommands) -> Result<()> {
    let store = tracker.store();
    match cmd {
        ResultCommands::Show(args) => {
            let Some(result) = store.load_diff_result(ResultId(args.id))? else {
                bail!("diff result {} not found", args.id);
            };
            print_result(&result, args.json, args.stat)?;
        }
        ResultCommands::List(args) => {
            let results = store.list_diff_results(UrlId(args.url_id))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No results yet for url {}", args.url_id);
            } else {
                println!("{:<8} {:<32} {}", "Result", "Captured", "Changes");
                for entry in results {
                    println!(
                        "{:<8} {:<32} {}",
                        entry.id,
                        entry.captured_at.to_rfc3339(),
                        stats_line(&entry.stats)
                    );
                }
            }
        }
        ResultCommands::Delete(args) => {
            store.delete_diff_result(ResultId(args.id))?;
            println!("Deleted diff result {}", args.id);
        }
    }
    Ok(())
}

fn handle_polls(tracker: &DiffTracker<StorageEngine>, cmd: PollCommands) -> Result<()> {
    match cmd {
        PollCommands::Last(args) => {
            let last = tracker.store().last_poll()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&last)?);
            } else {
                match last {
                    Some(poll) => println!(
                        "Last poll at {} ({})",
                        poll.polled_at,
                        if poll.success { "ok" } else { "with failures" }
                    ),
                    None => println!("Never polled"),
                }
            }
        }
    }
    Ok(())
}

fn print_result(result: &DiffResult, json: bool, stat: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    if let Some(id) = result.id {
        println!("Result: {}", id);
    }
    println!("Url: {}", result.url_id);
    println!("Captured: {}", result.captured_at);
    for snapshot in &result.snapshots {
        println!(
            "Snapshot {} ({}) at {}",
            snapshot.id, snapshot.role, snapshot.captured_at
        );
    }
    print_patch(&result.patch, false, stat)
}

fn print_patch(patch: &DiffPatch, json: bool, stat: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(patch)?);
        return Ok(());
    }
    if !patch.has_deltas() {
        println!("No changes detected");
        return Ok(());
    }
    if stat {
        println!("{}", stats_line(&patch.stats()));
        return Ok(());
    }
    if !std::io::stdout().is_terminal() {
        print!("{}", pipeline::render_patch(patch));
        return Ok(());
    }
    for delta in &patch.deltas {
        let header = pipeline::hunk_header(delta);
        println!("{}", Color::Cyan.paint(header));
        for line in delta.source_lines() {
            println!("{}", Color::Red.paint(format!("-{line}")));
        }
        for line in delta.target_lines() {
            println!("{}", Color::Green.paint(format!("+{line}")));
        }
    }
    Ok(())
}

fn stats_line(stats: &PatchStats) -> String {
    format!(
        "deltas={} changes={} inserts={} deletes={} lines={} +{} -{}",
        stats.deltas,
        stats.changes,
        stats.inserts,
        stats.deletes,
        stats.lines_affected,
        stats.lines_added,
        stats.lines_removed
    )
}

fn parse_datetime(input: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(input)
        .with_context(|| format!("invalid RFC3339 timestamp: {input}"))?;
    Ok(parsed.with_timezone(&Utc))
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(12).collect()
}
