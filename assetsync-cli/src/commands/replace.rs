//! `assetsync replace`: converge the remote store with the working root.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use assetsync_core::config::{self, config_path_at};
use assetsync_core::{AssetEvent, EventAction, LogEntry, Outcome, RateLimitConfig, RunConfig};
use assetsync_engine::queue::log_queue;
use assetsync_engine::{
    plan, replace, shutdown, DirectoryRemote, FsLocalSource, ReplaceRequest, RunReport,
};

use crate::LoadFailurePolicyArg;

/// Arguments for `assetsync replace`.
#[derive(Args, Debug)]
pub struct ReplaceArgs {
    /// Files to upload, relative to the root. Omit to reconcile everything.
    pub filenames: Vec<String>,

    /// Working root holding the local assets (defaults to the current directory).
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Directory acting as the remote store. Overrides `remote` in assetsync.yaml.
    #[arg(long)]
    pub remote: Option<PathBuf>,

    /// Burst size of the rate limiter.
    #[arg(long, requires = "rate_drain")]
    pub rate_capacity: Option<u32>,

    /// Sustained dispatches per second.
    #[arg(long, requires = "rate_capacity")]
    pub rate_drain: Option<f64>,

    /// What to do with named files that cannot be loaded: skip, warn or abort.
    #[arg(long)]
    pub on_load_failure: Option<LoadFailurePolicyArg>,

    /// Depth of the event queues.
    #[arg(long)]
    pub queue_depth: Option<usize>,

    /// Show the planned changes without touching the remote store.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit one JSON object per line instead of human-readable output.
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, short)]
    pub verbose: bool,
}

impl ReplaceArgs {
    pub fn run(self) -> Result<()> {
        init_tracing(self.verbose);

        let root = match self.root.clone() {
            Some(root) => root,
            None => std::env::current_dir().context("could not determine current directory")?,
        };
        let mut config = config::load_at(&root).with_context(|| {
            format!("failed to load {}", config_path_at(&root).display())
        })?;
        self.apply_overrides(&mut config);
        config.validate().context("invalid configuration")?;

        let remote_root = config.remote.clone().context(
            "no remote store configured; pass --remote or set `remote` in assetsync.yaml",
        )?;
        let request = ReplaceRequest::from_config(&root, &config).with_filenames(self.filenames);
        let remote = DirectoryRemote::new(&remote_root);
        let local = FsLocalSource::new().exclude(&remote_root);
        tracing::debug!(
            root = %root.display(),
            remote = %remote.root().display(),
            mode = ?request.mode(),
            "replace configured"
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start tokio runtime")?;

        if self.dry_run {
            let events = runtime
                .block_on(plan(&request, &remote, &local))
                .context("failed to plan replace")?;
            return print_plan(&events, self.json);
        }

        let (report, tally) = runtime.block_on(execute(request, remote, local, self.json))?;
        if !self.json {
            print_summary(&report, &tally);
        }
        if report.cancelled {
            bail!("replace interrupted before every change was dispatched");
        }
        if report.aborted {
            let file = report
                .skipped
                .last()
                .map(|skipped| skipped.filename.as_str())
                .unwrap_or("<unknown>");
            bail!("replace aborted: '{file}' could not be loaded");
        }
        if tally.failed > 0 {
            bail!("{} asset(s) failed to replace", tally.failed);
        }
        Ok(())
    }

    fn apply_overrides(&self, config: &mut RunConfig) {
        if let Some(remote) = &self.remote {
            config.remote = Some(remote.clone());
        }
        if let (Some(capacity), Some(drain)) = (self.rate_capacity, self.rate_drain) {
            config.rate_limit = Some(RateLimitConfig::new(capacity, drain));
        }
        if let Some(policy) = self.on_load_failure {
            config.on_load_failure = policy.into();
        }
        if let Some(depth) = self.queue_depth {
            config.queue_depth = Some(depth);
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    changed: usize,
    unchanged: usize,
    failed: usize,
}

impl Tally {
    fn record(&mut self, entry: &LogEntry) {
        match entry.outcome {
            Outcome::Succeeded => self.changed += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }
}

async fn execute(
    request: ReplaceRequest,
    remote: DirectoryRemote,
    local: FsLocalSource,
    json: bool,
) -> Result<(RunReport, Tally)> {
    let (trigger, signal) = shutdown::channel();
    let (sink, mut logs) = log_queue();

    let completion = replace(request, Arc::new(remote), Arc::new(local), sink, signal)
        .await
        .context("replace failed to start")?;

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping dispatch");
            trigger.fire();
        }
    });
    let printer = tokio::spawn(async move {
        let mut tally = Tally::default();
        while let Some(entry) = logs.recv().await {
            tally.record(&entry);
            print_entry(&entry, json);
        }
        tally
    });

    let report = completion.wait().await.context("replace did not complete")?;
    let tally = printer.await.context("log printer task failed")?;
    interrupt.abort();
    Ok((report, tally))
}

fn print_entry(entry: &LogEntry, json: bool) {
    if json {
        match serde_json::to_string(entry) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::error!(key = %entry.key, error = %err, "failed to serialize log entry"),
        }
        return;
    }
    let line = match (&entry.outcome, entry.action) {
        (Outcome::Succeeded, EventAction::Upload) => format!("  ✎  {}", entry.key).green(),
        (Outcome::Succeeded, EventAction::Removal) => format!("  ✗  {}", entry.key).yellow(),
        (Outcome::Unchanged, _) => format!("  ·  {}", entry.key).dimmed(),
        (Outcome::Failed { reason }, action) => {
            format!("  !  {} ({action}): {reason}", entry.key).red()
        }
    };
    println!("{line}");
}

fn print_summary(report: &RunReport, tally: &Tally) {
    let marker = if tally.failed > 0 || report.aborted || report.cancelled {
        "✗".red().bold()
    } else {
        "✓".green().bold()
    };
    println!(
        "{marker} replace finished ({} changed, {} unchanged, {} failed, {} skipped)",
        tally.changed,
        tally.unchanged,
        tally.failed,
        report.skipped.len()
    );
    for skipped in &report.skipped {
        println!("  {}  {}: {}", "?".yellow(), skipped.filename, skipped.error);
    }
}

#[derive(Serialize, Tabled)]
struct PlanRow {
    #[tabled(rename = "action")]
    action: EventAction,
    #[tabled(rename = "key")]
    key: String,
    #[tabled(rename = "bytes", display_with = "display_size")]
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<usize>,
}

fn display_size(bytes: &Option<usize>) -> String {
    bytes.map_or_else(|| "-".to_string(), |n| n.to_string())
}

impl From<&AssetEvent> for PlanRow {
    fn from(event: &AssetEvent) -> Self {
        let bytes = match event {
            AssetEvent::Upload { asset } => Some(asset.len()),
            AssetEvent::Removal { .. } => None,
        };
        Self {
            action: event.action(),
            key: event.key().to_string(),
            bytes,
        }
    }
}

fn print_plan(events: &[AssetEvent], json: bool) -> Result<()> {
    let rows: Vec<PlanRow> = events.iter().map(PlanRow::from).collect();
    if json {
        for row in &rows {
            println!(
                "{}",
                serde_json::to_string(row).context("failed to serialize plan row")?
            );
        }
        return Ok(());
    }
    if rows.is_empty() {
        println!("[dry-run] ✓ nothing to do");
        return Ok(());
    }
    println!("[dry-run] {} change(s) planned", rows.len());
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
