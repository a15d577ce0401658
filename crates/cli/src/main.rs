//! Feedline demo binary.
//!
//! Seeds an in-memory collection, observes it through a [`FeedMerger`], pages
//! back to the beginning, then appends a few live records and prints the
//! merged sequence as JSON lines followed by a summary line.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use feedline_feed::{BoundaryPolicy, CollectionId, FeedConfig, FeedMerger, FeedPhase, FeedView, MemoryBackend, Record, Timestamp};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Feedline command line arguments.
#[derive(Parser, Debug)]
#[command(name = "feedline")]
#[command(about = "Replays a feed over an in-memory collection")]
struct Args {
	/// Feed configuration file (TOML)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Records seeded into the collection before observing
	#[arg(short, long, default_value_t = 60)]
	records: usize,

	/// Records appended after paging finished
	#[arg(short, long, default_value_t = 3)]
	live: usize,

	/// Live window size (overrides the config file)
	#[arg(short, long)]
	window: Option<NonZeroUsize>,

	/// Historical page size (overrides the config file)
	#[arg(short, long)]
	page: Option<NonZeroUsize>,

	/// Treatment of records evicted from the live window
	#[arg(short, long, value_enum)]
	boundary: Option<Boundary>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Boundary {
	Fold,
	Accept,
}

impl From<Boundary> for BoundaryPolicy {
	fn from(boundary: Boundary) -> Self {
		match boundary {
			Boundary::Fold => Self::Fold,
			Boundary::Accept => Self::Accept,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
struct Message {
	author: &'static str,
	body: String,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
	collection: &'a str,
	generation: u64,
	records: usize,
	pages: usize,
	reached_beginning: bool,
	boundary: BoundaryPolicy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	setup_tracing(args.verbose);

	let config = resolve_config(&args)?;
	info!(window = config.window_size.get(), page = config.page_size.get(), boundary = ?config.boundary, "starting feedline");

	let collection = CollectionId::from("demo/messages");
	let backend = Arc::new(MemoryBackend::new());
	let start = Timestamp::now();
	let seeded = i64::try_from(args.records)?;
	backend.seed(&collection, (0..seeded).map(|n| message(start, n)));

	let merger = FeedMerger::new(Arc::clone(&backend), config);
	let mut view = merger.observe(collection.clone());
	let mut current = settle(&mut view, "first snapshot", |v| v.phase == FeedPhase::Ready).await?;
	info!(records = current.len(), "live window ready");

	let mut pages = 0;
	while !current.reached_beginning {
		let held = current.len();
		merger.load_older();
		current = settle(&mut view, "older page", |v| v.reached_beginning || v.last_error.is_some() || v.len() > held).await?;
		if let Some(error) = current.last_error {
			bail!("paging stopped after {pages} pages: {error:?}");
		}
		pages += 1;
		info!(page = pages, records = current.len(), "older page merged");
	}

	let appended = i64::try_from(args.live)?;
	for n in seeded..seeded + appended {
		let record = message(start, n);
		let id = record.id.clone();
		backend.insert(&collection, record);
		current = settle(&mut view, "live record", |v| v.combined.last().is_some_and(|last| last.id == id)).await?;
	}

	for record in current.combined.iter() {
		println!("{}", serde_json::to_string(record)?);
	}
	let summary = Summary {
		collection: collection.as_str(),
		generation: current.generation.get(),
		records: current.len(),
		pages,
		reached_beginning: current.reached_beginning,
		boundary: config.boundary,
	};
	println!("{}", serde_json::to_string(&summary)?);

	merger.shutdown().await?;
	Ok(())
}

fn message(start: Timestamp, n: i64) -> Record<Message> {
	Record::new(
		format!("m{n:05}"),
		Timestamp::from_micros(start.as_micros().saturating_add(n.saturating_mul(1_000_000))),
		Message {
			author: if n % 2 == 0 { "ada" } else { "linus" },
			body: format!("message #{n}"),
		},
	)
}

/// Loads the config file, if any, and applies flag overrides on top.
fn resolve_config(args: &Args) -> anyhow::Result<FeedConfig> {
	let mut config = match &args.config {
		Some(path) => FeedConfig::load(path).with_context(|| format!("failed to load feed config from {}", path.display()))?,
		None => FeedConfig::default(),
	};
	if let Some(window) = args.window {
		config.window_size = window;
	}
	if let Some(page) = args.page {
		config.page_size = page;
	}
	if let Some(boundary) = args.boundary {
		config.boundary = boundary.into();
	}
	Ok(config)
}

async fn settle<F>(view: &mut watch::Receiver<FeedView<Message>>, what: &str, predicate: F) -> anyhow::Result<FeedView<Message>>
where
	F: FnMut(&FeedView<Message>) -> bool,
{
	let seen = tokio::time::timeout(SETTLE_TIMEOUT, view.wait_for(predicate))
		.await
		.with_context(|| format!("timed out waiting for {what}"))??;
	Ok(seen.clone())
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_env("FEEDLINE_LOG").unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("feedline=debug,feedline_feed=debug,info")
		} else {
			EnvFilter::new("feedline=info,warn")
		}
	});

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(true)
		.init();
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn flags_override_config_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "window_size = 10\npage_size = 20\nboundary = \"accept\"").unwrap();
		let path = file.path().to_str().unwrap();

		let args = Args::try_parse_from(["feedline", "--config", path, "--page", "5"]).unwrap();
		let config = resolve_config(&args).unwrap();
		assert_eq!(config.window_size.get(), 10);
		assert_eq!(config.page_size.get(), 5);
		assert_eq!(config.boundary, BoundaryPolicy::Accept);

		let args = Args::try_parse_from(["feedline", "--config", path, "--boundary", "fold"]).unwrap();
		assert_eq!(resolve_config(&args).unwrap().boundary, BoundaryPolicy::Fold);
	}

	#[test]
	fn missing_config_file_is_reported() {
		let args = Args::try_parse_from(["feedline", "--config", "/nonexistent/feedline.toml"]).unwrap();
		let error = resolve_config(&args).unwrap_err();
		assert!(error.to_string().contains("/nonexistent/feedline.toml"));
	}

	#[test]
	fn zero_window_is_rejected() {
		assert!(Args::try_parse_from(["feedline", "--window", "0"]).is_err());
	}

	#[test]
	fn messages_ascend_by_index() {
		let start = Timestamp::from_micros(0);
		assert!(message(start, 1).key() < message(start, 2).key());
		assert_eq!(message(start, 7).id.as_str(), "m00007");
	}
}
