use clap::Parser;
use feed_db::{
    realtime::replay, Config, ConfigError, DirectorySeed, Feed, FeedEntry, FeedFilter, MergeOutcome,
    PushHub, SimulatedRemote, SortStrategy,
};
use feed_msg::{FeedItem, PushEvent};
use feed_ref::{ItemId, UserId};
use log::{error, info, warn};
use serde::Deserialize;
use simple_home_dir::home_dir;
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
enum Error {
    #[error("Failed to read {path:?}, cause: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Json error in {path:?}, cause: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Config error, cause: {0}")]
    Config(#[from] ConfigError),
    #[error("Feed error, cause: {0}")]
    Feed(#[from] feed_db::Error),
    #[error("Replay task failed, cause: {0}")]
    Replay(#[from] tokio::task::JoinError),
}

/// Rank a seeded alumni feed, apply a few actions and replay push events.
#[derive(Debug, Parser)]
#[command(name = "alumni-feed", version)]
struct Args {
    /// Seed file: `{ "items": [...], "authors": [...], "groups": [...], "events": [...], "jobs": [...] }`
    #[arg(long)]
    catalog: PathBuf,
    /// Push events to replay after the first page is shown
    #[arg(long)]
    events: Option<PathBuf>,
    /// Defaults to ~/.alumni-feed/config.json when present
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "me")]
    user: UserId,
    #[arg(long, default_value = "top")]
    sort: SortStrategy,
    #[arg(long, default_value = "all")]
    filter: FeedFilter,
    /// Pages to load before the actions run
    #[arg(long, default_value_t = 1)]
    pages: usize,
    #[arg(long = "like")]
    likes: Vec<ItemId>,
    #[arg(long = "share")]
    shares: Vec<ItemId>,
    #[arg(long = "mute")]
    mutes: Vec<UserId>,
    /// Delay between replayed push events
    #[arg(long, default_value_t = 250)]
    interval_ms: u64,
}

#[derive(Debug, Deserialize)]
struct Seed {
    #[serde(default)]
    items: Vec<FeedItem>,
    #[serde(flatten)]
    directory: DirectorySeed,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(err) = run(Args::parse()).await {
        error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let config = load_config(args.config.as_deref())?;
    let seed: Seed = read_json(&args.catalog)?;

    let remote = SimulatedRemote::new(config.remote.clone());
    let mut feed = Feed::new(args.user.clone(), config, remote)?.with_directory(seed.directory.into());
    feed.seed(seed.items)?;

    let page = feed.get_page(1, args.sort, args.filter)?;
    info!("page 1: {} of {} items", page.entries.len(), page.total);
    for _ in 1..args.pages {
        if !feed.view().has_more() {
            break;
        }
        feed.load_more()?;
    }

    for author in args.mutes {
        let hidden = feed.mute_author(author.clone());
        info!("muted {}, {} entries hidden", author, hidden);
    }
    for item_id in &args.likes {
        match feed.like_toggle(item_id).await {
            Ok(likes) => info!("{} now has {} likes", item_id, likes.len()),
            Err(err) if err.is_transient() => warn!("like on {} not confirmed: {}", item_id, err),
            Err(err) => return Err(err.into()),
        }
    }
    for item_id in &args.shares {
        match feed.share(item_id, None).await {
            Ok(shared) => info!("shared {} as {}", item_id, shared.id),
            Err(err) if err.is_transient() => warn!("share of {} not confirmed: {}", item_id, err),
            Err(err) => return Err(err.into()),
        }
    }

    print_view(feed.view().entries());

    if let Some(path) = args.events {
        let events: Vec<PushEvent> = read_json(&path)?;
        let hub = PushHub::new();
        feed.connect_realtime(&hub);

        let delivered = replay(hub, events, Duration::from_millis(args.interval_ms)).await?;
        let outcomes = feed.pump_realtime();
        let inserted = outcomes
            .iter()
            .filter(|outcome| **outcome == MergeOutcome::Inserted)
            .count();
        info!(
            "replayed {} push events: {} inserted, {} merged in total",
            delivered,
            inserted,
            outcomes.len()
        );
        feed.disconnect_realtime();

        print_view(feed.view().entries());
    }

    let failed = feed.outbox().failed().count();
    if failed > 0 {
        warn!("{} mutations were not confirmed by the remote", failed);
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config, Error> {
    if let Some(path) = path {
        return Ok(Config::from_path(path)?);
    }
    match home_dir().map(|home| home.join(".alumni-feed").join("config.json")) {
        Some(default_path) if default_path.exists() => {
            info!("using config at {}", default_path.display());
            Ok(Config::from_path(default_path)?)
        }
        _ => Ok(Config::default()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let json = fs::read_to_string(path).map_err(|source| Error::ReadFile {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| Error::Json {
        path: path.to_owned(),
        source,
    })
}

fn print_view(entries: &[FeedEntry]) {
    println!("{:>3}  {:<14} {:<20} {:>10}  {}", "#", "id", "kind", "score", "author");
    for (rank, entry) in entries.iter().enumerate() {
        let author = entry
            .author
            .as_ref()
            .map(|profile| profile.name.as_str())
            .or_else(|| entry.item.author_id.as_ref().map(|id| id.as_str()))
            .unwrap_or("-");
        println!(
            "{:>3}  {:<14} {:<20} {:>10.2}  {}",
            rank + 1,
            entry.id().as_str(),
            entry.item.kind().as_str(),
            entry.score,
            author
        );
    }
}
