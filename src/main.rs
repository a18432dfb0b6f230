use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plugin_db::{
    cache::{ContentCache, HttpDownloader},
    config::Config,
    database::{CacheOnlyProvider, DatabaseSettings, PluginDatabase},
    host::{HostServices, InMemoryHost},
    models::PluginPaths,
};

#[derive(Parser)]
#[command(name = "plugin-db")]
#[command(version)]
#[command(about = "Inspect and maintain a plugin record database and its file cache")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "plugin-db.toml")]
    config: String,

    /// Plugin name (overrides config file)
    #[arg(short, long, value_name = "NAME")]
    name: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Remote file cache
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Plugin records
    #[command(subcommand)]
    Records(RecordsCommand),
    /// Plugin tags on catalog entities
    #[command(subcommand)]
    Tags(TagsCommand),
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Download a URL into the cache unless already cached
    Fetch {
        url: String,
        /// Shrink images to fit a square of this size
        #[arg(long, default_value_t = 0)]
        resize: u32,
    },
    /// Report whether a URL is cached
    Check { url: String },
    /// Remove a URL from the cache
    Evict { url: String },
    /// Remove every cached file
    Clear,
}

#[derive(Subcommand)]
enum RecordsCommand {
    /// Print every record as JSON
    List,
    /// Print visible entities without data
    Missing,
    /// Remove records whose entity is gone from the catalog
    Orphans,
    /// Remove the records of every catalog entity
    Clear,
}

#[derive(Subcommand)]
enum TagsCommand {
    /// Retag every visible entity from its record
    RetagAll,
    /// Strip plugin tags from every visible entity
    RemoveAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("plugin_db={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);
    if let Some(name) = cli.name {
        config.plugin.name = name;
    }

    tokio::select! {
        result = run(cli.command, config) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted");
            Ok(())
        }
    }
}

async fn run(command: Command, config: Config) -> Result<()> {
    let paths = PluginPaths::new(
        &config.plugin.name,
        config.paths.install_path.as_deref(),
        &config.paths.user_data_root,
        &config.paths.cache_root,
    );
    let downloader = Arc::new(HttpDownloader::new(&config.cache)?);

    match command {
        Command::Cache(command) => {
            let cache = ContentCache::new(&paths.cache_path, downloader);
            run_cache(command, &cache).await
        }
        Command::Records(command) => {
            let host = Arc::new(InMemoryHost::load_catalog(&config.paths.catalog)?);
            let db = open_database(&config, paths, host.clone(), downloader).await?;
            let result = run_records(command, &db).await;
            db.shutdown();
            host.save_catalog(&config.paths.catalog)?;
            result
        }
        Command::Tags(command) => {
            let host = Arc::new(InMemoryHost::load_catalog(&config.paths.catalog)?);
            let db = open_database(&config, paths, host.clone(), downloader).await?;
            let summary = match command {
                TagsCommand::RetagAll => db.add_tag_all().await,
                TagsCommand::RemoveAll => db.remove_tag_all().await,
            };
            db.shutdown();
            host.save_catalog(&config.paths.catalog)?;
            println!("{summary}");
            Ok(())
        }
    }
}

async fn open_database(
    config: &Config,
    paths: PluginPaths,
    host: Arc<InMemoryHost>,
    downloader: Arc<HttpDownloader>,
) -> Result<Arc<PluginDatabase<CacheOnlyProvider>>> {
    let db = Arc::new(PluginDatabase::new(
        DatabaseSettings::from(config),
        paths,
        CacheOnlyProvider,
        HostServices::in_memory(host),
        downloader,
    )?);
    if !db.initialize().await {
        bail!("Failed to load database {}", config.plugin.name);
    }
    Ok(db)
}

async fn run_cache(command: CacheCommand, cache: &ContentCache) -> Result<()> {
    match command {
        CacheCommand::Fetch { url, resize } => match cache.fetch(&url, resize).await? {
            Some(path) => println!("{}", path.display()),
            None => println!("nothing cached for {url}"),
        },
        CacheCommand::Check { url } => {
            let cached = cache.is_cached(&url);
            match cache.cache_path_for(&url) {
                Ok(path) => println!("{cached}\t{}", path.display()),
                Err(_) => println!("{cached}"),
            }
        }
        CacheCommand::Evict { url } => println!("{}", cache.evict(&url).await),
        CacheCommand::Clear => println!("{}", cache.clear().await?),
    }
    Ok(())
}

async fn run_records(
    command: RecordsCommand,
    db: &PluginDatabase<CacheOnlyProvider>,
) -> Result<()> {
    match command {
        RecordsCommand::List => {
            let mut games = db.data_games();
            games.sort_by(|a, b| a.name.cmp(&b.name));
            println!("{}", serde_json::to_string_pretty(&games)?);
        }
        RecordsCommand::Missing => {
            for entity in db.list_missing_or_absent() {
                println!("{}\t{}", entity.id, entity.name);
            }
        }
        RecordsCommand::Orphans => {
            println!("{}", db.reconcile_orphans().await);
        }
        RecordsCommand::Clear => {
            if !db.clear_all().await {
                bail!("Clearing {} did not complete", db.name());
            }
        }
    }
    Ok(())
}
