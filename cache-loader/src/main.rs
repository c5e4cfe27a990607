//! Operational loader for the entity caches.
//!
//! `load` reads every tab-separated data file present in a directory and
//! populates the named cache bidder processes attach to; `dump` prints a
//! cache's full contents for diagnostics. The backend, base directory and
//! segment size mirror the serving side's configuration — both sides must
//! agree or they will not be looking at the same store.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use datacache::backend::{Heap, MappedFile, MemoryBackend, SharedMemory};
use datacache::entity::ad::{Ad, AdEntity};
use datacache::entity::campaign::{BudgetEntity, CampaignBudget};
use datacache::entity::city::{CityCountryEntity, GeoCity};
use datacache::entity::domain::{Domain, DomainEntity};
use datacache::entity::geo::{GeoAd, GeoEntity};
use datacache::entity::ico::{IcoCampaign, IcoCampaignEntity};
use datacache::entity::referer::{Referer, RefererEntity};
use datacache::entity::Record;
use datacache::loader::{FileLoader, Loadable, MultiLoader};
use datacache::{CacheConfig, EntityCache, Result};

/// Entity cache loader and inspector.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    /// POSIX shared memory, name-only addressing.
    Shared,
    /// Memory-mapped files under the base directory.
    Mapped,
    /// Process-local heap: parse-and-count smoke runs only.
    Heap,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Entity {
    Ads,
    CampaignBudget,
    Referer,
    Domain,
    IcoCampaign,
    GeoAd,
    Geo,
}

impl Entity {
    /// The cache name and data file the entity conventionally uses.
    fn names(self) -> (&'static str, &'static str) {
        match self {
            Entity::Ads => ("ads", "ads.tsv"),
            Entity::CampaignBudget => ("campaign_budget", "campaign_budget.tsv"),
            Entity::Referer => ("referer", "referer.tsv"),
            Entity::Domain => ("domain", "domain.tsv"),
            Entity::IcoCampaign => ("ico_campaign", "ico_campaign.tsv"),
            Entity::GeoAd => ("geo_ad", "geo_ad.tsv"),
            Entity::Geo => ("geo", "geo.tsv"),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load every data file present in the data directory into its cache.
    Load {
        /// Directory holding the tab-separated data files.
        #[arg(short, long, value_name = "DIR")]
        data_dir: PathBuf,

        /// Memory backend the serving processes use.
        #[arg(long, value_enum, default_value = "shared")]
        backend: Backend,

        /// Base directory for the mapped backend.
        #[arg(long, default_value = datacache::DEFAULT_BASE_DIR)]
        base_dir: String,

        /// Segment size and growth increment, in MiB.
        #[arg(long, default_value_t = 64)]
        segment_mb: usize,
    },
    /// Print a cache's full contents.
    Dump {
        /// Which entity cache to dump.
        #[arg(long, value_enum)]
        entity: Entity,

        /// Cache name override; defaults to the entity's conventional name.
        #[arg(long)]
        name: Option<String>,

        /// Memory backend the cache lives in.
        #[arg(long, value_enum, default_value = "shared")]
        backend: Backend,

        /// Base directory for the mapped backend.
        #[arg(long, default_value = datacache::DEFAULT_BASE_DIR)]
        base_dir: String,

        /// Segment size and growth increment, in MiB.
        #[arg(long, default_value_t = 64)]
        segment_mb: usize,
    },
}

fn config(base_dir: &str, segment_mb: usize) -> CacheConfig {
    CacheConfig {
        base_dir: base_dir.to_owned(),
        segment_size: segment_mb * 1024 * 1024,
    }
}

/// Adds a loader for `entity` when its data file exists, warns otherwise.
fn add_loader<M, L>(
    group: &mut MultiLoader,
    entity: Entity,
    data_dir: &Path,
    cfg: &CacheConfig,
) -> Result<()>
where
    M: MemoryBackend + 'static,
    L: Loadable + 'static,
{
    let (cache_name, file_name) = entity.names();
    let source = data_dir.join(file_name);
    if !source.exists() {
        warn!(file = %source.display(), cache = cache_name, "data file missing, skipping");
        return Ok(());
    }
    let cache: EntityCache<M, L::Record> = EntityCache::with_config(cache_name, cfg.clone())?;
    group.add(FileLoader::<M, L>::new(cache, source));
    Ok(())
}

fn run_load<M: MemoryBackend + 'static>(data_dir: &Path, cfg: &CacheConfig) -> Result<()> {
    let mut group = MultiLoader::new();
    add_loader::<M, Ad>(&mut group, Entity::Ads, data_dir, cfg)?;
    add_loader::<M, CampaignBudget>(&mut group, Entity::CampaignBudget, data_dir, cfg)?;
    add_loader::<M, Referer>(&mut group, Entity::Referer, data_dir, cfg)?;
    add_loader::<M, Domain>(&mut group, Entity::Domain, data_dir, cfg)?;
    add_loader::<M, IcoCampaign>(&mut group, Entity::IcoCampaign, data_dir, cfg)?;
    add_loader::<M, GeoAd>(&mut group, Entity::GeoAd, data_dir, cfg)?;
    add_loader::<M, GeoCity>(&mut group, Entity::Geo, data_dir, cfg)?;

    if group.is_empty() {
        warn!(dir = %data_dir.display(), "no data files found");
        return Ok(());
    }
    let total = group.load_all()?;
    info!(total, caches = group.len(), "load complete");
    Ok(())
}

fn dump_cache<M, R>(name: &str, cfg: &CacheConfig) -> Result<()>
where
    M: MemoryBackend,
    R: Record,
    R::Payload: std::fmt::Debug,
{
    let cache: EntityCache<M, R> = EntityCache::with_config(name, cfg.clone())?;
    let mut out = Vec::new();
    cache.retrieve_all(&mut out);
    info!(cache = name, entries = out.len(), "dumping");
    for payload in &out {
        println!("{payload:?}");
    }
    Ok(())
}

fn run_dump<M: MemoryBackend>(entity: Entity, name: Option<&str>, cfg: &CacheConfig) -> Result<()> {
    let name = name.unwrap_or(entity.names().0);
    match entity {
        Entity::Ads => dump_cache::<M, AdEntity>(name, cfg),
        Entity::CampaignBudget => dump_cache::<M, BudgetEntity>(name, cfg),
        Entity::Referer => dump_cache::<M, RefererEntity>(name, cfg),
        Entity::Domain => dump_cache::<M, DomainEntity>(name, cfg),
        Entity::IcoCampaign => dump_cache::<M, IcoCampaignEntity>(name, cfg),
        Entity::GeoAd => dump_cache::<M, GeoEntity>(name, cfg),
        Entity::Geo => dump_cache::<M, CityCountryEntity>(name, cfg),
    }
}

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    init_tracing();
    let args = Args::parse();

    let result = match &args.command {
        Commands::Load {
            data_dir,
            backend,
            base_dir,
            segment_mb,
        } => {
            let cfg = config(base_dir, *segment_mb);
            match backend {
                Backend::Shared => run_load::<SharedMemory>(data_dir, &cfg),
                Backend::Mapped => run_load::<MappedFile>(data_dir, &cfg),
                Backend::Heap => run_load::<Heap>(data_dir, &cfg),
            }
        }
        Commands::Dump {
            entity,
            name,
            backend,
            base_dir,
            segment_mb,
        } => {
            let cfg = config(base_dir, *segment_mb);
            match backend {
                Backend::Shared => run_dump::<SharedMemory>(*entity, name.as_deref(), &cfg),
                Backend::Mapped => run_dump::<MappedFile>(*entity, name.as_deref(), &cfg),
                Backend::Heap => run_dump::<Heap>(*entity, name.as_deref(), &cfg),
            }
        }
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        std::process::exit(1);
    }
}
