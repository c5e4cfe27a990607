//! Delimited-file loader plumbing.
//!
//! Loader processes populate the caches that bidder processes attach to:
//! construct a cache bound to a name, `clear()` it, then `insert` one record
//! per parsed line of a tab-separated source file. This module carries that
//! control flow:
//!
//! - [`Loadable`]: a payload that parses from one line and yields its insert
//!   key (applying the caller-side case folding the string-keyed entities
//!   require),
//! - [`FileLoader`]: owns a cache and a source path, reloads on demand,
//! - [`MultiLoader`]: a fixed group of loaders run in declaration order,
//!   failing fast on the first I/O error.
//!
//! Unparseable lines are skipped with a debug event; duplicate unique keys
//! are rejected by the cache and logged the same way. Neither aborts a load.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::backend::MemoryBackend;
use crate::entity::ad::{Ad, AdKey};
use crate::entity::campaign::{CampaignBudget, CampaignKey, Metric, MetricType};
use crate::entity::city::{CityCountryKey, GeoCity};
use crate::entity::domain::{Domain, DomainKey};
use crate::entity::geo::{GeoAd, GeoKey};
use crate::entity::ico::{IcoCampaign, IcoKey};
use crate::entity::referer::{Referer, RefererKey};
use crate::entity::Record;
use crate::error::Result;
use crate::EntityCache;

/// A payload type that loads from one tab-separated line.
pub trait Loadable: Sized {
    /// The record type this payload is stored as.
    type Record: Record<Payload = Self>;

    /// Parses one line. `None` marks the line unparseable; the loader skips
    /// it. Consecutive delimiters are treated as one.
    fn from_line(line: &str) -> Option<Self>;

    /// The insert key for this payload. String keys come back lowercased —
    /// case folding is the loader side's responsibility, never the cache's.
    fn insert_key(&self) -> <Self::Record as Record>::Key;
}

/// Splits a record line on tabs, compressing consecutive delimiters.
fn fields(line: &str) -> Vec<&str> {
    line.split('\t').filter(|f| !f.is_empty()).collect()
}

impl Loadable for Ad {
    type Record = crate::entity::ad::AdEntity;

    fn from_line(line: &str) -> Option<Self> {
        let f = fields(line);
        if f.len() < 7 {
            return None;
        }
        Some(Ad {
            ad_id: f[0].parse().ok()?,
            campaign_id: f[1].parse().ok()?,
            width: f[2].parse().ok()?,
            height: f[3].parse().ok()?,
            position: f[4].parse().ok()?,
            max_bid_micros: f[5].parse().ok()?,
            code: f[6].to_owned(),
        })
    }

    fn insert_key(&self) -> AdKey {
        AdKey {
            campaign_id: self.campaign_id,
            width: self.width,
            height: self.height,
            ad_id: self.ad_id,
        }
    }
}

impl Loadable for CampaignBudget {
    type Record = crate::entity::campaign::BudgetEntity;

    fn from_line(line: &str) -> Option<Self> {
        let f = fields(line);
        if f.len() < 5 {
            return None;
        }
        let mut budget = CampaignBudget::new(f[0].parse().ok()?, f[1].parse().ok()?);
        budget.day_budget_spent = f[2].parse().ok()?;
        let day_show_limit: u64 = f[3].parse().ok()?;
        let day_click_limit: u64 = f[4].parse().ok()?;
        if day_show_limit > 0 {
            budget.metric = Metric {
                metric_type: MetricType::Cpm,
                value: day_show_limit,
            };
        } else if day_click_limit > 0 {
            budget.metric = Metric {
                metric_type: MetricType::Cpc,
                value: day_click_limit,
            };
        }
        Some(budget)
    }

    fn insert_key(&self) -> CampaignKey {
        CampaignKey {
            campaign_id: self.campaign_id,
        }
    }
}

impl Loadable for Referer {
    type Record = crate::entity::referer::RefererEntity;

    fn from_line(line: &str) -> Option<Self> {
        let f = fields(line);
        if f.len() < 2 {
            return None;
        }
        Some(Referer {
            url: f[0].to_lowercase(),
            ref_id: f[1].parse().ok()?,
        })
    }

    fn insert_key(&self) -> RefererKey {
        RefererKey {
            url: self.url.to_lowercase(),
        }
    }
}

impl Loadable for Domain {
    type Record = crate::entity::domain::DomainEntity;

    fn from_line(line: &str) -> Option<Self> {
        let f = fields(line);
        if f.len() < 2 {
            return None;
        }
        Some(Domain {
            name: f[0].to_lowercase(),
            dom_id: f[1].parse().ok()?,
        })
    }

    fn insert_key(&self) -> DomainKey {
        DomainKey {
            name: self.name.to_lowercase(),
        }
    }
}

impl Loadable for IcoCampaign {
    type Record = crate::entity::ico::IcoCampaignEntity;

    fn from_line(line: &str) -> Option<Self> {
        let f = fields(line);
        if f.len() < 2 {
            return None;
        }
        Some(IcoCampaign {
            domain_id: f[0].parse().ok()?,
            campaign_id: f[1].parse().ok()?,
        })
    }

    fn insert_key(&self) -> IcoKey {
        IcoKey {
            domain_id: self.domain_id,
        }
    }
}

impl Loadable for GeoAd {
    type Record = crate::entity::geo::GeoEntity;

    fn from_line(line: &str) -> Option<Self> {
        let f = fields(line);
        if f.len() < 2 {
            return None;
        }
        Some(GeoAd {
            geo_id: f[0].parse().ok()?,
            ad_id: f[1].to_owned(),
        })
    }

    fn insert_key(&self) -> GeoKey {
        GeoKey {
            geo_id: self.geo_id,
        }
    }
}

impl Loadable for GeoCity {
    type Record = crate::entity::city::CityCountryEntity;

    fn from_line(line: &str) -> Option<Self> {
        let f = fields(line);
        if f.len() < 3 {
            return None;
        }
        Some(GeoCity {
            geo_id: f[0].parse().ok()?,
            city: f[1].to_lowercase(),
            country: f[2].to_lowercase(),
        })
    }

    fn insert_key(&self) -> CityCountryKey {
        CityCountryKey {
            city: self.city.to_lowercase(),
            country: self.country.to_lowercase(),
        }
    }
}

/// Type-erased loader handle, for grouping under [`MultiLoader`].
pub trait Load {
    /// Clears the cache and reloads it from the source file, returning how
    /// many records were stored.
    fn load(&mut self) -> Result<usize>;

    /// The cache name, for reporting.
    fn name(&self) -> &str;
}

/// Loads one entity cache from one tab-separated file.
pub struct FileLoader<M: MemoryBackend, L: Loadable> {
    cache: EntityCache<M, L::Record>,
    source: PathBuf,
}

impl<M: MemoryBackend, L: Loadable> FileLoader<M, L> {
    /// Binds `cache` to `source`.
    pub fn new(cache: EntityCache<M, L::Record>, source: impl AsRef<Path>) -> Self {
        FileLoader {
            cache,
            source: source.as_ref().to_path_buf(),
        }
    }

    /// The owned cache.
    pub fn cache(&self) -> &EntityCache<M, L::Record> {
        &self.cache
    }

    /// The owned cache, mutably.
    pub fn cache_mut(&mut self) -> &mut EntityCache<M, L::Record> {
        &mut self.cache
    }

    /// Consumes the loader, returning the cache.
    pub fn into_cache(self) -> EntityCache<M, L::Record> {
        self.cache
    }
}

impl<M: MemoryBackend, L: Loadable> Load for FileLoader<M, L> {
    fn load(&mut self) -> Result<usize> {
        let file = File::open(&self.source)?;
        debug!(cache = self.cache.name(), source = %self.source.display(), "loading");
        self.cache.clear();
        let mut loaded = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let Some(payload) = L::from_line(&line) else {
                debug!(cache = self.cache.name(), line = %line, "skipping unparseable record");
                continue;
            };
            if self.cache.insert(&payload.insert_key(), &payload)? {
                loaded += 1;
            } else {
                debug!(cache = self.cache.name(), line = %line, "duplicate key rejected");
            }
        }
        info!(cache = self.cache.name(), loaded, "cache loaded");
        Ok(loaded)
    }

    fn name(&self) -> &str {
        self.cache.name()
    }
}

impl<M: MemoryBackend, L: Loadable> core::fmt::Debug for FileLoader<M, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileLoader")
            .field("cache", &self.cache.name())
            .field("source", &self.source)
            .finish()
    }
}

/// A fixed group of loaders, loaded in the order they were added.
#[derive(Default)]
pub struct MultiLoader {
    loaders: Vec<Box<dyn Load>>,
}

impl MultiLoader {
    /// An empty group.
    pub fn new() -> Self {
        MultiLoader::default()
    }

    /// Appends a loader to the group.
    pub fn add(&mut self, loader: impl Load + 'static) -> &mut Self {
        self.loaders.push(Box::new(loader));
        self
    }

    /// Loads every cache in order, failing fast on the first error.
    /// Returns the total number of records stored.
    pub fn load_all(&mut self) -> Result<usize> {
        let mut total = 0usize;
        for loader in &mut self.loaders {
            total += loader.load()?;
        }
        Ok(total)
    }

    /// Number of loaders in the group.
    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    /// Whether the group is empty.
    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl core::fmt::Debug for MultiLoader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MultiLoader")
            .field("loaders", &self.loaders.len())
            .finish()
    }
}
