//! Segment growth: entities inserted before a grow must survive it.

use std::sync::atomic::{AtomicUsize, Ordering};

use datacache::backend::{Heap, MappedFile, MemoryBackend};
use datacache::entity::ad::{Ad, AdEntity, AdKey, ByCampaignSize};
use datacache::{CacheConfig, EntityCache};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique(name: &str) -> String {
    format!(
        "{name}_{}_{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// A segment small enough that a few hundred creatives force growth.
fn tiny_config(base_dir: &str) -> CacheConfig {
    CacheConfig {
        base_dir: base_dir.to_owned(),
        segment_size: 64 * 1024,
    }
}

fn big_ad(i: u64) -> (AdKey, Ad) {
    let ad = Ad {
        ad_id: i,
        campaign_id: (i % 7) as u32,
        width: 300,
        height: 250,
        position: 0,
        max_bid_micros: i * 100,
        code: format!("<creative id=\"{i}\">{}</creative>", "x".repeat(512)),
    };
    (
        AdKey {
            campaign_id: ad.campaign_id,
            width: 300,
            height: 250,
            ad_id: i,
        },
        ad,
    )
}

const N: u64 = 300;

#[test]
fn test_heap_growth_preserves_entities() {
    let mut cache: EntityCache<Heap, AdEntity> =
        EntityCache::with_config(&unique("ads_grow"), tiny_config("/tmp/CACHE")).unwrap();
    for i in 0..N {
        let (key, payload) = big_ad(i);
        assert!(cache.insert(&key, &payload).unwrap(), "insert {i} failed");
    }
    assert!(
        cache.metrics().grows() >= 1,
        "workload was sized to force at least one grow"
    );
    assert_eq!(cache.len(), N as usize);

    for i in 0..N {
        let (key, payload) = big_ad(i);
        let got = cache
            .retrieve_one::<ByCampaignSize, _>(&(key.campaign_id, key.width, key.height, key.ad_id))
            .unwrap_or_else(|| panic!("ad {i} lost after growth"));
        assert_eq!(got, payload);
    }
}

#[test]
fn test_mapped_growth_survives_reattach() {
    let dir = std::env::temp_dir()
        .join(format!("datacache-growth-{}", std::process::id()))
        .display()
        .to_string();
    std::fs::create_dir_all(&dir).unwrap();
    let name = unique("ads_grow");
    let config = tiny_config(&dir);

    let store_path;
    {
        let mut cache: EntityCache<MappedFile, AdEntity> =
            EntityCache::with_config(&name, config.clone()).unwrap();
        store_path = cache.store_path().to_owned();
        for i in 0..N {
            let (key, payload) = big_ad(i);
            assert!(cache.insert(&key, &payload).unwrap());
        }
        assert!(cache.metrics().grows() >= 1);
    }

    // A fresh attach maps the grown backing file and sees every entity.
    let cache: EntityCache<MappedFile, AdEntity> =
        EntityCache::with_config(&name, config).unwrap();
    assert_eq!(cache.len(), N as usize);
    for i in (0..N).step_by(37) {
        let (key, payload) = big_ad(i);
        let got = cache
            .retrieve_one::<ByCampaignSize, _>(&(key.campaign_id, key.width, key.height, key.ad_id))
            .unwrap();
        assert_eq!(got, payload);
    }

    drop(cache);
    assert!(MappedFile::remove(&store_path));
    MappedFile::remove_lock(&format!("{name}_mutex"), &dir);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_oversized_insert_fails_terminally() {
    let mut cache: EntityCache<Heap, AdEntity> =
        EntityCache::with_config(&unique("ads_grow"), tiny_config("/tmp/CACHE")).unwrap();
    // One creative larger than segment size + one growth increment: the
    // single fixed-increment retry cannot satisfy it.
    let ad = Ad {
        ad_id: 1,
        campaign_id: 1,
        width: 1,
        height: 1,
        position: 0,
        max_bid_micros: 0,
        code: "y".repeat(256 * 1024),
    };
    let key = AdKey {
        campaign_id: 1,
        width: 1,
        height: 1,
        ad_id: 1,
    };
    let err = cache.insert(&key, &ad).unwrap_err();
    assert!(matches!(
        err,
        datacache::CacheError::SegmentFull { needed } if needed == 256 * 1024
    ));
    // The failed insert left nothing behind.
    assert_eq!(cache.len(), 0);
}
