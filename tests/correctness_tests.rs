//! Correctness tests for the cache engine and the entity adapters.
//!
//! Everything here runs on the heap backend: single process, no OS
//! namespace to clean up, and the engine code path is identical to the
//! interprocess backends apart from where the bytes live.

use std::sync::atomic::{AtomicUsize, Ordering};

use datacache::backend::Heap;
use datacache::entity::ad::{Ad, AdEntity, AdKey, ByCampaignSize};
use datacache::entity::campaign::{BudgetEntity, ByCampaignId, CampaignBudget, CampaignKey};
use datacache::entity::city::{ByCity, ByCityCountry, ByCountry, CityCountryEntity, CityCountryKey, GeoCity};
use datacache::entity::domain::{ByName, Domain, DomainEntity, DomainKey};
use datacache::entity::geo::{ByGeoId, GeoAd, GeoEntity, GeoKey};
use datacache::entity::ico::{ByDomain, IcoCampaign, IcoCampaignEntity, IcoKey};
use datacache::entity::referer::{ByUrl, Referer, RefererEntity, RefererKey};
use datacache::{CacheConfig, EntityCache};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Cache names must be unique per test: heap caches are independent, but the
/// process-local lock registry is keyed by name.
fn unique(name: &str) -> String {
    format!("{name}_{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

fn small_config() -> CacheConfig {
    CacheConfig {
        segment_size: 256 * 1024,
        ..CacheConfig::default()
    }
}

fn ad(ad_id: u64, campaign_id: u32, width: u16, height: u16, bid: u64) -> (AdKey, Ad) {
    let ad = Ad {
        ad_id,
        campaign_id,
        width,
        height,
        position: 1,
        max_bid_micros: bid,
        code: format!("<creative id=\"{ad_id}\"/>"),
    };
    (
        AdKey {
            campaign_id,
            width,
            height,
            ad_id,
        },
        ad,
    )
}

#[test]
fn test_distinct_keys_all_retrievable_exactly() {
    let mut cache: EntityCache<Heap, AdEntity> =
        EntityCache::with_config(&unique("ads"), small_config()).unwrap();
    let mut inserted = Vec::new();
    for i in 0..50u64 {
        let (key, payload) = ad(i, (i % 5) as u32, 300, 250, 1000 * i);
        assert!(cache.insert(&key, &payload).unwrap());
        inserted.push((key, payload));
    }
    assert_eq!(cache.len(), 50);
    for (key, payload) in &inserted {
        let mut out = Vec::new();
        assert!(cache.retrieve::<ByCampaignSize, _>(
            &mut out,
            &(key.campaign_id, key.width, key.height, key.ad_id)
        ));
        assert_eq!(out, vec![payload.clone()]);
    }
}

#[test]
fn test_duplicate_insert_keeps_first_payload() {
    let mut cache: EntityCache<Heap, AdEntity> =
        EntityCache::with_config(&unique("ads"), small_config()).unwrap();
    let (key, first) = ad(1, 10, 300, 250, 500_000);
    let mut second = first.clone();
    second.max_bid_micros = 999_999;

    assert!(cache.insert(&key, &first).unwrap());
    assert!(!cache.insert(&key, &second).unwrap());
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.metrics().duplicates(), 1);

    let got = cache
        .retrieve_one::<ByCampaignSize, _>(&(10u32, 300u16, 250u16, 1u64))
        .unwrap();
    assert_eq!(got.max_bid_micros, 500_000);
}

#[test]
fn test_ad_prefix_lookup_scenario() {
    let mut cache: EntityCache<Heap, AdEntity> =
        EntityCache::with_config(&unique("ads"), small_config()).unwrap();
    let (key, payload) = ad(1, 10, 300, 250, 500_000);
    assert!(cache.insert(&key, &payload).unwrap());
    // Different campaign and different size must stay out of the range.
    let (k2, p2) = ad(2, 10, 728, 90, 100);
    let (k3, p3) = ad(3, 11, 300, 250, 100);
    cache.insert(&k2, &p2).unwrap();
    cache.insert(&k3, &p3).unwrap();

    let mut out = Vec::new();
    assert!(cache.retrieve::<ByCampaignSize, _>(&mut out, &(10u32, 300u16, 250u16)));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].ad_id, 1);
    assert_eq!(out[0].max_bid_micros, 500_000);

    // Campaign-only prefix sees both creatives of campaign 10.
    let mut out = Vec::new();
    assert!(cache.retrieve::<ByCampaignSize, _>(&mut out, &10u32));
    assert_eq!(out.len(), 2);
}

#[test]
fn test_referer_case_is_callers_responsibility() {
    let mut cache: EntityCache<Heap, RefererEntity> =
        EntityCache::with_config(&unique("referers"), small_config()).unwrap();
    let referer = Referer::new("example.com", 7);
    let key = RefererKey {
        url: "example.com".to_owned(),
    };
    assert!(cache.insert(&key, &referer).unwrap());

    let mut out = Vec::new();
    assert!(cache.retrieve::<ByUrl, _>(&mut out, "example.com"));
    assert_eq!(out[0].ref_id, 7);

    let mut out: Vec<Referer> = Vec::new();
    assert!(!cache.retrieve::<ByUrl, _>(&mut out, "EXAMPLE.COM"));
    assert!(out.is_empty());
}

#[test]
fn test_update_with_no_match_returns_false() {
    let mut cache: EntityCache<Heap, BudgetEntity> =
        EntityCache::with_config(&unique("budgets"), small_config()).unwrap();
    let budget = CampaignBudget::new(1, 1000);
    cache
        .insert(&CampaignKey { campaign_id: 1 }, &budget)
        .unwrap();

    let replacement = CampaignBudget::new(2, 5000);
    assert!(!cache
        .update::<ByCampaignId, _>(&CampaignKey { campaign_id: 2 }, &replacement, &2u32)
        .unwrap());

    // Nothing was mutated.
    let got = cache.retrieve_one::<ByCampaignId, _>(&1u32).unwrap();
    assert_eq!(got, budget);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_update_replaces_content_in_place() {
    let mut cache: EntityCache<Heap, BudgetEntity> =
        EntityCache::with_config(&unique("budgets"), small_config()).unwrap();
    let mut budget = CampaignBudget::new(17, 1_000_000);
    cache
        .insert(&CampaignKey { campaign_id: 17 }, &budget)
        .unwrap();

    // A win comes back: debit the price and write the budget back.
    budget.apply_price(250_000);
    assert!(cache
        .update::<ByCampaignId, _>(&CampaignKey { campaign_id: 17 }, &budget, &17u32)
        .unwrap());

    let got = cache.retrieve_one::<ByCampaignId, _>(&17u32).unwrap();
    assert_eq!(got.day_budget_limit, 750_000);
    assert_eq!(got.day_budget_spent, 250_000);
    assert_eq!(cache.metrics().updates(), 1);
}

#[test]
fn test_update_rekeys_entity_into_new_range() {
    let mut cache: EntityCache<Heap, DomainEntity> =
        EntityCache::with_config(&unique("domains"), small_config()).unwrap();
    let domain = Domain::new("old.example", 1);
    cache
        .insert(
            &DomainKey {
                name: "old.example".to_owned(),
            },
            &domain,
        )
        .unwrap();

    let renamed = Domain::new("new.example", 1);
    assert!(cache
        .update::<ByName, _>(
            &DomainKey {
                name: "new.example".to_owned(),
            },
            &renamed,
            "old.example",
        )
        .unwrap());

    assert!(cache.retrieve_one::<ByName, _>("old.example").is_none());
    let got = cache.retrieve_one::<ByName, _>("new.example").unwrap();
    assert_eq!(got.dom_id, 1);
}

#[test]
fn test_clear_empties_everything() {
    let mut cache: EntityCache<Heap, IcoCampaignEntity> =
        EntityCache::with_config(&unique("ico"), small_config()).unwrap();
    for i in 0..20u32 {
        cache
            .insert(&IcoKey { domain_id: i }, &IcoCampaign::new(i, 100 + i))
            .unwrap();
    }
    assert_eq!(cache.len(), 20);

    cache.clear();
    assert_eq!(cache.len(), 0);
    assert!(cache.is_empty());
    for i in 0..20u32 {
        assert!(cache.retrieve_one::<ByDomain, _>(&i).is_none());
    }

    // The cache stays usable after a clear.
    assert!(cache
        .insert(&IcoKey { domain_id: 5 }, &IcoCampaign::new(5, 500))
        .unwrap());
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_remove_erases_equal_range() {
    let mut cache: EntityCache<Heap, IcoCampaignEntity> =
        EntityCache::with_config(&unique("ico"), small_config()).unwrap();
    for campaign in [100u32, 101, 102] {
        cache
            .insert(&IcoKey { domain_id: 7 }, &IcoCampaign::new(7, campaign))
            .unwrap();
    }
    cache
        .insert(&IcoKey { domain_id: 8 }, &IcoCampaign::new(8, 200))
        .unwrap();

    // Prefix remove: the whole domain-7 range goes at once.
    assert_eq!(cache.remove::<ByDomain, _>(&7u32), 3);
    assert_eq!(cache.len(), 1);
    assert!(cache.retrieve_one::<ByDomain, _>(&7u32).is_none());
    assert!(cache.retrieve_one::<ByDomain, _>(&8u32).is_some());
    assert_eq!(cache.remove::<ByDomain, _>(&7u32), 0);
}

#[test]
fn test_retrieve_all_scans_in_insertion_order() {
    let mut cache: EntityCache<Heap, GeoEntity> =
        EntityCache::with_config(&unique("geo_ads"), small_config()).unwrap();
    for geo_id in [30u32, 10, 20] {
        cache
            .insert(
                &GeoKey { geo_id },
                &GeoAd::new(geo_id, format!("ad-{geo_id}")),
            )
            .unwrap();
    }
    let mut out = Vec::new();
    assert!(cache.retrieve_all(&mut out));
    assert_eq!(
        out.iter().map(|g| g.geo_id).collect::<Vec<_>>(),
        vec![30, 10, 20]
    );

    let mut empty_out = Vec::new();
    let empty: EntityCache<Heap, GeoEntity> =
        EntityCache::with_config(&unique("geo_ads"), small_config()).unwrap();
    assert!(!empty.retrieve_all(&mut empty_out));
}

#[test]
fn test_geo_prefix_enumerates_creatives() {
    let mut cache: EntityCache<Heap, GeoEntity> =
        EntityCache::with_config(&unique("geo_ads"), small_config()).unwrap();
    for ad in ["a1", "a2", "a3"] {
        cache
            .insert(&GeoKey { geo_id: 840 }, &GeoAd::new(840, ad))
            .unwrap();
    }
    cache
        .insert(&GeoKey { geo_id: 250 }, &GeoAd::new(250, "fr-1"))
        .unwrap();

    let mut out = Vec::new();
    assert!(cache.retrieve::<ByGeoId, _>(&mut out, &840u32));
    let mut ads: Vec<_> = out.iter().map(|g| g.ad_id.as_str()).collect();
    ads.sort_unstable();
    assert_eq!(ads, vec!["a1", "a2", "a3"]);
}

#[test]
fn test_city_country_multi_index() {
    let mut cache: EntityCache<Heap, CityCountryEntity> =
        EntityCache::with_config(&unique("geo"), small_config()).unwrap();
    let rows = [
        GeoCity::new(1, "paris", "france"),
        GeoCity::new(2, "paris", "usa"),
        GeoCity::new(3, "lyon", "france"),
    ];
    for row in &rows {
        let key = CityCountryKey {
            city: row.city.clone(),
            country: row.country.clone(),
        };
        assert!(cache.insert(&key, row).unwrap());
    }

    // Non-unique city index: both paris rows.
    let mut out = Vec::new();
    assert!(cache.retrieve::<ByCity, _>(&mut out, "paris"));
    assert_eq!(out.len(), 2);

    // Non-unique country index: both french rows.
    let mut out = Vec::new();
    assert!(cache.retrieve::<ByCountry, _>(&mut out, "france"));
    assert_eq!(out.len(), 2);

    // Unique composite: exactly one row, and the pair is a duplicate.
    let got = cache
        .retrieve_one::<ByCityCountry, _>(&("paris", "france"))
        .unwrap();
    assert_eq!(got.geo_id, 1);
    assert!(!cache
        .insert(
            &CityCountryKey {
                city: "paris".to_owned(),
                country: "france".to_owned(),
            },
            &GeoCity::new(9, "paris", "france"),
        )
        .unwrap());

    // City prefix over the composite index.
    let mut out = Vec::new();
    assert!(cache.retrieve::<ByCityCountry, _>(&mut out, "paris"));
    assert_eq!(out.len(), 2);
}

#[test]
fn test_create_ipc_key_roundtrip() {
    let mut cache: EntityCache<Heap, DomainEntity> =
        EntityCache::with_config(&unique("domains"), small_config()).unwrap();
    let key = cache.create_ipc_key("interned.example").unwrap();
    assert_eq!(key.len(), "interned.example".len());
    assert_eq!(cache.resolve_ipc_key(&key), "interned.example");
}

#[test]
fn test_metrics_track_operations() {
    let mut cache: EntityCache<Heap, BudgetEntity> =
        EntityCache::with_config(&unique("budgets"), small_config()).unwrap();
    let budget = CampaignBudget::new(1, 100);
    cache
        .insert(&CampaignKey { campaign_id: 1 }, &budget)
        .unwrap();
    cache
        .insert(&CampaignKey { campaign_id: 1 }, &budget)
        .unwrap();
    let _ = cache.retrieve_one::<ByCampaignId, _>(&1u32);
    let _ = cache.retrieve_one::<ByCampaignId, _>(&2u32);
    cache.remove::<ByCampaignId, _>(&1u32);

    let m = cache.metrics();
    assert_eq!(m.inserts(), 1);
    assert_eq!(m.duplicates(), 1);
    assert_eq!(m.hits(), 1);
    assert_eq!(m.misses(), 1);
    assert_eq!(m.removes(), 1);
    assert_eq!(m.grows(), 0);
}
