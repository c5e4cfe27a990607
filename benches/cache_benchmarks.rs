//! Engine benchmarks on the heap backend: insert throughput, exact and
//! prefix retrieval, and the update path a banker takes on the hot path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use datacache::backend::Heap;
use datacache::entity::ad::{Ad, AdEntity, AdKey, ByCampaignSize};
use datacache::entity::campaign::{BudgetEntity, ByCampaignId, CampaignBudget, CampaignKey};
use datacache::{CacheConfig, EntityCache};

fn config() -> CacheConfig {
    CacheConfig {
        segment_size: 16 * 1024 * 1024,
        ..CacheConfig::default()
    }
}

fn ad(i: u64) -> (AdKey, Ad) {
    let ad = Ad {
        ad_id: i,
        campaign_id: (i % 100) as u32,
        width: 300,
        height: 250,
        position: 0,
        max_bid_micros: i * 10,
        code: format!("<creative id=\"{i}\"/>"),
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

fn populated(n: u64, name: &str) -> EntityCache<Heap, AdEntity> {
    let mut cache = EntityCache::with_config(name, config()).unwrap();
    for i in 0..n {
        let (key, payload) = ad(i);
        cache.insert(&key, &payload).unwrap();
    }
    cache
}

fn bench_insert(c: &mut Criterion) {
    c.bench_function("insert_10k_ads", |b| {
        b.iter(|| {
            let mut cache: EntityCache<Heap, AdEntity> =
                EntityCache::with_config("bench_insert", config()).unwrap();
            for i in 0..10_000 {
                let (key, payload) = ad(i);
                cache.insert(black_box(&key), black_box(&payload)).unwrap();
            }
            cache
        })
    });
}

fn bench_retrieve(c: &mut Criterion) {
    let cache = populated(10_000, "bench_retrieve");
    c.bench_function("retrieve_exact", |b| {
        b.iter(|| {
            cache.retrieve_one::<ByCampaignSize, _>(black_box(&(37u32, 300u16, 250u16, 4537u64)))
        })
    });
    c.bench_function("retrieve_campaign_prefix", |b| {
        b.iter(|| {
            let mut out = Vec::new();
            cache.retrieve::<ByCampaignSize, _>(&mut out, black_box(&37u32));
            out
        })
    });
}

fn bench_budget_update(c: &mut Criterion) {
    let mut cache: EntityCache<Heap, BudgetEntity> =
        EntityCache::with_config("bench_budgets", config()).unwrap();
    for id in 0..1000u32 {
        cache
            .insert(&CampaignKey { campaign_id: id }, &CampaignBudget::new(id, 1_000_000))
            .unwrap();
    }
    c.bench_function("update_budget", |b| {
        let mut debit = CampaignBudget::new(500, 1_000_000);
        b.iter(|| {
            debit.apply_price(10);
            cache
                .update::<ByCampaignId, _>(&CampaignKey { campaign_id: 500 }, &debit, &500u32)
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_insert, bench_retrieve, bench_budget_update);
criterion_main!(benches);
