use blockstyle_model::Entity;
use blockstyle_sync::{CachedLookup, PropertyCache, TtlCache};
use blockstyle_types::EntityId;
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(5);
const NEGATIVE_TTL: Duration = Duration::from_secs(2);
const EPSILON: Duration = Duration::from_millis(1);

fn make_cache() -> PropertyCache {
    PropertyCache::new(TTL, NEGATIVE_TTL)
}

fn make_entity(id: i64) -> Arc<Entity> {
    Arc::new(Entity::empty(EntityId::new(id)))
}

// ── TtlCache ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn ttl_cache_serves_until_just_before_expiry() {
    let cache: TtlCache<&str, u32> = TtlCache::new(TTL);
    cache.insert("a", 1);

    tokio::time::advance(TTL - EPSILON).await;
    assert_eq!(cache.get(&"a"), Some(1));

    tokio::time::advance(2 * EPSILON).await;
    assert_eq!(cache.get(&"a"), None);
}

#[tokio::test(start_paused = true)]
async fn ttl_cache_entry_at_exact_ttl_is_expired() {
    let cache: TtlCache<&str, u32> = TtlCache::new(TTL);
    cache.insert("a", 1);
    tokio::time::advance(TTL).await;
    assert_eq!(cache.get(&"a"), None);
}

#[tokio::test(start_paused = true)]
async fn ttl_cache_rewrite_restarts_ttl() {
    let cache: TtlCache<&str, u32> = TtlCache::new(TTL);
    cache.insert("a", 1);
    tokio::time::advance(TTL - EPSILON).await;
    cache.insert("a", 2);
    tokio::time::advance(TTL - EPSILON).await;
    assert_eq!(cache.get(&"a"), Some(2));
}

#[tokio::test(start_paused = true)]
async fn ttl_cache_per_entry_ttl() {
    let cache: TtlCache<&str, u32> = TtlCache::new(TTL);
    cache.insert_with_ttl("short", 1, Duration::from_millis(10));
    cache.insert("long", 2);

    tokio::time::advance(Duration::from_millis(20)).await;
    assert_eq!(cache.get(&"short"), None);
    assert_eq!(cache.get(&"long"), Some(2));
}

#[tokio::test(start_paused = true)]
async fn ttl_cache_purge_drops_only_expired() {
    let cache: TtlCache<u32, u32> = TtlCache::new(TTL);
    cache.insert(1, 1);
    tokio::time::advance(Duration::from_secs(3)).await;
    cache.insert(2, 2);
    tokio::time::advance(Duration::from_secs(3)).await;

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.purge_expired(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(&2), Some(2));
}

#[test]
fn ttl_cache_invalidate_and_clear() {
    let cache: TtlCache<u32, u32> = TtlCache::new(TTL);
    cache.insert(1, 1);
    cache.insert(2, 2);

    assert!(cache.invalidate(&1));
    assert!(!cache.invalidate(&1));
    assert_eq!(cache.get(&1), None);

    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.ttl(), TTL);
}

// ── PropertyCache ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn property_cache_hit_and_miss() {
    let cache = make_cache();
    let id = EntityId::new(100);
    assert!(cache.get(id).is_none());

    cache.set(id, make_entity(100));
    let hit = cache.get(id).expect("fresh entry");
    assert_eq!(hit.entity().map(|e| e.id), Some(id));
}

#[tokio::test(start_paused = true)]
async fn property_cache_ttl_boundary() {
    let cache = make_cache();
    let id = EntityId::new(100);
    cache.set(id, make_entity(100));

    tokio::time::advance(TTL - EPSILON).await;
    assert!(cache.get(id).is_some());

    tokio::time::advance(2 * EPSILON).await;
    assert!(cache.get(id).is_none());
}

#[tokio::test(start_paused = true)]
async fn property_cache_negative_entries_expire_sooner() {
    let cache = make_cache();
    let id = EntityId::new(7);
    cache.set_failed(id);

    assert!(matches!(cache.get(id), Some(CachedLookup::Failed)));
    assert!(cache.get(id).and_then(|l| l.entity().cloned()).is_none());

    tokio::time::advance(NEGATIVE_TTL + EPSILON).await;
    assert!(cache.get(id).is_none());
}

#[test]
fn property_cache_invalidate_one() {
    let cache = make_cache();
    cache.set(EntityId::new(1), make_entity(1));
    cache.set(EntityId::new(2), make_entity(2));

    cache.invalidate(EntityId::new(1));
    assert!(cache.get(EntityId::new(1)).is_none());
    assert!(cache.get(EntityId::new(2)).is_some());
    assert_eq!(cache.len(), 1);

    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn property_cache_reads_are_snapshots() {
    let cache = make_cache();
    let id = EntityId::new(1);
    cache.set(id, make_entity(1));
    let before = cache.get(id).and_then(|l| l.entity().cloned()).expect("hit");

    let mut replacement = Entity::empty(id);
    replacement.text = "changed".into();
    cache.set(id, Arc::new(replacement));

    assert_eq!(before.text, "");
    let after = cache.get(id).and_then(|l| l.entity().cloned()).expect("hit");
    assert_eq!(after.text, "changed");
}

#[test]
fn property_cache_concurrent_access() {
    let cache = Arc::new(make_cache());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..200 {
                    let id = EntityId::new((t * 1000 + i) % 50);
                    cache.set(id, make_entity(id.get()));
                    if let Some(CachedLookup::Found(e)) = cache.get(id) {
                        assert_eq!(e.id, id);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("thread");
    }
    assert_eq!(cache.len(), 50);
}
