//! Four-level cache hierarchy shared by all tiers.
//!
//! | Level | Scope              | Default TTL | Eviction                |
//! |-------|--------------------|-------------|-------------------------|
//! | L1    | current OODA cycle | cycle       | cleared at Observe      |
//! | L2    | current session    | 5 min       | TTL + capacity          |
//! | L3    | cross-session      | 60 min      | TTL + capacity + pressure |
//! | L4    | per-agent lifetime | 30 s        | TTL only (ring buffer)  |
//!
//! Reads cascade L1→L4 and never fail: any internal inconsistency is a
//! logged miss. Writes route by data kind. The tiered levels (L2/L3/L4)
//! are `moka` caches with per-entry TTL and bounded capacity; L1 is a
//! plain cycle-scoped map because its whole lifetime is one Observe
//! boundary. L2/L3 are process-shared; L1/L4 are per-agent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache as MokaCache;
use moka::Expiry;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::models::config::CacheConfig;
use crate::domain::models::ids::CacheKey;

/// The four levels, in cascade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheLevel {
    L1,
    L2,
    L3,
    L4,
}

impl CacheLevel {
    pub const ALL: [CacheLevel; 4] = [Self::L1, Self::L2, Self::L3, Self::L4];

    fn index(self) -> usize {
        match self {
            Self::L1 => 0,
            Self::L2 => 1,
            Self::L3 => 2,
            Self::L4 => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L2 => "l2",
            Self::L3 => "l3",
            Self::L4 => "l4",
        }
    }
}

/// What kind of value is being written; determines the target level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDataKind {
    /// Primitive classification outputs: valid for the current cycle only.
    Classification,
    /// Embedding vectors: expensive, stable, cross-session.
    Embedding,
    /// Tool outputs: session-scoped unless the tool is deterministic.
    ToolOutput { deterministic: bool },
    /// Activation decisions: short-lived per-agent ring.
    Activation,
}

impl CacheDataKind {
    pub fn target_level(self) -> CacheLevel {
        match self {
            Self::Classification => CacheLevel::L1,
            Self::Embedding => CacheLevel::L3,
            Self::ToolOutput { deterministic: true } => CacheLevel::L3,
            Self::ToolOutput { deterministic: false } => CacheLevel::L2,
            Self::Activation => CacheLevel::L4,
        }
    }
}

/// Point-in-time counters for one level.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub bytes: u64,
}

/// One stored value plus the metadata the hierarchy tracks per entry.
struct StoredEntry {
    value: Value,
    written_at: Instant,
    /// Monotonic write sequence; orders entries for pressure eviction.
    write_seq: u64,
    ttl: Duration,
    byte_size: u64,
    hits: AtomicU64,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.written_at) >= self.ttl
    }
}

/// Per-entry TTL policy for the moka-backed levels: each entry carries
/// the TTL it was written with (the level default unless overridden).
struct PerEntryTtl;

impl Expiry<CacheKey, Arc<StoredEntry>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &Arc<StoredEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Storage backend: the cycle level is a plain map cleared wholesale at
/// each Observe boundary; the tiered levels delegate TTL and capacity
/// eviction to moka.
enum LevelBackend {
    Cycle(RwLock<HashMap<CacheKey, Arc<StoredEntry>>>),
    Tiered(MokaCache<CacheKey, Arc<StoredEntry>>),
}

struct LevelStore {
    backend: LevelBackend,
    default_ttl: Duration,
    /// Only enforced by hand for the cycle level; moka owns the rest.
    capacity: usize,
    pressure_evictable: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LevelStore {
    fn cycle(default_ttl: Duration, capacity: usize) -> Self {
        Self {
            backend: LevelBackend::Cycle(RwLock::new(HashMap::new())),
            default_ttl,
            capacity,
            pressure_evictable: false,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn tiered(default_ttl: Duration, capacity: usize, pressure_evictable: bool) -> Self {
        let store = MokaCache::builder()
            .max_capacity(capacity as u64)
            .expire_after(PerEntryTtl)
            .build();
        Self {
            backend: LevelBackend::Tiered(store),
            default_ttl,
            capacity,
            pressure_evictable,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

/// The shared cache hierarchy.
///
/// Clone-cheap: levels are behind `Arc`s. [`CacheHierarchy::sibling`]
/// builds an agent-local hierarchy over process-shared L2/L3 stores.
pub struct CacheHierarchy {
    levels: [Arc<LevelStore>; 4],
    write_clock: Arc<AtomicU64>,
}

impl CacheHierarchy {
    pub fn new(config: &CacheConfig) -> Self {
        let l2 = Arc::new(LevelStore::tiered(
            Duration::from_secs(config.l2_ttl_s),
            config.l2_capacity,
            true,
        ));
        let l3 = Arc::new(LevelStore::tiered(
            Duration::from_secs(config.l3_ttl_s),
            config.l3_capacity,
            true,
        ));
        Self::with_shared(config, l2, l3)
    }

    /// Build an agent-local hierarchy around process-shared L2/L3.
    fn with_shared(config: &CacheConfig, l2: Arc<LevelStore>, l3: Arc<LevelStore>) -> Self {
        // L1 lives for one cycle; its TTL only matters if a cycle stalls.
        let l1 = Arc::new(LevelStore::cycle(Duration::from_secs(60), config.l1_capacity));
        let l4 = Arc::new(LevelStore::tiered(
            Duration::from_secs(config.l4_ttl_s),
            config.l4_capacity,
            false,
        ));
        Self {
            levels: [l1, l2, l3, l4],
            write_clock: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A sibling hierarchy for another agent in the same process: fresh
    /// L1/L4, shared L2/L3.
    pub fn sibling(&self, config: &CacheConfig) -> Self {
        Self::with_shared(
            config,
            Arc::clone(&self.levels[CacheLevel::L2.index()]),
            Arc::clone(&self.levels[CacheLevel::L3.index()]),
        )
    }

    fn store(&self, level: CacheLevel) -> &LevelStore {
        &self.levels[level.index()]
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Read a key from one level, or cascade L1→L4 when `level` is `None`.
    ///
    /// Never returns an expired value and never errors.
    pub async fn read_cache(&self, key: &CacheKey, level: Option<CacheLevel>) -> Option<Value> {
        match level {
            Some(level) => self.read_level(level, key).await,
            None => {
                for level in CacheLevel::ALL {
                    if let Some(value) = self.read_level(level, key).await {
                        return Some(value);
                    }
                }
                None
            }
        }
    }

    async fn read_level(&self, level: CacheLevel, key: &CacheKey) -> Option<Value> {
        let store = self.store(level);
        let now = Instant::now();

        let entry = match &store.backend {
            LevelBackend::Cycle(map) => {
                let expired = {
                    let entries = map.read().await;
                    match entries.get(key) {
                        Some(entry) if !entry.is_expired(now) => {
                            return self.record_hit(store, entry);
                        }
                        Some(_) => true,
                        None => false,
                    }
                };
                if expired {
                    // Recheck under the write guard: the key may have
                    // been rewritten since the read.
                    let mut entries = map.write().await;
                    if entries.get(key).is_some_and(|e| e.is_expired(Instant::now())) {
                        entries.remove(key);
                    }
                }
                None
            }
            LevelBackend::Tiered(cache) => cache.get(key).await,
        };

        match entry {
            // Belt over moka's own clock: a value past its recorded TTL
            // is a miss even if housekeeping has not collected it yet;
            // removal stays moka's job.
            Some(entry) if !entry.is_expired(now) => self.record_hit(store, &entry),
            _ => {
                store.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn record_hit(&self, store: &LevelStore, entry: &StoredEntry) -> Option<Value> {
        entry.hits.fetch_add(1, Ordering::Relaxed);
        store.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Write routed by data kind with the level's default TTL.
    pub async fn write_cache(&self, key: CacheKey, value: Value, kind: CacheDataKind) {
        let level = kind.target_level();
        self.write_to_level(key, value, level, None).await;
    }

    /// Write to an explicit level, optionally overriding the TTL.
    pub async fn write_to_level(
        &self,
        key: CacheKey,
        value: Value,
        level: CacheLevel,
        ttl: Option<Duration>,
    ) {
        let store = self.store(level);
        let entry = Arc::new(StoredEntry {
            byte_size: estimate_bytes(&value),
            value,
            written_at: Instant::now(),
            write_seq: self.write_clock.fetch_add(1, Ordering::Relaxed),
            ttl: ttl.unwrap_or(store.default_ttl),
            hits: AtomicU64::new(0),
        });

        match &store.backend {
            LevelBackend::Cycle(map) => {
                let mut entries = map.write().await;
                if !entries.contains_key(&key) && entries.len() >= store.capacity {
                    if let Some(victim) = pick_cycle_victim(&entries) {
                        debug!(level = level.as_str(), victim = %victim, "cycle cache eviction");
                        entries.remove(&victim);
                    } else {
                        warn!(level = level.as_str(), "cache write dropped at capacity");
                        return;
                    }
                }
                entries.insert(key, entry);
            }
            LevelBackend::Tiered(cache) => {
                cache.insert(key, entry).await;
            }
        }
    }

    /// Remove a key from one level, or from all levels.
    pub async fn invalidate(&self, key: &CacheKey, level: Option<CacheLevel>) {
        let levels: &[CacheLevel] = match level {
            Some(ref level) => std::slice::from_ref(level),
            None => &CacheLevel::ALL,
        };
        for &level in levels {
            match &self.store(level).backend {
                LevelBackend::Cycle(map) => {
                    map.write().await.remove(key);
                }
                LevelBackend::Tiered(cache) => {
                    cache.invalidate(key).await;
                }
            }
        }
    }

    /// Clear L1. Must complete before the next Observe phase begins; the
    /// engine awaits this at every cycle boundary.
    pub async fn begin_cycle(&self) {
        if let LevelBackend::Cycle(map) = &self.store(CacheLevel::L1).backend {
            map.write().await.clear();
        }
    }

    /// Run moka's deferred housekeeping on the tiered levels so entry
    /// counts and capacity eviction are settled. Cheap; called by the
    /// pressure pass and by introspection-heavy callers.
    pub async fn run_pending_maintenance(&self) {
        for level in CacheLevel::ALL {
            if let LevelBackend::Tiered(cache) = &self.store(level).backend {
                cache.run_pending_tasks().await;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Pressure
    // -------------------------------------------------------------------------

    /// Free roughly `target_bytes` from the pressure-evictable levels
    /// (L2/L3 only). Priority: expired TTL, then lowest hit count, then
    /// oldest write. Returns the bytes actually freed.
    pub async fn pressure_evict(&self, target_bytes: u64) -> u64 {
        self.run_pending_maintenance().await;
        let mut freed: u64 = 0;

        for level in [CacheLevel::L2, CacheLevel::L3] {
            if freed >= target_bytes {
                break;
            }
            let store = self.store(level);
            if !store.pressure_evictable {
                continue;
            }
            let LevelBackend::Tiered(cache) = &store.backend else {
                continue;
            };

            let now = Instant::now();
            let mut order: Vec<(CacheKey, bool, u64, u64, u64)> = cache
                .iter()
                .map(|(key, entry)| {
                    (
                        (*key).clone(),
                        entry.is_expired(now),
                        entry.hits.load(Ordering::Relaxed),
                        entry.write_seq,
                        entry.byte_size,
                    )
                })
                .collect();
            // Expired first, then fewest hits, then oldest write.
            order.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)).then(a.3.cmp(&b.3)));

            for (key, _, _, _, bytes) in order {
                if freed >= target_bytes {
                    break;
                }
                cache.invalidate(&key).await;
                freed += bytes;
            }
        }
        debug!(freed, target_bytes, "pressure eviction pass");
        freed
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    pub async fn stats(&self, level: CacheLevel) -> CacheStats {
        let store = self.store(level);
        let (entries, bytes) = match &store.backend {
            LevelBackend::Cycle(map) => {
                let entries = map.read().await;
                (entries.len(), entries.values().map(|e| e.byte_size).sum())
            }
            LevelBackend::Tiered(cache) => {
                let mut bytes = 0;
                let mut entries = 0;
                for (_, entry) in cache.iter() {
                    entries += 1;
                    bytes += entry.byte_size;
                }
                (entries, bytes)
            }
        };
        CacheStats {
            hits: store.hits.load(Ordering::Relaxed),
            misses: store.misses.load(Ordering::Relaxed),
            entries,
            bytes,
        }
    }

    /// Hit count for one key at one level, if present.
    pub async fn entry_hits(&self, key: &CacheKey, level: CacheLevel) -> Option<u64> {
        let entry = match &self.store(level).backend {
            LevelBackend::Cycle(map) => map.read().await.get(key).cloned(),
            LevelBackend::Tiered(cache) => cache.get(key).await,
        };
        entry.map(|e| e.hits.load(Ordering::Relaxed))
    }
}

/// Cycle-level victim at capacity: expired first, then oldest write.
fn pick_cycle_victim(entries: &HashMap<CacheKey, Arc<StoredEntry>>) -> Option<CacheKey> {
    let now = Instant::now();
    if let Some((key, _)) = entries.iter().find(|(_, e)| e.is_expired(now)) {
        return Some(key.clone());
    }
    entries
        .iter()
        .min_by_key(|(_, e)| e.write_seq)
        .map(|(key, _)| key.clone())
}

fn estimate_bytes(value: &Value) -> u64 {
    // Serialized length is a good-enough proxy for memory footprint.
    serde_json::to_vec(value).map(|v| v.len() as u64).unwrap_or(0)
}
