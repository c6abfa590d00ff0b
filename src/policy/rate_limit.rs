//! Sliding-window rate limiting, one window per tool name.
//!
//! The table is an explicit bounded cache: entries appear lazily on first
//! use, old timestamps are evicted on every check, and an opportunistic
//! sweep keeps the table size capped no matter how many distinct tool names
//! a session ever invokes. Sharded so unrelated tools never contend on one
//! lock.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHasher};

pub(crate) const WINDOW_MS: u64 = 1_000;
pub(crate) const SWEEP_INTERVAL_MS: u64 = 60_000;
pub(crate) const MAX_TRACKED_TOOLS: usize = 256;
const SHARD_COUNT: usize = 16;

#[derive(Debug, Default)]
struct ToolWindow {
    /// Call timestamps within the current window, oldest first.
    timestamps: Vec<u64>,
    /// When this entry's window was last pruned. Doubles as the recency
    /// stamp used to pick eviction victims.
    last_cleanup_ms: u64,
}

pub(crate) struct RateLimitTable {
    shards: Vec<Mutex<FxHashMap<String, ToolWindow>>>,
    last_sweep_ms: AtomicU64,
    max_entries: usize,
}

impl RateLimitTable {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::with_max_entries(MAX_TRACKED_TOOLS)
    }

    #[must_use]
    pub(crate) fn with_max_entries(max_entries: usize) -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(Mutex::new(FxHashMap::default()));
        }
        Self {
            shards,
            last_sweep_ms: AtomicU64::new(0),
            max_entries,
        }
    }

    fn shard_for(&self, tool: &str) -> &Mutex<FxHashMap<String, ToolWindow>> {
        let mut hasher = FxHasher::default();
        tool.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Admit or reject one call for `tool` under `limit` calls per window.
    ///
    /// Rejected attempts are not recorded, so a burst of rejections does not
    /// extend the lockout. The per-entry mutation runs under the shard lock,
    /// keeping the read-modify-write atomic with respect to concurrent calls
    /// for the same tool.
    pub(crate) fn check_and_record(&self, tool: &str, limit: u32, now_ms: u64) -> bool {
        let mut shard = self.shard_for(tool).lock();
        let window = shard.entry(tool.to_string()).or_default();

        let window_start = now_ms.saturating_sub(WINDOW_MS);
        window.timestamps.retain(|&ts| ts > window_start);
        window.last_cleanup_ms = now_ms;

        if window.timestamps.len() >= limit as usize {
            return false;
        }
        window.timestamps.push(now_ms);
        true
    }

    /// Sweep the whole table, at most once per [`SWEEP_INTERVAL_MS`].
    ///
    /// Drops entries idle past the interval, then evicts the entries with the
    /// oldest cleanup stamps until the table is back under its cap.
    pub(crate) fn maybe_sweep(&self, now_ms: u64) {
        let last = self.last_sweep_ms.load(Ordering::Acquire);
        if now_ms.saturating_sub(last) < SWEEP_INTERVAL_MS {
            return;
        }
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Another caller is already sweeping.
            return;
        }
        self.sweep(now_ms);
    }

    fn sweep(&self, now_ms: u64) {
        let mut total = 0usize;
        for shard in &self.shards {
            let mut entries = shard.lock();
            entries
                .retain(|_, window| now_ms.saturating_sub(window.last_cleanup_ms) < SWEEP_INTERVAL_MS);
            total += entries.len();
        }

        if total <= self.max_entries {
            tracing::debug!(entries = total, "rate limit table swept");
            return;
        }

        // Over cap even after dropping stale entries: evict oldest-cleanup
        // entries first. Eviction is rare enough that collecting stamps and
        // sorting is fine.
        let mut stamps: Vec<(u64, usize, String)> = Vec::with_capacity(total);
        for (shard_index, shard) in self.shards.iter().enumerate() {
            let entries = shard.lock();
            for (tool, window) in entries.iter() {
                stamps.push((window.last_cleanup_ms, shard_index, tool.clone()));
            }
        }
        stamps.sort_unstable_by_key(|(stamp, _, _)| *stamp);

        let excess = total - self.max_entries;
        for (_, shard_index, tool) in stamps.into_iter().take(excess) {
            self.shards[shard_index].lock().remove(&tool);
        }
        tracing::debug!(
            entries = total - excess,
            evicted = excess,
            "rate limit table swept over capacity"
        );
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let table = RateLimitTable::new();
        let now = 1_000_000;
        assert!(table.check_and_record("file.read", 2, now));
        assert!(table.check_and_record("file.read", 2, now + 200));
        assert!(!table.check_and_record("file.read", 2, now + 500));
    }

    #[test]
    fn window_slides_past_old_calls() {
        let table = RateLimitTable::new();
        let now = 1_000_000;
        assert!(table.check_and_record("t", 1, now));
        assert!(!table.check_and_record("t", 1, now + 900));
        assert!(table.check_and_record("t", 1, now + WINDOW_MS + 1));
    }

    #[test]
    fn rejection_is_not_recorded() {
        let table = RateLimitTable::new();
        let now = 1_000_000;
        assert!(table.check_and_record("t", 1, now));
        for i in 0..5 {
            assert!(!table.check_and_record("t", 1, now + 100 + i));
        }
        // The original call leaves the window on schedule.
        assert!(table.check_and_record("t", 1, now + WINDOW_MS + 1));
    }

    #[test]
    fn tools_are_limited_independently() {
        let table = RateLimitTable::new();
        let now = 1_000_000;
        assert!(table.check_and_record("a", 1, now));
        assert!(table.check_and_record("b", 1, now));
        assert!(!table.check_and_record("a", 1, now + 1));
    }

    #[test]
    fn sweep_drops_stale_entries() {
        let table = RateLimitTable::new();
        let now = 1_000_000;
        table.check_and_record("stale", 5, now);
        table.check_and_record("fresh", 5, now + SWEEP_INTERVAL_MS);
        assert_eq!(table.len(), 2);

        table.maybe_sweep(now + SWEEP_INTERVAL_MS + 1);
        assert_eq!(table.len(), 1);
        // The fresh entry keeps its in-window timestamp.
        assert!(!table.check_and_record("fresh", 1, now + SWEEP_INTERVAL_MS + 2));
    }

    #[test]
    fn sweep_enforces_entry_cap_oldest_first() {
        let table = RateLimitTable::with_max_entries(4);
        let now = 1_000_000;
        for i in 0..8u64 {
            // All entries recent enough to survive the staleness pass, with
            // distinct cleanup stamps.
            table.check_and_record(&format!("tool{i}"), 5, now + i);
        }
        assert_eq!(table.len(), 8);

        table.last_sweep_ms.store(now, Ordering::Release);
        table.maybe_sweep(now + 100);
        // Interval not elapsed yet: no sweep.
        assert_eq!(table.len(), 8);

        // Backdate the last sweep so the interval check passes while every
        // entry is still fresh.
        table.last_sweep_ms.store(0, Ordering::Release);
        table.maybe_sweep(now + 10);
        assert_eq!(table.len(), 4);
        // Newest entries survive.
        let survivors = table.check_and_record("tool7", 5, now + 11);
        assert!(survivors);
    }
}
