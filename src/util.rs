use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[inline]
pub(crate) fn unix_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| {
            u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
        })
}

/// Correlation-id generator: a per-process random seed XORed with a
/// monotonic counter, rendered as a UUID. Unique within the process and
/// stable enough to join log lines across components.
pub(crate) struct CorrelationIds {
    seed: u128,
    counter: AtomicU64,
}

impl CorrelationIds {
    #[must_use]
    pub(crate) fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            counter: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub(crate) fn next(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        uuid::Uuid::from_u128(self.seed ^ u128::from(seq)).to_string()
    }
}

#[inline]
pub(crate) fn find_ascii_case_insensitive(
    haystack: &[u8],
    needle: &[u8],
    from: usize,
) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if haystack.len() < needle.len() || from > haystack.len() - needle.len() {
        return None;
    }

    let (&first, _) = needle.split_first()?;
    let mut cursor = from;
    while haystack.len() - cursor >= needle.len() {
        let rel_first = memchr::memchr2(
            first.to_ascii_lowercase(),
            first.to_ascii_uppercase(),
            &haystack[cursor..],
        )?;
        let start = cursor + rel_first;
        let end = start + needle.len();
        if end > haystack.len() {
            return None;
        }
        if haystack[start..end].eq_ignore_ascii_case(needle) {
            return Some(start);
        }
        cursor = start + 1;
    }
    None
}
