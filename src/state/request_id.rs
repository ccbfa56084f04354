use std::sync::atomic::{AtomicU64, Ordering};

/// Collision-resistant completion ids without a global RNG per request:
/// a random per-process seed mixed with a monotonically increasing counter.
pub(crate) struct RequestIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_completion_id(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let uuid = uuid::Uuid::from_u128(self.seed ^ u128::from(seq));
        format!("chatcmpl-{}", uuid.simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_prefixed() {
        let generator = RequestIdGenerator::new();
        let first = generator.next_completion_id();
        let second = generator.next_completion_id();
        assert_ne!(first, second);
        assert!(first.starts_with("chatcmpl-"));
        assert_eq!(first.len(), "chatcmpl-".len() + 32);
    }
}
