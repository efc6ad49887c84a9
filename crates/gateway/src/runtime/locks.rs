//! Stripe locks for mutating operations.
//!
//! Two fixed arrays of async mutexes: one keyed by `(website, environment)`
//! for apply / release / rollback / promote, one keyed by normalized domain
//! for binding CRUD. The stripe index is FNV-32a of the key — uniform
//! distribution is all that is needed here, not cryptographic quality — so
//! distinct keys rarely contend while identical keys always serialize.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Stripes for `(website, environment)` operations.
const APPLY_STRIPES: usize = 64;
/// Stripes for per-domain operations.
const DOMAIN_STRIPES: usize = 32;

pub struct StripeLocks {
    apply: Vec<Arc<Mutex<()>>>,
    domain: Vec<Arc<Mutex<()>>>,
}

impl Default for StripeLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl StripeLocks {
    pub fn new() -> Self {
        Self {
            apply: (0..APPLY_STRIPES)
                .map(|_| Arc::new(Mutex::new(())))
                .collect(),
            domain: (0..DOMAIN_STRIPES)
                .map(|_| Arc::new(Mutex::new(())))
                .collect(),
        }
    }

    /// Stripe index for a `(website, environment)` pair.
    pub fn env_index(website: &str, environment: &str) -> usize {
        fnv32a(&format!("{website}/{environment}")) as usize % APPLY_STRIPES
    }

    /// Serialize all mutating operations on one `(website, environment)`.
    pub async fn lock_env(&self, website: &str, environment: &str) -> OwnedMutexGuard<()> {
        let index = Self::env_index(website, environment);
        self.apply[index].clone().lock_owned().await
    }

    /// Acquire both environments' stripes in ascending index order (swapping
    /// avoids deadlock against a concurrent promote in the other direction).
    /// When both hash to the same stripe, a single lock is taken once.
    pub async fn lock_env_pair(
        &self,
        website: &str,
        env_a: &str,
        env_b: &str,
    ) -> (OwnedMutexGuard<()>, Option<OwnedMutexGuard<()>>) {
        let index_a = Self::env_index(website, env_a);
        let index_b = Self::env_index(website, env_b);

        if index_a == index_b {
            return (self.apply[index_a].clone().lock_owned().await, None);
        }

        let (low, high) = if index_a < index_b {
            (index_a, index_b)
        } else {
            (index_b, index_a)
        };
        let first = self.apply[low].clone().lock_owned().await;
        let second = self.apply[high].clone().lock_owned().await;
        (first, Some(second))
    }

    /// Serialize add/remove for one normalized domain.
    pub async fn lock_domain(&self, domain: &str) -> OwnedMutexGuard<()> {
        let index = fnv32a(domain) as usize % DOMAIN_STRIPES;
        self.domain[index].clone().lock_owned().await
    }
}

/// FNV-1a, 32-bit.
fn fnv32a(key: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in key.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn fnv32a_matches_reference_vectors() {
        // Published FNV-1a 32-bit test vectors.
        assert_eq!(fnv32a(""), 0x811c_9dc5);
        assert_eq!(fnv32a("a"), 0xe40c_292c);
        assert_eq!(fnv32a("foobar"), 0xbf9c_f968);
    }

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = Arc::new(StripeLocks::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock_env("blog", "prod").await;
                let inside = counter.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(inside, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pair_lock_is_reorder_safe() {
        let locks = Arc::new(StripeLocks::new());

        // Two promotes in opposite directions must not deadlock.
        let locks_a = locks.clone();
        let ab = tokio::spawn(async move {
            for _ in 0..50 {
                let _guards = locks_a.lock_env_pair("blog", "staging", "prod").await;
            }
        });
        let locks_b = locks.clone();
        let ba = tokio::spawn(async move {
            for _ in 0..50 {
                let _guards = locks_b.lock_env_pair("blog", "prod", "staging").await;
            }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            ab.await.unwrap();
            ba.await.unwrap();
        })
        .await
        .expect("pair locking deadlocked");
    }

    #[tokio::test]
    async fn colliding_pair_takes_one_lock() {
        let locks = StripeLocks::new();
        // Same environment twice necessarily collides.
        let (_first, second) = locks.lock_env_pair("blog", "prod", "prod").await;
        assert!(second.is_none());
    }
}
