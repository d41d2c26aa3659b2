//! At-most-one-concurrent execution per job name.
//!
//! The guard is process-local. Across processes, duplicate queue messages
//! for the same tick are suppressed by the dispatcher's dedup key instead.

use dashmap::DashMap;
use tracing::trace;

/// Per-job-name in-flight flags.
#[derive(Debug, Default)]
pub struct OverlapGuard {
    locks: DashMap<String, bool>,
}

impl OverlapGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically mark `job_name` as running. Returns false if it already is.
    pub fn try_acquire(&self, job_name: &str) -> bool {
        let mut held = self.locks.entry(job_name.to_string()).or_insert(false);
        if *held {
            return false;
        }
        *held = true;
        trace!(job_name, "Overlap lock acquired");
        true
    }

    /// Mark `job_name` as idle. Releasing an idle name is a no-op.
    pub fn release(&self, job_name: &str) {
        if let Some(mut held) = self.locks.get_mut(job_name) {
            *held = false;
            trace!(job_name, "Overlap lock released");
        }
    }

    /// Acquire a permit that releases on drop.
    ///
    /// With `prevent_overlap = false` the guard is bypassed and a no-op
    /// permit is always returned.
    pub fn acquire(&self, job_name: &str, prevent_overlap: bool) -> Option<OverlapPermit<'_>> {
        if !prevent_overlap {
            return Some(OverlapPermit {
                guard: self,
                job_name: None,
            });
        }
        self.try_acquire(job_name).then(|| OverlapPermit {
            guard: self,
            job_name: Some(job_name.to_string()),
        })
    }

    pub fn is_held(&self, job_name: &str) -> bool {
        self.locks.get(job_name).map(|held| *held).unwrap_or(false)
    }

    /// Names currently held, sorted.
    pub fn held(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .locks
            .iter()
            .filter(|entry| *entry.value())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

/// Releases its overlap lock when dropped.
#[derive(Debug)]
pub struct OverlapPermit<'a> {
    guard: &'a OverlapGuard,
    job_name: Option<String>,
}

impl OverlapPermit<'_> {
    /// Whether this permit holds a lock (false when overlap is allowed).
    pub fn is_exclusive(&self) -> bool {
        self.job_name.is_some()
    }
}

impl Drop for OverlapPermit<'_> {
    fn drop(&mut self) {
        if let Some(name) = self.job_name.take() {
            self.guard.release(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_try_acquire_is_exclusive() {
        let guard = OverlapGuard::new();
        assert!(guard.try_acquire("heartbeat"));
        assert!(!guard.try_acquire("heartbeat"));
        assert!(guard.try_acquire("report"));

        guard.release("heartbeat");
        assert!(guard.try_acquire("heartbeat"));
    }

    #[test]
    fn test_release_is_idempotent() {
        let guard = OverlapGuard::new();
        guard.release("never-acquired");
        assert!(guard.try_acquire("a"));
        guard.release("a");
        guard.release("a");
        assert!(!guard.is_held("a"));
    }

    #[test]
    fn test_permit_releases_on_drop() {
        let guard = OverlapGuard::new();
        {
            let permit = guard.acquire("a", true).unwrap();
            assert!(permit.is_exclusive());
            assert!(guard.is_held("a"));
            assert!(guard.acquire("a", true).is_none());
        }
        assert!(!guard.is_held("a"));
    }

    #[test]
    fn test_bypass_when_overlap_allowed() {
        let guard = OverlapGuard::new();
        let first = guard.acquire("a", false).unwrap();
        let second = guard.acquire("a", false).unwrap();
        assert!(!first.is_exclusive());
        assert!(!second.is_exclusive());
        assert!(!guard.is_held("a"));
    }

    #[test]
    fn test_held_snapshot() {
        let guard = OverlapGuard::new();
        guard.try_acquire("b");
        guard.try_acquire("a");
        guard.try_acquire("c");
        guard.release("c");
        assert_eq!(guard.held(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_concurrent_acquire_single_winner() {
        let guard = Arc::new(OverlapGuard::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || guard.try_acquire("contended"))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
