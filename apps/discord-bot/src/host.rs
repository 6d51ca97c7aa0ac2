//! Host lifecycle and the shutdown sequence.

use crate::db::Database;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

const RELEASE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Created,
    Connecting,
    Ready,
    Degraded,
    Closing,
    Closed,
}

/// Tracks where the host is between process start and exit.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<HostState>,
    failures: AtomicU64,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState::Created),
            failures: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> HostState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `f` to the current state; returns whether it changed.
    fn transition(&self, f: impl FnOnce(HostState) -> Option<HostState>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match f(*state) {
            Some(next) => {
                *state = next;
                true
            }
            None => false,
        }
    }

    /// `Created -> Connecting`.
    pub fn start(&self) -> bool {
        self.transition(|s| (s == HostState::Created).then_some(HostState::Connecting))
    }

    /// `Connecting -> Ready`. Returns `false` for the repeat Ready events a
    /// reconnect produces, so setup work is never redone.
    pub fn mark_ready(&self) -> bool {
        self.transition(|s| (s == HostState::Connecting).then_some(HostState::Ready))
    }

    /// A handler failed and was answered with an error message.
    pub fn degrade(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.transition(|s| (s == HostState::Ready).then_some(HostState::Degraded));
    }

    /// A handler succeeded after a failure.
    pub fn recover(&self) {
        self.transition(|s| (s == HostState::Degraded).then_some(HostState::Ready));
    }

    /// Handler failures since start.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Enter `Closing`. Only the first caller gets `true`.
    pub fn begin_closing(&self) -> bool {
        self.transition(|s| match s {
            HostState::Closing | HostState::Closed => None,
            _ => Some(HostState::Closing),
        })
    }

    pub fn finish_closing(&self) {
        self.transition(|_| Some(HostState::Closed));
    }

    pub fn is_serving(&self) -> bool {
        matches!(self.state(), HostState::Ready | HostState::Degraded)
    }
}

/// Release the store, then the gateway. Safe to call more than once; later
/// calls return immediately. A release that hangs is logged and skipped.
pub async fn shutdown<F>(lifecycle: &Lifecycle, db: &Database, close_transport: F)
where
    F: Future<Output = ()>,
{
    if !lifecycle.begin_closing() {
        return;
    }
    info!("Shutting down");

    if tokio::time::timeout(RELEASE_TIMEOUT, db.disconnect())
        .await
        .is_err()
    {
        warn!("Timed out closing the database pool");
    }

    if tokio::time::timeout(RELEASE_TIMEOUT, close_transport)
        .await
        .is_err()
    {
        warn!("Timed out closing gateway shards");
    }

    lifecycle.finish_closing();
    info!("Shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tempfile::TempDir;

    #[test]
    fn walks_the_happy_path() {
        let lc = Lifecycle::new();
        assert_eq!(lc.state(), HostState::Created);
        assert!(lc.start());
        assert!(!lc.start());
        assert_eq!(lc.state(), HostState::Connecting);
        assert!(lc.mark_ready());
        assert!(lc.is_serving());
        assert!(lc.begin_closing());
        lc.finish_closing();
        assert_eq!(lc.state(), HostState::Closed);
    }

    #[test]
    fn repeat_ready_is_not_a_fresh_start() {
        let lc = Lifecycle::new();
        lc.start();
        assert!(lc.mark_ready());
        assert!(!lc.mark_ready());
        assert_eq!(lc.state(), HostState::Ready);
    }

    #[test]
    fn failures_degrade_without_stopping() {
        let lc = Lifecycle::new();
        lc.start();
        lc.mark_ready();

        lc.degrade();
        lc.degrade();
        assert_eq!(lc.state(), HostState::Degraded);
        assert!(lc.is_serving());
        assert_eq!(lc.failures(), 2);

        lc.recover();
        assert_eq!(lc.state(), HostState::Ready);
    }

    #[test]
    fn closing_is_claimed_once() {
        let lc = Lifecycle::new();
        assert!(lc.begin_closing());
        assert!(!lc.begin_closing());
        lc.degrade();
        assert_eq!(lc.state(), HostState::Closing);
    }

    #[tokio::test]
    async fn shutdown_releases_store_before_transport() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}", dir.path().join("bot.db").display());
        let db = Database::new(DatabaseConfig::new(url));
        db.connect().await.unwrap();

        let lc = Lifecycle::new();
        lc.start();
        lc.mark_ready();

        let store_closed_first = AtomicBool::new(false);
        let transport_calls = AtomicUsize::new(0);

        shutdown(&lc, &db, async {
            store_closed_first.store(!db.is_connected().await, Ordering::SeqCst);
            transport_calls.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert!(store_closed_first.load(Ordering::SeqCst));
        assert_eq!(lc.state(), HostState::Closed);

        shutdown(&lc, &db, async {
            transport_calls.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        assert_eq!(transport_calls.load(Ordering::SeqCst), 1);
    }
}
