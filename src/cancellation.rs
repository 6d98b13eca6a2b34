//! Query cancellation
//!
//! A query-scoped, set-once flag. Cancellation is cooperative: the scheduler
//! polls it between vertices and table connectors poll it between row
//! batches. Work already running when the flag flips is allowed to finish;
//! completing after the cancellation instant is reported as leaked work.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

type Listener = Box<dyn Fn(DateTime<Utc>) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct Stamp {
    at: DateTime<Utc>,
    instant: Instant,
}

/// Shared cancellation signal for one query
#[derive(Default)]
pub struct Cancellation {
    flag: AtomicBool,
    stamp: OnceLock<Stamp>,
    listeners: Mutex<Vec<Listener>>,
    notify: Notify,
}

impl std::fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancellation")
            .field("cancelled", &self.is_cancelled())
            .field("cancelled_at", &self.cancelled_at())
            .finish()
    }
}

impl Cancellation {
    /// A signal that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel. Returns `true` only for the call that flipped the flag.
    pub fn cancel(&self) -> bool {
        if self
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let stamp = Stamp {
            at: Utc::now(),
            instant: Instant::now(),
        };
        let _ = self.stamp.set(stamp);
        tracing::debug!(cancelled_at = %stamp.at, "Query cancelled");

        let listeners = std::mem::take(&mut *self.listeners.lock());
        for listener in &listeners {
            listener(stamp.at);
        }
        self.notify.notify_waiters();
        true
    }

    /// Check the flag
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// When the flag was set
    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.stamp.get().map(|s| s.at)
    }

    /// Run `listener` once cancelled (immediately if already cancelled)
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(DateTime<Utc>) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        if let Some(at) = self.cancelled_at() {
            drop(listeners);
            listener(at);
            return;
        }
        listeners.push(Box::new(listener));
    }

    /// Wait until cancelled
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Report work completing now.
    ///
    /// Returns how long after cancellation it completed, if it was cancelled.
    pub fn report_leak(&self, what: &str) -> Option<Duration> {
        if !self.is_cancelled() {
            return None;
        }
        let leaked = self
            .stamp
            .get()
            .map(|s| s.instant.elapsed())
            .unwrap_or_default();
        tracing::warn!(
            work = what,
            leaked_ms = leaked.as_millis() as u64,
            "Work completed after cancellation"
        );
        Some(leaked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_cancel_once() {
        let cancellation = Cancellation::new();
        assert!(!cancellation.is_cancelled());
        assert!(cancellation.cancelled_at().is_none());

        assert!(cancellation.cancel());
        assert!(!cancellation.cancel());
        assert!(cancellation.is_cancelled());
        assert!(cancellation.cancelled_at().is_some());
    }

    #[test]
    fn test_listeners_notified_once() {
        let cancellation = Cancellation::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        cancellation.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        cancellation.cancel();
        cancellation.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // late listener runs immediately
        let counter = calls.clone();
        cancellation.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_report_leak() {
        let cancellation = Cancellation::new();
        assert_eq!(cancellation.report_leak("step"), None);
        cancellation.cancel();
        assert!(cancellation.report_leak("step").is_some());
    }

    #[tokio::test]
    async fn test_wait_for_cancellation() {
        let cancellation = Arc::new(Cancellation::new());
        let waiter = {
            let cancellation = cancellation.clone();
            tokio::spawn(async move { cancellation.cancelled().await })
        };

        tokio::task::yield_now().await;
        cancellation.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // already cancelled: returns immediately
        cancellation.cancelled().await;
    }
}
