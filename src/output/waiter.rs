// src/output/waiter.rs

//! The "wait before looking again" step shared by output tailing and the
//! start-up bookkeeping poll.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::types::WatchMode;

/// Something that resolves when it is worth re-checking a file or directory.
pub trait ChangeWaiter: Send + Sync {
    fn wait(&self) -> BoxFuture<'_, ()>;
}

/// Fixed sleep between polls.
#[derive(Debug, Clone, Copy)]
pub struct IntervalWaiter {
    interval: Duration,
}

impl IntervalWaiter {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl ChangeWaiter for IntervalWaiter {
    fn wait(&self) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(self.interval))
    }
}

/// Wakes on filesystem notifications for a directory, or after `fallback`
/// at the latest.
pub struct NotifyWaiter {
    changed: Arc<Notify>,
    fallback: Duration,
    // Kept alive for the lifetime of the waiter; never touched again.
    _watcher: Mutex<RecommendedWatcher>,
}

impl std::fmt::Debug for NotifyWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWaiter")
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl NotifyWaiter {
    /// Watch `dir` (non-recursively). The directory must exist.
    pub fn new(dir: &Path, fallback: Duration) -> Result<Self> {
        let changed = Arc::new(Notify::new());

        let mut watcher = RecommendedWatcher::new(
            {
                let changed = Arc::clone(&changed);
                move |res: notify::Result<Event>| match res {
                    // Stores a permit if nobody is waiting yet.
                    Ok(_) => changed.notify_one(),
                    Err(err) => eprintln!("proofrun: file watch error: {err}"),
                }
            },
            Config::default(),
        )?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("watching {:?}", dir))?;

        debug!(dir = ?dir, "notify waiter started");
        Ok(Self {
            changed,
            fallback,
            _watcher: Mutex::new(watcher),
        })
    }
}

impl ChangeWaiter for NotifyWaiter {
    fn wait(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            tokio::select! {
                _ = self.changed.notified() => {}
                _ = tokio::time::sleep(self.fallback) => {}
            }
        })
    }
}

/// Build the waiter for `mode`, watching `dir` in notify mode.
///
/// Falls back to plain polling if the watcher cannot be set up.
pub fn waiter_for(mode: WatchMode, dir: &Path, interval: Duration) -> Box<dyn ChangeWaiter> {
    match mode {
        WatchMode::Poll => Box::new(IntervalWaiter::new(interval)),
        WatchMode::Notify => match NotifyWaiter::new(dir, interval) {
            Ok(waiter) => Box::new(waiter),
            Err(e) => {
                warn!(dir = ?dir, error = %format!("{e:#}"), "file notifications unavailable; polling instead");
                Box::new(IntervalWaiter::new(interval))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn interval_waiter_sleeps_for_its_interval() {
        let waiter = IntervalWaiter::new(Duration::from_millis(30));
        let started = Instant::now();
        waiter.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn missing_directory_falls_back_to_polling() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        let waiter = waiter_for(WatchMode::Notify, &missing, Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(1), waiter.wait())
            .await
            .expect("fallback waiter resolves");
    }

    #[tokio::test]
    async fn notify_waiter_wakes_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let waiter = NotifyWaiter::new(dir.path(), Duration::from_secs(30)).unwrap();

        let path = dir.path().join("out.log");
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tokio::fs::write(path, b"hello\n").await.unwrap();
        });

        tokio::time::timeout(Duration::from_secs(5), waiter.wait())
            .await
            .expect("woken by the write, not the fallback");
    }
}
