use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;

use crate::backend::Backend;
use crate::sync::{ContentSyncClient, PullFuture, SyncError};

#[cfg(feature = "backend-sql")]
pub async fn create_backend() -> (Backend, TempDir) {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    let dir = tempfile::tempdir().unwrap();
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("site.sql"))
        .create_if_missing(true);

    // one connection, so concurrent writers queue rather than hit SQLITE_BUSY
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    (Backend::migrated(db).await, dir)
}

#[cfg(not(feature = "backend-sql"))]
pub async fn create_backend() -> (Backend, TempDir) {
    let dir = tempfile::tempdir().unwrap();

    (Backend::new(dir.path()).await, dir)
}

/// Counts pulls and notices if two ever run at once.
#[derive(Default)]
pub struct MockPull {
    delay: Duration,
    fail: bool,
    in_flight: AtomicBool,
    pub pulls: AtomicUsize,
    pub overlapped: AtomicBool,
}

impl MockPull {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// Every pull fails the way git does outside a checkout.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

impl ContentSyncClient for MockPull {
    fn pull(&self) -> PullFuture<'_> {
        Box::pin(async move {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }

            tokio::time::sleep(self.delay).await;

            self.in_flight.store(false, Ordering::SeqCst);
            self.pulls.fetch_add(1, Ordering::SeqCst);

            if self.fail {
                return Err(SyncError::Failed {
                    status: Some(128),
                    stderr: "fatal: not a git repository".into(),
                });
            }
            Ok(())
        })
    }
}
