use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::site::{self, Error};

pub type PullFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send + 'a>>;

#[derive(Debug)]
pub enum SyncError {
    Spawn(std::io::Error),
    Failed { status: Option<i32>, stderr: String },
    TimedOut,
}

impl fmt::Display for SyncError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(e) => write!(fmt, "couldn't run git: {e}"),
            Self::Failed {
                status: Some(code),
                stderr,
            } => write!(fmt, "git exited with {code}: {stderr}"),
            Self::Failed {
                status: None,
                stderr,
            } => write!(fmt, "git killed by a signal: {stderr}"),
            Self::TimedOut => fmt.write_str("timed out"),
        }
    }
}

/// Brings the content checkout up to date with its remote.
pub trait ContentSyncClient: Send + Sync {
    fn pull(&self) -> PullFuture<'_>;
}

/// `git pull --ff-only` in a working copy, via the git binary.
pub struct GitPull {
    checkout: PathBuf,
    remote: String,
}

impl GitPull {
    pub fn new(checkout: PathBuf, remote: String) -> Self {
        Self { checkout, remote }
    }
}

impl ContentSyncClient for GitPull {
    fn pull(&self) -> PullFuture<'_> {
        Box::pin(async move {
            debug!("git pull {} in {:?}", self.remote, self.checkout);

            let output = Command::new("git")
                .arg("-C")
                .arg(&self.checkout)
                .args(["pull", "--ff-only"])
                .arg(&self.remote)
                .env("GIT_TERMINAL_PROMPT", "0")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(SyncError::Spawn)?;

            if output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                info!("git pull: {}", stdout.trim());
                Ok(())
            } else {
                Err(SyncError::Failed {
                    status: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().into(),
                })
            }
        })
    }
}

pub struct ContentSync {
    client: Arc<dyn ContentSyncClient>,
    running: Mutex<()>,
    timeout: Duration,
    secret_digest: Option<String>,
}

impl ContentSync {
    pub fn new(
        client: Arc<dyn ContentSyncClient>,
        timeout: Duration,
        secret: Option<&str>,
    ) -> Self {
        Self {
            client,
            running: Mutex::new(()),
            timeout,
            secret_digest: secret.map(sha256::digest),
        }
    }

    pub fn is_open(&self) -> bool {
        self.secret_digest.is_none()
    }

    /// Digests are compared so the comparison doesn't depend on the token's length.
    pub fn check_token(&self, token: Option<&str>) -> site::Result<()> {
        let Some(expected) = &self.secret_digest else {
            return Ok(());
        };

        match token {
            Some(token) if &sha256::digest(token) == expected => Ok(()),
            Some(_) => {
                warn!("webhook called with the wrong token");
                Err(Error::Forbidden)
            }
            None => {
                warn!("webhook called without a token");
                Err(Error::Forbidden)
            }
        }
    }

    /// One pull at a time, each bounded by the timeout.
    pub async fn sync(&self) -> Result<(), SyncError> {
        let _running = self.running.lock().await;

        info!("syncing site content");
        let outcome = tokio::time::timeout(self.timeout, self.client.pull())
            .await
            .unwrap_or(Err(SyncError::TimedOut));

        match &outcome {
            Ok(()) => info!("site content synced"),
            Err(e) => error!("site content sync failed: {e}"),
        }
        outcome
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::atomic::Ordering;

    use crate::mock::MockPull;

    #[tokio::test]
    async fn pulls_never_overlap() {
        let pull = Arc::new(MockPull::slow(Duration::from_millis(30)));
        let sync = Arc::new(ContentSync::new(pull.clone(), Duration::from_secs(5), None));

        let runs: Vec<_> = (0..4)
            .map(|_| {
                let sync = Arc::clone(&sync);
                tokio::spawn(async move { sync.sync().await })
            })
            .collect();

        for run in runs {
            run.await.unwrap().unwrap();
        }

        assert_eq!(pull.pulls.load(Ordering::SeqCst), 4);
        assert!(!pull.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn slow_pull_times_out() {
        let pull = Arc::new(MockPull::slow(Duration::from_secs(10)));
        let sync = ContentSync::new(pull.clone(), Duration::from_millis(20), None);

        let err = sync.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::TimedOut));
        assert_eq!(pull.pulls.load(Ordering::SeqCst), 0);

        // the lock was released
        let err = sync.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::TimedOut));
    }

    #[test]
    fn token_check() {
        let pull = Arc::new(MockPull::default());

        let open = ContentSync::new(pull.clone(), Duration::from_secs(1), None);
        assert!(open.is_open());
        assert_eq!(open.check_token(None), Ok(()));
        assert_eq!(open.check_token(Some("anything")), Ok(()));

        let closed = ContentSync::new(pull, Duration::from_secs(1), Some("s3cret"));
        assert!(!closed.is_open());
        assert_eq!(closed.check_token(Some("s3cret")), Ok(()));
        assert_eq!(closed.check_token(Some("s3cret ")), Err(Error::Forbidden));
        assert_eq!(closed.check_token(None), Err(Error::Forbidden));
    }

    #[tokio::test]
    async fn git_pull_outside_a_checkout_fails() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitPull::new(dir.path().join("missing"), "origin".into());

        // either git isn't installed or it can't enter the directory
        assert!(git.pull().await.is_err());
    }

    #[test]
    fn failures_say_what_git_said() {
        let err = SyncError::Failed {
            status: Some(1),
            stderr: "fatal: Not possible to fast-forward, aborting.".into(),
        };
        assert_eq!(
            err.to_string(),
            "git exited with 1: fatal: Not possible to fast-forward, aborting."
        );

        let err = SyncError::Spawn(std::io::ErrorKind::NotFound.into());
        assert!(err.to_string().starts_with("couldn't run git: "));
        assert_eq!(SyncError::TimedOut.to_string(), "timed out");
    }
}
