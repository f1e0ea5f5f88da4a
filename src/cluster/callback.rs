//! Lifecycle of the leader-only work.
//!
//! At most one callback task runs at a time.  It is started by the control
//! loop when this process is leader and stopped, with a full join, before
//! the loop does anything else.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

/// Future returned by a [`LeaderCallback`].
pub type CallbackFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Leader-only work.
///
/// Invoked each time this process becomes leader.  The token is cancelled
/// when leadership is lost or the elector stops; the callback should
/// return promptly once that happens.
pub type LeaderCallback = Arc<dyn Fn(CancellationToken) -> CallbackFuture + Send + Sync>;

/// Wrap an async function as a [`LeaderCallback`].
pub fn leader_callback<F, Fut>(f: F) -> LeaderCallback
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |token| Box::pin(f(token)))
}

/// How a callback task ended.
#[derive(Debug)]
pub(crate) enum CallbackExit {
    /// Returned after its token was cancelled.
    Cancelled,
    /// Returned on its own while still leader.
    Returned(anyhow::Result<()>),
    /// Panicked.
    Panicked(String),
}

struct RunningCallback {
    token: CancellationToken,
    handle: JoinHandle<CallbackExit>,
    /// Cancels the callback if this entry is dropped without a join.
    _guard: DropGuard,
}

pub(crate) struct CallbackManager {
    callback: LeaderCallback,
    running: Option<RunningCallback>,
}

impl CallbackManager {
    pub fn new(callback: LeaderCallback) -> Self {
        Self {
            callback,
            running: None,
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start the callback under a child of `parent` unless it is running.
    ///
    /// Returns whether a new instance was started.
    pub fn ensure_running(&mut self, parent: &CancellationToken) -> bool {
        if self.running.is_some() {
            return false;
        }
        let token = parent.child_token();
        let task_token = token.clone();
        let work = (self.callback)(token.clone());
        let handle = tokio::spawn(async move {
            info!("leader callback is called");
            let result = work.await;
            if task_token.is_cancelled() {
                if let Err(err) = result {
                    debug!(error = %err, "leader callback returned after cancellation");
                }
                CallbackExit::Cancelled
            } else {
                CallbackExit::Returned(result)
            }
        });
        crate::metrics::record_callback_start();
        self.running = Some(RunningCallback {
            _guard: token.clone().drop_guard(),
            token,
            handle,
        });
        true
    }

    /// Cancel the running callback and wait until it has fully stopped.
    pub async fn cancel(&mut self, reason: &str) {
        let Some(running) = self.running.take() else {
            return;
        };
        info!(reason, "cancel leader callback");
        let start = Instant::now();
        running.token.cancel();
        if let Err(err) = running.handle.await {
            warn!(error = %err, "leader callback panicked");
        }
        info!(took = ?start.elapsed(), "leader callback is canceled");
    }

    /// Cancel the running callback without waiting for it to stop.
    ///
    /// For teardown paths that cannot await.
    pub fn abandon(&mut self) {
        if self.running.take().is_some() {
            warn!("leader callback abandoned without join");
        }
    }

    /// Resolves when the running callback exits on its own; pending when
    /// nothing is running.
    ///
    /// Cancel safe: dropping the future leaves the callback tracked.
    pub async fn exited(&mut self) -> CallbackExit {
        let Some(running) = self.running.as_mut() else {
            return std::future::pending().await;
        };
        let exit = match (&mut running.handle).await {
            Ok(exit) => exit,
            Err(err) => CallbackExit::Panicked(err.to_string()),
        };
        self.running = None;
        exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_callback(active: Arc<AtomicUsize>, starts: Arc<AtomicUsize>) -> LeaderCallback {
        leader_callback(move |token: CancellationToken| {
            let active = Arc::clone(&active);
            let starts = Arc::clone(&starts);
            async move {
                starts.fetch_add(1, Ordering::SeqCst);
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                assert!(now <= 1, "callbacks overlapped");
                token.cancelled().await;
                // Simulate draining work after cancellation.
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_ensure_running_is_idempotent() {
        let active = Arc::new(AtomicUsize::new(0));
        let starts = Arc::new(AtomicUsize::new(0));
        let mut manager = CallbackManager::new(counting_callback(active.clone(), starts.clone()));
        let parent = CancellationToken::new();

        assert!(manager.ensure_running(&parent));
        assert!(!manager.ensure_running(&parent));
        assert!(manager.is_running());

        manager.cancel("test").await;
        assert!(!manager.is_running());
        assert_eq!(active.load(Ordering::SeqCst), 0);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_joins_before_restart() {
        let active = Arc::new(AtomicUsize::new(0));
        let starts = Arc::new(AtomicUsize::new(0));
        let mut manager = CallbackManager::new(counting_callback(active.clone(), starts.clone()));
        let parent = CancellationToken::new();

        for _ in 0..5 {
            manager.ensure_running(&parent);
            tokio::task::yield_now().await;
            manager.cancel("churn").await;
            assert_eq!(active.load(Ordering::SeqCst), 0);
        }
        assert_eq!(starts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_noop() {
        let mut manager = CallbackManager::new(leader_callback(|_| async { anyhow::Ok(()) }));
        manager.cancel("idle").await;
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn test_exited_reports_unexpected_return() {
        let mut manager = CallbackManager::new(leader_callback(|_| async {
            Err::<(), _>(anyhow::anyhow!("boom"))
        }));
        manager.ensure_running(&CancellationToken::new());
        match manager.exited().await {
            CallbackExit::Returned(Err(err)) => assert_eq!(err.to_string(), "boom"),
            other => panic!("unexpected exit {other:?}"),
        }
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn test_exited_reports_panic() {
        let mut manager = CallbackManager::new(leader_callback(|_| async {
            if true {
                panic!("callback panic");
            }
            anyhow::Ok(())
        }));
        manager.ensure_running(&CancellationToken::new());
        assert!(matches!(manager.exited().await, CallbackExit::Panicked(_)));
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_callback() {
        let mut manager =
            CallbackManager::new(leader_callback(|token: CancellationToken| async move {
                token.cancelled().await;
                anyhow::Ok(())
            }));
        let parent = CancellationToken::new();
        manager.ensure_running(&parent);
        parent.cancel();
        assert!(matches!(manager.exited().await, CallbackExit::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exited_is_pending_when_idle() {
        let mut manager = CallbackManager::new(leader_callback(|_| async { anyhow::Ok(()) }));
        let res = tokio::time::timeout(Duration::from_secs(1), manager.exited()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_dropping_manager_cancels_callback() {
        let active = Arc::new(AtomicUsize::new(0));
        let starts = Arc::new(AtomicUsize::new(0));
        let mut manager = CallbackManager::new(counting_callback(active.clone(), starts.clone()));
        manager.ensure_running(&CancellationToken::new());
        tokio::task::yield_now().await;
        assert_eq!(active.load(Ordering::SeqCst), 1);

        drop(manager);
        for _ in 0..100 {
            if active.load(Ordering::SeqCst) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_abandon_cancels_without_join() {
        let active = Arc::new(AtomicUsize::new(0));
        let starts = Arc::new(AtomicUsize::new(0));
        let mut manager = CallbackManager::new(counting_callback(active.clone(), starts.clone()));
        manager.ensure_running(&CancellationToken::new());
        tokio::task::yield_now().await;

        manager.abandon();
        assert!(!manager.is_running());
        for _ in 0..100 {
            if active.load(Ordering::SeqCst) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }
}
