//! The control loop: renewal, leader callback lifecycle and resignation.
//!
//! One loop per elector owns every write to the election record made by
//! this process.  Each turn renews the lease (retrying with random jitter
//! inside the renew deadline), starts or stops the leader callback to
//! match the outcome, then waits for the next tick, a resignation request,
//! an unexpected callback exit, or shutdown.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::callback::{CallbackExit, CallbackManager, LeaderCallback};
use super::elector::{ResignRequest, Shared};
use crate::config::ShutdownMode;
use crate::errors::{ElectionError, Result, StorageError};
use crate::metrics;

/// Loop-owned state that outlives a single `run`.
pub(crate) struct LoopParts {
    callbacks: CallbackManager,
    resign_rx: mpsc::Receiver<ResignRequest>,
    rng: StdRng,
}

impl LoopParts {
    pub fn new(
        callback: LeaderCallback,
        resign_rx: mpsc::Receiver<ResignRequest>,
        rng: StdRng,
    ) -> Self {
        Self {
            callbacks: CallbackManager::new(callback),
            resign_rx,
            rng,
        }
    }

    /// Stop the leader callback without joining it.
    pub fn abandon_callback(&mut self) {
        self.callbacks.abandon();
    }
}

/// What a release write removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    /// Clear the leader pointer if it is us.
    Leadership,
    /// Also drop our member entry.
    Membership,
}

pub(crate) struct ControlLoop {
    shared: Arc<Shared>,
    parts: LoopParts,
    /// Refuse leadership until this instant.
    resign_until: Option<Instant>,
    was_leader: bool,
}

impl ControlLoop {
    pub fn new(shared: Arc<Shared>, parts: LoopParts) -> Self {
        Self {
            shared,
            parts,
            resign_until: None,
            was_leader: false,
        }
    }

    pub fn into_parts(self) -> LoopParts {
        self.parts
    }

    pub async fn run(&mut self, shutdown: &CancellationToken) -> Result<()> {
        let renew_interval = self.shared.config.renew_interval;
        loop {
            match self.renew(shutdown).await {
                Err(ElectionError::Cancelled) => {}
                Err(err) => {
                    warn!(
                        error = %err,
                        renew_deadline = ?self.shared.config.renew_deadline,
                        "failed to renew lease"
                    );
                    metrics::record_renewal(false);
                    self.parts.callbacks.cancel("renew lease failed").await;
                }
                Ok(()) => {
                    metrics::record_renewal(true);
                    if self.shared.is_leader() && !shutdown.is_cancelled() {
                        self.parts.callbacks.ensure_running(shutdown);
                    } else {
                        self.parts.callbacks.cancel("not leader").await;
                    }
                }
            }
            self.record_leadership();

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    return self.shutdown().await;
                }
                Some(request) = self.parts.resign_rx.recv() => {
                    self.handle_resign(request).await;
                }
                exit = self.parts.callbacks.exited() => {
                    self.handle_callback_exit(exit).await;
                }
                _ = tokio::time::sleep(renew_interval) => {}
            }
        }
    }

    fn record_leadership(&mut self) {
        let is_leader = self.shared.is_leader();
        if is_leader && !self.was_leader {
            metrics::record_elected();
        }
        self.was_leader = is_leader;
        metrics::record_leadership(is_leader, self.shared.members().len());
    }

    /// Renew until success, the renew deadline, or shutdown.
    ///
    /// Errors that a retry cannot fix end the cycle at once.
    async fn renew(&mut self, shutdown: &CancellationToken) -> Result<()> {
        let renew_deadline = self.shared.config.renew_deadline;
        let renew_interval = self.shared.config.renew_interval;
        let deadline = Instant::now() + renew_deadline;

        loop {
            let attempt = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(ElectionError::Cancelled),
                attempt = tokio::time::timeout_at(deadline, self.try_renew()) => attempt,
            };
            let err = match attempt {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => err,
                Err(_) => return Err(ElectionError::RenewDeadlineExceeded(renew_deadline)),
            };
            if !err.is_retryable() {
                return Err(err.into());
            }

            let delay = self.retry_delay(renew_interval);
            info!(delay = ?delay, error = %err, "renew lease failed, retry after random delay");
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(ElectionError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(ElectionError::RenewDeadlineExceeded(renew_deadline));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Uniform in `[0, interval)`.
    fn retry_delay(&mut self, interval: Duration) -> Duration {
        let nanos = u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX).max(1);
        Duration::from_nanos(self.parts.rng.gen_range(0..nanos))
    }

    async fn try_renew(&mut self) -> std::result::Result<(), StorageError> {
        let start = Instant::now();
        let result = self.try_renew_once().await;
        debug!(took = ?start.elapsed(), error = ?result.as_ref().err(), "try renew");
        result
    }

    /// One read-modify-write cycle against storage.
    async fn try_renew_once(&mut self) -> std::result::Result<(), StorageError> {
        let shared = Arc::clone(&self.shared);
        let config = &shared.config;

        let mut record = shared.storage.get().await?;
        shared.observe(&record);

        let members = std::mem::take(&mut record.members);
        let (expired, active) = shared.partition_expired(members);
        for member in expired {
            if member.id == record.leader_id {
                record.leader_id.clear();
                info!(
                    leader_id = %member.id,
                    leader_name = %member.name,
                    leader_address = %member.address,
                    "leader lease expired"
                );
            } else {
                info!(
                    member_id = %member.id,
                    member_name = %member.name,
                    member_address = %member.address,
                    "member lease expired"
                );
            }
        }
        record.members = active;
        if record.has_leader() && record.leader().is_none() {
            info!(leader_id = %record.leader_id, "leader is not a member");
            record.leader_id.clear();
        }

        match record.find_member_mut(&config.id) {
            Some(me) => me.renew(),
            None => record.members.push(shared.self_member()),
        }

        let now = Instant::now();
        if self.resign_until.is_some_and(|until| now < until) {
            if record.leader_id == config.id {
                record.leader_id.clear();
                info!("try to resign leadership");
            }
        } else if !record.has_leader() {
            record.leader_id = config.id.clone();
            info!(
                id = %config.id,
                name = %config.name,
                address = %config.address,
                "try to elect self as leader"
            );
        }

        shared.storage.update(&record).await?;
        shared.observe(&record);
        Ok(())
    }

    /// Best-effort release write bounded by `timeout`.
    async fn release(&mut self, what: Release, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.release_once(what)).await {
            Ok(result) => result.map_err(ElectionError::from),
            Err(_) => Err(ElectionError::ReleaseTimeout(timeout)),
        }
    }

    async fn release_once(&mut self, what: Release) -> std::result::Result<(), StorageError> {
        let shared = Arc::clone(&self.shared);
        let id = &shared.config.id;

        let mut record = shared.storage.get().await?;
        shared.observe(&record);

        if record.leader_id == *id {
            record.leader_id.clear();
        }
        if what == Release::Membership {
            record.remove_member(id);
        }

        shared.storage.update(&record).await?;
        shared.observe(&record);
        Ok(())
    }

    async fn handle_resign(&mut self, request: ResignRequest) {
        let ResignRequest {
            cooldown,
            deadline,
            accepted,
            mut reply,
        } = request;

        let now = Instant::now();
        if reply.is_closed() {
            debug!("resign request abandoned by caller");
            return;
        }
        if now >= deadline {
            let _ = reply.send(Err(ElectionError::ResignTimeout));
            return;
        }
        if accepted.send(()).is_err() {
            debug!("resign request abandoned by caller");
            return;
        }

        if !self.shared.is_leader() {
            self.resign_until = Some(now + cooldown);
            let _ = reply.send(Ok(()));
            return;
        }

        info!(cooldown = ?cooldown, "try to resign leadership");
        let bound = deadline
            .saturating_duration_since(now)
            .min(self.shared.config.release_timeout);
        let released = tokio::select! {
            biased;
            result = self.release(Release::Leadership, bound) => result,
            _ = reply.closed() => {
                info!("resign request abandoned during release");
                return;
            }
        };
        match released {
            Ok(()) => {
                self.resign_until = Some(Instant::now() + cooldown);
                metrics::record_resignation("ok");
                self.parts.callbacks.cancel("leader resigned").await;
                self.record_leadership();
                let _ = reply.send(Ok(()));
            }
            Err(err) => {
                warn!(error = %err, "failed to resign leadership");
                metrics::record_resignation("error");
                let _ = reply.send(Err(err));
            }
        }
    }

    /// The callback returned while we did not ask it to.  Leadership must not
    /// be held without the work running, so step down; the next renewal
    /// re-evaluates from fresh storage state.
    async fn handle_callback_exit(&mut self, exit: CallbackExit) {
        match exit {
            CallbackExit::Cancelled => return,
            CallbackExit::Returned(Ok(())) => {
                warn!("leader callback is unexpectedly exited");
            }
            CallbackExit::Returned(Err(err)) => {
                warn!(error = %err, "leader callback is unexpectedly exited");
            }
            CallbackExit::Panicked(panic) => {
                warn!(error = %panic, "leader callback panicked");
            }
        }

        if self.shared.is_leader() {
            info!("try to resign leadership");
            let timeout = self.shared.config.release_timeout;
            if let Err(err) = self.release(Release::Leadership, timeout).await {
                warn!(error = %err, "failed to resign leadership");
            }
            metrics::record_resignation("callback_exit");
        }
    }

    /// Stop the callback, release according to the shutdown mode, and
    /// report cancellation.
    async fn shutdown(&mut self) -> Result<()> {
        self.parts
            .callbacks
            .cancel("elector is shutting down")
            .await;

        let what = match self.shared.config.shutdown_mode {
            ShutdownMode::RemoveMember => Release::Membership,
            ShutdownMode::ReleaseLeadership => Release::Leadership,
        };
        let timeout = self.shared.config.release_timeout;
        if let Err(err) = self.release(what, timeout).await {
            warn!(error = %err, "failed to release member lease");
        }
        self.record_leadership();
        Err(ElectionError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::callback::leader_callback;
    use crate::cluster::Elector;
    use crate::config::ElectorConfig;
    use crate::record::{Member, Record};
    use crate::storage::backend::RecordStorage;
    use crate::storage::backend::StorageFuture;
    use crate::storage::memory::MemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    const LEASE: Duration = Duration::from_secs(3);
    const INTERVAL: Duration = Duration::from_secs(1);

    fn elector(id: &str, storage: Arc<dyn RecordStorage>) -> Elector {
        let config = ElectorConfig::new(id)
            .with_lease_duration(LEASE)
            .with_renew_interval(INTERVAL);
        let callback = leader_callback(|token: CancellationToken| async move {
            token.cancelled().await;
            anyhow::Ok(())
        });
        Elector::with_seed(config, storage, callback, 42).unwrap()
    }

    fn member(id: &str) -> Member {
        Member {
            id: id.to_string(),
            name: id.to_string(),
            address: String::new(),
            lease_duration: LEASE,
            renew_time: chrono::Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_renewal_claims_empty_record() {
        let storage = MemoryStorage::new();
        let e = elector("a", Arc::new(storage.handle()));
        let mut control = e.control_loop();

        control.try_renew().await.unwrap();

        let record = storage.snapshot();
        assert_eq!(record.leader_id, "a");
        assert_eq!(record.members.len(), 1);
        assert!(e.is_leader());
    }

    #[tokio::test(start_paused = true)]
    async fn test_takeover_after_leader_lease_expires() {
        let storage = MemoryStorage::new();
        storage.put_record(Record {
            leader_id: "a".into(),
            members: vec![member("a")],
        });
        let b = elector("b", Arc::new(storage.handle()));
        let mut control = b.control_loop();

        // First sighting of "a" starts its clock; it is still alive.
        control.try_renew().await.unwrap();
        assert_eq!(storage.snapshot().leader_id, "a");
        assert!(!b.is_leader());
        assert_eq!(b.leader().unwrap().id, "a");

        // "a" never renews again.
        tokio::time::advance(LEASE + Duration::from_millis(1)).await;
        control.try_renew().await.unwrap();

        let record = storage.snapshot();
        assert_eq!(record.leader_id, "b");
        assert_eq!(record.members.len(), 1);
        assert_eq!(record.members[0].id, "b");
        assert!(b.is_leader());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dangling_leader_is_cleared() {
        let storage = MemoryStorage::new();
        storage.put_record(Record {
            leader_id: "gone".into(),
            members: vec![],
        });
        let b = elector("b", Arc::new(storage.handle()));
        let mut control = b.control_loop();

        control.try_renew().await.unwrap();
        assert_eq!(storage.snapshot().leader_id, "b");
        assert_eq!(b.leader().unwrap().id, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_refreshes_own_entry_only() {
        let storage = MemoryStorage::new();
        let a = elector("a", Arc::new(storage.handle()));
        let mut control = a.control_loop();
        control.try_renew().await.unwrap();
        let first = storage.snapshot().find_member("a").unwrap().renew_time;

        control.try_renew().await.unwrap();
        let record = storage.snapshot();
        assert_eq!(record.members.len(), 1);
        assert!(record.find_member("a").unwrap().renew_time > first);
        assert_eq!(storage.write_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resign_cooldown_blocks_reclaim() {
        let storage = MemoryStorage::new();
        let a = elector("a", Arc::new(storage.handle()));
        let mut control = a.control_loop();
        control.try_renew().await.unwrap();
        assert!(a.is_leader());

        control.resign_until = Some(Instant::now() + Duration::from_secs(5));
        control.try_renew().await.unwrap();
        assert_eq!(storage.snapshot().leader_id, "");
        assert!(!a.is_leader());

        tokio::time::advance(Duration::from_secs(4)).await;
        control.try_renew().await.unwrap();
        assert!(!a.is_leader());

        tokio::time::advance(Duration::from_secs(2)).await;
        control.try_renew().await.unwrap();
        assert!(a.is_leader());
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_retries_transient_failures() {
        let storage = MemoryStorage::new();
        let a = elector("a", Arc::new(storage.handle()));
        let mut control = a.control_loop();
        storage.fail_next_gets(1);
        storage.fail_next_updates(1);

        control.renew(&CancellationToken::new()).await.unwrap();
        assert_eq!(storage.snapshot().leader_id, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_gives_up_at_deadline() {
        let storage = MemoryStorage::new();
        let a = elector("a", Arc::new(storage.handle()));
        let mut control = a.control_loop();
        storage.fail_next_gets(usize::MAX);

        let start = Instant::now();
        let err = control.renew(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ElectionError::RenewDeadlineExceeded(_)));
        assert!(start.elapsed() <= a.config().renew_deadline + Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_stops_on_shutdown() {
        let storage = MemoryStorage::new();
        let a = elector("a", Arc::new(storage.handle()));
        let mut control = a.control_loop();
        storage.fail_next_gets(usize::MAX);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let err = control.renew(&shutdown).await.unwrap_err();
        assert!(matches!(err, ElectionError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loser_of_race_does_not_overwrite() {
        let storage = MemoryStorage::new();
        let b_handle = Arc::new(storage.handle());
        let a = elector("a", Arc::new(storage.handle()));
        let b = elector("b", b_handle.clone());
        let mut a_loop = a.control_loop();
        let mut b_loop = b.control_loop();

        // Both observe the empty record, then "a" writes first.
        let seen_by_b = b_handle.get().await.unwrap();
        a_loop.try_renew().await.unwrap();

        let mut claim = seen_by_b;
        claim.leader_id = "b".into();
        assert!(b_handle.update(&claim).await.unwrap_err().is_conflict());

        b_loop.try_renew().await.unwrap();
        let record = storage.snapshot();
        assert_eq!(record.leader_id, "a");
        assert_eq!(record.members.len(), 2);
        assert!(!b.is_leader());
        assert_eq!(b.leader().unwrap().id, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_membership() {
        let storage = MemoryStorage::new();
        let a = elector("a", Arc::new(storage.handle()));
        let b = elector("b", Arc::new(storage.handle()));
        let mut a_loop = a.control_loop();
        let mut b_loop = b.control_loop();
        a_loop.try_renew().await.unwrap();
        b_loop.try_renew().await.unwrap();

        a_loop
            .release(Release::Leadership, Duration::from_secs(1))
            .await
            .unwrap();
        let record = storage.snapshot();
        assert_eq!(record.leader_id, "");
        assert_eq!(record.members.len(), 2);

        a_loop
            .release(Release::Membership, Duration::from_secs(1))
            .await
            .unwrap();
        let record = storage.snapshot();
        assert!(record.find_member("a").is_none());
        assert!(record.find_member("b").is_some());
    }

    struct Handoff {
        request: ResignRequest,
        taken: oneshot::Receiver<()>,
        response: oneshot::Receiver<Result<()>>,
    }

    fn resign_request(cooldown: Duration) -> Handoff {
        let (accepted, taken) = oneshot::channel();
        let (reply, response) = oneshot::channel();
        Handoff {
            request: ResignRequest {
                cooldown,
                deadline: Instant::now() + Duration::from_secs(5),
                accepted,
                reply,
            },
            taken,
            response,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_follower_resign_sets_cooldown_without_write() {
        let storage = MemoryStorage::new();
        let a = elector("a", Arc::new(storage.handle()));
        let b = elector("b", Arc::new(storage.handle()));
        let mut a_loop = a.control_loop();
        let mut b_loop = b.control_loop();
        a_loop.try_renew().await.unwrap();
        b_loop.try_renew().await.unwrap();
        let writes = storage.write_count();

        let Handoff {
            request,
            mut taken,
            mut response,
        } = resign_request(Duration::from_secs(5));
        b_loop.handle_resign(request).await;
        assert!(taken.try_recv().is_ok());
        assert!(response.try_recv().unwrap().is_ok());
        assert_eq!(storage.write_count(), writes);
        assert!(b_loop.resign_until.is_some());

        // The leader leaves; "b" stays out until the cooldown ends.
        a_loop
            .release(Release::Membership, Duration::from_secs(1))
            .await
            .unwrap();
        b_loop.try_renew().await.unwrap();
        assert_eq!(storage.snapshot().leader_id, "");

        tokio::time::advance(Duration::from_secs(6)).await;
        b_loop.try_renew().await.unwrap();
        assert_eq!(storage.snapshot().leader_id, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_release_keeps_leadership() {
        let storage = MemoryStorage::new();
        let a = elector("a", Arc::new(storage.handle()));
        let mut control = a.control_loop();
        control.try_renew().await.unwrap();
        control.parts.callbacks.ensure_running(&CancellationToken::new());

        storage.fail_next_updates(1);
        let Handoff {
            request,
            taken: _taken,
            mut response,
        } = resign_request(Duration::from_secs(5));
        control.handle_resign(request).await;

        let err = response.try_recv().unwrap().unwrap_err();
        assert!(matches!(
            err,
            ElectionError::Storage(StorageError::Unavailable(_))
        ));
        assert!(control.resign_until.is_none());
        assert!(control.parts.callbacks.is_running());
        assert!(a.is_leader());
        assert_eq!(storage.snapshot().leader_id, "a");

        control.parts.callbacks.cancel("test").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_resign_has_no_effect() {
        let storage = MemoryStorage::new();
        let a = elector("a", Arc::new(storage.handle()));
        let mut control = a.control_loop();
        control.try_renew().await.unwrap();
        let writes = storage.write_count();

        let Handoff { request, .. } = resign_request(Duration::from_secs(30));
        control.handle_resign(request).await;

        assert_eq!(storage.write_count(), writes);
        assert!(control.resign_until.is_none());
        assert!(a.is_leader());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resign_past_deadline_is_refused() {
        let storage = MemoryStorage::new();
        let a = elector("a", Arc::new(storage.handle()));
        let mut control = a.control_loop();
        control.try_renew().await.unwrap();

        let Handoff {
            mut request,
            mut taken,
            mut response,
        } = resign_request(Duration::from_secs(5));
        request.deadline = Instant::now();
        control.handle_resign(request).await;

        assert!(taken.try_recv().is_err());
        assert!(matches!(
            response.try_recv().unwrap(),
            Err(ElectionError::ResignTimeout)
        ));
        assert!(control.resign_until.is_none());
        assert!(a.is_leader());
    }

    /// Always returns an undecodable record.
    struct CorruptStorage {
        gets: Arc<AtomicUsize>,
    }

    impl RecordStorage for CorruptStorage {
        fn get(&self) -> StorageFuture<'_, Record> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                let err = serde_json::from_str::<Record>("{").unwrap_err();
                Err(StorageError::from(err))
            })
        }

        fn update(&self, _record: &Record) -> StorageFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_does_not_retry_corrupt_record() {
        let gets = Arc::new(AtomicUsize::new(0));
        let a = elector(
            "a",
            Arc::new(CorruptStorage {
                gets: Arc::clone(&gets),
            }),
        );
        let mut control = a.control_loop();

        let start = Instant::now();
        let err = control.renew(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            ElectionError::Storage(StorageError::Serialization(_))
        ));
        assert_eq!(gets.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    /// Cancels `shutdown` once a write has landed.
    struct CancelAfterWrite {
        inner: MemoryStorage,
        shutdown: CancellationToken,
    }

    impl RecordStorage for CancelAfterWrite {
        fn get(&self) -> StorageFuture<'_, Record> {
            self.inner.get()
        }

        fn update(&self, record: &Record) -> StorageFuture<'_, ()> {
            let write = self.inner.update(record);
            Box::pin(async move {
                write.await?;
                self.shutdown.cancel();
                Ok(())
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_claim_starts_no_callback() {
        let storage = MemoryStorage::new();
        let shutdown = CancellationToken::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let callback = leader_callback({
            let starts = Arc::clone(&starts);
            move |token: CancellationToken| {
                starts.fetch_add(1, Ordering::SeqCst);
                async move {
                    token.cancelled().await;
                    anyhow::Ok(())
                }
            }
        });
        let config = ElectorConfig::new("a")
            .with_lease_duration(LEASE)
            .with_renew_interval(INTERVAL);
        let wrapped = CancelAfterWrite {
            inner: storage.handle(),
            shutdown: shutdown.clone(),
        };
        let a = Elector::with_seed(config, Arc::new(wrapped), callback, 1).unwrap();
        let mut control = a.control_loop();

        let result = control.run(&shutdown).await;
        assert!(matches!(result, Err(ElectionError::Cancelled)));
        assert_eq!(starts.load(Ordering::SeqCst), 0);
        assert!(!control.parts.callbacks.is_running());
        assert!(storage.snapshot().find_member("a").is_none());
    }

    #[test]
    fn test_retry_delay_is_below_interval() {
        let storage = MemoryStorage::new();
        let a = elector("a", Arc::new(storage.handle()));
        let mut control = a.control_loop();
        for _ in 0..100 {
            assert!(control.retry_delay(INTERVAL) < INTERVAL);
        }
    }

    #[test]
    fn test_retry_delay_is_deterministic_per_seed() {
        let storage = MemoryStorage::new();
        let mut first = elector("a", Arc::new(storage.handle())).control_loop();
        let mut second = elector("a", Arc::new(storage.handle())).control_loop();
        for _ in 0..10 {
            assert_eq!(first.retry_delay(INTERVAL), second.retry_delay(INTERVAL));
        }
    }
}
