//! The elector handle: construction, query surface and resignation.
//!
//! An [`Elector`] is a cheap `Clone` handle.  One task drives
//! [`Elector::run`]; any number of others may query leadership or request
//! a resignation concurrently.  Queries only read the locally observed
//! record and never touch storage.

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::callback::LeaderCallback;
use super::observation::Observation;
use super::renewal::{ControlLoop, LoopParts};
use crate::config::ElectorConfig;
use crate::errors::{ElectionError, Result};
use crate::record::{Member, Record};
use crate::storage::backend::RecordStorage;

/// A request to step down, serviced inside the control loop.
pub(crate) struct ResignRequest {
    pub cooldown: Duration,
    /// The loop must not take the request after this instant.
    pub deadline: Instant,
    /// Signalled when the loop takes the request; from then on the caller
    /// waits for `reply` whatever the deadline.
    pub accepted: oneshot::Sender<()>,
    pub reply: oneshot::Sender<Result<()>>,
}

/// State shared between the handle, the control loop and queries.
pub(crate) struct Shared {
    pub config: ElectorConfig,
    pub storage: Arc<dyn RecordStorage>,
    observation: RwLock<Observation>,
    resign_tx: mpsc::Sender<ResignRequest>,
    /// Loop-owned state, parked here while no `run` is active.
    parts: Mutex<Option<LoopParts>>,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, Observation> {
        self.observation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Observation> {
        self.observation
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Fold `record` into the local view, logging a newly elected leader.
    pub fn observe(&self, record: &Record) {
        let new_leader = self.write().observe(record, Instant::now());
        if let Some(leader) = new_leader {
            info!(
                leader_id = %leader.id,
                leader_name = %leader.name,
                leader_address = %leader.address,
                "new leader elected"
            );
        }
    }

    /// Split `members` into (expired, active) by the local liveness clock.
    pub fn partition_expired(&self, members: Vec<Member>) -> (Vec<Member>, Vec<Member>) {
        let observation = self.read();
        let now = Instant::now();
        members
            .into_iter()
            .partition(|m| observation.is_lease_expired(&m.id, now))
    }

    pub fn is_leader(&self) -> bool {
        self.read().is_leader(&self.config.id, Instant::now())
    }

    pub fn leader(&self) -> Option<Member> {
        self.read().leader(Instant::now()).cloned()
    }

    pub fn members(&self) -> Vec<Member> {
        self.read().record().members.clone()
    }

    /// Our own member entry, freshly renewed.
    pub fn self_member(&self) -> Member {
        Member {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            address: self.config.address.clone(),
            lease_duration: self.config.lease_duration,
            renew_time: Member::next_renew_time(None),
        }
    }

    fn take_parts(&self) -> Option<LoopParts> {
        self.parts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn restore_parts(&self, parts: LoopParts) {
        *self.parts.lock().unwrap_or_else(PoisonError::into_inner) = Some(parts);
    }

    fn is_running(&self) -> bool {
        self.parts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Parks the loop state back on the handle when `run` ends, including when
/// its future is dropped mid-flight.
struct ParkOnDrop {
    shared: Arc<Shared>,
    control: Option<ControlLoop>,
}

impl Drop for ParkOnDrop {
    fn drop(&mut self) {
        if let Some(control) = self.control.take() {
            let mut parts = control.into_parts();
            parts.abandon_callback();
            self.shared.restore_parts(parts);
        }
    }
}

/// Lease-based leader election client.
#[derive(Clone)]
pub struct Elector {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Elector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Elector")
            .field("id", &self.shared.config.id)
            .finish_non_exhaustive()
    }
}

impl Elector {
    /// Validate `config` and build an elector with an entropy-seeded
    /// random source.
    pub fn new(
        config: ElectorConfig,
        storage: Arc<dyn RecordStorage>,
        callback: LeaderCallback,
    ) -> Result<Self> {
        Self::build(config, storage, callback, StdRng::from_entropy())
    }

    /// Like [`Elector::new`] but with a fixed seed for retry jitter.
    pub fn with_seed(
        config: ElectorConfig,
        storage: Arc<dyn RecordStorage>,
        callback: LeaderCallback,
        seed: u64,
    ) -> Result<Self> {
        Self::build(config, storage, callback, StdRng::seed_from_u64(seed))
    }

    fn build(
        mut config: ElectorConfig,
        storage: Arc<dyn RecordStorage>,
        callback: LeaderCallback,
        rng: StdRng,
    ) -> Result<Self> {
        config.adjust_and_validate()?;
        let (resign_tx, resign_rx) = mpsc::channel(1);
        let parts = LoopParts::new(callback, resign_rx, rng);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                storage,
                observation: RwLock::new(Observation::default()),
                resign_tx,
                parts: Mutex::new(Some(parts)),
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.shared.config.id
    }

    /// The validated configuration in effect.
    pub fn config(&self) -> &ElectorConfig {
        &self.shared.config
    }

    /// Campaign for leadership until `shutdown` is cancelled.
    ///
    /// Returns [`ElectionError::Cancelled`] after a best-effort release, or
    /// [`ElectionError::AlreadyRunning`] if another `run` is active.  May be
    /// called again after it returns.
    ///
    /// Dropping the future instead of cancelling `shutdown` stops the leader
    /// callback without a release write; the lease then lapses on its own.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let parts = self
            .shared
            .take_parts()
            .ok_or(ElectionError::AlreadyRunning)?;
        let mut parked = ParkOnDrop {
            shared: Arc::clone(&self.shared),
            control: None,
        };
        let control = parked
            .control
            .insert(ControlLoop::new(Arc::clone(&self.shared), parts));
        control.run(&shutdown).await
    }

    /// A control loop detached from `run`, for driving single turns in tests.
    #[cfg(test)]
    pub(crate) fn control_loop(&self) -> ControlLoop {
        let parts = self.shared.take_parts().expect("elector is running");
        ControlLoop::new(Arc::clone(&self.shared), parts)
    }

    /// Whether this process is the recorded leader with a valid lease.
    pub fn is_leader(&self) -> bool {
        self.shared.is_leader()
    }

    /// The last observed leader whose lease is still valid.
    pub fn leader(&self) -> Option<Member> {
        self.shared.leader()
    }

    /// All members in the last observed record.
    pub fn members(&self) -> Vec<Member> {
        self.shared.members()
    }

    /// Step down (if leading) and refuse leadership for `cooldown`.
    ///
    /// Waits at most the configured resign timeout for the control loop to
    /// take the request.  See [`Elector::resign_leader_until`].
    pub async fn resign_leader(&self, cooldown: Duration) -> Result<()> {
        let deadline = Instant::now() + self.shared.config.resign_timeout;
        self.resign_leader_until(cooldown, deadline).await
    }

    /// Like [`Elector::resign_leader`] with a caller-chosen deadline, capped
    /// by the resign timeout.
    ///
    /// If the deadline passes before the control loop takes the request, or
    /// the returned future is dropped, the request has no effect.  Once the
    /// loop has taken it, this waits for the outcome; the release write is
    /// itself bounded by the deadline.  `Ok` means leadership was released
    /// and the leader callback has stopped.
    pub async fn resign_leader_until(&self, cooldown: Duration, deadline: Instant) -> Result<()> {
        if !self.shared.is_running() {
            return Err(ElectionError::NotRunning);
        }
        let deadline = deadline.min(Instant::now() + self.shared.config.resign_timeout);
        let (accepted, mut taken) = oneshot::channel();
        let (reply, response) = oneshot::channel();
        let request = ResignRequest {
            cooldown,
            deadline,
            accepted,
            reply,
        };

        let handoff = async {
            self.shared
                .resign_tx
                .send(request)
                .await
                .map_err(|_| ElectionError::NotRunning)?;
            Ok::<_, ElectionError>((&mut taken).await.is_ok())
        };
        match tokio::time::timeout_at(deadline, handoff).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                // Closing first settles a race with the loop taking it now.
                taken.close();
                if taken.try_recv().is_err() {
                    return Err(ElectionError::ResignTimeout);
                }
            }
        }
        response.await.unwrap_or(Err(ElectionError::NotRunning))
    }
}
