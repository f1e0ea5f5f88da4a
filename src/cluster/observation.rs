//! Local view of the election record and the liveness clock.
//!
//! Liveness is judged from *when this process saw* a member's renew time
//! change, never from the renew time itself: clocks on different machines
//! are not assumed to agree.  [`Observation::observe`] is the only place the
//! liveness clock advances, so it must see every fetched and every written
//! record.

use std::collections::HashMap;
use tokio::time::Instant;

use crate::record::{Member, Record};

#[derive(Debug, Default)]
pub(crate) struct Observation {
    record: Record,
    /// Member ID -> local instant at which its renew time last changed.
    renews: HashMap<String, Instant>,
}

impl Observation {
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Fold a freshly fetched or written record into the local view.
    ///
    /// Returns the new leader when the leader pointer moved to a member
    /// present in `record`.
    pub fn observe(&mut self, record: &Record, now: Instant) -> Option<Member> {
        self.renews.retain(|id, _| record.find_member(id).is_some());

        for member in &record.members {
            let changed = match self.record.find_member(&member.id) {
                Some(old) => old.renew_time != member.renew_time,
                None => true,
            };
            if changed || !self.renews.contains_key(&member.id) {
                self.renews.insert(member.id.clone(), now);
            }
        }

        let new_leader = if record.has_leader() && record.leader_id != self.record.leader_id {
            record.leader().cloned()
        } else {
            None
        };

        self.record = record.clone();
        new_leader
    }

    /// A member is expired once `now` is past its last observed renewal
    /// plus its lease.  Members we have never observed are expired.
    pub fn is_lease_expired(&self, id: &str, now: Instant) -> bool {
        let Some(member) = self.record.find_member(id) else {
            return true;
        };
        match self.renews.get(id) {
            Some(renewed) => now > *renewed + member.lease_duration,
            None => true,
        }
    }

    /// Whether `id` is the recorded leader and its lease is still valid.
    pub fn is_leader(&self, id: &str, now: Instant) -> bool {
        self.record.leader_id == id && !self.is_lease_expired(id, now)
    }

    /// The recorded leader, if its lease is still valid.
    pub fn leader(&self, now: Instant) -> Option<&Member> {
        self.record
            .leader()
            .filter(|leader| !self.is_lease_expired(&leader.id, now))
    }
}
