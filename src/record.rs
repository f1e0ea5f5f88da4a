//! Shared election state: the [`Record`] and its [`Member`]s.
//!
//! The whole record is stored as one versioned unit.  Cloning is a plain
//! deep copy; nothing inside a record is shared between clones.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::serialization::duration_ms;

/// One participant in the election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Cluster-wide unique identifier.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Contact address, informational only.
    #[serde(default)]
    pub address: String,
    /// How long a renewal stays valid without a refresh.
    #[serde(rename = "lease_duration_ms", with = "duration_ms")]
    pub lease_duration: Duration,
    /// Writer-side timestamp of the last renewal.
    ///
    /// Only compared for equality by observers; never used as a clock.
    pub renew_time: DateTime<Utc>,
}

impl Member {
    /// Timestamp for the next renewal of a member last renewed at `prev`.
    ///
    /// Always strictly after `prev`, so observers see every renewal as a
    /// change even when the local wall clock is coarse or stepped back.
    pub fn next_renew_time(prev: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = Utc::now();
        match prev {
            Some(prev) if now <= prev => prev + ChronoDuration::milliseconds(1),
            _ => now,
        }
    }

    /// Mark this member as renewed now.
    pub fn renew(&mut self) {
        self.renew_time = Self::next_renew_time(Some(self.renew_time));
    }
}

/// The single coordination document persisted in storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// ID of the current leader, empty when there is none.
    #[serde(default)]
    pub leader_id: String,
    /// Live members, keyed by `id`, in no particular order.
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Record {
    pub fn find_member(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn find_member_mut(&mut self, id: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    /// Remove the member with `id`, returning it if present.
    pub fn remove_member(&mut self, id: &str) -> Option<Member> {
        let pos = self.members.iter().position(|m| m.id == id)?;
        Some(self.members.swap_remove(pos))
    }

    pub fn has_leader(&self) -> bool {
        !self.leader_id.is_empty()
    }

    /// The member currently recorded as leader, if it is still a member.
    pub fn leader(&self) -> Option<&Member> {
        if !self.has_leader() {
            return None;
        }
        self.find_member(&self.leader_id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
