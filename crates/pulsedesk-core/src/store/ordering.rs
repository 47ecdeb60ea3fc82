//! Per-slot request sequencing.
//!
//! Every fetch takes a `Ticket` for the cache slot it will write. Under
//! `ResponseOrdering::LastCompleted` every ticket may write; under
//! `ResponseOrdering::LatestIssued` only the most recently issued ticket for
//! a slot may, so a slow older response cannot overwrite a newer one.
//!
//! Independently of the policy, `reset` starts a new generation: tickets
//! issued before it may no longer write anything.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::config::ResponseOrdering;
use crate::models::PatientId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Collection,
    Selected,
    Status(PatientId),
    Heartbeats(PatientId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub slot: Slot,
    /// Always 0 under `LastCompleted`, which keeps no per-slot counters
    pub seq: u64,
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct Sequencer {
    policy: ResponseOrdering,
    issued: Mutex<HashMap<Slot, u64>>,
    generation: AtomicU64,
}

impl Sequencer {
    pub fn new(policy: ResponseOrdering) -> Self {
        Self {
            policy,
            issued: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> ResponseOrdering {
        self.policy
    }

    fn issued(&self) -> std::sync::MutexGuard<'_, HashMap<Slot, u64>> {
        self.issued.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn issue(&self, slot: Slot) -> Ticket {
        let generation = self.generation.load(Ordering::Acquire);
        let seq = match self.policy {
            ResponseOrdering::LastCompleted => 0,
            ResponseOrdering::LatestIssued => {
                let mut issued = self.issued();
                let seq = issued.entry(slot.clone()).or_insert(0);
                *seq += 1;
                *seq
            }
        };
        Ticket { slot, seq, generation }
    }

    /// Whether a response carrying `ticket` may write its slot
    pub fn may_write(&self, ticket: &Ticket) -> bool {
        if ticket.generation != self.generation.load(Ordering::Acquire) {
            return false;
        }
        match self.policy {
            ResponseOrdering::LastCompleted => true,
            ResponseOrdering::LatestIssued => self.issued().get(&ticket.slot) == Some(&ticket.seq),
        }
    }

    /// Invalidate every outstanding ticket and forget the per-slot counters
    pub fn reset(&self) {
        let mut issued = self.issued();
        issued.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    #[cfg(test)]
    fn tracked_slots(&self) -> usize {
        self.issued().len()
    }
}
