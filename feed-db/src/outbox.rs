use log::{trace, warn};
use std::{collections::BTreeMap, fmt};

use crate::{remote::Mutation, Error};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// `Pending → Confirmed | Failed`, and `Failed → Pending` on retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Confirmed,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingMutation {
    pub id: MutationId,
    pub mutation: Mutation,
    pub state: MutationState,
    pub attempts: u32,
}

/// Ledger of optimistic mutations awaiting, or having received, a verdict
/// from the remote.
#[derive(Clone, Debug, Default)]
pub struct Outbox {
    next_id: u64,
    entries: BTreeMap<MutationId, PendingMutation>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, mutation: Mutation) -> MutationId {
        self.next_id += 1;
        let id = MutationId(self.next_id);
        trace!("{} pending: {} on {}", id, mutation.name(), mutation.item_id());
        self.entries.insert(
            id,
            PendingMutation {
                id,
                mutation,
                state: MutationState::Pending,
                attempts: 1,
            },
        );
        id
    }

    pub fn confirm(&mut self, id: MutationId) -> bool {
        self.transition(id, MutationState::Confirmed)
    }

    pub fn fail(&mut self, id: MutationId, reason: impl Into<String>) -> bool {
        self.transition(id, MutationState::Failed(reason.into()))
    }

    /// Move a failed mutation back to pending and hand back its payload.
    pub fn retry(&mut self, id: MutationId) -> Result<&Mutation, Error> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("Mutation", id))?;
        match entry.state {
            MutationState::Failed(_) => {
                entry.state = MutationState::Pending;
                entry.attempts += 1;
                Ok(&entry.mutation)
            }
            MutationState::Pending | MutationState::Confirmed => Err(Error::InvalidArgument(
                format!("{} is not in a failed state", id),
            )),
        }
    }

    pub fn get(&self, id: MutationId) -> Option<&PendingMutation> {
        self.entries.get(&id)
    }

    pub fn state(&self, id: MutationId) -> Option<&MutationState> {
        self.entries.get(&id).map(|entry| &entry.state)
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingMutation> {
        self.entries
            .values()
            .filter(|entry| entry.state == MutationState::Pending)
    }

    pub fn failed(&self) -> impl Iterator<Item = &PendingMutation> {
        self.entries
            .values()
            .filter(|entry| matches!(entry.state, MutationState::Failed(_)))
    }

    /// Forget confirmed entries. Returns how many were dropped.
    pub fn prune_confirmed(&mut self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.state != MutationState::Confirmed);
        before - self.entries.len()
    }

    fn transition(&mut self, id: MutationId, next: MutationState) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.state == MutationState::Pending => {
                trace!("{} -> {:?}", id, next);
                entry.state = next;
                true
            }
            Some(entry) => {
                warn!("ignoring {:?} for {} in state {:?}", next, id, entry.state);
                false
            }
            None => {
                warn!("ignoring {:?} for unknown {}", next, id);
                false
            }
        }
    }
}
