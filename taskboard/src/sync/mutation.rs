//! Optimistic mutation bookkeeping.
//!
//! A [`Mutation`] applies its speculative change to the cache and later either
//! confirms or rolls back. Creates and deletes keep the pre-image of the entry
//! they touch. Updates queue their patch in the cache, which redraws the task
//! from its confirmed image when one is rejected. Both outcomes are no-ops for
//! updates and deletes when a store snapshot has been applied in the meantime:
//! the snapshot is authoritative.

use taskboard_proto::task::{Task, TaskId, TaskPatch};

use super::Operation;
use super::cache::{CacheEntry, TaskCache};

/// Lifecycle of one optimistic mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// Speculative change applied, store call in flight.
    Applying,
    /// The store accepted the change.
    Confirmed,
    /// The store rejected the change and the pre-image was restored.
    RolledBack,
}

#[derive(Debug)]
enum PreImage {
    Absent,
    Present { index: usize, entry: CacheEntry },
}

/// One in-flight optimistic change.
#[derive(Debug)]
pub(crate) struct Mutation {
    op: Operation,
    id: TaskId,
    pre_image: PreImage,
    patch: Option<u64>,
    epoch: u64,
    state: MutationState,
}

impl Mutation {
    /// Inserts a provisional task for a create.
    pub(crate) fn begin_create(cache: &mut TaskCache, task: Task) -> Self {
        let id = task.id.clone();
        cache.insert_provisional(task);
        Self::applying(Operation::Create, id, PreImage::Absent, cache)
    }

    /// Applies `patch` to the cached copy, if there is one.
    pub(crate) fn begin_update(cache: &mut TaskCache, id: &TaskId, patch: &TaskPatch) -> Self {
        let seq = cache.push_patch(id, patch);
        let mut m = Self::applying(Operation::Update, id.clone(), PreImage::Absent, cache);
        m.patch = seq;
        m
    }

    /// Removes the cached copy ahead of a delete.
    pub(crate) fn begin_delete(cache: &mut TaskCache, id: &TaskId) -> Self {
        let pre_image = cache
            .remove(id)
            .map_or(PreImage::Absent, |(index, entry)| PreImage::Present {
                index,
                entry,
            });
        Self::applying(Operation::Delete, id.clone(), pre_image, cache)
    }

    fn applying(op: Operation, id: TaskId, pre_image: PreImage, cache: &TaskCache) -> Self {
        tracing::debug!(task_id = %id, op = %op, "optimistic change applied");
        Self {
            op,
            id,
            pre_image,
            patch: None,
            epoch: cache.epoch(),
            state: MutationState::Applying,
        }
    }

    /// Current state.
    pub(crate) const fn state(&self) -> MutationState {
        self.state
    }

    /// The cached task as it was before the change.
    pub(crate) const fn original(&self) -> Option<&Task> {
        match &self.pre_image {
            PreImage::Present { entry, .. } => Some(&entry.task),
            PreImage::Absent => None,
        }
    }

    fn superseded(&self, cache: &TaskCache) -> bool {
        cache.epoch() != self.epoch
    }

    /// Records store acceptance. Returns whether the cache changed.
    pub(crate) fn confirm(&mut self, cache: &mut TaskCache) -> bool {
        self.state = MutationState::Confirmed;
        tracing::debug!(task_id = %self.id, op = %self.op, state = ?self.state(), "optimistic change settled");
        match self.op {
            // The confirmed document arrives with the next snapshot.
            Operation::Create => cache.remove(&self.id).is_some(),
            Operation::Update if !self.superseded(cache) => self
                .patch
                .is_some_and(|seq| cache.settle_patch(&self.id, seq, true)),
            Operation::Update | Operation::Delete => false,
        }
    }

    /// Undoes the change after a store rejection. Returns whether the cache
    /// changed.
    pub(crate) fn roll_back(&mut self, cache: &mut TaskCache) -> bool {
        self.state = MutationState::RolledBack;
        if self.op == Operation::Create {
            tracing::debug!(task_id = %self.id, "provisional task withdrawn");
            return cache.remove(&self.id).is_some();
        }
        if self.superseded(cache) {
            tracing::debug!(task_id = %self.id, op = %self.op, "rollback skipped, snapshot already applied");
            return false;
        }
        tracing::debug!(task_id = %self.id, op = %self.op, state = ?self.state(), "optimistic change rolled back");
        if self.op == Operation::Update {
            return self
                .patch
                .is_some_and(|seq| cache.settle_patch(&self.id, seq, false));
        }
        let PreImage::Present { index, entry } = &self.pre_image else {
            return false;
        };
        match cache.remove(&self.id) {
            Some((current, _)) => cache.restore(current, entry.clone()),
            None => cache.restore(*index, entry.clone()),
        }
        true
    }
}
