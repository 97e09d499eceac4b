//! The sync core's derived task cache.
//!
//! The cache is never authoritative. Every store snapshot replaces it
//! wholesale and bumps its epoch; optimistic mutations edit it in between and
//! use the epoch to tell whether a snapshot has overtaken them.
//!
//! Updates to a task are queued over its last confirmed image. A rejected
//! update is dropped from the queue and the task is redrawn from that image
//! plus the updates still standing, so overlapping updates never restore
//! each other's unconfirmed changes.

use std::collections::HashMap;
use std::time::Duration;

use taskboard_proto::codec::CachedTaskList;
use taskboard_proto::query::TaskQuery;
use taskboard_proto::task::{Task, TaskId, TaskPatch};

/// A cached task plus whether it reflects an unconfirmed local change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The task as currently displayed.
    pub task: Task,
    /// Set while an optimistic create or update is in flight.
    pub provisional: bool,
}

impl CacheEntry {
    fn confirmed(task: Task) -> Self {
        Self {
            task,
            provisional: false,
        }
    }
}

#[derive(Debug)]
struct QueuedPatch {
    seq: u64,
    patch: TaskPatch,
    accepted: bool,
}

/// Updates against one task that have not all settled yet.
#[derive(Debug)]
struct PatchQueue {
    base: Task,
    patches: Vec<QueuedPatch>,
}

impl PatchQueue {
    fn redraw(&self) -> Task {
        let mut task = self.base.clone();
        for queued in &self.patches {
            queued.patch.apply_to(&mut task);
        }
        task
    }
}

/// Ordered task list scoped to the query that filled it.
#[derive(Debug, Default)]
pub struct TaskCache {
    entries: Vec<CacheEntry>,
    scope: Option<TaskQuery>,
    refreshed_at: Option<u64>,
    epoch: u64,
    queues: HashMap<TaskId, PatchQueue>,
    next_patch: u64,
}

impl TaskCache {
    /// Replaces the whole cache with an authoritative snapshot.
    pub fn replace(&mut self, scope: TaskQuery, tasks: Vec<Task>, now_ms: u64) {
        self.entries = tasks.into_iter().map(CacheEntry::confirmed).collect();
        self.scope = Some(scope);
        self.refreshed_at = Some(now_ms);
        self.epoch += 1;
        self.queues.clear();
    }

    /// Loads a list persisted by an earlier session.
    pub fn seed(&mut self, list: CachedTaskList) {
        self.replace(list.scope, list.tasks, list.refreshed_at);
    }

    /// Exports the confirmed entries for persistence.
    #[must_use]
    pub fn export(&self) -> Option<CachedTaskList> {
        Some(CachedTaskList {
            scope: self.scope.clone()?,
            refreshed_at: self.refreshed_at?,
            tasks: self
                .entries
                .iter()
                .filter(|e| !e.provisional)
                .map(|e| e.task.clone())
                .collect(),
        })
    }

    /// Number of snapshots applied so far.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Query the cache was last filled from.
    #[must_use]
    pub const fn scope(&self) -> Option<&TaskQuery> {
        self.scope.as_ref()
    }

    /// Whether the cache holds results for `scope`, whatever their age.
    #[must_use]
    pub fn serves(&self, scope: &TaskQuery) -> bool {
        self.scope.as_ref() == Some(scope)
    }

    /// Whether the cache holds results for `scope` refreshed within `freshness`.
    #[must_use]
    pub fn is_fresh(&self, scope: &TaskQuery, now_ms: u64, freshness: Duration) -> bool {
        let max_age = u64::try_from(freshness.as_millis()).unwrap_or(u64::MAX);
        self.serves(scope)
            && self
                .refreshed_at
                .is_some_and(|at| now_ms.saturating_sub(at) <= max_age)
    }

    /// Tasks in display order.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.entries.iter().map(|e| e.task.clone()).collect()
    }

    /// Identifiers of entries awaiting confirmation.
    #[must_use]
    pub fn pending(&self) -> Vec<TaskId> {
        self.entries
            .iter()
            .filter(|e| e.provisional)
            .map(|e| e.task.id.clone())
            .collect()
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&CacheEntry> {
        self.entries.iter().find(|e| e.task.id == *id)
    }

    pub(crate) fn get_mut(&mut self, id: &TaskId) -> Option<&mut CacheEntry> {
        self.entries.iter_mut().find(|e| e.task.id == *id)
    }

    /// Applies `patch` to the displayed task and queues it until it settles.
    ///
    /// Returns the patch's sequence number, or `None` if the task is not
    /// cached.
    pub(crate) fn push_patch(&mut self, id: &TaskId, patch: &TaskPatch) -> Option<u64> {
        let entry = self.entries.iter_mut().find(|e| e.task.id == *id)?;
        self.next_patch += 1;
        let seq = self.next_patch;
        self.queues
            .entry(id.clone())
            .or_insert_with(|| PatchQueue {
                base: entry.task.clone(),
                patches: Vec::new(),
            })
            .patches
            .push(QueuedPatch {
                seq,
                patch: patch.clone(),
                accepted: false,
            });
        patch.apply_to(&mut entry.task);
        entry.provisional = true;
        Some(seq)
    }

    /// Settles queued patch `seq`, keeping it if `accepted` and dropping it
    /// otherwise, then redraws the task from its confirmed image and the
    /// patches still queued. The task stays provisional while any of them is
    /// unanswered. Returns whether the displayed entry changed.
    pub(crate) fn settle_patch(&mut self, id: &TaskId, seq: u64, accepted: bool) -> bool {
        let Some(queue) = self.queues.get_mut(id) else {
            return false;
        };
        if accepted {
            if let Some(queued) = queue.patches.iter_mut().find(|q| q.seq == seq) {
                queued.accepted = true;
            }
        } else {
            queue.patches.retain(|q| q.seq != seq);
        }
        let task = queue.redraw();
        let settled = queue.patches.iter().all(|q| q.accepted);
        if settled {
            self.queues.remove(id);
        }
        let Some(entry) = self.get_mut(id) else {
            return false;
        };
        let changed = entry.task != task || entry.provisional == settled;
        entry.task = task;
        entry.provisional = !settled;
        changed
    }

    /// Inserts a provisional task at the top of the list.
    pub fn insert_provisional(&mut self, task: Task) {
        self.entries.insert(
            0,
            CacheEntry {
                task,
                provisional: true,
            },
        );
    }

    /// Removes an entry, returning its position and contents.
    pub fn remove(&mut self, id: &TaskId) -> Option<(usize, CacheEntry)> {
        let pos = self.entries.iter().position(|e| e.task.id == *id)?;
        Some((pos, self.entries.remove(pos)))
    }

    /// Puts an entry back at `index`, or at the end if the list has shrunk.
    pub fn restore(&mut self, index: usize, entry: CacheEntry) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
