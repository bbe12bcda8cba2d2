//! Client-side list cache with a single rollback snapshot per list.
//!
//! Every list key holds the `committed` entries the UI renders, an optional
//! rollback snapshot taken by the first of any overlapping optimistic
//! mutations, and a fetch generation used to discard superseded fetches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::domain::todo::{Todo, TodoId};

/// Logical identity of a cached collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListKey(pub &'static str);

impl ListKey {
    /// The signed-in user's full todo list.
    pub const TODOS: ListKey = ListKey("todos/list");
}

/// Id of a cached entry: either assigned by the server or a placeholder for a
/// create that has not been confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryId {
    Saved(TodoId),
    Pending(u64),
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryId::Saved(id) => id.fmt(f),
            EntryId::Pending(n) => write!(f, "temp-{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTodo {
    pub id: EntryId,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CachedTodo {
    pub fn is_pending(&self) -> bool { matches!(self.id, EntryId::Pending(_)) }

    pub fn saved_id(&self) -> Option<TodoId> {
        match self.id {
            EntryId::Saved(id) => Some(id),
            EntryId::Pending(_) => None,
        }
    }
}

impl From<Todo> for CachedTodo {
    fn from(t: Todo) -> Self {
        Self {
            id: EntryId::Saved(t.id),
            title: t.title,
            description: t.description,
            completed: t.completed,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Debug, Default)]
struct ListState {
    committed: Vec<CachedTodo>,
    rollback: Option<Vec<CachedTodo>>,
    in_flight: usize,
    generation: u64,
    loaded: bool,
    stale: bool,
}

/// Shared by everything that renders or mutates a list; create one per
/// application session and hand it out behind an `Arc`.
#[derive(Debug, Default)]
pub struct QueryCache {
    lists: Mutex<HashMap<ListKey, ListState>>,
    next_pending: AtomicU64,
}

impl QueryCache {
    pub fn new() -> Self { Self::default() }

    fn lists(&self) -> MutexGuard<'_, HashMap<ListKey, ListState>> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current visible entries, in order.
    pub fn get(&self, key: ListKey) -> Vec<CachedTodo> {
        self.lists().get(&key).map(|s| s.committed.clone()).unwrap_or_default()
    }

    pub fn is_loaded(&self, key: ListKey) -> bool {
        self.lists().get(&key).is_some_and(|s| s.loaded)
    }

    pub fn is_stale(&self, key: ListKey) -> bool {
        self.lists().get(&key).is_some_and(|s| s.stale)
    }

    pub fn has_pending_rollback(&self, key: ListKey) -> bool {
        self.lists().get(&key).is_some_and(|s| s.rollback.is_some())
    }

    pub fn next_pending_id(&self) -> EntryId {
        EntryId::Pending(self.next_pending.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Starts a fetch, superseding any fetch already in flight for `key`.
    pub fn begin_fetch(&self, key: ListKey) -> u64 {
        let mut lists = self.lists();
        let state = lists.entry(key).or_default();
        state.generation += 1;
        state.generation
    }

    /// Stores a fetch result unless a later fetch or mutation has superseded it.
    pub fn complete_fetch(&self, key: ListKey, generation: u64, todos: Vec<CachedTodo>) -> bool {
        let mut lists = self.lists();
        let state = lists.entry(key).or_default();
        if state.generation != generation {
            tracing::debug!(list = key.0, generation, current = state.generation, "discarding superseded fetch");
            return false;
        }
        state.committed = todos;
        state.loaded = true;
        state.stale = false;
        true
    }

    /// Begin and optimistic-apply steps of a mutation: cancels in-flight
    /// fetches, snapshots `committed` unless a snapshot is already held, then
    /// transforms `committed` in place.
    pub fn begin_mutation(&self, key: ListKey, apply: impl FnOnce(&mut Vec<CachedTodo>)) {
        let mut lists = self.lists();
        let state = lists.entry(key).or_default();
        state.generation += 1;
        if state.rollback.is_none() {
            state.rollback = Some(state.committed.clone());
        }
        state.in_flight += 1;
        apply(&mut state.committed);
    }

    /// Restores `committed` from the held snapshot and drops it.
    pub fn roll_back(&self, key: ListKey) -> bool {
        let mut lists = self.lists();
        let Some(state) = lists.get_mut(&key) else { return false };
        match state.rollback.take() {
            Some(snapshot) => {
                state.committed = snapshot;
                true
            }
            None => false,
        }
    }

    /// Ends a mutation and marks the list stale. The snapshot is released once
    /// no overlapping mutation is left in flight.
    pub fn settle(&self, key: ListKey) {
        let mut lists = self.lists();
        let state = lists.entry(key).or_default();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            state.rollback = None;
        }
        state.stale = true;
    }
}
