// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Id-keyed registries of live execution contexts.

use std::sync::Arc;

use dashmap::DashMap;

use crate::ids::IdGenerator;

/// Maps process-local ids to shared entries.
///
/// Operations are linearizable per key. Lookups hand out `Arc` clones, so an
/// entry removed while a handler still holds it stays alive until the handler
/// returns.
pub struct Registry<T: ?Sized> {
    entries: DashMap<i64, Arc<T>>,
    ids: Arc<IdGenerator>,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Registry<T> {
    /// Registry with its own id generator.
    pub fn new() -> Self {
        Self::with_ids(Arc::new(IdGenerator::new()))
    }

    /// Registry drawing ids from a shared generator.
    pub fn with_ids(ids: Arc<IdGenerator>) -> Self {
        Self {
            entries: DashMap::new(),
            ids,
        }
    }

    /// Pre-generate an id for a later [`add`](Self::add).
    pub fn next_id(&self) -> i64 {
        self.ids.next()
    }

    /// Register `entry` under `id`, replacing any previous entry. Returns `id`.
    pub fn add(&self, id: i64, entry: impl Into<Arc<T>>) -> i64 {
        self.entries.insert(id, entry.into());
        id
    }

    /// Register `entry` under a fresh id.
    pub fn insert(&self, entry: impl Into<Arc<T>>) -> i64 {
        self.add(self.next_id(), entry)
    }

    /// Look up an entry.
    pub fn get(&self, id: i64) -> Option<Arc<T>> {
        self.entries.get(&id).map(|e| e.value().clone())
    }

    /// Remove an entry, returning it if it was present.
    pub fn remove(&self, id: i64) -> Option<Arc<T>> {
        self.entries.remove(&id).map(|(_, entry)| entry)
    }

    /// True if `id` is registered.
    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the registered ids.
    pub fn ids(&self) -> Vec<i64> {
        self.entries.iter().map(|e| *e.key()).collect()
    }
}

impl<T: ?Sized> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.entries.len())
            .field("last_id", &self.ids.last())
            .finish()
    }
}
