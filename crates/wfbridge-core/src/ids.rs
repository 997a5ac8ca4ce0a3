// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process-unique identifier generators.

use std::sync::atomic::{AtomicI64, Ordering};

/// Hands out strictly increasing `i64` ids, starting at 1.
///
/// Each entity kind (requests, workflow contexts, activity contexts, children,
/// workers) owns its own generator, so ids of different kinds may collide.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    /// Create a generator whose first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id. Never returns the same value twice.
    pub fn next(&self) -> i64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Last id handed out (0 if none).
    pub fn last(&self) -> i64 {
        self.last.load(Ordering::Relaxed)
    }
}
