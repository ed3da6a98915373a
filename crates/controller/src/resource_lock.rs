// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use strata_types::ResourceName;

/// Per-resource mutual exclusion for desired-state mutations.
///
/// Every mutating controller operation acquires the lock of the resource it
/// touches, so concurrent callers reacting to distinct cluster events are
/// serialized per resource while operations on different resources proceed
/// in parallel. Locks are created lazily and never reclaimed; the table
/// grows with the number of distinct resources mutated in this process.
#[derive(Debug, Clone, Default)]
pub struct ResourceLockTable {
    inner: Arc<parking_lot::Mutex<HashMap<ResourceName, Arc<Mutex<()>>>>>,
}

impl ResourceLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, resource: &ResourceName) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.inner.lock();
            Arc::clone(table.entry(resource.clone()).or_default())
        };
        lock.lock_owned().await
    }
}
