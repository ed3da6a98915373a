// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Pluggable placement algorithms for new segments.

mod balanced;
mod random;

pub use balanced::BalancedAssignment;
pub use random::RandomAssignment;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use strata_types::config::AssignmentStrategyKind;
use strata_types::desired_state::DesiredStateDocument;
use strata_types::segment::SegmentMetadata;
use strata_types::{InstanceId, ResourceName, TenantTag};

use crate::Error;

/// Selects which instances should host a segment. Determinism is not
/// required; random strategies are legal and expected.
pub trait SegmentAssignmentStrategy: fmt::Debug + Send + Sync {
    /// Returns exactly `replica_count` instances from `pool`, or
    /// [`Error::InsufficientCapacity`] when fewer eligible instances exist.
    fn select_instances(
        &self,
        pool: &[InstanceId],
        current_state: &DesiredStateDocument,
        segment: &SegmentMetadata,
        replica_count: u32,
        tenant: &TenantTag,
    ) -> Result<Vec<InstanceId>, Error>;
}

fn strategy_for(kind: AssignmentStrategyKind) -> Arc<dyn SegmentAssignmentStrategy> {
    match kind {
        AssignmentStrategyKind::Random => Arc::new(RandomAssignment),
        AssignmentStrategyKind::Balanced => Arc::new(BalancedAssignment),
    }
}

/// Cache of resolved placement strategies, keyed by resource.
///
/// A resource's strategy is resolved from its configuration on first use
/// and treated as immutable for the resource's lifetime; [`Self::evict`]
/// exists for resource deletion/re-creation flows. Owned by whichever
/// component composes the controllers and passed in explicitly.
#[derive(Debug, Clone, Default)]
pub struct StrategyCache {
    inner: Arc<parking_lot::Mutex<HashMap<ResourceName, Arc<dyn SegmentAssignmentStrategy>>>>,
}

impl StrategyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &self,
        resource: &ResourceName,
        kind: AssignmentStrategyKind,
    ) -> Arc<dyn SegmentAssignmentStrategy> {
        Arc::clone(
            self.inner
                .lock()
                .entry(resource.clone())
                .or_insert_with(|| strategy_for(kind)),
        )
    }

    pub fn evict(&self, resource: &ResourceName) -> bool {
        self.inner.lock().remove(resource).is_some()
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn cache_resolves_once_per_resource() {
        let cache = StrategyCache::new();
        let resource = ResourceName::from("orders");

        let first = cache.resolve(&resource, AssignmentStrategyKind::Random);
        // a later lookup with a different kind still returns the cached one
        let second = cache.resolve(&resource, AssignmentStrategyKind::Balanced);
        assert!(Arc::ptr_eq(&first, &second));

        assert_that!(cache.evict(&resource), eq(true));
        assert_that!(cache.evict(&resource), eq(false));

        let third = cache.resolve(&resource, AssignmentStrategyKind::Balanced);
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
