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

use tracing::debug;

use strata_types::desired_state::DesiredStateDocument;
use strata_types::segment::SegmentMetadata;
use strata_types::{InstanceId, TenantTag};

use crate::sharding::SegmentAssignmentStrategy;
use crate::Error;

/// Least-loaded selection: prefers the instances currently hosting the
/// fewest (non-dropped) segments of this resource, breaking ties by
/// instance id.
#[derive(Debug, Default)]
pub struct BalancedAssignment;

impl SegmentAssignmentStrategy for BalancedAssignment {
    fn select_instances(
        &self,
        pool: &[InstanceId],
        current_state: &DesiredStateDocument,
        segment: &SegmentMetadata,
        replica_count: u32,
        tenant: &TenantTag,
    ) -> Result<Vec<InstanceId>, Error> {
        let needed = replica_count as usize;
        if pool.len() < needed {
            return Err(Error::InsufficientCapacity {
                needed,
                available: pool.len(),
            });
        }

        let mut load: HashMap<&InstanceId, usize> = HashMap::default();
        for (_, instances) in current_state.segments() {
            for (instance, state) in instances {
                if !state.is_dropped() {
                    *load.entry(instance).or_default() += 1;
                }
            }
        }

        let mut candidates: Vec<&InstanceId> = pool.iter().collect();
        candidates.sort_by_key(|instance| (load.get(instance).copied().unwrap_or(0), *instance));
        let selected: Vec<InstanceId> = candidates
            .into_iter()
            .take(needed)
            .cloned()
            .collect();

        debug!(
            segment = %segment.name,
            %tenant,
            instances = ?selected,
            "selected least-loaded instances for segment"
        );

        Ok(selected)
    }
}
