// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use rand::seq::IteratorRandom;
use tracing::debug;

use strata_types::desired_state::DesiredStateDocument;
use strata_types::segment::SegmentMetadata;
use strata_types::{InstanceId, TenantTag};

use crate::sharding::SegmentAssignmentStrategy;
use crate::Error;

/// Uniform random selection from the eligible pool.
#[derive(Debug, Default)]
pub struct RandomAssignment;

impl SegmentAssignmentStrategy for RandomAssignment {
    fn select_instances(
        &self,
        pool: &[InstanceId],
        _current_state: &DesiredStateDocument,
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

        let mut rng = rand::thread_rng();
        let selected = pool.iter().cloned().choose_multiple(&mut rng, needed);

        debug!(
            segment = %segment.name,
            %tenant,
            instances = ?selected,
            "randomly selected instances for segment"
        );

        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use strata_types::desired_state::ReplicaCount;
    use strata_types::ResourceName;

    use super::*;

    fn pool() -> Vec<InstanceId> {
        ["server_a_1", "server_b_1", "server_c_1", "server_d_1"]
            .map(InstanceId::from)
            .to_vec()
    }

    fn empty_doc() -> DesiredStateDocument {
        DesiredStateDocument::new(
            ResourceName::from("orders"),
            ReplicaCount::Factor(2),
            TenantTag::from("orders"),
        )
    }

    #[test]
    fn selects_exactly_the_requested_count() {
        let pool = pool();
        let segment = SegmentMetadata::new("orders", "seg1");

        let selected = RandomAssignment
            .select_instances(&pool, &empty_doc(), &segment, 2, &TenantTag::from("orders"))
            .unwrap();

        assert_that!(selected.len(), eq(2));
        assert!(selected.iter().all(|instance| pool.contains(instance)));
        assert_ne!(selected[0], selected[1]);
    }

    #[test]
    fn fails_on_insufficient_capacity() {
        let segment = SegmentMetadata::new("orders", "seg1");

        let result = RandomAssignment.select_instances(
            &pool(),
            &empty_doc(),
            &segment,
            5,
            &TenantTag::from("orders"),
        );

        assert!(matches!(
            result,
            Err(Error::InsufficientCapacity {
                needed: 5,
                available: 4
            })
        ));
    }
}
