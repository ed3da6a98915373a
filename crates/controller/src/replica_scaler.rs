// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use metrics::counter;
use rand::Rng;
use tracing::{debug, info};

use strata_metadata_store::ClusterStore;
use strata_types::desired_state::{DesiredStateBuilder, DesiredStateDocument, ReplicaCount, SegmentState};
use strata_types::{InstanceId, ResourceName, SegmentId};

use crate::metric_definitions::CONTROLLER_REPLICA_SCALINGS_TOTAL;
use crate::resource_lock::ResourceLockTable;
use crate::Error;

/// Adjusts the replica count of every segment of a resource.
///
/// Expansion uses a uniform proportional fill over the tagged instance
/// pool rather than the resource's configured assignment strategy; see
/// DESIGN.md for the recorded divergence.
#[derive(Debug)]
pub struct ReplicaScaler<S> {
    store: S,
    locks: ResourceLockTable,
}

impl<S> ReplicaScaler<S>
where
    S: ClusterStore,
{
    pub fn new(store: S, locks: ResourceLockTable) -> Self {
        Self { store, locks }
    }

    pub async fn scale_replicas(
        &self,
        resource: &ResourceName,
        new_replica_count: u32,
    ) -> Result<DesiredStateDocument, Error> {
        let _guard = self.locks.acquire(resource).await;

        let document = self
            .store
            .get_desired_state(resource)
            .await?
            .ok_or_else(|| Error::ResourceNotFound(resource.clone()))?;

        let Some(current) = document.num_replicas().factor() else {
            return Err(Error::UnsupportedConfiguration(format!(
                "resource '{resource}' has an unbounded replica count and cannot be scaled"
            )));
        };

        if new_replica_count == current {
            debug!(%resource, replica_count = current, "replica count unchanged, nothing to do");
            return Ok(document);
        }

        let mut builder = document.into_builder();
        if new_replica_count > current {
            let pool = self
                .store
                .get_instances_with_tag(builder.document().instance_group_tag())
                .await?;
            expand_replicas(&mut builder, &pool, current, new_replica_count);
        } else {
            shrink_replicas(&mut builder, current, new_replica_count);
        }

        let document = builder.build();
        self.store.set_desired_state(resource, &document).await?;
        counter!(CONTROLLER_REPLICA_SCALINGS_TOTAL).increment(1);

        info!(
            %resource,
            from = current,
            to = new_replica_count,
            "rescaled segment replicas"
        );
        Ok(document)
    }
}

/// Assigns `new - current` additional instances per segment from the
/// previously-unassigned part of the pool, admitting each candidate with
/// probability `to_add / available`: a streaming proportional selection
/// that spreads replicas without a full shuffle.
fn expand_replicas(builder: &mut DesiredStateBuilder, pool: &[InstanceId], current: u32, new: u32) {
    builder.set_num_replicas(ReplicaCount::Factor(new));

    let mut rng = rand::thread_rng();
    let segments: Vec<SegmentId> = builder.document().segment_ids().cloned().collect();
    for segment in &segments {
        let assigned = builder.document().instance_set(segment);
        let mut to_add = (new - current) as usize;
        let mut available = pool
            .iter()
            .filter(|instance| !assigned.contains(instance))
            .count();

        for instance in pool {
            if assigned.contains(instance) {
                continue;
            }
            if rng.gen_range(0..available) < to_add {
                builder.set_state(segment, instance, SegmentState::Online);
                to_add -= 1;
            }
            if to_add == 0 {
                break;
            }
            available -= 1;
        }
    }
}

/// Marks the first `current - new` assigned instances of every segment as
/// `Dropped`. No new instances are considered.
fn shrink_replicas(builder: &mut DesiredStateBuilder, current: u32, new: u32) {
    builder.set_num_replicas(ReplicaCount::Factor(new));

    let to_drop = (current - new) as usize;
    let segments: Vec<SegmentId> = builder.document().segment_ids().cloned().collect();
    for segment in &segments {
        let assigned = builder.document().instance_set(segment);
        for instance in assigned.iter().take(to_drop) {
            builder.set_state(segment, instance, SegmentState::Dropped);
        }
    }
}
