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
use tracing::{debug, info};

use strata_metadata_store::{ClusterStore, ResourceConfigStore};
use strata_types::desired_state::{
    DesiredStateBuilder, DesiredStateDocument, ReplicaCount, SegmentState,
};
use strata_types::segment::SegmentMetadata;
use strata_types::{InstanceId, ResourceName, SegmentId, TenantTag};

use crate::metric_definitions::{
    CONTROLLER_SEGMENT_DROPS_TOTAL, CONTROLLER_SEGMENT_PLACEMENTS_TOTAL,
};
use crate::resource_lock::ResourceLockTable;
use crate::sharding::{SegmentAssignmentStrategy, StrategyCache};
use crate::Error;

/// Builds, adds, updates, drops and removes segment entries in a resource's
/// desired-state document.
#[derive(Debug)]
pub struct SegmentPlacementController<S> {
    store: S,
    strategies: StrategyCache,
    locks: ResourceLockTable,
}

impl<S> SegmentPlacementController<S>
where
    S: ClusterStore + ResourceConfigStore,
{
    pub fn new(store: S, strategies: StrategyCache, locks: ResourceLockTable) -> Self {
        Self {
            store,
            strategies,
            locks,
        }
    }

    /// Creates and persists an empty desired-state document for a freshly
    /// created resource. The instance group tag is the resource name.
    pub async fn build_empty_state(
        &self,
        resource: &ResourceName,
        replica_count: u32,
    ) -> Result<DesiredStateDocument, Error> {
        let _guard = self.locks.acquire(resource).await;

        let document = DesiredStateDocument::new(
            resource.clone(),
            ReplicaCount::Factor(replica_count),
            TenantTag::from(resource.as_str()),
        );
        self.store.set_desired_state(resource, &document).await?;

        info!(%resource, replica_count, "created empty desired state");
        Ok(document)
    }

    /// Places a newly published segment, or pulses an already-placed one.
    ///
    /// New segments are placed on `replica_count` instances chosen by the
    /// resource's configured strategy, using the replica count configured
    /// at placement time. For a segment that already has instances assigned
    /// (a re-push of the same segment id), every assigned instance is
    /// forced through `Offline` back to `Online`: serving instances react
    /// to state transitions, not to document diffs, so writing
    /// `Online → Online` would never trigger a re-fetch.
    pub async fn add_or_update_segment(
        &self,
        segment: &SegmentMetadata,
    ) -> Result<DesiredStateDocument, Error> {
        let resource = &segment.resource;
        let _guard = self.locks.acquire(resource).await;

        let config = self
            .store
            .get_resource_config(resource)
            .await?
            .ok_or_else(|| Error::ResourceNotFound(resource.clone()))?;
        let document = self
            .store
            .get_desired_state(resource)
            .await?
            .ok_or_else(|| Error::ResourceNotFound(resource.clone()))?;

        let mut builder = document.into_builder();
        let assigned = builder.document().instance_set(&segment.name);
        if assigned.is_empty() {
            let pool = self.store.get_instances_with_tag(&config.tenant).await?;
            let strategy = self
                .strategies
                .resolve(resource, config.assignment_strategy);
            place_new_segment(
                &mut builder,
                strategy.as_ref(),
                &pool,
                segment,
                config.replication,
                &config.tenant,
            )?;
        } else {
            debug!(%resource, segment = %segment.name, crc = ?segment.crc, "pulsing updated segment");
            pulse_segment(&mut builder, &segment.name, &assigned);
        }

        let document = builder.build();
        self.store.set_desired_state(resource, &document).await?;
        counter!(CONTROLLER_SEGMENT_PLACEMENTS_TOTAL).increment(1);

        Ok(document)
    }

    /// Adds a consuming segment on one specific instance, as used by the
    /// streaming ingestion flow when an instance starts a new segment.
    pub async fn add_segment_to_instance(
        &self,
        resource: &ResourceName,
        segment: &SegmentId,
        instance: &InstanceId,
    ) -> Result<DesiredStateDocument, Error> {
        let _guard = self.locks.acquire(resource).await;

        let document = self
            .store
            .get_desired_state(resource)
            .await?
            .ok_or_else(|| Error::ResourceNotFound(resource.clone()))?;

        let mut builder = document.into_builder();
        builder.set_state(segment, instance, SegmentState::Online);
        let document = builder.build();

        self.store.set_desired_state(resource, &document).await?;
        counter!(CONTROLLER_SEGMENT_PLACEMENTS_TOTAL).increment(1);

        Ok(document)
    }

    /// Marks every instance assigned to the segment as `Dropped`, the
    /// terminal marker data-plane instances observe before clean-up.
    pub async fn drop_segment(
        &self,
        resource: &ResourceName,
        segment: &SegmentId,
    ) -> Result<DesiredStateDocument, Error> {
        let _guard = self.locks.acquire(resource).await;

        let document = self
            .store
            .get_desired_state(resource)
            .await?
            .ok_or_else(|| Error::ResourceNotFound(resource.clone()))?;

        let assigned = document.instance_set(segment);
        if assigned.is_empty() {
            return Err(Error::segment_not_found(resource, segment));
        }

        let mut builder = document.into_builder();
        for instance in &assigned {
            builder.set_state(segment, instance, SegmentState::Dropped);
        }
        let document = builder.build();

        self.store.set_desired_state(resource, &document).await?;
        counter!(CONTROLLER_SEGMENT_DROPS_TOTAL).increment(1);

        info!(%resource, %segment, "marked segment dropped");
        Ok(document)
    }

    /// Erases the segment entirely from the partition map, typically after
    /// a drop has been observed and drained.
    pub async fn remove_segment(
        &self,
        resource: &ResourceName,
        segment: &SegmentId,
    ) -> Result<DesiredStateDocument, Error> {
        let _guard = self.locks.acquire(resource).await;

        let document = self
            .store
            .get_desired_state(resource)
            .await?
            .ok_or_else(|| Error::ResourceNotFound(resource.clone()))?;

        if document.instance_set(segment).is_empty() {
            return Err(Error::segment_not_found(resource, segment));
        }

        let mut builder = document.into_builder();
        builder.remove_segment(segment);
        let document = builder.build();

        self.store.set_desired_state(resource, &document).await?;
        counter!(CONTROLLER_SEGMENT_DROPS_TOTAL).increment(1);

        Ok(document)
    }

    /// Same pulse as [`Self::add_or_update_segment`] on an existing
    /// segment, but the `Offline` phase is written to the store before the
    /// `Online` phase, so the transition itself (not just the final
    /// document) is externally observable mid-operation.
    pub async fn update_segment_in_place(
        &self,
        resource: &ResourceName,
        segment: &SegmentId,
    ) -> Result<DesiredStateDocument, Error> {
        let _guard = self.locks.acquire(resource).await;

        let document = self
            .store
            .get_desired_state(resource)
            .await?
            .ok_or_else(|| Error::ResourceNotFound(resource.clone()))?;

        let assigned = document.instance_set(segment);
        let mut builder = document.into_builder();

        for instance in &assigned {
            builder.set_state(segment, instance, SegmentState::Offline);
        }
        self.store
            .set_desired_state(resource, builder.document())
            .await?;

        for instance in &assigned {
            builder.set_state(segment, instance, SegmentState::Online);
        }
        let document = builder.build();
        self.store.set_desired_state(resource, &document).await?;
        counter!(CONTROLLER_SEGMENT_PLACEMENTS_TOTAL).increment(1);

        Ok(document)
    }
}

fn place_new_segment(
    builder: &mut DesiredStateBuilder,
    strategy: &dyn SegmentAssignmentStrategy,
    pool: &[InstanceId],
    segment: &SegmentMetadata,
    replica_count: u32,
    tenant: &TenantTag,
) -> Result<(), Error> {
    let selected =
        strategy.select_instances(pool, builder.document(), segment, replica_count, tenant)?;
    for instance in &selected {
        builder.set_state(&segment.name, instance, SegmentState::Online);
    }

    info!(
        resource = %segment.resource,
        segment = %segment.name,
        instances = ?selected,
        "placed new segment"
    );
    Ok(())
}

/// Forces every assigned instance through `Offline` back to `Online`
/// without changing the instance set.
fn pulse_segment(builder: &mut DesiredStateBuilder, segment: &SegmentId, assigned: &[InstanceId]) {
    for instance in assigned {
        builder.set_state(segment, instance, SegmentState::Offline);
    }
    for instance in assigned {
        builder.set_state(segment, instance, SegmentState::Online);
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;
    use test_log::test;

    use strata_metadata_store::InMemoryMetadataStore;
    use strata_types::config::{AssignmentStrategyKind, ResourceConfig};

    use super::*;

    fn controller(store: InMemoryMetadataStore) -> SegmentPlacementController<InMemoryMetadataStore> {
        SegmentPlacementController::new(store, StrategyCache::new(), ResourceLockTable::new())
    }

    fn orders_setup(replication: u32) -> (InMemoryMetadataStore, Vec<InstanceId>) {
        let store = InMemoryMetadataStore::new();
        let pool: Vec<_> = ["server_a_1", "server_b_1", "server_c_1", "server_d_1"]
            .map(InstanceId::from)
            .to_vec();

        store.put_resource_config(
            ResourceName::from("orders"),
            ResourceConfig {
                replication,
                assignment_strategy: AssignmentStrategyKind::Random,
                tenant: TenantTag::from("serving"),
                stream: None,
            },
        );
        store.register_instances(TenantTag::from("serving"), pool.clone());
        (store, pool)
    }

    #[test(tokio::test)]
    async fn new_segment_is_placed_on_replica_count_instances() {
        let (store, pool) = orders_setup(2);
        let controller = controller(store.clone());
        let resource = ResourceName::from("orders");

        controller.build_empty_state(&resource, 2).await.unwrap();
        let document = controller
            .add_or_update_segment(&SegmentMetadata::new("orders", "seg1"))
            .await
            .unwrap();

        assert_that!(document.num_partitions(), eq(1));
        let online = document.online_instances(&SegmentId::from("seg1"));
        assert_that!(online.len(), eq(2));
        assert!(online.iter().all(|instance| pool.contains(instance)));
        // the write made it to the store
        assert_that!(store.document(&resource), some(eq(&document)));
    }

    #[test(tokio::test)]
    async fn updated_segment_keeps_its_instance_set() {
        let (store, _) = orders_setup(2);
        let controller = controller(store.clone());
        let resource = ResourceName::from("orders");
        let segment = SegmentMetadata::new("orders", "seg1");

        controller.build_empty_state(&resource, 2).await.unwrap();
        let before = controller.add_or_update_segment(&segment).await.unwrap();
        let after = controller.add_or_update_segment(&segment).await.unwrap();

        assert_that!(
            after.instance_set(&SegmentId::from("seg1")),
            eq(&before.instance_set(&SegmentId::from("seg1")))
        );
        assert_that!(after.num_partitions(), eq(1));
        assert!(after
            .online_instances(&SegmentId::from("seg1"))
            .iter()
            .all(|instance| before
                .online_instances(&SegmentId::from("seg1"))
                .contains(instance)));
    }

    #[test]
    fn pulse_forces_offline_then_online() {
        let resource = ResourceName::from("orders");
        let segment = SegmentId::from("seg1");
        let instances = ["server_a_1", "server_b_1"].map(InstanceId::from);

        let mut builder = DesiredStateDocument::new(
            resource,
            ReplicaCount::Factor(2),
            TenantTag::from("serving"),
        )
        .into_builder();
        for instance in &instances {
            builder.set_state(&segment, instance, SegmentState::Online);
        }
        let mut builder = builder.build().into_builder();

        pulse_segment(&mut builder, &segment, &instances);

        let states: Vec<_> = builder.transitions().iter().map(|t| t.state).collect();
        assert_that!(
            states,
            eq(&vec![
                SegmentState::Offline,
                SegmentState::Offline,
                SegmentState::Online,
                SegmentState::Online
            ])
        );
    }

    #[test(tokio::test)]
    async fn drop_then_remove_erases_the_segment() {
        let (store, _) = orders_setup(2);
        let controller = controller(store);
        let resource = ResourceName::from("orders");
        let segment = SegmentId::from("seg1");

        controller.build_empty_state(&resource, 2).await.unwrap();
        controller
            .add_or_update_segment(&SegmentMetadata::new("orders", "seg1"))
            .await
            .unwrap();

        let dropped = controller.drop_segment(&resource, &segment).await.unwrap();
        assert!(dropped
            .instance_states(&segment)
            .unwrap()
            .values()
            .all(|state| state.is_dropped()));

        let removed = controller.remove_segment(&resource, &segment).await.unwrap();
        assert!(!removed.contains_segment(&segment));
        assert_that!(removed.num_partitions(), eq(0));
    }

    #[test(tokio::test)]
    async fn drop_and_remove_fail_on_unknown_segment() {
        let (store, _) = orders_setup(2);
        let controller = controller(store);
        let resource = ResourceName::from("orders");
        let segment = SegmentId::from("never-added");

        controller.build_empty_state(&resource, 2).await.unwrap();

        assert!(matches!(
            controller.drop_segment(&resource, &segment).await,
            Err(Error::SegmentNotFound { .. })
        ));
        assert!(matches!(
            controller.remove_segment(&resource, &segment).await,
            Err(Error::SegmentNotFound { .. })
        ));
    }

    #[test(tokio::test)]
    async fn in_place_update_writes_the_offline_phase_first() {
        let (store, _) = orders_setup(2);
        let controller = controller(store.clone());
        let resource = ResourceName::from("orders");
        let segment = SegmentId::from("seg1");

        controller.build_empty_state(&resource, 2).await.unwrap();
        controller
            .add_or_update_segment(&SegmentMetadata::new("orders", "seg1"))
            .await
            .unwrap();

        controller
            .update_segment_in_place(&resource, &segment)
            .await
            .unwrap();

        let writes = store.document_writes(&resource);
        // empty doc, placement, offline phase, online phase
        assert_that!(writes.len(), eq(4));
        assert!(writes[2]
            .instance_states(&segment)
            .unwrap()
            .values()
            .all(|state| state.is_offline()));
        assert!(writes[3]
            .instance_states(&segment)
            .unwrap()
            .values()
            .all(|state| state.is_online()));
    }

    #[test(tokio::test)]
    async fn add_segment_to_instance_places_a_single_replica() {
        let (store, pool) = orders_setup(2);
        let controller = controller(store);
        let resource = ResourceName::from("orders");
        let segment = SegmentId::from("consuming-seg");

        controller.build_empty_state(&resource, 2).await.unwrap();
        let document = controller
            .add_segment_to_instance(&resource, &segment, &pool[0])
            .await
            .unwrap();

        assert_that!(document.num_partitions(), eq(1));
        assert_that!(document.online_instances(&segment), eq(&vec![pool[0].clone()]));
    }

    #[test(tokio::test)]
    async fn concurrent_mutations_of_one_resource_are_serialized() {
        let (store, _) = orders_setup(1);
        let controller = std::sync::Arc::new(controller(store.clone()));
        let resource = ResourceName::from("orders");

        controller.build_empty_state(&resource, 1).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|idx| {
                let controller = std::sync::Arc::clone(&controller);
                tokio::spawn(async move {
                    controller
                        .add_or_update_segment(&SegmentMetadata::new("orders", format!("seg{idx}")))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let document = store.document(&resource).unwrap();
        assert_that!(document.num_partitions(), eq(8));
    }
}
