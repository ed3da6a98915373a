// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::cmp::Ordering;

use metrics::counter;
use rand::seq::IteratorRandom;
use tracing::info;

use strata_metadata_store::ClusterStore;
use strata_types::desired_state::{DesiredStateDocument, ReplicaCount, SegmentState};
use strata_types::identifiers::ROUTING_RESOURCE_NAME;
use strata_types::{InstanceId, ResourceName, SegmentId, TenantTag};

use crate::metric_definitions::CONTROLLER_ROUTING_UPDATES_TOTAL;
use crate::resource_lock::ResourceLockTable;
use crate::Error;

/// Manages the single cluster-wide routing document, whose "segments" are
/// logical data-resource names mapped to the query-routing instances that
/// must serve them. Replica and partition counts are unbounded: every
/// routing instance may serve every resource.
#[derive(Debug)]
pub struct RoutingAssignmentController<S> {
    store: S,
    locks: ResourceLockTable,
}

impl<S> RoutingAssignmentController<S>
where
    S: ClusterStore,
{
    pub fn new(store: S, locks: ResourceLockTable) -> Self {
        Self { store, locks }
    }

    /// Creates and persists the empty routing document, used once at
    /// cluster bootstrap.
    pub async fn build_empty_routing_state(&self) -> Result<DesiredStateDocument, Error> {
        let routing = ResourceName::routing();
        let _guard = self.locks.acquire(&routing).await;

        let document = DesiredStateDocument::new(
            routing.clone(),
            ReplicaCount::Unbounded,
            TenantTag::from(ROUTING_RESOURCE_NAME),
        );
        self.store.set_desired_state(&routing, &document).await?;

        info!("created empty routing desired state");
        Ok(document)
    }

    /// Ensures the data resource has a routing entry with the desired
    /// instance count, selecting instances uniformly at random from the
    /// tagged pool. Delegates to the scale path when an entry exists.
    ///
    /// Returns `None` when the scale path removed instances; the document
    /// was already committed in that case and must not be written again.
    pub async fn add_resource(
        &self,
        resource: &ResourceName,
        desired_instance_count: usize,
        tenant: &TenantTag,
    ) -> Result<Option<DesiredStateDocument>, Error> {
        let routing = ResourceName::routing();
        let _guard = self.locks.acquire(&routing).await;

        let document = self
            .store
            .get_desired_state(&routing)
            .await?
            .ok_or_else(|| Error::ResourceNotFound(routing.clone()))?;

        let entry = SegmentId::from(resource);
        if !document.instance_set(&entry).is_empty() {
            return self
                .scale_entry(document, resource, desired_instance_count, tenant)
                .await;
        }

        let pool = self.store.get_instances_with_tag(tenant).await?;
        let selected = select_routing_instances(&pool, desired_instance_count)?;

        let mut builder = document.into_builder();
        for instance in &selected {
            builder.set_state(&entry, instance, SegmentState::Online);
        }
        let document = builder.build();
        self.store.set_desired_state(&routing, &document).await?;
        counter!(CONTROLLER_ROUTING_UPDATES_TOTAL).increment(1);

        info!(%resource, instances = ?selected, "added resource to routing state");
        Ok(Some(document))
    }

    /// Adjusts the number of routing instances serving `resource`.
    pub async fn scale_resource(
        &self,
        resource: &ResourceName,
        desired_instance_count: usize,
        tenant: &TenantTag,
    ) -> Result<Option<DesiredStateDocument>, Error> {
        let routing = ResourceName::routing();
        let _guard = self.locks.acquire(&routing).await;

        let document = self
            .store
            .get_desired_state(&routing)
            .await?
            .ok_or_else(|| Error::ResourceNotFound(routing.clone()))?;

        self.scale_entry(document, resource, desired_instance_count, tenant)
            .await
    }

    /// Erases the resource's routing entry entirely.
    pub async fn remove_resource(
        &self,
        resource: &ResourceName,
    ) -> Result<DesiredStateDocument, Error> {
        let routing = ResourceName::routing();
        let _guard = self.locks.acquire(&routing).await;

        let document = self
            .store
            .get_desired_state(&routing)
            .await?
            .ok_or_else(|| Error::ResourceNotFound(routing.clone()))?;

        let entry = SegmentId::from(resource);
        if document.instance_set(&entry).is_empty() {
            return Err(Error::ResourceNotFound(resource.clone()));
        }

        let mut builder = document.into_builder();
        builder.remove_segment(&entry);
        let document = builder.build();

        self.store.set_desired_state(&routing, &document).await?;
        counter!(CONTROLLER_ROUTING_UPDATES_TOTAL).increment(1);

        info!(%resource, "removed resource from routing state");
        Ok(document)
    }

    async fn scale_entry(
        &self,
        document: DesiredStateDocument,
        resource: &ResourceName,
        desired_instance_count: usize,
        tenant: &TenantTag,
    ) -> Result<Option<DesiredStateDocument>, Error> {
        let routing = ResourceName::routing();
        let entry = SegmentId::from(resource);
        let online = document.online_instances(&entry);

        match online.len().cmp(&desired_instance_count) {
            Ordering::Greater => {
                let excess = online.len() - desired_instance_count;
                let (removed, kept) = online.split_at(excess);

                let mut builder = document.into_builder();
                builder.remove_segment(&entry);
                for instance in kept {
                    builder.set_state(&entry, instance, SegmentState::Online);
                }
                let document = builder.build();

                // The document with the instances absent must be committed
                // before any instance is disabled: disabling first would
                // leave a window in which stale routing data still
                // addresses a disabled instance.
                self.store.set_desired_state(&routing, &document).await?;
                for instance in removed {
                    self.store
                        .set_instance_enabled(false, &routing, instance, std::slice::from_ref(&entry))
                        .await?;
                }
                // re-enable so the instance keeps serving its other entries
                for instance in removed {
                    self.store
                        .set_instance_enabled(true, &routing, instance, std::slice::from_ref(&entry))
                        .await?;
                }
                counter!(CONTROLLER_ROUTING_UPDATES_TOTAL).increment(1);

                info!(%resource, removed = ?removed, "scaled down routing assignment");
                Ok(None)
            }
            Ordering::Less => {
                let pool = self.store.get_instances_with_tag(tenant).await?;
                let selected = select_routing_instances(&pool, desired_instance_count)?;

                let mut shortfall = desired_instance_count - online.len();
                let mut builder = document.into_builder();
                for instance in &selected {
                    if online.contains(instance) {
                        continue;
                    }
                    builder.set_state(&entry, instance, SegmentState::Online);
                    shortfall -= 1;
                    if shortfall == 0 {
                        break;
                    }
                }
                let document = builder.build();

                self.store.set_desired_state(&routing, &document).await?;
                counter!(CONTROLLER_ROUTING_UPDATES_TOTAL).increment(1);

                info!(%resource, desired_instance_count, "scaled up routing assignment");
                Ok(Some(document))
            }
            Ordering::Equal => Ok(Some(document)),
        }
    }
}

fn select_routing_instances(
    pool: &[InstanceId],
    desired: usize,
) -> Result<Vec<InstanceId>, Error> {
    if pool.len() < desired {
        return Err(Error::InsufficientCapacity {
            needed: desired,
            available: pool.len(),
        });
    }

    let mut rng = rand::thread_rng();
    Ok(pool.iter().cloned().choose_multiple(&mut rng, desired))
}
