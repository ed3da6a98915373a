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
use tracing::{info, warn};

use strata_metadata_store::{ClusterStore, InstanceMetadataStore, ResourceConfigStore};
use strata_types::config::{ConsumerKind, StreamSource};
use strata_types::desired_state::{DesiredStateDocument, ReplicaCount};
use strata_types::instance::InstanceMetadata;
use strata_types::time::MillisSinceEpoch;
use strata_types::{InstanceId, ResourceName, TenantTag};

use crate::metric_definitions::CONTROLLER_STREAM_ASSIGNMENTS_TOTAL;
use crate::resource_lock::ResourceLockTable;
use crate::Error;

/// Assigns streaming-ingestion instances to (consumer-group, partition)
/// pairs and records the assignment in per-instance metadata.
///
/// With `n` consumer instances and `r` consumer groups worth of redundancy,
/// each group receives `n / r` instances with contiguous partition ids
/// `0..n/r`; the same partition id repeats in every group, so the groups
/// consume the stream redundantly. Instances beyond `r * (n / r)` receive
/// no assignment.
#[derive(Debug)]
pub struct StreamConsumerAssignmentController<S> {
    store: S,
    locks: ResourceLockTable,
}

impl<S> StreamConsumerAssignmentController<S>
where
    S: ClusterStore + ResourceConfigStore + InstanceMetadataStore,
{
    pub fn new(store: S, locks: ResourceLockTable) -> Self {
        Self { store, locks }
    }

    /// Creates the consuming desired-state document for a freshly created
    /// streaming resource and assigns its consumer instances.
    pub async fn build_initial_stream_state(
        &self,
        resource: &ResourceName,
    ) -> Result<DesiredStateDocument, Error> {
        let _guard = self.locks.acquire(resource).await;

        let config = self
            .store
            .get_resource_config(resource)
            .await?
            .ok_or_else(|| Error::ResourceNotFound(resource.clone()))?;

        let Some(stream) = &config.stream else {
            return Err(Error::UnsupportedConfiguration(format!(
                "resource '{resource}' has no stream source"
            )));
        };
        let StreamSource::Kafka(options) = stream;
        match options.consumer_kind {
            ConsumerKind::HighLevel => {}
            ConsumerKind::Simple => {
                return Err(Error::UnsupportedConfiguration(format!(
                    "kafka consumer kind '{}' is not supported",
                    options.consumer_kind
                )));
            }
        }

        let num_replicas = config.replication;
        if num_replicas == 0 {
            return Err(Error::UnsupportedConfiguration(format!(
                "streaming resource '{resource}' requires a replication of at least 1"
            )));
        }

        let pool = self.store.get_instances_with_tag(&config.tenant).await?;
        let num_per_group = pool.len() / num_replicas as usize;
        if num_per_group == 0 {
            return Err(Error::InsufficientCapacity {
                needed: num_replicas as usize,
                available: pool.len(),
            });
        }

        // uniqueness, not reproducibility: a re-created resource must not
        // resume the offsets of its previous incarnation
        let base_group_id = options
            .group_id_override()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{resource}_{}", MillisSinceEpoch::now()));

        // consuming segments are added per instance later; the document
        // starts with zero partitions and the resource name as group tag
        let document = DesiredStateDocument::new(
            resource.clone(),
            ReplicaCount::Factor(1),
            TenantTag::from(resource.as_str()),
        );
        self.store.set_desired_state(resource, &document).await?;

        self.assign_consumers(resource, &pool, &base_group_id, num_per_group, num_replicas)
            .await?;
        counter!(CONTROLLER_STREAM_ASSIGNMENTS_TOTAL).increment(1);

        info!(
            %resource,
            consumers = pool.len(),
            groups = num_replicas,
            per_group = num_per_group,
            "assigned stream consumers"
        );
        Ok(document)
    }

    async fn assign_consumers(
        &self,
        resource: &ResourceName,
        pool: &[InstanceId],
        base_group_id: &str,
        num_per_group: usize,
        num_replicas: u32,
    ) -> Result<(), Error> {
        let mut partition_id: u32 = 0;
        let mut replica_id: u32 = 0;
        let mut assigned = 0usize;

        for instance in pool {
            if replica_id >= num_replicas {
                warn!(
                    %resource,
                    unassigned = pool.len() - assigned,
                    "consumer pool is not divisible by the group count; leaving remainder instances unassigned"
                );
                break;
            }

            let mut metadata = match self.store.get_instance_metadata(instance).await? {
                Some(metadata) => metadata,
                None => InstanceMetadata::from_instance_id(instance)?,
            };
            metadata.set_group_id(resource, format!("{base_group_id}_{replica_id}"));
            metadata.set_partition(resource, partition_id);
            self.store.set_instance_metadata(&metadata).await?;

            assigned += 1;
            partition_id = (partition_id + 1) % num_per_group as u32;
            if partition_id == 0 {
                replica_id += 1;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;
    use test_log::test;

    use strata_metadata_store::InMemoryMetadataStore;
    use strata_types::config::{AssignmentStrategyKind, KafkaStreamOptions, ResourceConfig};

    use super::*;

    fn kafka_config(
        replication: u32,
        consumer_kind: ConsumerKind,
        group_id: Option<&str>,
    ) -> ResourceConfig {
        ResourceConfig {
            replication,
            assignment_strategy: AssignmentStrategyKind::Random,
            tenant: TenantTag::from("realtime"),
            stream: Some(StreamSource::Kafka(KafkaStreamOptions {
                topic: "clicks".to_owned(),
                consumer_kind,
                consumer_group_id: group_id.map(str::to_owned),
                additional_options: Default::default(),
            })),
        }
    }

    fn consumer_pool(count: usize) -> Vec<InstanceId> {
        (0..count)
            .map(|idx| InstanceId::new(format!("consumer_host-{idx}_80{idx:02}")))
            .collect()
    }

    fn setup(
        pool_size: usize,
        config: ResourceConfig,
    ) -> (
        InMemoryMetadataStore,
        StreamConsumerAssignmentController<InMemoryMetadataStore>,
        Vec<InstanceId>,
    ) {
        let store = InMemoryMetadataStore::new();
        let pool = consumer_pool(pool_size);
        store.put_resource_config(ResourceName::from("clicks"), config);
        store.register_instances(TenantTag::from("realtime"), pool.clone());

        let controller =
            StreamConsumerAssignmentController::new(store.clone(), ResourceLockTable::new());
        (store, controller, pool)
    }

    #[test(tokio::test)]
    async fn nine_instances_over_three_groups() {
        let (store, controller, pool) =
            setup(9, kafka_config(3, ConsumerKind::HighLevel, None));
        let resource = ResourceName::from("clicks");

        let document = controller
            .build_initial_stream_state(&resource)
            .await
            .unwrap();
        assert_that!(document.num_partitions(), eq(0));
        assert_that!(document.num_replicas(), eq(ReplicaCount::Factor(1)));

        let partitions: Vec<u32> = pool
            .iter()
            .map(|instance| {
                store
                    .instance_metadata(instance)
                    .unwrap()
                    .partition(&resource)
                    .unwrap()
            })
            .collect();
        assert_that!(partitions, eq(&vec![0, 1, 2, 0, 1, 2, 0, 1, 2]));

        let group_ids: Vec<String> = pool
            .iter()
            .map(|instance| {
                store
                    .instance_metadata(instance)
                    .unwrap()
                    .group_id(&resource)
                    .unwrap()
                    .to_owned()
            })
            .collect();
        for (idx, group_id) in group_ids.iter().enumerate() {
            assert!(group_id.starts_with("clicks_"));
            assert!(group_id.ends_with(&format!("_{}", idx / 3)));
        }
        // all instances of one redundancy group share the group id
        assert_eq!(group_ids[0], group_ids[1]);
        assert_ne!(group_ids[0], group_ids[3]);
    }

    #[test(tokio::test)]
    async fn remainder_instances_stay_unassigned() {
        let (store, controller, pool) =
            setup(10, kafka_config(3, ConsumerKind::HighLevel, None));
        let resource = ResourceName::from("clicks");

        controller
            .build_initial_stream_state(&resource)
            .await
            .unwrap();

        for instance in &pool[..9] {
            assert!(store.instance_metadata(instance).is_some());
        }
        assert_that!(store.instance_metadata(&pool[9]), none());
    }

    #[test(tokio::test)]
    async fn configured_group_id_override_is_used() {
        let (store, controller, pool) = setup(
            2,
            kafka_config(2, ConsumerKind::HighLevel, Some("migrated-group")),
        );
        let resource = ResourceName::from("clicks");

        controller
            .build_initial_stream_state(&resource)
            .await
            .unwrap();

        assert_that!(
            store
                .instance_metadata(&pool[0])
                .unwrap()
                .group_id(&resource),
            some(eq("migrated-group_0"))
        );
        assert_that!(
            store
                .instance_metadata(&pool[1])
                .unwrap()
                .group_id(&resource),
            some(eq("migrated-group_1"))
        );
    }

    #[test(tokio::test)]
    async fn existing_metadata_records_are_overwritten_not_replaced() {
        let (store, controller, pool) =
            setup(2, kafka_config(2, ConsumerKind::HighLevel, None));
        let resource = ResourceName::from("clicks");
        let other = ResourceName::from("other");

        let mut existing = InstanceMetadata::from_instance_id(&pool[0]).unwrap();
        existing.set_group_id(&other, "other_group_0");
        existing.set_partition(&other, 7);
        store.set_instance_metadata(&existing).await.unwrap();

        controller
            .build_initial_stream_state(&resource)
            .await
            .unwrap();

        let metadata = store.instance_metadata(&pool[0]).unwrap();
        assert!(metadata.group_id(&resource).is_some());
        // assignments for other resources survive
        assert_that!(metadata.group_id(&other), some(eq("other_group_0")));
        assert_that!(metadata.partition(&other), some(eq(7)));
    }

    #[test(tokio::test)]
    async fn simple_consumers_are_rejected() {
        let (_, controller, _) = setup(3, kafka_config(1, ConsumerKind::Simple, None));

        assert!(matches!(
            controller
                .build_initial_stream_state(&ResourceName::from("clicks"))
                .await,
            Err(Error::UnsupportedConfiguration(_))
        ));
    }

    #[test(tokio::test)]
    async fn resources_without_a_stream_are_rejected() {
        let store = InMemoryMetadataStore::new();
        store.put_resource_config(
            ResourceName::from("clicks"),
            ResourceConfig {
                replication: 1,
                assignment_strategy: AssignmentStrategyKind::Random,
                tenant: TenantTag::from("realtime"),
                stream: None,
            },
        );
        let controller =
            StreamConsumerAssignmentController::new(store, ResourceLockTable::new());

        assert!(matches!(
            controller
                .build_initial_stream_state(&ResourceName::from("clicks"))
                .await,
            Err(Error::UnsupportedConfiguration(_))
        ));
    }

    #[test(tokio::test)]
    async fn too_few_consumers_for_the_group_count() {
        let (_, controller, _) = setup(2, kafka_config(3, ConsumerKind::HighLevel, None));

        assert!(matches!(
            controller
                .build_initial_stream_state(&ResourceName::from("clicks"))
                .await,
            Err(Error::InsufficientCapacity {
                needed: 3,
                available: 2
            })
        ));
    }
}
