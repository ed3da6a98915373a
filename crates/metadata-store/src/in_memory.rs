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

use parking_lot::Mutex;

use strata_types::config::ResourceConfig;
use strata_types::desired_state::DesiredStateDocument;
use strata_types::instance::InstanceMetadata;
use strata_types::{InstanceId, ResourceName, SegmentId, TenantTag};

use crate::{ClusterStore, InstanceMetadataStore, ResourceConfigStore, StoreError};

/// One observable interaction with the store, in invocation order. Tests
/// use the log to assert the two-phase orderings (intermediate document
/// writes, persist-before-disable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    DocumentWrite {
        resource: ResourceName,
        document: DesiredStateDocument,
    },
    InstanceEnabled {
        enabled: bool,
        resource: ResourceName,
        instance: InstanceId,
        partitions: Vec<SegmentId>,
    },
}

/// In-memory stand-in for all collaborator stores.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadataStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<ResourceName, DesiredStateDocument>,
    configs: HashMap<ResourceName, ResourceConfig>,
    instances_by_tag: HashMap<TenantTag, Vec<InstanceId>>,
    instance_metadata: HashMap<InstanceId, InstanceMetadata>,
    op_log: Vec<StoreOp>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document without going through the logged write path.
    pub fn seed_document(&self, document: DesiredStateDocument) {
        let mut inner = self.inner.lock();
        inner
            .documents
            .insert(document.resource().clone(), document);
    }

    pub fn put_resource_config(&self, resource: ResourceName, config: ResourceConfig) {
        self.inner.lock().configs.insert(resource, config);
    }

    pub fn register_instances(
        &self,
        tag: TenantTag,
        instances: impl IntoIterator<Item = InstanceId>,
    ) {
        self.inner
            .lock()
            .instances_by_tag
            .entry(tag)
            .or_default()
            .extend(instances);
    }

    pub fn document(&self, resource: &ResourceName) -> Option<DesiredStateDocument> {
        self.inner.lock().documents.get(resource).cloned()
    }

    pub fn instance_metadata(&self, instance: &InstanceId) -> Option<InstanceMetadata> {
        self.inner.lock().instance_metadata.get(instance).cloned()
    }

    /// The full interaction log, in invocation order.
    pub fn operations(&self) -> Vec<StoreOp> {
        self.inner.lock().op_log.clone()
    }

    /// Every document version persisted for `resource`, oldest first.
    pub fn document_writes(&self, resource: &ResourceName) -> Vec<DesiredStateDocument> {
        self.inner
            .lock()
            .op_log
            .iter()
            .filter_map(|op| match op {
                StoreOp::DocumentWrite {
                    resource: written,
                    document,
                } if written == resource => Some(document.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ClusterStore for InMemoryMetadataStore {
    async fn get_desired_state(
        &self,
        resource: &ResourceName,
    ) -> Result<Option<DesiredStateDocument>, StoreError> {
        Ok(self.inner.lock().documents.get(resource).cloned())
    }

    async fn set_desired_state(
        &self,
        resource: &ResourceName,
        document: &DesiredStateDocument,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.documents.insert(resource.clone(), document.clone());
        inner.op_log.push(StoreOp::DocumentWrite {
            resource: resource.clone(),
            document: document.clone(),
        });
        Ok(())
    }

    async fn get_instances_with_tag(
        &self,
        tag: &TenantTag,
    ) -> Result<Vec<InstanceId>, StoreError> {
        Ok(self
            .inner
            .lock()
            .instances_by_tag
            .get(tag)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_instance_enabled(
        &self,
        enabled: bool,
        resource: &ResourceName,
        instance: &InstanceId,
        partitions: &[SegmentId],
    ) -> Result<(), StoreError> {
        self.inner.lock().op_log.push(StoreOp::InstanceEnabled {
            enabled,
            resource: resource.clone(),
            instance: instance.clone(),
            partitions: partitions.to_vec(),
        });
        Ok(())
    }
}

impl ResourceConfigStore for InMemoryMetadataStore {
    async fn get_resource_config(
        &self,
        resource: &ResourceName,
    ) -> Result<Option<ResourceConfig>, StoreError> {
        Ok(self.inner.lock().configs.get(resource).cloned())
    }
}

impl InstanceMetadataStore for InMemoryMetadataStore {
    async fn get_instance_metadata(
        &self,
        instance: &InstanceId,
    ) -> Result<Option<InstanceMetadata>, StoreError> {
        Ok(self.inner.lock().instance_metadata.get(instance).cloned())
    }

    async fn set_instance_metadata(&self, metadata: &InstanceMetadata) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner
            .instance_metadata
            .insert(metadata.instance_id(), metadata.clone());
        Ok(())
    }
}
