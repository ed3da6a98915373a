// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Client contracts of the external coordination/metadata stores the
//! reconciliation engine reads from and writes to. The durable store itself
//! (a watchable hierarchical key-value store in the reference deployment)
//! lives outside this repository; an in-memory implementation is provided
//! behind the `test-util` feature.

#[cfg(feature = "test-util")]
mod in_memory;

#[cfg(feature = "test-util")]
pub use in_memory::{InMemoryMetadataStore, StoreOp};

use strata_types::config::ResourceConfig;
use strata_types::desired_state::DesiredStateDocument;
use strata_types::instance::InstanceMetadata;
use strata_types::{InstanceId, ResourceName, SegmentId, TenantTag};

/// Connectivity or serialization failure talking to a store. The engine
/// propagates these unchanged; callers own retry policy and must treat a
/// failed write as "state unknown, re-read before retrying".
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),
    #[error("failed to encode/decode stored value: {0}")]
    Codec(String),
}

/// Client of the coordination store holding desired-state documents and the
/// instance registry, including the administrative enable/disable surface.
#[allow(async_fn_in_trait)]
pub trait ClusterStore {
    async fn get_desired_state(
        &self,
        resource: &ResourceName,
    ) -> Result<Option<DesiredStateDocument>, StoreError>;

    async fn set_desired_state(
        &self,
        resource: &ResourceName,
        document: &DesiredStateDocument,
    ) -> Result<(), StoreError>;

    /// Instances eligible for the given tag, in registration order.
    async fn get_instances_with_tag(&self, tag: &TenantTag)
        -> Result<Vec<InstanceId>, StoreError>;

    /// Enables or disables the given partitions of `resource` on one
    /// instance via the administrative interface.
    async fn set_instance_enabled(
        &self,
        enabled: bool,
        resource: &ResourceName,
        instance: &InstanceId,
        partitions: &[SegmentId],
    ) -> Result<(), StoreError>;
}

/// Read-only client of the resource/table configuration store.
#[allow(async_fn_in_trait)]
pub trait ResourceConfigStore {
    async fn get_resource_config(
        &self,
        resource: &ResourceName,
    ) -> Result<Option<ResourceConfig>, StoreError>;
}

/// Client of the per-instance metadata records.
#[allow(async_fn_in_trait)]
pub trait InstanceMetadataStore {
    async fn get_instance_metadata(
        &self,
        instance: &InstanceId,
    ) -> Result<Option<InstanceMetadata>, StoreError>;

    async fn set_instance_metadata(&self, metadata: &InstanceMetadata) -> Result<(), StoreError>;
}
