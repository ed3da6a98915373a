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

use crate::identifiers::{InstanceId, InstanceIdError, ResourceName};

/// Per-instance metadata record kept in the coordination store.
///
/// Holds the streaming-consumer assignment (consumer group and partition)
/// per resource. Created on first assignment, overwritten whenever the
/// assignment is recomputed; never deleted by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub struct InstanceMetadata {
    pub kind: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    group_ids: HashMap<ResourceName, String>,
    #[serde(default)]
    partitions: HashMap<ResourceName, u32>,
}

impl InstanceMetadata {
    /// Bootstraps a record from the structured instance registration name.
    pub fn from_instance_id(instance: &InstanceId) -> Result<Self, InstanceIdError> {
        let parts = instance.parts()?;
        Ok(Self {
            kind: parts.kind.to_owned(),
            host: parts.host.to_owned(),
            port: parts.port,
            group_ids: HashMap::default(),
            partitions: HashMap::default(),
        })
    }

    pub fn instance_id(&self) -> InstanceId {
        InstanceId::new(format!("{}_{}_{}", self.kind, self.host, self.port))
    }

    pub fn set_group_id(&mut self, resource: &ResourceName, group_id: impl Into<String>) {
        self.group_ids.insert(resource.clone(), group_id.into());
    }

    pub fn set_partition(&mut self, resource: &ResourceName, partition: u32) {
        self.partitions.insert(resource.clone(), partition);
    }

    pub fn group_id(&self, resource: &ResourceName) -> Option<&str> {
        self.group_ids.get(resource).map(String::as_str)
    }

    pub fn partition(&self, resource: &ResourceName) -> Option<u32> {
        self.partitions.get(resource).copied()
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn bootstrap_roundtrips_the_instance_id() {
        let id = InstanceId::from("consumer_node-2_8098");
        let metadata = InstanceMetadata::from_instance_id(&id).unwrap();

        assert_that!(metadata.kind, eq("consumer"));
        assert_that!(metadata.port, eq(8098));
        assert_that!(metadata.instance_id(), eq(&id));
    }

    #[test]
    fn assignment_is_overwritten_per_resource() {
        let resource = ResourceName::from("clicks");
        let mut metadata =
            InstanceMetadata::from_instance_id(&InstanceId::from("consumer_h_1")).unwrap();

        metadata.set_group_id(&resource, "clicks_123_0");
        metadata.set_partition(&resource, 2);
        metadata.set_partition(&resource, 0);

        assert_that!(metadata.group_id(&resource), some(eq("clicks_123_0")));
        assert_that!(metadata.partition(&resource), some(eq(0)));
    }
}
