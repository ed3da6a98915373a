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

use crate::identifiers::TenantTag;

/// Placement algorithm used for new segments of a resource. Selected at
/// resource-creation time and immutable for the resource's lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize,
    derive_more::Display,
)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentStrategyKind {
    /// Uniform random selection from the eligible pool.
    #[default]
    Random,
    /// Least-loaded selection by current per-instance segment count.
    Balanced,
}

/// Configuration of one resource, read from the resource configuration
/// store. Read-only from the engine's perspective.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub struct ResourceConfig {
    /// Target replica count for newly placed segments. For streaming
    /// resources this is the number of redundant consumer groups.
    pub replication: u32,
    #[serde(default)]
    pub assignment_strategy: AssignmentStrategyKind,
    pub tenant: TenantTag,
    #[serde(default)]
    pub stream: Option<StreamSource>,
}

/// Streaming ingestion source of a resource.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub enum StreamSource {
    Kafka(KafkaStreamOptions),
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, derive_more::Display,
)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub enum ConsumerKind {
    /// Consumer-group based consumption; the engine assigns
    /// (group, partition) pairs to consumer instances.
    HighLevel,
    /// Direct per-partition consumption. Not supported by the engine.
    Simple,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub struct KafkaStreamOptions {
    pub topic: String,
    pub consumer_kind: ConsumerKind,
    /// Explicit consumer-group id. When unset (or empty) the engine derives
    /// a fresh one from the resource name.
    #[serde(default)]
    pub consumer_group_id: Option<String>,
    /// Options passed through to the consumer verbatim.
    #[serde(default)]
    pub additional_options: HashMap<String, String>,
}

impl KafkaStreamOptions {
    /// The configured group-id override, treating empty strings as unset.
    pub fn group_id_override(&self) -> Option<&str> {
        self.consumer_group_id
            .as_deref()
            .filter(|group_id| !group_id.is_empty())
    }
}
