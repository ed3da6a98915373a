// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::identifiers::{ResourceName, SegmentId};
use crate::time::MillisSinceEpoch;

/// Catalog metadata of a published segment, as handed to the placement
/// controller when the segment becomes (or is re-published as) part of a
/// resource.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub struct SegmentMetadata {
    pub name: SegmentId,
    pub resource: ResourceName,
    /// Content checksum; differs between two pushes of the same segment id.
    #[serde(default)]
    pub crc: Option<u64>,
    #[serde(default)]
    pub push_time: Option<MillisSinceEpoch>,
}

impl SegmentMetadata {
    pub fn new(resource: impl Into<ResourceName>, name: impl Into<SegmentId>) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            crc: None,
            push_time: None,
        }
    }
}
