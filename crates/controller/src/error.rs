// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use strata_metadata_store::StoreError;
use strata_types::identifiers::InstanceIdError;
use strata_types::{ResourceName, SegmentId};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The segment is absent from the resource's partition map (or has no
    /// instances assigned) where presence was assumed.
    #[error("segment '{segment}' not found in resource '{resource}'")]
    SegmentNotFound {
        resource: ResourceName,
        segment: SegmentId,
    },
    /// The resource has no desired-state document or no configuration.
    #[error("resource '{0}' not found")]
    ResourceNotFound(ResourceName),
    /// Fewer eligible instances than required replicas. Callers may retry
    /// later once capacity was added; the engine does not.
    #[error("insufficient capacity: needed {needed} instances, {available} eligible")]
    InsufficientCapacity { needed: usize, available: usize },
    /// Deployment/configuration mismatch, e.g. an unrecognized streaming
    /// source or consumer mode. Fatal, not transient.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
    #[error("malformed instance id: {0}")]
    InvalidInstanceId(#[from] InstanceIdError),
    /// Collaborator I/O failure, propagated unchanged. The engine performs
    /// no retry and no rollback; after a failed write the stored state is
    /// unknown and must be re-read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    pub(crate) fn segment_not_found(resource: &ResourceName, segment: &SegmentId) -> Self {
        Error::SegmentNotFound {
            resource: resource.clone(),
            segment: segment.clone(),
        }
    }
}
