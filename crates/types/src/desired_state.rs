// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::BTreeMap;

use crate::identifiers::{InstanceId, ResourceName, SegmentId, TenantTag};

/// Target lifecycle state of a segment on one instance.
///
/// Per (segment, instance) pair the state machine is
/// `∅ → Online ⇄ Offline → Dropped → ∅`: `Dropped` is a terminal marker the
/// data plane observes before the pair is erased entirely; re-adding a
/// segment after removal starts a fresh lifecycle at `Online`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    derive_more::Display,
    strum::EnumIs,
)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub enum SegmentState {
    Online,
    Offline,
    Dropped,
}

/// Target replica count per segment. The routing resource is unbounded
/// (every instance may serve every resource).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, derive_more::Display,
)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub enum ReplicaCount {
    Unbounded,
    #[display("{_0}")]
    Factor(u32),
}

impl ReplicaCount {
    pub fn factor(&self) -> Option<u32> {
        match self {
            ReplicaCount::Unbounded => None,
            ReplicaCount::Factor(count) => Some(*count),
        }
    }
}

/// The controller-computed target assignment of segments to instances for
/// one resource, distinct from the actually-observed runtime state. Written
/// to the coordination store; serving instances react to the state
/// transitions it encodes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub struct DesiredStateDocument {
    resource: ResourceName,
    partitions: BTreeMap<SegmentId, BTreeMap<InstanceId, SegmentState>>,
    /// Count of tracked segments; recomputed after every mutation, never
    /// asserted independently.
    num_partitions: u32,
    num_replicas: ReplicaCount,
    instance_group_tag: TenantTag,
}

impl DesiredStateDocument {
    pub fn new(resource: ResourceName, num_replicas: ReplicaCount, tag: TenantTag) -> Self {
        Self {
            resource,
            partitions: BTreeMap::default(),
            num_partitions: 0,
            num_replicas,
            instance_group_tag: tag,
        }
    }

    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    pub fn num_replicas(&self) -> ReplicaCount {
        self.num_replicas
    }

    pub fn instance_group_tag(&self) -> &TenantTag {
        &self.instance_group_tag
    }

    pub fn segment_ids(&self) -> impl Iterator<Item = &SegmentId> {
        self.partitions.keys()
    }

    pub fn contains_segment(&self, segment: &SegmentId) -> bool {
        self.partitions.contains_key(segment)
    }

    /// All instances currently assigned to the segment, in any state.
    pub fn instance_set(&self, segment: &SegmentId) -> Vec<InstanceId> {
        self.partitions
            .get(segment)
            .map(|instances| instances.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn instance_states(
        &self,
        segment: &SegmentId,
    ) -> Option<&BTreeMap<InstanceId, SegmentState>> {
        self.partitions.get(segment)
    }

    pub fn state_of(&self, segment: &SegmentId, instance: &InstanceId) -> Option<SegmentState> {
        self.partitions
            .get(segment)
            .and_then(|instances| instances.get(instance))
            .copied()
    }

    pub fn online_instances(&self, segment: &SegmentId) -> Vec<InstanceId> {
        self.partitions
            .get(segment)
            .map(|instances| {
                instances
                    .iter()
                    .filter(|(_, state)| state.is_online())
                    .map(|(instance, _)| instance.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn segments(
        &self,
    ) -> impl Iterator<Item = (&SegmentId, &BTreeMap<InstanceId, SegmentState>)> {
        self.partitions.iter()
    }

    pub fn into_builder(self) -> DesiredStateBuilder {
        DesiredStateBuilder::from(self)
    }
}

/// A single state write applied through a [`DesiredStateBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub segment: SegmentId,
    pub instance: InstanceId,
    pub state: SegmentState,
}

/// Mutation handle over a [`DesiredStateDocument`].
///
/// Records every state write in order, so the deliberate
/// `Online → Offline → Online` pulse transitions stay observable even when
/// the final instance set is unchanged, and tracks whether the document was
/// modified at all so unchanged documents skip the store write.
#[derive(Debug)]
pub struct DesiredStateBuilder {
    inner: DesiredStateDocument,
    modified: bool,
    transitions: Vec<Transition>,
}

impl DesiredStateBuilder {
    pub fn set_state(&mut self, segment: &SegmentId, instance: &InstanceId, state: SegmentState) {
        self.inner
            .partitions
            .entry(segment.clone())
            .or_default()
            .insert(instance.clone(), state);
        self.inner.num_partitions = self.inner.partitions.len() as u32;

        self.transitions.push(Transition {
            segment: segment.clone(),
            instance: instance.clone(),
            state,
        });
        self.modified = true;
    }

    /// Erases the segment entirely from the partition map.
    pub fn remove_segment(&mut self, segment: &SegmentId) -> bool {
        let removed = self.inner.partitions.remove(segment).is_some();
        if removed {
            self.inner.num_partitions = self.inner.partitions.len() as u32;
            self.modified = true;
        }
        removed
    }

    pub fn set_num_replicas(&mut self, num_replicas: ReplicaCount) {
        if self.inner.num_replicas != num_replicas {
            self.inner.num_replicas = num_replicas;
            self.modified = true;
        }
    }

    pub fn document(&self) -> &DesiredStateDocument {
        &self.inner
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn build(self) -> DesiredStateDocument {
        self.inner
    }

    pub fn build_if_modified(self) -> Option<DesiredStateDocument> {
        self.modified.then_some(self.inner)
    }
}

impl From<DesiredStateDocument> for DesiredStateBuilder {
    fn from(value: DesiredStateDocument) -> Self {
        Self {
            inner: value,
            modified: false,
            transitions: Vec::new(),
        }
    }
}
