// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use metrics::{describe_counter, Unit};

pub(crate) const CONTROLLER_SEGMENT_PLACEMENTS_TOTAL: &str =
    "strata.controller.segment_placements.total";
pub(crate) const CONTROLLER_SEGMENT_DROPS_TOTAL: &str = "strata.controller.segment_drops.total";
pub(crate) const CONTROLLER_REPLICA_SCALINGS_TOTAL: &str =
    "strata.controller.replica_scalings.total";
pub(crate) const CONTROLLER_ROUTING_UPDATES_TOTAL: &str = "strata.controller.routing_updates.total";
pub(crate) const CONTROLLER_STREAM_ASSIGNMENTS_TOTAL: &str =
    "strata.controller.stream_assignments.total";

pub fn describe_metrics() {
    describe_counter!(
        CONTROLLER_SEGMENT_PLACEMENTS_TOTAL,
        Unit::Count,
        "Number of segment placement/update operations applied to desired state"
    );

    describe_counter!(
        CONTROLLER_SEGMENT_DROPS_TOTAL,
        Unit::Count,
        "Number of segment drop/remove operations applied to desired state"
    );

    describe_counter!(
        CONTROLLER_REPLICA_SCALINGS_TOTAL,
        Unit::Count,
        "Number of replica scaling operations applied to desired state"
    );

    describe_counter!(
        CONTROLLER_ROUTING_UPDATES_TOTAL,
        Unit::Count,
        "Number of routing assignment updates applied to the routing resource"
    );

    describe_counter!(
        CONTROLLER_STREAM_ASSIGNMENTS_TOTAL,
        Unit::Count,
        "Number of stream consumer assignment rounds persisted to instance metadata"
    );
}
