// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::macros::string_id;

/// Name of the single cluster-wide routing resource. Its "segments" are
/// logical data-resource names rather than data segments.
pub const ROUTING_RESOURCE_NAME: &str = "routing_resource";

string_id!(
    /// A named, partitioned dataset tracked by one desired-state document.
    ResourceName
);

string_id!(
    /// An immutable unit of partitioned data, assigned to one or more
    /// serving instances.
    SegmentId
);

string_id!(
    /// Cluster-unique identifier of a serving instance. Instances register
    /// under a structured name of the form `<kind>_<host>_<port>`.
    InstanceId
);

string_id!(
    /// Label partitioning the instance pool into the subset eligible for a
    /// given resource.
    TenantTag
);

impl ResourceName {
    pub fn routing() -> Self {
        Self::from(ROUTING_RESOURCE_NAME)
    }

    pub fn is_routing(&self) -> bool {
        self.as_str() == ROUTING_RESOURCE_NAME
    }
}

impl From<&ResourceName> for SegmentId {
    fn from(value: &ResourceName) -> Self {
        SegmentId::from(value.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum InstanceIdError {
    #[error("instance id '{0}' is not of the form <kind>_<host>_<port>")]
    Malformed(InstanceId),
    #[error("instance id '{0}' carries a non-numeric port")]
    InvalidPort(InstanceId),
}

/// The structured parts of an [`InstanceId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceIdParts<'a> {
    pub kind: &'a str,
    pub host: &'a str,
    pub port: u16,
}

impl InstanceId {
    /// Decodes the structured `<kind>_<host>_<port>` registration name.
    pub fn parts(&self) -> Result<InstanceIdParts<'_>, InstanceIdError> {
        let fields: Vec<&str> = self.as_str().split('_').collect();
        let &[kind, host, port] = fields.as_slice() else {
            return Err(InstanceIdError::Malformed(self.clone()));
        };

        let port = port
            .parse()
            .map_err(|_| InstanceIdError::InvalidPort(self.clone()))?;

        Ok(InstanceIdParts { kind, host, port })
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn instance_id_parts() {
        let id = InstanceId::from("server_node-1.example.com_8097");
        let parts = id.parts().unwrap();

        assert_that!(parts.kind, eq("server"));
        assert_that!(parts.host, eq("node-1.example.com"));
        assert_that!(parts.port, eq(8097));
    }

    #[test]
    fn malformed_instance_id() {
        assert!(matches!(
            InstanceId::from("server-8097").parts(),
            Err(InstanceIdError::Malformed(_))
        ));
        assert!(matches!(
            InstanceId::from("server_host_http").parts(),
            Err(InstanceIdError::InvalidPort(_))
        ));
    }
}
