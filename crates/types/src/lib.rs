// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! This crate contains the core types shared by the strata components.

mod macros;

pub mod config;
pub mod desired_state;
pub mod identifiers;
pub mod instance;
pub mod segment;
pub mod time;

pub use identifiers::{InstanceId, ResourceName, SegmentId, TenantTag};
