// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Desired-state reconciliation engine.
//!
//! Each controller operation is invoked synchronously by a caller reacting
//! to a cluster event (segment published, instance joined/left, replication
//! changed, resource created), reads the current desired-state document
//! from the coordination store, applies a transformation in memory and
//! writes the result back. No component keeps durable state of its own
//! beyond the per-process [`sharding::StrategyCache`].
//!
//! Mutations to a given resource are serialized through a lock keyed by
//! resource name ([`resource_lock::ResourceLockTable`]); there is no
//! optimistic-concurrency protection on the store writes themselves, so a
//! caller that interleaves writes from outside this engine can still lose
//! updates.

mod error;
mod metric_definitions;

pub mod replica_scaler;
pub mod resource_lock;
pub mod routing;
pub mod segment_placement;
pub mod sharding;
pub mod stream_consumer;

pub use error::Error;
pub use metric_definitions::describe_metrics;
