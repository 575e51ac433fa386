// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod config;
pub mod context;
pub mod converge;
pub mod error;
pub mod object_ref;
pub mod rabbitmqcluster_types;
pub mod reconciler;
pub mod resource;
pub mod shim_layer;
pub mod store;
pub mod synthesizer;

#[cfg(test)]
mod unit_tests;
