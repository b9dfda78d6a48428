// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # AEGIS Governor Core
//!
//! Policy evaluation engine for cloud and infrastructure-as-code resources.
//!
//! # Architecture
//!
//! - **domain:** resource model, predicate engine, actions, resource graph
//! - **application:** execution-mode dispatcher and admission decisions
//! - **infrastructure:** backend adapters, paged source, manifest parsing
//! - **presentation:** admission webhook API

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
