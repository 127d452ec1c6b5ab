// SPDX-License-Identifier: MIT
//
// Under Construction Gate: Maintenance-Mode Front for Websites
// Copyright (c) 2025 Under Construction Gate Contributors

//! Under Construction Core Library
//!
//! This crate provides the types and policy logic for a website maintenance-mode
//! gate: while the gate is enabled, page requests receive a static "under
//! construction" notice unless the visitor is allowed to bypass it.
//!
//! # Architecture
//!
//! The library is organized into modules representing core concerns:
//! - `settings`: The persisted configuration record and its key/value encoding
//! - `gate`: The access-gating policy evaluator
//! - `store`: Settings persistence (in-memory and YAML file)
//! - `notify`: Change notification and cache purging
//! - `markup`: Shortcode expansion for notice content
//! - `session`: Signed viewer sessions and CSRF tokens
//! - `config`: Gateway configuration management with validation
//! - `error`: Unified error types
//!
//! # Design Principles
//!
//! 1. **Explicit inputs**: The gate is a pure function of settings, viewer and request
//! 2. **Safe defaults**: Missing settings always read as a disabled gate
//! 3. **Injected collaborators**: Stores and purgers sit behind traits

pub mod config;
pub mod error;
pub mod gate;
pub mod markup;
pub mod metrics;
pub mod notice;
pub mod notify;
pub mod retry;
pub mod session;
pub mod settings;
pub mod store;

pub use error::{Error, Result};
pub use gate::{evaluate, Action, Decision, RequestInfo, Viewer};
pub use settings::{AccessMode, GateSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Role that bypasses the gate in `administrators` mode and may edit settings
pub const ADMIN_ROLE: &str = "administrator";
