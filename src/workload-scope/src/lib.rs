// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Per-session workload tagging and server log correlation.
//!
//! A [`WorkloadScope`] tags one logical session with a unique workload
//! identifier and retrieves, via a correlated query, only the server-side log
//! entries produced by that session. Sessions sharing a server stay isolated
//! from each other by running each under its own scope.
//!
//! The scope talks to the server through the [`transport`] seam; a
//! [`tokio_postgres`]-backed implementation lives in [`postgres`].

use thiserror::Error;

pub mod config;
pub mod postgres;
pub mod scope;
pub mod transport;

pub use crate::config::ConnectionOptions;
pub use crate::postgres::PostgresConnector;
pub use crate::scope::{ScopeRows, WorkloadScope};
pub use crate::transport::{Connect, Connection, Statement};

/// An error raised by a [`WorkloadScope`].
///
/// The scope never retries or swallows transport faults; the underlying cause
/// is carried in each variant and the caller decides whether to retry.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// Opening the scope's connection failed.
    #[error("failed to open workload connection: {0}")]
    Connect(anyhow::Error),
    /// Creating a statement, or closing a superseded one, failed.
    #[error("statement error: {0}")]
    Statement(anyhow::Error),
    /// Executing the correlated query failed.
    #[error("failed to execute query: {0}")]
    Query(anyhow::Error),
    /// Releasing the scope's resources failed.
    #[error("failed to release workload scope resources: {0}")]
    Close(anyhow::Error),
}
