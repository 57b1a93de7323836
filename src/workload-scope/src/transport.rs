// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The transport seam between a [`WorkloadScope`] and the server.
//!
//! Connection establishment, query execution, and result-set materialization
//! are the transport's business; the scope only drives the lifecycle. All
//! blocking happens inside these methods. The intent is that you can implement
//! [`Connect`] with a Postgres wire-protocol client (see
//! [`crate::postgres`]), a gRPC channel, or an in-memory fake for tests.
//!
//! [`WorkloadScope`]: crate::scope::WorkloadScope

use std::fmt;

use async_trait::async_trait;

use crate::config::ConnectionOptions;

/// Opens connections to the server.
#[async_trait]
pub trait Connect: fmt::Debug + Send + Sync {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Opens a new connection carrying the given options.
    async fn open(&self, options: &ConnectionOptions)
        -> Result<Self::Connection, anyhow::Error>;
}

/// An open connection to the server.
#[async_trait]
pub trait Connection: fmt::Debug + Send {
    /// The statement type created by this connection.
    type Statement: Statement;

    /// Creates a new statement on this connection.
    async fn create_statement(&mut self) -> Result<Self::Statement, anyhow::Error>;

    /// Closes the connection. Must be idempotent.
    async fn close(&mut self) -> Result<(), anyhow::Error>;
}

/// A statement on which queries execute.
#[async_trait]
pub trait Statement: fmt::Debug + Send {
    /// Materialized result rows. Opaque to this crate.
    type Rows: Send;

    /// Executes `sql` and returns its result rows.
    async fn query(&mut self, sql: &str) -> Result<Self::Rows, anyhow::Error>;

    /// Closes the statement. Must be idempotent.
    async fn close(&mut self) -> Result<(), anyhow::Error>;
}
