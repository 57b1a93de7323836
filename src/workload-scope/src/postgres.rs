// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A [`tokio_postgres`]-backed implementation of the transport seam.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, Row};
use tracing::warn;

use crate::config::ConnectionOptions;
use crate::transport::{Connect, Connection, Statement};

/// Connects to a HyperDB-compatible server over the Postgres wire protocol.
///
/// [`ConnectionOptions`] are forwarded as server options (`-c name=value`);
/// the server propagates the `workload` option into its session context and
/// outbound request headers. TLS is left to the embedding application.
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    config: tokio_postgres::Config,
}

impl PostgresConnector {
    /// Creates a connector around a base connection configuration.
    pub fn new(config: tokio_postgres::Config) -> PostgresConnector {
        PostgresConnector { config }
    }
}

#[async_trait]
impl Connect for PostgresConnector {
    type Connection = PostgresConnection;

    async fn open(
        &self,
        options: &ConnectionOptions,
    ) -> Result<PostgresConnection, anyhow::Error> {
        let mut config = self.config.clone();
        let mut server_options = config.get_options().unwrap_or("").to_string();
        for (name, value) in options.iter() {
            if !server_options.is_empty() {
                server_options.push(' ');
            }
            server_options.push_str(&format!("-c {}={}", name, value));
        }
        if !server_options.is_empty() {
            config.options(server_options.as_str());
        }

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(db_error)
            .context("failed to connect")?;
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                warn!("postgres connection failed: {error}");
            }
        });
        Ok(PostgresConnection {
            client: Some(Arc::new(client)),
        })
    }
}

/// An open Postgres wire-protocol connection.
///
/// The connection driver runs on a spawned task and exits once every handle to
/// the client is gone; [`Connection::close`] drops this connection's handle.
pub struct PostgresConnection {
    client: Option<Arc<Client>>,
}

#[async_trait]
impl Connection for PostgresConnection {
    type Statement = PostgresStatement;

    async fn create_statement(&mut self) -> Result<PostgresStatement, anyhow::Error> {
        let client = self.client.as_ref().context("connection is closed")?;
        Ok(PostgresStatement {
            client: Some(Arc::clone(client)),
        })
    }

    async fn close(&mut self) -> Result<(), anyhow::Error> {
        self.client = None;
        Ok(())
    }
}

impl fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("closed", &self.client.is_none())
            .finish()
    }
}

/// A statement executing queries over its connection's client.
pub struct PostgresStatement {
    client: Option<Arc<Client>>,
}

#[async_trait]
impl Statement for PostgresStatement {
    type Rows = Vec<Row>;

    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, anyhow::Error> {
        let client = self.client.as_ref().context("statement is closed")?;
        client.query(sql, &[]).await.map_err(db_error)
    }

    async fn close(&mut self) -> Result<(), anyhow::Error> {
        self.client = None;
        Ok(())
    }
}

impl fmt::Debug for PostgresStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresStatement")
            .field("closed", &self.client.is_none())
            .finish()
    }
}

/// Surfaces server-reported detail and hint alongside the error message.
fn db_error(error: tokio_postgres::Error) -> anyhow::Error {
    let context = error.as_db_error().map(|db| {
        let mut parts = vec![format!("database error: {}", db.message())];
        if let Some(detail) = db.detail() {
            parts.push(format!("detail: {}", detail));
        }
        if let Some(hint) = db.hint() {
            parts.push(format!("hint: {}", hint));
        }
        parts.join("; ")
    });
    match context {
        Some(context) => anyhow::Error::new(error).context(context),
        None => anyhow::Error::new(error),
    }
}
