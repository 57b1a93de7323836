// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Correlated access to server-side logs via the `hyper_log()` function.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ConnectionOptions;
use crate::transport::{Connect, Connection, Statement};
use crate::ScopeError;

/// Result rows produced by a scope's transport.
pub type ScopeRows<C> =
    <<<C as Connect>::Connection as Connection>::Statement as Statement>::Rows;

/// Isolates one logical session's server-side log entries from all others
/// sharing the same server.
///
/// The scope injects a unique workload name into its connection so that every
/// log entry the session produces can be correlated later. Queries run through
/// [`WorkloadScope::execute_query`] see a `hyper_log` CTE holding exactly the
/// entries tagged with this scope's identifier, so two scopes running
/// concurrently against one server never observe each other's activity.
///
/// A scope owns at most one connection, opened lazily on the first query and
/// reused afterwards, and at most one statement, replaced on every query. Both
/// are released by [`WorkloadScope::close`]. Mutating operations are not meant
/// to be invoked concurrently; create one scope per concurrent session
/// instead.
#[derive(Debug)]
pub struct WorkloadScope<C: Connect> {
    id: String,
    connector: C,
    connection: Option<C::Connection>,
    statement: Option<<C::Connection as Connection>::Statement>,
}

impl<C: Connect> WorkloadScope<C> {
    /// Creates a new scope around `connector` with a freshly generated
    /// workload identifier. No network resource is opened.
    pub fn new(connector: C) -> WorkloadScope<C> {
        WorkloadScope::with_id(connector, format!("test-log-scope-{}", Uuid::new_v4()))
    }

    fn with_id(connector: C, id: String) -> WorkloadScope<C> {
        WorkloadScope {
            id,
            connector,
            connection: None,
            statement: None,
        }
    }

    /// Returns the workload identifier tagging this scope's session.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns connection options that propagate this scope's workload
    /// identifier into the server-side logs.
    pub fn configuration(&self) -> ConnectionOptions {
        let mut options = ConnectionOptions::new();
        options.set(ConnectionOptions::WORKLOAD, self.id.as_str());
        options
    }

    /// Prefixes `query` with a `hyper_log` CTE exposing only the log entries
    /// tagged with this scope's workload identifier.
    ///
    /// The identifier can surface in a log record either as the workload
    /// context field or as a propagated request header, depending on which
    /// server code path produced the entry; both are checked. This is plain
    /// text composition, not a parser: `query` is not validated.
    pub fn format_query(&self, query: &str) -> String {
        format!(
            "WITH hyper_log AS (\n\
             SELECT * FROM hyper_log(current_session:=false,last_log_scope:=false) \n\
             WHERE ctx->'workload'->>'name' = '{id}' OR v->'headers'->>'x-hyperdb-workload' = '{id}'\n\
             ) {query}",
            id = self.id,
            query = query,
        )
    }

    /// Executes `query`, wrapped by [`WorkloadScope::format_query`], and
    /// returns the transport's result rows.
    ///
    /// The connection is opened lazily on the first call and reused
    /// afterwards. A fresh statement is created for every call; the statement
    /// left over from the previous call is closed first.
    pub async fn execute_query(&mut self, query: &str) -> Result<ScopeRows<C>, ScopeError> {
        let sql = self.format_query(query);

        if self.connection.is_none() {
            debug!(workload = %self.id, "opening workload connection");
            let connection = self
                .connector
                .open(&self.configuration())
                .await
                .map_err(ScopeError::Connect)?;
            self.connection = Some(connection);
        }
        let connection = self.connection.as_mut().expect("connection opened above");

        // Close the statement left over from the previous call.
        if let Some(mut statement) = self.statement.take() {
            statement.close().await.map_err(ScopeError::Statement)?;
        }

        let statement = connection
            .create_statement()
            .await
            .map_err(ScopeError::Statement)?;
        let statement = self.statement.insert(statement);
        statement.query(&sql).await.map_err(ScopeError::Query)
    }

    /// Releases the owned statement and connection, in that order.
    ///
    /// Safe to call more than once; resources released by an earlier call are
    /// skipped. If the statement close fails, the connection close is still
    /// attempted and the first failure is surfaced.
    pub async fn close(&mut self) -> Result<(), ScopeError> {
        let mut first_failure = None;
        if let Some(mut statement) = self.statement.take() {
            if let Err(error) = statement.close().await {
                first_failure = Some(error);
            }
        }
        if let Some(mut connection) = self.connection.take() {
            debug!(workload = %self.id, "closing workload connection");
            if let Err(error) = connection.close().await {
                match first_failure {
                    None => first_failure = Some(error),
                    Some(_) => {
                        warn!(workload = %self.id, "connection close also failed: {error:#}")
                    }
                }
            }
        }
        match first_failure {
            None => Ok(()),
            Some(error) => Err(ScopeError::Close(error)),
        }
    }
}

impl<C: Connect> Drop for WorkloadScope<C> {
    fn drop(&mut self) {
        if self.connection.is_some() || self.statement.is_some() {
            warn!(
                workload = %self.id,
                "workload scope dropped without close; releasing resources non-deterministically"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use proptest::prelude::*;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        ConnectionOpened { workload: Option<String> },
        ConnectionClosed,
        StatementCreated(usize),
        StatementClosed(usize),
        Queried(usize),
    }

    /// A transport that records lifecycle events and echoes the rewritten SQL
    /// back as its result rows.
    #[derive(Debug, Clone, Default)]
    struct TestConnector {
        events: Arc<Mutex<Vec<Event>>>,
        fail_statement_close: bool,
        fail_connection_close: bool,
    }

    impl TestConnector {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connect for TestConnector {
        type Connection = TestConnection;

        async fn open(
            &self,
            options: &ConnectionOptions,
        ) -> Result<TestConnection, anyhow::Error> {
            self.events.lock().unwrap().push(Event::ConnectionOpened {
                workload: options.workload().map(String::from),
            });
            Ok(TestConnection {
                events: Arc::clone(&self.events),
                next_statement: 0,
                fail_statement_close: self.fail_statement_close,
                fail_connection_close: self.fail_connection_close,
            })
        }
    }

    #[derive(Debug)]
    struct TestConnection {
        events: Arc<Mutex<Vec<Event>>>,
        next_statement: usize,
        fail_statement_close: bool,
        fail_connection_close: bool,
    }

    #[async_trait]
    impl Connection for TestConnection {
        type Statement = TestStatement;

        async fn create_statement(&mut self) -> Result<TestStatement, anyhow::Error> {
            let id = self.next_statement;
            self.next_statement += 1;
            self.events.lock().unwrap().push(Event::StatementCreated(id));
            Ok(TestStatement {
                id,
                events: Arc::clone(&self.events),
                fail_close: self.fail_statement_close,
            })
        }

        async fn close(&mut self) -> Result<(), anyhow::Error> {
            self.events.lock().unwrap().push(Event::ConnectionClosed);
            if self.fail_connection_close {
                anyhow::bail!("injected connection close failure");
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct TestStatement {
        id: usize,
        events: Arc<Mutex<Vec<Event>>>,
        fail_close: bool,
    }

    #[async_trait]
    impl Statement for TestStatement {
        type Rows = String;

        async fn query(&mut self, sql: &str) -> Result<String, anyhow::Error> {
            self.events.lock().unwrap().push(Event::Queried(self.id));
            Ok(sql.to_string())
        }

        async fn close(&mut self) -> Result<(), anyhow::Error> {
            self.events.lock().unwrap().push(Event::StatementClosed(self.id));
            if self.fail_close {
                anyhow::bail!("injected statement close failure");
            }
            Ok(())
        }
    }

    #[test]
    fn ids_are_unique() {
        let ids: BTreeSet<_> = (0..128)
            .map(|_| WorkloadScope::new(TestConnector::default()).id().to_string())
            .collect();
        assert_eq!(ids.len(), 128);
        for id in ids {
            assert!(id.starts_with("test-log-scope-"));
        }
    }

    #[test]
    fn configuration_carries_workload() {
        let scope = WorkloadScope::new(TestConnector::default());
        let options = scope.configuration();
        assert_eq!(options.workload(), Some(scope.id()));
        assert_eq!(options.len(), 1);
        // Pure and repeatable.
        assert_eq!(scope.configuration(), options);
    }

    #[test]
    fn format_query_matches_wire_contract() {
        let scope = WorkloadScope::with_id(
            TestConnector::default(),
            "test-log-scope-abc".to_string(),
        );
        assert_eq!(
            scope.format_query("select 1"),
            "WITH hyper_log AS (\n\
             SELECT * FROM hyper_log(current_session:=false,last_log_scope:=false) \n\
             WHERE ctx->'workload'->>'name' = 'test-log-scope-abc' OR v->'headers'->>'x-hyperdb-workload' = 'test-log-scope-abc'\n\
             ) select 1",
        );
    }

    proptest! {
        #[test]
        fn format_query_wraps_any_query(query in ".*") {
            let scope = WorkloadScope::with_id(
                TestConnector::default(),
                "test-log-scope-prop".to_string(),
            );
            let formatted = scope.format_query(&query);
            prop_assert!(formatted.starts_with("WITH hyper_log AS ("));
            prop_assert!(formatted.ends_with(&query));
            prop_assert!(formatted.contains("ctx->'workload'->>'name' = 'test-log-scope-prop'"));
            prop_assert!(
                formatted.contains("v->'headers'->>'x-hyperdb-workload' = 'test-log-scope-prop'")
            );
        }
    }

    #[tokio::test]
    async fn connection_reused_statement_replaced() {
        let connector = TestConnector::default();
        let mut scope = WorkloadScope::new(connector.clone());
        let workload = Some(scope.id().to_string());

        let rows = scope.execute_query("select 1").await.unwrap();
        assert!(rows.ends_with("select 1"));
        let rows = scope.execute_query("select 2").await.unwrap();
        assert!(rows.ends_with("select 2"));

        assert_eq!(
            connector.events(),
            vec![
                Event::ConnectionOpened { workload },
                Event::StatementCreated(0),
                Event::Queried(0),
                Event::StatementClosed(0),
                Event::StatementCreated(1),
                Event::Queried(1),
            ],
        );

        scope.close().await.unwrap();
        let events = connector.events();
        assert_eq!(
            events[events.len() - 2..],
            [Event::StatementClosed(1), Event::ConnectionClosed],
        );
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let connector = TestConnector::default();
        let mut scope = WorkloadScope::new(connector.clone());
        scope.execute_query("select 1").await.unwrap();

        scope.close().await.unwrap();
        let events = connector.events();
        scope.close().await.unwrap();
        assert_eq!(connector.events(), events);
    }

    #[tokio::test]
    async fn close_without_use_is_a_noop() {
        let connector = TestConnector::default();
        let mut scope = WorkloadScope::new(connector.clone());
        scope.close().await.unwrap();
        assert_eq!(connector.events(), vec![]);
    }

    #[tokio::test]
    async fn close_releases_connection_after_statement_failure() {
        let connector = TestConnector {
            fail_statement_close: true,
            ..Default::default()
        };
        let mut scope = WorkloadScope::new(connector.clone());
        scope.execute_query("select 1").await.unwrap();

        let error = scope.close().await.unwrap_err();
        assert!(matches!(error, ScopeError::Close(_)));
        // The connection close was still attempted.
        assert_eq!(
            connector.events().last(),
            Some(&Event::ConnectionClosed),
        );
        // And the scope is fully released: closing again is a no-op.
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn execute_after_close_reconnects() {
        let connector = TestConnector::default();
        let mut scope = WorkloadScope::new(connector.clone());
        scope.execute_query("select 1").await.unwrap();
        scope.close().await.unwrap();
        scope.execute_query("select 2").await.unwrap();
        scope.close().await.unwrap();

        let opens = connector
            .events()
            .iter()
            .filter(|event| matches!(event, Event::ConnectionOpened { .. }))
            .count();
        assert_eq!(opens, 2);
    }
}
