// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Canonical SQL text for catalog introspection against HyperDB-compatible
//! servers.
//!
//! The templates returned by [`CatalogQueries`] encode the exact shape of the
//! server's system catalog (`pg_namespace`, `pg_class`, `pg_attribute`,
//! `pg_description`) and produce rows in the column layout that generic client
//! tooling expects from the standard metadata operations. The text is part of
//! the wire contract: callers assert on literal substrings, so any change to
//! wording, casing, or clause order is a breaking change to dependents.
//!
//! Caller-substituted name patterns are expressed as Postgres positional
//! parameters (`$1`, `$2`) and must be bound at execution time.

/// The fixed catalog introspection queries, embedded at build time.
///
/// An explicitly constructed value rather than a process-wide registry:
/// construct one and pass it to whatever assembles metadata responses. The
/// templates live in `src/sql/` and are embedded with `include_str!`, so a
/// missing template is a compile error rather than a runtime fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogQueries {
    schemas: &'static str,
    tables: &'static str,
    columns: &'static str,
}

impl CatalogQueries {
    /// Loads the embedded catalog query templates.
    pub const fn new() -> CatalogQueries {
        CatalogQueries {
            schemas: include_str!("sql/schemas.sql"),
            tables: include_str!("sql/tables.sql"),
            columns: include_str!("sql/columns.sql"),
        }
    }

    /// Returns the query listing schemas.
    ///
    /// Projects the namespace name from `pg_catalog.pg_namespace`, filtered by
    /// a caller-bound name pattern (`$1`).
    pub fn schemas_query_text(&self) -> &'static str {
        self.schemas
    }

    /// Returns the query listing tables.
    ///
    /// Joins `pg_catalog.pg_namespace` and `pg_catalog.pg_class`, recovering
    /// comments through a left join against `pg_catalog.pg_description`.
    /// Covers ordinary, partitioned, foreign, and view-like relations.
    /// Caller-bound patterns: schema (`$1`) and table name (`$2`).
    pub fn tables_query_text(&self) -> &'static str {
        self.tables
    }

    /// Returns the query listing columns.
    ///
    /// Joins `pg_catalog.pg_namespace`, `pg_catalog.pg_class`, and
    /// `pg_catalog.pg_attribute`, restricted to the same relation kinds as
    /// [`CatalogQueries::tables_query_text`]. Caller-bound patterns: schema
    /// (`$1`) and table name (`$2`).
    pub fn columns_query_text(&self) -> &'static str {
        self.columns
    }
}

impl Default for CatalogQueries {
    fn default() -> CatalogQueries {
        CatalogQueries::new()
    }
}
