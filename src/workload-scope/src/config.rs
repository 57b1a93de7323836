// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Connection configuration propagated to the server by a transport.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named connection options handed to [`Connect::open`].
///
/// Exactly one option is recognized by HyperDB-compatible servers:
/// [`ConnectionOptions::WORKLOAD`]. The transport propagates its value into
/// the server's session context and, where requests leave the session, into
/// the outbound `x-hyperdb-workload` request header.
///
/// [`Connect::open`]: crate::transport::Connect::open
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    options: BTreeMap<String, String>,
}

impl ConnectionOptions {
    /// The option carrying the workload identifier of a session.
    pub const WORKLOAD: &'static str = "workload";

    /// Creates an empty set of options.
    pub fn new() -> ConnectionOptions {
        ConnectionOptions::default()
    }

    /// Sets option `name` to `value`, replacing any previous value.
    pub fn set<N, V>(&mut self, name: N, value: V)
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.options.insert(name.into(), value.into());
    }

    /// Returns the value of option `name`, if set.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(|value| value.as_str())
    }

    /// Returns the workload identifier, if set.
    pub fn workload(&self) -> Option<&str> {
        self.get(ConnectionOptions::WORKLOAD)
    }

    /// Iterates over all options in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Reports whether no options are set.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Returns the number of options set.
    pub fn len(&self) -> usize {
        self.options.len()
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionOptions;

    #[test]
    fn set_and_get() {
        let mut options = ConnectionOptions::new();
        assert!(options.is_empty());
        assert_eq!(options.workload(), None);

        options.set(ConnectionOptions::WORKLOAD, "w-1");
        assert_eq!(options.workload(), Some("w-1"));
        assert_eq!(options.len(), 1);

        options.set(ConnectionOptions::WORKLOAD, "w-2");
        assert_eq!(options.workload(), Some("w-2"));
        assert_eq!(options.len(), 1);

        let collected: Vec<_> = options.iter().collect();
        assert_eq!(collected, vec![("workload", "w-2")]);
    }
}
