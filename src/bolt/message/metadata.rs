//! Bolt protocol metadata types.
//!
//! Structured views over entries found in SUCCESS metadata and routing
//! procedure records.

use crate::bolt::packstream::{PackStreamMap, PackStreamValue};

/// Query statistics returned in SUCCESS after PULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Nodes created
    pub nodes_created: i64,
    /// Nodes deleted
    pub nodes_deleted: i64,
    /// Relationships created
    pub relationships_created: i64,
    /// Relationships deleted
    pub relationships_deleted: i64,
    /// Properties set
    pub properties_set: i64,
    /// Labels added
    pub labels_added: i64,
    /// Labels removed
    pub labels_removed: i64,
    /// Indexes added
    pub indexes_added: i64,
    /// Indexes removed
    pub indexes_removed: i64,
    /// Constraints added
    pub constraints_added: i64,
    /// Constraints removed
    pub constraints_removed: i64,
    /// System updates (only reported by the system graph)
    pub system_updates: i64,
    /// Contains updates, as reported by the server
    pub contains_updates: bool,
}

impl QueryStats {
    /// Parse the `stats` map. Missing counters are zero.
    pub fn from_map(map: &PackStreamMap) -> Self {
        let count = |key: &str| map.get(key).and_then(|v| v.as_int()).unwrap_or(0);
        let mut stats = Self {
            nodes_created: count("nodes-created"),
            nodes_deleted: count("nodes-deleted"),
            relationships_created: count("relationships-created"),
            relationships_deleted: count("relationships-deleted"),
            properties_set: count("properties-set"),
            labels_added: count("labels-added"),
            labels_removed: count("labels-removed"),
            indexes_added: count("indexes-added"),
            indexes_removed: count("indexes-removed"),
            constraints_added: count("constraints-added"),
            constraints_removed: count("constraints-removed"),
            system_updates: count("system-updates"),
            contains_updates: false,
        };
        stats.contains_updates = map
            .get("contains-updates")
            .and_then(|v| v.as_bool())
            .unwrap_or_else(|| stats.has_updates());
        stats
    }

    /// True if any counter is non-zero.
    pub fn has_updates(&self) -> bool {
        [
            self.nodes_created,
            self.nodes_deleted,
            self.relationships_created,
            self.relationships_deleted,
            self.properties_set,
            self.labels_added,
            self.labels_removed,
            self.indexes_added,
            self.indexes_removed,
            self.constraints_added,
            self.constraints_removed,
            self.system_updates,
        ]
        .iter()
        .any(|&n| n > 0)
    }
}

/// Server role in routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerRole {
    /// Read server
    Read,
    /// Write server
    Write,
    /// Route server (answers routing requests)
    Route,
}

impl ServerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerRole::Read => "READ",
            ServerRole::Write => "WRITE",
            ServerRole::Route => "ROUTE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "READ" => Some(ServerRole::Read),
            "WRITE" => Some(ServerRole::Write),
            "ROUTE" => Some(ServerRole::Route),
            _ => None,
        }
    }
}

/// Topology reported by a router, addresses still unparsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingInfo {
    pub routers: Vec<String>,
    pub readers: Vec<String>,
    pub writers: Vec<String>,
    /// Seconds the table may be used for
    pub ttl: i64,
}

impl RoutingInfo {
    /// Parse the `[ttl, servers]` row returned by the routing procedures.
    pub fn from_record(record: &[PackStreamValue]) -> Option<Self> {
        let ttl = record.first()?.as_int()?;
        let servers = record.get(1)?.as_list()?;
        Some(Self::from_parts(ttl, servers))
    }

    /// Parse the `rt` map from a ROUTE SUCCESS: `{ttl, servers, db}`.
    pub fn from_route_table(rt: &PackStreamValue) -> Option<Self> {
        let ttl = rt.get("ttl")?.as_int()?;
        let servers = rt.get("servers")?.as_list()?;
        Some(Self::from_parts(ttl, servers))
    }

    fn from_parts(ttl: i64, servers: &[PackStreamValue]) -> Self {
        let mut info = Self {
            ttl,
            ..Self::default()
        };
        for server in servers {
            let role = server.get("role").and_then(|v| v.as_str()).and_then(ServerRole::parse);
            let addresses = server
                .get("addresses")
                .and_then(|v| v.as_string_list())
                .unwrap_or_default();
            match role {
                Some(ServerRole::Route) => info.routers.extend(addresses),
                Some(ServerRole::Read) => info.readers.extend(addresses),
                Some(ServerRole::Write) => info.writers.extend(addresses),
                None => {}
            }
        }
        info
    }

    /// Servers list in wire form.
    pub fn servers(&self) -> PackStreamValue {
        let entry = |role: ServerRole, addresses: &[String]| {
            PackStreamValue::map([
                ("role", role.as_str().into()),
                ("addresses", addresses.to_vec().into()),
            ])
        };
        PackStreamValue::List(vec![
            entry(ServerRole::Route, &self.routers),
            entry(ServerRole::Read, &self.readers),
            entry(ServerRole::Write, &self.writers),
        ])
    }

    /// `rt` map in wire form, as a ROUTE SUCCESS carries it.
    pub fn to_route_table(&self, db: Option<&str>) -> PackStreamValue {
        PackStreamValue::map([
            ("ttl", self.ttl.into()),
            ("servers", self.servers()),
            ("db", db.into()),
        ])
    }
}
