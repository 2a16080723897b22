//! Client side of a Bolt session.
//!
//! ```text
//! Connector
//!   └── ConnectionPool
//!         └── BoltConnection (Wire + ProtocolSpec)
//!               └── Dialer (TCP, TLS, in-memory)
//! ```

pub mod connection;
pub mod dialer;

pub use connection::{
    BoltConnection, ConnectionInfo, CLUSTER_ROUTING_QUERY, ROUTING_QUERY, ROUTING_QUERY_FOR_DATABASE,
    SYSTEM_GRAPH,
};
pub use dialer::{Dialed, Dialer, TcpDialer};
