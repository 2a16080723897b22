//! # graphbolt
//!
//! A client driver for graph databases that speak the Bolt protocol
//! (versions 1 through 4.3).
//!
//! ## Features
//!
//! - **PackStream** - Binary value codec with structure support
//! - **Versioned protocol** - One connection type adapts to the negotiated Bolt version
//! - **Connection pooling** - Per-server pools with age limits and overfill for routing
//! - **Cluster routing** - Routing tables per graph, refreshed on expiry, with reader ramp-up
//! - **Retries** - Transient failures and leader changes are retried within a time budget
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//!
//! use graphbolt::{AuthToken, Connector, DriverConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DriverConfig::new("bolt://localhost:7687", AuthToken::basic("neo4j", "password"))?;
//!     let connector = Connector::open(config).await?;
//!
//!     let mut cursor = connector
//!         .query("MATCH (n:Person) RETURN n.name AS name", HashMap::new(), None, None)
//!         .await?;
//!     for record in cursor.records()? {
//!         println!("{}", record.get_string("name")?);
//!     }
//!
//!     connector.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Transactions
//!
//! An explicit transaction holds its connection until it is committed or
//! rolled back:
//!
//! ```rust,no_run
//! # use graphbolt::{params, Connector, TransactionOptions};
//! # async fn example(connector: &Connector) -> Result<(), Box<dyn std::error::Error>> {
//! let mut tx = connector.begin(None, false, TransactionOptions::default()).await?;
//! connector.run(&mut tx, "CREATE (n:Node {id: $id})", params! {"id" => 1}, -1).await?;
//! connector.run(&mut tx, "CREATE (n:Node {id: $id})", params! {"id" => 2}, -1).await?;
//! let summary = connector.commit(&mut tx).await?;
//! println!("committed on {} with {:?}", summary.address, summary.bookmark);
//! # Ok(())
//! # }
//! ```
//!
//! ## Transaction Functions
//!
//! [`Connector::update`] retries the whole unit of work on transient errors:
//!
//! ```rust,no_run
//! # use futures::FutureExt;
//! # use graphbolt::{params, Connector};
//! # async fn example(connector: &Connector) -> Result<(), Box<dyn std::error::Error>> {
//! let created = connector
//!     .update(None, None, |cx, tx| {
//!         async move {
//!             let cursor = cx.run(tx, "CREATE (n:Node) RETURN n", params! {}, -1).await?;
//!             Ok(cursor.stats().nodes_created)
//!         }
//!         .boxed()
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - Connector, pools, routing, transactions and values
//! - [`bolt`] - Low-level Bolt protocol: PackStream, chunking, handshake, messages
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bolt;
pub mod driver;

// Re-exports for convenience
pub use driver::{
    Address, AuthToken, Bookmark, Connector, Cursor, DriverConfig, DriverConfigBuilder, DriverError,
    DriverResult, Neo4jError, Record, Transaction, TransactionOptions, TransactionSummary, Value,
};

pub use bolt::{BoltError, BoltVersion, PackStreamValue};

/// Config alias for convenience
pub type Config = DriverConfig;
