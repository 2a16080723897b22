//! Driver Module
//!
//! Bolt 연결 위의 클라이언트 계층: 연결 풀, 클러스터 라우팅, 재시도,
//! 결과 커서.
//!
//! # Layout
//!
//! - `bolt`: 서버 하나와의 Bolt 연결 ([`BoltConnection`])
//! - `pool`: 주소별 연결 풀 ([`ConnectionPool`])
//! - `routing`: 라우팅 테이블과 서버 선택 ([`Router`])
//! - `connector`: 위를 묶는 진입점 ([`Connector`])
//!
//! # Example
//!
//! ```ignore
//! use graphbolt::driver::{AuthToken, Connector, DriverConfig};
//! use graphbolt::params;
//!
//! let config = DriverConfig::new("neo4j://localhost:7687", AuthToken::basic("neo4j", "password"))?;
//! let connector = Connector::open(config).await?;
//!
//! // 자동 커밋 (재시도 포함)
//! let mut cursor = connector.query("MATCH (n) RETURN n LIMIT 10", params!{}, None, None).await?;
//! for record in cursor.records()? {
//!     println!("{}", record);
//! }
//!
//! // 명시적 트랜잭션
//! let mut tx = connector.begin(None, false, Default::default()).await?;
//! connector.run(&mut tx, "CREATE (n:Person {name: $name})", params!{"name" => "Alice"}, -1).await?;
//! let summary = connector.commit(&mut tx).await?;
//! println!("bookmark: {:?}", summary.bookmark);
//!
//! connector.close().await;
//! ```

pub mod bolt;
pub mod routing;
mod address;
mod config;
mod connector;
mod error;
mod hydration;
mod pool;
mod record;
mod retry;
mod task;
mod transaction;
mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use address::{Address, DEFAULT_HOST, DEFAULT_PORT};
pub use bolt::{BoltConnection, ConnectionInfo, Dialed, Dialer, TcpDialer};
pub use config::{default_user_agent, AuthToken, DriverConfig, DriverConfigBuilder, DEFAULT_SERVER_AGENT_PREFIX};
pub use connector::{Connector, MIN_RETRY_ATTEMPTS, READ_RETRY_DELAY, RETRY_SNOOZE, WRITE_RETRY_DELAY};
pub use error::{Classification, DriverError, DriverResult, Neo4jError};
pub use hydration::{Hydrator, StructureDecoder};
pub use pool::ConnectionPool;
pub use record::{Cursor, Record};
pub use retry::{RetryTimer, MAX_SNOOZE};
pub use routing::{Router, RoutingTable, ServerSelector};
pub use task::{
    Bookmark, ItemizedTask, QueryResult, ResponseHandle, ResponseStatus, Row, TransactionOptions, TransactionRef,
};
pub use transaction::{Transaction, TransactionSummary};
pub use types::{
    Duration, Node, Path, Point, Relationship, Structure, Time, UnboundRelationship, Value, ZonedDateTime,
    SRID_CARTESIAN_2D, SRID_CARTESIAN_3D, SRID_WGS84_2D, SRID_WGS84_3D,
};

/// 파라미터 맵 생성 매크로
#[macro_export]
macro_rules! params {
    () => {
        std::collections::HashMap::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = std::collections::HashMap::new();
        $(
            map.insert($key.into(), $crate::driver::Value::from($value));
        )+
        map
    }};
}
