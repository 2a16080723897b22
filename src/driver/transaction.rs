//! Transaction - 명시적 트랜잭션 핸들
//!
//! [`Transaction`] 은 커밋/롤백이 끝날 때까지 연결을 붙잡고 있습니다.
//! 쿼리 실행은 `Connector::run` 등을 통해 합니다.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::address::Address;
use super::bolt::BoltConnection;
use super::error::{DriverError, DriverResult};
use super::pool::ConnectionPool;
use super::task::{Bookmark, TransactionRef};

// ============================================================================
// TransactionSummary - 완료 요약
// ============================================================================

/// 커밋/롤백 결과
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionSummary {
    /// 커밋 북마크 (롤백이나 Bolt 1/2 에서는 비어 있음)
    pub bookmark: Bookmark,
    /// 트랜잭션을 처리한 서버
    pub address: Address,
    /// 시작부터 완료까지 걸린 시간
    pub time: Duration,
}

// ============================================================================
// Transaction - 트랜잭션
// ============================================================================

/// 명시적 트랜잭션
///
/// 연결을 돌려주지 않고 버려지면 강제 RESET 후 풀에 반환합니다
/// (tokio 런타임 안에서만).
pub struct Transaction {
    tx: TransactionRef,
    pool: Arc<ConnectionPool>,
    cx: Option<BoltConnection>,
}

impl Transaction {
    pub(crate) fn new(tx: TransactionRef, pool: Arc<ConnectionPool>, cx: BoltConnection) -> Self {
        Self {
            tx,
            pool,
            cx: Some(cx),
        }
    }

    /// 프로토콜 수준 트랜잭션 참조
    pub fn tx_ref(&self) -> &TransactionRef {
        &self.tx
    }

    pub fn id(&self) -> u64 {
        self.tx.id()
    }

    pub fn graph_name(&self) -> Option<&str> {
        self.tx.graph_name()
    }

    pub fn readonly(&self) -> bool {
        self.tx.readonly()
    }

    /// 연결 끊김 등으로 깨졌는지
    pub fn broken(&self) -> bool {
        self.tx.broken()
    }

    pub fn age(&self) -> Duration {
        self.tx.age()
    }

    /// 트랜잭션을 처리하는 서버
    pub fn address(&self) -> &Address {
        self.pool.address()
    }

    /// 연결을 아직 붙잡고 있고 트랜잭션이 살아 있는지
    pub fn is_open(&self) -> bool {
        self.cx
            .as_ref()
            .map_or(false, |cx| cx.transaction() == Some(&self.tx))
    }

    pub(crate) fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// 붙잡고 있는 연결
    pub(crate) fn connection(&mut self) -> DriverResult<&mut BoltConnection> {
        if self.tx.broken() {
            return Err(DriverError::connection_broken("Transaction is broken"));
        }
        self.cx
            .as_mut()
            .ok_or_else(|| DriverError::invalid_state(format!("Transaction {} is no longer open", self.tx.id())))
    }

    /// 연결을 떼어 냄 (반환은 호출자 책임)
    pub(crate) fn detach(&mut self) -> Option<BoltConnection> {
        self.cx.take()
    }

    pub(crate) fn summary(&self, bookmark: Bookmark) -> TransactionSummary {
        TransactionSummary {
            bookmark,
            address: self.pool.address().clone(),
            time: self.tx.age(),
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("tx", &self.tx)
            .field("address", self.pool.address())
            .field("attached", &self.cx.is_some())
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let Some(cx) = self.cx.take() else { return };
        debug!("Transaction {} dropped while open, releasing connection {}", self.tx.id(), cx.id());
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = Arc::clone(&self.pool);
                handle.spawn(async move { pool.release(cx, true).await });
            }
            Err(_) => cx.info().wire.mark_broken(),
        }
    }
}
