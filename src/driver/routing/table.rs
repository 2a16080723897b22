//! 라우팅 테이블
//!
//! 그래프 하나에 대한 읽기/쓰기 서버 목록과 만료 시각을 관리합니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::driver::address::Address;

/// 라우팅 테이블
///
/// `expiry` 가 `None` 이면 만료되지 않습니다 (라우팅을 지원하지 않는
/// 서버용 고정 테이블).
#[derive(Debug, Clone)]
pub struct RoutingTable {
    /// 읽기 서버 목록
    readers: Vec<Address>,
    /// 쓰기 서버 목록
    writers: Vec<Address>,
    /// 만료 시각
    expiry: Option<Instant>,
    /// 갱신 중 표시. 갱신하는 쪽이 잡고 있고 대기자는 풀릴 때까지 기다림
    update_lock: Arc<AsyncMutex<()>>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    /// 비어 있고 이미 만료된 테이블
    pub fn new() -> Self {
        Self {
            readers: Vec::new(),
            writers: Vec::new(),
            expiry: Some(Instant::now()),
            update_lock: Arc::new(AsyncMutex::new(())),
        }
    }

    /// `ttl` 뒤에 만료되는 테이블 (`None` 이면 만료 없음)
    pub fn with_runners(readers: Vec<Address>, writers: Vec<Address>, ttl: Option<Duration>) -> Self {
        Self {
            readers,
            writers,
            expiry: ttl.map(|ttl| Instant::now() + ttl),
            ..Self::new()
        }
    }

    pub fn readers(&self) -> &[Address] {
        &self.readers
    }

    pub fn writers(&self) -> &[Address] {
        &self.writers
    }

    pub fn expiry(&self) -> Option<Instant> {
        self.expiry
    }

    /// 만료 여부
    pub fn is_expired(&self) -> bool {
        self.expiry.map_or(false, |expiry| Instant::now() >= expiry)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.readers.contains(address) || self.writers.contains(address)
    }

    /// 읽기/쓰기 서버 (중복 제거, 처음 나온 순서)
    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = Vec::new();
        for address in self.readers.iter().chain(self.writers.iter()) {
            if !addresses.contains(address) {
                addresses.push(address.clone());
            }
        }
        addresses
    }

    /// 주소를 두 목록에서 모두 제거
    pub fn remove(&mut self, address: &Address) {
        self.readers.retain(|a| a != address);
        self.writers.retain(|a| a != address);
    }

    /// 다른 테이블의 내용으로 교체하고 빠진 주소를 돌려줌
    ///
    /// 갱신 잠금은 그대로 유지됩니다.
    pub fn replace(&mut self, other: RoutingTable) -> Vec<Address> {
        let dropped = self
            .addresses()
            .into_iter()
            .filter(|a| !other.contains(a))
            .collect();
        self.readers = other.readers;
        self.writers = other.writers;
        self.expiry = other.expiry;
        dropped
    }

    /// 갱신 중인지
    pub fn is_updating(&self) -> bool {
        self.update_lock.try_lock().is_err()
    }

    /// 갱신 권한 시도. 이미 누군가 갱신 중이면 `None`
    pub fn try_begin_update(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.update_lock).try_lock_owned().ok()
    }

    /// 갱신 권한 획득 (진행 중인 갱신이 끝날 때까지 대기)
    pub async fn begin_update(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.update_lock).lock_owned().await
    }

    /// 진행 중인 갱신이 끝날 때까지 대기
    pub async fn wait_until_updated(&self) {
        drop(self.update_lock.lock().await);
    }
}

// ============================================================================
// Tests
// ============================================================================
