//! 라우팅 모듈
//!
//! 클러스터 모드(`neo4j://`)에서 그래프별 라우팅 테이블과 라우터
//! 목록을 관리합니다. 테이블 갱신 자체(라우터에 묻기)는
//! `Connector` 가 하고, [`Router`] 는 결과를 저장합니다.

mod policy;
mod table;

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::address::Address;

pub use policy::{PoolLoad, ServerSelector, RAMP_UP_AGE, RAMP_UP_PROBABILITY};
pub use table::RoutingTable;

/// 그래프 이름 (`None` 은 기본 그래프)
pub type GraphKey = Option<String>;

fn graph_label(graph_name: Option<&str>) -> String {
    match graph_name {
        Some(name) => format!("graph {:?}", name),
        None => "default graph".to_string(),
    }
}

/// 현재 테이블에서 읽은 서버 목록
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Runners {
    pub readers: Vec<Address>,
    pub writers: Vec<Address>,
    pub expired: bool,
}

impl Runners {
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty() && self.writers.is_empty()
    }
}

#[derive(Debug, Default)]
struct RouterState {
    routers: Vec<Address>,
    tables: HashMap<GraphKey, RoutingTable>,
}

/// 라우터 목록과 그래프별 라우팅 테이블
#[derive(Debug, Default)]
pub struct Router {
    state: Mutex<RouterState>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// 알려진 라우터 목록
    pub fn routers(&self) -> Vec<Address> {
        self.state.lock().routers.clone()
    }

    /// 그래프의 테이블 (없으면 만료된 빈 테이블을 만듦)
    ///
    /// 반환값은 갱신 잠금을 공유하는 스냅샷입니다.
    pub fn table(&self, graph_name: Option<&str>) -> RoutingTable {
        let mut state = self.state.lock();
        state
            .tables
            .entry(graph_name.map(str::to_string))
            .or_insert_with(|| {
                debug!("Creating new routing table for {}", graph_label(graph_name));
                RoutingTable::new()
            })
            .clone()
    }

    /// 현재 읽기/쓰기 서버와 만료 여부
    pub fn runners(&self, graph_name: Option<&str>) -> Runners {
        let table = self.table(graph_name);
        Runners {
            readers: table.readers().to_vec(),
            writers: table.writers().to_vec(),
            expired: table.is_expired(),
        }
    }

    /// 테이블 폐기 (다음 사용 시 새로 갱신)
    pub fn invalidate_routing_table(&self, graph_name: Option<&str>) {
        let key = graph_name.map(str::to_string);
        if self.state.lock().tables.remove(&key).is_some() {
            debug!("Invalidated routing table for {}", graph_label(graph_name));
        }
    }

    /// 새 토폴로지 설치
    ///
    /// 라우터 목록과 테이블에서 빠진 주소를 돌려줍니다. `ttl` 이
    /// `None` 이면 만료되지 않는 테이블이 됩니다.
    pub fn update(
        &self,
        graph_name: Option<&str>,
        routers: Vec<Address>,
        readers: Vec<Address>,
        writers: Vec<Address>,
        ttl: Option<Duration>,
    ) -> Vec<Address> {
        let mut state = self.state.lock();
        let table = RoutingTable::with_runners(readers, writers, ttl);
        let mut dropped: Vec<Address> = state
            .routers
            .iter()
            .filter(|a| !routers.contains(a) && !table.contains(a))
            .cloned()
            .collect();
        debug!(
            "Routing table for {}: readers={:?} writers={:?} ttl={:?}",
            graph_label(graph_name),
            table.readers(),
            table.writers(),
            ttl
        );
        match state.tables.get_mut(&graph_name.map(str::to_string)) {
            Some(existing) => {
                for address in existing.replace(table) {
                    if !dropped.contains(&address) && !routers.contains(&address) {
                        dropped.push(address);
                    }
                }
            }
            None => {
                state.tables.insert(graph_name.map(str::to_string), table);
            }
        }
        state.routers = routers;
        dropped
    }

    /// 깨진 서버를 라우터 목록과 모든 테이블에서 제거
    pub fn set_broken(&self, address: &Address) {
        let mut state = self.state.lock();
        debug!("Removing {} from router list", address);
        state.routers.retain(|a| a != address);
        for (graph_name, table) in state.tables.iter_mut() {
            if table.contains(address) {
                debug!("Removing {} from routing table for {}", address, graph_label(graph_name.as_deref()));
                table.remove(address);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
