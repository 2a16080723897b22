//! 라우팅 정책
//!
//! 후보 풀 중 어떤 순서로 연결을 시도할지 정합니다. 새로 합류한
//! 서버는 [`RAMP_UP_AGE`] 동안 [`RAMP_UP_PROBABILITY`] 확률로만
//! 후보에 들어가고, 나머지는 사용 중 연결이 적은 순으로 시도합니다.

use std::sync::Arc;
use std::time::Duration;

use crate::driver::pool::ConnectionPool;

/// 이 나이 미만의 풀은 램프업 대상
pub const RAMP_UP_AGE: Duration = Duration::from_secs(60);

/// 램프업 중인 풀이 후보로 남을 확률
pub const RAMP_UP_PROBABILITY: f64 = 0.1;

/// 선택에 필요한 풀 부하 정보
pub trait PoolLoad {
    /// 풀 수명
    fn age(&self) -> Duration;
    /// 사용 중인 연결 수
    fn in_use(&self) -> usize;
}

impl PoolLoad for Arc<ConnectionPool> {
    fn age(&self) -> Duration {
        ConnectionPool::age(self)
    }

    fn in_use(&self) -> usize {
        ConnectionPool::in_use(self)
    }
}

/// 서버 선택기
#[derive(Debug, Clone, Copy)]
pub struct ServerSelector {
    ramp_up_age: Duration,
    ramp_up_probability: f64,
}

impl Default for ServerSelector {
    fn default() -> Self {
        Self {
            ramp_up_age: RAMP_UP_AGE,
            ramp_up_probability: RAMP_UP_PROBABILITY,
        }
    }
}

impl ServerSelector {
    /// 시도 순서대로 정렬된 후보
    pub fn order<P: PoolLoad>(&self, pools: Vec<P>) -> Vec<P> {
        self.order_with(pools, rand::random::<f64>)
    }

    /// `sample` 로 램프업 추첨을 하는 [`order`](Self::order)
    pub fn order_with<P: PoolLoad>(&self, pools: Vec<P>, mut sample: impl FnMut() -> f64) -> Vec<P> {
        let mut pools = if pools.iter().any(|p| p.age() >= self.ramp_up_age) {
            pools
                .into_iter()
                .filter(|p| p.age() >= self.ramp_up_age || sample() < self.ramp_up_probability)
                .collect()
        } else {
            pools
        };
        pools.sort_by_key(|p| p.in_use());
        pools
    }
}

// ============================================================================
// Tests
// ============================================================================
