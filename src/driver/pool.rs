//! Connection Pool
//!
//! 서버 주소 하나에 대한 연결 풀

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::bolt::WireState;

use super::address::Address;
use super::bolt::{BoltConnection, ConnectionInfo, Dialer};
use super::config::DriverConfig;
use super::error::{DriverError, DriverResult};

// ============================================================================
// PoolState - 풀 내부 목록
// ============================================================================

#[derive(Default)]
struct PoolState {
    /// 최대 연결 수 (`None` 이면 제한 없음)
    max_size: Option<usize>,
    /// 유휴 연결들
    free: VecDeque<BoltConnection>,
    /// 사용 중인 연결들 (연결 자체는 호출자가 소유)
    in_use: Vec<ConnectionInfo>,
    /// 다이얼 중이거나 유휴 목록에서 꺼내 정리 중인 연결 수
    opening: usize,
    /// 통계 수집용: 이 풀이 연 연결들의 wire 상태
    opened: Vec<Arc<WireState>>,
    /// 닫힌 연결들의 누적 송신 바이트
    bytes_sent: u64,
    /// 닫힌 연결들의 누적 수신 바이트
    bytes_received: u64,
}

impl PoolState {
    fn size(&self) -> usize {
        self.in_use.len() + self.free.len() + self.opening
    }

    fn has_capacity(&self) -> bool {
        self.max_size.map_or(true, |max| self.size() < max)
    }

    /// 닫히거나 깨진 연결의 바이트 카운터를 누적값에 합산
    fn fold_closed(&mut self) {
        let (mut sent, mut received) = (0, 0);
        self.opened.retain(|wire| {
            if wire.is_closed() || wire.is_broken() {
                sent += wire.bytes_sent();
                received += wire.bytes_received();
                false
            } else {
                true
            }
        });
        self.bytes_sent += sent;
        self.bytes_received += received;
    }
}

// ============================================================================
// ConnectionPool - 연결 풀
// ============================================================================

/// 연결 풀
///
/// 사용 중인 연결은 호출자가 소유하고, 풀은 [`ConnectionInfo`] 로만
/// 추적합니다. `in_use + free` 는 `max_size` 를 넘지 않습니다
/// (`can_overfill` 획득 제외).
pub struct ConnectionPool {
    /// 서버 주소
    address: Address,
    /// 드라이버 설정
    config: Arc<DriverConfig>,
    /// 채널 생성기
    dialer: Arc<dyn Dialer>,
    /// 연결 최대 수명
    max_age: Duration,
    /// 풀 생성 시각
    created: Instant,
    /// 목록들
    state: Mutex<PoolState>,
    /// 마지막으로 본 서버 에이전트
    server_agent: Mutex<Option<String>>,
    /// 다중 데이터베이스 지원 여부
    supports_multi: AtomicBool,
}

impl ConnectionPool {
    /// 풀 생성 (`init_size` 만큼 연결을 미리 열어 둠)
    pub async fn open(address: Address, config: Arc<DriverConfig>, dialer: Arc<dyn Dialer>) -> DriverResult<Self> {
        let pool = Self::new(address, config, dialer);
        let mut seeds = Vec::with_capacity(pool.config.init_size);
        for _ in 0..pool.config.init_size {
            seeds.push(pool.acquire(false, false).await?);
        }
        for seed in seeds {
            pool.release(seed, false).await;
        }
        Ok(pool)
    }

    /// 연결 없이 풀 생성
    pub fn new(address: Address, config: Arc<DriverConfig>, dialer: Arc<dyn Dialer>) -> Self {
        let state = PoolState {
            max_size: config.max_size,
            ..PoolState::default()
        };
        Self {
            address,
            max_age: config.max_age,
            config,
            dialer,
            created: Instant::now(),
            state: Mutex::new(state),
            server_agent: Mutex::new(None),
            supports_multi: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// 마지막으로 본 서버 에이전트
    pub fn server_agent(&self) -> Option<String> {
        self.server_agent.lock().clone()
    }

    pub fn max_size(&self) -> Option<usize> {
        self.state.lock().max_size
    }

    pub fn set_max_size(&self, max_size: Option<usize>) {
        self.state.lock().max_size = max_size;
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// 사용 중인 연결 수
    pub fn in_use(&self) -> usize {
        self.state.lock().in_use.len()
    }

    /// 사용 중 + 유휴 연결 수
    pub fn size(&self) -> usize {
        let state = self.state.lock();
        state.in_use.len() + state.free.len()
    }

    /// 풀 수명
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn supports_multi(&self) -> bool {
        self.supports_multi.load(Ordering::Relaxed)
    }

    /// 누적 송신 바이트
    pub fn bytes_sent(&self) -> u64 {
        let state = self.state.lock();
        state.bytes_sent + state.opened.iter().map(|w| w.bytes_sent()).sum::<u64>()
    }

    /// 누적 수신 바이트
    pub fn bytes_received(&self) -> u64 {
        let state = self.state.lock();
        state.bytes_received + state.opened.iter().map(|w| w.bytes_received()).sum::<u64>()
    }

    /// 새 연결 열기
    ///
    /// 닫힌 연결들의 바이트 카운터를 먼저 누적값에 합산합니다.
    pub async fn connect(&self) -> DriverResult<BoltConnection> {
        self.state.lock().fold_closed();
        let cx = BoltConnection::open(&self.address, &self.config, self.dialer.as_ref()).await?;
        *self.server_agent.lock() = cx.server_agent().map(str::to_string);
        if cx.supports_multi() {
            self.supports_multi.store(true, Ordering::Relaxed);
        }
        self.state.lock().opened.push(cx.info().wire);
        Ok(cx)
    }

    /// 연결 획득
    ///
    /// 유휴 연결이 있으면 정리해서 돌려주고, 없으면 여유가 있을 때
    /// (또는 `can_overfill` 일 때) 새로 엽니다. 여유가 없으면
    /// [`DriverError::ConnectionLimit`].
    pub async fn acquire(&self, force_reset: bool, can_overfill: bool) -> DriverResult<BoltConnection> {
        debug!("Trying to acquire connection from pool {}", self);
        loop {
            let free = {
                let mut state = self.state.lock();
                if state.max_size == Some(0) {
                    debug!("Pool {} is set to zero size", self.address);
                    return Err(DriverError::connection_limit("Pool is set to zero size"));
                }
                let free = match state.free.pop_front() {
                    Some(cx) => Some(cx),
                    None if state.has_capacity() || can_overfill => None,
                    None => {
                        debug!("Pool {} is full with all connections in use", self.address);
                        return Err(DriverError::connection_limit("Pool is full"));
                    }
                };
                state.opening += 1;
                free
            };

            let acquired = match free {
                Some(cx) => self.sanitize(cx, force_reset).await,
                None => {
                    let opened = self.connect().await;
                    if opened.is_err() {
                        self.state.lock().opening -= 1;
                    }
                    Some(opened?)
                }
            };

            // 정리/다이얼 중 자리를 사용 중 목록으로 한 번에 옮김
            let mut state = self.state.lock();
            state.opening -= 1;
            let Some(cx) = acquired.filter(|cx| !cx.broken() && !cx.closed()) else {
                continue;
            };
            debug!("Connection {} acquired from pool {}", cx.id(), self.address);
            state.in_use.push(cx.info());
            return Ok(cx);
        }
    }

    /// 연결 반환
    ///
    /// 이 풀이 추적하지 않는 연결은 버립니다. 정리에 성공하고 여유가
    /// 남아 있으면 유휴 목록으로, 아니면 닫습니다.
    pub async fn release(&self, cx: BoltConnection, force_reset: bool) {
        debug!("Releasing connection {} to pool {}", cx.id(), self.address);
        let (tracked, has_capacity) = {
            let mut state = self.state.lock();
            let tracked = match state.in_use.iter().position(|info| info.id == cx.id()) {
                Some(index) => {
                    state.in_use.remove(index);
                    true
                }
                None => false,
            };
            (tracked, state.has_capacity())
        };
        if !tracked {
            debug!("Connection {} does not belong to pool {}", cx.id(), self.address);
            return;
        }
        cx.set_tag(None);

        let mut cx = if has_capacity {
            match self.sanitize(cx, force_reset).await {
                Some(cx) => cx,
                None => return,
            }
        } else {
            cx
        };

        {
            let mut state = self.state.lock();
            if has_capacity && state.has_capacity() {
                state.free.push_back(cx);
                return;
            }
        }
        cx.close().await;
    }

    /// 깨진 사용 중 연결은 잊고 유휴 연결은 모두 닫기
    pub async fn prune(&self) {
        let free: Vec<BoltConnection> = {
            let mut state = self.state.lock();
            state.in_use.retain(|info| {
                let broken = info.wire.is_broken();
                if broken {
                    debug!("Forgetting broken connection {}", info.id);
                }
                !broken
            });
            state.free.drain(..).collect()
        };
        for mut cx in free {
            cx.close().await;
        }
    }

    /// 풀 닫기
    ///
    /// 크기를 0 으로 만들고 정리한 뒤, 사용 중인 연결의 wire 도 닫힘으로
    /// 표시합니다. 소유자는 다음 작업에서 `ConnectionUnavailable` 을
    /// 받습니다. 여러 번 호출해도 안전합니다.
    pub async fn close(&self) {
        self.set_max_size(Some(0));
        self.prune().await;
        let in_use: Vec<ConnectionInfo> = self.state.lock().in_use.drain(..).collect();
        for info in in_use {
            info.wire.mark_closed();
        }
    }

    /// 재사용을 위한 연결 정리
    ///
    /// 깨졌거나 닫혔거나 `max_age` 를 넘긴 연결은 `None`. 그 외에는
    /// RESET 후 돌려줍니다.
    async fn sanitize(&self, mut cx: BoltConnection, force_reset: bool) -> Option<BoltConnection> {
        if cx.broken() || cx.closed() {
            return None;
        }
        if cx.age() > self.max_age {
            debug!("Connection {} expired after {:?}", cx.id(), cx.age());
            cx.close().await;
            return None;
        }
        match cx.reset(force_reset).await {
            Ok(()) if !cx.broken() && !cx.closed() => Some(cx),
            Ok(()) => None,
            Err(e) => {
                debug!("Connection {} could not be reset: {}", cx.id(), e);
                cx.close().await;
                None
            }
        }
    }
}

impl fmt::Display for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        let in_use = state.in_use.len();
        let free = state.free.len();
        let capacity = state.max_size.unwrap_or(in_use + free);
        let spare = capacity.saturating_sub(in_use + free);
        let tags: String = state.in_use.iter().map(|info| info.tag().unwrap_or('X')).collect();
        write!(
            f,
            "{} [{}{}{}] ({}/{})",
            self.address,
            tags,
            ".".repeat(free),
            " ".repeat(spare),
            in_use,
            capacity
        )
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("address", &self.address)
            .field("in_use", &self.in_use())
            .field("size", &self.size())
            .field("max_size", &self.max_size())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
