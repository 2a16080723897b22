//! Connector - 풀과 라우팅을 묶는 진입점
//!
//! 서버 주소마다 [`ConnectionPool`] 하나를 두고, 라우팅 모드에서는
//! [`Router`] 로 그래프별 읽기/쓰기 서버를 고릅니다.
//!
//! ```text
//! Connector
//!   ├── pools: Address → ConnectionPool
//!   ├── router: graph → RoutingTable (라우팅 모드)
//!   └── acquire_ro / acquire_rw → BoltConnection
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::bolt::{PackStreamMap, RoutingInfo};

use super::address::Address;
use super::bolt::{BoltConnection, Dialer, TcpDialer, SYSTEM_GRAPH};
use super::config::DriverConfig;
use super::error::{DriverError, DriverResult};
use super::pool::ConnectionPool;
use super::record::Cursor;
use super::retry::RetryTimer;
use super::routing::{Router, Runners, ServerSelector};
use super::task::{QueryResult, TransactionOptions};
use super::transaction::{Transaction, TransactionSummary};
use super::types::Value;

/// 읽기 풀이 가득 찼을 때 재시도 전 대기
pub const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// 쓰기 서버를 기다릴 때(리더 선출 등) 재시도 전 대기
pub const WRITE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// `query`/`update` 재시도 사이 기본 대기 단위
pub const RETRY_SNOOZE: Duration = Duration::from_millis(100);

/// `query`/`update` 최소 시도 횟수
pub const MIN_RETRY_ATTEMPTS: usize = 3;

/// 후보 서버가 모두 연결에 실패한 라운드를 몇 번까지 견딜지
const MAX_FAILED_ROUNDS: usize = 3;

fn graph_label(graph_name: Option<&str>) -> String {
    match graph_name {
        Some(name) => format!("graph {:?}", name),
        None => "default graph".to_string(),
    }
}

// ============================================================================
// Connector
// ============================================================================

/// 연결 풀 묶음과 라우터
pub struct Connector {
    config: Arc<DriverConfig>,
    dialer: Arc<dyn Dialer>,
    /// 설정에 적힌 초기 라우터
    initial_routers: Vec<Address>,
    pools: Mutex<HashMap<Address, Arc<ConnectionPool>>>,
    /// 라우팅 모드에서만 존재
    router: Option<Router>,
    selector: ServerSelector,
    closed: AtomicBool,
}

impl Connector {
    /// TCP 로 연결하는 Connector
    pub async fn open(config: DriverConfig) -> DriverResult<Self> {
        Self::new(config, Arc::new(TcpDialer)).await
    }

    /// Connector 생성
    ///
    /// 초기 주소의 풀을 만들고, 라우팅 모드이면 기본 그래프의 라우팅
    /// 테이블을 바로 가져옵니다.
    pub async fn new(config: DriverConfig, dialer: Arc<dyn Dialer>) -> DriverResult<Self> {
        config.validate()?;
        if config.secure && !dialer.secure() {
            return Err(DriverError::configuration(
                "A secure URI scheme requires a dialer that produces encrypted channels",
            ));
        }
        let routing = config.routing;
        let connector = Self {
            initial_routers: vec![config.address.clone()],
            config: Arc::new(config),
            dialer,
            pools: Mutex::new(HashMap::new()),
            router: routing.then(Router::new),
            selector: ServerSelector::default(),
            closed: AtomicBool::new(false),
        };
        for address in connector.initial_routers.clone() {
            connector.pool(&address).await;
        }
        if routing {
            connector.refresh_routing_table(None).await?;
        }
        Ok(connector)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 라우팅 모드 여부
    pub fn is_routing(&self) -> bool {
        self.router.is_some()
    }

    /// 라우터 (라우팅 모드에서만)
    pub fn router(&self) -> Option<&Router> {
        self.router.as_ref()
    }

    /// 풀이 있는 주소들
    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.pools.lock().keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// 주소의 풀 (없으면 만듦)
    pub async fn pool(&self, address: &Address) -> Arc<ConnectionPool> {
        if let Some(pool) = self.pools.lock().get(address) {
            return Arc::clone(pool);
        }
        debug!("Adding connection pool for {}", address);
        let pool = match ConnectionPool::open(address.clone(), Arc::clone(&self.config), Arc::clone(&self.dialer)).await
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Could not seed connection pool for {}: {}", address, e);
                ConnectionPool::new(address.clone(), Arc::clone(&self.config), Arc::clone(&self.dialer))
            }
        };
        Arc::clone(
            self.pools
                .lock()
                .entry(address.clone())
                .or_insert_with(|| Arc::new(pool)),
        )
    }

    /// 마지막으로 본 서버 에이전트 (아무 풀에서나)
    pub fn server_agent(&self) -> Option<String> {
        self.pools.lock().values().find_map(|pool| pool.server_agent())
    }

    /// 주소별 사용 중인 연결 수
    pub fn in_use(&self) -> HashMap<Address, usize> {
        self.pools
            .lock()
            .iter()
            .map(|(address, pool)| (address.clone(), pool.in_use()))
            .collect()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.pools.lock().values().map(|pool| pool.bytes_sent()).sum()
    }

    pub fn bytes_received(&self) -> u64 {
        self.pools.lock().values().map(|pool| pool.bytes_received()).sum()
    }

    /// 모든 풀이 다중 데이터베이스를 지원하는지
    pub fn supports_multi(&self) -> bool {
        let pools = self.pools.lock();
        !pools.is_empty() && pools.values().all(|pool| pool.supports_multi())
    }

    /// 그래프의 라우팅 테이블 폐기
    pub fn invalidate_routing_table(&self, graph_name: Option<&str>) {
        if let Some(router) = &self.router {
            router.invalidate_routing_table(graph_name);
        }
    }

    /// 유휴 연결을 닫고, 라우팅 모드에서 풀이 비면 풀을 제거
    pub async fn prune(&self, address: &Address) {
        debug!("Pruning idle connections to {}", address);
        let pool = self.pools.lock().get(address).cloned();
        let Some(pool) = pool else { return };
        pool.prune().await;
        if self.router.is_some() && pool.size() == 0 {
            debug!("Removing connection pool for {}", address);
            self.pools.lock().remove(address);
        }
    }

    /// 모든 풀 닫기
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        let pools: Vec<Arc<ConnectionPool>> = self.pools.lock().values().cloned().collect();
        for pool in pools {
            pool.close().await;
        }
    }

    fn assert_open(&self) -> DriverResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(DriverError::connection_unavailable("Connector has been closed"));
        }
        Ok(())
    }

    /// 연결 실패 처리. 끊긴 경우 라우팅 테이블에서도 제거
    async fn on_connection_failure(&self, address: &Address, broken: bool) {
        debug!("Connection to {} failed (broken={})", address, broken);
        if broken {
            if let Some(router) = &self.router {
                router.set_broken(address);
            }
        }
        self.prune(address).await;
    }

    /// 작업이 끝난 연결을 풀에 돌려주고, 연결 실패였다면 정리
    async fn release_after<T>(
        &self,
        pool: &Arc<ConnectionPool>,
        cx: BoltConnection,
        outcome: DriverResult<T>,
    ) -> DriverResult<T> {
        pool.release(cx, false).await;
        if let Err(e) = &outcome {
            if e.is_connection_failure() {
                let broken = matches!(e, DriverError::ConnectionBroken(_));
                self.on_connection_failure(pool.address(), broken).await;
            }
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    /// 라우팅 테이블 갱신 (진행 중인 갱신이 있으면 끝난 뒤에)
    pub async fn refresh_routing_table(&self, graph_name: Option<&str>) -> DriverResult<()> {
        let router = self
            .router
            .as_ref()
            .ok_or_else(|| DriverError::invalid_state("Routing is not enabled for this connector"))?;
        let table = router.table(graph_name);
        let _updating = table.begin_update().await;
        self.refresh_locked(router, graph_name).await
    }

    /// 라우터들에게 차례로 물어 처음 성공한 답을 설치
    async fn refresh_locked(&self, router: &Router, graph_name: Option<&str>) -> DriverResult<()> {
        debug!("Attempting to refresh routing table for {}", graph_label(graph_name));
        let mut known = router.routers();
        for address in &self.initial_routers {
            if !known.contains(address) {
                known.push(address.clone());
            }
        }
        debug!("Known routers are: {:?}", known);

        let context: PackStreamMap = self
            .config
            .routing_context
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().into()))
            .collect();

        for address in known {
            debug!("Asking {} for routing table", address);
            let pool = self.pool(&address).await;
            let mut cx = match pool.acquire(false, true).await {
                Ok(cx) => cx,
                Err(e) => {
                    debug!("Router {} unavailable: {}", address, e);
                    if e.is_connection_failure() {
                        self.prune(&address).await;
                    }
                    continue;
                }
            };
            let routed = cx.route(graph_name, &context).await;
            pool.release(cx, false).await;
            match routed {
                Ok(info) => {
                    self.install(router, graph_name, info).await;
                    return Ok(());
                }
                Err(DriverError::RoutingNotSupported(message)) => {
                    debug!("{} does not support routing ({}), using it for everything", address, message);
                    router.update(
                        graph_name,
                        vec![address.clone()],
                        vec![address.clone()],
                        vec![address],
                        None,
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!("Failed to fetch routing table from {}: {}", address, e);
                    if e.is_connection_failure() {
                        self.prune(&address).await;
                    }
                }
            }
        }
        Err(DriverError::service_unavailable("Cannot connect to any known routers"))
    }

    async fn install(&self, router: &Router, graph_name: Option<&str>, info: RoutingInfo) {
        let parse = |addresses: &[String]| -> Vec<Address> {
            addresses
                .iter()
                .filter_map(|s| match Address::parse(s) {
                    Ok(address) => Some(address),
                    Err(e) => {
                        warn!("Ignoring routing table entry {:?}: {}", s, e);
                        None
                    }
                })
                .collect()
        };
        let routers = parse(&info.routers);
        let readers = parse(&info.readers);
        let writers = parse(&info.writers);
        let ttl = self
            .config
            .routing_refresh_ttl
            .unwrap_or_else(|| Duration::from_secs(u64::try_from(info.ttl).unwrap_or(0)));

        for address in routers.iter().chain(readers.iter()).chain(writers.iter()) {
            self.pool(address).await;
        }
        let dropped = router.update(graph_name, routers, readers, writers, Some(ttl));
        for address in dropped {
            self.prune(&address).await;
        }
    }

    /// 현재 읽기/쓰기 서버. 테이블이 만료됐거나 원하는 쪽 목록이 비었으면 갱신
    ///
    /// 다른 호출자가 갱신 중이면, 원하는 쪽 목록이 남아 있을 때는 그대로
    /// 쓰고 아니면 갱신이 끝날 때까지 기다립니다. 읽기는 쓰기 서버로도
    /// 대신할 수 있습니다.
    async fn runners(&self, graph_name: Option<&str>, readonly: bool) -> DriverResult<Runners> {
        let Some(router) = &self.router else {
            let all = self.addresses();
            return Ok(Runners {
                readers: all.clone(),
                writers: all,
                expired: false,
            });
        };
        loop {
            let runners = router.runners(graph_name);
            let usable = if readonly {
                !runners.is_empty()
            } else {
                !runners.writers.is_empty()
            };
            if !runners.expired && usable {
                return Ok(runners);
            }
            let table = router.table(graph_name);
            match table.try_begin_update() {
                Some(_updating) => {
                    self.refresh_locked(router, graph_name).await?;
                    return Ok(router.runners(graph_name));
                }
                None if usable => return Ok(runners),
                None => table.wait_until_updated().await,
            }
        }
    }

    async fn pools_for(&self, addresses: &[Address]) -> Vec<Arc<ConnectionPool>> {
        let mut pools = Vec::with_capacity(addresses.len());
        for address in addresses {
            pools.push(self.pool(address).await);
        }
        pools
    }

    /// 읽기용 연결 획득
    ///
    /// 읽기 서버가 없으면 쓰기 서버를 씁니다. 둘 다 없으면
    /// [`DriverError::ServiceUnavailable`].
    pub(crate) async fn acquire_ro(&self, graph_name: Option<&str>) -> DriverResult<(Arc<ConnectionPool>, BoltConnection)> {
        debug!("Attempting to acquire readonly connection to {}", graph_label(graph_name));
        let mut failed_rounds = 0;
        loop {
            self.assert_open()?;
            if failed_rounds >= MAX_FAILED_ROUNDS {
                return Err(DriverError::service_unavailable(format!(
                    "Unable to connect to any server for {}",
                    graph_label(graph_name)
                )));
            }
            let runners = self.runners(graph_name, true).await?;
            let targets = if !runners.readers.is_empty() {
                runners.readers
            } else if !runners.writers.is_empty() {
                runners.writers
            } else {
                return Err(DriverError::service_unavailable("No servers available"));
            };

            let pools = self.selector.order(self.pools_for(&targets).await);
            let mut unreachable = 0;
            let candidates = pools.len();
            for pool in pools {
                debug!("Using connection pool {}", pool);
                match pool.acquire(false, false).await {
                    Ok(cx) => {
                        cx.set_tag(Some('R'));
                        return Ok((pool, cx));
                    }
                    Err(e @ (DriverError::ConnectionUnavailable(_) | DriverError::ConnectionBroken(_))) => {
                        if self.router.is_none() {
                            return Err(e);
                        }
                        unreachable += 1;
                        self.on_connection_failure(pool.address(), true).await;
                    }
                    Err(DriverError::ConnectionLimit(_)) => {
                        if pool.size() == 0 {
                            self.prune(pool.address()).await;
                        }
                        tokio::time::sleep(READ_RETRY_DELAY).await;
                    }
                    Err(e) => return Err(e),
                }
            }
            if unreachable == candidates {
                failed_rounds += 1;
            }
        }
    }

    /// 쓰기용 연결 획득
    ///
    /// 쓰기 서버 없이 읽기 서버만 있으면 리더 선출 중으로 보고 잠시
    /// 기다립니다.
    pub(crate) async fn acquire_rw(&self, graph_name: Option<&str>) -> DriverResult<(Arc<ConnectionPool>, BoltConnection)> {
        debug!("Attempting to acquire read-write connection to {}", graph_label(graph_name));
        let mut failed_rounds = 0;
        loop {
            self.assert_open()?;
            if failed_rounds >= MAX_FAILED_ROUNDS {
                return Err(DriverError::WriteServiceUnavailable(format!(
                    "Unable to connect to a writer for {}",
                    graph_label(graph_name)
                )));
            }
            let runners = self.runners(graph_name, false).await?;
            let pools = if !runners.writers.is_empty() {
                self.selector.order(self.pools_for(&runners.writers).await)
            } else if !runners.readers.is_empty() {
                debug!("No writers available for {}, waiting for election", graph_label(graph_name));
                failed_rounds += 1;
                Vec::new()
            } else {
                return Err(DriverError::service_unavailable("No servers available"));
            };

            for pool in pools {
                debug!("Using connection pool {}", pool);
                match pool.acquire(false, false).await {
                    Ok(cx) => {
                        cx.set_tag(Some('W'));
                        return Ok((pool, cx));
                    }
                    Err(e @ (DriverError::ConnectionUnavailable(_) | DriverError::ConnectionBroken(_))) => {
                        if self.router.is_none() {
                            return Err(e);
                        }
                        failed_rounds += 1;
                        self.on_connection_failure(pool.address(), true).await;
                        break;
                    }
                    Err(DriverError::ConnectionLimit(_)) => {
                        if pool.size() == 0 {
                            self.prune(pool.address()).await;
                            return Err(DriverError::service_unavailable(
                                "Write server pool is set to zero size",
                            ));
                        }
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
            tokio::time::sleep(WRITE_RETRY_DELAY).await;
        }
    }

    async fn acquire(&self, graph_name: Option<&str>, readonly: bool) -> DriverResult<(Arc<ConnectionPool>, BoltConnection)> {
        if readonly {
            self.acquire_ro(graph_name).await
        } else {
            self.acquire_rw(graph_name).await
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// 자동 커밋 트랜잭션에서 쿼리 실행
    ///
    /// 모든 레코드를 받아 둔 뒤 연결을 풀에 돌려줍니다.
    pub async fn auto_run(
        &self,
        query: &str,
        params: HashMap<String, Value>,
        graph_name: Option<&str>,
        readonly: bool,
    ) -> DriverResult<Cursor> {
        let params = self.config.hydrator.dehydrate_map(params)?;
        let (pool, mut cx) = self.acquire(graph_name, readonly).await?;
        let outcome = run_to_end(&mut cx, query, params, graph_name, readonly).await;
        let result = self.release_after(&pool, cx, outcome).await?;
        Ok(Cursor::new(result, Arc::clone(&self.config.hydrator)))
    }

    /// 명시적 트랜잭션 시작
    pub async fn begin(
        &self,
        graph_name: Option<&str>,
        readonly: bool,
        options: TransactionOptions,
    ) -> DriverResult<Transaction> {
        let (pool, mut cx) = self.acquire(graph_name, readonly).await?;
        match cx.begin(graph_name, readonly, options).await {
            Ok(tx) => Ok(Transaction::new(tx, pool, cx)),
            Err(e) => self.release_after(&pool, cx, Err(e)).await,
        }
    }

    /// 트랜잭션 안에서 쿼리 실행
    ///
    /// `pull` 이 0 이 아니면 그만큼(`-1` 은 전부) 레코드를 받아 둡니다.
    pub async fn run(
        &self,
        tx: &mut Transaction,
        query: &str,
        params: HashMap<String, Value>,
        pull: i64,
    ) -> DriverResult<Cursor> {
        let params = self.config.hydrator.dehydrate_map(params)?;
        let tx_ref = tx.tx_ref().clone();
        let cx = tx.connection()?;
        let outcome = async {
            let result = cx.run(&tx_ref, query, params).await?;
            if pull != 0 {
                cx.pull(&result, pull, None).await?;
            }
            Ok::<_, DriverError>(result)
        }
        .await;
        match outcome {
            Ok(result) => Ok(Cursor::new(result, Arc::clone(&self.config.hydrator))),
            Err(e) => self.after_tx_failure(tx, e).await,
        }
    }

    /// 트랜잭션 안의 결과에서 레코드를 더 받음
    pub async fn pull(&self, tx: &mut Transaction, cursor: &Cursor, n: i64) -> DriverResult<()> {
        if n == 0 {
            return Ok(());
        }
        let cx = tx.connection()?;
        match cx.pull(cursor.result(), n, None).await {
            Ok(_) => Ok(()),
            Err(e) => self.after_tx_failure(tx, e).await,
        }
    }

    /// 트랜잭션 안의 결과에서 남은 레코드를 버림
    pub async fn discard(&self, tx: &mut Transaction, cursor: &Cursor) -> DriverResult<()> {
        let cx = tx.connection()?;
        match cx.discard(cursor.result()).await {
            Ok(_) => Ok(()),
            Err(e) => self.after_tx_failure(tx, e).await,
        }
    }

    /// 트랜잭션 커밋. 성공 여부와 관계없이 연결은 풀로 돌아갑니다.
    pub async fn commit(&self, tx: &mut Transaction) -> DriverResult<TransactionSummary> {
        tx.connection()?;
        let pool = Arc::clone(tx.pool());
        let Some(mut cx) = tx.detach() else {
            return Err(DriverError::invalid_state("Transaction is no longer open"));
        };
        let outcome = cx.commit(tx.tx_ref()).await;
        let bookmark = self.release_after(&pool, cx, outcome).await?;
        Ok(tx.summary(bookmark))
    }

    /// 트랜잭션 롤백. 이미 서버에서 끝난 트랜잭션이면 아무것도 보내지 않습니다.
    pub async fn rollback(&self, tx: &mut Transaction) -> DriverResult<TransactionSummary> {
        let pool = Arc::clone(tx.pool());
        let Some(mut cx) = tx.detach() else {
            if tx.broken() {
                return Err(DriverError::connection_broken("Transaction is broken"));
            }
            return Ok(tx.summary(Default::default()));
        };
        let outcome = cx.rollback(tx.tx_ref()).await;
        let bookmark = self.release_after(&pool, cx, outcome).await?;
        Ok(tx.summary(bookmark))
    }

    /// 트랜잭션 작업이 실패한 뒤 정리
    ///
    /// 서버가 트랜잭션을 끝냈거나 연결이 끊겼으면 연결을 풀에 돌려줍니다.
    async fn after_tx_failure<T>(&self, tx: &mut Transaction, e: DriverError) -> DriverResult<T> {
        let tx_ref = tx.tx_ref().clone();
        let finished = match tx.connection() {
            Ok(cx) => cx.broken() || cx.closed() || cx.transaction() != Some(&tx_ref),
            Err(_) => true,
        };
        if finished {
            if let Some(cx) = tx.detach() {
                let pool = Arc::clone(tx.pool());
                return self.release_after(&pool, cx, Err(e)).await;
            }
        }
        Err(e)
    }

    // ------------------------------------------------------------------
    // Retrying entry points
    // ------------------------------------------------------------------

    /// 읽기 전용 자동 커밋 쿼리 (재시도 포함)
    ///
    /// 연결 실패, Transient 에러, NotALeader 는 재시도합니다. 예산을 다
    /// 쓰면 [`DriverError::ServiceUnavailable`].
    pub async fn query(
        &self,
        query: &str,
        params: HashMap<String, Value>,
        graph_name: Option<&str>,
        timeout: Option<Duration>,
    ) -> DriverResult<Cursor> {
        let budget = timeout.unwrap_or(self.config.max_retry_time);
        let mut timer = RetryTimer::repeat(MIN_RETRY_ATTEMPTS, budget).with_snooze(RETRY_SNOOZE);
        while timer.next_attempt().await {
            match self.auto_run(query, params.clone(), graph_name, true).await {
                Ok(cursor) => return Ok(cursor),
                Err(e) => self.check_retry(graph_name, e)?,
            }
        }
        Err(DriverError::service_unavailable(format!(
            "Failed to execute query after {} tries",
            timer.attempts()
        )))
    }

    /// 쓰기 트랜잭션 함수 실행 (재시도 포함)
    ///
    /// `work` 가 실패하면 롤백합니다. 예산을 다 쓰면
    /// [`DriverError::WriteServiceUnavailable`].
    ///
    /// ```rust,ignore
    /// connector
    ///     .update(None, None, |cx, tx| {
    ///         Box::pin(async move {
    ///             cx.run(tx, "CREATE (n:Person {name: $name})", params! {"name" => "Alice"}, -1)
    ///                 .await?;
    ///             Ok(())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn update<F, T>(&self, graph_name: Option<&str>, timeout: Option<Duration>, mut work: F) -> DriverResult<T>
    where
        F: for<'a> FnMut(&'a Connector, &'a mut Transaction) -> BoxFuture<'a, DriverResult<T>>,
    {
        let budget = timeout.unwrap_or(self.config.max_retry_time);
        let mut timer = RetryTimer::repeat(MIN_RETRY_ATTEMPTS, budget).with_snooze(RETRY_SNOOZE);
        while timer.next_attempt().await {
            let mut tx = match self.begin(graph_name, false, TransactionOptions::default()).await {
                Ok(tx) => tx,
                Err(e) => {
                    self.check_retry(graph_name, e)?;
                    continue;
                }
            };
            let outcome = match work(self, &mut tx).await {
                Ok(value) => self.commit(&mut tx).await.map(|_| value),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if let Err(rollback) = self.rollback(&mut tx).await {
                        debug!("Rollback after failed update also failed: {}", rollback);
                    }
                    self.check_retry(graph_name, e)?;
                }
            }
        }
        Err(DriverError::WriteServiceUnavailable(format!(
            "Failed to execute update after {} tries",
            timer.attempts()
        )))
    }

    /// 재시도할 에러면 `Ok`, 아니면 에러를 그대로 돌려줌
    fn check_retry(&self, graph_name: Option<&str>, e: DriverError) -> DriverResult<()> {
        if let DriverError::Server(error) = &e {
            if error.should_invalidate_routing_table() {
                self.invalidate_routing_table(graph_name);
            }
        }
        if e.is_retryable() {
            debug!("Retrying after {}", e);
            Ok(())
        } else {
            Err(e)
        }
    }

    /// 프로시저 호출 (`CALL name($p0, $p1, ...)`)
    pub async fn call(
        &self,
        procedure: &str,
        args: Vec<Value>,
        graph_name: Option<&str>,
        readonly: bool,
    ) -> DriverResult<Cursor> {
        let placeholders: Vec<String> = (0..args.len()).map(|i| format!("$p{}", i)).collect();
        let query = format!("CALL {}({})", procedure, placeholders.join(", "));
        let params = args
            .into_iter()
            .enumerate()
            .map(|(i, value)| (format!("p{}", i), value))
            .collect();
        self.auto_run(&query, params, graph_name, readonly).await
    }

    // ------------------------------------------------------------------
    // Databases
    // ------------------------------------------------------------------

    async fn show_databases(&self) -> DriverResult<Option<Cursor>> {
        if self.server_agent().is_none() {
            // 아직 연결한 적이 없으면 버전을 알 수 없으므로 한 번 연결해 봄
            let (pool, cx) = self.acquire_ro(None).await?;
            pool.release(cx, false).await;
        }
        if !self.supports_multi() {
            return Ok(None);
        }
        self.auto_run("SHOW DATABASES", HashMap::new(), Some(SYSTEM_GRAPH), true)
            .await
            .map(Some)
    }

    /// 사용할 수 있는 그래프 이름 (다중 데이터베이스 미지원 서버는 빈 목록)
    pub async fn graph_names(&self) -> DriverResult<Vec<String>> {
        let Some(mut cursor) = self.show_databases().await? else {
            return Ok(Vec::new());
        };
        let mut names = BTreeSet::new();
        for record in cursor.records()? {
            names.insert(record.get_string("name")?);
        }
        Ok(names.into_iter().collect())
    }

    /// 기본 그래프 이름
    pub async fn default_graph_name(&self) -> DriverResult<Option<String>> {
        let Some(mut cursor) = self.show_databases().await? else {
            return Ok(None);
        };
        for record in cursor.records()? {
            if record.get_optional::<bool>("default")?.unwrap_or(false) {
                return Ok(Some(record.get_string("name")?));
            }
        }
        Ok(None)
    }
}

/// RUN 후 모든 레코드 받기
async fn run_to_end(
    cx: &mut BoltConnection,
    query: &str,
    params: PackStreamMap,
    graph_name: Option<&str>,
    readonly: bool,
) -> DriverResult<QueryResult> {
    let result = cx
        .auto_run(query, params, graph_name, readonly, TransactionOptions::default())
        .await?;
    cx.pull(&result, -1, None).await?;
    Ok(result)
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pools = self.pools.lock();
        let mut addresses: Vec<&Address> = pools.keys().collect();
        addresses.sort();
        let lines: Vec<String> = addresses.iter().map(|a| pools[*a].to_string()).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("address", &self.config.address)
            .field("routing", &self.router.is_some())
            .field("pools", &self.addresses())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use futures::FutureExt;

    use super::*;
    use crate::bolt::message::AuthToken;
    use crate::bolt::{BoltVersion, MessageKind};
    use crate::driver::error::Neo4jError;
    use crate::driver::task::Bookmark;
    use crate::driver::testing::{init_tracing, FakeServer, QueryScript, TestDialer};

    const TRANSIENT: &str = "Neo.TransientError.General.DatabaseUnavailable";

    async fn direct(server: &FakeServer) -> Connector {
        init_tracing();
        let config = DriverConfig::new("bolt://localhost:7687", AuthToken::none()).unwrap();
        Connector::new(config, Arc::new(TestDialer::single(server.clone())))
            .await
            .unwrap()
    }

    fn cluster(readers: &[&str], writers: &[&str]) -> RoutingInfo {
        RoutingInfo {
            routers: vec!["localhost:7687".into()],
            readers: readers.iter().map(|s| s.to_string()).collect(),
            writers: writers.iter().map(|s| s.to_string()).collect(),
            ttl: 300,
        }
    }

    async fn routed(dialer: TestDialer) -> DriverResult<Connector> {
        init_tracing();
        let config = DriverConfig::new("neo4j://localhost:7687", AuthToken::none())?;
        Connector::new(config, Arc::new(dialer)).await
    }

    fn total_in_use(connector: &Connector) -> usize {
        connector.in_use().values().sum()
    }

    #[tokio::test]
    async fn test_auto_run_returns_buffered_cursor() {
        let server = FakeServer::new(BoltVersion::V4_3).with_query(
            "UNWIND [1, 2] AS x RETURN x",
            QueryScript::records(&["x"], vec![vec![1.into()], vec![2.into()]]),
        );
        let connector = direct(&server).await;

        let mut cursor = connector
            .auto_run("UNWIND [1, 2] AS x RETURN x", HashMap::new(), None, true)
            .await
            .unwrap();
        assert_eq!(cursor.keys(), &["x".to_string()]);
        assert!(!cursor.has_more());
        assert!(cursor.bookmark().is_some());

        let values: Vec<i64> = cursor
            .records()
            .unwrap()
            .iter()
            .map(|r| r.get_int("x").unwrap())
            .collect();
        assert_eq!(values, vec![1, 2]);
        assert_eq!(total_in_use(&connector), 0);
    }

    #[tokio::test]
    async fn test_explicit_transaction_commit() {
        let server = FakeServer::new(BoltVersion::V4_3).with_query(
            "CREATE (n {x: 1}) RETURN n.x AS x",
            QueryScript::records(&["x"], vec![vec![1.into()]]),
        );
        let connector = direct(&server).await;

        let mut tx = connector.begin(None, false, TransactionOptions::default()).await.unwrap();
        assert!(tx.is_open());
        assert_eq!(total_in_use(&connector), 1);

        let mut cursor = connector
            .run(&mut tx, "CREATE (n {x: 1}) RETURN n.x AS x", HashMap::new(), -1)
            .await
            .unwrap();
        assert_eq!(cursor.single().unwrap().get_int("x").unwrap(), 1);

        let summary = connector.commit(&mut tx).await.unwrap();
        assert_eq!(summary.bookmark, Bookmark::from("bm:1"));
        assert_eq!(summary.address, Address::default());
        assert!(!tx.is_open());
        assert_eq!(total_in_use(&connector), 0);

        let err = connector.commit(&mut tx).await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_rollback_and_detached_rollback() {
        let server = FakeServer::new(BoltVersion::V4_3);
        let connector = direct(&server).await;

        let mut tx = connector.begin(None, false, TransactionOptions::default()).await.unwrap();
        let summary = connector.rollback(&mut tx).await.unwrap();
        assert!(summary.bookmark.is_empty());
        assert!(server.received_kinds().contains(&MessageKind::Rollback));

        let again = connector.rollback(&mut tx).await.unwrap();
        assert!(again.bookmark.is_empty());
        assert_eq!(total_in_use(&connector), 0);
    }

    #[tokio::test]
    async fn test_failure_in_transaction_releases_connection() {
        let server = FakeServer::new(BoltVersion::V4_3).with_query(
            "BAD",
            QueryScript::failure("Neo.ClientError.Statement.SyntaxError", "Invalid input"),
        );
        let connector = direct(&server).await;

        let mut tx = connector.begin(None, false, TransactionOptions::default()).await.unwrap();
        let err = connector.run(&mut tx, "BAD", HashMap::new(), -1).await.unwrap_err();
        assert!(matches!(err, DriverError::Server(_)));
        assert!(!tx.is_open());
        assert_eq!(total_in_use(&connector), 0);

        // the released connection is usable again
        connector.auto_run("RETURN 1", HashMap::new(), None, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_auto_run_failure_releases_connection() {
        let server = FakeServer::new(BoltVersion::V4_3)
            .with_query("BAD", QueryScript::failure("Neo.ClientError.Statement.SyntaxError", "Invalid input"));
        let connector = direct(&server).await;

        let err = connector.auto_run("BAD", HashMap::new(), None, false).await.unwrap_err();
        assert!(matches!(err, DriverError::Server(_)));
        assert_eq!(total_in_use(&connector), 0);
    }

    #[tokio::test]
    async fn test_secure_scheme_needs_secure_dialer() {
        let config = DriverConfig::new("bolt+s://localhost:7687", AuthToken::none()).unwrap();
        let dialer = Arc::new(TestDialer::single(FakeServer::new(BoltVersion::V4_3)));
        let err = Connector::new(config, dialer).await.unwrap_err();
        assert!(matches!(err, DriverError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_routed_read_goes_to_reader() {
        let router = FakeServer::new(BoltVersion::V4_3).with_routing(cluster(&["reader:7687"], &["writer:7687"]));
        let reader = FakeServer::new(BoltVersion::V4_3)
            .with_query("RETURN 1 AS n", QueryScript::records(&["n"], vec![vec![1.into()]]));
        let writer = FakeServer::new(BoltVersion::V4_3);
        let dialer = TestDialer::new()
            .with("localhost:7687", router)
            .with("reader:7687", reader.clone())
            .with("writer:7687", writer.clone());
        let connector = routed(dialer).await.unwrap();

        assert!(connector.is_routing());
        let runners = connector.router().unwrap().runners(None);
        assert_eq!(runners.readers, vec![Address::new("reader", 7687)]);
        assert_eq!(runners.writers, vec![Address::new("writer", 7687)]);

        let mut cursor = connector.auto_run("RETURN 1 AS n", HashMap::new(), None, true).await.unwrap();
        assert_eq!(cursor.single().unwrap().get_int("n").unwrap(), 1);
        assert_eq!(reader.queries_seen(), vec!["RETURN 1 AS n".to_string()]);

        connector.auto_run("CREATE ()", HashMap::new(), None, false).await.unwrap();
        assert_eq!(writer.queries_seen(), vec!["CREATE ()".to_string()]);
    }

    #[tokio::test]
    async fn test_routed_read_falls_back_to_writer() {
        let router = FakeServer::new(BoltVersion::V4_3).with_routing(cluster(&[], &["writer:7687"]));
        let writer = FakeServer::new(BoltVersion::V4_3);
        let dialer = TestDialer::new()
            .with("localhost:7687", router)
            .with("writer:7687", writer.clone());
        let connector = routed(dialer).await.unwrap();

        connector.auto_run("RETURN 1", HashMap::new(), None, true).await.unwrap();
        assert_eq!(writer.queries_seen(), vec!["RETURN 1".to_string()]);
    }

    #[tokio::test]
    async fn test_routed_empty_table_is_unavailable() {
        let router = FakeServer::new(BoltVersion::V4_3).with_routing(cluster(&[], &[]));
        let connector = routed(TestDialer::new().with("localhost:7687", router)).await.unwrap();

        let err = connector.auto_run("RETURN 1", HashMap::new(), None, true).await.unwrap_err();
        assert!(matches!(err, DriverError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_routed_write_without_leader_gives_up() {
        let router = FakeServer::new(BoltVersion::V4_3).with_routing(cluster(&["reader:7687"], &[]));
        let reader = FakeServer::new(BoltVersion::V4_3);
        let dialer = TestDialer::new()
            .with("localhost:7687", router)
            .with("reader:7687", reader.clone());
        let connector = routed(dialer).await.unwrap();

        let err = connector.auto_run("CREATE ()", HashMap::new(), None, false).await.unwrap_err();
        assert!(matches!(err, DriverError::WriteServiceUnavailable(_)));
        assert!(reader.queries_seen().is_empty());
    }

    #[tokio::test]
    async fn test_routing_not_supported_uses_single_server() {
        let server = FakeServer::new(BoltVersion::V4_0);
        let connector = routed(TestDialer::new().with("localhost:7687", server.clone()))
            .await
            .unwrap();

        let runners = connector.router().unwrap().runners(None);
        assert!(!runners.expired);
        assert_eq!(runners.readers, vec![Address::default()]);
        assert_eq!(runners.writers, vec![Address::default()]);
        assert_eq!(connector.router().unwrap().routers(), vec![Address::default()]);

        connector.auto_run("RETURN 1", HashMap::new(), None, false).await.unwrap();
        assert!(server.queries_seen().contains(&"RETURN 1".to_string()));
    }

    #[tokio::test]
    async fn test_no_reachable_router() {
        let server = FakeServer::new(BoltVersion::V4_3).with_routing(cluster(&["localhost:7687"], &[]));
        server.set_down(true);
        let err = routed(TestDialer::new().with("localhost:7687", server)).await.unwrap_err();
        assert!(matches!(err, DriverError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_reader_is_dropped_from_table() {
        let router = FakeServer::new(BoltVersion::V4_3)
            .with_routing(cluster(&["reader1:7687", "reader2:7687"], &["localhost:7687"]));
        let down = FakeServer::new(BoltVersion::V4_3);
        down.set_down(true);
        let up = FakeServer::new(BoltVersion::V4_3);
        let dialer = TestDialer::new()
            .with("localhost:7687", router)
            .with("reader1:7687", down)
            .with("reader2:7687", up.clone());
        let connector = routed(dialer).await.unwrap();

        connector.auto_run("RETURN 1", HashMap::new(), None, true).await.unwrap();
        assert_eq!(up.queries_seen(), vec!["RETURN 1".to_string()]);
        assert!(!connector
            .router()
            .unwrap()
            .runners(None)
            .readers
            .contains(&Address::new("reader1", 7687)));
    }

    #[tokio::test]
    async fn test_query_gives_up_after_transient_failures() {
        let server = FakeServer::new(BoltVersion::V4_3)
            .with_query("RETURN 1", QueryScript::failure(TRANSIENT, "Database is starting"));
        let connector = direct(&server).await;

        let err = connector
            .query("RETURN 1", HashMap::new(), None, Some(Duration::ZERO))
            .await
            .unwrap_err();
        match err {
            DriverError::ServiceUnavailable(message) => assert!(message.contains("3 tries")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(server.queries_seen().len(), MIN_RETRY_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_query_does_not_retry_client_errors() {
        let server = FakeServer::new(BoltVersion::V4_3)
            .with_query("BAD", QueryScript::failure("Neo.ClientError.Statement.SyntaxError", "Invalid input"));
        let connector = direct(&server).await;

        let err = connector.query("BAD", HashMap::new(), None, None).await.unwrap_err();
        assert!(matches!(err, DriverError::Server(_)));
        assert_eq!(server.queries_seen().len(), 1);
    }

    #[tokio::test]
    async fn test_update_retries_transient_work() {
        let server = FakeServer::new(BoltVersion::V4_3);
        let connector = direct(&server).await;
        let attempts = AtomicUsize::new(0);

        let n = connector
            .update(None, Some(Duration::ZERO), |cx, tx| {
                let n = attempts.fetch_add(1, Ordering::Relaxed);
                async move {
                    if n == 0 {
                        return Err(DriverError::Server(Neo4jError::new(TRANSIENT, "try again")));
                    }
                    cx.run(tx, "CREATE ()", HashMap::new(), -1).await?;
                    Ok(n)
                }
                .boxed()
            })
            .await
            .unwrap();

        assert_eq!(n, 1);
        let kinds = server.received_kinds();
        assert_eq!(kinds.iter().filter(|k| **k == MessageKind::Rollback).count(), 1);
        assert_eq!(kinds.iter().filter(|k| **k == MessageKind::Commit).count(), 1);
        assert_eq!(total_in_use(&connector), 0);
    }

    #[tokio::test]
    async fn test_update_does_not_retry_failed_commit() {
        let server = FakeServer::new(BoltVersion::V4_3)
            .with_commit_failure("Neo.ClientError.Schema.ConstraintValidationFailed", "already exists");
        let connector = direct(&server).await;
        let attempts = AtomicUsize::new(0);

        let err = connector
            .update(None, Some(Duration::ZERO), |cx, tx| {
                attempts.fetch_add(1, Ordering::Relaxed);
                async move {
                    cx.run(tx, "CREATE ()", HashMap::new(), -1).await?;
                    Ok(())
                }
                .boxed()
            })
            .await
            .unwrap_err();

        match err {
            DriverError::Server(e) => assert_eq!(e.title, "ConstraintValidationFailed"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
        let commits = server.received_kinds().iter().filter(|k| **k == MessageKind::Commit).count();
        assert_eq!(commits, 1);
        assert_eq!(total_in_use(&connector), 0);
    }

    #[tokio::test]
    async fn test_routed_commit_failure_keeps_writer() {
        let router = FakeServer::new(BoltVersion::V4_3).with_routing(cluster(&[], &["writer:7687"]));
        let writer = FakeServer::new(BoltVersion::V4_3)
            .with_commit_failure("Neo.ClientError.Schema.ConstraintValidationFailed", "already exists");
        let dialer = TestDialer::new()
            .with("localhost:7687", router)
            .with("writer:7687", writer);
        let connector = routed(dialer).await.unwrap();

        let mut tx = connector.begin(None, false, TransactionOptions::default()).await.unwrap();
        let err = connector.commit(&mut tx).await.unwrap_err();
        assert!(matches!(err, DriverError::Server(_)));
        let runners = connector.router().unwrap().runners(None);
        assert_eq!(runners.writers, vec![Address::new("writer", 7687)]);
    }

    #[tokio::test]
    async fn test_update_follows_new_leader() {
        let router = FakeServer::new(BoltVersion::V4_3).with_routing(cluster(&[], &["a:7687"]));
        let a = FakeServer::new(BoltVersion::V4_3)
            .with_query("CREATE ()", QueryScript::failure("Neo.ClientError.Cluster.NotALeader", "no longer leader"));
        let b = FakeServer::new(BoltVersion::V4_3);
        let dialer = TestDialer::new()
            .with("localhost:7687", router.clone())
            .with("a:7687", a.clone())
            .with("b:7687", b.clone());
        let connector = routed(dialer).await.unwrap();

        // 캐시된 테이블은 여전히 a 를 가리킴
        router.set_routing(Some(cluster(&[], &["b:7687"])));
        connector
            .update(None, Some(Duration::ZERO), |cx, tx| {
                async move {
                    cx.run(tx, "CREATE ()", HashMap::new(), -1).await?;
                    Ok(())
                }
                .boxed()
            })
            .await
            .unwrap();

        assert_eq!(a.queries_seen(), vec!["CREATE ()".to_string()]);
        assert_eq!(b.queries_seen(), vec!["CREATE ()".to_string()]);
        let runners = connector.router().unwrap().runners(None);
        assert_eq!(runners.writers, vec![Address::new("b", 7687)]);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_refreshes_once() {
        let router = FakeServer::new(BoltVersion::V4_3).with_routing(cluster(&[], &["writer:7687"]));
        let dialer = TestDialer::new()
            .with("localhost:7687", router.clone())
            .with("writer:7687", FakeServer::new(BoltVersion::V4_3));
        let connector = routed(dialer).await.unwrap();
        let routes = || router.received_kinds().iter().filter(|k| **k == MessageKind::Route).count();
        assert_eq!(routes(), 1);

        connector.invalidate_routing_table(None);
        let (first, second) = tokio::join!(connector.acquire_rw(None), connector.acquire_rw(None));
        let (first_pool, first_cx) = first.unwrap();
        let (second_pool, second_cx) = second.unwrap();
        assert_eq!(routes(), 2);

        first_pool.release(first_cx, false).await;
        second_pool.release(second_cx, false).await;
        assert_eq!(total_in_use(&connector), 0);
    }

    #[tokio::test]
    async fn test_call_builds_parameterised_procedure() {
        let server = FakeServer::new(BoltVersion::V4_3);
        let connector = direct(&server).await;
        connector
            .call("db.labels", vec![Value::Integer(1), Value::String("a".into())], None, true)
            .await
            .unwrap();
        assert_eq!(server.queries_seen(), vec!["CALL db.labels($p0, $p1)".to_string()]);
    }

    #[tokio::test]
    async fn test_graph_names() {
        let server = FakeServer::new(BoltVersion::V4_3).with_query(
            "SHOW DATABASES",
            QueryScript::records(
                &["name", "default"],
                vec![
                    vec!["system".into(), false.into()],
                    vec!["neo4j".into(), true.into()],
                ],
            ),
        );
        let connector = direct(&server).await;
        assert_eq!(connector.graph_names().await.unwrap(), vec!["neo4j".to_string(), "system".to_string()]);
        assert_eq!(connector.default_graph_name().await.unwrap(), Some("neo4j".to_string()));
    }

    #[tokio::test]
    async fn test_graph_names_without_multi_database() {
        let server = FakeServer::new(BoltVersion::V3_0);
        let connector = direct(&server).await;
        assert!(connector.graph_names().await.unwrap().is_empty());
        assert_eq!(connector.default_graph_name().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_rejects_new_work() {
        let server = FakeServer::new(BoltVersion::V4_3);
        let connector = direct(&server).await;
        connector.close().await;
        let err = connector.auto_run("RETURN 1", HashMap::new(), None, true).await.unwrap_err();
        assert!(matches!(err, DriverError::ConnectionUnavailable(_)));
    }
}
