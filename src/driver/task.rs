//! 응답 추적
//!
//! 세션이 보낸 요청마다 응답 슬롯([`ResponseHandle`])이 하나씩 생기고,
//! 쿼리 결과([`QueryResult`])는 응답 슬롯의 목록, 트랜잭션
//! ([`TransactionRef`])은 쿼리 결과의 목록입니다. 세 가지 모두 [`Task`]
//! 를 구현하며, 세션과 호출자가 같은 상태를 공유하도록 `Arc` 핸들로
//! 다룹니다.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::bolt::message::AccessMode;
use crate::bolt::{PackStreamMap, PackStreamValue, WireState};

use super::address::Address;
use super::error::{DriverError, DriverResult, Neo4jError};

/// 레코드 한 줄 (하이드레이션 전)
pub type Row = Vec<PackStreamValue>;

static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Task - 공통 인터페이스
// ============================================================================

/// 완료와 실패를 판단할 수 있는 작업
pub trait Task {
    /// 완료 여부
    fn done(&self) -> bool;

    /// 실패 여부
    fn failed(&self) -> bool;

    /// 실패가 있으면 첫 번째 실패를 돌려줍니다.
    fn audit(&self) -> DriverResult<()>;
}

// ============================================================================
// ResponseHandle - 응답 슬롯
// ============================================================================

/// 응답 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// 아직 응답 없음
    Pending,
    /// SUCCESS
    Success,
    /// FAILURE
    Failure,
    /// IGNORED
    Ignored,
}

#[derive(Debug)]
struct Response {
    capacity: Option<usize>,
    vital: bool,
    records: VecDeque<Row>,
    status: ResponseStatus,
    metadata: PackStreamMap,
    failure: Option<Neo4jError>,
}

/// 요청 하나에 대응하는 응답 슬롯
///
/// `vital` 슬롯이 실패하면 세션은 와이어를 닫습니다.
#[derive(Clone)]
pub struct ResponseHandle(Arc<Mutex<Response>>);

impl ResponseHandle {
    /// 새 슬롯. `capacity` 는 한 번에 버퍼링할 레코드 수 (`None` 이면 무제한)
    pub fn new(capacity: Option<usize>, vital: bool) -> Self {
        Self(Arc::new(Mutex::new(Response {
            capacity,
            vital,
            records: VecDeque::new(),
            status: ResponseStatus::Pending,
            metadata: PackStreamMap::new(),
            failure: None,
        })))
    }

    pub fn is_vital(&self) -> bool {
        self.0.lock().vital
    }

    pub fn status(&self) -> ResponseStatus {
        self.0.lock().status
    }

    pub fn add_records(&self, rows: impl IntoIterator<Item = Row>) {
        self.0.lock().records.extend(rows);
    }

    /// 소비하지 않고 앞에서부터 최대 `n` 줄
    pub fn peek_records(&self, n: usize) -> Vec<Row> {
        self.0.lock().records.iter().take(n).cloned().collect()
    }

    pub fn take_record(&self) -> Option<Row> {
        self.0.lock().records.pop_front()
    }

    pub fn buffered(&self) -> usize {
        self.0.lock().records.len()
    }

    pub fn set_success(&self, metadata: PackStreamMap) {
        let mut r = self.0.lock();
        r.status = ResponseStatus::Success;
        r.metadata.extend(metadata);
    }

    pub fn set_failure(&self, failure: Neo4jError) {
        let mut r = self.0.lock();
        r.status = ResponseStatus::Failure;
        r.failure = Some(failure);
    }

    pub fn set_ignored(&self) {
        self.0.lock().status = ResponseStatus::Ignored;
    }

    /// 버퍼가 용량에 도달했는지
    pub fn full(&self) -> bool {
        let r = self.0.lock();
        match r.capacity {
            Some(capacity) => r.records.len() >= capacity,
            None => false,
        }
    }

    /// 성공 메타데이터 복사본
    pub fn metadata(&self) -> PackStreamMap {
        self.0.lock().metadata.clone()
    }

    /// 메타데이터 항목 하나
    pub fn metadata_value(&self, key: &str) -> Option<PackStreamValue> {
        self.0.lock().metadata.get(key).cloned()
    }

    pub fn failure(&self) -> Option<Neo4jError> {
        self.0.lock().failure.clone()
    }
}

impl Task for ResponseHandle {
    fn done(&self) -> bool {
        self.0.lock().status != ResponseStatus::Pending
    }

    fn failed(&self) -> bool {
        matches!(
            self.0.lock().status,
            ResponseStatus::Failure | ResponseStatus::Ignored
        )
    }

    /// 실패를 보고한 뒤 슬롯은 IGNORED 로 바뀝니다.
    fn audit(&self) -> DriverResult<()> {
        let mut r = self.0.lock();
        match r.failure.clone() {
            Some(failure) => {
                r.status = ResponseStatus::Ignored;
                Err(DriverError::Server(failure))
            }
            None => Ok(()),
        }
    }
}

impl PartialEq for ResponseHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.0.lock();
        match r.status {
            ResponseStatus::Success => write!(f, "<Response SUCCESS {:?}>", r.metadata),
            ResponseStatus::Failure => write!(f, "<Response FAILURE {:?}>", r.failure),
            ResponseStatus::Ignored => write!(f, "<Response IGNORED>"),
            ResponseStatus::Pending => write!(f, "<Response ?>"),
        }
    }
}

// ============================================================================
// ItemizedTask - 항목 목록
// ============================================================================

/// 항목을 차례로 추가하다가 마지막 항목에서 완결되는 목록
///
/// 완결되었고 마지막 항목이 끝났을 때만 `done` 입니다.
#[derive(Debug, Clone)]
pub struct ItemizedTask<T> {
    items: Vec<T>,
    complete: bool,
}

impl<T> Default for ItemizedTask<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            complete: false,
        }
    }
}

impl<T: Task + PartialEq> ItemizedTask<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, item: T, is_final: bool) {
        self.items.push(item);
        if is_final {
            self.set_complete();
        }
    }

    pub fn set_complete(&mut self) {
        self.complete = true;
    }

    /// 모든 항목이 추가되었는지 (끝났는지와 무관)
    pub fn complete(&self) -> bool {
        self.complete
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn index(&self, item: &T) -> Option<usize> {
        self.items.iter().position(|i| i == item)
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Task> Task for ItemizedTask<T> {
    fn done(&self) -> bool {
        if !self.complete {
            return false;
        }
        self.items.last().map_or(true, |last| last.done())
    }

    fn failed(&self) -> bool {
        self.items.iter().any(|item| item.failed())
    }

    fn audit(&self) -> DriverResult<()> {
        for item in &self.items {
            item.audit()?;
        }
        Ok(())
    }
}

// ============================================================================
// QueryResult - 쿼리 결과
// ============================================================================

struct ResultState {
    task: ItemizedTask<ResponseHandle>,
    last_taken: usize,
}

struct ResultInner {
    tx_id: u64,
    address: Address,
    wire: Arc<WireState>,
    state: Mutex<ResultState>,
}

/// 쿼리 하나의 결과
///
/// 첫 슬롯은 RUN 응답(헤더)이고, 이어서 PULL/DISCARD 응답이 붙습니다.
#[derive(Clone)]
pub struct QueryResult(Arc<ResultInner>);

impl QueryResult {
    pub(crate) fn new(
        tx_id: u64,
        address: Address,
        wire: Arc<WireState>,
        header: ResponseHandle,
    ) -> Self {
        let mut task = ItemizedTask::new();
        task.append(header, false);
        Self(Arc::new(ResultInner {
            tx_id,
            address,
            wire,
            state: Mutex::new(ResultState { task, last_taken: 0 }),
        }))
    }

    /// 소속 트랜잭션 ID
    pub fn transaction_id(&self) -> u64 {
        self.0.tx_id
    }

    /// 결과를 만든 서버
    pub fn address(&self) -> &Address {
        &self.0.address
    }

    /// 더 이상 서버에서 받을 것이 없는지
    pub fn offline(&self) -> bool {
        self.done() || self.0.wire.is_closed() || self.0.wire.is_broken()
    }

    pub(crate) fn append(&self, response: ResponseHandle, is_final: bool) {
        self.0.state.lock().task.append(response, is_final);
    }

    pub(crate) fn set_complete(&self) {
        self.0.state.lock().task.set_complete();
    }

    pub fn complete(&self) -> bool {
        self.0.state.lock().task.complete()
    }

    /// RUN 응답
    pub fn header(&self) -> Option<ResponseHandle> {
        self.0.state.lock().task.first().cloned()
    }

    pub fn last(&self) -> Option<ResponseHandle> {
        self.0.state.lock().task.last().cloned()
    }

    /// 컬럼 이름
    pub fn fields(&self) -> Vec<String> {
        self.header()
            .and_then(|h| h.metadata_value("fields"))
            .and_then(|v| v.as_string_list())
            .unwrap_or_default()
    }

    /// 모든 슬롯의 메타데이터를 순서대로 합친 요약
    pub fn summary(&self) -> PackStreamMap {
        let state = self.0.state.lock();
        let mut summary = PackStreamMap::new();
        for item in state.task.items() {
            summary.extend(item.metadata());
        }
        summary
    }

    /// 다음 레코드 (버퍼에 있는 것만)
    pub fn take(&self) -> Option<Row> {
        let mut state = self.0.state.lock();
        let mut i = state.last_taken;
        while i < state.task.len() {
            if let Some(row) = state.task.items()[i].take_record() {
                state.last_taken = i;
                return Some(row);
            }
            i += 1;
        }
        None
    }

    /// 소비하지 않고 최대 `limit` 줄
    pub fn peek(&self, limit: usize) -> Vec<Row> {
        let state = self.0.state.lock();
        let mut rows = Vec::new();
        for item in &state.task.items()[state.last_taken..] {
            rows.extend(item.peek_records(limit - rows.len()));
            if rows.len() == limit {
                break;
            }
        }
        rows
    }

    /// PULL/DISCARD 응답마다 `has_more` 가 켜져 있었는지
    pub fn has_more_records(&self) -> bool {
        let state = self.0.state.lock();
        state.task.items().iter().skip(1).all(|item| {
            item.metadata_value("has_more")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        })
    }
}

impl Task for QueryResult {
    fn done(&self) -> bool {
        self.0.state.lock().task.done()
    }

    fn failed(&self) -> bool {
        self.0.state.lock().task.failed()
    }

    fn audit(&self) -> DriverResult<()> {
        self.0.state.lock().task.audit()
    }
}

impl PartialEq for QueryResult {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("tx_id", &self.0.tx_id)
            .field("address", &self.0.address)
            .field("items", &self.0.state.lock().task.len())
            .finish()
    }
}

// ============================================================================
// Bookmark - 북마크
// ============================================================================

/// 인과적 일관성 북마크 (문자열 집합)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bookmark {
    values: BTreeSet<String>,
}

impl Bookmark {
    /// 빈 북마크
    pub fn new() -> Self {
        Self::default()
    }

    /// 여러 북마크 합치기
    pub fn merge<'a>(bookmarks: impl IntoIterator<Item = &'a Bookmark>) -> Self {
        let mut merged = Self::new();
        for bookmark in bookmarks {
            merged.values.extend(bookmark.values.iter().cloned());
        }
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.values.iter().cloned().collect()
    }
}

impl fmt::Display for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<&str> = self.values().collect();
        write!(f, "<Bookmark {}>", values.join(" "))
    }
}

impl From<String> for Bookmark {
    fn from(s: String) -> Self {
        let mut bookmark = Self::new();
        bookmark.values.insert(s);
        bookmark
    }
}

impl From<&str> for Bookmark {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Option<&str>> for Bookmark {
    fn from(s: Option<&str>) -> Self {
        s.map(Self::from).unwrap_or_default()
    }
}

// ============================================================================
// TransactionRef - 트랜잭션 참조
// ============================================================================

/// 트랜잭션 옵션 (Bolt 3 이상에서만 전송)
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    /// 선행 북마크
    pub after: Option<Bookmark>,
    /// 트랜잭션 메타데이터
    pub metadata: PackStreamMap,
    /// 서버 측 타임아웃
    pub timeout: Option<Duration>,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_after(mut self, bookmark: Bookmark) -> Self {
        self.after = Some(bookmark);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<PackStreamValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

struct TransactionInner {
    id: u64,
    graph_name: Option<String>,
    readonly: bool,
    options: TransactionOptions,
    created: Instant,
    broken: AtomicBool,
    results: Mutex<ItemizedTask<QueryResult>>,
}

/// 세션에 열린 트랜잭션 참조
///
/// 완결되지 않았거나 마지막 결과가 끝나지 않았으면 활성 상태이며,
/// 세션은 활성 트랜잭션을 하나만 가질 수 있습니다.
#[derive(Clone)]
pub struct TransactionRef(Arc<TransactionInner>);

impl TransactionRef {
    pub(crate) fn new(graph_name: Option<String>, readonly: bool, options: TransactionOptions) -> Self {
        Self(Arc::new(TransactionInner {
            id: NEXT_TX_ID.fetch_add(1, Ordering::Relaxed),
            graph_name,
            readonly,
            options,
            created: Instant::now(),
            broken: AtomicBool::new(false),
            results: Mutex::new(ItemizedTask::new()),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn graph_name(&self) -> Option<&str> {
        self.0.graph_name.as_deref()
    }

    pub fn readonly(&self) -> bool {
        self.0.readonly
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.0.options
    }

    pub fn age(&self) -> Duration {
        self.0.created.elapsed()
    }

    pub fn broken(&self) -> bool {
        self.0.broken.load(Ordering::Acquire)
    }

    pub fn mark_broken(&self) {
        self.0.broken.store(true, Ordering::Release);
    }

    /// 아직 진행 중인지 (끝나지도 실패하지도 않음)
    pub fn is_active(&self) -> bool {
        !self.done() && !self.failed()
    }

    pub(crate) fn append(&self, result: QueryResult, is_final: bool) {
        self.0.results.lock().append(result, is_final);
    }

    pub(crate) fn set_complete(&self) {
        self.0.results.lock().set_complete();
    }

    pub fn complete(&self) -> bool {
        self.0.results.lock().complete()
    }

    pub fn last(&self) -> Option<QueryResult> {
        self.0.results.lock().last().cloned()
    }

    pub fn index(&self, result: &QueryResult) -> Option<usize> {
        self.0.results.lock().index(result)
    }

    /// BEGIN 또는 RUN 에 붙는 추가 필드
    pub fn extra(&self) -> PackStreamMap {
        let mut extra = PackStreamMap::new();
        if let Some(db) = &self.0.graph_name {
            extra.insert("db".into(), db.clone().into());
        }
        if self.0.readonly {
            extra.insert("mode".into(), AccessMode::Read.as_str().into());
        }
        if let Some(after) = self.0.options.after.as_ref().filter(|b| !b.is_empty()) {
            extra.insert("bookmarks".into(), after.to_vec().into());
        }
        if !self.0.options.metadata.is_empty() {
            extra.insert("tx_metadata".into(), self.0.options.metadata.clone().into());
        }
        if let Some(timeout) = self.0.options.timeout {
            let millis = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
            extra.insert("tx_timeout".into(), millis.into());
        }
        extra
    }
}

impl Task for TransactionRef {
    fn done(&self) -> bool {
        self.0.results.lock().done()
    }

    fn failed(&self) -> bool {
        self.0.results.lock().failed()
    }

    fn audit(&self) -> DriverResult<()> {
        self.0.results.lock().audit()
    }
}

impl PartialEq for TransactionRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionRef")
            .field("id", &self.0.id)
            .field("graph_name", &self.0.graph_name)
            .field("readonly", &self.0.readonly)
            .field("broken", &self.broken())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
