//! Bolt protocol session.
//!
//! A [`BoltConnection`] owns one wire and one negotiated protocol version.
//! Requests are framed into the wire's outbound buffer together with a
//! pending response slot; responses are matched to slots strictly in
//! FIFO order as they are read back.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::bolt::handshake::handshake;
use crate::bolt::message::tag;
use crate::bolt::packstream::{decode_message, encode_message};
use crate::bolt::{
    BoltVersion, HelloStyle, PackStreamMap, PackStreamValue, ProtocolSpec, PullStyle, Request,
    Response, RouteStyle, RoutingInfo, TxStyle, Wire, WireState,
};
use crate::driver::address::Address;
use crate::driver::config::{AuthToken, DriverConfig};
use crate::driver::error::{DriverError, DriverResult, Neo4jError};
use crate::driver::task::{
    Bookmark, QueryResult, ResponseHandle, Row, Task, TransactionOptions, TransactionRef,
};

use super::dialer::Dialer;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Legacy cluster routing procedure (Bolt 1 to 3).
pub const CLUSTER_ROUTING_QUERY: &str = "CALL dbms.cluster.routing.getRoutingTable($context)";

/// Routing procedure for the default database (Bolt 4.0 to 4.2).
pub const ROUTING_QUERY: &str = "CALL dbms.routing.getRoutingTable($context)";

/// Routing procedure for a named database (Bolt 4.0 to 4.2).
pub const ROUTING_QUERY_FOR_DATABASE: &str = "CALL dbms.routing.getRoutingTable($context, $database)";

/// Graph that routing procedures run against from Bolt 4.0.
pub const SYSTEM_GRAPH: &str = "system";

/// Observable parts of a connection, shared with the pool while the
/// connection itself is lent out.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: u64,
    pub wire: Arc<WireState>,
    tag: Arc<AtomicU8>,
}

impl ConnectionInfo {
    /// Routing tag, `R` or `W`, set by whoever acquired the connection.
    pub fn tag(&self) -> Option<char> {
        match self.tag.load(Ordering::Relaxed) {
            0 => None,
            t => Some(t as char),
        }
    }
}

/// One live, version-negotiated Bolt session.
pub struct BoltConnection {
    id: u64,
    address: Address,
    wire: Wire,
    spec: &'static ProtocolSpec,
    user_agent: String,
    server_agent: Option<String>,
    connection_id: Option<String>,
    metadata: PackStreamMap,
    responses: VecDeque<ResponseHandle>,
    transaction: Option<TransactionRef>,
    polite: bool,
    created: Instant,
    tag: Arc<AtomicU8>,
}

impl BoltConnection {
    /// Dial, negotiate a version and authenticate.
    pub async fn open(address: &Address, config: &DriverConfig, dialer: &dyn Dialer) -> DriverResult<Self> {
        let dialed = dialer.dial(address, config.connection_timeout).await?;
        let port = dialed.local_port;
        let mut wire = Wire::new(dialed.stream, port, config.max_message_size);

        debug!("[#{:04X}] C: <BOLT>", port);
        let proposals: Vec<String> = config.protocol_versions.iter().map(|p| p.to_string()).collect();
        debug!("[#{:04X}] C: <PROTOCOL> {}", port, proposals.join(" | "));
        let negotiated = tokio::time::timeout(
            config.connection_timeout,
            handshake(wire.stream_mut(), &config.protocol_versions),
        )
        .await;
        let version = match negotiated {
            Ok(Ok(version)) => version,
            Ok(Err(e)) => {
                wire.close().await;
                return Err(DriverError::connection_unavailable(format!(
                    "Cannot open connection to {}: {}",
                    address, e
                )));
            }
            Err(_) => {
                wire.close().await;
                return Err(DriverError::connection_unavailable(format!(
                    "Cannot open connection to {}: handshake timed out",
                    address
                )));
            }
        };
        debug!("[#{:04X}] S: <PROTOCOL> {}", port, version);

        let mut cx = Self::new(address.clone(), wire, version, config.user_agent.clone());
        if let Err(e) = cx.hello(&config.auth, &config.server_agent_prefix).await {
            cx.wire.close().await;
            return Err(match e {
                DriverError::ConnectionBroken(msg) => DriverError::connection_unavailable(format!(
                    "Cannot open connection to {}: {}",
                    address, msg
                )),
                other => other,
            });
        }
        Ok(cx)
    }

    fn new(address: Address, wire: Wire, version: BoltVersion, user_agent: String) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            address,
            wire,
            spec: ProtocolSpec::for_version(version),
            user_agent,
            server_agent: None,
            connection_id: None,
            metadata: PackStreamMap::new(),
            responses: VecDeque::new(),
            transaction: None,
            polite: false,
            created: Instant::now(),
            tag: Arc::new(AtomicU8::new(0)),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn local_port(&self) -> u16 {
        self.wire.local_port()
    }

    pub fn protocol_version(&self) -> BoltVersion {
        self.spec.version
    }

    pub fn spec(&self) -> &'static ProtocolSpec {
        self.spec
    }

    pub fn server_agent(&self) -> Option<&str> {
        self.server_agent.as_deref()
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Bookmark from the most recent SUCCESS that carried one.
    pub fn last_bookmark(&self) -> Option<&str> {
        self.metadata.get("bookmark").and_then(|v| v.as_str())
    }

    pub fn supports_multi(&self) -> bool {
        self.spec.multi_db
    }

    pub fn bytes_sent(&self) -> u64 {
        self.wire.bytes_sent()
    }

    pub fn bytes_received(&self) -> u64 {
        self.wire.bytes_received()
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn closed(&self) -> bool {
        self.wire.is_closed()
    }

    pub fn broken(&self) -> bool {
        self.wire.is_broken()
    }

    pub fn transaction(&self) -> Option<&TransactionRef> {
        self.transaction.as_ref()
    }

    /// Whether a transaction is open and still in progress.
    pub fn has_active_transaction(&self) -> bool {
        self.transaction.as_ref().map_or(false, |tx| tx.is_active())
    }

    pub fn set_tag(&self, tag: Option<char>) {
        self.tag.store(tag.map_or(0, |c| c as u8), Ordering::Relaxed);
    }

    pub fn tag(&self) -> Option<char> {
        self.info().tag()
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            wire: self.wire.state(),
            tag: Arc::clone(&self.tag),
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    async fn hello(&mut self, auth: &AuthToken, agent_prefix: &str) -> DriverResult<()> {
        self.assert_open()?;
        let request = match self.spec.hello {
            HelloStyle::Init => Request::init(&self.user_agent, auth),
            HelloStyle::Hello => Request::hello(&self.user_agent, auth),
        };
        let response = self.append(request, None, true)?;
        self.sync_responses(&[response.clone()]).await?;
        self.audit(&response).await?;

        let metadata = response.metadata();
        let text = |key: &str| metadata.get(key).and_then(|v| v.as_str()).map(str::to_string);
        self.server_agent = text("server");
        self.connection_id = text("connection_id");

        match self.spec.hello {
            HelloStyle::Init => {
                let agent = self.server_agent.as_deref().unwrap_or("");
                if !agent.starts_with(agent_prefix) {
                    return Err(DriverError::protocol(format!("Unexpected server agent {:?}", agent)));
                }
            }
            HelloStyle::Hello => self.polite = true,
        }
        Ok(())
    }

    async fn goodbye(&mut self) -> DriverResult<()> {
        if self.polite && self.spec.goodbye {
            self.write(&Request::goodbye())?;
            self.send().await?;
        }
        Ok(())
    }

    /// Close the session, saying goodbye first when the server expects it.
    pub async fn close(&mut self) {
        if !self.closed() && !self.broken() {
            if let Err(e) = self.goodbye().await {
                debug!("[#{:04X}] C: (GOODBYE failed: {})", self.local_port(), e);
            }
            debug!("[#{:04X}] C: (Hanging up)", self.local_port());
        }
        self.wire.close().await;
    }

    /// Reset the session if a transaction is active, or unconditionally
    /// when `force` is set.
    pub async fn reset(&mut self, force: bool) -> DriverResult<()> {
        self.assert_open()?;
        if force || self.has_active_transaction() {
            let response = self.append(Request::reset(), None, true)?;
            self.sync_responses(&[response.clone()]).await?;
            response.audit()?;
            self.transaction = None;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Run a query in an implicit transaction. The result is the only
    /// one the transaction will hold.
    pub async fn auto_run(
        &mut self,
        query: &str,
        params: PackStreamMap,
        graph_name: Option<&str>,
        readonly: bool,
        options: TransactionOptions,
    ) -> DriverResult<QueryResult> {
        self.assert_open()?;
        let tx = self.set_transaction(graph_name, readonly, options)?;
        let extra = match self.spec.tx {
            TxStyle::Embedded => None,
            TxStyle::Explicit => Some(tx.extra()),
        };
        self.run_in(&tx, query, params, extra, true)
    }

    /// Open an explicit transaction.
    pub async fn begin(
        &mut self,
        graph_name: Option<&str>,
        readonly: bool,
        options: TransactionOptions,
    ) -> DriverResult<TransactionRef> {
        self.assert_open()?;
        let tx = self.set_transaction(graph_name, readonly, options)?;
        let responses = match self.spec.tx {
            TxStyle::Embedded => vec![
                self.append(Request::run("BEGIN", tx.extra(), None), None, false)?,
                self.append(Request::discard_all(), None, false)?,
            ],
            TxStyle::Explicit => vec![self.append(Request::begin(tx.extra()), None, false)?],
        };
        match self.sync_responses(&responses).await {
            Err(e) if is_broken_wire(&e) => Err(DriverError::connection_broken(
                "Transaction could not begin due to disconnection",
            )),
            Err(e) => Err(e),
            Ok(()) => {
                for response in &responses {
                    self.audit(response).await?;
                }
                self.audit(&tx).await?;
                Ok(tx)
            }
        }
    }

    /// Queue a query inside an open transaction. Nothing is sent until
    /// the result is pulled or discarded.
    pub async fn run(&mut self, tx: &TransactionRef, query: &str, params: PackStreamMap) -> DriverResult<QueryResult> {
        self.assert_open()?;
        self.assert_transaction_open(tx)?;
        let extra = match self.spec.tx {
            TxStyle::Embedded => None,
            TxStyle::Explicit => Some(PackStreamMap::new()),
        };
        self.run_in(tx, query, params, extra, false)
    }

    pub async fn commit(&mut self, tx: &TransactionRef) -> DriverResult<Bookmark> {
        self.finish(tx, Request::commit(), "COMMIT", "commit").await
    }

    pub async fn rollback(&mut self, tx: &TransactionRef) -> DriverResult<Bookmark> {
        self.finish(tx, Request::rollback(), "ROLLBACK", "rollback").await
    }

    async fn finish(
        &mut self,
        tx: &TransactionRef,
        request: Request,
        statement: &str,
        action: &str,
    ) -> DriverResult<Bookmark> {
        self.assert_transaction_open(tx)?;
        self.assert_open()?;
        tx.set_complete();
        let responses = match self.spec.tx {
            TxStyle::Embedded => vec![
                self.append(Request::run(statement, PackStreamMap::new(), None), None, false)?,
                self.append(Request::discard_all(), None, false)?,
            ],
            TxStyle::Explicit => vec![self.append(request, None, false)?],
        };

        match self.sync_responses(&responses).await {
            Err(e) if is_broken_wire(&e) => {
                tx.mark_broken();
                return Err(DriverError::connection_broken(format!(
                    "Transaction broken by disconnection during {}",
                    action
                )));
            }
            Err(e) => return Err(e),
            Ok(()) => {}
        }

        let mut audited = self.audit(tx).await;
        for response in &responses {
            if audited.is_err() {
                break;
            }
            audited = self.audit(response).await;
        }
        match audited {
            Ok(()) => {
                self.transaction = None;
                Ok(match self.spec.tx {
                    TxStyle::Embedded => Bookmark::new(),
                    TxStyle::Explicit => responses
                        .last()
                        .and_then(|r| r.metadata_value("bookmark"))
                        .and_then(|v| v.as_str().map(Bookmark::from))
                        .unwrap_or_default(),
                })
            }
            Err(DriverError::Server(e)) => {
                debug!("[#{:04X}] Failed to {} transaction: {}", self.local_port(), action, e);
                tx.mark_broken();
                Err(DriverError::Server(e))
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------

    /// Fetch up to `n` more records for `result` (`-1` for all), buffering
    /// at most `capacity` before returning.
    pub async fn pull(&mut self, result: &QueryResult, n: i64, capacity: Option<usize>) -> DriverResult<ResponseHandle> {
        self.assert_open()?;
        let tx = self.result_transaction(result)?;
        let request = match self.spec.pull {
            PullStyle::All => {
                if n != -1 {
                    return Err(DriverError::unsupported(
                        "Flow control is not available in this version of Neo4j",
                    ));
                }
                self.assert_last_result(&tx, result)?;
                Request::pull_all()
            }
            PullStyle::Numbered => Request::pull(n, self.result_qid(&tx, result)?),
        };
        let response = self.append(request, capacity, false)?;
        result.append(response.clone(), n == -1);
        self.consume(&tx, &response, "pull").await?;
        Ok(response)
    }

    /// Throw away the rest of `result`, keeping its summary.
    pub async fn discard(&mut self, result: &QueryResult) -> DriverResult<ResponseHandle> {
        self.assert_open()?;
        let tx = self.result_transaction(result)?;
        let request = match self.spec.pull {
            PullStyle::All => {
                self.assert_last_result(&tx, result)?;
                Request::discard_all()
            }
            PullStyle::Numbered => Request::discard(-1, self.result_qid(&tx, result)?),
        };
        let response = self.append(request, None, false)?;
        result.append(response.clone(), true);
        self.consume(&tx, &response, "discard").await?;
        Ok(response)
    }

    async fn consume(&mut self, tx: &TransactionRef, response: &ResponseHandle, action: &str) -> DriverResult<()> {
        match self.sync_responses(&[response.clone()]).await {
            Err(e) if is_broken_wire(&e) => {
                tx.mark_broken();
                Err(DriverError::connection_broken(format!(
                    "Transaction broken by disconnection during {}",
                    action
                )))
            }
            Err(e) => Err(e),
            Ok(()) => self.audit(tx).await,
        }
    }

    /// Send anything queued and wait for `result` to finish.
    pub async fn sync(&mut self, result: &QueryResult) -> DriverResult<()> {
        self.send().await?;
        if let Some(last) = result.last() {
            self.wait(&last).await?;
        }
        self.audit(result).await
    }

    /// Next buffered record of `result`.
    pub fn fetch(&self, result: &QueryResult) -> Option<Row> {
        result.take()
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    /// Ask this server for the routing table of `graph_name`.
    pub async fn route(
        &mut self,
        graph_name: Option<&str>,
        context: &PackStreamMap,
    ) -> DriverResult<RoutingInfo> {
        let mut context = context.clone();
        match self.spec.route {
            RouteStyle::ClusterProcedure => {
                if graph_name.is_some() {
                    return Err(DriverError::unsupported(
                        "Multiple graph databases are not available prior to Bolt v4",
                    ));
                }
                let mut params = PackStreamMap::new();
                params.insert("context".into(), context.into());
                self.routing_info(None, CLUSTER_ROUTING_QUERY, params).await
            }
            RouteStyle::RoutingProcedure => {
                context.insert("address".into(), self.address.to_string().into());
                let mut params = PackStreamMap::new();
                params.insert("context".into(), context.into());
                let query = match graph_name {
                    Some(graph_name) => {
                        params.insert("database".into(), graph_name.into());
                        ROUTING_QUERY_FOR_DATABASE
                    }
                    None => ROUTING_QUERY,
                };
                self.routing_info(Some(SYSTEM_GRAPH), query, params).await
            }
            RouteStyle::RouteMessage => {
                self.assert_open()?;
                self.assert_no_transaction()?;
                context.insert("address".into(), self.address.to_string().into());
                let response = self.append(Request::route(context, Vec::new(), graph_name), None, false)?;
                self.sync_responses(&[response.clone()]).await?;
                self.audit(&response).await?;
                response
                    .metadata_value("rt")
                    .as_ref()
                    .and_then(RoutingInfo::from_route_table)
                    .ok_or_else(|| DriverError::protocol("ROUTE response carried no routing table"))
            }
        }
    }

    async fn routing_info(
        &mut self,
        graph_name: Option<&str>,
        query: &str,
        params: PackStreamMap,
    ) -> DriverResult<RoutingInfo> {
        let result = self
            .auto_run(query, params, graph_name, false, TransactionOptions::default())
            .await?;
        match self.pull(&result, -1, None).await {
            Ok(_) => {}
            Err(DriverError::Server(e)) if e.title == "ProcedureNotFound" => {
                return Err(DriverError::RoutingNotSupported(format!(
                    "Neo4j service does not support routing ({})",
                    e.message
                )))
            }
            Err(e) => return Err(e),
        }
        let record = result
            .take()
            .ok_or_else(|| DriverError::protocol("Routing procedure returned no records"))?;
        RoutingInfo::from_record(&record)
            .ok_or_else(|| DriverError::protocol("Routing procedure returned a malformed record"))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn assert_open(&self) -> DriverResult<()> {
        if self.closed() {
            return Err(DriverError::connection_unavailable("Connection has been closed"));
        }
        if self.broken() {
            return Err(DriverError::connection_unavailable("Connection is broken"));
        }
        Ok(())
    }

    fn assert_no_transaction(&self) -> DriverResult<()> {
        if self.has_active_transaction() {
            return Err(DriverError::invalid_state(
                "Cannot open multiple simultaneous transactions on a Bolt connection",
            ));
        }
        Ok(())
    }

    fn assert_transaction_open(&self, tx: &TransactionRef) -> DriverResult<()> {
        if tx.broken() {
            return Err(DriverError::connection_broken("Transaction is broken"));
        }
        if self.transaction.as_ref() != Some(tx) {
            return Err(DriverError::invalid_state(format!(
                "Transaction {} is not open on this connection",
                tx.id()
            )));
        }
        Ok(())
    }

    fn set_transaction(
        &mut self,
        graph_name: Option<&str>,
        readonly: bool,
        options: TransactionOptions,
    ) -> DriverResult<TransactionRef> {
        self.assert_no_transaction()?;
        if graph_name.is_some() && !self.supports_multi() {
            return Err(DriverError::unsupported(
                "Database selection is not supported prior to Neo4j 4.0",
            ));
        }
        if self.spec.tx == TxStyle::Embedded {
            if !options.metadata.is_empty() {
                return Err(DriverError::unsupported("Transaction metadata not supported until Bolt v3"));
            }
            if options.timeout.is_some() {
                return Err(DriverError::unsupported("Transaction timeout not supported until Bolt v3"));
            }
        }
        let tx = TransactionRef::new(graph_name.map(str::to_string), readonly, options);
        self.transaction = Some(tx.clone());
        Ok(tx)
    }

    fn run_in(
        &mut self,
        tx: &TransactionRef,
        query: &str,
        params: PackStreamMap,
        extra: Option<PackStreamMap>,
        is_final: bool,
    ) -> DriverResult<QueryResult> {
        let response = self.append(Request::run(query, params, extra), None, false)?;
        let result = QueryResult::new(tx.id(), self.address.clone(), self.wire.state(), response);
        tx.append(result.clone(), is_final);
        Ok(result)
    }

    fn result_transaction(&self, result: &QueryResult) -> DriverResult<TransactionRef> {
        self.transaction
            .as_ref()
            .filter(|tx| tx.id() == result.transaction_id())
            .cloned()
            .ok_or_else(|| DriverError::invalid_state("Result does not belong to the open transaction"))
    }

    fn assert_last_result(&self, tx: &TransactionRef, result: &QueryResult) -> DriverResult<()> {
        if tx.last().as_ref() != Some(result) {
            return Err(DriverError::unsupported(
                "Random query access is not supported before Bolt 4.0",
            ));
        }
        if result.complete() {
            return Err(DriverError::ResultConsumed("Result is fully consumed".into()));
        }
        Ok(())
    }

    fn result_qid(&self, tx: &TransactionRef, result: &QueryResult) -> DriverResult<i64> {
        if result.complete() || !result.has_more_records() {
            return Err(DriverError::ResultConsumed("Result is fully consumed".into()));
        }
        if tx.last().as_ref() == Some(result) {
            return Ok(-1);
        }
        tx.index(result)
            .map(|i| i as i64)
            .ok_or_else(|| DriverError::invalid_state("Result does not belong to the open transaction"))
    }

    /// Raise the first failure in `task`. A server failure resets the
    /// session before it is returned.
    async fn audit<T: Task>(&mut self, task: &T) -> DriverResult<()> {
        match task.audit() {
            Ok(()) => Ok(()),
            Err(DriverError::Server(failure)) => {
                if !self.closed() && !self.broken() {
                    if let Err(e) = self.reset(true).await {
                        warn!("[#{:04X}] Reset after failure did not complete: {}", self.local_port(), e);
                    }
                }
                Err(DriverError::Server(failure))
            }
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, request: &Request) -> DriverResult<()> {
        let tag = self.spec.messages.tag(request.kind).ok_or_else(|| {
            DriverError::unsupported(format!(
                "{} is not available in Bolt {}",
                request.kind, self.spec.version
            ))
        })?;
        let mut body = BytesMut::new();
        encode_message(&mut body, tag, &request.fields)?;
        self.wire.write_message(&body)?;
        debug!("[#{:04X}] C: {}", self.local_port(), request);
        Ok(())
    }

    /// Queue `request` with a response slot.
    fn append(&mut self, request: Request, capacity: Option<usize>, vital: bool) -> DriverResult<ResponseHandle> {
        self.write(&request)?;
        let response = ResponseHandle::new(capacity, vital);
        self.responses.push_back(response.clone());
        Ok(response)
    }

    async fn send(&mut self) -> DriverResult<()> {
        let sent = self.wire.send().await?;
        if sent > 0 {
            debug!("[#{:04X}] C: (Sent {} bytes)", self.local_port(), sent);
        }
        Ok(())
    }

    async fn sync_responses(&mut self, responses: &[ResponseHandle]) -> DriverResult<()> {
        self.send().await?;
        for response in responses {
            self.wait(response).await?;
        }
        Ok(())
    }

    /// Read until `response` is done or has buffered its capacity.
    async fn wait(&mut self, response: &ResponseHandle) -> DriverResult<()> {
        while !response.full() && !response.done() {
            self.fetch_response().await?;
        }
        Ok(())
    }

    async fn read_message(&mut self) -> DriverResult<(u8, Vec<PackStreamValue>)> {
        let body = self.wire.read_message().await?;
        let (tag, mut fields) = decode_message(&body)?;
        if tag == tag::RECORD {
            while self.wire.peek_message() == Some(tag::RECORD) {
                let body = self.wire.read_message().await?;
                let (_, more) = decode_message(&body)?;
                fields.extend(more);
            }
        }
        Ok((tag, fields))
    }

    /// Read one message (or a run of records) and settle the front slot.
    /// Failures are stored on the slot, not raised.
    async fn fetch_response(&mut self) -> DriverResult<()> {
        let (tag, fields) = match self.read_message().await {
            Ok(message) => message,
            Err(e) if is_broken_wire(&e) => return Err(e),
            Err(e) => {
                self.wire.close().await;
                return Err(e);
            }
        };
        let port = self.local_port();
        let response = match Response::from_message(self.spec.messages, tag, fields) {
            Ok(response) => response,
            Err(e) => {
                debug!("[#{:04X}] ?: (Unexpected protocol message #{:02X})", port, tag);
                self.wire.close().await;
                return Err(e.into());
            }
        };

        let front_vital = self.responses.front().map(|r| r.is_vital());
        match (response, front_vital) {
            (Response::Records(rows), Some(_)) => {
                debug!("[#{:04X}] S: RECORD * {}", port, rows.len());
                if let Some(front) = self.responses.front() {
                    front.add_records(rows);
                }
            }
            (Response::Success(metadata), Some(_)) => {
                debug!("[#{:04X}] S: SUCCESS {}", port, PackStreamValue::Map(metadata.0.clone()));
                let metadata = metadata.into_map();
                self.metadata.extend(metadata.clone());
                if let Some(front) = self.responses.pop_front() {
                    front.set_success(metadata);
                }
            }
            (Response::Failure(failure), Some(vital)) => {
                debug!("[#{:04X}] S: FAILURE {}", port, failure);
                if let Some(front) = self.responses.pop_front() {
                    front.set_failure(Neo4jError::from(failure));
                }
                if vital {
                    self.wire.close().await;
                }
            }
            (Response::Ignored, Some(false)) => {
                debug!("[#{:04X}] S: IGNORED", port);
                if let Some(front) = self.responses.pop_front() {
                    front.set_ignored();
                }
            }
            (other, _) => {
                self.wire.close().await;
                return Err(DriverError::protocol(format!(
                    "Unexpected protocol message #{:02X} ({})",
                    other.tag(),
                    other.name()
                )));
            }
        }
        Ok(())
    }
}

fn is_broken_wire(e: &DriverError) -> bool {
    matches!(e, DriverError::ConnectionBroken(_))
}

impl fmt::Debug for BoltConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoltConnection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("version", &self.spec.version)
            .field("local_port", &self.local_port())
            .field("transaction", &self.transaction)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::handshake::VersionProposal;
    use crate::bolt::MessageKind;
    use crate::driver::testing::{FakeServer, QueryScript, TestDialer};

    fn config() -> DriverConfig {
        DriverConfig::default()
    }

    async fn open(server: &FakeServer) -> BoltConnection {
        let dialer = TestDialer::single(server.clone());
        BoltConnection::open(&Address::default(), &config(), &dialer).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_negotiates_and_says_hello() {
        let server = FakeServer::new(BoltVersion::V4_3);
        let mut cx = open(&server).await;
        assert_eq!(cx.protocol_version(), BoltVersion::V4_3);
        assert_eq!(cx.server_agent(), Some("Neo4j/4.3.0"));
        assert!(cx.connection_id().is_some());
        assert!(cx.supports_multi());
        cx.close().await;
        assert!(cx.closed());
        server.wait_for(MessageKind::Goodbye).await;
    }

    #[tokio::test]
    async fn test_version_fallback_to_bolt3() {
        let server = FakeServer::new(BoltVersion::V3_0);
        let dialer = TestDialer::single(server.clone());
        let config = DriverConfig {
            protocol_versions: vec![
                VersionProposal::new(4, 3),
                VersionProposal::new(4, 2),
                VersionProposal::new(4, 0),
                VersionProposal::new(3, 0),
            ],
            ..DriverConfig::default()
        };
        let mut cx = BoltConnection::open(&Address::default(), &config, &dialer).await.unwrap();
        assert_eq!(cx.protocol_version(), BoltVersion::V3_0);

        let tx = cx.begin(None, false, TransactionOptions::default()).await.unwrap();
        assert_eq!(server.received_tags().last(), Some(&0x11));
        assert!(cx.has_active_transaction());
        cx.commit(&tx).await.unwrap();
        assert!(!cx.has_active_transaction());
    }

    #[tokio::test]
    async fn test_no_common_version_is_unavailable() {
        let server = FakeServer::new(BoltVersion::V1_0);
        let dialer = TestDialer::single(server);
        let config = DriverConfig {
            protocol_versions: vec![VersionProposal::new(4, 0)],
            ..DriverConfig::default()
        };
        let err = BoltConnection::open(&Address::default(), &config, &dialer).await.unwrap_err();
        assert!(matches!(err, DriverError::ConnectionUnavailable(_)));
    }

    #[tokio::test]
    async fn test_bolt1_checks_server_agent() {
        let server = FakeServer::new(BoltVersion::V2_0).with_agent("Other/1.0");
        let dialer = TestDialer::single(server);
        let config = DriverConfig {
            protocol_versions: vec![VersionProposal::new(2, 0)],
            ..DriverConfig::default()
        };
        let err = BoltConnection::open(&Address::default(), &config, &dialer).await.unwrap_err();
        assert!(matches!(err, DriverError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_auto_run_and_pull() {
        let server = FakeServer::new(BoltVersion::V4_3).with_query(
            "UNWIND range(1, 3) AS n RETURN n",
            QueryScript::records(&["n"], vec![vec![1.into()], vec![2.into()], vec![3.into()]]),
        );
        let mut cx = open(&server).await;
        let result = cx
            .auto_run("UNWIND range(1, 3) AS n RETURN n", PackStreamMap::new(), None, true, TransactionOptions::default())
            .await
            .unwrap();
        cx.pull(&result, -1, None).await.unwrap();
        assert_eq!(result.fields(), vec!["n".to_string()]);
        let values: Vec<i64> = std::iter::from_fn(|| cx.fetch(&result))
            .filter_map(|row| row[0].as_int())
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert!(result.done());
        assert!(!cx.has_active_transaction());
    }

    #[tokio::test]
    async fn test_flow_control_pulls_in_batches() {
        let rows: Vec<Row> = (0..5).map(|i| vec![PackStreamValue::Integer(i)]).collect();
        let server = FakeServer::new(BoltVersion::V4_0).with_query("RETURN n", QueryScript::records(&["n"], rows));
        let mut cx = open(&server).await;
        let result = cx
            .auto_run("RETURN n", PackStreamMap::new(), None, false, TransactionOptions::default())
            .await
            .unwrap();
        cx.pull(&result, 2, None).await.unwrap();
        assert!(result.has_more_records());
        assert!(cx.has_active_transaction());
        cx.pull(&result, -1, None).await.unwrap();
        assert!(!result.has_more_records());
        let count = std::iter::from_fn(|| cx.fetch(&result)).count();
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn test_bolt3_rejects_flow_control_and_databases() {
        let server = FakeServer::new(BoltVersion::V3_0);
        let dialer = TestDialer::single(server);
        let config = DriverConfig {
            protocol_versions: vec![VersionProposal::new(3, 0)],
            ..DriverConfig::default()
        };
        let mut cx = BoltConnection::open(&Address::default(), &config, &dialer).await.unwrap();
        let err = cx
            .auto_run("RETURN 1", PackStreamMap::new(), Some("movies"), false, TransactionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Unsupported(_)));

        let result = cx
            .auto_run("RETURN 1", PackStreamMap::new(), None, false, TransactionOptions::default())
            .await
            .unwrap();
        let err = cx.pull(&result, 10, None).await.unwrap_err();
        assert!(matches!(err, DriverError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_failure_resets_and_releases_transaction() {
        let server = FakeServer::new(BoltVersion::V4_3).with_query(
            "RETURN x",
            QueryScript::failure("Neo.ClientError.Statement.SyntaxError", "Variable `x` not defined"),
        );
        let mut cx = open(&server).await;
        let result = cx
            .auto_run("RETURN x", PackStreamMap::new(), None, false, TransactionOptions::default())
            .await
            .unwrap();
        let err = cx.pull(&result, -1, None).await.unwrap_err();
        assert_eq!(err.as_server_error().map(|e| e.title.as_str()), Some("SyntaxError"));
        assert!(cx.transaction().is_none());
        assert!(server.received_kinds().contains(&MessageKind::Reset));

        let result = cx
            .auto_run("RETURN 1", PackStreamMap::new(), None, false, TransactionOptions::default())
            .await
            .unwrap();
        cx.pull(&result, -1, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_second_transaction_is_refused() {
        let server = FakeServer::new(BoltVersion::V4_3);
        let mut cx = open(&server).await;
        let _tx = cx.begin(None, false, TransactionOptions::default()).await.unwrap();
        let err = cx.begin(None, false, TransactionOptions::default()).await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_broken_during_pull_then_commit() {
        let server = FakeServer::new(BoltVersion::V4_3).with_query("RETURN 1", QueryScript::hang_up());
        let mut cx = open(&server).await;
        let tx = cx.begin(None, false, TransactionOptions::default()).await.unwrap();
        let result = cx.run(&tx, "RETURN 1", PackStreamMap::new()).await.unwrap();
        let err = cx.pull(&result, -1, None).await.unwrap_err();
        assert!(matches!(err, DriverError::ConnectionBroken(_)));
        assert!(tx.broken());

        let sent = cx.bytes_sent();
        let err = cx.commit(&tx).await.unwrap_err();
        assert!(matches!(err, DriverError::ConnectionBroken(_)));
        assert_eq!(cx.bytes_sent(), sent);
    }

    #[tokio::test]
    async fn test_commit_returns_bookmark() {
        let server = FakeServer::new(BoltVersion::V4_3);
        let mut cx = open(&server).await;
        let options = TransactionOptions::new().with_timeout(Duration::from_secs(1));
        let tx = cx.begin(Some("movies"), false, options).await.unwrap();
        let first = cx.run(&tx, "RETURN 1", PackStreamMap::new()).await.unwrap();
        let second = cx.run(&tx, "RETURN 2", PackStreamMap::new()).await.unwrap();
        cx.pull(&second, -1, None).await.unwrap();
        cx.discard(&first).await.unwrap();
        let bookmark = cx.commit(&tx).await.unwrap();
        assert!(!bookmark.is_empty());
        assert_eq!(cx.last_bookmark(), bookmark.values().next());
    }

    #[tokio::test]
    async fn test_commit_failure_is_reported_as_server_error() {
        let server = FakeServer::new(BoltVersion::V4_3)
            .with_commit_failure("Neo.ClientError.Schema.ConstraintValidationFailed", "already exists");
        let mut cx = open(&server).await;
        let tx = cx.begin(None, false, TransactionOptions::default()).await.unwrap();
        cx.run(&tx, "CREATE ()", PackStreamMap::new()).await.unwrap();

        let err = cx.commit(&tx).await.unwrap_err();
        match err {
            DriverError::Server(e) => assert_eq!(e.code, "Neo.ClientError.Schema.ConstraintValidationFailed"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(tx.broken());
        assert!(!cx.broken());
        assert!(!cx.has_active_transaction());
    }

    #[tokio::test]
    async fn test_route_message() {
        let info = RoutingInfo {
            routers: vec!["a:7687".into()],
            readers: vec!["b:7687".into()],
            writers: vec!["a:7687".into()],
            ttl: 300,
        };
        let server = FakeServer::new(BoltVersion::V4_3).with_routing(info.clone());
        let mut cx = open(&server).await;
        assert_eq!(cx.route(None, &PackStreamMap::new()).await.unwrap(), info);
    }

    #[tokio::test]
    async fn test_route_procedure_not_found() {
        let server = FakeServer::new(BoltVersion::V4_0);
        let mut cx = open(&server).await;
        let err = cx.route(None, &PackStreamMap::new()).await.unwrap_err();
        assert!(matches!(err, DriverError::RoutingNotSupported(_)));
        assert!(!cx.has_active_transaction());
    }

    #[tokio::test]
    async fn test_responses_match_requests_in_order() {
        let server = FakeServer::new(BoltVersion::V4_3)
            .with_query("RETURN 'a'", QueryScript::records(&["x"], vec![vec!["a".into()]]))
            .with_query("RETURN 'b'", QueryScript::records(&["y"], vec![vec!["b".into()]]));
        let mut cx = open(&server).await;
        let tx = cx.begin(None, false, TransactionOptions::default()).await.unwrap();
        let a = cx.run(&tx, "RETURN 'a'", PackStreamMap::new()).await.unwrap();
        let b = cx.run(&tx, "RETURN 'b'", PackStreamMap::new()).await.unwrap();
        cx.pull(&b, -1, None).await.unwrap();
        cx.pull(&a, -1, None).await.unwrap();
        assert_eq!(a.fields(), vec!["x".to_string()]);
        assert_eq!(b.fields(), vec!["y".to_string()]);
        assert_eq!(cx.fetch(&a), Some(vec!["a".into()]));
        assert_eq!(cx.fetch(&b), Some(vec!["b".into()]));
        cx.rollback(&tx).await.unwrap();
    }
}
