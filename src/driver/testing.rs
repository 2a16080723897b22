//! In-memory Bolt server and dialer for tests.
//!
//! [`FakeServer`] answers over `tokio::io::duplex` using the same wire,
//! codec and handshake code as the client. Queries are scripted by text;
//! anything unscripted succeeds with no records.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::io::DuplexStream;

use crate::bolt::handshake::{accept, Handshake};
use crate::bolt::message::tag;
use crate::bolt::packstream::{decode_message, encode_message};
use crate::bolt::{
    BoltVersion, MessageKind, PackStreamMap, PackStreamValue, ProtocolSpec, RoutingInfo, Wire,
};

use super::address::Address;
use super::bolt::dialer::{Dialed, Dialer};
use super::error::{DriverError, DriverResult};
use super::task::Row;

const REQUEST_KINDS: [MessageKind; 14] = [
    MessageKind::Init,
    MessageKind::Hello,
    MessageKind::Goodbye,
    MessageKind::AckFailure,
    MessageKind::Reset,
    MessageKind::Run,
    MessageKind::Begin,
    MessageKind::Commit,
    MessageKind::Rollback,
    MessageKind::DiscardAll,
    MessageKind::PullAll,
    MessageKind::Discard,
    MessageKind::Pull,
    MessageKind::Route,
];

/// Canned answer to one query text.
#[derive(Debug, Clone, Default)]
pub struct QueryScript {
    fields: Vec<String>,
    records: Vec<Row>,
    failure: Option<(String, String)>,
    hang_up: bool,
}

impl QueryScript {
    pub fn records(fields: &[&str], records: Vec<Row>) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            records,
            ..Self::default()
        }
    }

    pub fn failure(code: &str, message: &str) -> Self {
        Self {
            failure: Some((code.to_string(), message.to_string())),
            ..Self::default()
        }
    }

    /// Drop the connection as soon as the query arrives.
    pub fn hang_up() -> Self {
        Self {
            hang_up: true,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct ServerState {
    versions: Vec<BoltVersion>,
    agent: String,
    queries: HashMap<String, QueryScript>,
    routing: Option<RoutingInfo>,
    commit_failure: Option<(String, String)>,
    down: bool,
    received: Vec<(MessageKind, u8)>,
    queries_seen: Vec<String>,
    connections: usize,
    bookmarks: u64,
}

/// Scripted Bolt server. Clones share state.
#[derive(Debug, Clone)]
pub struct FakeServer(Arc<Mutex<ServerState>>);

impl FakeServer {
    pub fn new(version: BoltVersion) -> Self {
        Self(Arc::new(Mutex::new(ServerState {
            versions: vec![version],
            agent: format!("Neo4j/{}.{}.0", version.major(), version.minor()),
            queries: HashMap::new(),
            routing: None,
            commit_failure: None,
            down: false,
            received: Vec::new(),
            queries_seen: Vec::new(),
            connections: 0,
            bookmarks: 0,
        })))
    }

    pub fn with_agent(self, agent: &str) -> Self {
        self.0.lock().agent = agent.to_string();
        self
    }

    pub fn with_query(self, query: &str, script: QueryScript) -> Self {
        self.set_query(query, script);
        self
    }

    pub fn with_routing(self, info: RoutingInfo) -> Self {
        self.set_routing(Some(info));
        self
    }

    /// Answer every COMMIT with a FAILURE.
    pub fn with_commit_failure(self, code: &str, message: &str) -> Self {
        self.0.lock().commit_failure = Some((code.to_string(), message.to_string()));
        self
    }

    pub fn set_query(&self, query: &str, script: QueryScript) {
        self.0.lock().queries.insert(query.to_string(), script);
    }

    pub fn set_routing(&self, info: Option<RoutingInfo>) {
        self.0.lock().routing = info;
    }

    /// Refuse new connections while set.
    pub fn set_down(&self, down: bool) {
        self.0.lock().down = down;
    }

    pub fn is_down(&self) -> bool {
        self.0.lock().down
    }

    pub fn connections(&self) -> usize {
        self.0.lock().connections
    }

    pub fn received_kinds(&self) -> Vec<MessageKind> {
        self.0.lock().received.iter().map(|(k, _)| *k).collect()
    }

    pub fn received_tags(&self) -> Vec<u8> {
        self.0.lock().received.iter().map(|(_, t)| *t).collect()
    }

    pub fn queries_seen(&self) -> Vec<String> {
        self.0.lock().queries_seen.clone()
    }

    /// Wait until a message of `kind` has arrived.
    pub async fn wait_for(&self, kind: MessageKind) {
        for _ in 0..200 {
            if self.received_kinds().contains(&kind) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("server never received {}", kind);
    }

    async fn serve(self, stream: DuplexStream) {
        let mut wire = Wire::new(Box::new(stream), 0, 1 << 20);
        let handshake = Handshake::with_versions(self.0.lock().versions.clone());
        let version = match accept(wire.stream_mut(), &handshake).await {
            Ok(version) => version,
            Err(_) => return,
        };
        self.0.lock().connections += 1;
        let mut session = ServerSession {
            server: self.clone(),
            spec: ProtocolSpec::for_version(version),
            failed: false,
            in_tx: false,
            streams: Vec::new(),
        };

        loop {
            let Ok(body) = wire.read_message().await else { return };
            let Ok((t, fields)) = decode_message(&body) else { return };
            let Some(kind) = REQUEST_KINDS
                .into_iter()
                .find(|k| session.spec.messages.tag(*k) == Some(t))
            else {
                return;
            };
            self.0.lock().received.push((kind, t));

            let replies = match session.handle(kind, fields) {
                Some(replies) => replies,
                None => return,
            };
            for (reply_tag, reply_fields) in replies {
                let mut buf = BytesMut::new();
                if encode_message(&mut buf, reply_tag, &reply_fields).is_err()
                    || wire.write_message(&buf).is_err()
                {
                    return;
                }
            }
            if wire.send().await.is_err() {
                return;
            }
        }
    }
}

type Reply = (u8, Vec<PackStreamValue>);

struct ServerSession {
    server: FakeServer,
    spec: &'static ProtocolSpec,
    failed: bool,
    in_tx: bool,
    streams: Vec<VecDeque<Row>>,
}

fn success(entries: Vec<(&str, PackStreamValue)>) -> Reply {
    (tag::SUCCESS, vec![PackStreamValue::map(entries)])
}

fn failure(code: &str, message: &str) -> Reply {
    (
        tag::FAILURE,
        vec![PackStreamValue::map([("code", code.into()), ("message", message.into())])],
    )
}

impl ServerSession {
    /// Replies to one request, or `None` to drop the connection.
    fn handle(&mut self, kind: MessageKind, fields: Vec<PackStreamValue>) -> Option<Vec<Reply>> {
        if self.failed && !matches!(kind, MessageKind::Reset | MessageKind::AckFailure | MessageKind::Goodbye) {
            return Some(vec![(tag::IGNORED, vec![])]);
        }
        let replies = match kind {
            MessageKind::Init | MessageKind::Hello => {
                let state = self.server.0.lock();
                vec![success(vec![
                    ("server", state.agent.as_str().into()),
                    ("connection_id", format!("bolt-{}", state.connections).into()),
                ])]
            }
            MessageKind::Goodbye => return None,
            MessageKind::Reset | MessageKind::AckFailure => {
                self.failed = false;
                self.in_tx = false;
                self.streams.clear();
                vec![success(vec![])]
            }
            MessageKind::Begin => {
                self.in_tx = true;
                self.streams.clear();
                vec![success(vec![])]
            }
            MessageKind::Commit => {
                self.in_tx = false;
                let commit_failure = self.server.0.lock().commit_failure.clone();
                match commit_failure {
                    Some((code, message)) => {
                        self.failed = true;
                        vec![failure(&code, &message)]
                    }
                    None => vec![success(vec![("bookmark", self.next_bookmark().into())])],
                }
            }
            MessageKind::Rollback => {
                self.in_tx = false;
                vec![success(vec![])]
            }
            MessageKind::Run => {
                let query = fields.first().and_then(|v| v.as_str()).unwrap_or("").to_string();
                return self.run(&query);
            }
            MessageKind::PullAll => self.stream(-1, -1, false),
            MessageKind::DiscardAll => self.stream(-1, -1, true),
            MessageKind::Pull | MessageKind::Discard => {
                let args = fields.first();
                let n = args.and_then(|a| a.get("n")).and_then(|v| v.as_int()).unwrap_or(-1);
                let qid = args.and_then(|a| a.get("qid")).and_then(|v| v.as_int()).unwrap_or(-1);
                self.stream(n, qid, kind == MessageKind::Discard)
            }
            MessageKind::Route => {
                let db = fields.get(2).and_then(|v| v.as_str()).map(str::to_string);
                match self.server.0.lock().routing.clone() {
                    Some(info) => vec![success(vec![("rt", info.to_route_table(db.as_deref()))])],
                    None => {
                        self.failed = true;
                        vec![failure("Neo.ClientError.General.Unknown", "Routing is disabled")]
                    }
                }
            }
            _ => return None,
        };
        Some(replies)
    }

    fn next_bookmark(&self) -> String {
        let mut state = self.server.0.lock();
        state.bookmarks += 1;
        format!("bm:{}", state.bookmarks)
    }

    fn run(&mut self, query: &str) -> Option<Vec<Reply>> {
        self.server.0.lock().queries_seen.push(query.to_string());
        if !self.in_tx {
            self.streams.clear();
        }
        match query {
            "BEGIN" => {
                self.in_tx = true;
                self.streams.push(VecDeque::new());
                return Some(vec![success(vec![("fields", Vec::<String>::new().into())])]);
            }
            "COMMIT" | "ROLLBACK" => {
                self.in_tx = false;
                self.streams.push(VecDeque::new());
                return Some(vec![success(vec![("fields", Vec::<String>::new().into())])]);
            }
            _ => {}
        }

        let script = if query.starts_with("CALL dbms.") && query.contains("getRoutingTable") {
            match self.server.0.lock().routing.clone() {
                Some(info) => QueryScript::records(
                    &["ttl", "servers"],
                    vec![vec![info.ttl.into(), info.servers()]],
                ),
                None => QueryScript::failure(
                    "Neo.ClientError.Procedure.ProcedureNotFound",
                    "There is no procedure with that name",
                ),
            }
        } else {
            self.server.0.lock().queries.get(query).cloned().unwrap_or_default()
        };

        if script.hang_up {
            return None;
        }
        if let Some((code, message)) = script.failure {
            self.failed = true;
            return Some(vec![failure(&code, &message)]);
        }
        let qid = self.streams.len() as i64;
        self.streams.push(script.records.into_iter().collect());
        Some(vec![success(vec![
            ("fields", script.fields.into()),
            ("qid", qid.into()),
            ("t_first", 1.into()),
        ])])
    }

    fn stream(&mut self, n: i64, qid: i64, discard: bool) -> Vec<Reply> {
        let index = if qid < 0 {
            self.streams.len().checked_sub(1)
        } else {
            Some(qid as usize)
        };
        let Some(stream) = index.and_then(|i| self.streams.get_mut(i)) else {
            self.failed = true;
            return vec![failure("Neo.ClientError.Request.Invalid", "No such result")];
        };

        let take = if n < 0 { stream.len() } else { (n as usize).min(stream.len()) };
        let rows: Vec<Row> = stream.drain(..take).collect();
        if discard {
            stream.clear();
        }
        let has_more = !stream.is_empty();

        let mut replies: Vec<Reply> = Vec::new();
        if !discard {
            for row in rows {
                replies.push((tag::RECORD, vec![PackStreamValue::List(row)]));
            }
        }
        let mut metadata: Vec<(&str, PackStreamValue)> = vec![("t_last", 2.into())];
        if has_more {
            metadata.push(("has_more", true.into()));
        } else if !self.in_tx {
            metadata.push(("bookmark", self.next_bookmark().into()));
        }
        replies.push(success(metadata));
        replies
    }
}

// ============================================================================
// TestDialer
// ============================================================================

/// Dialer that connects to [`FakeServer`]s over in-memory pipes.
#[derive(Debug, Default)]
pub struct TestDialer {
    servers: Mutex<HashMap<Address, FakeServer>>,
    fallback: Option<FakeServer>,
    dials: AtomicUsize,
    ports: AtomicU16,
}

impl TestDialer {
    pub fn new() -> Self {
        Self {
            ports: AtomicU16::new(0xC000),
            ..Self::default()
        }
    }

    /// Every address reaches `server`.
    pub fn single(server: FakeServer) -> Self {
        Self {
            fallback: Some(server),
            ..Self::new()
        }
    }

    pub fn with(self, address: &str, server: FakeServer) -> Self {
        self.add(address, server);
        self
    }

    pub fn add(&self, address: &str, server: FakeServer) {
        if let Ok(address) = Address::parse(address) {
            self.servers.lock().insert(address, server);
        }
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::Relaxed)
    }
}

impl Dialer for TestDialer {
    fn dial<'a>(&'a self, address: &'a Address, _timeout: Duration) -> BoxFuture<'a, DriverResult<Dialed>> {
        Box::pin(async move {
            self.dials.fetch_add(1, Ordering::Relaxed);
            let server = self
                .servers
                .lock()
                .get(address)
                .cloned()
                .or_else(|| self.fallback.clone())
                .filter(|s| !s.is_down())
                .ok_or_else(|| {
                    DriverError::connection_unavailable(format!("Failed to connect to {}: refused", address))
                })?;
            let (client, server_side) = tokio::io::duplex(1 << 16);
            tokio::spawn(server.serve(server_side));
            Ok(Dialed {
                stream: Box::new(client),
                local_port: self.ports.fetch_add(1, Ordering::Relaxed),
            })
        })
    }
}

/// Log to the test writer, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Parameter map from literal pairs.
pub fn params(entries: Vec<(&str, PackStreamValue)>) -> PackStreamMap {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
