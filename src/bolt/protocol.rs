//! Per-version protocol behavior.
//!
//! Every implemented version is described by a small record of strategy
//! choices plus its message table. Records are declared as deltas against
//! an explicit base version and resolved once, on first use, into a flat
//! table; nothing is looked up through the base chain at runtime.

use std::sync::OnceLock;

use super::handshake::BoltVersion;
use super::message::{
    MessageTable, BOLT1_MESSAGES, BOLT3_MESSAGES, BOLT4_3_MESSAGES, BOLT4_MESSAGES,
};

/// How the session authenticates after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloStyle {
    /// `INIT user_agent auth`; the server agent must carry the expected prefix.
    Init,
    /// `HELLO {user_agent, scheme, principal, credentials}`.
    Hello,
}

/// How transactions are demarcated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStyle {
    /// `RUN "BEGIN"|"COMMIT"|"ROLLBACK"` followed by DISCARD_ALL.
    Embedded,
    /// BEGIN, COMMIT and ROLLBACK messages.
    Explicit,
}

/// How results are pulled and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStyle {
    /// PULL_ALL / DISCARD_ALL; only the last result is addressable.
    All,
    /// PULL / DISCARD with `{n, qid}`.
    Numbered,
}

/// How the routing table is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStyle {
    /// `dbms.cluster.routing.getRoutingTable($context)`, clusters only.
    ClusterProcedure,
    /// `dbms.routing.getRoutingTable($context[, $database])` against "system".
    RoutingProcedure,
    /// The ROUTE message.
    RouteMessage,
}

/// Resolved behavior of one protocol version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSpec {
    pub version: BoltVersion,
    /// Version this record inherited unset fields from.
    pub base: Option<BoltVersion>,
    pub messages: &'static MessageTable,
    pub hello: HelloStyle,
    pub tx: TxStyle,
    pub pull: PullStyle,
    pub route: RouteStyle,
    /// Whether GOODBYE is sent on a polite close.
    pub goodbye: bool,
    /// Whether named graphs can be selected.
    pub multi_db: bool,
}

impl ProtocolSpec {
    /// Behavior record for `version`.
    pub fn for_version(version: BoltVersion) -> &'static ProtocolSpec {
        let table = TABLE.get_or_init(resolve);
        table
            .iter()
            .find(|spec| spec.version == version)
            .unwrap_or(&ROOT)
    }
}

/// Overrides relative to `base`; `None` inherits.
struct Delta {
    version: BoltVersion,
    base: BoltVersion,
    messages: Option<&'static MessageTable>,
    hello: Option<HelloStyle>,
    tx: Option<TxStyle>,
    pull: Option<PullStyle>,
    route: Option<RouteStyle>,
    goodbye: Option<bool>,
    multi_db: Option<bool>,
}

impl Delta {
    const fn inherit(version: BoltVersion, base: BoltVersion) -> Self {
        Self {
            version,
            base,
            messages: None,
            hello: None,
            tx: None,
            pull: None,
            route: None,
            goodbye: None,
            multi_db: None,
        }
    }
}

static ROOT: ProtocolSpec = ProtocolSpec {
    version: BoltVersion::V1_0,
    base: None,
    messages: &BOLT1_MESSAGES,
    hello: HelloStyle::Init,
    tx: TxStyle::Embedded,
    pull: PullStyle::All,
    route: RouteStyle::ClusterProcedure,
    goodbye: false,
    multi_db: false,
};

// Each delta's base must appear earlier in this list.
static DELTAS: [Delta; 6] = [
    Delta::inherit(BoltVersion::V2_0, BoltVersion::V1_0),
    Delta {
        messages: Some(&BOLT3_MESSAGES),
        hello: Some(HelloStyle::Hello),
        tx: Some(TxStyle::Explicit),
        goodbye: Some(true),
        ..Delta::inherit(BoltVersion::V3_0, BoltVersion::V2_0)
    },
    Delta {
        messages: Some(&BOLT4_MESSAGES),
        pull: Some(PullStyle::Numbered),
        route: Some(RouteStyle::RoutingProcedure),
        multi_db: Some(true),
        ..Delta::inherit(BoltVersion::V4_0, BoltVersion::V3_0)
    },
    Delta::inherit(BoltVersion::V4_1, BoltVersion::V4_0),
    Delta::inherit(BoltVersion::V4_2, BoltVersion::V4_1),
    Delta {
        messages: Some(&BOLT4_3_MESSAGES),
        route: Some(RouteStyle::RouteMessage),
        ..Delta::inherit(BoltVersion::V4_3, BoltVersion::V4_2)
    },
];

static TABLE: OnceLock<Vec<ProtocolSpec>> = OnceLock::new();

fn resolve() -> Vec<ProtocolSpec> {
    let mut table = vec![ROOT.clone()];
    for delta in DELTAS.iter() {
        let base = table
            .iter()
            .find(|spec| spec.version == delta.base)
            .unwrap_or(&ROOT);
        let spec = ProtocolSpec {
            version: delta.version,
            base: Some(delta.base),
            messages: delta.messages.unwrap_or(base.messages),
            hello: delta.hello.unwrap_or(base.hello),
            tx: delta.tx.unwrap_or(base.tx),
            pull: delta.pull.unwrap_or(base.pull),
            route: delta.route.unwrap_or(base.route),
            goodbye: delta.goodbye.unwrap_or(base.goodbye),
            multi_db: delta.multi_db.unwrap_or(base.multi_db),
        };
        table.push(spec);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::MessageKind;

    #[test]
    fn test_every_version_resolves_to_itself() {
        for version in BoltVersion::ALL {
            assert_eq!(ProtocolSpec::for_version(version).version, version);
        }
    }

    #[test]
    fn test_bolt2_inherits_everything() {
        let v1 = ProtocolSpec::for_version(BoltVersion::V1_0);
        let v2 = ProtocolSpec::for_version(BoltVersion::V2_0);
        assert_eq!(v2.base, Some(BoltVersion::V1_0));
        assert_eq!(v2.messages, v1.messages);
        assert_eq!(v2.hello, HelloStyle::Init);
        assert_eq!(v2.tx, TxStyle::Embedded);
        assert!(!v2.goodbye);
    }

    #[test]
    fn test_bolt3_overrides() {
        let v3 = ProtocolSpec::for_version(BoltVersion::V3_0);
        assert_eq!(v3.hello, HelloStyle::Hello);
        assert_eq!(v3.tx, TxStyle::Explicit);
        assert_eq!(v3.pull, PullStyle::All);
        assert_eq!(v3.route, RouteStyle::ClusterProcedure);
        assert!(v3.goodbye);
        assert!(!v3.multi_db);
        assert_eq!(v3.messages.tag(MessageKind::Begin), Some(0x11));
    }

    #[test]
    fn test_bolt4_family() {
        for version in [BoltVersion::V4_0, BoltVersion::V4_1, BoltVersion::V4_2] {
            let spec = ProtocolSpec::for_version(version);
            assert_eq!(spec.pull, PullStyle::Numbered);
            assert_eq!(spec.route, RouteStyle::RoutingProcedure);
            assert!(spec.multi_db);
            assert!(spec.goodbye);
            assert!(!spec.messages.supports(MessageKind::Route));
        }
        let v43 = ProtocolSpec::for_version(BoltVersion::V4_3);
        assert_eq!(v43.base, Some(BoltVersion::V4_2));
        assert_eq!(v43.route, RouteStyle::RouteMessage);
        assert_eq!(v43.pull, PullStyle::Numbered);
        assert!(v43.messages.supports(MessageKind::Route));
    }
}
