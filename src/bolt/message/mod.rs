//! Bolt protocol message types.
//!
//! Messages are named symbolically by [`MessageKind`]. The byte each kind
//! is sent as depends on the negotiated version and is looked up in a
//! [`MessageTable`]; the tables for every implemented version live here.

pub mod metadata;
pub mod request;
pub mod response;

pub use metadata::{QueryStats, RoutingInfo};
pub use request::{AccessMode, AuthToken, Request};
pub use response::{FailureMetadata, Response, SuccessMetadata};

use std::fmt;

/// Bolt message tags.
pub mod tag {
    /// INIT message tag (0x01) - Bolt 1/2
    pub const INIT: u8 = 0x01;
    /// HELLO message tag (0x01) - Bolt 3+
    pub const HELLO: u8 = 0x01;
    /// GOODBYE message tag (0x02)
    pub const GOODBYE: u8 = 0x02;
    /// ACK_FAILURE message tag (0x0E) - Bolt 1/2
    pub const ACK_FAILURE: u8 = 0x0E;
    /// RESET message tag (0x0F)
    pub const RESET: u8 = 0x0F;
    /// RUN message tag (0x10)
    pub const RUN: u8 = 0x10;
    /// BEGIN message tag (0x11)
    pub const BEGIN: u8 = 0x11;
    /// COMMIT message tag (0x12)
    pub const COMMIT: u8 = 0x12;
    /// ROLLBACK message tag (0x13)
    pub const ROLLBACK: u8 = 0x13;
    /// DISCARD / DISCARD_ALL message tag (0x2F)
    pub const DISCARD: u8 = 0x2F;
    /// PULL / PULL_ALL message tag (0x3F)
    pub const PULL: u8 = 0x3F;
    /// ROUTE message tag (0x66) - Bolt 4.3+
    pub const ROUTE: u8 = 0x66;

    /// SUCCESS response tag (0x70)
    pub const SUCCESS: u8 = 0x70;
    /// RECORD response tag (0x71)
    pub const RECORD: u8 = 0x71;
    /// IGNORED response tag (0x7E)
    pub const IGNORED: u8 = 0x7E;
    /// FAILURE response tag (0x7F)
    pub const FAILURE: u8 = 0x7F;
}

/// Symbolic message names, independent of protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Init,
    Hello,
    Goodbye,
    AckFailure,
    Reset,
    Run,
    Begin,
    Commit,
    Rollback,
    DiscardAll,
    PullAll,
    Discard,
    Pull,
    Route,
    Success,
    Record,
    Ignored,
    Failure,
}

impl MessageKind {
    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Init => "INIT",
            MessageKind::Hello => "HELLO",
            MessageKind::Goodbye => "GOODBYE",
            MessageKind::AckFailure => "ACK_FAILURE",
            MessageKind::Reset => "RESET",
            MessageKind::Run => "RUN",
            MessageKind::Begin => "BEGIN",
            MessageKind::Commit => "COMMIT",
            MessageKind::Rollback => "ROLLBACK",
            MessageKind::DiscardAll => "DISCARD_ALL",
            MessageKind::PullAll => "PULL_ALL",
            MessageKind::Discard => "DISCARD",
            MessageKind::Pull => "PULL",
            MessageKind::Route => "ROUTE",
            MessageKind::Success => "SUCCESS",
            MessageKind::Record => "RECORD",
            MessageKind::Ignored => "IGNORED",
            MessageKind::Failure => "FAILURE",
        }
    }

    /// True for messages the server sends.
    pub fn is_response(self) -> bool {
        matches!(
            self,
            MessageKind::Success | MessageKind::Record | MessageKind::Ignored | MessageKind::Failure
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mapping between symbolic message kinds and tag bytes for one protocol
/// family. A kind absent from the table cannot be sent on that version.
#[derive(Debug, PartialEq, Eq)]
pub struct MessageTable {
    pub name: &'static str,
    entries: &'static [(MessageKind, u8)],
}

impl MessageTable {
    /// Tag byte for `kind`, if this table defines it.
    pub fn tag(&self, kind: MessageKind) -> Option<u8> {
        self.entries.iter().find(|(k, _)| *k == kind).map(|(_, t)| *t)
    }

    /// Response kind for an incoming tag byte.
    pub fn response_kind(&self, tag: u8) -> Option<MessageKind> {
        self.entries
            .iter()
            .find(|(k, t)| *t == tag && k.is_response())
            .map(|(k, _)| *k)
    }

    pub fn supports(&self, kind: MessageKind) -> bool {
        self.tag(kind).is_some()
    }
}

const RESPONSES: [(MessageKind, u8); 4] = [
    (MessageKind::Success, tag::SUCCESS),
    (MessageKind::Record, tag::RECORD),
    (MessageKind::Ignored, tag::IGNORED),
    (MessageKind::Failure, tag::FAILURE),
];

/// Bolt 1 and 2.
pub static BOLT1_MESSAGES: MessageTable = MessageTable {
    name: "BOLT1",
    entries: &[
        (MessageKind::Init, tag::INIT),
        (MessageKind::AckFailure, tag::ACK_FAILURE),
        (MessageKind::Reset, tag::RESET),
        (MessageKind::Run, tag::RUN),
        (MessageKind::DiscardAll, tag::DISCARD),
        (MessageKind::PullAll, tag::PULL),
        RESPONSES[0],
        RESPONSES[1],
        RESPONSES[2],
        RESPONSES[3],
    ],
};

/// Bolt 3.
pub static BOLT3_MESSAGES: MessageTable = MessageTable {
    name: "BOLT3",
    entries: &[
        (MessageKind::Hello, tag::HELLO),
        (MessageKind::Goodbye, tag::GOODBYE),
        (MessageKind::Reset, tag::RESET),
        (MessageKind::Run, tag::RUN),
        (MessageKind::Begin, tag::BEGIN),
        (MessageKind::Commit, tag::COMMIT),
        (MessageKind::Rollback, tag::ROLLBACK),
        (MessageKind::DiscardAll, tag::DISCARD),
        (MessageKind::PullAll, tag::PULL),
        RESPONSES[0],
        RESPONSES[1],
        RESPONSES[2],
        RESPONSES[3],
    ],
};

/// Bolt 4.0 to 4.2: DISCARD and PULL take `{n, qid}`.
pub static BOLT4_MESSAGES: MessageTable = MessageTable {
    name: "BOLT4",
    entries: &[
        (MessageKind::Hello, tag::HELLO),
        (MessageKind::Goodbye, tag::GOODBYE),
        (MessageKind::Reset, tag::RESET),
        (MessageKind::Run, tag::RUN),
        (MessageKind::Begin, tag::BEGIN),
        (MessageKind::Commit, tag::COMMIT),
        (MessageKind::Rollback, tag::ROLLBACK),
        (MessageKind::Discard, tag::DISCARD),
        (MessageKind::Pull, tag::PULL),
        RESPONSES[0],
        RESPONSES[1],
        RESPONSES[2],
        RESPONSES[3],
    ],
};

/// Bolt 4.3: adds ROUTE.
pub static BOLT4_3_MESSAGES: MessageTable = MessageTable {
    name: "BOLT4.3",
    entries: &[
        (MessageKind::Hello, tag::HELLO),
        (MessageKind::Goodbye, tag::GOODBYE),
        (MessageKind::Reset, tag::RESET),
        (MessageKind::Run, tag::RUN),
        (MessageKind::Begin, tag::BEGIN),
        (MessageKind::Commit, tag::COMMIT),
        (MessageKind::Rollback, tag::ROLLBACK),
        (MessageKind::Discard, tag::DISCARD),
        (MessageKind::Pull, tag::PULL),
        (MessageKind::Route, tag::ROUTE),
        RESPONSES[0],
        RESPONSES[1],
        RESPONSES[2],
        RESPONSES[3],
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bolt1_table() {
        assert_eq!(BOLT1_MESSAGES.tag(MessageKind::Init), Some(0x01));
        assert_eq!(BOLT1_MESSAGES.tag(MessageKind::AckFailure), Some(0x0E));
        assert_eq!(BOLT1_MESSAGES.tag(MessageKind::PullAll), Some(0x3F));
        assert!(!BOLT1_MESSAGES.supports(MessageKind::Begin));
        assert!(!BOLT1_MESSAGES.supports(MessageKind::Goodbye));
    }

    #[test]
    fn test_bolt3_table() {
        assert_eq!(BOLT3_MESSAGES.tag(MessageKind::Begin), Some(0x11));
        assert_eq!(BOLT3_MESSAGES.tag(MessageKind::Commit), Some(0x12));
        assert_eq!(BOLT3_MESSAGES.tag(MessageKind::Rollback), Some(0x13));
        assert_eq!(BOLT3_MESSAGES.tag(MessageKind::Goodbye), Some(0x02));
        assert!(!BOLT3_MESSAGES.supports(MessageKind::Init));
        assert!(!BOLT3_MESSAGES.supports(MessageKind::Pull));
    }

    #[test]
    fn test_bolt4_tables() {
        assert_eq!(BOLT4_MESSAGES.tag(MessageKind::Pull), Some(0x3F));
        assert_eq!(BOLT4_MESSAGES.tag(MessageKind::Discard), Some(0x2F));
        assert!(!BOLT4_MESSAGES.supports(MessageKind::PullAll));
        assert!(!BOLT4_MESSAGES.supports(MessageKind::Route));
        assert_eq!(BOLT4_3_MESSAGES.tag(MessageKind::Route), Some(0x66));
    }

    #[test]
    fn test_response_lookup_ignores_requests() {
        // 0x01 is HELLO, a request
        assert_eq!(BOLT3_MESSAGES.response_kind(0x01), None);
        assert_eq!(BOLT3_MESSAGES.response_kind(0x71), Some(MessageKind::Record));
        assert_eq!(BOLT1_MESSAGES.response_kind(0x7E), Some(MessageKind::Ignored));
        assert_eq!(BOLT4_3_MESSAGES.response_kind(0x00), None);
    }
}
