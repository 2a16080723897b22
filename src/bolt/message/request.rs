//! Bolt protocol request messages.
//!
//! A [`Request`] is a symbolic message plus its fields. Which tag byte it
//! is written as is decided by the session's message table, so the same
//! request can be sent on any version that defines its kind.

use std::fmt;

use super::MessageKind;
use crate::bolt::packstream::{PackStreamMap, PackStreamValue};

/// Placeholder written to logs instead of credentials.
pub const MASKED_CREDENTIALS: &str = "*******";

/// Access mode for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Read-write access (default)
    #[default]
    Write,
    /// Read-only access
    Read,
}

impl AccessMode {
    pub fn from_readonly(readonly: bool) -> Self {
        if readonly {
            AccessMode::Read
        } else {
            AccessMode::Write
        }
    }

    /// Value of the `mode` entry in transaction metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::Write => "w",
        }
    }
}

/// Authentication token sent in INIT or HELLO.
#[derive(Clone, PartialEq)]
pub struct AuthToken {
    /// Authentication scheme (e.g., "basic", "none")
    pub scheme: String,
    /// Principal (username)
    pub principal: Option<String>,
    /// Credentials (password)
    pub credentials: Option<String>,
    /// Realm
    pub realm: Option<String>,
}

impl AuthToken {
    pub fn basic(principal: impl Into<String>, credentials: impl Into<String>) -> Self {
        Self {
            scheme: "basic".to_string(),
            principal: Some(principal.into()),
            credentials: Some(credentials.into()),
            realm: None,
        }
    }

    /// Anonymous token.
    pub fn none() -> Self {
        Self {
            scheme: "none".to_string(),
            principal: None,
            credentials: None,
            realm: None,
        }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Write the token's entries into `map`.
    pub fn write_into(&self, map: &mut PackStreamMap) {
        map.insert("scheme".to_string(), self.scheme.as_str().into());
        if let Some(ref p) = self.principal {
            map.insert("principal".to_string(), p.as_str().into());
        }
        if let Some(ref c) = self.credentials {
            map.insert("credentials".to_string(), c.as_str().into());
        }
        if let Some(ref r) = self.realm {
            map.insert("realm".to_string(), r.as_str().into());
        }
    }

    pub fn to_map(&self) -> PackStreamMap {
        let mut map = PackStreamMap::new();
        self.write_into(&mut map);
        map
    }
}

impl Default for AuthToken {
    fn default() -> Self {
        AuthToken::none()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("scheme", &self.scheme)
            .field("principal", &self.principal)
            .field("credentials", &self.credentials.as_ref().map(|_| MASKED_CREDENTIALS))
            .field("realm", &self.realm)
            .finish()
    }
}

/// An outbound message before tag resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub kind: MessageKind,
    pub fields: Vec<PackStreamValue>,
}

impl Request {
    pub fn new(kind: MessageKind, fields: Vec<PackStreamValue>) -> Self {
        Self { kind, fields }
    }

    /// Bolt 1/2 `INIT user_agent auth`.
    pub fn init(user_agent: &str, auth: &AuthToken) -> Self {
        Self::new(MessageKind::Init, vec![user_agent.into(), auth.to_map().into()])
    }

    /// Bolt 3+ `HELLO extra`, where `extra` carries the user agent and auth.
    pub fn hello(user_agent: &str, auth: &AuthToken) -> Self {
        let mut extra = PackStreamMap::new();
        extra.insert("user_agent".to_string(), user_agent.into());
        auth.write_into(&mut extra);
        Self::new(MessageKind::Hello, vec![extra.into()])
    }

    pub fn goodbye() -> Self {
        Self::new(MessageKind::Goodbye, vec![])
    }

    pub fn reset() -> Self {
        Self::new(MessageKind::Reset, vec![])
    }

    /// `RUN query params [extra]`. Bolt 1/2 take no extra map.
    pub fn run(query: &str, params: PackStreamMap, extra: Option<PackStreamMap>) -> Self {
        let mut fields = vec![query.into(), params.into()];
        if let Some(extra) = extra {
            fields.push(extra.into());
        }
        Self::new(MessageKind::Run, fields)
    }

    pub fn begin(extra: PackStreamMap) -> Self {
        Self::new(MessageKind::Begin, vec![extra.into()])
    }

    pub fn commit() -> Self {
        Self::new(MessageKind::Commit, vec![])
    }

    pub fn rollback() -> Self {
        Self::new(MessageKind::Rollback, vec![])
    }

    pub fn discard_all() -> Self {
        Self::new(MessageKind::DiscardAll, vec![])
    }

    pub fn pull_all() -> Self {
        Self::new(MessageKind::PullAll, vec![])
    }

    /// Bolt 4 `DISCARD {n, qid}`.
    pub fn discard(n: i64, qid: i64) -> Self {
        Self::new(MessageKind::Discard, vec![Self::flow_args(n, qid)])
    }

    /// Bolt 4 `PULL {n, qid}`.
    pub fn pull(n: i64, qid: i64) -> Self {
        Self::new(MessageKind::Pull, vec![Self::flow_args(n, qid)])
    }

    /// Bolt 4.3 `ROUTE context bookmarks db`.
    pub fn route(context: PackStreamMap, bookmarks: Vec<String>, db: Option<&str>) -> Self {
        Self::new(
            MessageKind::Route,
            vec![context.into(), bookmarks.into(), db.into()],
        )
    }

    fn flow_args(n: i64, qid: i64) -> PackStreamValue {
        PackStreamValue::map([("n", n.into()), ("qid", qid.into())])
    }

    /// Fields as they should appear in logs, with credentials masked.
    pub fn loggable_fields(&self) -> Vec<PackStreamValue> {
        if !matches!(self.kind, MessageKind::Init | MessageKind::Hello) {
            return self.fields.clone();
        }
        self.fields
            .iter()
            .map(|field| match field {
                PackStreamValue::Map(m) if m.contains_key("credentials") => {
                    let mut masked = m.clone();
                    masked.insert("credentials".to_string(), MASKED_CREDENTIALS.into());
                    PackStreamValue::Map(masked)
                }
                other => other.clone(),
            })
            .collect()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for field in self.loggable_fields() {
            write!(f, " {}", field)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_carries_user_agent_and_auth() {
        let req = Request::hello("graphbolt/0.1", &AuthToken::basic("neo4j", "secret"));
        assert_eq!(req.kind, MessageKind::Hello);
        assert_eq!(req.fields.len(), 1);
        let extra = &req.fields[0];
        assert_eq!(extra.get("user_agent").and_then(|v| v.as_str()), Some("graphbolt/0.1"));
        assert_eq!(extra.get("scheme").and_then(|v| v.as_str()), Some("basic"));
        assert_eq!(extra.get("credentials").and_then(|v| v.as_str()), Some("secret"));
    }

    #[test]
    fn test_init_has_two_fields() {
        let req = Request::init("ua", &AuthToken::basic("u", "p"));
        assert_eq!(req.fields.len(), 2);
        assert_eq!(req.fields[0].as_str(), Some("ua"));
        assert!(req.fields[1].get("principal").is_some());
    }

    #[test]
    fn test_credentials_are_masked_in_display() {
        let req = Request::hello("ua", &AuthToken::basic("neo4j", "secret"));
        let line = req.to_string();
        assert!(line.starts_with("HELLO "));
        assert!(!line.contains("secret"));
        assert!(line.contains(MASKED_CREDENTIALS));
        // The real fields are untouched.
        assert_eq!(req.fields[0].get("credentials").and_then(|v| v.as_str()), Some("secret"));

        let debug = format!("{:?}", AuthToken::basic("neo4j", "secret"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_run_extra_is_optional() {
        assert_eq!(Request::run("RETURN 1", PackStreamMap::new(), None).fields.len(), 2);
        assert_eq!(
            Request::run("RETURN 1", PackStreamMap::new(), Some(PackStreamMap::new())).fields.len(),
            3
        );
    }

    #[test]
    fn test_pull_and_discard_args() {
        let pull = Request::pull(-1, 2);
        assert_eq!(pull.fields[0].get("n").and_then(|v| v.as_int()), Some(-1));
        assert_eq!(pull.fields[0].get("qid").and_then(|v| v.as_int()), Some(2));
        assert_eq!(Request::discard(-1, -1).kind, MessageKind::Discard);
    }

    #[test]
    fn test_route_fields() {
        let req = Request::route(PackStreamMap::new(), vec![], Some("movies"));
        assert_eq!(req.fields.len(), 3);
        assert_eq!(req.fields[2].as_str(), Some("movies"));
        let req = Request::route(PackStreamMap::new(), vec![], None);
        assert!(req.fields[2].is_null());
    }

    #[test]
    fn test_access_mode() {
        assert_eq!(AccessMode::from_readonly(true).as_str(), "r");
        assert_eq!(AccessMode::default(), AccessMode::Write);
    }
}
