//! Bolt protocol response messages.
//!
//! Responses are sent from the server to the client. RECORD messages that
//! arrive back to back are merged by the reader, so [`Response::Records`]
//! holds one or more rows.

use std::fmt;

use super::metadata::QueryStats;
use super::{tag, MessageKind, MessageTable};
use crate::bolt::error::BoltError;
use crate::bolt::packstream::{PackStreamMap, PackStreamValue};

/// A decoded server message.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success(SuccessMetadata),
    Records(Vec<Vec<PackStreamValue>>),
    Ignored,
    Failure(FailureMetadata),
}

impl Response {
    /// Build a response from a raw tag and its fields.
    ///
    /// For RECORD, each field is one row (already merged by the reader).
    pub fn from_message(table: &MessageTable, tag: u8, fields: Vec<PackStreamValue>) -> Result<Self, BoltError> {
        match table.response_kind(tag) {
            Some(MessageKind::Success) => Ok(Response::Success(SuccessMetadata::from_fields(fields))),
            Some(MessageKind::Record) => Ok(Response::Records(
                fields
                    .into_iter()
                    .map(|row| match row {
                        PackStreamValue::List(values) => values,
                        other => vec![other],
                    })
                    .collect(),
            )),
            Some(MessageKind::Ignored) => Ok(Response::Ignored),
            Some(MessageKind::Failure) => Ok(Response::Failure(FailureMetadata::from_fields(fields))),
            _ => Err(BoltError::protocol(format!("Unexpected protocol message #{:02X}", tag))),
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            Response::Success(_) => tag::SUCCESS,
            Response::Records(_) => tag::RECORD,
            Response::Ignored => tag::IGNORED,
            Response::Failure(_) => tag::FAILURE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Response::Success(_) => "SUCCESS",
            Response::Records(_) => "RECORD",
            Response::Ignored => "IGNORED",
            Response::Failure(_) => "FAILURE",
        }
    }
}

/// Metadata map of a SUCCESS message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessMetadata(pub PackStreamMap);

impl SuccessMetadata {
    pub fn new(map: PackStreamMap) -> Self {
        Self(map)
    }

    fn from_fields(fields: Vec<PackStreamValue>) -> Self {
        match fields.into_iter().next() {
            Some(PackStreamValue::Map(m)) => Self(m),
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PackStreamValue> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &PackStreamMap {
        &self.0
    }

    pub fn into_map(self) -> PackStreamMap {
        self.0
    }

    /// Server agent string (HELLO / INIT).
    pub fn server(&self) -> Option<&str> {
        self.get("server").and_then(|v| v.as_str())
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.get("connection_id").and_then(|v| v.as_str())
    }

    /// Column names (RUN).
    pub fn fields(&self) -> Option<Vec<String>> {
        self.get("fields").and_then(|v| v.as_string_list())
    }

    /// Query id within the transaction (RUN, Bolt 4+).
    pub fn qid(&self) -> Option<i64> {
        self.get("qid").and_then(|v| v.as_int())
    }

    /// More records remain after a bounded PULL.
    pub fn has_more(&self) -> bool {
        self.get("has_more").and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn bookmark(&self) -> Option<&str> {
        self.get("bookmark").and_then(|v| v.as_str())
    }

    pub fn db(&self) -> Option<&str> {
        self.get("db").and_then(|v| v.as_str())
    }

    pub fn result_available_after(&self) -> Option<i64> {
        self.get("t_first")
            .or_else(|| self.get("result_available_after"))
            .and_then(|v| v.as_int())
    }

    pub fn result_consumed_after(&self) -> Option<i64> {
        self.get("t_last")
            .or_else(|| self.get("result_consumed_after"))
            .and_then(|v| v.as_int())
    }

    pub fn stats(&self) -> Option<QueryStats> {
        self.get("stats").and_then(|v| v.as_map()).map(QueryStats::from_map)
    }
}

/// `{code, message}` of a FAILURE message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureMetadata {
    pub code: String,
    pub message: String,
}

impl FailureMetadata {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    fn from_fields(fields: Vec<PackStreamValue>) -> Self {
        let meta = fields.into_iter().next();
        let text = |key: &str| {
            meta.as_ref()
                .and_then(|m| m.get(key))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        Self {
            code: text("code").unwrap_or_default(),
            message: text("message").unwrap_or_default(),
        }
    }

    pub fn to_map(&self) -> PackStreamMap {
        let mut map = PackStreamMap::new();
        map.insert("code".to_string(), self.code.as_str().into());
        map.insert("message".to_string(), self.message.as_str().into());
        map
    }
}

impl fmt::Display for FailureMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
