//! The value model carried in packet args and meta.
//!
//! `Value` is the closed set of wire-representable data. Status sentinels are
//! a dedicated enum variant rather than magic objects, so they can never be
//! confused with ordinary data and always round-trip through the coder.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Reserved status sentinels, distinct from any ordinary value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// No handler registered for the called name.
    NotFound,
    /// No response within the configured window.
    Timeout,
    /// A handler or middleware raised an error.
    ApiError,
}

impl Status {
    /// Fixed string tag used when a status is surfaced as a rejection.
    pub fn tag(self) -> &'static str {
        match self {
            Status::NotFound => "API_NOT_FOUND",
            Status::Timeout => "API_TIMEOUT",
            Status::ApiError => "API_ERROR",
        }
    }
}

/// A wire-representable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    /// The "absent value" sentinel (a call that resolved to nothing).
    Absent,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Bytes),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Status sentinel (NOT_FOUND / TIMEOUT / API_ERROR).
    Status(Status),
    /// Regular-expression literal, kept as source text plus flags.
    Regex { pattern: String, flags: String },
    /// Arbitrary-precision decimal, kept as its normalized string form.
    BigDecimal(String),
    Timestamp(DateTime<Utc>),
    /// Duration in milliseconds.
    Duration(i64),
}

impl Value {
    /// Empty map, the fallback for unresolved context injections.
    pub fn empty_map() -> Value {
        Value::Map(BTreeMap::new())
    }

    pub fn is_status(&self) -> bool {
        matches!(self, Value::Status(_))
    }

    pub fn as_status(&self) -> Option<Status> {
        match self {
            Value::Status(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Seq(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<Status> for Value {
    fn from(s: Status) -> Self {
        Value::Status(s)
    }
}
