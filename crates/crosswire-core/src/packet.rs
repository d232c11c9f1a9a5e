//! The packet: unit of call/response exchange.
//!
//! Only the six schema fields travel on the wire; the short-circuit flags and
//! the captured error are per-traversal state that never leaves the process.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::coder::Coder;
use crate::error::{CrosswireError, Result};
use crate::value::Value;

/// Fixed protocol version; packets carrying any other value are discarded.
pub const PROTOCOL_VERSION: u8 = 2;

/// Call or response packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub version: u8,
    /// Caller-chosen correlation id.
    pub id: String,
    /// Operation name, trimmed.
    pub name: String,
    /// Positional call arguments, or a one-element sequence holding a result.
    pub args: Vec<Value>,
    /// Free-form per-call annotations.
    pub meta: BTreeMap<String, Value>,
    /// A middleware replaced the result and terminated the chain.
    pub breaked: bool,

    // Traversal state, never transmitted.
    pub dropped: bool,
    pub skip_mw: bool,
    pub has_error: bool,
    pub error_description: Option<String>,
}

impl Packet {
    /// Packet with defaults for everything beyond id/name/args.
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Vec<Value>) -> Self {
        Packet {
            version: PROTOCOL_VERSION,
            id: id.into(),
            name: name.into(),
            args,
            meta: BTreeMap::new(),
            breaked: false,
            dropped: false,
            skip_mw: false,
            has_error: false,
            error_description: None,
        }
    }

    /// Structural + version validity. Invalid packets are silently discarded
    /// by the engine (which keeps a counter of them).
    pub fn check(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }

    /// Serialize the six wire fields in schema order.
    pub fn encode(&self, coder: &Coder) -> Result<Bytes> {
        let wire = Value::Seq(vec![
            Value::Int(self.version as i64),
            Value::Str(self.id.clone()),
            Value::Str(self.name.clone()),
            Value::Seq(self.args.clone()),
            Value::Map(self.meta.clone()),
            Value::Bool(self.breaked),
        ]);
        coder.encode(&wire).map_err(|e| CrosswireError::Serialize {
            name: self.name.clone(),
            reason: e.to_string(),
        })
    }

    /// Deserialize a wire packet. Type mismatches are decode errors; the
    /// version gate is left to `check()`.
    pub fn decode(coder: &Coder, raw: Bytes) -> Result<Packet> {
        let malformed = || CrosswireError::Decode("malformed packet".into());
        let Value::Seq(fields) = coder.decode(raw)? else {
            return Err(malformed());
        };
        let [Value::Int(version), Value::Str(id), Value::Str(name), Value::Seq(args), Value::Map(meta), Value::Bool(breaked)] =
            <[Value; 6]>::try_from(fields).map_err(|_| malformed())?
        else {
            return Err(malformed());
        };
        let version = u8::try_from(version).map_err(|_| malformed())?;
        Ok(Packet {
            version,
            id,
            name,
            args,
            meta,
            breaked,
            dropped: false,
            skip_mw: false,
            has_error: false,
            error_description: None,
        })
    }
}
