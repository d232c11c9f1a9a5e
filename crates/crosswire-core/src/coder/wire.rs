//! Native wire encoding (panic-free).
//!
//! Layout: one tag byte, then a fixed-width or length-prefixed payload.
//! Lengths and counts are u32 LE. Tags `0x80..` belong to the extension
//! registry and carry a length-prefixed opaque payload.
//!
//! Parsing rules:
//! - Never index (`buf[0]`) — always use `Buf` and `remaining()` checks.
//! - Never `unwrap()` / `expect()` / `panic!()`.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CrosswireError, Result};
use crate::value::Value;

use super::Coder;

pub const TAG_NULL: u8 = 0x00;
pub const TAG_FALSE: u8 = 0x01;
pub const TAG_TRUE: u8 = 0x02;
pub const TAG_INT: u8 = 0x03;
pub const TAG_FLOAT: u8 = 0x04;
pub const TAG_STR: u8 = 0x05;
pub const TAG_BYTES: u8 = 0x06;
pub const TAG_SEQ: u8 = 0x07;
pub const TAG_MAP: u8 = 0x08;

/// First tag of the extension range.
pub const EXT_TAG_BASE: u8 = 0x80;

fn short(what: &str) -> CrosswireError {
    CrosswireError::Decode(format!("truncated input reading {what}"))
}

/// Look at the next tag without consuming it.
pub fn peek_tag(buf: &Bytes) -> Result<u8> {
    buf.first().copied().ok_or_else(|| short("tag"))
}

fn read_len(buf: &mut Bytes, what: &str) -> Result<usize> {
    if buf.remaining() < 4 {
        return Err(short(what));
    }
    Ok(buf.get_u32_le() as usize)
}

fn read_exact(buf: &mut Bytes, len: usize, what: &str) -> Result<Bytes> {
    if buf.remaining() < len {
        return Err(short(what));
    }
    Ok(buf.copy_to_bytes(len))
}

fn read_str(buf: &mut Bytes) -> Result<String> {
    let len = read_len(buf, "string length")?;
    let raw = read_exact(buf, len, "string payload")?;
    String::from_utf8(raw.to_vec())
        .map_err(|e| CrosswireError::Decode(format!("invalid utf8: {e}")))
}

fn write_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

/// Write an extension-tagged payload.
pub fn write_ext(buf: &mut BytesMut, tag: u8, payload: &Bytes) {
    buf.put_u8(tag);
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
}

/// Read an extension tag plus its opaque payload.
pub fn read_ext(buf: &mut Bytes) -> Result<(u8, Bytes)> {
    if !buf.has_remaining() {
        return Err(short("ext tag"));
    }
    let tag = buf.get_u8();
    let len = read_len(buf, "ext payload length")?;
    let payload = read_exact(buf, len, "ext payload")?;
    Ok((tag, payload))
}

/// Encode a native value. Non-native variants must have been claimed by an
/// extension codec before this point.
pub fn write_native(coder: &Coder, v: &Value, buf: &mut BytesMut) -> Result<()> {
    match v {
        Value::Null => buf.put_u8(TAG_NULL),
        Value::Bool(false) => buf.put_u8(TAG_FALSE),
        Value::Bool(true) => buf.put_u8(TAG_TRUE),
        Value::Int(n) => {
            buf.put_u8(TAG_INT);
            buf.put_i64_le(*n);
        }
        Value::Float(f) => {
            buf.put_u8(TAG_FLOAT);
            buf.put_f64_le(*f);
        }
        Value::Str(s) => {
            buf.put_u8(TAG_STR);
            write_str(buf, s);
        }
        Value::Bytes(b) => {
            buf.put_u8(TAG_BYTES);
            buf.put_u32_le(b.len() as u32);
            buf.put_slice(b);
        }
        Value::Seq(items) => {
            buf.put_u8(TAG_SEQ);
            buf.put_u32_le(items.len() as u32);
            for item in items {
                coder.encode_into(item, buf)?;
            }
        }
        Value::Map(map) => {
            buf.put_u8(TAG_MAP);
            buf.put_u32_le(map.len() as u32);
            for (k, item) in map {
                write_str(buf, k);
                coder.encode_into(item, buf)?;
            }
        }
        other => {
            return Err(CrosswireError::Decode(format!(
                "no codec claims value {other:?}"
            )))
        }
    }
    Ok(())
}

/// Decode a native value from its tag onward.
pub fn read_native(coder: &Coder, buf: &mut Bytes, depth: usize) -> Result<Value> {
    if !buf.has_remaining() {
        return Err(short("tag"));
    }
    let tag = buf.get_u8();
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_FALSE => Ok(Value::Bool(false)),
        TAG_TRUE => Ok(Value::Bool(true)),
        TAG_INT => {
            if buf.remaining() < 8 {
                return Err(short("i64"));
            }
            Ok(Value::Int(buf.get_i64_le()))
        }
        TAG_FLOAT => {
            if buf.remaining() < 8 {
                return Err(short("f64"));
            }
            Ok(Value::Float(buf.get_f64_le()))
        }
        TAG_STR => Ok(Value::Str(read_str(buf)?)),
        TAG_BYTES => {
            let len = read_len(buf, "bytes length")?;
            Ok(Value::Bytes(read_exact(buf, len, "bytes payload")?))
        }
        TAG_SEQ => {
            let count = read_len(buf, "seq count")?;
            let mut items = Vec::new();
            for _ in 0..count {
                items.push(coder.decode_at(buf, depth + 1)?);
            }
            Ok(Value::Seq(items))
        }
        TAG_MAP => {
            let count = read_len(buf, "map count")?;
            let mut map = BTreeMap::new();
            for _ in 0..count {
                let k = read_str(buf)?;
                let v = coder.decode_at(buf, depth + 1)?;
                map.insert(k, v);
            }
            Ok(Value::Map(map))
        }
        other => Err(CrosswireError::Decode(format!(
            "unknown native tag {other:#04x}"
        ))),
    }
}
