//! Extensible tagged binary coder.
//!
//! Native primitives are encoded by `wire`; everything else goes through the
//! extension registry: registered codecs are tried in registration order
//! before native encoding, and decode dispatches on the tag byte. The status
//! sentinels, the absent-value sentinel, regex literals, big decimals,
//! timestamps, and durations ship as pre-registered extensions on reserved
//! tags; those tags are not user-assignable.
//!
//! All decoding is panic-free: `bytes::Buf` with `remaining()` checks, never
//! raw indexing.

pub mod ext;
pub mod wire;

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{CrosswireError, Result};
use crate::value::Value;

pub use ext::ExtCodec;

struct ExtEntry {
    tag: u8,
    codec: Arc<dyn ExtCodec>,
}

/// Value coder with an extension registry.
pub struct Coder {
    exts: Vec<ExtEntry>,
}

/// Maximum container/extension nesting accepted while decoding. Hostile
/// input deeper than this is a decode error, not unbounded recursion.
pub const MAX_DEPTH: usize = 128;

/// Tags reserved for the built-in extensions.
pub const RESERVED_TAGS: [u8; 8] = [
    ext::TAG_NOT_FOUND,
    ext::TAG_ABSENT,
    ext::TAG_REGEX,
    ext::TAG_API_ERROR,
    ext::TAG_TIMEOUT,
    ext::TAG_BIG_DECIMAL,
    ext::TAG_TIMESTAMP,
    ext::TAG_DURATION,
];

impl Default for Coder {
    fn default() -> Self {
        Self::new()
    }
}

impl Coder {
    /// New coder with the built-in extensions registered.
    pub fn new() -> Self {
        let mut coder = Coder { exts: Vec::new() };
        for (tag, codec) in ext::builtin_codecs() {
            coder.exts.push(ExtEntry { tag, codec });
        }
        coder
    }

    /// Register a custom extension codec.
    ///
    /// Predicates are tried in registration order (built-ins first). Tags must
    /// be in the extension range (`0x80..`), unique, and not reserved.
    pub fn use_ext(&mut self, tag: u8, codec: Arc<dyn ExtCodec>) -> Result<()> {
        if RESERVED_TAGS.contains(&tag) {
            return Err(CrosswireError::ReservedTag(tag));
        }
        if tag < wire::EXT_TAG_BASE {
            return Err(CrosswireError::Config(format!(
                "coder tag {tag:#04x} collides with the native range"
            )));
        }
        if self.exts.iter().any(|e| e.tag == tag) {
            return Err(CrosswireError::Config(format!(
                "coder tag {tag:#04x} already registered"
            )));
        }
        self.exts.push(ExtEntry { tag, codec });
        Ok(())
    }

    /// Encode a value to bytes.
    pub fn encode(&self, v: &Value) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode_into(v, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode a single value, requiring the input to be fully consumed.
    pub fn decode(&self, raw: Bytes) -> Result<Value> {
        self.decode_nested(raw, 0)
    }

    /// Decode a complete payload nested at `depth`. Extension codecs use this
    /// for their inner values so the nesting bound spans their re-entry.
    pub fn decode_nested(&self, raw: Bytes, depth: usize) -> Result<Value> {
        let mut buf = raw;
        let v = self.decode_at(&mut buf, depth)?;
        if buf.has_remaining() {
            return Err(CrosswireError::Decode(format!(
                "{} trailing bytes after value",
                buf.remaining()
            )));
        }
        Ok(v)
    }

    /// Encode a value into a buffer (extensions first, then native).
    pub fn encode_into(&self, v: &Value, buf: &mut BytesMut) -> Result<()> {
        for e in &self.exts {
            if e.codec.matches(v) {
                let payload = e.codec.encode(v, self)?;
                wire::write_ext(buf, e.tag, &payload);
                return Ok(());
            }
        }
        wire::write_native(self, v, buf)
    }

    /// Decode a single value from a buffer, advancing it.
    pub fn decode_from(&self, buf: &mut Bytes) -> Result<Value> {
        self.decode_at(buf, 0)
    }

    pub(crate) fn decode_at(&self, buf: &mut Bytes, depth: usize) -> Result<Value> {
        if depth >= MAX_DEPTH {
            return Err(CrosswireError::Decode("nesting too deep".into()));
        }
        let tag = wire::peek_tag(buf)?;
        if tag >= wire::EXT_TAG_BASE {
            let (tag, payload) = wire::read_ext(buf)?;
            let entry = self
                .exts
                .iter()
                .find(|e| e.tag == tag)
                .ok_or_else(|| CrosswireError::Decode(format!("unknown coder tag {tag:#04x}")))?;
            return entry.codec.decode(payload, self, depth + 1);
        }
        wire::read_native(self, buf, depth)
    }
}
