//! Extension codecs: the built-in reserved types plus the user trait.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::error::{CrosswireError, Result};
use crate::value::{Status, Value};

use super::Coder;

pub const TAG_NOT_FOUND: u8 = 0xF0;
pub const TAG_ABSENT: u8 = 0xF1;
pub const TAG_REGEX: u8 = 0xF2;
pub const TAG_API_ERROR: u8 = 0xF3;
pub const TAG_TIMEOUT: u8 = 0xF4;
pub const TAG_BIG_DECIMAL: u8 = 0xFA;
pub const TAG_TIMESTAMP: u8 = 0xFB;
pub const TAG_DURATION: u8 = 0xFC;

/// A codec for one extension tag.
///
/// `matches` predicates are tried in registration order during encode;
/// `decode` is dispatched by tag. Nested values go back through the coder
/// via [`Coder::decode_nested`] with the given `depth`, which keeps deeply
/// stacked extension frames within the overall nesting bound.
pub trait ExtCodec: Send + Sync {
    fn matches(&self, v: &Value) -> bool;
    fn encode(&self, v: &Value, coder: &Coder) -> Result<Bytes>;
    fn decode(&self, payload: Bytes, coder: &Coder, depth: usize) -> Result<Value>;
}

fn encode_nested(coder: &Coder, v: &Value) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    coder.encode_into(v, &mut buf)?;
    Ok(buf.freeze())
}

/// Status and absent-value sentinels: the tag itself is the information,
/// the payload stays empty.
struct MarkerCodec {
    marker: Value,
}

impl ExtCodec for MarkerCodec {
    fn matches(&self, v: &Value) -> bool {
        *v == self.marker
    }

    fn encode(&self, _v: &Value, _coder: &Coder) -> Result<Bytes> {
        Ok(Bytes::new())
    }

    fn decode(&self, _payload: Bytes, _coder: &Coder, _depth: usize) -> Result<Value> {
        Ok(self.marker.clone())
    }
}

/// Regex literal, carried as `[pattern, flags]`.
struct RegexCodec;

impl ExtCodec for RegexCodec {
    fn matches(&self, v: &Value) -> bool {
        matches!(v, Value::Regex { .. })
    }

    fn encode(&self, v: &Value, coder: &Coder) -> Result<Bytes> {
        match v {
            Value::Regex { pattern, flags } => encode_nested(
                coder,
                &Value::Seq(vec![
                    Value::Str(pattern.clone()),
                    Value::Str(flags.clone()),
                ]),
            ),
            _ => Err(CrosswireError::Decode("regex codec got non-regex".into())),
        }
    }

    fn decode(&self, payload: Bytes, coder: &Coder, depth: usize) -> Result<Value> {
        match coder.decode_nested(payload, depth)? {
            Value::Seq(items) => match items.as_slice() {
                [Value::Str(pattern), Value::Str(flags)] => Ok(Value::Regex {
                    pattern: pattern.clone(),
                    flags: flags.clone(),
                }),
                _ => Err(CrosswireError::Decode("malformed regex payload".into())),
            },
            _ => Err(CrosswireError::Decode("malformed regex payload".into())),
        }
    }
}

/// Arbitrary-precision decimal, carried as its string form.
struct BigDecimalCodec;

impl ExtCodec for BigDecimalCodec {
    fn matches(&self, v: &Value) -> bool {
        matches!(v, Value::BigDecimal(_))
    }

    fn encode(&self, v: &Value, coder: &Coder) -> Result<Bytes> {
        match v {
            Value::BigDecimal(s) => encode_nested(coder, &Value::Str(s.clone())),
            _ => Err(CrosswireError::Decode("decimal codec got non-decimal".into())),
        }
    }

    fn decode(&self, payload: Bytes, coder: &Coder, depth: usize) -> Result<Value> {
        match coder.decode_nested(payload, depth)? {
            Value::Str(s) => Ok(Value::BigDecimal(s)),
            _ => Err(CrosswireError::Decode("malformed decimal payload".into())),
        }
    }
}

/// Timestamp, carried as RFC 3339 text.
struct TimestampCodec;

impl ExtCodec for TimestampCodec {
    fn matches(&self, v: &Value) -> bool {
        matches!(v, Value::Timestamp(_))
    }

    fn encode(&self, v: &Value, coder: &Coder) -> Result<Bytes> {
        match v {
            Value::Timestamp(ts) => encode_nested(coder, &Value::Str(ts.to_rfc3339())),
            _ => Err(CrosswireError::Decode(
                "timestamp codec got non-timestamp".into(),
            )),
        }
    }

    fn decode(&self, payload: Bytes, coder: &Coder, depth: usize) -> Result<Value> {
        match coder.decode_nested(payload, depth)? {
            Value::Str(s) => {
                let ts = DateTime::parse_from_rfc3339(&s)
                    .map_err(|e| CrosswireError::Decode(format!("bad timestamp: {e}")))?;
                Ok(Value::Timestamp(ts.with_timezone(&Utc)))
            }
            _ => Err(CrosswireError::Decode("malformed timestamp payload".into())),
        }
    }
}

/// Duration, carried as whole milliseconds.
struct DurationCodec;

impl ExtCodec for DurationCodec {
    fn matches(&self, v: &Value) -> bool {
        matches!(v, Value::Duration(_))
    }

    fn encode(&self, v: &Value, coder: &Coder) -> Result<Bytes> {
        match v {
            Value::Duration(ms) => encode_nested(coder, &Value::Int(*ms)),
            _ => Err(CrosswireError::Decode(
                "duration codec got non-duration".into(),
            )),
        }
    }

    fn decode(&self, payload: Bytes, coder: &Coder, depth: usize) -> Result<Value> {
        match coder.decode_nested(payload, depth)? {
            Value::Int(ms) => Ok(Value::Duration(ms)),
            _ => Err(CrosswireError::Decode("malformed duration payload".into())),
        }
    }
}

/// The built-in codecs in their fixed registration order.
pub(super) fn builtin_codecs() -> Vec<(u8, Arc<dyn ExtCodec>)> {
    vec![
        (
            TAG_NOT_FOUND,
            Arc::new(MarkerCodec {
                marker: Value::Status(Status::NotFound),
            }) as Arc<dyn ExtCodec>,
        ),
        (
            TAG_ABSENT,
            Arc::new(MarkerCodec {
                marker: Value::Absent,
            }),
        ),
        (
            TAG_API_ERROR,
            Arc::new(MarkerCodec {
                marker: Value::Status(Status::ApiError),
            }),
        ),
        (
            TAG_TIMEOUT,
            Arc::new(MarkerCodec {
                marker: Value::Status(Status::Timeout),
            }),
        ),
        (TAG_REGEX, Arc::new(RegexCodec)),
        (TAG_BIG_DECIMAL, Arc::new(BigDecimalCodec)),
        (TAG_TIMESTAMP, Arc::new(TimestampCodec)),
        (TAG_DURATION, Arc::new(DurationCodec)),
    ]
}
