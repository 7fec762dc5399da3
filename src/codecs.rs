//! Built-in codec adapters and the generic CBOR reference decoder.

use crate::adapter::{Adapter, Codec, CodecError, GenericValue};
use crate::types::LibMetadata;
use ipld_core::cid::Cid;
use ipld_core::ipld::Ipld;
use std::collections::BTreeMap;

pub const SERDE_IPLD_DAGCBOR: &str = "serde_ipld_dagcbor";
pub const CIBORIUM: &str = "ciborium";

/// CBOR tag reserved for CIDs in DAG-CBOR.
const CID_TAG: u64 = 42;

/// Nesting limit for the structural scan.
const MAX_DEPTH: usize = 256;

/// Decodes arbitrary CBOR without any DAG-CBOR restrictions. Used only to
/// prepare inputs for `encode` and `invalid_out` cases.
///
/// The input must be exactly one data item. Items the generic model would
/// read lossily (`undefined` and other simple values besides false, true
/// and null) are refused rather than silently turned into something else.
pub fn reference_decode(bytes: &[u8]) -> Result<GenericValue, CodecError> {
    let end = item_end(bytes, 0, 0)?;
    if end != bytes.len() {
        return Err(CodecError::validation(format!(
            "reference CBOR decode error: {} trailing bytes after the first item",
            bytes.len() - end
        )));
    }
    ciborium::de::from_reader(bytes)
        .map_err(|e| CodecError::validation(format!("reference CBOR decode error: {e}")))
}

fn truncated() -> CodecError {
    CodecError::validation("reference CBOR decode error: unexpected end of input")
}

/// Walks the data item starting at `pos` and returns the offset just past it.
fn item_end(bytes: &[u8], pos: usize, depth: usize) -> Result<usize, CodecError> {
    if depth > MAX_DEPTH {
        return Err(CodecError::validation(
            "reference CBOR decode error: nesting too deep",
        ));
    }
    let initial = *bytes.get(pos).ok_or_else(truncated)?;
    let major = initial >> 5;
    let info = initial & 0x1f;
    let (arg, mut next) = match info {
        0..=23 => (u64::from(info), pos + 1),
        24..=27 => {
            let width = 1usize << (info - 24);
            let raw = bytes.get(pos + 1..pos + 1 + width).ok_or_else(truncated)?;
            let arg = raw.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            (arg, pos + 1 + width)
        }
        31 if (2..=5).contains(&major) => return indefinite_end(bytes, major, pos + 1, depth),
        31 => {
            return Err(CodecError::validation(format!(
                "reference CBOR decode error: unexpected break at byte {pos}"
            )));
        }
        _ => {
            return Err(CodecError::validation(format!(
                "reference CBOR decode error: reserved additional info {info} at byte {pos}"
            )));
        }
    };
    match major {
        0 | 1 => Ok(next),
        2 | 3 => usize::try_from(arg)
            .ok()
            .and_then(|len| next.checked_add(len))
            .filter(|end| *end <= bytes.len())
            .ok_or_else(truncated),
        4 => {
            for _ in 0..arg {
                next = item_end(bytes, next, depth + 1)?;
            }
            Ok(next)
        }
        5 => {
            for _ in 0..arg {
                next = item_end(bytes, next, depth + 1)?;
                next = item_end(bytes, next, depth + 1)?;
            }
            Ok(next)
        }
        6 => item_end(bytes, next, depth + 1),
        _ => match info {
            20..=22 | 25..=27 => Ok(next),
            23 => Err(CodecError::validation(
                "reference CBOR decode error: undefined has no generic representation",
            )),
            _ => Err(CodecError::validation(format!(
                "reference CBOR decode error: simple value {arg} has no generic representation"
            ))),
        },
    }
}

/// End of an indefinite-length item whose header ended just before `pos`.
fn indefinite_end(
    bytes: &[u8],
    major: u8,
    mut pos: usize,
    depth: usize,
) -> Result<usize, CodecError> {
    loop {
        match bytes.get(pos) {
            None => return Err(truncated()),
            Some(0xff) => return Ok(pos + 1),
            Some(_) => {
                pos = item_end(bytes, pos, depth + 1)?;
                if major == 5 {
                    pos = item_end(bytes, pos, depth + 1)?;
                }
            }
        }
    }
}

/// The `serde_ipld_dagcbor` crate over `ipld-core`'s data model.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeIpldDagCbor;

impl Codec for SerdeIpldDagCbor {
    type Value = Ipld;

    fn decode(&self, bytes: &[u8]) -> Result<Ipld, CodecError> {
        serde_ipld_dagcbor::from_slice(bytes)
            .map_err(|e| CodecError::validation(format!("dag-cbor decode error: {e}")))
    }

    fn encode(&self, value: &Ipld) -> Result<Vec<u8>, CodecError> {
        serde_ipld_dagcbor::to_vec(value)
            .map_err(|e| CodecError::validation(format!("dag-cbor encode error: {e}")))
    }

    fn from_generic(&self, value: GenericValue) -> Result<Ipld, CodecError> {
        generic_to_ipld(value)
    }
}

/// Maps the generic CBOR model onto the IPLD data model. Anything IPLD has
/// no place for (non-string map keys, tags other than 42, simple values) is
/// refused here, which is how `invalid_out` values are rejected before they
/// ever reach the encoder.
pub fn generic_to_ipld(value: GenericValue) -> Result<Ipld, CodecError> {
    let ipld = match value {
        GenericValue::Null => Ipld::Null,
        GenericValue::Bool(b) => Ipld::Bool(b),
        GenericValue::Integer(i) => Ipld::Integer(i128::from(i)),
        GenericValue::Float(f) => Ipld::Float(f),
        GenericValue::Text(s) => Ipld::String(s),
        GenericValue::Bytes(b) => Ipld::Bytes(b),
        GenericValue::Array(items) => Ipld::List(
            items
                .into_iter()
                .map(generic_to_ipld)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        GenericValue::Map(entries) => {
            let mut map = BTreeMap::new();
            for (k, v) in entries {
                let key = match k {
                    GenericValue::Text(key) => key,
                    other => {
                        return Err(CodecError::validation(format!(
                            "map keys must be strings, found {other:?}"
                        )));
                    }
                };
                let v = generic_to_ipld(v)?;
                if map.contains_key(&key) {
                    return Err(CodecError::validation(format!("duplicate map key {key:?}")));
                }
                map.insert(key, v);
            }
            Ipld::Map(map)
        }
        GenericValue::Tag(CID_TAG, inner) => Ipld::Link(cid_from_tagged(*inner)?),
        GenericValue::Tag(tag, _) => {
            return Err(CodecError::validation(format!("unsupported CBOR tag {tag}")));
        }
        other => {
            return Err(CodecError::validation(format!(
                "unsupported CBOR value {other:?}"
            )));
        }
    };
    Ok(ipld)
}

fn cid_from_tagged(inner: GenericValue) -> Result<Cid, CodecError> {
    let bytes = match inner {
        GenericValue::Bytes(bytes) => bytes,
        other => {
            return Err(CodecError::validation(format!(
                "tag 42 must wrap a byte string, found {other:?}"
            )));
        }
    };
    // Binary CIDs in DAG-CBOR carry the identity multibase prefix.
    match bytes.split_first() {
        Some((0x00, rest)) => Cid::try_from(rest)
            .map_err(|e| CodecError::validation(format!("invalid CID: {e}"))),
        _ => Err(CodecError::validation(
            "CID bytes must start with the 0x00 multibase prefix",
        )),
    }
}

/// The generic CBOR library itself, run as a control: it knows nothing of
/// DAG-CBOR restrictions, so its negative-case failures show what a plain
/// CBOR codec lets through.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ciborium;

impl Codec for Ciborium {
    type Value = GenericValue;

    fn decode(&self, bytes: &[u8]) -> Result<GenericValue, CodecError> {
        ciborium::de::from_reader(bytes)
            .map_err(|e| CodecError::validation(format!("cbor decode error: {e}")))
    }

    fn encode(&self, value: &GenericValue) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(value, &mut out)
            .map_err(|e| CodecError::other(format!("cbor encode error: {e}")))?;
        Ok(out)
    }

    fn from_generic(&self, value: GenericValue) -> Result<GenericValue, CodecError> {
        Ok(value)
    }
}

pub fn serde_ipld_dagcbor_adapter() -> Adapter {
    Adapter::new(
        SERDE_IPLD_DAGCBOR,
        LibMetadata {
            link: "https://github.com/ipld/serde_ipld_dagcbor".to_string(),
            version: "0.6".to_string(),
        },
        SerdeIpldDagCbor,
    )
}

pub fn ciborium_adapter() -> Adapter {
    Adapter::new(
        CIBORIUM,
        LibMetadata {
            link: "https://github.com/enarx/ciborium".to_string(),
            version: "0.2".to_string(),
        },
        Ciborium,
    )
}

/// All in-process adapters, in their default run order.
pub fn builtin_adapters() -> Vec<Adapter> {
    vec![serde_ipld_dagcbor_adapter(), ciborium_adapter()]
}
