use crate::types::LibMetadata;
use std::fmt;

/// Data model of the generic (non DAG-restricted) reference decoder. Inputs
/// for `encode` and `invalid_out` cases are built in this model and handed
/// to each codec through [`Codec::from_generic`].
pub use ciborium::Value as GenericValue;

/// How a codec failure should be read by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The codec refused the input or value as invalid DAG-CBOR.
    Validation,
    /// The codec does not implement the construct; reported as a skip.
    Unsupported,
    /// The codec panicked. Caught by the executor.
    Panic,
    /// Anything else (I/O, allocation, internal errors).
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CodecError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Panic, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CodecError {}

/// A DAG-CBOR implementation under test.
///
/// Implementations must be reusable across calls: no state may carry over
/// from one case to the next, and they are called from several threads at
/// once.
pub trait Codec: Send + Sync {
    type Value;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Value, CodecError>;

    fn encode(&self, value: &Self::Value) -> Result<Vec<u8>, CodecError>;

    /// Converts a reference-decoded value into the codec's own data model.
    /// Values the model cannot represent are a `Validation` error.
    fn from_generic(&self, value: GenericValue) -> Result<Self::Value, CodecError>;
}

/// Which codec failures count as a rejection on negative cases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectionPolicy {
    /// Native bindings that abort on malformed input rather than returning an
    /// error may opt in to having those panics read as a rejection.
    pub panics_count_as_rejection: bool,
}

trait DynCodec: Send + Sync {
    fn roundtrip(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError>;
    fn decode_only(&self, bytes: &[u8]) -> Result<(), CodecError>;
    fn encode_generic(&self, value: GenericValue) -> Result<Vec<u8>, CodecError>;
}

impl<C: Codec> DynCodec for C {
    fn roundtrip(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        let value = self.decode(bytes)?;
        self.encode(&value)
    }

    fn decode_only(&self, bytes: &[u8]) -> Result<(), CodecError> {
        self.decode(bytes).map(|_| ())
    }

    fn encode_generic(&self, value: GenericValue) -> Result<Vec<u8>, CodecError> {
        let value = self.from_generic(value)?;
        self.encode(&value)
    }
}

/// A named codec plus the per-library settings the harness needs.
pub struct Adapter {
    name: String,
    metadata: LibMetadata,
    skipped_ids: Vec<String>,
    policy: RejectionPolicy,
    codec: Box<dyn DynCodec>,
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .field("skipped_ids", &self.skipped_ids)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Adapter {
    pub fn new<C: Codec + 'static>(
        name: impl Into<String>,
        metadata: LibMetadata,
        codec: C,
    ) -> Self {
        Self {
            name: name.into(),
            metadata,
            skipped_ids: Vec::new(),
            policy: RejectionPolicy::default(),
            codec: Box::new(codec),
        }
    }

    /// Case ids this library is known not to support; they are reported as
    /// skipped without calling the codec.
    pub fn with_skipped_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skipped_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_policy(mut self, policy: RejectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &LibMetadata {
        &self.metadata
    }

    pub fn policy(&self) -> RejectionPolicy {
        self.policy
    }

    pub fn skips(&self, id: &str) -> bool {
        !id.is_empty() && self.skipped_ids.iter().any(|s| s == id)
    }

    pub fn roundtrip(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.codec.roundtrip(bytes)
    }

    pub fn decode_only(&self, bytes: &[u8]) -> Result<(), CodecError> {
        self.codec.decode_only(bytes)
    }

    pub fn encode_generic(&self, value: GenericValue) -> Result<Vec<u8>, CodecError> {
        self.codec.encode_generic(value)
    }
}
