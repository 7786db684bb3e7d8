//! Opaque auxiliary payloads attached to descriptors.
//!
//! The container never interprets payload bytes; it only needs equality and
//! hashing so that descriptors carrying identical payloads intern to the same
//! id. Structured payloads go through an [`AuxCodec`].

use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Encoded auxiliary payload bytes.
///
/// Cloning is cheap (shared buffer). An empty payload is never represented:
/// [`AuxBlob::new`] returns `None` for empty input, matching the on-disk
/// convention where a zero length means "no payload".
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AuxBlob(Arc<[u8]>);

impl AuxBlob {
    /// Wraps encoded bytes, returning `None` when `bytes` is empty.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Option<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            None
        } else {
            Some(Self(Arc::from(bytes)))
        }
    }

    /// Raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; empty payloads are normalised away.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AuxBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuxBlob({} bytes)", self.0.len())
    }
}

/// Converts structured payloads to and from their stored byte form.
///
/// Implementations must be deterministic: equal payloads must encode to
/// equal bytes, otherwise descriptor interning degrades.
pub trait AuxCodec {
    /// Structured payload type.
    type Payload;

    /// Encodes a payload into bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BcfError::Aux`] if the payload cannot be encoded.
    fn encode(&self, payload: &Self::Payload) -> Result<Vec<u8>>;

    /// Decodes stored bytes into a payload.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BcfError::Aux`] if the bytes are malformed.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Payload>;

    /// Encodes a payload straight into an [`AuxBlob`].
    ///
    /// # Errors
    ///
    /// Propagates [`AuxCodec::encode`] failures.
    fn to_blob(&self, payload: &Self::Payload) -> Result<Option<AuxBlob>> {
        Ok(AuxBlob::new(self.encode(payload)?))
    }
}

/// Identity codec: payloads are plain byte vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawAuxCodec;

impl AuxCodec for RawAuxCodec {
    type Payload = Vec<u8>;

    fn encode(&self, payload: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(payload.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}
