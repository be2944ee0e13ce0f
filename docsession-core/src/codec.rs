//! Payload codecs.
//!
//! A codec turns the session key/value mapping into the bytes handed to a
//! [`SessionStore`](crate::store::SessionStore) and back. Decoding failures
//! surface as [`SessionError::CorruptPayload`] so the lifecycle manager can
//! fall back to a fresh session.

use crate::error::{SessionError, SessionResult};
use std::collections::HashMap;

/// Session payload: string keys mapped to arbitrary JSON-compatible values.
pub type Payload = HashMap<String, serde_json::Value>;

/// Serializes session payloads to a storage-ready byte form.
pub trait PayloadCodec: Send + Sync {
    /// Encode a payload.
    fn encode(&self, payload: &Payload) -> SessionResult<Vec<u8>>;

    /// Decode bytes previously produced by [`PayloadCodec::encode`].
    fn decode(&self, bytes: &[u8]) -> SessionResult<Payload>;

    /// Codec name, used in log output.
    fn name(&self) -> &'static str;
}

/// JSON payload codec (default).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn encode(&self, payload: &Payload) -> SessionResult<Vec<u8>> {
        serde_json::to_vec(payload).map_err(|e| SessionError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> SessionResult<Payload> {
        serde_json::from_slice(bytes).map_err(|e| SessionError::CorruptPayload(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// MessagePack payload codec.
///
/// Requires the `msgpack` feature.
#[cfg(feature = "msgpack")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackCodec;

#[cfg(feature = "msgpack")]
impl PayloadCodec for MessagePackCodec {
    fn encode(&self, payload: &Payload) -> SessionResult<Vec<u8>> {
        rmp_serde::to_vec_named(payload).map_err(|e| SessionError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> SessionResult<Payload> {
        rmp_serde::from_slice(bytes).map_err(|e| SessionError::CorruptPayload(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "msgpack"
    }
}
