//! Serializer Module
//!
//! Converts cache items (or any serde value) to and from bytes, with a
//! passthrough path for payloads that are already opaque bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, Result};

// == Serializer Trait ==
/// Byte codec used by the memory and file stores.
///
/// The raw-bytes methods are selected at the call site: bytes written through
/// [`Serializer::serialize_bytes`] are read back with
/// [`Serializer::deserialize_bytes`], never through the structural codec.
pub trait Serializer: Send + Sync + 'static {
    /// Encodes a value structurally.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decodes bytes into a value of the requested shape.
    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T>;

    /// Raw fast path, returns the payload unchanged.
    fn serialize_bytes(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    /// Raw fast path, returns the stored bytes unchanged.
    fn deserialize_bytes(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }
}

// == JSON Serializer ==
/// Default serializer backed by serde_json.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CacheError::Encoding(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        serde_json::from_slice(data).map_err(|e| CacheError::Decoding(e.to_string()))
    }
}
