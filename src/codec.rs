//! MsgPack codec for the wire envelope, using `rmp-serde`.
//!
//! Uses `to_vec_named` so payloads stay self-describing (struct-as-map
//! format) across envelope versions.

use crate::error::Result;

/// MessagePack codec for structured wire data.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
