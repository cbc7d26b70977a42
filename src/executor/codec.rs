//! Encoding of partial results for transfer between processes
//!
//! `[encoding byte][body]` where the body is JSON, optionally zlib
//! compressed. Compression changes the size of the encoding, never the
//! decoded value.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use thiserror::Error;

const PLAIN: u8 = 0;
const ZLIB: u8 = 1;

pub const MAX_COMPRESSION_LEVEL: u32 = 9;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to serialize partial result: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to deserialize partial result: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("Compression stream error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Compression level {0} is above {MAX_COMPRESSION_LEVEL}")]
    InvalidLevel(u32),

    #[error("Empty payload")]
    Empty,

    #[error("Unknown payload encoding {0:#04x}")]
    UnknownEncoding(u8),
}

pub fn encode<T: Serialize>(value: &T, compression: Option<u32>) -> Result<Vec<u8>, CodecError> {
    let body = serde_json::to_vec(value).map_err(CodecError::Serialize)?;

    match compression {
        None => {
            let mut out = Vec::with_capacity(body.len() + 1);
            out.push(PLAIN);
            out.extend_from_slice(&body);
            Ok(out)
        }
        Some(level) if level > MAX_COMPRESSION_LEVEL => Err(CodecError::InvalidLevel(level)),
        Some(level) => {
            let mut encoder = ZlibEncoder::new(vec![ZLIB], flate2::Compression::new(level));
            encoder.write_all(&body)?;
            Ok(encoder.finish()?)
        }
    }
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let (&encoding, body) = bytes.split_first().ok_or(CodecError::Empty)?;
    match encoding {
        PLAIN => serde_json::from_slice(body).map_err(CodecError::Deserialize),
        ZLIB => serde_json::from_reader(ZlibDecoder::new(body)).map_err(CodecError::Deserialize),
        other => Err(CodecError::UnknownEncoding(other)),
    }
}
