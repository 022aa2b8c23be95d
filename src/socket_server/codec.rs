//! Frame codec
//!
//! Session frames are JSON documents compressed with zstd. A frame that does
//! not decompress or does not parse is a protocol error and ends the session.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DocBridgeError, Result};

/// zstd + JSON codec for session frames
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    level: i32,
}

impl FrameCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    /// Serialize and compress a message
    pub fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(msg)?;
        zstd::stream::encode_all(json.as_slice(), self.level)
            .map_err(|e| DocBridgeError::protocol(format!("compression failed: {}", e)))
    }

    /// Decompress and parse a message
    pub fn decode<T: DeserializeOwned>(&self, frame: &[u8]) -> Result<T> {
        let json = zstd::stream::decode_all(frame)
            .map_err(|e| DocBridgeError::protocol(format!("decompression failed: {}", e)))?;
        serde_json::from_slice(&json)
            .map_err(|e| DocBridgeError::protocol(format!("malformed frame: {}", e)))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(zstd::DEFAULT_COMPRESSION_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket_server::protocol::{DocResponse, Handshake};

    #[test]
    fn test_frames_are_compressed_json() {
        let codec = FrameCodec::default();
        let frame = codec.encode(&DocResponse::challenge("/proj/b.ts")).unwrap();

        let raw = zstd::stream::decode_all(frame.as_slice()).unwrap();
        assert_eq!(
            String::from_utf8(raw).unwrap(),
            r#"{"path":"/proj/b.ts","isChallenge":true}"#
        );

        let decoded: DocResponse = codec.decode(&frame).unwrap();
        assert!(decoded.is_challenge);
    }

    #[test]
    fn test_uncompressed_frame_is_protocol_error() {
        let codec = FrameCodec::default();
        let err = codec
            .decode::<Handshake>(br#"{"config":"{}","workingDir":"/proj"}"#)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_malformed_json_is_protocol_error() {
        let codec = FrameCodec::default();
        let frame = zstd::stream::encode_all(&b"{not json"[..], 3).unwrap();
        let err = codec.decode::<Handshake>(&frame).unwrap_err();
        assert!(matches!(err, DocBridgeError::Protocol { .. }));
    }
}
