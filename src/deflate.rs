//! Zlib decompression for feed frames
//!
//! Every EDDN message body arrives zlib-compressed. Decompression drains the
//! whole stream rather than doing a single fixed-size read; a clean
//! end-of-stream is success, anything else is an error for that frame.

use std::io::{ErrorKind, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{RelayError, Result};

/// Decompress a zlib-compressed byte slice.
///
/// Fails with [`RelayError::CorruptStream`] when the input is not a valid
/// zlib stream and [`RelayError::TruncatedStream`] when the stream ends
/// mid-record.
pub fn decompress(raw: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(raw);
    let mut plain = Vec::new();
    match decoder.read_to_end(&mut plain) {
        Ok(_) => Ok(plain),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            Err(RelayError::TruncatedStream(e.to_string()))
        }
        Err(e) => Err(RelayError::CorruptStream(e.to_string())),
    }
}

/// Compress a byte slice with zlib. The relay never re-encodes validated
/// content; this is the inverse used by tests and tooling.
pub fn compress(plain: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(plain)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let payload = br#"{"$schemaRef":"https://eddn.edcd.io/schemas/journal/1","message":{}}"#;
        let compressed = compress(payload).unwrap();
        assert_ne!(&compressed[..], &payload[..]);
        let plain = decompress(&compressed).unwrap();
        assert_eq!(&plain[..], &payload[..]);
    }

    #[test]
    fn test_round_trip_large() {
        let payload = b"scan event ".repeat(10_000);
        let compressed = compress(&payload).unwrap();
        // Larger than any single internal read buffer, so the drain loop matters
        let plain = decompress(&compressed).unwrap();
        assert_eq!(plain, payload);
    }

    #[test]
    fn test_corrupt_stream() {
        let err = decompress(b"definitely not zlib").unwrap_err();
        assert!(matches!(err, RelayError::CorruptStream(_)), "got {err:?}");
    }

    #[test]
    fn test_truncated_stream() {
        let payload = b"a message long enough that truncation cuts real deflate data".repeat(50);
        let compressed = compress(&payload).unwrap();
        let err = decompress(&compressed[..compressed.len() / 2]).unwrap_err();
        assert!(matches!(err, RelayError::TruncatedStream(_)), "got {err:?}");
    }

    #[test]
    fn test_empty_input_is_error() {
        assert!(decompress(&[]).is_err());
    }
}
