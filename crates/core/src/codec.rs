//! C1: DEFLATE compression + the PlantUML 6-bit alphabet (spec §4.1).
//!
//! This is the forward half of the encoding the teacher crate already knew
//! how to decode (`routes.rs::decode_plantuml`): same alphabet, same
//! "3 bytes in, 4 chars out" shape, run in reverse and over raw DEFLATE
//! instead of zlib-framed DEFLATE.

use crate::error::CodecError;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;

/// Compresses `data` with raw DEFLATE (RFC 1951, no zlib/gzip framing).
///
/// Matches the teacher's choice of `flate2` for the DEFLATE family; unlike
/// `routes.rs`'s `ZlibDecoder` (which expects a zlib header), callers here
/// use the raw `Deflate*` variant because the PlantUML server's encoding
/// never emits that header.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if data.is_empty() {
        return Err(CodecError::Empty);
    }
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish().map_err(CodecError::from)
}

/// Maps a 6-bit value (0-63) to its PlantUML alphabet character.
///
/// Table per spec §4.1. The teacher's reverse table
/// (`PLANTUML_ALPHABET` in `routes.rs`) only ever needed to resolve valid
/// characters coming in off the wire; this direction also needs the `'?'`
/// fallback for values that can't occur from a real 6-bit shift but keep
/// the function total.
fn encode6(v: u8) -> char {
    match v {
        0..=9 => (b'0' + v) as char,
        10..=35 => (b'A' + (v - 10)) as char,
        36..=61 => (b'a' + (v - 36)) as char,
        62 => '-',
        63 => '_',
        _ => '?',
    }
}

/// Encodes `data` with the PlantUML 6-bit alphabet.
///
/// Processes 3 bytes at a time into 4 output characters, zero-padding a
/// trailing partial group; output length is always a multiple of 4.
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let mut buf = [0u8; 3];
        buf[..chunk.len()].copy_from_slice(chunk);
        let b0 = buf[0] >> 2;
        let b1 = ((buf[0] & 0x03) << 4) | (buf[1] >> 4);
        let b2 = ((buf[1] & 0x0f) << 2) | (buf[2] >> 6);
        let b3 = buf[2] & 0x3f;
        out.push(encode6(b0));
        out.push(encode6(b1));
        out.push(encode6(b2));
        out.push(encode6(b3));
    }
    out
}

/// Compresses then encodes `source`: the single entry point C2/C6 call to
/// turn DSL text into a PlantUML URL path segment.
pub fn encode_diagram(source: &[u8]) -> Result<String, CodecError> {
    let compressed = compress(source)?;
    Ok(encode(&compressed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_foo() {
        assert_eq!(compress(b"foo").unwrap(), vec![75, 203, 207, 7, 0]);
    }

    #[test]
    fn compress_foobar() {
        assert_eq!(
            compress(b"foobar").unwrap(),
            vec![75, 203, 207, 79, 74, 44, 2, 0]
        );
    }

    #[test]
    fn compress_startuml() {
        assert_eq!(
            compress(b"@startuml").unwrap(),
            vec![115, 40, 46, 73, 44, 42, 41, 205, 205, 1, 0]
        );
    }

    #[test]
    fn compress_arrow() {
        assert_eq!(
            compress(b"a -> b").unwrap(),
            vec![75, 84, 208, 181, 83, 72, 2, 0]
        );
    }

    #[test]
    fn compress_empty_fails() {
        assert!(matches!(compress(b""), Err(CodecError::Empty)));
    }

    #[test]
    fn encode_matches_reference_vector() {
        let source = b"@startuml\n    a -> b\n@enduml";
        let encoded = encode_diagram(source).unwrap();
        assert_eq!(encoded, "SoWkIImgAStDuL80WaG5NJk592w7rBmKe100");
    }

    #[test]
    fn encode6_alphabet_ranges() {
        for v in 0..=9u8 {
            assert!(encode6(v).is_ascii_digit());
        }
        for v in 10..=35u8 {
            assert!(encode6(v).is_ascii_uppercase());
        }
        for v in 36..=61u8 {
            assert!(encode6(v).is_ascii_lowercase());
        }
        assert_eq!(encode6(62), '-');
        assert_eq!(encode6(63), '_');
    }

    #[test]
    fn encode_output_length_is_multiple_of_four() {
        for len in 1..10 {
            let data = vec![b'x'; len];
            assert_eq!(encode(&data).len() % 4, 0);
        }
    }

    #[test]
    fn deterministic_round_trip() {
        let a = encode_diagram(b"@startuml\na -> b\n@enduml").unwrap();
        let b = encode_diagram(b"@startuml\na -> b\n@enduml").unwrap();
        assert_eq!(a, b);
    }
}
