//! Decoder for the compact route encoding used by activity uploads
//!
//! Routes arrive as printable ASCII: each coordinate delta is zig-zag
//! signed, scaled by 1e5, and emitted as little-endian 5-bit groups offset
//! by 63. Latitude and longitude deltas alternate. Malformed input is an
//! error, never a silent truncation.

use crate::core::error::{EngineError, Result};
use crate::core::types::Coordinate;

/// Scale factor between encoded integer deltas and degrees
const SCALE: f64 = 1e5;

/// Lowest and highest byte values a well-formed encoding may contain
const MIN_BYTE: u8 = 63;
const MAX_BYTE: u8 = 126;

/// Decode an encoded route into its coordinate sequence.
///
/// An empty string decodes to an empty sequence.
pub fn decode(encoded: &str) -> Result<Vec<Coordinate>> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::new();
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        let (dlat, next) = next_delta(bytes, pos)?;
        let (dlng, next) = next_delta(bytes, next)?;
        pos = next;

        lat += dlat;
        lng += dlng;
        points.push(Coordinate::new(lat as f64 / SCALE, lng as f64 / SCALE));
    }

    Ok(points)
}

/// Decode one zig-zag varint starting at `pos`, returning the signed delta
/// and the position of the byte after it.
fn next_delta(bytes: &[u8], mut pos: usize) -> Result<(i64, usize)> {
    let mut accum: i64 = 0;
    let mut shift: u32 = 0;

    loop {
        let byte = *bytes.get(pos).ok_or_else(|| EngineError::Decode {
            position: pos,
            reason: "truncated coordinate group".to_string(),
        })?;

        if !(MIN_BYTE..=MAX_BYTE).contains(&byte) {
            return Err(EngineError::Decode {
                position: pos,
                reason: format!("byte {byte:#04x} outside encodable range"),
            });
        }

        // 12 groups of 5 bits already exceeds any delta the 1e5 scale
        // can produce; longer runs mean corrupt input.
        if shift >= 60 {
            return Err(EngineError::Decode {
                position: pos,
                reason: "coordinate group too long".to_string(),
            });
        }

        let chunk = (byte - MIN_BYTE) as i64;
        accum |= (chunk & 0x1f) << shift;
        shift += 5;
        pos += 1;

        if chunk < 0x20 {
            break;
        }
    }

    let delta = if accum & 1 != 0 {
        !(accum >> 1)
    } else {
        accum >> 1
    };

    Ok((delta, pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(point: Coordinate, lat: f64, lng: f64) {
        assert!(
            (point.lat - lat).abs() < 1e-9 && (point.lng - lng).abs() < 1e-9,
            "expected ({lat}, {lng}), got ({}, {})",
            point.lat,
            point.lng
        );
    }

    #[test]
    fn test_decode_empty_route() {
        assert_eq!(decode("").unwrap(), Vec::new());
    }

    #[test]
    fn test_decode_reference_route() {
        // The canonical reference encoding and its three known points
        let points = decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
        assert_eq!(points.len(), 3);
        assert_close(points[0], 38.5, -120.2);
        assert_close(points[1], 40.7, -120.95);
        assert_close(points[2], 43.252, -126.453);
    }

    #[test]
    fn test_decode_single_point() {
        let points = decode("_p~iF~ps|U").unwrap();
        assert_eq!(points.len(), 1);
        assert_close(points[0], 38.5, -120.2);
    }

    #[test]
    fn test_truncated_group_is_rejected() {
        // First latitude group never terminates
        let err = decode("_p~iF~").unwrap_err();
        assert!(matches!(err, EngineError::Decode { .. }));
    }

    #[test]
    fn test_missing_longitude_is_rejected() {
        // A complete latitude delta with no longitude after it
        let err = decode("_p~iF").unwrap_err();
        assert!(matches!(err, EngineError::Decode { .. }));
    }

    #[test]
    fn test_out_of_range_byte_is_rejected() {
        let err = decode("_p~iF~ps|U!").unwrap_err();
        match err {
            EngineError::Decode { position, .. } => assert_eq!(position, 10),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_real_activity_route_stays_in_range() {
        // Trace exported from a tracked run
        let points = decode("gvs~Fz}biVnB?@j@VjALj@P~@Pv@@d@Bx@?t@Ar@E~@G`A").unwrap();
        assert!(points.len() > 5);
        for point in points {
            assert!(point.is_in_range());
        }
    }
}
