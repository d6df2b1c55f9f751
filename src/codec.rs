// src/codec.rs

//! Payload encoding for `Data` frames.
//!
//! Messages are `Facet` types encoded with postcard. Which side fails to
//! decode decides the status: a bad request is the caller's fault, a bad
//! response is ours.

use facet::Facet;

use crate::error::{Result, Status};

pub fn encode<T: Facet<'static>>(value: &T) -> Result<Vec<u8>> {
    facet_postcard::to_vec(value).map_err(|e| Status::internal(format!("encode failed: {e}")))
}

/// Decode a message received by the serving side.
pub fn decode_request<T: Facet<'static>>(bytes: &[u8]) -> Result<T> {
    facet_postcard::from_slice(bytes)
        .map_err(|e| Status::invalid_argument(format!("malformed request message: {e}")))
}

/// Decode a message received by the calling side.
pub fn decode_response<T: Facet<'static>>(bytes: &[u8]) -> Result<T> {
    facet_postcard::from_slice(bytes)
        .map_err(|e| Status::internal(format!("malformed response message: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;

    #[derive(Debug, PartialEq, Facet)]
    struct Point {
        x: i64,
        label: String,
    }

    #[test]
    fn struct_roundtrip() {
        let point = Point {
            x: -7,
            label: "origin-ish".to_string(),
        };
        let bytes = encode(&point).unwrap();
        let decoded: Point = decode_request(&bytes).unwrap();
        assert_eq!(decoded, point);
    }

    #[test]
    fn truncated_request_is_invalid_argument() {
        let bytes = encode(&vec![1.5f64, 2.5, 3.5]).unwrap();
        let err = decode_request::<Vec<f64>>(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn truncated_response_is_internal() {
        let bytes = encode(&vec![1.5f64, 2.5, 3.5]).unwrap();
        let err = decode_response::<Vec<f64>>(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(err.code(), Code::Internal);
    }
}
