//! Sprite sheet helpers shared by client and server.
//!
//! Sheets are content addressed: the key is the lowercase hex SHA-256 of the
//! raw PNG bytes. On the wire the bytes travel base64 encoded.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::appearance::SheetMeta;

/// Per-sheet size ceiling (512 KiB).
pub const MAX_SHEET_BYTES: usize = 512 * 1024;

/// Most frames one sheet may declare.
pub const MAX_SHEET_FRAMES: u32 = 1024;

/// Largest accepted `scale` factor.
pub const MAX_SHEET_SCALE: f32 = 16.0;

/// Largest accepted `pad`, in pixels.
pub const MAX_SHEET_PAD: u32 = 4096;

/// Pixel ceiling for a sheet after scaling (4096 x 4096).
pub const MAX_SHEET_PIXELS: u64 = 4096 * 4096;

/// Fixed 8-byte PNG signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Why a sheet was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SheetError {
    #[error("sheet hash is empty")]
    EmptyHash,
    #[error("sheet is {len} bytes, limit is {max}", max = MAX_SHEET_BYTES)]
    TooLarge { len: usize },
    #[error("sheet bytes are not a PNG")]
    NotPng,
    #[error("sheet bytes hash to {actual}, not {claimed}")]
    HashMismatch { claimed: String, actual: String },
    #[error("sheet payload is not valid base64")]
    BadEncoding,
    #[error("bad sheet layout: {0}")]
    BadLayout(&'static str),
}

/// True when `b` carries more than just the PNG signature and starts with it.
pub fn is_png(b: &[u8]) -> bool {
    b.len() > PNG_SIGNATURE.len() && b[..PNG_SIGNATURE.len()] == PNG_SIGNATURE
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

pub fn encode_b64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

pub fn decode_b64(s: &str) -> Result<Vec<u8>, SheetError> {
    BASE64_STANDARD
        .decode(s.as_bytes())
        .map_err(|_| SheetError::BadEncoding)
}

/// Size and container checks applied to every sheet, local or remote.
pub fn check_bytes(bytes: &[u8]) -> Result<(), SheetError> {
    if bytes.len() > MAX_SHEET_BYTES {
        return Err(SheetError::TooLarge { len: bytes.len() });
    }
    if !is_png(bytes) {
        return Err(SheetError::NotPng);
    }
    Ok(())
}

/// Full validation of a sheet claimed to hash to `hash`.
pub fn validate(hash: &str, bytes: &[u8]) -> Result<(), SheetError> {
    if hash.is_empty() {
        return Err(SheetError::EmptyHash);
    }
    check_bytes(bytes)?;
    let actual = sha256_hex(bytes);
    if !actual.eq_ignore_ascii_case(hash) {
        return Err(SheetError::HashMismatch {
            claimed: hash.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Bounds on a sheet layout that hold before any pixel is touched.
pub fn check_layout(meta: &SheetMeta) -> Result<(), SheetError> {
    if meta.cols == 0 {
        return Err(SheetError::BadLayout("zero columns"));
    }
    if meta.count == 0 {
        return Err(SheetError::BadLayout("zero frames"));
    }
    if meta.count > MAX_SHEET_FRAMES {
        return Err(SheetError::BadLayout("too many frames"));
    }
    if meta.pad > MAX_SHEET_PAD {
        return Err(SheetError::BadLayout("padding too large"));
    }
    if !(meta.scale.is_finite() && meta.scale > 0.0 && meta.scale <= MAX_SHEET_SCALE) {
        return Err(SheetError::BadLayout("scale out of range"));
    }
    Ok(())
}

/// `sheet_register` / `sheet_bytes` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetPayload {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub meta: SheetMeta,
    #[serde(default)]
    pub png_b64: String,
}

impl SheetPayload {
    pub fn new(hash: impl Into<String>, meta: SheetMeta, bytes: &[u8]) -> Self {
        Self {
            hash: hash.into(),
            meta,
            png_b64: encode_b64(bytes),
        }
    }

    /// Decodes the base64 body.
    pub fn bytes(&self) -> Result<Vec<u8>, SheetError> {
        decode_b64(&self.png_b64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_png(len: usize) -> Vec<u8> {
        let mut b = PNG_SIGNATURE.to_vec();
        b.resize(len, 7);
        b
    }

    #[test]
    fn png_magic_check() {
        assert!(is_png(&fake_png(16)));
        assert!(!is_png(&PNG_SIGNATURE));
        assert!(!is_png(b"GIF89a......"));
        assert!(!is_png(&[]));
    }

    #[test]
    fn sha256_hex_is_lowercase_64_chars() {
        let h = sha256_hex(b"abc");
        assert_eq!(
            h,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn validate_rejects_each_failure() {
        let ok = fake_png(64);
        let hash = sha256_hex(&ok);
        assert_eq!(validate(&hash, &ok), Ok(()));
        assert_eq!(validate(&hash.to_uppercase(), &ok), Ok(()));
        assert_eq!(validate("", &ok), Err(SheetError::EmptyHash));

        let big = fake_png(MAX_SHEET_BYTES + 1);
        assert_eq!(
            validate(&sha256_hex(&big), &big),
            Err(SheetError::TooLarge { len: MAX_SHEET_BYTES + 1 })
        );

        let gif = b"GIF89a-not-a-png".to_vec();
        assert_eq!(validate(&sha256_hex(&gif), &gif), Err(SheetError::NotPng));

        assert!(matches!(
            validate(&sha256_hex(b"other"), &ok),
            Err(SheetError::HashMismatch { .. })
        ));
    }

    #[test]
    fn layout_bounds() {
        let ok = SheetMeta {
            count: 9,
            cols: 9,
            pad: 1,
            scale: MAX_SHEET_SCALE,
        };
        assert_eq!(check_layout(&ok), Ok(()));

        let cases = [
            SheetMeta { cols: 0, ..ok },
            SheetMeta { count: 0, ..ok },
            SheetMeta { count: MAX_SHEET_FRAMES + 1, ..ok },
            SheetMeta { pad: u32::MAX, ..ok },
            SheetMeta { scale: 1e9, ..ok },
            SheetMeta { scale: f32::NAN, ..ok },
            SheetMeta { scale: -1.0, ..ok },
        ];
        for meta in cases {
            assert!(
                matches!(check_layout(&meta), Err(SheetError::BadLayout(_))),
                "{meta:?} accepted"
            );
        }
    }

    #[test]
    fn payload_roundtrips_bytes_through_base64() {
        let bytes = fake_png(40);
        let payload = SheetPayload::new("h", SheetMeta::default(), &bytes);
        assert_eq!(payload.bytes().unwrap(), bytes);

        let broken = SheetPayload {
            png_b64: "***".into(),
            ..payload
        };
        assert_eq!(broken.bytes(), Err(SheetError::BadEncoding));
    }
}
