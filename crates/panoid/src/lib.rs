//! PANOID: decoder/encoder for the opaque panorama identifiers handed out by the
//! street-view host.
//!
//! An identifier is either
//! - a plain official id (22 chars of `[A-Za-z0-9_-]`, last char one of `g w A Q`), or
//! - a URL-safe base64 wrapper around a tiny protobuf-style record that also
//!   carries the coverage kind.
//!
//! Wrapped layout (before base64):
//!   00  : u8      0x08 (field 1, wire type VARINT)
//!   01  : varint  coverage kind (2 = official, 10 = unofficial)
//!   ..  : u8      0x12 (field 2, wire type LEN)
//!   ..  : varint  id length in bytes
//!   ..  : [u8]    id, UTF-8
//!
//! Base64 uses the standard alphabet with `-`/`_`/`.` standing in for `+`/`/`/`=`.
//! Padding is optional on input, and the plain standard alphabet is accepted too.
//!
//! [`decode`] never fails: anything that is not a well-formed wrapper is treated
//! as a bare id and classified by its shape.

use base64::{
    alphabet,
    engine::{general_purpose::URL_SAFE, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use std::fmt;

/// Tag byte of field 1 (coverage kind): field number 1, wire type 0.
pub const KIND_TAG: u8 = 0x08;
/// Tag byte of field 2 (raw id): field number 2, wire type 2.
pub const ID_TAG: u8 = 0x12;
/// A 32-bit varint never needs more than this many bytes.
pub const MAX_VARINT_LEN: usize = 5;

/// Length of an official panorama id.
pub const OFFICIAL_ID_LEN: usize = 22;
/// Last character of every official panorama id is one of these.
pub const OFFICIAL_ID_TERMINALS: [u8; 4] = [b'g', b'w', b'A', b'Q'];

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Where the panorama imagery comes from. Selects the tile addressing scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoverageKind {
    /// Imagery served by the provider's own tiling system.
    Official,
    /// Community/photosphere imagery on the secondary tile host.
    Unofficial,
    /// Any other kind value carried by a wrapped identifier.
    Other(u32),
}

impl CoverageKind {
    pub const OFFICIAL_WIRE: u32 = 2;
    pub const UNOFFICIAL_WIRE: u32 = 10;

    #[inline]
    pub fn from_wire(v: u32) -> Self {
        match v {
            Self::OFFICIAL_WIRE => CoverageKind::Official,
            Self::UNOFFICIAL_WIRE => CoverageKind::Unofficial,
            other => CoverageKind::Other(other),
        }
    }

    #[inline]
    pub fn to_wire(self) -> u32 {
        match self {
            CoverageKind::Official => Self::OFFICIAL_WIRE,
            CoverageKind::Unofficial => Self::UNOFFICIAL_WIRE,
            CoverageKind::Other(v) => v,
        }
    }

    #[inline]
    pub fn is_official(self) -> bool {
        self == CoverageKind::Official
    }
}

impl fmt::Display for CoverageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoverageKind::Official => f.write_str("official"),
            CoverageKind::Unofficial => f.write_str("unofficial"),
            CoverageKind::Other(v) => write!(f, "kind {}", v),
        }
    }
}

/// Decoded `(kind, id)` pair identifying one panorama.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PanoramaDescriptor {
    pub kind: CoverageKind,
    pub id: String,
}

impl PanoramaDescriptor {
    pub fn new(kind: CoverageKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

impl fmt::Display for PanoramaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} panorama {}", self.kind, self.id)
    }
}

/// Why the structured (wrapped) path rejected an identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("not valid base64")]
    Base64,
    #[error("expected tag 0x{expected:02x} at byte {at}")]
    Tag { expected: u8, at: usize },
    #[error("unterminated varint at byte {at}")]
    Varint { at: usize },
    #[error("id length {len} exceeds remaining {remaining} bytes")]
    Truncated { len: usize, remaining: usize },
    #[error("id is not valid UTF-8")]
    Utf8,
}

#[inline(always)]
fn expect_tag(buf: &mut &[u8], tag: u8, at: usize) -> Result<(), DecodeError> {
    match buf.split_first() {
        Some((&b, rest)) if b == tag => {
            *buf = rest;
            Ok(())
        }
        _ => Err(DecodeError::Tag { expected: tag, at }),
    }
}

#[inline(always)]
fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if buf.len() < n {
        return Err(DecodeError::Truncated {
            len: n,
            remaining: buf.len(),
        });
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

/// Reads one little-endian base-128 varint from the front of `buf`.
///
/// At most [`MAX_VARINT_LEN`] bytes are consumed. Returns `None` (leaving `buf`
/// advanced past what was read) if no terminating byte shows up in that window.
pub fn decode_varint(buf: &mut &[u8]) -> Option<u32> {
    let mut result = 0u32;
    let mut shift = 0u32;

    for _ in 0..MAX_VARINT_LEN {
        let (&byte, rest) = buf.split_first()?;
        *buf = rest;

        result |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            return Some(result);
        }

        shift += 7;
    }

    None
}

/// Appends `v` as a base-128 varint.
pub fn encode_varint(out: &mut Vec<u8>, mut v: u32) {
    while v >= 0x80 {
        out.push((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

/// True if `id` has the shape of an official panorama id.
pub fn is_official_id(id: &str) -> bool {
    let b = id.as_bytes();
    b.len() == OFFICIAL_ID_LEN
        && b[..OFFICIAL_ID_LEN - 1]
            .iter()
            .all(|c| c.is_ascii_alphanumeric() || *c == b'_' || *c == b'-')
        && OFFICIAL_ID_TERMINALS.contains(&b[OFFICIAL_ID_LEN - 1])
}

fn unwrap_base64(id: &str) -> Result<Vec<u8>, DecodeError> {
    let std_alphabet: String = id
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            '.' => '=',
            c => c,
        })
        .collect();

    LENIENT.decode(std_alphabet).map_err(|_| DecodeError::Base64)
}

/// Parses a wrapped identifier. This is the single source of truth for the
/// structured path; [`decode`] layers the shape heuristic on top of it.
pub fn try_decode_structured(id: &str) -> Result<PanoramaDescriptor, DecodeError> {
    let bytes = unwrap_base64(id)?;
    let total = bytes.len();
    let mut p: &[u8] = &bytes;
    let at = |p: &[u8]| total - p.len();

    expect_tag(&mut p, KIND_TAG, 0)?;

    let kind_at = at(p);
    let kind = decode_varint(&mut p).ok_or(DecodeError::Varint { at: kind_at })?;

    let id_at = at(p);
    expect_tag(&mut p, ID_TAG, id_at)?;

    let len_at = at(p);
    let len = decode_varint(&mut p).ok_or(DecodeError::Varint { at: len_at })? as usize;
    let raw = take(&mut p, len)?;
    let id = std::str::from_utf8(raw).map_err(|_| DecodeError::Utf8)?;

    Ok(PanoramaDescriptor {
        kind: CoverageKind::from_wire(kind),
        id: id.to_owned(),
    })
}

/// Decodes any identifier into a descriptor. Never fails.
///
/// Wrapped identifiers carry their kind explicitly. Everything else is taken
/// verbatim as the raw id: official unless it fails [`is_official_id`].
pub fn decode(id: &str) -> PanoramaDescriptor {
    match try_decode_structured(id) {
        Ok(descriptor) => descriptor,
        Err(_) => {
            let kind = if is_official_id(id) {
                CoverageKind::Official
            } else {
                CoverageKind::Unofficial
            };
            PanoramaDescriptor {
                kind,
                id: id.to_owned(),
            }
        }
    }
}

/// Inverse of [`decode`]. Official ids are returned unchanged.
pub fn encode(descriptor: &PanoramaDescriptor) -> String {
    if descriptor.kind.is_official() {
        return descriptor.id.clone();
    }

    let id = descriptor.id.as_bytes();
    let mut record = Vec::with_capacity(id.len() + 2 * MAX_VARINT_LEN + 2);

    record.push(KIND_TAG);
    encode_varint(&mut record, descriptor.kind.to_wire());

    record.push(ID_TAG);
    encode_varint(&mut record, id.len() as u32);
    record.extend_from_slice(id);

    URL_SAFE.encode(record).replace('=', ".")
}
