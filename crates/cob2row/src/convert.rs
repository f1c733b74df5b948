//! Leaf-field conversion from host bytes to native values.

use std::fmt;
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder};
use rust_decimal::Decimal;

use crate::error::{Cob2RowError, DecodeError, Result};
use crate::layout::Picture;

/// A leaf value at the width its conversion naturally produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeValue {
    Short(i16),
    Int(i32),
    Long(i64),
    Decimal(Decimal),
    Text(String),
}

impl NativeValue {
    /// Integer view of the value, used when it acts as an occurs counter.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NativeValue::Short(v) => Some(i64::from(*v)),
            NativeValue::Int(v) => Some(i64::from(*v)),
            NativeValue::Long(v) => Some(*v),
            NativeValue::Decimal(_) | NativeValue::Text(_) => None,
        }
    }
}

/// Reads one leaf value.
///
/// Implementations return the value and the number of bytes it occupied.
/// They must not read past the end of `buffer`.
pub trait PrimitiveConverter {
    fn convert(
        &self,
        picture: &Picture,
        buffer: &[u8],
        offset: usize,
    ) -> std::result::Result<(NativeValue, usize), DecodeError>;
}

impl<C: PrimitiveConverter + ?Sized> PrimitiveConverter for &C {
    fn convert(
        &self,
        picture: &Picture,
        buffer: &[u8],
        offset: usize,
    ) -> std::result::Result<(NativeValue, usize), DecodeError> {
        (**self).convert(picture, buffer, offset)
    }
}

/// Character set of alphanumeric host fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostCharset {
    /// IBM037 and its euro variant IBM01140, which differ only at 0x9F.
    #[default]
    Ebcdic037,
    Latin1,
}

impl HostCharset {
    fn decode(&self, bytes: &[u8]) -> String {
        match self {
            HostCharset::Ebcdic037 => bytes
                .iter()
                .map(|b| char::from(CP037_TO_LATIN1[*b as usize]))
                .collect(),
            HostCharset::Latin1 => bytes.iter().map(|b| char::from(*b)).collect(),
        }
    }

    /// Zone nibble of an unsigned zoned digit.
    fn digit_zone(&self) -> u8 {
        match self {
            HostCharset::Ebcdic037 => 0x0F,
            HostCharset::Latin1 => 0x03,
        }
    }

    /// Sign told by the zone of a zoned field's last byte, `true` when
    /// negative. ASCII hosts overpunch negatives as 0x70..=0x79.
    fn zoned_sign(&self, zone: u8) -> Option<bool> {
        match (self, zone) {
            (HostCharset::Ebcdic037, 0x0F | 0x0C | 0x0A | 0x0E) => Some(false),
            (HostCharset::Ebcdic037, 0x0D | 0x0B) => Some(true),
            (HostCharset::Latin1, 0x03) => Some(false),
            (HostCharset::Latin1, 0x07) => Some(true),
            _ => None,
        }
    }
}

impl FromStr for HostCharset {
    type Err = Cob2RowError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "IBM01140" | "IBM037" | "CP037" | "CP1140" | "EBCDIC" => Ok(HostCharset::Ebcdic037),
            "ISO-8859-1" | "LATIN1" | "US-ASCII" | "ASCII" => Ok(HostCharset::Latin1),
            other => Err(Cob2RowError::configuration(format!(
                "unsupported host charset {other}"
            ))),
        }
    }
}

impl fmt::Display for HostCharset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostCharset::Ebcdic037 => f.write_str("IBM01140"),
            HostCharset::Latin1 => f.write_str("ISO-8859-1"),
        }
    }
}

/// Default converter set for the pictures a layout can declare.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleConverters {
    charset: HostCharset,
}

impl SimpleConverters {
    pub fn new(charset: HostCharset) -> Self {
        Self { charset }
    }

    pub fn charset(&self) -> HostCharset {
        self.charset
    }
}

impl PrimitiveConverter for SimpleConverters {
    fn convert(
        &self,
        picture: &Picture,
        buffer: &[u8],
        offset: usize,
    ) -> std::result::Result<(NativeValue, usize), DecodeError> {
        let len = picture.byte_length();
        let bytes = slice(buffer, offset, len)?;
        let value = match *picture {
            Picture::Alphanumeric { .. } => {
                let text = self.charset.decode(bytes);
                NativeValue::Text(text.trim_end_matches([' ', '\0']).to_string())
            }
            Picture::Binary { signed, .. } => binary(bytes, signed),
            Picture::PackedDecimal {
                digits,
                scale,
                signed,
            } => {
                let (magnitude, negative) = packed_digits(bytes)?;
                numeric(magnitude, negative, digits, scale, signed)?
            }
            Picture::ZonedDecimal {
                digits,
                scale,
                signed,
            } => {
                let (magnitude, negative) = zoned_digits(bytes, self.charset)?;
                numeric(magnitude, negative, digits, scale, signed)?
            }
        };
        Ok((value, len))
    }
}

fn slice(buffer: &[u8], offset: usize, len: usize) -> std::result::Result<&[u8], DecodeError> {
    let available = buffer.len().saturating_sub(offset);
    if available < len {
        return Err(DecodeError::Truncated {
            needed: len,
            available,
        });
    }
    Ok(&buffer[offset..offset + len])
}

fn binary(bytes: &[u8], signed: bool) -> NativeValue {
    match (bytes.len(), signed) {
        (2, true) => NativeValue::Short(BigEndian::read_i16(bytes)),
        (2, false) => NativeValue::Int(i32::from(BigEndian::read_u16(bytes))),
        (4, true) => NativeValue::Int(BigEndian::read_i32(bytes)),
        (4, false) => NativeValue::Long(i64::from(BigEndian::read_u32(bytes))),
        (_, true) => NativeValue::Long(BigEndian::read_i64(bytes)),
        (_, false) => {
            let v = BigEndian::read_u64(bytes);
            match i64::try_from(v) {
                Ok(v) => NativeValue::Long(v),
                Err(_) => NativeValue::Decimal(Decimal::from(v)),
            }
        }
    }
}

// Digits are high nibble first; the last byte's low nibble carries the sign.
fn packed_digits(bytes: &[u8]) -> std::result::Result<(u64, bool), DecodeError> {
    let Some(sign_byte) = bytes.last() else {
        return Ok((0, false));
    };
    let last = bytes.len() - 1;
    let mut magnitude: u64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        magnitude = push_digit(magnitude, byte >> 4, i)?;
        if i < last {
            magnitude = push_digit(magnitude, byte & 0x0F, i)?;
        }
    }
    let negative = match sign_byte & 0x0F {
        0x0C | 0x0F | 0x0A | 0x0E => false,
        0x0D | 0x0B => true,
        other => return Err(DecodeError::InvalidSign(other)),
    };
    Ok((magnitude, negative))
}

// One digit per byte in the low nibble; an overpunched zone on the last byte
// carries the sign.
fn zoned_digits(
    bytes: &[u8],
    charset: HostCharset,
) -> std::result::Result<(u64, bool), DecodeError> {
    let last = bytes.len().saturating_sub(1);
    let mut magnitude: u64 = 0;
    let mut negative = false;
    for (i, byte) in bytes.iter().enumerate() {
        let zone = byte >> 4;
        if i == last {
            negative = charset
                .zoned_sign(zone)
                .ok_or(DecodeError::InvalidSign(zone))?;
        } else if zone != charset.digit_zone() {
            return Err(DecodeError::InvalidZone {
                zone,
                byte_index: i,
            });
        }
        magnitude = push_digit(magnitude, byte & 0x0F, i)?;
    }
    Ok((magnitude, negative))
}

fn push_digit(acc: u64, nibble: u8, byte_index: usize) -> std::result::Result<u64, DecodeError> {
    if nibble > 9 {
        return Err(DecodeError::InvalidDigit { nibble, byte_index });
    }
    acc.checked_mul(10)
        .and_then(|v| v.checked_add(u64::from(nibble)))
        .ok_or_else(|| DecodeError::OutOfRange {
            value: format!("{acc}{nibble}"),
        })
}

fn numeric(
    magnitude: u64,
    negative: bool,
    digits: u8,
    scale: u8,
    signed: bool,
) -> std::result::Result<NativeValue, DecodeError> {
    if negative && !signed {
        return Err(DecodeError::OutOfRange {
            value: format!("-{magnitude}"),
        });
    }
    // Packed fields with an even digit count carry one spare high nibble.
    let limit = 10u64.checked_pow(u32::from(digits)).unwrap_or(u64::MAX);
    let out_of_range = || DecodeError::OutOfRange {
        value: magnitude.to_string(),
    };
    if magnitude >= limit {
        return Err(out_of_range());
    }
    let magnitude = i64::try_from(magnitude).map_err(|_| out_of_range())?;
    let signed_value = if negative { -magnitude } else { magnitude };
    if scale == 0 {
        Ok(NativeValue::Long(signed_value))
    } else {
        Ok(NativeValue::Decimal(Decimal::new(signed_value, u32::from(scale))))
    }
}

/// IBM037 code points mapped to their ISO-8859-1 equivalents.
#[rustfmt::skip]
const CP037_TO_LATIN1: [u8; 256] = [
    0x00, 0x01, 0x02, 0x03, 0x9C, 0x09, 0x86, 0x7F, 0x97, 0x8D, 0x8E, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
    0x10, 0x11, 0x12, 0x13, 0x9D, 0x85, 0x08, 0x87, 0x18, 0x19, 0x92, 0x8F, 0x1C, 0x1D, 0x1E, 0x1F,
    0x80, 0x81, 0x82, 0x83, 0x84, 0x0A, 0x17, 0x1B, 0x88, 0x89, 0x8A, 0x8B, 0x8C, 0x05, 0x06, 0x07,
    0x90, 0x91, 0x16, 0x93, 0x94, 0x95, 0x96, 0x04, 0x98, 0x99, 0x9A, 0x9B, 0x14, 0x15, 0x9E, 0x1A,
    0x20, 0xA0, 0xE2, 0xE4, 0xE0, 0xE1, 0xE3, 0xE5, 0xE7, 0xF1, 0xA2, 0x2E, 0x3C, 0x28, 0x2B, 0x7C,
    0x26, 0xE9, 0xEA, 0xEB, 0xE8, 0xED, 0xEE, 0xEF, 0xEC, 0xDF, 0x21, 0x24, 0x2A, 0x29, 0x3B, 0xAC,
    0x2D, 0x2F, 0xC2, 0xC4, 0xC0, 0xC1, 0xC3, 0xC5, 0xC7, 0xD1, 0xA6, 0x2C, 0x25, 0x5F, 0x3E, 0x3F,
    0xF8, 0xC9, 0xCA, 0xCB, 0xC8, 0xCD, 0xCE, 0xCF, 0xCC, 0x60, 0x3A, 0x23, 0x40, 0x27, 0x3D, 0x22,
    0xD8, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0xAB, 0xBB, 0xF0, 0xFD, 0xFE, 0xB1,
    0xB0, 0x6A, 0x6B, 0x6C, 0x6D, 0x6E, 0x6F, 0x70, 0x71, 0x72, 0xAA, 0xBA, 0xE6, 0xB8, 0xC6, 0xA4,
    0xB5, 0x7E, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0xA1, 0xBF, 0xD0, 0xDD, 0xDE, 0xAE,
    0x5E, 0xA3, 0xA5, 0xB7, 0xA9, 0xA7, 0xB6, 0xBC, 0xBD, 0xBE, 0x5B, 0x5D, 0xAF, 0xA8, 0xB4, 0xD7,
    0x7B, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0xAD, 0xF4, 0xF6, 0xF2, 0xF3, 0xF5,
    0x7D, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E, 0x4F, 0x50, 0x51, 0x52, 0xB9, 0xFB, 0xFC, 0xF9, 0xFA, 0xFF,
    0x5C, 0xF7, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0xB2, 0xD4, 0xD6, 0xD2, 0xD3, 0xD5,
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0xB3, 0xDB, 0xDC, 0xD9, 0xDA, 0x9F,
];
