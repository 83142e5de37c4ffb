//! Conversion between the 16 byte identifiers Windows uses for virtual
//! desktops and their canonical `{xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx}` text.
//!
//! # Byte layout
//!
//! | Bytes   | Field | Encoding                |
//! |---------|-------|-------------------------|
//! | `0..4`  | data1 | little-endian `u32`     |
//! | `4..6`  | data2 | little-endian `u16`     |
//! | `6..8`  | data3 | little-endian `u16`     |
//! | `8..10` | data4 | big-endian `u16`        |
//! | `10..16`| data5 | raw bytes in text order |
//!
//! The mixed endianness matches how `GUID` structs are laid out in memory and
//! is what the registry stores, so it must not be treated as fully
//! little-endian.

use std::{fmt, str::FromStr};

/// Size in bytes of one identifier.
pub const GUID_LEN: usize = 16;

/// Number of hex digits in the textual form once braces and dashes are
/// removed.
const HEX_DIGITS: usize = GUID_LEN * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// Fewer than [`GUID_LEN`] bytes were provided.
    TooShort { len: usize },
    /// The text didn't contain exactly 32 hex digits.
    InvalidLength { hex_digits: usize },
    /// The text contained a character that isn't a hex digit, dash or brace.
    InvalidDigit { ch: char },
}
impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => write!(
                f,
                "a virtual desktop id needs {GUID_LEN} bytes but only {len} were provided"
            ),
            Self::InvalidLength { hex_digits } => write!(
                f,
                "a virtual desktop id needs {HEX_DIGITS} hex digits but {hex_digits} were found"
            ),
            Self::InvalidDigit { ch } => {
                write!(f, "invalid character {ch:?} in virtual desktop id")
            }
        }
    }
}
impl std::error::Error for FormatError {}

/// Identifier of a single virtual desktop, stored in the same byte order as
/// the registry uses.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualDesktopId([u8; GUID_LEN]);
impl VirtualDesktopId {
    pub const fn from_bytes(bytes: [u8; GUID_LEN]) -> Self {
        Self(bytes)
    }
    /// Use the first [`GUID_LEN`] bytes of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FormatError> {
        let Some(record) = bytes.get(..GUID_LEN) else {
            return Err(FormatError::TooShort { len: bytes.len() });
        };
        let mut id = [0; GUID_LEN];
        id.copy_from_slice(record);
        Ok(Self(id))
    }
    pub const fn to_bytes(self) -> [u8; GUID_LEN] {
        self.0
    }
    pub const fn as_bytes(&self) -> &[u8; GUID_LEN] {
        &self.0
    }
    /// `true` for the all zero id that Windows uses as "no desktop".
    pub fn is_nil(&self) -> bool {
        self.0 == [0; GUID_LEN]
    }
}
impl fmt::Display for VirtualDesktopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{{{:08x}-{:04x}-{:04x}-{:04x}-",
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            u16::from_le_bytes([b[4], b[5]]),
            u16::from_le_bytes([b[6], b[7]]),
            u16::from_be_bytes([b[8], b[9]]),
        )?;
        for byte in &b[10..] {
            write!(f, "{byte:02x}")?;
        }
        f.write_str("}")
    }
}
impl fmt::Debug for VirtualDesktopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualDesktopId({self})")
    }
}
impl FromStr for VirtualDesktopId {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s).map(Self)
    }
}
impl From<[u8; GUID_LEN]> for VirtualDesktopId {
    fn from(bytes: [u8; GUID_LEN]) -> Self {
        Self(bytes)
    }
}

/// Format the first 16 bytes of `bytes` as a lower case braced GUID.
pub fn encode(bytes: &[u8]) -> Result<String, FormatError> {
    VirtualDesktopId::from_slice(bytes).map(|id| id.to_string())
}

/// Parse GUID text into the registry byte layout. Braces and dashes are
/// ignored, both upper and lower case hex digits are accepted.
pub fn decode(text: &str) -> Result<[u8; GUID_LEN], FormatError> {
    let mut digits = [0u8; HEX_DIGITS];
    let mut count = 0;
    for ch in text.chars() {
        if matches!(ch, '{' | '}' | '-') {
            continue;
        }
        let value = ch.to_digit(16).ok_or(FormatError::InvalidDigit { ch })?;
        if let Some(slot) = digits.get_mut(count) {
            *slot = value as u8;
        }
        count += 1;
    }
    if count != HEX_DIGITS {
        return Err(FormatError::InvalidLength { hex_digits: count });
    }

    // Bytes in the order they appear in the text:
    let mut text_order = [0u8; GUID_LEN];
    for (byte, pair) in text_order.iter_mut().zip(digits.chunks_exact(2)) {
        *byte = (pair[0] << 4) | pair[1];
    }

    let mut bytes = text_order;
    bytes[0..4].reverse();
    bytes[4..6].reverse();
    bytes[6..8].reverse();
    // data4 and data5 are already in the right order.
    Ok(bytes)
}
