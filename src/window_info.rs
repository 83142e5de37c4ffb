//! Window handles passed through to the virtual desktop library.

use std::{ffi::c_void, fmt, num::ParseIntError, str::FromStr};

/// A borrowed reference to a native window (`HWND`).
///
/// Stored as 64 bits so that the same value can be handed to exports that
/// take the handle as a pointer and to exports that widen it to a 64-bit
/// integer, no matter how wide the handle was where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WindowHandle(pub u64);
impl WindowHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
    pub const fn raw(self) -> u64 {
        self.0
    }
    /// The handle as a pointer sized value. On 32-bit targets only the low
    /// 32 bits are kept, which is all a window handle uses there.
    pub fn as_ptr(self) -> *mut c_void {
        self.0 as usize as *mut c_void
    }
    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }
}
impl From<u32> for WindowHandle {
    fn from(raw: u32) -> Self {
        Self(u64::from(raw))
    }
}
impl From<u64> for WindowHandle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
impl From<usize> for WindowHandle {
    fn from(raw: usize) -> Self {
        Self(raw as u64)
    }
}
/// Keeps the bit pattern, same as casting a `HWND` pointer to an integer.
impl From<isize> for WindowHandle {
    fn from(raw: isize) -> Self {
        Self(raw as usize as u64)
    }
}
impl From<*mut c_void> for WindowHandle {
    fn from(ptr: *mut c_void) -> Self {
        Self(ptr as usize as u64)
    }
}
impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
/// Accepts decimal (`132456`) and hex (`0x20562`) handles.
impl FromStr for WindowHandle {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let raw = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)?
        } else {
            s.parse()?
        };
        Ok(Self(raw))
    }
}
