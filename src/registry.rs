//! Read the list of virtual desktops that Explorer stores in the registry.
//!
//! Explorer keeps the ids of all desktops as one `REG_BINARY` value that is a
//! concatenation of 16 byte GUIDs. The order of the GUIDs is the order of the
//! desktops.

use std::{
    fmt,
    ops::Deref,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::guid::{VirtualDesktopId, GUID_LEN};

/// Registry value type for raw binary data.
pub const REG_BINARY: u32 = 3;

/// Key under `HKEY_CURRENT_USER` where Explorer stores virtual desktop info.
pub const DEFAULT_KEY_PATH: &str =
    r"Software\Microsoft\Windows\CurrentVersion\Explorer\VirtualDesktops";
/// Value with the ids of all virtual desktops.
pub const DEFAULT_IDS_VALUE: &str = "VirtualDesktopIDs";
/// Value with the id of the current virtual desktop.
pub const DEFAULT_CURRENT_VALUE: &str = "CurrentVirtualDesktop";

/// Extra bytes allocated when reading a value since the size reported before
/// the read isn't always the size that is written.
const READ_SLACK: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// The key doesn't exist. Either Windows is too old or virtual desktops
    /// have never been used.
    KeyNotFound,
    ValueMissing,
    /// The value exists but is empty.
    ValueTooSmall,
    /// The value isn't `REG_BINARY`.
    WrongType(u32),
    /// The value's length isn't a multiple of 16 bytes.
    Misaligned(usize),
    /// Any other Win32 error code.
    Os(u32),
}
impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyNotFound => write!(f, "the virtual desktop registry key doesn't exist"),
            Self::ValueMissing => write!(f, "the registry value doesn't exist"),
            Self::ValueTooSmall => write!(f, "the registry value is empty"),
            Self::WrongType(ty) => write!(
                f,
                "the registry value has type {ty} but REG_BINARY ({REG_BINARY}) was expected"
            ),
            Self::Misaligned(len) => write!(
                f,
                "the registry value is {len} bytes long which isn't a multiple of {GUID_LEN}"
            ),
            Self::Os(code) => write!(f, "failed to read from the registry (error code {code})"),
        }
    }
}
impl std::error::Error for ReadError {}

/// Type and size of a registry value, queried without reading its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueInfo {
    pub value_type: u32,
    pub len: usize,
}

/// An open registry key. The handle is closed when this is dropped.
pub trait RegistryKey {
    fn query_value_info(&self, name: &str) -> Result<ValueInfo, ReadError>;
    /// Read a value into `buffer` and return how many bytes were written.
    fn read_value(&self, name: &str, buffer: &mut [u8]) -> Result<usize, ReadError>;
}

/// Somewhere registry keys can be opened from.
pub trait ConfigStore {
    type Key: RegistryKey;

    fn open_read_only(&self, path: &str) -> Result<Self::Key, ReadError>;
}

/// Store for hosts that have no registry. Every key is missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegistry;
impl ConfigStore for NoRegistry {
    type Key = std::convert::Infallible;

    fn open_read_only(&self, _path: &str) -> Result<Self::Key, ReadError> {
        Err(ReadError::KeyNotFound)
    }
}
impl RegistryKey for std::convert::Infallible {
    fn query_value_info(&self, _name: &str) -> Result<ValueInfo, ReadError> {
        match *self {}
    }
    fn read_value(&self, _name: &str, _buffer: &mut [u8]) -> Result<usize, ReadError> {
        match *self {}
    }
}

#[cfg(windows)]
pub type HostRegistry = win32::Win32Registry;
#[cfg(not(windows))]
pub type HostRegistry = NoRegistry;

pub mod win32 {
    //! [`ConfigStore`] backed by the Win32 registry API.
    //!
    //! # References
    //!
    //! - [RegOpenKeyExW function (winreg.h) - Win32 apps | Microsoft Learn](https://learn.microsoft.com/en-us/windows/win32/api/winreg/nf-winreg-regopenkeyexw)
    //! - [RegQueryValueExW function (winreg.h) - Win32 apps | Microsoft Learn](https://learn.microsoft.com/en-us/windows/win32/api/winreg/nf-winreg-regqueryvalueexw)
    #![cfg(windows)]

    use windows::{
        core::HSTRING,
        Win32::{
            Foundation::{ERROR_FILE_NOT_FOUND, ERROR_PATH_NOT_FOUND, ERROR_SUCCESS, WIN32_ERROR},
            System::Registry::{
                RegCloseKey, RegOpenKeyExW, RegQueryValueExW, HKEY, HKEY_CURRENT_USER, KEY_READ,
                REG_VALUE_TYPE,
            },
        },
    };

    use super::{ConfigStore, ReadError, RegistryKey, ValueInfo};

    /// Opens keys under `HKEY_CURRENT_USER`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Win32Registry;
    impl ConfigStore for Win32Registry {
        type Key = Win32Key;

        fn open_read_only(&self, path: &str) -> Result<Self::Key, ReadError> {
            let path = HSTRING::from(path);
            let mut key = HKEY::default();
            let status = unsafe { RegOpenKeyExW(HKEY_CURRENT_USER, &path, 0, KEY_READ, &mut key) };
            match status {
                ERROR_SUCCESS => Ok(Win32Key(key)),
                ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND => Err(ReadError::KeyNotFound),
                other => Err(ReadError::Os(other.0)),
            }
        }
    }

    pub struct Win32Key(HKEY);
    impl Drop for Win32Key {
        fn drop(&mut self) {
            let status = unsafe { RegCloseKey(self.0) };
            if status != ERROR_SUCCESS {
                tracing::warn!("Failed to close registry key: error code {}", status.0);
            }
        }
    }
    impl Win32Key {
        fn value_error(status: WIN32_ERROR) -> ReadError {
            if status == ERROR_FILE_NOT_FOUND {
                ReadError::ValueMissing
            } else {
                ReadError::Os(status.0)
            }
        }
    }
    impl RegistryKey for Win32Key {
        fn query_value_info(&self, name: &str) -> Result<ValueInfo, ReadError> {
            let name = HSTRING::from(name);
            let mut value_type = REG_VALUE_TYPE::default();
            let mut len: u32 = 0;
            let status = unsafe {
                RegQueryValueExW(
                    self.0,
                    &name,
                    None,
                    Some(&mut value_type as *mut REG_VALUE_TYPE),
                    None,
                    Some(&mut len as *mut u32),
                )
            };
            if status != ERROR_SUCCESS {
                return Err(Self::value_error(status));
            }
            Ok(ValueInfo {
                value_type: value_type.0,
                len: len as usize,
            })
        }
        fn read_value(&self, name: &str, buffer: &mut [u8]) -> Result<usize, ReadError> {
            let name = HSTRING::from(name);
            let mut len = u32::try_from(buffer.len()).unwrap_or(u32::MAX);
            let status = unsafe {
                RegQueryValueExW(
                    self.0,
                    &name,
                    None,
                    None,
                    Some(buffer.as_mut_ptr()),
                    Some(&mut len as *mut u32),
                )
            };
            if status != ERROR_SUCCESS {
                return Err(Self::value_error(status));
            }
            Ok(len as usize)
        }
    }
}

/// Ids of all virtual desktops in the order Explorer lists them. Index `i`
/// holds the id of desktop number `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DesktopOrder(Vec<VirtualDesktopId>);
impl DesktopOrder {
    pub fn new(ids: Vec<VirtualDesktopId>) -> Self {
        Self(ids)
    }
    pub fn into_vec(self) -> Vec<VirtualDesktopId> {
        self.0
    }
}
impl Deref for DesktopOrder {
    type Target = [VirtualDesktopId];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl IntoIterator for DesktopOrder {
    type Item = VirtualDesktopId;
    type IntoIter = std::vec::IntoIter<VirtualDesktopId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
impl FromIterator<VirtualDesktopId> for DesktopOrder {
    fn from_iter<T: IntoIterator<Item = VirtualDesktopId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Reads virtual desktop ids from a [`ConfigStore`]. Every read opens and
/// closes its own key handle.
#[derive(Debug)]
pub struct DesktopRegistryReader<S> {
    store: S,
    key_path: String,
    ids_value: String,
    current_value: String,
    reported_wrong_type: AtomicBool,
}
impl<S: ConfigStore> DesktopRegistryReader<S> {
    /// Reader that uses the locations Explorer writes to.
    pub fn new(store: S) -> Self {
        Self::with_locations(store, DEFAULT_KEY_PATH, DEFAULT_IDS_VALUE, DEFAULT_CURRENT_VALUE)
    }
    pub fn with_locations(
        store: S,
        key_path: impl Into<String>,
        ids_value: impl Into<String>,
        current_value: impl Into<String>,
    ) -> Self {
        Self {
            store,
            key_path: key_path.into(),
            ids_value: ids_value.into(),
            current_value: current_value.into(),
            reported_wrong_type: AtomicBool::new(false),
        }
    }
    pub fn store(&self) -> &S {
        &self.store
    }
    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    /// `true` if the virtual desktop key can be opened.
    pub fn key_exists(&self) -> bool {
        match self.store.open_read_only(&self.key_path) {
            Ok(_key) => true,
            Err(e) => {
                tracing::debug!("Virtual desktop registry key isn't available: {e}");
                false
            }
        }
    }

    /// Read a `REG_BINARY` value made up of whole 16 byte records.
    fn read_records(&self, value_name: &str) -> Result<Vec<u8>, ReadError> {
        let key = self.store.open_read_only(&self.key_path)?;

        let info = key.query_value_info(value_name)?;
        if info.len == 0 {
            return Err(ReadError::ValueTooSmall);
        }
        if info.value_type != REG_BINARY {
            return Err(ReadError::WrongType(info.value_type));
        }
        if info.len % GUID_LEN != 0 {
            return Err(ReadError::Misaligned(info.len));
        }

        let mut buffer = vec![0; info.len + READ_SLACK];
        let written = key.read_value(value_name, &mut buffer)?;
        let len = info.len.min(written);
        if len % GUID_LEN != 0 {
            return Err(ReadError::Misaligned(len));
        }
        buffer.truncate(len);
        Ok(buffer)
    }

    /// Read the ids of all desktops in registry order.
    pub fn read_desktop_ids(&self) -> Result<DesktopOrder, ReadError> {
        let data = self.read_records(&self.ids_value)?;
        data.chunks_exact(GUID_LEN)
            .map(|record| {
                VirtualDesktopId::from_slice(record)
                    .map_err(|_| ReadError::Misaligned(data.len()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(DesktopOrder)
    }

    /// Same as [`Self::read_desktop_ids`] but returns an empty list if the
    /// ids couldn't be read.
    pub fn list_desktop_ids(&self) -> DesktopOrder {
        match self.read_desktop_ids() {
            Ok(ids) => ids,
            Err(e) => {
                self.report(&self.ids_value, e);
                DesktopOrder::default()
            }
        }
    }

    /// Read the id of the current desktop.
    pub fn read_current_desktop_id(&self) -> Result<VirtualDesktopId, ReadError> {
        let data = self.read_records(&self.current_value)?;
        if data.len() != GUID_LEN {
            return Err(ReadError::Misaligned(data.len()));
        }
        VirtualDesktopId::from_slice(&data).map_err(|_| ReadError::Misaligned(data.len()))
    }

    pub fn current_desktop_id(&self) -> Option<VirtualDesktopId> {
        match self.read_current_desktop_id() {
            Ok(id) => Some(id),
            Err(e) => {
                self.report(&self.current_value, e);
                None
            }
        }
    }

    fn report(&self, value_name: &str, error: ReadError) {
        match error {
            ReadError::KeyNotFound | ReadError::ValueMissing | ReadError::ValueTooSmall => {
                tracing::debug!("No virtual desktops in registry value {value_name:?}: {error}");
            }
            ReadError::WrongType(_) => {
                if !self.reported_wrong_type.swap(true, Ordering::Relaxed) {
                    tracing::warn!("Ignoring registry value {value_name:?}: {error}");
                }
            }
            ReadError::Misaligned(_) | ReadError::Os(_) => {
                tracing::warn!("Failed to read registry value {value_name:?}: {error}");
            }
        }
    }
}
