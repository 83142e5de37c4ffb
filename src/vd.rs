//! Query and manage virtual desktops. Combines the desktop list from the
//! registry with calls into `VirtualDesktopAccessor.dll`.
//!
//! Desktops are identified by one-based [`DesktopNumber`]s here. The registry
//! list and the native library both use zero-based indexes, and this module
//! is the only place that converts between the two.
//!
//! Every operation has a `try_` variant that returns why it failed. The plain
//! variants never fail, they return `false`/`None` instead so that callers
//! don't need to care whether virtual desktops exist on the current system.

use std::{
    fmt,
    num::NonZeroU32,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{
    accessor::{BindingUnavailable, EntryPoint, LibraryLoadError, NativeAccessor},
    guid::VirtualDesktopId,
    platform::{OsVersion, FEATURE_FLOOR},
    registry::{ConfigStore, DesktopOrder, DesktopRegistryReader, HostRegistry, ReadError},
    settings::InteropSettings,
    window_info::WindowHandle,
};

/// One-based number of a virtual desktop, the first desktop is `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DesktopNumber(NonZeroU32);
impl DesktopNumber {
    pub fn new(number: u32) -> Option<Self> {
        NonZeroU32::new(number).map(Self)
    }
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}
impl fmt::Display for DesktopNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Why virtual desktops can't be used on this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsupported {
    UnknownOsVersion,
    OsTooOld { version: OsVersion, floor: OsVersion },
    MissingRegistryKey,
}
impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOsVersion => write!(f, "the Windows version couldn't be determined"),
            Self::OsTooOld { version, floor } => write!(
                f,
                "Windows {version} is older than {floor} which introduced virtual desktops"
            ),
            Self::MissingRegistryKey => {
                write!(f, "virtual desktop info is missing from the registry")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    UnsupportedPlatform(Unsupported),
    ConfigurationRead(ReadError),
    /// `VirtualDesktopAccessor.dll` wasn't loaded.
    LibraryUnavailable,
    BindingUnavailable(BindingUnavailable),
    /// The desktop number is less than one or larger than the number of
    /// desktops.
    OutOfRange { number: i32, count: usize },
    /// The native library reported a failure.
    NativeCallFailed { entry: EntryPoint, code: i32 },
    /// The native library's current desktop isn't in the registry list.
    Divergent { index: i32, count: usize },
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedPlatform(reason) => {
                write!(f, "virtual desktops are unavailable: {reason}")
            }
            Self::ConfigurationRead(err) => {
                write!(f, "failed to read virtual desktops from the registry: {err}")
            }
            Self::LibraryUnavailable => write!(
                f,
                "the dynamic library VirtualDesktopAccessor.dll wasn't loaded"
            ),
            Self::BindingUnavailable(err) => fmt::Display::fmt(err, f),
            Self::OutOfRange { number, count } => write!(
                f,
                "desktop number {number} is out of range, there are {count} desktops"
            ),
            Self::NativeCallFailed { entry, code } => write!(
                f,
                "call to \"{entry}\" in dynamic library failed with {code}"
            ),
            Self::Divergent { index, count } => write!(
                f,
                "dynamic library reported desktop index {index} \
                 but the registry lists {count} desktops"
            ),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigurationRead(err) => Some(err),
            Self::BindingUnavailable(err) => Some(err),
            _ => None,
        }
    }
}
impl From<ReadError> for Error {
    fn from(err: ReadError) -> Self {
        Self::ConfigurationRead(err)
    }
}
impl From<BindingUnavailable> for Error {
    fn from(err: BindingUnavailable) -> Self {
        Self::BindingUnavailable(err)
    }
}
impl From<Unsupported> for Error {
    fn from(reason: Unsupported) -> Self {
        Self::UnsupportedPlatform(reason)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// One-based desktop number to zero-based index, checked against the number
/// of desktops.
fn number_to_index(number: i32, count: usize) -> Result<i32> {
    match usize::try_from(number) {
        Ok(n) if n >= 1 && n <= count => Ok(number - 1),
        _ => Err(Error::OutOfRange { number, count }),
    }
}

/// Zero-based index to one-based desktop number.
fn index_to_number(index: i32) -> Option<DesktopNumber> {
    let index = u32::try_from(index).ok()?;
    DesktopNumber::new(index.checked_add(1)?)
}

/// Virtual desktop operations for the rest of the application.
#[derive(Debug)]
pub struct VirtualDesktops<S> {
    registry: DesktopRegistryReader<S>,
    accessor: NativeAccessor,
    os_version: Option<OsVersion>,
    floor: OsVersion,
    reported_unavailable: AtomicBool,
    reported_count_mismatch: AtomicBool,
    reported_index_divergence: AtomicBool,
}
impl<S: ConfigStore> VirtualDesktops<S> {
    pub fn new(
        registry: DesktopRegistryReader<S>,
        accessor: NativeAccessor,
        os_version: Option<OsVersion>,
    ) -> Self {
        Self {
            registry,
            accessor,
            os_version,
            floor: FEATURE_FLOOR,
            reported_unavailable: AtomicBool::new(false),
            reported_count_mismatch: AtomicBool::new(false),
            reported_index_divergence: AtomicBool::new(false),
        }
    }
    /// Change the oldest Windows version that is considered supported.
    pub fn with_feature_floor(mut self, floor: OsVersion) -> Self {
        self.floor = floor;
        self
    }
    pub fn registry(&self) -> &DesktopRegistryReader<S> {
        &self.registry
    }
    pub fn accessor(&self) -> &NativeAccessor {
        &self.accessor
    }

    fn check_platform(&self) -> Result<()> {
        match self.os_version {
            None => Err(Unsupported::UnknownOsVersion.into()),
            Some(version) if !version.meets(self.floor) => Err(Unsupported::OsTooOld {
                version,
                floor: self.floor,
            }
            .into()),
            Some(_) if !self.registry.key_exists() => Err(Unsupported::MissingRegistryKey.into()),
            Some(_) => Ok(()),
        }
    }

    /// Ensure desktops can be managed: Windows is new enough, the registry
    /// has desktop info and the native library was loaded.
    pub fn try_check_supported(&self) -> Result<()> {
        self.check_platform()?;
        if !self.accessor.is_loaded() {
            return Err(Error::LibraryUnavailable);
        }
        Ok(())
    }
    pub fn is_supported(&self) -> bool {
        self.try_check_supported().is_ok()
    }

    /// Log the error and return the safe default instead. That the feature
    /// is unavailable is only reported once.
    fn degrade<T>(&self, operation: &str, result: Result<T>, default: T) -> T {
        match result {
            Ok(value) => value,
            Err(e @ (Error::UnsupportedPlatform(_) | Error::LibraryUnavailable)) => {
                if !self.reported_unavailable.swap(true, Ordering::Relaxed) {
                    tracing::info!("Virtual desktop features are unavailable: {e}");
                } else {
                    tracing::trace!("{operation} skipped: {e}");
                }
                default
            }
            Err(e) => {
                tracing::debug!("{operation} failed: {e}");
                default
            }
        }
    }

    /// Current desktop list. Logs once if the native library disagrees about
    /// how many desktops there are; the registry list is used regardless.
    fn desktop_order(&self) -> DesktopOrder {
        let order = self.registry.list_desktop_ids();
        if let Ok(native_count) = self.accessor.get_desktop_count() {
            let differs = usize::try_from(native_count).map_or(true, |n| n != order.len());
            if differs && !self.reported_count_mismatch.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "VirtualDesktopAccessor.dll reports {native_count} desktops \
                     but the registry lists {}",
                    order.len()
                );
            }
        }
        order
    }

    /// Ids of all desktops, the desktop with number `n` is at index `n - 1`.
    /// Empty if the ids couldn't be read.
    pub fn list_desktop_ids(&self) -> DesktopOrder {
        self.registry.list_desktop_ids()
    }
    pub fn desktop_count(&self) -> usize {
        self.list_desktop_ids().len()
    }

    /// Id of the desktop with the given number. Only uses the registry so it
    /// works even if the native library couldn't be loaded.
    pub fn try_resolve_id_by_number(&self, number: i32) -> Result<VirtualDesktopId> {
        let ids = self.registry.read_desktop_ids()?;
        let index = number_to_index(number, ids.len())?;
        Ok(ids[index as usize])
    }
    pub fn resolve_id_by_number(&self, number: i32) -> Option<VirtualDesktopId> {
        self.degrade(
            "resolve_id_by_number",
            self.try_resolve_id_by_number(number).map(Some),
            None,
        )
    }

    /// Id of the current desktop as stored in the registry.
    pub fn current_desktop_id(&self) -> Option<VirtualDesktopId> {
        self.registry.current_desktop_id()
    }

    pub fn try_current_desktop_number(&self) -> Result<DesktopNumber> {
        self.try_check_supported()?;
        let index = self.accessor.get_current_desktop_number()?;
        if index < 0 {
            return Err(Error::NativeCallFailed {
                entry: EntryPoint::GetCurrentDesktopNumber,
                code: index,
            });
        }
        let count = self.desktop_order().len();
        // Without any registry ids there is only a single desktop.
        if index as usize >= count.max(1) {
            if !self.reported_index_divergence.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "VirtualDesktopAccessor.dll reports current desktop index {index} \
                     but the registry lists {count} desktops"
                );
            }
            return Err(Error::Divergent { index, count });
        }
        index_to_number(index).ok_or(Error::NativeCallFailed {
            entry: EntryPoint::GetCurrentDesktopNumber,
            code: index,
        })
    }
    /// `None` if the current desktop is unknown.
    pub fn current_desktop_number(&self) -> Option<DesktopNumber> {
        self.degrade(
            "current_desktop_number",
            self.try_current_desktop_number().map(Some),
            None,
        )
    }

    /// Checks shared by operations that target a desktop number. Returns the
    /// zero-based index.
    fn target_index(&self, number: i32) -> Result<i32> {
        if number < 1 {
            return Err(Error::OutOfRange { number, count: 0 });
        }
        self.try_check_supported()?;
        number_to_index(number, self.desktop_order().len())
    }

    pub fn try_move_window_to_desktop(&self, hwnd: WindowHandle, number: i32) -> Result<()> {
        let index = self.target_index(number)?;
        let code = self.accessor.move_window_to_desktop(hwnd, index)?;
        if code <= 0 {
            return Err(Error::NativeCallFailed {
                entry: EntryPoint::MoveWindowToDesktopNumber,
                code,
            });
        }
        tracing::debug!("Moved window {hwnd} to desktop {number}");
        Ok(())
    }
    /// `true` if the window was moved.
    pub fn move_window_to_desktop(&self, hwnd: WindowHandle, number: i32) -> bool {
        self.degrade(
            "move_window_to_desktop",
            self.try_move_window_to_desktop(hwnd, number).map(|()| true),
            false,
        )
    }

    pub fn try_is_window_on_desktop(&self, hwnd: WindowHandle, number: i32) -> Result<bool> {
        let index = self.target_index(number)?;
        let code = self.accessor.is_window_on_desktop(hwnd, index)?;
        if code < 0 {
            return Err(Error::NativeCallFailed {
                entry: EntryPoint::IsWindowOnDesktopNumber,
                code,
            });
        }
        Ok(code > 0)
    }
    /// `false` if the window isn't on the desktop or if that couldn't be
    /// determined.
    pub fn is_window_on_desktop(&self, hwnd: WindowHandle, number: i32) -> bool {
        self.degrade(
            "is_window_on_desktop",
            self.try_is_window_on_desktop(hwnd, number),
            false,
        )
    }

    pub fn try_switch_to_desktop(&self, number: i32) -> Result<()> {
        let index = self.target_index(number)?;
        let code = self.accessor.go_to_desktop_number(index)?;
        if code <= 0 {
            return Err(Error::NativeCallFailed {
                entry: EntryPoint::GoToDesktopNumber,
                code,
            });
        }
        Ok(())
    }
    pub fn switch_to_desktop(&self, number: i32) -> bool {
        self.degrade(
            "switch_to_desktop",
            self.try_switch_to_desktop(number).map(|()| true),
            false,
        )
    }

    /// Show a window on all desktops.
    pub fn try_pin_window(&self, hwnd: WindowHandle) -> Result<()> {
        self.try_check_supported()?;
        let code = self.accessor.pin_window(hwnd)?;
        if code <= 0 {
            return Err(Error::NativeCallFailed {
                entry: EntryPoint::PinWindow,
                code,
            });
        }
        Ok(())
    }
    pub fn pin_window(&self, hwnd: WindowHandle) -> bool {
        self.degrade("pin_window", self.try_pin_window(hwnd).map(|()| true), false)
    }

    pub fn try_unpin_window(&self, hwnd: WindowHandle) -> Result<()> {
        self.try_check_supported()?;
        let code = self.accessor.unpin_window(hwnd)?;
        if code <= 0 {
            return Err(Error::NativeCallFailed {
                entry: EntryPoint::UnPinWindow,
                code,
            });
        }
        Ok(())
    }
    pub fn unpin_window(&self, hwnd: WindowHandle) -> bool {
        self.degrade("unpin_window", self.try_unpin_window(hwnd).map(|()| true), false)
    }

    pub fn try_is_pinned_window(&self, hwnd: WindowHandle) -> Result<bool> {
        self.try_check_supported()?;
        let code = self.accessor.is_pinned_window(hwnd)?;
        if code < 0 {
            return Err(Error::NativeCallFailed {
                entry: EntryPoint::IsPinnedWindow,
                code,
            });
        }
        Ok(code > 0)
    }
    pub fn is_pinned_window(&self, hwnd: WindowHandle) -> bool {
        self.degrade("is_pinned_window", self.try_is_pinned_window(hwnd), false)
    }
}

impl VirtualDesktops<HostRegistry> {
    /// Set up virtual desktop support for the running system. If the native
    /// library can't be loaded the error is logged and only the registry
    /// based operations will work.
    ///
    /// # Safety
    ///
    /// Same as [`NativeAccessor::load`] for the library at
    /// [`InteropSettings::library_path`].
    pub unsafe fn from_settings(settings: &InteropSettings) -> Self {
        let accessor = match unsafe { Self::load_accessor(settings) } {
            Ok(accessor) => accessor,
            Err(e) => {
                tracing::error!("Failed to load VirtualDesktopAccessor.dll: {e}");
                NativeAccessor::unavailable()
            }
        };
        let registry = DesktopRegistryReader::with_locations(
            HostRegistry::default(),
            settings.registry_key.clone(),
            settings.ids_value.clone(),
            settings.current_value.clone(),
        );
        Self::new(registry, accessor, crate::platform::host_os_version())
            .with_feature_floor(settings.feature_floor())
    }

    /// # Safety
    ///
    /// Same as [`NativeAccessor::load`].
    unsafe fn load_accessor(
        settings: &InteropSettings,
    ) -> Result<NativeAccessor, LibraryLoadError> {
        let path = settings.library_path()?;
        unsafe { NativeAccessor::load(&path) }
    }
}
