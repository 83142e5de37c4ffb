//! Detect the Windows version so that we know if virtual desktops exist.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}
impl OsVersion {
    pub const fn new(major: u32, minor: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            build,
        }
    }
    /// Windows 10 with the given build number.
    pub const fn windows_10_build(build: u32) -> Self {
        Self::new(10, 0, build)
    }
    /// Versions are compared by major, then minor, then build.
    pub fn meets(&self, floor: OsVersion) -> bool {
        *self >= floor
    }
}
impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Virtual desktops were introduced with the first Windows 10 build.
pub const FEATURE_FLOOR: OsVersion = OsVersion::windows_10_build(10240);

/// Get the version of the running Windows installation, `None` if it can't
/// be determined or if we aren't running on Windows.
///
/// # References
///
/// - `GetVersionExW` is affected by the executable's manifest, so we use
///   [RtlGetVersion in windows::Wdk::System::SystemServices -
///   Rust](https://microsoft.github.io/windows-docs-rs/doc/windows/Wdk/System/SystemServices/fn.RtlGetVersion.html)
///   which always returns the correct version.
pub fn host_os_version() -> Option<OsVersion> {
    #[cfg(windows)]
    {
        use std::sync::OnceLock;

        static VERSION: OnceLock<Option<OsVersion>> = OnceLock::new();
        *VERSION.get_or_init(|| {
            let mut info: windows::Win32::System::SystemInformation::OSVERSIONINFOW =
                Default::default();
            info.dwOSVersionInfoSize = std::mem::size_of_val(&info) as u32;
            let res = unsafe { windows::Wdk::System::SystemServices::RtlGetVersion(&mut info) };
            if res.is_err() {
                tracing::warn!("Failed to get Windows version: {res:?}");
                return None;
            }
            let version =
                OsVersion::new(info.dwMajorVersion, info.dwMinorVersion, info.dwBuildNumber);
            tracing::debug!("Detected Windows version {version}");
            Some(version)
        })
    }
    #[cfg(not(windows))]
    {
        None
    }
}
