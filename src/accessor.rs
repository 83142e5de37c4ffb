//! Bind the functions exported by `VirtualDesktopAccessor.dll`.
//!
//! Different builds of the library export the functions that take a window
//! handle with different conventions: some take the handle as a pointer,
//! others widen it to a 64-bit integer, and 32-bit builds may use `stdcall`
//! with decorated export names. Calling a function through the wrong
//! signature can crash the process, so every window handle export is bound
//! by trying an ordered list of [`SignatureCandidate`]s and keeping the first
//! one that binds.
//!
//! Exports without a window handle have a single fixed signature.

use std::{
    ffi::c_void,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::Arc,
};

use libloading::{library_filename, Library};

use crate::window_info::WindowHandle;

/// File stem of the native library, see [`library_filename`] for the full
/// name.
pub const LIBRARY_NAME: &str = "VirtualDesktopAccessor";

/// Full path of the native library inside `dir`.
pub fn library_path_in(dir: &Path) -> PathBuf {
    dir.join(library_filename(LIBRARY_NAME))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallingConvention {
    /// `extern "C"` with an undecorated export name.
    C,
    /// `extern "system"`. On 32-bit x86 this is `stdcall` and the export
    /// name is decorated as `_Name@ArgBytes`.
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleWidth {
    /// The window handle is passed as a pointer sized value.
    Pointer,
    /// The window handle is widened to a 64-bit integer.
    Int64,
}
impl HandleWidth {
    pub const fn bytes(self) -> usize {
        match self {
            Self::Pointer => std::mem::size_of::<*mut c_void>(),
            Self::Int64 => std::mem::size_of::<i64>(),
        }
    }
}

/// One way an export that takes a window handle might be declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureCandidate {
    pub convention: CallingConvention,
    pub width: HandleWidth,
}
impl SignatureCandidate {
    pub const fn new(convention: CallingConvention, width: HandleWidth) -> Self {
        Self { convention, width }
    }

    /// The order candidates are tried in for every window handle export.
    pub const HANDLE_CANDIDATES: [SignatureCandidate; 4] = [
        Self::new(CallingConvention::C, HandleWidth::Pointer),
        Self::new(CallingConvention::System, HandleWidth::Pointer),
        Self::new(CallingConvention::C, HandleWidth::Int64),
        Self::new(CallingConvention::System, HandleWidth::Int64),
    ];

    /// Name the export would have with this candidate. `other_arg_bytes` is
    /// the size of all arguments except the window handle.
    pub fn export_name(&self, symbol: &str, other_arg_bytes: usize) -> String {
        match self.convention {
            CallingConvention::System if cfg!(target_arch = "x86") => {
                format!("_{symbol}@{}", self.width.bytes() + other_arg_bytes)
            }
            _ => symbol.to_owned(),
        }
    }
}
impl fmt::Display for SignatureCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let convention = match self.convention {
            CallingConvention::C => "extern \"C\"",
            CallingConvention::System => "extern \"system\"",
        };
        let width = match self.width {
            HandleWidth::Pointer => "pointer",
            HandleWidth::Int64 => "i64",
        };
        write!(f, "{convention} with {width} window handle")
    }
}

/// Functions we use from the native library.
///
/// Names come from: <https://github.com/Ciantic/VirtualDesktopAccessor/blob/126b9e04f4f01d434af06c20d8200d0659547774/README.md#reference-of-exported-dll-functions>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    MoveWindowToDesktopNumber,
    IsWindowOnDesktopNumber,
    PinWindow,
    UnPinWindow,
    IsPinnedWindow,
    GetCurrentDesktopNumber,
    GetDesktopCount,
    GoToDesktopNumber,
}
impl EntryPoint {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::MoveWindowToDesktopNumber => "MoveWindowToDesktopNumber",
            Self::IsWindowOnDesktopNumber => "IsWindowOnDesktopNumber",
            Self::PinWindow => "PinWindow",
            Self::UnPinWindow => "UnPinWindow",
            Self::IsPinnedWindow => "IsPinnedWindow",
            Self::GetCurrentDesktopNumber => "GetCurrentDesktopNumber",
            Self::GetDesktopCount => "GetDesktopCount",
            Self::GoToDesktopNumber => "GoToDesktopNumber",
        }
    }
}
impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `fn(hwnd, desktop_index) -> i32`
pub type WindowIndexFn = Box<dyn Fn(WindowHandle, i32) -> i32 + Send + Sync>;
/// `fn(hwnd) -> i32`
pub type WindowFn = Box<dyn Fn(WindowHandle) -> i32 + Send + Sync>;
/// `fn(desktop_index) -> i32`
pub type IndexFn = Box<dyn Fn(i32) -> i32 + Send + Sync>;
/// `fn() -> i32`
pub type QueryFn = Box<dyn Fn() -> i32 + Send + Sync>;

/// Failed to bind an export with a specific signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindError {
    pub symbol: String,
    pub reason: String,
}
impl BindError {
    pub fn new(symbol: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            symbol: symbol.into(),
            reason: reason.to_string(),
        }
    }
}
impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to bind \"{}\": {}", self.symbol, self.reason)
    }
}
impl std::error::Error for BindError {}

/// An export never matched any signature so calls to it always fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingUnavailable(pub EntryPoint);
impl fmt::Display for BindingUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the method \"{}\" couldn't be bound in the dynamic library",
            self.0
        )
    }
}
impl std::error::Error for BindingUnavailable {}

#[derive(Debug)]
pub enum LibraryLoadError {
    /// Couldn't find the directory the application is installed in.
    NoInstallDir(std::io::Error),
    /// No library file at the expected path.
    NotFound(PathBuf),
    Open {
        path: PathBuf,
        error: libloading::Error,
    },
}
impl fmt::Display for LibraryLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoInstallDir(e) => write!(
                f,
                "failed to find {LIBRARY_NAME} since the executable's path is unknown: {e}"
            ),
            Self::NotFound(path) => write!(
                f,
                "the dynamic library was not found at \"{}\"",
                path.display()
            ),
            Self::Open { path, error } => write!(
                f,
                "failed to load dynamic library \"{}\": {error}",
                path.display()
            ),
        }
    }
}
impl std::error::Error for LibraryLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NoInstallDir(e) => Some(e),
            Self::NotFound(_) => None,
            Self::Open { error, .. } => Some(error),
        }
    }
}

/// Creates callable functions for exports of a native library.
///
/// Each method attempts a single signature. A returned error (or a panic)
/// means that signature doesn't match this build of the library.
pub trait SymbolBinder {
    fn bind_window_index(
        &self,
        entry: EntryPoint,
        candidate: SignatureCandidate,
    ) -> Result<WindowIndexFn, BindError>;
    fn bind_window(
        &self,
        entry: EntryPoint,
        candidate: SignatureCandidate,
    ) -> Result<WindowFn, BindError>;
    fn bind_index(&self, entry: EntryPoint) -> Result<IndexFn, BindError>;
    fn bind_query(&self, entry: EntryPoint) -> Result<QueryFn, BindError>;
}

/// Generates a boxed closure that calls a window handle export through the
/// function pointer type that matches `$candidate`.
macro_rules! bind_handle_export {
    (
        $library:expr, $entry:expr, $candidate:expr,
        |$hwnd:ident $(, $arg:ident: $t:ty)*| -> $boxed:ty
    ) => {{
        let library: &Arc<Library> = $library;
        let entry: EntryPoint = $entry;
        let candidate: SignatureCandidate = $candidate;
        let name = candidate.export_name(entry.symbol(), 0 $(+ std::mem::size_of::<$t>())*);
        let symbol = nul_terminated(&name);

        let bound: $boxed = match (candidate.convention, candidate.width) {
            (CallingConvention::C, HandleWidth::Pointer) => {
                type Raw = unsafe extern "C" fn(*mut c_void $(, $t)*) -> i32;
                // Safety: the library is trusted to export this symbol with
                // this signature if it exports the name at all.
                let func: Raw = *unsafe { library.get::<Raw>(&symbol) }
                    .map_err(|e| BindError::new(&name, e))?;
                let library = Arc::clone(library);
                Box::new(move |$hwnd: WindowHandle $(, $arg: $t)*| {
                    let _library = &library;
                    unsafe { func($hwnd.as_ptr() $(, $arg)*) }
                })
            }
            (CallingConvention::System, HandleWidth::Pointer) => {
                type Raw = unsafe extern "system" fn(*mut c_void $(, $t)*) -> i32;
                let func: Raw = *unsafe { library.get::<Raw>(&symbol) }
                    .map_err(|e| BindError::new(&name, e))?;
                let library = Arc::clone(library);
                Box::new(move |$hwnd: WindowHandle $(, $arg: $t)*| {
                    let _library = &library;
                    unsafe { func($hwnd.as_ptr() $(, $arg)*) }
                })
            }
            (CallingConvention::C, HandleWidth::Int64) => {
                type Raw = unsafe extern "C" fn(i64 $(, $t)*) -> i32;
                let func: Raw = *unsafe { library.get::<Raw>(&symbol) }
                    .map_err(|e| BindError::new(&name, e))?;
                let library = Arc::clone(library);
                Box::new(move |$hwnd: WindowHandle $(, $arg: $t)*| {
                    let _library = &library;
                    unsafe { func($hwnd.as_i64() $(, $arg)*) }
                })
            }
            (CallingConvention::System, HandleWidth::Int64) => {
                type Raw = unsafe extern "system" fn(i64 $(, $t)*) -> i32;
                let func: Raw = *unsafe { library.get::<Raw>(&symbol) }
                    .map_err(|e| BindError::new(&name, e))?;
                let library = Arc::clone(library);
                Box::new(move |$hwnd: WindowHandle $(, $arg: $t)*| {
                    let _library = &library;
                    unsafe { func($hwnd.as_i64() $(, $arg)*) }
                })
            }
        };
        Ok(bound)
    }};
}

fn nul_terminated(name: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(name.len() + 1);
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(0);
    bytes
}

/// [`SymbolBinder`] for a library loaded with [`libloading`].
#[derive(Debug, Clone)]
pub struct DynamicLibraryBinder {
    library: Arc<Library>,
    path: PathBuf,
}
impl DynamicLibraryBinder {
    /// Load the library at `path`.
    ///
    /// # Safety
    ///
    /// Must be safe to call `libloading::Library::new` with `path`. This
    /// means any initialization code in that dynamic library must be safe to
    /// call.
    pub unsafe fn open(path: &Path) -> Result<Self, LibraryLoadError> {
        if !path.is_file() {
            return Err(LibraryLoadError::NotFound(path.to_owned()));
        }
        let library = unsafe { Library::new(path) }.map_err(|error| LibraryLoadError::Open {
            path: path.to_owned(),
            error,
        })?;
        Ok(Self {
            library: Arc::new(library),
            path: path.to_owned(),
        })
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
}
impl SymbolBinder for DynamicLibraryBinder {
    fn bind_window_index(
        &self,
        entry: EntryPoint,
        candidate: SignatureCandidate,
    ) -> Result<WindowIndexFn, BindError> {
        bind_handle_export!(&self.library, entry, candidate, |hwnd, index: i32| -> WindowIndexFn)
    }
    fn bind_window(
        &self,
        entry: EntryPoint,
        candidate: SignatureCandidate,
    ) -> Result<WindowFn, BindError> {
        bind_handle_export!(&self.library, entry, candidate, |hwnd| -> WindowFn)
    }
    fn bind_index(&self, entry: EntryPoint) -> Result<IndexFn, BindError> {
        type Raw = unsafe extern "C" fn(i32) -> i32;
        let name = entry.symbol();
        // Safety: the library is trusted to export this symbol with this
        // signature if it exports the name at all.
        let func: Raw = *unsafe { self.library.get::<Raw>(&nul_terminated(name)) }
            .map_err(|e| BindError::new(name, e))?;
        let library = Arc::clone(&self.library);
        Ok(Box::new(move |index| {
            let _library = &library;
            unsafe { func(index) }
        }))
    }
    fn bind_query(&self, entry: EntryPoint) -> Result<QueryFn, BindError> {
        type Raw = unsafe extern "C" fn() -> i32;
        let name = entry.symbol();
        let func: Raw = *unsafe { self.library.get::<Raw>(&nul_terminated(name)) }
            .map_err(|e| BindError::new(name, e))?;
        let library = Arc::clone(&self.library);
        Ok(Box::new(move || {
            let _library = &library;
            unsafe { func() }
        }))
    }
}

/// A bound export and the signature it was bound with.
struct Bound<F> {
    candidate: SignatureCandidate,
    func: F,
}

/// Attempt to bind a single signature, treating a panic like an error.
fn attempt<F>(symbol: &str, bind: impl FnOnce() -> Result<F, BindError>) -> Result<F, BindError> {
    match catch_unwind(AssertUnwindSafe(bind)) {
        Ok(res) => res,
        Err(_) => Err(BindError::new(symbol, "panicked while binding")),
    }
}

/// Try the candidates in order and keep the first one that binds.
fn probe<F>(
    entry: EntryPoint,
    mut bind: impl FnMut(SignatureCandidate) -> Result<F, BindError>,
) -> Option<Bound<F>> {
    for candidate in SignatureCandidate::HANDLE_CANDIDATES {
        match attempt(entry.symbol(), || bind(candidate)) {
            Ok(func) => {
                tracing::debug!("Bound {entry} as {candidate}");
                return Some(Bound { candidate, func });
            }
            Err(e) => {
                tracing::warn!("Signature {candidate} didn't match for {entry}: {e}");
            }
        }
    }
    tracing::warn!("No signature matched for {entry}, it will be unavailable");
    None
}

fn fixed<F>(entry: EntryPoint, bind: impl FnOnce() -> Result<F, BindError>) -> Option<F> {
    match attempt(entry.symbol(), bind) {
        Ok(func) => Some(func),
        Err(e) => {
            tracing::warn!("{entry} will be unavailable: {e}");
            None
        }
    }
}

/// Functions bound from the native library. Created once and never
/// re-probed, an export that failed to bind stays unavailable.
#[derive(Default)]
pub struct NativeAccessor {
    move_window_to_desktop: Option<Bound<WindowIndexFn>>,
    is_window_on_desktop: Option<Bound<WindowIndexFn>>,
    pin_window: Option<Bound<WindowFn>>,
    unpin_window: Option<Bound<WindowFn>>,
    is_pinned_window: Option<Bound<WindowFn>>,
    get_current_desktop_number: Option<QueryFn>,
    get_desktop_count: Option<QueryFn>,
    go_to_desktop_number: Option<IndexFn>,
}
impl NativeAccessor {
    /// Accessor without any bound functions.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Bind all exports. Exports are bound independently so some might be
    /// available even if others aren't.
    pub fn bind(binder: &dyn SymbolBinder) -> Self {
        use EntryPoint::*;

        let this = Self {
            move_window_to_desktop: probe(MoveWindowToDesktopNumber, |c| {
                binder.bind_window_index(MoveWindowToDesktopNumber, c)
            }),
            is_window_on_desktop: probe(IsWindowOnDesktopNumber, |c| {
                binder.bind_window_index(IsWindowOnDesktopNumber, c)
            }),
            pin_window: probe(PinWindow, |c| binder.bind_window(PinWindow, c)),
            unpin_window: probe(UnPinWindow, |c| binder.bind_window(UnPinWindow, c)),
            is_pinned_window: probe(IsPinnedWindow, |c| binder.bind_window(IsPinnedWindow, c)),
            get_current_desktop_number: fixed(GetCurrentDesktopNumber, || {
                binder.bind_query(GetCurrentDesktopNumber)
            }),
            get_desktop_count: fixed(GetDesktopCount, || binder.bind_query(GetDesktopCount)),
            go_to_desktop_number: fixed(GoToDesktopNumber, || {
                binder.bind_index(GoToDesktopNumber)
            }),
        };
        tracing::info!(
            "Bound {} of {} functions from {LIBRARY_NAME}",
            this.bound_count(),
            Self::ALL.len()
        );
        this
    }

    /// Load the native library at `path` and bind its exports.
    ///
    /// # Safety
    ///
    /// Must be safe to call `libloading::Library::new` with `path`. This
    /// means any initialization code in that dynamic library must be safe to
    /// call.
    ///
    /// If the library exports a name we use then that export must have one of
    /// the signatures we try for it.
    pub unsafe fn load(path: &Path) -> Result<Self, LibraryLoadError> {
        let binder = unsafe { DynamicLibraryBinder::open(path) }?;
        tracing::info!("Loaded {}", binder.path().display());
        Ok(Self::bind(&binder))
    }

    const ALL: [EntryPoint; 8] = [
        EntryPoint::MoveWindowToDesktopNumber,
        EntryPoint::IsWindowOnDesktopNumber,
        EntryPoint::PinWindow,
        EntryPoint::UnPinWindow,
        EntryPoint::IsPinnedWindow,
        EntryPoint::GetCurrentDesktopNumber,
        EntryPoint::GetDesktopCount,
        EntryPoint::GoToDesktopNumber,
    ];

    pub fn is_bound(&self, entry: EntryPoint) -> bool {
        match entry {
            EntryPoint::MoveWindowToDesktopNumber => self.move_window_to_desktop.is_some(),
            EntryPoint::IsWindowOnDesktopNumber => self.is_window_on_desktop.is_some(),
            EntryPoint::PinWindow => self.pin_window.is_some(),
            EntryPoint::UnPinWindow => self.unpin_window.is_some(),
            EntryPoint::IsPinnedWindow => self.is_pinned_window.is_some(),
            EntryPoint::GetCurrentDesktopNumber => self.get_current_desktop_number.is_some(),
            EntryPoint::GetDesktopCount => self.get_desktop_count.is_some(),
            EntryPoint::GoToDesktopNumber => self.go_to_desktop_number.is_some(),
        }
    }

    /// Number of exports that were bound.
    pub fn bound_count(&self) -> usize {
        Self::ALL.iter().filter(|&&entry| self.is_bound(entry)).count()
    }

    /// `true` if at least one export was bound.
    pub fn is_loaded(&self) -> bool {
        self.bound_count() > 0
    }

    /// The signature a window handle export was bound with.
    pub fn selected_candidate(&self, entry: EntryPoint) -> Option<SignatureCandidate> {
        match entry {
            EntryPoint::MoveWindowToDesktopNumber => {
                self.move_window_to_desktop.as_ref().map(|b| b.candidate)
            }
            EntryPoint::IsWindowOnDesktopNumber => {
                self.is_window_on_desktop.as_ref().map(|b| b.candidate)
            }
            EntryPoint::PinWindow => self.pin_window.as_ref().map(|b| b.candidate),
            EntryPoint::UnPinWindow => self.unpin_window.as_ref().map(|b| b.candidate),
            EntryPoint::IsPinnedWindow => self.is_pinned_window.as_ref().map(|b| b.candidate),
            EntryPoint::GetCurrentDesktopNumber
            | EntryPoint::GetDesktopCount
            | EntryPoint::GoToDesktopNumber => None,
        }
    }

    fn window_index(
        bound: &Option<Bound<WindowIndexFn>>,
        entry: EntryPoint,
        hwnd: WindowHandle,
        index: i32,
    ) -> Result<i32, BindingUnavailable> {
        let bound = bound.as_ref().ok_or(BindingUnavailable(entry))?;
        tracing::trace!("Dynamic library call to {entry}({hwnd}, {index})");
        Ok((bound.func)(hwnd, index))
    }
    fn window(
        bound: &Option<Bound<WindowFn>>,
        entry: EntryPoint,
        hwnd: WindowHandle,
    ) -> Result<i32, BindingUnavailable> {
        let bound = bound.as_ref().ok_or(BindingUnavailable(entry))?;
        tracing::trace!("Dynamic library call to {entry}({hwnd})");
        Ok((bound.func)(hwnd))
    }

    /// Raw result of `MoveWindowToDesktopNumber` with a zero-based index.
    pub fn move_window_to_desktop(
        &self,
        hwnd: WindowHandle,
        index: i32,
    ) -> Result<i32, BindingUnavailable> {
        Self::window_index(
            &self.move_window_to_desktop,
            EntryPoint::MoveWindowToDesktopNumber,
            hwnd,
            index,
        )
    }
    /// Raw result of `IsWindowOnDesktopNumber` with a zero-based index.
    pub fn is_window_on_desktop(
        &self,
        hwnd: WindowHandle,
        index: i32,
    ) -> Result<i32, BindingUnavailable> {
        Self::window_index(
            &self.is_window_on_desktop,
            EntryPoint::IsWindowOnDesktopNumber,
            hwnd,
            index,
        )
    }
    pub fn pin_window(&self, hwnd: WindowHandle) -> Result<i32, BindingUnavailable> {
        Self::window(&self.pin_window, EntryPoint::PinWindow, hwnd)
    }
    pub fn unpin_window(&self, hwnd: WindowHandle) -> Result<i32, BindingUnavailable> {
        Self::window(&self.unpin_window, EntryPoint::UnPinWindow, hwnd)
    }
    pub fn is_pinned_window(&self, hwnd: WindowHandle) -> Result<i32, BindingUnavailable> {
        Self::window(&self.is_pinned_window, EntryPoint::IsPinnedWindow, hwnd)
    }
    /// Zero-based index of the current desktop, `-1` on failure.
    pub fn get_current_desktop_number(&self) -> Result<i32, BindingUnavailable> {
        let func = self
            .get_current_desktop_number
            .as_ref()
            .ok_or(BindingUnavailable(EntryPoint::GetCurrentDesktopNumber))?;
        tracing::trace!("Dynamic library call to GetCurrentDesktopNumber");
        Ok(func())
    }
    pub fn get_desktop_count(&self) -> Result<i32, BindingUnavailable> {
        let func = self
            .get_desktop_count
            .as_ref()
            .ok_or(BindingUnavailable(EntryPoint::GetDesktopCount))?;
        tracing::trace!("Dynamic library call to GetDesktopCount");
        Ok(func())
    }
    /// Raw result of `GoToDesktopNumber` with a zero-based index.
    pub fn go_to_desktop_number(&self, index: i32) -> Result<i32, BindingUnavailable> {
        let func = self
            .go_to_desktop_number
            .as_ref()
            .ok_or(BindingUnavailable(EntryPoint::GoToDesktopNumber))?;
        tracing::trace!("Dynamic library call to GoToDesktopNumber({index})");
        Ok(func(index))
    }
}
impl fmt::Debug for NativeAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();
        for entry in Self::ALL {
            list.entry(&entry.symbol(), &self.is_bound(entry));
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Call, FakeLibrary};

    const SECOND: SignatureCandidate = SignatureCandidate::HANDLE_CANDIDATES[1];

    #[test]
    fn candidate_order() {
        use CallingConvention::*;
        use HandleWidth::*;
        assert_eq!(
            SignatureCandidate::HANDLE_CANDIDATES,
            [
                SignatureCandidate::new(C, Pointer),
                SignatureCandidate::new(System, Pointer),
                SignatureCandidate::new(C, Int64),
                SignatureCandidate::new(System, Int64),
            ]
        );
    }

    #[test]
    fn export_names() {
        let c = SignatureCandidate::new(CallingConvention::C, HandleWidth::Int64);
        assert_eq!(c.export_name("PinWindow", 0), "PinWindow");

        let system = SignatureCandidate::new(CallingConvention::System, HandleWidth::Int64);
        let name = system.export_name("MoveWindowToDesktopNumber", 4);
        if cfg!(target_arch = "x86") {
            assert_eq!(name, "_MoveWindowToDesktopNumber@12");
        } else {
            assert_eq!(name, "MoveWindowToDesktopNumber");
        }
    }

    #[test]
    fn selects_second_candidate_and_never_touches_others() {
        let library = FakeLibrary::new().accept(EntryPoint::MoveWindowToDesktopNumber, SECOND);
        let accessor = NativeAccessor::bind(&library);

        assert_eq!(
            accessor.selected_candidate(EntryPoint::MoveWindowToDesktopNumber),
            Some(SECOND)
        );
        // Probing stopped at the first match:
        assert_eq!(
            library.attempts_for(EntryPoint::MoveWindowToDesktopNumber),
            SignatureCandidate::HANDLE_CANDIDATES[..2].to_vec()
        );

        assert_eq!(accessor.move_window_to_desktop(WindowHandle(0x42), 3), Ok(1));
        assert_eq!(
            library.calls(),
            vec![Call {
                entry: EntryPoint::MoveWindowToDesktopNumber,
                candidate: Some(SECOND),
                window: Some(WindowHandle(0x42)),
                index: Some(3),
            }]
        );
        for candidate in SignatureCandidate::HANDLE_CANDIDATES {
            let expected = usize::from(candidate == SECOND);
            assert_eq!(
                library.call_count(EntryPoint::MoveWindowToDesktopNumber, Some(candidate)),
                expected
            );
        }
    }

    #[test]
    fn partial_binding_keeps_other_exports() {
        let library = FakeLibrary::new()
            .accept(EntryPoint::IsWindowOnDesktopNumber, SignatureCandidate::HANDLE_CANDIDATES[3])
            .export(EntryPoint::GetCurrentDesktopNumber);
        let accessor = NativeAccessor::bind(&library);

        assert!(!accessor.is_bound(EntryPoint::MoveWindowToDesktopNumber));
        assert!(accessor.is_bound(EntryPoint::IsWindowOnDesktopNumber));
        assert!(accessor.is_bound(EntryPoint::GetCurrentDesktopNumber));
        assert!(!accessor.is_bound(EntryPoint::GetDesktopCount));
        assert_eq!(accessor.bound_count(), 2);
        assert!(accessor.is_loaded());

        // Every candidate was tried for the export that never matched:
        assert_eq!(
            library.attempts_for(EntryPoint::MoveWindowToDesktopNumber),
            SignatureCandidate::HANDLE_CANDIDATES.to_vec()
        );
        assert_eq!(
            accessor.move_window_to_desktop(WindowHandle(1), 0),
            Err(BindingUnavailable(EntryPoint::MoveWindowToDesktopNumber))
        );
    }

    #[test]
    fn panicking_candidate_is_skipped() {
        let library = FakeLibrary::new()
            .panic_on(EntryPoint::PinWindow, SignatureCandidate::HANDLE_CANDIDATES[0])
            .accept(EntryPoint::PinWindow, SECOND);
        let accessor = NativeAccessor::bind(&library);
        assert_eq!(accessor.selected_candidate(EntryPoint::PinWindow), Some(SECOND));
        assert_eq!(accessor.pin_window(WindowHandle(7)), Ok(1));
    }

    #[test]
    fn unavailable_accessor_has_nothing_bound() {
        let accessor = NativeAccessor::unavailable();
        assert!(!accessor.is_loaded());
        assert_eq!(
            accessor.get_current_desktop_number(),
            Err(BindingUnavailable(EntryPoint::GetCurrentDesktopNumber))
        );
    }

    #[test]
    fn missing_library_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = library_path_in(dir.path());
        match unsafe { NativeAccessor::load(&path) } {
            Err(LibraryLoadError::NotFound(missing)) => assert_eq!(missing, path),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
