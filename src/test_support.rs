//! In-memory stand-ins for the registry and the native library.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use crate::{
    accessor::{
        BindError, EntryPoint, IndexFn, QueryFn, SignatureCandidate, SymbolBinder, WindowFn,
        WindowIndexFn,
    },
    guid::{VirtualDesktopId, GUID_LEN},
    registry::{
        ConfigStore, ReadError, RegistryKey, ValueInfo, DEFAULT_IDS_VALUE, DEFAULT_KEY_PATH,
    },
    window_info::WindowHandle,
};

/// A desktop id where every byte is `n`.
pub fn id(n: u8) -> VirtualDesktopId {
    VirtualDesktopId::from_bytes([n; GUID_LEN])
}

#[derive(Clone)]
struct StoredValue {
    value_type: u32,
    data: Vec<u8>,
    declared_len: usize,
}

#[derive(Default)]
struct RegistryState {
    keys: HashMap<String, HashMap<String, StoredValue>>,
    open_handles: usize,
    opened_handles: usize,
}

/// Registry that counts how many key handles are opened and still open.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    state: Arc<Mutex<RegistryState>>,
}
impl MemoryRegistry {
    pub fn create_key(&self, path: &str) {
        self.state.lock().unwrap().keys.entry(path.to_owned()).or_default();
    }
    pub fn set_value(&self, path: &str, name: &str, value_type: u32, data: Vec<u8>) {
        let len = data.len();
        self.set_value_with_declared_len(path, name, value_type, data, len);
    }
    /// The size reported before reading will be `declared_len` while only
    /// `data` is written.
    pub fn set_value_with_declared_len(
        &self,
        path: &str,
        name: &str,
        value_type: u32,
        data: Vec<u8>,
        declared_len: usize,
    ) {
        self.state
            .lock()
            .unwrap()
            .keys
            .entry(path.to_owned())
            .or_default()
            .insert(
                name.to_owned(),
                StoredValue {
                    value_type,
                    data,
                    declared_len,
                },
            );
    }
    /// Set the desktop ids at the default location.
    pub fn set_ids(&self, value_type: u32, data: Vec<u8>) {
        self.set_value(DEFAULT_KEY_PATH, DEFAULT_IDS_VALUE, value_type, data);
    }
    pub fn open_handles(&self) -> usize {
        self.state.lock().unwrap().open_handles
    }
    pub fn opened_handles(&self) -> usize {
        self.state.lock().unwrap().opened_handles
    }
}
impl ConfigStore for MemoryRegistry {
    type Key = MemoryKey;

    fn open_read_only(&self, path: &str) -> Result<Self::Key, ReadError> {
        let mut state = self.state.lock().unwrap();
        let values = state.keys.get(path).cloned().ok_or(ReadError::KeyNotFound)?;
        state.open_handles += 1;
        state.opened_handles += 1;
        Ok(MemoryKey {
            values,
            state: Arc::clone(&self.state),
        })
    }
}

pub struct MemoryKey {
    values: HashMap<String, StoredValue>,
    state: Arc<Mutex<RegistryState>>,
}
impl Drop for MemoryKey {
    fn drop(&mut self) {
        self.state.lock().unwrap().open_handles -= 1;
    }
}
impl RegistryKey for MemoryKey {
    fn query_value_info(&self, name: &str) -> Result<ValueInfo, ReadError> {
        let value = self.values.get(name).ok_or(ReadError::ValueMissing)?;
        Ok(ValueInfo {
            value_type: value.value_type,
            len: value.declared_len,
        })
    }
    fn read_value(&self, name: &str, buffer: &mut [u8]) -> Result<usize, ReadError> {
        let value = self.values.get(name).ok_or(ReadError::ValueMissing)?;
        let len = value.data.len().min(buffer.len());
        buffer[..len].copy_from_slice(&value.data[..len]);
        Ok(len)
    }
}

/// A recorded call into a bound fake export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub entry: EntryPoint,
    pub candidate: Option<SignatureCandidate>,
    pub window: Option<WindowHandle>,
    pub index: Option<i32>,
}

/// Return values of the fake exports.
#[derive(Debug, Clone, Copy)]
pub struct FakeResults {
    pub move_window: i32,
    pub is_on_desktop: i32,
    pub pin: i32,
    pub current_index: i32,
    pub desktop_count: i32,
    pub go_to: i32,
}
impl Default for FakeResults {
    fn default() -> Self {
        Self {
            move_window: 1,
            is_on_desktop: 1,
            pin: 1,
            current_index: 0,
            desktop_count: 1,
            go_to: 1,
        }
    }
}

/// A native library that only exports the signatures it was told to.
#[derive(Default)]
pub struct FakeLibrary {
    accepted: HashMap<EntryPoint, SignatureCandidate>,
    panics: HashSet<(EntryPoint, SignatureCandidate)>,
    exported: HashSet<EntryPoint>,
    results: FakeResults,
    attempts: Mutex<Vec<(EntryPoint, SignatureCandidate)>>,
    calls: Arc<Mutex<Vec<Call>>>,
}
impl FakeLibrary {
    pub fn new() -> Self {
        Self::default()
    }
    /// Library where every export binds with the first candidate.
    pub fn complete() -> Self {
        let first = SignatureCandidate::HANDLE_CANDIDATES[0];
        Self::new()
            .accept(EntryPoint::MoveWindowToDesktopNumber, first)
            .accept(EntryPoint::IsWindowOnDesktopNumber, first)
            .accept(EntryPoint::PinWindow, first)
            .accept(EntryPoint::UnPinWindow, first)
            .accept(EntryPoint::IsPinnedWindow, first)
            .export(EntryPoint::GetCurrentDesktopNumber)
            .export(EntryPoint::GetDesktopCount)
            .export(EntryPoint::GoToDesktopNumber)
    }
    /// Export a window handle function with a single signature.
    pub fn accept(mut self, entry: EntryPoint, candidate: SignatureCandidate) -> Self {
        self.accepted.insert(entry, candidate);
        self
    }
    /// Panic when binding `entry` with `candidate`.
    pub fn panic_on(mut self, entry: EntryPoint, candidate: SignatureCandidate) -> Self {
        self.panics.insert((entry, candidate));
        self
    }
    /// Export a function that has a fixed signature.
    pub fn export(mut self, entry: EntryPoint) -> Self {
        self.exported.insert(entry);
        self
    }
    pub fn results(mut self, results: FakeResults) -> Self {
        self.results = results;
        self
    }

    pub fn attempts_for(&self, entry: EntryPoint) -> Vec<SignatureCandidate> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == entry)
            .map(|(_, c)| *c)
            .collect()
    }
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
    pub fn call_count(&self, entry: EntryPoint, candidate: Option<SignatureCandidate>) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.entry == entry && call.candidate == candidate)
            .count()
    }

    fn check_candidate(
        &self,
        entry: EntryPoint,
        candidate: SignatureCandidate,
    ) -> Result<(), BindError> {
        self.attempts.lock().unwrap().push((entry, candidate));
        if self.panics.contains(&(entry, candidate)) {
            panic!("fake library panicked while binding {entry}");
        }
        if self.accepted.get(&entry) == Some(&candidate) {
            Ok(())
        } else {
            Err(BindError::new(
                candidate.export_name(entry.symbol(), 0),
                "symbol not found",
            ))
        }
    }
    fn check_fixed(&self, entry: EntryPoint) -> Result<(), BindError> {
        if self.exported.contains(&entry) {
            Ok(())
        } else {
            Err(BindError::new(entry.symbol(), "symbol not found"))
        }
    }
    fn result_for(&self, entry: EntryPoint) -> i32 {
        let r = &self.results;
        match entry {
            EntryPoint::MoveWindowToDesktopNumber => r.move_window,
            EntryPoint::IsWindowOnDesktopNumber => r.is_on_desktop,
            EntryPoint::PinWindow | EntryPoint::UnPinWindow | EntryPoint::IsPinnedWindow => r.pin,
            EntryPoint::GetCurrentDesktopNumber => r.current_index,
            EntryPoint::GetDesktopCount => r.desktop_count,
            EntryPoint::GoToDesktopNumber => r.go_to,
        }
    }
}
impl SymbolBinder for FakeLibrary {
    fn bind_window_index(
        &self,
        entry: EntryPoint,
        candidate: SignatureCandidate,
    ) -> Result<WindowIndexFn, BindError> {
        self.check_candidate(entry, candidate)?;
        let calls = Arc::clone(&self.calls);
        let result = self.result_for(entry);
        Ok(Box::new(move |window, index| {
            calls.lock().unwrap().push(Call {
                entry,
                candidate: Some(candidate),
                window: Some(window),
                index: Some(index),
            });
            result
        }))
    }
    fn bind_window(
        &self,
        entry: EntryPoint,
        candidate: SignatureCandidate,
    ) -> Result<WindowFn, BindError> {
        self.check_candidate(entry, candidate)?;
        let calls = Arc::clone(&self.calls);
        let result = self.result_for(entry);
        Ok(Box::new(move |window| {
            calls.lock().unwrap().push(Call {
                entry,
                candidate: Some(candidate),
                window: Some(window),
                index: None,
            });
            result
        }))
    }
    fn bind_index(&self, entry: EntryPoint) -> Result<IndexFn, BindError> {
        self.check_fixed(entry)?;
        let calls = Arc::clone(&self.calls);
        let result = self.result_for(entry);
        Ok(Box::new(move |index| {
            calls.lock().unwrap().push(Call {
                entry,
                candidate: None,
                window: None,
                index: Some(index),
            });
            result
        }))
    }
    fn bind_query(&self, entry: EntryPoint) -> Result<QueryFn, BindError> {
        self.check_fixed(entry)?;
        let calls = Arc::clone(&self.calls);
        let result = self.result_for(entry);
        Ok(Box::new(move || {
            calls.lock().unwrap().push(Call {
                entry,
                candidate: None,
                window: None,
                index: None,
            });
            result
        }))
    }
}
