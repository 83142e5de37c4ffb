//! Settings that control where the virtual desktop info is read from.
//!
//! Settings are read once from a JSON file next to the executable and are
//! never written by this crate.

use crate::{
    accessor::{library_path_in, LibraryLoadError},
    platform::OsVersion,
    registry,
};
#[cfg(feature = "persist_settings")]
use serde::{Deserialize, Deserializer, Serialize};
#[cfg(feature = "persist_settings")]
use std::io::ErrorKind::NotFound;
use std::path::{Path, PathBuf};

/// Use a default value if serialization fails for a field.
///
/// # References
///
/// Inspired by:
///
/// [\[Solved\] Serde deserialization on_error use default values? - help - The
/// Rust Programming Language
/// Forum](https://users.rust-lang.org/t/solved-serde-deserialization-on-error-use-default-values/6681)
#[cfg(feature = "persist_settings")]
fn ok_or_none<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    let v: serde_json::Value = Deserialize::deserialize(deserializer)?;
    Ok(T::deserialize(v).ok())
}

/// Provide a deserialization for `InteropSettings` that can handle malformed
/// fields.
macro_rules! default_deserialize {
    (@inner
        $(#[$ty_attr:meta])*
        $ty_vis:vis struct $name:ident { $(
            $(#[$field_attr:meta])*
            $field_vis:vis $field_name:ident: $field_ty:ty
        ,)* $(,)? }
    ) => {
        #[derive(PartialEq, Eq, Clone, Debug, Default)]
        #[cfg_attr(feature = "persist_settings", derive(Serialize, Deserialize))]
        pub struct InteropSettingsFallback { $(
            $(#[$field_attr])*
            // None if deserialization failed:
            #[cfg_attr(feature = "persist_settings", serde(deserialize_with = "ok_or_none"))]
            // None if field isn't present:
            #[cfg_attr(feature = "persist_settings", serde(default))]
            $field_vis $field_name: Option<$field_ty>,
        )* }
        impl From<InteropSettingsFallback> for $name {
            fn from(value: InteropSettingsFallback) -> Self {
                let mut this = <Self as Default>::default();
                $(
                    if let Some($field_name) = value.$field_name {
                        this.$field_name = $field_name;
                    }
                )*
                this
            }
        }
    };
    ($($token:tt)*) => {
        $($token)*
        default_deserialize! { @inner $($token)* }
    };
}

default_deserialize!(
    #[derive(PartialEq, Eq, Clone, Debug)]
    #[cfg_attr(feature = "persist_settings", derive(Serialize, Deserialize))]
    #[cfg_attr(feature = "persist_settings", serde(default))]
    pub struct InteropSettings {
        /// Directory with `VirtualDesktopAccessor.dll`. Defaults to the
        /// directory of the executable.
        pub library_dir: Option<PathBuf>,
        /// Registry key under `HKEY_CURRENT_USER` with virtual desktop info.
        pub registry_key: String,
        /// Registry value with the ids of all desktops.
        pub ids_value: String,
        /// Registry value with the id of the current desktop.
        pub current_value: String,
        /// Most verbose log level that is written to stderr.
        pub log_level: String,
        /// Windows 10 build that introduced virtual desktops.
        pub minimum_build: u32,
    }
);
impl Default for InteropSettings {
    fn default() -> Self {
        Self {
            library_dir: None,
            registry_key: registry::DEFAULT_KEY_PATH.to_owned(),
            ids_value: registry::DEFAULT_IDS_VALUE.to_owned(),
            current_value: registry::DEFAULT_CURRENT_VALUE.to_owned(),
            log_level: "info".to_owned(),
            minimum_build: crate::platform::FEATURE_FLOOR.build,
        }
    }
}
impl InteropSettings {
    /// Path of the settings file for the running executable.
    pub fn path_next_to_exe() -> std::io::Result<PathBuf> {
        Ok(std::env::current_exe()?.with_extension("settings.json"))
    }

    /// Load settings from next to the executable, using defaults if that
    /// fails.
    pub fn load_next_to_exe() -> Self {
        match Self::path_next_to_exe() {
            Ok(path) => Self::load(&path),
            Err(e) => {
                tracing::warn!("Failed to find settings file, can't get executable's path: {e}");
                Self::default()
            }
        }
    }

    /// Load settings from `path`. Missing files give default settings and
    /// fields that fail to parse are replaced by their default values.
    pub fn load(path: &Path) -> Self {
        #[cfg(feature = "persist_settings")]
        {
            match std::fs::read_to_string(path) {
                Ok(data) => Self::parse(&data).unwrap_or_else(|(fallback, e)| {
                    tracing::warn!(
                        "Could not parse settings file as JSON: {e}: Settings file at \"{}\"",
                        path.display()
                    );
                    fallback
                }),
                Err(e) if e.kind() == NotFound => {
                    tracing::trace!(
                        "Using default settings since no settings file was found at \"{}\"",
                        path.display()
                    );
                    Self::default()
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to read settings file: {e}: Settings file at \"{}\"",
                        path.display()
                    );
                    Self::default()
                }
            }
        }
        #[cfg(not(feature = "persist_settings"))]
        {
            tracing::trace!(
                "Ignoring settings file at \"{}\" since persist_settings is disabled",
                path.display()
            );
            Self::default()
        }
    }

    /// Strict parse, on error returns the lenient parse together with the
    /// error message.
    #[cfg(feature = "persist_settings")]
    fn parse(data: &str) -> Result<Self, (Self, String)> {
        let mut deserializer = serde_json::Deserializer::from_str(data);
        let result: Result<Self, String> = {
            #[cfg(not(feature = "serde_path_to_error"))]
            {
                Deserialize::deserialize(&mut deserializer).map_err(|e| e.to_string())
            }
            #[cfg(feature = "serde_path_to_error")]
            {
                serde_path_to_error::deserialize(&mut deserializer).map_err(|e| e.to_string())
            }
        };
        result.map_err(|e| {
            // Try to be more lenient when parsing (skip parsing for fields
            // that fail and use default values for those):
            let fallback = serde_json::from_str::<InteropSettingsFallback>(data)
                .map(Self::from)
                .unwrap_or_default();
            (fallback, e)
        })
    }

    /// Where the native library should be loaded from.
    pub fn library_path(&self) -> Result<PathBuf, LibraryLoadError> {
        if let Some(dir) = &self.library_dir {
            return Ok(library_path_in(dir));
        }
        let exe = std::env::current_exe().map_err(LibraryLoadError::NoInstallDir)?;
        let dir = exe.parent().ok_or_else(|| {
            LibraryLoadError::NoInstallDir(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "the executable has no parent directory",
            ))
        })?;
        Ok(library_path_in(dir))
    }

    /// Oldest Windows version that has virtual desktops.
    pub fn feature_floor(&self) -> OsVersion {
        OsVersion::windows_10_build(self.minimum_build)
    }

    /// Parsed [`Self::log_level`], `INFO` if it isn't a valid level.
    pub fn max_log_level(&self) -> tracing::Level {
        self.log_level.trim().parse().unwrap_or(tracing::Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_explorer_locations() {
        let settings = InteropSettings::default();
        assert_eq!(settings.registry_key, registry::DEFAULT_KEY_PATH);
        assert_eq!(settings.ids_value, "VirtualDesktopIDs");
        assert_eq!(settings.current_value, "CurrentVirtualDesktop");
        assert_eq!(settings.feature_floor(), crate::platform::FEATURE_FLOOR);
        assert_eq!(settings.max_log_level(), tracing::Level::INFO);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = InteropSettings::load(&dir.path().join("vdi.settings.json"));
        assert_eq!(settings, InteropSettings::default());
    }

    #[test]
    fn library_dir_override() {
        let settings = InteropSettings {
            library_dir: Some(PathBuf::from("resources")),
            ..Default::default()
        };
        let path = settings.library_path().unwrap();
        assert_eq!(path.parent(), Some(Path::new("resources")));
        assert_eq!(
            path.file_name(),
            Some(libloading::library_filename("VirtualDesktopAccessor").as_os_str())
        );
    }

    #[test]
    fn invalid_log_level_falls_back_to_info() {
        let settings = InteropSettings {
            log_level: "chatty".to_owned(),
            ..Default::default()
        };
        assert_eq!(settings.max_log_level(), tracing::Level::INFO);
        let settings = InteropSettings {
            log_level: "trace".to_owned(),
            ..Default::default()
        };
        assert_eq!(settings.max_log_level(), tracing::Level::TRACE);
    }

    #[cfg(feature = "persist_settings")]
    #[test]
    fn loads_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vdi.settings.json");
        std::fs::write(&path, r#"{ "log_level": "debug", "minimum_build": 14393 }"#).unwrap();

        let settings = InteropSettings::load(&path);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.minimum_build, 14393);
        assert_eq!(settings.ids_value, "VirtualDesktopIDs");
    }

    #[cfg(feature = "persist_settings")]
    #[test]
    fn malformed_field_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vdi.settings.json");
        std::fs::write(
            &path,
            r#"{ "minimum_build": "not a number", "ids_value": "OtherIDs" }"#,
        )
        .unwrap();

        let settings = InteropSettings::load(&path);
        assert_eq!(settings.minimum_build, 10240);
        assert_eq!(settings.ids_value, "OtherIDs");
    }

    #[cfg(feature = "persist_settings")]
    #[test]
    fn unreadable_json_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vdi.settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(InteropSettings::load(&path), InteropSettings::default());
    }
}
