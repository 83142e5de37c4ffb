//! Move windows between Windows virtual desktops and query which desktop is
//! active.
//!
//! The list of desktops is read from the registry where Explorer stores it,
//! everything that needs the desktop manager goes through the
//! `VirtualDesktopAccessor.dll` library which is loaded at runtime. See
//! [`vd::VirtualDesktops`] for the available operations.

pub mod accessor;
pub mod guid;
pub mod platform;
pub mod registry;
pub mod settings;
#[cfg(test)]
mod test_support;
pub mod vd;
pub mod window_info;

use registry::HostRegistry;
use settings::InteropSettings;
use vd::VirtualDesktops;

/// Environment variable that overrides the log level from the settings file.
pub const LOG_LEVEL_ENV: &str = "VDI_LOG";

/// The most verbose log level that should be written.
pub fn log_level(settings: &InteropSettings) -> tracing::Level {
    match std::env::var(LOG_LEVEL_ENV) {
        Ok(level) => level.trim().parse().unwrap_or_else(|_| {
            eprintln!("Ignoring invalid {LOG_LEVEL_ENV}={level:?}");
            settings.max_log_level()
        }),
        Err(_) => settings.max_log_level(),
    }
}

/// Write logs to stderr and forward panics to the log.
#[cfg(feature = "logging")]
pub fn setup_logging(level: tracing::Level) {
    let my_subscriber = ::tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_max_level(level)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(my_subscriber) {
        tracing::warn!("Logging was already configured: {e}");
        return;
    }

    // Set the global logger for the `log` crate:
    if let Err(e) = ::tracing_log::LogTracer::init() {
        tracing::warn!("Failed to forward records from the log crate: {e}");
    }

    tracing::debug!("Configured global logger");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        prev(info);
        tracing::error!("Panic: {}", info);
    }));
}

/// Read the settings next to the executable, set up logging and load the
/// native library.
///
/// # Safety
///
/// Same as [`VirtualDesktops::from_settings`].
pub unsafe fn init_from_host() -> (InteropSettings, VirtualDesktops<HostRegistry>) {
    let settings = InteropSettings::load_next_to_exe();
    #[cfg(feature = "logging")]
    setup_logging(log_level(&settings));
    let desktops = unsafe { VirtualDesktops::from_settings(&settings) };
    (settings, desktops)
}

#[cfg(feature = "cli_commands")]
pub use cli::run_cli;

#[cfg(feature = "cli_commands")]
mod cli {
    use std::process::ExitCode;

    use clap::Parser;

    use crate::{
        registry::ConfigStore,
        vd::{self, VirtualDesktops},
        window_info::WindowHandle,
    };

    const SUCCESS: u8 = 0;
    /// Exit code when an operation fell back to its safe default.
    const DEGRADED: u8 = 1;
    /// Exit code for invalid arguments.
    const INVALID_ARGS: u8 = 2;

    #[derive(clap::Parser, Debug, PartialEq, Eq)]
    #[command(version, about)]
    pub(crate) enum Args {
        /// List the ids of all virtual desktops in order.
        List,
        /// Print the number of the current desktop.
        Current,
        /// Check if virtual desktops can be managed on this system.
        Supported,
        /// Print the id of a desktop.
        Resolve {
            /// One-based desktop number.
            #[arg(allow_negative_numbers = true)]
            number: i32,
        },
        /// Move a window to another desktop.
        Move {
            /// Window handle, decimal or hex with a `0x` prefix.
            window: WindowHandle,
            /// One-based desktop number.
            #[arg(allow_negative_numbers = true)]
            number: i32,
        },
        /// Check if a window is on a desktop.
        IsOn {
            /// Window handle, decimal or hex with a `0x` prefix.
            window: WindowHandle,
            /// One-based desktop number.
            #[arg(allow_negative_numbers = true)]
            number: i32,
        },
        /// Switch to another desktop.
        Switch {
            /// One-based desktop number.
            #[arg(allow_negative_numbers = true)]
            number: i32,
        },
        /// Show a window on all desktops.
        Pin {
            /// Window handle, decimal or hex with a `0x` prefix.
            window: WindowHandle,
        },
        /// Only show a window on its own desktop.
        Unpin {
            /// Window handle, decimal or hex with a `0x` prefix.
            window: WindowHandle,
        },
    }

    fn report<T>(result: vd::Result<T>, show: impl FnOnce(T)) -> u8 {
        match result {
            Ok(value) => {
                show(value);
                SUCCESS
            }
            Err(e) => {
                tracing::debug!("CLI command failed: {e:?}");
                eprintln!("{e}");
                DEGRADED
            }
        }
    }

    /// Run a command and return the process exit code.
    pub(crate) fn execute<S: ConfigStore>(args: Args, desktops: &VirtualDesktops<S>) -> u8 {
        tracing::debug!("Executing CLI command: {args:?}");
        match args {
            Args::List => report(
                desktops
                    .registry()
                    .read_desktop_ids()
                    .map_err(vd::Error::from),
                |ids| {
                    for (index, id) in ids.iter().enumerate() {
                        println!("{}: {id}", index + 1);
                    }
                },
            ),
            Args::Current => report(desktops.try_current_desktop_number(), |number| {
                println!("{number}")
            }),
            Args::Supported => report(desktops.try_check_supported(), |()| {
                println!("supported")
            }),
            Args::Resolve { number } => {
                report(desktops.try_resolve_id_by_number(number), |id| {
                    println!("{id}")
                })
            }
            Args::Move { window, number } => {
                report(desktops.try_move_window_to_desktop(window, number), |()| {})
            }
            Args::IsOn { window, number } => {
                report(desktops.try_is_window_on_desktop(window, number), |on| {
                    println!("{on}")
                })
            }
            Args::Switch { number } => {
                report(desktops.try_switch_to_desktop(number), |()| {})
            }
            Args::Pin { window } => report(desktops.try_pin_window(window), |()| {}),
            Args::Unpin { window } => report(desktops.try_unpin_window(window), |()| {}),
        }
    }

    /// Parse the command line arguments and run the requested operation.
    pub fn run_cli() -> ExitCode {
        let args = match Args::try_parse() {
            Ok(args) => args,
            Err(e) => {
                let _ = e.print();
                return if e.use_stderr() {
                    ExitCode::from(INVALID_ARGS)
                } else {
                    // --help or --version
                    ExitCode::SUCCESS
                };
            }
        };

        // Safety: "VirtualDesktopAccessor.dll" is well-behaved if it exists.
        let (_settings, desktops) = unsafe { crate::init_from_host() };
        ExitCode::from(execute(args, &desktops))
    }

}
