use std::process::ExitCode;

fn main() -> ExitCode {
    virtual_desktop_interop::run_cli()
}
