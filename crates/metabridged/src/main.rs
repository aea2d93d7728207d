use std::process::ExitCode;

fn main() -> ExitCode {
    match metabridged::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Telemetry may not be installed when bootstrap itself failed.
            eprintln!("metabridged: {error}");
            ExitCode::FAILURE
        }
    }
}
