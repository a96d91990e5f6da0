use std::process::ExitCode;

use env_logger::Env;

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match annoset::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(annoset::AnnosetError::ValidationFailed { .. }) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
