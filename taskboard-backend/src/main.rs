use std::path::PathBuf;
use std::process::ExitCode;
use taskboard_backend::{config, logging};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = logging::init() {
        eprintln!("failed to initialize logger: {}", e);
    }

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);

    match taskboard_backend::run(&config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!(target: "taskboard.server", "{}", e);
            ExitCode::FAILURE
        }
    }
}
