//! turntable - single-model FBX viewer
//!
//! Loads one FBX file on a background thread while a progress overlay
//! fades out, then spins the model slowly on a lit stage. Left drag orbits
//! the camera; the mouse wheel zooms when the active preset allows it.

mod app;
mod assets;
mod config;
mod render;
mod scene;
mod ui;

use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = config::Cli::parse();
    let config = match cli.resolve() {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match app::run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
