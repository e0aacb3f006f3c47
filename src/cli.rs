//! Command-line argument parsing and help display.

use crate::{
    config::{CONFIG_ENV, DEFAULT_CONFIG_FILE, ENV_PREFIX, KEYS},
    logging::log_pure_message,
};

/// Subcommand printing the artifact name instead of deploying.
pub const ARTIFACT_NAME_ARG: &str = "artifact_name";

/// What a single invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Print the artifact name and stop.
    ArtifactName,
    /// Print usage and stop.
    Help,
    /// Run the whole pipeline.
    Deploy,
}

/// Picks the mode from the first argument after the program name.
///
/// Anything unrecognised, or no argument at all, means a full deployment.
pub fn parse_args(args: &[String]) -> Mode {
    match args.get(1).map(String::as_str) {
        Some(ARTIFACT_NAME_ARG) => Mode::ArtifactName,
        Some("-help" | "--help" | "-?" | "/?") => Mode::Help,
        _ => Mode::Deploy,
    }
}

/// Prints the help message.
pub fn print_help() {
    log_pure_message("usage: windeploy [artifact_name]");
    log_pure_message("");
    log_pure_message("Packages an installed Qt application build into a zip archive.");
    log_pure_message("");
    log_pure_message("  artifact_name        print the archive name and exit");
    log_pure_message("  -help | --help       print this help message");
    log_pure_message("  (no argument)        install, collect runtime dependencies and archive");
    log_pure_message("");
    log_pure_message(&format!("Configuration is read from {} (or the file named by {}),", DEFAULT_CONFIG_FILE, CONFIG_ENV));
    log_pure_message(&format!("overridden by {}<KEY> environment variables. Keys:", ENV_PREFIX));
    for key in KEYS {
        log_pure_message(&format!("  {}", key));
    }
}
