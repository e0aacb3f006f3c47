mod archive;
mod cli;
mod command;
mod config;
mod deploy;
mod files;
mod logging;
mod msvc;

use cli::{Mode, parse_args, print_help};
use command::CommandFailed;
use config::{DeployConfig, load_config};
use deploy::{SystemShell, deploy};
use std::{
    env,
    io::{self, Write},
    process::ExitCode,
};

/// Writes the bare artifact name and a newline, nothing else.
fn print_artifact_name<W: Write>(config: &DeployConfig, out: &mut W) -> io::Result<()> {
    writeln!(out, "{}", config.artifact_name())
}

/// Process exit code for a failed run: a failed tool's own code when it
/// fits in 1..=255, otherwise 1.
fn exit_code_for(err: &io::Error) -> u8 {
    match CommandFailed::from_io(err).and_then(|failed| failed.code) {
        Some(code) if (1..=255).contains(&code) => code as u8,
        _ => 1,
    }
}

fn run(mode: Mode) -> io::Result<()> {
    if mode == Mode::ArtifactName {
        // stdout carries only the name here
        *logging::use_console().lock().unwrap() = false;
        let config = load_config()?;
        return print_artifact_name(&config, &mut io::stdout().lock());
    }

    let config = load_config()?;
    if let Some(log_file) = &config.log_file {
        logging::open_log_file(log_file)?;
    }
    config.validate_for_deploy()?;
    log!("deploying {} {} for {} ({}-bit)", config.app_name, config.app_version, config.os_name, config.bitness.as_str());
    let invocation_dir = env::current_dir()?;
    deploy(&config, &mut SystemShell, &invocation_dir)?;
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let mode = parse_args(&args);
    if mode == Mode::Help {
        print_help();
        return ExitCode::SUCCESS;
    }

    let result = run(mode);
    let code = match &result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if *logging::use_console().lock().unwrap() {
                log!("deployment failed: {}", e);
            } else {
                eprintln!("error: {}", e);
            }
            ExitCode::from(exit_code_for(e))
        }
    };
    logging::flush();
    code
}
