//! The deployment pipeline.
//!
//! Installs the native build into a fresh staging directory named after the
//! application, lets `windeployqt` pull in Qt's runtime, adds the prebuilt
//! dependency DLLs and zips the result. Every step must succeed before the
//! next one starts; nothing is retried or cleaned up on failure.
//!
//! The process working directory is left alone. Everything that is relative
//! to the build directory uses it explicitly.

use crate::{
    archive::archive,
    command,
    config::DeployConfig,
    files::{copy_dependency_dlls, get_folder_files, recreate_dir},
    log, msvc,
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// External tool access used by the pipeline.
pub trait Shell {
    /// Runs a command line in `working_dir`, failing on non-zero exit.
    fn run(&mut self, command_line: &str, working_dir: &Path) -> io::Result<()>;

    /// Runs an environment activation command and adopts its environment.
    fn apply_env(&mut self, env_cmd: &str) -> io::Result<()>;
}

/// [`Shell`] backed by real subprocesses and the process environment.
pub struct SystemShell;

impl Shell for SystemShell {
    fn run(&mut self, command_line: &str, working_dir: &Path) -> io::Result<()> {
        command::run(command_line, working_dir)
    }

    fn apply_env(&mut self, env_cmd: &str) -> io::Result<()> {
        msvc::apply_cmd_env(env_cmd).map(|_| ())
    }
}

/// Native build install step, staging into `install_dir`.
pub fn install_command(make_tool: &str, install_dir: &Path) -> String {
    format!("{0} INSTALL_ROOT=\"{1}\" DESTDIR=\"{1}\" install", make_tool, install_dir.display())
}

/// Qt runtime deployment step for `install_dir`.
pub fn windeployqt_command(qt_dir: &Path, install_dir: &Path) -> String {
    format!("\"{}\" \"{}\"", qt_dir.join("bin").join("windeployqt.exe").display(), install_dir.display())
}

/// Runs the whole pipeline and returns the absolute path of the archive.
///
/// `invocation_dir` is where the archive is written; it is the working
/// directory the tool was started from.
pub fn deploy<S: Shell>(config: &DeployConfig, shell: &mut S, invocation_dir: &Path) -> io::Result<PathBuf> {
    let artifact_path = invocation_dir.join(config.artifact_name());
    log!(">> Making win deploy");

    if config.is_windows_target() {
        let env_cmd = msvc::get_msvc_env_cmd(config.bitness, &config.msvc_version);
        shell.apply_env(&env_cmd)?;
    }

    let build_dir = config.build_dir.as_path();
    if !fs::metadata(build_dir).map(|meta| meta.is_dir()).unwrap_or(false) {
        return Err(io::Error::new(io::ErrorKind::NotFound, format!("build directory not found: {}", build_dir.display())));
    }

    let install_dir = config.install_dir();
    recreate_dir(&install_dir)?;

    shell.run(&install_command(&config.make_tool, &install_dir), build_dir)?;
    shell.run(&windeployqt_command(&config.qt_dir, &install_dir), build_dir)?;

    let copied = copy_dependency_dlls(&config.libs_dir(), &install_dir)?;
    log!("copied {} dependency libraries", copied.len());

    let files = get_folder_files(build_dir, Path::new(&config.app_name))?;
    archive(build_dir, &files, &artifact_path)?;
    log!(">> Created {}", artifact_path.display());
    Ok(artifact_path)
}
