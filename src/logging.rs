//! Logging utilities for the deployment tool.
//!
//! Lines go to the console with a timestamp prefix unless console output is
//! switched off. When a log file is configured, the same lines are appended to
//! it as well.

use chrono::Local;
use once_cell::sync::Lazy;
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::Mutex,
};

/// Whether to write log lines to stdout.
static USE_CONSOLE: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::from(true));

/// Optional log file mirroring console output.
static LOG_FILE: Lazy<Mutex<Option<File>>> = Lazy::new(|| Mutex::new(None));

/// Returns a reference to the console mode flag.
pub fn use_console() -> &'static Mutex<bool> {
    &USE_CONSOLE
}

/// Returns a reference to the mirrored log file slot.
pub fn logger() -> &'static Mutex<Option<File>> {
    &LOG_FILE
}

/// Starts mirroring log lines into `path` (appending, created if missing).
pub fn open_log_file(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    *logger().lock().unwrap() = Some(file);
    Ok(())
}

/// Macro for convenient logging with format strings.
#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => {
        $crate::logging::log_message(format!($($arg)*).as_str());
    };
}

/// Logs a message with a time prefix.
pub fn log_message(args: &str) {
    let time_prefix = Local::now().format("%H:%M:%S").to_string();
    write_line(&format!("[{}]{}", time_prefix, args));
}

/// Logs a message without any prefix.
pub fn log_pure_message(args: &str) {
    write_line(args);
}

fn write_line(line: &str) {
    if *use_console().lock().unwrap() {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{}", line);
        // child processes share this stdout
        let _ = stdout.flush();
    }
    if let Some(file) = logger().lock().unwrap().as_mut() {
        let _ = writeln!(file, "{}", line);
    }
}

/// Flushes the mirrored log file, if any.
pub fn flush() {
    if let Some(file) = logger().lock().unwrap().as_mut() {
        let _ = file.flush();
    }
}

/// Converts a process exit code to a human-readable string.
pub fn describe_exit_code(code: Option<i32>) -> String {
    match code {
        Some(0) => "SUCCESS".to_string(),
        Some(1) => "FAILURE".to_string(),
        Some(2) => "FILE_NOT_FOUND".to_string(),
        Some(5) => "ACCESS_DENIED".to_string(),
        Some(9009) => "COMMAND_NOT_FOUND".to_string(),
        Some(127) => "COMMAND_NOT_FOUND".to_string(),
        Some(code) => ("code=".to_string()) + &code.to_string(),
        None => "TERMINATED_BY_SIGNAL".to_string(),
    }
}
