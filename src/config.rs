//! Configuration parsing and management.
//!
//! Reads `deploy.ini` style files and `DEPLOY_*` environment overrides into a
//! [`DeployConfig`].
//!
//! ## File Format
//!
//! ```text
//! # comment
//! app_name = ScreenTranslator
//! app_version = 3.0.0
//! os_name = win64
//! qt_dir = "C:/Qt/5.15.2/msvc2019_64"
//! ```
//!
//! Environment variables named `DEPLOY_<KEY>` (e.g. `DEPLOY_OS_NAME`) take
//! precedence over values from the file.

use crate::log;
use rustc_hash::FxHashMap;
use std::env;
use std::fs::File;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `DEPLOY_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "deploy.ini";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DEPLOY_CONFIG";

/// Prefix of per-key environment overrides.
pub const ENV_PREFIX: &str = "DEPLOY_";

/// Every key understood in the config file.
pub const KEYS: &[&str] = &[
    "app_name",
    "app_version",
    "os_name",
    "bitness",
    "msvc_version",
    "build_dir",
    "qt_dir",
    "dependencies_dir",
    "make_tool",
    "log_file",
];

/// Target processor bitness, selecting the compiler environment architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitness {
    X86,
    X64,
}

impl Bitness {
    const TABLE: &'static [(Self, &'static str, &'static str)] = &[(Self::X86, "32", "x86"), (Self::X64, "64", "amd64")];

    /// Bit count as written in config files.
    pub fn as_str(&self) -> &'static str {
        Self::TABLE.iter().find(|(v, _, _)| v == self).map(|(_, name, _)| *name).unwrap_or("64")
    }

    /// Architecture argument accepted by `vcvarsall.bat`.
    pub fn vcvars_arch(&self) -> &'static str {
        Self::TABLE.iter().find(|(v, _, _)| v == self).map(|(_, _, arch)| *arch).unwrap_or("amd64")
    }

    /// Parses `32`/`64`, also accepting the architecture names.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Self::TABLE.iter().find(|(_, name, arch)| *name == s || *arch == s).map(|(v, _, _)| *v)
    }

    /// Default bitness implied by an OS identifier such as `win32` or `win64`.
    pub fn for_os(os_name: &str) -> Self {
        if os_name == "win32" { Self::X86 } else { Self::X64 }
    }
}

/// Values driving a single deployment run. Read once, never mutated.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub app_name: String,
    pub app_version: String,
    pub os_name: String,
    pub bitness: Bitness,
    /// Visual Studio version directory, e.g. `2019`. Empty = search any.
    pub msvc_version: String,
    /// Absolute build directory holding the native build's makefiles.
    pub build_dir: PathBuf,
    /// Absolute Qt installation directory (contains `bin/windeployqt.exe`).
    pub qt_dir: PathBuf,
    /// Absolute directory of prebuilt dependencies (DLLs live in its `bin`).
    pub dependencies_dir: PathBuf,
    /// Native build tool invoked for the install step.
    pub make_tool: String,
    /// Optional file mirroring the log output.
    pub log_file: Option<PathBuf>,
}

impl DeployConfig {
    /// Builds a configuration from raw key/value pairs.
    ///
    /// Relative paths are resolved against `base_dir`.
    pub fn from_values(values: &FxHashMap<String, String>, base_dir: &Path) -> io::Result<Self> {
        let get = |key: &str| values.get(key).map(|v| v.trim()).unwrap_or("");
        let required = |key: &str| -> io::Result<String> {
            let value = get(key);
            if value.is_empty() {
                Err(io::Error::new(io::ErrorKind::InvalidInput, format!("missing config value: {}", key)))
            } else {
                Ok(value.to_string())
            }
        };
        let path_or = |key: &str, default: &str| -> PathBuf {
            let value = get(key);
            resolve_path(base_dir, if value.is_empty() { default } else { value })
        };

        let app_name = required("app_name")?;
        let app_version = required("app_version")?;
        let os_name = required("os_name")?;
        let bitness = match get("bitness") {
            "" => Bitness::for_os(&os_name),
            value => Bitness::parse(value).ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid bitness: {}", value)))?,
        };
        let qt_dir = match get("qt_dir") {
            "" => PathBuf::new(),
            value => resolve_path(base_dir, value),
        };
        let make_tool = match get("make_tool") {
            "" => "nmake".to_string(),
            value => value.to_string(),
        };
        let log_file = match get("log_file") {
            "" => None,
            value => Some(resolve_path(base_dir, value)),
        };

        Ok(Self {
            app_name,
            app_version,
            os_name,
            bitness,
            msvc_version: get("msvc_version").to_string(),
            build_dir: path_or("build_dir", "build"),
            qt_dir,
            dependencies_dir: path_or("dependencies_dir", "deps"),
            make_tool,
            log_file,
        })
    }

    /// Name of the produced archive: `{app_name}-{app_version}-{os_name}.zip`.
    pub fn artifact_name(&self) -> String {
        format!("{}-{}-{}.zip", self.app_name, self.app_version, self.os_name)
    }

    /// Whether the compiler environment has to be activated before building.
    pub fn is_windows_target(&self) -> bool {
        self.os_name.starts_with("win")
    }

    /// Staging directory the application gets installed into.
    pub fn install_dir(&self) -> PathBuf {
        self.build_dir.join(&self.app_name)
    }

    /// Directory scanned for dependency DLLs.
    pub fn libs_dir(&self) -> PathBuf {
        self.dependencies_dir.join("bin")
    }

    /// Checks the values only a full deployment needs.
    pub fn validate_for_deploy(&self) -> io::Result<()> {
        if self.qt_dir.as_os_str().is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "missing config value: qt_dir"));
        }
        if self.make_tool.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "missing config value: make_tool"));
        }
        Ok(())
    }
}

fn resolve_path(base_dir: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() { path.to_path_buf() } else { base_dir.join(path) }
}

/// Parses config text into lowercase keys and trimmed values.
///
/// # Format
/// - `# comment` - Lines starting with `#` are ignored
/// - `key = value` - Sets a key, surrounding double quotes are stripped
pub fn parse_config_text(text: &str) -> FxHashMap<String, String> {
    let mut values = FxHashMap::default();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            log!("Config: ignoring malformed line {}: {}", index + 1, line);
            continue;
        };
        let key = key.trim().to_lowercase();
        if !KEYS.contains(&key.as_str()) {
            log!("Config: unknown key {}", key);
            continue;
        }
        let value = value.trim();
        let value = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value);
        values.insert(key, value.to_string());
    }
    values
}

/// Reads raw config values from a file.
pub fn read_config_values<P: AsRef<Path>>(path: P) -> io::Result<FxHashMap<String, String>> {
    let file = File::open(path)?;
    let reader = io::BufReader::new(file);
    let mut text = String::new();
    for line in reader.lines() {
        text.push_str(&line?);
        text.push('\n');
    }
    Ok(parse_config_text(&text))
}

/// Overlays `DEPLOY_<KEY>` values returned by `lookup` onto `values`.
pub fn apply_overrides<F>(values: &mut FxHashMap<String, String>, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for key in KEYS {
        let name = format!("{}{}", ENV_PREFIX, key.to_uppercase());
        if let Some(value) = lookup(&name) {
            values.insert(key.to_string(), value);
        }
    }
}

/// Loads the configuration from the config file and the process environment.
///
/// A missing `deploy.ini` is fine; a missing file named by `DEPLOY_CONFIG` is not.
pub fn load_config() -> io::Result<DeployConfig> {
    let cwd = env::current_dir()?;
    let mut values = match env::var(CONFIG_ENV) {
        Ok(path) => read_config_values(&path).map_err(|e| io::Error::new(e.kind(), format!("cannot read config {}: {}", path, e)))?,
        Err(_) => {
            let default = cwd.join(DEFAULT_CONFIG_FILE);
            if default.is_file() { read_config_values(&default)? } else { FxHashMap::default() }
        }
    };
    apply_overrides(&mut values, |name| env::var(name).ok());
    DeployConfig::from_values(&values, &cwd)
}
