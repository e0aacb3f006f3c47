//! Compiler environment activation for MSVC builds.
//!
//! Locates `vcvarsall.bat` for a Visual Studio version and merges the
//! environment it produces into this process, so that `nmake`, `cl` and
//! `link` resolve to the requested toolchain in later subprocesses.

use crate::{config::Bitness, log};
use encoding_rs::UTF_16LE;
use rustc_hash::FxHashMap;
#[cfg(windows)]
use std::process::Command;
use std::{
    env,
    ffi::{OsStr, OsString},
    fs, io,
    path::{Path, PathBuf},
};

/// Default Visual Studio installation root.
pub const VS_ROOT: &str = "C:\\Program Files (x86)\\Microsoft Visual Studio";

/// Editions searched, in order of preference.
pub const EDITIONS: &[&str] = &["Enterprise", "Professional", "Community", "BuildTools"];

const VCVARS_SUBPATH: &[&str] = &["VC", "Auxiliary", "Build", "vcvarsall.bat"];

/// Candidate `vcvarsall.bat` locations under `root` for `msvc_version`.
///
/// An empty version lists every version directory found under `root`,
/// newest name first.
pub fn vcvarsall_candidates(root: &Path, msvc_version: &str) -> Vec<PathBuf> {
    let versions: Vec<PathBuf> = if msvc_version.is_empty() {
        let mut found: Vec<PathBuf> = fs::read_dir(root)
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).filter(|p| p.is_dir()).collect())
            .unwrap_or_default();
        found.sort();
        found.reverse();
        found
    } else {
        vec![root.join(msvc_version)]
    };

    let mut candidates = Vec::new();
    for version_dir in &versions {
        for edition in EDITIONS {
            let mut path = version_dir.join(edition);
            path.extend(VCVARS_SUBPATH);
            candidates.push(path);
        }
    }
    candidates
}

/// Returns the command activating the MSVC environment for `bitness`.
///
/// Falls back to the first candidate when no `vcvarsall.bat` exists, so that
/// applying the command fails with the tool's own error.
pub fn get_msvc_env_cmd_in(root: &Path, bitness: Bitness, msvc_version: &str) -> String {
    let candidates = vcvarsall_candidates(root, msvc_version);
    let vcvarsall = match candidates.iter().find(|p| p.is_file()) {
        Some(found) => found.clone(),
        None => {
            let fallback = candidates.into_iter().next().unwrap_or_else(|| {
                let mut path = root.join(msvc_version);
                path.extend(VCVARS_SUBPATH);
                path
            });
            log!("vcvarsall.bat not found, trying {}", fallback.display());
            fallback
        }
    };
    format!("\"{}\" {}", vcvarsall.display(), bitness.vcvars_arch())
}

/// [`get_msvc_env_cmd_in`] against the default installation root.
pub fn get_msvc_env_cmd(bitness: Bitness, msvc_version: &str) -> String {
    get_msvc_env_cmd_in(Path::new(VS_ROOT), bitness, msvc_version)
}

/// Parses `set` output into variable pairs.
///
/// Lines without `=` are skipped, as are cmd's hidden `=C:=C:\...` entries.
pub fn parse_env_output(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.starts_with('='))
        .filter_map(|line| line.split_once('='))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Decodes the UTF-16LE output of `cmd /U`.
pub fn decode_cmd_output(bytes: &[u8]) -> String {
    let (text, _, had_errors) = UTF_16LE.decode(bytes);
    if had_errors {
        log!("decode_cmd_output: replaced invalid UTF-16 sequences");
    }
    text.into_owned()
}

/// Variables in `vars` that are missing from or differ in `current`.
///
/// `current` is keyed by raw OS strings, non-Unicode entries simply never match.
pub fn changed_vars<'a>(vars: &'a [(String, String)], current: &FxHashMap<OsString, OsString>) -> Vec<&'a (String, String)> {
    vars.iter().filter(|(key, value)| current.get(OsStr::new(key)).map(OsString::as_os_str) != Some(OsStr::new(value))).collect()
}

/// Runs `cmd` and merges the environment it leaves behind into this process.
///
/// Returns the number of variables that changed.
pub fn apply_cmd_env(cmd: &str) -> io::Result<usize> {
    log!(">> Applying env {}", cmd);
    let output = dump_env(cmd)?;
    let vars = parse_env_output(&decode_cmd_output(&output));
    if vars.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, format!("no environment produced by {}", cmd)));
    }

    let current: FxHashMap<OsString, OsString> = env::vars_os().collect();
    let changed = changed_vars(&vars, &current);
    for (key, value) in &changed {
        // SAFETY: the deployment runs on a single thread and spawns children
        // only after the environment is settled
        unsafe { env::set_var(key, value) };
    }
    log!("applied {} environment variables", changed.len());
    Ok(changed.len())
}

#[cfg(windows)]
fn dump_env(cmd: &str) -> io::Result<Vec<u8>> {
    use std::os::windows::process::CommandExt;
    // /U makes cmd's builtins (`set`) write UTF-16LE into the pipe
    let line = format!("/U /C \"{} >nul && set\"", cmd);
    let mut dump = Command::new("cmd");
    dump.raw_arg(&line);
    crate::command::capture_output(dump, &line)
}

#[cfg(not(windows))]
fn dump_env(_cmd: &str) -> io::Result<Vec<u8>> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "compiler environment activation needs cmd.exe"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_for_version() {
        let root = Path::new("vs");
        let candidates = vcvarsall_candidates(root, "2019");
        assert_eq!(candidates.len(), EDITIONS.len());
        let expected: PathBuf = ["vs", "2019", "Enterprise", "VC", "Auxiliary", "Build", "vcvarsall.bat"].iter().collect();
        assert_eq!(candidates[0], expected);
    }

    #[test]
    fn test_get_msvc_env_cmd_finds_installed_edition() {
        let root = tempfile::tempdir().unwrap();
        let build = root.path().join("2019").join("Community").join("VC").join("Auxiliary").join("Build");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("vcvarsall.bat"), "@echo off").unwrap();

        let cmd = get_msvc_env_cmd_in(root.path(), Bitness::X64, "2019");
        assert_eq!(cmd, format!("\"{}\" amd64", build.join("vcvarsall.bat").display()));

        let any = get_msvc_env_cmd_in(root.path(), Bitness::X86, "");
        assert_eq!(any, format!("\"{}\" x86", build.join("vcvarsall.bat").display()));
    }

    #[test]
    fn test_get_msvc_env_cmd_fallback() {
        let root = tempfile::tempdir().unwrap();
        let cmd = get_msvc_env_cmd_in(root.path(), Bitness::X86, "2017");
        assert!(cmd.contains("Enterprise"));
        assert!(cmd.ends_with("\" x86"));
    }

    #[test]
    fn test_parse_env_output() {
        let text = "=C:=C:\\work\r\nPATH=C:\\bin;C:\\tools\r\nINCLUDE=\r\nnoise line\r\nVCToolsVersion=14.29.30133\r\n";
        let vars = parse_env_output(text);
        assert_eq!(
            vars,
            vec![
                ("PATH".to_string(), "C:\\bin;C:\\tools".to_string()),
                ("INCLUDE".to_string(), String::new()),
                ("VCToolsVersion".to_string(), "14.29.30133".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_cmd_output() {
        let bytes: Vec<u8> = "LIB=C:\\lib\r\n".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert_eq!(decode_cmd_output(&bytes), "LIB=C:\\lib\r\n");
    }

    #[test]
    fn test_changed_vars() {
        let vars = vec![("PATH".to_string(), "new".to_string()), ("HOME".to_string(), "same".to_string())];
        let mut current = FxHashMap::default();
        current.insert(OsString::from("PATH"), OsString::from("old"));
        current.insert(OsString::from("HOME"), OsString::from("same"));
        let changed = changed_vars(&vars, &current);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].0, "PATH");
    }

    #[cfg(unix)]
    #[test]
    fn test_changed_vars_with_non_unicode_environment() {
        use std::os::unix::ffi::OsStringExt;

        let vars = vec![("LIB".to_string(), "C:\\lib".to_string()), ("HOME".to_string(), "same".to_string())];
        let mut current = FxHashMap::default();
        current.insert(OsString::from("LIB"), OsString::from_vec(b"\xff\xfe".to_vec()));
        current.insert(OsString::from_vec(b"BAD\xff".to_vec()), OsString::from("x"));
        current.insert(OsString::from("HOME"), OsString::from("same"));
        let changed = changed_vars(&vars, &current);
        assert_eq!(changed, vec![&vars[0]]);
    }
}
