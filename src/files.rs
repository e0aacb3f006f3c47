//! File-system bookkeeping for the staging directory.

use crate::log;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Suffix a dependency file needs to be shipped. Compared case-sensitively.
pub const DLL_SUFFIX: &str = ".dll";

/// Makes `path` an empty directory, removing whatever was there before.
pub fn recreate_dir(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(path)
}

/// Lists every file below `root/dir`, as paths relative to `root`, sorted.
///
/// Directories themselves are not listed. Symlinked directories are not
/// descended into; symlinks that resolve to files are listed like files.
pub fn get_folder_files(root: &Path, dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root.join(dir)).follow_links(false) {
        let entry = entry?;
        let file_type = entry.file_type();
        let listed = if file_type.is_symlink() {
            fs::metadata(entry.path()).map(|meta| meta.is_file()).unwrap_or(false)
        } else {
            file_type.is_file()
        };
        if listed {
            let relative = entry.path().strip_prefix(root).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            files.push(relative.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Whether a dependency directory entry is shipped with the application.
///
/// Only regular files count; symlinks are never followed.
pub fn is_dependency_dll(file_type: &fs::FileType, name: &str) -> bool {
    file_type.is_file() && name.ends_with(DLL_SUFFIX)
}

/// Copies every top-level `*.dll` of `libs_dir` into `install_dir`.
///
/// Returns the destination paths in directory order.
pub fn copy_dependency_dlls(libs_dir: &Path, install_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    let entries = fs::read_dir(libs_dir).map_err(|e| io::Error::new(e.kind(), format!("cannot read dependency dir {}: {}", libs_dir.display(), e)))?;
    for entry in entries {
        let entry = entry?;
        // lossy only for matching and logging, copies use the raw name
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type()?;
        if is_dependency_dll(&file_type, &name) {
            let source = entry.path();
            let target = install_dir.join(entry.file_name());
            log!(">> Copying {} to {}", source.display(), install_dir.display());
            fs::copy(&source, &target)?;
            copied.push(target);
        } else if file_type.is_file() && name.to_lowercase().ends_with(DLL_SUFFIX) {
            log!("skipping {}: suffix is not lowercase {}", name, DLL_SUFFIX);
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_recreate_dir_empties_existing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("app");
        fs::create_dir_all(target.join("nested")).unwrap();
        fs::write(target.join("old.exe"), "old").unwrap();
        fs::write(target.join("nested").join("old.dll"), "old").unwrap();

        recreate_dir(&target).unwrap();
        assert!(target.is_dir());
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);

        recreate_dir(&target).unwrap();
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
    }

    #[test]
    fn test_recreate_dir_creates_missing_and_replaces_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("a").join("b");
        recreate_dir(&missing).unwrap();
        assert!(missing.is_dir());

        let file = dir.path().join("plain");
        fs::write(&file, "x").unwrap();
        recreate_dir(&file).unwrap();
        assert!(file.is_dir());
    }

    #[test]
    fn test_get_folder_files() {
        let dir = TempDir::new().unwrap();
        let app = dir.path().join("app");
        fs::create_dir_all(app.join("platforms")).unwrap();
        fs::create_dir_all(app.join("empty")).unwrap();
        fs::write(app.join("app.exe"), "exe").unwrap();
        fs::write(app.join("platforms").join("qwindows.dll"), "dll").unwrap();

        let files = get_folder_files(dir.path(), Path::new("app")).unwrap();
        assert_eq!(files, vec![Path::new("app").join("app.exe"), Path::new("app").join("platforms").join("qwindows.dll")]);
    }

    #[test]
    fn test_get_folder_files_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(get_folder_files(dir.path(), Path::new("nope")).unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_copy_dependency_dlls_filters_suffix() {
        let dir = TempDir::new().unwrap();
        let libs = dir.path().join("bin");
        let install = dir.path().join("install");
        fs::create_dir_all(libs.join("sub.dll")).unwrap();
        fs::create_dir_all(&install).unwrap();
        fs::write(libs.join("a.dll"), "a").unwrap();
        fs::write(libs.join("b.DLL"), "b").unwrap();
        fs::write(libs.join("readme.txt"), "r").unwrap();

        let copied = copy_dependency_dlls(&libs, &install).unwrap();
        assert_eq!(copied, vec![install.join("a.dll")]);
        assert_eq!(fs::read_to_string(install.join("a.dll")).unwrap(), "a");
        assert!(!install.join("b.DLL").exists());
        assert!(!install.join("readme.txt").exists());
        assert!(!install.join("sub.dll").exists());
        assert!(libs.join("a.dll").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_dependency_dlls_skips_symlinks() {
        let dir = TempDir::new().unwrap();
        let libs = dir.path().join("bin");
        let install = dir.path().join("install");
        fs::create_dir_all(&libs).unwrap();
        fs::create_dir_all(&install).unwrap();
        fs::write(dir.path().join("real.dll"), "r").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.dll"), libs.join("link.dll")).unwrap();

        let copied = copy_dependency_dlls(&libs, &install).unwrap();
        assert!(copied.is_empty());
        assert!(!install.join("link.dll").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_dependency_dlls_non_utf8_name() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let dir = TempDir::new().unwrap();
        let libs = dir.path().join("bin");
        let install = dir.path().join("install");
        fs::create_dir_all(&libs).unwrap();
        fs::create_dir_all(&install).unwrap();
        let name = OsStr::from_bytes(b"lib\xff.dll");
        fs::write(libs.join(name), "raw").unwrap();

        let copied = copy_dependency_dlls(&libs, &install).unwrap();
        assert_eq!(copied, vec![install.join(name)]);
        assert_eq!(fs::read_to_string(install.join(name)).unwrap(), "raw");
    }

    #[cfg(unix)]
    #[test]
    fn test_get_folder_files_lists_file_symlinks_only() {
        let dir = TempDir::new().unwrap();
        let app = dir.path().join("app");
        let outside = dir.path().join("outside");
        fs::create_dir_all(&app).unwrap();
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("real.dll"), "r").unwrap();
        std::os::unix::fs::symlink(outside.join("real.dll"), app.join("link.dll")).unwrap();
        std::os::unix::fs::symlink(&outside, app.join("linked_dir")).unwrap();

        let files = get_folder_files(dir.path(), Path::new("app")).unwrap();
        assert_eq!(files, vec![Path::new("app").join("link.dll")]);
    }

    #[test]
    fn test_copy_dependency_dlls_missing_dir() {
        let dir = TempDir::new().unwrap();
        let err = copy_dependency_dlls(&dir.path().join("missing"), dir.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
