//! Zip archive creation.

use crate::log;
use rustc_hash::FxHashSet;
use std::{
    fs::File,
    io::{self, BufWriter},
    path::{Component, Path, PathBuf},
};
use zip::{CompressionMethod, ZipWriter, result::ZipError, write::SimpleFileOptions};

fn zip_err(e: ZipError) -> io::Error {
    match e {
        ZipError::Io(e) => e,
        other => io::Error::other(other),
    }
}

/// Name of the zip entry for a relative path, always `/`-separated.
pub fn entry_name(relative: &Path) -> io::Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("archive entry must be a relative path: {}", relative.display()))),
        }
    }
    if parts.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty archive entry name"));
    }
    Ok(parts.join("/"))
}

/// Writes `files` (relative to `root`) into a new zip at `output`.
///
/// An existing `output` is truncated. Entries keep their relative paths.
pub fn archive(root: &Path, files: &[PathBuf], output: &Path) -> io::Result<()> {
    log!(">> Archiving {} files to {}", files.len(), output.display());
    let mut names = FxHashSet::default();
    let mut zip = ZipWriter::new(BufWriter::new(File::create(output)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for relative in files {
        let name = entry_name(relative)?;
        if !names.insert(name.clone()) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, format!("duplicate archive entry: {}", name)));
        }
        let mut source = File::open(root.join(relative))?;
        zip.start_file(name, options).map_err(zip_err)?;
        io::copy(&mut source, &mut zip)?;
    }

    let mut writer = zip.finish().map_err(zip_err)?;
    io::Write::flush(&mut writer)?;
    Ok(())
}
