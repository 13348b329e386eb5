// src/file.rs

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

pub fn ensure_directory(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        return Err(Error::persistence(
            dir,
            std::io::Error::other(format!("Path exists but is not a directory: {}", dir.display())),
        ));
    }
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| Error::persistence(dir, e))?;
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Write `contents` to `<path>.tmp` and return that path. A failed write
/// removes the partial temp file.
fn write_tmp(path: &Path, contents: &[u8]) -> Result<PathBuf> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);
    let io = |e| Error::persistence(&tmp, e);

    let written = File::create(&tmp).map_err(io).and_then(|file| {
        let mut out = BufWriter::new(file);
        out.write_all(contents).map_err(io)?;
        out.flush().map_err(io)
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(tmp)
}

/// Write to `<path>.tmp` and rename over `path`, so readers never see a
/// half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = write_tmp(path, contents)?;
    fs::rename(&tmp, path).map_err(|e| Error::persistence(path, e))
}

/// Stage every file as `<path>.tmp` first; rename them into place, in
/// order, only once all of them were written. If any write fails the
/// staged files are removed and no target is touched.
pub fn write_all_atomic(files: &[(PathBuf, Vec<u8>)]) -> Result<()> {
    let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(files.len());
    for (path, contents) in files {
        match write_tmp(path, contents) {
            Ok(tmp) => staged.push((tmp, path)),
            Err(e) => {
                for (tmp, _) in &staged {
                    let _ = fs::remove_file(tmp);
                }
                return Err(e);
            }
        }
    }
    for (tmp, path) in staged {
        fs::rename(&tmp, path).map_err(|e| Error::persistence(path, e))?;
    }
    Ok(())
}

/// Header + rows as CSV bytes.
pub fn table_bytes(headers: &[&str], rows: &[Vec<String>]) -> Vec<u8> {
    crate::csv::rows_to_string(headers, rows, crate::csv::SEP).into_bytes()
}

/// Read a whole file; a missing file is `Ok(None)`.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::persistence(path, e)),
    }
}
