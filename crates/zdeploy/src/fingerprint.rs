use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{Error, Result};

pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn digest_str(s: &str) -> String {
    digest_bytes(s.as_bytes())
}

pub fn digest_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .map_err(|e| Error::io(format!("failed to open {}: {e}", path.display())))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 1024 * 64];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| Error::io(format!("failed to read {}: {e}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// Direct children of `dir`, sorted by file name.
///
/// Symlinks are followed; entries that are neither files nor directories
/// after following (sockets, dangling links) are left out. A symlinked
/// directory that resolves to `dir` or one of its ancestors is skipped, so
/// recursive walks terminate.
pub fn list_dir(dir: &Path) -> Result<Vec<(PathBuf, EntryKind)>> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound) => {
                continue;
            }
            Err(e) => return Err(Error::io(format!("walkdir error in {}: {e}", dir.display()))),
        };
        let ft = entry.file_type();
        if ft.is_dir() {
            if entry.path_is_symlink() && loops_back(dir, entry.path())? {
                warn!(
                    "skipping {}: symlink to an enclosing directory",
                    entry.path().display()
                );
                continue;
            }
            out.push((entry.into_path(), EntryKind::Dir));
        } else if ft.is_file() {
            out.push((entry.into_path(), EntryKind::File));
        }
    }
    Ok(out)
}

fn loops_back(dir: &Path, link: &Path) -> Result<bool> {
    let canon = |p: &Path| {
        p.canonicalize()
            .map_err(|e| Error::io(format!("failed to resolve {}: {e}", p.display())))
    };
    Ok(canon(dir)?.starts_with(canon(link)?))
}
