use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::fingerprint::digest_str;
use crate::recipe::Recipe;

const KEY_DIGEST_LEN: usize = 12;

/// File name of a recipe's cache record: its name plus a short digest of its
/// identity, so one recipe deployed to several hosts keeps several records.
pub fn record_key(recipe: &Recipe) -> String {
    let digest = digest_str(recipe.identity());
    format!("{}.{}", recipe.name(), &digest[..KEY_DIGEST_LEN])
}

/// On-disk record of what a configuration last deployed successfully.
///
/// Layout: `<root>/<aggregate fingerprint>/<record key>`, each file holding
/// the recipe's deep fingerprint. `root` is the per-configuration cache dir.
#[derive(Debug, Clone)]
pub struct DeploymentCache {
    root: PathBuf,
    dir: PathBuf,
}

impl DeploymentCache {
    pub fn new(root: impl Into<PathBuf>, aggregate: &str) -> Self {
        let root = root.into();
        let dir = root.join(aggregate);
        Self { root, dir }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Everything under the root except the current aggregate dir, sorted.
    pub fn stale_entries(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let list_err =
            |e: io::Error| Error::io(format!("failed to list {}: {e}", self.root.display()));
        let current = self.dir.file_name();
        let mut stale = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(list_err)? {
            let entry = entry.map_err(list_err)?;
            if Some(entry.file_name().as_os_str()) != current {
                stale.push(entry.path());
            }
        }
        stale.sort();
        Ok(stale)
    }

    /// Make sure the current aggregate dir exists and delete every sibling.
    /// Returns the removed paths.
    pub fn reconcile(&self) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| Error::io(format!("failed to create {}: {e}", self.dir.display())))?;
        let stale = self.stale_entries()?;
        for path in &stale {
            info!("removing stale cache directory {}", path.display());
            let removed = match fs::symlink_metadata(path) {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
                Ok(_) => fs::remove_file(path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            };
            removed.map_err(|e| Error::io(format!("failed to remove {}: {e}", path.display())))?;
        }
        Ok(stale)
    }

    pub fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    pub fn read(&self, key: &str) -> Result<Option<String>> {
        let p = self.record_path(key);
        if !p.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&p)
            .map_err(|e| Error::io(format!("failed to read cache record {}: {e}", p.display())))?;
        Ok(Some(raw.trim().to_string()))
    }

    /// True when the stored record under `key` equals `fingerprint`.
    pub fn is_current(&self, key: &str, fingerprint: &str) -> Result<bool> {
        Ok(self.read(key)?.is_some_and(|stored| stored == fingerprint))
    }

    /// Replace the record under `key`. Readers see the old or the new
    /// contents, never a partial write.
    pub fn record(&self, key: &str, fingerprint: &str) -> Result<()> {
        let p = self.record_path(key);
        let write_err = |e: io::Error| {
            Error::io(format!("failed to write cache record {}: {e}", p.display()))
        };
        fs::create_dir_all(&self.dir).map_err(write_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        tmp.write_all(fingerprint.as_bytes()).map_err(write_err)?;
        tmp.persist(&p).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::recipe::{HostTarget, Properties, Resolver};

    #[test]
    fn reconcile_creates_current_and_evicts_siblings() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("cache").join("prod");
        fs::create_dir_all(root.join("old1")).expect("old1");
        fs::write(root.join("old1").join("web"), "x").expect("record");
        fs::create_dir_all(root.join("old2")).expect("old2");
        fs::write(root.join("stray"), "x").expect("stray");

        let cache = DeploymentCache::new(&root, "cafe");
        let removed = cache.reconcile().expect("reconcile");
        assert_eq!(removed.len(), 3);
        assert!(cache.dir().is_dir());
        let left: Vec<_> = fs::read_dir(&root)
            .expect("list")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from("cafe")]);
    }

    #[test]
    fn reconcile_keeps_current_records() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cache = DeploymentCache::new(tmp.path(), "cafe");
        cache.reconcile().expect("first");
        cache.record("web", "abc").expect("record");
        cache.reconcile().expect("second");
        assert_eq!(cache.read("web").expect("read").as_deref(), Some("abc"));
    }

    #[test]
    fn is_current_requires_exact_match() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cache = DeploymentCache::new(tmp.path(), "cafe");
        cache.reconcile().expect("reconcile");
        assert!(!cache.is_current("web", "abc").expect("missing"));

        cache.record("web", "abc").expect("record");
        assert!(cache.is_current("web", "abc").expect("hit"));
        assert!(!cache.is_current("web", "ab").expect("prefix"));

        fs::write(cache.record_path("web"), "abc\n").expect("newline");
        assert!(cache.is_current("web", "abc").expect("trimmed"));
    }

    #[test]
    fn record_overwrites_without_leftovers() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cache = DeploymentCache::new(tmp.path(), "cafe");
        cache.record("web", "one").expect("first");
        cache.record("web", "two").expect("second");
        assert_eq!(cache.read("web").expect("read").as_deref(), Some("two"));
        let files: Vec<_> = fs::read_dir(cache.dir()).expect("list").collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn filesystem_failures_are_io_errors() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let blocker = tmp.path().join("prod");
        fs::write(&blocker, "not a dir").expect("blocker");
        let err = DeploymentCache::new(&blocker, "cafe")
            .reconcile()
            .expect_err("root is a file");
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn record_keys_differ_per_host() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let resolver = Resolver::new(tmp.path(), "configs/prod");
        let on = |host: &str| {
            resolver
                .resolve("base", &HostTarget::new(host, "root", None, 22), Properties::new())
                .expect("resolve")
                .pop()
                .expect("base")
        };
        let a = record_key(&on("10.0.0.1"));
        let b = record_key(&on("10.0.0.2"));
        assert_ne!(a, b);
        assert!(a.starts_with("base."));
        assert_eq!(a, record_key(&on("10.0.0.1")));
    }
}
