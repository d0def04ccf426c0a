use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::config::Declarations;
use crate::error::{Error, Result};
use crate::fingerprint::{EntryKind, digest_file, digest_str, list_dir};
use crate::recipe::{HASH_FILE, Recipe, RecipeKind};

/// Computes deep fingerprints.
///
/// A defined recipe's fingerprint folds in, in order: the output of its
/// `hash` script (if any), the fingerprints of its flattened requirements,
/// the digest of its identity, and the digest of every entry under its
/// directory (sorted by name, subdirectories recursively). Results are
/// memoised per identity for the lifetime of the fingerprinter, which should
/// not outlive one run.
#[derive(Debug, Default)]
pub struct Fingerprinter {
    script_env: Vec<(String, String)>,
    memo: HashMap<String, String>,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `decls` into the environment of every `hash` script.
    pub fn with_declarations(decls: &Declarations) -> Self {
        Self {
            script_env: decls
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            memo: HashMap::new(),
        }
    }

    pub fn fingerprint(&mut self, recipe: &Recipe) -> Result<String> {
        if let Some(hit) = self.memo.get(recipe.identity()) {
            return Ok(hit.clone());
        }
        let fp = match (recipe.kind(), recipe.root()) {
            (RecipeKind::Defined, Some(root)) => {
                let root = root.to_path_buf();
                self.fingerprint_dir(recipe, &root, true)?
            }
            _ => digest_str(recipe.name()),
        };
        debug!(recipe = recipe.name(), fingerprint = %fp, "computed fingerprint");
        self.memo.insert(recipe.identity().to_string(), fp.clone());
        Ok(fp)
    }

    fn fingerprint_dir(&mut self, recipe: &Recipe, dir: &Path, at_root: bool) -> Result<String> {
        let mut acc = String::new();

        if at_root {
            let script = dir.join(HASH_FILE);
            if script.is_file() {
                acc.push_str(&self.run_hash_script(recipe, &script)?);
            }
        }

        for req in recipe.requirements() {
            acc.push_str(&self.fingerprint(req)?);
        }
        acc.push_str(&digest_str(recipe.identity()));

        for (path, kind) in list_dir(dir)? {
            match kind {
                EntryKind::File => acc.push_str(&digest_file(&path)?),
                EntryKind::Dir => acc.push_str(&self.fingerprint_dir(recipe, &path, false)?),
            }
        }

        Ok(digest_str(&acc))
    }

    fn run_hash_script(&self, recipe: &Recipe, script: &Path) -> Result<String> {
        let script = script
            .canonicalize()
            .map_err(|e| Error::io(format!("failed to resolve {}: {e}", script.display())))?;
        make_executable(&script)?;

        let mut cmd = Command::new(&script);
        if let Some(dir) = script.parent() {
            cmd.current_dir(dir);
        }
        cmd.envs(self.script_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null());

        let out = cmd
            .output()
            .map_err(|e| Error::hash(format!("failed to run {}: {e}", script.display())))?;
        let stdout = String::from_utf8_lossy(&out.stdout).to_string();
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let mut captured = stdout.trim_end().to_string();
            if !stderr.trim().is_empty() {
                if !captured.is_empty() {
                    captured.push('\n');
                }
                captured.push_str(stderr.trim_end());
            }
            return Err(Error::hash(format!(
                "hash script for {} failed ({}): {}",
                recipe.name(),
                out.status,
                captured
            )));
        }
        Ok(stdout)
    }
}

#[cfg(unix)]
pub(crate) fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let meta = fs::metadata(path)
        .map_err(|e| Error::io(format!("failed to stat {}: {e}", path.display())))?;
    let mut perms = meta.permissions();
    let mode = perms.mode();
    if mode & 0o111 == 0o111 {
        return Ok(());
    }
    perms.set_mode(mode | 0o755);
    fs::set_permissions(path, perms)
        .map_err(|e| Error::io(format!("failed to chmod {}: {e}", path.display())))
}

#[cfg(not(unix))]
pub(crate) fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
