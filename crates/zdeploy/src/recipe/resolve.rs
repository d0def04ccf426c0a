use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::fingerprint::{EntryKind, list_dir};
use crate::recipe::{HostTarget, Properties, REQUIRE_FILE, Recipe, RecipeKind};

/// Builds [`Recipe`] values from names, classifying each one against the
/// recipes directory and expanding its `require` file.
#[derive(Debug, Clone)]
pub struct Resolver {
    recipes_root: PathBuf,
    config: PathBuf,
}

impl Resolver {
    pub fn new(recipes_root: impl Into<PathBuf>, config: impl Into<PathBuf>) -> Self {
        Self {
            recipes_root: recipes_root.into(),
            config: config.into(),
        }
    }

    pub fn recipes_root(&self) -> &Path {
        &self.recipes_root
    }

    /// Resolve `name` and everything it requires.
    ///
    /// The returned list is dependency-first: each recipe appears after all
    /// of its own requirements, and `name` itself comes last. Nothing is
    /// deduplicated here.
    pub fn resolve(
        &self,
        name: &str,
        target: &HostTarget,
        properties: Properties,
    ) -> Result<Vec<Recipe>> {
        let recipe = self.resolve_recipe(name, &[], target, properties)?;
        let mut out = recipe.requirements().to_vec();
        out.push(recipe);
        Ok(out)
    }

    /// Resolve a single recipe. `ancestors` is the chain of recipes that
    /// required it, outermost first.
    pub fn resolve_recipe(
        &self,
        name: &str,
        ancestors: &[String],
        target: &HostTarget,
        properties: Properties,
    ) -> Result<Recipe> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::config(format!("invalid value for recipe: '{name}'")));
        }

        let parent = ancestors.last().cloned();
        let Some(canonical) = self.match_name(name)? else {
            debug!(recipe = name, "no recipe directory; treating as virtual");
            return Recipe::new(
                name.to_string(),
                RecipeKind::Virtual,
                parent,
                self.config.clone(),
                None,
                target.clone(),
                properties,
                Vec::new(),
            );
        };

        if parent.as_deref() == Some(canonical.as_str()) {
            return Err(Error::config(format!(
                "invalid recipe: {canonical} references itself"
            )));
        }
        if ancestors.iter().any(|a| *a == canonical) {
            let mut chain = ancestors.to_vec();
            chain.push(canonical.clone());
            return Err(Error::config(format!(
                "requirement cycle detected: {}",
                chain.join(" -> ")
            )));
        }

        let root = self.recipes_root.join(&canonical);
        let mut chain = ancestors.to_vec();
        chain.push(canonical.clone());

        let mut requirements = Vec::new();
        for req in read_requirements(&root.join(REQUIRE_FILE))? {
            let child = self.resolve_recipe(&req, &chain, target, Properties::new())?;
            requirements.extend(child.requirements().iter().cloned());
            requirements.push(child);
        }

        Recipe::new(
            canonical,
            RecipeKind::Defined,
            parent,
            self.config.clone(),
            Some(root),
            target.clone(),
            properties,
            requirements,
        )
    }

    // Read fresh on every call; recipes may be added between resolutions.
    fn match_name(&self, name: &str) -> Result<Option<String>> {
        if !self.recipes_root.is_dir() {
            return Err(Error::config(format!(
                "recipes directory {} does not exist",
                self.recipes_root.display()
            )));
        }
        let wanted = name.to_lowercase();
        let mut found = None;
        for (path, kind) in list_dir(&self.recipes_root)? {
            if kind != EntryKind::Dir {
                continue;
            }
            let Some(entry) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if entry == name {
                return Ok(Some(entry.to_string()));
            }
            if found.is_none() && entry.to_lowercase() == wanted {
                found = Some(entry.to_string());
            }
        }
        Ok(found)
    }
}

/// Requirement names from a `require` file: one per line, blank lines and
/// `#` comments skipped. A missing file means no requirements.
pub fn read_requirements(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let data = fs::read_to_string(path)
        .map_err(|e| Error::io(format!("failed to read {}: {e}", path.display())))?;
    Ok(data
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(ToOwned::to_owned)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn target() -> HostTarget {
        HostTarget::new("10.0.0.5", "root", None, 22)
    }

    fn recipe_dir(root: &Path, name: &str, require: Option<&str>) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).expect("mkdir");
        if let Some(req) = require {
            fs::write(dir.join(REQUIRE_FILE), req).expect("require");
        }
    }

    #[test]
    fn case_insensitive_match_uses_on_disk_name() {
        let tmp = tempfile::tempdir().expect("tempdir");
        recipe_dir(tmp.path(), "Nginx", None);
        let r = Resolver::new(tmp.path(), "configs/c1");

        let got = r.resolve("nginx", &target(), Properties::new()).expect("resolve");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name(), "Nginx");
        assert_eq!(got[0].kind(), RecipeKind::Defined);
        assert_eq!(got[0].root(), Some(tmp.path().join("Nginx").as_path()));
    }

    #[test]
    fn missing_directory_is_virtual() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("curl"), "not a dir").expect("write");
        let r = Resolver::new(tmp.path(), "configs/c1");

        let got = r.resolve("curl", &target(), Properties::new()).expect("resolve");
        assert_eq!(got[0].kind(), RecipeKind::Virtual);
        assert_eq!(got[0].name(), "curl");
        assert!(got[0].root().is_none());
    }

    #[test]
    fn requirements_are_flattened_dependency_first() {
        let tmp = tempfile::tempdir().expect("tempdir");
        recipe_dir(tmp.path(), "X", Some("Y\n"));
        recipe_dir(tmp.path(), "Y", Some("# base layer\n\nZ\n"));
        recipe_dir(tmp.path(), "Z", None);
        let r = Resolver::new(tmp.path(), "configs/c1");

        let got = r.resolve("X", &target(), Properties::new()).expect("resolve");
        let names: Vec<_> = got.iter().map(Recipe::name).collect();
        assert_eq!(names, vec!["Z", "Y", "X"]);
        assert_eq!(got[0].parent(), Some("Y"));
        assert_eq!(got[1].parent(), Some("X"));
        assert_eq!(got[2].parent(), None);
    }

    #[test]
    fn shared_requirements_are_not_deduplicated() {
        let tmp = tempfile::tempdir().expect("tempdir");
        recipe_dir(tmp.path(), "app", Some("db\ncache\n"));
        recipe_dir(tmp.path(), "db", Some("base\n"));
        recipe_dir(tmp.path(), "cache", Some("base\n"));
        recipe_dir(tmp.path(), "base", None);
        let r = Resolver::new(tmp.path(), "configs/c1");

        let got = r.resolve("app", &target(), Properties::new()).expect("resolve");
        let names: Vec<_> = got.iter().map(Recipe::name).collect();
        assert_eq!(names, vec!["base", "db", "base", "cache", "app"]);
    }

    #[test]
    fn requirements_inherit_target_but_not_properties() {
        let tmp = tempfile::tempdir().expect("tempdir");
        recipe_dir(tmp.path(), "web", Some("tls\n"));
        let r = Resolver::new(tmp.path(), "configs/c1");
        let mut props = Properties::new();
        props.insert("web_DOMAIN".into(), "example.org".into());

        let got = r.resolve("web", &target(), props).expect("resolve");
        assert_eq!(got[0].name(), "tls");
        assert!(got[0].is_virtual());
        assert_eq!(got[0].target(), &target());
        assert!(got[0].properties().is_empty());
        assert_eq!(got[1].properties().len(), 1);
    }

    #[test]
    fn direct_self_reference_is_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        recipe_dir(tmp.path(), "loop", Some("LOOP\n"));
        let r = Resolver::new(tmp.path(), "configs/c1");

        let err = r.resolve("loop", &target(), Properties::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("references itself"), "unexpected: {err}");
    }

    #[test]
    fn longer_cycles_are_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        recipe_dir(tmp.path(), "a", Some("b\n"));
        recipe_dir(tmp.path(), "b", Some("c\n"));
        recipe_dir(tmp.path(), "c", Some("a\n"));
        let r = Resolver::new(tmp.path(), "configs/c1");

        let err = r.resolve("a", &target(), Properties::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("a -> b -> c -> a"), "unexpected: {err}");
    }

    #[test]
    fn missing_recipes_root_is_a_config_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let r = Resolver::new(tmp.path().join("nope"), "configs/c1");
        let err = r.resolve("x", &target(), Properties::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
