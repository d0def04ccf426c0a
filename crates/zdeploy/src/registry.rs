use std::collections::HashSet;

use tracing::{info, warn};

use crate::fingerprint::digest_str;
use crate::recipe::Recipe;

/// Insertion-ordered set of the recipes deployed by one configuration run.
#[derive(Debug, Default)]
pub struct RecipeRegistry {
    installer: String,
    recipes: Vec<Recipe>,
    seen: HashSet<String>,
}

impl RecipeRegistry {
    pub fn new(installer: impl Into<String>) -> Self {
        Self {
            installer: installer.into(),
            recipes: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Returns false when an equal recipe was already registered.
    pub fn add(&mut self, recipe: Recipe) -> bool {
        if self.seen.contains(recipe.identity()) {
            info!(recipe = recipe.name(), "recipe already registered; skipping");
            return false;
        }
        info!(recipe = recipe.name(), "registering recipe");
        if recipe.is_virtual() {
            warn!(
                "recipe '{}' has no directory and will be installed with `{} {}`",
                recipe.name(),
                self.installer,
                recipe.name()
            );
            warn!("set 'installer' in config.json to use a different package manager");
        }
        self.seen.insert(recipe.identity().to_string());
        self.recipes.push(recipe);
        true
    }

    pub fn extend<I: IntoIterator<Item = Recipe>>(&mut self, recipes: I) {
        for r in recipes {
            self.add(r);
        }
    }

    /// Digest of every identity joined by spaces, in registration order.
    /// Names the cache directory for the run.
    pub fn aggregate_fingerprint(&self) -> String {
        let joined = self
            .recipes
            .iter()
            .map(Recipe::identity)
            .collect::<Vec<_>>()
            .join(" ");
        digest_str(&joined)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.recipes.iter().map(Recipe::name).collect()
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

impl<'a> IntoIterator for &'a RecipeRegistry {
    type Item = &'a Recipe;
    type IntoIter = std::slice::Iter<'a, Recipe>;

    fn into_iter(self) -> Self::IntoIter {
        self.recipes.iter()
    }
}
