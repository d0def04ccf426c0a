use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub mod hash;
pub mod resolve;

pub use hash::Fingerprinter;
pub use resolve::Resolver;

pub const REQUIRE_FILE: &str = "require";
pub const HASH_FILE: &str = "hash";
pub const RUN_FILE: &str = "run";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeKind {
    /// Backed by a directory under the recipes root.
    Defined,
    /// No directory; installed with the configured installer command.
    Virtual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    pub host: String,
    pub user: String,
    pub password: Option<String>,
    pub port: u16,
}

impl HostTarget {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: Option<String>,
        port: u16,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password,
            port,
        }
    }

    pub fn parse_port(raw: &str) -> Result<u16> {
        raw.trim()
            .parse::<u16>()
            .map_err(|e| Error::config(format!("invalid value for port: '{}' ({e})", raw.trim())))
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

pub type Properties = BTreeMap<String, String>;

/// One unit of deployable work.
///
/// Equality and hashing go through [`Recipe::identity`], so two recipes with
/// the same name, user, host, port and properties are the same recipe no
/// matter which parent pulled them in.
#[derive(Debug, Clone)]
pub struct Recipe {
    name: String,
    kind: RecipeKind,
    parent: Option<String>,
    config: PathBuf,
    root: Option<PathBuf>,
    target: HostTarget,
    properties: Properties,
    requirements: Vec<Recipe>,
    identity: String,
}

impl Recipe {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        kind: RecipeKind,
        parent: Option<String>,
        config: PathBuf,
        root: Option<PathBuf>,
        target: HostTarget,
        properties: Properties,
        requirements: Vec<Recipe>,
    ) -> Result<Self> {
        validate_non_empty("config", &config.to_string_lossy())?;
        validate_non_empty("recipe", &name)?;
        validate_non_empty("hostname", &target.host)?;
        let identity = render_identity(&name, &target, &properties);
        Ok(Self {
            name,
            kind,
            parent,
            config,
            root,
            target,
            properties,
            requirements,
            identity,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RecipeKind {
        self.kind
    }

    pub fn is_virtual(&self) -> bool {
        self.kind == RecipeKind::Virtual
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// The configuration file this recipe was resolved from.
    pub fn config(&self) -> &Path {
        &self.config
    }

    /// Local recipe directory; `None` for virtual recipes.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn target(&self) -> &HostTarget {
        &self.target
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Flattened requirements, each one after its own dependencies.
    pub fn requirements(&self) -> &[Recipe] {
        &self.requirements
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn has_file(&self, file: &str) -> bool {
        self.root.as_deref().is_some_and(|r| r.join(file).is_file())
    }
}

impl PartialEq for Recipe {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for Recipe {}

impl Hash for Recipe {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity)
    }
}

fn validate_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::config(format!("invalid value for {field}: '{value}'")));
    }
    Ok(())
}

fn render_identity(name: &str, target: &HostTarget, properties: &Properties) -> String {
    let props = properties
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{} -> {}@{}:{} :: {{{}}}",
        name, target.user, target.host, target.port, props
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn virtual_recipe(name: &str, host: &str, props: &[(&str, &str)]) -> Result<Recipe> {
        let properties = props
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Recipe::new(
            name.into(),
            RecipeKind::Virtual,
            None,
            PathBuf::from("configs/c1"),
            None,
            HostTarget::new(host, "root", None, 22),
            properties,
            Vec::new(),
        )
    }

    #[test]
    fn identity_renders_connection_and_properties() {
        let r = virtual_recipe("nginx", "10.0.0.1", &[("nginx_B", "2"), ("nginx_A", "1")])
            .expect("recipe");
        assert_eq!(r.identity(), "nginx -> root@10.0.0.1:22 :: {nginx_A=1, nginx_B=2}");
    }

    #[test]
    fn equality_ignores_password_and_parent() {
        let a = virtual_recipe("nginx", "h", &[]).expect("a");
        let mut b = virtual_recipe("nginx", "h", &[]).expect("b");
        b.parent = Some("web".into());
        b.target.password = Some("secret".into());
        assert_eq!(a, b);

        let c = virtual_recipe("nginx", "other", &[]).expect("c");
        assert_ne!(a, c);
    }

    #[test]
    fn blank_name_or_host_is_rejected() {
        let err = virtual_recipe("  ", "h", &[]).unwrap_err();
        assert!(err.to_string().contains("recipe"), "unexpected: {err}");
        let err = virtual_recipe("x", " ", &[]).unwrap_err();
        assert!(err.to_string().contains("hostname"), "unexpected: {err}");
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn port_parse_failure_is_config_error() {
        assert_eq!(HostTarget::parse_port(" 2222 ").expect("port"), 2222);
        let err = HostTarget::parse_port("ssh").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
        assert!(HostTarget::parse_port("70000").is_err());
    }
}
