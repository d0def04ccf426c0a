use std::fmt;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::cache::{DeploymentCache, record_key};
use crate::config::{self, Declarations, Settings};
use crate::deploy::Deployer;
use crate::error::{Error, Result};
use crate::logging;
use crate::recipe::{Fingerprinter, HostTarget, Properties, Resolver};
use crate::registry::RecipeRegistry;
use crate::remote::Remote;

/// Where a configuration run is. Failures carry the phase they happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolving,
    CacheReconciling,
    /// Index into the registry of the recipe being deployed.
    Deploying(usize),
    Done,
    Aborted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Resolving => f.write_str("resolving"),
            Phase::CacheReconciling => f.write_str("reconciling cache"),
            Phase::Deploying(i) => write!(f, "deploying recipe #{}", i + 1),
            Phase::Done => f.write_str("done"),
            Phase::Aborted => f.write_str("aborted"),
        }
    }
}

/// What to do with the remaining configurations after one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    #[default]
    FailFast,
    Continue,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub config: String,
    pub aggregate: String,
    pub deployed: Vec<String>,
    pub skipped: Vec<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: Vec<RunReport>,
    pub failed: Vec<(String, Error)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives configuration runs: resolve, reconcile the cache, then deploy
/// every registered recipe in order, skipping the ones whose fingerprint is
/// already recorded.
pub struct Orchestrator<'a> {
    settings: &'a Settings,
    remote: &'a dyn Remote,
    policy: FailurePolicy,
    dry_run: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(settings: &'a Settings, remote: &'a dyn Remote) -> Self {
        Self {
            settings,
            remote,
            policy: FailurePolicy::default(),
            dry_run: false,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Walk the whole run without writing cache records.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Parse a configuration and register its recipes, each one after its
    /// requirements.
    pub fn load_registry(&self, config_name: &str) -> Result<(Declarations, RecipeRegistry)> {
        let config_path = self.settings.config_path(config_name);
        if !config_path.is_file() {
            return Err(Error::config(format!(
                "unknown configuration '{config_name}': {} does not exist",
                config_path.display()
            )));
        }
        info!("config: {}", config_path.display());
        let decls = config::env::load(&config_path)?;
        let resolver = Resolver::new(self.settings.recipes_dir(), &config_path);
        let mut registry = RecipeRegistry::new(&self.settings.installer);

        for name in decls.recipe_names() {
            let Some(host) = decls.get(&name) else {
                error!("{name} is undefined in {}", config_path.display());
                return Err(Error::config(format!(
                    "{name} is undefined in {}",
                    config_path.display()
                )));
            };
            let target = self.host_target(&decls, &name, host)?;
            let properties: Properties = decls
                .iter()
                .filter(|(k, _)| k.starts_with(name.as_str()) && *k != name)
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            registry.extend(resolver.resolve(&name, &target, properties)?);
        }
        Ok((decls, registry))
    }

    fn host_target(&self, decls: &Declarations, name: &str, host: &str) -> Result<HostTarget> {
        let user = decls
            .get(&format!("{name}_USER"))
            .unwrap_or(self.settings.user.as_str());
        let password = decls
            .get(&format!("{name}_PASSWORD"))
            .map(str::to_string)
            .or_else(|| self.settings.password.clone());
        let port = match decls.get(&format!("{name}_PORT")) {
            Some(raw) => HostTarget::parse_port(raw)?,
            None => self.settings.port,
        };
        Ok(HostTarget::new(host, user, password, port))
    }

    /// Deploy one configuration, with its own log file.
    pub fn run_config(&self, config_name: &str, force: bool) -> Result<RunReport> {
        let log = logging::run_log(&self.settings.logs_dir(), config_name)?;
        info!("logging to {}", log.path().display());

        let mut phase = Phase::Resolving;
        let result = self.run_phases(config_name, force, &mut phase);
        if let Err(e) = &result {
            error!(config = config_name, phase = %phase, "{e}");
            phase = Phase::Aborted;
        }
        info!(config = config_name, phase = %phase, "run finished");
        result.map_err(|e| Error::new(e.kind(), format!("{config_name}: {e}")))
    }

    fn run_phases(&self, config_name: &str, force: bool, phase: &mut Phase) -> Result<RunReport> {
        let started = Instant::now();
        let (decls, registry) = self
            .load_registry(config_name)
            .map_err(|e| in_phase(Phase::Resolving, e))?;
        info!(
            "starting deployment of {config_name} at {}",
            chrono::Local::now().format("%H:%M:%S on %Y-%m-%d")
        );

        *phase = Phase::CacheReconciling;
        let aggregate = registry.aggregate_fingerprint();
        let cache = DeploymentCache::new(self.settings.cache_dir().join(config_name), &aggregate);
        if self.dry_run {
            for stale in cache.stale_entries().map_err(|e| in_phase(*phase, e))? {
                info!("dry run; would remove stale cache directory {}", stale.display());
            }
        } else {
            cache.reconcile().map_err(|e| in_phase(*phase, e))?;
        }

        let mut fingerprinter = Fingerprinter::with_declarations(&decls);
        let deployer = Deployer::new(self.remote, &self.settings.installer);
        let mut deployed = Vec::new();
        let mut skipped = Vec::new();

        for (i, recipe) in registry.iter().enumerate() {
            *phase = Phase::Deploying(i);
            let fingerprint = fingerprinter
                .fingerprint(recipe)
                .map_err(|e| in_phase(*phase, e))?;
            let key = record_key(recipe);
            let current = cache
                .is_current(&key, &fingerprint)
                .map_err(|e| in_phase(*phase, e))?;
            if current && !force {
                warn!("skipping {} because it is already deployed", recipe.name());
                skipped.push(recipe.name().to_string());
                continue;
            }

            let recipe_started = Instant::now();
            info!("starting recipe '{}'", recipe.name());
            deployer
                .deploy(recipe)
                .map_err(|e| in_phase(*phase, e))?;
            info!(
                "{} finished in {}",
                recipe.name(),
                format_elapsed(recipe_started.elapsed())
            );
            if self.dry_run {
                info!("dry run; not recording {}", recipe.name());
            } else {
                cache
                    .record(&key, &fingerprint)
                    .map_err(|e| in_phase(*phase, e))?;
            }
            deployed.push(recipe.name().to_string());
        }

        *phase = Phase::Done;
        let elapsed = started.elapsed();
        info!("{config_name} finished in {}", format_elapsed(elapsed));
        info!("deployment hash is {aggregate}");
        Ok(RunReport {
            config: config_name.to_string(),
            aggregate,
            deployed,
            skipped,
            elapsed,
        })
    }

    /// Run several configurations in order under the configured policy.
    ///
    /// With [`FailurePolicy::FailFast`] the first failure is returned as the
    /// error. With [`FailurePolicy::Continue`] failures are collected in the
    /// report and the remaining configurations still run.
    pub fn deploy_all(&self, configs: &[String], force: bool) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for name in configs {
            match self.run_config(name, force) {
                Ok(run) => report.completed.push(run),
                Err(e) if self.policy == FailurePolicy::FailFast => return Err(e),
                Err(e) => {
                    warn!("continuing after failure of {name}");
                    report.failed.push((name.clone(), e));
                }
            }
        }
        Ok(report)
    }
}

fn in_phase(phase: Phase, e: Error) -> Error {
    Error::new(e.kind(), format!("{phase}: {e}"))
}

/// Render a duration as `Nh, Nm, and Ns`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours}h, {minutes}m, and {seconds}s")
}
