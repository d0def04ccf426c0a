use std::path::Path;

use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::recipe::{RUN_FILE, Recipe};
use crate::remote::{ExecOptions, Remote, RemoteSession, sh_quote};

/// Remote directory recipes are staged under.
pub const STAGING_ROOT: &str = "/opt";

pub fn staging_dir(recipe: &Recipe) -> String {
    format!("{STAGING_ROOT}/{}", recipe.name())
}

/// Applies one recipe to its host.
pub struct Deployer<'a> {
    remote: &'a dyn Remote,
    installer: &'a str,
}

impl<'a> Deployer<'a> {
    pub fn new(remote: &'a dyn Remote, installer: &'a str) -> Self {
        Self { remote, installer }
    }

    /// Defined recipes are staged under `/opt/<name>`, their `run` script is
    /// executed, and the staging directory is removed again whether or not
    /// anything failed. Virtual recipes go through the installer.
    pub fn deploy(&self, recipe: &Recipe) -> Result<()> {
        info!(
            recipe = recipe.name(),
            host = %recipe.target().host,
            "deploying recipe"
        );
        self.deploy_inner(recipe).map_err(|e| {
            error!(recipe = recipe.name(), "{e}");
            Error::deploy(format!("failed to deploy {}: {e}", recipe.name()))
        })
    }

    fn deploy_inner(&self, recipe: &Recipe) -> Result<()> {
        let mut session = self.remote.connect(recipe.name(), recipe.target())?;
        let Some(root) = recipe.root() else {
            let cmd = format!("{} {}", self.installer, recipe.name());
            session.execute(&cmd, ExecOptions::default())?;
            return Ok(());
        };

        let staging = staging_dir(recipe);
        let outcome = stage_and_run(session.as_mut(), recipe, root, &staging);
        cleanup(session.as_mut(), recipe, &staging);
        outcome
    }
}

fn stage_and_run(
    session: &mut dyn RemoteSession,
    recipe: &Recipe,
    root: &Path,
    staging: &str,
) -> Result<()> {
    let quoted = sh_quote(staging);
    session.execute(&format!("rm -rf {quoted}"), ExecOptions::quiet())?;
    session.upload(root, staging)?;
    session.upload(recipe.config(), &format!("{staging}/config"))?;

    if !recipe.has_file(RUN_FILE) {
        warn!(
            recipe = recipe.name(),
            "no {RUN_FILE} file in {}; nothing to execute",
            root.display()
        );
        return Ok(());
    }
    session.execute(
        &format!("cd {quoted} && chmod +x ./{RUN_FILE} && ./{RUN_FILE}"),
        ExecOptions::default(),
    )?;
    Ok(())
}

// Failures here are only reported; the staging outcome is what the caller sees.
fn cleanup(session: &mut dyn RemoteSession, recipe: &Recipe, staging: &str) {
    match session.execute(&format!("rm -rf {}", sh_quote(staging)), ExecOptions::best_effort()) {
        Ok(0) => {}
        Ok(rc) => warn!(
            recipe = recipe.name(),
            "failed to remove {staging} (exit code {rc})"
        ),
        Err(e) => warn!(recipe = recipe.name(), "failed to remove {staging}: {e}"),
    }
}
