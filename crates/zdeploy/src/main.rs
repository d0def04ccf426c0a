use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use zdeploy::config::{self, DEFAULT_SETTINGS_FILE, str2bool};
use zdeploy::orchestrator::{FailurePolicy, Orchestrator};
use zdeploy::remote::{DryRunRemote, Remote, SshRemote};
use zdeploy::{Error, Result};

#[derive(Debug, Parser)]
#[command(author, version, about = "Deploy recipes to remote hosts, skipping what is already deployed")]
struct Args {
    /// Configurations to deploy (file names under the configs directory)
    #[arg(short = 'c', long = "configs", num_args = 1.., required_unless_present = "list")]
    configs: Vec<String>,
    /// Redeploy recipes even when their cached fingerprint matches
    #[arg(short, long, num_args = 0..=1, default_missing_value = "yes", value_parser = parse_flag)]
    force: Option<bool>,
    /// Path to the global JSON settings
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,
    /// Keep deploying the remaining configurations after one fails
    #[arg(long)]
    keep_going: bool,
    /// Log the remote commands instead of running them
    #[arg(long)]
    dry_run: bool,
    /// Print the available configurations and exit
    #[arg(long)]
    list: bool,
}

fn parse_flag(raw: &str) -> std::result::Result<bool, String> {
    str2bool(raw).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    zdeploy::logging::init();
    let args = Args::parse();
    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<bool> {
    let settings = config::load(&args.settings)?;
    let available = settings.available_configs()?;
    if args.list {
        for name in &available {
            println!("{name}");
        }
        return Ok(true);
    }
    for name in &args.configs {
        if !available.contains(name) {
            return Err(Error::config(format!(
                "invalid configuration '{name}' (available: {})",
                available.join(", ")
            )));
        }
    }

    let force = args.force.unwrap_or(settings.force);
    let policy = if args.keep_going {
        FailurePolicy::Continue
    } else {
        FailurePolicy::FailFast
    };
    let ssh = SshRemote::new(settings.connect_timeout);
    let dry = DryRunRemote::new();
    let remote: &dyn Remote = if args.dry_run { &dry } else { &ssh };

    let report = Orchestrator::new(&settings, remote)
        .with_policy(policy)
        .with_dry_run(args.dry_run)
        .deploy_all(&args.configs, force)?;
    for (name, e) in &report.failed {
        error!("{name} failed: {e}");
    }
    info!(
        "{} of {} configurations deployed",
        report.completed.len(),
        args.configs.len()
    );
    Ok(report.is_success())
}
