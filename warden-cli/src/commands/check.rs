use clap::Args;
use console::style;
use std::path::PathBuf;
use warden::Environment;
use warden::preflight::{self, Requirements, SystemProbe};
use warden_shared::constants::defaults;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Thresholds to check against: production, staging or development
    #[arg(long, default_value = defaults::ENVIRONMENT)]
    pub environment: Environment,

    /// Directory whose file system must have room for the install
    #[arg(long, default_value = defaults::INSTALL_DIR)]
    pub install_dir: PathBuf,
}

pub fn execute(args: CheckArgs) -> anyhow::Result<()> {
    // The install directory usually does not exist yet; measure its nearest ancestor.
    let disk_path = args
        .install_dir
        .ancestors()
        .find(|dir| dir.exists())
        .unwrap_or(args.install_dir.as_path())
        .to_path_buf();
    let requirements = Requirements::for_environment(args.environment, &disk_path);
    let report = preflight::check(&requirements, &SystemProbe);
    crate::commands::print_preflight(&report);

    report.enforce(false)?;
    println!(
        "{} host meets the {} requirements",
        style("OK:").green().bold(),
        args.environment
    );
    Ok(())
}
