use crate::cli::GlobalFlags;
use clap::Args;
use warden::state::{InstallLock, StateStore};
use warden_shared::constants::defaults;

#[derive(Args, Debug)]
pub struct ResetArgs {
    #[arg(
        long,
        value_name = "ID",
        default_value = defaults::INSTALL_ID,
        value_parser = crate::commands::install_id
    )]
    pub install_id: String,

    /// Also delete the stored credentials; the next install generates new ones
    #[arg(long)]
    pub purge_credentials: bool,
}

pub fn execute(args: ResetArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let layout = global.layout()?;
    layout.prepare()?;
    let _lock = InstallLock::acquire(layout.home_dir())?;

    let store = layout.state_store();
    if store.discard(&args.install_id)? {
        println!(
            "Archived run state for '{}' under {}",
            args.install_id,
            store.archive_dir().display()
        );
    } else {
        println!("No run state recorded for '{}'", args.install_id);
    }

    if args.purge_credentials {
        let credentials = layout.credential_store();
        if credentials.remove()? {
            println!("Removed {}", credentials.path().display());
        }
    }
    Ok(())
}
