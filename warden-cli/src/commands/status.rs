use crate::cli::GlobalFlags;
use clap::Args;
use warden::state::{FileStateStore, RunState, StateStore};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only this install
    #[arg(long, value_name = "ID", value_parser = crate::commands::install_id)]
    pub install_id: Option<String>,

    /// Print the run states as JSON
    #[arg(long)]
    pub json: bool,
}

enum Entry {
    Valid(Box<RunState>),
    Unreadable { install_id: String, reason: String },
}

fn load_all(store: &FileStateStore, only: Option<&str>) -> anyhow::Result<Vec<Entry>> {
    let ids = match only {
        Some(id) => vec![id.to_string()],
        None => store.install_ids()?,
    };
    let mut entries = Vec::with_capacity(ids.len());
    for install_id in ids {
        match store.load(&install_id) {
            Ok(Some(state)) => entries.push(Entry::Valid(Box::new(state))),
            Ok(None) => {}
            Err(err) => entries.push(Entry::Unreadable {
                install_id,
                reason: err.to_string(),
            }),
        }
    }
    Ok(entries)
}

pub fn execute(args: StatusArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let layout = global.layout()?;
    let store = layout.state_store();
    let entries = load_all(&store, args.install_id.as_deref())?;

    if args.json {
        let states: Vec<&RunState> = entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Valid(state) => Some(state.as_ref()),
                Entry::Unreadable { .. } => None,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&states)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No recorded installs under {}", layout.home_dir().display());
        return Ok(());
    }

    let mut table = crate::commands::table([
        "Install", "Status", "Completed", "Last phase", "Failure", "Owner", "Updated",
    ]);
    for entry in &entries {
        match entry {
            Entry::Valid(state) => {
                let last = state
                    .completed
                    .last()
                    .map(|phase| format!("{} {}", phase.id, phase.name))
                    .unwrap_or_else(|| "-".to_string());
                let failure = state
                    .failure
                    .as_ref()
                    .map(|f| format!("{} {}", f.phase, f.name))
                    .unwrap_or_else(|| "-".to_string());
                table.add_row([
                    state.install_id.clone(),
                    state.status.to_string(),
                    state.completed.len().to_string(),
                    last,
                    failure,
                    state.owner_pid.to_string(),
                    state.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                ]);
            }
            Entry::Unreadable { install_id, reason } => {
                table.add_row([
                    install_id.clone(),
                    "unreadable".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    reason.clone(),
                    "-".to_string(),
                    "-".to_string(),
                ]);
            }
        }
    }
    println!("{}", table);
    Ok(())
}
