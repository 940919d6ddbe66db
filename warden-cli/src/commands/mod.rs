pub mod check;
pub mod install;
pub mod reset;
pub mod secret;
pub mod status;

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use console::style;
use warden::orchestrator::{PhaseStatus, RunReport};
use warden::WardenError;
use warden::preflight::{CheckOutcome, PreflightReport};

/// clap value parser for `--install-id`.
pub(crate) fn install_id(value: &str) -> Result<String, String> {
    warden::config::validate_install_id(value)
        .map(|()| value.to_string())
        .map_err(|err| match err {
            WardenError::Configuration(report) => report
                .violations()
                .iter()
                .map(|violation| violation.message.clone())
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        })
}

pub(crate) fn table<I, S>(header: I) -> Table
where
    I: IntoIterator<Item = S>,
    S: Into<comfy_table::Cell>,
{
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub(crate) fn print_preflight(report: &PreflightReport) {
    let mut out = table(["Check", "Result", "Detail"]);
    for result in report.results() {
        let outcome = match result.outcome {
            CheckOutcome::Pass => style(result.outcome.to_string()).green(),
            CheckOutcome::SoftFail => style(result.outcome.to_string()).yellow(),
            CheckOutcome::HardFail => style(result.outcome.to_string()).red().bold(),
        };
        out.add_row([result.name.clone(), outcome.to_string(), result.detail.clone()]);
    }
    eprintln!("{}", out);
}

pub(crate) fn print_run(report: &RunReport) {
    let mut out = table(["Phase", "Name", "Status", "Time", "Detail"]);
    for phase in &report.phases {
        let status = match phase.status {
            PhaseStatus::Completed => style(phase.status.to_string()).green(),
            PhaseStatus::Failed => style(phase.status.to_string()).red().bold(),
            PhaseStatus::Skipped => style(phase.status.to_string()).dim(),
            _ => style(phase.status.to_string()),
        };
        let time = phase
            .duration
            .map(|d| format!("{:.1}s", d.as_secs_f64()))
            .unwrap_or_default();
        let detail = match (&phase.skip_reason, &phase.error) {
            (Some(reason), _) => reason.to_string(),
            (_, Some(error)) => error.lines().next().unwrap_or_default().to_string(),
            _ => phase.notes.last().cloned().unwrap_or_default(),
        };
        out.add_row([
            phase.id.to_string(),
            phase.name.clone(),
            status.to_string(),
            time,
            detail,
        ]);
    }
    eprintln!("{}", out);
}
