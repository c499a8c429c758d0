//! CLI presentation: text and json formatters per command family.

use crate::editing::ScheduleEntry;
use crate::error::ApiError;
use crate::model::RunningAnnex;
use crate::sync::{CommitOutcome, InitOutcome, SyncState};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::StorageError(crate::error::StorageError::Serialization(e)))
}

fn section_title(title: &str) -> String {
    format!("{}", title.bold().underline())
}

pub fn format_schedule_text(rows: &[ScheduleEntry]) -> String {
    if rows.is_empty() {
        return "No issues scheduled.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Issue", "Publication", "Cutoff", "General", "Amendments", "Annexes"]);
    for row in rows {
        table.add_row(vec![
            row.id.to_string(),
            row.publication_date.to_string(),
            row.cutoff_date.to_string(),
            row.general_messages.to_string(),
            row.amendment_messages.to_string(),
            row.annexes.to_string(),
        ]);
    }
    format!("{}\n{}", section_title("Schedule"), table)
}

pub fn format_running_annexes_text(target: u64, annexes: &[RunningAnnex]) -> String {
    if annexes.is_empty() {
        return format!("No publications annexed before issue {}.", target);
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Publication", "Annexed in issue", "Position date"]);
    for annex in annexes {
        table.add_row(vec![
            annex.publication_id.to_string(),
            annex.issue_id.to_string(),
            annex
                .position_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    format!(
        "{}\n{}",
        section_title(&format!("Running annexes before issue {}", target)),
        table
    )
}

fn state_label(state: SyncState) -> String {
    let label = serde_json::to_value(state)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", state));
    match state {
        SyncState::Clean => label.green().to_string(),
        SyncState::LocalChangesPresent | SyncState::Committing | SyncState::Pushing => {
            label.yellow().to_string()
        }
        SyncState::Uninitialized => label.dimmed().to_string(),
        _ => label.red().to_string(),
    }
}

pub fn format_sync_status_text(state: SyncState, branch: &str, initialized: bool) -> String {
    format!(
        "{}\n  state:       {}\n  branch:      {}\n  initialized: {}",
        section_title("Sync"),
        state_label(state),
        branch,
        if initialized { "yes" } else { "no" }
    )
}

pub fn format_init_outcome(outcome: InitOutcome) -> String {
    match outcome {
        InitOutcome::Cloned => format!("{} repository cloned", "✓".green()),
        InitOutcome::FastForwarded => format!("{} fast-forwarded to remote", "✓".green()),
        InitOutcome::UpToDate => format!("{} already up to date", "✓".green()),
    }
}

pub fn format_changed_files(files: &[String]) -> String {
    if files.is_empty() {
        return "Working tree clean.".to_string();
    }
    let mut out = format!("{} changed file(s):", files.len());
    for file in files {
        out.push_str(&format!("\n  {}", file.yellow()));
    }
    out
}

pub fn format_commit_outcome(outcome: &CommitOutcome) -> String {
    match outcome {
        CommitOutcome::NothingToCommit => "Nothing to commit.".to_string(),
        CommitOutcome::Pushed { commit, files } => format!(
            "{} committed {} file(s) as {} and pushed",
            "✓".green(),
            files.len(),
            &commit[..commit.len().min(10)]
        ),
        CommitOutcome::PushedPending { commits } => {
            format!("{} pushed {} pending commit(s)", "✓".green(), commits)
        }
    }
}
