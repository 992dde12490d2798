use daybook_core::{ItemKind, SyncStatus, SyncableRecord};
use owo_colors::OwoColorize;

/// One listing line: id prefix, kind marker, start, title, sync badge.
pub fn record_line(record: &SyncableRecord) -> String {
    let id = record.id.to_string();
    let id = &id[..8];
    let marker = match (record.content.kind, record.content.completed) {
        (ItemKind::Task, true) => "[x]",
        (ItemKind::Task, false) => "[ ]",
        (ItemKind::Event, _) => " @ ",
    };
    let when = if record.content.all_day {
        record.content.start.format("%Y-%m-%d").to_string()
    } else {
        record.content.start.format("%Y-%m-%d %H:%M").to_string()
    };

    format!(
        "  {} {} {}  {} {}",
        id.dimmed(),
        marker,
        when,
        record.content.title,
        status_badge(record)
    )
}

fn status_badge(record: &SyncableRecord) -> String {
    if let Some(reason) = &record.sync_error {
        return format!("sync failed: {reason}").red().to_string();
    }
    match record.status {
        SyncStatus::Pending => "pending".yellow().to_string(),
        SyncStatus::Synced => "synced".green().to_string(),
        SyncStatus::LocalOnly => "local".dimmed().to_string(),
        SyncStatus::Tombstoned => "deleting".red().to_string(),
    }
}
