use std::sync::Arc;

use anyhow::Result;
use daybook_core::{ChangeNotifier, DeletionCoordinator, NoopGate, RecordStore, SyncStatus};
use owo_colors::OwoColorize;

pub fn run(id: &str) -> Result<()> {
    let store = Arc::new(crate::open_store()?);
    let record = crate::commands::resolve_record(store.as_ref(), id)?;

    let coordinator =
        DeletionCoordinator::new(store.clone(), Arc::new(NoopGate), ChangeNotifier::new());
    coordinator.delete(record.id)?;

    match store.get(record.id)? {
        Some(kept) if kept.status == SyncStatus::Tombstoned => {
            println!(
                "{}",
                format!(
                    "  Deleted: {} (will be removed from the provider on next sync)",
                    record.content.title
                )
                .green()
            );
        }
        _ => println!("{}", format!("  Deleted: {}", record.content.title).green()),
    }
    Ok(())
}
