use anyhow::Result;
use daybook_core::{ItemKind, RecordStore};
use owo_colors::OwoColorize;

pub fn run(id: &str) -> Result<()> {
    let store = crate::open_store()?;
    let mut record = crate::commands::resolve_record(&store, id)?;

    if record.content.kind != ItemKind::Task {
        anyhow::bail!("'{}' is an event, not a task", record.content.title);
    }

    record.content.completed = true;
    record.mark_pending();
    store.save(&record)?;

    println!("{}", format!("  Done: {}", record.content.title).green());
    Ok(())
}
