pub mod add;
pub mod complete;
pub mod delete;
pub mod links;
pub mod list;
pub mod sync;

use anyhow::Result;
use daybook_core::{RecordFilter, RecordStore, SyncableRecord};

/// Resolve a record by id prefix (as shown by `daybook list`).
pub fn resolve_record(store: &dyn RecordStore, prefix: &str) -> Result<SyncableRecord> {
    let records = store.query(&RecordFilter::default())?;
    let mut matches = records
        .into_iter()
        .filter(|r| r.id.to_string().starts_with(&prefix.to_lowercase()));

    let Some(record) = matches.next() else {
        anyhow::bail!("No record matches id '{}'", prefix);
    };
    if matches.next().is_some() {
        anyhow::bail!("Id '{}' is ambiguous, use more characters", prefix);
    }
    Ok(record)
}
