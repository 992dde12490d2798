use anyhow::Result;
use daybook_core::{ItemKind, RecordFilter, RecordStore};

use crate::render;

pub fn run(all: bool) -> Result<()> {
    let store = crate::open_store()?;
    let records = store.query(&RecordFilter::default())?;

    let mut shown = 0;
    for record in &records {
        if !all && record.content.kind == ItemKind::Task && record.content.completed {
            continue;
        }
        println!("{}", render::record_line(record));
        shown += 1;
    }

    if shown == 0 {
        println!("  Nothing here yet. Try `daybook add \"Buy milk\"`.");
    }
    Ok(())
}
