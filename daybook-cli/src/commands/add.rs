use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use daybook_core::{ItemKind, Priority, RecordContent, RecordStore, SyncableRecord};
use owo_colors::OwoColorize;

pub struct AddArgs {
    pub title: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub event: bool,
    pub notes: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub priority: Option<String>,
    pub reminder: Option<i64>,
    pub local_only: bool,
}

pub fn run(args: AddArgs) -> Result<()> {
    let store = crate::open_store()?;

    let (start, all_day) = match &args.start {
        Some(s) => parse_datetime(s)?,
        None => (Utc::now(), false),
    };

    let mut content = RecordContent::task(&args.title, start);
    if args.event {
        content.kind = ItemKind::Event;
    }
    content.all_day = all_day;
    content.end = args
        .end
        .as_deref()
        .map(|s| parse_datetime(s).map(|(t, _)| t))
        .transpose()?;
    content.notes = args.notes;
    content.location = args.location;
    content.reminder_minutes = args.reminder;
    if let Some(category) = args.category {
        content.category = category;
    }
    if let Some(priority) = args.priority.as_deref() {
        content.priority = parse_priority(priority)?;
    }

    let mut record = SyncableRecord::new_local(content);
    if args.local_only {
        record.mark_local_only();
    }
    store.save(&record)?;

    let kind = if args.event { "event" } else { "task" };
    println!(
        "{}",
        format!("  Created {kind}: {} [{}]", args.title, short_id(&record)).green()
    );
    Ok(())
}

fn short_id(record: &SyncableRecord) -> String {
    record.id.to_string()[..8].to_string()
}

/// Parse "2026-03-20T15:00" (timed) or "2026-03-20" (all-day).
fn parse_datetime(input: &str) -> Result<(DateTime<Utc>, bool)> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M") {
        return Ok((dt.and_utc(), false));
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("Could not parse date/time: \"{input}\""))?;
    Ok((date.and_time(NaiveTime::MIN).and_utc(), true))
}

fn parse_priority(input: &str) -> Result<Priority> {
    match input {
        "none" => Ok(Priority::None),
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        other => anyhow::bail!("Unknown priority '{}' (none, low, medium, high)", other),
    }
}
