use std::sync::Arc;

use anyhow::Result;
use daybook_core::{
    adapter_for, ApplyCounts, CancelFlag, ChangeNotifier, PassSummary, SyncEngine,
};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

pub async fn run(only: Option<&str>) -> Result<()> {
    let store = Arc::new(crate::open_store()?);
    let mut registry = crate::load_registry()?;

    let names: Vec<String> = registry
        .links
        .iter()
        .filter(|l| l.enabled && only.map_or(true, |o| l.name == o))
        .map(|l| l.name.clone())
        .collect();

    if names.is_empty() {
        match only {
            Some(name) => anyhow::bail!("No enabled link named '{}'", name),
            None => anyhow::bail!("No provider links configured. Try `daybook links add`."),
        }
    }

    let engine = SyncEngine::new(store, ChangeNotifier::new());
    let cancel = CancelFlag::new();

    let mut pulled = ApplyCounts::default();
    let mut pushed = ApplyCounts::default();
    let mut pending_retry = 0;

    for name in names {
        let Some(mut link) = registry.get(&name).cloned() else {
            continue;
        };
        let adapter = match adapter_for(&link) {
            Ok(adapter) => adapter,
            Err(e) => {
                println!("{}  {}", link.name, e.to_string().red());
                continue;
            }
        };

        let spinner = create_spinner(link.name.clone());
        let result = engine.sync_link(&mut link, adapter.as_ref(), &cancel).await;
        spinner.finish_and_clear();

        println!("{}", link.name.bold());
        match result {
            Ok(summary) => {
                print_summary(&summary);
                pulled = add(pulled, summary.pulled);
                pushed = add(pushed, summary.pushed);
                pending_retry += summary.pending_retry;
                registry.commit(link)?;
            }
            Err(e) => println!("   {}", e.to_string().red()),
        }
    }

    if pulled.total() > 0 {
        println!(
            "\nPulled: {} created, {} updated, {} deleted",
            pulled.created, pulled.updated, pulled.deleted
        );
    }
    if pushed.total() > 0 {
        println!(
            "Pushed: {} created, {} updated, {} deleted",
            pushed.created, pushed.updated, pushed.deleted
        );
    }
    if pending_retry > 0 {
        println!(
            "{}",
            format!("{pending_retry} records pending retry on next sync").yellow()
        );
    }

    Ok(())
}

fn print_summary(summary: &PassSummary) {
    if !summary.has_changes() && summary.rejected.is_empty() {
        println!("   {}", "up to date".dimmed());
    }
    for (id, reason) in &summary.rejected {
        let id = id.to_string();
        println!("   {}", format!("{} rejected: {reason}", &id[..8]).red());
    }
}

fn add(a: ApplyCounts, b: ApplyCounts) -> ApplyCounts {
    ApplyCounts {
        created: a.created + b.created,
        updated: a.updated + b.updated,
        deleted: a.deleted + b.deleted,
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["-", "\\", "|", "/"])
        .template("{msg} {spinner}")
    {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}
