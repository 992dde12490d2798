use anyhow::Result;
use clap::Subcommand;
use daybook_core::ProviderLink;
use owo_colors::OwoColorize;
use url::Url;

#[derive(Subcommand)]
pub enum LinksCommand {
    /// List configured provider links
    List,
    /// Add a provider link
    Add {
        /// Unique link name (e.g. "work", "team-feed")
        name: String,

        /// Provider kind: "feed", or the suffix of an installed
        /// daybook-provider-<kind> binary (e.g. "google")
        provider: String,

        /// Feed URL (required for "feed" links)
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Credentials handle passed to the provider binary
        #[arg(long)]
        credentials_ref: Option<String>,

        /// Display color (hex)
        #[arg(long)]
        color: Option<String>,

        /// Never push local changes to this provider
        #[arg(long)]
        read_only: bool,
    },
    /// Remove a provider link
    Remove { name: String },
    /// Enable a provider link
    Enable { name: String },
    /// Disable a provider link (kept, but skipped by sync)
    Disable { name: String },
}

pub fn run(command: LinksCommand) -> Result<()> {
    let mut registry = crate::load_registry()?;

    match command {
        LinksCommand::List => {
            if registry.links.is_empty() {
                println!("  No provider links configured.");
                return Ok(());
            }
            for link in &registry.links {
                let state = if link.enabled {
                    "enabled".green().to_string()
                } else {
                    "disabled".dimmed().to_string()
                };
                let last_sync = link
                    .last_sync
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "  {} ({}) {} — last sync: {}",
                    link.name.bold(),
                    link.provider,
                    state,
                    last_sync
                );
            }
        }
        LinksCommand::Add {
            name,
            provider,
            endpoint,
            credentials_ref,
            color,
            read_only,
        } => {
            let mut link = ProviderLink::new(&name, &provider);
            link.endpoint = endpoint.as_deref().map(Url::parse).transpose()?;
            link.credentials_ref = credentials_ref;
            link.color = color;
            link.read_only = read_only || provider == "feed";

            if provider == "feed" && link.endpoint.is_none() {
                anyhow::bail!("Feed links need --endpoint <url>");
            }

            registry.add(link)?;
            registry.save()?;
            println!("{}", format!("  Added link: {name}").green());
        }
        LinksCommand::Remove { name } => {
            if !registry.remove(&name) {
                anyhow::bail!("No link named '{}'", name);
            }
            registry.save()?;
            println!("  Removed link: {name}");
        }
        LinksCommand::Enable { name } => set_enabled(&mut registry, &name, true)?,
        LinksCommand::Disable { name } => set_enabled(&mut registry, &name, false)?,
    }

    Ok(())
}

fn set_enabled(
    registry: &mut daybook_core::LinkRegistry,
    name: &str,
    enabled: bool,
) -> Result<()> {
    let Some(link) = registry.get_mut(name) else {
        anyhow::bail!("No link named '{}'", name);
    };
    link.enabled = enabled;
    registry.save()?;
    println!(
        "  {} link: {}",
        if enabled { "Enabled" } else { "Disabled" },
        name
    );
    Ok(())
}
