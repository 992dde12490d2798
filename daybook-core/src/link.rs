//! Provider link configuration.
//!
//! A link binds one connected provider instance (an account, a feed URL)
//! to an adapter, and carries the per-link sync watermark. Links live in
//! a TOML registry at `<config_dir>/daybook/links.toml`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SyncError;

fn default_enabled() -> bool {
    true
}

/// One connected provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderLink {
    /// Unique instance name; the discriminator under which external
    /// keys are stored on records (each feed URL is its own link).
    pub name: String,
    /// Adapter kind: `feed`, or the suffix of a
    /// `daybook-provider-<kind>` binary.
    pub provider: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Url>,
    /// Opaque handle the provider binary resolves to real credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    /// Watermark: everything up to here has been pulled. Advanced only
    /// after a fully successful pull phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

impl ProviderLink {
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        ProviderLink {
            name: name.into(),
            provider: provider.into(),
            enabled: true,
            endpoint: None,
            credentials_ref: None,
            color: None,
            read_only: false,
            last_sync: None,
        }
    }

    /// Link parameters handed to provider binaries with every request.
    pub fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "link": self.name,
            "endpoint": self.endpoint.as_ref().map(Url::as_str),
            "credentials_ref": self.credentials_ref,
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    links: Vec<ProviderLink>,
}

/// The set of configured provider links, persisted as TOML.
pub struct LinkRegistry {
    path: PathBuf,
    pub links: Vec<ProviderLink>,
}

impl LinkRegistry {
    /// Default registry location: `<config_dir>/daybook/links.toml`.
    pub fn default_path() -> Result<PathBuf, SyncError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SyncError::Config("could not determine config directory".into()))?;
        Ok(config_dir.join("daybook").join("links.toml"))
    }

    /// Load the registry; a missing file is an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        let links = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
            let file: RegistryFile = toml::from_str(&contents)
                .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
            file.links
        } else {
            Vec::new()
        };
        Ok(LinkRegistry { path, links })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&ProviderLink> {
        self.links.iter().find(|l| l.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ProviderLink> {
        self.links.iter_mut().find(|l| l.name == name)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ProviderLink> {
        self.links.iter().filter(|l| l.enabled)
    }

    pub fn add(&mut self, link: ProviderLink) -> Result<(), SyncError> {
        if self.get(&link.name).is_some() {
            return Err(SyncError::Config(format!(
                "a link named '{}' already exists",
                link.name
            )));
        }
        self.links.push(link);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.links.len();
        self.links.retain(|l| l.name != name);
        self.links.len() != before
    }

    /// Replace the stored state of one link (after a sync pass advanced
    /// its watermark) and persist.
    pub fn commit(&mut self, link: ProviderLink) -> Result<(), SyncError> {
        match self.get_mut(&link.name) {
            Some(slot) => *slot = link,
            None => self.links.push(link),
        }
        self.save()
    }

    /// Save atomically: temp file first, then rename over the real path.
    pub fn save(&self) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::Config(format!("could not create config dir: {e}")))?;
        }

        let file = RegistryFile {
            links: self.links.clone(),
        };
        let contents = toml::to_string_pretty(&file)
            .map_err(|e| SyncError::Config(format!("could not encode links: {e}")))?;

        let temp_path = self.path.with_extension("toml.tmp");
        std::fs::write(&temp_path, contents)
            .map_err(|e| SyncError::Config(format!("could not write links: {e}")))?;
        std::fs::rename(&temp_path, &self.path)
            .map_err(|e| SyncError::Config(format!("could not write links: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn registry_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.toml");

        let mut registry = LinkRegistry::load(&path).unwrap();
        assert!(registry.links.is_empty());

        let mut feed = ProviderLink::new("team-feed", "feed");
        feed.endpoint = Some(Url::parse("https://example.com/team.ics").unwrap());
        feed.read_only = true;
        feed.color = Some("#5BC0A6".to_string());
        registry.add(feed).unwrap();

        let mut google = ProviderLink::new("work", "google");
        google.credentials_ref = Some("work-token".to_string());
        google.last_sync = Some(Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap());
        registry.add(google).unwrap();
        registry.save().unwrap();

        let reloaded = LinkRegistry::load(&path).unwrap();
        assert_eq!(reloaded.links.len(), 2);
        let feed = reloaded.get("team-feed").unwrap();
        assert!(feed.enabled);
        assert!(feed.read_only);
        assert_eq!(
            feed.endpoint.as_ref().unwrap().as_str(),
            "https://example.com/team.ics"
        );
        assert_eq!(
            reloaded.get("work").unwrap().last_sync,
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = LinkRegistry::load(dir.path().join("links.toml")).unwrap();
        registry.add(ProviderLink::new("work", "google")).unwrap();
        assert!(registry.add(ProviderLink::new("work", "outlook")).is_err());
    }

    #[test]
    fn commit_updates_the_watermark_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.toml");

        let mut registry = LinkRegistry::load(&path).unwrap();
        registry.add(ProviderLink::new("work", "google")).unwrap();
        registry.save().unwrap();

        let mut link = registry.get("work").unwrap().clone();
        link.last_sync = Some(Utc.with_ymd_and_hms(2026, 2, 2, 2, 0, 0).unwrap());
        registry.commit(link).unwrap();

        let reloaded = LinkRegistry::load(&path).unwrap();
        assert!(reloaded.get("work").unwrap().last_sync.is_some());
    }
}
