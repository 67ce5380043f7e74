use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::session::DEFAULT_BASE_URL;

/// Contents of `website_info.yaml`: where the open-data portal lives, the
/// API key, and optional operational endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Base address of the CKAN portal.
    pub address: String,
    /// Static API key sent as `X-CKAN-API-Key`.
    pub token: String,
    /// Base address of the source site; defaults to the municipal archive.
    #[serde(default = "default_source_url")]
    pub source_url: String,
    /// Monitoring ping URLs for the scheduler. Pings are skipped entirely
    /// when absent.
    #[serde(default)]
    pub healthchecks: Option<Healthchecks>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Healthchecks {
    /// Pinged on every scheduler tick to signal liveness.
    pub run: String,
    /// Pinged at pipeline start (`/start`), success (bare), and failure
    /// (`/fail`).
    pub data_flow: String,
}

fn default_source_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl SiteConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

/// Per-resource metadata from `metadata.yaml`: the alias list used to
/// resolve the remote resource id, plus whatever extra fields
/// `datastore_create` wants, passed through untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceMetadata {
    pub aliases: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Dataset and resource metadata for the open-data portal.
#[derive(Debug, Clone, Deserialize)]
pub struct PortalMetadata {
    pub dataset_metadata: serde_json::Value,
    pub resources: BTreeMap<String, ResourceMetadata>,
}

impl PortalMetadata {
    /// Load `metadata.yaml`, optionally attaching long-form dataset notes
    /// from a markdown file.
    pub fn load<P: AsRef<Path>>(metadata_path: P, notes_path: Option<P>) -> Result<Self> {
        let text = fs::read_to_string(metadata_path)?;
        let mut metadata: PortalMetadata = serde_yaml::from_str(&text)?;

        if let Some(notes_path) = notes_path {
            let notes = fs::read_to_string(notes_path)?;
            if let Some(dataset) = metadata.dataset_metadata.as_object_mut() {
                dataset.insert("notes".to_string(), serde_json::Value::String(notes));
            }
        }

        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn site_config_defaults_the_source_url() {
        let cfg: SiteConfig = serde_yaml::from_str(
            "address: https://data.example.org\ntoken: secret\n",
        )
        .unwrap();
        assert_eq!(cfg.source_url, DEFAULT_BASE_URL);
        assert!(cfg.healthchecks.is_none());
    }

    #[test]
    fn portal_metadata_attaches_notes() {
        let dir = tempfile::tempdir().unwrap();
        let metadata_path = dir.path().join("metadata.yaml");
        let notes_path = dir.path().join("dataset_notes.md");

        fs::File::create(&metadata_path)
            .unwrap()
            .write_all(
                b"dataset_metadata:\n  name: air-quality\nresources:\n  Pollution:\n    aliases: [pollution-hourly]\n    name: Hourly pollution\n",
            )
            .unwrap();
        fs::File::create(&notes_path)
            .unwrap()
            .write_all(b"Hourly readings.")
            .unwrap();

        let metadata = PortalMetadata::load(&metadata_path, Some(&notes_path)).unwrap();
        assert_eq!(metadata.dataset_metadata["notes"], "Hourly readings.");
        let resource = &metadata.resources["Pollution"];
        assert_eq!(resource.aliases, vec!["pollution-hourly"]);
        assert_eq!(resource.extra["name"], "Hourly pollution");
    }
}
