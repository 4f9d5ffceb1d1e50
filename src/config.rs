//! Connection settings and field-key configuration.
//!
//! Settings come from `<config_dir>/ado-anchors/config.json`, with these
//! environment variables taking precedence:
//! - `ADO_ORGANIZATION_URL` - e.g. `https://dev.azure.com/contoso`
//! - `ADO_PROJECT` - project name
//! - `ADO_PAT` - personal access token
//! - `ADO_REFRESH_MINUTES` - refresh interval for watched queries
//!
//! Every value may be absent. Operations that need a connection call
//! [`Settings::connection`] and surface [`ClientError::NotConfigured`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

use crate::client::ClientError;
use crate::models::keys;

const APP_NAME: &str = "ado-anchors";
const CONFIG_FILE: &str = "config.json";

/// Default refresh interval for watched queries, in minutes.
pub const DEFAULT_REFRESH_MINUTES: u32 = 15;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub organization_url: Option<String>,
    pub project_name: Option<String>,
    pub personal_access_token: Option<String>,
    pub refresh_interval_minutes: Option<u32>,
    /// Run saved queries with the comprehensive field set.
    pub comprehensive_queries: bool,
    pub fields: FieldConfig,
}

/// Wire field keys requested from the remote.
///
/// Several role and readiness fields differ per organization, so every key
/// list here is configuration rather than fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldConfig {
    /// Saved-query rows when `comprehensive` is off.
    pub minimal: Vec<String>,
    /// Added to `minimal` when `comprehensive` is on.
    pub comprehensive_extra: Vec<String>,
    /// Batch fields for the children of a container.
    pub children: Vec<String>,
    /// Ordering key for child queries; ties break on id.
    pub rank_field: String,
    /// Identity fields shown on the Contacts tab.
    pub contacts: Vec<FieldSpec>,
    /// Extra tabs, each listing a group of fields.
    pub groups: Vec<FieldGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub label: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGroup {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl FieldSpec {
    pub fn new(label: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            key: key.into(),
        }
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            minimal: owned(&[keys::ID, keys::WORK_ITEM_TYPE, keys::TITLE, keys::STATE]),
            comprehensive_extra: owned(&[
                keys::ASSIGNED_TO,
                keys::CREATED_DATE,
                keys::CHANGED_DATE,
                keys::DESCRIPTION,
                keys::TAGS,
                keys::PRIORITY,
                keys::PARENT,
            ]),
            children: owned(&[
                keys::ID,
                keys::TITLE,
                keys::STATE,
                keys::WORK_ITEM_TYPE,
                keys::DESCRIPTION,
                keys::ASSIGNED_TO,
                keys::CREATED_DATE,
                keys::CHANGED_DATE,
                keys::PARENT,
            ]),
            rank_field: keys::STACK_RANK.to_string(),
            contacts: vec![
                FieldSpec::new("Assigned To", keys::ASSIGNED_TO),
                FieldSpec::new("Created By", keys::CREATED_BY),
                FieldSpec::new("Changed By", keys::CHANGED_BY),
            ],
            groups: Vec::new(),
        }
    }
}

impl FieldConfig {
    /// Field list for a saved query run.
    pub fn query_fields(&self, comprehensive: bool) -> Vec<String> {
        let mut fields = self.minimal.clone();
        if comprehensive {
            for key in &self.comprehensive_extra {
                if !fields.contains(key) {
                    fields.push(key.clone());
                }
            }
        }
        fields
    }
}

/// A complete set of connection values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Organization URL without trailing slashes.
    pub organization_url: String,
    pub project_name: String,
    pub personal_access_token: String,
}

impl Connection {
    /// Web UI link for a work item.
    pub fn item_link(&self, id: i64) -> String {
        format!(
            "{}/{}/_workitems/edit/{}",
            self.organization_url,
            urlencoding::encode(&self.project_name),
            id
        )
    }
}

impl Settings {
    /// Load from the user's config directory, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        let mut settings = Self::load_from(&path)?;
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Load from a specific file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let settings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(settings)
    }

    /// Save to the user's config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Overlay values from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("ADO_ORGANIZATION_URL") {
            self.organization_url = Some(url);
        }
        if let Some(project) = lookup("ADO_PROJECT") {
            self.project_name = Some(project);
        }
        if let Some(pat) = lookup("ADO_PAT") {
            self.personal_access_token = Some(pat);
        }
        if let Some(minutes) = lookup("ADO_REFRESH_MINUTES").and_then(|s| s.parse().ok()) {
            self.refresh_interval_minutes = Some(minutes);
        }
    }

    pub fn refresh_interval_minutes(&self) -> u32 {
        self.refresh_interval_minutes
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_REFRESH_MINUTES)
    }

    /// The connection values, or the names of the ones that are missing.
    pub fn connection(&self) -> Result<Connection, ClientError> {
        fn present(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }

        let org = present(&self.organization_url);
        let project = present(&self.project_name);
        let pat = present(&self.personal_access_token);

        match (org, project, pat) {
            (Some(org), Some(project_name), Some(personal_access_token)) => Ok(Connection {
                organization_url: org.trim_end_matches('/').to_string(),
                project_name,
                personal_access_token,
            }),
            (org, project, pat) => {
                let mut missing = Vec::new();
                if org.is_none() {
                    missing.push("organizationUrl");
                }
                if project.is_none() {
                    missing.push("projectName");
                }
                if pat.is_none() {
                    missing.push("personalAccessToken");
                }
                Err(ClientError::NotConfigured { missing })
            }
        }
    }
}

fn config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}
