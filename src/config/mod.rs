//! Process-level control-plane configuration.
//!
//! Loaded once at startup from a JSON document. Shared SSO entries are
//! considered already decrypted; project entries may bake in static-admin
//! credentials so operators can sign in before any project is stored.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{ProjectSSOConfig, ProjectStaticAdmin};

/// A project declared directly in process configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneProject {
    pub id: String,
    #[serde(default)]
    pub static_admin: Option<ProjectStaticAdmin>,
}

/// A named SSO configuration shared across projects via
/// `project.sharedSsoName`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedSSOConfig {
    pub name: String,
    #[serde(flatten)]
    pub sso: ProjectSSOConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneConfig {
    #[serde(default)]
    pub projects: Vec<ControlPlaneProject>,
    #[serde(default)]
    pub shared_sso_configs: Vec<SharedSSOConfig>,
}

impl ControlPlaneConfig {
    /// Load and parse the configuration file.
    ///
    /// # Errors
    /// Returns an error when the file is unreadable or not valid JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Index the declared projects by id.
    #[must_use]
    pub fn project_map(&self) -> HashMap<String, ControlPlaneProject> {
        self.projects
            .iter()
            .map(|project| (project.id.clone(), project.clone()))
            .collect()
    }

    /// Index the shared SSO configurations by name.
    #[must_use]
    pub fn shared_sso_map(&self) -> HashMap<String, ProjectSSOConfig> {
        self.shared_sso_configs
            .iter()
            .map(|shared| (shared.name.clone(), shared.sso.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProjectSSOProvider;

    #[test]
    fn parses_projects_and_shared_sso_configs() {
        let raw = serde_json::json!({
            "projects": [
                {
                    "id": "p1",
                    "staticAdmin": {"username": "root", "passwordHash": "$2b$10$hash"}
                }
            ],
            "sharedSsoConfigs": [
                {
                    "name": "shared-github",
                    "provider": "GITHUB",
                    "github": {"clientId": "id", "clientSecret": "secret"}
                }
            ]
        });
        let config: ControlPlaneConfig = serde_json::from_value(raw).expect("parse");

        let projects = config.project_map();
        let admin = projects["p1"].static_admin.as_ref().expect("static admin");
        assert_eq!(admin.username, "root");

        let shared = config.shared_sso_map();
        let sso = &shared["shared-github"];
        assert_eq!(sso.provider, ProjectSSOProvider::Github);
        assert_eq!(sso.github.as_ref().expect("github").client_id, "id");
    }

    #[test]
    fn empty_document_is_valid() {
        let config: ControlPlaneConfig = serde_json::from_str("{}").expect("parse");
        assert!(config.project_map().is_empty());
        assert!(config.shared_sso_map().is_empty());
    }
}
