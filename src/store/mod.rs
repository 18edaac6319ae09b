//! Project lookup backed by a JSON document on disk.
//!
//! The real control plane resolves projects through its datastore; this
//! store keeps small installations self-contained. The document maps
//! project id to project entity and is re-read on every lookup, so edits
//! made while the server runs behave like a store reload.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use crate::api::handlers::auth::ProjectGetter;
use crate::model::Project;

pub struct FileProjectStore {
    path: PathBuf,
}

impl FileProjectStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ProjectGetter for FileProjectStore {
    async fn get(&self, id: &str) -> Result<Project> {
        let raw = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read project file {}", self.path.display()))?;
        let projects: HashMap<String, Project> = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse project file {}", self.path.display()))?;
        let mut project = projects
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("project {id} not found"))?;
        if project.id.is_empty() {
            project.id = id.to_string();
        }
        Ok(project)
    }
}
