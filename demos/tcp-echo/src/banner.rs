use std::path::PathBuf;

use async_trait::async_trait;
use gantry_core::{BoxError, Context, Module, ModuleRef, Provision};
use serde::Deserialize;
use tracing::debug;

// ─── StaticBanner ─────────────────────────────────────────────────────────────

/// A greeting written inline in the configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StaticBanner {
    pub text: String,
}

#[async_trait]
impl Module for StaticBanner {
    async fn start(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

// ─── FileBanner ───────────────────────────────────────────────────────────────

/// A greeting loaded from `path` when the configuration is provisioned.
///
/// A missing or unreadable file rejects the whole configuration.
#[derive(Debug, Deserialize)]
pub struct FileBanner {
    pub path: PathBuf,
    #[serde(skip)]
    text: String,
}

impl FileBanner {
    /// The greeting read from the file, without trailing newlines.
    pub fn text(&self) -> &str {
        &self.text
    }
}

#[async_trait]
impl Module for FileBanner {
    async fn start(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), BoxError> {
        Ok(())
    }

    fn as_provisioner(&mut self) -> Option<&mut dyn Provision> {
        Some(self)
    }
}

#[async_trait]
impl Provision for FileBanner {
    async fn provision(&mut self, _ctx: &mut Context) -> Result<(), BoxError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| format!("cannot read banner file {}: {e}", self.path.display()))?;
        self.text = text.trim_end_matches(['\r', '\n']).to_string();
        debug!(path = %self.path.display(), bytes = self.text.len(), "Banner loaded");
        Ok(())
    }
}

/// Extracts the greeting from any banner module.
pub(crate) fn text_of(banner: &ModuleRef) -> Option<String> {
    if let Some(banner) = banner.downcast::<StaticBanner>() {
        return Some(banner.text.clone());
    }
    banner.downcast::<FileBanner>().map(|b| b.text.clone())
}
