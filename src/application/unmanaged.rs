// src/application/unmanaged.rs

use super::Application;
use crate::access::Access;
use crate::db::models::{ApplicationKind, Instance, Version};
use crate::error::Result;
use std::path::Path;
use tracing::info;

/// Software updated outside siteward; only its baselines are tracked
#[derive(Debug, Clone, Copy, Default)]
pub struct Unmanaged;

impl Application for Unmanaged {
    fn kind(&self) -> ApplicationKind {
        ApplicationKind::Unmanaged
    }

    fn update(
        &self,
        _access: &dyn Access,
        instance: &Instance,
        version: &Version,
        _source_tree: &Path,
    ) -> Result<Option<String>> {
        info!(
            "{} is unmanaged; recording {} without touching files",
            instance.name, version.branch
        );
        Ok(None)
    }
}
