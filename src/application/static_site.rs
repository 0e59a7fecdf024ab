// src/application/static_site.rs

use super::Application;
use crate::access::{Access, remote_join};
use crate::checksum::relative_path;
use crate::db::models::{ApplicationKind, Instance, Version};
use crate::error::{Error, Result};
use crate::maintenance;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Sites deployed by copying the release tree over the web root
///
/// Files are uploaded one by one; nothing on the host is deleted. While the
/// site is locked the front controller goes to its parked slot, so
/// unlocking brings the new one live.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSite;

const FRONT_CONTROLLER: &str = "index.html";

impl Application for StaticSite {
    fn kind(&self) -> ApplicationKind {
        ApplicationKind::Static
    }

    fn front_controller(&self) -> &str {
        FRONT_CONTROLLER
    }

    fn update(
        &self,
        access: &dyn Access,
        instance: &Instance,
        version: &Version,
        source_tree: &Path,
    ) -> Result<Option<String>> {
        let locked = maintenance::is_locked(access, instance, FRONT_CONTROLLER)?;
        let mut uploaded = 0usize;

        for entry in WalkDir::new(source_tree).follow_links(false).min_depth(1) {
            let entry = entry
                .map_err(|e| Error::IoError(format!("walking {}: {}", source_tree.display(), e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = relative_path(source_tree, entry.path())?;
            let target = if locked && relative == FRONT_CONTROLLER {
                maintenance::parked_path(instance, FRONT_CONTROLLER)
            } else {
                remote_join(&instance.web_root, &relative)
            };

            debug!("Uploading {}", relative);
            access.upload_file(entry.path(), &target)?;
            uploaded += 1;
        }

        info!(
            "Deployed {} files of {} to {}",
            uploaded, version.branch, instance.name
        );
        Ok(version.revision.clone())
    }
}
