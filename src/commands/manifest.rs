// src/commands/manifest.rs
//! Backup manifest output

use super::{open_access, open_instance};
use anyhow::{Context, Result, bail};
use siteward::checksum::{ChecksumStore, HashOptions};
use siteward::manifest::{self, EntryKind};
use siteward::ManagerConfig;
use std::path::Path;
use tracing::info;

/// Write the manifest of an instance's application tree and data directories
pub fn cmd_manifest(
    config: &ManagerConfig,
    reference: &str,
    live: bool,
    data_dirs: &[String],
    output: Option<&Path>,
) -> Result<()> {
    let (conn, instance) = open_instance(config, reference)?;
    let Some(version) = instance.latest_version(&conn)? else {
        bail!("Instance {} has no recorded version; adopt it first", instance.name);
    };

    let options = HashOptions {
        algorithm: version.hash_algorithm,
        exclude: config.checksum.exclude.clone(),
    };

    let needs_host = live || !data_dirs.is_empty();
    let access = if needs_host {
        let mut access = open_access(config, &instance)?;
        access
            .connect()
            .with_context(|| format!("Failed to connect to {}", instance.name))?;
        Some(access)
    } else {
        None
    };

    let app_map = match access.as_deref() {
        Some(access) if live => {
            let store = ChecksumStore::new(&conn, options.clone(), &config.work_dir);
            store
                .capture_live(&instance, access, version.hash_algorithm)
                .context("Failed to hash the live tree")?
        }
        _ => version.checksum_map(&conn)?,
    };

    let mut entries = manifest::from_checksums(&app_map, EntryKind::App, &instance.web_root);

    if let Some(access) = access.as_deref()
        && !data_dirs.is_empty()
    {
        let cache = siteward::db::paths::data_cache_dir(&config.work_dir, instance.require_id()?);
        let data = manifest::data_entries(access, data_dirs, &cache, &options)
            .context("Failed to hash data directories")?;
        entries.extend(data);
    }

    let text = manifest::render(&entries);
    match output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} manifest entries to {}", entries.len(), path.display());
            println!("Wrote {} entries to {}", entries.len(), path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}
