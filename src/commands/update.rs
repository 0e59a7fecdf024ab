// src/commands/update.rs
//! Adopt, verify and update

use super::instance::version_json;
use super::{open_access, open_instance, print_paths};
use anyhow::{Context, Result};
use serde_json::json;
use siteward::application::ApplicationRegistry;
use siteward::{ManagerConfig, UpdateRequest, Updater};
use std::path::Path;
use tracing::info;

/// Record the version an instance is already running
pub fn cmd_adopt(
    config: &ManagerConfig,
    reference: &str,
    source: &Path,
    request: UpdateRequest,
) -> Result<()> {
    let (conn, instance) = open_instance(config, reference)?;
    if let Some(current) = instance.latest_version(&conn)? {
        anyhow::bail!(
            "Instance {} already has version {} ({}); use `siteward update`",
            instance.name,
            current.branch,
            current.action
        );
    }

    let mut access = open_access(config, &instance)?;
    let provider = siteward::source::open(request.vcs, source)?;
    info!("Adopting {} from {}", instance.name, provider.describe());

    let updater = Updater::new(&conn, config.hash_options(), &config.work_dir);
    let version = updater
        .adopt(&instance, access.as_mut(), provider.as_ref(), &request)
        .with_context(|| format!("Failed to adopt {}", instance.name))?;

    let files = version.checksum_map(&conn)?.len();
    println!(
        "Adopted {} at {} {} ({} baseline files)",
        instance.name, version.vcs, version.branch, files
    );
    Ok(())
}

/// Show how the live tree has drifted from its baseline
pub fn cmd_verify(config: &ManagerConfig, reference: &str, all: bool, json: bool) -> Result<()> {
    let (conn, instance) = open_instance(config, reference)?;
    let mut access = open_access(config, &instance)?;

    let updater = Updater::new(&conn, config.hash_options(), &config.work_dir);
    let drift = updater
        .verify(&instance, access.as_mut())
        .with_context(|| format!("Failed to verify {}", instance.name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&drift)?);
        return Ok(());
    }

    if drift.is_clean() {
        println!("{}: {} files match the baseline", instance.name, drift.pristine.len());
    } else {
        println!(
            "{}: {} of {} files differ from the baseline",
            instance.name,
            drift.change_count(),
            drift.change_count() + drift.pristine.len()
        );
    }
    print_paths("Modified", 'M', &drift.modified);
    print_paths("New", '+', &drift.new);
    print_paths("Deleted", '-', &drift.deleted);
    if all {
        print_paths("Unchanged", ' ', &drift.pristine);
    }
    Ok(())
}

/// Move an instance to a new version and report what needs attention
pub fn cmd_update(
    config: &ManagerConfig,
    reference: &str,
    source: &Path,
    request: UpdateRequest,
    json: bool,
) -> Result<()> {
    let (conn, instance) = open_instance(config, reference)?;
    let mut access = open_access(config, &instance)?;
    let application = ApplicationRegistry::new().get(instance.app_kind)?;
    let provider = siteward::source::open(request.vcs, source)?;

    info!(
        "Updating {} to {} from {}",
        instance.name,
        request.branch,
        provider.describe()
    );

    let updater = Updater::new(&conn, config.hash_options(), &config.work_dir);
    let outcome = updater
        .update(
            &instance,
            access.as_mut(),
            application.as_ref(),
            provider.as_ref(),
            &request,
        )
        .with_context(|| format!("Failed to update {}", instance.name))?;

    if json {
        let value = json!({
            "instance": instance.name,
            "version": version_json(&outcome.version),
            "accepted": outcome.accepted,
            "conflicts": outcome.conflicts,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!(
        "Updated {} to {} {}",
        instance.name, outcome.version.vcs, outcome.version.branch
    );
    print_paths("Accepted into the new baseline", '=', &outcome.accepted);

    if outcome.conflicts.is_empty() {
        println!("No conflicts.");
    } else {
        println!();
        println!("{} path(s) need review:", outcome.conflicts.len());
        print_paths("Modified", 'M', &outcome.conflicts.modified);
        print_paths("New", '+', &outcome.conflicts.new);
        print_paths("Deleted", '-', &outcome.conflicts.deleted);
    }
    Ok(())
}
