// src/commands/maintenance.rs
//! Maintenance mode commands

use super::{open_access, open_instance};
use anyhow::{Context, Result};
use siteward::ManagerConfig;
use siteward::application::ApplicationRegistry;
use siteward::maintenance;

/// Put an instance into maintenance mode
pub fn cmd_lock(config: &ManagerConfig, reference: &str) -> Result<()> {
    let (_conn, instance) = open_instance(config, reference)?;
    let application = ApplicationRegistry::new().get(instance.app_kind)?;
    let mut access = open_access(config, &instance)?;
    access.connect()?;

    let locked = maintenance::lock(access.as_ref(), &instance, application.front_controller())
        .with_context(|| format!("Failed to lock {}", instance.name))?;

    if locked {
        println!("{} is now in maintenance mode", instance.name);
    } else {
        println!("{} was already in maintenance mode", instance.name);
    }
    Ok(())
}

/// Take an instance out of maintenance mode
pub fn cmd_unlock(config: &ManagerConfig, reference: &str) -> Result<()> {
    let (_conn, instance) = open_instance(config, reference)?;
    let application = ApplicationRegistry::new().get(instance.app_kind)?;
    let mut access = open_access(config, &instance)?;
    access.connect()?;

    let unlocked = maintenance::unlock(access.as_ref(), &instance, application.front_controller())
        .with_context(|| format!("Failed to unlock {}", instance.name))?;

    if unlocked {
        println!("{} is back online", instance.name);
    } else {
        println!("{} was not in maintenance mode", instance.name);
    }
    Ok(())
}
