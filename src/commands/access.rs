// src/commands/access.rs
//! Transport checks

use super::{open_access, open_instance};
use anyhow::{Context, Result};
use serde_json::json;
use siteward::ManagerConfig;
use tracing::info;

/// Connect to an instance's host and report the handshake
pub fn cmd_access_check(config: &ManagerConfig, reference: &str, json: bool) -> Result<()> {
    let (_conn, instance) = open_instance(config, reference)?;
    let mut access = open_access(config, &instance)?;

    info!("Checking {} access to {}", access.kind(), instance.name);
    let handshake = access
        .connect()
        .with_context(|| format!("Failed to connect to {}", instance.name))?;

    if json {
        let value = json!({
            "instance": instance.name,
            "access": access.kind().as_str(),
            "handshake": handshake,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let capabilities = handshake.capabilities;
    println!("{}: connected over {}", instance.name, access.kind());
    println!("  Authentication: {}", handshake.auth);
    println!("  Shell:          {}", if capabilities.shell { "yes" } else { "no" });
    println!("  Transfer only:  {}", if capabilities.transfer_only { "yes" } else { "no" });
    println!("  Delta mirror:   {}", if capabilities.delta_mirror { "yes" } else { "no" });
    Ok(())
}
