// src/commands/instance.rs
//! Instance registration and inspection

use super::{open_db, open_instance};
use anyhow::{Context, Result, bail};
use serde_json::json;
use siteward::ManagerConfig;
use siteward::db::models::{AccessKind, ApplicationKind, Credentials, Instance, Version};
use tracing::info;

/// Everything `instance add` collects from the command line
pub struct InstanceSpec {
    pub name: String,
    pub web_root: String,
    pub access: AccessKind,
    pub app: ApplicationKind,
    pub web_url: Option<String>,
    pub temp_dir: Option<String>,
    pub interpreter: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    /// Name of the environment variable holding the password
    pub password_env: Option<String>,
}

fn instance_json(instance: &Instance) -> serde_json::Value {
    json!({
        "id": instance.id,
        "name": instance.name,
        "web_root": instance.web_root,
        "web_url": instance.web_url,
        "temp_dir": instance.temp_dir,
        "interpreter": instance.interpreter,
        "app": instance.app_kind.as_str(),
        "access": instance.access_kind.as_str(),
        "host": instance.credentials.host,
        "port": instance.credentials.port,
        "user": instance.credentials.user,
        "has_secret": instance.credentials.secret.is_some(),
        "created_at": instance.created_at,
    })
}

pub(super) fn version_json(version: &Version) -> serde_json::Value {
    json!({
        "id": version.id,
        "vcs": version.vcs.as_str(),
        "branch": version.branch,
        "revision": version.revision,
        "date": version.date,
        "action": version.action.as_str(),
        "hash_algorithm": version.hash_algorithm.name(),
    })
}

/// Register a new instance
pub fn cmd_instance_add(config: &ManagerConfig, spec: InstanceSpec) -> Result<()> {
    info!("Adding instance {}", spec.name);

    if spec.access != AccessKind::Local && spec.host.is_none() {
        bail!("--host is required for {} access", spec.access);
    }

    let secret = match spec.password_env.as_deref() {
        Some(var) => Some(
            std::env::var(var)
                .with_context(|| format!("Environment variable {} is not set", var))?,
        ),
        None => None,
    };

    let mut conn = open_db(config)?;
    if Instance::find_by_name(&conn, &spec.name)?.is_some() {
        bail!("Instance '{}' already exists", spec.name);
    }

    let mut instance = Instance::new(spec.name, spec.web_root, spec.app, spec.access);
    instance.web_url = spec.web_url;
    instance.temp_dir = spec.temp_dir;
    instance.interpreter = spec.interpreter;
    instance.credentials = Credentials {
        host: spec.host,
        port: spec.port,
        user: spec.user,
        secret,
    };

    let id = siteward::db::transaction(&mut conn, |tx| instance.insert(tx))
        .context("Failed to store instance")?;

    println!("Added instance {} (id {})", instance.name, id);
    println!("Run `siteward adopt {} <branch> --source <dir>` to record its current version.", instance.name);
    Ok(())
}

/// List all instances
pub fn cmd_instance_list(config: &ManagerConfig, json: bool) -> Result<()> {
    let conn = open_db(config)?;
    let instances = Instance::list_all(&conn)?;

    if json {
        let rows: Vec<_> = instances.iter().map(instance_json).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if instances.is_empty() {
        println!("No instances registered.");
        return Ok(());
    }

    println!("{:>4}  {:20}  {:6}  {:10}  {:16}  WEB ROOT", "ID", "NAME", "ACCESS", "APP", "VERSION");
    println!("{}", "-".repeat(70));

    for instance in &instances {
        let version = instance
            .latest_version(&conn)?
            .map(|v| v.branch)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4}  {:20}  {:6}  {:10}  {:16}  {}",
            instance.id.unwrap_or_default(),
            instance.name,
            instance.access_kind.as_str(),
            instance.app_kind.as_str(),
            version,
            instance.web_root
        );
    }

    println!();
    println!("Total: {} instance(s)", instances.len());
    Ok(())
}

/// Show one instance and its current version
pub fn cmd_instance_show(config: &ManagerConfig, reference: &str, json: bool) -> Result<()> {
    let (conn, instance) = open_instance(config, reference)?;
    let current = instance.latest_version(&conn)?;

    if json {
        let mut value = instance_json(&instance);
        value["current_version"] = current.as_ref().map(version_json).unwrap_or_default();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Instance: {}", instance.name);
    println!("  ID:          {}", instance.id.unwrap_or_default());
    println!("  Web root:    {}", instance.web_root);
    println!("  Web URL:     {}", instance.web_url.as_deref().unwrap_or("-"));
    println!("  Application: {}", instance.app_kind);
    println!("  Access:      {}", instance.access_kind);
    if let Some(destination) = instance.credentials.destination() {
        let port = instance
            .credentials
            .port
            .or(instance.access_kind.default_port())
            .map(|p| p.to_string())
            .unwrap_or_default();
        println!("  Host:        {} (port {})", destination, port);
        println!(
            "  Password:    {}",
            if instance.credentials.secret.is_some() { "stored" } else { "none" }
        );
    }
    if let Some(temp_dir) = &instance.temp_dir {
        println!("  Temp dir:    {}", temp_dir);
    }
    if let Some(interpreter) = &instance.interpreter {
        println!("  Interpreter: {}", interpreter);
    }

    match current {
        Some(version) => {
            let files = version.checksum_map(&conn)?.len();
            println!(
                "  Version:     {} {}{} ({} baseline files)",
                version.vcs,
                version.branch,
                version.revision.map(|r| format!(" @ {}", r)).unwrap_or_default(),
                files
            );
        }
        None => println!("  Version:     none (not adopted yet)"),
    }
    Ok(())
}

/// Remove an instance and everything recorded for it
pub fn cmd_instance_remove(config: &ManagerConfig, reference: &str) -> Result<()> {
    let (conn, instance) = open_instance(config, reference)?;
    let id = instance.require_id()?;

    Instance::delete(&conn, id).context("Failed to remove instance")?;

    let cache = siteward::db::paths::instance_cache_dir(&config.work_dir, id);
    if cache.exists() {
        std::fs::remove_dir_all(&cache)
            .with_context(|| format!("Failed to remove cache {}", cache.display()))?;
    }

    info!("Removed instance {} (id {})", instance.name, id);
    println!("Removed instance {}", instance.name);
    Ok(())
}

/// List the version history of an instance
pub fn cmd_instance_versions(config: &ManagerConfig, reference: &str, json: bool) -> Result<()> {
    let (conn, instance) = open_instance(config, reference)?;
    let versions = Version::list_for_instance(&conn, instance.require_id()?)?;

    if json {
        let rows: Vec<_> = versions.iter().map(version_json).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if versions.is_empty() {
        println!("No versions recorded for {}.", instance.name);
        return Ok(());
    }

    println!("Versions of {}:", instance.name);
    println!("{:>5}  {:8}  {:7}  {:16}  {:12}  DATE", "ID", "ACTION", "VCS", "BRANCH", "REVISION");
    println!("{}", "-".repeat(70));
    for version in &versions {
        println!(
            "{:>5}  {:8}  {:7}  {:16}  {:12}  {}",
            version.id.unwrap_or_default(),
            version.action.as_str(),
            version.vcs.as_str(),
            version.branch,
            version.revision.as_deref().unwrap_or("-"),
            version.date.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
