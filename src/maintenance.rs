// src/maintenance.rs

//! Maintenance mode
//!
//! Locking parks the front controller under `<name>.maintenance` and puts a
//! page answering every request with 503 in its place. The parked file is
//! the lock: its presence is what [`is_locked`] checks.

use crate::access::{Access, remote_join};
use crate::db::models::Instance;
use crate::error::{Error, Result};
use std::io::Write;
use tracing::info;

pub const PARKED_SUFFIX: &str = ".maintenance";

const PAGE_BODY: &str = "<!DOCTYPE html>
<html>
<head><meta charset=\"utf-8\"><title>Maintenance</title></head>
<body><h1>Down for maintenance</h1><p>This site is being updated. Please try again shortly.</p></body>
</html>
";

/// Replacement for the front controller while the site is locked
pub fn maintenance_page(front_controller: &str) -> String {
    if front_controller.ends_with(".php") {
        format!("<?php http_response_code(503); header('Retry-After: 300'); ?>\n{PAGE_BODY}")
    } else {
        PAGE_BODY.to_string()
    }
}

pub fn front_path(instance: &Instance, front_controller: &str) -> String {
    remote_join(&instance.web_root, front_controller)
}

/// Where the real front controller waits while the site is locked
pub fn parked_path(instance: &Instance, front_controller: &str) -> String {
    format!("{}{}", front_path(instance, front_controller), PARKED_SUFFIX)
}

pub fn is_locked(access: &dyn Access, instance: &Instance, front_controller: &str) -> Result<bool> {
    access.file_exists(&parked_path(instance, front_controller))
}

/// Lock the site; `false` when it was already locked
pub fn lock(access: &dyn Access, instance: &Instance, front_controller: &str) -> Result<bool> {
    if is_locked(access, instance, front_controller)? {
        return Ok(false);
    }

    let front = front_path(instance, front_controller);
    if !access.file_exists(&front)? {
        return Err(Error::NotFound(format!("front controller {front}")));
    }

    let mut page = tempfile::NamedTempFile::new()?;
    page.write_all(maintenance_page(front_controller).as_bytes())?;
    page.flush()?;

    access.move_file(&front, &parked_path(instance, front_controller))?;
    access.upload_file(page.path(), &front)?;

    info!("Locked {}", instance.name);
    Ok(true)
}

/// Unlock the site; `false` when it was not locked
pub fn unlock(access: &dyn Access, instance: &Instance, front_controller: &str) -> Result<bool> {
    if !is_locked(access, instance, front_controller)? {
        return Ok(false);
    }

    let front = front_path(instance, front_controller);
    if access.file_exists(&front)? {
        access.delete_file(&front)?;
    }
    access.move_file(&parked_path(instance, front_controller), &front)?;

    info!("Unlocked {}", instance.name);
    Ok(true)
}
