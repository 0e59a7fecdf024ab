// src/application/mod.rs

//! The software being managed
//!
//! An [`Application`] knows how to move a live installation to a new
//! version. The reconciliation engine treats it as a black box that
//! mutates the web root between two snapshots.

mod static_site;
mod unmanaged;

pub use static_site::StaticSite;
pub use unmanaged::Unmanaged;

use crate::access::Access;
use crate::db::models::{ApplicationKind, Instance, Version};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// Applies a version of the software to a live instance
pub trait Application {
    fn kind(&self) -> ApplicationKind;

    /// File in the web root that serves every request
    fn front_controller(&self) -> &str {
        "index.php"
    }

    /// Move the live installation to `version`
    ///
    /// `source_tree` holds the clean extraction of `version`. Returns the
    /// revision installed, when the application can tell.
    fn update(
        &self,
        access: &dyn Access,
        instance: &Instance,
        version: &Version,
        source_tree: &Path,
    ) -> Result<Option<String>>;
}

pub type ApplicationFactory = fn() -> Box<dyn Application>;

/// Application kind -> implementation
pub struct ApplicationRegistry {
    factories: HashMap<ApplicationKind, ApplicationFactory>,
}

fn static_site() -> Box<dyn Application> {
    Box::new(StaticSite)
}

fn unmanaged() -> Box<dyn Application> {
    Box::new(Unmanaged)
}

impl ApplicationRegistry {
    pub fn new() -> Self {
        let mut factories: HashMap<ApplicationKind, ApplicationFactory> = HashMap::new();
        factories.insert(ApplicationKind::Static, static_site);
        factories.insert(ApplicationKind::Unmanaged, unmanaged);
        Self { factories }
    }

    pub fn register(&mut self, kind: ApplicationKind, factory: ApplicationFactory) {
        self.factories.insert(kind, factory);
    }

    pub fn get(&self, kind: ApplicationKind) -> Result<Box<dyn Application>> {
        self.factories
            .get(&kind)
            .map(|factory| factory())
            .ok_or_else(|| Error::Unsupported(format!("no application registered for {kind}")))
    }
}

impl Default for ApplicationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
