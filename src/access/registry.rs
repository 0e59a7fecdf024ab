// src/access/registry.rs

//! Access kind -> backend factory

use super::command::{ProcessRunner, SystemRunner};
use super::{Access, ftp, local, ssh};
use crate::config::TransportConfig;
use crate::db::models::{AccessKind, Instance};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared inputs every backend factory receives
#[derive(Clone)]
pub struct AccessContext {
    pub transport: TransportConfig,
    pub runner: Arc<dyn ProcessRunner>,
    /// Local directory for files in transit
    pub staging_dir: PathBuf,
}

impl AccessContext {
    pub fn new(transport: TransportConfig, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            runner: Arc::new(SystemRunner),
            staging_dir: staging_dir.into(),
        }
    }
}

pub type AccessFactory = fn(&Instance, &AccessContext) -> Result<Box<dyn Access>>;

/// Backend factories keyed by access kind
pub struct AccessRegistry {
    factories: HashMap<AccessKind, AccessFactory>,
}

impl AccessRegistry {
    /// A registry with no backends
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with the local, ssh and ftp backends
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(AccessKind::Local, local::open);
        registry.register(AccessKind::Ssh, ssh::open);
        registry.register(AccessKind::Ftp, ftp::open);
        registry
    }

    /// Add or replace the factory for `kind`
    pub fn register(&mut self, kind: AccessKind, factory: AccessFactory) {
        self.factories.insert(kind, factory);
    }

    pub fn supports(&self, kind: AccessKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Build the backend for an instance
    pub fn open(&self, instance: &Instance, context: &AccessContext) -> Result<Box<dyn Access>> {
        let factory = self.factories.get(&instance.access_kind).ok_or_else(|| {
            Error::Unsupported(format!("no backend registered for {} access", instance.access_kind))
        })?;
        factory(instance, context)
    }
}

impl Default for AccessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ApplicationKind;

    fn local_instance() -> Instance {
        Instance::new(
            "local".to_string(),
            "/srv/www".to_string(),
            ApplicationKind::Static,
            AccessKind::Local,
        )
    }

    #[test]
    fn test_default_registry_has_every_kind() {
        let registry = AccessRegistry::new();
        for kind in AccessKind::ALL {
            assert!(registry.supports(kind));
        }
    }

    #[test]
    fn test_open_local() {
        let context = AccessContext::new(TransportConfig::default(), std::env::temp_dir());
        let access = AccessRegistry::new().open(&local_instance(), &context).unwrap();
        assert_eq!(access.kind(), AccessKind::Local);
    }

    #[test]
    fn test_unregistered_kind() {
        let context = AccessContext::new(TransportConfig::default(), std::env::temp_dir());
        let result = AccessRegistry::empty().open(&local_instance(), &context);
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_ssh_requires_host() {
        let mut context = AccessContext::new(TransportConfig::default(), std::env::temp_dir());
        // Point at programs that always exist so only the missing host fails
        context.transport.ssh = "sh".to_string();
        context.transport.rsync = "sh".to_string();

        let mut instance = local_instance();
        instance.access_kind = AccessKind::Ssh;
        let result = AccessRegistry::new().open(&instance, &context);
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}
