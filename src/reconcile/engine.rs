// src/reconcile/engine.rs

//! Update orchestration around the pure reconciliation

use super::{ConflictSet, reconcile};
use crate::access::Access;
use crate::application::Application;
use crate::checksum::{ChecksumDiff, ChecksumMap, ChecksumStore, HashOptions, diff};
use crate::db::models::{ChecksumEntry, Instance, VcsKind, Version, VersionAction};
use crate::error::{Error, Result};
use crate::maintenance;
use crate::source::SourceProvider;
use rusqlite::Connection;
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::{error, info, warn};

/// What to move an instance to
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub action: VersionAction,
    pub vcs: VcsKind,
    pub branch: String,
    pub revision: Option<String>,
    /// Put the site in maintenance mode while the application runs
    pub lock_site: bool,
}

impl UpdateRequest {
    pub fn new(action: VersionAction, vcs: VcsKind, branch: impl Into<String>) -> Self {
        Self {
            action,
            vcs,
            branch: branch.into(),
            revision: None,
            lock_site: false,
        }
    }
}

/// Result of a completed update
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// The version created for this update
    pub version: Version,
    /// Paths folded into the new baseline
    pub accepted: ChecksumMap,
    /// Differences an operator has to resolve
    pub conflicts: ConflictSet,
}

/// Runs updates, verifications and adoptions against one database
pub struct Updater<'a> {
    conn: &'a Connection,
    store: ChecksumStore<'a>,
}

impl<'a> Updater<'a> {
    pub fn new(conn: &'a Connection, options: HashOptions, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            conn,
            store: ChecksumStore::new(conn, options, work_dir),
        }
    }

    pub fn store(&self) -> &ChecksumStore<'a> {
        &self.store
    }

    fn current_version(&self, instance: &Instance) -> Result<Version> {
        instance.latest_version(self.conn)?.ok_or_else(|| {
            Error::NotFound(format!(
                "no recorded version for instance {}; adopt it first",
                instance.name
            ))
        })
    }

    /// Extract the clean tree, then store the version row and its baseline together
    ///
    /// Nothing is written when the source cannot produce the tree, so a bad
    /// branch never becomes the instance's current version.
    fn record_version(
        &self,
        instance: &Instance,
        request: &UpdateRequest,
        action: VersionAction,
        source: &dyn SourceProvider,
    ) -> Result<(Version, TempDir, ChecksumMap)> {
        let mut version = Version::new(instance.require_id()?, request.vcs, request.branch.clone(), action);
        version.revision = request.revision.clone();
        version.hash_algorithm = self.store.algorithm();

        let clean = self.store.extract_clean(&version, source)?;

        let tx = self.conn.unchecked_transaction()?;
        version.insert(&tx)?;
        let baseline = self.store.record_baseline(&version, clean.path())?;
        tx.commit()?;

        Ok((version, clean, baseline))
    }

    /// Move `instance` to a new version and reconcile the result
    ///
    /// The new version is recorded before anything on the host changes. A
    /// failing application leaves the site as it is (still locked, when it
    /// was locked) and returns `MutationError`; nothing is rolled back.
    pub fn update(
        &self,
        instance: &Instance,
        access: &mut dyn Access,
        application: &dyn Application,
        source: &dyn SourceProvider,
        request: &UpdateRequest,
    ) -> Result<UpdateOutcome> {
        if !matches!(request.action, VersionAction::Update | VersionAction::Upgrade) {
            return Err(Error::Unsupported(format!(
                "{} is not an update action",
                request.action
            )));
        }

        let handshake = access.connect()?;
        info!(
            "Updating {} to {} {} over {} ({} auth)",
            instance.name,
            request.vcs,
            request.branch,
            access.kind(),
            handshake.auth
        );

        let current = self.current_version(instance)?;
        let b_old = self.store.baseline(current.require_id()?)?;
        let l_old = self
            .store
            .capture_live(instance, &*access, current.hash_algorithm)?;

        let (mut version, clean, b_new) = self.record_version(instance, request, request.action, source)?;
        let version_id = version.require_id()?;

        let front = application.front_controller();
        let locked_here = if request.lock_site {
            maintenance::lock(&*access, instance, front)?
        } else {
            false
        };

        let revision = application
            .update(&*access, instance, &version, clean.path())
            .map_err(|e| {
                error!(
                    "Application update of {} failed; version {} recorded, site left as is{}",
                    instance.name,
                    version_id,
                    if locked_here { " and locked" } else { "" }
                );
                Error::MutationError {
                    step: format!("{} update", application.kind()),
                    message: e.to_string(),
                }
            })?;
        drop(clean);

        if let Some(revision) = revision.as_deref() {
            version.backfill(self.conn, Some(revision), None)?;
        }

        if locked_here {
            maintenance::unlock(&*access, instance, front)?;
        }
        let l_new = self
            .store
            .capture_live(instance, &*access, version.hash_algorithm)?;

        let result = reconcile(&b_old, &l_old, &b_new, &l_new);

        let tx = self.conn.unchecked_transaction()?;
        for (path, hash) in &result.accepted {
            ChecksumEntry::upsert(&tx, version_id, path, hash)?;
        }
        tx.commit()?;

        if result.conflicts.is_empty() {
            info!(
                "Updated {}: {} differences accepted, no conflicts",
                instance.name,
                result.accepted.len()
            );
        } else {
            warn!(
                "Updated {}: {} differences accepted, {} conflicts to review",
                instance.name,
                result.accepted.len(),
                result.conflicts.len()
            );
        }

        Ok(UpdateOutcome {
            version,
            accepted: result.accepted,
            conflicts: result.conflicts,
        })
    }

    /// Compare the live tree against the current baseline
    pub fn verify(&self, instance: &Instance, access: &mut dyn Access) -> Result<ChecksumDiff> {
        access.connect()?;
        let current = self.current_version(instance)?;
        let baseline = self.store.baseline(current.require_id()?)?;
        let live = self
            .store
            .capture_live(instance, &*access, current.hash_algorithm)?;
        Ok(diff(&baseline, &live))
    }

    /// Record the first version of an already-deployed instance
    ///
    /// The baseline comes from the clean source; the host is only contacted
    /// to prove it is reachable.
    pub fn adopt(
        &self,
        instance: &Instance,
        access: &mut dyn Access,
        source: &dyn SourceProvider,
        request: &UpdateRequest,
    ) -> Result<Version> {
        access.connect()?;

        let (version, _clean, baseline) = self.record_version(instance, request, VersionAction::Create, source)?;
        info!(
            "Adopted {} at {} {} with {} baseline files",
            instance.name,
            version.vcs,
            version.branch,
            baseline.len()
        );
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::local::LocalAccess;
    use crate::application::{StaticSite, Unmanaged};
    use crate::db;
    use crate::db::models::{AccessKind, ApplicationKind};
    use crate::source::DirectorySource;
    use std::fs;
    use std::path::Path;

    struct Failing;

    impl Application for Failing {
        fn kind(&self) -> ApplicationKind {
            ApplicationKind::Static
        }

        fn front_controller(&self) -> &str {
            "index.html"
        }

        fn update(&self, _: &dyn Access, _: &Instance, _: &Version, _: &Path) -> Result<Option<String>> {
            Err(Error::CommandFailed {
                program: "deploy".to_string(),
                code: 1,
                stderr: "disk full".to_string(),
            })
        }
    }

    fn instance(conn: &Connection, root: &Path) -> Instance {
        let mut instance = Instance::new(
            "site".to_string(),
            root.to_string_lossy().to_string(),
            ApplicationKind::Static,
            AccessKind::Local,
        );
        instance.insert(conn).unwrap();
        instance
    }

    fn write(root: &Path, path: &str, content: &str) {
        let target = root.join(path);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, content).unwrap();
    }

    #[test]
    fn test_update_requires_adoption() {
        let conn = db::open_in_memory().unwrap();
        let work = tempfile::tempdir().unwrap();
        let web = tempfile::tempdir().unwrap();
        let releases = tempfile::tempdir().unwrap();
        let instance = instance(&conn, web.path());

        let updater = Updater::new(&conn, HashOptions::default(), work.path());
        let result = updater.update(
            &instance,
            &mut LocalAccess::new(),
            &StaticSite,
            &DirectorySource::new(releases.path()),
            &UpdateRequest::new(VersionAction::Update, VcsKind::Src, "2.0"),
        );
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_rejects_non_update_action() {
        let conn = db::open_in_memory().unwrap();
        let work = tempfile::tempdir().unwrap();
        let instance = instance(&conn, work.path());

        let updater = Updater::new(&conn, HashOptions::default(), work.path());
        let result = updater.update(
            &instance,
            &mut LocalAccess::new(),
            &Unmanaged,
            &DirectorySource::new(work.path()),
            &UpdateRequest::new(VersionAction::Restore, VcsKind::Src, "1.0"),
        );
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_failed_mutation_keeps_version_and_lock() {
        let conn = db::open_in_memory().unwrap();
        let work = tempfile::tempdir().unwrap();
        let web = tempfile::tempdir().unwrap();
        let releases = tempfile::tempdir().unwrap();
        write(releases.path(), "1.0/index.html", "v1");
        write(releases.path(), "2.0/index.html", "v2");
        write(web.path(), "index.html", "v1");

        let instance = instance(&conn, web.path());
        let updater = Updater::new(&conn, HashOptions::default(), work.path());
        let source = DirectorySource::new(releases.path());
        let mut access = LocalAccess::new();

        updater
            .adopt(&instance, &mut access, &source, &UpdateRequest::new(VersionAction::Create, VcsKind::Src, "1.0"))
            .unwrap();

        let mut request = UpdateRequest::new(VersionAction::Update, VcsKind::Src, "2.0");
        request.lock_site = true;
        let result = updater.update(&instance, &mut access, &Failing, &source, &request);

        match result {
            Err(Error::MutationError { message, .. }) => assert!(message.contains("disk full")),
            other => panic!("unexpected: {:?}", other.map(|o| o.version.id)),
        }

        let latest = instance.latest_version(&conn).unwrap().unwrap();
        assert_eq!(latest.branch, "2.0");
        assert_eq!(latest.action, VersionAction::Update);
        assert!(maintenance::is_locked(&access, &instance, "index.html").unwrap());
    }

    #[test]
    fn test_verify_reports_drift() {
        let conn = db::open_in_memory().unwrap();
        let work = tempfile::tempdir().unwrap();
        let web = tempfile::tempdir().unwrap();
        let releases = tempfile::tempdir().unwrap();
        write(releases.path(), "index.html", "v1");
        write(releases.path(), "about.html", "about");
        write(web.path(), "index.html", "v1");
        write(web.path(), "about.html", "edited");
        write(web.path(), "extra.html", "extra");

        let instance = instance(&conn, web.path());
        let updater = Updater::new(&conn, HashOptions::default(), work.path());
        let mut access = LocalAccess::new();
        updater
            .adopt(
                &instance,
                &mut access,
                &DirectorySource::new(releases.path()),
                &UpdateRequest::new(VersionAction::Create, VcsKind::Src, "1.0"),
            )
            .unwrap();

        let drift = updater.verify(&instance, &mut access).unwrap();
        assert_eq!(drift.modified.keys().collect::<Vec<_>>(), vec!["about.html"]);
        assert_eq!(drift.new.keys().collect::<Vec<_>>(), vec!["extra.html"]);
        assert!(drift.pristine.contains_key("index.html"));
    }

    #[test]
    fn test_failed_adopt_records_nothing() {
        let conn = db::open_in_memory().unwrap();
        let work = tempfile::tempdir().unwrap();
        let web = tempfile::tempdir().unwrap();
        let releases = tempfile::tempdir().unwrap();
        write(web.path(), "index.html", "v1");

        let instance = instance(&conn, web.path());
        let updater = Updater::new(&conn, HashOptions::default(), work.path());
        let mut access = LocalAccess::new();
        let request = UpdateRequest::new(VersionAction::Create, VcsKind::Src, "1.0");

        let result = updater.adopt(
            &instance,
            &mut access,
            &DirectorySource::new(releases.path().join("absent")),
            &request,
        );
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(instance.latest_version(&conn).unwrap().is_none());

        // Retrying with a usable source works
        write(releases.path(), "1.0/index.html", "v1");
        let version = updater
            .adopt(&instance, &mut access, &DirectorySource::new(releases.path()), &request)
            .unwrap();
        assert_eq!(version.checksum_map(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_update_to_missing_branch_changes_nothing() {
        let conn = db::open_in_memory().unwrap();
        let work = tempfile::tempdir().unwrap();
        let web = tempfile::tempdir().unwrap();
        let releases = tempfile::tempdir().unwrap();
        write(releases.path(), "1.0/index.html", "v1");
        write(releases.path(), "2.0/index.html", "v2");
        write(web.path(), "index.html", "v1");

        let instance = instance(&conn, web.path());
        let updater = Updater::new(&conn, HashOptions::default(), work.path());
        let source = DirectorySource::new(releases.path());
        let mut access = LocalAccess::new();
        let adopted = updater
            .adopt(&instance, &mut access, &source, &UpdateRequest::new(VersionAction::Create, VcsKind::Src, "1.0"))
            .unwrap();

        let result = updater.update(
            &instance,
            &mut access,
            &StaticSite,
            &source,
            &UpdateRequest::new(VersionAction::Update, VcsKind::Src, "2.1"),
        );
        assert!(matches!(result, Err(Error::NotFound(_))));

        let latest = instance.latest_version(&conn).unwrap().unwrap();
        assert_eq!(latest.id, adopted.id);
        let mut live: Vec<String> = fs::read_dir(web.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        live.sort();
        assert_eq!(live, vec!["index.html"]);
    }
}
