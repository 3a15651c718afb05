//! Turns decoded filesystem events into watch-set changes and patch calls.

use std::path::{Path, PathBuf};

use crate::command::CommandRunner;
use crate::patcher::{DisableOutcome, EnableOutcome, Patcher};
use crate::watch_set::{WatchBackend, WatchSet};

/// A decoded notification, carrying the absolute path it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Create(PathBuf),
    Delete(PathBuf),
    Modify(PathBuf),
}

impl FsEvent {
    pub fn path(&self) -> &Path {
        match self {
            FsEvent::Create(path) | FsEvent::Delete(path) | FsEvent::Modify(path) => path,
        }
    }
}

/// Owns the watch set and the patcher; every event goes through [`handle`].
///
/// [`handle`]: Dispatcher::handle
pub struct Dispatcher<B, R> {
    watches: WatchSet<B>,
    patcher: Patcher<R>,
    stopped: bool,
}

impl<B: WatchBackend, R: CommandRunner> Dispatcher<B, R> {
    pub fn new(watches: WatchSet<B>, patcher: Patcher<R>) -> Self {
        Self {
            watches,
            patcher,
            stopped: false,
        }
    }

    pub fn watches(&self) -> &WatchSet<B> {
        &self.watches
    }

    pub fn patcher(&self) -> &Patcher<R> {
        &self.patcher
    }

    /// Watch the existing part of the chain and instrument the target if it
    /// is already there.
    pub fn start(&mut self) -> EnableOutcome {
        self.watches.add_all();
        let target = self.watches.target().as_path().to_path_buf();
        self.patcher.enable(&target)
    }

    /// React to one event. Never fails; problems are logged where they occur.
    pub fn handle(&mut self, event: &FsEvent) {
        match event {
            FsEvent::Create(path) => self.on_create(path),
            FsEvent::Delete(path) => self.on_delete(path),
            FsEvent::Modify(path) => self.on_modify(path),
        }
    }

    fn on_create(&mut self, path: &Path) {
        tracing::info!(path = %path.display(), "create");
        let m = self.watches.target().match_prefix(path);
        if m.on_chain() {
            self.watches.add(path);
        }
        if self.watches.target().is_reached_by(m) {
            self.patcher.enable(path);
        }
    }

    fn on_delete(&mut self, path: &Path) {
        // A file renamed over `path` reports the old inode's removal after
        // the create for its replacement; the fresh watch must stay.
        if path.exists() {
            tracing::debug!(path = %path.display(), "remove of a path that still exists, ignored");
            return;
        }
        tracing::info!(path = %path.display(), "remove");
        self.watches.forget(path);
    }

    fn on_modify(&mut self, path: &Path) {
        tracing::info!(path = %path.display(), "modify");
        if path == self.watches.target().as_path() {
            self.patcher.enable(path);
        }
    }

    /// Remove every watch, stop the backend and strip the hook from the
    /// target. Runs at most once.
    pub fn shutdown(&mut self) -> Option<DisableOutcome> {
        if self.stopped {
            return None;
        }
        self.stopped = true;
        tracing::info!("tearing down watches");
        self.watches.remove_all();
        self.watches.backend_mut().stop();
        let target = self.watches.target().as_path().to_path_buf();
        Some(self.patcher.disable(&target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceController;
    use crate::patcher::HookDirective;
    use crate::test_support::{FakeBackend, RecordingRunner};
    use covwatch_core::{HookModule, ServiceName, TargetPath};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        runner: RecordingRunner,
        dispatcher: Dispatcher<FakeBackend, RecordingRunner>,
    }

    impl Fixture {
        /// Target `<tmp>/a/b/vdsm`, with `<tmp>/a/b` present on disk.
        fn new() -> Self {
            let dir = TempDir::new().expect("tempdir");
            fs::create_dir_all(dir.path().join("a/b")).expect("mkdir");
            let runner = RecordingRunner::default();
            let target = TargetPath::new(dir.path().join("a/b/vdsm")).expect("target");
            let patcher = Patcher::new(
                HookDirective::new(&HookModule::default(), "/etc/coveragerc"),
                ServiceController::new(
                    runner.clone(),
                    ServiceName::from("vdsmd"),
                    vec!["service".into(), "vdsmd".into(), "restart".into()],
                ),
            );
            let dispatcher = Dispatcher::new(WatchSet::new(target, FakeBackend::default()), patcher);
            Self {
                dir,
                runner,
                dispatcher,
            }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn target(&self) -> PathBuf {
            self.path("a/b/vdsm")
        }

        fn restarts(&self) -> usize {
            self.runner.calls().len()
        }
    }

    #[test]
    fn start_watches_existing_ancestors_only() {
        let mut fx = Fixture::new();
        assert_eq!(fx.dispatcher.start(), EnableOutcome::Absent);

        let watched = fx.dispatcher.watches().paths();
        assert!(watched.contains(&fx.path("a")));
        assert!(watched.contains(&fx.path("a/b")));
        assert!(!watched.contains(&fx.target()));
        assert_eq!(watched.last(), Some(&fx.path("a/b")));
        assert_eq!(fx.restarts(), 0);
    }

    #[test]
    fn create_of_target_adds_watch_and_enables_once() {
        let mut fx = Fixture::new();
        fx.dispatcher.start();
        fs::write(fx.target(), "#!/usr/bin/python\nimport sys\n").expect("write target");

        fx.dispatcher.handle(&FsEvent::Create(fx.target()));

        assert!(fx.dispatcher.watches().contains(&fx.target()));
        assert_eq!(fx.restarts(), 1);
        let content = fs::read_to_string(fx.target()).expect("read");
        assert_eq!(content.lines().filter(|l| l.contains("vdsmcodecoverage")).count(), 1);
    }

    #[test]
    fn create_off_chain_changes_nothing() {
        let mut fx = Fixture::new();
        fx.dispatcher.start();
        let before = fx.dispatcher.watches().paths();
        fs::create_dir(fx.path("a/x")).expect("mkdir sibling");
        fs::write(fx.path("a/b/other"), "#!/bin/sh\n").expect("write sibling");

        fx.dispatcher.handle(&FsEvent::Create(fx.path("a/x")));
        fx.dispatcher.handle(&FsEvent::Create(fx.path("a/b/other")));

        assert_eq!(fx.dispatcher.watches().paths(), before);
        assert_eq!(fx.restarts(), 0);
    }

    #[test]
    fn create_of_intermediate_directory_extends_the_chain() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir(dir.path().join("a")).expect("mkdir a");
        let runner = RecordingRunner::default();
        let target = TargetPath::new(dir.path().join("a/b/vdsm")).expect("target");
        let patcher = Patcher::new(
            HookDirective::new(&HookModule::default(), "/etc/coveragerc"),
            ServiceController::new(runner.clone(), ServiceName::from("vdsmd"), vec!["true".into()]),
        );
        let mut dispatcher = Dispatcher::new(WatchSet::new(target, FakeBackend::default()), patcher);
        dispatcher.start();
        assert!(!dispatcher.watches().contains(&dir.path().join("a/b")));

        fs::create_dir(dir.path().join("a/b")).expect("mkdir b");
        dispatcher.handle(&FsEvent::Create(dir.path().join("a/b")));

        assert!(dispatcher.watches().contains(&dir.path().join("a/b")));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn delete_drops_entry_and_repeated_delete_is_harmless() {
        let mut fx = Fixture::new();
        fx.dispatcher.start();
        let b = fx.path("a/b");
        assert!(fx.dispatcher.watches().contains(&b));

        fs::remove_dir(&b).expect("rmdir b");
        fx.dispatcher.handle(&FsEvent::Delete(b.clone()));
        let after_first = fx.dispatcher.watches().paths();
        fx.dispatcher.handle(&FsEvent::Delete(b.clone()));

        assert!(!after_first.contains(&b));
        assert!(after_first.contains(&fx.path("a")));
        assert_eq!(fx.dispatcher.watches().paths(), after_first);
        assert_eq!(fx.restarts(), 0);
    }

    #[test]
    fn late_delete_after_replace_keeps_the_new_watch() {
        let mut fx = Fixture::new();
        fs::write(fx.target(), "#!/usr/bin/python\n").expect("write target");
        fx.dispatcher.start();

        // Rename of a new file over the target: create arrives first, then
        // the removal of the old inode.
        let staged = fx.path("a/b/vdsm.new");
        fs::write(&staged, "#!/usr/bin/python\nimport sys\n").expect("stage");
        fs::rename(&staged, fx.target()).expect("rename over target");
        fx.dispatcher.handle(&FsEvent::Create(fx.target()));
        fx.dispatcher.handle(&FsEvent::Delete(fx.target()));

        assert!(fx.dispatcher.watches().contains(&fx.target()));
        assert_eq!(fx.restarts(), 2);

        // A later in-place rewrite is still picked up.
        fs::write(fx.target(), "#!/usr/bin/python\nimport os\n").expect("rewrite");
        fx.dispatcher.handle(&FsEvent::Modify(fx.target()));
        assert_eq!(fx.restarts(), 3);
        let content = fs::read_to_string(fx.target()).expect("read");
        assert_eq!(content.lines().filter(|l| l.contains("vdsmcodecoverage")).count(), 1);
    }

    #[test]
    fn modify_of_target_re_enables_idempotently() {
        let mut fx = Fixture::new();
        fs::write(fx.target(), "#!/usr/bin/python\n").expect("write target");
        assert_eq!(fx.dispatcher.start(), EnableOutcome::Inserted);

        fx.dispatcher.handle(&FsEvent::Modify(fx.target()));
        assert_eq!(fx.restarts(), 1, "unchanged file must not restart");

        // An upgrade overwrites the executable without the hook.
        fs::write(fx.target(), "#!/usr/bin/python\nimport sys\n").expect("rewrite target");
        fx.dispatcher.handle(&FsEvent::Modify(fx.target()));
        assert_eq!(fx.restarts(), 2);
    }

    #[test]
    fn modify_of_other_paths_is_ignored() {
        let mut fx = Fixture::new();
        fx.dispatcher.start();
        fs::write(fx.path("a/b/other"), "#!/usr/bin/python\n").expect("write");

        fx.dispatcher.handle(&FsEvent::Modify(fx.path("a/b/other")));
        fx.dispatcher.handle(&FsEvent::Modify(fx.path("a/b")));

        assert_eq!(fx.restarts(), 0);
        assert_eq!(
            fs::read_to_string(fx.path("a/b/other")).expect("read"),
            "#!/usr/bin/python\n"
        );
    }

    #[test]
    fn shutdown_tears_down_once_and_strips_hook() {
        let mut fx = Fixture::new();
        fs::write(fx.target(), "#!/usr/bin/python\n").expect("write target");
        fx.dispatcher.start();

        let outcome = fx.dispatcher.shutdown();
        assert_eq!(outcome, Some(DisableOutcome::Stripped { removed: 1 }));
        assert!(fx.dispatcher.watches().is_empty());
        assert!(fx.dispatcher.watches().backend().stopped);
        assert!(fx.dispatcher.watches().backend().live().is_empty());
        assert_eq!(fx.restarts(), 2);

        assert_eq!(fx.dispatcher.shutdown(), None);
        assert_eq!(fx.restarts(), 2);
        assert_eq!(
            fs::read_to_string(fx.target()).expect("read"),
            "#!/usr/bin/python\n"
        );
    }
}
