//! [`WatchBackend`] on top of the `notify` crate.
//!
//! `notify` reports every event kind for a watched path, so masks are
//! applied here when raw events are decoded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::dispatcher::FsEvent;
use crate::error::DaemonError;
use crate::watch_set::{WatchBackend, WatchId, WatchMask};

pub type RawEvents = mpsc::UnboundedReceiver<notify::Result<Event>>;

pub struct NotifyBackend {
    watcher: Option<RecommendedWatcher>,
    watches: HashMap<WatchId, PathBuf>,
    masks: HashMap<PathBuf, WatchMask>,
    next_id: u64,
}

impl NotifyBackend {
    /// Create the backend and the channel its events arrive on. The sending
    /// side lives on the `notify` thread and only forwards.
    pub fn new() -> Result<(Self, RawEvents), DaemonError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let watcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })?;
        Ok((
            Self {
                watcher: Some(watcher),
                watches: HashMap::new(),
                masks: HashMap::new(),
                next_id: 0,
            },
            event_rx,
        ))
    }

    /// Translate one raw `notify` event into the events our masks admit.
    pub fn decode(&self, event: Event) -> Vec<FsEvent> {
        classify(event)
            .into_iter()
            .filter(|fs_event| self.admits(fs_event))
            .collect()
    }

    fn admits(&self, event: &FsEvent) -> bool {
        let wants = |path: &Path, bit: WatchMask| {
            self.masks.get(path).is_some_and(|mask| mask.contains(bit))
        };
        match event {
            FsEvent::Create(path) => {
                path.parent().is_some_and(|dir| wants(dir, WatchMask::CREATE))
            }
            FsEvent::Delete(path) => {
                path.parent().is_some_and(|dir| wants(dir, WatchMask::DELETE))
                    || wants(path, WatchMask::DELETE)
            }
            FsEvent::Modify(path) => wants(path, WatchMask::MODIFY),
        }
    }
}

impl WatchBackend for NotifyBackend {
    fn subscribe(&mut self, path: &Path, mask: WatchMask) -> Result<WatchId, DaemonError> {
        let Some(watcher) = self.watcher.as_mut() else {
            return Err(DaemonError::Notify(notify::Error::generic(
                "notification source stopped",
            )));
        };
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        self.next_id += 1;
        let id = WatchId(self.next_id);
        self.watches.insert(id, path.to_path_buf());
        self.masks.insert(path.to_path_buf(), mask);
        Ok(id)
    }

    fn unsubscribe(&mut self, id: WatchId) -> Result<(), DaemonError> {
        let Some(path) = self.watches.remove(&id) else {
            return Err(DaemonError::Notify(notify::Error::watch_not_found()));
        };
        self.masks.remove(&path);
        match self.watcher.as_mut() {
            Some(watcher) => watcher.unwatch(&path).map_err(DaemonError::from),
            None => Ok(()),
        }
    }

    fn stop(&mut self) {
        self.watcher = None;
        self.watches.clear();
        self.masks.clear();
    }
}

/// Map `notify` event kinds onto create / delete / modify. Renames count as
/// a delete of the old name and a create of the new one.
fn classify(event: Event) -> Vec<FsEvent> {
    let Event { kind, paths, .. } = event;
    match kind {
        EventKind::Create(_) => paths.into_iter().map(FsEvent::Create).collect(),
        EventKind::Remove(_) => paths.into_iter().map(FsEvent::Delete).collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => paths.into_iter().map(FsEvent::Delete).collect(),
            RenameMode::To => paths.into_iter().map(FsEvent::Create).collect(),
            RenameMode::Both => {
                let mut paths = paths.into_iter();
                let mut events = Vec::with_capacity(2);
                if let Some(from) = paths.next() {
                    events.push(FsEvent::Delete(from));
                }
                if let Some(to) = paths.next() {
                    events.push(FsEvent::Create(to));
                }
                events
            }
            _ => paths
                .into_iter()
                .map(|path| {
                    if path.exists() {
                        FsEvent::Create(path)
                    } else {
                        FsEvent::Delete(path)
                    }
                })
                .collect(),
        },
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other) => {
            paths.into_iter().map(FsEvent::Modify).collect()
        }
        _ => Vec::new(),
    }
}
