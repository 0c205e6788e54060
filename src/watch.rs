// Watch mode - rescan watched directories when the filesystem changes
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::error::{IndexError, Result};
use crate::library::{DirectoryRef, Library};
use crate::models::WatchedDirectory;
use crate::video::VideoBackend;

/// Watch every active directory and run a smart rescan on each one touched
/// by a burst of events. Returns when the event channel closes.
pub fn watch_library<B: VideoBackend>(library: &mut Library<B>, debounce: Duration) -> Result<()> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        },
        Config::default(),
    )
    .map_err(watch_error)?;

    let mut directories = library.active_directories()?;
    for dir in &directories {
        watcher
            .watch(&dir.directory_path, RecursiveMode::Recursive)
            .map_err(watch_error)?;
        info!("watching {}", dir.directory_path.display());
    }
    if directories.is_empty() {
        warn!("no active directories to watch");
        return Ok(());
    }

    while let Some(paths) = next_batch(&rx, debounce) {
        for id in affected_directories(&directories, &paths, library.output_root()) {
            match library.rescan_directory(&DirectoryRef::Id(id)) {
                Ok((_, summary)) => info!(?summary, "rescan after change"),
                Err(IndexError::NotADirectory(path)) => {
                    warn!("{} disappeared, no longer watching", path.display());
                    let _ = watcher.unwatch(&path);
                    directories.retain(|d| d.id != id);
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(())
}

/// Block for one relevant event, then keep collecting until the stream
/// has been quiet for `debounce`. None once the channel is closed.
fn next_batch(rx: &Receiver<notify::Result<Event>>, debounce: Duration) -> Option<Vec<PathBuf>> {
    let mut paths = Vec::new();

    while paths.is_empty() {
        collect(rx.recv().ok()?, &mut paths);
    }

    loop {
        match rx.recv_timeout(debounce) {
            Ok(res) => collect(res, &mut paths),
            Err(RecvTimeoutError::Timeout) => return Some(paths),
            Err(RecvTimeoutError::Disconnected) => return Some(paths),
        }
    }
}

fn collect(res: notify::Result<Event>, paths: &mut Vec<PathBuf>) {
    match res {
        Ok(event) if matches!(event.kind, EventKind::Access(_)) => {}
        Ok(event) => {
            debug!(kind = ?event.kind, "fs event {:?}", event.paths);
            paths.extend(event.paths);
        }
        Err(e) => warn!("watch error: {}", e),
    }
}

/// Ids of the watched directories containing any of the changed paths.
/// Changes under the output root never trigger a rescan.
pub fn affected_directories(directories: &[WatchedDirectory], paths: &[PathBuf], output_root: &Path) -> Vec<i64> {
    let mut ids = BTreeSet::new();
    for path in paths.iter().filter(|p| !p.starts_with(output_root)) {
        for dir in directories {
            if path.starts_with(&dir.directory_path) {
                ids.insert(dir.id);
            }
        }
    }
    ids.into_iter().collect()
}

fn watch_error(err: notify::Error) -> IndexError {
    match err.kind {
        notify::ErrorKind::Io(e) => IndexError::Io(e),
        kind => IndexError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            notify::Error::new(kind).set_paths(err.paths),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn dir(id: i64, path: &str) -> WatchedDirectory {
        WatchedDirectory {
            id,
            directory_path: PathBuf::from(path),
            last_scanned: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn changes_map_to_their_watched_directories() {
        let dirs = vec![dir(1, "/data/a"), dir(2, "/data/ab"), dir(3, "/media")];
        let paths = vec![
            PathBuf::from("/data/a/clip.mp4"),
            PathBuf::from("/data/a/sub/other.mkv"),
            PathBuf::from("/data/ab/new.mov"),
        ];

        assert_eq!(affected_directories(&dirs, &paths, Path::new("/out")), vec![1, 2]);
    }

    #[test]
    fn nested_watched_directories_are_both_rescanned() {
        let dirs = vec![dir(1, "/data"), dir(2, "/data/inner")];
        let paths = vec![PathBuf::from("/data/inner/clip.mp4")];

        assert_eq!(affected_directories(&dirs, &paths, Path::new("/out")), vec![1, 2]);
    }

    #[test]
    fn output_root_changes_are_ignored() {
        let dirs = vec![dir(1, "/data")];
        let paths = vec![PathBuf::from("/data/generated/data/clip_contact_1234abcd.jpg")];

        assert!(affected_directories(&dirs, &paths, Path::new("/data/generated")).is_empty());
    }

    #[test]
    fn batches_collect_until_quiet() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(Ok(Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/data/read.mp4"))))
            .unwrap();
        tx.send(Ok(Event::new(EventKind::Any).add_path(PathBuf::from("/data/a.mp4")))).unwrap();
        tx.send(Ok(Event::new(EventKind::Any).add_path(PathBuf::from("/data/b.mp4")))).unwrap();

        let batch = next_batch(&rx, Duration::from_millis(10)).unwrap();
        assert_eq!(batch, vec![PathBuf::from("/data/a.mp4"), PathBuf::from("/data/b.mp4")]);

        drop(tx);
        assert!(next_batch(&rx, Duration::from_millis(10)).is_none());
    }
}
