//! Directory watchers: the producers of the change queue.
//!
//! Each watched directory gets its own task holding a `notify` watcher. The
//! watcher callback runs on notify's thread and forwards finished files with
//! a blocking send, so a full queue stalls event delivery instead of
//! dropping paths.

use anyhow::{Context, Result};
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use templog_core::ChangeNotifier;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Watch `dir` until shutdown, forwarding changed files to `notifier`.
///
/// With `scan_existing`, regular files already in `dir` are queued in name
/// order once the watch is in place.
pub async fn watch_directory(
    dir: PathBuf,
    notifier: ChangeNotifier,
    mut shutdown: broadcast::Receiver<()>,
    scan_existing: bool,
) -> Result<()> {
    let callback_notifier = notifier.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for path in finished_files(&event) {
                debug!("Change detected: {}", path.display());
                if callback_notifier.blocking_notify_changed(path).is_err() {
                    break;
                }
            }
        }
        Err(e) => warn!("Watch error: {}", e),
    })
    .context("failed to create file watcher")?;

    watcher
        .watch(&dir, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch {}", dir.display()))?;
    info!("Watching {}", dir.display());

    // Scan after the watch is live so nothing finished in between is missed.
    if scan_existing {
        let files = existing_files(&dir).await?;
        info!("Queueing {} existing file(s) in {}", files.len(), dir.display());
        for path in files {
            notifier.notify_changed(path).await?;
        }
    }

    // Any outcome, including a dropped sender, ends the watch.
    let _ = shutdown.recv().await;

    drop(watcher);
    info!("Stopped watching {}", dir.display());
    Ok(())
}

/// Paths of files that were written and closed, or moved into place.
fn finished_files(event: &Event) -> Vec<PathBuf> {
    let paths: &[PathBuf] = match event.kind {
        EventKind::Create(CreateKind::File)
        | EventKind::Access(AccessKind::Close(AccessMode::Write))
        | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => &event.paths,
        // Paths are [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().map(std::slice::from_ref).unwrap_or_default()
        }
        _ => &[],
    };

    paths.iter().filter(|p| p.is_file()).cloned().collect()
}

/// Regular files directly inside `dir`, sorted by name.
async fn existing_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read {}", dir.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use templog_core::change_queue;

    fn event(kind: EventKind, paths: Vec<PathBuf>) -> Event {
        let mut event = Event::new(kind);
        event.paths = paths;
        event
    }

    #[test]
    fn test_finished_files_filters_event_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tempLogger-20240114.log");
        std::fs::write(&file, "").unwrap();

        let closed = event(EventKind::Access(AccessKind::Close(AccessMode::Write)), vec![file.clone()]);
        assert_eq!(finished_files(&closed), vec![file.clone()]);

        let moved = event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), vec![file.clone()]);
        assert_eq!(finished_files(&moved), vec![file.clone()]);

        let renamed = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            vec![dir.path().join("tmp.part"), file.clone()],
        );
        assert_eq!(finished_files(&renamed), vec![file.clone()]);

        let opened = event(EventKind::Access(AccessKind::Open(AccessMode::Any)), vec![file.clone()]);
        assert!(finished_files(&opened).is_empty());

        let directory = event(EventKind::Create(CreateKind::File), vec![dir.path().to_path_buf()]);
        assert!(finished_files(&directory).is_empty());
    }

    #[tokio::test]
    async fn test_existing_files_are_queued_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.log", "a.log", "c.log"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let (notifier, mut queue) = change_queue(10);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task =
            tokio::spawn(watch_directory(dir.path().to_path_buf(), notifier, shutdown_rx, true));

        let mut names = Vec::new();
        for _ in 0..3 {
            let path = tokio::time::timeout(Duration::from_secs(5), queue.recv())
                .await
                .unwrap()
                .unwrap();
            names.push(path.file_name().unwrap().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["a.log", "b.log", "c.log"]);

        // The watch is already live once the scan has been queued.
        let fresh = dir.path().join("d.log");
        std::fs::write(&fresh, "{}").unwrap();
        let seen = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(path) = queue.recv().await {
                if path == fresh {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(seen);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (notifier, _queue) = change_queue(1);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let result =
            watch_directory(dir.path().join("absent"), notifier, shutdown_rx, false).await;
        assert!(result.is_err());
    }
}
