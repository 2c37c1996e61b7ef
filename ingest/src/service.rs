//! The long-running event loop.
//!
//! One task owns the watch source and consumes its event and error streams
//! in order. Candidate files are handed to the [`IngestCoordinator`]; a
//! change to the configuration file reloads it and reconciles the watches.

use std::sync::Arc;

use logbridge_directory_watcher::{
    DirectoryWatcher, FileEvent, ReconcileReport, WatchSource, WatchStreams, WatcherError,
    matches_suffix, reconcile, scan_candidates,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigStore};
use crate::coordinator::IngestCoordinator;
use crate::error::Result;
use crate::lifecycle::FileOutcome;
use crate::logging::LoggingHandle;

/// File name suffix of event-log exports.
pub const CANDIDATE_SUFFIX: &str = ".xml";

/// What the service did with one filesystem event.
#[derive(Debug)]
pub enum EventOutcome {
    /// Not a write/create, or not a candidate file.
    Ignored,

    /// A worker already owns the path.
    Duplicate,

    /// A worker was started.
    Spawned(JoinHandle<FileOutcome>),

    /// The configuration was reloaded and the watches reconciled.
    Reloaded(ReconcileReport),

    /// The configuration could not be reloaded; the previous one stays.
    ReloadFailed,

    /// No project claims the path.
    Unassigned,
}

/// Watches the configured directories and feeds the coordinator.
pub struct IngestService<W: WatchSource = DirectoryWatcher> {
    store: ConfigStore,
    coordinator: IngestCoordinator,
    watcher: W,
    streams: WatchStreams,
    logging: Option<Arc<LoggingHandle>>,
}

impl<W: WatchSource> IngestService<W> {
    /// Create a service over `watcher` and the streams it feeds.
    pub fn new(
        store: ConfigStore,
        coordinator: IngestCoordinator,
        watcher: W,
        streams: WatchStreams,
    ) -> Self {
        Self {
            store,
            coordinator,
            watcher,
            streams,
            logging: None,
        }
    }

    /// Re-apply the configured log level on every reload.
    pub fn with_logging(mut self, logging: Arc<LoggingHandle>) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Bring the watch subscriptions in line with the current configuration.
    ///
    /// The configuration read lock is held for the whole reconciliation.
    pub async fn reconcile_watches(&mut self) -> ReconcileReport {
        let config = self.store.read().await;
        let desired = config.desired_watch_set(self.store.path());
        let report = reconcile(&mut self.watcher, &desired);
        if !report.failed.is_empty() {
            warn!(failed = report.failed.len(), "Some paths could not be watched");
        }
        report
    }

    /// React to one filesystem event.
    pub async fn handle_event(&mut self, event: FileEvent) -> EventOutcome {
        if !event.is_write_or_create() {
            return EventOutcome::Ignored;
        }

        if event.path == self.store.path() {
            return self.reload().await;
        }

        if !matches_suffix(&event.path, CANDIDATE_SUFFIX) {
            return EventOutcome::Ignored;
        }

        let Some(project) = self.store.snapshot().await.project_for(&event.path) else {
            debug!(file = %event.path.display(), "No project for file, skipping");
            return EventOutcome::Unassigned;
        };

        match self.coordinator.on_candidate(event.path, project) {
            Some(worker) => EventOutcome::Spawned(worker),
            None => EventOutcome::Duplicate,
        }
    }

    async fn reload(&mut self) -> EventOutcome {
        info!("Configuration file changed, reloading");
        let config = match self.store.reload().await {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "Failed to reload configuration");
                return EventOutcome::ReloadFailed;
            }
        };

        if let Some(logging) = &self.logging {
            if let Err(e) = logging.set_level(&config.log_level) {
                error!(error = %e, "Failed to apply log level");
            }
        }

        EventOutcome::Reloaded(self.reconcile_watches().await)
    }

    /// Reconcile, start the initial scan, then consume events.
    ///
    /// Returns only if the watcher's streams close, which is reported as
    /// [`WatcherError::StreamClosed`].
    pub async fn run(mut self) -> Result<()> {
        self.reconcile_watches().await;

        let config = self.store.snapshot().await;
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            let workers = scan_and_dispatch(&config, &coordinator).await;
            info!(files = workers.len(), "Initial scan dispatched");
        });

        loop {
            // Pending watcher errors are logged before the next event.
            let event = tokio::select! {
                biased;
                err = self.streams.errors.recv() => match err {
                    Some(err) => {
                        error!(error = %err, "Watcher error");
                        continue;
                    }
                    None => {
                        error!("Watcher error stream closed, stopping");
                        return Err(WatcherError::StreamClosed.into());
                    }
                },
                event = self.streams.events.recv() => match event {
                    Some(event) => event,
                    None => {
                        error!("Watcher event stream closed, stopping");
                        return Err(WatcherError::StreamClosed.into());
                    }
                },
            };

            self.handle_event(event).await;
        }
    }
}

/// Walk every enabled directory of every project and dispatch the files
/// found there under that project.
///
/// Directories that cannot be scanned are logged and skipped.
pub async fn scan_and_dispatch(
    config: &Config,
    coordinator: &IngestCoordinator,
) -> Vec<JoinHandle<FileOutcome>> {
    let mut workers = Vec::new();
    for project in &config.projects {
        let context = project.context(&config.output_dir);
        for dir in project.enabled_dirs() {
            let root = dir.to_path_buf();
            let scanned =
                tokio::task::spawn_blocking(move || scan_candidates(&root, CANDIDATE_SUFFIX))
                    .await;

            let candidates = match scanned {
                Ok(Ok(candidates)) => candidates,
                Ok(Err(e)) => {
                    error!(path = %dir.display(), error = %e, "Error during initial scan");
                    continue;
                }
                Err(e) => {
                    error!(path = %dir.display(), error = %e, "Initial scan task failed");
                    continue;
                }
            };

            for path in candidates {
                workers.extend(coordinator.on_candidate(path, context.clone()));
            }
        }
    }
    workers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::JsonLinesSink;
    use crate::source::{RecordSource, XmlRecordSource};
    use async_trait::async_trait;
    use crate::error::IngestError;
    use logbridge_directory_watcher::FileEventKind;
    use logbridge_event_log::{EventRecord, ParseError};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tracing_test::traced_test;

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<EventLog xmlns="http://v8.1c.ru/eventLog">
  <Event><Level>Information</Level><Date>1</Date></Event>
  <Event><Level>Error</Level><Date>2</Date></Event>
</EventLog>"#;

    /// Keeps its subscriptions in memory.
    #[derive(Debug, Default)]
    struct FakeWatches {
        paths: BTreeSet<PathBuf>,
        calls: usize,
    }

    impl WatchSource for FakeWatches {
        fn watch(&mut self, path: &Path) -> logbridge_directory_watcher::Result<()> {
            self.calls += 1;
            self.paths.insert(path.to_path_buf());
            Ok(())
        }

        fn unwatch(&mut self, path: &Path) -> logbridge_directory_watcher::Result<()> {
            self.calls += 1;
            self.paths.remove(path);
            Ok(())
        }

        fn watched(&self) -> Vec<PathBuf> {
            self.paths.iter().cloned().collect()
        }
    }

    /// Never finishes parsing.
    struct StuckSource;

    #[async_trait]
    impl RecordSource for StuckSource {
        async fn parse(&self, _path: &Path) -> std::result::Result<Vec<EventRecord>, ParseError> {
            std::future::pending().await
        }
    }

    struct Harness {
        dir: TempDir,
        config_path: PathBuf,
        events: mpsc::Sender<FileEvent>,
        errors: mpsc::Sender<WatcherError>,
        service: IngestService<FakeWatches>,
    }

    fn config_json(dirs: &[(&str, bool)]) -> String {
        let log_dirs: Vec<String> = dirs
            .iter()
            .map(|(path, enabled)| format!(r#"{{ "path": "{path}", "enabled": {enabled} }}"#))
            .collect();
        format!(
            r#"{{
                "log_level": "info",
                "app_log_dir": "logs",
                "output_dir": "out",
                "projects": [{{ "name": "erp", "delete_processed": false, "log_dirs": [{}] }}]
            }}"#,
            log_dirs.join(",")
        )
    }

    fn harness(dirs: &[(&str, bool)], source: Arc<dyn RecordSource>) -> Harness {
        let dir = TempDir::new().unwrap();
        for (name, _) in dirs {
            std::fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, config_json(dirs)).unwrap();

        let store = ConfigStore::load(&config_path).unwrap();
        let coordinator = IngestCoordinator::new(source, Arc::new(JsonLinesSink::new()));
        let (events, events_rx) = mpsc::channel(16);
        let (errors, errors_rx) = mpsc::channel(16);
        let streams = WatchStreams {
            events: events_rx,
            errors: errors_rx,
        };

        Harness {
            service: IngestService::new(store, coordinator, FakeWatches::default(), streams),
            dir,
            config_path,
            events,
            errors,
        }
    }

    fn modified(path: impl Into<PathBuf>) -> FileEvent {
        FileEvent::new(FileEventKind::Modified, path)
    }

    #[tokio::test]
    async fn test_reconcile_watches_config_and_enabled_dirs() {
        let mut h = harness(&[("a", true), ("b", false)], Arc::new(XmlRecordSource));

        let report = h.service.reconcile_watches().await;

        let expected: BTreeSet<PathBuf> = [h.config_path.clone(), h.dir.path().join("a")]
            .into_iter()
            .collect();
        assert_eq!(h.service.watcher.paths, expected);
        assert_eq!(report.added.len(), 2);

        let calls = h.service.watcher.calls;
        assert!(h.service.reconcile_watches().await.is_noop());
        assert_eq!(h.service.watcher.calls, calls);
    }

    #[tokio::test]
    async fn test_config_change_reloads_and_reconciles() {
        let mut h = harness(&[("a", true), ("b", true)], Arc::new(XmlRecordSource));
        h.service.reconcile_watches().await;

        std::fs::create_dir_all(h.dir.path().join("c")).unwrap();
        std::fs::write(&h.config_path, config_json(&[("b", true), ("c", true)])).unwrap();

        let outcome = h.service.handle_event(modified(&h.config_path)).await;
        let EventOutcome::Reloaded(report) = outcome else {
            panic!("expected a reload");
        };
        assert_eq!(report.added, vec![h.dir.path().join("c")]);
        assert_eq!(report.removed, vec![h.dir.path().join("a")]);

        let snapshot = h.service.store.snapshot().await;
        assert_eq!(snapshot.projects[0].log_dirs.len(), 2);
        assert!(h.service.watcher.paths.contains(&h.config_path));
    }

    #[tokio::test]
    async fn test_invalid_config_keeps_previous_snapshot() {
        let mut h = harness(&[("a", true)], Arc::new(XmlRecordSource));
        h.service.reconcile_watches().await;
        let before = h.service.store.snapshot().await;

        std::fs::write(&h.config_path, "{ not json").unwrap();
        let outcome = h.service.handle_event(modified(&h.config_path)).await;

        assert!(matches!(outcome, EventOutcome::ReloadFailed));
        assert_eq!(h.service.store.snapshot().await, before);
        assert!(h.service.watcher.paths.contains(&h.dir.path().join("a")));
    }

    #[tokio::test]
    async fn test_irrelevant_events_are_ignored() {
        let mut h = harness(&[("a", true)], Arc::new(XmlRecordSource));
        let dir_a = h.dir.path().join("a");

        let deleted = FileEvent::new(FileEventKind::Removed, dir_a.join("x.xml"));
        assert!(matches!(
            h.service.handle_event(deleted).await,
            EventOutcome::Ignored
        ));

        let archive = modified(dir_a.join("x.xml.bak"));
        assert!(matches!(
            h.service.handle_event(archive).await,
            EventOutcome::Ignored
        ));

        let upper = modified(dir_a.join("x.XML"));
        assert!(matches!(
            h.service.handle_event(upper).await,
            EventOutcome::Ignored
        ));
    }

    #[tokio::test]
    async fn test_file_outside_projects_is_unassigned() {
        let mut h = harness(&[("a", true)], Arc::new(XmlRecordSource));
        let outcome = h
            .service
            .handle_event(modified(h.dir.path().join("elsewhere").join("x.xml")))
            .await;
        assert!(matches!(outcome, EventOutcome::Unassigned));
    }

    #[tokio::test]
    async fn test_candidate_is_processed() {
        let mut h = harness(&[("a", true)], Arc::new(XmlRecordSource));
        let file = h.dir.path().join("a").join("2024-05-01.xml");
        std::fs::write(&file, EXPORT).unwrap();

        let event = FileEvent::new(FileEventKind::RenamedTo, &file);
        let EventOutcome::Spawned(worker) = h.service.handle_event(event).await else {
            panic!("expected a worker");
        };
        assert_eq!(worker.await.unwrap(), FileOutcome::Archived);

        let output = std::fs::read_to_string(h.dir.path().join("out").join("erp.json")).unwrap();
        assert_eq!(output.lines().count(), 2);
        assert!(h.dir.path().join("a").join("2024-05-01.xml.bak").exists());
    }

    #[tokio::test]
    async fn test_repeated_event_is_duplicate_while_in_flight() {
        let mut h = harness(&[("a", true)], Arc::new(StuckSource));
        let file = h.dir.path().join("a").join("x.xml");

        let EventOutcome::Spawned(worker) = h.service.handle_event(modified(&file)).await else {
            panic!("expected a worker");
        };
        assert!(matches!(
            h.service.handle_event(modified(&file)).await,
            EventOutcome::Duplicate
        ));
        worker.abort();
    }

    #[tokio::test]
    async fn test_scan_dispatches_enabled_dirs_only() {
        let h = harness(&[("a", true), ("b", false)], Arc::new(XmlRecordSource));
        let nested = h.dir.path().join("a").join("2024");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(h.dir.path().join("a").join("1.xml"), EXPORT).unwrap();
        std::fs::write(nested.join("2.xml"), EXPORT).unwrap();
        std::fs::write(h.dir.path().join("a").join("notes.txt"), "").unwrap();
        std::fs::write(h.dir.path().join("b").join("3.xml"), EXPORT).unwrap();

        let config = h.service.store.snapshot().await;
        let workers = scan_and_dispatch(&config, &h.service.coordinator).await;
        assert_eq!(workers.len(), 2);
        for worker in workers {
            assert_eq!(worker.await.unwrap(), FileOutcome::Archived);
        }

        let output = std::fs::read_to_string(h.dir.path().join("out").join("erp.json")).unwrap();
        assert_eq!(output.lines().count(), 4);
        assert!(h.dir.path().join("b").join("3.xml").exists());
    }

    #[tokio::test]
    async fn test_scan_skips_missing_directory() {
        let h = harness(&[("a", true)], Arc::new(XmlRecordSource));
        std::fs::remove_dir(h.dir.path().join("a")).unwrap();

        let config = h.service.store.snapshot().await;
        let workers = scan_and_dispatch(&config, &h.service.coordinator).await;
        assert!(workers.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_run_processes_events_then_fails_when_streams_close() {
        let h = harness(&[("a", true)], Arc::new(XmlRecordSource));
        let file = h.dir.path().join("a").join("late.xml");
        std::fs::write(&file, EXPORT).unwrap();

        h.errors
            .send(WatcherError::NotWatching("gone".to_string()))
            .await
            .unwrap();
        h.events.send(modified(&file)).await.unwrap();
        drop(h.events);

        let result = h.service.run().await;
        assert!(matches!(
            result,
            Err(IngestError::Watcher(WatcherError::StreamClosed))
        ));
        assert!(logs_contain("Watcher error"));

        let archived = file.with_file_name("late.xml.bak");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !archived.exists() {
            assert!(tokio::time::Instant::now() < deadline, "file was not archived");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        drop(h.errors);
    }
}
