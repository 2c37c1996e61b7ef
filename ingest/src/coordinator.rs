//! Per-file worker dispatch and lifecycle.
//!
//! Every candidate path gets at most one worker at a time. A worker parses
//! the file (with retries), ships the records to the sink, then archives
//! the file and optionally deletes it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::ProjectContext;
use crate::in_flight::InFlightSet;
use crate::lifecycle::{FileOutcome, archive_path};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::sink::Sink;
use crate::source::RecordSource;

/// Dispatches one worker task per newly discovered file.
#[derive(Clone)]
pub struct IngestCoordinator {
    /// Paths owned by a running worker.
    in_flight: InFlightSet,

    /// Parser for discovered files.
    source: Arc<dyn RecordSource>,

    /// Destination for parsed records.
    sink: Arc<dyn Sink>,

    /// Pause implementation used between parse attempts.
    sleeper: Arc<dyn Sleeper>,

    /// Parse retry policy.
    retry: RetryPolicy,
}

impl IngestCoordinator {
    /// Create a coordinator with the default retry policy.
    pub fn new(source: Arc<dyn RecordSource>, sink: Arc<dyn Sink>) -> Self {
        Self {
            in_flight: InFlightSet::new(),
            source,
            sink,
            sleeper: Arc::new(TokioSleeper),
            retry: RetryPolicy::default(),
        }
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the pause implementation.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Paths currently being processed.
    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Start a worker for `path` unless one is already running for it.
    ///
    /// Returns the worker's handle, or `None` if the path was already in
    /// flight and the candidate was dropped.
    pub fn on_candidate(
        &self,
        path: PathBuf,
        project: ProjectContext,
    ) -> Option<JoinHandle<FileOutcome>> {
        let Some(claim) = self.in_flight.try_claim(&path) else {
            debug!(file = %path.display(), "File is already being processed, skipping");
            return None;
        };

        let coordinator = self.clone();
        Some(tokio::spawn(async move {
            // Released on every exit path, panics included.
            let _claim = claim;
            coordinator.process_file(&path, &project).await
        }))
    }

    /// Run the whole lifecycle of one file in the current task.
    pub async fn process_file(&self, path: &Path, project: &ProjectContext) -> FileOutcome {
        let span = info_span!(
            "process_file",
            project = %project.name,
            file = %path.display()
        );
        self.run_lifecycle(path, project).instrument(span).await
    }

    async fn run_lifecycle(&self, path: &Path, project: &ProjectContext) -> FileOutcome {
        info!("Processing file");

        let parsed = self
            .retry
            .run(
                self.sleeper.as_ref(),
                |_attempt| self.source.parse(path),
                |attempt, err| warn!(attempt, error = %err, "Failed to parse file, retrying"),
            )
            .await;

        let records = match parsed {
            Ok(records) => records,
            Err(err) => {
                error!(
                    attempts = self.retry.max_attempts,
                    error = %err,
                    "Failed to parse file after multiple attempts"
                );
                return FileOutcome::ParseFailed;
            }
        };

        if records.is_empty() {
            info!("No events found in file");
        } else {
            match self
                .sink
                .append(&project.output_dir, &project.name, &records)
                .await
            {
                Ok(written) => info!(
                    events_count = records.len(),
                    written, "Finished processing file"
                ),
                Err(err) => {
                    error!(error = %err, "Failed to write events");
                    return FileOutcome::SinkFailed;
                }
            }
        }

        let archived = archive_path(path);
        if let Err(err) = tokio::fs::rename(path, &archived).await {
            error!(error = %err, "Failed to rename processed file");
            return FileOutcome::RenameFailed;
        }
        info!(to = %archived.display(), "Renamed processed file");

        if !project.delete_processed {
            return FileOutcome::Archived;
        }

        match tokio::fs::remove_file(&archived).await {
            Ok(()) => {
                info!("Deleted processed file");
                FileOutcome::Deleted
            }
            Err(err) => {
                error!(error = %err, "Failed to delete processed file");
                FileOutcome::DeleteFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::retry::tests::RecordingSleeper;
    use async_trait::async_trait;
    use logbridge_event_log::{EventRecord, ParseError};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;
    use tracing_test::traced_test;

    fn records(count: usize) -> Vec<EventRecord> {
        (1..=count)
            .map(|i| EventRecord {
                date: i.to_string(),
                ..Default::default()
            })
            .collect()
    }

    /// Fails a fixed number of times, then yields its records.
    struct FlakySource {
        failures: u32,
        calls: AtomicU32,
        records: Vec<EventRecord>,
    }

    impl FlakySource {
        fn new(failures: u32, records: Vec<EventRecord>) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                records,
            }
        }
    }

    #[async_trait]
    impl RecordSource for FlakySource {
        async fn parse(&self, _path: &Path) -> Result<Vec<EventRecord>, ParseError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(ParseError::UnexpectedEof { position: 0 })
            } else {
                Ok(self.records.clone())
            }
        }
    }

    /// Keeps every batch it receives.
    #[derive(Default)]
    struct RecordingSink {
        fail: bool,
        batches: Mutex<Vec<(PathBuf, String, Vec<EventRecord>)>>,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn batches(&self) -> Vec<(PathBuf, String, Vec<EventRecord>)> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn append(
            &self,
            output_dir: &Path,
            project: &str,
            records: &[EventRecord],
        ) -> Result<usize, SinkError> {
            if self.fail {
                return Err(SinkError::Open {
                    path: output_dir.join(project),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.batches.lock().unwrap().push((
                output_dir.to_path_buf(),
                project.to_string(),
                records.to_vec(),
            ));
            Ok(records.len())
        }
    }

    /// Blocks inside `parse` until released, tracking concurrency.
    struct GatedSource {
        gate: Semaphore,
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicUsize,
    }

    impl GatedSource {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RecordSource for GatedSource {
        async fn parse(&self, _path: &Path) -> Result<Vec<EventRecord>, ParseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            let permit = self.gate.acquire().await;
            drop(permit);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    struct Fixture {
        dir: TempDir,
        file: PathBuf,
        sleeper: Arc<RecordingSleeper>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let file = dir.path().join("2024-05-01.xml");
            std::fs::write(&file, "<EventLog/>").unwrap();
            Self {
                dir,
                file,
                sleeper: Arc::new(RecordingSleeper::default()),
            }
        }

        fn project(&self, delete_processed: bool) -> ProjectContext {
            ProjectContext {
                name: "erp".to_string(),
                delete_processed,
                output_dir: self.dir.path().join("out"),
            }
        }

        fn coordinator(
            &self,
            source: Arc<dyn RecordSource>,
            sink: Arc<dyn Sink>,
        ) -> IngestCoordinator {
            IngestCoordinator::new(source, sink).with_sleeper(self.sleeper.clone())
        }
    }

    #[tokio::test]
    async fn test_delete_policy_removes_file() {
        let fixture = Fixture::new();
        let sink = Arc::new(RecordingSink::default());
        let coordinator =
            fixture.coordinator(Arc::new(FlakySource::new(0, records(3))), sink.clone());

        let outcome = coordinator
            .process_file(&fixture.file, &fixture.project(true))
            .await;

        assert_eq!(outcome, FileOutcome::Deleted);
        assert!(!fixture.file.exists());
        assert!(!archive_path(&fixture.file).exists());

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0, fixture.dir.path().join("out"));
        assert_eq!(batches[0].1, "erp");
        assert_eq!(batches[0].2, records(3));
    }

    #[tokio::test]
    async fn test_without_delete_policy_only_archive_remains() {
        let fixture = Fixture::new();
        let coordinator = fixture.coordinator(
            Arc::new(FlakySource::new(0, records(1))),
            Arc::new(RecordingSink::default()),
        );

        let outcome = coordinator
            .process_file(&fixture.file, &fixture.project(false))
            .await;

        assert_eq!(outcome, FileOutcome::Archived);
        assert!(!fixture.file.exists());
        assert!(archive_path(&fixture.file).exists());
    }

    #[tokio::test]
    async fn test_empty_file_skips_sink_but_archives() {
        let fixture = Fixture::new();
        let sink = Arc::new(RecordingSink::default());
        let coordinator =
            fixture.coordinator(Arc::new(FlakySource::new(0, Vec::new())), sink.clone());

        let outcome = coordinator
            .process_file(&fixture.file, &fixture.project(false))
            .await;

        assert_eq!(outcome, FileOutcome::Archived);
        assert!(sink.batches().is_empty());
        assert!(archive_path(&fixture.file).exists());
    }

    #[tokio::test]
    async fn test_sink_failure_leaves_file_in_place() {
        let fixture = Fixture::new();
        let coordinator = fixture.coordinator(
            Arc::new(FlakySource::new(0, records(2))),
            Arc::new(RecordingSink::failing()),
        );

        let outcome = coordinator
            .process_file(&fixture.file, &fixture.project(true))
            .await;

        assert_eq!(outcome, FileOutcome::SinkFailed);
        assert!(fixture.file.exists());
        assert!(!archive_path(&fixture.file).exists());
    }

    #[tokio::test]
    async fn test_persistent_parse_failure_leaves_file_untouched() {
        let fixture = Fixture::new();
        let source = Arc::new(FlakySource::new(u32::MAX, Vec::new()));
        let sink = Arc::new(RecordingSink::default());
        let coordinator = fixture.coordinator(source.clone(), sink.clone());

        let outcome = coordinator
            .process_file(&fixture.file, &fixture.project(true))
            .await;

        assert_eq!(outcome, FileOutcome::ParseFailed);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(fixture.sleeper.pauses(), vec![Duration::from_secs(2); 2]);
        assert!(sink.batches().is_empty());
        assert_eq!(std::fs::read_to_string(&fixture.file).unwrap(), "<EventLog/>");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_parse_succeeds_on_third_attempt() {
        let fixture = Fixture::new();
        let source = Arc::new(FlakySource::new(2, records(4)));
        let sink = Arc::new(RecordingSink::default());
        let coordinator = fixture.coordinator(source.clone(), sink.clone());

        let outcome = coordinator
            .process_file(&fixture.file, &fixture.project(false))
            .await;

        assert_eq!(outcome, FileOutcome::Archived);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(fixture.sleeper.pauses(), vec![Duration::from_secs(2); 2]);
        assert_eq!(sink.batches()[0].2, records(4));

        logs_assert(|lines: &[&str]| {
            let retries = lines
                .iter()
                .filter(|line| line.contains("Failed to parse file, retrying"))
                .count();
            match retries {
                2 => Ok(()),
                n => Err(format!("expected 2 retry warnings, found {n}")),
            }
        });
    }

    #[tokio::test]
    async fn test_rename_failure_is_terminal() {
        let fixture = Fixture::new();
        let missing = fixture.dir.path().join("vanished.xml");
        let coordinator = fixture.coordinator(
            Arc::new(FlakySource::new(0, records(1))),
            Arc::new(RecordingSink::default()),
        );

        let outcome = coordinator
            .process_file(&missing, &fixture.project(true))
            .await;

        assert_eq!(outcome, FileOutcome::RenameFailed);
        assert!(!archive_path(&missing).exists());
    }

    #[tokio::test]
    async fn test_duplicate_candidate_is_dropped() {
        let fixture = Fixture::new();
        let source = Arc::new(GatedSource::new());
        let coordinator = fixture.coordinator(source.clone(), Arc::new(RecordingSink::default()));

        let first = coordinator
            .on_candidate(fixture.file.clone(), fixture.project(false))
            .unwrap();
        assert!(coordinator.in_flight().contains(&fixture.file));

        let duplicate = coordinator.on_candidate(fixture.file.clone(), fixture.project(false));
        assert!(duplicate.is_none());

        source.gate.add_permits(1);
        assert_eq!(first.await.unwrap(), FileOutcome::Archived);
        assert!(coordinator.in_flight().is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_at_most_one_worker_per_path() {
        let fixture = Fixture::new();
        let source = Arc::new(GatedSource::new());
        let coordinator = fixture.coordinator(source.clone(), Arc::new(RecordingSink::default()));

        let dispatchers: Vec<_> = (0..32)
            .map(|_| {
                let coordinator = coordinator.clone();
                let path = fixture.file.clone();
                let project = fixture.project(false);
                tokio::spawn(async move { coordinator.on_candidate(path, project) })
            })
            .collect();

        let mut workers = Vec::new();
        for dispatcher in dispatchers {
            if let Some(worker) = dispatcher.await.unwrap() {
                workers.push(worker);
            }
        }
        assert_eq!(workers.len(), 1);

        source.gate.add_permits(32);
        for worker in workers {
            worker.await.unwrap();
        }
        assert_eq!(source.max_active.load(Ordering::SeqCst), 1);
        assert!(coordinator.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_claim_released_after_worker_finishes() {
        let fixture = Fixture::new();
        let coordinator = fixture.coordinator(
            Arc::new(FlakySource::new(u32::MAX, Vec::new())),
            Arc::new(RecordingSink::default()),
        );

        let worker = coordinator
            .on_candidate(fixture.file.clone(), fixture.project(false))
            .unwrap();
        assert_eq!(worker.await.unwrap(), FileOutcome::ParseFailed);

        assert!(coordinator.in_flight().is_empty());
        assert!(
            coordinator
                .on_candidate(fixture.file.clone(), fixture.project(false))
                .is_some()
        );
    }
}
