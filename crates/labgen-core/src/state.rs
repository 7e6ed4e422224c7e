//! Resumable batch state.
//!
//! Every URL in a batch moves through `pending -> in_progress -> {completed | failed}`.
//! The four buckets always partition the batch's URL list: a transition removes
//! the URL from its old bucket in the same step that adds it to the new one.
//! The state file is rewritten after every transition so an interrupted run
//! loses at most the URL that was in flight.
//!
//! ```json
//! {
//!   "batch_id": "2026-03-01T10:00:00.000000Z",
//!   "input_file": "urls.txt",
//!   "total_urls": 3,
//!   "urls": ["https://a", "https://b", "https://c"],
//!   "completed": ["https://a"],
//!   "in_progress": "https://b",
//!   "pending": ["https://c"],
//!   "failed": []
//! }
//! ```

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// A URL that ended in failure, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUrl {
    /// The URL.
    pub url: String,
    /// Error text recorded at failure time.
    pub error: String,
}

/// Durable record of one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchState {
    /// Creation timestamp, doubles as identifier.
    pub batch_id: String,
    /// File the URLs were read from, if any.
    pub input_file: Option<String>,
    /// Number of URLs in the batch.
    pub total_urls: usize,
    /// Every URL in the batch, in submission order.
    pub urls: Vec<String>,
    /// URLs that finished successfully.
    pub completed: Vec<String>,
    /// URL currently being processed.
    pub in_progress: Option<String>,
    /// URLs not yet started.
    pub pending: Vec<String>,
    /// URLs that finished with an error.
    pub failed: Vec<FailedUrl>,
}

impl BatchState {
    /// Start a batch with every URL pending. Duplicates are dropped, first wins.
    #[must_use]
    pub fn new(urls: &[String], input_file: Option<String>) -> Self {
        let mut seen = HashSet::new();
        let urls: Vec<String> = urls
            .iter()
            .filter(|u| seen.insert(u.as_str()))
            .cloned()
            .collect();
        Self {
            batch_id: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            input_file,
            total_urls: urls.len(),
            pending: urls.clone(),
            urls,
            completed: Vec::new(),
            in_progress: None,
            failed: Vec::new(),
        }
    }

    fn is_terminal(&self, url: &str) -> bool {
        self.completed.iter().any(|u| u == url) || self.failed.iter().any(|f| f.url == url)
    }

    /// Remove `url` from whichever non-terminal bucket holds it.
    fn take_open(&mut self, url: &str) -> Result<()> {
        if self.in_progress.as_deref() == Some(url) {
            self.in_progress = None;
            return Ok(());
        }
        if let Some(pos) = self.pending.iter().position(|u| u == url) {
            self.pending.remove(pos);
            return Ok(());
        }
        if self.is_terminal(url) {
            Err(Error::State(format!("'{url}' already reached a terminal state")))
        } else {
            Err(Error::State(format!("'{url}' is not part of this batch")))
        }
    }

    /// Move `url` from pending to in progress.
    ///
    /// A URL that was already in progress goes back to pending, so at most one
    /// URL is ever recorded as in flight.
    pub fn set_in_progress(&mut self, url: &str) -> Result<()> {
        if self.in_progress.as_deref() == Some(url) {
            return Ok(());
        }
        let Some(pos) = self.pending.iter().position(|u| u == url) else {
            return Err(Error::State(format!("'{url}' is not pending")));
        };
        self.pending.remove(pos);
        if let Some(previous) = self.in_progress.replace(url.to_string()) {
            self.pending.insert(0, previous);
        }
        Ok(())
    }

    /// Record a successful URL.
    pub fn mark_completed(&mut self, url: &str) -> Result<()> {
        self.take_open(url)?;
        self.completed.push(url.to_string());
        Ok(())
    }

    /// Record a failed URL.
    pub fn mark_failed(&mut self, url: &str, error: impl Into<String>) -> Result<()> {
        self.take_open(url)?;
        self.failed.push(FailedUrl {
            url: url.to_string(),
            error: error.into(),
        });
        Ok(())
    }

    /// URLs still to do that were also requested this time.
    ///
    /// An interrupted in-flight URL comes first, followed by pending URLs in
    /// their original order.
    #[must_use]
    pub fn resumable(&self, requested: &[String]) -> Vec<String> {
        let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();
        self.in_progress
            .iter()
            .chain(self.pending.iter())
            .filter(|u| requested.contains(u.as_str()))
            .cloned()
            .collect()
    }

    /// True when no URL is pending or in flight.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.pending.is_empty() && self.in_progress.is_none()
    }

    /// Verify that the four buckets partition `urls` without duplicates.
    #[must_use]
    pub fn is_partitioned(&self) -> bool {
        let mut seen = HashSet::new();
        let buckets = self
            .completed
            .iter()
            .chain(self.in_progress.iter())
            .chain(self.pending.iter())
            .chain(self.failed.iter().map(|f| &f.url));
        for url in buckets {
            if !seen.insert(url.as_str()) {
                return false;
            }
        }
        seen.len() == self.urls.len() && self.urls.iter().all(|u| seen.contains(u.as_str()))
    }
}

/// Outcome of [`StateStore::resume_or_create`].
#[derive(Debug, Clone)]
pub struct BatchPlan {
    /// State to track this run against.
    pub state: BatchState,
    /// URLs to process, in order.
    pub work: Vec<String>,
    /// Whether an existing batch was resumed.
    pub resumed: bool,
}

/// Persists [`BatchState`] as a single JSON document.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store backed by `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the state document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved state. A missing or malformed file yields `None`.
    pub fn load(&self) -> Result<Option<BatchState>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        match serde_json::from_str(&content) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(path = %self.path.display(), "ignoring corrupt batch state: {e}");
                Ok(None)
            },
        }
    }

    /// Replace the saved state.
    pub fn save(&self, state: &BatchState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| Error::Storage(format!("Failed to serialize batch state: {e}")))?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Storage(format!("Failed to create state directory: {e}")))?;

        let mut tmp = NamedTempFile::new_in(&dir)
            .map_err(|e| Error::Storage(format!("Failed to create temp state file: {e}")))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| Error::Storage(format!("Failed to write temp state file: {e}")))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::Storage(format!("Failed to commit state file: {e}")))?;
        Ok(())
    }

    /// Remove the saved state entirely.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "batch state cleared");
                Ok(())
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("Failed to clear batch state: {e}"))),
        }
    }

    /// Create, persist and return a fresh batch.
    pub fn create_batch(&self, urls: &[String], input_file: Option<String>) -> Result<BatchState> {
        let state = BatchState::new(urls, input_file);
        self.save(&state)?;
        Ok(state)
    }

    /// Resume the saved batch if it still has requested work, otherwise start over.
    pub fn resume_or_create(
        &self,
        urls: &[String],
        input_file: Option<String>,
    ) -> Result<BatchPlan> {
        if let Some(state) = self.load()? {
            let work = state.resumable(urls);
            if !work.is_empty() {
                info!(
                    batch_id = %state.batch_id,
                    remaining = work.len(),
                    completed = state.completed.len(),
                    failed = state.failed.len(),
                    "resuming batch"
                );
                return Ok(BatchPlan {
                    state,
                    work,
                    resumed: true,
                });
            }
            debug!(batch_id = %state.batch_id, "saved batch has no remaining work, starting fresh");
        }

        let state = self.create_batch(urls, input_file)?;
        let work = state.pending.clone();
        Ok(BatchPlan {
            state,
            work,
            resumed: false,
        })
    }
}

/// Shared handle that applies transitions and persists after each one.
///
/// Workers running different URLs share one tracker. The lock serializes
/// transitions so the file on disk always reflects a consistent state.
/// The tracker also counts failures recorded during its own run, which is
/// what [`finish`](Self::finish) judges the run by.
#[derive(Debug)]
pub struct BatchTracker {
    store: StateStore,
    state: Mutex<BatchState>,
    run_failures: AtomicUsize,
}

impl BatchTracker {
    /// Track `state`, persisting through `store`.
    #[must_use]
    pub fn new(store: StateStore, state: BatchState) -> Self {
        Self {
            store,
            state: Mutex::new(state),
            run_failures: AtomicUsize::new(0),
        }
    }

    /// Mark `url` in progress.
    pub async fn start(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.set_in_progress(url)?;
        self.store.save(&state)
    }

    /// Mark `url` completed.
    pub async fn complete(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.mark_completed(url)?;
        self.store.save(&state)
    }

    /// Mark `url` failed.
    pub async fn fail(&self, url: &str, error: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        self.run_failures.fetch_add(1, Ordering::SeqCst);
        state.mark_failed(url, error)?;
        self.store.save(&state)
    }

    /// Failures recorded since this tracker was created.
    pub fn run_failures(&self) -> usize {
        self.run_failures.load(Ordering::SeqCst)
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> BatchState {
        self.state.lock().await.clone()
    }

    /// Remove the state file when nothing is left to run and this run
    /// recorded no failures.
    ///
    /// Failures carried over from an earlier run do not keep the file alive
    /// once a resumed run finishes the remaining URLs cleanly. Returns whether
    /// the file was cleared.
    pub async fn finish(&self) -> Result<bool> {
        let state = self.state.lock().await;
        if state.is_resolved() && self.run_failures() == 0 {
            self.store.clear()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn urls(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| format!("https://docs.example.com/{n}")).collect()
    }

    #[test]
    fn test_new_batch_dedupes_and_pends_everything() {
        let mut list = urls(&["a", "b"]);
        list.push(list[0].clone());
        let state = BatchState::new(&list, Some("urls.txt".to_string()));

        assert_eq!(state.total_urls, 2);
        assert_eq!(state.pending, urls(&["a", "b"]));
        assert!(state.batch_id.ends_with('Z'));
        assert!(state.is_partitioned());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let list = urls(&["a", "b", "c"]);
        let mut state = BatchState::new(&list, None);

        state.set_in_progress(&list[0]).unwrap();
        assert_eq!(state.in_progress.as_deref(), Some(list[0].as_str()));
        state.mark_completed(&list[0]).unwrap();

        state.set_in_progress(&list[1]).unwrap();
        state.mark_failed(&list[1], "boom").unwrap();

        assert_eq!(state.completed, vec![list[0].clone()]);
        assert_eq!(state.failed[0].error, "boom");
        assert_eq!(state.pending, vec![list[2].clone()]);
        assert!(state.is_partitioned());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let list = urls(&["a"]);
        let mut state = BatchState::new(&list, None);
        state.mark_completed(&list[0]).unwrap();

        assert!(matches!(state.mark_completed(&list[0]), Err(Error::State(_))));
        assert!(matches!(state.mark_failed(&list[0], "x"), Err(Error::State(_))));
        assert!(state.set_in_progress(&list[0]).is_err());
        assert!(state.mark_completed("https://unknown").is_err());
    }

    #[test]
    fn test_second_in_progress_returns_first_to_pending() {
        let list = urls(&["a", "b"]);
        let mut state = BatchState::new(&list, None);
        state.set_in_progress(&list[0]).unwrap();
        state.set_in_progress(&list[1]).unwrap();

        assert_eq!(state.in_progress.as_deref(), Some(list[1].as_str()));
        assert_eq!(state.pending, vec![list[0].clone()]);
        // The displaced URL can still finish
        state.mark_completed(&list[0]).unwrap();
        assert!(state.is_partitioned());
    }

    #[test]
    fn test_resume_processes_only_requested_remainder() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        let list = urls(&["a", "b", "c", "d"]);

        let mut state = store.create_batch(&list, Some("urls.txt".to_string())).unwrap();
        state.mark_completed(&list[0]).unwrap();
        state.mark_failed(&list[1], "error").unwrap();
        store.save(&state).unwrap();

        let mut requested = list.clone();
        requested.push("https://docs.example.com/new".to_string());
        let plan = store.resume_or_create(&requested, None).unwrap();

        assert!(plan.resumed);
        assert_eq!(plan.work, vec![list[2].clone(), list[3].clone()]);
    }

    #[test]
    fn test_resume_without_remaining_work_starts_fresh() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        let list = urls(&["a"]);

        let mut state = store.create_batch(&list, None).unwrap();
        state.mark_completed(&list[0]).unwrap();
        store.save(&state).unwrap();

        let plan = store.resume_or_create(&list, None).unwrap();
        assert!(!plan.resumed);
        assert_eq!(plan.work, list);
        assert!(plan.state.completed.is_empty());
    }

    #[test]
    fn test_corrupt_state_loads_as_none() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        fs::write(&path, "{ truncated").unwrap();

        assert!(StateStore::new(&path).load().unwrap().is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        store.create_batch(&urls(&["a"]), None).unwrap();

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_tracker_persists_every_transition() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        let list = urls(&["a", "b"]);
        let state = store.create_batch(&list, None).unwrap();
        let tracker = BatchTracker::new(store.clone(), state);

        tracker.start(&list[0]).await.unwrap();
        let on_disk = store.load().unwrap().unwrap();
        assert_eq!(on_disk.in_progress.as_deref(), Some(list[0].as_str()));

        tracker.complete(&list[0]).await.unwrap();
        tracker.start(&list[1]).await.unwrap();
        tracker.fail(&list[1], "timeout").await.unwrap();

        let on_disk = store.load().unwrap().unwrap();
        assert_eq!(on_disk.completed.len(), 1);
        assert_eq!(on_disk.failed.len(), 1);

        // A failure keeps the state around for the next run
        assert!(!tracker.finish().await.unwrap());
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_tracker_finish_clears_successful_batch() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        let list = urls(&["a"]);
        let state = store.create_batch(&list, None).unwrap();
        let tracker = BatchTracker::new(store.clone(), state);

        tracker.start(&list[0]).await.unwrap();
        tracker.complete(&list[0]).await.unwrap();

        assert!(tracker.finish().await.unwrap());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_clean_resumed_run_clears_state_despite_earlier_failures() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        let list = urls(&["a", "b"]);

        let state = store.create_batch(&list, None).unwrap();
        let first_run = BatchTracker::new(store.clone(), state);
        first_run.start(&list[0]).await.unwrap();
        first_run.fail(&list[0], "Generation failed: empty").await.unwrap();
        assert_eq!(first_run.run_failures(), 1);
        assert!(!first_run.finish().await.unwrap());

        let plan = store.resume_or_create(&list, None).unwrap();
        assert!(plan.resumed);
        assert_eq!(plan.work, vec![list[1].clone()]);

        let second_run = BatchTracker::new(store.clone(), plan.state);
        second_run.start(&list[1]).await.unwrap();
        second_run.complete(&list[1]).await.unwrap();

        assert_eq!(second_run.run_failures(), 0);
        assert_eq!(second_run.snapshot().await.failed.len(), 1);
        assert!(second_run.finish().await.unwrap());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_unfinished_run_keeps_state() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        let list = urls(&["a", "b"]);
        let state = store.create_batch(&list, None).unwrap();
        let tracker = BatchTracker::new(store.clone(), state);

        tracker.start(&list[0]).await.unwrap();
        tracker.complete(&list[0]).await.unwrap();

        assert!(!tracker.finish().await.unwrap());
        assert!(store.path().exists());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Start(usize),
        Complete(usize),
        Fail(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..6).prop_map(Op::Start),
            (0usize..6).prop_map(Op::Complete),
            (0usize..6).prop_map(Op::Fail),
        ]
    }

    proptest! {
        #[test]
        fn test_partition_holds_under_any_transition_sequence(
            ops in proptest::collection::vec(op_strategy(), 0..40)
        ) {
            let list = urls(&["a", "b", "c", "d", "e", "f"]);
            let mut state = BatchState::new(&list, None);

            for op in ops {
                // Illegal transitions are rejected without side effects
                let _ = match op {
                    Op::Start(i) => state.set_in_progress(&list[i]),
                    Op::Complete(i) => state.mark_completed(&list[i]),
                    Op::Fail(i) => state.mark_failed(&list[i], "err"),
                };
                prop_assert!(state.is_partitioned());
            }
        }
    }
}
