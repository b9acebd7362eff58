//! The exposed interface: submit decks, poll jobs, fetch results, retry.
//!
//! Every submission becomes one background task. A semaphore bounds how many
//! of them are past the queued state at once; the rest wait for a permit.
//! Panics inside a job are caught at the task boundary and recorded as a
//! failed job, so a poller never sees a job stuck in processing.
//!
//! A task drops its own join handle when it ends. Sources are kept only for
//! failed jobs, up to `max_retained_sources`, and a retry takes the source
//! over from the job it replaces.

use crate::cache::{FileResultCache, ResultCache};
use crate::config::ProcessingConfig;
use crate::convert::{self, JobContext};
use crate::error::Deck2SvgError;
use crate::job::{InMemoryJobStore, JobStatus, JobStore, JobUpdate, ProcessingJob};
use crate::output::DeckResult;
use crate::pipeline::input::DeckSource;
use crate::storage::{self, ObjectStorage, SessionStore};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Answer to `submit` and `retry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub job_id: String,
    pub session_id: String,
    pub status: JobStatus,
}

/// Runs conversion jobs in the background.
///
/// Cloning is cheap and every clone shares the same jobs.
#[derive(Clone)]
pub struct ConversionService {
    inner: Arc<Inner>,
}

struct Inner {
    config: ProcessingConfig,
    storage: Arc<dyn ObjectStorage>,
    sessions: Arc<dyn SessionStore>,
    jobs: Arc<dyn JobStore>,
    cache: Option<Arc<dyn ResultCache>>,
    permits: Arc<Semaphore>,
    /// Sources of failed jobs that may still be retried.
    sources: Mutex<RetainedSources>,
    /// Tasks still running; each removes its own entry when it ends.
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

/// Failed jobs' sources, oldest evicted first.
struct RetainedSources {
    by_job: HashMap<String, DeckSource>,
    order: VecDeque<String>,
    limit: usize,
}

impl RetainedSources {
    fn new(limit: usize) -> Self {
        Self {
            by_job: HashMap::new(),
            order: VecDeque::new(),
            limit,
        }
    }

    fn insert(&mut self, job_id: &str, source: DeckSource) {
        if self.limit == 0 {
            return;
        }
        if self.by_job.insert(job_id.to_string(), source).is_none() {
            self.order.push_back(job_id.to_string());
        }
        while self.order.len() > self.limit {
            if let Some(oldest) = self.order.pop_front() {
                self.by_job.remove(&oldest);
                debug!(job_id = %oldest, "Released retained source");
            }
        }
    }

    fn take(&mut self, job_id: &str) -> Option<DeckSource> {
        let source = self.by_job.remove(job_id)?;
        self.order.retain(|id| id != job_id);
        Some(source)
    }

    fn len(&self) -> usize {
        self.by_job.len()
    }
}

/// Session ids become storage key prefixes: one non-empty, safe segment.
fn check_session_id(session_id: &str) -> Result<(), Deck2SvgError> {
    let reason = if session_id.trim().is_empty() {
        Some("must not be empty")
    } else if session_id.contains(['/', '\\']) {
        Some("must not contain path separators")
    } else if session_id.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else if session_id == "." || storage::validate_destination(session_id).is_err() {
        Some("must not be a relative path segment")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Deck2SvgError::InvalidSession {
            session_id: session_id.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            warn!("Service lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl ConversionService {
    /// A service with a process-local job store.
    pub fn new(
        config: ProcessingConfig,
        storage: Arc<dyn ObjectStorage>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self::with_job_store(config, storage, sessions, Arc::new(InMemoryJobStore::new()))
    }

    pub fn with_job_store(
        config: ProcessingConfig,
        storage: Arc<dyn ObjectStorage>,
        sessions: Arc<dyn SessionStore>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let cache = config
            .cache_dir
            .as_ref()
            .map(|dir| Arc::new(FileResultCache::new(dir)) as Arc<dyn ResultCache>);
        let sources = Mutex::new(RetainedSources::new(config.max_retained_sources));
        Self {
            inner: Arc::new(Inner {
                config,
                storage,
                sessions,
                jobs,
                cache,
                permits,
                sources,
                handles: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.inner.config
    }

    /// Queue a deck for conversion and return immediately.
    pub async fn submit(
        &self,
        source: DeckSource,
        session_id: impl Into<String>,
    ) -> Result<SubmitReceipt, Deck2SvgError> {
        let session_id = session_id.into();
        check_session_id(&session_id)?;
        let job_id = Uuid::new_v4().to_string();
        let job = self.inner.jobs.create(&job_id, &session_id)?;
        info!(job_id = %job_id, session_id = %session_id, "Job queued: {}", source.describe());

        let inner = Arc::clone(&self.inner);
        let task_job_id = job_id.clone();
        let task_session_id = session_id.clone();
        // The task may only remove its handle after it has been registered.
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = registered_rx.await;
            run_in_background(Arc::clone(&inner), task_job_id.clone(), task_session_id, source)
                .await;
            lock(&inner.handles).remove(&task_job_id);
        });
        lock(&self.inner.handles).insert(job_id.clone(), handle);
        let _ = registered_tx.send(());

        Ok(SubmitReceipt {
            job_id,
            session_id,
            status: job.status,
        })
    }

    /// Current state of a job.
    pub async fn get_status(&self, job_id: &str) -> Result<ProcessingJob, Deck2SvgError> {
        self.inner
            .jobs
            .get(job_id)
            .ok_or_else(|| Deck2SvgError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    /// The latest completed result for a session.
    pub async fn get_result(&self, session_id: &str) -> Result<DeckResult, Deck2SvgError> {
        self.inner
            .sessions
            .get_result(session_id)
            .await
            .map_err(Deck2SvgError::SessionStore)?
            .ok_or_else(|| Deck2SvgError::ResultNotReady {
                session_id: session_id.to_string(),
            })
    }

    /// Re-run a failed job from its original source under a new job id.
    pub async fn retry(&self, job_id: &str) -> Result<SubmitReceipt, Deck2SvgError> {
        let job = self.get_status(job_id).await?;
        if job.status != JobStatus::Failed {
            return Err(Deck2SvgError::JobNotRetryable {
                job_id: job_id.to_string(),
                status: job.status.to_string(),
            });
        }
        let source = lock(&self.inner.sources)
            .take(job_id)
            .ok_or_else(|| Deck2SvgError::SourceReleased {
                job_id: job_id.to_string(),
            })?;
        info!(job_id, session_id = %job.session_id, "Retrying failed job");
        match self.submit(source.clone(), job.session_id).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                lock(&self.inner.sources).insert(job_id, source);
                Err(e)
            }
        }
    }

    /// Wait for a job's background task to finish and return its final state.
    pub async fn wait(&self, job_id: &str) -> Result<ProcessingJob, Deck2SvgError> {
        let handle = lock(&self.inner.handles).remove(job_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(job_id, "Job task ended abnormally: {}", e);
            }
        }
        self.get_status(job_id).await
    }

    /// Every job submitted for a session, oldest first.
    pub fn jobs_for_session(&self, session_id: &str) -> Vec<ProcessingJob> {
        self.inner.jobs.jobs_for_session(session_id)
    }
}

async fn run_in_background(inner: Arc<Inner>, job_id: String, session_id: String, source: DeckSource) {
    let _permit = match Arc::clone(&inner.permits).acquire_owned().await {
        Ok(p) => p,
        Err(e) => {
            let _ = inner.jobs.update(&job_id, JobUpdate::failed(e.to_string()));
            lock(&inner.sources).insert(&job_id, source);
            return;
        }
    };

    let ctx = JobContext {
        job_id: &job_id,
        session_id: &session_id,
        config: &inner.config,
        storage: inner.storage.as_ref(),
        sessions: inner.sessions.as_ref(),
        jobs: inner.jobs.as_ref(),
        cache: inner.cache.as_deref(),
    };

    let outcome = AssertUnwindSafe(convert::run_job(&ctx, &source))
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(_)) => {}
        Ok(Err(_)) => lock(&inner.sources).insert(&job_id, source),
        Err(payload) => {
            lock(&inner.sources).insert(&job_id, source);
            let msg = panic_message(payload.as_ref());
            error!(job_id = %job_id, "Job panicked: {}", msg);
            let failure = Deck2SvgError::Internal(format!("job panicked: {msg}"));
            if let Err(e) = inner.jobs.update(&job_id, JobUpdate::failed(failure.to_string())) {
                warn!(job_id = %job_id, "Could not record panic: {}", e);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemorySessionStore, LocalStorage};

    fn service(root: &std::path::Path) -> ConversionService {
        let config = ProcessingConfig::builder().without_engine().build().unwrap();
        ConversionService::new(
            config,
            Arc::new(LocalStorage::new(root)),
            Arc::new(InMemorySessionStore::new()),
        )
    }

    #[test]
    fn panic_messages() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(s.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn unknown_jobs_are_not_found() {
        let root = tempfile::tempdir().unwrap();
        let svc = service(root.path());
        assert!(matches!(
            svc.get_status("missing").await,
            Err(Deck2SvgError::JobNotFound { .. })
        ));
        assert!(matches!(
            svc.retry("missing").await,
            Err(Deck2SvgError::JobNotFound { .. })
        ));
        assert!(matches!(
            svc.get_result("nobody").await,
            Err(Deck2SvgError::ResultNotReady { .. })
        ));
    }

    #[tokio::test]
    async fn missing_input_fails_the_job() {
        let root = tempfile::tempdir().unwrap();
        let svc = service(root.path());
        let receipt = svc
            .submit(DeckSource::parse("/no/such/deck.pptx"), "s1")
            .await
            .unwrap();
        assert_eq!(receipt.status, JobStatus::Queued);

        let job = svc.wait(&receipt.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("not found"));

        // Failed jobs can be retried, under a new id.
        let again = svc.retry(&receipt.job_id).await.unwrap();
        assert_ne!(again.job_id, receipt.job_id);
        assert_eq!(again.session_id, "s1");
        svc.wait(&again.job_id).await.unwrap();
        assert_eq!(svc.jobs_for_session("s1").len(), 2);

        // The source moved to the retry; the first job no longer has one.
        assert!(matches!(
            svc.retry(&receipt.job_id).await,
            Err(Deck2SvgError::SourceReleased { .. })
        ));
    }

    #[tokio::test]
    async fn session_ids_must_be_one_safe_segment() {
        let root = tempfile::tempdir().unwrap();
        let svc = service(root.path());
        for bad in ["", "  ", "..", ".", "a/b", "..\\up", "tab\there"] {
            let err = svc
                .submit(DeckSource::parse("/no/such/deck.pptx"), bad)
                .await
                .unwrap_err();
            assert!(
                matches!(err, Deck2SvgError::InvalidSession { .. }),
                "{bad:?} gave {err}"
            );
        }
        assert!(svc.jobs_for_session("..").is_empty());
        assert!(svc
            .submit(DeckSource::parse("/no/such/deck.pptx"), "team-42_v2")
            .await
            .is_ok());
    }

    #[test]
    fn retained_sources_evict_oldest() {
        let mut kept = RetainedSources::new(2);
        for id in ["a", "b", "c"] {
            kept.insert(id, DeckSource::parse(&format!("/decks/{id}.pptx")));
        }
        assert_eq!(kept.len(), 2);
        assert!(kept.take("a").is_none());
        assert!(kept.take("b").is_some());
        assert!(kept.take("b").is_none());
        assert_eq!(kept.len(), 1);

        let mut none = RetainedSources::new(0);
        none.insert("a", DeckSource::parse("/decks/a.pptx"));
        assert_eq!(none.len(), 0);
    }

    #[tokio::test]
    async fn finished_jobs_release_handles_and_bound_sources() {
        let root = tempfile::tempdir().unwrap();
        let config = ProcessingConfig::builder()
            .without_engine()
            .max_retained_sources(2)
            .build()
            .unwrap();
        let svc = ConversionService::new(
            config,
            Arc::new(LocalStorage::new(root.path())),
            Arc::new(InMemorySessionStore::new()),
        );
        let mut ids = Vec::new();
        for i in 0..4 {
            let receipt = svc
                .submit(DeckSource::parse(&format!("/no/such/deck{i}.pptx")), "s1")
                .await
                .unwrap();
            ids.push(receipt.job_id);
        }

        // Poll like a client would, without `wait`.
        tokio::time::timeout(std::time::Duration::from_secs(10), async {
            loop {
                let mut done = true;
                for id in &ids {
                    done &= svc.get_status(id).await.unwrap().status.is_terminal();
                }
                if done && lock(&svc.inner.handles).is_empty() {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("jobs did not finish");

        assert_eq!(lock(&svc.inner.sources).len(), 2);
        let mut released = 0;
        for id in &ids {
            match svc.retry(id).await {
                Ok(_) => {}
                Err(Deck2SvgError::SourceReleased { .. }) => released += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(released, 2);
    }
}
