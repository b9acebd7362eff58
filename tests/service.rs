//! End-to-end jobs through `ConversionService` with local storage.

mod common;

use async_trait::async_trait;
use common::{png, DeckBuilder};
use deck2svg::{
    ConversionService, Deck2SvgError, DeckSource, InMemoryJobStore, InMemorySessionStore,
    JobStatus, JobStore, JobStoreError, JobUpdate, LocalStorage, ObjectStorage,
    ProcessingConfig, ProcessingJob, SessionStore, StorageError, SynthesisSource,
    ValidationStatus,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Job store that records every progress value it is asked to apply.
#[derive(Default)]
struct RecordingJobStore {
    inner: InMemoryJobStore,
    progress: Mutex<Vec<u8>>,
}

impl RecordingJobStore {
    fn progress(&self) -> Vec<u8> {
        self.progress.lock().unwrap().clone()
    }
}

impl JobStore for RecordingJobStore {
    fn create(&self, job_id: &str, session_id: &str) -> Result<ProcessingJob, JobStoreError> {
        self.inner.create(job_id, session_id)
    }

    fn update(&self, job_id: &str, update: JobUpdate) -> Result<ProcessingJob, JobStoreError> {
        if let Some(p) = update.progress {
            self.progress.lock().unwrap().push(p);
        }
        self.inner.update(job_id, update)
    }

    fn get(&self, job_id: &str) -> Option<ProcessingJob> {
        self.inner.get(job_id)
    }

    fn jobs_for_session(&self, session_id: &str) -> Vec<ProcessingJob> {
        self.inner.jobs_for_session(session_id)
    }
}

/// Storage that panics on first use.
struct ExplodingStorage;

#[async_trait]
impl ObjectStorage for ExplodingStorage {
    async fn upload(
        &self,
        _local_path: &Path,
        _bucket: &str,
        _destination: &str,
    ) -> Result<String, StorageError> {
        panic!("storage exploded");
    }
}

struct Harness {
    _dir: TempDir,
    root: std::path::PathBuf,
    decks: std::path::PathBuf,
    sessions: Arc<InMemorySessionStore>,
    jobs: Arc<RecordingJobStore>,
    service: ConversionService,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Harness {
    fn new(config: ProcessingConfig) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("storage");
        let decks = dir.path().join("decks");
        std::fs::create_dir_all(&decks).unwrap();
        let sessions = Arc::new(InMemorySessionStore::new());
        let jobs = Arc::new(RecordingJobStore::default());
        let service = ConversionService::with_job_store(
            config,
            Arc::new(LocalStorage::new(&root)),
            Arc::clone(&sessions) as Arc<dyn SessionStore>,
            Arc::clone(&jobs) as Arc<dyn JobStore>,
        );
        Self {
            _dir: dir,
            root,
            decks,
            sessions,
            jobs,
            service,
        }
    }

    fn without_engine() -> Self {
        Self::new(ProcessingConfig::builder().without_engine().build().unwrap())
    }

    fn artifact(&self, session: &str, job_id: &str, rel: &str) -> std::path::PathBuf {
        self.root
            .join("slide-visuals")
            .join(session)
            .join(job_id)
            .join(rel)
    }

    async fn run(&self, deck: &DeckBuilder, session: &str) -> ProcessingJob {
        let path = deck.write(&self.decks, &format!("{session}.pptx"));
        let receipt = self
            .service
            .submit(DeckSource::from(path), session)
            .await
            .unwrap();
        assert_eq!(receipt.status, JobStatus::Queued);
        self.service.wait(&receipt.job_id).await.unwrap()
    }
}

#[tokio::test]
async fn three_slides_without_engine_complete_with_fixed_progress() {
    let h = Harness::without_engine();
    let job = h.run(&DeckBuilder::new().with_text_slides(3), "s1").await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(job.progress, 100);
    assert!(job.completed_at.is_some());
    assert_eq!(h.jobs.progress(), vec![0, 10, 36, 63, 90, 100]);

    let result = h.service.get_result("s1").await.unwrap();
    assert_eq!(result.job_id, job.job_id);
    assert_eq!(result.slide_count, 3);
    assert_eq!(result.stats.fallback_slides, 3);
    assert_eq!(result.stats.engine_slides, 0);
    let numbers: Vec<_> = result.slides.iter().map(|s| s.slide_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    for slide in &result.slides {
        assert_eq!(slide.vector_source, SynthesisSource::Fallback);
        assert_eq!((slide.width, slide.height), (1280, 720));
        assert!(slide.svg_url.starts_with("file://"));
        assert!(slide.svg_url.ends_with(&format!(
            "s1/{}/slides/slide_{}.svg",
            job.job_id, slide.slide_number
        )));
        assert_eq!(slide.shapes.len(), 1);
    }
    for n in 1..=3 {
        assert!(h.artifact("s1", &job.job_id, &format!("slides/slide_{n}.svg")).is_file());
        let thumb = std::fs::read(h.artifact("s1", &job.job_id, &format!("thumbnails/slide_{n}.png")))
            .unwrap();
        let img = image::load_from_memory(&thumb).unwrap();
        assert_eq!((img.width(), img.height()), (250, 141));
    }

    let stored = h.root.join("processing-results/s1/result.json");
    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&stored).unwrap()).unwrap();
    assert_eq!(json["slideCount"], 3);
    assert_eq!(job.result_ref.as_deref().map(|r| r.ends_with("s1/result.json")), Some(true));
}

#[tokio::test]
async fn session_slide_count_is_recorded() {
    let h = Harness::without_engine();
    h.run(&DeckBuilder::new().with_text_slides(2), "count").await;
    assert_eq!(h.sessions.slide_count("count").await, Some(2));
}

#[tokio::test]
async fn in_memory_upload_is_converted() {
    let h = Harness::without_engine();
    let bytes = DeckBuilder::new()
        .slide_with_picture("image1.png")
        .media("image1.png", png(16, 16))
        .build();
    let receipt = h
        .service
        .submit(DeckSource::from_bytes("upload.pptx", bytes), "mem")
        .await
        .unwrap();
    let job = h.service.wait(&receipt.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);

    let result = h.service.get_result("mem").await.unwrap();
    let svg = std::fs::read_to_string(h.artifact("mem", &job.job_id, "slides/slide_1.svg")).unwrap();
    assert!(svg.contains("data:image/png;base64,"));
    assert_eq!(result.slides[0].shapes.len(), 1);

    // The SVG carries the pixels; result.json only describes them.
    let stored = std::fs::read_to_string(h.root.join("processing-results/mem/result.json")).unwrap();
    assert!(!stored.contains("\"base64\""), "{stored}");
    let json: serde_json::Value = serde_json::from_str(&stored).unwrap();
    let image = &json["slides"][0]["shapes"][0]["image"];
    assert_eq!(image["contentType"], "image/png");
    assert!(image["sizeBytes"].as_u64().unwrap() > 0);
}

#[cfg(unix)]
#[tokio::test]
async fn matching_engine_output_is_used_for_every_slide() {
    let scratch = tempfile::tempdir().unwrap();
    let engine = common::fake_engine(scratch.path(), 3);
    let h = Harness::new(ProcessingConfig::builder().engine_path(engine).build().unwrap());

    let job = h.run(&DeckBuilder::new().with_text_slides(3), "eng").await;
    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);

    let result = h.service.get_result("eng").await.unwrap();
    assert_eq!(result.stats.engine_slides, 3);
    for slide in &result.slides {
        assert_eq!(slide.vector_source, SynthesisSource::Engine);
        let svg = std::fs::read_to_string(h.artifact(
            "eng",
            &job.job_id,
            &format!("slides/slide_{}.svg", slide.slide_number),
        ))
        .unwrap();
        assert!(svg.contains(&format!(r#"data-page="{}""#, slide.slide_number)));
        // Thumbnails and text come from the deck regardless of the engine.
        assert!(h
            .artifact(
                "eng",
                &job.job_id,
                &format!("thumbnails/slide_{}.png", slide.slide_number)
            )
            .is_file());
        assert_eq!(slide.shapes.len(), 1);
        // The engine's SVG has no size to check positions against.
        let shape = &slide.shapes[0];
        assert_eq!(shape.validation_status, Some(ValidationStatus::Unvalidated));
        assert!(shape.validation_details.is_some());
    }
}

#[cfg(unix)]
#[tokio::test]
async fn short_engine_output_falls_back_for_every_slide() {
    let scratch = tempfile::tempdir().unwrap();
    let engine = common::fake_engine(scratch.path(), 2);
    let h = Harness::new(ProcessingConfig::builder().engine_path(engine).build().unwrap());

    let job = h.run(&DeckBuilder::new().with_text_slides(3), "short").await;
    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);

    let result = h.service.get_result("short").await.unwrap();
    assert_eq!(result.stats.fallback_slides, 3);
    assert!(result
        .slides
        .iter()
        .all(|s| s.vector_source == SynthesisSource::Fallback));
    let svg = std::fs::read_to_string(h.artifact("short", &job.job_id, "slides/slide_1.svg")).unwrap();
    assert!(!svg.contains("data-page"));
    // Fallback SVGs are built from the shapes, so nothing is checked.
    assert!(result.slides[0].shapes[0].validation_status.is_none());
}

#[tokio::test]
async fn failing_slide_stops_the_job_and_names_the_slide() {
    let h = Harness::without_engine();
    let deck = DeckBuilder::new()
        .with_text_slides(1)
        .slide_with_picture("missing.png")
        .with_text_slides(3);

    let job = h.run(&deck, "broken").await;
    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.unwrap();
    assert!(error.contains("Slide 2"), "error: {error}");
    assert!(error.contains("missing.png"), "error: {error}");
    // Progress stops where slide 1 left it.
    assert_eq!(job.progress, 26);
    assert_eq!(h.jobs.progress(), vec![0, 10, 26]);

    assert!(h.artifact("broken", &job.job_id, "slides/slide_1.svg").is_file());
    for n in 2..=5 {
        assert!(!h.artifact("broken", &job.job_id, &format!("slides/slide_{n}.svg")).exists());
        assert!(!h
            .artifact("broken", &job.job_id, &format!("thumbnails/slide_{n}.png"))
            .exists());
    }
    assert!(matches!(
        h.service.get_result("broken").await,
        Err(Deck2SvgError::ResultNotReady { .. })
    ));
}

#[tokio::test]
async fn failed_job_retries_under_a_new_id() {
    let h = Harness::without_engine();
    let path = h.decks.join("late.pptx");
    let receipt = h
        .service
        .submit(DeckSource::from(path), "late")
        .await
        .unwrap();
    let first = h.service.wait(&receipt.job_id).await.unwrap();
    assert_eq!(first.status, JobStatus::Failed);

    // The deck shows up before the retry.
    DeckBuilder::new().with_text_slides(2).write(&h.decks, "late.pptx");
    let again = h.service.retry(&receipt.job_id).await.unwrap();
    assert_ne!(again.job_id, receipt.job_id);
    let second = h.service.wait(&again.job_id).await.unwrap();
    assert_eq!(second.status, JobStatus::Completed, "error: {:?}", second.error);

    // The original attempt stays failed; completed jobs cannot be retried.
    assert_eq!(
        h.service.get_status(&receipt.job_id).await.unwrap().status,
        JobStatus::Failed
    );
    assert!(matches!(
        h.service.retry(&again.job_id).await,
        Err(Deck2SvgError::JobNotRetryable { .. })
    ));
    assert_eq!(h.service.jobs_for_session("late").len(), 2);
}

#[tokio::test]
async fn non_presentation_input_fails_before_any_upload() {
    let h = Harness::without_engine();
    let path = h.decks.join("notes.pptx");
    std::fs::write(&path, b"just some text").unwrap();

    let receipt = h.service.submit(DeckSource::from(path), "bad").await.unwrap();
    let job = h.service.wait(&receipt.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(!h.root.join("slide-visuals").exists());
    assert_eq!(h.sessions.slide_count("bad").await, None);
}

#[tokio::test]
async fn panicking_job_is_recorded_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let deck = DeckBuilder::new().with_text_slides(1).write(dir.path(), "p.pptx");
    let service = ConversionService::new(
        ProcessingConfig::builder().without_engine().build().unwrap(),
        Arc::new(ExplodingStorage),
        Arc::new(InMemorySessionStore::new()),
    );

    let receipt = service.submit(DeckSource::from(deck), "boom").await.unwrap();
    let job = service.wait(&receipt.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.unwrap();
    assert!(error.contains("panicked"), "error: {error}");
    assert!(error.contains("storage exploded"), "error: {error}");
}

#[tokio::test]
async fn concurrent_sessions_stay_separate() {
    let h = Harness::without_engine();
    let a = DeckBuilder::new().with_text_slides(2).write(&h.decks, "a.pptx");
    let b = DeckBuilder::new().with_text_slides(4).write(&h.decks, "b.pptx");

    let ra = h.service.submit(DeckSource::from(a), "a").await.unwrap();
    let rb = h.service.submit(DeckSource::from(b), "b").await.unwrap();
    let (ja, jb) = tokio::join!(h.service.wait(&ra.job_id), h.service.wait(&rb.job_id));
    assert_eq!(ja.unwrap().status, JobStatus::Completed);
    assert_eq!(jb.unwrap().status, JobStatus::Completed);

    assert_eq!(h.service.get_result("a").await.unwrap().slide_count, 2);
    assert_eq!(h.service.get_result("b").await.unwrap().slide_count, 4);
}

#[cfg(unix)]
#[tokio::test]
async fn hung_engine_times_out_and_every_slide_falls_back() {
    let scratch = tempfile::tempdir().unwrap();
    let engine = common::hanging_engine(scratch.path());
    let h = Harness::new(
        ProcessingConfig::builder()
            .engine_path(engine)
            .render_timeout_secs(1)
            .build()
            .unwrap(),
    );

    let started = std::time::Instant::now();
    let job = h.run(&DeckBuilder::new().with_text_slides(2), "hung").await;
    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert!(started.elapsed() < std::time::Duration::from_secs(20));

    let result = h.service.get_result("hung").await.unwrap();
    assert_eq!(result.stats.fallback_slides, 2);
    assert_eq!(result.stats.engine_slides, 0);
    for n in 1..=2 {
        assert!(h.artifact("hung", &job.job_id, &format!("slides/slide_{n}.svg")).is_file());
    }
}

#[tokio::test]
async fn unchanged_deck_is_served_from_the_cache() {
    let scratch = tempfile::tempdir().unwrap();
    let h = Harness::new(
        ProcessingConfig::builder()
            .without_engine()
            .cache_dir(scratch.path().join("cache"))
            .build()
            .unwrap(),
    );
    // Archive timestamps differ between builds, so both runs share one build.
    let bytes = DeckBuilder::new().with_text_slides(2).build();
    let convert = |name: &str, session: &str| {
        let path = h.decks.join(name);
        std::fs::write(&path, &bytes).unwrap();
        let session = session.to_string();
        let service = h.service.clone();
        async move {
            let receipt = service.submit(DeckSource::from(path), session).await.unwrap();
            service.wait(&receipt.job_id).await.unwrap()
        }
    };

    let first = convert("first.pptx", "a").await;
    assert_eq!(first.status, JobStatus::Completed, "error: {:?}", first.error);
    let converted = h.service.get_result("a").await.unwrap();
    assert!(!converted.stats.cached);

    // Same bytes under another name and session.
    let second = convert("second.pptx", "b").await;
    assert_eq!(second.status, JobStatus::Completed, "error: {:?}", second.error);
    assert_eq!(h.jobs.progress(), vec![0, 10, 50, 90, 100, 0, 100]);

    let served = h.service.get_result("b").await.unwrap();
    assert!(served.stats.cached);
    assert_eq!(served.session_id, "b");
    assert_eq!(served.job_id, second.job_id);
    assert_eq!(served.slide_count, 2);
    let urls = |r: &deck2svg::DeckResult| -> Vec<String> {
        r.slides.iter().map(|s| s.svg_url.clone()).collect()
    };
    assert_eq!(urls(&served), urls(&converted));
    assert_eq!(h.sessions.slide_count("b").await, Some(2));

    let stored = h.root.join("processing-results/b/result.json");
    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&stored).unwrap()).unwrap();
    assert_eq!(json["jobId"], second.job_id.as_str());
    assert_eq!(json["stats"]["cached"], true);
    // Nothing was rendered for the second session.
    assert!(!h.root.join("slide-visuals/b").exists());
}

#[tokio::test]
async fn failed_rerun_leaves_earlier_artifacts_alone() {
    let h = Harness::without_engine();
    let first = h.run(&DeckBuilder::new().with_text_slides(2), "same").await;
    assert_eq!(first.status, JobStatus::Completed, "error: {:?}", first.error);
    let earlier = h.artifact("same", &first.job_id, "slides/slide_1.svg");
    let before = std::fs::read(&earlier).unwrap();

    // A different deck for the same session that fails on slide 2.
    let broken = DeckBuilder::new()
        .slide_with_picture("image1.png")
        .media("image1.png", png(8, 8))
        .slide_with_picture("missing.png");
    let rerun = h.run(&broken, "same").await;
    assert_eq!(rerun.status, JobStatus::Failed);

    assert_eq!(std::fs::read(&earlier).unwrap(), before);
    assert!(h.artifact("same", &first.job_id, "slides/slide_2.svg").is_file());
    assert!(h.artifact("same", &rerun.job_id, "slides/slide_1.svg").is_file());
    assert!(!h.artifact("same", &rerun.job_id, "slides/slide_2.svg").exists());

    // The session still answers with the first job's result.
    let result = h.service.get_result("same").await.unwrap();
    assert_eq!(result.job_id, first.job_id);
}
