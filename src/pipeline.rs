//! The document-to-narration pipeline.
//!
//! One invocation converts one uploaded document: analyze, poll, assemble,
//! bound, synthesize, persist. Stages run strictly in sequence; a later
//! stage never starts before the former yields a result, and any failure
//! maps straight to a [`PipelineError`] with no automatic retries. Retrying
//! means resubmitting the whole pipeline.

use serde::Serialize;

use crate::{
    artifact::ScopedAudioFile,
    config::PipelineConfig,
    error::PipelineError,
    ocr::{
        OcrBackend,
        poll::{PollPolicy, Sleeper, TokioSleeper, poll_to_completion},
    },
    prelude::*,
    storage::{BlobStore, PersistedAudio},
    text::{BoundedText, assemble, bound},
    tts::TtsBackend,
};

/// Content type the persisted audio is stored under.
const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Where a pipeline run currently stands. Logged on every transition and
/// attached to the failure report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Submitted,
    Polling,
    Assembling,
    Bounding,
    Synthesizing,
    Persisting,
    Done,
    Failed,
}

/// What the caller gets back on success.
#[derive(Debug, Clone, Serialize)]
pub struct NarrationSummary {
    /// Character count of the full recognized text.
    pub extracted_chars: usize,
    /// Character count actually synthesized.
    pub used_chars: usize,
    /// Where the narrated audio landed.
    pub audio: PersistedAudio,
}

/// The pipeline orchestrator. Holds the three remote collaborators plus
/// the run configuration; one instance can serve many concurrent runs,
/// since runs share no mutable state.
pub struct Pipeline {
    ocr: Arc<dyn OcrBackend>,
    tts: Arc<dyn TtsBackend>,
    store: Arc<dyn BlobStore>,
    sleeper: Arc<dyn Sleeper>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline over real collaborators, sleeping on the tokio
    /// clock between poll attempts.
    pub fn new(
        ocr: Arc<dyn OcrBackend>,
        tts: Arc<dyn TtsBackend>,
        store: Arc<dyn BlobStore>,
        config: PipelineConfig,
    ) -> Self {
        Self::with_sleeper(ocr, tts, store, Arc::new(TokioSleeper), config)
    }

    /// Like [`Pipeline::new`], but with an explicit time source. Tests use
    /// this to observe poll cadence without real sleeping.
    pub fn with_sleeper(
        ocr: Arc<dyn OcrBackend>,
        tts: Arc<dyn TtsBackend>,
        store: Arc<dyn BlobStore>,
        sleeper: Arc<dyn Sleeper>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            ocr,
            tts,
            store,
            sleeper,
            config,
        }
    }

    /// Run the whole pipeline for one document.
    #[instrument(level = "debug", skip_all, fields(document_id = %document_id))]
    pub async fn run(
        &self,
        document_id: &str,
        voice: Option<&str>,
    ) -> Result<NarrationSummary, PipelineError> {
        let mut stage = Stage::Submitted;
        let result = self.run_stages(&mut stage, document_id, voice).await;
        match &result {
            Ok(summary) => {
                advance(&mut stage, Stage::Done);
                info!(
                    extracted_chars = summary.extracted_chars,
                    used_chars = summary.used_chars,
                    blob_name = %summary.audio.blob_name,
                    "Narration complete"
                );
            }
            Err(err) => {
                let failed_stage = stage;
                advance(&mut stage, Stage::Failed);
                error!(stage = ?failed_stage, error = %err, "Pipeline failed");
            }
        }
        result
    }

    async fn run_stages(
        &self,
        stage: &mut Stage,
        document_id: &str,
        voice: Option<&str>,
    ) -> Result<NarrationSummary, PipelineError> {
        let document_id = validate_document_id(document_id)?;
        let voice = voice.unwrap_or(&self.config.default_voice);

        let source_url = self
            .store
            .read_reference(document_id, read_reference_ttl(&self.config.poll))
            .await?;
        let handle = self.ocr.submit(&source_url).await?;

        advance(stage, Stage::Polling);
        let pages =
            poll_to_completion(&*self.ocr, &handle, &self.config.poll, &*self.sleeper).await?;

        advance(stage, Stage::Assembling);
        let text = assemble(&pages);
        if text.trim().is_empty() {
            // Distinct from a failed job: analysis succeeded, the document
            // just has nothing to read. Synthesis is never attempted.
            return Err(PipelineError::NoTextExtracted);
        }

        advance(stage, Stage::Bounding);
        let bounded = bound(text, self.config.max_chars);
        debug!(
            extracted_chars = bounded.extracted_chars,
            used_chars = bounded.used_chars,
            "Bounded recognized text"
        );

        advance(stage, Stage::Synthesizing);
        let artifact = ScopedAudioFile::new()?;
        let persisted = self
            .synthesize_and_persist(stage, &bounded, voice, &artifact)
            .await;
        // Unconditional: the ephemeral file goes away on success and on
        // every failure past this point. `Drop` backstops a panic.
        artifact.discard();
        let audio = persisted?;

        Ok(NarrationSummary {
            extracted_chars: bounded.extracted_chars,
            used_chars: bounded.used_chars,
            audio,
        })
    }

    async fn synthesize_and_persist(
        &self,
        stage: &mut Stage,
        bounded: &BoundedText,
        voice: &str,
        artifact: &ScopedAudioFile,
    ) -> Result<PersistedAudio, PipelineError> {
        self.tts
            .synthesize(&bounded.text, voice, artifact.path())
            .await?;

        advance(stage, Stage::Persisting);
        self.store.provision().await?;
        self.store.persist(artifact.path(), AUDIO_CONTENT_TYPE).await
    }
}

/// Record a stage transition.
fn advance(stage: &mut Stage, next: Stage) {
    debug!(from = ?stage, to = ?next, "Pipeline stage");
    *stage = next;
}

/// Reject document references storage could misinterpret.
fn validate_document_id(document_id: &str) -> Result<&str, PipelineError> {
    if document_id.trim().is_empty() {
        return Err(PipelineError::InvalidInput(
            "document reference is empty".to_owned(),
        ));
    }
    if document_id.contains('/') || document_id.contains('?') {
        return Err(PipelineError::InvalidInput(format!(
            "document reference {document_id:?} must be a bare blob name"
        )));
    }
    Ok(document_id)
}

/// How long the source read reference must stay valid.
///
/// Doubling the polling budget leaves room for submission latency, with a
/// 15 minute floor matching what the analysis service typically needs for
/// large documents.
fn read_reference_ttl(poll: &PollPolicy) -> Duration {
    const MIN_TTL: Duration = Duration::from_secs(15 * 60);
    MIN_TTL.max(poll.budget() * 2)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::ocr::{JobHandle, JobStatus, Page};

    /// OCR double that replays a fixed status sequence.
    struct ScriptedOcr {
        statuses: Mutex<Vec<JobStatus>>,
        submits: AtomicUsize,
        polls: AtomicUsize,
    }

    impl ScriptedOcr {
        fn new(mut statuses: Vec<JobStatus>) -> Arc<Self> {
            statuses.reverse();
            Arc::new(Self {
                statuses: Mutex::new(statuses),
                submits: AtomicUsize::new(0),
                polls: AtomicUsize::new(0),
            })
        }

        fn succeeded(pages: Vec<Page>) -> Arc<Self> {
            Self::new(vec![JobStatus::Succeeded(pages)])
        }
    }

    #[async_trait]
    impl OcrBackend for ScriptedOcr {
        async fn submit(&self, source_url: &str) -> Result<JobHandle, PipelineError> {
            assert!(source_url.starts_with("test://source/"));
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok(JobHandle::new("test://operations/1"))
        }

        async fn job_status(&self, _handle: &JobHandle) -> Result<JobStatus, PipelineError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .pop()
                .expect("polled past the end of the scripted statuses"))
        }
    }

    /// TTS double that records each call and writes fake MP3 bytes to the
    /// sink, or fails without writing anything.
    struct RecordingTts {
        calls: Mutex<Vec<(String, String, PathBuf)>>,
        fail: bool,
    }

    impl RecordingTts {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn sink_path(&self) -> PathBuf {
            self.calls.lock().unwrap()[0].2.clone()
        }
    }

    #[async_trait]
    impl TtsBackend for RecordingTts {
        async fn synthesize(
            &self,
            text: &str,
            voice: &str,
            out: &Path,
        ) -> Result<(), PipelineError> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_owned(), voice.to_owned(), out.to_owned()));
            if self.fail {
                return Err(PipelineError::Synthesis(anyhow!("voice not found")));
            }
            std::fs::write(out, b"ID3 fake mp3").unwrap();
            Ok(())
        }
    }

    /// In-memory store double with a resource-accounting `persist`.
    struct MemoryStore {
        persisted: Mutex<Vec<(String, Vec<u8>)>>,
        provisions: AtomicUsize,
        fail_persist: bool,
    }

    impl MemoryStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                persisted: Mutex::new(Vec::new()),
                provisions: AtomicUsize::new(0),
                fail_persist: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                persisted: Mutex::new(Vec::new()),
                provisions: AtomicUsize::new(0),
                fail_persist: true,
            })
        }
    }

    #[async_trait]
    impl BlobStore for MemoryStore {
        async fn read_reference(
            &self,
            document_id: &str,
            ttl: Duration,
        ) -> Result<String, PipelineError> {
            // The reference must outlive the polling budget.
            assert!(ttl >= Duration::from_secs(15 * 60));
            Ok(format!("test://source/{document_id}"))
        }

        async fn provision(&self) -> Result<(), PipelineError> {
            self.provisions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn persist(
            &self,
            audio: &Path,
            content_type: &str,
        ) -> Result<PersistedAudio, PipelineError> {
            if self.fail_persist {
                return Err(PipelineError::Persistence(anyhow!("store offline")));
            }
            assert_eq!(content_type, "audio/mpeg");
            let bytes = std::fs::read(audio).unwrap();
            let blob_name = format!("speech-{}.mp3", self.persisted.lock().unwrap().len());
            let url = format!("test://audio/{blob_name}");
            self.persisted.lock().unwrap().push((blob_name.clone(), bytes));
            Ok(PersistedAudio { blob_name, url })
        }
    }

    /// Sleeper double: pipeline tests never sleep for real.
    struct NoSleep;

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    fn pipeline(
        ocr: Arc<ScriptedOcr>,
        tts: Arc<RecordingTts>,
        store: Arc<MemoryStore>,
        config: PipelineConfig,
    ) -> Pipeline {
        Pipeline::with_sleeper(ocr, tts, store, Arc::new(NoSleep), config)
    }

    #[tokio::test]
    async fn narrates_a_small_document_end_to_end() {
        let ocr = ScriptedOcr::succeeded(vec![Page::from_lines(["Hello", "World"])]);
        let tts = RecordingTts::new();
        let store = MemoryStore::new();
        let p = pipeline(
            ocr.clone(),
            tts.clone(),
            store.clone(),
            PipelineConfig::default(),
        );

        let summary = p.run("book.pdf", None).await.unwrap();
        assert_eq!(summary.extracted_chars, 11);
        assert_eq!(summary.used_chars, 11);
        assert!(!summary.audio.blob_name.is_empty());

        // The synthesized bytes made it into the store verbatim.
        let persisted = store.persisted.lock().unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].1, b"ID3 fake mp3");
        assert_eq!(store.provisions.load(Ordering::SeqCst), 1);

        // Default voice applied, full text synthesized.
        let calls = tts.calls.lock().unwrap();
        assert_eq!(calls[0].0, "Hello\nWorld");
        assert_eq!(calls[0].1, "en-US-JennyNeural");
    }

    #[tokio::test]
    async fn empty_document_fails_without_synthesis() {
        let ocr = ScriptedOcr::succeeded(vec![]);
        let tts = RecordingTts::new();
        let store = MemoryStore::new();
        let p = pipeline(ocr, tts.clone(), store.clone(), PipelineConfig::default());

        let err = p.run("blank.pdf", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoTextExtracted));
        assert_eq!(tts.call_count(), 0);
        assert!(store.persisted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn whitespace_only_document_fails_without_synthesis() {
        let ocr = ScriptedOcr::succeeded(vec![Page::from_lines(["   ", "\t"])]);
        let tts = RecordingTts::new();
        let store = MemoryStore::new();
        let p = pipeline(ocr, tts.clone(), store, PipelineConfig::default());

        let err = p.run("blank.pdf", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoTextExtracted));
        assert_eq!(tts.call_count(), 0);
    }

    #[tokio::test]
    async fn times_out_after_exactly_the_configured_attempts() {
        let ocr = ScriptedOcr::new(vec![JobStatus::Pending; 3]);
        let tts = RecordingTts::new();
        let store = MemoryStore::new();
        let config = PipelineConfig {
            poll: PollPolicy {
                max_attempts: 3,
                interval: Duration::from_secs(1),
            },
            ..PipelineConfig::default()
        };
        let p = pipeline(ocr.clone(), tts.clone(), store, config);

        let err = p.run("slow.pdf", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::PollTimedOut { attempts: 3 }));
        assert_eq!(ocr.polls.load(Ordering::SeqCst), 3);
        assert_eq!(tts.call_count(), 0);
    }

    #[tokio::test]
    async fn oversized_text_is_truncated_before_synthesis() {
        let long_line = "x".repeat(6000);
        let ocr = ScriptedOcr::succeeded(vec![Page::from_lines([long_line.as_str()])]);
        let tts = RecordingTts::new();
        let store = MemoryStore::new();
        let p = pipeline(ocr, tts.clone(), store, PipelineConfig::default());

        let summary = p.run("tome.pdf", None).await.unwrap();
        assert_eq!(summary.extracted_chars, 6000);
        assert_eq!(summary.used_chars, 5000);

        let calls = tts.calls.lock().unwrap();
        assert_eq!(calls[0].0.len(), 5000);
        assert_eq!(calls[0].0, long_line[..5000]);
    }

    #[tokio::test]
    async fn caller_chosen_voice_is_forwarded() {
        let ocr = ScriptedOcr::succeeded(vec![Page::from_lines(["hi"])]);
        let tts = RecordingTts::new();
        let store = MemoryStore::new();
        let p = pipeline(ocr, tts.clone(), store, PipelineConfig::default());

        p.run("book.pdf", Some("en-GB-RyanNeural")).await.unwrap();
        assert_eq!(tts.calls.lock().unwrap()[0].1, "en-GB-RyanNeural");
    }

    #[tokio::test]
    async fn analysis_failure_is_reported_as_such() {
        let ocr = ScriptedOcr::new(vec![
            JobStatus::Pending,
            JobStatus::Failed("corrupt file".to_owned()),
        ]);
        let tts = RecordingTts::new();
        let store = MemoryStore::new();
        let p = pipeline(ocr.clone(), tts.clone(), store, PipelineConfig::default());

        let err = p.run("corrupt.pdf", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::AnalysisFailed(reason) if reason == "corrupt file"));
        assert_eq!(ocr.polls.load(Ordering::SeqCst), 2);
        assert_eq!(tts.call_count(), 0);
    }

    #[tokio::test]
    async fn bad_document_references_are_rejected_before_any_remote_call() {
        let ocr = ScriptedOcr::new(vec![]);
        let tts = RecordingTts::new();
        let store = MemoryStore::new();
        let p = pipeline(ocr.clone(), tts, store, PipelineConfig::default());

        for bad in ["", "   ", "books/nested.pdf", "name?sas=1"] {
            let err = p.run(bad, None).await.unwrap_err();
            assert!(matches!(err, PipelineError::InvalidInput(_)), "{bad:?}");
        }
        assert_eq!(ocr.submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ephemeral_audio_is_gone_after_success() {
        let ocr = ScriptedOcr::succeeded(vec![Page::from_lines(["Hello"])]);
        let tts = RecordingTts::new();
        let store = MemoryStore::new();
        let p = pipeline(ocr, tts.clone(), store, PipelineConfig::default());

        p.run("book.pdf", None).await.unwrap();
        assert!(!tts.sink_path().exists());
    }

    #[tokio::test]
    async fn ephemeral_audio_is_gone_after_synthesis_failure() {
        let ocr = ScriptedOcr::succeeded(vec![Page::from_lines(["Hello"])]);
        let tts = RecordingTts::failing();
        let store = MemoryStore::new();
        let p = pipeline(ocr, tts.clone(), store.clone(), PipelineConfig::default());

        let err = p.run("book.pdf", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Synthesis(_)));
        assert!(!tts.sink_path().exists());
        assert!(store.persisted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ephemeral_audio_is_gone_after_persistence_failure() {
        let ocr = ScriptedOcr::succeeded(vec![Page::from_lines(["Hello"])]);
        let tts = RecordingTts::new();
        let store = MemoryStore::failing();
        let p = pipeline(ocr, tts.clone(), store, PipelineConfig::default());

        let err = p.run("book.pdf", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
        assert!(!tts.sink_path().exists());
    }
}
