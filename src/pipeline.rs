//! The capture-analyze-feedback loop.
//!
//! One background worker cycles through listening, recognition,
//! analysis, and persistence for the lifetime of the process. A failed
//! cycle appends a synthetic error entry and the loop keeps going; only
//! a capture failure stops the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, error, info, warn};

use crate::classify::{classify_sentiment, classify_tone};
use crate::coaching::coaching_feedback;
use crate::export::CsvExporter;
use crate::history::InteractionHistory;
use crate::transcription::{ListenError, SpeechSource};

/// Where the loop worker currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Idle,
    Listening,
    Recognizing,
    Analyzing,
    Persisting,
}

impl PipelinePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::Listening => "listening",
            PipelinePhase::Recognizing => "recognizing",
            PipelinePhase::Analyzing => "analyzing",
            PipelinePhase::Persisting => "persisting",
        }
    }
}

/// Shared cell the worker writes its current phase into.
///
/// The speech source holds a clone too, so the listening-to-recognizing
/// transition is visible even though it happens inside `listen_once`.
pub struct PhaseCell(Mutex<PipelinePhase>);

impl PhaseCell {
    pub fn new() -> Self {
        Self(Mutex::new(PipelinePhase::Idle))
    }

    pub fn set(&self, phase: PipelinePhase) {
        *self.0.lock().unwrap() = phase;
    }

    pub fn get(&self) -> PipelinePhase {
        *self.0.lock().unwrap()
    }
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}

/// What one pass of the loop produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A record with a recognized transcript was appended.
    Recorded,
    /// A synthetic error entry was appended.
    RecordedError,
    /// The speech source failed permanently; the worker must stop.
    Fatal(String),
}

/// Run one listen-classify-persist cycle.
///
/// Recoverable listen failures and empty transcripts become error
/// entries so the history shows every cycle. A failed mirror write is
/// logged but does not invalidate the in-memory record.
pub fn run_cycle(
    source: &mut dyn SpeechSource,
    history: &InteractionHistory,
    exporter: &mut CsvExporter,
    phase: &PhaseCell,
) -> CycleOutcome {
    phase.set(PipelinePhase::Listening);
    debug!("Listening...");

    let outcome;
    let (transcript, sentiment, tone, feedback) = match source.listen_once() {
        Ok(text) if !text.trim().is_empty() => {
            let text = text.trim().to_string();
            info!("Transcribed: {}", text);

            phase.set(PipelinePhase::Analyzing);
            let sentiment = classify_sentiment(&text).label().to_string();
            let tone = classify_tone(&text).label().to_string();
            let feedback = coaching_feedback(&sentiment, &tone);
            info!("{}", feedback);

            outcome = CycleOutcome::Recorded;
            (text, sentiment, tone, feedback)
        }
        Ok(_) => {
            warn!("Recognizer returned empty text, recording as no speech");
            outcome = CycleOutcome::RecordedError;
            error_fields(&ListenError::NoSpeech)
        }
        Err(err) if err.is_fatal() => {
            error!("{}", err);
            phase.set(PipelinePhase::Idle);
            return CycleOutcome::Fatal(err.to_string());
        }
        Err(err) => {
            warn!("{}", err);
            outcome = CycleOutcome::RecordedError;
            error_fields(&err)
        }
    };

    phase.set(PipelinePhase::Persisting);
    let record = history.append(transcript, sentiment, tone, feedback);
    if let Err(err) = exporter.append(&record) {
        error!("Failed to mirror record {}: {:#}", record.sequence, err);
    }

    outcome
}

fn error_fields(err: &ListenError) -> (String, String, String, String) {
    (
        String::new(),
        "UNKNOWN".to_string(),
        "UNKNOWN".to_string(),
        err.describe(),
    )
}

/// Owns the loop worker thread.
pub struct CoachingPipeline {
    history: Arc<InteractionHistory>,
    phase: Arc<PhaseCell>,
    fatal: Arc<Mutex<Option<String>>>,
    is_active: Arc<AtomicBool>,
    worker_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CoachingPipeline {
    pub fn new(history: Arc<InteractionHistory>) -> Self {
        Self {
            history,
            phase: Arc::new(PhaseCell::new()),
            fatal: Arc::new(Mutex::new(None)),
            is_active: Arc::new(AtomicBool::new(false)),
            worker_handle: Mutex::new(None),
        }
    }

    /// Spawn the worker. `source` and `exporter` move into the thread
    /// and stay there until `stop`.
    pub fn start(&self, mut source: Box<dyn SpeechSource>, mut exporter: CsvExporter) {
        if self.is_active.load(Ordering::SeqCst) {
            warn!("Coaching pipeline already running");
            return;
        }
        self.is_active.store(true, Ordering::SeqCst);

        let history = self.history.clone();
        let phase = self.phase.clone();
        let fatal = self.fatal.clone();
        let is_active = self.is_active.clone();

        let handle = thread::spawn(move || {
            info!("Coaching pipeline started");
            while is_active.load(Ordering::SeqCst) {
                match run_cycle(source.as_mut(), &history, &mut exporter, &phase) {
                    CycleOutcome::Fatal(cause) => {
                        *fatal.lock().unwrap() = Some(cause);
                        is_active.store(false, Ordering::SeqCst);
                    }
                    CycleOutcome::Recorded | CycleOutcome::RecordedError => {}
                }
            }
            phase.set(PipelinePhase::Idle);
            info!("Coaching pipeline stopped");
        });

        *self.worker_handle.lock().unwrap() = Some(handle);
    }

    /// Signal the worker to stop and wait for the current cycle to
    /// finish.
    pub fn stop(&self) {
        self.is_active.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker_handle.lock().unwrap().take() {
            if handle.join().is_err() {
                warn!("Coaching pipeline worker panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    /// Cause of a worker-stopping failure, if one happened.
    pub fn fatal_error(&self) -> Option<String> {
        self.fatal.lock().unwrap().clone()
    }

    pub fn phase_cell(&self) -> Arc<PhaseCell> {
        self.phase.clone()
    }

    pub fn current_phase(&self) -> PipelinePhase {
        self.phase.get()
    }
}

impl Drop for CoachingPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    /// Replays a fixed script, then fails like a dead microphone.
    struct ScriptedSource {
        script: VecDeque<Result<String, ListenError>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<String, ListenError>>) -> Self {
            Self {
                script: script.into_iter().collect(),
            }
        }
    }

    impl SpeechSource for ScriptedSource {
        fn listen_once(&mut self) -> Result<String, ListenError> {
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(ListenError::CaptureFailed("script exhausted".to_string())))
        }
    }

    struct RepeatingSource;

    impl SpeechSource for RepeatingSource {
        fn listen_once(&mut self) -> Result<String, ListenError> {
            thread::sleep(Duration::from_millis(10));
            Ok("all good".to_string())
        }
    }

    fn wait_until(timeout_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn fixture() -> (TempDir, InteractionHistory, CsvExporter, PhaseCell) {
        let dir = TempDir::new().unwrap();
        let exporter = CsvExporter::new(dir.path().join("transcriptions.csv"));
        (dir, InteractionHistory::new(0), exporter, PhaseCell::new())
    }

    fn csv_data_rows(exporter: &CsvExporter) -> Vec<Vec<String>> {
        let mut reader = csv::Reader::from_path(exporter.path()).unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect()
    }

    #[test]
    fn test_cycle_records_transcript_labels_and_advice() {
        let (_dir, history, mut exporter, phase) = fixture();
        let mut source =
            ScriptedSource::new(vec![Ok("The product is great and works".to_string())]);

        let outcome = run_cycle(&mut source, &history, &mut exporter, &phase);

        assert_eq!(outcome, CycleOutcome::Recorded);
        let records = history.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].transcript, "The product is great and works");
        assert_eq!(records[0].sentiment, "POSITIVE");
        assert_eq!(records[0].tone, "happy");
        assert_eq!(
            records[0].feedback,
            "Feedback: Sentiment is POSITIVE with tone happy. Buyer is engaged. Keep up the positive flow."
        );
        assert_eq!(phase.get(), PipelinePhase::Persisting);

        let rows = csv_data_rows(&exporter);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "The product is great and works");
    }

    #[test]
    fn test_failed_cycle_appends_error_entry() {
        let (_dir, history, mut exporter, phase) = fixture();
        let mut source = ScriptedSource::new(vec![Err(ListenError::ServiceUnavailable(
            "stt down".to_string(),
        ))]);

        let outcome = run_cycle(&mut source, &history, &mut exporter, &phase);

        assert_eq!(outcome, CycleOutcome::RecordedError);
        let records = history.snapshot();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_error());
        assert_eq!(records[0].sentiment, "UNKNOWN");
        assert_eq!(records[0].tone, "UNKNOWN");
        assert_eq!(records[0].feedback, "Error: stt down");

        let rows = csv_data_rows(&exporter);
        assert_eq!(rows[0][3], "Error: stt down");
    }

    #[test]
    fn test_whitespace_transcript_becomes_no_speech_entry() {
        let (_dir, history, mut exporter, phase) = fixture();
        let mut source = ScriptedSource::new(vec![Ok("   ".to_string())]);

        let outcome = run_cycle(&mut source, &history, &mut exporter, &phase);

        assert_eq!(outcome, CycleOutcome::RecordedError);
        assert_eq!(
            history.snapshot()[0].feedback,
            "Error: Could not understand the audio."
        );
    }

    #[test]
    fn test_fatal_capture_failure_records_nothing() {
        let (_dir, history, mut exporter, phase) = fixture();
        let mut source =
            ScriptedSource::new(vec![Err(ListenError::CaptureFailed("mic gone".to_string()))]);

        let outcome = run_cycle(&mut source, &history, &mut exporter, &phase);

        assert!(matches!(outcome, CycleOutcome::Fatal(_)));
        assert!(history.is_empty());
        assert!(!exporter.path().exists());
        assert_eq!(phase.get(), PipelinePhase::Idle);
    }

    #[test]
    fn test_mirror_failure_keeps_record_visible() {
        let dir = TempDir::new().unwrap();
        let history = InteractionHistory::new(0);
        // A directory as the output path makes every CSV open fail.
        let mut exporter = CsvExporter::new(dir.path());
        let phase = PhaseCell::new();
        let mut source = ScriptedSource::new(vec![Ok("I love this product!".to_string())]);

        let outcome = run_cycle(&mut source, &history, &mut exporter, &phase);

        assert_eq!(outcome, CycleOutcome::Recorded);
        let records = history.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sequence, 1);
        assert_eq!(records[0].transcript, "I love this product!");
        assert_eq!(records[0].sentiment, "POSITIVE");
        assert!(!records[0].is_error());
    }

    #[test]
    fn test_mixed_cycles_keep_order_and_mirror_parity() {
        let (_dir, history, mut exporter, phase) = fixture();
        let mut source = ScriptedSource::new(vec![
            Ok("The product is great and works".to_string()),
            Err(ListenError::NoSpeech),
            Ok("I want a refund, this is broken".to_string()),
        ]);

        for _ in 0..3 {
            run_cycle(&mut source, &history, &mut exporter, &phase);
        }

        let records = history.snapshot();
        let sequences: Vec<u64> = records.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert!(!records[0].is_error());
        assert!(records[1].is_error());
        assert_eq!(records[1].feedback, "Error: Could not understand the audio.");
        assert_eq!(records[2].sentiment, "NEGATIVE");

        let rows = csv_data_rows(&exporter);
        assert_eq!(rows.len(), 3);
        for (row, record) in rows.iter().zip(&records) {
            assert_eq!(row[0], record.transcript);
            assert_eq!(row[1], record.sentiment);
            assert_eq!(row[2], record.tone);
            assert_eq!(row[3], record.feedback);
        }
    }

    #[test]
    fn test_worker_records_until_stopped() {
        let dir = TempDir::new().unwrap();
        let history = Arc::new(InteractionHistory::new(0));
        let pipeline = CoachingPipeline::new(history.clone());

        pipeline.start(
            Box::new(RepeatingSource),
            CsvExporter::new(dir.path().join("transcriptions.csv")),
        );
        assert!(pipeline.is_running());
        assert!(wait_until(2000, || history.len() >= 2));

        pipeline.stop();
        assert!(!pipeline.is_running());
        assert!(pipeline.fatal_error().is_none());
        assert_eq!(pipeline.current_phase(), PipelinePhase::Idle);

        let len_after_stop = history.len();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(history.len(), len_after_stop);
    }

    #[test]
    fn test_worker_stops_itself_on_fatal_failure() {
        let dir = TempDir::new().unwrap();
        let history = Arc::new(InteractionHistory::new(0));
        let pipeline = CoachingPipeline::new(history.clone());

        let source = ScriptedSource::new(vec![
            Ok("hello there".to_string()),
            Ok("still here".to_string()),
        ]);
        pipeline.start(
            Box::new(source),
            CsvExporter::new(dir.path().join("transcriptions.csv")),
        );

        assert!(wait_until(2000, || !pipeline.is_running()));
        assert_eq!(pipeline.fatal_error().as_deref(), Some("audio capture failed: script exhausted"));
        assert_eq!(history.len(), 2);
        pipeline.stop();
    }

    #[test]
    fn test_phase_cell_labels() {
        let cell = PhaseCell::new();
        assert_eq!(cell.get(), PipelinePhase::Idle);
        cell.set(PipelinePhase::Recognizing);
        assert_eq!(cell.get(), PipelinePhase::Recognizing);
        assert_eq!(PipelinePhase::Listening.as_str(), "listening");
        assert_eq!(PipelinePhase::Persisting.as_str(), "persisting");
    }
}
