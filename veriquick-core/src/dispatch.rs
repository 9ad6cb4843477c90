//! Scan-side routing of decoded barcode payloads.
//!
//! A camera reports the same symbol many times a second. The dispatcher
//! latches on a payload so each distinct code is acted on once per latch
//! window:
//!
//! ```text
//! Idle ──decode(p)──▶ Latched{p}  (dispatch)
//! Latched{p} ──decode(p)──▶ Latched{p}  (suppressed)
//! Latched{p} ──decode(q)──▶ Latched{q}  (dispatch)
//! Latched{p} ──window elapsed──▶ Idle
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::{AcceptAll, DocumentType, IdentifierValidator};
use crate::codec::ManifestCodec;
use crate::error::Result;
use crate::manifest::DocumentRecord;

/// How long a dispatched payload stays latched.
pub const DEFAULT_LATCH_WINDOW: Duration = Duration::from_secs(5);

/// Operator feedback signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Cue {
    AadhaarDetected,
    ManualVerification,
    BatchComplete,
    Unrecognized,
}

impl Cue {
    pub fn message(&self) -> &'static str {
        match self {
            Cue::AadhaarDetected => "Aadhaar detected",
            Cue::ManualVerification => "Manual verification needed",
            Cue::BatchComplete => "Batch complete",
            Cue::Unrecognized => "Unrecognized code",
        }
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Plays operator cues (sound, console line, UI flash).
pub trait CuePlayer: Send + Sync {
    fn play(&self, cue: Cue);

    /// Free the output device. Called once when scanning stops.
    fn release(&self) {}
}

/// Opens a document link for the operator.
pub trait LinkOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// Verification verdict for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verification {
    AutoVerified,
    NeedsManualVerification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub document_url: String,
    pub document_type: DocumentType,
    pub verification: Verification,
}

/// What one decoded payload led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Records were routed, in manifest order.
    Dispatched(Vec<RecordOutcome>),
    /// Same payload still latched; nothing done.
    Suppressed,
    /// Payload was not a manifest; signalled once.
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LatchState {
    Idle,
    Latched { payload: String, since: Instant },
}

impl LatchState {
    fn name(&self) -> &'static str {
        match self {
            LatchState::Idle => "idle",
            LatchState::Latched { .. } => "latched",
        }
    }
}

/// Verdict for a single record.
///
/// Only an `Aadhaar` record carrying at least one number, all of which pass
/// `validator`, is auto-verified.
pub fn verify_record(record: &DocumentRecord, validator: &dyn IdentifierValidator) -> Verification {
    let auto = record.document_type == DocumentType::Aadhaar
        && !record.aadhaar_numbers.is_empty()
        && record.aadhaar_numbers.iter().all(|n| validator.validate(n));
    if auto {
        Verification::AutoVerified
    } else {
        Verification::NeedsManualVerification
    }
}

/// Latching dispatcher for decoded payloads.
///
/// Time is passed in by the caller so the latch can be driven by a real
/// clock or by tests.
pub struct ScanDispatcher {
    state: LatchState,
    window: Duration,
    codec: ManifestCodec,
    validator: Arc<dyn IdentifierValidator>,
    opener: Arc<dyn LinkOpener>,
    cues: Arc<dyn CuePlayer>,
}

impl fmt::Debug for ScanDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanDispatcher")
            .field("state", &self.state.name())
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl ScanDispatcher {
    pub fn new(opener: Arc<dyn LinkOpener>, cues: Arc<dyn CuePlayer>) -> Self {
        Self {
            state: LatchState::Idle,
            window: DEFAULT_LATCH_WINDOW,
            codec: ManifestCodec::new(),
            validator: Arc::new(AcceptAll),
            opener,
            cues,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn IdentifierValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Release the cue player.
    pub fn release(&self) {
        self.cues.release();
    }

    pub fn is_latched(&self) -> bool {
        matches!(self.state, LatchState::Latched { .. })
    }

    /// Release the latch once the window has elapsed.
    ///
    /// Called for every frame, including frames with no symbol.
    pub fn tick(&mut self, now: Instant) {
        if let LatchState::Latched { since, .. } = &self.state {
            if now.saturating_duration_since(*since) >= self.window {
                debug!("Latch window elapsed");
                self.state = LatchState::Idle;
            }
        }
    }

    /// Handle one decoded payload seen at `now`.
    pub fn on_decode(&mut self, payload: &str, now: Instant) -> DispatchOutcome {
        self.tick(now);

        if let LatchState::Latched { payload: latched, .. } = &self.state {
            if latched == payload {
                return DispatchOutcome::Suppressed;
            }
        }

        self.state = LatchState::Latched {
            payload: payload.to_string(),
            since: now,
        };

        match self.codec.decode(payload) {
            Ok(manifest) => {
                info!(records = manifest.len(), "Dispatching scanned manifest");
                let outcomes = manifest
                    .files
                    .iter()
                    .map(|record| self.dispatch_record(record))
                    .collect();
                self.cues.play(Cue::BatchComplete);
                DispatchOutcome::Dispatched(outcomes)
            }
            Err(e) => {
                warn!(error = %e, "Unrecognized code");
                self.cues.play(Cue::Unrecognized);
                DispatchOutcome::Unrecognized
            }
        }
    }

    fn dispatch_record(&self, record: &DocumentRecord) -> RecordOutcome {
        let verification = verify_record(record, self.validator.as_ref());
        match verification {
            Verification::AutoVerified => self.cues.play(Cue::AadhaarDetected),
            Verification::NeedsManualVerification => {
                debug!(document_type = %record.document_type, "Needs manual verification");
                self.cues.play(Cue::ManualVerification);
            }
        }

        if let Err(e) = self.opener.open(&record.storage_url) {
            warn!(url = %record.storage_url, error = %e, "Failed to open document link");
        }

        RecordOutcome {
            document_url: record.storage_url.clone(),
            document_type: record.document_type,
            verification,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::VeriquickError;

    #[derive(Default)]
    struct Recorder {
        cues: Mutex<Vec<Cue>>,
        opened: Mutex<Vec<String>>,
    }

    impl CuePlayer for Recorder {
        fn play(&self, cue: Cue) {
            self.cues.lock().unwrap().push(cue);
        }
    }

    impl LinkOpener for Recorder {
        fn open(&self, url: &str) -> Result<()> {
            self.opened.lock().unwrap().push(url.to_string());
            if url.contains("broken") {
                return Err(VeriquickError::Storage("no browser".into()));
            }
            Ok(())
        }
    }

    struct RejectAll;

    impl IdentifierValidator for RejectAll {
        fn validate(&self, _identifier: &str) -> bool {
            false
        }
    }

    fn dispatcher() -> (ScanDispatcher, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let d = ScanDispatcher::new(recorder.clone(), recorder.clone());
        (d, recorder)
    }

    const AADHAAR: &str = r#"{"files":[{"document_url":"https://s/a","document_type":"Aadhaar","aadhaar_numbers":["1234 5678 9123"],"pan_numbers":[]}]}"#;
    const MIXED: &str = r#"{"files":[{"document_url":"https://s/a","document_type":"Aadhaar","aadhaar_numbers":["1234 5678 9123"],"pan_numbers":[]},{"document_url":"https://s/p","document_type":"PAN","aadhaar_numbers":[],"pan_numbers":["ABCDE1234F"]}]}"#;

    #[test]
    fn first_decode_dispatches_once() {
        let (mut d, rec) = dispatcher();
        let t0 = Instant::now();

        let outcome = d.on_decode(AADHAAR, t0);
        assert_eq!(
            outcome,
            DispatchOutcome::Dispatched(vec![RecordOutcome {
                document_url: "https://s/a".into(),
                document_type: DocumentType::Aadhaar,
                verification: Verification::AutoVerified,
            }])
        );
        assert!(d.is_latched());

        // Same payload on every frame for the rest of the window
        for ms in [30, 500, 2000, 4999] {
            assert_eq!(
                d.on_decode(AADHAAR, t0 + Duration::from_millis(ms)),
                DispatchOutcome::Suppressed
            );
        }
        assert_eq!(rec.opened.lock().unwrap().len(), 1);
        assert_eq!(
            *rec.cues.lock().unwrap(),
            vec![Cue::AadhaarDetected, Cue::BatchComplete]
        );
    }

    #[test]
    fn same_code_dispatches_again_after_window() {
        let (mut d, rec) = dispatcher();
        let t0 = Instant::now();
        d.on_decode(AADHAAR, t0);
        assert!(matches!(
            d.on_decode(AADHAAR, t0 + Duration::from_secs(5)),
            DispatchOutcome::Dispatched(_)
        ));
        assert_eq!(rec.opened.lock().unwrap().len(), 2);
    }

    #[test]
    fn different_code_dispatches_immediately() {
        let (mut d, rec) = dispatcher();
        let t0 = Instant::now();
        d.on_decode(AADHAAR, t0);
        let outcome = d.on_decode(MIXED, t0 + Duration::from_millis(100));
        match outcome {
            DispatchOutcome::Dispatched(records) => {
                assert_eq!(records.len(), 2);
                assert_eq!(records[1].verification, Verification::NeedsManualVerification);
            }
            other => panic!("expected dispatch, got {other:?}"),
        }
        assert_eq!(
            *rec.opened.lock().unwrap(),
            vec!["https://s/a", "https://s/a", "https://s/p"]
        );
    }

    #[test]
    fn tick_releases_latch_without_decodes() {
        let (mut d, _) = dispatcher();
        let t0 = Instant::now();
        d.on_decode(AADHAAR, t0);
        d.tick(t0 + Duration::from_secs(1));
        assert!(d.is_latched());
        d.tick(t0 + DEFAULT_LATCH_WINDOW);
        assert!(!d.is_latched());
    }

    #[test]
    fn malformed_payload_signals_once() {
        let (mut d, rec) = dispatcher();
        let t0 = Instant::now();
        assert_eq!(
            d.on_decode("https://example.com", t0),
            DispatchOutcome::Unrecognized
        );
        assert_eq!(
            d.on_decode("https://example.com", t0 + Duration::from_secs(1)),
            DispatchOutcome::Suppressed
        );
        assert_eq!(*rec.cues.lock().unwrap(), vec![Cue::Unrecognized]);
        assert!(rec.opened.lock().unwrap().is_empty());
    }

    #[test]
    fn aadhaar_without_numbers_needs_manual_check() {
        let record = DocumentRecord {
            storage_url: "u".into(),
            document_type: DocumentType::Aadhaar,
            aadhaar_numbers: vec![],
            pan_numbers: vec![],
            source_filename: String::new(),
        };
        assert_eq!(
            verify_record(&record, &AcceptAll),
            Verification::NeedsManualVerification
        );
    }

    #[test]
    fn composite_and_rejected_numbers_need_manual_check() {
        let mut record = DocumentRecord {
            storage_url: "u".into(),
            document_type: DocumentType::AadhaarAndPan,
            aadhaar_numbers: vec!["1234 5678 9123".into()],
            pan_numbers: vec!["ABCDE1234F".into()],
            source_filename: String::new(),
        };
        assert_eq!(
            verify_record(&record, &AcceptAll),
            Verification::NeedsManualVerification
        );

        record.document_type = DocumentType::Aadhaar;
        assert_eq!(verify_record(&record, &AcceptAll), Verification::AutoVerified);
        assert_eq!(
            verify_record(&record, &RejectAll),
            Verification::NeedsManualVerification
        );
    }

    #[test]
    fn opener_failure_does_not_stop_batch() {
        let (d, rec) = dispatcher();
        let mut d = d.with_window(Duration::from_millis(10));
        let payload = r#"{"files":[{"document_url":"https://broken/a","document_type":"Other"},{"document_url":"https://s/b","document_type":"Marksheet"}]}"#;
        match d.on_decode(payload, Instant::now()) {
            DispatchOutcome::Dispatched(records) => assert_eq!(records.len(), 2),
            other => panic!("expected dispatch, got {other:?}"),
        }
        assert_eq!(rec.opened.lock().unwrap().len(), 2);
        assert_eq!(
            rec.cues.lock().unwrap().last().copied(),
            Some(Cue::BatchComplete)
        );
    }
}
