//! Frame-driven scan loop.
//!
//! Frames are pulled from a [`FrameSource`] and decoded on the blocking pool
//! under a timeout, then fed to a [`ScanDispatcher`]. The loop stops when the
//! source runs dry or the shutdown channel flips, and always releases the
//! source and the cue player on the way out.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::DynamicImage;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::barcode::BarcodeCodec;
use crate::dispatch::{DispatchOutcome, ScanDispatcher};
use crate::error::{Result, VeriquickError};

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// A stream of camera-like frames. Reads may block; the scan loop calls
/// them on the blocking pool.
pub trait FrameSource: Send + 'static {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<DynamicImage>>;

    /// Free the device. Called once when the loop exits.
    fn release(&mut self) {}
}

/// Frames read from image files, in the order given.
#[derive(Debug, Default)]
pub struct ImageFileSource {
    pending: VecDeque<PathBuf>,
}

impl ImageFileSource {
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            pending: paths.into_iter().collect(),
        }
    }

    /// Every PNG or JPEG file directly inside `dir`, sorted by name.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            VeriquickError::Image(format!("Failed to read {}: {e}", dir.display()))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        paths.sort();
        Ok(Self::from_paths(paths))
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for ImageFileSource {
    fn next_frame(&mut self) -> Result<Option<DynamicImage>> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        debug!(path = %path.display(), "Reading frame");
        image::open(&path)
            .map(Some)
            .map_err(|e| VeriquickError::Image(format!("Failed to read {}: {e}", path.display())))
    }

    fn release(&mut self) {
        self.pending.clear();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    /// Pause between frames
    pub frame_interval: Duration,
    /// Upper bound for one decode
    pub decode_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(30),
            decode_timeout: Duration::from_secs(2),
        }
    }
}

/// Counters for one scan session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub frames: u64,
    pub decoded: u64,
    pub dispatched: u64,
    pub suppressed: u64,
    pub unrecognized: u64,
    pub unreadable: u64,
    pub timeouts: u64,
    /// Frames dropped while a timed-out decode was still running
    pub skipped: u64,
}

/// Run until the source is exhausted or `shutdown` becomes `true`.
///
/// Frames are read and decoded on the blocking pool. Unreadable frames and
/// slow decodes are counted and skipped; while a timed-out decode is still
/// running, new frames are counted as skipped instead of stacking more work.
pub async fn run_scan_loop(
    source: Box<dyn FrameSource>,
    dispatcher: &mut ScanDispatcher,
    barcode: Arc<BarcodeCodec>,
    config: ScanConfig,
    mut shutdown: watch::Receiver<bool>,
) -> ScanSummary {
    let mut summary = ScanSummary::default();
    let mut source = Some(source);
    let mut in_flight: Option<JoinHandle<Option<String>>> = None;
    info!("Scanner started");

    loop {
        if *shutdown.borrow() {
            debug!("Shutdown requested");
            break;
        }

        let Some(mut current) = source.take() else {
            break;
        };
        let read = tokio::task::spawn_blocking(move || {
            let frame = current.next_frame();
            (current, frame)
        })
        .await;
        let frame = match read {
            Ok((current, frame)) => {
                source = Some(current);
                frame
            }
            Err(e) => {
                warn!(error = %e, "Frame source task failed");
                break;
            }
        };

        match frame {
            Ok(Some(frame)) => {
                summary.frames += 1;
                if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
                    debug!("Previous decode still running, skipping frame");
                    summary.skipped += 1;
                } else {
                    in_flight =
                        decode_and_dispatch(frame, dispatcher, &barcode, config, &mut summary)
                            .await;
                }
            }
            Ok(None) => {
                debug!("Frame source exhausted");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Error reading frame");
                summary.unreadable += 1;
            }
        }

        if !config.frame_interval.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(config.frame_interval) => {}
                changed = shutdown.changed() => match changed {
                    Ok(()) if *shutdown.borrow() => break,
                    Ok(()) => {}
                    // Sender gone: nobody can ask us to stop, keep pacing
                    Err(_) => tokio::time::sleep(config.frame_interval).await,
                },
            }
        }
    }

    match source {
        Some(mut current) => current.release(),
        None => warn!("Frame source lost, cannot release it"),
    }
    dispatcher.release();
    info!(
        frames = summary.frames,
        dispatched = summary.dispatched,
        skipped = summary.skipped,
        "Scanner stopped"
    );
    summary
}

/// Returns the decode handle when it outlives the timeout.
async fn decode_and_dispatch(
    frame: DynamicImage,
    dispatcher: &mut ScanDispatcher,
    barcode: &Arc<BarcodeCodec>,
    config: ScanConfig,
    summary: &mut ScanSummary,
) -> Option<JoinHandle<Option<String>>> {
    let codec = Arc::clone(barcode);
    let mut decode = tokio::task::spawn_blocking(move || codec.decode(&frame));
    match tokio::time::timeout(config.decode_timeout, &mut decode).await {
        Ok(Ok(Some(payload))) => {
            summary.decoded += 1;
            match dispatcher.on_decode(&payload, Instant::now()) {
                DispatchOutcome::Dispatched(_) => summary.dispatched += 1,
                DispatchOutcome::Suppressed => summary.suppressed += 1,
                DispatchOutcome::Unrecognized => summary.unrecognized += 1,
            }
            None
        }
        Ok(Ok(None)) => {
            dispatcher.tick(Instant::now());
            None
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Decode task failed");
            summary.unreadable += 1;
            None
        }
        Err(_) => {
            warn!(timeout_ms = config.decode_timeout.as_millis() as u64, "Decode timed out");
            summary.timeouts += 1;
            Some(decode)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use image::GrayImage;

    use super::*;
    use crate::barcode::BarcodeOptions;
    use crate::dispatch::{Cue, CuePlayer, LinkOpener};

    #[derive(Default)]
    struct Recorder {
        cues: Mutex<Vec<Cue>>,
        opened: Mutex<Vec<String>>,
        released: AtomicBool,
    }

    impl CuePlayer for Recorder {
        fn play(&self, cue: Cue) {
            self.cues.lock().unwrap().push(cue);
        }

        fn release(&self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    impl LinkOpener for Recorder {
        fn open(&self, url: &str) -> Result<()> {
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    /// Replays in-memory frames.
    struct VecSource {
        frames: VecDeque<Result<DynamicImage>>,
        released: Arc<AtomicBool>,
    }

    impl VecSource {
        fn new(frames: Vec<Result<DynamicImage>>) -> (Self, Arc<AtomicBool>) {
            let released = Arc::new(AtomicBool::new(false));
            let source = Self {
                frames: frames.into(),
                released: released.clone(),
            };
            (source, released)
        }
    }

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<DynamicImage>> {
            self.frames.pop_front().transpose()
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn qr_frame(payload: &str) -> DynamicImage {
        let codec = BarcodeCodec::new(BarcodeOptions {
            module_size: 4,
            ..BarcodeOptions::default()
        });
        DynamicImage::ImageLuma8(codec.encode(payload).unwrap())
    }

    fn blank_frame() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, image::Luma([255])))
    }

    const PAYLOAD: &str = r#"{"files":[{"document_url":"https://s/a","document_type":"Aadhaar","aadhaar_numbers":["1234 5678 9123"],"pan_numbers":[]}]}"#;

    fn no_shutdown() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    fn fast() -> ScanConfig {
        ScanConfig {
            frame_interval: Duration::ZERO,
            decode_timeout: Duration::from_secs(10),
        }
    }

    #[tokio::test]
    async fn repeated_frames_dispatch_once() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = ScanDispatcher::new(recorder.clone(), recorder.clone());
        let (source, released) = VecSource::new(vec![
            Ok(qr_frame(PAYLOAD)),
            Ok(blank_frame()),
            Ok(qr_frame(PAYLOAD)),
            Err(VeriquickError::Image("camera hiccup".into())),
            Ok(qr_frame("not a manifest")),
        ]);

        let summary = run_scan_loop(
            Box::new(source),
            &mut dispatcher,
            Arc::new(BarcodeCodec::default()),
            fast(),
            no_shutdown(),
        )
        .await;

        assert_eq!(summary.frames, 4);
        assert_eq!(summary.decoded, 3);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.suppressed, 1);
        assert_eq!(summary.unrecognized, 1);
        assert_eq!(summary.unreadable, 1);
        assert_eq!(summary.timeouts + summary.skipped, 0);
        assert_eq!(*recorder.opened.lock().unwrap(), vec!["https://s/a"]);
        assert!(released.load(Ordering::SeqCst));
        assert!(recorder.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_stops_before_next_frame() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = ScanDispatcher::new(recorder.clone(), recorder.clone());
        let (source, released) = VecSource::new(vec![Ok(qr_frame(PAYLOAD))]);

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let summary = run_scan_loop(
            Box::new(source),
            &mut dispatcher,
            Arc::new(BarcodeCodec::default()),
            fast(),
            rx,
        )
        .await;

        assert_eq!(summary.frames, 0);
        assert!(released.load(Ordering::SeqCst));
        assert!(recorder.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_decode_times_out_and_loop_moves_on() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = ScanDispatcher::new(recorder.clone(), recorder.clone());
        let big = || DynamicImage::ImageLuma8(GrayImage::from_pixel(1600, 1600, image::Luma([255])));
        let (source, released) = VecSource::new(vec![Ok(big()), Ok(big()), Ok(big())]);

        let config = ScanConfig {
            frame_interval: Duration::ZERO,
            decode_timeout: Duration::ZERO,
        };
        let summary = run_scan_loop(
            Box::new(source),
            &mut dispatcher,
            Arc::new(BarcodeCodec::default()),
            config,
            no_shutdown(),
        )
        .await;

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.decoded, 0);
        assert!(summary.timeouts >= 1);
        // Every frame either timed out or was skipped behind a running decode
        assert_eq!(summary.timeouts + summary.skipped, 3);
        assert!(released.load(Ordering::SeqCst));
        assert!(recorder.released.load(Ordering::SeqCst));
        assert!(recorder.opened.lock().unwrap().is_empty());
    }

    #[test]
    fn dir_source_picks_images_in_name_order() {
        let dir = std::env::temp_dir().join(format!("veriquick-frames-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["b.png", "a.JPG", "notes.txt"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }

        let source = ImageFileSource::from_dir(&dir).unwrap();
        let names: Vec<_> = source
            .pending
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let mut source = ImageFileSource::from_paths([PathBuf::from("/nonexistent/frame.png")]);
        assert!(source.next_frame().is_err());
        assert!(source.next_frame().unwrap().is_none());
    }
}
