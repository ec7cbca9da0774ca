//! Per-stream worker thread.
//!
//! Each active stream gets one dedicated thread that pulls a frame, reads the current slider
//! value, runs the shared `FrameProcessor`, encodes the result as JPEG, and publishes it to a
//! `LatestFrame` slot. Viewers only ever see the newest frame; slow viewers skip frames.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::frame::{SharedThreshold, DEFAULT_JPEG_QUALITY};
use crate::ingest::FrameSource;
use crate::overlay::Diagnostic;
use crate::processor::FrameProcessor;

const RECONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// One published, encoded frame.
#[derive(Clone, Debug)]
pub struct PublishedFrame {
    /// Increases by one per published frame, starting at 1.
    pub seq: u64,
    pub jpeg: Arc<Vec<u8>>,
    pub detections: usize,
    pub diagnostic: Option<Diagnostic>,
}

/// Single-slot mailbox holding the newest annotated frame.
#[derive(Debug, Default)]
pub struct LatestFrame {
    slot: Mutex<Option<PublishedFrame>>,
    ready: Condvar,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame and wake waiting viewers. Returns the assigned sequence.
    pub fn publish(
        &self,
        jpeg: Vec<u8>,
        detections: usize,
        diagnostic: Option<Diagnostic>,
    ) -> Result<u64> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|_| anyhow!("latest frame lock poisoned"))?;
        let seq = guard.as_ref().map_or(1, |frame| frame.seq + 1);
        *guard = Some(PublishedFrame {
            seq,
            jpeg: Arc::new(jpeg),
            detections,
            diagnostic,
        });
        self.ready.notify_all();
        Ok(seq)
    }

    pub fn latest(&self) -> Option<PublishedFrame> {
        self.slot.lock().ok().and_then(|guard| guard.clone())
    }

    /// Block until a frame newer than `after_seq` exists, or `timeout` passes.
    pub fn wait_newer(&self, after_seq: u64, timeout: Duration) -> Option<PublishedFrame> {
        let guard = self.slot.lock().ok()?;
        let (guard, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |slot| {
                slot.as_ref().map_or(true, |frame| frame.seq <= after_seq)
            })
            .ok()?;
        guard.as_ref().filter(|frame| frame.seq > after_seq).cloned()
    }
}

/// Counters shared between the worker and the health endpoint.
#[derive(Debug, Default)]
pub struct StreamStats {
    frames_processed: AtomicU64,
    frames_degraded: AtomicU64,
    source_errors: AtomicU64,
}

impl StreamStats {
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn frames_degraded(&self) -> u64 {
        self.frames_degraded.load(Ordering::Relaxed)
    }

    pub fn source_errors(&self) -> u64 {
        self.source_errors.load(Ordering::Relaxed)
    }
}

/// Everything a worker shares with the outside world.
#[derive(Clone)]
pub struct StreamShared {
    pub processor: Arc<FrameProcessor>,
    pub threshold: SharedThreshold,
    pub latest: Arc<LatestFrame>,
    pub stats: Arc<StreamStats>,
}

impl StreamShared {
    pub fn new(processor: FrameProcessor, threshold: SharedThreshold) -> Self {
        Self {
            processor: Arc::new(processor),
            threshold,
            latest: Arc::new(LatestFrame::new()),
            stats: Arc::new(StreamStats::default()),
        }
    }
}

#[derive(Debug)]
pub struct StreamHandle {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("stream worker thread panicked"))?;
        }
        Ok(())
    }
}

pub struct StreamWorker {
    source: Box<dyn FrameSource>,
    shared: StreamShared,
    frame_interval: Duration,
}

impl StreamWorker {
    pub fn new(source: Box<dyn FrameSource>, shared: StreamShared, target_fps: u32) -> Self {
        Self {
            source,
            shared,
            frame_interval: frame_interval(target_fps),
        }
    }

    /// Connect the source and start the worker thread.
    pub fn spawn(mut self) -> Result<StreamHandle> {
        self.source.connect()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("stream-worker".to_string())
            .spawn(move || self.run(&shutdown_thread))?;
        Ok(StreamHandle {
            shutdown,
            join: Some(join),
        })
    }

    fn run(mut self, shutdown: &AtomicBool) {
        log::info!(
            "stream worker started on {} ({:?} per frame)",
            self.source.describe(),
            self.frame_interval
        );
        while !shutdown.load(Ordering::SeqCst) {
            let started = Instant::now();
            if let Err(err) = self.step() {
                self.shared.stats.source_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("stream {}: {:#}", self.source.describe(), err);
                std::thread::sleep(RECONNECT_BACKOFF);
                if !self.source.is_healthy() {
                    if let Err(err) = self.source.connect() {
                        log::warn!("stream {}: reconnect failed: {:#}", self.source.describe(), err);
                    }
                }
                continue;
            }
            if let Some(rest) = self.frame_interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        log::info!("stream worker on {} stopped", self.source.describe());
    }

    /// Capture, process and publish one frame.
    pub fn step(&mut self) -> Result<u64> {
        let frame = self.source.next_frame()?;
        let threshold = self.shared.threshold.get();
        let processed = self.shared.processor.process_report(frame, threshold);
        let jpeg = processed.frame.encode_jpeg(DEFAULT_JPEG_QUALITY)?;

        let stats = &self.shared.stats;
        stats.frames_processed.fetch_add(1, Ordering::Relaxed);
        if processed.diagnostic.is_some() {
            stats.frames_degraded.fetch_add(1, Ordering::Relaxed);
        }
        self.shared
            .latest
            .publish(jpeg, processed.detections.len(), processed.diagnostic)
    }
}

fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(1000 / target_fps as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, StubBackend};
    use crate::frame::{ConfidenceThreshold, Frame};
    use crate::ingest::{FileConfig, FileSource};

    fn stub_source() -> Box<dyn FrameSource> {
        Box::new(
            FileSource::new(FileConfig {
                path: "stub://test".to_string(),
                width: 64,
                height: 48,
                ..FileConfig::default()
            })
            .unwrap(),
        )
    }

    #[test]
    fn step_publishes_annotated_frames_with_current_threshold() -> Result<()> {
        let stub = StubBackend::new(vec![
            Detection::new(0.1, 0.1, 0.3, 0.3, 0.9, 0, "person"),
            Detection::new(0.5, 0.5, 0.3, 0.3, 0.3, 1, "cup"),
        ]);
        let threshold = SharedThreshold::new(ConfidenceThreshold::new(0.6));
        let shared = StreamShared::new(FrameProcessor::new(Arc::new(stub)), threshold.clone());
        let mut worker = StreamWorker::new(stub_source(), shared.clone(), 10);
        worker.source.connect()?;

        assert_eq!(worker.step()?, 1);
        assert_eq!(shared.latest.latest().unwrap().detections, 1);

        threshold.set(ConfidenceThreshold::new(0.2));
        assert_eq!(worker.step()?, 2);
        let latest = shared.latest.latest().unwrap();
        assert_eq!(latest.detections, 2);
        assert_eq!(Frame::decode(&latest.jpeg)?.dimensions(), (64, 48));
        assert_eq!(shared.stats.frames_processed(), 2);
        assert_eq!(shared.stats.frames_degraded(), 0);
        Ok(())
    }

    #[test]
    fn unloaded_model_counts_degraded_frames() -> Result<()> {
        let shared = StreamShared::new(FrameProcessor::unloaded(), SharedThreshold::default());
        let mut worker = StreamWorker::new(stub_source(), shared.clone(), 10);
        worker.source.connect()?;
        worker.step()?;
        let latest = shared.latest.latest().unwrap();
        assert_eq!(latest.diagnostic, Some(Diagnostic::ModelNotLoaded));
        assert_eq!(shared.stats.frames_degraded(), 1);
        Ok(())
    }

    #[test]
    fn spawned_worker_publishes_until_stopped() -> Result<()> {
        let shared = StreamShared::new(
            FrameProcessor::new(Arc::new(StubBackend::demo())),
            SharedThreshold::default(),
        );
        let handle = StreamWorker::new(stub_source(), shared.clone(), 50).spawn()?;
        let first = shared
            .latest
            .wait_newer(0, Duration::from_secs(5))
            .expect("first frame");
        let next = shared
            .latest
            .wait_newer(first.seq, Duration::from_secs(5))
            .expect("second frame");
        assert!(next.seq > first.seq);
        handle.stop()?;
        Ok(())
    }

    #[test]
    fn wait_newer_times_out_without_frames() {
        let latest = LatestFrame::new();
        assert!(latest.wait_newer(0, Duration::from_millis(20)).is_none());
    }
}
