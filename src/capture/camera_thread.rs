use super::{check_track, Frame, VideoTrack};
use crate::pacing::{Clock, FrameStats, Pacer, PacingConfig, SystemClock};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives each paced frame. Errors are logged by the loop and never stop it.
pub type FrameCallback = Box<dyn FnMut(Frame) -> Result<()>>;

/// Requests a cooperative stop from any thread
///
/// The capture loop only observes the request between iterations; an
/// in-flight grab or detection call always completes first.
#[derive(Clone, Debug)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl StopHandle {
    /// Stop the current run; a later `start()` resumes capture
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop for good: the current run ends and every later `start()` is a
    /// no-op, even when the request lands before the loop has started
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.stop();
    }
}

/// Owns the bound video track and drives the paced capture loop
pub struct CameraThread<T: VideoTrack, C: Clock = SystemClock> {
    track: Option<T>,
    clock: C,
    pacer: Pacer,
    stats_interval: u64,
    stats: FrameStats,
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    callback: FrameCallback,
}

impl<T: VideoTrack> CameraThread<T, SystemClock> {
    pub fn new(config: PacingConfig) -> Self {
        Self::with_clock(config, SystemClock::new())
    }
}

impl<T: VideoTrack, C: Clock> CameraThread<T, C> {
    pub fn with_clock(config: PacingConfig, clock: C) -> Self {
        Self {
            track: None,
            clock,
            pacer: Pacer::new(config.target_interval()),
            stats_interval: config.stats_interval(),
            stats: FrameStats::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            callback: Box::new(|_| Ok(())),
        }
    }

    /// Bind a video track, releasing any previously bound one first
    ///
    /// Returns false and leaves nothing bound when the track is missing,
    /// not live, disabled, or muted.
    pub fn init(&mut self, track: Option<T>) -> bool {
        self.release();

        if let Err(e) = check_track(track.as_ref()) {
            tracing::warn!("Cannot bind video track: {}", e);
            return false;
        }

        self.track = track;
        tracing::info!("Video track bound");
        true
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(Frame) -> Result<()> + 'static,
    {
        self.callback = Box::new(callback);
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    #[cfg(test)]
    pub fn is_bound(&self) -> bool {
        self.track.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Run the capture loop on the calling thread until stopped
    ///
    /// No-op when already running, after a shutdown request, or when no
    /// healthy track is bound.
    pub fn start(&mut self) {
        if self.is_shut_down() {
            tracing::info!("Shutdown requested, not starting capture");
            return;
        }
        if self.is_running() {
            tracing::debug!("Capture loop already running");
            return;
        }
        if let Err(e) = check_track(self.track.as_ref()) {
            tracing::warn!("Not starting capture: {}", e);
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        self.pacer.reset(self.clock.now());

        tracing::info!(
            "Capture loop started, target interval {:.1}ms",
            self.pacer.target_interval().as_secs_f64() * 1000.0
        );

        // shutdown may have landed between the check above and the store
        while self.is_running() && !self.is_shut_down() {
            self.run_iteration();
        }

        tracing::info!("Capture loop stopped after {} frames", self.stats.frames);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop the loop and release the bound track. Safe to call repeatedly.
    pub fn release(&mut self) {
        self.stop();
        if let Some(mut track) = self.track.take() {
            track.stop();
            tracing::info!("Video track released");
        }
    }

    fn run_iteration(&mut self) {
        let iteration_start = self.clock.now();
        let mut delivered = false;

        if let Some(track) = self.track.as_mut() {
            match track.grab_frame() {
                Ok(frame) => {
                    let result = (self.callback)(frame);
                    self.stats
                        .record_frame(self.clock.now().saturating_sub(iteration_start));
                    delivered = true;
                    if let Err(e) = result {
                        self.stats.record_callback_failure();
                        tracing::warn!("Frame processing failed: {:#}", e);
                    }
                }
                Err(e) => {
                    self.stats.record_grab_failure();
                    tracing::warn!("Frame grab failed: {:#}", e);
                }
            }
        } else {
            self.stop();
            return;
        }

        let current_frame_time = self.clock.now();
        let delay = self.pacer.next_delay(current_frame_time);
        self.clock.sleep(delay);
        self.stats
            .record_iteration(self.clock.now().saturating_sub(iteration_start));

        if delivered && self.stats_interval > 0 && self.stats.frames % self.stats_interval == 0 {
            self.stats.report();
        }
    }
}

impl<T: VideoTrack, C: Clock> Drop for CameraThread<T, C> {
    fn drop(&mut self) {
        self.release();
    }
}
