use std::time::Duration;

/// Running counters for the capture loop
#[derive(Debug, Default)]
pub struct FrameStats {
    pub frames: u64,
    pub grab_failures: u64,
    pub callback_failures: u64,
    total_work_time: Duration,
    total_elapsed: Duration,
}

impl FrameStats {
    pub fn record_frame(&mut self, work_time: Duration) {
        self.frames += 1;
        self.total_work_time += work_time;
    }

    pub fn record_grab_failure(&mut self) {
        self.grab_failures += 1;
    }

    pub fn record_callback_failure(&mut self) {
        self.callback_failures += 1;
    }

    /// Wall time of one whole iteration, suspension included
    pub fn record_iteration(&mut self, elapsed: Duration) {
        self.total_elapsed += elapsed;
    }

    pub fn avg_work_ms(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.total_work_time.as_secs_f64() * 1000.0 / self.frames as f64
    }

    pub fn actual_fps(&self) -> f64 {
        if self.total_elapsed.is_zero() {
            return 0.0;
        }
        self.frames as f64 / self.total_elapsed.as_secs_f64()
    }

    pub fn report(&self) {
        tracing::info!(
            "Frame {}: work={:.1}ms, fps={:.1}, grab_failures={}, callback_failures={}",
            self.frames,
            self.avg_work_ms(),
            self.actual_fps(),
            self.grab_failures,
            self.callback_failures
        );
    }
}
