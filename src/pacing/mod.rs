mod clock;
mod stats;

#[cfg(test)]
pub(crate) use clock::testing::ManualClock;
pub use clock::{Clock, SystemClock};
pub use stats::FrameStats;

use std::time::Duration;

pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_STATS_INTERVAL: u64 = 30;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("target frame rate must be greater than zero")]
    ZeroFps,
}

/// Frame pacing settings
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PacingConfig {
    target_fps: u32,
    stats_interval: u64,
}

impl PacingConfig {
    pub fn new(target_fps: u32) -> Result<Self, ConfigError> {
        if target_fps == 0 {
            return Err(ConfigError::ZeroFps);
        }
        Ok(Self {
            target_fps,
            stats_interval: DEFAULT_STATS_INTERVAL,
        })
    }

    /// Log a stats summary every `frames` delivered frames (0 disables it)
    pub fn with_stats_interval(mut self, frames: u64) -> Self {
        self.stats_interval = frames;
        self
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    pub fn stats_interval(&self) -> u64 {
        self.stats_interval
    }

    pub fn target_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps as f64)
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_FPS,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

/// Fixed-rate scheduler that charges grab and processing time against the
/// frame budget
///
/// `last_frame_time` is the anchor the next delay is measured from. It moves
/// to the scheduled wake time, so oversleeping or slow frames shorten the
/// following delay instead of accumulating drift. Overruns clamp the delay to
/// zero and reset the anchor; there is no catch-up burst.
#[derive(Debug)]
pub struct Pacer {
    target_interval: Duration,
    last_frame_time: Duration,
}

impl Pacer {
    pub fn new(target_interval: Duration) -> Self {
        Self {
            target_interval,
            last_frame_time: Duration::ZERO,
        }
    }

    pub fn target_interval(&self) -> Duration {
        self.target_interval
    }

    /// Restart the schedule from `now`
    pub fn reset(&mut self, now: Duration) {
        self.last_frame_time = now;
    }

    /// Delay to suspend for after an iteration that finished at
    /// `current_frame_time`
    pub fn next_delay(&mut self, current_frame_time: Duration) -> Duration {
        let elapsed = current_frame_time.saturating_sub(self.last_frame_time);
        let delay = self.target_interval.saturating_sub(elapsed);
        self.last_frame_time = current_frame_time + delay;
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_zero_fps_is_rejected() {
        assert_eq!(PacingConfig::new(0), Err(ConfigError::ZeroFps));
    }

    #[test]
    fn test_default_interval_is_thirty_fps() {
        let config = PacingConfig::default();
        assert_eq!(config.target_fps(), 30);
        assert_relative_eq!(
            config.target_interval().as_secs_f64() * 1000.0,
            1000.0 / 30.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_delay_subtracts_work_time() {
        let mut pacer = Pacer::new(ms(40));
        pacer.reset(ms(0));
        assert_eq!(pacer.next_delay(ms(10)), ms(30));
    }

    #[test]
    fn test_sleep_time_is_not_charged_to_next_frame() {
        let mut pacer = Pacer::new(ms(40));
        pacer.reset(ms(0));
        assert_eq!(pacer.next_delay(ms(10)), ms(30));
        // woke at 40, worked 10ms
        assert_eq!(pacer.next_delay(ms(50)), ms(30));
    }

    #[test]
    fn test_oversleep_is_recovered_on_next_frame() {
        let mut pacer = Pacer::new(ms(40));
        pacer.reset(ms(0));
        assert_eq!(pacer.next_delay(ms(10)), ms(30));
        // scheduled wake at 40 but woke at 45, then worked 10ms
        assert_eq!(pacer.next_delay(ms(55)), ms(25));
    }

    #[test]
    fn test_overrun_clamps_to_zero_without_catch_up() {
        let mut pacer = Pacer::new(ms(40));
        pacer.reset(ms(0));
        assert_eq!(pacer.next_delay(ms(100)), Duration::ZERO);
        assert_eq!(pacer.next_delay(ms(110)), ms(30));
    }
}
