mod camera_thread;
mod webcam;

pub use camera_thread::CameraThread;
pub use webcam::WebcamTrack;

use anyhow::Result;
use image::DynamicImage;
use std::time::Instant;

/// Lifecycle state reported by a capture track
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    Live,
    Ended,
}

/// Trait for live video tracks
/// Allows swapping the camera for a scripted track in tests
pub trait VideoTrack {
    fn ready_state(&self) -> ReadyState;

    fn enabled(&self) -> bool;

    fn muted(&self) -> bool;

    /// Grab a single decoded frame
    ///
    /// Failures are expected to be transient (device hiccups); callers
    /// log and move on rather than tearing the track down.
    fn grab_frame(&mut self) -> Result<Frame>;

    /// Stop the underlying device. Must tolerate repeated calls.
    fn stop(&mut self);
}

/// Reasons a track cannot be bound to a camera thread
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TrackError {
    #[error("no video track available")]
    Missing,
    #[error("video track is not live (state: {0:?})")]
    NotLive(ReadyState),
    #[error("video track is disabled")]
    Disabled,
    #[error("video track is muted")]
    Muted,
}

/// Check that a track is able to deliver frames
pub fn check_track<T: VideoTrack>(track: Option<&T>) -> Result<(), TrackError> {
    let track = track.ok_or(TrackError::Missing)?;
    match track.ready_state() {
        ReadyState::Live => {}
        state => return Err(TrackError::NotLive(state)),
    }
    if !track.enabled() {
        return Err(TrackError::Disabled);
    }
    if track.muted() {
        return Err(TrackError::Muted);
    }
    Ok(())
}

/// One decoded image snapshot from the capture device
#[derive(Clone, Debug)]
pub struct Frame {
    image: DynamicImage,
    timestamp: Instant,
}

impl Frame {
    pub fn new(image: DynamicImage, timestamp: Instant) -> Self {
        Self { image, timestamp }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Rasterize into a tightly packed RGBA8 byte array, row-major
    ///
    /// Returns `width * height * 4` bytes.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.image.to_rgba8().into_raw()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{solid_frame, FakeTrack};
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_rgba_rasterization_size() {
        let frame = solid_frame(4, 3);
        let pixels = frame.to_rgba8();
        assert_eq!(pixels.len(), 4 * 3 * 4);
        assert_eq!(&pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_missing_track_is_rejected() {
        assert_eq!(check_track::<FakeTrack>(None), Err(TrackError::Missing));
    }

    #[rstest]
    #[case::ended(ReadyState::Ended, true, false, TrackError::NotLive(ReadyState::Ended))]
    #[case::disabled(ReadyState::Live, false, false, TrackError::Disabled)]
    #[case::muted(ReadyState::Live, true, true, TrackError::Muted)]
    fn test_unhealthy_track_is_rejected(
        #[case] state: ReadyState,
        #[case] enabled: bool,
        #[case] muted: bool,
        #[case] expected: TrackError,
    ) {
        let mut track = FakeTrack::live();
        track.state = state;
        track.enabled = enabled;
        track.muted = muted;
        assert_eq!(check_track(Some(&track)), Err(expected));
    }

    #[test]
    fn test_live_track_passes() {
        assert!(check_track(Some(&FakeTrack::live())).is_ok());
    }
}
