use super::{Frame, ReadyState, VideoTrack};
use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use std::time::Instant;

/// Video track backed by a local webcam
pub struct WebcamTrack {
    camera: Camera,
    state: ReadyState,
}

impl WebcamTrack {
    pub fn open(device_index: u32, width: u32, height: u32) -> Result<Self> {
        tracing::info!(
            "Opening webcam {} at {}x{}",
            device_index,
            width,
            height
        );

        let index = CameraIndex::Index(device_index);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::HighestResolution(
            Resolution::new(width, height),
        ));

        let mut camera = Camera::new(index, requested).context("Failed to open camera")?;

        camera
            .open_stream()
            .context("Failed to open camera stream")?;

        let resolution = camera.resolution();
        tracing::info!(
            "Webcam stream live at {}x{}",
            resolution.width(),
            resolution.height()
        );

        Ok(Self {
            camera,
            state: ReadyState::Live,
        })
    }
}

impl VideoTrack for WebcamTrack {
    fn ready_state(&self) -> ReadyState {
        if self.state == ReadyState::Live && self.camera.is_stream_open() {
            ReadyState::Live
        } else {
            ReadyState::Ended
        }
    }

    // Webcams have no enable or mute switch of their own
    fn enabled(&self) -> bool {
        true
    }

    fn muted(&self) -> bool {
        false
    }

    fn grab_frame(&mut self) -> Result<Frame> {
        let buffer = self.camera.frame().context("Failed to grab frame")?;
        let timestamp = Instant::now();

        let decoded = buffer
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        let (width, height) = decoded.dimensions();
        let image = RgbImage::from_raw(width, height, decoded.into_raw())
            .context("Decoded frame has inconsistent dimensions")?;

        Ok(Frame::new(DynamicImage::ImageRgb8(image), timestamp))
    }

    fn stop(&mut self) {
        if self.state == ReadyState::Ended {
            return;
        }
        self.state = ReadyState::Ended;
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
        tracing::info!("Webcam track stopped");
    }
}
