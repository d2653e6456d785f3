use super::FaceSink;
use crate::detection::FaceResult;

/// Overlay box expressed as percentages of the capture resolution
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayPlacement {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
}

impl OverlayPlacement {
    pub fn from_face(face: &FaceResult, frame_width: u32, frame_height: u32) -> Self {
        let w = frame_width.max(1) as f64;
        let h = frame_height.max(1) as f64;
        Self {
            left: face.left as f64 / w * 100.0,
            top: face.top as f64 / h * 100.0,
            width: face.width() as f64 / w * 100.0,
            height: face.height() as f64 / h * 100.0,
            rotation: face.angle,
        }
    }

    /// CSS transform for the overlay element
    pub fn transform(&self) -> String {
        format!("rotate({}deg)", self.rotation)
    }
}

/// Sink that logs where the face overlay would be drawn
pub struct LogOverlay {
    frame_width: u32,
    frame_height: u32,
    faces: u64,
}

impl LogOverlay {
    pub fn new(frame_width: u32, frame_height: u32) -> Self {
        Self {
            frame_width,
            frame_height,
            faces: 0,
        }
    }
}

impl FaceSink for LogOverlay {
    fn on_face_detected(&mut self, face: &FaceResult) {
        self.faces += 1;
        let placement = OverlayPlacement::from_face(face, self.frame_width, self.frame_height);
        tracing::info!(
            "Face {}: left={:.1}%, top={:.1}%, width={:.1}%, height={:.1}%, transform={}",
            self.faces,
            placement.left,
            placement.top,
            placement.width,
            placement.height,
            placement.transform()
        );
    }
}
