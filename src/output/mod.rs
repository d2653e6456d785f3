mod overlay;

pub use overlay::LogOverlay;

use crate::detection::FaceResult;

/// Trait for consumers of detection results
pub trait FaceSink {
    /// Called once per detection call that found a face
    ///
    /// Coordinates are in source-frame pixels; sinks rescale to their own
    /// display units.
    fn on_face_detected(&mut self, face: &FaceResult);
}
