use super::{BridgeError, FaceResult, ForeignBuffer, ForeignModule};
use crate::capture::Frame;
use crate::output::FaceSink;
use std::time::Instant;

/// Marshals frames into the detection module and forwards its results
///
/// The rolling angle is the only state carried between calls. It seeds
/// the module's temporal smoothing and is only replaced by a successful call.
pub struct DetectionBridge<M: ForeignModule, S: FaceSink> {
    module: M,
    sink: S,
    angle: f64,
}

impl<M: ForeignModule, S: FaceSink> DetectionBridge<M, S> {
    pub fn new(module: M, sink: S) -> Self {
        Self {
            module,
            sink,
            angle: 0.0,
        }
    }

    #[cfg(test)]
    pub fn angle(&self) -> f64 {
        self.angle
    }

    #[cfg(test)]
    pub fn module(&self) -> &M {
        &self.module
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run one detection call over `frame`
    ///
    /// The pixel buffer is released before this returns, whether or not the
    /// call succeeded.
    pub fn process(&mut self, frame: Frame) -> Result<Option<FaceResult>, BridgeError> {
        let _span = tracing::debug_span!("detect").entered();

        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 {
            return Err(BridgeError::EmptyFrame { width, height });
        }

        tracing::debug!("Frame age: {:?}", frame.timestamp().elapsed());

        let t0 = Instant::now();
        let pixels = frame.to_rgba8();
        drop(frame);

        let t1 = Instant::now();
        let mut buffer = ForeignBuffer::alloc(&mut self.module, pixels.len())?;
        let t2 = Instant::now();
        buffer.write(&pixels)?;
        let t3 = Instant::now();
        let detection = buffer.find_face(width, height, self.angle)?;
        let t4 = Instant::now();
        drop(buffer);
        let t5 = Instant::now();

        tracing::debug!(
            "Process time: rasterize={:.1}ms, alloc={:.1}ms, write={:.1}ms, call={:.1}ms, free={:.1}ms",
            (t1 - t0).as_secs_f64() * 1000.0,
            (t2 - t1).as_secs_f64() * 1000.0,
            (t3 - t2).as_secs_f64() * 1000.0,
            (t4 - t3).as_secs_f64() * 1000.0,
            (t5 - t4).as_secs_f64() * 1000.0
        );

        self.angle = detection.angle;
        if let Some(face) = &detection.face {
            self.sink.on_face_detected(face);
        }
        Ok(detection.face)
    }
}
