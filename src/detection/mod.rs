mod bridge;
mod buffer;
mod native;

pub use bridge::DetectionBridge;
pub use buffer::ForeignBuffer;
pub use native::NativeModule;

/// Face geometry reported by the detection module
///
/// Coordinates are in source-frame pixels; `angle` is the in-plane
/// rotation in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceResult {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub angle: f64,
}

impl FaceResult {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Outcome of one detection call
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    /// Rolling angle to seed the next call with
    pub angle: f64,
    /// Face reported through the module's callback during the call, if any
    pub face: Option<FaceResult>,
}

/// Address of a buffer inside the module's memory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferPtr(pub usize);

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to load detection module {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: libloading::Error,
    },
    #[error("detection module is missing symbol `{name}`: {source}")]
    MissingSymbol {
        name: String,
        #[source]
        source: libloading::Error,
    },
    #[error("detection module rejected the face callback")]
    CallbackRegistration,
    #[error("frame is empty ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("failed to allocate {size} byte pixel buffer")]
    Allocation { size: usize },
    #[error("cannot write {len} bytes into a {capacity} byte buffer")]
    Write { len: usize, capacity: usize },
    #[error("detection call `{name}` failed: {reason}")]
    Call { name: String, reason: String },
}

/// Call contract of a precompiled face detection module
///
/// Buffers come from the module's own allocator and must be handed back
/// through `free` exactly once. Use [`ForeignBuffer`] rather than calling
/// `malloc`/`free` directly.
pub trait ForeignModule {
    fn malloc(&mut self, size: usize) -> Result<BufferPtr, BridgeError>;

    fn free(&mut self, ptr: BufferPtr);

    fn write(&mut self, ptr: BufferPtr, bytes: &[u8]) -> Result<(), BridgeError>;

    /// Run detection over an RGBA8 buffer of `width * height * 4` bytes
    fn find_face(
        &mut self,
        ptr: BufferPtr,
        width: u32,
        height: u32,
        prev_angle: f64,
    ) -> Result<Detection, BridgeError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;

    /// In-process module with a byte-vector heap and scripted detections
    #[derive(Default)]
    pub struct FakeModule {
        heap: HashMap<BufferPtr, Vec<u8>>,
        next_ptr: usize,
        pub mallocs: usize,
        pub frees: usize,
        pub max_live: usize,
        pub fail_malloc: bool,
        pub fail_call: bool,
        pub face: Option<FaceResult>,
        /// (width, height, prev_angle, first pixel) seen by each call
        pub calls: Vec<(u32, u32, f64, [u8; 4])>,
    }

    impl FakeModule {
        pub fn failing_malloc() -> Self {
            Self {
                fail_malloc: true,
                ..Default::default()
            }
        }

        pub fn failing_call() -> Self {
            Self {
                fail_call: true,
                ..Default::default()
            }
        }

        pub fn with_face(face: FaceResult) -> Self {
            Self {
                face: Some(face),
                ..Default::default()
            }
        }

        pub fn live_buffers(&self) -> usize {
            self.heap.len()
        }
    }

    impl ForeignModule for FakeModule {
        fn malloc(&mut self, size: usize) -> Result<BufferPtr, BridgeError> {
            if self.fail_malloc {
                return Err(BridgeError::Allocation { size });
            }
            self.mallocs += 1;
            self.next_ptr += 1;
            let ptr = BufferPtr(self.next_ptr);
            self.heap.insert(ptr, vec![0; size]);
            self.max_live = self.max_live.max(self.heap.len());
            Ok(ptr)
        }

        fn free(&mut self, ptr: BufferPtr) {
            assert!(self.heap.remove(&ptr).is_some(), "double free of {:?}", ptr);
            self.frees += 1;
        }

        fn write(&mut self, ptr: BufferPtr, bytes: &[u8]) -> Result<(), BridgeError> {
            let region = self.heap.get_mut(&ptr).expect("write to freed buffer");
            if bytes.len() > region.len() {
                return Err(BridgeError::Write {
                    len: bytes.len(),
                    capacity: region.len(),
                });
            }
            region[..bytes.len()].copy_from_slice(bytes);
            Ok(())
        }

        fn find_face(
            &mut self,
            ptr: BufferPtr,
            width: u32,
            height: u32,
            prev_angle: f64,
        ) -> Result<Detection, BridgeError> {
            let region = self.heap.get(&ptr).expect("call on freed buffer");
            assert_eq!(region.len(), (width * height * 4) as usize);
            let mut first = [0u8; 4];
            first.copy_from_slice(&region[..4]);
            self.calls.push((width, height, prev_angle, first));

            if self.fail_call {
                return Err(BridgeError::Call {
                    name: "findFace".into(),
                    reason: "trap".into(),
                });
            }
            Ok(Detection {
                angle: prev_angle + 5.0,
                face: self.face,
            })
        }
    }
}
