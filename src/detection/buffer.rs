use super::{BridgeError, BufferPtr, Detection, ForeignModule};

/// Pixel buffer allocated in the module's memory for a single call
///
/// Freed when dropped, on every exit path. The guard borrows the module
/// mutably, so a second buffer cannot be allocated while this one is live.
pub struct ForeignBuffer<'m, M: ForeignModule> {
    module: &'m mut M,
    ptr: BufferPtr,
    size: usize,
}

impl<'m, M: ForeignModule> ForeignBuffer<'m, M> {
    pub fn alloc(module: &'m mut M, size: usize) -> Result<Self, BridgeError> {
        let ptr = module.malloc(size)?;
        Ok(Self { module, ptr, size })
    }

    #[cfg(test)]
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        if bytes.len() > self.size {
            return Err(BridgeError::Write {
                len: bytes.len(),
                capacity: self.size,
            });
        }
        self.module.write(self.ptr, bytes)
    }

    pub fn find_face(
        &mut self,
        width: u32,
        height: u32,
        prev_angle: f64,
    ) -> Result<Detection, BridgeError> {
        self.module.find_face(self.ptr, width, height, prev_angle)
    }
}

impl<M: ForeignModule> Drop for ForeignBuffer<'_, M> {
    fn drop(&mut self) {
        self.module.free(self.ptr);
    }
}
