use super::{BridgeError, BufferPtr, Detection, FaceResult, ForeignModule};
use libloading::{Library, Symbol};
use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::{c_int, c_void};
use std::path::Path;

/// Callback the module invokes with `(user_data, left, top, right, bottom, angle)`
type FaceCallbackFn = extern "C" fn(*mut c_void, c_int, c_int, c_int, c_int, c_int);

type MallocFn = unsafe extern "C" fn(usize) -> *mut u8;
type FreeFn = unsafe extern "C" fn(*mut u8);
type FindFaceFn = unsafe extern "C" fn(*mut u8, c_int, c_int, f64) -> f64;
type SetFaceCallbackFn = unsafe extern "C" fn(Option<FaceCallbackFn>, *mut c_void) -> bool;

/// Exported symbol names of a detection module
#[derive(Clone, Debug)]
pub struct ModuleSymbols {
    pub malloc: String,
    pub free: String,
    pub find_face: String,
    pub set_face_callback: String,
}

impl Default for ModuleSymbols {
    fn default() -> Self {
        Self {
            malloc: "malloc".into(),
            free: "free".into(),
            find_face: "findFace".into(),
            set_face_callback: "setFaceCallback".into(),
        }
    }
}

/// Detection module loaded from a precompiled shared library
///
/// Each instance registers its own result slot as the callback's user
/// data, so several modules can be loaded side by side.
pub struct NativeModule {
    // Library handle (keep alive while the function pointers are in use)
    _lib: Library,

    malloc_fn: MallocFn,
    free_fn: FreeFn,
    find_face_fn: FindFaceFn,
    set_face_callback_fn: SetFaceCallbackFn,
    find_face_name: String,

    // Heap-pinned so the address handed to the module stays valid
    face_slot: Box<Cell<Option<FaceResult>>>,
    live: HashMap<BufferPtr, usize>,
}

impl NativeModule {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BridgeError> {
        Self::load_with(path, &ModuleSymbols::default())
    }

    pub fn load_with<P: AsRef<Path>>(path: P, symbols: &ModuleSymbols) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        tracing::info!("Loading detection module from {}", path.display());

        // SAFETY: loading runs the library's initialisers; the module is
        // trusted to expose the C ABI described by `ModuleSymbols`.
        let lib = unsafe { Library::new(path) }.map_err(|source| BridgeError::Load {
            path: path.display().to_string(),
            source,
        })?;

        let malloc_fn = unsafe { lookup::<MallocFn>(&lib, &symbols.malloc)? };
        let free_fn = unsafe { lookup::<FreeFn>(&lib, &symbols.free)? };
        let find_face_fn = unsafe { lookup::<FindFaceFn>(&lib, &symbols.find_face)? };
        let set_face_callback_fn =
            unsafe { lookup::<SetFaceCallbackFn>(&lib, &symbols.set_face_callback)? };

        let face_slot = Box::new(Cell::new(None));
        let user_data = &*face_slot as *const Cell<Option<FaceResult>> as *mut c_void;

        // SAFETY: the slot outlives the registration, which is cleared in Drop.
        if !unsafe { set_face_callback_fn(Some(record_face as FaceCallbackFn), user_data) } {
            return Err(BridgeError::CallbackRegistration);
        }

        tracing::info!("Detection module loaded, face callback registered");

        Ok(Self {
            _lib: lib,
            malloc_fn,
            free_fn,
            find_face_fn,
            set_face_callback_fn,
            find_face_name: symbols.find_face.clone(),
            face_slot,
            live: HashMap::new(),
        })
    }

    fn call_error(&self, reason: impl Into<String>) -> BridgeError {
        BridgeError::Call {
            name: self.find_face_name.clone(),
            reason: reason.into(),
        }
    }
}

/// Resolve a symbol and copy out the raw function pointer
unsafe fn lookup<T: Copy>(lib: &Library, name: &str) -> Result<T, BridgeError> {
    let symbol: Symbol<T> =
        lib.get(name.as_bytes())
            .map_err(|source| BridgeError::MissingSymbol {
                name: name.to_string(),
                source,
            })?;
    Ok(*symbol)
}

extern "C" fn record_face(
    user_data: *mut c_void,
    left: c_int,
    top: c_int,
    right: c_int,
    bottom: c_int,
    angle: c_int,
) {
    if user_data.is_null() {
        return;
    }
    // SAFETY: `user_data` is the slot registered in `load_with`.
    let slot = unsafe { &*(user_data as *const Cell<Option<FaceResult>>) };
    slot.set(Some(FaceResult {
        left,
        top,
        right,
        bottom,
        angle: angle as f64,
    }));
}

impl ForeignModule for NativeModule {
    fn malloc(&mut self, size: usize) -> Result<BufferPtr, BridgeError> {
        // SAFETY: plain allocator call; a null return is handled below.
        let raw = unsafe { (self.malloc_fn)(size) };
        if raw.is_null() {
            return Err(BridgeError::Allocation { size });
        }
        let ptr = BufferPtr(raw as usize);
        self.live.insert(ptr, size);
        Ok(ptr)
    }

    fn free(&mut self, ptr: BufferPtr) {
        if self.live.remove(&ptr).is_none() {
            tracing::warn!("Ignoring free of unknown buffer {:#x}", ptr.0);
            return;
        }
        // SAFETY: `ptr` came from this module's malloc and is freed once.
        unsafe { (self.free_fn)(ptr.0 as *mut u8) };
    }

    fn write(&mut self, ptr: BufferPtr, bytes: &[u8]) -> Result<(), BridgeError> {
        let capacity = self.live.get(&ptr).copied().unwrap_or(0);
        if bytes.len() > capacity {
            return Err(BridgeError::Write {
                len: bytes.len(),
                capacity,
            });
        }
        // SAFETY: the destination is a live allocation of at least `capacity` bytes.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.0 as *mut u8, bytes.len()) };
        Ok(())
    }

    fn find_face(
        &mut self,
        ptr: BufferPtr,
        width: u32,
        height: u32,
        prev_angle: f64,
    ) -> Result<Detection, BridgeError> {
        let required = width as usize * height as usize * 4;
        match self.live.get(&ptr) {
            Some(&size) if size >= required => {}
            _ => return Err(self.call_error("buffer is not a live RGBA allocation of the frame size")),
        }
        let w = c_int::try_from(width).map_err(|_| self.call_error("width out of range"))?;
        let h = c_int::try_from(height).map_err(|_| self.call_error("height out of range"))?;

        self.face_slot.set(None);
        // SAFETY: the buffer holds `width * height * 4` initialised bytes.
        let angle = unsafe { (self.find_face_fn)(ptr.0 as *mut u8, w, h, prev_angle) };
        let face = self.face_slot.take();

        if !angle.is_finite() {
            return Err(self.call_error(format!("returned non-finite angle {}", angle)));
        }
        Ok(Detection { angle, face })
    }
}

impl Drop for NativeModule {
    fn drop(&mut self) {
        for (ptr, _) in self.live.drain() {
            // SAFETY: leftover allocations from this module, freed once.
            unsafe { (self.free_fn)(ptr.0 as *mut u8) };
        }
        // SAFETY: clears the pointer to `face_slot` before it is dropped.
        unsafe { (self.set_face_callback_fn)(None, std::ptr::null_mut()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_is_a_load_error() {
        let err = NativeModule::load("/nonexistent/libfacedetect.so")
            .err()
            .expect("load should fail");
        assert!(matches!(err, BridgeError::Load { .. }));
        assert!(err.to_string().contains("/nonexistent/libfacedetect.so"));
    }

    #[test]
    fn test_callback_trampoline_fills_slot() {
        let slot: Cell<Option<FaceResult>> = Cell::new(None);
        let user_data = &slot as *const _ as *mut c_void;
        record_face(user_data, 10, 20, 110, 140, -15);
        assert_eq!(
            slot.get(),
            Some(FaceResult {
                left: 10,
                top: 20,
                right: 110,
                bottom: 140,
                angle: -15.0,
            })
        );
    }

    #[test]
    fn test_callback_trampoline_ignores_null_user_data() {
        record_face(std::ptr::null_mut(), 1, 2, 3, 4, 5);
    }

    #[test]
    fn test_default_symbol_names() {
        let symbols = ModuleSymbols::default();
        assert_eq!(symbols.find_face, "findFace");
        assert_eq!(symbols.set_face_callback, "setFaceCallback");
    }
}
