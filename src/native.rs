//! Native engine boundary
//!
//! [`NativeEngine`] is the capability set the rest of the crate needs from
//! the engine. [`LibraryEngine`] implements it over a dynamically loaded
//! `libpv_porcupine` via `libloading`; tests substitute a mock. All raw
//! pointers, C strings and integer status codes stay inside this module.

use libc::{c_char, c_float, c_void};
use libloading::Library;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::error::{ArgumentError, PorcupineError, PvStatus, Result};

const INIT_SYMBOL: &str = "pv_porcupine_init";
const PROCESS_SYMBOL: &str = "pv_porcupine_process";
const DELETE_SYMBOL: &str = "pv_porcupine_delete";
const SAMPLE_RATE_SYMBOL: &str = "pv_sample_rate";
const FRAME_LENGTH_SYMBOL: &str = "pv_porcupine_frame_length";
const VERSION_SYMBOL: &str = "pv_porcupine_version";

type InitFn = unsafe extern "C" fn(
    access_key: *const c_char,
    model_path: *const c_char,
    num_keywords: i32,
    keyword_paths: *const *const c_char,
    sensitivities: *const c_float,
    object: *mut *mut c_void,
) -> i32;
type ProcessFn = unsafe extern "C" fn(object: *mut c_void, pcm: *const i16, keyword_index: *mut i32) -> i32;
type DeleteFn = unsafe extern "C" fn(object: *mut c_void);
type SampleRateFn = unsafe extern "C" fn() -> i32;
type FrameLengthFn = unsafe extern "C" fn() -> i32;
type VersionFn = unsafe extern "C" fn() -> *const c_char;

/// Opaque pointer to engine-side state.
///
/// Move-only: [`NativeEngine::delete`] consumes it, so a handle can't be
/// released twice.
#[derive(Debug)]
pub struct EngineHandle(NonNull<c_void>);

// The engine object is only ever touched through `&mut` session access.
unsafe impl Send for EngineHandle {}

impl EngineHandle {
    /// Wrap a pointer returned by an engine's init call. `None` for null.
    ///
    /// # Safety
    /// `ptr` must come from the engine that will later receive this handle
    /// and must not be wrapped more than once.
    pub unsafe fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }

    pub fn into_raw(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Operations the engine exposes over its C ABI
#[cfg_attr(test, mockall::automock)]
pub trait NativeEngine: Send + Sync {
    /// Create an engine object. `keyword_paths` and `sensitivities` have equal length.
    fn init(
        &self,
        access_key: &str,
        model_path: &Path,
        keyword_paths: &[PathBuf],
        sensitivities: &[f32],
    ) -> Result<EngineHandle>;

    /// Run detection on exactly one frame; returns the keyword index or -1.
    fn process(&self, handle: &EngineHandle, frame: &[i16]) -> Result<i32>;

    /// Release an engine object.
    fn delete(&self, handle: EngineHandle);

    fn frame_length(&self) -> usize;

    fn sample_rate(&self) -> u32;

    fn version(&self) -> String;
}

/// Engine backed by a dynamically loaded `libpv_porcupine`
pub struct LibraryEngine {
    path: PathBuf,
    init: InitFn,
    process: ProcessFn,
    delete: DeleteFn,
    frame_length: usize,
    sample_rate: u32,
    version: String,
    // Must outlive the function pointers above.
    _library: Library,
}

impl LibraryEngine {
    /// Load the library at `path` and resolve every entry point.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // SAFETY: loading runs the library's initializers; the bundle only
        // ships the vendor's engine builds.
        let library = unsafe { Library::new(path) }.map_err(|source| PorcupineError::Load {
            path: path.to_path_buf(),
            source,
        })?;

        // SAFETY: the signatures match pv_porcupine.h / picovoice.h.
        let (init, process, delete, sample_rate_fn, frame_length_fn, version_fn) = unsafe {
            (
                resolve::<InitFn>(&library, INIT_SYMBOL)?,
                resolve::<ProcessFn>(&library, PROCESS_SYMBOL)?,
                resolve::<DeleteFn>(&library, DELETE_SYMBOL)?,
                resolve::<SampleRateFn>(&library, SAMPLE_RATE_SYMBOL)?,
                resolve::<FrameLengthFn>(&library, FRAME_LENGTH_SYMBOL)?,
                resolve::<VersionFn>(&library, VERSION_SYMBOL)?,
            )
        };

        // SAFETY: argument-less queries returning engine constants.
        let (raw_frame_length, raw_sample_rate, version_ptr) =
            unsafe { (frame_length_fn(), sample_rate_fn(), version_fn()) };

        let frame_length = usize::try_from(raw_frame_length)
            .ok()
            .filter(|len| *len > 0)
            .ok_or_else(|| {
                PorcupineError::native(
                    PvStatus::RuntimeError,
                    format!("engine reported frame length {}", raw_frame_length),
                )
            })?;
        let sample_rate = u32::try_from(raw_sample_rate)
            .ok()
            .filter(|rate| *rate > 0)
            .ok_or_else(|| {
                PorcupineError::native(
                    PvStatus::RuntimeError,
                    format!("engine reported sample rate {}", raw_sample_rate),
                )
            })?;
        let version = if version_ptr.is_null() {
            String::from("unknown")
        } else {
            // SAFETY: the engine returns a static NUL-terminated string.
            unsafe { CStr::from_ptr(version_ptr) }.to_string_lossy().into_owned()
        };

        info!(
            "Loaded Porcupine {} from {} (frame length {}, sample rate {} Hz)",
            version,
            path.display(),
            frame_length,
            sample_rate
        );

        Ok(Self {
            path: path.to_path_buf(),
            init,
            process,
            delete,
            frame_length,
            sample_rate,
            version,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

unsafe fn resolve<T: Copy>(library: &Library, symbol: &'static str) -> Result<T> {
    library
        .get::<T>(symbol.as_bytes())
        .map(|resolved| *resolved)
        .map_err(|source| PorcupineError::Symbol { symbol, source })
}

impl NativeEngine for LibraryEngine {
    fn init(
        &self,
        access_key: &str,
        model_path: &Path,
        keyword_paths: &[PathBuf],
        sensitivities: &[f32],
    ) -> Result<EngineHandle> {
        if keyword_paths.len() != sensitivities.len() {
            return Err(ArgumentError::SensitivityCountMismatch {
                keywords: keyword_paths.len(),
                sensitivities: sensitivities.len(),
            }
            .into());
        }

        // Owned locals; every buffer is released when this call returns.
        let access_key = CString::new(access_key).map_err(|_| ArgumentError::MalformedAccessKey)?;
        let model_path = path_to_cstring(model_path)?;
        let keyword_paths = keyword_paths
            .iter()
            .map(|path| path_to_cstring(path))
            .collect::<Result<Vec<_>>>()?;
        let keyword_ptrs: Vec<*const c_char> = keyword_paths.iter().map(|path| path.as_ptr()).collect();
        let num_keywords = i32::try_from(keyword_ptrs.len()).map_err(|_| {
            PorcupineError::native(PvStatus::InvalidArgument, "too many keywords for the engine")
        })?;

        let mut object: *mut c_void = ptr::null_mut();

        // SAFETY: all pointers reference live buffers owned by this frame;
        // `keyword_ptrs` and `sensitivities` both hold `num_keywords` items.
        let status = unsafe {
            (self.init)(
                access_key.as_ptr(),
                model_path.as_ptr(),
                num_keywords,
                keyword_ptrs.as_ptr(),
                sensitivities.as_ptr(),
                &mut object,
            )
        };

        let status = PvStatus::from_code(status);
        if !status.is_success() {
            return Err(PorcupineError::native(status, "Failed to initialize Porcupine"));
        }

        // SAFETY: `object` was just produced by this engine's init.
        unsafe { EngineHandle::from_raw(object) }.ok_or_else(|| {
            PorcupineError::native(PvStatus::RuntimeError, "Porcupine returned a null object")
        })
    }

    fn process(&self, handle: &EngineHandle, frame: &[i16]) -> Result<i32> {
        // The engine reads exactly `frame_length` samples.
        if frame.len() != self.frame_length {
            return Err(ArgumentError::FrameLength {
                expected: self.frame_length,
                actual: frame.len(),
            }
            .into());
        }

        let mut keyword_index: i32 = -1;

        // SAFETY: `frame` holds `frame_length` samples and `handle` is live.
        let status = unsafe { (self.process)(handle.as_ptr(), frame.as_ptr(), &mut keyword_index) };

        let status = PvStatus::from_code(status);
        if !status.is_success() {
            return Err(PorcupineError::native(status, "Porcupine failed to process the frame"));
        }

        Ok(keyword_index)
    }

    fn delete(&self, handle: EngineHandle) {
        // SAFETY: the handle is consumed, so this runs once per object.
        unsafe { (self.delete)(handle.into_raw()) }
    }

    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn version(&self) -> String {
        self.version.clone()
    }
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    #[cfg(unix)]
    let bytes = {
        use std::os::unix::ffi::OsStrExt;
        Some(path.as_os_str().as_bytes().to_vec())
    };

    #[cfg(not(unix))]
    let bytes = path.to_str().map(|s| s.as_bytes().to_vec());

    bytes
        .and_then(|bytes| CString::new(bytes).ok())
        .ok_or_else(|| ArgumentError::UnrepresentablePath(path.to_path_buf()).into())
}

/// Produces engines for a library path
pub trait EngineLoader: Send + Sync {
    fn load(&self, library_path: &Path) -> Result<Arc<dyn NativeEngine>>;
}

/// Loads each distinct library once and shares it between sessions
#[derive(Default)]
pub struct DynamicLoader {
    engines: Mutex<HashMap<PathBuf, Arc<LibraryEngine>>>,
}

impl DynamicLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EngineLoader for DynamicLoader {
    fn load(&self, library_path: &Path) -> Result<Arc<dyn NativeEngine>> {
        let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);

        let engine = match engines.get(library_path) {
            Some(engine) => {
                debug!("Reusing loaded engine {}", library_path.display());
                engine.clone()
            }
            None => {
                let engine = Arc::new(LibraryEngine::open(library_path)?);
                engines.insert(library_path.to_path_buf(), engine.clone());
                engine
            }
        };

        let engine: Arc<dyn NativeEngine> = engine;
        Ok(engine)
    }
}

/// Hands out one pre-built engine for every library path
#[derive(Clone)]
pub struct StaticLoader {
    engine: Arc<dyn NativeEngine>,
}

impl StaticLoader {
    pub fn new(engine: Arc<dyn NativeEngine>) -> Self {
        Self { engine }
    }
}

impl EngineLoader for StaticLoader {
    fn load(&self, _library_path: &Path) -> Result<Arc<dyn NativeEngine>> {
        Ok(self.engine.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_library_is_load_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("libpv_porcupine.so");

        match LibraryEngine::open(&path) {
            Err(PorcupineError::Load { path: reported, .. }) => assert_eq!(reported, path),
            Err(other) => panic!("Expected Load error, got {:?}", other),
            Ok(_) => panic!("Expected Load error"),
        }
    }

    #[test]
    fn test_open_garbage_library_is_load_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("libpv_porcupine.so");
        std::fs::write(&path, b"not a shared object").unwrap();

        assert!(matches!(LibraryEngine::open(&path), Err(PorcupineError::Load { .. })));
    }

    #[test]
    fn test_dynamic_loader_propagates_load_errors() {
        let dir = TempDir::new().unwrap();
        let loader = DynamicLoader::new();

        assert!(loader.load(&dir.path().join("missing.so")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_path_to_cstring() {
        let path = Path::new("/tmp/porcupine/hey google_linux.ppn");
        assert_eq!(
            path_to_cstring(path).unwrap().as_bytes(),
            b"/tmp/porcupine/hey google_linux.ppn"
        );

        let err = path_to_cstring(Path::new("/tmp/bad\0path")).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_handle_rejects_null() {
        assert!(unsafe { EngineHandle::from_raw(ptr::null_mut()) }.is_none());

        let raw = NonNull::<c_void>::dangling().as_ptr();
        let handle = unsafe { EngineHandle::from_raw(raw) }.unwrap();
        assert_eq!(handle.as_ptr(), raw);
        assert_eq!(handle.into_raw(), raw);
    }

    #[test]
    fn test_static_loader_shares_engine() {
        let mut engine = MockNativeEngine::new();
        engine.expect_frame_length().return_const(512usize);
        let engine: Arc<dyn NativeEngine> = Arc::new(engine);

        let loader = StaticLoader::new(engine);
        let a = loader.load(Path::new("a.so")).unwrap();
        let b = loader.load(Path::new("b.so")).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.frame_length(), 512);
    }
}
