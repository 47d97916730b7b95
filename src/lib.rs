//! Porcupine keyword detection
//!
//! Loads the Porcupine engine for the current platform, validates detector
//! configuration and runs keyword detection on fixed-size frames of 16-bit
//! PCM audio.
//!
//! ```no_run
//! use porcupine::{DetectorConfig, Porcupine, Runtime, NO_DETECTION};
//!
//! # fn main() -> porcupine::Result<()> {
//! let runtime = Runtime::global()?;
//! let config = DetectorConfig::new_with_keywords("${ACCESS_KEY}", ["porcupine", "bumblebee"]);
//! let mut porcupine = Porcupine::with_config(runtime, config)?;
//!
//! let frame = vec![0i16; porcupine.frame_length()?];
//! let keyword_index = porcupine.process(&frame)?;
//! if keyword_index != NO_DETECTION {
//!     println!("detected keyword #{}", keyword_index);
//! }
//! porcupine.delete()?;
//! # Ok(())
//! # }
//! ```

pub mod audio_buffer;
pub mod config;
pub mod error;
pub mod keywords;
pub mod listener;
pub mod native;
pub mod platform;
pub mod porcupine;
pub mod resources;
pub mod runtime;

// Re-export main types
pub use audio_buffer::{AudioSample, FrameBuffer, FrameBufferError};
pub use config::{DetectorConfig, NormalizedConfig, DEFAULT_SENSITIVITY};
pub use error::{ArgumentError, PorcupineError, PvStatus, Result, SessionState};
pub use keywords::BuiltinKeyword;
pub use listener::{KeywordEvent, KeywordListener, ListenerError, ListenerStats};
pub use native::{DynamicLoader, EngineHandle, EngineLoader, LibraryEngine, NativeEngine, StaticLoader};
pub use platform::{OsFamily, PlatformDescriptor};
pub use crate::porcupine::{EngineInfo, Porcupine, NO_DETECTION};
pub use resources::{BundleDirectory, CacheEntry, MemoryBundle, ResourceCache, ResourceSource};
pub use runtime::{Runtime, RuntimeOptions};
