//! Detector session
//!
//! A [`Porcupine`] session owns at most one native engine object and moves
//! through `Uninitialized -> Ready -> Deleted`. Configuration is validated
//! before any native code runs; frames are checked before every native
//! `process` call.

use std::mem;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{DetectorConfig, NormalizedConfig};
use crate::error::{ArgumentError, PorcupineError, Result, SessionState};
use crate::native::{EngineHandle, NativeEngine};
use crate::runtime::Runtime;

/// Returned by [`Porcupine::process`] when the frame holds no keyword
pub const NO_DETECTION: i32 = -1;

/// Constants reported by the engine a session is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    pub frame_length: usize,
    pub sample_rate: u32,
    pub version: String,
}

enum State {
    Uninitialized,
    Ready {
        engine: Arc<dyn NativeEngine>,
        handle: EngineHandle,
        config: NormalizedConfig,
        info: EngineInfo,
    },
    Deleted,
}

/// Keyword detection session
pub struct Porcupine {
    runtime: Arc<Runtime>,
    state: State,
}

impl Porcupine {
    /// New session in the `Uninitialized` state.
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            state: State::Uninitialized,
        }
    }

    /// Create and initialize a session in one step.
    pub fn with_config(runtime: Arc<Runtime>, config: DetectorConfig) -> Result<Self> {
        let mut porcupine = Self::new(runtime);
        porcupine.init(config)?;
        Ok(porcupine)
    }

    /// Validate `config`, load the engine and create the native object.
    ///
    /// On any failure the session stays `Uninitialized` and `init` may be
    /// called again.
    pub fn init(&mut self, config: DetectorConfig) -> Result<()> {
        self.require(SessionState::Uninitialized, "initialize")?;

        let config = config.validate(&self.runtime)?;
        let engine = self.runtime.loader().load(&config.library_path)?;

        let handle = engine.init(
            &config.access_key,
            &config.model_path,
            &config.keyword_paths,
            &config.sensitivities,
        )?;

        let info = EngineInfo {
            frame_length: engine.frame_length(),
            sample_rate: engine.sample_rate(),
            version: engine.version(),
        };

        info!(
            "Porcupine {} initialized: {} keyword(s), frame length {}, sample rate {} Hz",
            info.version,
            config.keyword_paths.len(),
            info.frame_length,
            info.sample_rate
        );

        self.state = State::Ready {
            engine,
            handle,
            config,
            info,
        };
        Ok(())
    }

    /// Run detection on one frame of mono 16-bit PCM.
    ///
    /// Returns the zero-based index of the detected keyword (in the order
    /// keyword paths were resolved), or [`NO_DETECTION`].
    pub fn process(&mut self, frame: &[i16]) -> Result<i32> {
        let State::Ready {
            engine,
            handle,
            info,
            ..
        } = &self.state
        else {
            return Err(self.invalid_state("process"));
        };

        if frame.len() != info.frame_length {
            return Err(ArgumentError::FrameLength {
                expected: info.frame_length,
                actual: frame.len(),
            }
            .into());
        }

        let keyword_index = engine.process(handle, frame)?;
        if keyword_index != NO_DETECTION {
            debug!("Keyword #{} detected", keyword_index);
        }

        Ok(keyword_index)
    }

    /// Release the native object. The session can't be used afterwards.
    pub fn delete(&mut self) -> Result<()> {
        self.require(SessionState::Ready, "delete")?;

        if let State::Ready { engine, handle, .. } = mem::replace(&mut self.state, State::Deleted) {
            engine.delete(handle);
            info!("Porcupine session deleted");
        }
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        match self.state {
            State::Uninitialized => SessionState::Uninitialized,
            State::Ready { .. } => SessionState::Ready,
            State::Deleted => SessionState::Deleted,
        }
    }

    /// Samples per frame expected by [`process`](Self::process)
    pub fn frame_length(&self) -> Result<usize> {
        self.info("query frame length of").map(|info| info.frame_length)
    }

    /// Audio sample rate in Hz
    pub fn sample_rate(&self) -> Result<u32> {
        self.info("query sample rate of").map(|info| info.sample_rate)
    }

    /// Engine version string
    pub fn version(&self) -> Result<&str> {
        self.info("query version of").map(|info| info.version.as_str())
    }

    pub fn engine_info(&self) -> Result<&EngineInfo> {
        self.info("query")
    }

    /// Keyword files in detection-index order
    pub fn keyword_paths(&self) -> Result<&[PathBuf]> {
        self.config("query keywords of").map(|config| config.keyword_paths.as_slice())
    }

    pub fn sensitivities(&self) -> Result<&[f32]> {
        self.config("query sensitivities of").map(|config| config.sensitivities.as_slice())
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    fn info(&self, operation: &'static str) -> Result<&EngineInfo> {
        match &self.state {
            State::Ready { info, .. } => Ok(info),
            _ => Err(self.invalid_state(operation)),
        }
    }

    fn config(&self, operation: &'static str) -> Result<&NormalizedConfig> {
        match &self.state {
            State::Ready { config, .. } => Ok(config),
            _ => Err(self.invalid_state(operation)),
        }
    }

    fn require(&self, expected: SessionState, operation: &'static str) -> Result<()> {
        if self.state() == expected {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> PorcupineError {
        PorcupineError::InvalidState {
            operation,
            state: self.state(),
        }
    }
}

impl Drop for Porcupine {
    fn drop(&mut self) {
        if let State::Ready { engine, handle, .. } = mem::replace(&mut self.state, State::Deleted) {
            warn!("Porcupine session dropped without delete(), releasing engine");
            engine.delete(handle);
        }
    }
}

impl std::fmt::Debug for Porcupine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("Porcupine");
        debug.field("state", &self.state());
        if let State::Ready { config, info, .. } = &self.state {
            debug.field("config", config).field("info", info);
        }
        debug.finish()
    }
}
