/// Streaming keyword listener
///
/// Wraps a ready [`Porcupine`] session for callers that receive audio in
/// arbitrary chunks (capture callbacks, network streams). Chunks are
/// assembled into engine frames and every detection is published as a
/// [`KeywordEvent`] on an async channel.

use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::audio_buffer::{AudioSample, FrameBuffer, FrameBufferError};
use crate::error::{PorcupineError, SessionState};
use crate::porcupine::{Porcupine, NO_DETECTION};

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Detection failed: {0}")]
    Detection(#[from] PorcupineError),

    #[error("Frame buffer error: {0}")]
    Buffer(#[from] FrameBufferError),

    #[error("Listener has been shut down")]
    ShutDown,
}

/// One keyword detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordEvent {
    /// Index of the detected keyword in the session's keyword order
    pub keyword_index: i32,

    /// Zero-based index of the frame that triggered the detection
    pub frame_index: u64,

    /// Wall-clock time of the detection (microseconds since epoch)
    pub timestamp_micros: i64,
}

struct ListenerState {
    porcupine: Porcupine,
    frame_buffer: FrameBuffer,
    event_tx: Option<mpsc::UnboundedSender<KeywordEvent>>,
    is_running: bool,
    frames_processed: u64,
    keywords_detected: u64,
}

/// Chunked-audio front end for a detector session
pub struct KeywordListener {
    state: Mutex<ListenerState>,
    event_rx: Mutex<mpsc::UnboundedReceiver<KeywordEvent>>,
}

impl KeywordListener {
    /// Take ownership of an initialized session.
    pub fn new(porcupine: Porcupine) -> Result<Self, ListenerError> {
        let frame_length = porcupine.frame_length()?;
        let sample_rate = porcupine.sample_rate()?;
        let frame_buffer = FrameBuffer::new(frame_length, sample_rate)?;

        info!(
            "Keyword listener created ({} keyword(s), {}-sample frames at {} Hz)",
            porcupine.keyword_paths()?.len(),
            frame_length,
            sample_rate
        );

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Self {
            state: Mutex::new(ListenerState {
                porcupine,
                frame_buffer,
                event_tx: Some(event_tx),
                is_running: false,
                frames_processed: 0,
                keywords_detected: 0,
            }),
            event_rx: Mutex::new(event_rx),
        })
    }

    pub async fn start(&self) -> Result<(), ListenerError> {
        let mut state = self.state.lock().await;

        if state.event_tx.is_none() {
            return Err(ListenerError::ShutDown);
        }
        if state.is_running {
            warn!("Listener already running");
            return Ok(());
        }

        state.is_running = true;
        info!("Keyword listener started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), ListenerError> {
        let mut state = self.state.lock().await;

        if !state.is_running {
            warn!("Listener not running");
            return Ok(());
        }

        state.is_running = false;
        info!("Keyword listener stopped");
        Ok(())
    }

    /// Feed a chunk of mono 16-bit PCM at the session's sample rate.
    ///
    /// Runs detection on every complete frame and returns how many
    /// keywords were detected. Audio is ignored while stopped.
    pub async fn process_audio(&self, samples: &[AudioSample]) -> Result<usize, ListenerError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if !state.is_running {
            return Ok(0);
        }

        state.frame_buffer.push(samples);

        let mut detected = 0;
        while state.frame_buffer.frames_available() > 0 {
            let frame = state.frame_buffer.pop_frame()?;
            let frame_index = state.frames_processed;
            state.frames_processed += 1;

            let keyword_index = state.porcupine.process(&frame)?;
            if keyword_index == NO_DETECTION {
                continue;
            }

            info!("Keyword #{} detected at frame {}", keyword_index, frame_index);
            detected += 1;
            state.keywords_detected += 1;

            let event = KeywordEvent {
                keyword_index,
                frame_index,
                timestamp_micros: current_timestamp_micros(),
            };
            if let Some(tx) = &state.event_tx {
                if let Err(e) = tx.send(event) {
                    error!("Failed to send keyword event: {}", e);
                }
            }
        }

        if state.frames_processed > 0 && state.frames_processed % 1000 == 0 {
            debug!(
                "Processed {} frames, detected {} keywords",
                state.frames_processed, state.keywords_detected
            );
        }

        Ok(detected)
    }

    /// Next pending event, if any.
    pub async fn try_recv_event(&self) -> Option<KeywordEvent> {
        self.event_rx.lock().await.try_recv().ok()
    }

    /// Wait for the next event. `None` once the listener is shut down and
    /// every pending event has been received.
    pub async fn recv_event(&self) -> Option<KeywordEvent> {
        self.event_rx.lock().await.recv().await
    }

    pub async fn stats(&self) -> ListenerStats {
        let state = self.state.lock().await;

        ListenerStats {
            frames_processed: state.frames_processed,
            keywords_detected: state.keywords_detected,
            buffered_samples: state.frame_buffer.len(),
            is_running: state.is_running,
            session_state: state.porcupine.state(),
        }
    }

    /// Drop buffered audio and zero the counters.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.frame_buffer.clear();
        state.frames_processed = 0;
        state.keywords_detected = 0;
        info!("Listener reset");
    }

    /// Stop, release the engine session and close the event channel.
    pub async fn shutdown(&self) -> Result<(), ListenerError> {
        let mut state = self.state.lock().await;

        if state.event_tx.take().is_none() {
            return Err(ListenerError::ShutDown);
        }

        state.is_running = false;
        state.frame_buffer.clear();
        state.porcupine.delete()?;
        info!("Keyword listener shut down");
        Ok(())
    }
}

/// Listener counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerStats {
    pub frames_processed: u64,
    pub keywords_detected: u64,
    pub buffered_samples: usize,
    pub is_running: bool,
    pub session_state: SessionState,
}

fn current_timestamp_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as i64)
        .unwrap_or_default()
}
