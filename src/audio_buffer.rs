/// Frame assembly buffer
///
/// Audio arrives in chunks of whatever size the capture layer produces; the
/// engine only accepts frames of exactly `frame_length` samples. `FrameBuffer`
/// is a ring buffer that collects chunks and hands them back out as frames.

use cache_padded::CachePadded;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

/// Audio sample format (16-bit PCM)
pub type AudioSample = i16;

/// Seconds of audio held by a default-sized buffer
pub const BUFFER_DURATION_SECS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameBufferError {
    #[error("Buffer underflow: need {requested} samples, only {available} buffered")]
    Underflow { requested: usize, available: usize },

    #[error("Invalid buffer size: {capacity} samples can't hold a {frame_length}-sample frame")]
    InvalidSize { capacity: usize, frame_length: usize },
}

type RingBuffer = HeapRb<AudioSample>;
type RingProducer = <RingBuffer as Split>::Prod;
type RingConsumer = <RingBuffer as Split>::Cons;

/// Ring buffer that re-chunks samples into engine frames
pub struct FrameBuffer {
    producer: CachePadded<Mutex<RingProducer>>,
    consumer: CachePadded<Mutex<RingConsumer>>,
    frame_length: usize,
    sample_rate: u32,
}

impl FrameBuffer {
    /// Buffer holding [`BUFFER_DURATION_SECS`] of audio at `sample_rate`.
    pub fn new(frame_length: usize, sample_rate: u32) -> Result<Self, FrameBufferError> {
        let capacity = BUFFER_DURATION_SECS * sample_rate as usize;
        Self::with_capacity(frame_length, sample_rate, capacity.max(frame_length))
    }

    /// Buffer with an explicit capacity in samples (at least one frame).
    pub fn with_capacity(
        frame_length: usize,
        sample_rate: u32,
        capacity: usize,
    ) -> Result<Self, FrameBufferError> {
        if frame_length == 0 || capacity < frame_length {
            return Err(FrameBufferError::InvalidSize {
                capacity,
                frame_length,
            });
        }

        debug!(
            "Creating frame buffer: {} samples, {}-sample frames",
            capacity, frame_length
        );

        let (producer, consumer) = RingBuffer::new(capacity).split();

        Ok(Self {
            producer: CachePadded::new(Mutex::new(producer)),
            consumer: CachePadded::new(Mutex::new(consumer)),
            frame_length,
            sample_rate,
        })
    }

    /// Append samples, dropping the oldest buffered audio if there's no room.
    ///
    /// Returns how many of `samples` were stored; only the newest
    /// `capacity` samples of an oversized chunk are kept.
    pub fn push(&mut self, samples: &[AudioSample]) -> usize {
        let capacity = self.capacity();
        let samples = &samples[samples.len().saturating_sub(capacity)..];

        let mut producer = lock(&self.producer);
        let vacant = producer.vacant_len();

        if samples.len() > vacant {
            let to_drop = samples.len() - vacant;
            lock(&self.consumer).skip(to_drop);
            warn!("Frame buffer full, dropped {} oldest samples", to_drop);
        }

        producer.push_slice(samples)
    }

    /// Remove and return the next complete frame.
    pub fn pop_frame(&mut self) -> Result<Vec<AudioSample>, FrameBufferError> {
        let mut consumer = lock(&self.consumer);
        let available = consumer.occupied_len();

        if available < self.frame_length {
            return Err(FrameBufferError::Underflow {
                requested: self.frame_length,
                available,
            });
        }

        let mut frame = vec![0; self.frame_length];
        let read = consumer.pop_slice(&mut frame);
        frame.truncate(read);
        Ok(frame)
    }

    /// Copy of the oldest `count` buffered samples (fewer if not available)
    pub fn peek(&self, count: usize) -> Vec<AudioSample> {
        lock(&self.consumer).iter().take(count).copied().collect()
    }

    /// Number of complete frames that can be popped right now
    pub fn frames_available(&self) -> usize {
        self.len() / self.frame_length
    }

    pub fn len(&self) -> usize {
        lock(&self.consumer).occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        lock(&self.consumer).capacity().get()
    }

    pub fn free_space(&self) -> usize {
        lock(&self.producer).vacant_len()
    }

    /// Discard everything buffered, including a partial frame.
    pub fn clear(&mut self) {
        let mut consumer = lock(&self.consumer);
        let occupied = consumer.occupied_len();
        consumer.skip(occupied);
        debug!("Cleared frame buffer");
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration of the buffered audio in seconds
    pub fn duration_secs(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
