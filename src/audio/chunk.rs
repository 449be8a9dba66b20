//! Captured audio chunks and the gated buffer that collects them.
//!
//! Device callbacks never touch the recorder directly.  They hold a
//! [`ChunkSink`], a cheap handle tagged with the generation of the recording
//! session that created it.  The shared [`ChunkGate`] accepts a frame only
//! while the gate is open *for that generation*, so late callbacks from a
//! stopped or superseded session are dropped.
//!
//! The gate check and the append happen under one lock, and closing the
//! gate takes the same lock.  A frame is therefore either appended before
//! the gate closes or rejected after it; never both, never lost in between.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::resample::stereo_to_mono;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// One immutable frame of mono `f32` samples, nominally in `[-1.0, 1.0]`.
///
/// Chunks carry no timestamp; their position in the session's sequence is
/// their arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    samples: Box<[f32]>,
}

impl AudioChunk {
    /// Copy `samples` into a new chunk.
    pub fn new(samples: &[f32]) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<f32>> for AudioChunk {
    fn from(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }
}

// ---------------------------------------------------------------------------
// ChunkGate
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct GateState {
    chunks: Vec<AudioChunk>,
    total_samples: usize,
    /// Generation currently accepting frames; `None` when the gate is closed.
    open_generation: Option<u64>,
    next_generation: u64,
    device_lost: bool,
}

/// Shared append-only chunk buffer guarded by the recording flag.
#[derive(Debug, Default)]
pub struct ChunkGate {
    state: Mutex<GateState>,
}

impl ChunkGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new generation: discard residual chunks, open the gate, and
    /// return the sink device callbacks must push into.
    pub fn open(self: &Arc<Self>) -> ChunkSink {
        let mut st = self.state();
        st.chunks.clear();
        st.total_samples = 0;
        st.device_lost = false;
        let generation = st.next_generation;
        st.next_generation += 1;
        st.open_generation = Some(generation);

        ChunkSink {
            gate: Arc::clone(self),
            generation,
        }
    }

    /// Close the gate.  Returns `true` if it was open.
    pub fn close(&self) -> bool {
        self.state().open_generation.take().is_some()
    }

    pub fn is_open(&self) -> bool {
        self.state().open_generation.is_some()
    }

    /// `true` while `generation` is the one accepting frames.
    pub fn accepts(&self, generation: u64) -> bool {
        self.state().open_generation == Some(generation)
    }

    /// `true` if the device reported itself gone during the current
    /// generation.
    pub fn device_lost(&self) -> bool {
        self.state().device_lost
    }

    /// Move the accumulated chunks out, leaving the buffer empty.
    pub fn take_chunks(&self) -> Vec<AudioChunk> {
        let mut st = self.state();
        st.total_samples = 0;
        std::mem::take(&mut st.chunks)
    }

    /// Drop accumulated chunks without processing them.
    pub fn clear(&self) {
        let mut st = self.state();
        st.chunks.clear();
        st.total_samples = 0;
    }

    pub fn chunk_count(&self) -> usize {
        self.state().chunks.len()
    }

    pub fn total_samples(&self) -> usize {
        self.state().total_samples
    }

    fn push(&self, generation: u64, samples: &[f32]) -> bool {
        let mut st = self.state();
        if st.open_generation != Some(generation) {
            return false;
        }
        st.total_samples += samples.len();
        st.chunks.push(AudioChunk::new(samples));
        true
    }

    fn mark_device_lost(&self, generation: u64) -> bool {
        let mut st = self.state();
        if st.open_generation != Some(generation) {
            return false;
        }
        st.open_generation = None;
        st.device_lost = true;
        true
    }
}

// ---------------------------------------------------------------------------
// ChunkSink
// ---------------------------------------------------------------------------

/// Handle given to a device callback for one recording generation.
///
/// Pushing never blocks beyond a short critical section and never
/// allocates more than the chunk copy itself.
#[derive(Debug, Clone)]
pub struct ChunkSink {
    gate: Arc<ChunkGate>,
    generation: u64,
}

impl ChunkSink {
    /// Append a copy of `samples` as a new chunk.
    ///
    /// Returns `false` (and stores nothing) once this sink's generation is
    /// no longer the open one.
    pub fn push(&self, samples: &[f32]) -> bool {
        let accepted = self.gate.push(self.generation, samples);
        if !accepted {
            log::trace!("chunk sink: dropped late frame of {} samples", samples.len());
        }
        accepted
    }

    /// Report that the input device disappeared mid-session.
    ///
    /// Closes the gate for this generation.  Chunks already captured are
    /// kept so that a later stop still returns the partial recording.
    pub fn device_lost(&self, reason: &str) {
        if self.gate.mark_device_lost(self.generation) {
            log::warn!("capture: input device lost ({reason}); keeping partial recording");
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_accepting(&self) -> bool {
        self.gate.accepts(self.generation)
    }
}

// ---------------------------------------------------------------------------
// FrameAssembler
// ---------------------------------------------------------------------------

/// Re-cuts device buffers of arbitrary size into constant-size mono frames.
///
/// Callbacks deliver interleaved samples holding whole multi-channel frames.
/// Samples are downmixed to mono and handed out `frame_size` at a time; a
/// partial frame stays pending until enough samples arrive.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    channels: u16,
    pending: Vec<f32>,
}

impl FrameAssembler {
    /// # Panics
    ///
    /// Panics if `frame_size == 0`.
    pub fn new(frame_size: usize, channels: u16) -> Self {
        assert!(frame_size > 0, "FrameAssembler frame size must be > 0");
        Self {
            frame_size,
            channels,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Feed one device buffer, calling `emit` for every completed frame.
    pub fn push_interleaved(&mut self, data: &[f32], mut emit: impl FnMut(&[f32])) {
        let mono = stereo_to_mono(data, self.channels);
        let mut rest: &[f32] = &mono;

        while !rest.is_empty() {
            let wanted = self.frame_size - self.pending.len();
            let take = wanted.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.frame_size {
                emit(&self.pending);
                self.pending.clear();
            }
        }
    }

    /// Number of mono samples waiting for a full frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_chunk_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AudioChunk>();
        assert_send_sync::<ChunkSink>();
    }

    #[test]
    fn sink_appends_in_arrival_order() {
        let gate = ChunkGate::new();
        let sink = gate.open();
        assert!(sink.push(&[0.1, 0.2]));
        assert!(sink.push(&[0.3]));

        assert_eq!(gate.total_samples(), 3);
        let chunks = gate.take_chunks();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].samples(), &[0.1, 0.2]);
        assert_eq!(chunks[1].samples(), &[0.3]);
        assert_eq!(gate.chunk_count(), 0);
    }

    #[test]
    fn closed_gate_rejects_frames() {
        let gate = ChunkGate::new();
        let sink = gate.open();
        assert!(sink.push(&[0.5]));
        assert!(gate.close());
        assert!(!sink.push(&[0.6]));
        assert!(!gate.close());

        assert_eq!(gate.take_chunks(), vec![AudioChunk::new(&[0.5])]);
    }

    #[test]
    fn stale_generation_is_rejected_after_reopen() {
        let gate = ChunkGate::new();
        let old = gate.open();
        gate.close();
        let new = gate.open();

        assert_ne!(old.generation(), new.generation());
        assert!(!old.push(&[9.0]));
        assert!(!old.is_accepting());
        assert!(new.push(&[1.0]));
        assert_eq!(gate.take_chunks(), vec![AudioChunk::new(&[1.0])]);
    }

    #[test]
    fn open_discards_residual_chunks() {
        let gate = ChunkGate::new();
        let sink = gate.open();
        sink.push(&[0.1; 8]);
        gate.close();

        let _sink = gate.open();
        assert_eq!(gate.chunk_count(), 0);
        assert_eq!(gate.total_samples(), 0);
    }

    #[test]
    fn device_loss_closes_gate_but_keeps_data() {
        let gate = ChunkGate::new();
        let sink = gate.open();
        sink.push(&[0.25; 4]);
        sink.device_lost("unplugged");

        assert!(!gate.is_open());
        assert!(gate.device_lost());
        assert!(!sink.push(&[0.25; 4]));
        assert_eq!(gate.total_samples(), 4);
    }

    #[test]
    fn device_loss_from_stale_sink_is_ignored() {
        let gate = ChunkGate::new();
        let old = gate.open();
        let _new = gate.open();
        old.device_lost("old device");
        assert!(gate.is_open());
        assert!(!gate.device_lost());
    }

    #[test]
    fn concurrent_producer_never_appends_after_close() {
        let gate = ChunkGate::new();
        let sink = gate.open();

        let producer = {
            let sink = sink.clone();
            std::thread::spawn(move || {
                let mut accepted = 0usize;
                let mut rejected_seen = false;
                for _ in 0..10_000 {
                    if sink.push(&[0.0; 16]) {
                        // once a push was rejected, no later push may succeed
                        assert!(!rejected_seen);
                        accepted += 1;
                    } else {
                        rejected_seen = true;
                    }
                }
                accepted
            })
        };

        std::thread::yield_now();
        gate.close();
        let accepted = producer.join().unwrap();
        assert_eq!(gate.chunk_count(), accepted);
    }

    // ---- FrameAssembler ----------------------------------------------------

    #[test]
    fn assembler_emits_fixed_frames() {
        let mut asm = FrameAssembler::new(4, 1);
        let mut frames: Vec<Vec<f32>> = Vec::new();

        asm.push_interleaved(&[1.0, 2.0, 3.0], |f| frames.push(f.to_vec()));
        assert!(frames.is_empty());
        assert_eq!(asm.pending(), 3);

        asm.push_interleaved(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0], |f| frames.push(f.to_vec()));
        assert_eq!(frames, vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]);
        assert_eq!(asm.pending(), 1);
    }

    #[test]
    fn assembler_downmixes_stereo() {
        let mut asm = FrameAssembler::new(2, 2);
        let mut frames: Vec<Vec<f32>> = Vec::new();
        asm.push_interleaved(&[1.0, 0.0, 0.5, 0.5], |f| frames.push(f.to_vec()));
        assert_eq!(frames, vec![vec![0.5, 0.5]]);
    }

    #[test]
    #[should_panic(expected = "FrameAssembler frame size must be > 0")]
    fn zero_frame_size_panics() {
        let _ = FrameAssembler::new(0, 1);
    }
}
