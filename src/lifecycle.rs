//! Resource teardown.
//!
//! [`LifecycleGuard`] owns the byte store, the decoder and the running flag
//! for one compression. Everything it holds is released exactly once, on
//! [`release`](LifecycleGuard::release) or on drop, whichever comes first.
//! An encoder that is still running when a compression fails is dropped by
//! the pipeline before the guard, which frees its container state.

use std::path::PathBuf;

use crate::backend::{ByteReference, ByteStore, MediaDecoder};
use crate::capture::RunningFlag;
use crate::error::CompressError;
use crate::source::SourceMedia;

/// Releases the source reference and the decoder on every exit path.
pub struct LifecycleGuard<S: ByteStore, D: MediaDecoder> {
    store: S,
    decoder: D,
    reference: Option<S::Reference>,
    running: RunningFlag,
    released: bool,
}

impl<S: ByteStore, D: MediaDecoder> LifecycleGuard<S, D> {
    /// Take ownership of a store and a decoder.
    pub fn new(store: S, decoder: D) -> Self {
        Self {
            store,
            decoder,
            reference: None,
            running: RunningFlag::new(),
            released: false,
        }
    }

    /// Make `source` openable and return where the decoder should read it.
    ///
    /// A reference allocated earlier by this guard is released first.
    pub fn allocate(&mut self, source: &SourceMedia) -> Result<PathBuf, CompressError> {
        if let Some(previous) = self.reference.take() {
            self.store.release(previous);
        }
        let reference = self.store.create(source)?;
        let location = reference.location().to_path_buf();
        log::debug!(
            "Allocated source reference for {} at {}",
            source.name(),
            location.display()
        );
        self.reference = Some(reference);
        Ok(location)
    }

    /// The guarded decoder.
    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// The guarded decoder, mutably.
    pub fn decoder_mut(&mut self) -> &mut D {
        &mut self.decoder
    }

    /// A handle to the flag that keeps the capture loop running.
    pub fn running(&self) -> RunningFlag {
        self.running.clone()
    }

    /// Whether [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop capture, pause and detach the decoder, and release the source
    /// reference. Later calls do nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.running.clear();
        self.decoder.pause();
        self.decoder.detach();
        if let Some(reference) = self.reference.take() {
            self.store.release(reference);
        }
        log::debug!("Released compression resources");
    }
}

impl<S: ByteStore, D: MediaDecoder> Drop for LifecycleGuard<S, D> {
    fn drop(&mut self) {
        self.release();
    }
}
