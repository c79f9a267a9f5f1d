//! Fault injection wrapper.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps a backend and fails appends on demand.
///
/// The control handle returned by [`FaultInjectingBackend::controls`] can be
/// kept after the backend has been moved into a journal.
pub struct FaultInjectingBackend<B: StorageBackend> {
    inner: B,
    controls: Arc<FaultControls>,
}

/// Shared switches for a [`FaultInjectingBackend`].
#[derive(Debug, Default)]
pub struct FaultControls {
    fail_appends: AtomicBool,
    torn_write: AtomicBool,
    failed: AtomicUsize,
}

impl FaultControls {
    /// Makes every following append fail until cleared.
    pub fn fail_appends(&self, enabled: bool) {
        self.fail_appends.store(enabled, Ordering::SeqCst);
    }

    /// Makes the next append write only half of its bytes and then fail,
    /// leaving a torn tail behind.
    pub fn tear_next_append(&self) {
        self.torn_write.store(true, Ordering::SeqCst);
    }

    /// Number of appends that were failed so far.
    pub fn failed_appends(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

impl<B: StorageBackend> FaultInjectingBackend<B> {
    /// Wraps `inner` with all faults disabled.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            controls: Arc::new(FaultControls::default()),
        }
    }

    /// Returns the shared fault switches.
    pub fn controls(&self) -> Arc<FaultControls> {
        Arc::clone(&self.controls)
    }

    /// Unwraps the inner backend.
    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B: StorageBackend> StorageBackend for FaultInjectingBackend<B> {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.controls.torn_write.swap(false, Ordering::SeqCst) {
            self.controls.failed.fetch_add(1, Ordering::SeqCst);
            self.inner.append(&data[..data.len() / 2])?;
            return Err(StorageError::Injected("torn append".into()));
        }
        if self.controls.fail_appends.load(Ordering::SeqCst) {
            self.controls.failed.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::Injected("append rejected".into()));
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}
