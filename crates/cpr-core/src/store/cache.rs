//! Run-scoped, content-addressed artifact storage.
//!
//! Slots are keyed by `(run_id, sha256, kind)`. Every writer for a slot derives
//! its bytes from the same file content, so concurrent writes are benign
//! (last writer wins) and no locking beyond single-key atomicity is needed.
//! Entries are never evicted here.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::errors::{CprError, CprResult};
use crate::models::ArtifactKind;
use crate::store::layout::{read_document, write_atomic, CacheLayout};

pub trait ArtifactStore: Send + Sync {
    fn exists(&self, run_id: &str, sha256: &str, kind: ArtifactKind) -> CprResult<bool>;

    fn write(&self, run_id: &str, sha256: &str, kind: ArtifactKind, bytes: &[u8]) -> CprResult<()>;

    /// Fails with `NotFound` when the slot is empty.
    fn read(&self, run_id: &str, sha256: &str, kind: ArtifactKind) -> CprResult<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// Filesystem backend
// ---------------------------------------------------------------------------

/// Stores each slot as `runs/<run>/artifacts/<sha>.<kind>.json`.
pub struct FsArtifactStore {
    layout: CacheLayout,
}

impl FsArtifactStore {
    pub fn new(layout: CacheLayout) -> Self {
        Self { layout }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn exists(&self, run_id: &str, sha256: &str, kind: ArtifactKind) -> CprResult<bool> {
        Ok(self.layout.artifact_path(run_id, sha256, kind)?.is_file())
    }

    fn write(&self, run_id: &str, sha256: &str, kind: ArtifactKind, bytes: &[u8]) -> CprResult<()> {
        let path = self.layout.artifact_path(run_id, sha256, kind)?;
        write_atomic(&path, bytes)
    }

    fn read(&self, run_id: &str, sha256: &str, kind: ArtifactKind) -> CprResult<Vec<u8>> {
        let path = self.layout.artifact_path(run_id, sha256, kind)?;
        read_document(&path, "artifact")
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

type SlotKey = (String, String, ArtifactKind);

#[derive(Default)]
pub struct MemoryArtifactStore {
    slots: Mutex<HashMap<SlotKey, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

fn slot_key(run_id: &str, sha256: &str, kind: ArtifactKind) -> SlotKey {
    (run_id.to_string(), sha256.to_string(), kind)
}

impl ArtifactStore for MemoryArtifactStore {
    fn exists(&self, run_id: &str, sha256: &str, kind: ArtifactKind) -> CprResult<bool> {
        Ok(self.slots.lock().contains_key(&slot_key(run_id, sha256, kind)))
    }

    fn write(&self, run_id: &str, sha256: &str, kind: ArtifactKind, bytes: &[u8]) -> CprResult<()> {
        self.slots
            .lock()
            .insert(slot_key(run_id, sha256, kind), bytes.to_vec());
        Ok(())
    }

    fn read(&self, run_id: &str, sha256: &str, kind: ArtifactKind) -> CprResult<Vec<u8>> {
        self.slots
            .lock()
            .get(&slot_key(run_id, sha256, kind))
            .cloned()
            .ok_or_else(|| {
                CprError::NotFound(format!("artifact not found: {sha256}.{kind} in run {run_id}"))
            })
    }
}
