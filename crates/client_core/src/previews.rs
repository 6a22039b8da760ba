use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};

/// Token for a registered preview resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewHandle(u64);

/// Holds transient display-only copies of staged file bytes, keyed by
/// handle. The in-process counterpart of a browser object-URL table: a
/// handle stays resolvable until released, and each handle is released at
/// most once.
#[derive(Default)]
pub struct PreviewRegistry {
    entries: Mutex<HashMap<u64, Arc<[u8]>>>,
    next_id: AtomicU64,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, bytes: &[u8]) -> PreviewHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::from(bytes));
        PreviewHandle(id)
    }

    pub fn resolve(&self, handle: PreviewHandle) -> Option<Arc<[u8]>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle.0)
            .cloned()
    }

    /// Releases the resource behind `handle`. Returns whether it was still
    /// live, so callers can assert the exactly-once discipline.
    pub fn release(&self, handle: PreviewHandle) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0)
            .is_some()
    }

    pub fn live_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
