//! Bounded ring of recently seen jobs.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::Arc;

use uuid::Uuid;

use crate::job::ArchiveJob;

/// Keeps handles to the last N jobs for `/status/{id}` lookups.
///
/// The ring holds the jobs themselves (not snapshots), so a lookup always
/// observes the current status. Eviction is oldest-first.
pub struct JobHistory {
    entries: Mutex<VecDeque<Arc<ArchiveJob>>>,
    capacity: usize,
}

impl JobHistory {
    /// Create a history ring with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Record a job, evicting the oldest entry when full.
    pub fn push(&self, job: Arc<ArchiveJob>) {
        let mut entries = self.entries.lock().expect("history lock poisoned");
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(job);
    }

    /// Look up a job by its string id.
    ///
    /// Returns `None` for unknown ids and for strings that are not a UUID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<ArchiveJob>> {
        let id: Uuid = id.parse().ok()?;
        let entries = self.entries.lock().expect("history lock poisoned");
        entries.iter().find(|job| job.id() == id).cloned()
    }

    /// Number of jobs currently kept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("history lock poisoned").len()
    }

    /// Whether the ring is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
