//! Tracking sinks: where composition records go.
//!
//! Records are plain data. The in-memory tracker is useful for tests and
//! small deployments; persistence belongs to the front end.

use chrono::{DateTime, Utc};
use promptsmith_core::{CompositionRecord, TrackingSink};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

/// A record with the time it was received.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedComposition {
    pub recorded_at: DateTime<Utc>,
    pub record: CompositionRecord,
}

/// In-memory tracker that keeps every record and forwards to optional sinks.
pub struct MemoryTracker {
    records: Mutex<Vec<TrackedComposition>>,
    sinks: Vec<Box<dyn TrackingSink>>,
}

impl std::fmt::Debug for MemoryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTracker")
            .field("record_count", &self.lock().len())
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            sinks: Vec::new(),
        }
    }

    pub fn with_sinks(sinks: Vec<Box<dyn TrackingSink>>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            sinks,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TrackedComposition>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn records(&self) -> Vec<TrackedComposition> {
        self.lock().clone()
    }

    /// Records whose recipe used `template_id`.
    pub fn by_template(&self, template_id: &str) -> Vec<TrackedComposition> {
        self.lock()
            .iter()
            .filter(|t| t.record.recipe.template_id() == template_id)
            .cloned()
            .collect()
    }

    /// Records sharing a recipe hash, oldest first.
    pub fn by_recipe_hash(&self, hash: &str) -> Vec<TrackedComposition> {
        self.lock()
            .iter()
            .filter(|t| t.record.provenance.recipe_hash == hash)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

impl TrackingSink for MemoryTracker {
    fn record(&self, record: &CompositionRecord) {
        self.lock().push(TrackedComposition {
            recorded_at: Utc::now(),
            record: record.clone(),
        });
        for sink in &self.sinks {
            sink.record(record);
        }
    }
}

/// Emits every record as a `tracing` event.
pub struct TracingTracker;

impl TrackingSink for TracingTracker {
    fn record(&self, record: &CompositionRecord) {
        tracing::info!(
            template = %record.recipe.template_id(),
            categories = ?record.recipe.categories(),
            recipe_hash = %record.provenance.recipe_hash,
            category_set_hash = %record.provenance.category_set_hash,
            generation = record.snapshot_generation,
            job = ?record.job.as_ref().map(|j| &j.job_id),
            "COMPOSITION"
        );
    }
}
