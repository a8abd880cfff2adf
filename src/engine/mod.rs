mod conflict;
mod error;
mod mutations;
mod queries;
pub mod store;
#[cfg(test)]
mod tests;

pub use conflict::{check_conflicts, find_overlaps, FailurePolicy};
pub use error::{EngineError, StoreError};
pub use store::{InMemoryStore, IntervalStore};

use std::time::Instant;

use tracing::debug;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use conflict::validate_span;

/// The scheduling engine: an in-memory store of appointments, blocks and
/// booking items per store, plus conflict checks over it.
pub struct Engine {
    pub(super) store: InMemoryStore,
    policy: FailurePolicy,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(FailurePolicy::default())
    }
}

impl Engine {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            store: InMemoryStore::new(),
            policy,
        }
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run a conflict check against this engine's store.
    pub async fn check_conflicts(&self, query: &ConflictQuery) -> Result<ConflictReport, EngineError> {
        // nothing to check, whatever the window says
        if query.subjects().is_empty() {
            return Ok(ConflictReport::default());
        }
        validate_id("store_id", &query.store_id)?;
        if query.window.start >= query.window.end {
            return Err(EngineError::InvalidSpan {
                start: query.window.start,
                end: query.window.end,
            });
        }
        if query.window.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }

        let started = Instant::now();
        let result = check_conflicts(&self.store, query, self.policy).await;
        metrics::histogram!(observability::CONFLICT_CHECK_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(report) if report.has_conflict => "conflict",
            Ok(_) => "clear",
            Err(_) => "error",
        };
        metrics::counter!(observability::CONFLICT_CHECKS_TOTAL, "outcome" => outcome).increment(1);
        if let Ok(report) = &result {
            metrics::counter!(observability::CONFLICTS_FOUND_TOTAL)
                .increment(report.conflicts.len() as u64);
            debug!(
                "conflict check store={} staff={:?} resource={:?}: {}",
                query.store_id,
                query.staff_id,
                query.resource_id,
                outcome
            );
        }
        result
    }
}

pub(crate) fn validate_id(field: &'static str, id: &str) -> Result<(), EngineError> {
    if id.trim().is_empty() {
        return Err(EngineError::Invalid(format!("{field} must not be empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(EngineError::LimitExceeded("id too long"));
    }
    Ok(())
}

pub(crate) fn validate_optional_id(field: &'static str, id: Option<&str>) -> Result<(), EngineError> {
    match id {
        Some(id) => validate_id(field, id),
        None => Ok(()),
    }
}
