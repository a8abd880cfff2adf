use std::future::Future;
use std::str::FromStr;

use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::limits::*;
use crate::model::*;

use super::store::{AppointmentQuery, BlockQuery, BookingItemQuery, IntervalStore, SubjectScope};
use super::{EngineError, StoreError};

/// What a conflict check does when one of its store fetches fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the check and return the store error.
    #[default]
    Strict,
    /// Log, count, and treat the failed fetch as having returned no rows.
    Lenient,
}

impl FromStr for FailurePolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(FailurePolicy::Strict),
            "lenient" => Ok(FailurePolicy::Lenient),
            other => Err(EngineError::Invalid(format!(
                "unknown fetch failure policy {other:?} (expected strict or lenient)"
            ))),
        }
    }
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::InvalidSpan {
            start: span.start,
            end: span.end,
        });
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// Every existing record that overlaps `query.window` for the staff member,
/// the resource, or both.
///
/// With neither subject set this returns an empty report without touching the
/// store. Otherwise each subject gets the same three fetches (appointments,
/// blocks, booking items), all issued concurrently. The order of
/// `conflicts` is not meaningful.
pub async fn check_conflicts<S>(
    store: &S,
    query: &ConflictQuery,
    policy: FailurePolicy,
) -> Result<ConflictReport, EngineError>
where
    S: IntervalStore + ?Sized,
{
    let subjects = query.subjects();
    if subjects.is_empty() {
        return Ok(ConflictReport::default());
    }

    let exclusion = query.exclude_appointment_id.as_deref();
    let per_subject = subjects.into_iter().map(|subject| {
        let scope = SubjectScope {
            store_id: query.store_id.clone(),
            subject,
        };
        find_overlaps(store, scope, query.window, exclusion, policy)
    });
    let found = try_join_all(per_subject).await?;

    Ok(ConflictReport::from_entries(found.into_iter().flatten().collect()))
}

/// The three-kind check for a single subject.
pub async fn find_overlaps<S>(
    store: &S,
    scope: SubjectScope,
    window: Span,
    exclusion: Option<&str>,
    policy: FailurePolicy,
) -> Result<Vec<ConflictEntry>, EngineError>
where
    S: IntervalStore + ?Sized,
{
    let appointment_query = AppointmentQuery {
        scope: scope.clone(),
        before: window.end,
        exclude_id: exclusion.map(str::to_string),
    };
    let block_query = BlockQuery {
        scope: scope.clone(),
        window,
    };
    let item_query = BookingItemQuery {
        scope: scope.clone(),
        before: window.end,
        exclude_parent: exclusion.map(str::to_string),
    };

    let (appointments, blocks, items) = tokio::try_join!(
        fetch(store.appointments(&appointment_query), &scope, ConflictKind::Appointment, policy),
        fetch(store.blocks(&block_query), &scope, ConflictKind::Block, policy),
        fetch(store.booking_items(&item_query), &scope, ConflictKind::BookingItem, policy)
    )?;

    let mut conflicts = appointment_conflicts(&appointments, &window, exclusion);
    conflicts.extend(block_conflicts(&blocks, &window));
    conflicts.extend(booking_item_conflicts(&items, &window, exclusion));

    debug!(
        "{} {}: {} conflicts in [{}, {})",
        scope.subject.label(),
        scope.subject.id(),
        conflicts.len(),
        window.start,
        window.end
    );
    Ok(conflicts)
}

async fn fetch<T, F>(
    rows: F,
    scope: &SubjectScope,
    kind: ConflictKind,
    policy: FailurePolicy,
) -> Result<Vec<T>, EngineError>
where
    F: Future<Output = Result<Vec<T>, StoreError>>,
{
    match rows.await {
        Ok(rows) => Ok(rows),
        Err(e) => {
            metrics::counter!(crate::observability::STORE_FETCH_FAILURES_TOTAL, "kind" => kind.as_str())
                .increment(1);
            match policy {
                FailurePolicy::Strict => Err(e.into()),
                FailurePolicy::Lenient => {
                    warn!(
                        "{} fetch for {} {} in store {} failed, counting it as empty: {e}",
                        kind.as_str(),
                        scope.subject.label(),
                        scope.subject.id(),
                        scope.store_id
                    );
                    Ok(Vec::new())
                }
            }
        }
    }
}

// ── Pure filters over fetched rows ───────────────────────────────
//
// Status and exclusion are applied again here, whatever the adapter already filtered.

pub(crate) fn appointment_conflicts(
    rows: &[Appointment],
    window: &Span,
    exclusion: Option<&str>,
) -> Vec<ConflictEntry> {
    rows.iter()
        .filter(|a| a.status.holds_appointment_slot())
        .filter(|a| exclusion != Some(a.id.as_str()))
        .filter_map(|a| {
            let end = a.end();
            (a.scheduled_at < window.end && end > window.start).then(|| ConflictEntry {
                kind: ConflictKind::Appointment,
                id: a.id.clone(),
                start_at: a.scheduled_at,
                end_at: end,
                reason: None,
            })
        })
        .collect()
}

pub(crate) fn block_conflicts(rows: &[Block], window: &Span) -> Vec<ConflictEntry> {
    rows.iter()
        .filter(|b| b.span.start < window.end && b.span.end > window.start)
        .map(|b| ConflictEntry {
            kind: ConflictKind::Block,
            id: b.id.clone(),
            start_at: b.span.start,
            end_at: b.span.end,
            reason: b
                .reason
                .as_ref()
                .filter(|r| !r.trim().is_empty())
                .cloned(),
        })
        .collect()
}

pub(crate) fn booking_item_conflicts(
    rows: &[BookingItem],
    window: &Span,
    exclusion: Option<&str>,
) -> Vec<ConflictEntry> {
    rows.iter()
        .filter(|i| i.status.holds_item_slot())
        .filter(|i| exclusion != Some(i.appointment_id.as_str()))
        .filter(|i| i.span.start < window.end && i.span.end > window.start)
        .map(|i| ConflictEntry {
            kind: ConflictKind::BookingItem,
            id: i.id.clone(),
            start_at: i.span.start,
            end_at: i.span.end,
            reason: None,
        })
        .collect()
}
