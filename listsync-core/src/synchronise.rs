//! High-level pass: mirrors unchecked notes-list items into reminders lists.
//!
//! This module provides the orchestration for one "synchronise" run over every
//! configured [`ListPair`]. For each pair it:
//!   - Reads the unchecked items of the source checklist
//!   - Looks up the destination reminders list and its open reminders
//!   - Creates a reminder for every item whose normalized title is not yet open there
//!   - Aggregates a [`SynchroniseReport`] of what was added, skipped and failed
//!
//! # Responsibilities
//! - Refreshing the source once per pass; if that fails the whole pass fails
//! - Isolating lists from each other: a missing or failing list is reported and the pass moves on
//! - Never creating two reminders with the same normalized title in one list
//!
//! # Callable From
//! - The `sync` command of the CLI crate, once per scheduler tick
//! - Integration tests with `MockNoteSource` / `MockReminderSink`
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]
//! - Supporting types: [`ListPair`], [`SynchroniseReport`], [`ListOutcome`].

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::contract::{NoteList, NoteSource, ReminderSink};
use crate::normalize::{normalize, titles_match};

/// Fallback list used on both sides when no explicit list names are configured.
pub const DEFAULT_LIST_NAME: &str = "Groceries";

/// A source checklist and the reminders list it is mirrored into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ListPair {
    pub source: String,
    pub destination: String,
}

impl ListPair {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Decide which lists to sync.
///
/// Every name in `sync_list_names` maps onto a list of the same name on the other side.
/// With no names, a single pair built from the single-list settings is used.
pub fn resolve_pairs(
    sync_list_names: &[String],
    single_source: Option<&str>,
    single_destination: Option<&str>,
) -> Vec<ListPair> {
    if !sync_list_names.is_empty() {
        return sync_list_names
            .iter()
            .map(|name| ListPair::new(name.clone(), name.clone()))
            .collect();
    }
    vec![ListPair::new(
        single_source.unwrap_or(DEFAULT_LIST_NAME),
        single_destination.unwrap_or(DEFAULT_LIST_NAME),
    )]
}

/// Trimmed texts of the unchecked items of the first list titled `title`.
///
/// Returns `None` if no such list exists.
pub fn unchecked_items(lists: &[NoteList], title: &str) -> Option<Vec<String>> {
    let list = lists.iter().find(|list| titles_match(&list.title, title))?;
    Some(
        list.items
            .iter()
            .filter(|item| !item.checked)
            .map(|item| item.text.trim())
            .filter(|text| !text.is_empty())
            .map(str::to_owned)
            .collect(),
    )
}

/// Report of a whole pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynchroniseReport {
    pub lists: Vec<ListReport>,
    pub total_added: usize,
}

/// What happened to a single list pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListReport {
    pub source: String,
    pub destination: String,
    pub outcome: ListOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ListOutcome {
    /// The destination was compared and reminders were created where missing.
    Synced {
        /// Unchecked items read from the source list.
        fetched: usize,
        added: usize,
        /// Items already open in the destination (or repeated in the source).
        skipped: usize,
        failed: usize,
    },
    /// The source list is missing or has no unchecked items.
    NothingToSync,
    /// No reminders list with the destination name exists.
    DestinationMissing,
    /// Reading the destination failed.
    Failed { reason: String },
}

pub async fn synchronise<S, R>(
    pairs: &[ListPair],
    source: &S,
    sink: &R,
) -> Result<SynchroniseReport, String>
where
    S: NoteSource + ?Sized,
    R: ReminderSink + ?Sized,
{
    info!(pairs = pairs.len(), "[SYNC] Starting synchronisation pass");

    if let Err(e) = source.refresh().await {
        error!(error = %e, "[SYNC][ERROR] Failed to refresh notes source");
        return Err(format!("Failed to refresh notes source: {e}"));
    }
    let lists = source.lists().await.map_err(|e| {
        error!(error = %e, "[SYNC][ERROR] Failed to read lists from notes source");
        format!("Failed to read lists from notes source: {e}")
    })?;
    debug!(lists = lists.len(), "[SYNC] Notes source refreshed");

    let mut reports = Vec::with_capacity(pairs.len());
    let mut total_added = 0;

    for pair in pairs {
        let outcome = sync_pair(pair, &lists, sink).await;
        if let ListOutcome::Synced { added, .. } = outcome {
            total_added += added;
        }
        reports.push(ListReport {
            source: pair.source.clone(),
            destination: pair.destination.clone(),
            outcome,
        });
    }

    info!(
        total_added,
        "[SYNC] All lists sync complete. Added {} new reminder(s) across all lists", total_added
    );
    Ok(SynchroniseReport {
        lists: reports,
        total_added,
    })
}

async fn sync_pair<R>(pair: &ListPair, lists: &[NoteList], sink: &R) -> ListOutcome
where
    R: ReminderSink + ?Sized,
{
    let items = match unchecked_items(lists, &pair.source) {
        Some(items) => {
            info!(
                list = %pair.source,
                count = items.len(),
                "[SYNC] Fetched unchecked item(s) from source list"
            );
            items
        }
        None => {
            warn!(list = %pair.source, "[SYNC] Source list not found");
            Vec::new()
        }
    };
    if items.is_empty() {
        info!(list = %pair.source, "[SYNC] No unchecked items to sync");
        return ListOutcome::NothingToSync;
    }

    let target = match sink.find_list(&pair.destination).await {
        Ok(Some(target)) => target,
        Ok(None) => {
            error!(
                list = %pair.destination,
                "[SYNC][ERROR] Reminders list not found. Create it in Apple Reminders first"
            );
            return ListOutcome::DestinationMissing;
        }
        Err(e) => {
            error!(list = %pair.destination, error = %e, "[SYNC][ERROR] Failed to look up reminders list");
            return ListOutcome::Failed {
                reason: format!("Failed to look up reminders list: {e}"),
            };
        }
    };

    let mut existing: HashSet<String> = match sink.open_titles(&target).await {
        Ok(titles) => titles.iter().map(|title| normalize(title)).collect(),
        Err(e) => {
            error!(list = %target.title, error = %e, "[SYNC][ERROR] Failed to read existing reminders");
            return ListOutcome::Failed {
                reason: format!("Failed to read existing reminders: {e}"),
            };
        }
    };
    debug!(list = %target.title, open = existing.len(), "[SYNC] Existing open reminders");

    let fetched = items.len();
    let (mut added, mut skipped, mut failed) = (0, 0, 0);
    for item in &items {
        let key = normalize(item);
        if existing.contains(&key) {
            skipped += 1;
            continue;
        }
        match sink.create_reminder(&target, item).await {
            Ok(true) => {
                debug!(item = %item, list = %target.title, "[SYNC] Added reminder");
                existing.insert(key);
                added += 1;
            }
            Ok(false) => {
                error!(item = %item, list = %target.title, "[SYNC][ERROR] Failed to add reminder");
                failed += 1;
            }
            Err(e) => {
                error!(item = %item, list = %target.title, error = %e, "[SYNC][ERROR] Failed to add reminder");
                failed += 1;
            }
        }
    }

    info!(
        source = %pair.source,
        destination = %pair.destination,
        added,
        skipped,
        failed,
        "[SYNC] List sync complete. Added {} new reminder(s)", added
    );
    ListOutcome::Synced {
        fetched,
        added,
        skipped,
        failed,
    }
}
