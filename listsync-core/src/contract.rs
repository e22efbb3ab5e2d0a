//! # contract: interfaces between the sync core and the two services
//!
//! This module defines the two traits the rest of the crate is written against:
//!
//! - [`NoteSource`]: a notes service holding checklists (Google Keep in production).
//! - [`ReminderSink`]: a reminders service holding named lists (iCloud Reminders).
//!
//! ## Interface & Extensibility
//! - All methods are async and return boxed errors ([`ContractError`]).
//! - Mutations on a [`NoteSource`] are staged locally and only reach the
//!   service on the next [`NoteSource::refresh`].
//! - Implementors decide how titles are matched on their side; the core always
//!   compares through [`crate::normalize`].
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`, so tests in this crate and in
//!   dependents (with the `test-export-mocks` feature) can use
//!   `MockNoteSource` / `MockReminderSink`.

use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;

/// Boxed error returned by every contract method.
pub type ContractError = Box<dyn std::error::Error + Send + Sync>;

/// A checklist note in the notes service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteList {
    /// Service-side identifier, used for staging mutations.
    pub id: String,
    pub title: String,
    /// Items in display order.
    pub items: Vec<NoteItem>,
}

/// A single checklist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteItem {
    pub id: String,
    pub text: String,
    pub checked: bool,
}

/// A named list in the reminders service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderList {
    /// Identifier reminders carry to point at their parent list.
    pub id: String,
    pub title: String,
}

/// Read and mutate checklists in a notes service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait NoteSource: Send + Sync {
    /// Push staged changes, then pull the latest server state.
    async fn refresh(&self) -> Result<(), ContractError>;

    /// All live (not trashed, not deleted) checklists with their live items.
    async fn lists(&self) -> Result<Vec<NoteList>, ContractError>;

    /// Stage a new unchecked item at the end of the list.
    async fn add_item(&self, list_id: &str, text: &str) -> Result<(), ContractError>;

    /// Stage marking an item as checked.
    async fn check_item(&self, item_id: &str) -> Result<(), ContractError>;

    /// Stage deleting an item.
    async fn delete_item(&self, item_id: &str) -> Result<(), ContractError>;
}

/// Look up and append to lists in a reminders service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ReminderSink: Send + Sync {
    /// Find a list by name, case-insensitively. `None` when no list matches.
    async fn find_list(&self, name: &str) -> Result<Option<ReminderList>, ContractError>;

    /// Titles of all uncompleted reminders belonging to `list`.
    async fn open_titles(&self, list: &ReminderList) -> Result<Vec<String>, ContractError>;

    /// Create an uncompleted reminder. `Ok(false)` when the service refused it.
    async fn create_reminder(
        &self,
        list: &ReminderList,
        title: &str,
    ) -> Result<bool, ContractError>;
}
