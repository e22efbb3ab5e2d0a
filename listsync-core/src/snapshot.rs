//! In-memory view of the notes source served by the list API, plus the lookups
//! and bulk mutations the API performs against a [`NoteSource`].

use std::collections::BTreeMap;

use futures::future::try_join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::contract::{ContractError, NoteItem, NoteList, NoteSource};
use crate::normalize::titles_match;

/// Unchecked item texts per list title, as last read from the source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ListSnapshot {
    lists: BTreeMap<String, Vec<String>>,
}

impl ListSnapshot {
    /// Build a snapshot keyed by trimmed title. Untitled lists are left out.
    pub fn from_lists(lists: &[NoteList]) -> Self {
        let lists = lists
            .iter()
            .filter_map(|list| {
                let title = list.title.trim();
                if title.is_empty() {
                    return None;
                }
                let items = list
                    .items
                    .iter()
                    .filter(|item| !item.checked && !item.text.is_empty())
                    .map(|item| item.text.trim().to_string())
                    .collect();
                Some((title.to_string(), items))
            })
            .collect();
        Self { lists }
    }

    /// Items of the list with exactly this title.
    pub fn get(&self, title: &str) -> Option<&Vec<String>> {
        self.lists.get(title)
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

/// Find a list by title, case-insensitively.
pub fn find_list<'a>(lists: &'a [NoteList], title: &str) -> Option<&'a NoteList> {
    lists.iter().find(|list| titles_match(&list.title, title))
}

/// Find an item in `list` by text, case-insensitively and ignoring outer whitespace.
pub fn find_item<'a>(list: &'a NoteList, text: &str) -> Option<&'a NoteItem> {
    list.items
        .iter()
        .filter(|item| !item.text.is_empty())
        .find(|item| titles_match(&item.text, text))
}

/// Re-read the source and build a fresh snapshot.
pub async fn load_snapshot<S>(source: &S) -> Result<ListSnapshot, ContractError>
where
    S: NoteSource + ?Sized,
{
    source.refresh().await?;
    let lists = source.lists().await?;
    let snapshot = ListSnapshot::from_lists(&lists);
    info!(lists = snapshot.len(), "[SNAPSHOT] Loaded lists from notes source");
    Ok(snapshot)
}

/// Stage deletion of every item in each named list. Lists that do not exist are skipped.
///
/// Returns the number of items staged for deletion per list that was found.
/// Nothing reaches the service until the next [`NoteSource::refresh`].
pub async fn clear_lists<S>(
    source: &S,
    names: &[String],
) -> Result<Vec<(String, usize)>, ContractError>
where
    S: NoteSource + ?Sized,
{
    let lists = source.lists().await?;
    let mut cleared = Vec::new();
    for name in names {
        let Some(list) = find_list(&lists, name) else {
            warn!(list = %name, "[CLEAR] List not found");
            continue;
        };
        let deletions = list.items.iter().map(|item| source.delete_item(&item.id));
        // Fail fast on the first deletion that cannot be staged
        try_join_all(deletions).await?;
        if list.items.is_empty() {
            info!(list = %name, "[CLEAR] No items found in list");
        } else {
            info!(list = %name, count = list.items.len(), "[CLEAR] Deleted items from list");
        }
        cleared.push((name.clone(), list.items.len()));
    }
    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, text: &str, checked: bool) -> NoteItem {
        NoteItem {
            id: id.into(),
            text: text.into(),
            checked,
        }
    }

    #[test]
    fn snapshot_keeps_unchecked_items_of_titled_lists() {
        let lists = vec![
            NoteList {
                id: "a".into(),
                title: " Groceries ".into(),
                items: vec![item("1", " Milk ", false), item("2", "Bread", true), item("3", "", false)],
            },
            NoteList {
                id: "b".into(),
                title: "   ".into(),
                items: vec![item("4", "Ghost", false)],
            },
        ];
        let snapshot = ListSnapshot::from_lists(&lists);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("Groceries"), Some(&vec!["Milk".to_string()]));
        assert_eq!(snapshot.get("groceries"), None);
        assert_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            serde_json::json!({ "Groceries": ["Milk"] })
        );
    }

    #[test]
    fn find_item_is_case_insensitive() {
        let list = NoteList {
            id: "a".into(),
            title: "Groceries".into(),
            items: vec![item("1", "Oat Milk ", false)],
        };
        assert_eq!(find_item(&list, "oat milk").map(|i| i.id.as_str()), Some("1"));
        assert!(find_item(&list, "soy milk").is_none());
    }
}
