//! Wire format of the Keep changes API.
//!
//! Nodes form a tree: lists and notes hang off `root`, list items hang off
//! their list. Fields this crate does not interpret are kept in `extra` so a
//! node pushed back to the server loses nothing.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ROOT_ID: &str = "root";
pub const TYPE_LIST: &str = "LIST";
pub const TYPE_LIST_ITEM: &str = "LIST_ITEM";

const NODE_KIND: &str = "notes#node";
const TIMESTAMPS_KIND: &str = "notes#timestamps";

fn node_kind() -> String {
    NODE_KIND.to_string()
}

fn timestamps_kind() -> String {
    TIMESTAMPS_KIND.to_string()
}

/// Format a time the way the Keep API expects it.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// True when `value` names a real point in time, not the zero epoch used for "unset".
fn is_set(value: Option<&str>) -> bool {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .is_some_and(|t| t.timestamp_millis() > 0)
}

/// Client-side id for a new node: hex milliseconds, a dot, 16 random hex digits.
pub fn generate_id(now: DateTime<Utc>) -> String {
    let random: u64 = rand::thread_rng().gen_range(0..i64::MAX as u64);
    format!("{:x}.{:016x}", now.timestamp_millis(), random)
}

/// Ordering key of an item. The server sends it as a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortValue {
    Number(i64),
    Text(String),
}

impl SortValue {
    pub fn as_i64(&self) -> i64 {
        match self {
            SortValue::Number(n) => *n,
            SortValue::Text(s) => s.trim().parse().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamps {
    #[serde(default = "timestamps_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trashed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_edited: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Timestamps {
    fn default() -> Self {
        Self {
            kind: timestamps_kind(),
            created: None,
            updated: None,
            trashed: None,
            deleted: None,
            user_edited: None,
            extra: Map::new(),
        }
    }
}

impl Timestamps {
    fn fresh(now: DateTime<Utc>) -> Self {
        let now = format_timestamp(now);
        let zero = format_timestamp(DateTime::<Utc>::UNIX_EPOCH);
        Self {
            created: Some(now.clone()),
            updated: Some(now.clone()),
            trashed: Some(zero.clone()),
            deleted: Some(zero),
            user_edited: Some(now),
            ..Self::default()
        }
    }
}

/// One node of the Keep tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default = "node_kind")]
    pub kind: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_server_id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default)]
    pub checked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_value: Option<SortValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<String>,
    #[serde(default)]
    pub timestamps: Timestamps,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    /// A new unchecked item under `parent`.
    pub fn new_list_item(parent: &Node, text: &str, sort_value: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(now),
            kind: node_kind(),
            node_type: TYPE_LIST_ITEM.to_string(),
            parent_id: parent.id.clone(),
            server_id: None,
            parent_server_id: parent.server_id.clone(),
            title: String::new(),
            text: text.to_string(),
            checked: false,
            sort_value: Some(SortValue::Text(sort_value.to_string())),
            base_version: None,
            timestamps: Timestamps::fresh(now),
            extra: Map::new(),
        }
    }

    /// Neither trashed nor deleted.
    pub fn is_live(&self) -> bool {
        !is_set(self.timestamps.trashed.as_deref()) && !is_set(self.timestamps.deleted.as_deref())
    }

    pub fn is_list(&self) -> bool {
        self.node_type == TYPE_LIST && self.parent_id == ROOT_ID
    }

    pub fn is_item_of(&self, list_id: &str) -> bool {
        self.node_type == TYPE_LIST_ITEM && self.parent_id == list_id
    }

    pub fn sort_key(&self) -> i64 {
        self.sort_value.as_ref().map(SortValue::as_i64).unwrap_or(0)
    }

    pub fn check(&mut self, now: DateTime<Utc>) {
        self.checked = true;
        self.touch(now);
    }

    pub fn delete(&mut self, now: DateTime<Utc>) {
        self.timestamps.deleted = Some(format_timestamp(now));
        self.touch(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        let now = format_timestamp(now);
        self.timestamps.updated = Some(now.clone());
        self.timestamps.user_edited = Some(now);
    }
}

/// Sort value for an item appended to a list with the given existing keys.
pub fn next_sort_value(existing: impl IntoIterator<Item = i64>) -> i64 {
    match existing.into_iter().min() {
        Some(min) => min - 1,
        None => rand::thread_rng().gen_range(1_000_000_000..10_000_000_000),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientVersion {
    pub major: &'static str,
    pub minor: &'static str,
    pub build: &'static str,
    pub revision: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Capability {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHeader {
    pub client_session_id: String,
    pub client_platform: &'static str,
    pub client_version: ClientVersion,
    pub capabilities: Vec<Capability>,
}

const CAPABILITIES: [&str; 11] = ["NC", "PI", "LB", "AN", "SH", "DR", "TR", "IN", "SNB", "MI", "CO"];

impl RequestHeader {
    pub fn new(session_id: &str) -> Self {
        Self {
            client_session_id: session_id.to_string(),
            client_platform: "ANDROID",
            client_version: ClientVersion {
                major: "9",
                minor: "9",
                build: "9",
                revision: "9",
            },
            capabilities: CAPABILITIES.iter().map(|&kind| Capability { kind }).collect(),
        }
    }
}

/// Body of `POST changes`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesRequest {
    pub nodes: Vec<Node>,
    pub client_timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,
    pub request_header: RequestHeader,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesResponse {
    #[serde(default)]
    pub to_version: Option<String>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub force_full_resync: bool,
}

/// Session id sent with every changes request.
pub fn session_id(now: DateTime<Utc>) -> String {
    let random: u64 = rand::thread_rng().gen_range(1_000_000_000..10_000_000_000);
    format!("s--{}--{}", now.timestamp_millis(), random)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let wire = json!({
            "id": "abc",
            "kind": "notes#node",
            "type": "LIST_ITEM",
            "parentId": "list1",
            "text": "Milk",
            "checked": false,
            "sortValue": "42",
            "superListItemId": null,
            "timestamps": {
                "kind": "notes#timestamps",
                "created": "2024-01-01T00:00:00.000Z",
                "recentSharedChangesSeen": "2024-01-02T00:00:00.000Z"
            },
            "annotationsGroup": {"kind": "notes#annotationsGroup"}
        });
        let node: Node = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(node.sort_key(), 42);
        assert!(node.is_item_of("list1"));
        assert_eq!(serde_json::to_value(&node).unwrap(), wire);
    }

    #[test]
    fn liveness_ignores_the_zero_epoch() {
        let mut node: Node = serde_json::from_value(json!({
            "id": "n", "type": "LIST", "parentId": "root",
            "timestamps": {"trashed": "1970-01-01T00:00:00.000Z", "deleted": "1970-01-01T00:00:00.000Z"}
        }))
        .unwrap();
        assert!(node.is_live());
        assert!(node.is_list());

        node.delete(now());
        assert!(!node.is_live());
        assert_eq!(node.timestamps.deleted.as_deref(), Some("2024-03-01T12:00:00.000Z"));
    }

    #[test]
    fn new_items_sort_after_existing_ones() {
        assert_eq!(next_sort_value([10, 5, 7]), 4);
        let fresh = next_sort_value([]);
        assert!((1_000_000_000..10_000_000_000).contains(&fresh));
    }

    #[test]
    fn new_list_item_points_at_its_parent() {
        let parent: Node = serde_json::from_value(json!({
            "id": "list1", "serverId": "srv1", "type": "LIST", "parentId": "root"
        }))
        .unwrap();
        let item = Node::new_list_item(&parent, "Eggs", 99, now());
        assert!(item.is_item_of("list1"));
        assert!(item.is_live());
        assert!(!item.checked);
        assert_eq!(item.parent_server_id.as_deref(), Some("srv1"));
        assert_eq!(item.sort_key(), 99);
        let (millis, random) = item.id.split_once('.').unwrap();
        assert_eq!(i64::from_str_radix(millis, 16).unwrap(), now().timestamp_millis());
        assert_eq!(random.len(), 16);
    }

    #[test]
    fn checking_marks_the_node_updated() {
        let mut node: Node =
            serde_json::from_value(json!({"id": "i", "type": "LIST_ITEM", "parentId": "l"})).unwrap();
        node.check(now());
        assert!(node.checked);
        assert_eq!(node.timestamps.updated.as_deref(), Some("2024-03-01T12:00:00.000Z"));
    }

    #[test]
    fn request_header_lists_capabilities() {
        let header = serde_json::to_value(RequestHeader::new("s--1--2")).unwrap();
        assert_eq!(header["clientPlatform"], "ANDROID");
        assert_eq!(header["clientVersion"]["major"], "9");
        assert_eq!(header["capabilities"].as_array().unwrap().len(), 11);
        assert_eq!(header["capabilities"][0], json!({"type": "NC"}));
    }
}
