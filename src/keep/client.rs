use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use listsync_core::contract::{ContractError, NoteItem, NoteList, NoteSource};
use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::auth::{GoogleAuth, KeepCredentials, DEFAULT_AUTH_URL};
use super::node::{
    format_timestamp, next_sort_value, session_id, ChangesRequest, ChangesResponse, Node,
    RequestHeader,
};
use super::KeepError;

pub const DEFAULT_API_URL: &str = "https://www.googleapis.com/notes/v1/";

/// Where the client sends its requests. Tests point these at a local server.
#[derive(Debug, Clone)]
pub struct KeepEndpoints {
    pub auth_url: String,
    pub api_url: String,
}

impl Default for KeepEndpoints {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

#[derive(Default)]
struct KeepState {
    token: String,
    version: Option<String>,
    nodes: HashMap<String, Node>,
    dirty: HashSet<String>,
}

/// Google Keep as a [`NoteSource`].
///
/// Holds a local copy of the node tree. Mutations are staged on that copy and
/// pushed by the next [`NoteSource::refresh`].
pub struct KeepClient {
    http: reqwest::Client,
    auth: GoogleAuth,
    changes_url: String,
    email: String,
    android_id: String,
    master_token: String,
    session_id: String,
    state: Mutex<KeepState>,
}

impl KeepClient {
    /// Authenticate and pull the full node tree.
    pub async fn login(
        credentials: &KeepCredentials,
        endpoints: KeepEndpoints,
    ) -> Result<Self, KeepError> {
        let http = reqwest::Client::builder().build()?;
        let auth = GoogleAuth::new(http.clone(), endpoints.auth_url);
        let master_token = auth.master_token(credentials).await?;
        let token = auth
            .oauth(&credentials.email, &master_token, &credentials.android_id)
            .await?;

        let client = Self {
            http,
            auth,
            changes_url: format!("{}changes", with_trailing_slash(&endpoints.api_url)),
            email: credentials.email.clone(),
            android_id: credentials.android_id.clone(),
            master_token,
            session_id: session_id(Utc::now()),
            state: Mutex::new(KeepState {
                token,
                ..KeepState::default()
            }),
        };
        client.sync().await?;
        info!(email = %client.email, "Logged in to Google Keep");
        Ok(client)
    }

    /// Push dirty nodes and pull server changes until the server reports no more.
    pub async fn sync(&self) -> Result<(), KeepError> {
        let mut state = self.state.lock().await;
        let mut pushed = 0usize;
        loop {
            let nodes: Vec<Node> = state
                .dirty
                .iter()
                .filter_map(|id| state.nodes.get(id).cloned())
                .collect();
            pushed += nodes.len();
            let request = ChangesRequest {
                nodes,
                client_timestamp: format_timestamp(Utc::now()),
                target_version: state.version.clone(),
                request_header: RequestHeader::new(&self.session_id),
            };
            let response = self.post_changes(&mut state, &request).await?;
            state.dirty.clear();

            if response.force_full_resync {
                warn!("Keep requested a full resync; dropping local state");
                state.nodes.clear();
                state.version = None;
                continue;
            }

            let received = response.nodes.len();
            for node in response.nodes {
                state.nodes.insert(node.id.clone(), node);
            }
            if response.to_version.is_some() {
                state.version = response.to_version;
            }
            debug!(received, truncated = response.truncated, "Applied Keep changes");
            if !response.truncated {
                break;
            }
        }
        info!(pushed, nodes = state.nodes.len(), "Synced with Google Keep");
        Ok(())
    }

    async fn post_changes(
        &self,
        state: &mut KeepState,
        request: &ChangesRequest,
    ) -> Result<ChangesResponse, KeepError> {
        let mut response = self.send_changes(&state.token, request).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Keep token rejected; requesting a new one");
            state.token = self
                .auth
                .oauth(&self.email, &self.master_token, &self.android_id)
                .await?;
            response = self.send_changes(&state.token, request).await?;
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KeepError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<ChangesResponse>().await?)
    }

    async fn send_changes(
        &self,
        token: &str,
        request: &ChangesRequest,
    ) -> Result<reqwest::Response, KeepError> {
        Ok(self
            .http
            .post(&self.changes_url)
            .header(reqwest::header::AUTHORIZATION, format!("OAuth {token}"))
            .json(request)
            .send()
            .await?)
    }

    /// Live lists with their live items, items ordered by descending sort value.
    fn collect_lists(state: &KeepState) -> Vec<NoteList> {
        let mut lists: Vec<NoteList> = state
            .nodes
            .values()
            .filter(|node| node.is_list() && node.is_live())
            .map(|list| {
                let mut items: Vec<&Node> = state
                    .nodes
                    .values()
                    .filter(|node| node.is_item_of(&list.id) && node.is_live())
                    .collect();
                items.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
                NoteList {
                    id: list.id.clone(),
                    title: list.title.clone(),
                    items: items
                        .into_iter()
                        .map(|item| NoteItem {
                            id: item.id.clone(),
                            text: item.text.clone(),
                            checked: item.checked,
                        })
                        .collect(),
                }
            })
            .collect();
        lists.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        lists
    }

    async fn modify_node(
        &self,
        id: &str,
        change: impl FnOnce(&mut Node),
    ) -> Result<(), KeepError> {
        let mut state = self.state.lock().await;
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| KeepError::UnknownNode(id.to_string()))?;
        change(node);
        state.dirty.insert(id.to_string());
        Ok(())
    }
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

#[async_trait]
impl NoteSource for KeepClient {
    async fn refresh(&self) -> Result<(), ContractError> {
        Ok(self.sync().await?)
    }

    async fn lists(&self) -> Result<Vec<NoteList>, ContractError> {
        let state = self.state.lock().await;
        Ok(Self::collect_lists(&state))
    }

    async fn add_item(&self, list_id: &str, text: &str) -> Result<(), ContractError> {
        let mut state = self.state.lock().await;
        let parent = state
            .nodes
            .get(list_id)
            .filter(|node| node.is_list() && node.is_live())
            .ok_or_else(|| KeepError::UnknownNode(list_id.to_string()))?;
        let sort_value = next_sort_value(
            state
                .nodes
                .values()
                .filter(|node| node.is_item_of(list_id) && node.is_live())
                .map(Node::sort_key),
        );
        let item = Node::new_list_item(parent, text, sort_value, Utc::now());
        debug!(list = %list_id, item = %item.id, "Staged new Keep item");
        state.dirty.insert(item.id.clone());
        state.nodes.insert(item.id.clone(), item);
        Ok(())
    }

    async fn check_item(&self, item_id: &str) -> Result<(), ContractError> {
        Ok(self.modify_node(item_id, |node| node.check(Utc::now())).await?)
    }

    async fn delete_item(&self, item_id: &str) -> Result<(), ContractError> {
        Ok(self.modify_node(item_id, |node| node.delete(Utc::now())).await?)
    }
}
