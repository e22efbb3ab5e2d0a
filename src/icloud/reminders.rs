//! iCloud Reminders web service as a [`ReminderSink`].

use async_trait::async_trait;
use chrono::Utc;
use listsync_core::contract::{ContractError, ReminderList, ReminderSink};
use listsync_core::normalize::titles_match;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::session::ICloudSession;
use super::ICloudError;

const CLIENT_VERSION: &str = "4.0";
const LANG: &str = "en-us";
const USER_TZ: &str = "UTC";

/// A reminders list as the web service calls it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub title: String,
    pub guid: String,
    #[serde(default)]
    pub ctag: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub p_guid: String,
    #[serde(default)]
    pub completed_date: Option<Value>,
}

impl Reminder {
    pub fn is_completed(&self) -> bool {
        self.completed_date.as_ref().is_some_and(|d| !d.is_null())
    }
}

/// Payload of `GET /rd/startup`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Startup {
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
}

pub struct RemindersClient {
    session: ICloudSession,
    service_url: String,
    /// Last `/rd/startup` payload, replaced by every [`find_list`](ReminderSink::find_list).
    cached: Mutex<Option<Startup>>,
}

impl RemindersClient {
    /// Fails when the account does not expose the reminders service.
    pub fn new(session: ICloudSession) -> Result<Self, ICloudError> {
        let service_url = session.service_url("reminders")?;
        debug!(url = %service_url, "Using iCloud Reminders service");
        Ok(Self {
            session,
            service_url,
            cached: Mutex::new(None),
        })
    }

    /// Fetch collections and open reminders.
    pub async fn startup(&self) -> Result<Startup, ICloudError> {
        let params = self.params();
        let request = self
            .session
            .http()
            .get(format!("{}/rd/startup", self.service_url))
            .query(&params);
        let response = self.session.send_service(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ICloudError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let startup: Startup = response.json().await?;
        debug!(
            collections = startup.collections.len(),
            reminders = startup.reminders.len(),
            "Fetched iCloud Reminders"
        );
        *self.cached.lock().await = Some(startup.clone());
        Ok(startup)
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = self.session.params();
        params.extend([
            ("clientVersion", CLIENT_VERSION.to_string()),
            ("lang", LANG.to_string()),
            ("usertz", USER_TZ.to_string()),
        ]);
        params
    }

    async fn cached_startup(&self) -> Result<Startup, ICloudError> {
        if let Some(startup) = self.cached.lock().await.clone() {
            return Ok(startup);
        }
        self.startup().await
    }
}

/// Request body for creating a reminder in `list`.
pub fn new_reminder_body(list: &ReminderList, title: &str, collections: &[Collection]) -> Value {
    json!({
        "Reminders": {
            "title": title,
            "description": "",
            "pGuid": list.id,
            "etag": null,
            "order": null,
            "priority": 0,
            "recurrence": null,
            "alarms": [],
            "startDate": null,
            "startDateTz": null,
            "startDateIsAllDay": false,
            "completedDate": null,
            "dueDate": null,
            "dueDateIsAllDay": false,
            "lastModifiedDate": null,
            "createdDate": null,
            "isFamily": null,
            "createdDateExtended": Utc::now().timestamp_millis(),
            "guid": uuid::Uuid::new_v4().to_string(),
        },
        "ClientState": {
            "Collections": collections
                .iter()
                .map(|c| json!({ "guid": c.guid, "ctag": c.ctag }))
                .collect::<Vec<_>>(),
        },
    })
}

#[async_trait]
impl ReminderSink for RemindersClient {
    async fn find_list(&self, name: &str) -> Result<Option<ReminderList>, ContractError> {
        let startup = self.startup().await?;
        Ok(startup
            .collections
            .into_iter()
            .find(|c| titles_match(&c.title, name))
            .map(|c| ReminderList {
                id: c.guid,
                title: c.title,
            }))
    }

    async fn open_titles(&self, list: &ReminderList) -> Result<Vec<String>, ContractError> {
        let startup = self.cached_startup().await?;
        Ok(startup
            .reminders
            .into_iter()
            .filter(|r| r.p_guid == list.id && !r.is_completed())
            .map(|r| r.title)
            .collect())
    }

    async fn create_reminder(
        &self,
        list: &ReminderList,
        title: &str,
    ) -> Result<bool, ContractError> {
        let collections = self.cached_startup().await?.collections;
        let body = new_reminder_body(list, title, &collections);
        let params = self.params();
        let request = self
            .session
            .http()
            .post(format!("{}/rd/reminders/tasks", self.service_url))
            .query(&params)
            .json(&body);
        let response = self.session.send_service(request).await?;
        let status = response.status();
        if status.is_success() {
            info!(list = %list.title, title = %title, "Created reminder");
            Ok(true)
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(list = %list.title, title = %title, status = %status, body = %body, "iCloud refused the reminder");
            Ok(false)
        }
    }
}
