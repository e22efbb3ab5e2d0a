//! `load_config` module: builds the runtime [`AppConfig`] from the environment and an optional YAML file.
//!
//! # Responsibilities
//! - Read every setting from the environment (a `.env` file is loaded by `main`); empty values count as unset
//! - Optionally read list pairs and the sync interval from a YAML file; the environment wins over the file
//! - Validate credentials up front so a misconfigured daemon fails at startup with a message naming the variable
//!
//! Secrets (passwords, tokens, 2FA codes) are only ever read from the environment.
//!
//! # Errors
//! All errors use `anyhow::Error` and are surfaced at the CLI boundary.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use listsync_core::normalize::parse_list_names;
use listsync_core::schedule::effective_interval_minutes;
use listsync_core::synchronise::{resolve_pairs, ListPair};
use serde::Deserialize;
use tracing::{error, info};

use crate::icloud::ICloudCredentials;
use crate::keep::auth::{KeepCredentials, KeepSecret, DEFAULT_ANDROID_ID};

pub const DEFAULT_COOKIE_DIR: &str = "/data/icloud";
pub const DEFAULT_SERVER_PORT: u16 = 5000;
/// One year.
pub const MAX_INTERVAL_MINUTES: u64 = 525_600;

/// Read an environment variable, treating an empty value as unset.
pub fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Optional YAML overlay.
///
/// ```yaml
/// interval_minutes: 10
/// lists:
///   - keep: Groceries
///     reminders: Shopping
///   - keep: Hardware
/// ```
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default)]
    pub lists: Vec<FileListPair>,
    #[serde(default)]
    pub interval_minutes: Option<i64>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct FileListPair {
    pub keep: String,
    /// Defaults to the Keep list name.
    #[serde(default)]
    pub reminders: Option<String>,
}

impl From<&FileListPair> for ListPair {
    fn from(pair: &FileListPair) -> Self {
        ListPair::new(
            pair.keep.clone(),
            pair.reminders.clone().unwrap_or_else(|| pair.keep.clone()),
        )
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub keep: KeepCredentials,
    /// Present when both `APPLE_ID` and `APPLE_PASSWORD` are set.
    pub icloud: Option<ICloudCredentials>,
    pub pairs: Vec<ListPair>,
    /// Lists named in `SYNC_LIST_NAMES`, used by the list API's clear route.
    pub sync_list_names: Vec<String>,
    pub interval_minutes: u64,
    pub server_port: u16,
}

impl AppConfig {
    /// iCloud credentials, required by the `sync` command.
    pub fn require_icloud(&self) -> Result<&ICloudCredentials> {
        self.icloud.as_ref().ok_or_else(|| {
            error!("Missing APPLE_ID or APPLE_PASSWORD");
            anyhow!("Missing APPLE_ID or APPLE_PASSWORD.")
        })
    }
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    info!(config_path = ?path, "Loading configuration from file");
    let content = fs::read_to_string(path).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to read config file");
        anyhow!("Failed to read config file {:?}: {}", path, e)
    })?;
    let config: FileConfig = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
        anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(config_path = ?path, lists = config.lists.len(), "Parsed config YAML successfully");
    Ok(config)
}

/// Build and validate the configuration from the environment and an optional YAML file.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let file = match path {
        Some(path) => load_file_config(path)?,
        None => FileConfig::default(),
    };

    let keep = keep_credentials()?;
    let icloud = icloud_credentials();

    let sync_list_names = parse_list_names(env("SYNC_LIST_NAMES").as_deref());
    let single_source = env("GKEEP_LIST_TITLE");
    let single_destination = env("REMINDERS_LIST_NAME");
    let pairs = if sync_list_names.is_empty()
        && single_source.is_none()
        && single_destination.is_none()
        && !file.lists.is_empty()
    {
        file.lists.iter().map(ListPair::from).collect()
    } else {
        resolve_pairs(
            &sync_list_names,
            single_source.as_deref(),
            single_destination.as_deref(),
        )
    };

    let configured_interval = match env("SCHEDULE_INTERVAL_MINUTES") {
        Some(raw) => Some(
            raw.trim()
                .parse::<i64>()
                .with_context(|| format!("SCHEDULE_INTERVAL_MINUTES must be an integer, got {raw:?}"))?,
        ),
        None => file.interval_minutes,
    };
    let interval_minutes = effective_interval_minutes(configured_interval);
    if interval_minutes > MAX_INTERVAL_MINUTES {
        error!(interval_minutes, "Sync interval out of range");
        bail!(
            "Sync interval (SCHEDULE_INTERVAL_MINUTES or interval_minutes) must be at most {MAX_INTERVAL_MINUTES} minutes, got {interval_minutes}"
        );
    }

    let server_port = match env("SERVER_PORT") {
        Some(raw) => raw
            .trim()
            .parse::<u16>()
            .with_context(|| format!("SERVER_PORT must be a port number, got {raw:?}"))?,
        None => DEFAULT_SERVER_PORT,
    };

    info!(
        pairs = pairs.len(),
        interval_minutes,
        server_port,
        icloud = icloud.is_some(),
        "Configuration loaded"
    );

    Ok(AppConfig {
        keep,
        icloud,
        pairs,
        sync_list_names,
        interval_minutes,
        server_port,
    })
}

fn keep_credentials() -> Result<KeepCredentials> {
    let Some(email) = env("GKEEP_EMAIL") else {
        error!("Missing GKEEP_EMAIL");
        bail!("Missing GKEEP_EMAIL.");
    };
    let secret = match (env("GKEEP_MASTER_TOKEN"), env("GKEEP_PASSWORD")) {
        (Some(token), _) => KeepSecret::MasterToken(token),
        (None, Some(password)) => KeepSecret::Password(password),
        (None, None) => {
            error!("Missing GKEEP_PASSWORD or GKEEP_MASTER_TOKEN");
            bail!("Missing GKEEP_PASSWORD or GKEEP_MASTER_TOKEN.");
        }
    };
    Ok(KeepCredentials {
        email,
        secret,
        android_id: env("GKEEP_ANDROID_ID").unwrap_or_else(|| DEFAULT_ANDROID_ID.to_string()),
    })
}

fn icloud_credentials() -> Option<ICloudCredentials> {
    Some(ICloudCredentials {
        apple_id: env("APPLE_ID")?,
        password: env("APPLE_PASSWORD")?,
        two_factor_code: env("APPLE_2FA_CODE").map(|code| code.trim().to_string()),
        cookie_dir: PathBuf::from(
            env("ICLOUD_COOKIE_DIR").unwrap_or_else(|| DEFAULT_COOKIE_DIR.to_string()),
        ),
    })
}
