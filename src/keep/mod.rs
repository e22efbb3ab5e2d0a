#![doc = "Google Keep integration: authentication against Google's Android auth endpoint and the notes changes API."]
//
//! # Google Keep client
//!
//! - [`auth`]: exchanges a password or master token for a short-lived OAuth token.
//! - [`node`]: wire format of the changes API (nodes, timestamps, request/response envelopes).
//! - [`client`]: [`KeepClient`], the `NoteSource` implementation used by the CLI.
//!
//! Construct a client with [`KeepClient::login`]; it authenticates and performs a full
//! initial sync so that `lists()` is immediately usable.

pub mod auth;
pub mod client;
pub mod node;

pub use client::{KeepClient, KeepEndpoints};

/// Errors raised while talking to Google.
#[derive(Debug, thiserror::Error)]
pub enum KeepError {
    #[error("Google authentication failed: {0}")]
    Auth(String),

    #[error("Failed to encrypt Google password: {0}")]
    Encryption(String),

    #[error("HTTP request to Google failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Keep API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Unknown Keep node {0}")]
    UnknownNode(String),
}
