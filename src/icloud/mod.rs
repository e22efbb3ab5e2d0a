//! iCloud integration: an authenticated web session and the Reminders service on top of it.

pub mod reminders;
pub mod session;

pub use reminders::RemindersClient;
pub use session::{ICloudCredentials, ICloudEndpoints, ICloudSession};

/// Errors raised while talking to iCloud.
#[derive(Debug, thiserror::Error)]
pub enum ICloudError {
    #[error("iCloud authentication failed: {0}")]
    Auth(String),

    #[error(
        "Apple iCloud requires two-factor authentication. Set APPLE_2FA_CODE environment variable with the code sent to your device and restart."
    )]
    TwoFactorRequired,

    #[error("Invalid Apple 2FA/2SA code.")]
    InvalidTwoFactorCode,

    #[error("This iCloud account does not expose {0}")]
    ServiceUnavailable(String),

    #[error("HTTP request to iCloud failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("iCloud returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to persist iCloud session: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to persist iCloud cookies: {0}")]
    Cookies(String),

    #[error("Unexpected iCloud response: {0}")]
    Json(#[from] serde_json::Error),
}
