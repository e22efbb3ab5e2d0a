//! Google account authentication for Keep.
//!
//! Google's Android auth endpoint speaks form-encoded requests and answers with
//! `key=value` lines. Two exchanges are used:
//! - master login: email + encrypted password → long-lived master token
//! - OAuth: email + master token → short-lived token scoped to Keep

use std::collections::HashMap;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use rsa::{BigUint, Oaep, RsaPublicKey};
use sha1::{Digest, Sha1};
use tracing::{debug, error, info};

use super::KeepError;

pub const DEFAULT_AUTH_URL: &str = "https://android.clients.google.com/auth";

/// Default device id presented to Google when none is configured.
pub const DEFAULT_ANDROID_ID: &str = "0123456789abcdef";

const KEEP_SCOPES: &str =
    "oauth2:https://www.googleapis.com/auth/memento https://www.googleapis.com/auth/reminders";
const KEEP_APP: &str = "com.google.android.keep";
const CLIENT_SIG: &str = "38918a453d07199354f8b19af05ec6562ced5788";
const USER_AGENT: &str = "GoogleAuth/1.4";

/// Google's public key for password encryption (length-prefixed modulus, then exponent).
const GOOGLE_PUBLIC_KEY: &str = "AAAAgMom/1a/v0lblO2Ubrt60J2gcuXSljGFQXgcyZWveWLEwo6prwgi3iJIZdodyhKZQrNWp5nKJ3srRXcUW+F1BD3baEVGcmEgqaLZUNBjm057pKRI16kB0YppeGx5qIQ5QjKzsR8ETQbKLNWgRY0QRNVz34kMJR3P/LgHax/6rmf5AAAAAwEAAQ==";

/// How the Google account proves its identity.
#[derive(Clone, PartialEq, Eq)]
pub enum KeepSecret {
    MasterToken(String),
    Password(String),
}

impl std::fmt::Debug for KeepSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeepSecret::MasterToken(_) => f.write_str("MasterToken(****)"),
            KeepSecret::Password(_) => f.write_str("Password(****)"),
        }
    }
}

/// Google account credentials for Keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepCredentials {
    pub email: String,
    pub secret: KeepSecret,
    pub android_id: String,
}

/// Client for Google's Android auth endpoint.
pub struct GoogleAuth {
    http: reqwest::Client,
    auth_url: String,
}

impl GoogleAuth {
    pub fn new(http: reqwest::Client, auth_url: impl Into<String>) -> Self {
        Self {
            http,
            auth_url: auth_url.into(),
        }
    }

    /// Resolve credentials to a master token, logging in with the password when needed.
    pub async fn master_token(&self, credentials: &KeepCredentials) -> Result<String, KeepError> {
        match &credentials.secret {
            KeepSecret::MasterToken(token) => Ok(token.clone()),
            KeepSecret::Password(password) => {
                self.master_login(&credentials.email, password, &credentials.android_id)
                    .await
            }
        }
    }

    /// Exchange email and password for a master token.
    pub async fn master_login(
        &self,
        email: &str,
        password: &str,
        android_id: &str,
    ) -> Result<String, KeepError> {
        info!(email = %email, "Performing Google master login");
        let encrypted = encrypt_password(email, password)?;
        let form = [
            ("accountType", "HOSTED_OR_GOOGLE"),
            ("Email", email),
            ("has_permission", "1"),
            ("add_account", "1"),
            ("EncryptedPasswd", encrypted.as_str()),
            ("service", "ac2dm"),
            ("source", "android"),
            ("androidId", android_id),
            ("device_country", "us"),
            ("operatorCountry", "us"),
            ("lang", "en"),
            ("sdk_version", "17"),
            ("client_sig", CLIENT_SIG),
            ("callerSig", CLIENT_SIG),
            ("droidguard_results", "dummy123"),
        ];
        let fields = self.post(&form).await?;
        fields.get("Token").cloned().ok_or_else(|| {
            error!("Master login response carried no token");
            KeepError::Auth(describe_failure(&fields, "no master token in response"))
        })
    }

    /// Exchange a master token for an OAuth token scoped to Keep.
    pub async fn oauth(
        &self,
        email: &str,
        master_token: &str,
        android_id: &str,
    ) -> Result<String, KeepError> {
        debug!(email = %email, "Requesting Keep OAuth token");
        let form = [
            ("accountType", "HOSTED_OR_GOOGLE"),
            ("Email", email),
            ("has_permission", "1"),
            ("EncryptedPasswd", master_token),
            ("service", KEEP_SCOPES),
            ("source", "android"),
            ("androidId", android_id),
            ("app", KEEP_APP),
            ("client_sig", CLIENT_SIG),
            ("device_country", "us"),
            ("operatorCountry", "us"),
            ("lang", "en"),
            ("sdk_version", "17"),
            ("google_play_services_version", "240913000"),
        ];
        let fields = self.post(&form).await?;
        match fields.get("Auth") {
            Some(token) => {
                info!(email = %email, "Obtained Keep OAuth token");
                Ok(token.clone())
            }
            None => {
                error!("OAuth response carried no Auth token");
                Err(KeepError::Auth(describe_failure(&fields, "no Auth token in response")))
            }
        }
    }

    async fn post(&self, form: &[(&str, &str)]) -> Result<HashMap<String, String>, KeepError> {
        let response = self
            .http
            .post(&self.auth_url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT_ENCODING, "identity")
            .form(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        let fields = parse_auth_response(&body);
        if !status.is_success() {
            error!(status = %status, "Google auth endpoint rejected the request");
            return Err(KeepError::Auth(describe_failure(
                &fields,
                &format!("status {status}"),
            )));
        }
        Ok(fields)
    }
}

/// Parse the `key=value` lines returned by the auth endpoint.
pub fn parse_auth_response(body: &str) -> HashMap<String, String> {
    body.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

fn describe_failure(fields: &HashMap<String, String>, fallback: &str) -> String {
    match (fields.get("Error"), fields.get("Info")) {
        (Some(error), Some(info)) => format!("{error} ({info})"),
        (Some(error), None) => error.clone(),
        _ => fallback.to_string(),
    }
}

/// Encrypt `email\0password` with Google's public key, prefixed by a key fingerprint.
pub fn encrypt_password(email: &str, password: &str) -> Result<String, KeepError> {
    let key_bytes = STANDARD
        .decode(GOOGLE_PUBLIC_KEY)
        .map_err(|e| KeepError::Encryption(e.to_string()))?;
    let public_key = public_key_from_bytes(&key_bytes)?;

    let mut signature = vec![0u8];
    signature.extend_from_slice(&Sha1::digest(&key_bytes)[..4]);

    let message = format!("{email}\u{0}{password}");
    let mut rng = rand::thread_rng();
    let encrypted = public_key
        .encrypt(&mut rng, Oaep::new::<Sha1>(), message.as_bytes())
        .map_err(|e| KeepError::Encryption(e.to_string()))?;
    signature.extend_from_slice(&encrypted);

    Ok(URL_SAFE.encode(signature))
}

fn public_key_from_bytes(bytes: &[u8]) -> Result<RsaPublicKey, KeepError> {
    let (modulus, rest) = read_length_prefixed(bytes)?;
    let (exponent, _) = read_length_prefixed(rest)?;
    RsaPublicKey::new(
        BigUint::from_bytes_be(modulus),
        BigUint::from_bytes_be(exponent),
    )
    .map_err(|e| KeepError::Encryption(e.to_string()))
}

fn read_length_prefixed(bytes: &[u8]) -> Result<(&[u8], &[u8]), KeepError> {
    let truncated = || KeepError::Encryption("truncated public key".to_string());
    let header: [u8; 4] = bytes
        .get(..4)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(truncated)?;
    let len = u32::from_be_bytes(header) as usize;
    let value = bytes.get(4..4 + len).ok_or_else(truncated)?;
    Ok((value, &bytes[4 + len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_lines() {
        let fields = parse_auth_response("SID=abc\nAuth=ya29.token=with=equals\nExpiry=123\n");
        assert_eq!(fields.get("SID").map(String::as_str), Some("abc"));
        assert_eq!(
            fields.get("Auth").map(String::as_str),
            Some("ya29.token=with=equals")
        );
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn encrypted_password_has_fingerprint_and_full_block() {
        let encrypted = encrypt_password("user@example.com", "hunter2").unwrap();
        let raw = URL_SAFE.decode(encrypted).unwrap();
        // 1 version byte + 4 fingerprint bytes + one 1024-bit RSA block
        assert_eq!(raw.len(), 1 + 4 + 128);
        assert_eq!(raw[0], 0);

        let key_bytes = STANDARD.decode(GOOGLE_PUBLIC_KEY).unwrap();
        assert_eq!(&raw[1..5], &Sha1::digest(&key_bytes)[..4]);
    }

    #[test]
    fn secrets_are_not_printed() {
        let secret = KeepSecret::Password("hunter2".into());
        assert!(!format!("{secret:?}").contains("hunter2"));
    }
}
