//! Authenticated iCloud web session.
//!
//! Cookies and the Apple session tokens are persisted per Apple ID so a
//! trusted session survives restarts and two-factor codes are only needed once.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ORIGIN, REFERER};
use reqwest::{RequestBuilder, Response, StatusCode};
use reqwest_cookie_store::CookieStoreMutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::ICloudError;

pub const DEFAULT_AUTH_URL: &str = "https://idmsa.apple.com/appleauth/auth";
pub const DEFAULT_SETUP_URL: &str = "https://setup.icloud.com/setup/ws/1";

const HOME_ENDPOINT: &str = "https://www.icloud.com";
const WIDGET_KEY: &str = "d39ba9916b7251055b22c7f910e2ea796ee65e98b2ddecea8f5dde8d9d1a815d";
const CLIENT_BUILD_NUMBER: &str = "2021Project52";
const CLIENT_MASTERING_NUMBER: &str = "2021B29";
const WRONG_CODE: i64 = -21669;

/// Response headers carrying session state, and the field each one is stored in.
const SESSION_HEADERS: [(&str, SessionField); 5] = [
    ("X-Apple-ID-Account-Country", SessionField::AccountCountry),
    ("X-Apple-ID-Session-Id", SessionField::SessionId),
    ("X-Apple-Session-Token", SessionField::SessionToken),
    ("X-Apple-TwoSV-Trust-Token", SessionField::TrustToken),
    ("scnt", SessionField::Scnt),
];

#[derive(Clone, Copy)]
enum SessionField {
    AccountCountry,
    SessionId,
    SessionToken,
    TrustToken,
    Scnt,
}

/// Where the session sends its requests. Tests point these at a local server.
#[derive(Debug, Clone)]
pub struct ICloudEndpoints {
    pub auth_url: String,
    pub setup_url: String,
}

impl Default for ICloudEndpoints {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            setup_url: DEFAULT_SETUP_URL.to_string(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ICloudCredentials {
    pub apple_id: String,
    pub password: String,
    pub two_factor_code: Option<String>,
    pub cookie_dir: PathBuf,
}

impl std::fmt::Debug for ICloudCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ICloudCredentials")
            .field("apple_id", &self.apple_id)
            .field("password", &"****")
            .field("two_factor_code", &self.two_factor_code.as_ref().map(|_| "****"))
            .field("cookie_dir", &self.cookie_dir)
            .finish()
    }
}

/// Tokens persisted next to the cookie jar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scnt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl SessionData {
    fn field_mut(&mut self, field: SessionField) -> &mut Option<String> {
        match field {
            SessionField::AccountCountry => &mut self.account_country,
            SessionField::SessionId => &mut self.session_id,
            SessionField::SessionToken => &mut self.session_token,
            SessionField::TrustToken => &mut self.trust_token,
            SessionField::Scnt => &mut self.scnt,
        }
    }
}

/// File name stem for an Apple ID: only word characters are kept.
pub fn sanitise_apple_id(apple_id: &str) -> String {
    apple_id
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

pub struct ICloudSession {
    http: reqwest::Client,
    cookies: Arc<CookieStoreMutex>,
    endpoints: ICloudEndpoints,
    cookie_path: PathBuf,
    session_path: PathBuf,
    data: SessionData,
    account: Value,
}

impl ICloudSession {
    /// Restore the persisted session, authenticate, and handle two-factor.
    pub async fn login(
        credentials: &ICloudCredentials,
        endpoints: ICloudEndpoints,
    ) -> Result<Self, ICloudError> {
        let mut session = Self::open(credentials, endpoints)?;
        session.authenticate(credentials).await?;

        if session.requires_2fa() {
            let Some(code) = credentials.two_factor_code.as_deref() else {
                error!(apple_id = %credentials.apple_id, "iCloud requires a two-factor code");
                session.save()?;
                return Err(ICloudError::TwoFactorRequired);
            };
            session.validate_2fa_code(code).await?;
            if session.requires_2fa() {
                session.save()?;
                return Err(ICloudError::Auth(
                    "session still requires two-factor authentication after trusting it".into(),
                ));
            }
            info!(apple_id = %credentials.apple_id, "Two-factor authentication accepted");
        }

        session.save()?;
        info!(apple_id = %credentials.apple_id, "Logged in to iCloud");
        Ok(session)
    }

    /// Load cookies and tokens from the cookie directory, creating it when missing.
    fn open(credentials: &ICloudCredentials, endpoints: ICloudEndpoints) -> Result<Self, ICloudError> {
        fs::create_dir_all(&credentials.cookie_dir)?;
        let stem = sanitise_apple_id(&credentials.apple_id);
        let cookie_path = credentials.cookie_dir.join(format!("{stem}.cookies.json"));
        let session_path = credentials.cookie_dir.join(format!("{stem}.session.json"));

        let cookies = Arc::new(CookieStoreMutex::new(load_cookies(&cookie_path)));
        let mut data = load_session_data(&session_path);
        if data.client_id.is_none() {
            data.client_id = Some(format!("auth-{}", uuid::Uuid::new_v4()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_static(HOME_ENDPOINT));
        headers.insert(REFERER, HeaderValue::from_static("https://www.icloud.com/"));
        let http = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            cookies,
            endpoints,
            cookie_path,
            session_path,
            data,
            account: Value::Null,
        })
    }

    async fn authenticate(&mut self, credentials: &ICloudCredentials) -> Result<(), ICloudError> {
        if self.data.session_token.is_some() {
            match self.validate_token().await {
                Ok(account) => {
                    info!("Restored iCloud session from stored token");
                    self.account = account;
                    return Ok(());
                }
                Err(e) => warn!(error = %e, "Stored iCloud session is no longer valid"),
            }
        }
        self.sign_in(&credentials.apple_id, &credentials.password).await?;
        self.account_login().await
    }

    async fn validate_token(&mut self) -> Result<Value, ICloudError> {
        debug!("Validating stored iCloud session token");
        let request = self
            .http
            .post(format!("{}/validate", self.endpoints.setup_url))
            .query(&self.params())
            .body("null");
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    async fn sign_in(&mut self, apple_id: &str, password: &str) -> Result<(), ICloudError> {
        info!(apple_id = %apple_id, "Signing in to iCloud");
        let trust_tokens: Vec<&str> = self.data.trust_token.as_deref().into_iter().collect();
        let body = json!({
            "accountName": apple_id,
            "password": password,
            "rememberMe": true,
            "trustTokens": trust_tokens,
        });
        let request = self
            .http
            .post(format!("{}/signin", self.endpoints.auth_url))
            .query(&[("isRememberMeEnabled", "true")])
            .headers(self.auth_headers(false)?)
            .json(&body);
        let response = self.http_send(request).await?;
        let status = response.status();
        // 409 means the password was accepted and a second factor is pending.
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, "iCloud sign-in rejected");
        Err(ICloudError::Auth(format!("sign-in returned {status}: {body}")))
    }

    async fn account_login(&mut self) -> Result<(), ICloudError> {
        let Some(token) = self.data.session_token.clone() else {
            return Err(ICloudError::Auth("sign-in returned no session token".into()));
        };
        let body = json!({
            "accountCountryCode": self.data.account_country,
            "dsWebAuthToken": token,
            "extended_login": true,
            "trustToken": self.data.trust_token.clone().unwrap_or_default(),
        });
        let request = self
            .http
            .post(format!("{}/accountLogin", self.endpoints.setup_url))
            .query(&self.params())
            .json(&body);
        let response = self.send(request).await?;
        self.account = response.json().await?;
        debug!("iCloud account login complete");
        Ok(())
    }

    /// Whether the account still needs a second factor before services can be used.
    pub fn requires_2fa(&self) -> bool {
        requires_2fa(&self.account)
    }

    async fn validate_2fa_code(&mut self, code: &str) -> Result<(), ICloudError> {
        info!("Validating iCloud two-factor code");
        let request = self
            .http
            .post(format!(
                "{}/verify/trusteddevice/securitycode",
                self.endpoints.auth_url
            ))
            .headers(self.auth_headers(true)?)
            .json(&json!({ "securityCode": { "code": code } }));
        let response = self.http_send(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            if is_wrong_code(&body) {
                error!("Two-factor code rejected");
                return Err(ICloudError::InvalidTwoFactorCode);
            }
            return Err(ICloudError::Api {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        self.trust_session().await?;
        self.account_login().await
    }

    async fn trust_session(&mut self) -> Result<(), ICloudError> {
        debug!("Requesting a trusted iCloud session");
        let request = self
            .http
            .get(format!("{}/2sv/trust", self.endpoints.auth_url))
            .headers(self.auth_headers(false)?);
        self.send(request).await?;
        Ok(())
    }

    fn auth_headers(&self, json_accept: bool) -> Result<HeaderMap, ICloudError> {
        let client_id = self.data.client_id.clone().unwrap_or_default();
        let mut pairs: Vec<(&str, String)> = vec![
            ("Accept", "*/*".into()),
            ("Content-Type", "application/json".into()),
            ("X-Apple-OAuth-Client-Id", WIDGET_KEY.into()),
            ("X-Apple-OAuth-Client-Type", "firstPartyAuth".into()),
            ("X-Apple-OAuth-Redirect-URI", HOME_ENDPOINT.into()),
            ("X-Apple-OAuth-Require-Grant-Code", "true".into()),
            ("X-Apple-OAuth-Response-Mode", "web_message".into()),
            ("X-Apple-OAuth-Response-Type", "code".into()),
            ("X-Apple-OAuth-State", client_id),
            ("X-Apple-Widget-Key", WIDGET_KEY.into()),
        ];
        if let Some(scnt) = &self.data.scnt {
            pairs.push(("scnt", scnt.clone()));
        }
        if let Some(session_id) = &self.data.session_id {
            pairs.push(("X-Apple-ID-Session-Id", session_id.clone()));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            let value = HeaderValue::from_str(&value)
                .map_err(|e| ICloudError::Auth(format!("invalid {name} header: {e}")))?;
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ICloudError::Auth(format!("invalid header name {name}: {e}")))?;
            headers.insert(name, value);
        }
        if json_accept {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }
        Ok(headers)
    }

    /// Query parameters iCloud expects on setup and service requests.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("clientBuildNumber", CLIENT_BUILD_NUMBER.to_string()),
            ("clientMasteringNumber", CLIENT_MASTERING_NUMBER.to_string()),
            ("clientId", self.data.client_id.clone().unwrap_or_default()),
        ];
        if let Some(dsid) = self.dsid() {
            params.push(("dsid", dsid));
        }
        params
    }

    fn dsid(&self) -> Option<String> {
        match &self.account["dsInfo"]["dsid"] {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Base URL of a web service exposed to this account, e.g. `reminders`.
    pub fn service_url(&self, service: &str) -> Result<String, ICloudError> {
        self.account["webservices"][service]["url"]
            .as_str()
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| ICloudError::ServiceUnavailable(service.to_string()))
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Send a service request and persist any cookies it set.
    pub async fn send_service(&self, request: RequestBuilder) -> Result<Response, ICloudError> {
        let response = request.send().await?;
        self.save_cookies()?;
        Ok(response)
    }

    /// Send a request, record session headers, and fail on non-success statuses.
    async fn send(&mut self, request: RequestBuilder) -> Result<Response, ICloudError> {
        let response = self.http_send(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ICloudError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn http_send(&mut self, request: RequestBuilder) -> Result<Response, ICloudError> {
        let response = request.send().await?;
        capture_session_headers(&mut self.data, response.headers());
        Ok(response)
    }

    pub fn session_data(&self) -> &SessionData {
        &self.data
    }

    /// Write cookies and session tokens to the cookie directory.
    pub fn save(&self) -> Result<(), ICloudError> {
        self.save_cookies()?;
        let writer = BufWriter::new(File::create(&self.session_path)?);
        serde_json::to_writer_pretty(writer, &self.data)?;
        debug!(path = %self.session_path.display(), "Saved iCloud session");
        Ok(())
    }

    fn save_cookies(&self) -> Result<(), ICloudError> {
        let store = self
            .cookies
            .lock()
            .map_err(|_| ICloudError::Cookies("cookie store lock poisoned".into()))?;
        let mut writer = BufWriter::new(File::create(&self.cookie_path)?);
        cookie_store::serde::json::save_incl_expired_and_nonpersistent(&store, &mut writer)
            .map_err(|e| ICloudError::Cookies(e.to_string()))
    }
}

/// `hsaVersion` sits under `dsInfo`; the challenge and trust flags are top-level.
fn requires_2fa(account: &Value) -> bool {
    let hsa_version = account["dsInfo"]["hsaVersion"].as_i64().unwrap_or(0);
    let challenge = account["hsaChallengeRequired"].as_bool().unwrap_or(false);
    let trusted = account["hsaTrustedBrowser"].as_bool().unwrap_or(false);
    hsa_version == 2 && (challenge || !trusted)
}

/// Whether a failed code check was rejected because the code itself was wrong.
fn is_wrong_code(body: &Value) -> bool {
    ["service_errors", "serviceErrors"]
        .iter()
        .filter_map(|key| body[*key].as_array())
        .flatten()
        .any(|e| {
            e["code"].as_i64() == Some(WRONG_CODE)
                || e["code"].as_str().and_then(|c| c.parse().ok()) == Some(WRONG_CODE)
        })
}

fn capture_session_headers(data: &mut SessionData, headers: &HeaderMap) {
    for (name, field) in SESSION_HEADERS {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            *data.field_mut(field) = Some(value.to_string());
        }
    }
}

fn load_cookies(path: &Path) -> cookie_store::CookieStore {
    let Ok(file) = File::open(path) else {
        return cookie_store::CookieStore::default();
    };
    match cookie_store::serde::json::load(BufReader::new(file)) {
        Ok(store) => {
            debug!(path = %path.display(), "Loaded iCloud cookies");
            store
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable iCloud cookie file");
            cookie_store::CookieStore::default()
        }
    }
}

fn load_session_data(path: &Path) -> SessionData {
    let Ok(file) = File::open(path) else {
        return SessionData::default();
    };
    serde_json::from_reader(BufReader::new(file)).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Ignoring unreadable iCloud session file");
        SessionData::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apple_id_is_reduced_to_word_characters() {
        assert_eq!(sanitise_apple_id("jane.doe+test@icloud.com"), "janedoetesticloudcom");
        assert_eq!(sanitise_apple_id("a_b"), "a_b");
    }

    #[test]
    fn session_headers_are_captured() {
        let mut data = SessionData::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-apple-session-token", HeaderValue::from_static("tok"));
        headers.insert("scnt", HeaderValue::from_static("scnt-1"));
        capture_session_headers(&mut data, &headers);
        assert_eq!(data.session_token.as_deref(), Some("tok"));
        assert_eq!(data.scnt.as_deref(), Some("scnt-1"));
        assert_eq!(data.trust_token, None);
    }

    #[test]
    fn only_the_wrong_code_error_counts_as_invalid_code() {
        assert!(is_wrong_code(&json!({"service_errors": [{"code": "-21669"}]})));
        assert!(is_wrong_code(&json!({"serviceErrors": [{"code": -21669}]})));
        assert!(!is_wrong_code(&json!({"service_errors": [{"code": "-20101"}]})));
        assert!(!is_wrong_code(&Value::Null));
    }

    #[test]
    fn two_factor_flags_are_read_from_the_top_level() {
        let trusted = json!({
            "dsInfo": {"dsid": "1", "hsaVersion": 2},
            "hsaChallengeRequired": false,
            "hsaTrustedBrowser": true
        });
        assert!(!requires_2fa(&trusted));

        let challenged = json!({
            "dsInfo": {"hsaVersion": 2},
            "hsaChallengeRequired": true,
            "hsaTrustedBrowser": true
        });
        assert!(requires_2fa(&challenged));

        let untrusted = json!({"dsInfo": {"hsaVersion": 2}, "hsaTrustedBrowser": false});
        assert!(requires_2fa(&untrusted));

        let legacy = json!({"dsInfo": {"hsaVersion": 1}, "hsaTrustedBrowser": false});
        assert!(!requires_2fa(&legacy));
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let credentials = ICloudCredentials {
            apple_id: "me@icloud.com".into(),
            password: "pw-secret".into(),
            two_factor_code: Some("123456".into()),
            cookie_dir: PathBuf::from("/tmp"),
        };
        let printed = format!("{credentials:?}");
        assert!(!printed.contains("pw-secret"));
        assert!(!printed.contains("123456"));
    }
}
