//! Device-code sign-in against Entra ID with a token cache on disk.
//!
//! Access tokens are cached per scope. A refresh token obtained for one
//! resource is reused to get tokens for the others without prompting again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FlowError, Result};

/// Well-known public client id of the Power Platform CLI.
pub const CLIENT_ID: &str = "51f81489-12ee-4a9e-aaae-a2591f45987d";
pub const AUTHORITY: &str = "https://login.microsoftonline.com/organizations";
pub const BAP_SCOPE: &str = "https://api.bap.microsoft.com/.default";
pub const CACHE_FILE_NAME: &str = ".dataverse_checker_cache.json";

/// Seconds shaved off a token's lifetime so it is not used right at expiry.
const EXPIRY_MARGIN_SECS: i64 = 300;

pub fn default_cache_path() -> PathBuf {
    let dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.join(CACHE_FILE_NAME)
}

/// Scope for a Dataverse organization, e.g. `https://org.crm4.dynamics.com/.default`.
pub fn dataverse_scope(instance_url: &str) -> String {
    let host = instance_url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    format!("https://{host}/.default")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_on: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TokenCache {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub tokens: HashMap<String, CachedToken>,
    #[serde(skip)]
    changed: bool,
}

impl TokenCache {
    /// Read the cache file. A missing or unreadable file yields an empty cache.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path)
            .map_err(FlowError::from)
            .and_then(|data| serde_json::from_str::<TokenCache>(&data).map_err(FlowError::from))
        {
            Ok(cache) => {
                println!("Loaded cached credentials from {}", path.display());
                cache
            }
            Err(e) => {
                warn!("Could not load token cache: {}", e);
                Self::default()
            }
        }
    }

    pub fn has_changed(&self) -> bool {
        self.changed
    }

    /// Write the cache back if anything changed since it was loaded.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if !self.changed {
            return Ok(());
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        self.changed = false;
        Ok(())
    }

    pub fn valid_token(&self, scope: &str, now: DateTime<Utc>) -> Option<&str> {
        self.tokens
            .get(scope)
            .filter(|t| t.expires_on > now)
            .map(|t| t.access_token.as_str())
    }

    pub fn store(&mut self, scope: &str, response: &TokenResponse, now: DateTime<Utc>) {
        let lifetime = (response.expires_in - EXPIRY_MARGIN_SECS).max(0);
        self.tokens.insert(
            scope.to_string(),
            CachedToken {
                access_token: response.access_token.clone(),
                expires_on: now + chrono::Duration::seconds(lifetime),
            },
        );
        if let Some(refresh) = &response.refresh_token {
            self.refresh_token = Some(refresh.clone());
        }
        if let Some(name) = response.id_token.as_deref().and_then(username_from_id_token) {
            self.username = Some(name);
        }
        self.changed = true;
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    #[serde(default)]
    pub verification_uri: String,
    pub expires_in: u64,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorResponse {
    fn describe(&self) -> String {
        self.error_description
            .clone()
            .unwrap_or_else(|| self.error.clone())
    }
}

/// Extract `preferred_username` (or `upn`) from an unverified ID token.
pub fn username_from_id_token(jwt: &str) -> Option<String> {
    let payload = jwt.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims
        .get("preferred_username")
        .or_else(|| claims.get("upn"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

pub struct Authenticator {
    client: Client,
    authority: String,
    client_id: String,
    cache: TokenCache,
    cache_path: PathBuf,
}

impl Authenticator {
    pub fn new(client: Client, cache_path: PathBuf) -> Self {
        let cache = TokenCache::load(&cache_path);
        Self {
            client,
            authority: AUTHORITY.to_string(),
            client_id: CLIENT_ID.to_string(),
            cache,
            cache_path,
        }
    }

    pub fn with_authority(mut self, authority: &str) -> Self {
        self.authority = authority.trim_end_matches('/').to_string();
        self
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    pub fn save_cache(&mut self) {
        if let Err(e) = self.cache.save(&self.cache_path) {
            warn!("Could not save token cache: {}", e);
        }
    }

    /// Get an access token for `scope`: from the cache, through the refresh
    /// token, or (unless `silent_only`) by a device-code sign-in.
    pub async fn acquire_token(&mut self, scope: &str, silent_only: bool) -> Result<Option<String>> {
        if let Some(token) = self.cache.valid_token(scope, Utc::now()) {
            println!(
                "   Using cached token for {}",
                self.cache.username.as_deref().unwrap_or("unknown user")
            );
            return Ok(Some(token.to_string()));
        }

        if let Some(refresh) = self.cache.refresh_token.clone() {
            match self.redeem_refresh_token(scope, &refresh).await {
                Ok(response) => return Ok(Some(self.remember(scope, response))),
                Err(e) => debug!("Refresh for {} failed: {}", scope, e),
            }
        }

        if silent_only {
            return Ok(None);
        }

        let response = self.device_code_sign_in(scope).await?;
        Ok(Some(self.remember(scope, response)))
    }

    fn remember(&mut self, scope: &str, response: TokenResponse) -> String {
        self.cache.store(scope, &response, Utc::now());
        self.save_cache();
        response.access_token
    }

    fn request_scope(scope: &str) -> String {
        format!("{scope} offline_access openid profile")
    }

    async fn redeem_refresh_token(&self, scope: &str, refresh_token: &str) -> Result<TokenResponse> {
        let scope = Self::request_scope(scope);
        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
        ];
        let res = self
            .client
            .post(format!("{}/oauth2/v2.0/token", self.authority))
            .form(&params)
            .send()
            .await?;
        if !res.status().is_success() {
            let err: ErrorResponse = res.json().await?;
            return Err(FlowError::Auth(err.describe()));
        }
        Ok(res.json().await?)
    }

    pub async fn request_device_code(&self, scope: &str) -> Result<DeviceCode> {
        let scope = Self::request_scope(scope);
        let params = [("client_id", self.client_id.as_str()), ("scope", scope.as_str())];
        let res = self
            .client
            .post(format!("{}/oauth2/v2.0/devicecode", self.authority))
            .form(&params)
            .send()
            .await?;
        if !res.status().is_success() {
            let err: ErrorResponse = res.json().await?;
            return Err(FlowError::Auth(format!(
                "Failed to create device flow: {}",
                err.describe()
            )));
        }
        Ok(res.json().await?)
    }

    async fn device_code_sign_in(&self, scope: &str) -> Result<TokenResponse> {
        let code = self.request_device_code(scope).await?;
        let rule = "=".repeat(60);
        println!("\n{rule}\nDEVICE CODE AUTHENTICATION\n{rule}");
        if code.message.is_empty() {
            println!(
                "\nTo sign in, open {} and enter the code {}\n",
                code.verification_uri, code.user_code
            );
        } else {
            println!("\n{}\n", code.message);
        }
        println!("{rule}\n");
        let response = self.poll_device_code(&code).await?;
        println!("Authentication successful!\n");
        Ok(response)
    }

    /// Poll the token endpoint until the user finishes signing in.
    pub async fn poll_device_code(&self, code: &DeviceCode) -> Result<TokenResponse> {
        let mut interval = code.interval.unwrap_or(5);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(code.expires_in);
        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
            ("device_code", code.device_code.as_str()),
        ];
        loop {
            tokio::time::sleep(Duration::from_secs(interval)).await;
            if tokio::time::Instant::now() >= deadline {
                return Err(FlowError::Auth("device code expired".into()));
            }
            let res = self
                .client
                .post(format!("{}/oauth2/v2.0/token", self.authority))
                .form(&params)
                .send()
                .await?;
            if res.status().is_success() {
                return Ok(res.json().await?);
            }
            let err: ErrorResponse = res.json().await?;
            match err.error.as_str() {
                "authorization_pending" => continue,
                "slow_down" => interval += 5,
                _ => return Err(FlowError::Auth(err.describe())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        format!("{header}.{payload}.sig")
    }

    fn response(token: &str, expires_in: i64) -> TokenResponse {
        TokenResponse {
            access_token: token.into(),
            expires_in,
            refresh_token: Some("rt".into()),
            id_token: Some(jwt(serde_json::json!({"preferred_username": "ann@contoso.com"}))),
        }
    }

    #[test]
    fn scope_from_instance_url() {
        assert_eq!(
            dataverse_scope("https://org.crm4.dynamics.com/"),
            "https://org.crm4.dynamics.com/.default"
        );
        assert_eq!(
            dataverse_scope("http://org.crm.dynamics.com"),
            "https://org.crm.dynamics.com/.default"
        );
    }

    #[test]
    fn username_prefers_preferred_username() {
        let token = jwt(serde_json::json!({"upn": "u@x", "preferred_username": "p@x"}));
        assert_eq!(username_from_id_token(&token).as_deref(), Some("p@x"));
        let token = jwt(serde_json::json!({"upn": "u@x"}));
        assert_eq!(username_from_id_token(&token).as_deref(), Some("u@x"));
        assert_eq!(username_from_id_token("garbage"), None);
    }

    #[test]
    fn stored_token_expires_with_margin() {
        let now = Utc::now();
        let mut cache = TokenCache::default();
        cache.store(BAP_SCOPE, &response("at", 3600), now);
        assert!(cache.has_changed());
        assert_eq!(cache.valid_token(BAP_SCOPE, now), Some("at"));
        assert_eq!(cache.username.as_deref(), Some("ann@contoso.com"));
        assert_eq!(cache.refresh_token.as_deref(), Some("rt"));
        let later = now + chrono::Duration::seconds(3600 - EXPIRY_MARGIN_SECS + 1);
        assert_eq!(cache.valid_token(BAP_SCOPE, later), None);
        assert_eq!(cache.valid_token("other", now), None);
    }

    #[test]
    fn cache_round_trips_through_file_and_saves_only_when_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CACHE_FILE_NAME);

        let mut empty = TokenCache::default();
        empty.save(&path).unwrap();
        assert!(!path.exists());

        let mut cache = TokenCache::default();
        cache.store(BAP_SCOPE, &response("at", 3600), Utc::now());
        cache.save(&path).unwrap();
        assert!(!cache.has_changed());

        let loaded = TokenCache::load(&path);
        assert!(!loaded.has_changed());
        assert_eq!(loaded.valid_token(BAP_SCOPE, Utc::now()), Some("at"));
    }

    #[test]
    fn corrupt_cache_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CACHE_FILE_NAME);
        std::fs::write(&path, "{not json").unwrap();
        let cache = TokenCache::load(&path);
        assert!(cache.tokens.is_empty());
    }
}
