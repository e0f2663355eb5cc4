// API client module: a small async HTTP client for the Dataverse Web API.
// It carries the organization URL and an optional bearer token, and is shared
// by the configuration store and the inventory checks.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{FlowError, Result};

pub const WEB_API_PATH: &str = "api/data/v9.2/";

/// Client for one Dataverse organization.
#[derive(Clone)]
pub struct DataverseClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Option<Duration>,
}

/// OData collection envelope: `{"value": [...]}`.
#[derive(Deserialize, Debug)]
pub struct ODataList<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

impl DataverseClient {
    /// `base_url` is the organization root, e.g. `https://contoso.crm4.dynamics.com`.
    pub fn new(client: Client, base_url: &str) -> Self {
        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        DataverseClient {
            client,
            base_url,
            token: None,
            timeout: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("OData-MaxVersion", HeaderValue::from_static("4.0"));
        headers.insert("OData-Version", HeaderValue::from_static("4.0"));
        if let Some(t) = &self.token {
            let val = HeaderValue::from_str(&format!("Bearer {t}"))
                .map_err(|e| FlowError::Auth(format!("invalid token: {e}")))?;
            headers.insert(AUTHORIZATION, val);
        }
        Ok(headers)
    }

    /// GET an entity set with OData query options and decode the `value` array.
    pub async fn list<T: DeserializeOwned>(
        &self,
        entity_set: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let url = format!("{}{}{}", self.base_url, WEB_API_PATH, entity_set);
        let mut req = self.client.get(&url).headers(self.headers()?).query(query);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(FlowError::Status { status, body });
        }
        let list: ODataList<T> = res
            .json()
            .await
            .map_err(|e| FlowError::Decode(format!("{entity_set}: {e}")))?;
        Ok(list.value)
    }
}

/// GET any JSON document with a bearer token.
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    token: &str,
    query: &[(&str, &str)],
) -> Result<T> {
    let res = client
        .get(url)
        .bearer_auth(token)
        .header(ACCEPT, "application/json")
        .query(query)
        .send()
        .await?;
    if !res.status().is_success() {
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        return Err(FlowError::Status { status, body });
    }
    Ok(res.json().await?)
}
