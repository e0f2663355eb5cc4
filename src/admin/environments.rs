use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::api::{get_json, ODataList};
use crate::error::{FlowError, Result};

pub const BAP_BASE: &str = "https://api.bap.microsoft.com";
pub const API_VERSION: &str = "2020-10-01";
const ADMIN_PATH: &str = "/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments";
const USER_PATH: &str = "/providers/Microsoft.BusinessAppPlatform/environments";

/// A tenant environment and, when it has one, its Dataverse instance URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub id: String,
    pub name: String,
    pub sku: String,
    pub instance_url: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawEnvironment {
    #[serde(default)]
    name: String,
    #[serde(default)]
    properties: RawProperties,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct RawProperties {
    display_name: Option<String>,
    environment_sku: Option<String>,
    linked_environment_metadata: Option<LinkedMetadata>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct LinkedMetadata {
    instance_url: Option<String>,
}

impl From<RawEnvironment> for Environment {
    fn from(raw: RawEnvironment) -> Self {
        let props = raw.properties;
        Environment {
            id: raw.name,
            name: props.display_name.unwrap_or_else(|| "Unknown".into()),
            sku: props.environment_sku.unwrap_or_else(|| "Unknown".into()),
            instance_url: props
                .linked_environment_metadata
                .and_then(|m| m.instance_url)
                .filter(|u| !u.is_empty()),
        }
    }
}

/// List environments through the admin endpoint, falling back to the
/// caller's own environments when the admin listing is forbidden.
pub async fn list_environments(client: &Client, bap_base: &str, token: &str) -> Result<Vec<Environment>> {
    let query = [("api-version", API_VERSION)];
    let admin_url = format!("{bap_base}{ADMIN_PATH}");
    let listed = match get_json::<ODataList<RawEnvironment>>(client, &admin_url, token, &query).await {
        Err(FlowError::Status { status: 403, .. }) => {
            debug!("Admin environment listing forbidden, using user listing");
            let user_url = format!("{bap_base}{USER_PATH}");
            get_json::<ODataList<RawEnvironment>>(client, &user_url, token, &query).await?
        }
        other => other?,
    };
    Ok(listed.value.into_iter().map(Environment::from).collect())
}
