//! Per-environment queries: is a given solution installed, and which custom
//! JavaScript web resources live in the Default solution.

use serde::Deserialize;

use crate::api::DataverseClient;
use crate::error::{FlowError, Result};

/// Name prefixes of Microsoft-published web resources.
pub const MICROSOFT_PREFIXES: &[&str] = &[
    "msdyn_",
    "mscrm_",
    "Microsoft",
    "cc_",
    "msdynce_",
    "msdynmkt_",
    "msfp_",
    "mspcat_",
    "adminsi_",
    "powerpagesite_",
    "powerpagecomponent_",
];

const COMPONENT_TYPE_WEB_RESOURCE: u32 = 61;
const WEB_RESOURCE_TYPE_SCRIPT: u32 = 3;
const ID_BATCH_SIZE: usize = 50;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SolutionInfo {
    #[serde(default)]
    pub uniquename: String,
    #[serde(default)]
    pub friendlyname: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub installedon: Option<String>,
    #[serde(default)]
    pub ismanaged: bool,
}

impl SolutionInfo {
    pub fn managed_label(&self) -> &'static str {
        if self.ismanaged {
            "Managed"
        } else {
            "Unmanaged"
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolutionStatus {
    Found(SolutionInfo),
    NotFound,
    Error(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct WebResource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub displayname: Option<String>,
    #[serde(default)]
    pub webresourcetype: Option<u32>,
    #[serde(default)]
    pub ismanaged: bool,
    #[serde(default)]
    pub createdon: Option<String>,
    #[serde(default)]
    pub modifiedon: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SolutionId {
    solutionid: String,
}

#[derive(Deserialize, Debug)]
struct Component {
    objectid: String,
}

/// Text shown for a failed query.
pub fn describe_error(e: &FlowError) -> String {
    match e {
        FlowError::Status { status: 401, .. } => "Unauthorized - token may have expired".into(),
        FlowError::Status { status: 403, .. } => "Access denied - insufficient permissions".into(),
        FlowError::Status { status, .. } => format!("HTTP {status}"),
        FlowError::Timeout => "Request timeout".into(),
        other => other.to_string(),
    }
}

pub async fn check_solution(api: &DataverseClient, unique_name: &str) -> SolutionStatus {
    let filter = format!("uniquename eq '{}'", unique_name.replace('\'', "''"));
    let found = api
        .list::<SolutionInfo>(
            "solutions",
            &[
                ("$select", "uniquename,friendlyname,version,installedon,ismanaged"),
                ("$filter", filter.as_str()),
            ],
        )
        .await;
    match found {
        Ok(mut solutions) if !solutions.is_empty() => SolutionStatus::Found(solutions.remove(0)),
        Ok(_) => SolutionStatus::NotFound,
        Err(e) => SolutionStatus::Error(describe_error(&e)),
    }
}

pub fn is_microsoft(name: &str) -> bool {
    MICROSOFT_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Keep unmanaged resources that no Microsoft prefix claims.
pub fn custom_only(resources: Vec<WebResource>) -> Vec<WebResource> {
    resources
        .into_iter()
        .filter(|wr| !wr.ismanaged && !is_microsoft(&wr.name))
        .collect()
}

/// Unmanaged, non-Microsoft JavaScript web resources in the Default solution.
pub async fn custom_scripts(api: &DataverseClient) -> Result<Vec<WebResource>> {
    let default = api
        .list::<SolutionId>(
            "solutions",
            &[("$select", "solutionid,uniquename"), ("$filter", "uniquename eq 'Default'")],
        )
        .await
        .map_err(|e| {
            FlowError::Query(format!("Failed to get Default solution: {}", describe_error(&e)))
        })?;
    let default_id = default
        .first()
        .map(|s| s.solutionid.clone())
        .ok_or_else(|| FlowError::Query("Default solution not found".into()))?;

    let filter = format!(
        "_solutionid_value eq {default_id} and componenttype eq {COMPONENT_TYPE_WEB_RESOURCE}"
    );
    let components = api
        .list::<Component>(
            "solutioncomponents",
            &[("$select", "objectid"), ("$filter", filter.as_str())],
        )
        .await
        .map_err(|e| {
            FlowError::Query(format!("Failed to get solution components: {}", describe_error(&e)))
        })?;

    let ids: Vec<&str> = components.iter().map(|c| c.objectid.as_str()).collect();
    let mut resources = Vec::new();
    // Ids are queried in chunks to keep the URL short.
    for chunk in ids.chunks(ID_BATCH_SIZE) {
        let any_id = chunk
            .iter()
            .map(|id| format!("webresourceid eq {id}"))
            .collect::<Vec<_>>()
            .join(" or ");
        let filter = format!("({any_id}) and webresourcetype eq {WEB_RESOURCE_TYPE_SCRIPT}");
        match api
            .list::<WebResource>(
                "webresourceset",
                &[
                    ("$select", "name,displayname,webresourcetype,ismanaged,createdon,modifiedon"),
                    ("$filter", filter.as_str()),
                ],
            )
            .await
        {
            Ok(batch) => resources.extend(batch),
            Err(FlowError::Status { status, .. }) => {
                tracing::warn!("Skipping web resource batch: HTTP {}", status)
            }
            Err(e) => return Err(e),
        }
    }
    Ok(custom_only(resources))
}
