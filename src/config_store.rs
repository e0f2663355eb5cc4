//! Named configuration values (flow URLs, string tables) read from
//! environment variable definitions and their optional current-value override.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::api::DataverseClient;
use crate::error::{FlowError, Result};

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Resolve a value by exact schema name; override wins over default.
    async fn get_value(&self, name: &str) -> Result<String>;
}

#[derive(Deserialize, Debug, Default)]
pub struct VariableDefinition {
    #[serde(default)]
    pub schemaname: Option<String>,
    #[serde(default)]
    pub defaultvalue: Option<String>,
    #[serde(rename = "environmentvariabledefinition_environmentvariablevalue", default)]
    pub values: Vec<VariableValue>,
}

#[derive(Deserialize, Debug, Default)]
pub struct VariableValue {
    #[serde(default)]
    pub value: Option<String>,
}

impl VariableDefinition {
    pub fn effective_value(&self) -> Option<String> {
        self.values
            .iter()
            .filter_map(|v| v.value.as_deref())
            .find(|v| !v.is_empty())
            .or(self.defaultvalue.as_deref().filter(|v| !v.is_empty()))
            .map(str::to_string)
    }
}

/// Pick the value from the first definition returned by the joined query.
pub fn pick_value(name: &str, definitions: &[VariableDefinition]) -> Result<String> {
    definitions
        .first()
        .and_then(VariableDefinition::effective_value)
        .ok_or_else(|| FlowError::ConfigNotFound(name.to_string()))
}

pub struct DataverseConfigStore {
    api: DataverseClient,
}

impl DataverseConfigStore {
    pub fn new(api: DataverseClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ConfigStore for DataverseConfigStore {
    async fn get_value(&self, name: &str) -> Result<String> {
        let filter = format!("schemaname eq '{}'", name.replace('\'', "''"));
        let definitions: Vec<VariableDefinition> = self
            .api
            .list(
                "environmentvariabledefinitions",
                &[
                    ("$select", "schemaname,defaultvalue"),
                    ("$filter", filter.as_str()),
                    (
                        "$expand",
                        "environmentvariabledefinition_environmentvariablevalue($select=value)",
                    ),
                ],
            )
            .await?;
        debug!("{} definition(s) matched {}", definitions.len(), name);
        pick_value(name, &definitions)
    }
}

/// A value looked up once per session. The first successful lookup is kept
/// for the life of the owner; failures are not cached.
#[derive(Debug, Default)]
pub struct CachedValue {
    cell: OnceCell<String>,
}

impl CachedValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_fetch(&self, store: &dyn ConfigStore, name: &str) -> Result<String> {
        self.cell
            .get_or_try_init(|| store.get_value(name))
            .await
            .cloned()
    }

    pub fn get(&self) -> Option<&str> {
        self.cell.get().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn def(default: Option<&str>, overrides: &[&str]) -> VariableDefinition {
        VariableDefinition {
            schemaname: Some("new_FlowUrl".into()),
            defaultvalue: default.map(String::from),
            values: overrides
                .iter()
                .map(|v| VariableValue {
                    value: Some(v.to_string()),
                })
                .collect(),
        }
    }

    #[test]
    fn override_wins_over_default() {
        let defs = [def(Some("https://default"), &["https://override"])];
        assert_eq!(pick_value("x", &defs).unwrap(), "https://override");
    }

    #[test]
    fn default_used_without_override() {
        let defs = [def(Some("https://default"), &[])];
        assert_eq!(pick_value("x", &defs).unwrap(), "https://default");
    }

    #[test]
    fn no_definition_is_not_found() {
        assert!(matches!(pick_value("x", &[]), Err(FlowError::ConfigNotFound(n)) if n == "x"));
        let defs = [def(None, &[])];
        assert!(matches!(pick_value("x", &defs), Err(FlowError::ConfigNotFound(_))));
    }

    #[test]
    fn expanded_response_decodes() {
        let json = r#"{"value":[{"schemaname":"new_FlowUrl","defaultvalue":"d",
            "environmentvariabledefinition_environmentvariablevalue":[{"value":"o"}]}]}"#;
        let list: crate::api::ODataList<VariableDefinition> = serde_json::from_str(json).unwrap();
        assert_eq!(pick_value("new_FlowUrl", &list.value).unwrap(), "o");
    }

    struct CountingStore {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl ConfigStore for CountingStore {
        async fn get_value(&self, name: &str) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(FlowError::Http("offline".into()));
            }
            Ok(format!("{name}-{n}"))
        }
    }

    #[tokio::test]
    async fn cache_keeps_first_success_and_skips_failures() {
        let store = CountingStore {
            calls: AtomicUsize::new(0),
            fail_first: true,
        };
        let cache = CachedValue::new();
        assert!(cache.get_or_fetch(&store, "v").await.is_err());
        assert_eq!(cache.get(), None);
        assert_eq!(cache.get_or_fetch(&store, "v").await.unwrap(), "v-1");
        assert_eq!(cache.get_or_fetch(&store, "v").await.unwrap(), "v-1");
        assert_eq!(cache.get(), Some("v-1"));
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }
}
