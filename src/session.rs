//! Per-host-session state: the HTTP dispatcher, the configuration store, and
//! the values that are looked up once and then reused until the session ends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::warn;

use crate::config_store::{CachedValue, ConfigStore};
use crate::dispatch::WebhookDispatcher;
use crate::error::Result;
use crate::localization::{Language, StaticStrings, StringTable, Strings};

/// Where user-facing strings come from.
#[derive(Debug, Clone)]
pub enum StringSource {
    /// Compiled-in table for one language.
    Builtin(Language),
    /// JSON table stored under this configuration name.
    Remote(String),
}

pub struct FlowSession {
    pub dispatcher: WebhookDispatcher,
    store: Arc<dyn ConfigStore>,
    strings: StringSource,
    cache_lookups: bool,
    lookups: Mutex<HashMap<String, Arc<CachedValue>>>,
    remote_strings: OnceCell<Arc<StringTable>>,
}

impl FlowSession {
    pub fn new(dispatcher: WebhookDispatcher, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            dispatcher,
            store,
            strings: StringSource::Builtin(Language::default()),
            cache_lookups: false,
            lookups: Mutex::new(HashMap::new()),
            remote_strings: OnceCell::new(),
        }
    }

    pub fn with_strings(mut self, source: StringSource) -> Self {
        self.strings = source;
        self
    }

    /// Keep the first successful value of every lookup for the session.
    pub fn with_cached_lookups(mut self, enabled: bool) -> Self {
        self.cache_lookups = enabled;
        self
    }

    pub async fn lookup(&self, name: &str) -> Result<String> {
        if !self.cache_lookups {
            return self.store.get_value(name).await;
        }
        let cell = {
            let mut lookups = self.lookups.lock().unwrap_or_else(|e| e.into_inner());
            lookups.entry(name.to_string()).or_default().clone()
        };
        cell.get_or_fetch(self.store.as_ref(), name).await
    }

    /// Strings for this session. A remote table is kept once it has been
    /// fetched and parsed; until then every call tries again.
    pub async fn strings(&self) -> Arc<dyn Strings> {
        match &self.strings {
            StringSource::Builtin(language) => {
                Arc::new(StaticStrings::new(*language)) as Arc<dyn Strings>
            }
            StringSource::Remote(name) => {
                let fetched = self
                    .remote_strings
                    .get_or_try_init(|| async {
                        self.store
                            .get_value(name)
                            .await
                            .and_then(|json| StringTable::parse(&json))
                            .map(Arc::new)
                    })
                    .await;
                match fetched {
                    Ok(table) => table.clone(),
                    Err(e) => {
                        // Not cached; the next invocation fetches again.
                        warn!("Using built-in strings, string table unavailable: {}", e);
                        Arc::new(StringTable::default())
                    }
                }
            }
        }
    }
}
