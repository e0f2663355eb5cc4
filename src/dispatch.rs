//! Outbound webhook calls, one per record.

use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{FlowError, Result};
use crate::localization::{MessageKey, Strings};
use crate::record::RecordRef;

/// Body of one webhook call: `{"id", "entityName", ...extra}`.
#[derive(Serialize, Debug, Clone)]
pub struct DispatchPayload {
    pub id: String,
    #[serde(rename = "entityName")]
    pub entity_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<&RecordRef> for DispatchPayload {
    fn from(record: &RecordRef) -> Self {
        DispatchPayload {
            id: record.id.clone(),
            entity_name: record.entity_name.clone(),
            extra: Map::new(),
        }
    }
}

/// Counts for one batch; `succeeded + failed` equals the batch size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl DispatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// The text shown after a batch: success line, plus a failure line when
    /// anything failed.
    pub fn message(&self, strings: &dyn Strings, custom_success: Option<&str>) -> String {
        let count = self.succeeded.to_string();
        let mut text = match custom_success {
            Some(template) => crate::localization::format_message(template, &[&count]),
            None => strings.format(MessageKey::SuccessDefault, &[&count]),
        };
        if self.failed > 0 {
            text.push('\n');
            text.push_str(&strings.format(MessageKey::FailedCount, &[&self.failed.to_string()]));
        }
        text
    }
}

/// How a successful single-record call was acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowAck {
    /// The flow answered with a JSON body.
    Completed(Value),
    /// Success status without a usable body; the flow runs on its own.
    Started,
}

#[derive(Clone, Default)]
pub struct WebhookDispatcher {
    client: Client,
}

impl WebhookDispatcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn post(&self, url: &str, payload: &DispatchPayload) -> Result<reqwest::Response> {
        let res = self.client.post(url).json(payload).send().await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(FlowError::Status { status, body });
        }
        Ok(res)
    }

    /// Post every record at once and wait for all of them to settle.
    pub async fn dispatch_batch(&self, url: &str, records: &[RecordRef]) -> DispatchSummary {
        let calls = records.iter().map(|record| async move {
            let payload = DispatchPayload::from(record);
            match self.post(url, &payload).await {
                Ok(_) => true,
                Err(e) => {
                    debug!("Dispatch for {} failed: {}", record.id, e);
                    false
                }
            }
        });
        let outcomes = join_all(calls).await;
        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        DispatchSummary {
            succeeded,
            failed: outcomes.len() - succeeded,
        }
    }

    /// Post one payload and classify the acknowledgement.
    pub async fn dispatch_one(&self, url: &str, payload: &DispatchPayload) -> Result<FlowAck> {
        let res = self.post(url, payload).await?;
        let body = res.bytes().await.unwrap_or_default();
        Ok(match serde_json::from_slice::<Value>(&body) {
            Ok(value) => FlowAck::Completed(value),
            Err(_) => FlowAck::Started,
        })
    }
}
