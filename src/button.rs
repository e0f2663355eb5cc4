//! Command-bar button handlers.
//!
//! Each handler runs one invocation end to end and always finishes in a
//! dialog or a log line; nothing is returned to the host as an error.

use tracing::{error, warn};

use crate::dispatch::{DispatchPayload, DispatchSummary, FlowAck};
use crate::error::FlowError;
use crate::host::HostUi;
use crate::localization::{format_message, MessageKey, Strings};
use crate::record::{resolve, Batch, ContextKind, PrimaryControl};
use crate::session::FlowSession;

/// Caller-supplied settings for one button.
#[derive(Debug, Clone, Default)]
pub struct ButtonOptions {
    /// Configuration name holding the flow's HTTP trigger URL.
    pub url_variable: String,
    /// Confirmation text; `{0}` is the number of records.
    pub confirm_text: Option<String>,
    /// Success text; `{0}` is the number of records that succeeded.
    pub success_text: Option<String>,
    /// Sub-control to refresh afterwards when run from a form.
    pub refresh_subgrid: Option<String>,
    /// Form fields sent along with the record (custom-field button only).
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ButtonOutcome {
    NoSelection,
    Cancelled,
    Unsupported,
    ConfigFailed(String),
    Failed(String),
    Completed(DispatchSummary),
    Acknowledged(FlowAck),
}

/// Resolve records, confirm, post each to the configured flow, and report.
pub async fn run_flow_button(
    session: &FlowSession,
    ui: &dyn HostUi,
    control: &PrimaryControl,
    options: &ButtonOptions,
) -> ButtonOutcome {
    let strings = session.strings().await;
    let batch = match resolve_or_alert(ui, strings.as_ref(), control).await {
        Ok(batch) => batch,
        Err(outcome) => return outcome,
    };

    if !confirm(ui, strings.as_ref(), options, batch.len()).await {
        return ButtonOutcome::Cancelled;
    }

    let url = match lookup_url(session, ui, strings.as_ref(), options).await {
        Ok(url) => url,
        Err(outcome) => return outcome,
    };

    ui.show_progress(&strings.format(MessageKey::Processing, &[&batch.len().to_string()]));
    let summary = session.dispatcher.dispatch_batch(&url, &batch.records).await;
    ui.close_progress();

    let text = summary.message(strings.as_ref(), options.success_text.as_deref());
    ui.alert(&text, Some(&strings.get(MessageKey::SummaryTitle))).await;
    refresh(ui, strings.as_ref(), batch.context, options).await;
    ButtonOutcome::Completed(summary)
}

/// Single-record variant that sends a fixed set of form field values along
/// with the record and reports whether the flow finished or was only started.
pub async fn run_custom_fields_button(
    session: &FlowSession,
    ui: &dyn HostUi,
    control: &PrimaryControl,
    options: &ButtonOptions,
) -> ButtonOutcome {
    let strings = session.strings().await;
    let form = match control {
        PrimaryControl::Form(form) => form,
        PrimaryControl::References(refs) if refs.is_empty() => {
            ui.alert(&strings.get(MessageKey::NoSelection), None).await;
            return ButtonOutcome::NoSelection;
        }
        PrimaryControl::Empty => {
            ui.alert(&strings.get(MessageKey::NoSelection), None).await;
            return ButtonOutcome::NoSelection;
        }
        _ => {
            ui.alert(&strings.get(MessageKey::NotSupportedList), None).await;
            return ButtonOutcome::Unsupported;
        }
    };
    let batch = match resolve_or_alert(ui, strings.as_ref(), control).await {
        Ok(batch) => batch,
        Err(outcome) => return outcome,
    };

    if !confirm(ui, strings.as_ref(), options, 1).await {
        return ButtonOutcome::Cancelled;
    }

    let url = match lookup_url(session, ui, strings.as_ref(), options).await {
        Ok(url) => url,
        Err(outcome) => return outcome,
    };

    let mut payload = DispatchPayload::from(&batch.records[0]);
    for field in &options.fields {
        payload.extra.insert(field.clone(), form.field(field));
    }

    ui.show_progress(&strings.format(MessageKey::Processing, &["1"]));
    let result = session.dispatcher.dispatch_one(&url, &payload).await;
    ui.close_progress();

    let outcome = match result {
        Ok(ack) => {
            let key = match ack {
                FlowAck::Completed(_) => MessageKey::FlowCompleted,
                FlowAck::Started => MessageKey::FlowStarted,
            };
            ui.alert(&strings.get(key), Some(&strings.get(MessageKey::SummaryTitle)))
                .await;
            ButtonOutcome::Acknowledged(ack)
        }
        Err(e) => {
            error!("Flow call for {} {} failed: {}", payload.entity_name, payload.id, e);
            let text = strings.format(MessageKey::TechnicalError, &[&e.to_string()]);
            ui.alert(&text, None).await;
            ButtonOutcome::Failed(e.to_string())
        }
    };
    refresh(ui, strings.as_ref(), ContextKind::Form, options).await;
    outcome
}

async fn resolve_or_alert(
    ui: &dyn HostUi,
    strings: &dyn Strings,
    control: &PrimaryControl,
) -> Result<Batch, ButtonOutcome> {
    match resolve(control) {
        Ok(batch) => Ok(batch),
        Err(FlowError::NoSelection) => {
            ui.alert(&strings.get(MessageKey::NoSelection), None).await;
            Err(ButtonOutcome::NoSelection)
        }
        Err(e) => {
            let text = strings.format(MessageKey::TechnicalError, &[&e.to_string()]);
            ui.alert(&text, None).await;
            Err(ButtonOutcome::Failed(e.to_string()))
        }
    }
}

async fn confirm(
    ui: &dyn HostUi,
    strings: &dyn Strings,
    options: &ButtonOptions,
    count: usize,
) -> bool {
    let template = options
        .confirm_text
        .clone()
        .unwrap_or_else(|| strings.get(MessageKey::ConfirmText));
    let text = format_message(&template, &[&count.to_string()]);
    ui.confirm(
        &text,
        &strings.get(MessageKey::ConfirmTitle),
        &strings.get(MessageKey::Yes),
        &strings.get(MessageKey::Cancel),
    )
    .await
}

async fn lookup_url(
    session: &FlowSession,
    ui: &dyn HostUi,
    strings: &dyn Strings,
    options: &ButtonOptions,
) -> Result<String, ButtonOutcome> {
    match session.lookup(&options.url_variable).await {
        Ok(url) => Ok(url),
        Err(e) => {
            let text = strings.format(MessageKey::ConfigErrorText, &[&e.to_string()]);
            ui.alert(&text, Some(&strings.get(MessageKey::ConfigErrorTitle)))
                .await;
            Err(ButtonOutcome::ConfigFailed(e.to_string()))
        }
    }
}

async fn refresh(
    ui: &dyn HostUi,
    strings: &dyn Strings,
    context: ContextKind,
    options: &ButtonOptions,
) {
    match (context, options.refresh_subgrid.as_deref()) {
        (ContextKind::Form, Some(name)) => {
            if let Err(e) = ui.refresh_subcontrol(name).await {
                warn!(
                    "{}",
                    strings.format(MessageKey::RefreshWarning, &[name, &e.to_string()])
                );
            }
        }
        (context, _) if context.is_list() => ui.refresh_list().await,
        _ => ui.refresh_form().await,
    }
}
