// UI layer: a terminal host for the flow buttons, built on `dialoguer`
// prompts and `indicatif` spinners, plus the interactive menu used when the
// binary is started without a subcommand.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use crossterm::style::Stylize;
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::error::{FlowError, Result};
use crate::host::HostUi;

/// Terminal implementation of [`HostUi`].
///
/// With `assume_yes` every confirmation is accepted and alerts are printed
/// without waiting, which is what scripted runs want.
pub struct TerminalUi {
    assume_yes: bool,
    spinner: Mutex<Option<ProgressBar>>,
}

impl TerminalUi {
    pub fn new(assume_yes: bool) -> Self {
        TerminalUi {
            assume_yes,
            spinner: Mutex::new(None),
        }
    }
}

/// Run a blocking dialoguer prompt off the async runtime.
async fn prompt<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FlowError::Ui(e.to_string()))?
        .map_err(|e| FlowError::Ui(e.to_string()))
}

#[async_trait]
impl HostUi for TerminalUi {
    async fn confirm(&self, text: &str, title: &str, yes: &str, cancel: &str) -> bool {
        println!("{}", title.bold());
        if self.assume_yes {
            println!("{text} [{yes}]");
            return true;
        }
        let text = text.to_string();
        let items = vec![yes.to_string(), cancel.to_string()];
        // `interact_opt` returns None when the prompt is dismissed with Esc.
        let choice = prompt(move || {
            Select::new()
                .with_prompt(text)
                .items(&items)
                .default(0)
                .interact_opt()
        })
        .await;
        matches!(choice, Ok(Some(0)))
    }

    async fn alert(&self, text: &str, title: Option<&str>) {
        if let Some(title) = title {
            println!("{}", title.bold());
        }
        println!("{text}");
        if self.assume_yes {
            return;
        }
        let _ = prompt(|| {
            Input::<String>::new()
                .with_prompt("Press Enter to continue")
                .allow_empty(true)
                .interact_text()
        })
        .await;
    }

    fn show_progress(&self, text: &str) {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(text.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        let mut slot = self.spinner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = slot.replace(spinner) {
            old.finish_and_clear();
        }
    }

    fn close_progress(&self) {
        let mut slot = self.spinner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(spinner) = slot.take() {
            spinner.finish_and_clear();
        }
    }

    async fn refresh_list(&self) {
        info!("List refresh requested");
    }

    async fn refresh_form(&self) {
        info!("Form refresh requested");
    }

    async fn refresh_subcontrol(&self, name: &str) -> Result<()> {
        info!("Refresh requested for {}", name);
        Ok(())
    }
}

/// Entries of the interactive menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    TriggerRecords,
    TriggerForm,
    Inventory,
    Exit,
}

pub fn main_menu_choice() -> Result<MenuChoice> {
    let items = vec![
        "Run flow for records",
        "Run flow for a form record",
        "Inventory environments",
        "Exit",
    ];
    // `Select` shows a keyboard-navigable list in the terminal.
    let selection = Select::new()
        .items(&items)
        .default(0)
        .interact()
        .map_err(|e| FlowError::Ui(e.to_string()))?;
    Ok(match selection {
        0 => MenuChoice::TriggerRecords,
        1 => MenuChoice::TriggerForm,
        2 => MenuChoice::Inventory,
        _ => MenuChoice::Exit,
    })
}

/// Prompt for one line of text.
pub fn ask(prompt_text: &str, allow_empty: bool) -> Result<String> {
    Input::<String>::new()
        .with_prompt(prompt_text)
        .allow_empty(allow_empty)
        .interact_text()
        .map_err(|e| FlowError::Ui(e.to_string()))
}

/// Print a section heading.
pub fn heading(text: &str) {
    let rule = "=".repeat(60);
    println!("\n{rule}");
    println!("{}", text.bold());
    println!("{rule}");
}
