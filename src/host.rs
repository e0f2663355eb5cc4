use async_trait::async_trait;

use crate::error::Result;

/// The UI services a button handler needs from whatever hosts it.
#[async_trait]
pub trait HostUi: Send + Sync {
    /// Yes/cancel prompt. `false` covers both cancel and dismissal.
    async fn confirm(&self, text: &str, title: &str, yes: &str, cancel: &str) -> bool;

    /// Show a message and wait until the user acknowledges it.
    async fn alert(&self, text: &str, title: Option<&str>);

    fn show_progress(&self, text: &str);

    fn close_progress(&self);

    async fn refresh_list(&self);

    async fn refresh_form(&self);

    /// Refresh a named sub-control (subgrid) on the current form.
    async fn refresh_subcontrol(&self, name: &str) -> Result<()>;
}
